use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Canonical molecule identity, resolved once at the start of a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoleculeRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub brand_names: BTreeSet<String>,
    /// Registry identifiers, e.g. `CID:67171867` or a CAS number.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub registry_ids: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cas: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dev_codes: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub synonyms: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub molecular_formula: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub molecular_weight: Option<String>,
}

impl MoleculeRecord {
    pub fn primary_brand(&self) -> Option<&str> {
        self.brand_names.iter().next().map(String::as_str)
    }

    /// Terms used by the direct national-office search: the name, every brand
    /// and the first `max_dev_codes` development codes.
    pub fn direct_search_terms(&self, max_dev_codes: usize) -> Vec<String> {
        let mut out = vec![self.name.clone()];
        out.extend(self.brand_names.iter().cloned());
        out.extend(self.dev_codes.iter().take(max_dev_codes).cloned());
        let mut seen = BTreeSet::new();
        out.retain(|term| seen.insert(term.to_ascii_lowercase()));
        out
    }
}
