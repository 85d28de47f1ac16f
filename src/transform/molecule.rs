use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::entities::molecule::MoleculeRecord;
use crate::pipeline::backends::RegistryRecord;

const MAX_SYNONYMS: usize = 20;
const MAX_DEV_CODES: usize = 10;

// Catalogue/vendor prefixes that look like development codes but are not.
const VENDOR_PREFIXES: [&str; 6] = ["HY", "CS", "AKOS", "MFCD", "BDBM", "NCGC"];

fn dev_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Z]{2,5})[- ]?\d{3,7}[A-Z]?$").expect("valid regex"))
}

fn cas_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{2,7}-\d{2}-\d$").expect("valid regex"))
}

pub(crate) fn is_dev_code(value: &str) -> bool {
    let Some(caps) = dev_code_re().captures(value.trim()) else {
        return false;
    };
    !VENDOR_PREFIXES.contains(&&caps[1])
}

pub(crate) fn is_cas_number(value: &str) -> bool {
    cas_re().is_match(value.trim())
}

fn dev_codes(synonyms: &[String]) -> Vec<String> {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut out = Vec::new();
    for syn in synonyms.iter().map(|s| s.trim()) {
        if !is_dev_code(syn) {
            continue;
        }
        let key: String = syn.chars().filter(char::is_ascii_alphanumeric).collect();
        if seen.insert(key) {
            out.push(syn.to_string());
        }
        if out.len() >= MAX_DEV_CODES {
            break;
        }
    }
    out
}

/// Builds the canonical molecule record from a registry answer.
pub(crate) fn from_registry(
    requested_name: &str,
    brand: Option<&str>,
    record: RegistryRecord,
) -> MoleculeRecord {
    let name = record
        .canonical_name
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(requested_name.trim())
        .to_string();

    let mut registry_ids = BTreeSet::new();
    if let Some(id) = record.registry_id.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        registry_ids.insert(id.to_string());
    }

    let cas_numbers: Vec<String> = record
        .synonyms
        .iter()
        .map(|s| s.trim())
        .filter(|s| is_cas_number(s))
        .map(str::to_string)
        .collect();
    registry_ids.extend(cas_numbers.iter().cloned());

    let synonyms: BTreeSet<String> = record
        .synonyms
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case(&name))
        .take(MAX_SYNONYMS)
        .map(str::to_string)
        .collect();

    let brand_names = brand
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| BTreeSet::from([v.to_string()]))
        .unwrap_or_default();

    MoleculeRecord {
        dev_codes: dev_codes(&record.synonyms),
        cas: cas_numbers.into_iter().next(),
        name,
        brand_names,
        registry_ids,
        synonyms,
        molecular_formula: record.molecular_formula,
        molecular_weight: record.molecular_weight,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn darolutamide_record() -> RegistryRecord {
        RegistryRecord {
            canonical_name: Some("darolutamide".into()),
            registry_id: Some("CID:67171867".into()),
            synonyms: vec![
                "darolutamide".into(),
                "1297538-32-9".into(),
                "ODM-201".into(),
                "BAY-1841788".into(),
                "BAY1841788".into(),
                "Nubeqa".into(),
                "HY-16985".into(),
                "CHEMBL2364617".into(),
            ],
            molecular_formula: Some("C19H19ClN6O2".into()),
            molecular_weight: Some("398.8".into()),
        }
    }

    #[test]
    fn extracts_dev_codes_and_cas() {
        let record = from_registry("Darolutamide", Some("Nubeqa"), darolutamide_record());
        assert_eq!(record.name, "darolutamide");
        assert_eq!(record.dev_codes, vec!["ODM-201", "BAY-1841788"]);
        assert_eq!(record.cas.as_deref(), Some("1297538-32-9"));
        assert!(record.registry_ids.contains("CID:67171867"));
        assert!(record.registry_ids.contains("1297538-32-9"));
        assert!(record.brand_names.contains("Nubeqa"));
        assert!(!record.synonyms.contains("darolutamide"));
    }

    #[test]
    fn falls_back_to_requested_name() {
        let record = from_registry(" Olaparib ", None, RegistryRecord::default());
        assert_eq!(record.name, "Olaparib");
        assert!(record.brand_names.is_empty());
        assert!(record.dev_codes.is_empty());
    }

    #[test]
    fn dev_code_and_cas_patterns() {
        assert!(is_dev_code("AZD2281"));
        assert!(is_dev_code("MK 4827"));
        assert!(!is_dev_code("HY-10162"));
        assert!(!is_dev_code("CHEMBL521686"));
        assert!(!is_dev_code("olaparib"));
        assert!(is_cas_number("763113-22-0"));
        assert!(!is_cas_number("763113-22"));
    }
}
