use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Independent source kinds a national filing can be discovered through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilingSource {
    NationalOffice,
    FamilyNavigation,
    WebSearch,
    /// Full-text patent index queried by molecule terms and country.
    PatentIndex,
}

impl FilingSource {
    pub const ALL: [FilingSource; 4] = [
        FilingSource::NationalOffice,
        FilingSource::FamilyNavigation,
        FilingSource::WebSearch,
        FilingSource::PatentIndex,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NationalOffice => "national_office",
            Self::FamilyNavigation => "family_navigation",
            Self::WebSearch => "web_search",
            Self::PatentIndex => "patent_index",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilingType {
    Composition,
    CrystallineForm,
    Formulation,
    Process,
    Use,
    DosageForm,
    Combination,
    #[default]
    Other,
}

impl FilingType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Composition => "composition",
            Self::CrystallineForm => "crystalline_form",
            Self::Formulation => "formulation",
            Self::Process => "process",
            Self::Use => "use",
            Self::DosageForm => "dosage_form",
            Self::Combination => "combination",
            Self::Other => "other",
        }
    }
}

/// An international publication identifier found during discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateFiling {
    /// `WO` + year + serial, without kind code.
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Backend that first reported the identifier.
    pub source: String,
    /// Labels of every strategy that found the identifier.
    pub strategies: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// A jurisdiction-specific filing, optionally descended from a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NationalFiling {
    pub publication_number: String,
    pub jurisdiction: String,
    /// Identifiers of the candidates this filing was reached from.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub parents: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filing_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    pub sources: BTreeSet<FilingSource>,
    #[serde(default)]
    pub filing_type: FilingType,
    #[serde(default)]
    pub score: u32,
}

impl NationalFiling {
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }
}
