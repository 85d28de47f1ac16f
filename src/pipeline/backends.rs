//! Boundary traits between the pipeline and the external services it consumes.
//!
//! The HTTP clients in `crate::sources` implement these; tests substitute
//! in-memory fakes.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::PharmyrusError;

/// Raw chemical-registry answer for a name lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistryRecord {
    pub canonical_name: Option<String>,
    pub registry_id: Option<String>,
    pub synonyms: Vec<String>,
    pub molecular_formula: Option<String>,
    pub molecular_weight: Option<String>,
}

/// One free-text search result (title, snippet, link, or a whole page body).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawHit {
    pub title: String,
    pub snippet: String,
    pub link: Option<String>,
}

impl RawHit {
    pub fn text(&self) -> String {
        let mut out = format!("{} {}", self.title, self.snippet);
        if let Some(link) = &self.link {
            out.push(' ');
            out.push_str(link);
        }
        out
    }
}

/// A national filing as reported by a backend, before merging.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NationalRecord {
    pub publication_number: String,
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    pub assignee: Option<String>,
    pub filing_date: Option<String>,
    pub priority_date: Option<String>,
    pub link: Option<String>,
}

impl NationalRecord {
    pub fn bare(publication_number: impl Into<String>) -> Self {
        Self {
            publication_number: publication_number.into(),
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait ChemicalRegistry: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` means the registry answered but has no match.
    async fn lookup(&self, name: &str) -> Result<Option<RegistryRecord>, PharmyrusError>;
}

#[async_trait]
pub trait PatentSearch: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(&self, query: &str) -> Result<Vec<RawHit>, PharmyrusError>;
}

#[async_trait]
pub trait NationalOffice: Send + Sync {
    fn name(&self) -> &'static str;

    fn supports(&self, jurisdiction: &str) -> bool;

    async fn search(
        &self,
        query: &str,
        jurisdiction: &str,
    ) -> Result<Vec<NationalRecord>, PharmyrusError>;
}

#[async_trait]
pub trait FamilyNavigator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn national_phase(
        &self,
        international_id: &str,
        jurisdiction: &str,
    ) -> Result<Vec<NationalRecord>, PharmyrusError>;
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(&self, query: &str) -> Result<Vec<RawHit>, PharmyrusError>;
}

/// Optional detail lookup used to fill in sparse filings.
#[async_trait]
pub trait FilingDetails: Send + Sync {
    fn name(&self) -> &'static str;

    async fn details(&self, publication_number: &str)
    -> Result<Option<NationalRecord>, PharmyrusError>;
}

/// The set of backends one pipeline runs against.
///
/// Only the registry is required; every other list may be empty, in which
/// case the corresponding source is simply not consulted.
#[derive(Clone)]
pub struct Backends {
    pub registry: Arc<dyn ChemicalRegistry>,
    pub patent_search: Vec<Arc<dyn PatentSearch>>,
    pub national_offices: Vec<Arc<dyn NationalOffice>>,
    /// Country-filtered patent indexes, queried only by molecule terms.
    pub patent_index: Vec<Arc<dyn NationalOffice>>,
    pub family_navigators: Vec<Arc<dyn FamilyNavigator>>,
    pub web_search: Vec<Arc<dyn WebSearch>>,
    pub filing_details: Option<Arc<dyn FilingDetails>>,
}

impl Backends {
    pub fn new(registry: Arc<dyn ChemicalRegistry>) -> Self {
        Self {
            registry,
            patent_search: Vec::new(),
            national_offices: Vec::new(),
            patent_index: Vec::new(),
            family_navigators: Vec::new(),
            web_search: Vec::new(),
            filing_details: None,
        }
    }

    /// Names of every configured backend, sorted and deduplicated.
    pub fn names(&self) -> Vec<&'static str> {
        let mut out = vec![self.registry.name()];
        out.extend(self.patent_search.iter().map(|b| b.name()));
        out.extend(self.national_offices.iter().map(|b| b.name()));
        out.extend(self.patent_index.iter().map(|b| b.name()));
        out.extend(self.family_navigators.iter().map(|b| b.name()));
        out.extend(self.web_search.iter().map(|b| b.name()));
        out.extend(self.filing_details.iter().map(|b| b.name()));
        out.sort_unstable();
        out.dedup();
        out
    }
}
