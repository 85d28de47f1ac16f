//! The search pipeline: resolve, discover, expand, merge, classify, aggregate.

pub mod aggregate;
pub mod backends;
pub(crate) mod budget;
pub mod classify;
pub(crate) mod cache;
pub(crate) mod dedup;
pub(crate) mod discovery;
pub(crate) mod enrich;
pub(crate) mod expander;
pub(crate) mod fanout;
pub(crate) mod resolver;

use std::sync::Arc;

use serde::Deserialize;
use tokio::time::Instant;
use tracing::info;

use crate::config::{PipelineConfig, SearchMode};
use crate::entities::molecule::MoleculeRecord;
use crate::entities::patent::NationalFiling;
use crate::entities::report::{Diagnostics, SearchReport};
use crate::error::PharmyrusError;
use crate::utils::patent_number::normalize_jurisdiction;

use self::backends::Backends;
use self::cache::{CacheKey, SearchCache};
use self::discovery::DiscoveryOutcome;

const DEFAULT_JURISDICTION: &str = "BR";

fn default_jurisdictions() -> Vec<String> {
    vec![DEFAULT_JURISDICTION.to_string()]
}

/// One search request, as accepted by the HTTP API and built by the CLI.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub molecule_name: String,
    #[serde(default)]
    pub brand_name: Option<String>,
    #[serde(default = "default_jurisdictions", alias = "target_countries")]
    pub target_jurisdictions: Vec<String>,
    #[serde(default)]
    pub search_mode: SearchMode,
    #[serde(default)]
    pub expected_baseline: Option<usize>,
}

impl SearchRequest {
    pub fn new(molecule_name: impl Into<String>) -> Self {
        Self {
            molecule_name: molecule_name.into(),
            brand_name: None,
            target_jurisdictions: default_jurisdictions(),
            search_mode: SearchMode::default(),
            expected_baseline: None,
        }
    }

    fn brand(&self) -> Option<&str> {
        self.brand_name.as_deref().map(str::trim).filter(|b| !b.is_empty())
    }

    /// Uppercased, deduplicated jurisdictions in request order; `BR` when empty.
    fn jurisdictions(&self) -> Result<Vec<String>, PharmyrusError> {
        let mut out: Vec<String> = Vec::new();
        for raw in &self.target_jurisdictions {
            let code = normalize_jurisdiction(raw).ok_or_else(|| {
                PharmyrusError::InvalidArgument(format!(
                    "Invalid jurisdiction '{}'. Expected a two-letter code such as BR",
                    raw.trim()
                ))
            })?;
            if !out.contains(&code) {
                out.push(code);
            }
        }
        if out.is_empty() {
            out = default_jurisdictions();
        }
        Ok(out)
    }
}

/// Request-scoped state, dropped once the report is built.
pub(crate) struct SearchRun {
    pub molecule: MoleculeRecord,
    pub jurisdictions: Vec<String>,
    pub mode: SearchMode,
    pub started: Instant,
    pub discovery: DiscoveryOutcome,
    pub filings: Vec<NationalFiling>,
    pub diagnostics: Diagnostics,
}

pub struct Pipeline {
    backends: Backends,
    config: PipelineConfig,
    cache: SearchCache,
}

impl Pipeline {
    pub fn new(backends: Backends, config: PipelineConfig) -> Self {
        let cache = SearchCache::new(config.cache_ttl);
        Self {
            backends,
            config,
            cache,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn backend_names(&self) -> Vec<&'static str> {
        self.backends.names()
    }

    /// Runs (or joins an in-flight run of) the search described by `request`.
    ///
    /// Only resolution failures and invalid input are errors; every other
    /// upstream failure is reported in `diagnostics`.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchReport, PharmyrusError> {
        let name = resolver::validate_name(&request.molecule_name)?;
        let brand = request.brand();
        let jurisdictions = request.jurisdictions()?;
        let mode = request.search_mode;

        let key = CacheKey::new(name, brand, &jurisdictions, mode);
        let shared = self
            .cache
            .get_or_compute(key, || self.run(name, brand, jurisdictions.clone(), mode))
            .await?;

        let mut report = SearchReport::clone(&shared);
        aggregate::apply_baseline(&mut report, request.expected_baseline);
        Ok(report)
    }

    async fn run(
        &self,
        name: &str,
        brand: Option<&str>,
        jurisdictions: Vec<String>,
        mode: SearchMode,
    ) -> Result<SearchReport, PharmyrusError> {
        let started = Instant::now();
        let deadline = started + self.config.request_timeout;
        info!(
            molecule = name,
            mode = mode.as_str(),
            jurisdictions = ?jurisdictions,
            "search started"
        );

        let molecule = resolver::resolve(
            self.backends.registry.as_ref(),
            name,
            brand,
            &self.config,
            deadline,
        )
        .await?;

        let discover_and_expand = async {
            let discovery = discovery::discover(
                &self.backends.patent_search,
                &molecule,
                mode,
                &self.config,
                deadline,
            )
            .await;
            let expansion = expander::expand_candidates(
                &self.backends,
                &discovery.candidates,
                &jurisdictions,
                &self.config,
                deadline,
            )
            .await;
            (discovery, expansion)
        };
        let direct = expander::direct_national_search(
            &self.backends,
            &molecule,
            &jurisdictions,
            &self.config,
            deadline,
        );
        let ((mut discovery, mut expansion), direct) = tokio::join!(discover_and_expand, direct);
        expansion.absorb(direct);

        let mut filings = dedup::merge(expansion.observations);
        let enrichment = enrich::enrich(
            self.backends.filing_details.as_deref(),
            &mut filings,
            &self.config,
            deadline,
        )
        .await;
        for filing in &mut filings {
            classify::classify_and_score(filing, &self.config.scoring);
        }

        let mut diagnostics = Diagnostics::default();
        for warning in std::mem::take(&mut discovery.warnings)
            .into_iter()
            .chain(expansion.warnings)
            .chain(enrichment.warnings)
        {
            diagnostics.push(warning);
        }
        diagnostics.deadline_exceeded = discovery.deadline_exceeded
            || expansion.deadline_exceeded
            || enrichment.deadline_exceeded;
        diagnostics.partial |= diagnostics.deadline_exceeded;

        let report = aggregate::aggregate(SearchRun {
            molecule,
            jurisdictions,
            mode,
            started,
            discovery,
            filings,
            diagnostics,
        });
        info!(
            molecule = %report.molecule.name,
            candidates = report.discovery.candidates_expanded,
            filings = report.filings.len(),
            partial = report.diagnostics.partial,
            elapsed_ms = report.elapsed_ms,
            "search finished"
        );
        Ok(report)
    }
}

/// Shared handle used by the HTTP server.
pub type SharedPipeline = Arc<Pipeline>;
