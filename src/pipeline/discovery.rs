//! Candidate discovery: search strategies fanned out over patent-search backends.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{PipelineConfig, SearchMode};
use crate::entities::molecule::MoleculeRecord;
use crate::entities::patent::CandidateFiling;
use crate::entities::report::{PartialResultWarning, Stage};
use crate::pipeline::backends::PatentSearch;
use crate::pipeline::budget::call_with_budget;
use crate::pipeline::fanout::run_until_deadline;
use crate::utils::patent_number::extract_wo_numbers;

const SNIPPET_CHARS: usize = 200;

/// A labelled query. Labels key the per-strategy statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Strategy {
    pub label: String,
    pub query: String,
}

impl Strategy {
    fn new(label: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            query: query.into(),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct DiscoveryOutcome {
    pub candidates: Vec<CandidateFiling>,
    /// Distinct identifiers found before the candidate cap.
    pub candidates_found: usize,
    pub strategies_run: usize,
    pub strategies_failed: usize,
    pub per_strategy: BTreeMap<String, usize>,
    pub warnings: Vec<PartialResultWarning>,
    pub deadline_exceeded: bool,
}

/// Builds the strategy list for `mode`. Queries are unique (case-insensitive).
pub(crate) fn plan_strategies(
    molecule: &MoleculeRecord,
    mode: SearchMode,
    config: &PipelineConfig,
) -> Vec<Strategy> {
    let name = molecule.name.as_str();
    let mut out = vec![Strategy::new("name", format!("{name} patent"))];
    if mode == SearchMode::Fast {
        return out;
    }

    for brand in &molecule.brand_names {
        out.push(Strategy::new("brand", format!("{brand} patent")));
    }
    for code in molecule.dev_codes.iter().take(config.max_dev_code_strategies) {
        out.push(Strategy::new(format!("dev_code:{code}"), format!("{code} patent")));
    }
    let (from, to) = config.discovery_years;
    for year in from..=to {
        out.push(Strategy::new(format!("year:{year}"), format!("{name} patent WO {year}")));
    }
    if let Some(brand) = molecule.primary_brand() {
        out.push(Strategy::new("combo:brand", format!("{name} {brand}")));
    }
    if let Some(code) = molecule.dev_codes.first() {
        out.push(Strategy::new("combo:dev_code", format!("{name} {code}")));
    }
    out.push(Strategy::new(
        "combo:crystalline_form",
        format!("{name} crystalline form patent"),
    ));
    out.push(Strategy::new(
        "combo:pharmaceutical_composition",
        format!("{name} pharmaceutical composition patent"),
    ));

    let mut seen = HashSet::new();
    out.retain(|s| seen.insert(s.query.to_ascii_lowercase()));
    out
}

fn snippet(text: &str) -> Option<String> {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        return None;
    }
    Some(text.chars().take(SNIPPET_CHARS).collect())
}

/// Runs every strategy against the configured backends until done or `deadline`.
///
/// Failed strategies contribute nothing but a warning; an empty result is
/// not an error.
pub(crate) async fn discover(
    backends: &[Arc<dyn PatentSearch>],
    molecule: &MoleculeRecord,
    mode: SearchMode,
    config: &PipelineConfig,
    deadline: Instant,
) -> DiscoveryOutcome {
    let strategies = plan_strategies(molecule, mode, config);
    let backends: &[Arc<dyn PatentSearch>] = match mode {
        SearchMode::Fast => &backends[..backends.len().min(1)],
        SearchMode::Comprehensive => backends,
    };
    if backends.is_empty() {
        warn!("No patent-search backend configured; discovery skipped");
        return DiscoveryOutcome::default();
    }

    let jobs: Vec<(&Strategy, &Arc<dyn PatentSearch>)> = strategies
        .iter()
        .flat_map(|strategy| backends.iter().map(move |backend| (strategy, backend)))
        .collect();
    debug!(jobs = jobs.len(), mode = mode.as_str(), "discovery started");

    let budget = config.call_budget;
    let (results, deadline_exceeded) =
        run_until_deadline(jobs.len(), config.max_concurrency, deadline, |idx| {
            let (strategy, backend) = jobs[idx];
            async move {
                call_with_budget(backend.name(), budget, deadline, || {
                    backend.search(&strategy.query)
                })
                .await
            }
        })
        .await;

    let mut outcome = DiscoveryOutcome {
        strategies_run: jobs.len(),
        deadline_exceeded: deadline_exceeded || Instant::now() >= deadline,
        ..DiscoveryOutcome::default()
    };
    let mut found: BTreeMap<String, CandidateFiling> = BTreeMap::new();
    let mut per_strategy: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for ((strategy, backend), result) in jobs.iter().zip(results) {
        per_strategy.entry(strategy.label.clone()).or_default();
        let hits = match result {
            Some(Ok(hits)) => hits,
            Some(Err(err)) => {
                warn!(
                    source = backend.name(),
                    query = %strategy.query,
                    "discovery strategy failed: {err}"
                );
                outcome.strategies_failed += 1;
                outcome.warnings.push(PartialResultWarning::from_error(
                    Stage::Discovery,
                    backend.name(),
                    &strategy.query,
                    &err,
                ));
                continue;
            }
            None => {
                outcome.strategies_failed += 1;
                outcome.warnings.push(PartialResultWarning::deadline(
                    Stage::Discovery,
                    backend.name(),
                    &strategy.query,
                ));
                continue;
            }
        };

        for hit in hits {
            let text = hit.text();
            for wo in extract_wo_numbers(&text) {
                per_strategy
                    .entry(strategy.label.clone())
                    .or_default()
                    .insert(wo.id.clone());
                let entry = found.entry(wo.id.clone()).or_insert_with(|| CandidateFiling {
                    id: wo.id.clone(),
                    kind: None,
                    source: backend.name().to_string(),
                    strategies: BTreeSet::new(),
                    snippet: snippet(&format!("{} {}", hit.title, hit.snippet)),
                });
                if entry.kind.is_none() {
                    entry.kind = wo.kind;
                }
                entry.strategies.insert(strategy.label.clone());
            }
        }
    }

    if outcome.deadline_exceeded {
        warn!("discovery hit the request deadline; continuing with partial candidates");
    }

    outcome.per_strategy = per_strategy
        .into_iter()
        .map(|(label, ids)| (label, ids.len()))
        .collect();
    outcome.candidates_found = found.len();

    let mut candidates: Vec<CandidateFiling> = found.into_values().collect();
    candidates.sort_by(|a, b| {
        b.strategies
            .len()
            .cmp(&a.strategies.len())
            .then_with(|| a.id.cmp(&b.id))
    });
    candidates.truncate(config.max_candidates);
    outcome.candidates = candidates;

    info!(
        found = outcome.candidates_found,
        kept = outcome.candidates.len(),
        failed = outcome.strategies_failed,
        "discovery finished"
    );
    outcome
}
