use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::entities::patent::{FilingSource, NationalFiling};
use crate::entities::report::{PartialResultWarning, Stage};
use crate::pipeline::backends::FilingDetails;
use crate::pipeline::budget::call_with_budget;
use crate::pipeline::dedup::fill_details;
use crate::pipeline::fanout::run_until_deadline;
use crate::transform;

/// Titles shorter than this are treated as placeholders.
const MIN_TITLE_CHARS: usize = 20;

#[derive(Debug, Default)]
pub(crate) struct EnrichmentOutcome {
    pub enriched: usize,
    pub warnings: Vec<PartialResultWarning>,
    pub deadline_exceeded: bool,
}

fn needs_details(filing: &NationalFiling) -> bool {
    filing
        .title
        .as_deref()
        .is_none_or(|title| title.chars().count() < MIN_TITLE_CHARS)
}

/// Fills sparse filings from a detail lookup. Failures leave the filing as is.
pub(crate) async fn enrich(
    details: Option<&dyn FilingDetails>,
    filings: &mut [NationalFiling],
    config: &PipelineConfig,
    deadline: Instant,
) -> EnrichmentOutcome {
    let Some(details) = details else {
        return EnrichmentOutcome::default();
    };
    let targets: Vec<(usize, String)> = filings
        .iter()
        .enumerate()
        .filter(|(_, f)| needs_details(f))
        .map(|(idx, f)| (idx, f.publication_number.clone()))
        .collect();
    if targets.is_empty() {
        return EnrichmentOutcome::default();
    }
    debug!(source = details.name(), filings = targets.len(), "enrichment started");

    let budget = config.call_budget;
    let (results, deadline_exceeded) =
        run_until_deadline(targets.len(), config.max_concurrency, deadline, |idx| {
            let number = targets[idx].1.as_str();
            async move {
                call_with_budget(details.name(), budget, deadline, || details.details(number)).await
            }
        })
        .await;

    let mut outcome = EnrichmentOutcome {
        deadline_exceeded: deadline_exceeded || Instant::now() >= deadline,
        ..EnrichmentOutcome::default()
    };
    for ((idx, number), result) in targets.iter().zip(results) {
        match result {
            Some(Ok(Some(record))) => {
                let filing = &mut filings[*idx];
                // The detail record is not a discovery source; the tag is discarded.
                if let Some(found) = transform::patent::from_record(
                    record,
                    &filing.jurisdiction,
                    FilingSource::WebSearch,
                    None,
                ) {
                    fill_details(filing, found);
                    outcome.enriched += 1;
                }
            }
            Some(Ok(None)) => {}
            Some(Err(err)) => {
                warn!(source = details.name(), number = %number, "enrichment failed: {err}");
                outcome.warnings.push(PartialResultWarning::from_error(
                    Stage::Enrichment,
                    details.name(),
                    number,
                    &err,
                ));
            }
            None => outcome.warnings.push(PartialResultWarning::deadline(
                Stage::Enrichment,
                details.name(),
                number,
            )),
        }
    }
    outcome
}
