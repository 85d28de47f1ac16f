//! Expansion of candidates into national filings, plus the direct national
//! search by molecule terms.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::entities::molecule::MoleculeRecord;
use crate::entities::patent::{CandidateFiling, FilingSource, NationalFiling};
use crate::entities::report::{PartialResultWarning, Stage};
use crate::error::PharmyrusError;
use crate::pipeline::backends::{
    Backends, FamilyNavigator, NationalOffice, NationalRecord, WebSearch,
};
use crate::pipeline::budget::call_with_budget;
use crate::pipeline::fanout::run_until_deadline;
use crate::transform;
use crate::utils::patent_number::{extract_national_numbers, in_jurisdiction};

/// Development codes used by the direct national search.
const DIRECT_SEARCH_DEV_CODES: usize = 2;

enum Lookup<'a> {
    Office(&'a Arc<dyn NationalOffice>, String),
    Index(&'a Arc<dyn NationalOffice>, String),
    Family(&'a Arc<dyn FamilyNavigator>),
    Web(&'a Arc<dyn WebSearch>),
}

struct Job<'a> {
    lookup: Lookup<'a>,
    jurisdiction: &'a str,
    /// Candidate identifier, `None` for direct searches.
    parent: Option<&'a str>,
}

impl Job<'_> {
    fn source_name(&self) -> &'static str {
        match &self.lookup {
            Lookup::Office(office, _) | Lookup::Index(office, _) => office.name(),
            Lookup::Family(navigator) => navigator.name(),
            Lookup::Web(search) => search.name(),
        }
    }

    fn filing_source(&self) -> FilingSource {
        match self.lookup {
            Lookup::Office(..) => FilingSource::NationalOffice,
            Lookup::Index(..) => FilingSource::PatentIndex,
            Lookup::Family(_) => FilingSource::FamilyNavigation,
            Lookup::Web(_) => FilingSource::WebSearch,
        }
    }

    fn target(&self) -> String {
        match (&self.lookup, self.parent) {
            (Lookup::Office(_, query) | Lookup::Index(_, query), None) => {
                format!("{query} ({})", self.jurisdiction)
            }
            (_, Some(parent)) => format!("{parent} ({})", self.jurisdiction),
            (_, None) => self.jurisdiction.to_string(),
        }
    }

    async fn run(&self) -> Result<Vec<NationalRecord>, PharmyrusError> {
        let jurisdiction = self.jurisdiction;
        match &self.lookup {
            Lookup::Office(office, query) | Lookup::Index(office, query) => {
                office.search(query, jurisdiction).await
            }
            Lookup::Family(navigator) => {
                let parent = self.parent.unwrap_or_default();
                navigator.national_phase(parent, jurisdiction).await
            }
            Lookup::Web(search) => {
                let parent = self.parent.unwrap_or_default();
                let hits = search.search(&format!("{parent} {jurisdiction} patent")).await?;
                let mut records: Vec<NationalRecord> = Vec::new();
                for hit in hits {
                    for number in extract_national_numbers(&hit.text(), jurisdiction) {
                        if !records.iter().any(|r| r.publication_number == number) {
                            records.push(NationalRecord::bare(number));
                        }
                    }
                }
                Ok(records)
            }
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct ExpansionOutcome {
    /// Unmerged observations in job order.
    pub observations: Vec<NationalFiling>,
    pub jobs_run: usize,
    pub warnings: Vec<PartialResultWarning>,
    pub deadline_exceeded: bool,
}

impl ExpansionOutcome {
    pub fn absorb(&mut self, other: ExpansionOutcome) {
        self.observations.extend(other.observations);
        self.jobs_run += other.jobs_run;
        self.warnings.extend(other.warnings);
        self.deadline_exceeded |= other.deadline_exceeded;
    }
}

fn candidate_jobs<'a>(
    backends: &'a Backends,
    candidates: &'a [CandidateFiling],
    jurisdictions: &'a [String],
) -> Vec<Job<'a>> {
    let mut jobs = Vec::new();
    for candidate in candidates {
        for jurisdiction in jurisdictions {
            let jurisdiction = jurisdiction.as_str();
            let parent = Some(candidate.id.as_str());
            for office in backends.national_offices.iter().filter(|o| o.supports(jurisdiction)) {
                jobs.push(Job {
                    lookup: Lookup::Office(office, candidate.id.clone()),
                    jurisdiction,
                    parent,
                });
            }
            for navigator in &backends.family_navigators {
                jobs.push(Job {
                    lookup: Lookup::Family(navigator),
                    jurisdiction,
                    parent,
                });
            }
            for search in &backends.web_search {
                jobs.push(Job {
                    lookup: Lookup::Web(search),
                    jurisdiction,
                    parent,
                });
            }
        }
    }
    jobs
}

fn direct_jobs<'a>(
    backends: &'a Backends,
    molecule: &MoleculeRecord,
    jurisdictions: &'a [String],
) -> Vec<Job<'a>> {
    let terms = molecule.direct_search_terms(DIRECT_SEARCH_DEV_CODES);
    let mut jobs = Vec::new();
    for jurisdiction in jurisdictions {
        let jurisdiction = jurisdiction.as_str();
        for office in backends.national_offices.iter().filter(|o| o.supports(jurisdiction)) {
            for term in &terms {
                jobs.push(Job {
                    lookup: Lookup::Office(office, term.clone()),
                    jurisdiction,
                    parent: None,
                });
            }
        }
        for index in backends.patent_index.iter().filter(|i| i.supports(jurisdiction)) {
            for term in &terms {
                jobs.push(Job {
                    lookup: Lookup::Index(index, term.clone()),
                    jurisdiction,
                    parent: None,
                });
            }
        }
    }
    jobs
}

async fn run_jobs(
    jobs: Vec<Job<'_>>,
    config: &PipelineConfig,
    deadline: Instant,
) -> ExpansionOutcome {
    let budget = config.call_budget;
    let (results, deadline_exceeded) =
        run_until_deadline(jobs.len(), config.max_concurrency, deadline, |idx| {
            let job = &jobs[idx];
            async move { call_with_budget(job.source_name(), budget, deadline, || job.run()).await }
        })
        .await;

    let mut outcome = ExpansionOutcome {
        jobs_run: jobs.len(),
        deadline_exceeded: deadline_exceeded || Instant::now() >= deadline,
        ..ExpansionOutcome::default()
    };

    for (job, result) in jobs.iter().zip(results) {
        match result {
            Some(Ok(records)) => {
                for record in records {
                    if !in_jurisdiction(&record.publication_number, job.jurisdiction) {
                        debug!(
                            source = job.source_name(),
                            number = %record.publication_number,
                            "dropping filing outside {}",
                            job.jurisdiction
                        );
                        continue;
                    }
                    if let Some(filing) = transform::patent::from_record(
                        record,
                        job.jurisdiction,
                        job.filing_source(),
                        job.parent,
                    ) {
                        outcome.observations.push(filing);
                    }
                }
            }
            Some(Err(err)) => {
                warn!(
                    source = job.source_name(),
                    target = %job.target(),
                    "expansion lookup failed: {err}"
                );
                outcome.warnings.push(PartialResultWarning::from_error(
                    Stage::Expansion,
                    job.source_name(),
                    &job.target(),
                    &err,
                ));
            }
            None => outcome.warnings.push(PartialResultWarning::deadline(
                Stage::Expansion,
                job.source_name(),
                &job.target(),
            )),
        }
    }
    outcome
}

/// Expands every candidate into each jurisdiction through every applicable source.
pub(crate) async fn expand_candidates(
    backends: &Backends,
    candidates: &[CandidateFiling],
    jurisdictions: &[String],
    config: &PipelineConfig,
    deadline: Instant,
) -> ExpansionOutcome {
    let jobs = candidate_jobs(backends, candidates, jurisdictions);
    debug!(jobs = jobs.len(), candidates = candidates.len(), "expansion started");
    run_jobs(jobs, config, deadline).await
}

/// Searches national offices and patent indexes directly by molecule name,
/// brands and leading development codes. Filings found this way have no parent candidate.
pub(crate) async fn direct_national_search(
    backends: &Backends,
    molecule: &MoleculeRecord,
    jurisdictions: &[String],
    config: &PipelineConfig,
    deadline: Instant,
) -> ExpansionOutcome {
    let jobs = direct_jobs(backends, molecule, jurisdictions);
    debug!(jobs = jobs.len(), "direct national search started");
    run_jobs(jobs, config, deadline).await
}
