//! Report assembly: ordering, statistics and baseline comparison.

use std::collections::BTreeMap;

use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::config::GOOGLE_PATENTS_BASE;
use crate::entities::patent::{FilingSource, NationalFiling};
use crate::entities::report::{BaselineComparison, BaselineStatus, DiscoveryStats, SearchReport};
use crate::pipeline::SearchRun;
use crate::utils::patent_number::google_patents_link;

/// A reference molecule with its expected national filing count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KnownMolecule {
    pub name: &'static str,
    pub brand: &'static str,
    pub expected_filings: usize,
}

pub const KNOWN_MOLECULES: [KnownMolecule; 3] = [
    KnownMolecule {
        name: "darolutamide",
        brand: "Nubeqa",
        expected_filings: 8,
    },
    KnownMolecule {
        name: "olaparib",
        brand: "Lynparza",
        expected_filings: 12,
    },
    KnownMolecule {
        name: "niraparib",
        brand: "Zejula",
        expected_filings: 10,
    },
];

/// Looks up a molecule by INN or brand name, case-insensitively.
pub fn known_molecule(name: &str) -> Option<&'static KnownMolecule> {
    let name = name.trim();
    KNOWN_MOLECULES
        .iter()
        .find(|m| m.name.eq_ignore_ascii_case(name) || m.brand.eq_ignore_ascii_case(name))
}

pub(crate) fn compare_baseline(expected: usize, found: usize) -> Option<BaselineComparison> {
    if expected == 0 {
        return None;
    }
    let rate = (found.saturating_mul(100) / expected).min(100);
    let status = if found >= expected {
        BaselineStatus::Excellent
    } else if found.saturating_mul(2) >= expected {
        BaselineStatus::Good
    } else {
        BaselineStatus::Low
    };
    Some(BaselineComparison {
        expected,
        found,
        match_rate_pct: u32::try_from(rate).unwrap_or(100),
        status,
    })
}

/// Sets the baseline comparison of `report` from an explicit expectation or
/// the known-molecule table.
pub(crate) fn apply_baseline(report: &mut SearchReport, expected: Option<usize>) {
    let expected = expected.or_else(|| {
        known_molecule(&report.molecule.name)
            .or_else(|| report.molecule.brand_names.iter().find_map(|b| known_molecule(b)))
            .map(|m| m.expected_filings)
    });
    report.comparison = expected.and_then(|e| compare_baseline(e, report.filings.len()));
}

/// Orders filings by score descending, then publication number ascending.
pub(crate) fn sort_filings(filings: &mut [NationalFiling]) {
    filings.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.publication_number.cmp(&b.publication_number))
    });
}

fn per_source(filings: &[NationalFiling]) -> BTreeMap<String, usize> {
    FilingSource::ALL
        .iter()
        .map(|source| {
            let count = filings.iter().filter(|f| f.sources.contains(source)).count();
            (source.as_str().to_string(), count)
        })
        .collect()
}

pub(crate) fn timestamp_now() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

/// Builds the response from a finished run. Pure apart from the clock.
pub(crate) fn aggregate(run: SearchRun) -> SearchReport {
    let SearchRun {
        molecule,
        jurisdictions,
        mode,
        started,
        discovery,
        mut filings,
        diagnostics,
    } = run;

    sort_filings(&mut filings);
    for filing in filings.iter_mut().filter(|f| f.link.is_none()) {
        filing.link = Some(google_patents_link(
            GOOGLE_PATENTS_BASE,
            &filing.publication_number,
        ));
    }
    let stats = DiscoveryStats {
        candidates_found: discovery.candidates_found,
        candidates_expanded: discovery.candidates.len(),
        candidate_ids: discovery.candidates.iter().map(|c| c.id.clone()).collect(),
        strategies_run: discovery.strategies_run,
        strategies_failed: discovery.strategies_failed,
        per_strategy: discovery.per_strategy,
        per_source: per_source(&filings),
    };

    SearchReport {
        molecule,
        jurisdictions,
        search_mode: mode,
        discovery: stats,
        filings,
        comparison: None,
        diagnostics,
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        timestamp: timestamp_now(),
    }
}
