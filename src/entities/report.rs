use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::SearchMode;
use crate::entities::molecule::MoleculeRecord;
use crate::entities::patent::NationalFiling;
use crate::error::PharmyrusError;

/// Pipeline stage a warning originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Discovery,
    Expansion,
    Enrichment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    Timeout,
    Unavailable,
    Error,
}

/// An optional source that failed or timed out. Never aborts the request.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartialResultWarning {
    pub stage: Stage,
    pub source: String,
    pub target: String,
    pub kind: WarningKind,
    pub message: String,
}

impl PartialResultWarning {
    pub fn from_error(stage: Stage, source: &str, target: &str, err: &PharmyrusError) -> Self {
        let kind = match err {
            PharmyrusError::UpstreamTimeout { .. } => WarningKind::Timeout,
            PharmyrusError::UpstreamUnavailable { .. }
            | PharmyrusError::Http(_)
            | PharmyrusError::HttpMiddleware(_) => WarningKind::Unavailable,
            _ => WarningKind::Error,
        };
        Self {
            stage,
            source: source.to_string(),
            target: target.to_string(),
            kind,
            message: err.to_string(),
        }
    }

    pub fn deadline(stage: Stage, source: &str, target: &str) -> Self {
        Self {
            stage,
            source: source.to_string(),
            target: target.to_string(),
            kind: WarningKind::Timeout,
            message: "abandoned at request deadline".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub partial: bool,
    pub deadline_exceeded: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<PartialResultWarning>,
}

impl Diagnostics {
    pub fn push(&mut self, warning: PartialResultWarning) {
        self.partial = true;
        self.warnings.push(warning);
    }

    pub fn failed_sources(&self) -> Vec<String> {
        let mut out: Vec<String> = self.warnings.iter().map(|w| w.source.clone()).collect();
        out.sort();
        out.dedup();
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryStats {
    pub candidates_found: usize,
    pub candidates_expanded: usize,
    pub candidate_ids: Vec<String>,
    pub strategies_run: usize,
    pub strategies_failed: usize,
    /// Candidates returned per strategy label.
    pub per_strategy: BTreeMap<String, usize>,
    /// Final filings attributed to each source kind.
    pub per_source: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineStatus {
    Excellent,
    Good,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineComparison {
    pub expected: usize,
    pub found: usize,
    pub match_rate_pct: u32,
    pub status: BaselineStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchReport {
    pub molecule: MoleculeRecord,
    pub jurisdictions: Vec<String>,
    pub search_mode: SearchMode,
    pub discovery: DiscoveryStats,
    pub filings: Vec<NationalFiling>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison: Option<BaselineComparison>,
    pub diagnostics: Diagnostics,
    pub elapsed_ms: u64,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_kind_follows_error_variant() {
        let timeout = PharmyrusError::UpstreamTimeout {
            api: "epo-ops".into(),
            timeout_ms: 10,
        };
        let w =
            PartialResultWarning::from_error(Stage::Expansion, "epo-ops", "WO2011051540", &timeout);
        assert_eq!(w.kind, WarningKind::Timeout);

        let api = PharmyrusError::Api {
            api: "inpi".into(),
            message: "HTTP 500".into(),
        };
        let w = PartialResultWarning::from_error(Stage::Expansion, "inpi", "WO2011051540", &api);
        assert_eq!(w.kind, WarningKind::Error);
        assert!(w.message.contains("HTTP 500"));
    }

    #[test]
    fn diagnostics_push_marks_partial_and_lists_sources_once() {
        let mut diagnostics = Diagnostics::default();
        assert!(!diagnostics.partial);
        diagnostics.push(PartialResultWarning::deadline(Stage::Discovery, "serpapi", "q1"));
        diagnostics.push(PartialResultWarning::deadline(Stage::Discovery, "serpapi", "q2"));
        diagnostics.push(PartialResultWarning::deadline(Stage::Expansion, "inpi", "WO1"));
        assert!(diagnostics.partial);
        assert_eq!(diagnostics.failed_sources(), vec!["inpi", "serpapi"]);
    }
}
