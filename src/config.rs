//! Explicit runtime configuration, resolved once from the environment and handed to
//! the pipeline and source clients at construction time.

use std::borrow::Cow;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PharmyrusError;
use crate::pipeline::classify::ScoringPolicy;
use crate::sources::env_base;

pub(crate) const PUBCHEM_BASE: &str = "https://pubchem.ncbi.nlm.nih.gov/rest/pug";
pub(crate) const GOOGLE_PATENTS_BASE: &str = "https://patents.google.com";
pub(crate) const SERPAPI_BASE: &str = "https://serpapi.com";
pub(crate) const INPI_BASE: &str = "https://crawler3-production.up.railway.app/api/data/inpi";
pub(crate) const EPO_BASE: &str = "https://ops.epo.org/3.2";

const DEFAULT_PORT: u16 = 8000;

/// How much of the discovery strategy space a request explores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// One strategy (molecule name) against the first patent-search backend.
    #[serde(alias = "quick")]
    Fast,
    /// Every strategy against every backend.
    #[default]
    #[serde(alias = "standard")]
    Comprehensive,
}

impl SearchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Comprehensive => "comprehensive",
        }
    }
}

impl FromStr for SearchMode {
    type Err = PharmyrusError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fast" | "quick" => Ok(Self::Fast),
            "comprehensive" | "standard" => Ok(Self::Comprehensive),
            other => Err(PharmyrusError::InvalidArgument(format!(
                "Unknown search mode '{other}'. Expected one of: fast, comprehensive"
            ))),
        }
    }
}

/// Per-call latency budget: every attempt is bounded by `timeout`, and at most
/// `attempts` attempts are made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallBudget {
    pub timeout: Duration,
    pub attempts: u32,
}

impl CallBudget {
    pub fn new(timeout: Duration, attempts: u32) -> Self {
        Self {
            timeout,
            attempts: attempts.max(1),
        }
    }

    /// Upper bound on the time spent by one budgeted call, backoff excluded.
    pub fn worst_case(&self) -> Duration {
        self.timeout.saturating_mul(self.attempts)
    }
}

impl Default for CallBudget {
    fn default() -> Self {
        Self::new(Duration::from_secs(15), 3)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub call_budget: CallBudget,
    pub request_timeout: Duration,
    pub max_concurrency: usize,
    pub max_candidates: usize,
    pub max_dev_code_strategies: usize,
    /// Inclusive year window used by the year-scoped discovery strategies.
    pub discovery_years: (i32, i32),
    pub cache_ttl: Duration,
    pub scoring: ScoringPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let current_year = time::OffsetDateTime::now_utc().year();
        Self {
            call_budget: CallBudget::default(),
            request_timeout: Duration::from_secs(120),
            max_concurrency: 16,
            max_candidates: 10,
            max_dev_code_strategies: 5,
            discovery_years: (current_year - 4, current_year),
            cache_ttl: Duration::from_secs(3600),
            scoring: ScoringPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub pubchem_base: Cow<'static, str>,
    pub google_patents_base: Cow<'static, str>,
    pub serpapi_base: Cow<'static, str>,
    pub serpapi_keys: Vec<String>,
    pub inpi_base: Cow<'static, str>,
    pub epo_base: Cow<'static, str>,
    pub epo_credentials: Option<(String, String)>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            pubchem_base: Cow::Borrowed(PUBCHEM_BASE),
            google_patents_base: Cow::Borrowed(GOOGLE_PATENTS_BASE),
            serpapi_base: Cow::Borrowed(SERPAPI_BASE),
            serpapi_keys: Vec::new(),
            inpi_base: Cow::Borrowed(INPI_BASE),
            epo_base: Cow::Borrowed(EPO_BASE),
            epo_credentials: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PharmyrusConfig {
    pub pipeline: PipelineConfig,
    pub sources: SourceConfig,
    pub port: u16,
}

impl PharmyrusConfig {
    pub fn from_env() -> Result<Self, PharmyrusError> {
        let defaults = PipelineConfig::default();
        let call_timeout = env_parse("PHARMYRUS_CALL_TIMEOUT_SECS", 15_u64)?;
        let attempts = env_parse("PHARMYRUS_CALL_ATTEMPTS", 3_u32)?;
        let request_timeout = env_parse("PHARMYRUS_REQUEST_TIMEOUT_SECS", 120_u64)?;
        let max_concurrency = env_parse("PHARMYRUS_MAX_CONCURRENCY", 16_usize)?;
        let max_candidates = env_parse("PHARMYRUS_MAX_CANDIDATES", 10_usize)?;
        let cache_ttl = env_parse("PHARMYRUS_CACHE_TTL_SECS", 3600_u64)?;
        if max_concurrency == 0 {
            return Err(PharmyrusError::InvalidArgument(
                "PHARMYRUS_MAX_CONCURRENCY must be at least 1".into(),
            ));
        }

        let pipeline = PipelineConfig {
            call_budget: CallBudget::new(Duration::from_secs(call_timeout), attempts),
            request_timeout: Duration::from_secs(request_timeout),
            max_concurrency,
            max_candidates,
            cache_ttl: Duration::from_secs(cache_ttl),
            ..defaults
        };

        let sources = SourceConfig {
            pubchem_base: env_base(PUBCHEM_BASE, "PHARMYRUS_PUBCHEM_BASE"),
            google_patents_base: env_base(GOOGLE_PATENTS_BASE, "PHARMYRUS_GOOGLE_PATENTS_BASE"),
            serpapi_base: env_base(SERPAPI_BASE, "PHARMYRUS_SERPAPI_BASE"),
            serpapi_keys: serpapi_keys_from_env(),
            inpi_base: env_base(INPI_BASE, "PHARMYRUS_INPI_BASE"),
            epo_base: env_base(EPO_BASE, "PHARMYRUS_EPO_BASE"),
            epo_credentials: match (env_value("EPO_CONSUMER_KEY"), env_value("EPO_CONSUMER_SECRET"))
            {
                (Some(key), Some(secret)) => Some((key, secret)),
                _ => None,
            },
        };

        Ok(Self {
            pipeline,
            sources,
            port: env_parse("PORT", DEFAULT_PORT)?,
        })
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_parse<T: FromStr>(name: &str, default: T) -> Result<T, PharmyrusError> {
    match env_value(name) {
        Some(raw) => raw.parse::<T>().map_err(|_| {
            PharmyrusError::InvalidArgument(format!("{name} has an invalid value: {raw}"))
        }),
        None => Ok(default),
    }
}

fn serpapi_keys_from_env() -> Vec<String> {
    let raw = env_value("SERPAPI_API_KEYS").or_else(|| env_value("SERPAPI_API_KEY"));
    split_keys(raw.as_deref().unwrap_or_default())
}

fn split_keys(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for key in raw.split(',').map(str::trim).filter(|k| !k.is_empty()) {
        if !out.iter().any(|existing| existing == key) {
            out.push(key.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_mode_parses_aliases() {
        assert_eq!("fast".parse::<SearchMode>().unwrap(), SearchMode::Fast);
        assert_eq!("Quick".parse::<SearchMode>().unwrap(), SearchMode::Fast);
        assert_eq!(
            " comprehensive ".parse::<SearchMode>().unwrap(),
            SearchMode::Comprehensive
        );
        let err = "exhaustive".parse::<SearchMode>().unwrap_err();
        assert!(matches!(err, PharmyrusError::InvalidArgument(_)));
    }

    #[test]
    fn search_mode_deserializes_legacy_names() {
        let mode: SearchMode = serde_json::from_str("\"quick\"").unwrap();
        assert_eq!(mode, SearchMode::Fast);
        let mode: SearchMode = serde_json::from_str("\"standard\"").unwrap();
        assert_eq!(mode, SearchMode::Comprehensive);
    }

    #[test]
    fn call_budget_never_drops_below_one_attempt() {
        let budget = CallBudget::new(Duration::from_millis(50), 0);
        assert_eq!(budget.attempts, 1);
        assert_eq!(budget.worst_case(), Duration::from_millis(50));
        assert_eq!(CallBudget::default().worst_case(), Duration::from_secs(45));
    }

    #[test]
    fn split_keys_trims_and_dedupes() {
        assert_eq!(split_keys(" a, b ,,a,c"), vec!["a", "b", "c"]);
        assert!(split_keys("").is_empty());
    }

    #[test]
    fn default_year_window_spans_five_years() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.discovery_years.1 - cfg.discovery_years.0, 4);
    }
}
