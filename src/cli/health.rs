use std::sync::OnceLock;
use std::time::{Duration, Instant};

use crate::config::SourceConfig;
use crate::error::PharmyrusError;

#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthRow {
    pub api: String,
    pub status: String,
    pub latency: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthReport {
    pub healthy: usize,
    pub total: usize,
    pub rows: Vec<HealthRow>,
}

impl HealthReport {
    pub fn all_healthy(&self) -> bool {
        self.healthy == self.total
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str("# Pharmyrus Health Check\n\n");
        out.push_str("| API | Status | Latency |\n");
        out.push_str("|-----|--------|---------|\n");
        for row in &self.rows {
            out.push_str(&format!(
                "| {} | {} | {} |\n",
                row.api, row.status, row.latency
            ));
        }
        out.push_str(&format!(
            "\nStatus: {}/{} APIs healthy\n",
            self.healthy, self.total
        ));
        out
    }
}

/// How a marker judges an HTTP answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Success,
    /// Any non-5xx answer; for endpoints that reject unauthenticated calls.
    Reachable,
}

fn classify(api: &str, status: reqwest::StatusCode, elapsed: u128, expect: Expect) -> HealthRow {
    let ok = match expect {
        Expect::Success => status.is_success(),
        Expect::Reachable => !status.is_server_error(),
    };
    let latency = if status.is_success() {
        format!("{elapsed}ms")
    } else {
        format!("{elapsed}ms (HTTP {})", status.as_u16())
    };
    HealthRow {
        api: api.to_string(),
        status: if ok { "ok" } else { "error" }.into(),
        latency,
    }
}

async fn check_one(client: reqwest::Client, api: &str, url: &str, expect: Expect) -> HealthRow {
    let start = Instant::now();
    let resp = client.get(url).send().await;

    match resp {
        Ok(resp) => classify(api, resp.status(), start.elapsed().as_millis(), expect),
        Err(err) => {
            let reason = if err.is_timeout() {
                "timeout"
            } else if err.is_connect() {
                "connect"
            } else {
                "error"
            };
            HealthRow {
                api: api.to_string(),
                status: "error".into(),
                latency: reason.into(),
            }
        }
    }
}

fn health_http_client() -> Result<reqwest::Client, PharmyrusError> {
    static HEALTH_HTTP_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

    if let Some(client) = HEALTH_HTTP_CLIENT.get() {
        return Ok(client.clone());
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .connect_timeout(Duration::from_secs(5))
        .user_agent(concat!("pharmyrus/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(PharmyrusError::HttpClientInit)?;

    match HEALTH_HTTP_CLIENT.set(client.clone()) {
        Ok(()) => Ok(client),
        Err(_) => HEALTH_HTTP_CLIENT
            .get()
            .cloned()
            .ok_or_else(|| PharmyrusError::Api {
                api: "health".into(),
                message: "Health HTTP client initialization race".into(),
            }),
    }
}

async fn check_cache_dir() -> HealthRow {
    let start = Instant::now();
    let dir = crate::utils::paths::pharmyrus_cache_dir();
    let suffix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let marker = dir.join(format!(".pharmyrus-healthcheck-{suffix}.tmp"));

    let result = async {
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(&marker, b"ok").await?;
        match tokio::fs::remove_file(&marker).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
    .await;

    match result {
        Ok(()) => HealthRow {
            api: format!("Cache dir ({})", dir.display()),
            status: "ok".into(),
            latency: format!("{}ms", start.elapsed().as_millis()),
        },
        Err(err) => HealthRow {
            api: format!("Cache dir ({})", dir.display()),
            status: "error".into(),
            latency: format!("{:?}", err.kind()),
        },
    }
}

/// Runs connectivity checks for the configured upstream APIs and the local
/// cache directory.
///
/// SerpAPI and EPO OPS are checked without credentials, so any non-5xx
/// answer counts as reachable.
///
/// # Errors
///
/// Returns an error when the health HTTP client cannot be created.
pub async fn check(
    sources: &SourceConfig,
    apis_only: bool,
) -> Result<HealthReport, PharmyrusError> {
    let client = health_http_client()?;
    let join = crate::sources::join_url;
    let pubchem_url = join(&sources.pubchem_base, "compound/name/aspirin/cids/JSON");
    let google_url = join(&sources.google_patents_base, "patent/WO2011051540A1/en");
    let inpi_url = join(&sources.inpi_base, "patents?medicine=aspirin");
    let serpapi_url = join(&sources.serpapi_base, "search.json?engine=google&q=aspirin");
    let epo_url = join(
        &sources.epo_base,
        "rest-services/published-data/publication/epodoc/WO2011051540/biblio",
    );

    let (pubchem, google, inpi, serpapi, epo) = tokio::join!(
        check_one(client.clone(), "PubChem", &pubchem_url, Expect::Success),
        check_one(client.clone(), "Google Patents", &google_url, Expect::Success),
        check_one(client.clone(), "INPI", &inpi_url, Expect::Success),
        check_one(client.clone(), "SerpAPI", &serpapi_url, Expect::Reachable),
        check_one(client.clone(), "EPO OPS", &epo_url, Expect::Reachable),
    );

    let mut rows = vec![pubchem, google, inpi, serpapi, epo];
    if !apis_only {
        rows.push(check_cache_dir().await);
    }
    let healthy = rows.iter().filter(|r| r.status == "ok").count();
    Ok(HealthReport {
        healthy,
        total: rows.len(),
        rows,
    })
}
