//! Source clients and shared HTTP utilities for upstream chemistry and patent APIs.

use std::borrow::Cow;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use http_cache_reqwest::{
    CACacheManager, Cache, CacheMode, CacheOptions, HttpCache, HttpCacheOptions,
};
use reqwest::header::{CACHE_CONTROL, HeaderMap, HeaderValue};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use tracing::warn;

use crate::config::SourceConfig;
use crate::error::PharmyrusError;
use crate::pipeline::backends::Backends;

pub(crate) mod epo;
pub(crate) mod google_patents;
pub(crate) mod inpi;
pub(crate) mod keys;
pub(crate) mod pubchem;
pub(crate) mod rate_limit;
pub(crate) mod serpapi;

const ERROR_BODY_MAX_BYTES: usize = 2048;
pub(crate) const DEFAULT_MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

static HTTP_CLIENT: OnceLock<ClientWithMiddleware> = OnceLock::new();

tokio::task_local! {
    static NO_CACHE: bool;
}

pub(crate) async fn with_no_cache<R, F>(no_cache: bool, fut: F) -> R
where
    F: Future<Output = R>,
{
    NO_CACHE.scope(no_cache, fut).await
}

pub(crate) fn apply_cache_mode(req: RequestBuilder) -> RequestBuilder {
    // Mock servers reuse ports across runs; never serve them from disk.
    if cfg!(test) {
        return req.with_extension(CacheMode::NoStore);
    }
    match NO_CACHE.try_with(|v| *v) {
        Ok(true) => req.with_extension(CacheMode::NoStore),
        _ => req,
    }
}

pub(crate) fn apply_cache_mode_with_auth(
    req: RequestBuilder,
    authenticated: bool,
) -> RequestBuilder {
    if authenticated {
        return req.with_extension(CacheMode::NoStore);
    }
    apply_cache_mode(req)
}

pub(crate) fn env_base(default: &'static str, env_var: &str) -> Cow<'static, str> {
    std::env::var(env_var)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(Cow::Owned)
        .unwrap_or_else(|| Cow::Borrowed(default))
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Returns a shared HTTP client with caching and rate-limit middleware.
///
/// - Cache: Disk-based HTTP cache in XDG cache directory
/// - Cache TTL: `Cache-Control: max-stale=86400` keeps responses without caching
///   headers usable for 24h
/// - Retries are not done here; the pipeline's call budget owns them
pub(crate) fn shared_client() -> Result<ClientWithMiddleware, PharmyrusError> {
    if let Some(client) = HTTP_CLIENT.get() {
        return Ok(client.clone());
    }

    let mut default_headers = HeaderMap::new();
    default_headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-stale=86400"));

    let base_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!("pharmyrus/", env!("CARGO_PKG_VERSION")))
        .default_headers(default_headers)
        .build()
        .map_err(PharmyrusError::HttpClientInit)?;

    let cache_path = crate::utils::paths::pharmyrus_cache_dir().join("http-cacache");
    std::fs::create_dir_all(&cache_path)?;

    let cache_options = HttpCacheOptions {
        cache_options: Some(CacheOptions {
            // Shared-cache semantics: do not store private/authenticated responses.
            shared: true,
            ..CacheOptions::default()
        }),
        ..HttpCacheOptions::default()
    };

    let client = ClientBuilder::new(base_client)
        .with(Cache(HttpCache {
            mode: CacheMode::Default,
            manager: CACacheManager { path: cache_path },
            options: cache_options,
        }))
        .with(rate_limit::RateLimitMiddleware::new())
        .build();

    match HTTP_CLIENT.set(client.clone()) {
        Ok(()) => Ok(client),
        Err(_) => HTTP_CLIENT.get().cloned().ok_or_else(|| PharmyrusError::Api {
            api: "http-client".into(),
            message: "Shared HTTP client initialization race".into(),
        }),
    }
}

pub(crate) fn body_excerpt(bytes: &[u8]) -> String {
    let full = String::from_utf8_lossy(bytes);

    let truncated: &str = if full.len() > ERROR_BODY_MAX_BYTES {
        let mut end = ERROR_BODY_MAX_BYTES;
        while end > 0 && !full.is_char_boundary(end) {
            end -= 1;
        }
        &full[..end]
    } else {
        full.as_ref()
    };

    let mut s = truncated.trim().replace(['\n', '\r', '\t'], " ");
    if full.len() > ERROR_BODY_MAX_BYTES {
        s.push_str(" …");
    }
    s
}

pub(crate) fn ensure_json_content_type(
    api: &str,
    content_type: Option<&HeaderValue>,
    body: &[u8],
) -> Result<(), PharmyrusError> {
    let Some(content_type) = content_type else {
        return Ok(());
    };

    let raw = match content_type.to_str() {
        Ok(v) => v.trim(),
        Err(_) => {
            warn!(
                source = api,
                "Response content-type header was not valid UTF-8; attempting JSON parse"
            );
            return Ok(());
        }
    };
    if raw.is_empty() {
        return Ok(());
    }

    let media_type = raw
        .split(';')
        .next()
        .map(str::trim)
        .unwrap_or_default()
        .to_ascii_lowercase();
    let is_html = matches!(media_type.as_str(), "text/html" | "application/xhtml+xml");
    if is_html {
        return Err(PharmyrusError::Api {
            api: api.to_string(),
            message: format!(
                "Unexpected HTML response (content-type: {raw}): {}",
                body_excerpt(body)
            ),
        });
    }

    let is_json = media_type == "application/json"
        || media_type == "text/json"
        || media_type.ends_with("+json");
    if !is_json {
        warn!(
            source = api,
            content_type = raw,
            "Unexpected non-JSON content type; attempting JSON parse for compatibility"
        );
    }

    Ok(())
}

pub(crate) async fn read_limited_body(
    mut resp: reqwest::Response,
    api: &str,
) -> Result<Vec<u8>, PharmyrusError> {
    let mut body: Vec<u8> = Vec::new();

    while let Some(chunk) = resp.chunk().await? {
        let next_len = body.len().saturating_add(chunk.len());
        if next_len > DEFAULT_MAX_BODY_BYTES {
            return Err(PharmyrusError::Api {
                api: api.to_string(),
                message: format!("Response body exceeded {DEFAULT_MAX_BODY_BYTES} bytes"),
            });
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}

/// Sends `req` and returns the body of a successful response; non-2xx
/// statuses become `Api` errors carrying a body excerpt.
pub(crate) async fn send_for_body(
    req: RequestBuilder,
    api: &str,
) -> Result<Vec<u8>, PharmyrusError> {
    let resp = req.send().await?;
    let status = resp.status();
    let bytes = read_limited_body(resp, api).await?;
    if !status.is_success() {
        let excerpt = body_excerpt(&bytes);
        return Err(PharmyrusError::Api {
            api: api.to_string(),
            message: format!("HTTP {status}: {excerpt}"),
        });
    }
    Ok(bytes)
}

/// Wires the HTTP clients into a pipeline backend set.
///
/// SerpAPI is left out without API keys and EPO OPS without consumer
/// credentials; both omissions are logged.
pub fn build_backends(config: &SourceConfig) -> Result<Backends, PharmyrusError> {
    let google = Arc::new(google_patents::GooglePatentsClient::new(config)?);
    let mut backends = Backends::new(Arc::new(pubchem::PubChemClient::new(config)?));
    backends.patent_search.push(google.clone());
    backends.family_navigators.push(google.clone());
    backends.patent_index.push(google.clone());
    backends.filing_details = Some(google);
    backends
        .national_offices
        .push(Arc::new(inpi::InpiClient::new(config)?));

    match keys::RotatingKeys::new(config.serpapi_keys.clone()) {
        Some(keys) => {
            let serpapi = Arc::new(serpapi::SerpApiClient::new(config, Arc::new(keys))?);
            backends.patent_search.push(serpapi.clone());
            backends.web_search.push(serpapi);
        }
        None => warn!("SERPAPI_API_KEY not set; SerpAPI discovery and web search disabled"),
    }

    match &config.epo_credentials {
        Some((key, secret)) => backends.family_navigators.push(Arc::new(epo::EpoClient::new(
            config,
            key.clone(),
            secret.clone(),
        )?)),
        None => warn!("EPO_CONSUMER_KEY not set; EPO family navigation disabled"),
    }

    Ok(backends)
}
