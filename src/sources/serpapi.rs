use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::SourceConfig;
use crate::error::PharmyrusError;
use crate::pipeline::backends::{PatentSearch, RawHit, WebSearch};
use crate::sources::keys::KeyProvider;

const SERPAPI_API: &str = "serpapi";
const RESULTS_PER_QUERY: &str = "10";

/// Google web search through SerpAPI. Serves both candidate discovery and
/// the web fallback of family expansion.
pub struct SerpApiClient {
    client: reqwest_middleware::ClientWithMiddleware,
    base: Cow<'static, str>,
    keys: Arc<dyn KeyProvider>,
}

impl SerpApiClient {
    pub(crate) fn new(
        config: &SourceConfig,
        keys: Arc<dyn KeyProvider>,
    ) -> Result<Self, PharmyrusError> {
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: config.serpapi_base.clone(),
            keys,
        })
    }

    #[cfg(test)]
    fn new_for_test(base: String, keys: Arc<dyn KeyProvider>) -> Result<Self, PharmyrusError> {
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: Cow::Owned(base),
            keys,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        crate::sources::join_url(&self.base, path)
    }

    /// The key travels in the query string, so responses never reach the disk cache.
    fn search_request(&self, query: &str) -> reqwest_middleware::RequestBuilder {
        let url = self.endpoint("search.json");
        let req = self.client.get(&url).query(&[
            ("engine", "google"),
            ("q", query),
            ("api_key", self.keys.next()),
            ("num", RESULTS_PER_QUERY),
        ]);
        crate::sources::apply_cache_mode_with_auth(req, true)
    }

    async fn google(&self, query: &str) -> Result<Vec<RawHit>, PharmyrusError> {
        let resp = self.search_request(query).send().await?;
        let status = resp.status();
        let content_type = resp.headers().get(reqwest::header::CONTENT_TYPE).cloned();
        let bytes = crate::sources::read_limited_body(resp, SERPAPI_API).await?;
        if !status.is_success() {
            let excerpt = crate::sources::body_excerpt(&bytes);
            return Err(PharmyrusError::Api {
                api: SERPAPI_API.to_string(),
                message: format!("HTTP {status}: {excerpt}"),
            });
        }
        crate::sources::ensure_json_content_type(SERPAPI_API, content_type.as_ref(), &bytes)?;
        let body: SearchResponse =
            serde_json::from_slice(&bytes).map_err(|source| PharmyrusError::ApiJson {
                api: SERPAPI_API.to_string(),
                source,
            })?;
        body.into_hits()
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    error: Option<String>,
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
    #[serde(default)]
    related_searches: Vec<RelatedSearch>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
    link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RelatedSearch {
    query: Option<String>,
}

impl SearchResponse {
    fn into_hits(self) -> Result<Vec<RawHit>, PharmyrusError> {
        if let Some(error) = self.error {
            // An empty result page is reported through the error field.
            if error.contains("hasn't returned any results") {
                return Ok(Vec::new());
            }
            return Err(PharmyrusError::Api {
                api: SERPAPI_API.to_string(),
                message: error,
            });
        }

        let mut hits: Vec<RawHit> = self
            .organic_results
            .into_iter()
            .map(|r| RawHit {
                title: r.title,
                snippet: r.snippet,
                link: r.link,
            })
            .collect();
        hits.extend(
            self.related_searches
                .into_iter()
                .filter_map(|r| r.query)
                .map(|query| RawHit {
                    title: query,
                    ..RawHit::default()
                }),
        );
        Ok(hits)
    }
}

#[async_trait]
impl PatentSearch for SerpApiClient {
    fn name(&self) -> &'static str {
        SERPAPI_API
    }

    async fn search(&self, query: &str) -> Result<Vec<RawHit>, PharmyrusError> {
        self.google(query).await
    }
}

#[async_trait]
impl WebSearch for SerpApiClient {
    fn name(&self) -> &'static str {
        SERPAPI_API
    }

    async fn search(&self, query: &str) -> Result<Vec<RawHit>, PharmyrusError> {
        self.google(query).await
    }
}

#[cfg(test)]
mod tests {
    use http_cache_reqwest::CacheMode;

    use super::*;
    use crate::sources::keys::RotatingKeys;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn keys(list: &[&str]) -> Arc<dyn KeyProvider> {
        Arc::new(RotatingKeys::new(list.iter().map(|k| k.to_string()).collect()).unwrap())
    }

    #[tokio::test]
    async fn search_maps_organic_and_related_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search.json"))
            .and(query_param("engine", "google"))
            .and(query_param("q", "darolutamide patent"))
            .and(query_param("api_key", "k1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "organic_results": [{
                    "title": "WO2011051540A1 - Androgen receptor modulating compounds",
                    "snippet": "Orion Corporation ...",
                    "link": "https://patents.google.com/patent/WO2011051540A1/en"
                }],
                "related_searches": [{"query": "darolutamide patent WO2016162604"}]
            })))
            .mount(&server)
            .await;

        let client = SerpApiClient::new_for_test(server.uri(), keys(&["k1"])).unwrap();
        let hits = PatentSearch::search(&client, "darolutamide patent").await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].text().contains("WO2011051540A1"));
        assert_eq!(hits[1].title, "darolutamide patent WO2016162604");
        assert!(hits[1].link.is_none());
    }

    #[tokio::test]
    async fn keys_rotate_between_requests() {
        let server = MockServer::start().await;
        for key in ["k1", "k2"] {
            Mock::given(method("GET"))
                .and(path("/search.json"))
                .and(query_param("api_key", key))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "organic_results": []
                })))
                .expect(1)
                .mount(&server)
                .await;
        }

        let client = SerpApiClient::new_for_test(server.uri(), keys(&["k1", "k2"])).unwrap();
        WebSearch::search(&client, "WO2011051540 BR patent").await.unwrap();
        WebSearch::search(&client, "WO2011051540 BR patent").await.unwrap();
    }

    #[tokio::test]
    async fn empty_result_page_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": "Google hasn't returned any results for this query."
            })))
            .mount(&server)
            .await;

        let client = SerpApiClient::new_for_test(server.uri(), keys(&["k1"])).unwrap();
        assert!(WebSearch::search(&client, "nothing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_key_is_an_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search.json"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": "Invalid API key."
            })))
            .mount(&server)
            .await;

        let client = SerpApiClient::new_for_test(server.uri(), keys(&["bad"])).unwrap();
        let err = PatentSearch::search(&client, "olaparib patent").await.unwrap_err();
        assert!(err.to_string().contains("Invalid API key"));
        assert!(err.is_upstream());
    }

    #[tokio::test]
    async fn keyed_requests_bypass_disk_cache() {
        let client =
            SerpApiClient::new_for_test("http://127.0.0.1:9".into(), keys(&["secret"])).unwrap();
        let mut req = client.search_request("olaparib patent");
        assert!(matches!(
            req.extensions().get::<CacheMode>(),
            Some(CacheMode::NoStore)
        ));
    }
}
