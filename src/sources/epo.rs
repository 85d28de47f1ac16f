use std::borrow::Cow;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde::de::{DeserializeOwned, Deserializer};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::config::SourceConfig;
use crate::error::PharmyrusError;
use crate::pipeline::backends::{FamilyNavigator, NationalRecord};
use crate::utils::patent_number;

const EPO_API: &str = "epo-ops";
const DEFAULT_TOKEN_TTL_SECS: u64 = 1200;
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// EPO Open Patent Services: OAuth client-credentials plus INPADOC family
/// lookups.
pub struct EpoClient {
    client: reqwest_middleware::ClientWithMiddleware,
    base: Cow<'static, str>,
    consumer_key: String,
    consumer_secret: String,
    token: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

impl EpoClient {
    pub fn new(
        config: &SourceConfig,
        consumer_key: String,
        consumer_secret: String,
    ) -> Result<Self, PharmyrusError> {
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: config.epo_base.clone(),
            consumer_key,
            consumer_secret,
            token: Mutex::new(None),
        })
    }

    #[cfg(test)]
    fn new_for_test(base: String) -> Result<Self, PharmyrusError> {
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: Cow::Owned(base),
            consumer_key: "test-key".into(),
            consumer_secret: "test-secret".into(),
            token: Mutex::new(None),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        crate::sources::join_url(&self.base, path)
    }

    /// Returns a bearer token, reusing the cached one until shortly before
    /// it expires.
    async fn access_token(&self) -> Result<String, PharmyrusError> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref()
            && Instant::now() < token.refresh_at
        {
            return Ok(token.value.clone());
        }

        let req = self
            .client
            .post(self.endpoint("auth/accesstoken"))
            .basic_auth(&self.consumer_key, Some(&self.consumer_secret))
            .form(&[("grant_type", "client_credentials")]);
        let bytes = crate::sources::send_for_body(
            crate::sources::apply_cache_mode_with_auth(req, true),
            EPO_API,
        )
        .await?;
        let resp: TokenResponse = parse_json(&bytes)?;

        let ttl = resp.ttl_secs().unwrap_or(DEFAULT_TOKEN_TTL_SECS);
        let lifetime = Duration::from_secs(ttl).saturating_sub(TOKEN_REFRESH_MARGIN);
        debug!(ttl_secs = ttl, "obtained EPO OPS access token");
        *guard = Some(CachedToken {
            value: resp.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(resp.access_token)
    }

    /// INPADOC family members of a publication; `Ok(None)` when OPS has no
    /// such document.
    pub async fn family(
        &self,
        publication: &str,
    ) -> Result<Option<Vec<FamilyMember>>, PharmyrusError> {
        let token = self.access_token().await?;
        let url = self.endpoint(&format!(
            "rest-services/family/publication/epodoc/{}/biblio",
            patent_number::normalize_key(publication)
        ));
        let req = self
            .client
            .get(&url)
            .bearer_auth(token)
            .header(ACCEPT, "application/json");
        let resp = crate::sources::apply_cache_mode_with_auth(req, true)
            .send()
            .await?;
        let status = resp.status();
        let bytes = crate::sources::read_limited_body(resp, EPO_API).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let excerpt = crate::sources::body_excerpt(&bytes);
            return Err(PharmyrusError::Api {
                api: EPO_API.to_string(),
                message: format!("HTTP {status}: {excerpt}"),
            });
        }
        let envelope: FamilyEnvelope = parse_json(&bytes)?;
        Ok(Some(
            envelope
                .world_patent_data
                .patent_family
                .map(|f| f.members)
                .unwrap_or_default(),
        ))
    }
}

fn parse_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, PharmyrusError> {
    serde_json::from_slice(bytes).map_err(|source| PharmyrusError::ApiJson {
        api: EPO_API.to_string(),
        source,
    })
}

/// OPS renders single-element lists as bare objects.
fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        Many(Vec<T>),
        One(T),
    }

    Ok(match Option::<OneOrMany<T>>::deserialize(deserializer)? {
        Some(OneOrMany::Many(v)) => v,
        Some(OneOrMany::One(v)) => vec![v],
        None => Vec::new(),
    })
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<serde_json::Value>,
}

impl TokenResponse {
    fn ttl_secs(&self) -> Option<u64> {
        match self.expires_in.as_ref()? {
            serde_json::Value::String(s) => s.trim().parse().ok(),
            serde_json::Value::Number(n) => n.as_u64(),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FamilyEnvelope {
    #[serde(rename = "ops:world-patent-data")]
    world_patent_data: WorldPatentData,
}

#[derive(Debug, Deserialize)]
struct WorldPatentData {
    #[serde(rename = "ops:patent-family")]
    patent_family: Option<PatentFamily>,
}

#[derive(Debug, Deserialize)]
struct PatentFamily {
    #[serde(rename = "ops:family-member", default, deserialize_with = "one_or_many")]
    members: Vec<FamilyMember>,
}

#[derive(Debug, Deserialize)]
pub struct FamilyMember {
    #[serde(rename = "publication-reference")]
    publication: Option<DocumentReference>,
    #[serde(rename = "application-reference")]
    application: Option<DocumentReference>,
    #[serde(rename = "exchange-document", default, deserialize_with = "one_or_many")]
    exchange: Vec<ExchangeDocument>,
}

#[derive(Debug, Deserialize)]
struct DocumentReference {
    #[serde(rename = "document-id", default, deserialize_with = "one_or_many")]
    ids: Vec<DocumentId>,
}

#[derive(Debug, Deserialize)]
struct DocumentId {
    #[serde(rename = "@document-id-type")]
    id_type: Option<String>,
    country: Option<Text>,
    #[serde(rename = "doc-number")]
    number: Option<Text>,
    kind: Option<Text>,
    date: Option<Text>,
}

#[derive(Debug, Deserialize)]
struct Text {
    #[serde(rename = "$")]
    value: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeDocument {
    #[serde(rename = "bibliographic-data")]
    bibliographic: Option<BibliographicData>,
}

#[derive(Debug, Deserialize)]
struct BibliographicData {
    #[serde(rename = "invention-title", default, deserialize_with = "one_or_many")]
    titles: Vec<InventionTitle>,
    #[serde(rename = "priority-claims")]
    priority_claims: Option<PriorityClaims>,
}

#[derive(Debug, Deserialize)]
struct InventionTitle {
    #[serde(rename = "@lang")]
    lang: Option<String>,
    #[serde(rename = "$")]
    value: String,
}

#[derive(Debug, Deserialize)]
struct PriorityClaims {
    #[serde(rename = "priority-claim", default, deserialize_with = "one_or_many")]
    claims: Vec<PriorityClaim>,
}

#[derive(Debug, Deserialize)]
struct PriorityClaim {
    #[serde(rename = "document-id", default, deserialize_with = "one_or_many")]
    ids: Vec<DocumentId>,
}

fn docdb(ids: &[DocumentId]) -> Option<&DocumentId> {
    ids.iter()
        .find(|id| id.id_type.as_deref() == Some("docdb"))
        .or_else(|| ids.first())
}

fn iso_date(raw: &str) -> String {
    let raw = raw.trim();
    if raw.len() == 8 && raw.bytes().all(|b| b.is_ascii_digit()) {
        format!("{}-{}-{}", &raw[..4], &raw[4..6], &raw[6..])
    } else {
        raw.to_string()
    }
}

impl FamilyMember {
    fn into_record(self, jurisdiction: &str) -> Option<NationalRecord> {
        let publication = docdb(&self.publication.as_ref()?.ids)?;
        let country = publication.country.as_ref()?.value.trim();
        if !country.eq_ignore_ascii_case(jurisdiction) {
            return None;
        }
        let number = format!(
            "{country}{}{}",
            publication.number.as_ref()?.value.trim(),
            publication.kind.as_ref().map_or("", |k| k.value.trim())
        );

        let filing_date = self
            .application
            .as_ref()
            .and_then(|a| docdb(&a.ids))
            .and_then(|id| id.date.as_ref())
            .map(|d| iso_date(&d.value));
        let biblio = self.exchange.into_iter().find_map(|e| e.bibliographic);
        let title = biblio.as_ref().and_then(|b| {
            b.titles
                .iter()
                .find(|t| t.lang.as_deref() == Some("en"))
                .or_else(|| b.titles.first())
                .map(|t| t.value.trim().to_string())
        });
        let priority_date = biblio
            .as_ref()
            .and_then(|b| b.priority_claims.as_ref())
            .and_then(|p| {
                p.claims
                    .iter()
                    .filter_map(|c| docdb(&c.ids)?.date.as_ref())
                    .map(|d| iso_date(&d.value))
                    .min()
            });

        Some(NationalRecord {
            publication_number: number,
            title,
            abstract_text: None,
            assignee: None,
            filing_date,
            priority_date,
            link: None,
        })
    }
}

#[async_trait]
impl FamilyNavigator for EpoClient {
    fn name(&self) -> &'static str {
        EPO_API
    }

    async fn national_phase(
        &self,
        international_id: &str,
        jurisdiction: &str,
    ) -> Result<Vec<NationalRecord>, PharmyrusError> {
        let Some(members) = self.family(international_id).await? else {
            return Ok(Vec::new());
        };
        Ok(members
            .into_iter()
            .filter_map(|m| m.into_record(jurisdiction))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_token(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/auth/accesstoken"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok-1",
                "expires_in": "1199"
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    fn family_body() -> serde_json::Value {
        serde_json::json!({
            "ops:world-patent-data": {
                "ops:patent-family": {
                    "ops:family-member": [
                        {
                            "publication-reference": {"document-id": [
                                {"@document-id-type": "docdb",
                                 "country": {"$": "BR"}, "doc-number": {"$": "112012008823"},
                                 "kind": {"$": "B1"}, "date": {"$": "20200211"}},
                                {"@document-id-type": "epodoc",
                                 "doc-number": {"$": "BR112012008823"}}
                            ]},
                            "application-reference": {"document-id": {
                                "@document-id-type": "docdb",
                                "country": {"$": "BR"}, "doc-number": {"$": "112012008823"},
                                "date": {"$": "20101027"}
                            }},
                            "exchange-document": {"bibliographic-data": {
                                "invention-title": [
                                    {"@lang": "pt", "$": "Compostos moduladores"},
                                    {"@lang": "en", "$": "Androgen receptor modulating compounds"}
                                ],
                                "priority-claims": {"priority-claim": {"document-id": {
                                    "@document-id-type": "docdb", "date": {"$": "20091027"}
                                }}}
                            }}
                        },
                        {
                            "publication-reference": {"document-id": {
                                "@document-id-type": "docdb",
                                "country": {"$": "US"}, "doc-number": {"$": "8975254"},
                                "kind": {"$": "B2"}
                            }}
                        }
                    ]
                }
            }
        })
    }

    #[tokio::test]
    async fn national_phase_filters_family_by_jurisdiction() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/rest-services/family/publication/epodoc/WO2011051540/biblio"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(family_body()))
            .mount(&server)
            .await;

        let client = EpoClient::new_for_test(server.uri()).unwrap();
        let records = client.national_phase("WO2011051540", "BR").await.unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.publication_number, "BR112012008823B1");
        assert_eq!(record.title.as_deref(), Some("Androgen receptor modulating compounds"));
        assert_eq!(record.filing_date.as_deref(), Some("2010-10-27"));
        assert_eq!(record.priority_date.as_deref(), Some("2009-10-27"));
    }

    #[tokio::test]
    async fn token_is_reused_across_lookups() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/rest-services/family/publication/epodoc/WO2011051540/biblio"))
            .respond_with(ResponseTemplate::new(200).set_body_json(family_body()))
            .expect(2)
            .mount(&server)
            .await;

        let client = EpoClient::new_for_test(server.uri()).unwrap();
        client.national_phase("WO2011051540", "BR").await.unwrap();
        client.national_phase("WO 2011/051540", "US").await.unwrap();
    }

    #[tokio::test]
    async fn unknown_publication_has_no_family() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("<fault/>"))
            .mount(&server)
            .await;

        let client = EpoClient::new_for_test(server.uri()).unwrap();
        assert!(client.national_phase("WO2099000001", "BR").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejected_credentials_are_upstream_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/accesstoken"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid client"))
            .mount(&server)
            .await;

        let client = EpoClient::new_for_test(server.uri()).unwrap();
        let err = client.national_phase("WO2011051540", "BR").await.unwrap_err();
        assert!(err.to_string().contains("401"));
        assert!(err.is_upstream());
    }

    #[test]
    fn iso_date_formats_compact_dates() {
        assert_eq!(iso_date("20101027"), "2010-10-27");
        assert_eq!(iso_date("2010-10-27"), "2010-10-27");
    }
}
