use std::borrow::Cow;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::config::SourceConfig;
use crate::error::PharmyrusError;
use crate::pipeline::backends::{ChemicalRegistry, RegistryRecord};

const PUBCHEM_API: &str = "pubchem";
const MAX_SYNONYMS: usize = 200;

pub struct PubChemClient {
    client: reqwest_middleware::ClientWithMiddleware,
    base: Cow<'static, str>,
}

impl PubChemClient {
    pub fn new(config: &SourceConfig) -> Result<Self, PharmyrusError> {
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: config.pubchem_base.clone(),
        })
    }

    #[cfg(test)]
    fn new_for_test(base: String) -> Result<Self, PharmyrusError> {
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: Cow::Owned(base),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        crate::sources::join_url(&self.base, path)
    }

    /// `Ok(None)` on 404, which PubChem uses for "no such compound".
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>, PharmyrusError> {
        let req = self.client.get(url);
        let resp = crate::sources::apply_cache_mode(req).send().await?;
        let status = resp.status();
        let content_type = resp.headers().get(reqwest::header::CONTENT_TYPE).cloned();
        let bytes = crate::sources::read_limited_body(resp, PUBCHEM_API).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let excerpt = crate::sources::body_excerpt(&bytes);
            return Err(PharmyrusError::Api {
                api: PUBCHEM_API.to_string(),
                message: format!("HTTP {status}: {excerpt}"),
            });
        }
        crate::sources::ensure_json_content_type(PUBCHEM_API, content_type.as_ref(), &bytes)?;
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| PharmyrusError::ApiJson {
                api: PUBCHEM_API.to_string(),
                source,
            })
    }

    /// `compound/name/{name}/cids/JSON`, with the name escaped as one path segment.
    fn cid_url(&self, name: &str) -> Result<reqwest::Url, PharmyrusError> {
        let mut url = reqwest::Url::parse(&self.endpoint("compound/name")).map_err(|err| {
            PharmyrusError::InvalidArgument(format!("Invalid PubChem base URL: {err}"))
        })?;
        url.path_segments_mut()
            .map_err(|()| {
                PharmyrusError::InvalidArgument("PubChem base URL cannot carry a path".into())
            })?
            .push(name.trim())
            .extend(["cids", "JSON"]);
        Ok(url)
    }

    pub async fn cid(&self, name: &str) -> Result<Option<u64>, PharmyrusError> {
        let url = self.cid_url(name)?;
        let resp: Option<CidResponse> = self.get_json(url.as_str()).await?;
        Ok(resp.and_then(|r| r.identifier_list.cid.into_iter().next()))
    }

    pub async fn synonyms(&self, cid: u64) -> Result<Vec<String>, PharmyrusError> {
        let url = self.endpoint(&format!("compound/cid/{cid}/synonyms/JSON"));
        let resp: Option<SynonymResponse> = self.get_json(&url).await?;
        Ok(resp
            .and_then(|r| r.information_list.information.into_iter().next())
            .map(|info| info.synonym.into_iter().take(MAX_SYNONYMS).collect())
            .unwrap_or_default())
    }

    pub async fn properties(&self, cid: u64) -> Result<Option<CompoundProperties>, PharmyrusError> {
        let url = self.endpoint(&format!(
            "compound/cid/{cid}/property/Title,MolecularFormula,MolecularWeight/JSON"
        ));
        let resp: Option<PropertyResponse> = self.get_json(&url).await?;
        Ok(resp.and_then(|r| r.property_table.properties.into_iter().next()))
    }
}

fn weight_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl ChemicalRegistry for PubChemClient {
    fn name(&self) -> &'static str {
        PUBCHEM_API
    }

    async fn lookup(&self, name: &str) -> Result<Option<RegistryRecord>, PharmyrusError> {
        let Some(cid) = self.cid(name).await? else {
            return Ok(None);
        };

        let (synonyms, properties) = tokio::join!(self.synonyms(cid), self.properties(cid));
        let synonyms = synonyms?;
        let properties = properties.unwrap_or_else(|err| {
            warn!(source = PUBCHEM_API, cid, "compound properties unavailable: {err}");
            None
        });

        let canonical_name = properties
            .as_ref()
            .and_then(|p| p.title.clone())
            .or_else(|| synonyms.first().cloned());
        Ok(Some(RegistryRecord {
            canonical_name,
            registry_id: Some(format!("CID:{cid}")),
            molecular_formula: properties.as_ref().and_then(|p| p.molecular_formula.clone()),
            molecular_weight: properties
                .as_ref()
                .and_then(|p| p.molecular_weight.as_ref())
                .and_then(weight_string),
            synonyms,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct CidResponse {
    #[serde(rename = "IdentifierList")]
    identifier_list: IdentifierList,
}

#[derive(Debug, Deserialize)]
struct IdentifierList {
    #[serde(rename = "CID", default)]
    cid: Vec<u64>,
}

#[derive(Debug, Deserialize)]
struct SynonymResponse {
    #[serde(rename = "InformationList")]
    information_list: InformationList,
}

#[derive(Debug, Deserialize)]
struct InformationList {
    #[serde(rename = "Information", default)]
    information: Vec<SynonymInformation>,
}

#[derive(Debug, Deserialize)]
struct SynonymInformation {
    #[serde(rename = "Synonym", default)]
    synonym: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PropertyResponse {
    #[serde(rename = "PropertyTable")]
    property_table: PropertyTable,
}

#[derive(Debug, Deserialize)]
struct PropertyTable {
    #[serde(rename = "Properties", default)]
    properties: Vec<CompoundProperties>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompoundProperties {
    #[serde(rename = "Title")]
    pub title: Option<String>,
    #[serde(rename = "MolecularFormula")]
    pub molecular_formula: Option<String>,
    #[serde(rename = "MolecularWeight")]
    pub molecular_weight: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_darolutamide(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/compound/name/Darolutamide/cids/JSON"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "IdentifierList": {"CID": [67171867]}
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/compound/cid/67171867/synonyms/JSON"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "InformationList": {"Information": [{
                    "CID": 67171867,
                    "Synonym": ["darolutamide", "1297538-32-9", "ODM-201", "BAY-1841788", "Nubeqa"]
                }]}
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn lookup_combines_cid_synonyms_and_properties() {
        let server = MockServer::start().await;
        mount_darolutamide(&server).await;
        Mock::given(method("GET"))
            .and(path(
                "/compound/cid/67171867/property/Title,MolecularFormula,MolecularWeight/JSON",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "PropertyTable": {"Properties": [{
                    "CID": 67171867,
                    "Title": "Darolutamide",
                    "MolecularFormula": "C19H19ClN6O2",
                    "MolecularWeight": "398.8"
                }]}
            })))
            .mount(&server)
            .await;

        let client = PubChemClient::new_for_test(server.uri()).unwrap();
        let record = client.lookup("Darolutamide").await.unwrap().expect("found");
        assert_eq!(record.canonical_name.as_deref(), Some("Darolutamide"));
        assert_eq!(record.registry_id.as_deref(), Some("CID:67171867"));
        assert_eq!(record.molecular_weight.as_deref(), Some("398.8"));
        assert!(record.synonyms.iter().any(|s| s == "ODM-201"));
    }

    #[tokio::test]
    async fn lookup_tolerates_missing_properties() {
        let server = MockServer::start().await;
        mount_darolutamide(&server).await;
        Mock::given(method("GET"))
            .and(path(
                "/compound/cid/67171867/property/Title,MolecularFormula,MolecularWeight/JSON",
            ))
            .respond_with(ResponseTemplate::new(500).set_body_string("busy"))
            .mount(&server)
            .await;

        let client = PubChemClient::new_for_test(server.uri()).unwrap();
        let record = client.lookup("Darolutamide").await.unwrap().expect("found");
        assert_eq!(record.canonical_name.as_deref(), Some("darolutamide"));
        assert!(record.molecular_formula.is_none());
    }

    #[tokio::test]
    async fn unknown_name_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/compound/name/unobtainium/cids/JSON"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "Fault": {"Code": "PUGREST.NotFound", "Message": "No CID found"}
            })))
            .mount(&server)
            .await;

        let client = PubChemClient::new_for_test(server.uri()).unwrap();
        assert!(client.lookup("unobtainium").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn server_errors_surface_with_context() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let client = PubChemClient::new_for_test(server.uri()).unwrap();
        let err = client.lookup("olaparib").await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("pubchem"));
        assert!(msg.contains("503"));
        assert!(err.is_upstream());
    }

    #[test]
    fn cid_url_escapes_the_name_as_one_segment() {
        let client = PubChemClient::new_for_test("http://pubchem.test/rest/pug/".into()).unwrap();
        assert_eq!(
            client.cid_url("abc 1/2").unwrap().as_str(),
            "http://pubchem.test/rest/pug/compound/name/abc%201%2F2/cids/JSON"
        );
        assert_eq!(
            client.cid_url(" ODM-201 ").unwrap().path(),
            "/rest/pug/compound/name/ODM-201/cids/JSON"
        );
    }
}
