use std::borrow::Cow;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::SourceConfig;
use crate::error::PharmyrusError;
use crate::pipeline::backends::{NationalOffice, NationalRecord};

const INPI_API: &str = "inpi";
const INPI_DETAIL_URL: &str =
    "https://busca.inpi.gov.br/pePI/servlet/PatenteServletController?Action=detail&CodPedido=";
const MAX_ABSTRACT_CHARS: usize = 500;

/// Brazilian patent office (INPI) search through the crawler service that
/// fronts the pePI database.
pub struct InpiClient {
    client: reqwest_middleware::ClientWithMiddleware,
    base: Cow<'static, str>,
}

impl InpiClient {
    pub fn new(config: &SourceConfig) -> Result<Self, PharmyrusError> {
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: config.inpi_base.clone(),
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

    pub async fn patents(&self, query: &str) -> Result<Vec<NationalRecord>, PharmyrusError> {
        let url = self.endpoint("patents");
        let req = self.client.get(&url).query(&[("medicine", query)]);
        let bytes =
            crate::sources::send_for_body(crate::sources::apply_cache_mode(req), INPI_API).await?;
        let body: PatentsResponse =
            serde_json::from_slice(&bytes).map_err(|source| PharmyrusError::ApiJson {
                api: INPI_API.to_string(),
                source,
            })?;
        Ok(body.data.into_iter().filter_map(InpiPatent::into_record).collect())
    }
}

#[derive(Debug, Deserialize)]
struct PatentsResponse {
    #[serde(default)]
    data: Vec<InpiPatent>,
}

/// One pePI row. The crawler reports the application number in `title`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InpiPatent {
    title: Option<String>,
    applicant: Option<String>,
    full_text: Option<String>,
    deposit_date: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl InpiPatent {
    fn into_record(self) -> Option<NationalRecord> {
        let number = non_empty(self.title)?;
        if !number.to_ascii_uppercase().starts_with("BR") {
            return None;
        }
        let link = format!("{INPI_DETAIL_URL}{}", number.replace(' ', "%20"));
        Some(NationalRecord {
            publication_number: number.replace(' ', ""),
            title: None,
            abstract_text: non_empty(self.full_text)
                .map(|t| t.chars().take(MAX_ABSTRACT_CHARS).collect()),
            assignee: non_empty(self.applicant),
            filing_date: non_empty(self.deposit_date),
            priority_date: None,
            link: Some(link),
        })
    }
}

#[async_trait]
impl NationalOffice for InpiClient {
    fn name(&self) -> &'static str {
        INPI_API
    }

    fn supports(&self, jurisdiction: &str) -> bool {
        jurisdiction.eq_ignore_ascii_case("BR")
    }

    async fn search(
        &self,
        query: &str,
        jurisdiction: &str,
    ) -> Result<Vec<NationalRecord>, PharmyrusError> {
        if !self.supports(jurisdiction) {
            return Ok(Vec::new());
        }
        self.patents(query).await
    }
}
