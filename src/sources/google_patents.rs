use std::borrow::Cow;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::StatusCode;
use scraper::{ElementRef, Html, Selector};
use reqwest::header::{ACCEPT, USER_AGENT};

use crate::config::SourceConfig;
use crate::error::PharmyrusError;
use crate::pipeline::backends::{
    FamilyNavigator, FilingDetails, NationalOffice, NationalRecord, PatentSearch, RawHit,
};
use crate::utils::patent_number;

const GOOGLE_PATENTS_API: &str = "google-patents";
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
const SNIPPET_CONTEXT_CHARS: usize = 100;
const MAX_ABSTRACT_CHARS: usize = 500;

/// Scrapes the public Google Patents pages: result lists for discovery and
/// for country-filtered direct search, WO pages for their national-phase
/// links, and filing pages for bibliography.
pub struct GooglePatentsClient {
    client: reqwest_middleware::ClientWithMiddleware,
    base: Cow<'static, str>,
}

impl GooglePatentsClient {
    pub fn new(config: &SourceConfig) -> Result<Self, PharmyrusError> {
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: config.google_patents_base.clone(),
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

    /// Fetches an HTML page; `Ok(None)` when the page does not exist.
    async fn get_html(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<String>, PharmyrusError> {
        let req = self
            .client
            .get(url)
            .query(query)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header(ACCEPT, "text/html,application/xhtml+xml");
        let resp = crate::sources::apply_cache_mode(req).send().await?;
        let status = resp.status();
        let bytes = crate::sources::read_limited_body(resp, GOOGLE_PATENTS_API).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let excerpt = crate::sources::body_excerpt(&bytes);
            return Err(PharmyrusError::Api {
                api: GOOGLE_PATENTS_API.to_string(),
                message: format!("HTTP {status}: {excerpt}"),
            });
        }
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }

    fn patent_url(&self, number: &str) -> String {
        self.endpoint(&format!("patent/{number}/en"))
    }
}

fn wo_href_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/patent/(WO\d{10})").expect("valid regex"))
}

fn national_href_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"/patent/([A-Z]{2}\d{4,}[A-Z]?\d?)(?:/[a-z]{2})?/?$").expect("valid regex")
    })
}

fn anchor_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("a[href]").expect("valid selector"))
}

fn meta_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("meta[name][content]").expect("valid selector"))
}

fn itemprop_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("[itemprop]").expect("valid selector"))
}

fn collapse<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Visible text of a document, skipping script and style content.
fn page_text(doc: &Html) -> String {
    let parts = doc.root_element().descendants().filter_map(|node| {
        let text = node.value().as_text()?;
        let hidden = node.ancestors().any(|parent| {
            parent
                .value()
                .as_element()
                .is_some_and(|e| matches!(e.name(), "script" | "style" | "noscript"))
        });
        (!hidden).then_some(&**text)
    });
    collapse(parts)
}

fn meta_content(doc: &Html, name: &str) -> Option<String> {
    doc.select(meta_selector())
        .find(|m| {
            m.value()
                .attr("name")
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
        })
        .and_then(|m| m.value().attr("content"))
        .map(|content| collapse(std::iter::once(content)))
        .filter(|s| !s.is_empty())
}

fn itemprop_element<'a>(doc: &'a Html, prop: &str) -> Option<ElementRef<'a>> {
    doc.select(itemprop_selector())
        .find(|e| e.value().attr("itemprop") == Some(prop))
}

fn itemprop_text(doc: &Html, prop: &str) -> Option<String> {
    itemprop_element(doc, prop)
        .map(|e| collapse(e.text()))
        .filter(|s| !s.is_empty())
}

fn itemprop_datetime(doc: &Html, prop: &str) -> Option<String> {
    itemprop_element(doc, prop)
        .and_then(|e| e.value().attr("datetime"))
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}

fn absolute_link(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else {
        crate::sources::join_url(base, href)
    }
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// One hit per distinct WO number on a results page, carrying the page text
/// around its first mention as the snippet.
fn hits_from_results(base: &str, html: &str) -> Vec<RawHit> {
    let doc = Html::parse_document(html);
    let mut seen = BTreeSet::new();
    let mut hits = Vec::new();

    for anchor in doc.select(anchor_selector()) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some(caps) = wo_href_re().captures(href) else {
            continue;
        };
        let wo = caps[1].to_string();
        if seen.insert(wo.clone()) {
            hits.push(RawHit {
                title: wo,
                snippet: String::new(),
                link: Some(absolute_link(base, href)),
            });
        }
    }

    let text = page_text(&doc);
    for wo in patent_number::extract_wo_numbers(&text) {
        let wo = wo.id;
        let snippet = text
            .find(wo.as_str())
            .map(|pos| context_window(&text, pos, wo.len()))
            .unwrap_or_default();
        match hits.iter_mut().find(|h| h.title == wo) {
            Some(hit) if hit.snippet.is_empty() => hit.snippet = snippet,
            Some(_) => {}
            None => {
                hits.push(RawHit {
                    title: wo,
                    snippet,
                    link: None,
                });
            }
        }
    }
    hits
}

fn context_window(text: &str, pos: usize, len: usize) -> String {
    let start = text[..pos]
        .char_indices()
        .rev()
        .nth(SNIPPET_CONTEXT_CHARS)
        .map_or(0, |(i, _)| i);
    let end = text[pos + len..]
        .char_indices()
        .nth(SNIPPET_CONTEXT_CHARS)
        .map_or(text.len(), |(i, _)| pos + len + i);
    text[start..end].trim().to_string()
}

/// Filings of `jurisdiction` linked or mentioned on a page.
fn national_links(base: &str, html: &str, jurisdiction: &str) -> Vec<NationalRecord> {
    let doc = Html::parse_document(html);
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();

    for anchor in doc.select(anchor_selector()) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some(number) = national_href_re().captures(href).map(|c| c[1].to_string()) else {
            continue;
        };
        if !patent_number::in_jurisdiction(&number, jurisdiction) {
            continue;
        }
        if !seen.insert(patent_number::normalize_key(&number)) {
            continue;
        }
        let text = collapse(anchor.text());
        let title = Some(text).filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case(&number));
        out.push(NationalRecord {
            link: Some(crate::sources::join_url(base, &format!("patent/{number}/en"))),
            publication_number: number,
            title,
            ..NationalRecord::default()
        });
    }

    for number in patent_number::extract_national_numbers(&page_text(&doc), jurisdiction) {
        if seen.insert(patent_number::normalize_key(&number)) {
            out.push(NationalRecord::bare(number));
        }
    }
    out
}

fn parse_details(html: &str, number: &str, link: String) -> Option<NationalRecord> {
    let doc = Html::parse_document(html);
    let title = meta_content(&doc, "DC.title");
    let abstract_text = meta_content(&doc, "DC.description")
        .or_else(|| meta_content(&doc, "description"))
        .map(|s| truncate_chars(&s, MAX_ABSTRACT_CHARS));
    let assignee = itemprop_text(&doc, "assigneeCurrent")
        .or_else(|| itemprop_text(&doc, "assigneeOriginal"));
    if title.is_none() && abstract_text.is_none() && assignee.is_none() {
        return None;
    }
    Some(NationalRecord {
        publication_number: number.to_string(),
        title,
        abstract_text,
        assignee,
        filing_date: itemprop_datetime(&doc, "filingDate"),
        priority_date: itemprop_datetime(&doc, "priorityDate"),
        link: Some(link),
    })
}

#[async_trait]
impl PatentSearch for GooglePatentsClient {
    fn name(&self) -> &'static str {
        GOOGLE_PATENTS_API
    }

    async fn search(&self, query: &str) -> Result<Vec<RawHit>, PharmyrusError> {
        let url = self.endpoint("");
        let html = self
            .get_html(&url, &[("q", query), ("oq", query)])
            .await?
            .unwrap_or_default();
        Ok(hits_from_results(&self.base, &html))
    }
}

#[async_trait]
impl FamilyNavigator for GooglePatentsClient {
    fn name(&self) -> &'static str {
        GOOGLE_PATENTS_API
    }

    async fn national_phase(
        &self,
        international_id: &str,
        jurisdiction: &str,
    ) -> Result<Vec<NationalRecord>, PharmyrusError> {
        let url = self.patent_url(international_id);
        let Some(html) = self.get_html(&url, &[]).await? else {
            return Ok(Vec::new());
        };
        Ok(national_links(&self.base, &html, jurisdiction))
    }
}

#[async_trait]
impl NationalOffice for GooglePatentsClient {
    fn name(&self) -> &'static str {
        GOOGLE_PATENTS_API
    }

    fn supports(&self, jurisdiction: &str) -> bool {
        patent_number::normalize_jurisdiction(jurisdiction).is_some()
    }

    async fn search(
        &self,
        query: &str,
        jurisdiction: &str,
    ) -> Result<Vec<NationalRecord>, PharmyrusError> {
        let url = self.endpoint("");
        let q = format!("{query} {jurisdiction}");
        let html = self
            .get_html(&url, &[("q", q.as_str()), ("country", jurisdiction)])
            .await?
            .unwrap_or_default();
        Ok(national_links(&self.base, &html, jurisdiction))
    }
}

#[async_trait]
impl FilingDetails for GooglePatentsClient {
    fn name(&self) -> &'static str {
        GOOGLE_PATENTS_API
    }

    async fn details(
        &self,
        publication_number: &str,
    ) -> Result<Option<NationalRecord>, PharmyrusError> {
        let url = self.patent_url(publication_number);
        let Some(html) = self.get_html(&url, &[]).await? else {
            return Ok(None);
        };
        Ok(parse_details(&html, publication_number, url))
    }
}
