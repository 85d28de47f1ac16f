//! Patent publication number parsing, normalization and free-text extraction.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

/// A parsed international (PCT) publication number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WoNumber {
    pub id: String,
    pub kind: Option<String>,
}

fn wo_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bWO[\s\-]?((?:19|20)\d{2})[\s/\-]?(\d{6})(?:\s?([ABC]\d?)\b)?")
            .expect("valid regex")
    })
}

fn jurisdiction_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z]{2}$").expect("valid regex"))
}

/// Dedup key for any publication number: uppercase ASCII alphanumerics only.
pub(crate) fn normalize_key(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Normalizes a two-letter jurisdiction code (`br` → `BR`).
pub(crate) fn normalize_jurisdiction(raw: &str) -> Option<String> {
    let code = raw.trim().to_ascii_uppercase();
    jurisdiction_re().is_match(&code).then_some(code)
}

/// Extracts every distinct WO number from free text, in order of first appearance.
pub(crate) fn extract_wo_numbers(text: &str) -> Vec<WoNumber> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for caps in wo_re().captures_iter(text) {
        let id = format!("WO{}{}", &caps[1], &caps[2]);
        if seen.insert(id.clone()) {
            out.push(WoNumber {
                id,
                kind: caps.get(3).map(|m| m.as_str().to_ascii_uppercase()),
            });
        }
    }
    out
}

fn national_pattern(jurisdiction: &str) -> String {
    match jurisdiction {
        // INPI numbers are 12-13 digits followed by a mandatory kind code.
        "BR" => r"(?i)\bBR[\s\-]?(\d{2}[\s\-]?\d{4}[\s\-]?\d{6,7})[\s\-]?([A-Z]\d?)\b".to_string(),
        cc => format!(r"(?i)\b{cc}[\s\-]?(\d{{5,13}})(?:[\s\-]?([A-Z]\d?))?\b"),
    }
}

/// Extracts national publication numbers of one jurisdiction from free text,
/// returned as normalized keys in order of first appearance.
pub(crate) fn extract_national_numbers(text: &str, jurisdiction: &str) -> Vec<String> {
    let Some(jurisdiction) = normalize_jurisdiction(jurisdiction) else {
        return Vec::new();
    };
    let Ok(re) = Regex::new(&national_pattern(&jurisdiction)) else {
        return Vec::new();
    };

    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for caps in re.captures_iter(text) {
        let digits = normalize_key(&caps[1]);
        let kind = caps
            .get(2)
            .map(|m| m.as_str().to_ascii_uppercase())
            .unwrap_or_default();
        let number = format!("{jurisdiction}{digits}{kind}");
        if seen.insert(number.clone()) {
            out.push(number);
        }
    }
    out
}

/// Returns true when `number` belongs to `jurisdiction` (prefix match on the
/// normalized key).
pub(crate) fn in_jurisdiction(number: &str, jurisdiction: &str) -> bool {
    let key = normalize_key(number);
    key.len() > 2
        && key.starts_with(jurisdiction)
        && key[2..].starts_with(|c: char| c.is_ascii_digit())
}

pub(crate) fn google_patents_link(base: &str, number: &str) -> String {
    format!(
        "{}/patent/{}",
        base.trim_end_matches('/'),
        normalize_key(number)
    )
}
