//! Filing-type classification and relevance scoring.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::entities::patent::{FilingType, NationalFiling};

/// Relevance weights. The score of a filing is
/// `per_source_weight × distinct sources + type bonus`, clamped to `max_score`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoringPolicy {
    pub per_source_weight: u32,
    pub max_score: u32,
    pub type_bonus: BTreeMap<FilingType, u32>,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            per_source_weight: 4,
            max_score: 15,
            type_bonus: BTreeMap::from([
                (FilingType::Composition, 3),
                (FilingType::CrystallineForm, 3),
                (FilingType::Formulation, 2),
                (FilingType::DosageForm, 2),
                (FilingType::Combination, 2),
                (FilingType::Process, 1),
                (FilingType::Use, 1),
                (FilingType::Other, 0),
            ]),
        }
    }
}

impl ScoringPolicy {
    pub fn bonus(&self, filing_type: FilingType) -> u32 {
        self.type_bonus.get(&filing_type).copied().unwrap_or(0)
    }

    pub fn score(&self, filing_type: FilingType, source_count: usize) -> u32 {
        let sources = u32::try_from(source_count).unwrap_or(u32::MAX);
        self.per_source_weight
            .saturating_mul(sources)
            .saturating_add(self.bonus(filing_type))
            .min(self.max_score)
    }
}

fn rules() -> &'static [(FilingType, Regex)] {
    static RULES: OnceLock<Vec<(FilingType, Regex)>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            (
                FilingType::CrystallineForm,
                r"(?i)\b(crystal\w*|polymorph\w*|amorphous|solvate\w*|hydrate\w*|cocrystal\w*)\b",
            ),
            (
                FilingType::Combination,
                r"(?i)\b(combination\w*|in combination with|co-?administ\w*)\b",
            ),
            (
                FilingType::DosageForm,
                r"(?i)\b(tablets?|capsules?|dosage forms?|oral suspension|injectable)\b",
            ),
            (
                FilingType::Formulation,
                r"(?i)\b(pharmaceutical compositions?|formulations?|excipients?|pharmaceutical preparations?)\b",
            ),
            (
                FilingType::Process,
                r"(?i)\b(process\w*|prepar\w*|synthes\w*|manufactur\w*|intermediates?)\b",
            ),
            (
                FilingType::Use,
                r"(?i)\b(treatment|treating|use of|method of treating|therap\w*|for use in)\b",
            ),
            (
                FilingType::Composition,
                r"(?i)\b(compounds?|derivatives?|carboxamides?|formula|salts?|substituted)\b",
            ),
        ]
        .into_iter()
        .map(|(kind, pattern)| (kind, Regex::new(pattern).expect("valid regex")))
        .collect()
    })
}

/// Assigns exactly one filing type from title and abstract; first matching rule wins.
pub(crate) fn classify(title: Option<&str>, abstract_text: Option<&str>) -> FilingType {
    let text = format!("{} {}", title.unwrap_or_default(), abstract_text.unwrap_or_default());
    if text.trim().is_empty() {
        return FilingType::Other;
    }
    rules()
        .iter()
        .find(|(_, re)| re.is_match(&text))
        .map(|(kind, _)| *kind)
        .unwrap_or(FilingType::Other)
}

/// Classifies and scores a merged filing in place.
pub(crate) fn classify_and_score(filing: &mut NationalFiling, policy: &ScoringPolicy) {
    filing.filing_type = classify(filing.title.as_deref(), filing.abstract_text.as_deref());
    filing.score = policy.score(filing.filing_type, filing.source_count());
}
