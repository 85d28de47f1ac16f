//! Merging of national-filing observations by normalized publication number.

use std::collections::BTreeMap;

use crate::entities::patent::NationalFiling;
use crate::utils::patent_number::normalize_key;

fn longest(current: &mut Option<String>, candidate: Option<String>) {
    let Some(candidate) = candidate.filter(|v| !v.trim().is_empty()) else {
        return;
    };
    let replace = current
        .as_deref()
        .is_none_or(|existing| candidate.chars().count() > existing.chars().count());
    if replace {
        *current = Some(candidate);
    }
}

fn first(current: &mut Option<String>, candidate: Option<String>) {
    if current.as_deref().is_none_or(|v| v.trim().is_empty()) {
        *current = candidate.filter(|v| !v.trim().is_empty());
    }
}

fn absorb(existing: &mut NationalFiling, mut other: NationalFiling) {
    existing.sources.append(&mut other.sources);
    existing.parents.append(&mut other.parents);
    fill_details(existing, other);
}

/// Fills descriptive fields of `existing` from a detail lookup without adding
/// a discovery source.
pub(crate) fn fill_details(existing: &mut NationalFiling, details: NationalFiling) {
    longest(&mut existing.title, details.title);
    longest(&mut existing.abstract_text, details.abstract_text);
    longest(&mut existing.assignee, details.assignee);
    longest(&mut existing.link, details.link);
    first(&mut existing.filing_date, details.filing_date);
    first(&mut existing.priority_date, details.priority_date);
}

/// Merges observations into one filing per dedup key.
///
/// Text fields keep the longest non-empty value (ties keep the earlier one),
/// dates keep the first non-empty value, and sources and parents are unioned.
/// The caller feeds observations in a deterministic order.
pub(crate) fn merge(observations: impl IntoIterator<Item = NationalFiling>) -> Vec<NationalFiling> {
    let mut merged: BTreeMap<String, NationalFiling> = BTreeMap::new();
    for mut filing in observations {
        let key = normalize_key(&filing.publication_number);
        if key.is_empty() {
            continue;
        }
        match merged.get_mut(&key) {
            Some(existing) => absorb(existing, filing),
            None => {
                filing.publication_number = key.clone();
                merged.insert(key, filing);
            }
        }
    }
    merged.into_values().collect()
}
