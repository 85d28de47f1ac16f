use std::collections::BTreeSet;

use crate::entities::patent::{FilingSource, FilingType, NationalFiling};
use crate::pipeline::backends::NationalRecord;
use crate::utils::patent_number::normalize_key;

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|v| !v.is_empty())
}

/// Converts one backend observation into an unscored national filing.
///
/// Returns `None` when the record carries no usable publication number.
pub(crate) fn from_record(
    record: NationalRecord,
    jurisdiction: &str,
    source: FilingSource,
    parent: Option<&str>,
) -> Option<NationalFiling> {
    let publication_number = normalize_key(&record.publication_number);
    if publication_number.len() <= 2 {
        return None;
    }

    Some(NationalFiling {
        publication_number,
        jurisdiction: jurisdiction.to_string(),
        parents: parent.map(|p| BTreeSet::from([p.to_string()])).unwrap_or_default(),
        title: clean(record.title),
        abstract_text: clean(record.abstract_text),
        assignee: clean(record.assignee),
        filing_date: clean(record.filing_date),
        priority_date: clean(record.priority_date),
        link: clean(record.link),
        sources: BTreeSet::from([source]),
        filing_type: FilingType::Other,
        score: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_number_and_whitespace() {
        let record = NationalRecord {
            publication_number: "br 11 2018-068911 a2".into(),
            title: Some("  Crystalline   form of darolutamide ".into()),
            assignee: Some("   ".into()),
            ..NationalRecord::default()
        };
        let filing = from_record(record, "BR", FilingSource::WebSearch, Some("WO2016162604"))
            .expect("usable number");
        assert_eq!(filing.publication_number, "BR112018068911A2");
        assert_eq!(filing.title.as_deref(), Some("Crystalline form of darolutamide"));
        assert_eq!(filing.assignee, None);
        assert!(filing.parents.contains("WO2016162604"));
        assert!(filing.sources.contains(&FilingSource::WebSearch));
    }

    #[test]
    fn rejects_empty_numbers() {
        let office = FilingSource::NationalOffice;
        assert!(from_record(NationalRecord::bare(" - "), "BR", office, None).is_none());
        assert!(from_record(NationalRecord::bare("BR"), "BR", office, None).is_none());
    }
}
