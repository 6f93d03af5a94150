use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::record::ParsedRecord;

/// A record field that can be demanded by the completeness filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum RequiredField {
    Weekday,
    /// Counts an inferred year as missing.
    Year,
    TimeStart,
    TimeEnd,
    Tags,
    Location,
}

pub const DEFAULT_REQUIRED: &[RequiredField] = &[
    RequiredField::Location,
    RequiredField::Tags,
    RequiredField::TimeStart,
    RequiredField::TimeEnd,
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown record field {0:?} (expected weekday, year, time_start, time_end, tags or location)")]
pub struct UnknownField(pub String);

impl RequiredField {
    pub fn as_str(self) -> &'static str {
        match self {
            RequiredField::Weekday => "weekday",
            RequiredField::Year => "year",
            RequiredField::TimeStart => "time_start",
            RequiredField::TimeEnd => "time_end",
            RequiredField::Tags => "tags",
            RequiredField::Location => "location",
        }
    }

    /// Absent, `Unknown`, inferred (year) and empty (tags) all count as missing.
    pub fn is_present(self, rec: &ParsedRecord) -> bool {
        match self {
            RequiredField::Weekday => rec.weekday.is_some(),
            RequiredField::Year => !rec.date.is_inferred(),
            RequiredField::TimeStart => !rec.time_start.is_unknown(),
            RequiredField::TimeEnd => !rec.time_end.is_unknown(),
            RequiredField::Tags => !rec.tags.is_empty(),
            RequiredField::Location => rec.location.as_deref().is_some_and(|l| !l.is_empty()),
        }
    }
}

impl FromStr for RequiredField {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "weekday" => Ok(RequiredField::Weekday),
            "year" => Ok(RequiredField::Year),
            "time_start" => Ok(RequiredField::TimeStart),
            "time_end" => Ok(RequiredField::TimeEnd),
            "tags" => Ok(RequiredField::Tags),
            "location" => Ok(RequiredField::Location),
            other => Err(UnknownField(other.to_string())),
        }
    }
}

impl TryFrom<String> for RequiredField {
    type Error = UnknownField;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for RequiredField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drops records that lack any of the required fields. Order is preserved and
/// running the filter on its own output changes nothing.
#[derive(Debug, Clone)]
pub struct CompletenessFilter {
    required: Vec<RequiredField>,
}

impl Default for CompletenessFilter {
    fn default() -> Self {
        CompletenessFilter::new(DEFAULT_REQUIRED.to_vec())
    }
}

impl CompletenessFilter {
    pub fn new(required: Vec<RequiredField>) -> Self {
        CompletenessFilter { required }
    }

    /// The first required field `rec` is missing, if any.
    pub fn first_missing(&self, rec: &ParsedRecord) -> Option<RequiredField> {
        self.required.iter().copied().find(|f| !f.is_present(rec))
    }

    pub fn apply(&self, records: Vec<ParsedRecord>) -> Vec<ParsedRecord> {
        records
            .into_iter()
            .filter(|rec| match self.first_missing(rec) {
                Some(field) => {
                    debug!(%field, "dropping incomplete record");
                    false
                }
                None => true,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::record::{ClockTime, OutageDate, TimeField, Weekday, YearSource};

    fn complete() -> ParsedRecord {
        ParsedRecord {
            weekday: Some(Weekday::Torstaina),
            date: OutageDate { day: 9, month: 1, year: 2025, year_source: YearSource::Stated },
            time_start: TimeField::Known(ClockTime { hour: 9, minute: None }),
            time_end: TimeField::Known(ClockTime { hour: 12, minute: Some(30) }),
            tags: vec!["huoltotyön".into()],
            location: Some("Iisalmi".into()),
        }
    }

    #[test]
    fn default_drops_missing_location() {
        let mut no_loc = complete();
        no_loc.location = None;
        let out = CompletenessFilter::default().apply(vec![complete(), no_loc]);
        assert_eq!(out, vec![complete()]);
    }

    #[test]
    fn sentinels_and_empty_tags_are_missing() {
        let f = CompletenessFilter::default();

        let mut r = complete();
        r.time_end = TimeField::Unknown;
        assert_eq!(f.first_missing(&r), Some(RequiredField::TimeEnd));

        let mut r = complete();
        r.tags.clear();
        assert_eq!(f.first_missing(&r), Some(RequiredField::Tags));

        let mut r = complete();
        r.location = Some(String::new());
        assert_eq!(f.first_missing(&r), Some(RequiredField::Location));
    }

    #[test]
    fn inferred_year_only_matters_when_required() {
        let mut r = complete();
        r.date.year_source = YearSource::Inferred;
        assert!(CompletenessFilter::default().first_missing(&r).is_none());

        let strict = CompletenessFilter::new(vec![RequiredField::Year]);
        assert_eq!(strict.first_missing(&r), Some(RequiredField::Year));
    }

    #[test]
    fn idempotent_and_order_preserving() {
        let mut a = complete();
        a.date.day = 1;
        let mut b = complete();
        b.time_start = TimeField::Unknown;
        let mut c = complete();
        c.date.day = 3;

        let f = CompletenessFilter::default();
        let once = f.apply(vec![a.clone(), b, c.clone()]);
        assert_eq!(once, vec![a, c]);
        assert_eq!(f.apply(once.clone()), once);
    }

    #[test]
    fn field_names_parse() {
        assert_eq!(" Time_Start ".parse::<RequiredField>(), Ok(RequiredField::TimeStart));
        assert_eq!(
            "city".parse::<RequiredField>(),
            Err(UnknownField("city".into()))
        );
        let fields: Vec<RequiredField> = serde_json::from_str(r#"["location","year"]"#).unwrap();
        assert_eq!(fields, vec![RequiredField::Location, RequiredField::Year]);
    }
}
