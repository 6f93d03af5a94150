pub mod announcement;
pub mod cities;
pub mod continuity;
pub mod filter;
pub mod ledger;
pub mod record;
pub mod tags;

use tracing::{debug, info};

use crate::error::ParseError;
use announcement::Extraction;
use cities::CityMatcher;
use continuity::ContinuityState;
use ledger::RejectionLedger;
use record::ParsedRecord;

/// Everything a parse run produces, including the continuity state left
/// after the last line.
#[derive(Debug)]
pub struct ParseOutcome {
    pub records: Vec<ParsedRecord>,
    pub rejected: RejectionLedger,
    pub state: ContinuityState,
}

/// Attach tags and location (both read from the tail) to an extraction.
pub fn assemble(ex: Extraction<'_>, cities: &CityMatcher) -> ParsedRecord {
    ParsedRecord {
        weekday: Some(ex.weekday),
        date: ex.date,
        time_start: ex.time_start,
        time_end: ex.time_end,
        tags: tags::extract_tags(ex.tail),
        location: cities.find(ex.tail).map(str::to_string),
    }
}

/// One line through extract + assemble.
pub fn parse_line(
    line: &str,
    state: &ContinuityState,
    cities: &CityMatcher,
) -> Result<(ParsedRecord, ContinuityState), ParseError> {
    let (ex, next) = announcement::extract(line, state)?;
    Ok((assemble(ex, cities), next))
}

/// Parse announcements in scrape order (newest first). The year inferred for
/// each line depends on the lines before it, so this is a strict left fold.
pub fn parse_announcements<I, S>(lines: I, state: ContinuityState, cities: &CityMatcher) -> ParseOutcome
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut records = Vec::new();
    let mut rejected = RejectionLedger::new();
    let mut state = state;

    for line in lines {
        let line = line.as_ref();
        match parse_line(line, &state, cities) {
            Ok((rec, next)) => {
                records.push(rec);
                state = next;
            }
            Err(e) => {
                debug!(error = %e, line, "rejected announcement");
                rejected.push(line);
            }
        }
    }

    info!(
        parsed = records.len(),
        rejected = rejected.len(),
        last_valid_year = ?state.last_valid_year,
        "parsed announcements"
    );
    ParseOutcome {
        records,
        rejected,
        state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::filter::CompletenessFilter;
    use crate::parser::record::{ClockTime, TimeField, Weekday, YearSource};

    fn load_fixture() -> Vec<String> {
        let json = std::fs::read_to_string("tests/fixtures/announcements.json").unwrap();
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn reference_line() {
        let state = ContinuityState::seeded(2025, 6, 2025);
        let line = "Keskiviikkona 4.6. klo 10-12 Kaivinkoneella katkaistu kaapeli Iisalmessa";
        let (rec, _) = parse_line(line, &state, &CityMatcher::default()).unwrap();
        assert_eq!(rec.weekday, Some(Weekday::Keskiviikkona));
        assert_eq!((rec.date.day, rec.date.month, rec.date.year), (4, 6, 2025));
        assert_eq!(rec.date.year_source, YearSource::Inferred);
        assert_eq!(rec.time_start, TimeField::Known(ClockTime { hour: 10, minute: None }));
        assert_eq!(rec.time_end, TimeField::Known(ClockTime { hour: 12, minute: None }));
        assert_eq!(rec.location.as_deref(), Some("Iisalmi"));
        assert!(rec.tags.iter().any(|t| t.to_lowercase().starts_with("kaiv")));
    }

    #[test]
    fn rejected_lines_kept_verbatim() {
        let lines = [
            "Tii",
            "Maanantaina 3.3.2025 klo 9-10 huolto Joensuussa",
            "  Sähkökatko ilman päivää  ",
        ];
        let out = parse_announcements(lines, ContinuityState::default(), &CityMatcher::default());
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.rejected.entries(), &["Tii", "  Sähkökatko ilman päivää  "]);
    }

    #[test]
    fn malformed_date_leaves_state_alone() {
        let lines = ["Maanantaina 30.2.2019 huolto", "Tiistaina 4.3. huolto"];
        let out = parse_announcements(lines, ContinuityState::default(), &CityMatcher::default());
        assert_eq!(out.rejected.len(), 1);
        assert_eq!(out.records[0].date.year, 2025);
        assert_eq!(out.state.last_valid_year, None);
    }

    #[test]
    fn explicit_year_sets_state() {
        let lines = ["Perjantaina 8.11.2024 klo 8-9 korjaus", "Torstaina 7.11. klo 8-9 korjaus"];
        let out = parse_announcements(lines, ContinuityState::default(), &CityMatcher::default());
        assert_eq!(out.state.last_valid_year, Some(2024));
        assert_eq!(out.state.last_valid_month, 11);
        assert_eq!(out.records[1].date.year, 2024);
        assert_eq!(out.records[1].date.year_source, YearSource::Inferred);
    }

    #[test]
    fn year_boundary_rollover() {
        // newest first: March 2024 stated, then a yearless November → 2023
        let lines = ["Maanantaina 4.3.2024 klo 8-9 huolto", "Torstaina 30.11. klo 8-9 huolto"];
        let out = parse_announcements(lines, ContinuityState::default(), &CityMatcher::default());
        assert_eq!(out.records[1].date.year, 2023);
        assert_eq!(out.records[1].date.year_source, YearSource::Inferred);
    }

    #[test]
    fn fixture_pipeline() {
        let lines = load_fixture();
        let out = parse_announcements(&lines, ContinuityState::default(), &CityMatcher::default());
        assert_eq!(out.records.len() + out.rejected.len(), lines.len());
        assert_eq!(out.rejected.len(), 2);
        assert!(out.rejected.entries().iter().all(|r| lines.contains(r)));

        // year rolls back across new year in the newest-first listing
        let jan = &out.records[0];
        assert_eq!((jan.date.month, jan.date.year), (1, 2025));
        let dec = out.records.iter().find(|r| r.date.month == 12).unwrap();
        assert_eq!(dec.date.year, 2024);

        let clean = CompletenessFilter::default().apply(out.records.clone());
        assert!(!clean.is_empty());
        assert!(clean.len() < out.records.len());
        assert!(clean.iter().all(|r| r.location.is_some() && !r.tags.is_empty()));
    }
}
