use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::continuity::ContinuityState;
use super::record::{ClockTime, OutageDate, TimeField, Weekday};
use crate::error::ParseError;

// Weekday anchor, d.m[.yyyy], optional "klo 10-12" block, then the message.
// NBSP is common in the scraped text, hence [\s\x{A0}] everywhere.
static ANNOUNCEMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i).*?",
        r"(?:tänään[\s\x{A0}]+)?",
        r"(maanantaina|tiistaina|keskiviikkona|torstaina|perjantaina|lauantaina|sunnuntaina)[\s\x{A0}]*",
        r"([0-9]{1,2})\.([0-9]{1,2})(?:\.([0-9]{4}))?",
        r"[\s\x{A0}]*\.?",
        r"(?:",
        r"[\s\x{A0}]*(?:kello|klo\.?)[\s\x{A0}]*",
        r"([0-9]{1,2}(?:[:.][0-9]{2})?)?",
        r"(?:[\s\x{A0}]*[-–—]+[\s\x{A0}]*)?",
        r"([0-9]{1,2}(?:[:.][0-9]{2})?)?",
        r")?",
        r"[\s\x{A0}]*(.*)",
    ))
    .unwrap()
});

/// Fields pulled out of one announcement line, before tags and location.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction<'a> {
    pub weekday: Weekday,
    pub date: OutageDate,
    pub time_start: TimeField,
    pub time_end: TimeField,
    /// Message after the date/time block; input for tags and city matching.
    pub tail: &'a str,
}

/// Match `line` against the announcement grammar and resolve its year with
/// `state`. On success also returns the state for the next line; on failure
/// the caller keeps its current state.
pub fn extract<'a>(
    line: &'a str,
    state: &ContinuityState,
) -> Result<(Extraction<'a>, ContinuityState), ParseError> {
    let caps = ANNOUNCEMENT_RE.captures(line).ok_or(ParseError::NoMatch)?;

    let weekday = caps[1].parse::<Weekday>().map_err(|_| ParseError::NoMatch)?;
    let day = caps[2].parse::<u32>().map_err(|_| ParseError::NoMatch)?;
    let month = caps[3].parse::<u32>().map_err(|_| ParseError::NoMatch)?;
    let year = caps
        .get(4)
        .map(|m| m.as_str().parse::<i32>().map_err(|_| ParseError::NoMatch))
        .transpose()?;

    let (resolved, year_source, next) = state.resolve(month, year);
    let date = OutageDate {
        day,
        month,
        year: resolved,
        year_source,
    };
    if date.to_naive().is_none() {
        return Err(ParseError::MalformedDate {
            day,
            month,
            year: resolved,
        });
    }

    let time_start = time_field(caps.get(5).map(|m| m.as_str()));
    let time_end = time_field(caps.get(6).map(|m| m.as_str()));
    let tail = caps.get(7).map(|m| trim_tail(m.as_str())).unwrap_or("");

    Ok((
        Extraction {
            weekday,
            date,
            time_start,
            time_end,
            tail,
        },
        next,
    ))
}

fn time_field(raw: Option<&str>) -> TimeField {
    match raw.map(str::parse::<ClockTime>) {
        Some(Ok(t)) => TimeField::Known(t),
        Some(Err(e)) => {
            debug!("discarding time: {}", e);
            TimeField::Unknown
        }
        None => TimeField::Unknown,
    }
}

fn trim_tail(s: &str) -> &str {
    s.trim_start_matches(|c: char| {
        c.is_whitespace() || c.is_ascii_punctuation() || c == '–' || c == '—'
    })
    .trim_end()
}
