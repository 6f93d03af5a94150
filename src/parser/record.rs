use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Finnish weekday in the essive form used by the notices ("Maanantaina").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Weekday {
    Maanantaina,
    Tiistaina,
    Keskiviikkona,
    Torstaina,
    Perjantaina,
    Lauantaina,
    Sunnuntaina,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Maanantaina,
        Weekday::Tiistaina,
        Weekday::Keskiviikkona,
        Weekday::Torstaina,
        Weekday::Perjantaina,
        Weekday::Lauantaina,
        Weekday::Sunnuntaina,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Weekday::Maanantaina => "Maanantaina",
            Weekday::Tiistaina => "Tiistaina",
            Weekday::Keskiviikkona => "Keskiviikkona",
            Weekday::Torstaina => "Torstaina",
            Weekday::Perjantaina => "Perjantaina",
            Weekday::Lauantaina => "Lauantaina",
            Weekday::Sunnuntaina => "Sunnuntaina",
        }
    }
}

impl FromStr for Weekday {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Weekday::ALL
            .into_iter()
            .find(|w| w.as_str().to_lowercase() == lower)
            .ok_or(())
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wall-clock time as written in a notice. Minutes are optional ("klo 10").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTime {
    pub hour: u32,
    pub minute: Option<u32>,
}

impl ClockTime {
    /// Accepts 0..=24 hours; 24 only as "24" or "24:00" (end of day).
    pub fn new(hour: u32, minute: Option<u32>) -> Option<Self> {
        let m = minute.unwrap_or(0);
        if m > 59 || hour > 24 || (hour == 24 && m != 0) {
            return None;
        }
        Some(ClockTime { hour, minute })
    }

    pub fn minutes_of_day(&self) -> u32 {
        self.hour * 60 + self.minute.unwrap_or(0)
    }
}

impl FromStr for ClockTime {
    type Err = String;

    /// "10", "9.30", "09:30"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (h, m) = match s.split_once(['.', ':']) {
            Some((h, m)) => (h, Some(m)),
            None => (s, None),
        };
        let hour = h.parse::<u32>().map_err(|_| format!("bad hour in {s:?}"))?;
        let minute = m
            .map(|m| m.parse::<u32>().map_err(|_| format!("bad minute in {s:?}")))
            .transpose()?;
        ClockTime::new(hour, minute).ok_or_else(|| format!("{s:?} is not a clock time"))
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.minute {
            Some(m) => write!(f, "{}:{:02}", self.hour, m),
            None => write!(f, "{}", self.hour),
        }
    }
}

/// A time slot that was either parsed or explicitly not found. Serialized as
/// the clock string or `"Unknown"`, never null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimeField {
    Known(ClockTime),
    Unknown,
}

pub const UNKNOWN: &str = "Unknown";

impl TimeField {
    pub fn known(&self) -> Option<ClockTime> {
        match self {
            TimeField::Known(t) => Some(*t),
            TimeField::Unknown => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, TimeField::Unknown)
    }
}

impl fmt::Display for TimeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeField::Known(t) => t.fmt(f),
            TimeField::Unknown => f.write_str(UNKNOWN),
        }
    }
}

impl From<TimeField> for String {
    fn from(t: TimeField) -> String {
        t.to_string()
    }
}

impl TryFrom<String> for TimeField {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s.eq_ignore_ascii_case(UNKNOWN) {
            Ok(TimeField::Unknown)
        } else {
            s.parse().map(TimeField::Known)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum YearSource {
    Stated,
    Inferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutageDate {
    pub day: u32,
    pub month: u32,
    pub year: i32,
    pub year_source: YearSource,
}

impl OutageDate {
    pub fn to_naive(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
    }

    pub fn is_inferred(&self) -> bool {
        self.year_source == YearSource::Inferred
    }
}

/// One outage notice in structured form. Only built from a line that matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedRecord {
    pub weekday: Option<Weekday>,
    #[serde(flatten)]
    pub date: OutageDate,
    pub time_start: TimeField,
    pub time_end: TimeField,
    pub tags: Vec<String>,
    pub location: Option<String>,
}
