use tracing::debug;

use super::record::YearSource;

pub const DEFAULT_FALLBACK_YEAR: i32 = 2025;

/// Year/month carried from one announcement to the next.
///
/// Notices often omit the year ("Tiistaina 3.12."), so the last explicitly
/// stated year stands in for it. The listing is scraped newest-first, which
/// means a month *later* than the last stated one belongs to the previous
/// year. Feeding lines in any other order yields wrong years.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContinuityState {
    pub last_valid_year: Option<i32>,
    pub last_valid_month: u32,
    pub fallback_year: i32,
}

impl Default for ContinuityState {
    fn default() -> Self {
        ContinuityState::new(DEFAULT_FALLBACK_YEAR)
    }
}

impl ContinuityState {
    pub fn new(fallback_year: i32) -> Self {
        ContinuityState {
            last_valid_year: None,
            last_valid_month: 12,
            fallback_year,
        }
    }

    #[cfg(test)]
    pub fn seeded(year: i32, month: u32, fallback_year: i32) -> Self {
        ContinuityState {
            last_valid_year: Some(year),
            last_valid_month: month,
            fallback_year,
        }
    }

    /// Resolve the year for a date with `month` and optional explicit `year`.
    /// Returns the year, its provenance and the state for the next line.
    pub fn resolve(&self, month: u32, year: Option<i32>) -> (i32, YearSource, ContinuityState) {
        if let Some(y) = year {
            let next = ContinuityState {
                last_valid_year: Some(y),
                last_valid_month: month,
                ..*self
            };
            return (y, YearSource::Stated, next);
        }

        match self.last_valid_year {
            Some(last) if month > self.last_valid_month => {
                debug!(
                    month,
                    last_valid_month = self.last_valid_month,
                    "month after last stated month, rolling back a year"
                );
                (last - 1, YearSource::Inferred, *self)
            }
            Some(last) => (last, YearSource::Inferred, *self),
            None => (self.fallback_year, YearSource::Inferred, *self),
        }
    }
}
