pub mod geocode;
pub mod weather;

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Europe::Helsinki;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db;
use crate::parser::record::ParsedRecord;
use crate::settings::Settings;
use geocode::Geocoder;
use weather::WeatherClient;

/// A complete record with everything the duration model needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedRecord {
    #[serde(skip)]
    pub record_id: i64,
    #[serde(flatten)]
    pub record: ParsedRecord,
    pub duration_hours: f64,
    pub start_utc: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub temperature_c: Option<f64>,
    /// Position of the weather station the temperature came from.
    pub station: Option<String>,
}

/// Outage length and local start time. An end before the start runs past
/// midnight; equal times carry no duration.
pub fn outage_window(rec: &ParsedRecord) -> Option<(f64, NaiveDateTime)> {
    let start = rec.time_start.known()?.minutes_of_day() as i64;
    let mut end = rec.time_end.known()?.minutes_of_day() as i64;
    if end == start {
        return None;
    }
    if end < start {
        end += 24 * 60;
    }
    let midnight = rec.date.to_naive()?.and_time(NaiveTime::from_hms_opt(0, 0, 0)?);
    let local_start = midnight + Duration::minutes(start);
    Some(((end - start) as f64 / 60.0, local_start))
}

/// Helsinki wall-clock time to UTC, rounded to the nearest full hour.
pub fn utc_hour(local: NaiveDateTime) -> Option<DateTime<Utc>> {
    // a time inside the spring-forward gap is read one hour later
    let zoned = Helsinki
        .from_local_datetime(&local)
        .earliest()
        .or_else(|| Helsinki.from_local_datetime(&(local + Duration::hours(1))).earliest())?;
    let mut utc = zoned.with_timezone(&Utc);
    if utc.minute() >= 30 {
        utc += Duration::hours(1);
    }
    utc.with_minute(0)?.with_second(0)?.with_nanosecond(0)
}

pub struct EnrichStats {
    pub candidates: usize,
    pub no_duration: usize,
    pub no_coordinates: usize,
    pub enriched: usize,
}

/// Filter, time, geocode and weather-tag the stored records, then replace
/// the `enriched` table with the result.
pub async fn enrich_all(conn: &Connection, settings: &Settings) -> Result<EnrichStats> {
    let filter = settings.completeness_filter();
    let records: Vec<(i64, ParsedRecord)> = db::fetch_records(conn)?
        .into_iter()
        .filter(|(_, r)| filter.first_missing(r).is_none())
        .collect();

    let mut stats = EnrichStats {
        candidates: records.len(),
        no_duration: 0,
        no_coordinates: 0,
        enriched: 0,
    };

    let mut timed = Vec::with_capacity(records.len());
    for (id, rec) in records {
        match outage_window(&rec).and_then(|(hours, local)| Some((hours, utc_hour(local)?))) {
            Some((hours, start_utc)) => timed.push((id, rec, hours, start_utc)),
            None => {
                debug!(id, "no usable time window");
                stats.no_duration += 1;
            }
        }
    }

    let mut geocoder = Geocoder::new(settings)?;
    let mut coords: HashMap<String, Option<(f64, f64)>> = HashMap::new();
    for (_, rec, _, _) in &timed {
        let Some(location) = rec.location.as_deref() else {
            continue;
        };
        if coords.contains_key(location) {
            continue;
        }
        let found = match db::cached_location(conn, location)? {
            Some(hit) => hit,
            None => match geocoder.lookup(location).await {
                Ok(found) => {
                    db::cache_location(conn, location, found)?;
                    found
                }
                Err(e) => {
                    warn!("Geocoding {} failed: {:#}", location, e);
                    None
                }
            },
        };
        coords.insert(location.to_string(), found);
    }
    info!(locations = coords.len(), "geocoding done");

    let weather = WeatherClient::new(settings)?;
    let pb = ProgressBar::new(timed.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let mut enriched = Vec::new();
    for (record_id, record, duration_hours, start_utc) in timed {
        pb.inc(1);
        let Some((latitude, longitude)) = record
            .location
            .as_deref()
            .and_then(|l| coords.get(l).copied().flatten())
        else {
            stats.no_coordinates += 1;
            continue;
        };

        let obs = match db::cached_observation(conn, latitude, longitude, start_utc)? {
            Some(hit) => hit,
            None => match weather.observation(latitude, longitude, start_utc).await {
                Ok(obs) => {
                    db::cache_observation(conn, latitude, longitude, start_utc, obs.as_ref())?;
                    obs
                }
                Err(e) => {
                    warn!("Weather lookup at {} failed: {:#}", start_utc, e);
                    None
                }
            },
        };
        if let (Some(o), Some(loc)) = (&obs, record.location.as_deref()) {
            pb.set_message(format!("{} {:.1}°C", loc, o.temperature));
        }
        let (temperature_c, station) = match obs {
            Some(o) => (Some(o.temperature), Some(o.station)),
            None => (None, None),
        };

        enriched.push(EnrichedRecord {
            record_id,
            record,
            duration_hours,
            start_utc,
            latitude,
            longitude,
            temperature_c,
            station,
        });
    }
    pb.finish_and_clear();

    stats.enriched = enriched.len();
    db::save_enriched(conn, &enriched)?;
    info!(
        candidates = stats.candidates,
        enriched = stats.enriched,
        no_duration = stats.no_duration,
        no_coordinates = stats.no_coordinates,
        "enrichment done"
    );
    Ok(stats)
}
