use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};

use crate::enrich::weather::Observation;
use crate::enrich::EnrichedRecord;
use crate::parser::record::{OutageDate, ParsedRecord, TimeField, Weekday, YearSource};

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS announcements (
            id         INTEGER PRIMARY KEY,
            page       INTEGER NOT NULL,
            position   INTEGER NOT NULL,
            text       TEXT NOT NULL,
            scraped_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(page, position)
        );

        CREATE TABLE IF NOT EXISTS records (
            id          INTEGER PRIMARY KEY,
            weekday     TEXT,
            day         INTEGER NOT NULL,
            month       INTEGER NOT NULL,
            year        INTEGER NOT NULL,
            year_source TEXT NOT NULL CHECK(year_source IN ('stated','inferred')),
            time_start  TEXT NOT NULL,
            time_end    TEXT NOT NULL,
            tags        TEXT NOT NULL,
            location    TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_records_location ON records(location);

        CREATE TABLE IF NOT EXISTS rejections (
            id     INTEGER PRIMARY KEY,
            text   TEXT NOT NULL,
            run_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS geocode_cache (
            location  TEXT PRIMARY KEY,
            latitude  REAL,
            longitude REAL
        );

        CREATE TABLE IF NOT EXISTS weather_cache (
            latitude    REAL NOT NULL,
            longitude   REAL NOT NULL,
            observed_at TEXT NOT NULL,
            temperature REAL,
            station     TEXT,
            PRIMARY KEY (latitude, longitude, observed_at)
        );

        CREATE TABLE IF NOT EXISTS enriched (
            record_id      INTEGER PRIMARY KEY REFERENCES records(id),
            duration_hours REAL NOT NULL,
            start_utc      TEXT NOT NULL,
            latitude       REAL NOT NULL,
            longitude      REAL NOT NULL,
            temperature    REAL,
            station        TEXT
        );
        ",
    )?;
    Ok(())
}

// ── Announcements ──

/// Store the notices of one listing page (or one import) in order. Rows
/// previously stored for the page are dropped first, so a page that shrank
/// leaves nothing stale behind.
pub fn replace_page(conn: &Connection, page: u32, texts: &[String]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM announcements WHERE page = ?1", [page])?;
    let mut count = 0;
    {
        let mut stmt =
            tx.prepare("INSERT INTO announcements (page, position, text) VALUES (?1, ?2, ?3)")?;
        for (position, text) in texts.iter().enumerate() {
            count += stmt.execute(rusqlite::params![page, position as u32, text])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

/// Raw notices in scrape order: listing page, then position on the page.
pub fn fetch_announcements(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT text FROM announcements ORDER BY page, position")?;
    let rows = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(rows)
}

// ── Parse results ──

/// Replace the previous parse run (and everything derived from it).
pub fn save_parse_run(conn: &Connection, records: &[ParsedRecord], rejected: &[String]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch("DELETE FROM enriched; DELETE FROM records; DELETE FROM rejections;")?;
    {
        let mut r_stmt = tx.prepare(
            "INSERT INTO records
             (weekday, day, month, year, year_source, time_start, time_end, tags, location)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        for r in records {
            let tags = serde_json::to_string(&r.tags)?;
            r_stmt.execute(rusqlite::params![
                r.weekday.map(Weekday::as_str),
                r.date.day,
                r.date.month,
                r.date.year,
                year_source_str(r.date.year_source),
                r.time_start.to_string(),
                r.time_end.to_string(),
                tags,
                r.location,
            ])?;
        }

        let mut j_stmt = tx.prepare("INSERT INTO rejections (text) VALUES (?1)")?;
        for text in rejected {
            j_stmt.execute(rusqlite::params![text])?;
        }
    }
    tx.commit()?;
    Ok(())
}

struct RecordRow {
    id: i64,
    weekday: Option<String>,
    day: u32,
    month: u32,
    year: i32,
    year_source: String,
    time_start: String,
    time_end: String,
    tags: String,
    location: Option<String>,
}

impl RecordRow {
    fn into_record(self) -> Result<(i64, ParsedRecord)> {
        let weekday = self
            .weekday
            .map(|w| w.parse::<Weekday>().map_err(|_| anyhow!("bad weekday {:?}", w)))
            .transpose()?;
        let year_source = match self.year_source.as_str() {
            "stated" => YearSource::Stated,
            "inferred" => YearSource::Inferred,
            other => return Err(anyhow!("bad year_source {:?}", other)),
        };
        let record = ParsedRecord {
            weekday,
            date: OutageDate {
                day: self.day,
                month: self.month,
                year: self.year,
                year_source,
            },
            time_start: TimeField::try_from(self.time_start).map_err(|e| anyhow!(e))?,
            time_end: TimeField::try_from(self.time_end).map_err(|e| anyhow!(e))?,
            tags: serde_json::from_str(&self.tags)?,
            location: self.location,
        };
        Ok((self.id, record))
    }
}

const RECORD_COLUMNS: &str =
    "r.id, r.weekday, r.day, r.month, r.year, r.year_source, r.time_start, r.time_end, r.tags, r.location";

fn read_record_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecordRow> {
    Ok(RecordRow {
        id: row.get(0)?,
        weekday: row.get(1)?,
        day: row.get(2)?,
        month: row.get(3)?,
        year: row.get(4)?,
        year_source: row.get(5)?,
        time_start: row.get(6)?,
        time_end: row.get(7)?,
        tags: row.get(8)?,
        location: row.get(9)?,
    })
}

/// Parsed records in scrape order, with their row ids.
pub fn fetch_records(conn: &Connection) -> Result<Vec<(i64, ParsedRecord)>> {
    let sql = format!("SELECT {} FROM records r ORDER BY r.id", RECORD_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], read_record_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(RecordRow::into_record).collect()
}

pub fn fetch_rejections(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT text FROM rejections ORDER BY id")?;
    let rows = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(rows)
}

fn year_source_str(src: YearSource) -> &'static str {
    match src {
        YearSource::Stated => "stated",
        YearSource::Inferred => "inferred",
    }
}

// ── Caches ──

/// `None` = never looked up; `Some(None)` = looked up, nothing found.
pub fn cached_location(conn: &Connection, location: &str) -> Result<Option<Option<(f64, f64)>>> {
    let hit = conn
        .query_row(
            "SELECT latitude, longitude FROM geocode_cache WHERE location = ?1",
            [location],
            |row| Ok((row.get::<_, Option<f64>>(0)?, row.get::<_, Option<f64>>(1)?)),
        )
        .optional()?;
    Ok(hit.map(|(lat, lon)| lat.zip(lon)))
}

pub fn cache_location(conn: &Connection, location: &str, coords: Option<(f64, f64)>) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO geocode_cache (location, latitude, longitude) VALUES (?1, ?2, ?3)",
        rusqlite::params![location, coords.map(|c| c.0), coords.map(|c| c.1)],
    )?;
    Ok(())
}

pub fn cached_observation(
    conn: &Connection,
    lat: f64,
    lon: f64,
    at: DateTime<Utc>,
) -> Result<Option<Option<Observation>>> {
    let hit = conn
        .query_row(
            "SELECT temperature, station FROM weather_cache
             WHERE latitude = ?1 AND longitude = ?2 AND observed_at = ?3",
            rusqlite::params![lat, lon, at.to_rfc3339()],
            |row| Ok((row.get::<_, Option<f64>>(0)?, row.get::<_, Option<String>>(1)?)),
        )
        .optional()?;
    Ok(hit.map(|(temperature, station)| {
        temperature.map(|temperature| Observation {
            temperature,
            station: station.unwrap_or_default(),
        })
    }))
}

pub fn cache_observation(
    conn: &Connection,
    lat: f64,
    lon: f64,
    at: DateTime<Utc>,
    obs: Option<&Observation>,
) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO weather_cache (latitude, longitude, observed_at, temperature, station)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            lat,
            lon,
            at.to_rfc3339(),
            obs.map(|o| o.temperature),
            obs.map(|o| o.station.as_str()),
        ],
    )?;
    Ok(())
}

// ── Enriched ──

pub fn save_enriched(conn: &Connection, rows: &[EnrichedRecord]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM enriched", [])?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO enriched
             (record_id, duration_hours, start_utc, latitude, longitude, temperature, station)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for e in rows {
            stmt.execute(rusqlite::params![
                e.record_id,
                e.duration_hours,
                e.start_utc.to_rfc3339(),
                e.latitude,
                e.longitude,
                e.temperature_c,
                e.station,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

pub fn fetch_enriched(conn: &Connection) -> Result<Vec<EnrichedRecord>> {
    let sql = format!(
        "SELECT {}, e.duration_hours, e.start_utc, e.latitude, e.longitude, e.temperature, e.station
         FROM enriched e JOIN records r ON r.id = e.record_id
         ORDER BY r.id",
        RECORD_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                read_record_row(row)?,
                row.get::<_, f64>(10)?,
                row.get::<_, String>(11)?,
                row.get::<_, f64>(12)?,
                row.get::<_, f64>(13)?,
                row.get::<_, Option<f64>>(14)?,
                row.get::<_, Option<String>>(15)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(rec, duration_hours, start, latitude, longitude, temperature_c, station)| {
            let (record_id, record) = rec.into_record()?;
            let start_utc = DateTime::parse_from_rfc3339(&start)
                .with_context(|| format!("bad start_utc {:?}", start))?
                .with_timezone(&Utc);
            Ok(EnrichedRecord {
                record_id,
                record,
                duration_hours,
                start_utc,
                latitude,
                longitude,
                temperature_c,
                station,
            })
        })
        .collect()
}

// ── Stats ──

pub struct Stats {
    pub announcements: usize,
    pub records: usize,
    pub rejections: usize,
    pub inferred_years: usize,
    pub with_location: usize,
    pub enriched: usize,
    pub with_temperature: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> Result<usize> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };
    Ok(Stats {
        announcements: count("SELECT COUNT(*) FROM announcements")?,
        records: count("SELECT COUNT(*) FROM records")?,
        rejections: count("SELECT COUNT(*) FROM rejections")?,
        inferred_years: count("SELECT COUNT(*) FROM records WHERE year_source = 'inferred'")?,
        with_location: count("SELECT COUNT(*) FROM records WHERE location IS NOT NULL")?,
        enriched: count("SELECT COUNT(*) FROM enriched")?,
        with_temperature: count("SELECT COUNT(*) FROM enriched WHERE temperature IS NOT NULL")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::record::ClockTime;
    use chrono::TimeZone;

    fn memory() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn record(day: u32, location: Option<&str>) -> ParsedRecord {
        ParsedRecord {
            weekday: Some(Weekday::Tiistaina),
            date: OutageDate { day, month: 3, year: 2024, year_source: YearSource::Inferred },
            time_start: TimeField::Known(ClockTime { hour: 8, minute: Some(15) }),
            time_end: TimeField::Unknown,
            tags: vec!["korjaus".into(), "sähkökatko".into()],
            location: location.map(str::to_string),
        }
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn announcements_come_back_in_scrape_order() {
        let conn = memory();
        replace_page(&conn, 3, &texts(&["c"])).unwrap();
        replace_page(&conn, 2, &texts(&["a", "b"])).unwrap();
        assert_eq!(fetch_announcements(&conn).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn rescraped_page_drops_old_rows() {
        let conn = memory();
        replace_page(&conn, 2, &texts(&["a1", "a2", "a3"])).unwrap();
        replace_page(&conn, 3, &texts(&["c"])).unwrap();

        // page 2 now lists fewer notices; page 3 is untouched
        assert_eq!(replace_page(&conn, 2, &texts(&["b1"])).unwrap(), 1);
        assert_eq!(fetch_announcements(&conn).unwrap(), vec!["b1", "c"]);

        replace_page(&conn, 2, &[]).unwrap();
        assert_eq!(fetch_announcements(&conn).unwrap(), vec!["c"]);
    }

    #[test]
    fn parse_run_round_trip() {
        let conn = memory();
        let recs = vec![record(5, Some("Iisalmi")), record(4, None)];
        save_parse_run(&conn, &recs, &["Tii".to_string()]).unwrap();
        let back: Vec<ParsedRecord> = fetch_records(&conn).unwrap().into_iter().map(|(_, r)| r).collect();
        assert_eq!(back, recs);
        assert_eq!(fetch_rejections(&conn).unwrap(), vec!["Tii"]);

        // a new run replaces the old one
        save_parse_run(&conn, &recs[..1], &[]).unwrap();
        assert_eq!(fetch_records(&conn).unwrap().len(), 1);
        assert!(fetch_rejections(&conn).unwrap().is_empty());
    }

    #[test]
    fn geocode_cache_remembers_misses() {
        let conn = memory();
        assert_eq!(cached_location(&conn, "Iisalmi").unwrap(), None);
        cache_location(&conn, "Iisalmi", Some((63.56, 27.19))).unwrap();
        cache_location(&conn, "Nowhere", None).unwrap();
        assert_eq!(cached_location(&conn, "Iisalmi").unwrap(), Some(Some((63.56, 27.19))));
        assert_eq!(cached_location(&conn, "Nowhere").unwrap(), Some(None));
    }

    #[test]
    fn enriched_joins_records() {
        let conn = memory();
        save_parse_run(&conn, &[record(5, Some("Iisalmi"))], &[]).unwrap();
        let (id, rec) = fetch_records(&conn).unwrap().remove(0);
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 6, 0, 0).unwrap();
        let obs = Observation { temperature: -3.5, station: "63.55 27.19".into() };
        cache_observation(&conn, 63.56, 27.19, at, Some(&obs)).unwrap();
        assert_eq!(cached_observation(&conn, 63.56, 27.19, at).unwrap(), Some(Some(obs)));

        let miss = at + chrono::Duration::hours(1);
        assert_eq!(cached_observation(&conn, 63.56, 27.19, miss).unwrap(), None);
        cache_observation(&conn, 63.56, 27.19, miss, None).unwrap();
        assert_eq!(cached_observation(&conn, 63.56, 27.19, miss).unwrap(), Some(None));

        let e = EnrichedRecord {
            record_id: id,
            record: rec.clone(),
            duration_hours: 2.5,
            start_utc: at,
            latitude: 63.56,
            longitude: 27.19,
            temperature_c: Some(-3.5),
            station: Some("63.55 27.19".into()),
        };
        save_enriched(&conn, &[e]).unwrap();
        let back = fetch_enriched(&conn).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].record, rec);
        assert_eq!(back[0].start_utc, at);
        assert_eq!(back[0].station.as_deref(), Some("63.55 27.19"));
        assert_eq!(get_stats(&conn).unwrap().with_temperature, 1);
    }
}
