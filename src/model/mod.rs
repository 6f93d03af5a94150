pub mod forest;

use std::collections::BTreeSet;

use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::info;

use crate::enrich::EnrichedRecord;
use crate::settings::Settings;
use forest::{ForestParams, RandomForest};

const MAINTENANCE_TAG: &str = "huollosta";
const RENOVATION_TAG: &str = "saneeraustöistä";
const UNKNOWN_WEEKDAY: &str = "Tuntematon";

pub fn season(month: u32) -> &'static str {
    match month {
        12 | 1 | 2 => "Talvi",
        3..=5 => "Kevat",
        6..=8 => "Kesa",
        _ => "Syksy",
    }
}

/// Numeric design matrix with column names and `duration_hours` targets.
#[derive(Debug)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    fn subset(&self, idx: &[usize]) -> (Vec<Vec<f64>>, Vec<f64>) {
        (
            idx.iter().map(|&i| self.rows[i].clone()).collect(),
            idx.iter().map(|&i| self.targets[i]).collect(),
        )
    }
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

struct Categorical {
    weekday: String,
    location: String,
    season: &'static str,
}

pub fn build_dataset(records: &[EnrichedRecord]) -> Dataset {
    let mut temps: Vec<f64> = records.iter().filter_map(|r| r.temperature_c).collect();
    let fill = median(&mut temps).unwrap_or(0.0);

    let cats: Vec<Categorical> = records
        .iter()
        .map(|r| Categorical {
            weekday: r
                .record
                .weekday
                .map(|w| w.as_str().to_string())
                .unwrap_or_else(|| UNKNOWN_WEEKDAY.to_string()),
            location: r.record.location.clone().unwrap_or_default(),
            season: season(r.record.date.month),
        })
        .collect();

    let weekdays: BTreeSet<&str> = cats.iter().map(|c| c.weekday.as_str()).collect();
    let locations: BTreeSet<&str> = cats.iter().map(|c| c.location.as_str()).collect();
    let seasons: BTreeSet<&str> = cats.iter().map(|c| c.season).collect();

    let mut columns: Vec<String> = ["is_huolto", "is_saneeraus", "year", "latitude", "longitude", "temperature_c"]
        .iter()
        .map(|c| c.to_string())
        .collect();
    columns.extend(weekdays.iter().map(|w| format!("weekday_{}", w)));
    columns.extend(locations.iter().map(|l| format!("location_{}", l)));
    columns.extend(seasons.iter().map(|s| format!("season_{}", s)));

    let rows = records
        .iter()
        .zip(&cats)
        .map(|(r, c)| {
            let has = |tag: &str| f64::from(u8::from(r.record.tags.iter().any(|t| t == tag)));
            let mut row = vec![
                has(MAINTENANCE_TAG),
                has(RENOVATION_TAG),
                f64::from(r.record.date.year),
                r.latitude,
                r.longitude,
                r.temperature_c.unwrap_or(fill),
            ];
            one_hot(&mut row, &weekdays, &c.weekday);
            one_hot(&mut row, &locations, &c.location);
            one_hot(&mut row, &seasons, c.season);
            row
        })
        .collect();

    Dataset {
        columns,
        rows,
        targets: records.iter().map(|r| r.duration_hours).collect(),
    }
}

fn one_hot(row: &mut Vec<f64>, levels: &BTreeSet<&str>, value: &str) {
    row.extend(levels.iter().map(|l| if *l == value { 1.0 } else { 0.0 }));
}

/// Shuffled (train, test) index split; both sides get at least one row.
pub fn split_indices(n: usize, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut idx: Vec<usize> = (0..n).collect();
    idx.shuffle(&mut StdRng::seed_from_u64(seed));
    let n_test = ((n as f64 * test_fraction).ceil() as usize).clamp(1, n.saturating_sub(1).max(1));
    let train = idx.split_off(n_test);
    (train, idx)
}

pub fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    let sse: f64 = actual.iter().zip(predicted).map(|(a, p)| (a - p).powi(2)).sum();
    (sse / actual.len() as f64).sqrt()
}

pub fn r2(actual: &[f64], predicted: &[f64]) -> f64 {
    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    let ss_res: f64 = actual.iter().zip(predicted).map(|(a, p)| (a - p).powi(2)).sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

pub struct Evaluation {
    pub features: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub rmse: f64,
    pub r2: f64,
    /// (actual, predicted) for the first few test rows.
    pub samples: Vec<(f64, f64)>,
}

pub fn train_and_evaluate(records: &[EnrichedRecord], settings: &Settings) -> Result<Evaluation> {
    if records.len() < 2 {
        bail!("Need at least 2 enriched records to train, have {}", records.len());
    }
    let data = build_dataset(records);
    let (train_idx, test_idx) = split_indices(data.len(), settings.test_fraction, settings.seed);
    let (x_train, y_train) = data.subset(&train_idx);
    let (x_test, y_test) = data.subset(&test_idx);

    let params = ForestParams {
        trees: settings.trees,
        seed: settings.seed,
        ..Default::default()
    };
    info!(
        rows = data.len(),
        features = data.columns.len(),
        trees = params.trees,
        "training random forest"
    );
    let forest = RandomForest::fit(&x_train, &y_train, &params);
    let predicted = forest.predict_all(&x_test);

    Ok(Evaluation {
        features: data.columns.len(),
        train_rows: x_train.len(),
        test_rows: x_test.len(),
        rmse: rmse(&y_test, &predicted),
        r2: r2(&y_test, &predicted),
        samples: y_test.iter().copied().zip(predicted).take(5).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::record::{ClockTime, OutageDate, ParsedRecord, TimeField, Weekday, YearSource};
    use chrono::{TimeZone, Utc};

    fn enriched(month: u32, location: &str, tag: &str, hours: f64, temp: Option<f64>) -> EnrichedRecord {
        EnrichedRecord {
            record_id: 0,
            record: ParsedRecord {
                weekday: Some(Weekday::Torstaina),
                date: OutageDate { day: 2, month, year: 2025, year_source: YearSource::Stated },
                time_start: TimeField::Known(ClockTime { hour: 9, minute: None }),
                time_end: TimeField::Known(ClockTime { hour: 12, minute: None }),
                tags: vec![tag.to_string()],
                location: Some(location.to_string()),
            },
            duration_hours: hours,
            start_utc: Utc.with_ymd_and_hms(2025, month, 2, 7, 0, 0).unwrap(),
            latitude: 63.0,
            longitude: 27.0,
            temperature_c: temp,
            station: None,
        }
    }

    #[test]
    fn seasons() {
        assert_eq!(season(12), "Talvi");
        assert_eq!(season(2), "Talvi");
        assert_eq!(season(5), "Kevat");
        assert_eq!(season(8), "Kesa");
        assert_eq!(season(11), "Syksy");
    }

    #[test]
    fn feature_columns_and_median_fill() {
        let recs = vec![
            enriched(1, "Iisalmi", "huollosta", 3.0, Some(-10.0)),
            enriched(7, "Kuopio", "saneeraustöistä", 5.0, None),
            enriched(7, "Kuopio", "vahingosta", 1.0, Some(20.0)),
        ];
        let d = build_dataset(&recs);
        assert_eq!(d.len(), 3);
        assert_eq!(
            d.columns,
            vec![
                "is_huolto", "is_saneeraus", "year", "latitude", "longitude", "temperature_c",
                "weekday_Torstaina", "location_Iisalmi", "location_Kuopio", "season_Kesa", "season_Talvi",
            ]
        );
        assert_eq!(d.rows[0][..2], [1.0, 0.0]);
        assert_eq!(d.rows[1][..2], [0.0, 1.0]);
        assert_eq!(d.rows[1][5], 5.0);
        assert_eq!(d.rows[1][7..], [0.0, 1.0, 1.0, 0.0]);
        assert_eq!(d.targets, vec![3.0, 5.0, 1.0]);
    }

    #[test]
    fn split_is_seeded_and_disjoint() {
        let (train, test) = split_indices(10, 0.3, 7);
        assert_eq!((train.len(), test.len()), (7, 3));
        let mut all: Vec<usize> = train.iter().chain(&test).copied().collect();
        all.sort();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
        assert_eq!(split_indices(10, 0.3, 7), (train, test));

        let (train, test) = split_indices(2, 0.9, 1);
        assert_eq!((train.len(), test.len()), (1, 1));
    }

    #[test]
    fn metrics() {
        assert_eq!(rmse(&[1.0, 3.0], &[2.0, 2.0]), 1.0);
        assert_eq!(r2(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]), 1.0);
        assert_eq!(r2(&[1.0, 3.0], &[2.0, 2.0]), 0.0);
    }

    #[test]
    fn too_few_rows() {
        let recs = vec![enriched(1, "Iisalmi", "huollosta", 3.0, None)];
        assert!(train_and_evaluate(&recs, &Settings::default()).is_err());
    }

    #[test]
    fn trains_end_to_end() {
        let recs: Vec<EnrichedRecord> = (0..20)
            .map(|i| {
                let (tag, hours) = if i % 2 == 0 { ("huollosta", 4.0) } else { ("vahingosta", 1.0) };
                enriched(1 + (i % 12) as u32, "Iisalmi", tag, hours, Some(i as f64))
            })
            .collect();
        let settings = Settings { trees: 10, ..Settings::default() };
        let eval = train_and_evaluate(&recs, &settings).unwrap();
        assert_eq!(eval.train_rows + eval.test_rows, 20);
        assert_eq!(eval.test_rows, 6);
        assert!(eval.rmse < 1.0, "rmse {}", eval.rmse);
        assert!(!eval.samples.is_empty());
    }
}
