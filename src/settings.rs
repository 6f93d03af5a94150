use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::parser::cities::{CityMatcher, DEFAULT_CITIES};
use crate::parser::continuity::{ContinuityState, DEFAULT_FALLBACK_YEAR};
use crate::parser::filter::{CompletenessFilter, RequiredField, DEFAULT_REQUIRED};

/// Runtime settings: `katko.toml` (optional) overridden by `KATKO_*` env vars.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub db_path: PathBuf,

    // scraping
    pub base_url: String,
    pub first_page: u32,
    pub last_page: u32,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub user_agent: String,

    // parsing
    pub fallback_year: i32,
    pub required_fields: Vec<RequiredField>,
    pub cities: Vec<String>,

    // enrichment
    pub geocoder_url: String,
    pub geocode_delay_ms: u64,
    pub weather_url: String,
    pub weather_bbox_radius: f64,

    // model
    pub trees: usize,
    pub test_fraction: f64,
    pub seed: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            db_path: PathBuf::from("data/katko.sqlite"),
            base_url: "https://savonvoima.fi/kategoria/hairiot/page".into(),
            first_page: 2,
            last_page: 89,
            min_delay_ms: 1000,
            max_delay_ms: 3000,
            user_agent: concat!("katko_scraper/", env!("CARGO_PKG_VERSION")).into(),
            fallback_year: DEFAULT_FALLBACK_YEAR,
            required_fields: DEFAULT_REQUIRED.to_vec(),
            cities: DEFAULT_CITIES.iter().map(|c| c.to_string()).collect(),
            geocoder_url: "https://nominatim.openstreetmap.org/search".into(),
            geocode_delay_ms: 1500,
            weather_url: "https://opendata.fmi.fi/wfs".into(),
            weather_bbox_radius: 10.0,
            trees: 100,
            test_fraction: 0.3,
            seed: 42,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let cfg = Config::builder()
            .add_source(File::with_name("katko").required(false))
            .add_source(
                Environment::with_prefix("KATKO")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("required_fields")
                    .with_list_parse_key("cities"),
            )
            .build()
            .context("Failed to read configuration")?;
        let settings: Settings = cfg
            .try_deserialize()
            .context("Invalid configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.first_page <= self.last_page,
            "first_page ({}) is after last_page ({})",
            self.first_page,
            self.last_page
        );
        anyhow::ensure!(
            self.min_delay_ms <= self.max_delay_ms,
            "min_delay_ms is larger than max_delay_ms"
        );
        anyhow::ensure!(
            self.test_fraction > 0.0 && self.test_fraction < 1.0,
            "test_fraction must be between 0 and 1, got {}",
            self.test_fraction
        );
        anyhow::ensure!(self.trees > 0, "trees must be at least 1");
        Ok(())
    }

    pub fn initial_state(&self) -> ContinuityState {
        ContinuityState::new(self.fallback_year)
    }

    pub fn city_matcher(&self) -> CityMatcher {
        CityMatcher::new(&self.cities)
    }

    pub fn completeness_filter(&self) -> CompletenessFilter {
        CompletenessFilter::new(self.required_fields.clone())
    }
}
