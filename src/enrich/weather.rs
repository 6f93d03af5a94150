use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use tracing::debug;

use crate::settings::Settings;

const STORED_QUERY: &str = "fmi::observations::weather::simple";
const PARAMETER: &str = "t2m";
const WINDOW_MINUTES: i64 = 10;

/// A temperature reading and the position of the station that made it,
/// as FMI reports it ("lat lon").
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub temperature: f64,
    pub station: String,
}

/// FMI open data WFS client for 2 m air temperature observations.
pub struct WeatherClient {
    client: reqwest::Client,
    url: String,
    radius: f64,
}

impl WeatherClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(WeatherClient {
            client,
            url: settings.weather_url.clone(),
            radius: settings.weather_bbox_radius,
        })
    }

    /// First temperature observed near (`lat`, `lon`) within ±10 minutes of `at`.
    pub async fn observation(&self, lat: f64, lon: f64, at: DateTime<Utc>) -> Result<Option<Observation>> {
        let bbox = format!(
            "{},{},{},{}",
            lon - self.radius,
            lat - self.radius,
            lon + self.radius,
            lat + self.radius
        );
        let fmt = "%Y-%m-%dT%H:%M:%SZ";
        let start = (at - chrono::Duration::minutes(WINDOW_MINUTES)).format(fmt).to_string();
        let end = (at + chrono::Duration::minutes(WINDOW_MINUTES)).format(fmt).to_string();

        let resp = self
            .client
            .get(&self.url)
            .query(&[
                ("service", "WFS"),
                ("version", "2.0.0"),
                ("request", "getFeature"),
                ("storedquery_id", STORED_QUERY),
                ("bbox", bbox.as_str()),
                ("starttime", start.as_str()),
                ("endtime", end.as_str()),
                ("parameters", PARAMETER),
            ])
            .send()
            .await
            .context("FMI request failed")?;
        if !resp.status().is_success() {
            bail!("FMI returned {}", resp.status());
        }
        let xml = resp.text().await?;
        let obs = first_observation(&xml)?;
        debug!(lat, lon, %at, observation = ?obs, "weather");
        Ok(obs)
    }
}

/// Scan a `simple` feature collection for the first finite t2m value.
pub fn first_observation(xml: &str) -> Result<Option<Observation>> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut field: Option<Vec<u8>> = None;
    let mut station = String::new();
    let mut is_t2m = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"BsWfsElement" => {
                    is_t2m = false;
                    station.clear();
                }
                name @ (b"pos" | b"ParameterName" | b"ParameterValue") => field = Some(name.to_vec()),
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if let Some(name) = field.as_deref() {
                    let text = e.unescape()?;
                    let text = text.trim();
                    match name {
                        b"pos" => station = text.to_string(),
                        b"ParameterName" => is_t2m = text == PARAMETER,
                        b"ParameterValue" if is_t2m => {
                            if let Ok(v) = text.parse::<f64>() {
                                if v.is_finite() {
                                    return Ok(Some(Observation {
                                        temperature: v,
                                        station,
                                    }));
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
            Ok(Event::End(_)) => field = None,
            Ok(Event::Eof) => break,
            Err(e) => return Err(e).context("Malformed FMI response"),
            _ => {}
        }
        buf.clear();
    }
    Ok(None)
}
