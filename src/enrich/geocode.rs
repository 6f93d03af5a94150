use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::settings::Settings;

#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

/// Nominatim search client. Requests are spaced by the configured delay.
pub struct Geocoder {
    client: reqwest::Client,
    url: String,
    delay: Duration,
    last_request: Option<Instant>,
}

impl Geocoder {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Geocoder {
            client,
            url: settings.geocoder_url.clone(),
            delay: Duration::from_millis(settings.geocode_delay_ms),
            last_request: None,
        })
    }

    /// Coordinates of `location` in Finland, `None` when nothing matches.
    pub async fn lookup(&mut self, location: &str) -> Result<Option<(f64, f64)>> {
        if let Some(last) = self.last_request {
            let since = last.elapsed();
            if since < self.delay {
                tokio::time::sleep(self.delay - since).await;
            }
        }
        self.last_request = Some(Instant::now());

        let query = format!("{}, Finland", location);
        let resp = self
            .client
            .get(&self.url)
            .query(&[("q", query.as_str()), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .with_context(|| format!("Geocoding request for {} failed", location))?;
        if !resp.status().is_success() {
            bail!("geocoder returned {} for {}", resp.status(), location);
        }
        let body = resp.text().await?;
        let found = parse_places(&body)?;
        debug!(location, ?found, "geocoded");
        Ok(found)
    }
}

fn parse_places(body: &str) -> Result<Option<(f64, f64)>> {
    let places: Vec<Place> = serde_json::from_str(body).context("Unexpected geocoder response")?;
    let Some(first) = places.first() else {
        return Ok(None);
    };
    let lat = first.lat.parse::<f64>().context("bad latitude")?;
    let lon = first.lon.parse::<f64>().context("bad longitude")?;
    Ok(Some((lat, lon)))
}
