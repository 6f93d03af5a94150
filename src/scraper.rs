use std::sync::LazyLock;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use regex::Regex;
use reqwest::StatusCode;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::db;
use crate::settings::Settings;

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

static NOTICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<div[^>]*class="[^"]*uutisnosto-sisalto sisennys[^"]*"[^>]*>(.*?)</div>"#).unwrap()
});
static PARAGRAPH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<p(?:\s[^>]*)?>(.*?)</p>").unwrap());
static BREAK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").unwrap());
static SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s\x{A0}]+").unwrap());

pub struct ScrapeStats {
    pub pages: usize,
    pub ok: usize,
    pub errors: usize,
    pub announcements: usize,
}

/// Walk the outage listing page by page (oldest page last) and store each
/// notice with its page/position so parse order equals listing order.
pub async fn scrape_listing(conn: &Connection, settings: &Settings) -> Result<ScrapeStats> {
    let client = reqwest::Client::builder()
        .user_agent(settings.user_agent.as_str())
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")?;

    let pages: Vec<u32> = (settings.first_page..=settings.last_page).collect();
    let pb = ProgressBar::new(pages.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} pages ({msg})")?
            .progress_chars("=> "),
    );

    let mut stats = ScrapeStats {
        pages: pages.len(),
        ok: 0,
        errors: 0,
        announcements: 0,
    };

    for (i, page) in pages.iter().copied().enumerate() {
        if i > 0 {
            let delay = rand::thread_rng().gen_range(settings.min_delay_ms..=settings.max_delay_ms);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let url = format!("{}/{}/", settings.base_url.trim_end_matches('/'), page);
        match fetch_with_retry(&client, &url).await {
            Ok(html) => {
                let notices = extract_notices(&html);
                debug!(page, count = notices.len(), "page scraped");
                stats.announcements += db::replace_page(conn, page, &notices)?;
                stats.ok += 1;
            }
            Err(e) => {
                warn!("Failed to scrape page {}: {:#}", page, e);
                stats.errors += 1;
            }
        }
        pb.set_message(format!("{} notices", stats.announcements));
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!(
        "Scraped {} pages ({} ok, {} errors), {} notices",
        stats.pages, stats.ok, stats.errors, stats.announcements
    );
    Ok(stats)
}

async fn fetch_with_retry(client: &reqwest::Client, url: &str) -> Result<String> {
    let mut attempt = 0;
    loop {
        let start = Instant::now();
        let response = client.get(url).send().await;

        let retryable = match response {
            Ok(resp) if resp.status().is_success() => {
                let body = resp.text().await.context("Failed to read response body")?;
                debug!(url, latency_ms = start.elapsed().as_millis() as u64, "fetched");
                return Ok(body);
            }
            Ok(resp) => {
                let status = resp.status();
                if status != StatusCode::TOO_MANY_REQUESTS && !status.is_server_error() {
                    bail!("{} returned {}", url, status);
                }
                format!("status {}", status)
            }
            Err(e) if e.is_timeout() || e.is_connect() => e.to_string(),
            Err(e) => return Err(e).context(format!("Request to {} failed", url)),
        };

        if attempt == MAX_RETRIES {
            bail!("{} still failing after {} retries: {}", url, MAX_RETRIES, retryable);
        }
        let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
        warn!(
            "{} on {} (attempt {}/{}), backing off {:.1}s",
            retryable,
            url,
            attempt + 1,
            MAX_RETRIES,
            backoff.as_secs_f64()
        );
        tokio::time::sleep(backoff).await;
        attempt += 1;
    }
}

/// Text of the first paragraph of every notice block on a listing page.
pub fn extract_notices(html: &str) -> Vec<String> {
    NOTICE_RE
        .captures_iter(html)
        .filter_map(|c| {
            let block = c.get(1)?.as_str();
            let para = PARAGRAPH_RE.captures(block)?.get(1)?.as_str();
            let text = html_to_text(para);
            (!text.is_empty()).then_some(text)
        })
        .collect()
}

fn html_to_text(fragment: &str) -> String {
    let spaced = BREAK_RE.replace_all(fragment, " ");
    let stripped = TAG_RE.replace_all(&spaced, "");
    let decoded = decode_entities(&stripped);
    SPACE_RE.replace_all(&decoded, " ").trim().to_string()
}

fn decode_entities(s: &str) -> String {
    ENTITY_RE
        .replace_all(s, |c: &regex::Captures| {
            let name = &c[1];
            let decoded = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                named_entity(name)
            };
            match decoded {
                Some(ch) => ch.to_string(),
                None => c[0].to_string(),
            }
        })
        .into_owned()
}

fn named_entity(name: &str) -> Option<char> {
    Some(match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "ndash" => '–',
        "mdash" => '—',
        "auml" => 'ä',
        "ouml" => 'ö',
        "aring" => 'å',
        "Auml" => 'Ä',
        "Ouml" => 'Ö',
        "Aring" => 'Å',
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_fixture() {
        let html = std::fs::read_to_string("tests/fixtures/listing_page.html").unwrap();
        let notices = extract_notices(&html);
        assert_eq!(
            notices,
            vec![
                "Keskiviikkona 15.1.2025 klo 9–12 Huoltotyön vuoksi sähkökatko Iisalmessa.",
                "Maanantaina 13.1. klo 10-11 Kaivinkoneella katkaistu kaapeli Siilinjärvellä & Toivalassa",
                "Tii",
            ]
        );
    }

    #[test]
    fn entities_and_breaks() {
        assert_eq!(
            html_to_text("Tiistaina&nbsp;7.1.<br/>klo 9&ndash;11 <strong>L&auml;mm&ouml;n</strong>&#32;katko &#x2013; ok &bogus;"),
            "Tiistaina 7.1. klo 9–11 Lämmön katko – ok &bogus;"
        );
    }

    #[test]
    fn page_without_notices() {
        assert!(extract_notices("<html><body><p>Ei häiriöitä</p></body></html>").is_empty());
    }
}
