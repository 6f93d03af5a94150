mod db;
mod enrich;
mod error;
mod export;
mod model;
mod parser;
mod scraper;
mod settings;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use rusqlite::Connection;

use settings::Settings;

#[derive(Parser)]
#[command(name = "katko_scraper", about = "Power outage notice scraper, parser and duration model")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch listing pages and store raw notices
    Scrape,
    /// Load raw notices from a JSON array of strings
    Import {
        file: PathBuf,
    },
    /// Parse stored notices into records (replaces the previous run)
    Parse,
    /// Write parsed records as JSON
    Export {
        /// Include records that fail the completeness filter
        #[arg(long)]
        all: bool,
        /// Write the rejected raw lines instead of records
        #[arg(long, conflicts_with = "all")]
        rejections: bool,
        file: PathBuf,
    },
    /// Add duration, coordinates and temperature to complete records
    Enrich,
    /// Train and score the outage duration model
    Train,
    /// Show pipeline statistics
    Stats,
    /// Scrape + parse in one go
    Run,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;
    let conn = db::connect(&settings.db_path)?;
    db::init_schema(&conn)?;

    let result = match cli.command {
        Commands::Scrape => {
            println!("Scraping pages {}..={}...", settings.first_page, settings.last_page);
            let stats = scraper::scrape_listing(&conn, &settings).await?;
            println!(
                "Done: {} pages ({} ok, {} errors), {} notices stored.",
                stats.pages, stats.ok, stats.errors, stats.announcements
            );
            Ok(())
        }
        Commands::Import { file } => {
            let n = export::import_announcements(&conn, &file)?;
            println!("Imported {} notices from {}", n, file.display());
            Ok(())
        }
        Commands::Parse => parse_stored(&conn, &settings).map(|counts| counts.print()),
        Commands::Export { all, rejections, file } => {
            if rejections {
                let lines = db::fetch_rejections(&conn)?;
                export::write_json(&file, &lines)?;
                println!("Wrote {} rejected lines to {}", lines.len(), file.display());
            } else {
                let mut records: Vec<_> = db::fetch_records(&conn)?.into_iter().map(|(_, r)| r).collect();
                if !all {
                    records = settings.completeness_filter().apply(records);
                }
                export::write_json(&file, &records)?;
                println!("Wrote {} records to {}", records.len(), file.display());
            }
            Ok(())
        }
        Commands::Enrich => {
            let stats = enrich::enrich_all(&conn, &settings).await?;
            println!(
                "Enriched {} of {} complete records ({} without a usable time window, {} not geocoded).",
                stats.enriched, stats.candidates, stats.no_duration, stats.no_coordinates
            );
            Ok(())
        }
        Commands::Train => {
            let records = db::fetch_enriched(&conn)?;
            if records.is_empty() {
                println!("No enriched records. Run 'enrich' first.");
                return Ok(());
            }
            let eval = model::train_and_evaluate(&records, &settings)?;
            println!(
                "Random forest: {} trees, {} features, {} train / {} test rows",
                settings.trees, eval.features, eval.train_rows, eval.test_rows
            );
            println!("RMSE: {:.3} h", eval.rmse);
            println!("R²:   {:.3}", eval.r2);
            println!("\n{:>8} | {:>9}", "actual", "predicted");
            println!("{}", "-".repeat(20));
            for (actual, predicted) in &eval.samples {
                println!("{:>8.2} | {:>9.2}", actual, predicted);
            }
            Ok(())
        }
        Commands::Stats => {
            let s = db::get_stats(&conn)?;
            println!("Announcements:  {}", s.announcements);
            println!("Records:        {}", s.records);
            println!("  inferred year {}", s.inferred_years);
            println!("  with location {}", s.with_location);
            println!("Rejected:       {}", s.rejections);
            println!("Enriched:       {}", s.enriched);
            println!("  with temp     {}", s.with_temperature);
            Ok(())
        }
        Commands::Run => {
            // Phase 1: Scrape
            let t_scrape = Instant::now();
            println!("Pipeline: scraping pages {}..={}...", settings.first_page, settings.last_page);
            let stats = scraper::scrape_listing(&conn, &settings).await?;
            println!(
                "Scraped {} pages ({} ok, {} errors) in {:.1}s",
                stats.pages, stats.ok, stats.errors, t_scrape.elapsed().as_secs_f64()
            );

            // Phase 2: Parse
            let t_parse = Instant::now();
            let counts = parse_stored(&conn, &settings)?;
            println!("Parsed in {:.1}s", t_parse.elapsed().as_secs_f64());
            counts.print();
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

struct ParseCounts {
    announcements: usize,
    records: usize,
    complete: usize,
    rejected: usize,
    last_stated_year: Option<i32>,
}

impl ParseCounts {
    fn print(&self) {
        println!(
            "Parsed {} notices: {} records ({} complete), {} rejected.",
            self.announcements, self.records, self.complete, self.rejected,
        );
        match self.last_stated_year {
            Some(year) => println!("Last stated year: {}", year),
            None => println!("No notice stated a year; fallback year used throughout."),
        }
    }
}

fn parse_stored(conn: &Connection, settings: &Settings) -> anyhow::Result<ParseCounts> {
    let lines = db::fetch_announcements(conn)?;
    if lines.is_empty() {
        println!("No notices stored. Run 'scrape' or 'import' first.");
    }
    let outcome = parser::parse_announcements(&lines, settings.initial_state(), &settings.city_matcher());
    let filter = settings.completeness_filter();
    let complete = outcome
        .records
        .iter()
        .filter(|r| filter.first_missing(r).is_none())
        .count();
    db::save_parse_run(conn, &outcome.records, outcome.rejected.entries())?;

    Ok(ParseCounts {
        announcements: lines.len(),
        records: outcome.records.len(),
        complete,
        rejected: outcome.rejected.len(),
        last_stated_year: outcome.state.last_valid_year,
    })
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
