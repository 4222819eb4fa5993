//! Data ingestion orchestrator - fetches, cleans, and persists one year of
//! NYC 311 service requests

use anyhow::Result;
use nyc311_ingestion::ingestion::fetch::{self, DEFAULT_LIMIT};
use nyc311_ingestion::ingestion::{clean, write, CleanOptions, CleanReport, RowRequirements};
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env();
    info!("Configuration loaded");

    info!("=== NYC 311 Pipeline ===");

    // Step 1: Fetch raw rows for the configured year
    info!("Step 1/3: Fetching data for year {}...", config.year);
    let rows =
        fetch::fetch_complaints(config.app_token.as_deref(), config.page_limit, config.year)
            .await?;
    info!("✓ Fetched {} rows", rows.len());

    // Step 2: Run the cleaning pipeline
    info!("Step 2/3: Cleaning data...");
    let (records, report) = clean::clean(rows, &config.clean_options());
    log_report(&report);
    info!("✓ Cleaned down to {} rows", records.len());

    // Step 3: Persist the cleaned table
    info!("Step 3/3: Writing output...");
    let written = write::write_complaints_csv(&records, &config.output_path)?;
    info!("✓ Write complete ({} rows)", written);

    Ok(())
}

fn log_report(report: &CleanReport) {
    if report.filter.removed > 0 {
        info!("Invalid rows: {}", report.filter);
    }

    info!("Channel type distribution after standardization:");
    for (channel, count) in &report.channels.distribution {
        info!("  {}: {}", channel, count);
    }

    if report.duplicates.removed > 0 {
        info!("Duplicates: {}", report.duplicates);
    }

    match report.winsorize.threshold {
        Some(threshold) => info!(
            "Winsorized {} values at {:.2} days",
            report.winsorize.capped, threshold
        ),
        None => warn!("No response times present; winsorization skipped"),
    }

    if let Some(top_types) = &report.top_types {
        info!(
            "Kept {} complaint types ({} rows removed):",
            top_types.kept.len(),
            top_types.removed
        );
        for (complaint_type, count) in &top_types.kept {
            info!("  - {}: {} records", complaint_type, count);
        }
    }
}

/// Configuration loaded from environment variables
#[derive(Debug, Clone)]
struct Config {
    app_token: Option<String>,
    year: i32,
    page_limit: usize,
    output_path: PathBuf,
    winsorize_percentile: f64,
    top_complaint_types: Option<usize>,
    min_complaint_count: Option<usize>,
}

impl Config {
    fn from_env() -> Self {
        Config {
            app_token: env::var("SOCRATA_APP_TOKEN")
                .ok()
                .filter(|token| !token.trim().is_empty()),

            year: env::var("FETCH_YEAR")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2024),

            page_limit: env::var("PAGE_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_LIMIT),

            output_path: env::var("OUTPUT_PATH")
                .unwrap_or_else(|_| "data/processed/nyc311_cleaned.csv".to_string())
                .into(),

            winsorize_percentile: env::var("WINSORIZE_PERCENTILE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(99.0),

            top_complaint_types: env::var("TOP_COMPLAINT_TYPES")
                .ok()
                .and_then(|s| s.parse().ok()),

            min_complaint_count: env::var("MIN_COMPLAINT_COUNT")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }

    fn clean_options(&self) -> CleanOptions {
        CleanOptions {
            winsorize_percentile: self.winsorize_percentile,
            top_complaint_types: self.top_complaint_types,
            min_complaint_count: self.min_complaint_count,
            requirements: RowRequirements::default(),
        }
    }
}
