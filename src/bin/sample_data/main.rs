//! Sample extractor - draws a deterministic subset of the cleaned dataset
//! so it can be shared without shipping the full year of data

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::env;
use std::fs;
use std::path::PathBuf;
use tracing::info;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env();

    info!("Reading full dataset from {:?}", config.input_path);
    let mut reader = csv::Reader::from_path(&config.input_path)
        .with_context(|| format!("failed to open {:?}", config.input_path))?;
    let headers = reader.headers()?.clone();
    let rows: Vec<csv::StringRecord> = reader
        .records()
        .collect::<Result<_, _>>()
        .context("failed to read cleaned dataset")?;
    info!("Full dataset: {} rows", rows.len());

    // seeded so the same sample is drawn on every run
    let mut rng = StdRng::seed_from_u64(config.seed);
    let sample: Vec<&csv::StringRecord> = if rows.len() > config.sample_size {
        rows.choose_multiple(&mut rng, config.sample_size).collect()
    } else {
        rows.iter().collect()
    };

    if let Some(parent) = config.output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut writer = csv::Writer::from_path(&config.output_path)
        .with_context(|| format!("failed to create {:?}", config.output_path))?;
    writer.write_record(&headers)?;
    for row in &sample {
        writer.write_record(*row)?;
    }
    writer.flush()?;

    info!(
        "Sample dataset saved to {:?} ({} rows)",
        config.output_path,
        sample.len()
    );

    Ok(())
}

/// Configuration loaded from environment variables
struct Config {
    input_path: PathBuf,
    output_path: PathBuf,
    sample_size: usize,
    seed: u64,
}

impl Config {
    fn from_env() -> Self {
        Config {
            input_path: env::var("CLEANED_PATH")
                .unwrap_or_else(|_| "data/processed/nyc311_cleaned.csv".to_string())
                .into(),

            output_path: env::var("SAMPLE_PATH")
                .unwrap_or_else(|_| "data/sample/nyc311_sample.csv".to_string())
                .into(),

            sample_size: env::var("SAMPLE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1000),

            seed: env::var("SAMPLE_SEED")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(42),
        }
    }
}
