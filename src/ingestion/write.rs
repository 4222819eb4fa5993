//! Write functions - persist the cleaned table to disk as CSV

use crate::ingestion::types::ComplaintRecord;
use anyhow::Result;
use std::fs;
use std::path::Path;
use tracing::info;

/// Write cleaned records to a CSV file, creating parent directories as
/// needed. Returns the number of rows written.
///
/// Headers come from the record fields; timestamps are ISO 8601 and missing
/// values are empty cells.
pub fn write_complaints_csv(records: &[ComplaintRecord], path: &Path) -> Result<usize> {
    info!("Writing {} cleaned rows to {:?}", records.len(), path);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    info!("Write complete: {:?}", path);
    Ok(records.len())
}
