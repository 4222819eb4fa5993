//! Core data types for the ingestion pipeline
//! Pure data structures with no behavior

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One service request row as returned by the Socrata API
/// Every value arrives as text; unknown fields on the wire are ignored
#[derive(Debug, Clone, Deserialize)]
pub struct SourceRow {
    pub unique_key: String,
    pub created_date: Option<String>,
    pub closed_date: Option<String>,
    pub complaint_type: Option<String>,
    pub borough: Option<String>,
    pub open_data_channel_type: Option<String>,
}

/// Cleaned service request record with typed dates and computed response time
#[derive(Debug, Clone, Serialize)]
pub struct ComplaintRecord {
    pub unique_key: String,
    pub created_date: Option<NaiveDateTime>,
    pub closed_date: Option<NaiveDateTime>,
    pub complaint_type: Option<String>,
    pub borough: Option<String>,
    pub open_data_channel_type: Option<String>,
    pub response_time_days: Option<f64>,
}

/// Which missing-field checks the filter stage applies
/// Non-positive response times are removed regardless of these toggles
#[derive(Debug, Clone)]
pub struct RowRequirements {
    pub require_created_date: bool,
    pub require_closed_date: bool,
    pub require_borough: bool,
}

impl Default for RowRequirements {
    fn default() -> Self {
        RowRequirements {
            require_created_date: true,
            require_closed_date: true,
            require_borough: true,
        }
    }
}

/// Knobs for the cleaning driver
#[derive(Debug, Clone)]
pub struct CleanOptions {
    /// Percentile used to cap response time outliers
    pub winsorize_percentile: f64,
    /// Keep only the N most frequent complaint types
    pub top_complaint_types: Option<usize>,
    /// Keep every complaint type with at least this many records
    /// Takes precedence over `top_complaint_types` when both are set
    pub min_complaint_count: Option<usize>,
    pub requirements: RowRequirements,
}

impl Default for CleanOptions {
    fn default() -> Self {
        CleanOptions {
            winsorize_percentile: 99.0,
            top_complaint_types: None,
            min_complaint_count: None,
            requirements: RowRequirements::default(),
        }
    }
}

/// Rows dropped by the filter stage
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    pub removed: usize,
    pub remaining: usize,
}

impl std::fmt::Display for FilterOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "removed: {}, remaining: {}", self.removed, self.remaining)
    }
}

/// Canonical channel distribution after standardization
#[derive(Debug, Clone, Default)]
pub struct ChannelOutcome {
    pub distribution: BTreeMap<String, usize>,
}

/// Duplicate rows dropped by the deduplication stage
#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    pub removed: usize,
    pub remaining: usize,
}

impl std::fmt::Display for DedupOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "removed: {}, remaining: {}", self.removed, self.remaining)
    }
}

/// Threshold applied by the winsorization stage
/// `threshold` is None when no response time values were present
#[derive(Debug, Clone, Default)]
pub struct WinsorizeOutcome {
    pub threshold: Option<f64>,
    pub capped: usize,
}

/// Complaint types kept by the top-type selection stage, most frequent first
#[derive(Debug, Clone, Default)]
pub struct TopTypesOutcome {
    pub kept: Vec<(String, usize)>,
    pub removed: usize,
    pub remaining: usize,
}

/// Aggregated diagnostics from one cleaning run
/// Returned data, not console narration; callers log, assert, or ignore it
#[derive(Debug, Clone, Default)]
pub struct CleanReport {
    pub initial_rows: usize,
    pub filter: FilterOutcome,
    pub channels: ChannelOutcome,
    pub duplicates: DedupOutcome,
    pub winsorize: WinsorizeOutcome,
    /// Present only when the top-type stage ran
    pub top_types: Option<TopTypesOutcome>,
    pub final_rows: usize,
}
