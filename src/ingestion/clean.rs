//! Cleaning functions - the ordered pipeline from raw rows to an
//! analysis-ready table
//!
//! Stage order is load-bearing: response times must exist before the filter
//! stage can drop non-positive ones, and winsorization assumes duplicates
//! are already gone. Only the final stage is conditional.

use crate::ingestion::types::{
    ChannelOutcome, CleanOptions, CleanReport, ComplaintRecord, DedupOutcome, FilterOutcome,
    RowRequirements, SourceRow, TopTypesOutcome, WinsorizeOutcome,
};
use crate::ingestion::utils::{canonical_channel, parse_timestamp, percentile};
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

/// Stage 1: parse created and closed dates into timestamps
/// Unparseable or missing values become None, never an error
pub fn parse_dates(rows: Vec<SourceRow>) -> Vec<ComplaintRecord> {
    rows.into_iter()
        .map(|row| ComplaintRecord {
            unique_key: row.unique_key,
            created_date: row.created_date.as_deref().and_then(parse_timestamp),
            closed_date: row.closed_date.as_deref().and_then(parse_timestamp),
            complaint_type: row.complaint_type,
            borough: row.borough,
            open_data_channel_type: row.open_data_channel_type,
            response_time_days: None,
        })
        .collect()
}

/// Stage 2: compute response time in fractional days
/// Rows missing either date keep a None response time for stage 3 to resolve
pub fn compute_response_time(records: Vec<ComplaintRecord>) -> Vec<ComplaintRecord> {
    records
        .into_iter()
        .map(|record| {
            let response_time = match (record.created_date, record.closed_date) {
                (Some(created), Some(closed)) => Some(crate::response_time_days(created, closed)),
                _ => None,
            };

            ComplaintRecord {
                response_time_days: response_time,
                ..record
            }
        })
        .collect()
}

/// Stage 3: drop rows with missing required fields or invalid response times
///
/// The field requirements are toggleable; rows with a present response time
/// of zero or less are data entry errors and removed unconditionally.
pub fn filter_invalid_rows(
    records: Vec<ComplaintRecord>,
    requirements: &RowRequirements,
) -> (Vec<ComplaintRecord>, FilterOutcome) {
    let initial_count = records.len();

    let kept: Vec<ComplaintRecord> = records
        .into_iter()
        .filter(|record| {
            if requirements.require_created_date && record.created_date.is_none() {
                return false;
            }
            if requirements.require_closed_date && record.closed_date.is_none() {
                return false;
            }
            if requirements.require_borough && record.borough.is_none() {
                return false;
            }
            !matches!(record.response_time_days, Some(days) if days <= 0.0)
        })
        .collect();

    let outcome = FilterOutcome {
        removed: initial_count - kept.len(),
        remaining: kept.len(),
    };
    (kept, outcome)
}

/// Stage 4: standardize the intake channel into Phone, Web, or App
/// Unmapped and missing values default to Web
pub fn standardize_channel_type(
    records: Vec<ComplaintRecord>,
) -> (Vec<ComplaintRecord>, ChannelOutcome) {
    let mut outcome = ChannelOutcome::default();

    let records = records
        .into_iter()
        .map(|record| {
            let canonical = canonical_channel(record.open_data_channel_type.as_deref());
            *outcome.distribution.entry(canonical.to_string()).or_insert(0) += 1;

            ComplaintRecord {
                open_data_channel_type: Some(canonical.to_string()),
                ..record
            }
        })
        .collect();

    (records, outcome)
}

/// Stage 5: remove rows sharing a unique_key, keeping the first occurrence
pub fn remove_duplicates(records: Vec<ComplaintRecord>) -> (Vec<ComplaintRecord>, DedupOutcome) {
    let initial_count = records.len();
    let mut seen: HashSet<String> = HashSet::with_capacity(initial_count);

    let kept: Vec<ComplaintRecord> = records
        .into_iter()
        .filter(|record| seen.insert(record.unique_key.clone()))
        .collect();

    let outcome = DedupOutcome {
        removed: initial_count - kept.len(),
        remaining: kept.len(),
    };
    (kept, outcome)
}

/// Stage 6: cap response times above the given percentile at that percentile
///
/// Values below the threshold are untouched, so row count is preserved while
/// outlier influence is limited. When no response time values are present
/// the stage is skipped with a warning.
pub fn winsorize_response_time(
    records: Vec<ComplaintRecord>,
    pct: f64,
) -> (Vec<ComplaintRecord>, WinsorizeOutcome) {
    let values: Vec<f64> = records
        .iter()
        .filter_map(|record| record.response_time_days)
        .collect();

    let Some(threshold) = percentile(&values, pct) else {
        warn!("No response times present. Skipping winsorization.");
        return (records, WinsorizeOutcome::default());
    };

    let mut capped = 0;
    let records = records
        .into_iter()
        .map(|record| match record.response_time_days {
            Some(days) if days > threshold => {
                capped += 1;
                ComplaintRecord {
                    response_time_days: Some(threshold),
                    ..record
                }
            }
            _ => record,
        })
        .collect();

    let outcome = WinsorizeOutcome {
        threshold: Some(threshold),
        capped,
    };
    (records, outcome)
}

/// Stage 7: keep only the most frequent complaint types
///
/// With `min_count` set, every type at or above that frequency is kept and
/// `top_n` is ignored. Otherwise the `top_n` most frequent types are kept.
/// Ties rank in first-encountered order, so the selection is deterministic.
pub fn select_top_complaint_types(
    records: Vec<ComplaintRecord>,
    top_n: Option<usize>,
    min_count: Option<usize>,
) -> (Vec<ComplaintRecord>, TopTypesOutcome) {
    let initial_count = records.len();

    // frequency per type, remembering first-encounter order for stable ties
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut encounter_order: Vec<String> = Vec::new();
    for record in &records {
        if let Some(complaint_type) = &record.complaint_type {
            if !counts.contains_key(complaint_type) {
                encounter_order.push(complaint_type.clone());
            }
            *counts.entry(complaint_type.clone()).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = encounter_order
        .into_iter()
        .map(|complaint_type| {
            let count = counts.get(&complaint_type).copied().unwrap_or(0);
            (complaint_type, count)
        })
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));

    let kept: Vec<(String, usize)> = match (min_count, top_n) {
        (Some(min), _) => ranked.into_iter().filter(|(_, count)| *count >= min).collect(),
        (None, Some(n)) => ranked.into_iter().take(n).collect(),
        (None, None) => ranked,
    };

    let kept_names: HashSet<&str> = kept.iter().map(|(name, _)| name.as_str()).collect();
    let records: Vec<ComplaintRecord> = records
        .into_iter()
        .filter(|record| {
            record
                .complaint_type
                .as_deref()
                .is_some_and(|complaint_type| kept_names.contains(complaint_type))
        })
        .collect();

    let outcome = TopTypesOutcome {
        kept,
        removed: initial_count - records.len(),
        remaining: records.len(),
    };
    (records, outcome)
}

/// Run all cleaning stages in order and return the final table with the
/// aggregated diagnostics
///
/// Stages 1 through 6 always run; stage 7 runs only when a top-N count or a
/// minimum frequency is configured.
pub fn clean(rows: Vec<SourceRow>, options: &CleanOptions) -> (Vec<ComplaintRecord>, CleanReport) {
    let initial_rows = rows.len();
    info!("Starting data cleaning with {} rows", initial_rows);

    info!("Step 1/7: Parsing dates...");
    let records = parse_dates(rows);

    info!("Step 2/7: Computing response times...");
    let records = compute_response_time(records);

    info!("Step 3/7: Filtering invalid rows...");
    let (records, filter) = filter_invalid_rows(records, &options.requirements);

    info!("Step 4/7: Standardizing channel types...");
    let (records, channels) = standardize_channel_type(records);

    info!("Step 5/7: Removing duplicates...");
    let (records, duplicates) = remove_duplicates(records);

    info!(
        "Step 6/7: Winsorizing response times at the {}th percentile...",
        options.winsorize_percentile
    );
    let (records, winsorize) = winsorize_response_time(records, options.winsorize_percentile);

    let run_selection =
        options.top_complaint_types.is_some() || options.min_complaint_count.is_some();
    let (records, top_types) = if run_selection {
        info!("Step 7/7: Selecting top complaint types...");
        let (records, outcome) = select_top_complaint_types(
            records,
            options.top_complaint_types,
            options.min_complaint_count,
        );
        (records, Some(outcome))
    } else {
        info!("Step 7/7: Keeping all complaint types");
        (records, None)
    };

    let report = CleanReport {
        initial_rows,
        filter,
        channels,
        duplicates,
        winsorize,
        top_types,
        final_rows: records.len(),
    };
    info!("Cleaning complete: {} rows remain", report.final_rows);

    (records, report)
}
