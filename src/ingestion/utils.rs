//! Small pure helpers shared by the cleaning stages

use chrono::NaiveDateTime;

/// Accepted layouts for Socrata floating timestamps
const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"];

/// Raw channel label (uppercased and trimmed) to canonical label
pub const CHANNEL_MAPPING: &[(&str, &str)] = &[
    ("PHONE", "Phone"),
    ("ONLINE", "Web"),
    ("UNKNOWN", "Web"),
    ("MOBILE", "App"),
    ("OTHER", "Web"),
];

/// Fallback for unmapped or missing channel labels
pub const DEFAULT_CHANNEL: &str = "Web";

/// Parse a Socrata timestamp string, returning None for anything unparseable
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
}

/// Map a raw intake channel label to one of the canonical labels
pub fn canonical_channel(raw: Option<&str>) -> &'static str {
    let normalized = match raw {
        Some(value) => value.trim().to_uppercase(),
        None => return DEFAULT_CHANNEL,
    };

    CHANNEL_MAPPING
        .iter()
        .find(|(from, _)| *from == normalized)
        .map(|(_, to)| *to)
        .unwrap_or(DEFAULT_CHANNEL)
}

/// Value at `pct` (0..=100) of the input, using linear interpolation between
/// closest ranks. Returns None for an empty input.
pub fn percentile(values: &[f64], pct: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let fraction = (pct / 100.0).clamp(0.0, 1.0);
    let rank = fraction * (sorted.len() - 1) as f64;
    let below = rank.floor() as usize;
    let above = rank.ceil() as usize;

    if below == above {
        return Some(sorted[below]);
    }

    let weight = rank - below as f64;
    Some(sorted[below] + (sorted[above] - sorted[below]) * weight)
}
