// Library module for the NYC 311 ingestion pipeline

pub mod ingestion;

use chrono::NaiveDateTime;

/// Calculate elapsed time between creation and closure in fractional days
/// Formula: whole elapsed seconds / 86 400
/// Negative when the record closed before it was created
pub fn response_time_days(created: NaiveDateTime, closed: NaiveDateTime) -> f64 {
    (closed - created).num_seconds() as f64 / 86_400.0
}
