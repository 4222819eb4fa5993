//! Fetch functions - paginated retrieval from the NYC 311 Socrata API

use crate::ingestion::types::SourceRow;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Resource endpoint for the 311 service request dataset (id erm2-nwe9)
pub const BASE_URL: &str = "https://data.cityofnewyork.us/resource/erm2-nwe9.json";
/// Page size used when none is configured
pub const DEFAULT_LIMIT: usize = 25_000;
/// Largest page size the API accepts
pub const MAX_LIMIT: usize = 50_000;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Application-level attempts per page for timeouts and connection failures
const MAX_RETRIES: u32 = 3;
/// Base application-level backoff, doubled on each attempt
const RETRY_DELAY_SECS: u64 = 2;

/// Transport-level attempts per request for retryable server statuses
const TRANSPORT_RETRIES: u32 = 3;
const RETRYABLE_STATUSES: &[u16] = &[429, 500, 502, 503, 504];

/// Errors surfaced by the fetcher
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("page size must be between 1 and {}, got {0}", MAX_LIMIT)]
    InvalidLimit(usize),

    /// Read timeout or connection failure, retried at the application level
    #[error("transport failure: {0}")]
    Transport(String),

    /// Any other HTTP failure, including non-retryable statuses
    #[error("HTTP request failed: {0}")]
    Http(#[source] reqwest::Error),
}

impl FetchError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            FetchError::Transport(err.to_string())
        } else {
            FetchError::Http(err)
        }
    }

    /// Whether the application-level retry loop should try again
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transport(_))
    }
}

/// A page-granularity source of service request rows
///
/// The production implementation talks to Socrata. Tests substitute scripted
/// sources to observe pagination and backoff behavior without the network.
#[async_trait]
pub trait PageSource {
    async fn page(&mut self, offset: usize) -> Result<Vec<SourceRow>, FetchError>;

    /// Wait out an application-level retry delay
    async fn backoff(&mut self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Socrata query parameters for one page of the target year
fn build_page_params(year: i32, limit: usize, offset: usize) -> Vec<(&'static str, String)> {
    let start = format!("{}-01-01T00:00:00", year);
    let end = format!("{}-12-31T23:59:59", year);

    vec![
        ("$limit", limit.to_string()),
        ("$offset", offset.to_string()),
        ("$order", "created_date".to_string()),
        (
            "$where",
            format!("created_date between '{}' and '{}'", start, end),
        ),
    ]
}

/// HTTP client for the 311 dataset
pub struct SocrataClient {
    client: Client,
    app_token: Option<String>,
    limit: usize,
    year: i32,
}

impl SocrataClient {
    pub fn new(app_token: Option<&str>, limit: usize, year: i32) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(FetchError::from_reqwest)?;

        Ok(SocrataClient {
            client,
            app_token: app_token.map(str::to_string),
            limit,
            year,
        })
    }
}

#[async_trait]
impl PageSource for SocrataClient {
    /// Send a single page request, retrying retryable server statuses at the
    /// transport level before anything reaches the application-level policy
    async fn page(&mut self, offset: usize) -> Result<Vec<SourceRow>, FetchError> {
        let params = build_page_params(self.year, self.limit, offset);

        for attempt in 1..=TRANSPORT_RETRIES {
            let mut request = self.client.get(BASE_URL).query(&params);
            if let Some(token) = &self.app_token {
                request = request.header("X-App-Token", token);
            }

            let response = request.send().await.map_err(FetchError::from_reqwest)?;
            let status = response.status();

            if RETRYABLE_STATUSES.contains(&status.as_u16()) && attempt < TRANSPORT_RETRIES {
                let delay = Duration::from_secs(2u64.pow(attempt));
                warn!(
                    "Server returned {} (attempt {}/{}), retrying in {:?}",
                    status, attempt, TRANSPORT_RETRIES, delay
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            let response = response.error_for_status().map_err(FetchError::from_reqwest)?;
            return response
                .json::<Vec<SourceRow>>()
                .await
                .map_err(FetchError::from_reqwest);
        }

        // the loop returns rows or an error on its final attempt
        Err(FetchError::Transport(
            "transport retries exhausted".to_string(),
        ))
    }
}

/// Application-level backoff schedule: RETRY_DELAY * 2^attempt
fn retry_delay(attempt: u32) -> Duration {
    Duration::from_secs(RETRY_DELAY_SECS * 2u64.pow(attempt))
}

/// Request one page, backing off and retrying on transient failures
async fn fetch_page_with_retry<S: PageSource + Send>(
    source: &mut S,
    offset: usize,
) -> Result<Vec<SourceRow>, FetchError> {
    let mut attempt = 0;

    loop {
        match source.page(offset).await {
            Ok(rows) => return Ok(rows),
            Err(err) if err.is_transient() && attempt + 1 < MAX_RETRIES => {
                let delay = retry_delay(attempt);
                warn!(
                    "Request failed: {}. Retrying in {:?} (attempt {}/{})",
                    err,
                    delay,
                    attempt + 1,
                    MAX_RETRIES
                );
                source.backoff(delay).await;
                attempt += 1;
            }
            Err(err) => {
                if err.is_transient() {
                    warn!("Request failed after {} attempts", MAX_RETRIES);
                }
                return Err(err);
            }
        }
    }
}

/// Pull pages at increasing offsets until the source runs dry, accumulating
/// rows in request order. An empty page or a short page is the last page.
pub(crate) async fn collect_pages<S: PageSource + Send>(
    source: &mut S,
    limit: usize,
) -> Result<Vec<SourceRow>, FetchError> {
    let mut records: Vec<SourceRow> = Vec::new();
    let mut offset = 0;
    let mut page_count = 0;

    loop {
        page_count += 1;
        info!("Fetching page {} (offset {})...", page_count, offset);

        let rows = fetch_page_with_retry(source, offset).await?;

        if rows.is_empty() {
            info!("No more rows found.");
            break;
        }

        let returned = rows.len();
        records.extend(rows);
        info!("Received {} rows (total so far: {})", returned, records.len());
        offset += limit;

        if returned < limit {
            info!("Last page reached.");
            break;
        }
    }

    Ok(records)
}

fn validate_limit(limit: usize) -> Result<(), FetchError> {
    if limit == 0 || limit > MAX_LIMIT {
        return Err(FetchError::InvalidLimit(limit));
    }
    Ok(())
}

/// Download all NYC 311 rows for a calendar year
///
/// `app_token` improves throughput but is optional. `limit` is the page size,
/// capped at 50 000 by the API; values outside `[1, 50000]` fail before any
/// network access. A page request that exhausts every retry aborts the whole
/// fetch; no partial table is returned.
pub async fn fetch_complaints(
    app_token: Option<&str>,
    limit: usize,
    year: i32,
) -> Result<Vec<SourceRow>, FetchError> {
    validate_limit(limit)?;

    info!(
        "Starting data fetch for year {} with pages of {} rows",
        year, limit
    );
    if app_token.is_some() {
        info!("App token detected. Using authenticated requests.");
    } else {
        info!("No app token. Requests may be slower.");
    }

    let mut source = SocrataClient::new(app_token, limit, year)?;
    collect_pages(&mut source, limit).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(key: &str) -> SourceRow {
        SourceRow {
            unique_key: key.to_string(),
            created_date: Some("2024-01-15T10:30:45.000".to_string()),
            closed_date: None,
            complaint_type: Some("Noise - Residential".to_string()),
            borough: Some("BROOKLYN".to_string()),
            open_data_channel_type: Some("PHONE".to_string()),
        }
    }

    fn rows(count: usize) -> Vec<SourceRow> {
        (0..count).map(|i| row(&format!("key-{}", i))).collect()
    }

    fn timeout_err() -> FetchError {
        FetchError::Transport("read timeout".to_string())
    }

    /// Scripted page source: each entry is a page of rows or a failure.
    /// Records every page call and every backoff delay instead of sleeping.
    struct ScriptedSource {
        script: Vec<Result<Vec<SourceRow>, FetchError>>,
        calls: Vec<usize>,
        waits: Vec<Duration>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<Vec<SourceRow>, FetchError>>) -> Self {
            ScriptedSource {
                script,
                calls: Vec::new(),
                waits: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl PageSource for ScriptedSource {
        async fn page(&mut self, offset: usize) -> Result<Vec<SourceRow>, FetchError> {
            self.calls.push(offset);
            if self.script.is_empty() {
                return Ok(Vec::new());
            }
            self.script.remove(0)
        }

        async fn backoff(&mut self, delay: Duration) {
            self.waits.push(delay);
        }
    }

    #[test]
    fn test_limit_bounds() {
        assert!(validate_limit(1).is_ok());
        assert!(validate_limit(DEFAULT_LIMIT).is_ok());
        assert!(validate_limit(MAX_LIMIT).is_ok());
        assert!(matches!(
            validate_limit(0),
            Err(FetchError::InvalidLimit(0))
        ));
        assert!(matches!(
            validate_limit(MAX_LIMIT + 1),
            Err(FetchError::InvalidLimit(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_limit_rejected_before_any_request() {
        let result = fetch_complaints(None, 0, 2024).await;
        assert!(matches!(result, Err(FetchError::InvalidLimit(0))));

        let result = fetch_complaints(None, MAX_LIMIT + 1, 2024).await;
        assert!(matches!(result, Err(FetchError::InvalidLimit(_))));
    }

    #[test]
    fn test_page_params_cover_the_target_year() {
        let params = build_page_params(2024, 25_000, 50_000);

        assert!(params.contains(&("$limit", "25000".to_string())));
        assert!(params.contains(&("$offset", "50000".to_string())));
        assert!(params.contains(&("$order", "created_date".to_string())));
        assert!(params.contains(&(
            "$where",
            "created_date between '2024-01-01T00:00:00' and '2024-12-31T23:59:59'".to_string()
        )));
    }

    #[test]
    fn test_retry_delays_double() {
        assert_eq!(retry_delay(0), Duration::from_secs(2));
        assert_eq!(retry_delay(1), Duration::from_secs(4));
        assert_eq!(retry_delay(2), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn test_pagination_stops_after_short_page() {
        let limit = 3;
        let mut source = ScriptedSource::new(vec![
            Ok(rows(limit)),
            Ok(rows(limit)),
            Ok(rows(limit)),
            Ok(rows(2)),
        ]);

        let records = collect_pages(&mut source, limit).await.unwrap();

        assert_eq!(records.len(), 3 * limit + 2);
        assert_eq!(source.calls, vec![0, 3, 6, 9]);
    }

    #[tokio::test]
    async fn test_pagination_stops_on_empty_page() {
        let mut source = ScriptedSource::new(vec![Ok(rows(2)), Ok(Vec::new())]);

        let records = collect_pages(&mut source, 2).await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(source.calls, vec![0, 2]);
    }

    #[tokio::test]
    async fn test_empty_first_page_yields_empty_table() {
        let mut source = ScriptedSource::new(vec![Ok(Vec::new())]);

        let records = collect_pages(&mut source, 10).await.unwrap();

        assert!(records.is_empty());
        assert_eq!(source.calls, vec![0]);
    }

    #[tokio::test]
    async fn test_rows_accumulate_in_request_order() {
        let mut source = ScriptedSource::new(vec![
            Ok(vec![row("a"), row("b")]),
            Ok(vec![row("c")]),
        ]);

        let records = collect_pages(&mut source, 2).await.unwrap();

        let keys: Vec<&str> = records.iter().map(|r| r.unique_key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_transient_failures_backed_off_then_recovered() {
        let mut source = ScriptedSource::new(vec![
            Err(timeout_err()),
            Err(timeout_err()),
            Ok(rows(1)),
        ]);

        let records = collect_pages(&mut source, 5).await.unwrap();

        assert_eq!(records.len(), 1);
        // two failures, so exactly two backoff waits before the success
        assert_eq!(
            source.waits,
            vec![Duration::from_secs(2), Duration::from_secs(4)]
        );
        assert_eq!(source.calls, vec![0, 0, 0]);
    }

    #[tokio::test]
    async fn test_exhausted_retries_abort_the_fetch() {
        let mut source = ScriptedSource::new(vec![
            Err(timeout_err()),
            Err(timeout_err()),
            Err(timeout_err()),
        ]);

        let result = collect_pages(&mut source, 5).await;

        assert!(matches!(result, Err(FetchError::Transport(_))));
        assert_eq!(source.calls.len(), MAX_RETRIES as usize);
        assert_eq!(source.waits.len(), MAX_RETRIES as usize - 1);
    }

    #[tokio::test]
    async fn test_failure_on_a_later_page_discards_nothing_silently() {
        let limit = 2;
        let mut source = ScriptedSource::new(vec![
            Ok(rows(limit)),
            Err(timeout_err()),
            Err(timeout_err()),
            Err(timeout_err()),
        ]);

        let result = collect_pages(&mut source, limit).await;

        // the whole fetch fails rather than returning the first page alone
        assert!(matches!(result, Err(FetchError::Transport(_))));
    }

    #[test]
    fn test_source_rows_tolerate_extra_and_missing_fields() {
        let json = r#"[{
            "unique_key": "63541298",
            "created_date": "2024-01-01T00:05:00.000",
            "agency": "NYPD",
            "descriptor": "Loud Music/Party"
        }]"#;

        let rows: Vec<SourceRow> = serde_json::from_str(json).unwrap();

        assert_eq!(rows[0].unique_key, "63541298");
        assert_eq!(
            rows[0].created_date.as_deref(),
            Some("2024-01-01T00:05:00.000")
        );
        assert!(rows[0].closed_date.is_none());
        assert!(rows[0].borough.is_none());
    }
}
