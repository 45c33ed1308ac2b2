//! HTTP retrieval of published CSV snapshots.

use std::time::Duration;

use reqwest::blocking::Client;
use tracing::debug;

use crate::error::FetchError;
use crate::io::RawSnapshot;

const USER_AGENT: &str = concat!("market-rollup/", env!("CARGO_PKG_VERSION"));

/// Blocking client for snapshot downloads.
pub struct SnapshotClient {
    client: Client,
}

impl SnapshotClient {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Http {
                url: String::new(),
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }

    /// Download and parse one CSV snapshot.
    pub fn fetch_csv(&self, url: &str) -> Result<RawSnapshot, FetchError> {
        debug!(url, "fetching snapshot");

        let resp = self.client.get(url).send().map_err(|e| classify(url, e))?;

        if !resp.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: resp.status().as_u16(),
            });
        }

        let body = resp.text().map_err(|e| classify(url, e))?;
        parse_body(url, &body)
    }
}

fn classify(url: &str, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout { url: url.to_string() }
    } else {
        FetchError::Http {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

/// Parse a response body, rejecting payloads without data rows.
pub(crate) fn parse_body(origin: &str, body: &str) -> Result<RawSnapshot, FetchError> {
    if body.trim().is_empty() {
        return Err(FetchError::EmptyPayload(origin.to_string()));
    }
    let snapshot = RawSnapshot::from_csv_str(body).map_err(|e| FetchError::Parse {
        origin: origin.to_string(),
        message: e.to_string(),
    })?;
    if snapshot.is_empty() {
        return Err(FetchError::EmptyPayload(origin.to_string()));
    }
    debug!(
        origin,
        columns = snapshot.headers.len(),
        rows = snapshot.records.len(),
        "parsed snapshot"
    );
    Ok(snapshot)
}
