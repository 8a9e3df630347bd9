use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::store::KeyLedger;

use super::status::parse_stat_xml;

/// Fetch timeout for the ingest status endpoint. The dashboard polls on a
/// short cadence; a slow ingest server reads as "no streams".
const FETCH_TIMEOUT: Duration = Duration::from_secs(3);

/// Default status endpoint: the ingest container's well-known stat path.
pub const DEFAULT_STAT_URL: &str = "http://rtmp:8080/stat";

/// One currently-live stream, labelled with the publisher name when the
/// stream id maps back to a ledger entry.
#[derive(Debug, Clone, Serialize)]
pub struct LiveFeed {
    pub stream_id: String,
    pub label: String,
    pub uptime_seconds: u64,
    pub client_count: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub bandwidth_in: u64,
    pub bandwidth_out: u64,
}

/// Polls the ingest server's status document and maps raw stream ids back
/// to publisher names.
#[derive(Clone)]
pub struct FeedWatcher {
    client: reqwest::Client,
    stat_url: String,
}

impl FeedWatcher {
    pub fn new(stat_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .expect("build status reqwest client");

        Self {
            client,
            stat_url: stat_url.into(),
        }
    }

    /// Fetch and label the currently-live streams.
    ///
    /// Every failure mode (unreachable endpoint, timeout, non-2xx, broken
    /// body) degrades to an empty list plus a diagnostic, so the dashboard
    /// stays available through ingest-server hiccups. Callers that need
    /// alerting inspect the diagnostic.
    pub async fn list_active(&self, ledger: &KeyLedger) -> (Vec<LiveFeed>, Option<String>) {
        let body = match self.fetch_status().await {
            Ok(body) => body,
            Err(reason) => {
                warn!(url = %self.stat_url, %reason, "ingest status fetch failed");
                return (Vec::new(), Some(reason));
            }
        };

        // One fresh ledger snapshot per call. An unreadable ledger only
        // costs the friendly labels, not the dashboard.
        let mapping = match ledger.load() {
            Ok(map) => map,
            Err(e) => {
                warn!(error = %e, "key ledger unreadable while labelling feeds");
                Default::default()
            }
        };

        let feeds: Vec<LiveFeed> = parse_stat_xml(&body)
            .into_iter()
            .map(|s| {
                let label = mapping
                    .iter()
                    .find(|(_, key)| key.as_str() == s.name)
                    .map(|(name, _)| name.clone())
                    .unwrap_or_else(|| s.name.clone());
                LiveFeed {
                    label,
                    stream_id: s.name,
                    uptime_seconds: s.uptime_seconds,
                    client_count: s.client_count,
                    bytes_in: s.bytes_in,
                    bytes_out: s.bytes_out,
                    bandwidth_in: s.bandwidth_in,
                    bandwidth_out: s.bandwidth_out,
                }
            })
            .collect();

        debug!(url = %self.stat_url, count = feeds.len(), "ingest status fetched");
        (feeds, None)
    }

    async fn fetch_status(&self) -> Result<String, String> {
        let resp = self
            .client
            .get(&self.stat_url)
            .send()
            .await
            .map_err(|e| format!("status endpoint unreachable: {e}"))?;

        if !resp.status().is_success() {
            return Err(format!("status endpoint returned {}", resp.status()));
        }

        resp.text()
            .await
            .map_err(|e| format!("status body unreadable: {e}"))
    }
}
