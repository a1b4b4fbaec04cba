use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use super::extractor::{extract_entries, FeedEntry};
use crate::friends::TrackedEntity;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while fetching a single feed.
#[derive(Debug, Error)]
pub enum FeedFetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request plus body read exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
}

/// A feed entry tagged with the friend whose feed it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentEntry {
    pub friend_id: String,
    #[serde(flatten)]
    pub entry: FeedEntry,
}

/// Fetches one feed and extracts its entries, newest first.
///
/// The whole exchange (request and body) is bounded by `timeout`.
pub async fn fetch_feed(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<Vec<FeedEntry>, FeedFetchError> {
    let bytes = tokio::time::timeout(timeout, async {
        let response = client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FeedFetchError::HttpStatus(response.status().as_u16()));
        }
        read_limited_bytes(response, MAX_FEED_SIZE).await
    })
    .await
    .map_err(|_| FeedFetchError::Timeout)??;

    let text = String::from_utf8_lossy(&bytes);
    Ok(extract_entries(&text))
}

/// Fetches the feed of every friend that has an `rss` URL.
///
/// Feeds are fetched concurrently, at most `concurrency` at a time. A feed
/// that fails is logged and maps to an empty list; it never affects the
/// others. Friends without a feed URL are absent from the result.
pub async fn fetch_friend_feeds(
    client: &reqwest::Client,
    friends: &[TrackedEntity],
    timeout: Duration,
    concurrency: usize,
) -> HashMap<String, Vec<FeedEntry>> {
    stream::iter(friends.iter().filter_map(|f| {
        f.rss
            .as_deref()
            .map(|rss| (f.id.clone(), f.name.clone(), rss.to_string()))
    }))
    .map(|(id, name, url)| async move {
        let entries = match fetch_feed(client, &url, timeout).await {
            Ok(entries) => {
                tracing::debug!(friend = %name, url = %url, entries = entries.len(), "Fetched friend feed");
                entries
            }
            Err(e) => {
                tracing::warn!(friend = %name, url = %url, error = %e, "Failed to fetch friend feed");
                Vec::new()
            }
        };
        (id, entries)
    })
    .buffer_unordered(concurrency.max(1))
    .collect()
    .await
}

/// Merges all friends' entries and keeps the `count` most recent.
pub fn recent_entries(feeds: &HashMap<String, Vec<FeedEntry>>, count: usize) -> Vec<RecentEntry> {
    let mut all: Vec<RecentEntry> = feeds
        .iter()
        .flat_map(|(friend_id, entries)| {
            entries.iter().map(move |entry| RecentEntry {
                friend_id: friend_id.clone(),
                entry: entry.clone(),
            })
        })
        .collect();

    all.sort_by(|a, b| {
        b.entry
            .pub_date
            .cmp(&a.entry.pub_date)
            .then_with(|| a.friend_id.cmp(&b.friend_id))
    });
    all.truncate(count);
    all
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FeedFetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FeedFetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FeedFetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
