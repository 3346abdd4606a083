//! Feed client: items, sources and the new-item poller
//!
//! The external feed is an ordered (newest-first) sequence of items, each
//! carrying a stable identity, a revision/update timestamp and a category
//! discriminator separating pinned items from ordinary ones. This module
//! provides:
//!
//! - [`FeedItem`], the concrete wire shape the HTTP source decodes
//! - [`FeedSource`], the async trait a data source implements
//! - [`HttpFeedSource`], a reqwest-backed source for JSON feed endpoints
//! - [`FeedPoller`], which owns one [`DedupCache`] per feed and yields only
//!   the items not reported by a previous poll
//!
//! All failures surfaced here are recoverable from the scheduler's point of
//! view: a failed poll is logged and the polling job keeps its schedule.

use std::num::NonZeroUsize;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::dedup::{DedupCache, FeedEntry};
use crate::error::Result;

/// Default dedup capacity per polled feed
pub const DEFAULT_CACHE_CAPACITY: usize = 32;

// ============================================================================
// Errors
// ============================================================================

/// Errors surfaced by the feed client (recoverable)
#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-success HTTP status from the feed endpoint
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    /// Response body did not decode as a feed page
    #[error("malformed feed payload: {0}")]
    Payload(String),
}

// ============================================================================
// Items
// ============================================================================

/// Category discriminator for feed items
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// Reported on every poll regardless of position or edits
    Pinned,

    /// Deduplicated by (id, revision)
    #[default]
    #[serde(other)]
    Ordinary,
}

/// One item of the external feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    /// Stable identity, constant across edits
    pub id: String,

    /// Update timestamp; changes when the item is edited in place
    #[serde(default)]
    pub updated_at: i64,

    /// Pinned or ordinary
    #[serde(default)]
    pub kind: ItemKind,

    /// Free-form item text, not interpreted by the runtime
    #[serde(default)]
    pub body: Option<String>,
}

impl FeedEntry for FeedItem {
    fn id(&self) -> &str {
        &self.id
    }

    fn revision(&self) -> i64 {
        self.updated_at
    }

    fn is_pinned(&self) -> bool {
        self.kind == ItemKind::Pinned
    }
}

// ============================================================================
// Sources
// ============================================================================

/// A data source exposing the feed newest-first
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the current feed page, newest item first
    async fn fetch(&self) -> Result<Vec<FeedItem>>;
}

/// HTTP feed source decoding a JSON array of items
pub struct HttpFeedSource {
    client: reqwest::Client,
    url: Url,
}

impl HttpFeedSource {
    /// Create a source for one feed endpoint, sharing the given client
    pub fn new(client: reqwest::Client, url: Url) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self) -> Result<Vec<FeedItem>> {
        let response = self.client.get(self.url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                url: self.url.to_string(),
            }
            .into());
        }

        let body = response.text().await?;
        let items: Vec<FeedItem> =
            serde_json::from_str(&body).map_err(|e| ApiError::Payload(e.to_string()))?;
        Ok(items)
    }
}

// ============================================================================
// Poller
// ============================================================================

/// Polls one feed and yields only items not reported by a previous poll
///
/// One poller (and thus one dedup cache) per distinct feed being watched;
/// not designed for concurrent callers.
pub struct FeedPoller {
    source: Box<dyn FeedSource>,
    cache: DedupCache,
}

impl FeedPoller {
    /// Create a poller over a source with the given dedup capacity
    pub fn new(source: Box<dyn FeedSource>, capacity: NonZeroUsize) -> Self {
        Self {
            source,
            cache: DedupCache::new(capacity),
        }
    }

    /// Fetch the full feed without touching the dedup cache
    ///
    /// Used by low-frequency sweeps that must see every item, not just the
    /// new ones.
    pub async fn poll_all(&mut self) -> Result<Vec<FeedItem>> {
        self.source.fetch().await
    }

    /// Fetch the feed and return exactly the items that are new since the
    /// previous call, in feed order
    pub async fn poll_new(&mut self) -> Result<Vec<FeedItem>> {
        let page = self.source.fetch().await?;
        let total = page.len();
        let fresh = self.cache.fresh(page);
        tracing::debug!(
            generation = self.cache.generation(),
            fetched = total,
            new = fresh.len(),
            "poll finished"
        );
        Ok(fresh)
    }
}
