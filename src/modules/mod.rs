//! Built-in modules
//!
//! The runtime ships two modules that wire the feed client into the
//! scheduler. Product-specific business logic (what to *do* with a new
//! item) lives in external modules registered the same way; these two only
//! demonstrate the module contract end to end:
//!
//! - `feed`: builds the shared HTTP client from its config subtree and
//!   hands out [`FeedPoller`]s for individual feeds.
//! - `poller`: requires `feed`, registers an interval poll job and a daily
//!   digest job, and logs what it finds.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::Mutex;
use url::Url;

use crate::container::{ModuleFactory, ModuleRef};
use crate::error::{Error, Result};
use crate::feed::{FeedPoller, HttpFeedSource, DEFAULT_CACHE_CAPACITY};
use crate::scheduler::{Job, JobScheduler, Trigger};

/// Registry name of the feed client module
pub const FEED_MODULE: &str = "feed";

/// Registry name of the poller module
pub const POLLER_MODULE: &str = "poller";

// ============================================================================
// Feed client module
// ============================================================================

/// Config subtree of the `feed` module
#[derive(Debug, Clone, Deserialize)]
pub struct FeedClientConfig {
    /// Base URL of the feed API
    pub base_url: Url,

    /// Dedup capacity per polled feed
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// When set, modules must skip mutating work against the API
    #[serde(default)]
    pub dry_run: bool,
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Shared HTTP feed client handed out by the `feed` module
pub struct FeedClient {
    http: reqwest::Client,
    config: FeedClientConfig,
}

impl FeedClient {
    fn from_config(config: FeedClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("feedwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    /// Whether mutating work against the API must be skipped
    pub fn dry_run(&self) -> bool {
        self.config.dry_run
    }

    /// Poller for the default feed at the configured base URL
    pub fn poller(&self) -> Result<FeedPoller> {
        self.poller_for("")
    }

    /// Poller for a feed at a path relative to the base URL
    ///
    /// One poller per distinct feed: each owns its own dedup cache.
    pub fn poller_for(&self, path: &str) -> Result<FeedPoller> {
        let url = if path.is_empty() {
            self.config.base_url.clone()
        } else {
            self.config
                .base_url
                .join(path)
                .map_err(|e| Error::config(format!("invalid feed path '{path}': {e}")))?
        };
        let capacity = NonZeroUsize::new(self.config.cache_capacity)
            .ok_or_else(|| Error::config("cache_capacity must be positive"))?;
        Ok(FeedPoller::new(
            Box::new(HttpFeedSource::new(self.http.clone(), url)),
            capacity,
        ))
    }
}

/// Factory for the `feed` module
pub fn feed_module() -> ModuleFactory<JobScheduler> {
    Box::new(|cx| {
        let config: FeedClientConfig = cx.config().parse()?;
        if config.dry_run {
            tracing::warn!("dry run mode: mutating API requests will be skipped");
        }
        let client = FeedClient::from_config(config)?;
        Ok(Arc::new(client) as ModuleRef)
    })
}

// ============================================================================
// Poller module
// ============================================================================

/// Config subtree of the `poller` module
#[derive(Debug, Clone, Deserialize)]
pub struct PollerConfig {
    /// Pause between poll runs, in seconds
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Daily digest time (UTC "HH:MM", or "now" to lock in the first run's
    /// time-of-day)
    #[serde(default = "default_digest_time_utc")]
    pub digest_time_utc: String,
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_digest_time_utc() -> String {
    "00:00".to_string()
}

/// Instance handed out by the `poller` module
pub struct PollerHandle {
    /// The poller driven by this module's jobs
    pub poller: Arc<Mutex<FeedPoller>>,
}

/// Factory for the `poller` module
pub fn poller_module() -> ModuleFactory<JobScheduler> {
    Box::new(|cx| {
        let config: PollerConfig = cx.config().parse()?;
        let client = cx
            .require(FEED_MODULE)?
            .downcast::<FeedClient>()
            .map_err(|_| {
                Error::config(format!(
                    "module '{FEED_MODULE}' did not yield a feed client"
                ))
            })?;
        let poller = Arc::new(Mutex::new(client.poller()?));

        let poll = poller.clone();
        cx.add_job(Job::new(
            "poll",
            Trigger::Interval(Duration::from_secs(config.poll_interval_secs)),
            move || {
                let poller = poll.clone();
                async move {
                    let fresh = poller.lock().await.poll_new().await?;
                    for item in &fresh {
                        tracing::info!(id = %item.id, kind = ?item.kind, "new feed item");
                    }
                    Ok(())
                }
            },
        ))?;

        let sweep = poller.clone();
        cx.add_job(Job::new(
            "digest",
            Trigger::daily(&config.digest_time_utc)?,
            move || {
                let poller = sweep.clone();
                async move {
                    let all = poller.lock().await.poll_all().await?;
                    tracing::info!(items = all.len(), "daily digest sweep finished");
                    Ok(())
                }
            },
        ))?;

        Ok(Arc::new(PollerHandle { poller }) as ModuleRef)
    })
}
