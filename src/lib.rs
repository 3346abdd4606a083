//! feedwatch - long-lived feed polling runtime
//!
//! The runtime backbone of a service that periodically polls an external
//! feed-like API and reacts to new items while avoiding duplicate
//! processing.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`container`] - Lazy, cycle-tolerant module registry
//! - [`scheduler`] - Cooperative job scheduler with failure isolation
//! - [`dedup`] - Bounded, generation-stamped new-item cache
//! - [`feed`] - Feed items, sources and the polling client
//! - [`app`] - Composition root tying container and scheduler together
//! - [`modules`] - Built-in feed client and poller modules
//! - [`config`] - Settings file loading for the binary
//!
//! # Example
//!
//! ```no_run
//! use feedwatch::app::App;
//! use feedwatch::modules::{feed_module, poller_module, FEED_MODULE, POLLER_MODULE};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut app = App::new();
//!     app.register(FEED_MODULE, feed_module())?;
//!     app.register(POLLER_MODULE, poller_module())?;
//!     app.apply_config(&serde_json::json!({
//!         "feed": { "base_url": "https://feed.example/items" },
//!         "poller": { "_enabled": true },
//!     }))?;
//!     app.start_enabled()?;
//!     app.run().await?;
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod config;
pub mod container;
pub mod dedup;
pub mod error;
pub mod feed;
pub mod modules;
pub mod scheduler;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::app::App;
    pub use crate::container::{ModuleConfig, ModuleCx, ModuleRef, Placeholder};
    pub use crate::dedup::{DedupCache, FeedEntry};
    pub use crate::error::{Error, Result};
    pub use crate::feed::{FeedItem, FeedPoller, FeedSource, ItemKind};
    pub use crate::scheduler::{Job, JobScheduler, Trigger};
}

// Direct re-exports for convenience
pub use error::{Error, Result};
