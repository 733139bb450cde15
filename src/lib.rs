//! # course-loader
//!
//! Priority-scheduled progressive content loader for sequential curricula.
//!
//! ## Design Philosophy
//!
//! course-loader is designed to be:
//! - **Playable fast** - The first few units are fetched while the caller
//!   waits; everything else loads in the background
//! - **Jump-safe** - Upcoming tiers get a shallow slice before any tier is
//!   filled in depth
//! - **Library-first** - Network and storage are injected through
//!   [`ContentSource`] and [`AudioStore`]
//! - **Event-driven** - Consumers subscribe to [`Event`]s, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use course_loader::{ContentSource, ProgressiveLoader, Result, Seed, Unit};
//!
//! struct Http;
//!
//! #[async_trait::async_trait]
//! impl ContentSource for Http {
//!     async fn fetch_script_chunk(&self, _start: Seed, _count: u32) -> Result<Vec<Unit>> {
//!         // GET /script?start=..&count=..
//!         Ok(Vec::new())
//!     }
//!
//!     async fn preload_audio_batch(&self, _locators: &[String]) -> Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let loader = ProgressiveLoader::with_defaults(Arc::new(Http))?;
//!
//!     // Subscribe to events
//!     let mut events = loader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     // Returns once the first units are playable
//!     loader.initialize_from_seed(45).await;
//!     let first = loader.get_rounds_for_range(45, 5).await;
//!     println!("{} units ready", first.len());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Playback look-ahead buffer maintenance
pub mod buffer;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Progressive loader (decomposed into focused submodules)
pub mod loader;
/// Retry logic with exponential backoff
pub mod retry;
/// Content source and audio store seams
pub mod source;
/// Tier (belt) table
pub mod tiers;
/// Core types
pub mod types;

mod utils;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use buffer::BufferMaintainer;
pub use config::{BufferConfig, Config, LoaderConfig, RetryConfig};
pub use error::{Error, Result};
pub use loader::{ProgressiveLoader, build_load_queue};
pub use source::{AudioStore, ContentSource};
pub use tiers::{Tier, TierTable};
pub use types::{
    BufferState, CacheStats, DownloadOption, DownloadPhase, DownloadProgress, Event, LoadTask,
    LoaderStatus, ReviewMeta, Seed, SeedRange, TaskKind, TaskStatus, Unit, UnitItem,
};
