//! Progress-callback trait for per-source bind events.
//!
//! Inject an [`Arc<dyn BindProgressCallback>`] via
//! [`crate::config::BindConfigBuilder::progress_callback`] to receive
//! real-time events as the pipeline fetches and converts each source.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers can
//! forward events to a Tokio broadcast channel, a WebSocket, a database record,
//! or a terminal progress bar — without the library knowing anything about how
//! the host application communicates. The trait is `Send + Sync` so it works
//! correctly when sources are processed concurrently.
//!
//! # Example
//!
//! ```rust
//! use docbinder::{BindProgressCallback, BindConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl BindProgressCallback for CountingCallback {
//!     fn on_source_complete(&self, source_num: usize, total_sources: usize, pages: usize) {
//!         let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("Source {}/{} done ({} pages)", source_num, total_sources, pages);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = BindConfig::builder()
//!     .progress_callback(counter as Arc<dyn BindProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the bind pipeline as it processes each source file.
///
/// Implementations must be `Send + Sync` (sources are fetched and converted
/// concurrently). All methods have default no-op implementations so callers
/// only override what they care about.
///
/// # Thread safety
///
/// `on_source_start`, `on_source_complete`, and `on_source_error` may be
/// called concurrently from different tasks. Implementations must protect
/// shared mutable state with appropriate synchronisation primitives
/// (e.g. `Mutex`, `AtomicUsize`).
pub trait BindProgressCallback: Send + Sync {
    /// Called once before any source is fetched.
    ///
    /// # Arguments
    /// * `total_sources` — number of sources the request names
    fn on_bind_start(&self, total_sources: usize) {
        let _ = total_sources;
    }

    /// Called just before a source is fetched from the document store.
    ///
    /// # Arguments
    /// * `source_num`    — 1-indexed source position
    /// * `total_sources` — total sources in the request
    fn on_source_start(&self, source_num: usize, total_sources: usize) {
        let _ = (source_num, total_sources);
    }

    /// Called when a source has been converted to pages.
    ///
    /// # Arguments
    /// * `source_num`    — 1-indexed source position
    /// * `total_sources` — total sources
    /// * `pages`         — number of pages the source contributed
    fn on_source_complete(&self, source_num: usize, total_sources: usize, pages: usize) {
        let _ = (source_num, total_sources, pages);
    }

    /// Called when a source fails (fetch, unsupported type, conversion).
    ///
    /// # Arguments
    /// * `source_num`    — 1-indexed source position
    /// * `total_sources` — total sources
    /// * `error`         — human-readable error description
    fn on_source_error(&self, source_num: usize, total_sources: usize, error: &str) {
        let _ = (source_num, total_sources, error);
    }

    /// Called once after merge and annotation, just before the output is
    /// assembled.
    ///
    /// # Arguments
    /// * `total_sources` — total sources in the request
    /// * `success_count` — sources that converted without error
    fn on_bind_complete(&self, total_sources: usize, success_count: usize) {
        let _ = (total_sources, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl BindProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BindConfig`].
pub type ProgressCallback = Arc<dyn BindProgressCallback>;
