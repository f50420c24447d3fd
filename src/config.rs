//! Configuration types for document binding.
//!
//! All bind behaviour is controlled through [`BindConfig`], built via its
//! [`BindConfigBuilder`]. Keeping every knob in one struct makes it trivial
//! to share configs across threads and to log the exact settings a run used.
//!
//! # Design choice: builder over constructor
//! A many-field constructor is unreadable and breaks on every new field.
//! The builder pattern lets callers set only what they care about and rely on
//! well-documented defaults for the rest.

use crate::error::BindError;
use crate::progress::ProgressCallback;
use crate::store::DocumentStore;
use std::fmt;
use std::sync::Arc;

/// Configuration for a document bind.
///
/// Built via [`BindConfig::builder()`] or using [`BindConfig::default()`].
///
/// # Example
/// ```rust
/// use docbinder::BindConfig;
///
/// let config = BindConfig::builder()
///     .concurrency(8)
///     .output_prefix("invoice")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct BindConfig {
    /// Number of sources fetched and converted at once. Default: 4.
    ///
    /// Fetching is network-bound while conversion is CPU-bound; a small
    /// fan-out overlaps the two without starving the blocking-thread pool.
    /// Raise it for requests with many small remote files; set it to 1 to
    /// process sources strictly one at a time. Merge order never depends on
    /// this value.
    pub concurrency: usize,

    /// Timeout for fetching a single reference, in seconds. Default: 120.
    pub fetch_timeout_secs: u64,

    /// First segment of the generated output file name,
    /// `{prefix}_{id}_{MMDDYYYY_HHMMSS}.pdf`. Default: "bundle".
    ///
    /// The prefix must be non-empty and free of path separators because it
    /// lands in a file name.
    pub output_prefix: String,

    /// Treat any source failure as a bind failure. Default: false.
    ///
    /// With the default, failed sources are recorded in the per-source
    /// reports and the bundle is built from the sources that survived.
    /// Strict callers set this when a partial bundle would be worse than no
    /// bundle at all.
    pub require_all: bool,

    /// Document store used to fetch source references and to store the
    /// final bundle when the request names a destination.
    ///
    /// Default: None, which resolves to a [`crate::store::FsStore`] rooted
    /// at the current directory: local paths read from disk, http(s) URLs
    /// download. Inject your own implementation to reach object stores or
    /// document libraries; credentials live in the implementation, never in
    /// this config.
    pub store: Option<Arc<dyn DocumentStore>>,

    /// Observer for bind progress. Default: None (no reporting).
    ///
    /// The CLI injects a progress-bar implementation; library callers can
    /// inject their own to drive a UI.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            fetch_timeout_secs: 120,
            output_prefix: "bundle".to_string(),
            require_all: false,
            store: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for BindConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindConfig")
            .field("concurrency", &self.concurrency)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("output_prefix", &self.output_prefix)
            .field("require_all", &self.require_all)
            .field("store", &self.store.as_ref().map(|_| "<dyn DocumentStore>"))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn callback>"),
            )
            .finish()
    }
}

impl BindConfig {
    /// Create a new builder for `BindConfig`.
    pub fn builder() -> BindConfigBuilder {
        BindConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`BindConfig`].
#[derive(Debug)]
pub struct BindConfigBuilder {
    config: BindConfig,
}

impl BindConfigBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs.max(1);
        self
    }

    pub fn output_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.output_prefix = prefix.into();
        self
    }

    pub fn require_all(mut self, v: bool) -> Self {
        self.config.require_all = v;
        self
    }

    pub fn store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.config.store = Some(store);
        self
    }

    pub fn progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.config.progress_callback = Some(callback);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BindConfig, BindError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(BindError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.output_prefix.is_empty() {
            return Err(BindError::InvalidConfig(
                "Output prefix must not be empty".into(),
            ));
        }
        if c.output_prefix.contains(['/', '\\']) {
            return Err(BindError::InvalidConfig(format!(
                "Output prefix must not contain path separators, got '{}'",
                c.output_prefix
            )));
        }
        Ok(self.config)
    }
}
