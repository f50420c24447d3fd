//! Document store: the seam between the pipeline and wherever files live.
//!
//! The bind pipeline never talks to a file system, document library, or HTTP
//! endpoint directly. Every source reference is resolved through a
//! [`DocumentStore`], and the finished bundle is written back through the
//! same trait. Swapping the store is how the pipeline moves between local
//! runs, tests, and hosted document libraries — and it keeps credentials out
//! of [`crate::config::BindConfig`] entirely: authentication is the store
//! implementation's business.
//!
//! [`FsStore`] is the batteries-included implementation: local paths read
//! from disk, http(s) URLs download, and `store` writes atomically under a
//! root directory.

use crate::error::BindError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Fetches source bytes and stores finished bundles.
///
/// Implementations must be `Send + Sync`; the pipeline fetches several
/// references concurrently through a shared `Arc<dyn DocumentStore>`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch the bytes behind a source reference.
    ///
    /// The reference is opaque to the pipeline: a path, a URL, a library
    /// item id — whatever the implementation understands.
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, BindError>;

    /// Store the finished bundle under `destination` with the given file
    /// name, returning the location of the stored document.
    ///
    /// Must not report success unless the bytes are durably written; the
    /// pipeline forwards the returned location to callers verbatim.
    async fn store(
        &self,
        bytes: &[u8],
        destination: &str,
        file_name: &str,
    ) -> Result<String, BindError>;
}

/// Check if a reference string looks like a URL.
pub fn is_url(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}

/// File-system document store with http(s) fetch support.
///
/// Relative references and destinations resolve against `root`; absolute
/// paths are used as-is. URLs download with the configured timeout.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
    fetch_timeout: Duration,
}

impl FsStore {
    /// Create a store rooted at `root` with a 120 s fetch timeout.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            fetch_timeout: Duration::from_secs(120),
        }
    }

    /// Override the timeout applied to URL fetches.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    fn resolve(&self, reference: &str) -> PathBuf {
        let path = Path::new(reference);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    async fn fetch_url(&self, url: &str) -> Result<Vec<u8>, BindError> {
        info!("Fetching source from: {}", url);

        let client = reqwest::Client::builder()
            .timeout(self.fetch_timeout)
            .build()
            .map_err(|e| BindError::FetchFailed {
                reference: url.to_string(),
                reason: e.to_string(),
            })?;

        let response = client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                BindError::FetchTimeout {
                    reference: url.to_string(),
                    secs: self.fetch_timeout.as_secs(),
                }
            } else {
                BindError::FetchFailed {
                    reference: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        if !response.status().is_success() {
            return Err(BindError::FetchFailed {
                reference: url.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BindError::FetchFailed {
                reference: url.to_string(),
                reason: e.to_string(),
            })?;

        debug!("Fetched {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }

    async fn fetch_local(&self, reference: &str) -> Result<Vec<u8>, BindError> {
        let path = self.resolve(reference);
        tokio::fs::read(&path)
            .await
            .map_err(|e| BindError::FetchFailed {
                reference: reference.to_string(),
                reason: format!("{}: {}", path.display(), e),
            })
    }
}

#[async_trait]
impl DocumentStore for FsStore {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, BindError> {
        if is_url(reference) {
            self.fetch_url(reference).await
        } else {
            self.fetch_local(reference).await
        }
    }

    async fn store(
        &self,
        bytes: &[u8],
        destination: &str,
        file_name: &str,
    ) -> Result<String, BindError> {
        let dir = self.resolve(destination);
        let path = dir.join(file_name);
        let store_err = |e: std::io::Error| BindError::StoreFailed {
            destination: path.display().to_string(),
            reason: e.to_string(),
        };

        tokio::fs::create_dir_all(&dir).await.map_err(store_err)?;

        // Atomic write: write to temp, then rename
        let tmp_path = path.with_extension("pdf.tmp");
        tokio::fs::write(&tmp_path, bytes)
            .await
            .map_err(store_err)?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(store_err)?;

        info!("Stored bundle at: {}", path.display());
        Ok(path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.docx"));
        assert!(is_url("http://example.com/doc.docx"));
        assert!(!is_url("/tmp/doc.docx"));
        assert!(!is_url("doc.docx"));
        assert!(!is_url(""));
    }

    #[tokio::test]
    async fn fetch_local_reads_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.html"), b"<p>hi</p>").unwrap();

        let store = FsStore::new(dir.path());
        let bytes = store.fetch("a.html").await.unwrap();
        assert_eq!(bytes, b"<p>hi</p>");
    }

    #[tokio::test]
    async fn fetch_missing_file_is_a_fetch_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let err = store.fetch("missing.docx").await.unwrap_err();
        assert!(matches!(err, BindError::FetchFailed { .. }));
    }

    #[tokio::test]
    async fn store_creates_destination_and_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());

        let location = store
            .store(b"%PDF-1.5 fake", "out/reports", "bundle_1.pdf")
            .await
            .unwrap();

        let written = dir.path().join("out/reports/bundle_1.pdf");
        assert_eq!(location, written.display().to_string());
        assert_eq!(std::fs::read(written).unwrap(), b"%PDF-1.5 fake");
    }
}
