//! Output types: the bound document plus the per-source report.
//!
//! A bind that loses one source out of ten is usually still worth having,
//! so [`BindOutput`] carries the final bytes alongside one
//! [`SourceReport`] per requested file. Callers that cannot tolerate any
//! loss call [`BindOutput::into_result`] (or set
//! [`crate::config::BindConfig::require_all`]) to upgrade partial failure
//! into an error.

use crate::error::{BindError, SourceError};
use crate::pipeline::input::SourceKind;
use serde::{Deserialize, Serialize};

/// The result of a bind: final document bytes plus a full account of what
/// happened to each source.
///
/// Serialisable except for the raw bytes, so the report can travel through
/// logs and APIs without dragging the document along.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindOutput {
    /// The finished PDF.
    #[serde(skip)]
    pub pdf: Vec<u8>,

    /// Generated file name, `{prefix}_{id}_{MMDDYYYY_HHMMSS}.pdf`.
    pub file_name: String,

    /// Where the document store put the bundle, when the request named a
    /// destination. `None` means the caller only wanted bytes.
    pub location: Option<String>,

    /// One report per requested source, in request order.
    pub sources: Vec<SourceReport>,

    /// Aggregate counters and timings.
    pub stats: BindStats,
}

impl BindOutput {
    /// Convert into a `Result` that treats any source failure as an error.
    ///
    /// Returns `Err(BindError::PartialFailure)` if at least one source
    /// failed, otherwise `Ok(self)`.
    pub fn into_result(self) -> Result<Self, BindError> {
        let failed = self.stats.failed_sources;
        if failed > 0 {
            return Err(BindError::PartialFailure {
                succeeded: self.stats.converted_sources,
                failed,
                total: self.stats.total_sources,
            });
        }
        Ok(self)
    }
}

/// What happened to a single source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceReport {
    /// 0-indexed position in the request.
    pub index: usize,

    /// The reference as the request gave it.
    pub reference: String,

    /// Classified source type; `None` when classification itself failed.
    pub kind: Option<SourceKind>,

    /// Pages this source contributed to the merged document. 0 on failure.
    pub pages: usize,

    /// Non-fatal notes, e.g. embedded images that could not be extracted
    /// or placed. The source still contributed its pages.
    pub warnings: Vec<String>,

    /// Why the source contributed nothing, if it failed.
    pub error: Option<SourceError>,
}

impl SourceReport {
    /// Whether this source made it into the merged document.
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate counters and stage timings for one bind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BindStats {
    /// Sources the request named.
    pub total_sources: usize,
    /// Sources that produced pages.
    pub converted_sources: usize,
    /// Sources that failed (fetch, unsupported, conversion).
    pub failed_sources: usize,
    /// Pages in the final document.
    pub total_pages: usize,
    /// Embedded images extracted from word-processor sources.
    pub images_extracted: usize,
    /// Embedded images skipped (unmapped type or extraction failure).
    pub images_skipped: usize,
    /// Wall-clock time of the fetch + convert fan-out.
    pub fetch_convert_duration_ms: u64,
    /// Wall-clock time of the merge stage.
    pub merge_duration_ms: u64,
    /// Wall-clock time of the annotation stage.
    pub annotate_duration_ms: u64,
    /// End-to-end wall-clock time.
    pub total_duration_ms: u64,
}
