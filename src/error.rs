//! Error types for the docbinder library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`BindError`] — **Fatal**: the bind cannot produce a document at all
//!   (empty request, every source failed, merge/annotate/store broke).
//!   Returned as `Err(BindError)` from the top-level `bind*` functions.
//!
//! * [`SourceError`] — **Non-fatal**: a single source failed (unreachable
//!   reference, unsupported type, conversion glitch) but the other sources
//!   are fine. Stored inside [`crate::output::SourceReport`] so callers can
//!   inspect partial success rather than losing the whole bundle to one bad
//!   file.
//!
//! The separation lets callers decide their own tolerance: abort on the first
//! source failure (`require_all`), log and continue, or collect all errors
//! for a post-run report.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the docbinder library.
///
/// Source-level failures use [`SourceError`] and are stored in
/// [`crate::output::SourceReport`] rather than propagated here.
#[derive(Debug, Error)]
pub enum BindError {
    // ── Request errors ────────────────────────────────────────────────────
    /// The request names no source files at all.
    #[error("Request contains no source files.\nProvide at least one input (docx, html, pdf, or a raster image).")]
    NoSources,

    // ── Store errors ──────────────────────────────────────────────────────
    /// The document store could not deliver a reference's bytes.
    #[error("Failed to fetch '{reference}': {reason}\nCheck the reference is reachable by the configured document store.")]
    FetchFailed { reference: String, reason: String },

    /// Fetching a reference exceeded the configured timeout.
    #[error("Fetch timed out after {secs}s for '{reference}'\nIncrease fetch_timeout_secs on BindConfig.")]
    FetchTimeout { reference: String, secs: u64 },

    /// The final document could not be written to the store destination.
    #[error("Failed to store output at '{destination}': {reason}")]
    StoreFailed {
        destination: String,
        reason: String,
    },

    // ── Merge errors ──────────────────────────────────────────────────────
    /// Merge was handed an empty list of page documents.
    #[error("Nothing to merge: the page-document list is empty")]
    EmptyMerge,

    /// One of the buffers handed to the merger does not parse as a page
    /// document. `index` is the position in the merge input list.
    #[error("Merge input {index} is not a valid page document: {detail}")]
    InvalidPageDocument { index: usize, detail: String },

    /// The merged document could not be assembled or serialised.
    #[error("Failed to assemble merged document: {detail}")]
    MergeFailed { detail: String },

    // ── Annotation errors ─────────────────────────────────────────────────
    /// The merged document could not be reloaded or re-serialised while
    /// adding page labels and the watermark.
    #[error("Failed to annotate merged document: {detail}")]
    AnnotateFailed { detail: String },

    // ── Aggregation errors ────────────────────────────────────────────────
    /// Every source failed; there are no pages to merge.
    #[error("All {total} sources failed; nothing to merge.\nFirst error: {first_error}")]
    AllSourcesFailed { total: usize, first_error: String },

    /// Some sources succeeded but at least one failed.
    ///
    /// Returned by [`crate::output::BindOutput::into_result`] and by
    /// `bind` when [`crate::config::BindConfig::require_all`] is set.
    #[error("{failed}/{total} sources failed during bind")]
    PartialFailure {
        succeeded: usize,
        failed: usize,
        total: usize,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output PDF file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single source file.
///
/// Stored in [`crate::output::SourceReport`] when a source fails.
/// The overall bind continues unless ALL sources fail.
/// The reference the error belongs to lives in the surrounding
/// [`crate::output::SourceReport`], so variants carry only the failure
/// detail itself.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum SourceError {
    /// The document store could not deliver this reference.
    #[error("fetch failed: {detail}")]
    Fetch { detail: String },

    /// The reference's extension maps to no supported source type.
    #[error("unsupported source type '{extension}'\nSupported: docx, html, pdf, png, gif, bmp, jpeg, tiff, wmf")]
    Unsupported { extension: String },

    /// Converting the source to markup (or validating a pass-through page
    /// document) failed.
    #[error("conversion failed: {detail}")]
    Conversion { detail: String },

    /// Rendering the source's pages failed.
    #[error("page rendering failed: {detail}")]
    Render { detail: String },
}
