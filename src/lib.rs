//! # docbinder
//!
//! Bind heterogeneous documents (Word, HTML, images, PDF) into one ordered,
//! page-numbered, watermarked PDF bundle.
//!
//! ## Why this crate?
//!
//! Case files, claims, and submissions arrive as a pile of mixed attachments:
//! a `.docx` cover letter, an HTML form export, a couple of photos, a scanned
//! PDF. Reviewers need them as a single document that reads in a fixed order,
//! says "3 of 17" on every page, and carries a watermark that survives
//! printing. This crate does that conversion end to end, in process, with a
//! report for every source so one broken attachment never sinks the bundle.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Sources (.docx / .html / images / .pdf)
//!  │
//!  ├─ 1. Classify  pick a conversion path from the extension
//!  ├─ 2. Fetch     document store (filesystem and HTTP by default)
//!  ├─ 3. Convert   each source to PDF pages (CPU-bound, spawn_blocking)
//!  ├─ 4. Merge     one document, request order preserved
//!  ├─ 5. Annotate  "i of N" label and diagonal watermark behind content
//!  └─ 6. Output    bundle bytes + per-source reports (+ optional store)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docbinder::{bind, BindConfig, BindRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Local paths and http(s) URLs both work with the default store.
//!     let request = BindRequest::new(
//!         vec![
//!             "cover.docx".into(),
//!             "form.html".into(),
//!             "photo.jpg".into(),
//!             "scan.pdf".into(),
//!         ],
//!         "CONFIDENTIAL",
//!     );
//!     let output = bind(&request, &BindConfig::default()).await?;
//!     std::fs::write(&output.file_name, &output.pdf)?;
//!     eprintln!(
//!         "{} pages from {}/{} sources",
//!         output.stats.total_pages,
//!         output.stats.converted_sources,
//!         output.stats.total_sources
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docbind` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! docbinder = { version = "0.3", default-features = false }
//! ```
//!
//! ## Supported Sources
//!
//! | Extension | Treatment |
//! |-----------|-----------|
//! | `.docx` | Unpacked, converted to markup, rendered to pages; embedded media re-encoded |
//! | `.html`, `.htm` | Sanitised (scripts, styles, hidden blocks dropped), then rendered to pages |
//! | `.png` `.gif` `.bmp` `.jpeg` `.jpg` `.tiff` `.tif` | One scaled-to-fit page per image |
//! | `.pdf` | Validated and passed through untouched until annotation |
//!
//! References with any other extension are reported as unsupported without
//! being fetched. `.wmf` is accepted for classification and extracted from
//! Word documents, but there is no WMF decoder: a top-level WMF source fails
//! on its own report, and an embedded one is skipped with a warning.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod bind;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use bind::{bind, bind_sync, bind_to_file, BindRequest};
pub use config::{BindConfig, BindConfigBuilder};
pub use error::{BindError, SourceError};
pub use output::{BindOutput, BindStats, SourceReport};
pub use pipeline::input::SourceKind;
pub use progress::{BindProgressCallback, NoopProgressCallback, ProgressCallback};
pub use store::{DocumentStore, FsStore};
