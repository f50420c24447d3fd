//! Pipeline stages for document binding.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. a different page-document backend) without
//! touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ docx ──▶ sanitize ──▶ render ──▶ merge ──▶ annotate
//! (classify) (→markup) (hidden    (markup/   (ordered   (label +
//!                       blocks)    image →    concat)    watermark)
//!                                  pages)
//! ```
//!
//! 1. [`input`]    — classify each source reference by extension
//! 2. [`docx`]     — unpack word-processor containers into markup, extracting
//!    embedded images to a request-scoped directory
//! 3. [`sanitize`] — strip hidden paragraph and container blocks from markup
//! 4. [`render`]   — lay markup out on fixed A4 pages, or wrap a raster
//!    image in a single page; runs in `spawn_blocking` because layout and
//!    image transcoding are CPU-bound
//! 5. [`merge`]    — concatenate per-source page documents in request order
//! 6. [`annotate`] — stamp every page with its "i of N" label and the
//!    diagonal watermark, under the existing content
//!
//! [`text`] holds the Helvetica metrics and string escaping shared by
//! [`render`] and [`annotate`].

pub mod annotate;
pub mod docx;
pub mod input;
pub mod merge;
pub mod render;
pub mod sanitize;
pub mod text;
