//! Bundle orchestration: fetch, convert, merge, annotate, store.
//!
//! ## Why per-source results?
//!
//! A bundle request names several independent documents, and any of them
//! can be unreachable or corrupt without saying anything about the others.
//! So every source runs its own fetch-and-convert pipeline and lands in a
//! [`SourceReport`], success or not. The bind as a whole fails only when
//! nothing converted, when `require_all` is set and something failed, or
//! when a shared stage (merge, annotate, store) breaks. Callers that want
//! all-or-nothing semantics get it from `require_all` or
//! [`BindOutput::into_result`]; nobody gets a destination that was never
//! written.
//!
//! Sources fetch and convert concurrently up to `config.concurrency`, but
//! the merge consumes them strictly in request order: page order is part
//! of the contract and never depends on completion order.

use crate::config::BindConfig;
use crate::error::{BindError, SourceError};
use crate::output::{BindOutput, BindStats, SourceReport};
use crate::pipeline::input::{self, SourceKind};
use crate::pipeline::{annotate, docx, merge, render, sanitize};
use crate::store::{DocumentStore, FsStore};
use chrono::Local;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One bundle request: which sources, in what order, stamped with what.
#[derive(Debug, Clone)]
pub struct BindRequest {
    /// Source references in bundle order. Pages of `files[0]` come first.
    pub files: Vec<String>,

    /// Watermark drawn across every page.
    pub watermark: String,

    /// Request identifier, embedded in the output file name. An empty id
    /// is replaced with a generated one at bind time.
    pub id: String,

    /// Destination handed to the document store for the finished bundle.
    /// `None` means the caller only wants bytes.
    pub destination: Option<String>,
}

impl BindRequest {
    /// A request with a generated id and no store destination.
    pub fn new(files: Vec<String>, watermark: impl Into<String>) -> Self {
        Self {
            files,
            watermark: watermark.into(),
            id: Uuid::new_v4().simple().to_string(),
            destination: None,
        }
    }
}

/// Build the annotated bundle for `request`.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(BindOutput)` when a bundle was produced, even if some sources
/// failed (check `output.stats.failed_sources` or the per-source reports).
///
/// # Errors
/// Fatal only: an empty request, every source failing, a failure in the
/// merge/annotate stages, a store failure for the named destination, or
/// any source failing while `config.require_all` is set.
pub async fn bind(request: &BindRequest, config: &BindConfig) -> Result<BindOutput, BindError> {
    let total_start = Instant::now();
    if request.files.is_empty() {
        return Err(BindError::NoSources);
    }
    let total_sources = request.files.len();
    let request_id = if request.id.is_empty() {
        Uuid::new_v4().simple().to_string()
    } else {
        request.id.clone()
    };
    info!("Starting bind {}: {} sources", request_id, total_sources);

    // ── Step 1: Resolve store and scratch space ──────────────────────────
    let store: Arc<dyn DocumentStore> = match config.store {
        Some(ref store) => Arc::clone(store),
        None => Arc::new(
            FsStore::new(".").with_fetch_timeout(Duration::from_secs(config.fetch_timeout_secs)),
        ),
    };
    // One scratch directory per request, one subdirectory per source, so
    // image names stay unique however many requests run at once. Dropping
    // the guard deletes everything, converted or not.
    let workspace =
        TempDir::new().map_err(|e| BindError::Internal(format!("scratch dir: {e}")))?;

    if let Some(ref cb) = config.progress_callback {
        cb.on_bind_start(total_sources);
    }

    // ── Step 2: Fetch and convert every source ───────────────────────────
    let fetch_convert_start = Instant::now();
    let mut outcomes: Vec<SourceOutcome> =
        stream::iter(request.files.iter().enumerate().map(|(index, reference)| {
            let store = Arc::clone(&store);
            let config = config.clone();
            let reference = reference.clone();
            let image_dir = workspace.path().join(format!("src{index}"));
            async move {
                let source_num = index + 1;
                if let Some(ref cb) = config.progress_callback {
                    cb.on_source_start(source_num, total_sources);
                }
                let outcome = process_source(index, reference, store, image_dir).await;
                if let Some(ref cb) = config.progress_callback {
                    match &outcome.report.error {
                        None => {
                            cb.on_source_complete(source_num, total_sources, outcome.report.pages)
                        }
                        Some(e) => cb.on_source_error(source_num, total_sources, &e.to_string()),
                    }
                }
                outcome
            }
        }))
        .buffer_unordered(config.concurrency)
        .collect()
        .await;
    let fetch_convert_duration_ms = fetch_convert_start.elapsed().as_millis() as u64;

    // Completion order is arbitrary; request order is the page order.
    outcomes.sort_by_key(|o| o.report.index);

    let mut reports = Vec::with_capacity(outcomes.len());
    let mut documents = Vec::new();
    let mut images_extracted = 0usize;
    let mut images_skipped = 0usize;
    for outcome in outcomes {
        images_extracted += outcome.images_extracted as usize;
        images_skipped += outcome.images_skipped as usize;
        if let Some(pdf) = outcome.pdf {
            documents.push(pdf);
        }
        reports.push(outcome.report);
    }

    // ── Step 3: Apply the failure policy ─────────────────────────────────
    let converted_sources = reports.iter().filter(|r| r.succeeded()).count();
    let failed_sources = reports.len() - converted_sources;
    for report in &reports {
        if let Some(ref err) = report.error {
            warn!(
                "Source {} ({}) contributed no pages: {}",
                report.index + 1,
                report.reference,
                err
            );
        }
    }

    if converted_sources == 0 {
        let first_error = reports
            .iter()
            .find_map(|r| r.error.as_ref())
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string());
        return Err(BindError::AllSourcesFailed {
            total: total_sources,
            first_error,
        });
    }
    if config.require_all && failed_sources > 0 {
        return Err(BindError::PartialFailure {
            succeeded: converted_sources,
            failed: failed_sources,
            total: total_sources,
        });
    }

    // ── Step 4: Merge in request order ───────────────────────────────────
    let merge_start = Instant::now();
    let merged = tokio::task::spawn_blocking(move || merge::merge(&documents))
        .await
        .map_err(|e| BindError::Internal(format!("merge task: {e}")))??;
    let merge_duration_ms = merge_start.elapsed().as_millis() as u64;
    debug!("Merged {} documents in {}ms", converted_sources, merge_duration_ms);

    // ── Step 5: Annotate every page ──────────────────────────────────────
    let annotate_start = Instant::now();
    let watermark = request.watermark.clone();
    let annotated = tokio::task::spawn_blocking(move || annotate::annotate(&merged, &watermark))
        .await
        .map_err(|e| BindError::Internal(format!("annotate task: {e}")))??;
    let annotate_duration_ms = annotate_start.elapsed().as_millis() as u64;

    // ── Step 6: Name and store the bundle ────────────────────────────────
    let file_name = output_file_name(&config.output_prefix, &request_id);
    let location = match request.destination {
        Some(ref destination) => Some(store.store(&annotated, destination, &file_name).await?),
        None => None,
    };

    // ── Step 7: Assemble stats ───────────────────────────────────────────
    let total_pages = reports.iter().map(|r| r.pages).sum::<usize>();
    let stats = BindStats {
        total_sources,
        converted_sources,
        failed_sources,
        total_pages,
        images_extracted,
        images_skipped,
        fetch_convert_duration_ms,
        merge_duration_ms,
        annotate_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Bind {} complete: {}/{} sources, {} pages, {}ms total",
        request_id, converted_sources, total_sources, total_pages, stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_bind_complete(total_sources, converted_sources);
    }

    Ok(BindOutput {
        pdf: annotated,
        file_name,
        location,
        sources: reports,
        stats,
    })
}

/// Build the bundle and write it to a local path.
///
/// Uses atomic write (temp file + rename) to prevent partial files. The
/// path is independent of the request's store `destination`; both can be
/// used in one call.
pub async fn bind_to_file(
    request: &BindRequest,
    output_path: impl AsRef<Path>,
    config: &BindConfig,
) -> Result<BindOutput, BindError> {
    let output = bind(request, config).await?;
    let path = output_path.as_ref();

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                BindError::OutputWriteFailed {
                    path: path.to_path_buf(),
                    source: e,
                }
            })?;
        }
    }

    let tmp_path = path.with_extension("pdf.tmp");
    tokio::fs::write(&tmp_path, &output.pdf)
        .await
        .map_err(|e| BindError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| BindError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    Ok(output)
}

/// Synchronous wrapper around [`bind`].
///
/// Creates a temporary tokio runtime internally.
pub fn bind_sync(request: &BindRequest, config: &BindConfig) -> Result<BindOutput, BindError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| BindError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(bind(request, config))
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Everything one source produces: its report and, on success, its pages.
struct SourceOutcome {
    report: SourceReport,
    pdf: Option<Vec<u8>>,
    images_extracted: u32,
    images_skipped: u32,
}

impl SourceOutcome {
    fn failed(report: SourceReport) -> Self {
        Self {
            report,
            pdf: None,
            images_extracted: 0,
            images_skipped: 0,
        }
    }
}

/// Classify, fetch, and convert one source. Never fails the bind; every
/// problem becomes the report's `error`.
async fn process_source(
    index: usize,
    reference: String,
    store: Arc<dyn DocumentStore>,
    image_dir: PathBuf,
) -> SourceOutcome {
    let kind = input::classify(&reference);
    let mut report = SourceReport {
        index,
        reference: reference.clone(),
        kind,
        pages: 0,
        warnings: Vec::new(),
        error: None,
    };

    let Some(kind) = kind else {
        report.error = Some(SourceError::Unsupported {
            extension: input::extension_of(&reference).unwrap_or_default(),
        });
        return SourceOutcome::failed(report);
    };

    let bytes = match store.fetch(&reference).await {
        Ok(bytes) => bytes,
        Err(err) => {
            // Keep the per-source detail to the cause; the fatal-error
            // rendering with its remediation hints is for top-level errors.
            let detail = match err {
                BindError::FetchFailed { reason, .. } => reason,
                BindError::FetchTimeout { secs, .. } => format!("timed out after {secs}s"),
                other => other.to_string(),
            };
            report.error = Some(SourceError::Fetch { detail });
            return SourceOutcome::failed(report);
        }
    };
    debug!(
        "Fetched source {} ({}): {} bytes",
        index + 1,
        reference,
        bytes.len()
    );

    let task = tokio::task::spawn_blocking(move || convert_source(kind, &bytes, &image_dir));
    match task.await {
        Ok(Ok(converted)) => {
            report.pages = converted.page_count;
            report.warnings = converted.warnings;
            SourceOutcome {
                report,
                pdf: Some(converted.pdf),
                images_extracted: converted.images_extracted,
                images_skipped: converted.images_skipped,
            }
        }
        Ok(Err(err)) => {
            report.error = Some(err);
            SourceOutcome::failed(report)
        }
        Err(join_err) => {
            report.error = Some(SourceError::Conversion {
                detail: format!("conversion task failed: {join_err}"),
            });
            SourceOutcome::failed(report)
        }
    }
}

struct Converted {
    pdf: Vec<u8>,
    page_count: usize,
    warnings: Vec<String>,
    images_extracted: u32,
    images_skipped: u32,
}

/// Dispatch one fetched source through its conversion path.
fn convert_source(
    kind: SourceKind,
    bytes: &[u8],
    image_dir: &Path,
) -> Result<Converted, SourceError> {
    match kind {
        SourceKind::Word => {
            std::fs::create_dir_all(image_dir).map_err(|err| SourceError::Conversion {
                detail: format!("image scratch dir: {err}"),
            })?;
            let converted = docx::convert_docx(bytes, image_dir)?;
            let clean = sanitize::sanitize(&converted.markup);
            let rendered = render::render_markup(&clean)?;
            let mut warnings = converted.warnings;
            warnings.extend(rendered.warnings);
            Ok(Converted {
                pdf: rendered.pdf,
                page_count: rendered.page_count,
                warnings,
                images_extracted: converted.images_extracted,
                images_skipped: converted.images_skipped,
            })
        }
        SourceKind::Markup => {
            let markup = String::from_utf8_lossy(bytes);
            let clean = sanitize::sanitize(&markup);
            let rendered = render::render_markup(&clean)?;
            Ok(Converted {
                pdf: rendered.pdf,
                page_count: rendered.page_count,
                warnings: rendered.warnings,
                images_extracted: 0,
                images_skipped: 0,
            })
        }
        SourceKind::RasterImage => {
            let rendered = render::render_image(bytes)?;
            Ok(Converted {
                pdf: rendered.pdf,
                page_count: rendered.page_count,
                warnings: rendered.warnings,
                images_extracted: 0,
                images_skipped: 0,
            })
        }
        SourceKind::PageDocument => {
            // Parse now so a corrupt upload fails on its own report
            // instead of poisoning the merge.
            let page_count = merge::page_count(bytes)?;
            Ok(Converted {
                pdf: bytes.to_vec(),
                page_count,
                warnings: Vec::new(),
                images_extracted: 0,
                images_skipped: 0,
            })
        }
    }
}

/// `{prefix}_{id}_{MMDDYYYY_HHMMSS}.pdf`.
fn output_file_name(prefix: &str, id: &str) -> String {
    let stamp = Local::now().format("%m%d%Y_%H%M%S");
    format!("{prefix}_{id}_{stamp}.pdf")
}
