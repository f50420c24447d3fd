//! CLI binary for docbinder.
//!
//! A thin shim over the library crate that maps CLI flags
//! to a `BindRequest` + `BindConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use docbinder::{bind, bind_to_file, BindConfig, BindProgressCallback, BindRequest, ProgressCallback};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: renders a live progress bar and per-source log
/// lines using [indicatif]. Designed to work correctly when sources complete
/// out-of-order (concurrent mode).
struct CliProgressCallback {
    /// The single progress bar anchored at the bottom of the terminal.
    bar: ProgressBar,
    /// Per-source wall-clock start times for elapsed reporting.
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    /// Create a callback whose progress-bar length is set dynamically
    /// by `on_bind_start` (called before any sources are processed).
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set in on_bind_start

        // Initial style: spinner only (no counter until we know the total).
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Resolving sources…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    /// Switch to the full progress-bar style once we know `total`.
    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>2}/{len} sources  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Binding");
    }
}

impl BindProgressCallback for CliProgressCallback {
    fn on_bind_start(&self, total_sources: usize) {
        // Switch from spinner-only style to full progress bar now that we
        // know the actual source count.
        self.activate_bar(total_sources);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Binding {total_sources} sources…"))
        ));
    }

    fn on_source_start(&self, source_num: usize, _total_sources: usize) {
        self.start_times
            .lock()
            .unwrap()
            .insert(source_num, Instant::now());
        self.bar.set_message(format!("source {source_num}"));
    }

    fn on_source_complete(&self, source_num: usize, total_sources: usize, pages: usize) {
        let elapsed_ms = self
            .start_times
            .lock()
            .unwrap()
            .remove(&source_num)
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);

        self.bar.println(format!(
            "  {} Source {:>2}/{:<2}  {:<9}  {}",
            green("✓"),
            source_num,
            total_sources,
            dim(&format!("{pages:>3} pages")),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_source_error(&self, source_num: usize, total_sources: usize, error: &str) {
        let elapsed_ms = self
            .start_times
            .lock()
            .unwrap()
            .remove(&source_num)
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);

        // Truncate very long error messages to keep output tidy.
        let msg = if error.chars().count() > 80 {
            let head: String = error.chars().take(79).collect();
            format!("{head}\u{2026}")
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Source {:>2}/{:<2}  {}  {}",
            red("✗"),
            source_num,
            total_sources,
            red(&msg),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_bind_complete(&self, total_sources: usize, success_count: usize) {
        let failed = total_sources.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} sources converted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} sources converted  ({} failed)",
                cyan("⚠"),
                bold(&success_count.to_string()),
                total_sources,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Bundle three attachments into one watermarked PDF
  docbind cover.docx form.html scan.pdf -w CONFIDENTIAL -o case.pdf

  # Generated name ({prefix}_{id}_{MMDDYYYY_HHMMSS}.pdf) in the current directory
  docbind report.docx photo.jpg --prefix claim --id 77341

  # Remote sources download through the default store
  docbind https://example.com/files/contract.docx appendix.pdf -o contract.pdf

  # Refuse a partial bundle
  docbind a.docx b.html c.pdf --require-all -o strict.pdf

  # Store a copy under ./archive in addition to the local file
  docbind a.docx --destination archive -o bundle.pdf

  # Machine-readable per-source report on stdout
  docbind a.docx b.png --json -o out.pdf > report.json

SUPPORTED SOURCES:
  Extension                   Treatment
  ─────────                   ─────────
  .docx                       unpacked, converted to markup, rendered to pages
                              (embedded media re-encoded along the way)
  .html .htm                  sanitised markup rendered to pages
  .png .gif .bmp .jpeg .jpg
  .tiff .tif                  one scaled-to-fit page per image
  .pdf                        validated and passed through untouched

  Anything else is reported as unsupported. A failed source never sinks the
  bundle unless --require-all is set; its report says what went wrong.

ANNOTATION:
  Every page of the merged bundle gets a bottom-right "i of N" label and the
  watermark text drawn diagonally through the page centre, both painted under
  the existing content so they never cover it.

ENVIRONMENT VARIABLES:
  DOCBIND_WATERMARK     Watermark text (same as --watermark)
  DOCBIND_OUTPUT        Output path (same as --output)
  DOCBIND_PREFIX        Generated-name prefix (same as --prefix)
  DOCBIND_CONCURRENCY   Concurrent fetch+convert fan-out (same as --concurrency)
  DOCBIND_FETCH_TIMEOUT Per-source fetch timeout in seconds
"#;

/// Bind mixed document sources into one numbered, watermarked PDF.
#[derive(Parser, Debug)]
#[command(
    name = "docbind",
    version,
    about = "Bind mixed document sources into one numbered, watermarked PDF",
    long_about = "Bind heterogeneous document sources (DOCX, HTML, images, PDF; local files or \
HTTP/HTTPS URLs) into a single PDF bundle. Sources are fetched and converted concurrently, \
merged in the order given, and every page is stamped with an \"i of N\" label and a diagonal \
watermark drawn underneath the existing content.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Source references in bundle order: local paths or HTTP/HTTPS URLs.
    #[arg(required = true, num_args = 1..)]
    inputs: Vec<String>,

    /// Watermark text drawn diagonally across every page.
    #[arg(short, long, env = "DOCBIND_WATERMARK", default_value = "")]
    watermark: String,

    /// Write the bundle to this file instead of a generated name in the
    /// current directory.
    #[arg(short, long, env = "DOCBIND_OUTPUT")]
    output: Option<PathBuf>,

    /// Also store the bundle at this document-store destination.
    #[arg(long, env = "DOCBIND_DESTINATION")]
    destination: Option<String>,

    /// First segment of the generated file name.
    #[arg(long, env = "DOCBIND_PREFIX", default_value = "bundle")]
    prefix: String,

    /// Request identifier embedded in the generated file name.
    #[arg(long, env = "DOCBIND_ID")]
    id: Option<String>,

    /// Number of sources fetched and converted at once.
    #[arg(short, long, env = "DOCBIND_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Timeout for fetching a single source, in seconds.
    #[arg(long, env = "DOCBIND_FETCH_TIMEOUT", default_value_t = 120)]
    fetch_timeout: u64,

    /// Fail the whole bind if any source fails.
    #[arg(long, env = "DOCBIND_REQUIRE_ALL")]
    require_all: bool,

    /// Print the bind report as JSON on stdout.
    #[arg(long, env = "DOCBIND_JSON")]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "DOCBIND_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCBIND_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCBIND_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    // The progress bar starts as a spinner (no source count yet);
    // `on_bind_start` resizes it to the correct total.
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn BindProgressCallback>)
    } else {
        None
    };

    let mut builder = BindConfig::builder()
        .concurrency(cli.concurrency)
        .fetch_timeout_secs(cli.fetch_timeout)
        .output_prefix(cli.prefix.clone())
        .require_all(cli.require_all);
    if let Some(cb) = progress_cb {
        builder = builder.progress_callback(cb);
    }
    let config = builder.build().context("Invalid configuration")?;

    let mut request = BindRequest::new(cli.inputs.clone(), cli.watermark.clone());
    if let Some(ref id) = cli.id {
        request.id = id.clone();
    }
    request.destination = cli.destination.clone();

    // ── Run bind ─────────────────────────────────────────────────────────
    let (output, written_path) = if let Some(ref path) = cli.output {
        let output = bind_to_file(&request, path, &config)
            .await
            .context("Bind failed")?;
        (output, path.clone())
    } else {
        let output = bind(&request, &config).await.context("Bind failed")?;
        let path = PathBuf::from(&output.file_name);
        tokio::fs::write(&path, &output.pdf)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        (output, path)
    };

    // ── Report ───────────────────────────────────────────────────────────
    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet {
        let stats = &output.stats;
        eprintln!(
            "{}  {} pages from {}/{} sources  {}ms  →  {}",
            if stats.failed_sources == 0 {
                green("✔")
            } else {
                cyan("⚠")
            },
            stats.total_pages,
            stats.converted_sources,
            stats.total_sources,
            stats.total_duration_ms,
            bold(&written_path.display().to_string()),
        );
        if let Some(ref location) = output.location {
            eprintln!("   stored copy → {}", dim(location));
        }
        // The progress callback already printed per-source lines; without
        // it, say which sources died.
        if !show_progress {
            for report in output.sources.iter().filter(|r| !r.succeeded()) {
                if let Some(ref err) = report.error {
                    eprintln!("  {} {}  {}", red("✗"), report.reference, red(&err.to_string()));
                }
            }
        }
    }

    Ok(())
}
