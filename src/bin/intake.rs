//! CLI binary for edgequake-intake.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `IntakeConfig`, selects the given files, waits for their uploads, and
//! prints the resulting selection.

use anyhow::{bail, Context, Result};
use clap::Parser;
use edgequake_intake::{
    initialize_parser, inspect, Accept, DocumentIntake, FileDetail, FileId, FileStatus,
    HttpObjectStore, IntakeConfig, IntakeObserver, MemoryObjectStore, ObjectStore, ParserSetup,
    SelectedFile, SharedObserver, StoreConfig, UploadError, ValidationError,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
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

// ── CLI observer using indicatif ─────────────────────────────────────────────

/// Terminal observer: one bar counting settled uploads, plus a log line the
/// first time each file reaches `uploaded` or `error`.
struct CliObserver {
    bar: ProgressBar,
    /// Last status printed per file.
    seen: Mutex<HashMap<FileId, FileStatus>>,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} files  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        let bar = ProgressBar::new(0);
        bar.set_style(style);
        bar.set_prefix("Uploading");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            seen: Mutex::new(HashMap::new()),
        })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl IntakeObserver for CliObserver {
    fn on_file_select(&self, files: &[SelectedFile], _total: u32, details: &[FileDetail]) {
        let settled = files
            .iter()
            .filter(|f| matches!(f.status, FileStatus::Uploaded | FileStatus::Error))
            .count();
        self.bar.set_length(files.len() as u64);
        self.bar.set_position(settled as u64);

        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        for d in details {
            if seen.get(&d.id) == Some(&d.status) {
                continue;
            }
            seen.insert(d.id, d.status);
            if d.status == FileStatus::Uploaded {
                self.bar.println(format!(
                    "  {} {:<32}  {:>4} page(s)  {}",
                    green("✓"),
                    d.name,
                    d.page_count,
                    dim(&d.page_count_method.to_string()),
                ));
            }
        }
    }

    fn on_quantity_change(&self, total_page_count: u32) {
        self.bar.set_message(format!("{total_page_count} page(s)"));
    }

    fn on_upload_failed(&self, error: &UploadError) {
        self.bar.println(format!("  {} {}", red("✗"), error));
    }

    fn on_batch_rejected(&self, error: &ValidationError) {
        self.bar.println(format!("{} {}", red("✘"), error));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Page count only (no upload)
  intake --count-only thesis.pdf scan.png

  # Upload to a storage API
  intake --endpoint https://api.example.com/storage thesis.pdf scan.png

  # Validate, count and "upload" to memory
  intake --dry-run *.pdf

  # Product images: images only, 5 MB cap
  intake --images-only --max-file-mb 5 --dry-run photo1.jpg photo2.webp

  # Machine-readable selection
  intake --dry-run --json thesis.pdf > selection.json

PAGE COUNTING:
  Images count as one page. PDFs are parsed; if that fails the first
  100 KB are scanned for /Count and /Type /Page tokens; failing that, 1.

ENVIRONMENT VARIABLES:
  INTAKE_ENDPOINT     Base URL of the storage API
  INTAKE_TOKEN        Bearer token sent to the storage API
  RUST_LOG            Override the log filter (e.g. edgequake_intake=debug)
"#;

/// Validate, page-count and upload print documents.
#[derive(Parser, Debug)]
#[command(
    name = "intake",
    version,
    about = "Validate, page-count and upload print documents",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Files to select (JPEG, PNG, WebP, GIF, PDF).
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Base URL of the storage API.
    #[arg(long, env = "INTAKE_ENDPOINT")]
    endpoint: Option<String>,

    /// Bearer token for the storage API.
    #[arg(long, env = "INTAKE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Upload path appended to the endpoint.
    #[arg(long, env = "INTAKE_UPLOAD_PATH", default_value = "/upload")]
    upload_path: String,

    /// Delete path prefix appended to the endpoint.
    #[arg(long, env = "INTAKE_DELETE_PATH", default_value = "/files")]
    delete_path: String,

    /// Per-request timeout in seconds.
    #[arg(long, env = "INTAKE_TIMEOUT", default_value_t = 60)]
    timeout: u64,

    /// Upload to an in-memory store instead of the network.
    #[arg(long)]
    dry_run: bool,

    /// Validate and count pages only; nothing is uploaded.
    #[arg(long)]
    count_only: bool,

    /// Accept images only.
    #[arg(long, conflicts_with = "pdf_only")]
    images_only: bool,

    /// Accept PDFs only.
    #[arg(long)]
    pdf_only: bool,

    /// One size cap in MB for every file, overriding the 10 MB image and
    /// 50 MB PDF defaults.
    #[arg(long, env = "INTAKE_MAX_FILE_MB")]
    max_file_mb: Option<u64>,

    /// Parse PDFs on the calling thread instead of the blocking pool.
    #[arg(long)]
    no_worker: bool,

    /// Print the selection as JSON.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "INTAKE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "INTAKE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "INTAKE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; verbose always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.count_only;
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

    initialize_parser(ParserSetup {
        use_worker: !cli.no_worker,
    });

    let observer = show_progress.then(CliObserver::new);
    let config = build_config(&cli, observer.clone().map(|o| o as SharedObserver))?;

    // ── Count only ───────────────────────────────────────────────────────
    if cli.count_only {
        return count_only(&cli, &config).await;
    }

    // ── Select and upload ────────────────────────────────────────────────
    let store = build_store(&cli)?;
    let intake = DocumentIntake::new(config, store);
    let selected = intake.select_paths(&cli.files).await;
    if selected.is_ok() {
        intake.settled().await;
    }
    if let Some(o) = &observer {
        o.finish();
    }
    selected.context("Selection failed")?;

    let snapshot = intake.snapshot();
    if cli.json {
        let json = serde_json::to_string_pretty(&snapshot).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        print_table(&snapshot.files);
        eprintln!(
            "{} {} page(s) across {} file(s)",
            cyan("◆"),
            bold(&snapshot.total_page_count.to_string()),
            snapshot.files.len()
        );
    }

    let failed = snapshot
        .files
        .iter()
        .filter(|f| f.status == FileStatus::Error)
        .count();
    if failed > 0 {
        bail!("{failed} upload(s) failed");
    }
    Ok(())
}

/// Validate and count each file on its own; no store involved.
async fn count_only(cli: &Cli, config: &IntakeConfig) -> Result<()> {
    let mut total = 0u32;
    let mut results = Vec::with_capacity(cli.files.len());
    for path in &cli.files {
        let inspection = inspect(path, config)
            .await
            .with_context(|| format!("Failed to inspect {}", path.display()))?;
        total = total.saturating_add(inspection.page_count.pages);
        results.push(inspection);
    }

    if cli.json {
        let json = serde_json::json!({ "files": results, "total_page_count": total });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).context("Failed to serialise output")?
        );
        return Ok(());
    }

    for r in &results {
        println!(
            "{:<32}  {:<5}  {:>4} page(s)  {}",
            r.name,
            r.kind,
            r.page_count.pages,
            dim(&r.page_count.method.to_string())
        );
    }
    println!("{}", bold(&format!("Total: {total} page(s)")));
    Ok(())
}

/// Map CLI args to `IntakeConfig`.
fn build_config(cli: &Cli, observer: Option<SharedObserver>) -> Result<IntakeConfig> {
    let accept = if cli.images_only {
        Accept::ImagesOnly
    } else if cli.pdf_only {
        Accept::PdfOnly
    } else {
        Accept::ImagesAndPdf
    };

    let mut builder = IntakeConfig::builder().accept(accept);
    if let Some(mb) = cli.max_file_mb {
        builder = builder.max_file_mb(mb);
    }
    if let Some(observer) = observer {
        builder = builder.observer(observer);
    }
    builder.build().context("Invalid configuration")
}

fn build_store(cli: &Cli) -> Result<Arc<dyn ObjectStore>> {
    if cli.dry_run {
        return Ok(Arc::new(MemoryObjectStore::new()));
    }
    let Some(endpoint) = &cli.endpoint else {
        bail!("pass --endpoint, --dry-run or --count-only");
    };
    let mut store = StoreConfig::new(endpoint.clone());
    store.upload_path = cli.upload_path.clone();
    store.delete_path = cli.delete_path.clone();
    store.bearer_token = cli.token.clone();
    store.timeout_secs = cli.timeout;
    Ok(Arc::new(
        HttpObjectStore::new(store).context("Failed to create store client")?,
    ))
}

fn print_table(files: &[FileDetail]) {
    for f in files {
        let status = match f.status {
            FileStatus::Uploaded => green("uploaded"),
            FileStatus::Error => red("error"),
            other => cyan(&other.to_string()),
        };
        println!(
            "{:<32}  {:<5}  {:>4} page(s)  {:<9}  {}",
            f.name,
            f.kind,
            f.page_count,
            status,
            dim(f.remote_key.as_deref().or(f.error.as_deref()).unwrap_or(""))
        );
    }
}
