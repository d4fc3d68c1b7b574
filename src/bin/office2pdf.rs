//! CLI binary for edgequake-office2pdf.
//!
//! A thin shim over the library crate that maps CLI flags to `BatchConfig`,
//! wires Ctrl-C to the batch cancel flag, and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_office2pdf::{
    inspect, Availability, BatchConfig, BatchRunner, CancelFlag, ConversionEvent,
    ConversionObserver, ConversionOutcome, ConverterRegistry, SharedObserver, SystemLocator,
    TracingObserver,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

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

/// Terminal observer: a live progress bar plus one line per finished file.
/// Every event is also forwarded to [`TracingObserver`] for the log layers.
struct CliObserver {
    bar: ProgressBar,
    source_root: PathBuf,
    inner: TracingObserver,
}

impl CliObserver {
    fn new(source_root: &Path) -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(spinner_style);
        bar.set_prefix("Scanning");
        bar.set_message(source_root.display().to_string());
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            source_root: source_root.to_path_buf(),
            inner: TracingObserver,
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>4}/{len} files  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Converting");
        self.bar.reset_eta();
    }

    fn relative<'a>(&self, path: &'a Path) -> std::borrow::Cow<'a, str> {
        path.strip_prefix(&self.source_root)
            .unwrap_or(path)
            .to_string_lossy()
    }
}

impl ConversionObserver for CliObserver {
    fn record(&self, event: &ConversionEvent<'_>) {
        self.inner.record(event);
        match *event {
            ConversionEvent::BatchStarted { total } => {
                self.activate_bar(total);
                self.bar.println(format!(
                    "{} {}",
                    cyan("◆"),
                    bold(&format!("Processing {total} files…"))
                ));
            }
            ConversionEvent::AttemptStarted { source, adapter } => {
                self.bar
                    .set_message(format!("{} via {adapter}", self.relative(source)));
            }
            ConversionEvent::FileFinished { file } => {
                let name = self.relative(&file.source);
                let secs = dim(&format!("{:.1}s", file.duration_ms as f64 / 1000.0));
                let line = match &file.outcome {
                    ConversionOutcome::Converted { adapter, .. } => {
                        format!("  {} {name}  {}  {secs}", green("✓"), dim(adapter))
                    }
                    ConversionOutcome::Copied => format!("  {} {name}  {}", green("⧉"), dim("copied")),
                    ConversionOutcome::SkippedAlreadyDone => {
                        format!("  {} {}", dim("↷"), dim(&format!("{name}  already done")))
                    }
                    ConversionOutcome::DuplicateDestination { claimed_by } => format!(
                        "  {} {name}  {}",
                        cyan("="),
                        dim(&format!("same PDF as {}", self.relative(claimed_by)))
                    ),
                    ConversionOutcome::Failed { reason, .. } => {
                        format!("  {} {name}  {}  {secs}", red("✗"), red(reason))
                    }
                };
                self.bar.println(line);
                self.bar.inc(1);
            }
            ConversionEvent::BatchFinished { .. } => {
                self.bar.finish_and_clear();
            }
            _ => {}
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a tree (re-running skips everything already converted)
  office2pdf ./documents ./pdfs

  # Four files at a time, 60 s budget per external converter run
  office2pdf -c 4 --timeout 60 ./documents ./pdfs

  # How far along is the destination tree?
  office2pdf --status ./documents ./pdfs

  # Which converters are installed?
  office2pdf --list-backends

  # Machine-readable report
  office2pdf --json ./documents ./pdfs > report.json

CONVERTERS (tried in order, first validated PDF wins):
  word-doc      libreoffice → pandoc → docx-text
  spreadsheet   libreoffice → spreadsheet-table
  presentation  libreoffice → pandoc → pptx-text
  raster-image  raster-image → libreoffice

ENVIRONMENT VARIABLES:
  LIBREOFFICE_PATH   Explicit path to the libreoffice / soffice executable
  PANDOC_PATH        Explicit path to pandoc
  RUST_LOG           Log filter, overrides --verbose / --quiet
"#;

/// Batch-convert office documents and images to PDF.
#[derive(Parser, Debug)]
#[command(
    name = "office2pdf",
    version,
    about = "Batch-convert office documents and images to PDF",
    long_about = "Convert every word-processor, spreadsheet, presentation and image file under \
a source directory into PDF, mirroring the directory tree under a destination directory. \
Each file is tried against an ordered chain of converters; PDFs already present in the source \
are copied as-is. Re-running resumes where the previous run stopped.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory to convert.
    #[arg(required_unless_present = "list_backends")]
    source: Option<PathBuf>,

    /// Directory receiving the PDFs (created if missing).
    #[arg(required_unless_present = "list_backends")]
    destination: Option<PathBuf>,

    /// Time budget per external converter run, in seconds.
    #[arg(long, env = "OFFICE2PDF_TIMEOUT", default_value_t = 120,
          value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// Files converted at once (1 = strictly sequential).
    #[arg(short, long, env = "OFFICE2PDF_CONCURRENCY", default_value_t = 1,
          value_parser = clap::value_parser!(u64).range(1..=64))]
    concurrency: u64,

    /// Do not copy PDFs found in the source tree.
    #[arg(long, env = "OFFICE2PDF_NO_COPY_PDFS")]
    no_copy_pdfs: bool,

    /// Only create destination directories that receive a file.
    #[arg(long, env = "OFFICE2PDF_NO_MIRROR_DIRS")]
    no_mirror_dirs: bool,

    /// Include dot-files and Office lock files (~$name.docx).
    #[arg(long, env = "OFFICE2PDF_INCLUDE_HIDDEN")]
    include_hidden: bool,

    /// Report conversion progress of the destination tree, convert nothing.
    #[arg(long)]
    status: bool,

    /// List converter chains and which converters are installed.
    #[arg(long)]
    list_backends: bool,

    /// Print results as JSON on stdout.
    #[arg(long, env = "OFFICE2PDF_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "OFFICE2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "OFFICE2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "OFFICE2PDF_QUIET")]
    quiet: bool,

    /// Also append plain-text logs to this file.
    #[arg(long, env = "OFFICE2PDF_LOG_FILE")]
    log_file: Option<PathBuf>,
}

impl Cli {
    fn batch_config(&self) -> Result<BatchConfig> {
        BatchConfig::builder()
            .process_timeout_secs(self.timeout)
            .concurrency(self.concurrency as usize)
            .copy_existing_pdfs(!self.no_copy_pdfs)
            .mirror_directories(!self.no_mirror_dirs)
            .include_hidden(self.include_hidden)
            .build()
            .context("Invalid configuration")
    }

    fn roots(&self) -> Result<(&Path, &Path)> {
        match (&self.source, &self.destination) {
            (Some(s), Some(d)) => Ok((s.as_path(), d.as_path())),
            _ => anyhow::bail!("SOURCE and DESTINATION are required"),
        }
    }
}

fn init_logging(cli: &Cli, show_progress: bool) -> Result<()> {
    // Library INFO logs are hidden while the progress bar is active; the bar
    // shows the same information.
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)));

    let file_layer = match &cli.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let file_level = if cli.verbose { "debug" } else { "info" };
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(EnvFilter::new(file_level)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}

fn print_backends(registry: &ConverterRegistry, json: bool) -> Result<()> {
    let chains = registry.describe();
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&chains).context("Failed to serialise backends")?
        );
        return Ok(());
    }
    for chain in chains {
        println!("{}", bold(&chain.format.to_string()));
        for (i, adapter) in chain.adapters.iter().enumerate() {
            let state = match &adapter.availability {
                Availability::Available => green("available"),
                Availability::Unavailable(why) => red(&format!("unavailable ({why})")),
            };
            println!("  {}. {:<18} {state}", i + 1, adapter.name);
        }
    }
    Ok(())
}

fn print_status(source: &Path, destination: &Path, config: &BatchConfig, json: bool) -> Result<()> {
    let status = inspect(source, destination, config).context("Failed to inspect tree")?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&status).context("Failed to serialise status")?
        );
        return Ok(());
    }
    println!("{:<8} {:>7} {:>9} {:>8}", "Ext", "Total", "Converted", "Pending");
    for (ext, s) in &status.by_extension {
        println!(
            "{:<8} {:>7} {:>9} {:>8}",
            ext,
            s.total,
            s.converted,
            s.total - s.converted
        );
    }
    println!(
        "{:<8} {:>7} {:>9} {:>8}",
        "all",
        status.total(),
        status.converted(),
        status.pending()
    );
    println!(
        "Source PDFs: {} ({} already copied)",
        status.source_pdfs, status.source_pdfs_copied
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress =
        !cli.quiet && !cli.no_progress && !cli.json && !cli.status && !cli.list_backends;
    init_logging(&cli, show_progress)?;

    // ── Config + registry ────────────────────────────────────────────────
    let config = cli.batch_config()?;
    let registry = ConverterRegistry::standard(&config, Arc::new(SystemLocator::new()));

    if cli.list_backends {
        return print_backends(&registry, cli.json);
    }

    let (source, destination) = cli.roots()?;

    if cli.status {
        return print_status(source, destination, &config, cli.json);
    }

    // ── Cancellation ─────────────────────────────────────────────────────
    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nInterrupted: finishing files in progress, starting no new ones…");
                cancel.cancel();
            }
        });
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let observer: SharedObserver = if show_progress {
        CliObserver::new(source) as SharedObserver
    } else {
        Arc::new(TracingObserver)
    };
    let report = BatchRunner::new(config, registry)
        .with_observer(observer)
        .with_cancel_flag(cancel)
        .run(source, destination)
        .await
        .context("Batch failed to start")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !cli.quiet {
        let s = &report.stats;
        let mark = if s.failed == 0 { green("✔") } else { cyan("⚠") };
        eprintln!(
            "{mark}  {} converted  {} copied  {} skipped  {} failed  {}ms",
            bold(&s.converted.to_string()),
            s.copied,
            s.skipped,
            if s.failed == 0 {
                s.failed.to_string()
            } else {
                red(&s.failed.to_string())
            },
            s.total_duration_ms,
        );
        if s.duplicates > 0 {
            eprintln!("   {} files share a PDF name with an earlier file", s.duplicates);
        }
        if report.cancelled {
            eprintln!("   {} files not started (interrupted)", s.not_started);
        }
        for path in report.failed_paths() {
            eprintln!("   {} {}", red("✗"), path.display());
        }
    }

    let code = match (report.cancelled, report.into_result()) {
        (true, _) => 130,
        (false, Ok(_)) => 0,
        (false, Err(e)) => {
            eprintln!(
                "Error: {:?}",
                anyhow::Error::new(e).context("Some files could not be converted")
            );
            1
        }
    };
    // A timed-out in-process render can still occupy a blocking thread, and
    // runtime shutdown would wait for it.
    std::process::exit(code);
}
