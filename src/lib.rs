//! # edgequake-office2pdf
//!
//! Batch-convert word-processor, spreadsheet, presentation and image files
//! to PDF, mirroring a source directory tree into a destination tree.
//!
//! Each file goes through an ordered fallback chain of converters. A
//! converter's claim of success is checked (the PDF must exist and be
//! non-empty) before it is accepted. Repeated runs over the same tree skip
//! files whose PDF already exists, so an interrupted batch can simply be
//! started again.
//!
//! ## Pipeline Overview
//!
//! ```text
//! source tree
//!  │
//!  ├─ 1. Walk      sorted discovery, classify by extension, mirror dirs
//!  ├─ 2. Resume    skip non-empty PDFs / same-size copies already in place
//!  ├─ 3. Chain     registry supplies ordered adapters for the format
//!  ├─ 4. Attempt   probe → invoke (timeout for processes) → validate
//!  └─ 5. Report    per-file outcomes in traversal order + counters
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_office2pdf::{BatchConfig, BatchRunner, ConverterRegistry};
//! use exe_locator::SystemLocator;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BatchConfig::builder().concurrency(2).build()?;
//!     let registry = ConverterRegistry::standard(&config, Arc::new(SystemLocator::new()));
//!     let report = BatchRunner::new(config, registry)
//!         .run(Path::new("docs"), Path::new("pdfs"))
//!         .await?;
//!     eprintln!(
//!         "{} converted, {} copied, {} skipped, {} failed",
//!         report.stats.converted, report.stats.copied, report.stats.skipped, report.stats.failed
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `office2pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-office2pdf = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod batch;
pub mod config;
pub mod convert;
pub mod error;
pub mod format;
pub mod output;
pub mod progress;
pub mod registry;
pub mod task;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{Availability, BackendAdapter, SharedAdapter};
pub use batch::{inspect, BatchRunner, CancelFlag};
pub use config::{BatchConfig, BatchConfigBuilder, LayoutOptions};
pub use convert::convert_task;
pub use error::{AttemptError, Office2PdfError};
pub use format::{classify, Format, SourceKind};
pub use output::{
    AttemptRecord, ConversionOutcome, ExtensionStatus, FileOutcome, RunReport, RunStats,
    TreeStatus,
};
pub use progress::{ConversionEvent, ConversionObserver, NoopObserver, SharedObserver, TracingObserver};
pub use registry::{AdapterDescription, ChainDescription, ConverterRegistry};
pub use task::{mirrored_destination, ConversionTask};

pub use exe_locator::{ExecutableLocator, FixedLocator, SystemLocator};
