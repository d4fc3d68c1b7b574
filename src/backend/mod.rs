//! Backend adapters: the concrete mechanisms that turn one document into a PDF.
//!
//! Each adapter is a black box to the orchestrator. It declares the formats it
//! handles, answers a cheap availability probe, and converts one source file
//! into one destination file. The orchestrator never trusts a reported success
//! on its own; see [`crate::convert::convert_task`].
//!
//! ## Adapters
//!
//! | Name                | Kind        | Formats                          |
//! |---------------------|-------------|----------------------------------|
//! | `libreoffice`       | process     | all                              |
//! | `pandoc`            | process     | word-doc, presentation           |
//! | `docx-text`         | in-process  | word-doc (`.docx` only)          |
//! | `spreadsheet-table` | in-process  | spreadsheet                      |
//! | `pptx-text`         | in-process  | presentation (`.pptx` only)      |
//! | `raster-image`      | in-process  | raster-image                     |
//!
//! In-process adapters run on the blocking pool and write through
//! [`write_atomically`], so a crash halfway leaves nothing at the destination.

pub mod docx;
pub mod layout;
pub(crate) mod ooxml;
pub mod pptx;
pub mod process;
pub mod raster;
pub mod sheet;

use crate::error::AttemptError;
use crate::format::Format;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use docx::DocxTextAdapter;
pub use pptx::PptxTextAdapter;
pub use process::{CommandShape, ExternalProcessAdapter};
pub use raster::RasterImageAdapter;
pub use sheet::SpreadsheetTableAdapter;

/// Result of an adapter's availability probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum Availability {
    Available,
    /// Not installed on this host, with a human-readable reason.
    Unavailable(String),
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }
}

/// One way of converting documents of some formats to PDF.
///
/// Adapters are registered once, shared read-only across tasks, and must not
/// hold per-file state.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// Stable name used in reports, e.g. `"libreoffice"`.
    fn name(&self) -> &str;

    /// Formats this adapter can be registered for.
    fn formats(&self) -> &[Format];

    /// Whether the adapter can run on this host.
    ///
    /// Must be cheap after the first call: implementations compute it once
    /// and keep the answer for the life of the process.
    fn probe(&self) -> Availability {
        Availability::Available
    }

    /// Convert `source` into a PDF at exactly `destination`.
    ///
    /// The destination's parent directory already exists. On error the
    /// adapter should not leave a file at `destination`; the orchestrator
    /// removes one if it does.
    async fn invoke(&self, source: &Path, destination: &Path) -> Result<(), AttemptError>;

    fn applies_to(&self, format: Format) -> bool {
        self.formats().contains(&format)
    }
}

/// Shared adapter handle, as stored in the registry.
pub type SharedAdapter = Arc<dyn BackendAdapter>;

/// Write `destination` via a temp file in the same directory, renamed into
/// place only once `write` succeeds.
pub(crate) fn write_atomically<F>(destination: &Path, write: F) -> Result<(), AttemptError>
where
    F: FnOnce(&mut File) -> Result<(), AttemptError>,
{
    write_unless_abandoned(destination, &AtomicBool::new(false), write)
}

/// [`write_atomically`], except the rename is skipped once `abandoned` is set.
fn write_unless_abandoned<F>(
    destination: &Path,
    abandoned: &AtomicBool,
    write: F,
) -> Result<(), AttemptError>
where
    F: FnOnce(&mut File) -> Result<(), AttemptError>,
{
    let parent = destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::Builder::new()
        .prefix(".office2pdf-")
        .suffix(".part")
        .tempfile_in(parent)?;
    write(tmp.as_file_mut())?;
    tmp.as_file_mut().sync_all()?;
    if abandoned.load(Ordering::SeqCst) {
        return Err(AttemptError::failed(
            "attempt was abandoned before its output was committed",
        ));
    }
    tmp.persist(destination).map_err(|e| AttemptError::from(e.error))?;
    Ok(())
}

/// Marks a blocking render abandoned when the awaiting future goes away.
struct AbandonOnDrop(Arc<AtomicBool>);

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Run a synchronous renderer on the blocking pool, writing atomically to
/// `destination`.
///
/// The blocking thread cannot be stopped, so if the caller stops waiting
/// (an attempt timeout) the finished output is discarded instead of being
/// renamed onto `destination`.
pub(crate) async fn render_blocking<F>(
    source: &Path,
    destination: &Path,
    render: F,
) -> Result<(), AttemptError>
where
    F: FnOnce(&Path, &mut File) -> Result<(), AttemptError> + Send + 'static,
{
    let source = source.to_path_buf();
    let destination = destination.to_path_buf();
    let abandoned = Arc::new(AtomicBool::new(false));
    let _abandon_on_drop = AbandonOnDrop(abandoned.clone());
    tokio::task::spawn_blocking(move || {
        write_unless_abandoned(&destination, &abandoned, |file| render(&source, file))
    })
    .await
    .map_err(|e| AttemptError::failed(format!("renderer panicked: {e}")))?
}

/// Display name for a source file, used as the PDF title.
pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
