//! Configuration types for batch conversion.
//!
//! All batch behaviour is controlled through [`BatchConfig`], built via its
//! [`BatchConfigBuilder`]. Adapter-facing knobs (process time budget, layout
//! caps) live here too so that [`crate::registry::ConverterRegistry::standard`]
//! can hand each adapter exactly what it needs at construction time.

use crate::error::Office2PdfError;
use serde::{Deserialize, Serialize};

/// Configuration for a batch run.
///
/// Built via [`BatchConfig::builder()`] or using [`BatchConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_office2pdf::BatchConfig;
///
/// let config = BatchConfig::builder()
///     .process_timeout_secs(60)
///     .concurrency(4)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Time budget for one adapter attempt, in seconds. Default: 120.
    ///
    /// An attempt that overruns counts as timed out and the next adapter is
    /// tried. External processes are killed together with everything they
    /// started.
    pub process_timeout_secs: u64,

    /// Number of files converted at once. Default: 1 (strictly sequential).
    ///
    /// Attempts for a single file always run one after another regardless.
    /// Raising this also makes LibreOffice run with a private profile per
    /// invocation, since concurrent instances sharing one profile lock each
    /// other out.
    pub concurrency: usize,

    /// Copy PDFs found in the source tree to their mirrored location. Default: true.
    pub copy_existing_pdfs: bool,

    /// Recreate every source directory under the destination before
    /// converting, including directories with nothing to convert. Default: true.
    pub mirror_directories: bool,

    /// Include dot-files and Office lock files (`~$name.docx`). Default: false.
    pub include_hidden: bool,

    /// Limits for the in-process text re-layout adapters.
    pub layout: LayoutOptions,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            process_timeout_secs: 120,
            concurrency: 1,
            copy_existing_pdfs: true,
            mirror_directories: true,
            include_hidden: false,
            layout: LayoutOptions::default(),
        }
    }
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn process_timeout_secs(mut self, secs: u64) -> Self {
        self.config.process_timeout_secs = secs;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn copy_existing_pdfs(mut self, v: bool) -> Self {
        self.config.copy_existing_pdfs = v;
        self
    }

    pub fn mirror_directories(mut self, v: bool) -> Self {
        self.config.mirror_directories = v;
        self
    }

    pub fn include_hidden(mut self, v: bool) -> Self {
        self.config.include_hidden = v;
        self
    }

    pub fn layout(mut self, layout: LayoutOptions) -> Self {
        self.config.layout = layout;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, Office2PdfError> {
        let c = &self.config;
        if c.process_timeout_secs == 0 {
            return Err(Office2PdfError::InvalidConfig(
                "Process timeout must be ≥ 1 second".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(Office2PdfError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        let l = &c.layout;
        if l.max_sheet_rows == 0 || l.max_sheet_columns == 0 {
            return Err(Office2PdfError::InvalidConfig(format!(
                "Sheet caps must be non-zero, got {}×{}",
                l.max_sheet_rows, l.max_sheet_columns
            )));
        }
        if l.max_sheet_cell_chars < 4 || l.max_table_cell_chars < 4 {
            return Err(Office2PdfError::InvalidConfig(
                "Cell truncation limits must be ≥ 4 characters".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Caps applied when a spreadsheet or document table is re-laid out as text.
///
/// Wide sheets and long cells would otherwise produce unreadable PDFs with
/// thousands of near-empty pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutOptions {
    /// Rows rendered per sheet. Default: 100.
    pub max_sheet_rows: usize,
    /// Columns rendered per sheet. Default: 20.
    pub max_sheet_columns: usize,
    /// Characters kept per spreadsheet cell before `...`. Default: 30.
    pub max_sheet_cell_chars: usize,
    /// Characters kept per word-processor table cell before `...`. Default: 50.
    pub max_table_cell_chars: usize,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            max_sheet_rows: 100,
            max_sheet_columns: 20,
            max_sheet_cell_chars: 30,
            max_table_cell_chars: 50,
        }
    }
}
