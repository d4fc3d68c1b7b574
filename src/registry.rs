//! Converter registry: the ordered fallback chain for each format.
//!
//! Order is configuration, not runtime discovery. The standard chains put
//! the highest-fidelity converter first and the text-only re-layout
//! adapters last:
//!
//! | Format       | Chain                                   |
//! |--------------|-----------------------------------------|
//! | word-doc     | libreoffice → pandoc → docx-text        |
//! | spreadsheet  | libreoffice → spreadsheet-table         |
//! | presentation | libreoffice → pandoc → pptx-text        |
//! | raster-image | raster-image → libreoffice              |

use crate::backend::{
    Availability, CommandShape, DocxTextAdapter, ExternalProcessAdapter, PptxTextAdapter,
    RasterImageAdapter, SharedAdapter, SpreadsheetTableAdapter,
};
use crate::config::BatchConfig;
use crate::error::Office2PdfError;
use crate::format::Format;
use exe_locator::ExecutableLocator;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Attempt budget of a registry not built from a [`BatchConfig`].
pub const DEFAULT_ATTEMPT_BUDGET: Duration = Duration::from_secs(120);

/// Ordered candidate adapters per [`Format`], plus the time budget the
/// orchestrator gives each attempt.
#[derive(Clone)]
pub struct ConverterRegistry {
    chains: BTreeMap<Format, Vec<SharedAdapter>>,
    attempt_budget: Duration,
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self {
            chains: BTreeMap::new(),
            attempt_budget: DEFAULT_ATTEMPT_BUDGET,
        }
    }
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (format, chain) in &self.chains {
            let names: Vec<&str> = chain.iter().map(|a| a.name()).collect();
            map.entry(format, &names);
        }
        map.finish()
    }
}

/// One adapter in a [`ChainDescription`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdapterDescription {
    pub name: String,
    pub availability: Availability,
}

/// A format's chain, as listed by `--list-backends`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainDescription {
    pub format: Format,
    pub adapters: Vec<AdapterDescription>,
}

impl ConverterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard chains, with external converters found through `locator`.
    ///
    /// LibreOffice gets a private profile per run when `config.concurrency`
    /// is above 1.
    pub fn standard(config: &BatchConfig, locator: Arc<dyn ExecutableLocator>) -> Self {
        let budget = Duration::from_secs(config.process_timeout_secs);
        let libreoffice: SharedAdapter = Arc::new(ExternalProcessAdapter::libreoffice(
            locator.clone(),
            budget,
            config.concurrency > 1,
        ));
        let pandoc: SharedAdapter = Arc::new(ExternalProcessAdapter::pandoc(locator, budget));
        let docx: SharedAdapter = Arc::new(DocxTextAdapter::new(config.layout));
        let sheet: SharedAdapter = Arc::new(SpreadsheetTableAdapter::new(config.layout));
        let pptx: SharedAdapter = Arc::new(PptxTextAdapter);
        let raster: SharedAdapter = Arc::new(RasterImageAdapter);

        let mut chains = BTreeMap::new();
        chains.insert(
            Format::WordDoc,
            vec![libreoffice.clone(), pandoc.clone(), docx],
        );
        chains.insert(Format::Spreadsheet, vec![libreoffice.clone(), sheet]);
        chains.insert(
            Format::Presentation,
            vec![libreoffice.clone(), pandoc, pptx],
        );
        chains.insert(Format::RasterImage, vec![raster, libreoffice]);
        Self {
            chains,
            attempt_budget: budget,
        }
    }

    /// Replace the per-attempt time budget.
    pub fn with_attempt_budget(mut self, budget: Duration) -> Self {
        self.attempt_budget = budget;
        self
    }

    /// How long one adapter attempt may run, in-process or not, before the
    /// orchestrator abandons it.
    pub fn attempt_budget(&self) -> Duration {
        self.attempt_budget
    }

    /// Append `adapter` to the end of `format`'s chain.
    ///
    /// Fails if the adapter does not declare `format`, or if an adapter with
    /// the same name is already in that chain.
    pub fn register(&mut self, format: Format, adapter: SharedAdapter) -> Result<(), Office2PdfError> {
        if !adapter.applies_to(format) {
            return Err(Office2PdfError::InvalidRegistry(format!(
                "adapter '{}' does not handle {format}",
                adapter.name()
            )));
        }
        let chain = self.chains.entry(format).or_default();
        if chain.iter().any(|a| a.name() == adapter.name()) {
            return Err(Office2PdfError::InvalidRegistry(format!(
                "adapter '{}' is already registered for {format}",
                adapter.name()
            )));
        }
        chain.push(adapter);
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, format: Format, adapter: SharedAdapter) -> Result<Self, Office2PdfError> {
        self.register(format, adapter)?;
        Ok(self)
    }

    /// Register a command-line converter for `formats`, inserted in front of
    /// each of their chains.
    ///
    /// `args` may use `{input}`, `{output}` and `{outdir}`. The tool must
    /// write `{output}` (or `<stem>.pdf` inside `{outdir}`).
    pub fn prepend_command(
        &mut self,
        name: &str,
        executable: &str,
        formats: &[Format],
        args: Vec<String>,
        timeout: Duration,
        locator: Arc<dyn ExecutableLocator>,
    ) -> Result<(), Office2PdfError> {
        if formats.is_empty() {
            return Err(Office2PdfError::InvalidRegistry(format!(
                "custom converter '{name}' declares no formats"
            )));
        }
        let adapter: SharedAdapter = Arc::new(ExternalProcessAdapter::new(
            name,
            executable,
            formats.to_vec(),
            CommandShape::Template(args),
            timeout,
            locator,
        ));
        for format in formats {
            let chain = self.chains.entry(*format).or_default();
            if chain.iter().any(|a| a.name() == name) {
                return Err(Office2PdfError::InvalidRegistry(format!(
                    "adapter '{name}' is already registered for {format}"
                )));
            }
        }
        for format in formats {
            self.chains
                .entry(*format)
                .or_default()
                .insert(0, adapter.clone());
        }
        Ok(())
    }

    /// Candidates for `format`, in the order they must be tried.
    pub fn candidates_for(&self, format: Format) -> &[SharedAdapter] {
        self.chains.get(&format).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every chain with each adapter's availability. Probes the adapters.
    pub fn describe(&self) -> Vec<ChainDescription> {
        self.chains
            .iter()
            .map(|(format, chain)| ChainDescription {
                format: *format,
                adapters: chain
                    .iter()
                    .map(|a| AdapterDescription {
                        name: a.name().to_string(),
                        availability: a.probe(),
                    })
                    .collect(),
            })
            .collect()
    }
}
