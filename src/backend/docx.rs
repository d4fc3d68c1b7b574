//! `docx-text`: last-resort re-layout of a WordprocessingML document.
//!
//! Keeps paragraph text, turns `Title`/`Heading*` styles into headings, and
//! renders tables as `cell | cell | cell` lines. Formatting, images and
//! layout are discarded.

use super::layout::{self, PageSize, TextLayout};
use super::ooxml::{self, truncate_cell};
use super::{display_name, render_blocking, BackendAdapter};
use crate::config::LayoutOptions;
use crate::error::AttemptError;
use crate::format::{normalized_extension, Format};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::File;
use std::path::Path;

static BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<w:tbl>.*?</w:tbl>|<w:p(?:\s[^>]*)?/>|<w:p(?:\s[^>]*)?>.*?</w:p>").unwrap());
static ROW: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<w:tr(?:\s[^>]*)?>.*?</w:tr>").unwrap());
static CELL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<w:tc(?:\s[^>]*)?>.*?</w:tc>").unwrap());
static TEXT: Lazy<Regex> = Lazy::new(|| Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>").unwrap());
static STYLE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"<w:pStyle\s+w:val="([^"]+)""#).unwrap());
static BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"<w:(?:tab|br|cr)\s*/>").unwrap());

/// A block of a word-processing document, in reading order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DocBlock {
    Heading(String),
    Paragraph(String),
    Table(Vec<Vec<String>>),
}

/// Extract blocks from `word/document.xml`.
pub(crate) fn parse_document(xml: &str) -> Vec<DocBlock> {
    let mut blocks = Vec::new();
    for m in BLOCK.find_iter(xml) {
        let part = m.as_str();
        if part.starts_with("<w:tbl>") {
            let rows: Vec<Vec<String>> = ROW
                .find_iter(part)
                .map(|row| {
                    CELL.find_iter(row.as_str())
                        .map(|cell| paragraph_text(cell.as_str()).trim().to_string())
                        .collect()
                })
                .filter(|cells: &Vec<String>| !cells.is_empty())
                .collect();
            if !rows.is_empty() {
                blocks.push(DocBlock::Table(rows));
            }
            continue;
        }
        let text = paragraph_text(part);
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        let is_heading = STYLE
            .captures(part)
            .map(|c| {
                let style = &c[1];
                style == "Title" || style.starts_with("Heading")
            })
            .unwrap_or(false);
        blocks.push(if is_heading {
            DocBlock::Heading(text.to_string())
        } else {
            DocBlock::Paragraph(text.to_string())
        });
    }
    blocks
}

fn paragraph_text(xml: &str) -> String {
    let spaced = BREAK.replace_all(xml, "<w:t> </w:t>");
    ooxml::run_text(&spaced, &TEXT)
}

fn render(source: &Path, out: &mut File, options: LayoutOptions) -> Result<(), AttemptError> {
    let mut package = ooxml::open_package(source)?;
    let xml = ooxml::read_part(&mut package, "word/document.xml")?;
    let blocks = parse_document(&xml);

    let mut page = TextLayout::new(PageSize::LETTER);
    page.title(&display_name(source));
    for block in &blocks {
        match block {
            DocBlock::Heading(text) => page.heading(text),
            DocBlock::Paragraph(text) => page.paragraph(text),
            DocBlock::Table(rows) => {
                for row in rows {
                    let cells: Vec<String> = row
                        .iter()
                        .map(|c| truncate_cell(c, options.max_table_cell_chars))
                        .collect();
                    page.paragraph(&cells.join(" | "));
                }
            }
        }
    }
    layout::save(page.into_pdf(&display_name(source))?, out)
}

/// Re-lays out the text of a `.docx` file. Legacy `.doc`, `.odt` and `.rtf`
/// inputs are rejected.
pub struct DocxTextAdapter {
    options: LayoutOptions,
}

impl DocxTextAdapter {
    pub fn new(options: LayoutOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl BackendAdapter for DocxTextAdapter {
    fn name(&self) -> &str {
        "docx-text"
    }

    fn formats(&self) -> &[Format] {
        &[Format::WordDoc]
    }

    async fn invoke(&self, source: &Path, destination: &Path) -> Result<(), AttemptError> {
        if normalized_extension(source).as_deref() != Some("docx") {
            return Err(AttemptError::failed("docx-text only reads .docx packages"));
        }
        let options = self.options;
        render_blocking(source, destination, move |src, out| render(src, out, options)).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::ooxml::test_support::write_package;
    use super::*;

    const DOC: &str = r#"<?xml version="1.0"?>
<w:document><w:body>
<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Quarterly</w:t></w:r></w:p>
<w:p><w:r><w:t xml:space="preserve">Revenue &amp; </w:t></w:r><w:r><w:t>costs</w:t></w:r></w:p>
<w:p/>
<w:tbl><w:tblPr/>
<w:tr><w:tc><w:p><w:r><w:t>Region</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>Total</w:t></w:r></w:p></w:tc></w:tr>
<w:tr><w:tc><w:p><w:r><w:t>EMEA</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>42</w:t></w:r></w:p></w:tc></w:tr>
</w:tbl>
<w:p><w:r><w:t>Done</w:t><w:tab/><w:t>here</w:t></w:r></w:p>
</w:body></w:document>"#;

    #[test]
    fn parses_headings_paragraphs_and_tables() {
        let blocks = parse_document(DOC);
        assert_eq!(
            blocks,
            vec![
                DocBlock::Heading("Quarterly".into()),
                DocBlock::Paragraph("Revenue & costs".into()),
                DocBlock::Table(vec![
                    vec!["Region".into(), "Total".into()],
                    vec!["EMEA".into(), "42".into()],
                ]),
                DocBlock::Paragraph("Done here".into()),
            ]
        );
    }

    #[tokio::test]
    async fn converts_docx_package() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("report.docx");
        write_package(&src, &[("word/document.xml", DOC)]);
        let dest = dir.path().join("report.pdf");

        DocxTextAdapter::new(LayoutOptions::default())
            .invoke(&src, &dest)
            .await
            .unwrap();
        let bytes = std::fs::read(&dest).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn legacy_doc_is_rejected_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("old.doc");
        std::fs::write(&src, b"\xD0\xCF\x11\xE0").unwrap();
        let dest = dir.path().join("old.pdf");
        let err = DocxTextAdapter::new(LayoutOptions::default())
            .invoke(&src, &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, AttemptError::InvocationFailed { .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn corrupt_docx_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("broken.docx");
        std::fs::write(&src, b"garbage").unwrap();
        let dest = dir.path().join("broken.pdf");
        assert!(DocxTextAdapter::new(LayoutOptions::default())
            .invoke(&src, &dest)
            .await
            .is_err());
        assert!(!dest.exists());
    }
}
