//! `pptx-text`: one page group per slide, titled "Slide N", with the text of
//! the slide's paragraphs.

use super::layout::{self, PageSize, TextLayout};
use super::ooxml;
use super::{display_name, render_blocking, BackendAdapter};
use crate::error::AttemptError;
use crate::format::{normalized_extension, Format};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::File;
use std::path::Path;

static SLIDE_PART: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ppt/slides/slide(\d+)\.xml$").unwrap());
static PARAGRAPH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<a:p(?:\s[^>]*)?>.*?</a:p>").unwrap());
static TEXT: Lazy<Regex> = Lazy::new(|| Regex::new(r"<a:t(?:\s[^>]*)?>([^<]*)</a:t>").unwrap());

/// Slide part names in presentation order.
pub(crate) fn slide_parts<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut slides: Vec<(u32, String)> = names
        .filter_map(|name| {
            let caps = SLIDE_PART.captures(name)?;
            let number = caps[1].parse().ok()?;
            Some((number, name.to_string()))
        })
        .collect();
    slides.sort();
    slides.into_iter().map(|(_, name)| name).collect()
}

/// Non-empty paragraph texts of one slide.
pub(crate) fn slide_text(xml: &str) -> Vec<String> {
    PARAGRAPH
        .find_iter(xml)
        .map(|p| ooxml::run_text(p.as_str(), &TEXT).trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn render(source: &Path, out: &mut File) -> Result<(), AttemptError> {
    let mut package = ooxml::open_package(source)?;
    let parts = slide_parts(package.file_names());
    if parts.is_empty() {
        return Err(AttemptError::failed("presentation has no slides"));
    }

    let mut page = TextLayout::new(PageSize::LETTER.landscape());
    for (index, part) in parts.iter().enumerate() {
        let xml = ooxml::read_part(&mut package, part)?;
        page.page_break();
        page.title(&format!("Slide {}", index + 1));
        for text in slide_text(&xml) {
            page.paragraph(&text);
        }
    }
    layout::save(page.into_pdf(&display_name(source))?, out)
}

/// Extracts the text of each slide of a `.pptx` file.
pub struct PptxTextAdapter;

#[async_trait]
impl BackendAdapter for PptxTextAdapter {
    fn name(&self) -> &str {
        "pptx-text"
    }

    fn formats(&self) -> &[Format] {
        &[Format::Presentation]
    }

    async fn invoke(&self, source: &Path, destination: &Path) -> Result<(), AttemptError> {
        if normalized_extension(source).as_deref() != Some("pptx") {
            return Err(AttemptError::failed("pptx-text only reads .pptx packages"));
        }
        render_blocking(source, destination, render).await
    }
}
