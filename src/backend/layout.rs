//! Minimal PDF writer for the in-process adapters.
//!
//! Text is set in the standard Type1 fonts (Helvetica, Helvetica-Bold,
//! Courier) with WinAnsi encoding, so no font data is embedded. Characters
//! outside that encoding are written as `?`. Line breaking is greedy and uses
//! an average glyph width per font, which is exact for Courier and close
//! enough for Helvetica body text.

use crate::error::AttemptError;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::io::Write;

/// Page size in PDF points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub const LETTER: PageSize = PageSize {
        width: 612.0,
        height: 792.0,
    };
    pub const A4: PageSize = PageSize {
        width: 595.0,
        height: 842.0,
    };

    pub fn landscape(self) -> PageSize {
        PageSize {
            width: self.height,
            height: self.width,
        }
    }
}

const MARGIN: f32 = 50.0;

#[derive(Debug, Clone, Copy)]
enum Font {
    Regular,
    Bold,
    Mono,
}

impl Font {
    const ALL: [Font; 3] = [Font::Regular, Font::Bold, Font::Mono];

    fn resource(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
            Font::Mono => "F3",
        }
    }

    fn base_font(self) -> &'static str {
        match self {
            Font::Regular => "Helvetica",
            Font::Bold => "Helvetica-Bold",
            Font::Mono => "Courier",
        }
    }

    /// Average advance width as a fraction of the font size.
    fn char_width(self) -> f32 {
        match self {
            Font::Regular => 0.5,
            Font::Bold => 0.56,
            Font::Mono => 0.6,
        }
    }
}

const TITLE_SIZE: f32 = 18.0;
const HEADING_SIZE: f32 = 14.0;
const BODY_SIZE: f32 = 11.0;
const MONO_SIZE: f32 = 8.0;

/// Flowing text layout: lines go top to bottom and spill onto new pages.
pub struct TextLayout {
    page: PageSize,
    pages: Vec<Vec<Operation>>,
    current: Vec<Operation>,
    cursor_y: f32,
}

impl TextLayout {
    pub fn new(page: PageSize) -> Self {
        Self {
            page,
            pages: Vec::new(),
            current: Vec::new(),
            cursor_y: page.height - MARGIN,
        }
    }

    pub fn title(&mut self, text: &str) {
        self.wrapped(text, Font::Bold, TITLE_SIZE);
        self.gap(TITLE_SIZE * 0.5);
    }

    pub fn heading(&mut self, text: &str) {
        self.gap(HEADING_SIZE * 0.4);
        self.wrapped(text, Font::Bold, HEADING_SIZE);
        self.gap(HEADING_SIZE * 0.2);
    }

    /// Body text, word-wrapped to the page width.
    pub fn paragraph(&mut self, text: &str) {
        self.wrapped(text, Font::Regular, BODY_SIZE);
        self.gap(BODY_SIZE * 0.4);
    }

    /// One monospaced line, clipped to the page width.
    pub fn mono(&mut self, line: &str) {
        let max = self.max_mono_chars();
        let clipped: String = if line.chars().count() > max {
            line.chars().take(max).collect()
        } else {
            line.to_string()
        };
        self.line(&clipped, Font::Mono, MONO_SIZE);
    }

    /// Characters that fit on one monospaced line.
    pub fn max_mono_chars(&self) -> usize {
        max_chars(self.usable_width(), Font::Mono, MONO_SIZE)
    }

    pub fn gap(&mut self, points: f32) {
        self.cursor_y -= points;
    }

    /// Start a new page unless the current one is still empty.
    pub fn page_break(&mut self) {
        if !self.current.is_empty() {
            self.pages.push(std::mem::take(&mut self.current));
        }
        self.cursor_y = self.page.height - MARGIN;
    }

    /// Number of pages laid out so far, counting the one in progress.
    pub fn page_count(&self) -> usize {
        self.pages.len() + usize::from(!self.current.is_empty())
    }

    /// Assemble the pages into a document titled `title`.
    pub fn into_pdf(mut self, title: &str) -> Result<Document, AttemptError> {
        self.page_break();
        if self.pages.is_empty() {
            self.pages.push(Vec::new());
        }

        let mut pdf = PdfBuilder::new();
        let mut fonts = Dictionary::new();
        for font in Font::ALL {
            let id = pdf.doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => font.base_font(),
                "Encoding" => "WinAnsiEncoding",
            });
            fonts.set(font.resource(), id);
        }
        let resources = dictionary! { "Font" => fonts };
        for ops in self.pages {
            pdf.add_page(self.page, resources.clone(), ops)?;
        }
        Ok(pdf.finish(title))
    }

    fn usable_width(&self) -> f32 {
        self.page.width - 2.0 * MARGIN
    }

    fn wrapped(&mut self, text: &str, font: Font, size: f32) {
        let max = max_chars(self.usable_width(), font, size);
        for line in wrap(text, max) {
            self.line(&line, font, size);
        }
    }

    fn line(&mut self, text: &str, font: Font, size: f32) {
        let leading = size * 1.3;
        if self.cursor_y - leading < MARGIN {
            self.page_break();
        }
        self.cursor_y -= leading;
        self.current.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![font.resource().into(), size.into()]),
            Operation::new("Td", vec![MARGIN.into(), self.cursor_y.into()]),
            Operation::new("Tj", vec![Object::string_literal(encode_text(text))]),
            Operation::new("ET", vec![]),
        ]);
    }
}

/// Place one RGB8 image centred on a page, scaled to fit `fill` of each
/// page dimension with its aspect ratio preserved.
pub fn image_pdf(
    rgb: Vec<u8>,
    width: u32,
    height: u32,
    page: PageSize,
    fill: f32,
    title: &str,
) -> Result<Document, AttemptError> {
    if width == 0 || height == 0 {
        return Err(AttemptError::failed("image has zero width or height"));
    }
    let scale = (page.width * fill / width as f32).min(page.height * fill / height as f32);
    let draw_w = width as f32 * scale;
    let draw_h = height as f32 * scale;
    let x = (page.width - draw_w) / 2.0;
    let y = (page.height - draw_h) / 2.0;

    let mut pdf = PdfBuilder::new();
    let image_id = pdf.doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(width),
            "Height" => i64::from(height),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        },
        rgb,
    ));
    let resources = dictionary! { "XObject" => dictionary! { "Im0" => image_id } };
    let ops = vec![
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![
                draw_w.into(),
                0.into(),
                0.into(),
                draw_h.into(),
                x.into(),
                y.into(),
            ],
        ),
        Operation::new("Do", vec!["Im0".into()]),
        Operation::new("Q", vec![]),
    ];
    pdf.add_page(page, resources, ops)?;
    Ok(pdf.finish(title))
}

/// Compress and serialise `doc`.
pub fn save<W: Write>(mut doc: Document, out: &mut W) -> Result<(), AttemptError> {
    doc.compress();
    doc.save_to(out)
        .map_err(|e| AttemptError::failed(format!("failed to write PDF: {e}")))?;
    Ok(())
}

struct PdfBuilder {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl PdfBuilder {
    fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }

    fn add_page(
        &mut self,
        size: PageSize,
        resources: Dictionary,
        operations: Vec<Operation>,
    ) -> Result<(), AttemptError> {
        let content = Content { operations }
            .encode()
            .map_err(|e| AttemptError::failed(format!("failed to encode page content: {e}")))?;
        let content_id = self.doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0.into(), 0.into(), size.width.into(), size.height.into()],
            "Resources" => resources,
            "Contents" => content_id,
        });
        self.kids.push(page_id.into());
        Ok(())
    }

    fn finish(mut self, title: &str) -> Document {
        let count = self.kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => self.kids,
                "Count" => count,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        let info_id = self.doc.add_object(dictionary! {
            "Title" => Object::string_literal(encode_text(title)),
            "Producer" => Object::string_literal("edgequake-office2pdf"),
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.trailer.set("Info", info_id);
        self.doc
    }
}

fn max_chars(width: f32, font: Font, size: f32) -> usize {
    ((width / (size * font.char_width())).floor() as usize).max(1)
}

/// Greedy word wrap at `max` characters. Words longer than a line are split.
/// Embedded newlines always break.
pub(crate) fn wrap(text: &str, max: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for raw in text.lines() {
        let mut line = String::new();
        let mut len = 0;
        for word in raw.split_whitespace() {
            let mut chars: Vec<char> = word.chars().collect();
            while chars.len() > max {
                if len > 0 {
                    lines.push(std::mem::take(&mut line));
                    len = 0;
                }
                lines.push(chars.drain(..max).collect());
            }
            if chars.is_empty() {
                continue;
            }
            let needed = if len == 0 { chars.len() } else { len + 1 + chars.len() };
            if needed > max {
                lines.push(std::mem::take(&mut line));
                len = 0;
            }
            if len > 0 {
                line.push(' ');
                len += 1;
            }
            line.extend(chars.iter());
            len += chars.len();
        }
        lines.push(line);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Map text to WinAnsi bytes.
fn encode_text(text: &str) -> Vec<u8> {
    text.chars()
        .filter_map(|c| match c {
            '\t' => Some(b' '),
            c if c.is_control() => None,
            '€' => Some(0x80),
            '…' => Some(0x85),
            '‘' => Some(0x91),
            '’' => Some(0x92),
            '“' => Some(0x93),
            '”' => Some(0x94),
            '•' => Some(0x95),
            '–' => Some(0x96),
            '—' => Some(0x97),
            c if (c as u32) < 0x80 || (0xA0..=0xFF).contains(&(c as u32)) => Some(c as u8),
            _ => Some(b'?'),
        })
        .collect()
}
