//! `raster-image`: places a PNG or JPEG on a single Letter page.

use super::layout::{self, PageSize};
use super::{display_name, render_blocking, BackendAdapter};
use crate::error::AttemptError;
use crate::format::Format;
use async_trait::async_trait;
use std::fs::File;
use std::path::Path;

/// Fraction of each page dimension the image may occupy.
const PAGE_FILL: f32 = 0.8;

fn render(source: &Path, out: &mut File) -> Result<(), AttemptError> {
    let decoded = image::open(source)
        .map_err(|e| AttemptError::failed(format!("cannot decode image: {e}")))?;
    let rgb = decoded.to_rgb8();
    let (width, height) = rgb.dimensions();
    let doc = layout::image_pdf(
        rgb.into_raw(),
        width,
        height,
        PageSize::LETTER,
        PAGE_FILL,
        &display_name(source),
    )?;
    layout::save(doc, out)
}

/// Decodes the image, converts it to RGB, and centres it on the page with its
/// aspect ratio preserved.
pub struct RasterImageAdapter;

#[async_trait]
impl BackendAdapter for RasterImageAdapter {
    fn name(&self) -> &str {
        "raster-image"
    }

    fn formats(&self) -> &[Format] {
        &[Format::RasterImage]
    }

    async fn invoke(&self, source: &Path, destination: &Path) -> Result<(), AttemptError> {
        render_blocking(source, destination, render).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[tokio::test]
    async fn converts_png_with_alpha() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("logo.png");
        RgbaImage::from_pixel(8, 4, Rgba([10, 20, 30, 128]))
            .save(&src)
            .unwrap();
        let dest = dir.path().join("logo.pdf");

        RasterImageAdapter.invoke(&src, &dest).await.unwrap();

        let doc = lopdf::Document::load(&dest).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[tokio::test]
    async fn undecodable_image_fails() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("photo.jpg");
        std::fs::write(&src, b"not a jpeg").unwrap();
        let dest = dir.path().join("photo.pdf");
        let err = RasterImageAdapter.invoke(&src, &dest).await.unwrap_err();
        assert!(err.to_string().contains("cannot decode image"));
        assert!(!dest.exists());
    }
}
