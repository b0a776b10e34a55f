//! Marker overlay rendering: paint vertical cut lines onto a page image.
//!
//! This is the headless counterpart of the annotation canvas. Markers are
//! drawn in red, 2 px wide, over the full image height. Markers outside the
//! image (possible after an unclamped drag) are simply not visible.

use crate::error::CutlineError;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use tracing::debug;

/// Marker colour.
pub const MARKER_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);

/// Marker stroke width in pixels.
pub const MARKER_WIDTH: u32 = 2;

/// Decode page image bytes (JPEG or PNG).
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, CutlineError> {
    image::load_from_memory(bytes).map_err(|e| CutlineError::Image(e.to_string()))
}

/// Draw every marker of `markers` onto `canvas`.
///
/// A marker at `x` covers columns `[x - w/2, x + w/2)` rounded to pixels, so
/// a 2 px stroke is centred on the marker position like a canvas stroke.
pub fn draw_markers(canvas: &mut RgbaImage, markers: &[f64]) {
    let (width, height) = canvas.dimensions();
    let half = MARKER_WIDTH as f64 / 2.0;

    for &x in markers {
        let start = (x - half).round();
        let end = (x + half).round();
        if end <= 0.0 || start >= width as f64 {
            continue;
        }
        let start = start.max(0.0) as u32;
        let end = (end as u32).min(width);
        for col in start..end {
            for row in 0..height {
                canvas.put_pixel(col, row, MARKER_COLOR);
            }
        }
    }
    debug!("Drew {} markers on {}x{} canvas", markers.len(), width, height);
}

/// Decode `bytes`, draw `markers`, and return the overlay as PNG.
pub fn render_overlay_png(bytes: &[u8], markers: &[f64]) -> Result<Vec<u8>, CutlineError> {
    let mut canvas = decode_image(bytes)?.to_rgba8();
    draw_markers(&mut canvas, markers);

    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(canvas)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| CutlineError::Image(e.to_string()))?;
    Ok(buf)
}
