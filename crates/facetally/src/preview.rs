//! Frame annotation and terminal previews.

use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::path::Path;

use crate::engine::FaceOutcome;

/// Longest side of the delete-confirmation thumbnail.
pub const THUMBNAIL_SIZE: u32 = 250;
const BOX_THICKNESS: i32 = 2;
const KNOWN_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const UNKNOWN_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
/// Dark to light.
const ASCII_RAMP: &[u8] = b"@%#*+=-:. ";

/// Draw a green box around known faces and a red box around unknown ones.
pub fn annotate(gray: &GrayImage, outcomes: &[FaceOutcome]) -> RgbImage {
    let mut canvas = DynamicImage::ImageLuma8(gray.clone()).into_rgb8();
    for outcome in outcomes {
        let color = if outcome.verdict.is_known() {
            KNOWN_COLOR
        } else {
            UNKNOWN_COLOR
        };
        let r = outcome.rect;
        for t in 0..BOX_THICKNESS {
            let w = r.width as i32 - 2 * t;
            let h = r.height as i32 - 2 * t;
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(r.x as i32 + t, r.y as i32 + t).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(&mut canvas, rect, color);
        }
    }
    canvas
}

/// Load a sample and shrink it to fit a `THUMBNAIL_SIZE` square. Smaller
/// images are returned at their own size.
pub fn thumbnail(path: &Path) -> Result<GrayImage, image::ImageError> {
    let img = image::open(path)?;
    let img = if img.width() > THUMBNAIL_SIZE || img.height() > THUMBNAIL_SIZE {
        img.thumbnail(THUMBNAIL_SIZE, THUMBNAIL_SIZE)
    } else {
        img
    };
    Ok(img.into_luma8())
}

/// Render a grayscale image as `cols`-wide ASCII art. Terminal cells are
/// roughly twice as tall as wide, so rows are halved.
pub fn ascii_art(gray: &GrayImage, cols: u32) -> String {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 || cols == 0 {
        return String::new();
    }
    let cols = cols.min(w);
    let rows = ((h as u64 * cols as u64) / (w as u64 * 2)).max(1) as u32;
    let small = image::imageops::resize(gray, cols, rows, image::imageops::FilterType::Triangle);

    let mut out = String::with_capacity(((cols + 1) * rows) as usize);
    for y in 0..rows {
        for x in 0..cols {
            let v = small.get_pixel(x, y).0[0] as usize;
            let idx = v * (ASCII_RAMP.len() - 1) / 255;
            out.push(ASCII_RAMP[idx] as char);
        }
        out.push('\n');
    }
    out
}
