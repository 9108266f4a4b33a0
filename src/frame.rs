//! Decoded frame helpers.
//!
//! Frames travel through the pipeline as `image::RgbImage`. This module holds
//! the JPEG codec boundary and the few pixel operations the pipeline needs:
//! - `decode_jpeg` / `encode_jpeg`: codec boundary (delegated to `image`)
//! - `draw_window`: outline a tracking window on a frame
//! - `crop_region`: cut a region of interest out of a grabbed still
//! - `save_jpeg`: write a frame to disk without exposing a half-written file

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, Rgb, RgbImage};
use std::path::Path;

use crate::Rect;

/// Regions with a side of this many pixels or fewer are too small to model.
pub const MIN_REGION_SIDE: i32 = 5;

/// Outline thickness used when annotating tracked frames.
pub const WINDOW_OUTLINE_THICKNESS: u32 = 3;

/// Decode a JPEG byte slice into an RGB frame.
pub fn decode_jpeg(bytes: &[u8]) -> Result<RgbImage> {
    if bytes.is_empty() {
        return Err(anyhow!("decode jpeg: empty frame"));
    }
    let image =
        image::load_from_memory_with_format(bytes, ImageFormat::Jpeg).context("decode jpeg")?;
    Ok(image.into_rgb8())
}

/// Encode an RGB frame as JPEG with the given quality (1..=100).
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100));
    encoder.encode_image(image).context("encode jpeg")?;
    Ok(bytes)
}

/// Draw the outline of `window` onto `image`, clipped to the frame.
pub fn draw_window(image: &mut RgbImage, window: Rect, color: Rgb<u8>, thickness: u32) {
    let bounds = Rect::new(0, 0, image.width() as i32, image.height() as i32);
    let clipped = window.intersect(&bounds);
    if clipped.is_empty() {
        return;
    }
    let interior = window.inset(i32::try_from(thickness).unwrap_or(i32::MAX));
    for y in clipped.y..clipped.bottom() {
        for x in clipped.x..clipped.right() {
            if !interior.contains(x, y) {
                image.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}

/// Copy `region` out of `image`.
///
/// The region is clipped to the frame first; regions whose clipped width or
/// height is `MIN_REGION_SIDE` or less are rejected.
pub fn crop_region(image: &RgbImage, region: Rect) -> Result<RgbImage> {
    let bounds = Rect::new(0, 0, image.width() as i32, image.height() as i32);
    let clipped = region.intersect(&bounds);
    if clipped.width <= MIN_REGION_SIDE || clipped.height <= MIN_REGION_SIDE {
        return Err(anyhow!(
            "selected region {} is too small to process (needs more than {} px per side)",
            clipped,
            MIN_REGION_SIDE
        ));
    }
    Ok(image::imageops::crop_imm(
        image,
        clipped.x as u32,
        clipped.y as u32,
        clipped.width as u32,
        clipped.height as u32,
    )
    .to_image())
}

/// Write `image` as JPEG to `path` via a sibling temp file and rename.
pub fn save_jpeg(image: &RgbImage, path: &Path, quality: u8) -> Result<()> {
    let bytes = encode_jpeg(image, quality)?;
    let tmp = path.with_extension("jpg.tmp");
    std::fs::write(&tmp, &bytes).with_context(|| format!("write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("rename {} to {}", tmp.display(), path.display()))?;
    Ok(())
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgb<u8> = Rgb([255, 0, 0]);
    const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

    #[test]
    fn jpeg_codec_preserves_dimensions() {
        let image = RgbImage::from_pixel(32, 24, Rgb([10, 200, 30]));
        let bytes = encode_jpeg(&image, 90).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        assert_eq!(&bytes[bytes.len() - 2..], &[0xFF, 0xD9]);
        let decoded = decode_jpeg(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (32, 24));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_jpeg(&[]).is_err());
        assert!(decode_jpeg(&[0xFF, 0xD8, 0x00, 0xFF, 0xD9]).is_err());
    }

    #[test]
    fn draw_window_outlines_only_the_border() {
        let mut image = RgbImage::from_pixel(20, 20, BLACK);
        draw_window(&mut image, Rect::new(2, 2, 10, 10), RED, 2);
        assert_eq!(*image.get_pixel(2, 2), RED);
        assert_eq!(*image.get_pixel(3, 7), RED);
        assert_eq!(*image.get_pixel(11, 11), RED);
        assert_eq!(*image.get_pixel(7, 7), BLACK);
        assert_eq!(*image.get_pixel(12, 12), BLACK);
    }

    #[test]
    fn draw_window_clips_to_frame() {
        let mut image = RgbImage::from_pixel(10, 10, BLACK);
        draw_window(&mut image, Rect::new(-5, -5, 8, 8), RED, 1);
        assert_eq!(*image.get_pixel(2, 0), RED);
        assert_eq!(*image.get_pixel(0, 0), BLACK);
        draw_window(&mut image, Rect::new(50, 50, 4, 4), RED, 1);
    }

    #[test]
    fn draw_window_handles_extreme_coordinates() {
        let mut image = RgbImage::from_pixel(10, 10, BLACK);
        draw_window(&mut image, Rect::new(i32::MAX - 5, 0, 10, 10), RED, 3);
        draw_window(&mut image, Rect::new(i32::MIN, i32::MIN, i32::MAX, i32::MAX), RED, 3);
        assert!(image.pixels().all(|pixel| *pixel == BLACK));

        draw_window(&mut image, Rect::new(-4, -4, 12, 12), RED, u32::MAX);
        assert_eq!(*image.get_pixel(5, 5), RED);
    }

    #[test]
    fn crop_region_clips_and_rejects_small_selections() {
        let image = RgbImage::from_fn(40, 30, |x, _| Rgb([x as u8, 0, 0]));
        let crop = crop_region(&image, Rect::new(30, 10, 20, 10)).unwrap();
        assert_eq!(crop.dimensions(), (10, 10));
        assert_eq!(crop.get_pixel(0, 0).0[0], 30);

        assert!(crop_region(&image, Rect::new(0, 0, 5, 20)).is_err());
        assert!(crop_region(&image, Rect::new(38, 0, 20, 20)).is_err());
    }

    #[test]
    fn save_jpeg_writes_decodable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("still.jpg");
        let image = RgbImage::from_pixel(16, 16, Rgb([0, 0, 255]));
        save_jpeg(&image, &path, 80).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(decode_jpeg(&bytes).unwrap().dimensions(), (16, 16));
        assert!(!path.with_extension("jpg.tmp").exists());
    }
}
