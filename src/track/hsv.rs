//! 8-bit HSV colour space.
//!
//! Matches the usual 8-bit camera-vision convention: hue is halved to fit a
//! byte (`[0, 180)`), saturation and value span `[0, 255]`.

use image::RgbImage;

/// Channel index of hue.
pub const HUE: usize = 0;
/// Channel index of saturation.
pub const SATURATION: usize = 1;
/// Channel index of value.
pub const VALUE: usize = 2;

/// Convert one RGB pixel to 8-bit HSV.
pub fn rgb_to_hsv([r, g, b]: [u8; 3]) -> [u8; 3] {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let v = max;
    if max == 0 {
        return [0, 0, 0];
    }
    let diff = (max - min) as f32;
    let s = (diff * 255.0 / max as f32).round() as u8;
    if diff == 0.0 {
        return [0, s, v];
    }

    let (r, g, b) = (r as f32, g as f32, b as f32);
    let mut h = if max as f32 == r {
        (g - b) * 60.0 / diff
    } else if max as f32 == g {
        120.0 + (b - r) * 60.0 / diff
    } else {
        240.0 + (r - g) * 60.0 / diff
    };
    if h < 0.0 {
        h += 360.0;
    }
    let h = (h / 2.0).round() as u16 % 180;
    [h as u8, s, v]
}

/// A frame converted to HSV, stored pixel-interleaved.
#[derive(Clone, Debug)]
pub struct HsvImage {
    width: u32,
    height: u32,
    pixels: Vec<[u8; 3]>,
}

impl HsvImage {
    pub fn from_rgb(image: &RgbImage) -> Self {
        let pixels = image.pixels().map(|p| rgb_to_hsv(p.0)).collect();
        Self {
            width: image.width(),
            height: image.height(),
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.pixels[(y * self.width + x) as usize]
    }

    /// Pixels in row-major order.
    pub fn pixels(&self) -> &[[u8; 3]] {
        &self.pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn primaries_map_to_expected_hues() {
        assert_eq!(rgb_to_hsv([255, 0, 0]), [0, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 255, 0]), [60, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 0, 255]), [120, 255, 255]);
    }

    #[test]
    fn greys_have_no_saturation() {
        assert_eq!(rgb_to_hsv([0, 0, 0]), [0, 0, 0]);
        assert_eq!(rgb_to_hsv([128, 128, 128]), [0, 0, 128]);
    }

    #[test]
    fn hue_wraps_below_180() {
        // Magenta-red sits just under 360 degrees.
        let [h, _, _] = rgb_to_hsv([255, 0, 1]);
        assert!(h < 180);
    }

    #[test]
    fn converts_whole_image() {
        let image = RgbImage::from_fn(3, 2, |x, _| {
            if x == 0 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            }
        });
        let hsv = HsvImage::from_rgb(&image);
        assert_eq!((hsv.width(), hsv.height()), (3, 2));
        assert_eq!(hsv.pixel(0, 1)[HUE], 0);
        assert_eq!(hsv.pixel(2, 1)[HUE], 120);
        assert_eq!(hsv.pixel(2, 1)[SATURATION], 255);
        assert_eq!(hsv.pixel(2, 1)[VALUE], 255);
    }
}
