//! Colour histograms and back-projection.
//!
//! A `Histogram` is a dense N-dimensional (N ≤ 3) histogram over selected
//! channels of an `HsvImage`, with uniform bins over a half-open range per
//! channel. Values outside a channel's range are not counted.

use image::{GrayImage, Luma};

use super::hsv::{HsvImage, HUE, SATURATION};

/// How a model histogram is built.
#[derive(Clone, Debug, PartialEq)]
pub struct HistogramParams {
    /// HSV channel indices to histogram (each in `0..3`).
    pub channels: Vec<usize>,
    /// Bin count per channel, same length as `channels`.
    pub bins: Vec<usize>,
    /// Half-open value range per channel, same length as `channels`.
    pub ranges: Vec<(f32, f32)>,
    /// Target range of min-max normalization.
    pub normalize_to: (f32, f32),
}

impl HistogramParams {
    /// Hue/saturation histogram over the full 8-bit ranges.
    pub fn hue_saturation(hue_bins: usize, saturation_bins: usize) -> Self {
        Self {
            channels: vec![HUE, SATURATION],
            bins: vec![hue_bins, saturation_bins],
            ranges: vec![(0.0, 180.0), (0.0, 256.0)],
            normalize_to: (0.0, 255.0),
        }
    }

    /// Panics when the parameter lists disagree with each other.
    pub fn validate(&self) {
        assert!(
            !self.channels.is_empty() && self.channels.len() <= 3,
            "histogram needs 1 to 3 channels, got {}",
            self.channels.len()
        );
        assert_eq!(
            self.bins.len(),
            self.channels.len(),
            "histogram bin list must match channel list"
        );
        assert_eq!(
            self.ranges.len(),
            self.channels.len(),
            "histogram range list must match channel list"
        );
        assert!(
            self.channels.iter().all(|&c| c < 3),
            "histogram channel index out of range: {:?}",
            self.channels
        );
        assert!(
            self.bins.iter().all(|&b| b > 0),
            "histogram bin counts must be positive"
        );
        assert!(
            self.ranges.iter().all(|(lo, hi)| lo < hi),
            "histogram ranges must be non-empty"
        );
        assert!(
            self.normalize_to.0 <= self.normalize_to.1,
            "normalization range is inverted"
        );
    }
}

impl Default for HistogramParams {
    fn default() -> Self {
        Self::hue_saturation(30, 32)
    }
}

#[derive(Clone, Debug)]
pub struct Histogram {
    channels: Vec<usize>,
    bins: Vec<usize>,
    ranges: Vec<(f32, f32)>,
    /// Row-major bin values; the last channel varies fastest.
    values: Vec<f32>,
}

impl Histogram {
    /// Count the pixels of `image` into bins described by `params`.
    ///
    /// Normalization is not applied here; see [`Histogram::normalize_min_max`].
    pub fn compute(image: &HsvImage, params: &HistogramParams) -> Self {
        params.validate();
        let total: usize = params.bins.iter().product();
        let mut histogram = Self {
            channels: params.channels.clone(),
            bins: params.bins.clone(),
            ranges: params.ranges.clone(),
            values: vec![0.0; total],
        };
        for pixel in image.pixels() {
            if let Some(index) = histogram.bin_index(*pixel) {
                histogram.values[index] += 1.0;
            }
        }
        histogram
    }

    /// Linearly rescale bin values so min maps to `lo` and max maps to `hi`.
    ///
    /// A flat histogram maps every bin to `lo`.
    pub fn normalize_min_max(&mut self, lo: f32, hi: f32) {
        let (min, max) = self
            .values
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), &v| {
                (min.min(v), max.max(v))
            });
        let span = max - min;
        let scale = if span > f32::EPSILON {
            (hi - lo) / span
        } else {
            0.0
        };
        for value in &mut self.values {
            *value = lo + (*value - min) * scale;
        }
    }

    /// Flat bin index of an HSV pixel, or `None` when a channel is out of range.
    pub fn bin_index(&self, pixel: [u8; 3]) -> Option<usize> {
        let mut index = 0usize;
        for ((&channel, &bins), &(lo, hi)) in
            self.channels.iter().zip(&self.bins).zip(&self.ranges)
        {
            let value = pixel[channel] as f32;
            if value < lo || value >= hi {
                return None;
            }
            let bin = (((value - lo) * bins as f32 / (hi - lo)) as usize).min(bins - 1);
            index = index * bins + bin;
        }
        Some(index)
    }

    /// Histogram value for the bin `pixel` falls in (0 when out of range).
    pub fn lookup(&self, pixel: [u8; 3]) -> f32 {
        self.bin_index(pixel).map_or(0.0, |i| self.values[i])
    }

    /// Replace every pixel by the value of its bin, saturated to `u8`.
    pub fn back_project(&self, image: &HsvImage) -> GrayImage {
        GrayImage::from_fn(image.width(), image.height(), |x, y| {
            let value = self.lookup(image.pixel(x, y));
            Luma([value.round().clamp(0.0, 255.0) as u8])
        })
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn channels(&self) -> &[usize] {
        &self.channels
    }

    pub fn bins(&self) -> &[usize] {
        &self.bins
    }
}
