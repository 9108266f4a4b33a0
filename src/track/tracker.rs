//! Region tracker.
//!
//! `RegionTracker` relocates a previously selected region from frame to frame
//! using colour-histogram similarity:
//! 1. convert the frame to HSV
//! 2. back-project it against the model histogram
//! 3. mean-shift the tracking window over the back-projection
//! 4. annotate a copy of the frame and measure how strongly the window
//!    still matches the model
//!
//! The tracker is an owned value. The streaming worker holds it while a
//! session runs and hands it back on stop.
//!
//! MUST NOT:
//! - track before both a model and an initial window are set
//! - expose back-projection buffers outside the tracker

use anyhow::Result;
use image::{GrayImage, Rgb, RgbImage};

use super::histogram::{Histogram, HistogramParams};
use super::hsv::HsvImage;
use super::mean_shift::{mean_shift, TermCriteria};
use crate::frame::{decode_jpeg, draw_window, WINDOW_OUTLINE_THICKNESS};
use crate::Rect;

/// Outline colour of the tracking window on annotated frames.
pub const DEFAULT_OUTLINE: Rgb<u8> = Rgb([255, 0, 0]);

/// Where a tracker is in its session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackerState {
    /// Neither model nor window set.
    Empty,
    /// Model set, waiting for a window.
    ModelSet,
    /// Window set, waiting for a model.
    WindowSet,
    /// Both set, not yet tracked.
    Ready,
    /// At least one frame tracked in this session.
    Tracking,
}

/// Thresholds deciding whether the tracked window still holds the target.
///
/// Both are applied to back-projection values (0..=255) inside the window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PresenceCheck {
    pub min_mean: f64,
    pub min_spread: f64,
}

impl PresenceCheck {
    pub fn is_present(&self, mean: f64, spread: f64) -> bool {
        mean >= self.min_mean || spread >= self.min_spread
    }
}

impl Default for PresenceCheck {
    fn default() -> Self {
        Self {
            min_mean: 32.0,
            min_spread: 24.0,
        }
    }
}

/// One tracked frame.
#[derive(Clone, Debug)]
pub struct TrackingResult {
    /// Copy of the input frame with the window drawn on it.
    pub frame: RgbImage,
    pub window: Rect,
    pub center: (i32, i32),
    /// Mean-shift steps taken for this frame.
    pub iterations: u32,
    /// Mean back-projection value inside the window.
    pub mean: f64,
    /// Standard deviation of back-projection values inside the window.
    pub spread: f64,
    pub target_present: bool,
}

pub struct RegionTracker {
    model: Option<Histogram>,
    window: Option<Rect>,
    back_projection: Option<GrayImage>,
    tracking: bool,
    criteria: TermCriteria,
    presence: PresenceCheck,
    outline: Rgb<u8>,
}

impl RegionTracker {
    pub fn new(criteria: TermCriteria, presence: PresenceCheck) -> Self {
        Self {
            model: None,
            window: None,
            back_projection: None,
            tracking: false,
            criteria,
            presence,
            outline: DEFAULT_OUTLINE,
        }
    }

    /// Build the target model from a reference patch.
    ///
    /// # Panics
    ///
    /// Panics on an empty reference image or inconsistent `params`.
    pub fn set_model(&mut self, reference: &RgbImage, params: &HistogramParams) {
        assert!(
            reference.width() > 0 && reference.height() > 0,
            "set_model needs a non-empty reference image"
        );
        let hsv = HsvImage::from_rgb(reference);
        let mut histogram = Histogram::compute(&hsv, params);
        let (lo, hi) = params.normalize_to;
        histogram.normalize_min_max(lo, hi);
        log::debug!(
            "RegionTracker: model set from {}x{} patch ({:?} bins)",
            reference.width(),
            reference.height(),
            params.bins
        );
        self.model = Some(histogram);
        self.tracking = false;
    }

    /// Decode a JPEG reference patch and build the model from it.
    pub fn set_model_from_jpeg(&mut self, bytes: &[u8], params: &HistogramParams) -> Result<()> {
        let reference = decode_jpeg(bytes)?;
        self.set_model(&reference, params);
        Ok(())
    }

    /// Store the starting search rectangle.
    ///
    /// # Panics
    ///
    /// Panics unless width and height are positive.
    pub fn set_initial_window(&mut self, x: i32, y: i32, width: i32, height: i32) {
        assert!(
            width > 0 && height > 0,
            "initial window must have positive size, got {}x{}",
            width,
            height
        );
        self.window = Some(Rect::new(x, y, width, height));
        self.tracking = false;
    }

    pub fn set_initial_window_rect(&mut self, window: Rect) {
        self.set_initial_window(window.x, window.y, window.width, window.height);
    }

    pub fn is_ready(&self) -> bool {
        self.model.is_some() && self.window.is_some()
    }

    pub fn state(&self) -> TrackerState {
        match (self.model.is_some(), self.window.is_some(), self.tracking) {
            (false, false, _) => TrackerState::Empty,
            (true, false, _) => TrackerState::ModelSet,
            (false, true, _) => TrackerState::WindowSet,
            (true, true, false) => TrackerState::Ready,
            (true, true, true) => TrackerState::Tracking,
        }
    }

    /// Current tracking window, if set.
    pub fn window(&self) -> Option<Rect> {
        self.window
    }

    pub fn criteria(&self) -> TermCriteria {
        self.criteria
    }

    pub fn max_iterations(&self) -> u32 {
        self.criteria.max_iterations
    }

    pub fn set_max_iterations(&mut self, max_iterations: u32) {
        self.criteria.max_iterations = max_iterations;
    }

    pub fn epsilon(&self) -> f64 {
        self.criteria.epsilon
    }

    pub fn set_epsilon(&mut self, epsilon: f64) {
        self.criteria.epsilon = epsilon;
    }

    pub fn presence_check(&self) -> PresenceCheck {
        self.presence
    }

    pub fn set_presence_check(&mut self, presence: PresenceCheck) {
        self.presence = presence;
    }

    pub fn set_outline_color(&mut self, color: Rgb<u8>) {
        self.outline = color;
    }

    /// Relocate the region in `frame`.
    ///
    /// The stored window moves to the result. An `Err` (window entirely
    /// outside the frame) leaves the tracker as it was.
    ///
    /// # Panics
    ///
    /// Panics unless both a model and an initial window are set.
    pub fn track(&mut self, frame: &RgbImage) -> Result<TrackingResult> {
        assert!(
            self.is_ready(),
            "track called before model and initial window were set (state {:?})",
            self.state()
        );
        let (Some(model), Some(window)) = (self.model.as_ref(), self.window) else {
            unreachable!("readiness asserted above");
        };

        let hsv = HsvImage::from_rgb(frame);
        let back_projection = model.back_project(&hsv);
        let outcome = mean_shift(&back_projection, window, self.criteria)?;
        let (mean, spread) = window_stats(&back_projection, outcome.window);
        let target_present = self.presence.is_present(mean, spread);

        let mut annotated = frame.clone();
        draw_window(
            &mut annotated,
            outcome.window,
            self.outline,
            WINDOW_OUTLINE_THICKNESS,
        );

        log::debug!(
            "RegionTracker: {} -> {} in {} steps (mean {:.1}, spread {:.1}, present {})",
            window,
            outcome.window,
            outcome.iterations,
            mean,
            spread,
            target_present
        );

        self.window = Some(outcome.window);
        self.back_projection = Some(back_projection);
        self.tracking = true;

        Ok(TrackingResult {
            frame: annotated,
            window: outcome.window,
            center: outcome.window.center(),
            iterations: outcome.iterations,
            mean,
            spread,
            target_present,
        })
    }

    /// Decode a JPEG frame and track it.
    pub fn track_jpeg(&mut self, bytes: &[u8]) -> Result<TrackingResult> {
        let frame = decode_jpeg(bytes)?;
        self.track(&frame)
    }

    /// Drop the model, window and back-projection so a new session can start.
    pub fn reset(&mut self) {
        self.model = None;
        self.window = None;
        self.back_projection = None;
        self.tracking = false;
    }
}

impl Default for RegionTracker {
    fn default() -> Self {
        Self::new(TermCriteria::default(), PresenceCheck::default())
    }
}

/// Mean and population standard deviation of `map` inside `window`.
fn window_stats(map: &GrayImage, window: Rect) -> (f64, f64) {
    let bounds = Rect::new(0, 0, map.width() as i32, map.height() as i32);
    let area = window.intersect(&bounds);
    let n = area.area();
    if n == 0 {
        return (0.0, 0.0);
    }
    let (mut sum, mut sum_sq) = (0u64, 0u64);
    for y in area.y..area.bottom() {
        for x in area.x..area.right() {
            let v = map.get_pixel(x as u32, y as u32).0[0] as u64;
            sum += v;
            sum_sq += v * v;
        }
    }
    let n = n as f64;
    let mean = sum as f64 / n;
    let variance = (sum_sq as f64 / n - mean * mean).max(0.0);
    (mean, variance.sqrt())
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
