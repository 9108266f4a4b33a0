//! Colour-histogram region tracking.
//!
//! - `hsv`: 8-bit HSV conversion
//! - `histogram`: model histogram and back-projection
//! - `mean_shift`: window search over a back-projection
//! - `tracker`: `RegionTracker`, the per-session tracking state machine

pub mod histogram;
pub mod hsv;
pub mod mean_shift;
pub mod tracker;

pub use histogram::{Histogram, HistogramParams};
pub use hsv::{rgb_to_hsv, HsvImage};
pub use mean_shift::{mean_shift, MeanShiftOutcome, TermCriteria};
pub use tracker::{PresenceCheck, RegionTracker, TrackerState, TrackingResult, DEFAULT_OUTLINE};
