//! Probe Vision
//!
//! Real-time camera pipeline for a remotely steered probe: an MJPEG-over-HTTP
//! byte stream is cut into JPEG frames, decoded, and either shown as-is or run
//! through a colour-histogram region tracker whose result is handed to an
//! aiming controller one frame at a time.
//!
//! # Architecture
//!
//! ```text
//! network bytes -> GrowableBuffer (raw) -> SOI/EOI scan -> GrowableBuffer (frame)
//!     -> decode -> FrameSink                               (normal mode)
//!     -> decode -> RegionTracker -> FrameSink + callback   (tracking mode)
//! ```
//!
//! # Module Structure
//!
//! - `buffer`: append-only byte buffer with pattern search
//! - `ingest`: stream opening (`http(s)://`, `stub://`) and frame demultiplexing
//! - `frame`: JPEG codec boundary, window annotation, ROI crop
//! - `track`: HSV histogram model, back-projection, mean-shift, `RegionTracker`
//! - `worker`: background streaming loop with pause/resume and tracking hand-off
//! - `sink`: frame sinks (latest-frame slot, JPEG snapshot file)
//! - `config`: file + environment configuration for the binaries
//! - `ui`: CLI stage reporting

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod buffer;
pub mod config;
pub mod frame;
pub mod ingest;
pub mod sink;
pub mod track;
pub mod ui;
pub mod worker;

pub use buffer::GrowableBuffer;
pub use ingest::{
    open_stream, ReceiverConfig, ReceiverStats, StreamReceiver, StubConfig, SyntheticMjpegStream,
};
pub use sink::{FrameSink, LatestFrameSink, LatestFrameSlot, NullSink, SnapshotSink};
pub use track::{
    HistogramParams, PresenceCheck, RegionTracker, TermCriteria, TrackerState, TrackingResult,
};
pub use worker::{
    CompletionSignal, StreamWorker, StreamingMode, TrackingCallback, TrackingReport, WorkerStats,
};

// -------------------- Windows --------------------

/// Axis-aligned pixel rectangle: origin at the top-left corner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// One past the right-most column, saturating at `i32::MAX`.
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    /// One past the bottom row, saturating at `i32::MAX`.
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.width as i64 * self.height as i64
        }
    }

    /// Integer centre, rounded toward the origin.
    pub fn center(&self) -> (i32, i32) {
        (
            self.x.saturating_add(self.width / 2),
            self.y.saturating_add(self.height / 2),
        )
    }

    /// Shrink by `amount` on every side. Collapses to zero size when too small.
    pub fn inset(&self, amount: i32) -> Rect {
        let twice = amount.saturating_mul(2);
        Rect::new(
            self.x.saturating_add(amount),
            self.y.saturating_add(amount),
            self.width.saturating_sub(twice).max(0),
            self.height.saturating_sub(twice).max(0),
        )
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Overlap of two rectangles. Empty overlaps come back with zero size.
    pub fn intersect(&self, other: &Rect) -> Rect {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= x || bottom <= y {
            return Rect::new(x, y, 0, 0);
        }
        Rect::new(x, y, right - x, bottom - y)
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{} {}x{}", self.x, self.y, self.width, self.height)
    }
}

/// Parses `x,y,width,height`.
impl FromStr for Rect {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(anyhow!("rect must be 'x,y,width,height', got '{}'", s));
        }
        let mut values = [0i32; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| anyhow!("rect component '{}' is not an integer", part))?;
        }
        let rect = Rect::new(values[0], values[1], values[2], values[3]);
        if rect.is_empty() {
            return Err(anyhow!("rect '{}' must have positive width and height", s));
        }
        Ok(rect)
    }
}
