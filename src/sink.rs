//! Frame sinks.
//!
//! The streaming worker pushes every displayed frame (raw in normal mode,
//! annotated in tracking mode) into a `FrameSink`. Rendering surfaces live
//! outside this crate; the sinks here cover what the binaries and tests need.

use anyhow::{anyhow, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::frame::save_jpeg;

/// Receives displayed frames from the worker loop.
pub trait FrameSink: Send {
    fn present(&mut self, frame: &RgbImage) -> Result<()>;
}

/// Discards frames.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl FrameSink for NullSink {
    fn present(&mut self, _frame: &RgbImage) -> Result<()> {
        Ok(())
    }
}

/// Read side of a `LatestFrameSink`: the last published frame.
#[derive(Clone, Default)]
pub struct LatestFrameSlot {
    inner: Arc<Mutex<Option<RgbImage>>>,
}

impl LatestFrameSlot {
    /// Clone of the last published frame, if any.
    pub fn latest(&self) -> Result<Option<RgbImage>> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| anyhow!("latest frame lock poisoned"))?;
        Ok(guard.clone())
    }

    /// Remove and return the last published frame.
    pub fn take(&self) -> Result<Option<RgbImage>> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| anyhow!("latest frame lock poisoned"))?;
        Ok(guard.take())
    }
}

/// Keeps only the most recent frame, for a UI thread to pick up.
#[derive(Clone, Default)]
pub struct LatestFrameSink {
    slot: LatestFrameSlot,
    presented: u64,
}

impl LatestFrameSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self) -> LatestFrameSlot {
        self.slot.clone()
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }
}

impl FrameSink for LatestFrameSink {
    fn present(&mut self, frame: &RgbImage) -> Result<()> {
        let mut guard = self
            .slot
            .inner
            .lock()
            .map_err(|_| anyhow!("latest frame lock poisoned"))?;
        *guard = Some(frame.clone());
        self.presented += 1;
        Ok(())
    }
}

/// Writes displayed frames to one JPEG file, at most once per `min_interval`.
pub struct SnapshotSink {
    path: PathBuf,
    quality: u8,
    min_interval: Duration,
    last_write: Option<Instant>,
    written: u64,
}

impl SnapshotSink {
    pub fn new(path: impl Into<PathBuf>, min_interval: Duration) -> Self {
        Self {
            path: path.into(),
            quality: 85,
            min_interval,
            last_write: None,
            written: 0,
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl FrameSink for SnapshotSink {
    fn present(&mut self, frame: &RgbImage) -> Result<()> {
        if let Some(last) = self.last_write {
            if last.elapsed() < self.min_interval {
                return Ok(());
            }
        }
        save_jpeg(frame, &self.path, self.quality)?;
        self.last_write = Some(Instant::now());
        self.written += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn latest_sink_keeps_most_recent_frame() {
        let mut sink = LatestFrameSink::new();
        let slot = sink.slot();
        assert!(slot.latest().unwrap().is_none());
        sink.present(&RgbImage::from_pixel(2, 2, Rgb([1, 1, 1])))
            .unwrap();
        sink.present(&RgbImage::from_pixel(3, 3, Rgb([2, 2, 2])))
            .unwrap();
        assert_eq!(slot.latest().unwrap().unwrap().dimensions(), (3, 3));
        assert_eq!(sink.presented(), 2);
        assert!(slot.take().unwrap().is_some());
        assert!(slot.latest().unwrap().is_none());
    }

    #[test]
    fn snapshot_sink_rate_limits_writes() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = SnapshotSink::new(dir.path().join("latest.jpg"), Duration::from_secs(60));
        let frame = RgbImage::from_pixel(8, 8, Rgb([0, 128, 0]));
        sink.present(&frame).unwrap();
        sink.present(&frame).unwrap();
        assert_eq!(sink.written(), 1);
        assert!(sink.path().exists());
    }
}
