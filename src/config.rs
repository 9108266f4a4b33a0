use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::{ReceiverConfig, DEFAULT_CHUNK_SIZE, FRAME_BUFFER_CAPACITY, RAW_BUFFER_CAPACITY};
use crate::track::{HistogramParams, PresenceCheck, RegionTracker, TermCriteria};

const DEFAULT_STREAM_URL: &str = "stub://probe_camera";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_READ_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_ITERATIONS: u32 = 10;
const DEFAULT_EPSILON: f64 = 1.0;
const DEFAULT_HUE_BINS: usize = 30;
const DEFAULT_SATURATION_BINS: usize = 32;
const DEFAULT_MIN_MEAN: f64 = 32.0;
const DEFAULT_MIN_SPREAD: f64 = 24.0;
const DEFAULT_SNAPSHOT_PATH: &str = "probe_latest.jpg";

const SUPPORTED_SCHEMES: [&str; 3] = ["http", "https", "stub"];

#[derive(Debug, Deserialize, Default)]
struct ProbeConfigFile {
    stream: Option<StreamConfigFile>,
    tracker: Option<TrackerConfigFile>,
    output: Option<OutputConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    url: Option<String>,
    chunk_size: Option<usize>,
    raw_capacity: Option<usize>,
    frame_capacity: Option<usize>,
    connect_timeout_secs: Option<u64>,
    read_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct TrackerConfigFile {
    max_iterations: Option<u32>,
    epsilon: Option<f64>,
    hue_bins: Option<usize>,
    saturation_bins: Option<usize>,
    min_mean: Option<f64>,
    min_spread: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputConfigFile {
    snapshot_path: Option<PathBuf>,
}

/// Settings for the probe binaries: file (`PROBE_CONFIG`, JSON) plus
/// environment overrides.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub stream: StreamSettings,
    pub tracker: TrackerSettings,
    pub snapshot_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub url: String,
    pub chunk_size: usize,
    pub raw_capacity: usize,
    pub frame_capacity: usize,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub max_iterations: u32,
    pub epsilon: f64,
    pub hue_bins: usize,
    pub saturation_bins: usize,
    pub min_mean: f64,
    pub min_spread: f64,
}

impl ProbeConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PROBE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ProbeConfigFile) -> Self {
        let stream = file.stream.unwrap_or_default();
        let tracker = file.tracker.unwrap_or_default();
        let output = file.output.unwrap_or_default();
        Self {
            stream: StreamSettings {
                url: stream.url.unwrap_or_else(|| DEFAULT_STREAM_URL.to_string()),
                chunk_size: stream.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
                raw_capacity: stream.raw_capacity.unwrap_or(RAW_BUFFER_CAPACITY),
                frame_capacity: stream.frame_capacity.unwrap_or(FRAME_BUFFER_CAPACITY),
                connect_timeout: Duration::from_secs(
                    stream
                        .connect_timeout_secs
                        .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
                ),
                read_timeout: Duration::from_secs(
                    stream.read_timeout_secs.unwrap_or(DEFAULT_READ_TIMEOUT_SECS),
                ),
            },
            tracker: TrackerSettings {
                max_iterations: tracker.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS),
                epsilon: tracker.epsilon.unwrap_or(DEFAULT_EPSILON),
                hue_bins: tracker.hue_bins.unwrap_or(DEFAULT_HUE_BINS),
                saturation_bins: tracker.saturation_bins.unwrap_or(DEFAULT_SATURATION_BINS),
                min_mean: tracker.min_mean.unwrap_or(DEFAULT_MIN_MEAN),
                min_spread: tracker.min_spread.unwrap_or(DEFAULT_MIN_SPREAD),
            },
            snapshot_path: output
                .snapshot_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_PATH)),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("PROBE_STREAM_URL") {
            if !url.trim().is_empty() {
                self.stream.url = url.trim().to_string();
            }
        }
        if let Ok(chunk) = std::env::var("PROBE_CHUNK_SIZE") {
            self.stream.chunk_size = chunk
                .trim()
                .parse()
                .map_err(|_| anyhow!("PROBE_CHUNK_SIZE must be an integer number of bytes"))?;
        }
        if let Ok(iterations) = std::env::var("PROBE_TRACK_MAX_ITER") {
            self.tracker.max_iterations = iterations
                .trim()
                .parse()
                .map_err(|_| anyhow!("PROBE_TRACK_MAX_ITER must be a positive integer"))?;
        }
        if let Ok(epsilon) = std::env::var("PROBE_TRACK_EPSILON") {
            self.tracker.epsilon = epsilon
                .trim()
                .parse()
                .map_err(|_| anyhow!("PROBE_TRACK_EPSILON must be a number"))?;
        }
        if let Ok(path) = std::env::var("PROBE_SNAPSHOT_PATH") {
            if !path.trim().is_empty() {
                self.snapshot_path = PathBuf::from(path);
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        validate_stream_url(&self.stream.url)?;
        if self.stream.chunk_size == 0 {
            return Err(anyhow!("stream chunk size must be greater than zero"));
        }
        if self.tracker.max_iterations == 0 {
            return Err(anyhow!("tracker max_iterations must be greater than zero"));
        }
        if !(self.tracker.epsilon >= 0.0) {
            return Err(anyhow!("tracker epsilon must be zero or positive"));
        }
        for (name, bins) in [
            ("hue_bins", self.tracker.hue_bins),
            ("saturation_bins", self.tracker.saturation_bins),
        ] {
            if !(1..=256).contains(&bins) {
                return Err(anyhow!("tracker {} must be between 1 and 256, got {}", name, bins));
            }
        }
        Ok(())
    }

    pub fn receiver_config(&self) -> ReceiverConfig {
        ReceiverConfig {
            chunk_size: self.stream.chunk_size,
            raw_capacity: self.stream.raw_capacity,
            frame_capacity: self.stream.frame_capacity,
            connect_timeout: self.stream.connect_timeout,
            read_timeout: self.stream.read_timeout,
            ..ReceiverConfig::default()
        }
    }

    pub fn histogram_params(&self) -> HistogramParams {
        HistogramParams::hue_saturation(self.tracker.hue_bins, self.tracker.saturation_bins)
    }

    /// Empty tracker with the configured stopping rule and presence thresholds.
    pub fn build_tracker(&self) -> RegionTracker {
        RegionTracker::new(
            TermCriteria {
                max_iterations: self.tracker.max_iterations,
                epsilon: self.tracker.epsilon,
            },
            PresenceCheck {
                min_mean: self.tracker.min_mean,
                min_spread: self.tracker.min_spread,
            },
        )
    }
}

fn validate_stream_url(raw: &str) -> Result<()> {
    let url = url::Url::parse(raw).map_err(|e| anyhow!("invalid stream url '{}': {}", raw, e))?;
    if !SUPPORTED_SCHEMES.contains(&url.scheme()) {
        return Err(anyhow!(
            "stream url '{}' must use one of {:?}",
            raw,
            SUPPORTED_SCHEMES
        ));
    }
    Ok(())
}

fn read_config_file(path: &Path) -> Result<ProbeConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
