//! probed - probe camera streaming daemon
//!
//! This daemon:
//! 1. Connects to the configured MJPEG stream (HTTP or `stub://`)
//! 2. Streams frames on a background worker into a JPEG snapshot file
//! 3. Optionally tracks a region, either grabbed live from the stream or
//!    modelled from a reference JPEG, and logs each tracking report
//! 4. Logs stream health every few seconds
//! 5. Stops the worker and disconnects on Ctrl-C

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use probe_vision::config::ProbeConfig;
use probe_vision::frame::crop_region;
use probe_vision::ui::{Console, ConsoleMode};
use probe_vision::{
    CompletionSignal, Rect, RegionTracker, SnapshotSink, StreamWorker, TrackingReport,
    WorkerStats,
};

const HEALTH_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Stream URL (overrides PROBE_STREAM_URL and the config file).
    #[arg(long)]
    url: Option<String>,
    /// Region to track, as x,y,width,height in frame pixels.
    #[arg(long)]
    track_roi: Option<Rect>,
    /// Reference JPEG for the tracking model (default: crop of a live frame).
    #[arg(long, requires = "track_roi")]
    model: Option<PathBuf>,
    /// Snapshot file for displayed frames (overrides PROBE_SNAPSHOT_PATH).
    #[arg(long)]
    snapshot: Option<PathBuf>,
    /// Minimum time between snapshot writes.
    #[arg(long, default_value_t = 500)]
    snapshot_interval_ms: u64,
    /// Console output style.
    #[arg(long, value_enum, default_value_t = ConsoleMode::Auto)]
    ui: ConsoleMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = ProbeConfig::load()?;
    if let Some(url) = &args.url {
        cfg.stream.url = url.clone();
    }
    if let Some(path) = &args.snapshot {
        cfg.snapshot_path = path.clone();
    }
    let console = Console::detect(args.ui);

    let sink = SnapshotSink::new(
        cfg.snapshot_path.clone(),
        Duration::from_millis(args.snapshot_interval_ms),
    );
    log::info!("displayed frames go to {}", sink.path().display());
    let mut worker = StreamWorker::new(
        cfg.stream.url.clone(),
        cfg.receiver_config(),
        Box::new(sink),
    );
    worker.set_tracking_callback(Box::new(report_tracking))?;

    console
        .stage(&format!("connect {}", cfg.stream.url))
        .conclude(worker.make_connection(), "unreachable")?;
    worker.start()?;

    if let Some(roi) = args.track_roi {
        let stage = console.stage("build tracking model");
        let tracker = build_tracker(&cfg, &mut worker, args.model.as_deref(), roi);
        let outcome = tracker.and_then(|tracker| worker.change_to_tracking_mode(tracker));
        stage.conclude(outcome, "no tracking model")?;
        log::info!("tracking region {}", roi);
    }

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!("probed streaming; press Ctrl-C to stop");
    let stats = worker.stats();
    loop {
        match rx.recv_timeout(HEALTH_INTERVAL) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                log::info!("shutdown signal received, stopping stream...");
                break;
            }
            Err(RecvTimeoutError::Timeout) => {
                log_health(&worker, &stats);
                if !worker.is_streaming() {
                    log::warn!("stream loop is no longer running");
                    break;
                }
            }
        }
    }

    let outcome = worker.disconnect();
    log_health(&worker, &stats);
    outcome
}

/// Tracker modelled on `model` if given, else on `roi` cut from a live frame.
fn build_tracker(
    cfg: &ProbeConfig,
    worker: &mut StreamWorker,
    model: Option<&Path>,
    roi: Rect,
) -> Result<RegionTracker> {
    let mut tracker = cfg.build_tracker();
    let params = cfg.histogram_params();
    match model {
        Some(path) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("read reference image {}", path.display()))?;
            tracker.set_model_from_jpeg(&bytes, &params)?;
        }
        None => {
            let frame = worker.capture_one_frame()?;
            let patch = crop_region(&frame, roi)?;
            tracker.set_model(&patch, &params);
        }
    }
    tracker.set_initial_window_rect(roi);
    Ok(tracker)
}

fn report_tracking(report: TrackingReport, done: CompletionSignal) {
    if report.target_present {
        log::info!(
            "target at ({}, {}) window {} confidence {:.1}",
            report.center_x,
            report.center_y,
            report.window,
            report.confidence
        );
    } else {
        log::warn!(
            "target lost near ({}, {}) confidence {:.1}",
            report.center_x,
            report.center_y,
            report.confidence
        );
    }
    done.signal();
}

fn log_health(worker: &StreamWorker, stats: &WorkerStats) {
    log::info!(
        "stream {}: {} frames received ({} bytes), {} displayed, {} tracked, {} skipped, mode {:?}",
        worker.url(),
        stats.frames_received(),
        stats.bytes_read(),
        stats.frames_displayed(),
        stats.frames_tracked(),
        stats.frames_skipped(),
        worker.mode()
    );
}
