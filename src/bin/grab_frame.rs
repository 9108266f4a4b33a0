//! grab_frame - save one still from a live probe stream
//!
//! Connects, starts streaming, grabs one frame through the worker's
//! stop/capture/restart path, optionally crops a region of interest, and
//! writes the result as JPEG.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use probe_vision::config::ProbeConfig;
use probe_vision::frame::{crop_region, save_jpeg};
use probe_vision::ui::{Console, ConsoleMode};
use probe_vision::{NullSink, Rect, StreamWorker};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Stream URL (overrides PROBE_STREAM_URL and the config file).
    #[arg(long)]
    url: Option<String>,
    /// Output JPEG path.
    #[arg(long, default_value = "probe_still.jpg")]
    out: PathBuf,
    /// Crop to x,y,width,height before saving.
    #[arg(long)]
    roi: Option<Rect>,
    /// JPEG quality (1-100).
    #[arg(long, default_value_t = 90)]
    quality: u8,
    /// Console output style.
    #[arg(long, value_enum, default_value_t = ConsoleMode::Auto)]
    ui: ConsoleMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = ProbeConfig::load()?;
    if let Some(url) = args.url {
        cfg.stream.url = url;
    }
    let console = Console::detect(args.ui);

    let mut worker = StreamWorker::new(
        cfg.stream.url.clone(),
        cfg.receiver_config(),
        Box::new(NullSink),
    );
    console
        .stage(&format!("connect {}", cfg.stream.url))
        .conclude(worker.make_connection(), "unreachable")?;
    worker.start()?;

    let frame = console
        .stage("grab frame")
        .conclude(worker.capture_one_frame(), "no frame")?;
    let still = match args.roi {
        Some(roi) => crop_region(&frame, roi)?,
        None => frame,
    };
    save_jpeg(&still, &args.out, args.quality)?;
    log::info!(
        "saved {}x{} still to {}",
        still.width(),
        still.height(),
        args.out.display()
    );

    worker.disconnect()
}
