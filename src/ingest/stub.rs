//! Synthetic MJPEG source (`stub://`).
//!
//! Produces a `multipart/x-mixed-replace`-style byte stream the way an IP
//! camera would: boundary line, part headers, JPEG bytes, CRLF. The scene is a
//! noisy low-saturation background with one saturated square that bounces
//! across the frame, so the tracker has something to follow.
//!
//! URL parameters: `stub://<name>?width=W&height=H&frames=N&seed=S&size=T&fps=F`.
//! With `frames` set the stream ends (reads return 0) after N frames. Frames
//! are paced at `fps` (default 15); `fps=0` emits them as fast as they render.

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::{self, Read};
use std::time::{Duration, Instant};
use url::Url;

use crate::frame::encode_jpeg;
use crate::Rect;

const BOUNDARY: &str = "probeframe";
const BACKGROUND_LEVEL: i16 = 110;
const BACKGROUND_NOISE: i16 = 12;
/// Colour of the moving target.
pub const TARGET_COLOR: Rgb<u8> = Rgb([220, 30, 30]);

/// Scene parameters for a synthetic stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StubConfig {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Stop after this many frames. `None` streams forever.
    pub frames: Option<u64>,
    pub seed: u64,
    /// Edge length of the square target in pixels.
    pub target_size: u32,
    pub quality: u8,
    /// Frames per second; 0 disables pacing.
    pub fps: u32,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            name: "probe_camera".to_string(),
            width: 320,
            height: 240,
            frames: None,
            seed: 7,
            target_size: 40,
            quality: 85,
            fps: 15,
        }
    }
}

impl StubConfig {
    pub fn from_url(url: &Url) -> Result<Self> {
        let mut config = Self {
            name: url.host_str().unwrap_or("probe_camera").to_string(),
            ..Self::default()
        };
        for (key, value) in url.query_pairs() {
            let parsed: u64 = value
                .parse()
                .map_err(|_| anyhow!("stub parameter '{}' must be an integer", key))?;
            let narrow = || {
                u32::try_from(parsed)
                    .map_err(|_| anyhow!("stub parameter '{}' is out of range: {}", key, parsed))
            };
            match key.as_ref() {
                "width" => config.width = narrow()?,
                "height" => config.height = narrow()?,
                "frames" => config.frames = Some(parsed),
                "seed" => config.seed = parsed,
                "size" => config.target_size = narrow()?,
                "fps" => config.fps = narrow()?,
                other => return Err(anyhow!("unknown stub parameter '{}'", other)),
            }
        }
        let fits = config
            .target_size
            .checked_add(4)
            .is_some_and(|needed| needed <= config.width && needed <= config.height);
        if config.target_size == 0 || !fits {
            return Err(anyhow!(
                "stub target size {} does not fit a {}x{} frame",
                config.target_size,
                config.width,
                config.height
            ));
        }
        Ok(config)
    }

    /// Where the target sits in frame `index` (zero based).
    pub fn target_rect(&self, index: u64) -> Rect {
        let size = self.target_size as i32;
        let x = bounce(index * 3, (self.width - self.target_size) as u64 - 4) as i32 + 2;
        let y = bounce(index, (self.height - self.target_size) as u64 - 4) as i32 + 2;
        Rect::new(x, y, size, size)
    }

    /// Render frame `index` with background noise drawn from `rng`.
    pub fn render(&self, index: u64, rng: &mut StdRng) -> RgbImage {
        let target = self.target_rect(index);
        RgbImage::from_fn(self.width, self.height, |x, y| {
            if target.contains(x as i32, y as i32) {
                return TARGET_COLOR;
            }
            let mut channel = || {
                let noise = rng.gen_range(-BACKGROUND_NOISE..=BACKGROUND_NOISE);
                (BACKGROUND_LEVEL + noise).clamp(0, 255) as u8
            };
            Rgb([channel(), channel(), channel()])
        })
    }
}

/// Triangle wave over `[0, span]`.
fn bounce(step: u64, span: u64) -> u64 {
    if span == 0 {
        return 0;
    }
    let phase = step % (2 * span);
    if phase <= span {
        phase
    } else {
        2 * span - phase
    }
}

/// Byte stream emitting synthetic multipart MJPEG.
pub struct SyntheticMjpegStream {
    config: StubConfig,
    rng: StdRng,
    frame_index: u64,
    pending: Vec<u8>,
    cursor: usize,
    next_due: Option<Instant>,
}

impl SyntheticMjpegStream {
    pub fn new(config: StubConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            rng,
            frame_index: 0,
            pending: Vec::new(),
            cursor: 0,
            next_due: None,
        }
    }

    /// Frames rendered so far.
    pub fn frames_emitted(&self) -> u64 {
        self.frame_index
    }

    /// Sleep until the next frame is due at the configured rate.
    fn pace(&mut self) {
        if self.config.fps == 0 {
            return;
        }
        let period = Duration::from_secs(1) / self.config.fps;
        let now = Instant::now();
        if let Some(due) = self.next_due {
            if due > now {
                std::thread::sleep(due - now);
            }
        }
        self.next_due = Some(self.next_due.map_or(now, |due| due.max(now)) + period);
    }

    /// Queue the next multipart section. Returns false once the frame limit is hit.
    fn refill(&mut self) -> io::Result<bool> {
        if self
            .config
            .frames
            .is_some_and(|limit| self.frame_index >= limit)
        {
            return Ok(false);
        }
        self.pace();
        let image = self.config.render(self.frame_index, &mut self.rng);
        let jpeg = encode_jpeg(&image, self.config.quality)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err.to_string()))?;
        self.frame_index += 1;

        self.pending.clear();
        self.cursor = 0;
        self.pending.extend_from_slice(
            format!(
                "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
                BOUNDARY,
                jpeg.len()
            )
            .as_bytes(),
        );
        self.pending.extend_from_slice(&jpeg);
        self.pending.extend_from_slice(b"\r\n");
        Ok(true)
    }
}

impl Read for SyntheticMjpegStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.cursor >= self.pending.len() && !self.refill()? {
            return Ok(0);
        }
        let n = buf.len().min(self.pending.len() - self.cursor);
        buf[..n].copy_from_slice(&self.pending[self.cursor..self.cursor + n]);
        self.cursor += n;
        Ok(n)
    }
}
