//! Stream ingestion.
//!
//! This module turns a camera URL into a readable byte stream and that stream
//! into discrete JPEG frames:
//! - HTTP(S) MJPEG bodies (feature: ingest-http)
//! - `stub://` synthetic MJPEG streams (testing, demos)
//!
//! The receiver only depends on `std::io::Read`. `read` is expected to block
//! until at least one byte is available or the stream has ended; a zero-byte
//! read is treated as a starved or finished stream, never as a frame.
//!
//! The ingestion layer MUST NOT:
//! - Strip or interpret multipart MIME headers (boundary text is skipped by
//!   the marker scan)
//! - Retain more than one assembled frame

#[cfg(feature = "ingest-http")]
mod http;
pub mod receiver;
pub mod stub;

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::time::Duration;
use url::Url;

pub use receiver::{ReceiverStats, StreamReceiver};
pub use stub::{StubConfig, SyntheticMjpegStream};

/// JPEG start-of-image marker.
pub const SOI: [u8; 2] = [0xFF, 0xD8];
/// JPEG end-of-image marker.
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Bytes requested from the stream per read.
pub const DEFAULT_CHUNK_SIZE: usize = 100_000;
/// Initial capacity of the raw network buffer.
pub const RAW_BUFFER_CAPACITY: usize = 40_000;
/// Initial capacity of the assembled frame buffer.
pub const FRAME_BUFFER_CAPACITY: usize = 100_000;
/// Raw bytes accumulated without a complete frame before the buffer is discarded.
pub const MAX_PENDING_BYTES: usize = 5 * 1024 * 1024;

/// Readable byte stream handed to the receiver.
pub type ByteStream = Box<dyn Read + Send>;

/// Configuration for a `StreamReceiver` and the stream it opens.
#[derive(Clone, Debug)]
pub struct ReceiverConfig {
    /// Bytes requested per read.
    pub chunk_size: usize,
    /// Initial raw buffer capacity.
    pub raw_capacity: usize,
    /// Initial frame buffer capacity.
    pub frame_capacity: usize,
    /// HTTP connect timeout.
    pub connect_timeout: Duration,
    /// HTTP per-read timeout. A stalled camera surfaces as a read error.
    pub read_timeout: Duration,
    /// Sleep after a zero-byte read before reading again.
    pub idle_backoff: Duration,
    /// Consecutive zero-byte reads tolerated before the stream counts as ended.
    pub max_empty_reads: u32,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            raw_capacity: RAW_BUFFER_CAPACITY,
            frame_capacity: FRAME_BUFFER_CAPACITY,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(10),
            idle_backoff: Duration::from_millis(5),
            max_empty_reads: 200,
        }
    }
}

/// Open a byte stream for `url`.
///
/// Supported schemes: `http`/`https` (MJPEG response body) and `stub`
/// (synthetic MJPEG, see [`StubConfig::from_url`]).
pub fn open_stream(url: &str, config: &ReceiverConfig) -> Result<ByteStream> {
    let parsed = Url::parse(url).with_context(|| format!("parse stream url '{}'", url))?;
    match parsed.scheme() {
        "stub" => {
            let stub = StubConfig::from_url(&parsed)?;
            Ok(Box::new(SyntheticMjpegStream::new(stub)))
        }
        "http" | "https" => open_http(url, config),
        other => Err(anyhow!(
            "unsupported stream scheme '{}'; expected http(s) or stub",
            other
        )),
    }
}

#[cfg(feature = "ingest-http")]
fn open_http(url: &str, config: &ReceiverConfig) -> Result<ByteStream> {
    http::open(url, config)
}

#[cfg(not(feature = "ingest-http"))]
fn open_http(_url: &str, _config: &ReceiverConfig) -> Result<ByteStream> {
    Err(anyhow!("http streams require the ingest-http feature"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_scheme() {
        let err = open_stream("rtsp://camera/stream", &ReceiverConfig::default())
            .err()
            .expect("rtsp must be rejected");
        assert!(err.to_string().contains("unsupported stream scheme"));
    }

    #[test]
    fn rejects_unparseable_url() {
        assert!(open_stream("not a url", &ReceiverConfig::default()).is_err());
    }

    #[test]
    fn opens_stub_stream() {
        let mut stream =
            open_stream("stub://unit?frames=1", &ReceiverConfig::default()).expect("stub");
        let mut head = [0u8; 2];
        stream.read_exact(&mut head).expect("read");
        assert_eq!(head, *b"--");
    }
}
