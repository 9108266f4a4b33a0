//! Stream receiver (frame demultiplexer).
//!
//! `StreamReceiver` owns two growable buffers, one for raw network bytes and
//! one for the assembled frame, and extracts one complete JPEG at a time from
//! a continuous MJPEG byte stream.
//!
//! Framing is a marker scan: the first SOI in the raw buffer, then the first
//! EOI at or after it. Multipart boundary text is never parsed; it is skipped
//! because it contains neither marker. Bytes that trail the extracted frame in
//! the same read are discarded together with the raw buffer.

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use std::io::ErrorKind;
use std::time::{Duration, Instant};

use super::{open_stream, ByteStream, ReceiverConfig, EOI, MAX_PENDING_BYTES, SOI};
use crate::buffer::GrowableBuffer;
use crate::frame::decode_jpeg;

/// Counters for a receiver.
#[derive(Clone, Debug, Default)]
pub struct ReceiverStats {
    pub frames_extracted: u64,
    pub bytes_read: u64,
    /// URL or label of the active connection.
    pub source: Option<String>,
}

struct Connection {
    source: String,
    reader: ByteStream,
    connected_at: Instant,
}

/// Extracts complete JPEG frames from an MJPEG byte stream.
pub struct StreamReceiver {
    config: ReceiverConfig,
    raw: GrowableBuffer,
    frame: GrowableBuffer,
    connection: Option<Connection>,
    frames_extracted: u64,
    bytes_read: u64,
    last_frame_at: Option<Instant>,
}

impl StreamReceiver {
    pub fn new(config: ReceiverConfig) -> Self {
        let raw = GrowableBuffer::with_capacity(config.raw_capacity);
        let frame = GrowableBuffer::with_capacity(config.frame_capacity);
        Self {
            config,
            raw,
            frame,
            connection: None,
            frames_extracted: 0,
            bytes_read: 0,
            last_frame_at: None,
        }
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    /// Open `url` and make its body the active connection.
    ///
    /// On failure the receiver stays disconnected and can be reused.
    ///
    /// # Panics
    ///
    /// Panics if the receiver is already connected.
    pub fn connect(&mut self, url: &str) -> Result<()> {
        assert!(
            !self.is_connected(),
            "connect called while already connected; disconnect first"
        );
        let reader = open_stream(url, &self.config)
            .with_context(|| format!("connect stream receiver to {}", url))?;
        self.attach(url.to_string(), reader);
        log::info!("StreamReceiver: connected to {}", url);
        Ok(())
    }

    /// Use an already open byte stream as the connection.
    ///
    /// # Panics
    ///
    /// Panics if the receiver is already connected.
    pub fn connect_reader(&mut self, label: impl Into<String>, reader: ByteStream) {
        assert!(
            !self.is_connected(),
            "connect_reader called while already connected; disconnect first"
        );
        let label = label.into();
        log::info!("StreamReceiver: attached reader {}", label);
        self.attach(label, reader);
    }

    fn attach(&mut self, source: String, reader: ByteStream) {
        self.raw.reset();
        self.frame.reset();
        self.connection = Some(Connection {
            source,
            reader,
            connected_at: Instant::now(),
        });
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Block until one complete JPEG frame has been read and return its bytes.
    ///
    /// The slice borrows the frame buffer and is valid until the next call.
    /// A single call may take any number of reads. A zero-byte read backs off
    /// for `idle_backoff`; `max_empty_reads` of them in a row end the stream.
    pub fn next_frame(&mut self) -> Result<&[u8]> {
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| anyhow!("stream receiver not connected; call connect() first"))?;
        let mut empty_reads = 0u32;

        loop {
            let read = match self
                .raw
                .append_from_stream(&mut connection.reader, self.config.chunk_size)
            {
                Ok(read) => read,
                Err(err) if err.kind() == ErrorKind::Interrupted => 0,
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("read mjpeg chunk from {}", connection.source))
                }
            };
            self.bytes_read += read as u64;

            if let Some(start) = self.raw.find_pattern(0, &SOI) {
                // Searching from `start` keeps start < end; an EOI before any SOI is ignored.
                if let Some(end) = self.raw.find_pattern(start, &EOI) {
                    self.frame.reset();
                    self.frame
                        .append_bytes(self.raw.as_slice(), start, end + EOI.len() - start);
                    self.raw.reset();
                    self.frames_extracted += 1;
                    self.last_frame_at = Some(Instant::now());
                    log::debug!(
                        "frame #{} extracted ({} bytes)",
                        self.frames_extracted,
                        self.frame.count()
                    );
                    return Ok(self.frame.as_slice());
                }
            }

            if self.raw.count() > MAX_PENDING_BYTES {
                log::warn!(
                    "no complete frame in {} buffered bytes from {}; discarding",
                    self.raw.count(),
                    connection.source
                );
                self.raw.reset();
            }

            if read == 0 {
                empty_reads += 1;
                if empty_reads >= self.config.max_empty_reads {
                    return Err(anyhow!("mjpeg stream {} ended", connection.source));
                }
                std::thread::sleep(self.config.idle_backoff);
            } else {
                empty_reads = 0;
            }
        }
    }

    /// Extract the next frame and decode it.
    pub fn next_frame_image(&mut self) -> Result<RgbImage> {
        let bytes = self.next_frame()?;
        decode_jpeg(bytes)
    }

    /// Drop the connection and rewind both buffers. No-op when not connected.
    pub fn disconnect(&mut self) {
        self.raw.reset();
        self.frame.reset();
        if let Some(connection) = self.connection.take() {
            log::info!(
                "StreamReceiver: disconnected from {} after {} frames",
                connection.source,
                self.frames_extracted
            );
        }
    }

    /// Connected and producing frames recently.
    pub fn is_healthy(&self) -> bool {
        let Some(connection) = &self.connection else {
            return false;
        };
        let grace = self.config.read_timeout.max(Duration::from_secs(2));
        match self.last_frame_at {
            Some(last) if last >= connection.connected_at => last.elapsed() <= grace,
            _ => connection.connected_at.elapsed() <= grace,
        }
    }

    pub fn stats(&self) -> ReceiverStats {
        ReceiverStats {
            frames_extracted: self.frames_extracted,
            bytes_read: self.bytes_read,
            source: self.connection.as_ref().map(|c| c.source.clone()),
        }
    }

    /// Capacity of the raw and frame buffers, in that order.
    pub fn buffer_capacities(&self) -> (usize, usize) {
        (self.raw.capacity(), self.frame.capacity())
    }
}

impl Default for StreamReceiver {
    fn default() -> Self {
        Self::new(ReceiverConfig::default())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
