//! Integration tests for MJPEG frame extraction.
//!
//! These tests verify that:
//! 1. A frame surrounded by garbage is extracted byte-exact
//! 2. Frames are assembled across many small reads
//! 3. Buffers grow to hold frames larger than their initial capacity
//! 4. Synthetic `stub://` streams decode into full frames

use std::io::{Cursor, Read};
use std::time::Duration;

use image::RgbImage;
use probe_vision::frame::{decode_jpeg, encode_jpeg};
use probe_vision::ingest::stub::TARGET_COLOR;
use probe_vision::{ReceiverConfig, StreamReceiver, StubConfig};

fn quick_config() -> ReceiverConfig {
    ReceiverConfig {
        idle_backoff: Duration::from_millis(0),
        max_empty_reads: 4,
        ..ReceiverConfig::default()
    }
}

/// Hands out at most `step` bytes per read.
struct Chunked {
    data: Vec<u8>,
    pos: usize,
    step: usize,
}

impl Read for Chunked {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.step.min(buf.len()).min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[test]
fn frame_between_garbage_is_extracted_exactly() {
    let payload: Vec<u8> = (0..200u32).map(|i| (i % 250) as u8).collect();
    let mut frame = vec![0xFF, 0xD8];
    frame.extend_from_slice(&payload);
    frame.extend_from_slice(&[0xFF, 0xD9]);

    let mut stream = b"\x00\x01garbage\r\n".to_vec();
    stream.extend_from_slice(&frame);
    stream.extend_from_slice(b"more garbage");

    let mut receiver = StreamReceiver::new(quick_config());
    receiver.connect_reader("memory", Box::new(Cursor::new(stream)));
    assert_eq!(receiver.next_frame().unwrap(), frame.as_slice());
    assert!(receiver.next_frame().is_err());
    assert_eq!(receiver.stats().frames_extracted, 1);
}

#[test]
fn consecutive_frames_arrive_in_order_across_small_reads() {
    let mut stream = Vec::new();
    for tag in 1..=3u8 {
        stream.extend_from_slice(b"--frame\r\n\r\n");
        stream.extend_from_slice(&[0xFF, 0xD8, tag, tag, 0xFF, 0xD9]);
        stream.extend_from_slice(b"\r\n");
    }
    let mut receiver = StreamReceiver::new(quick_config());
    receiver.connect_reader(
        "chunked",
        Box::new(Chunked {
            data: stream,
            pos: 0,
            step: 3,
        }),
    );
    for tag in 1..=3u8 {
        let frame = receiver.next_frame().unwrap().to_vec();
        assert_eq!(frame, vec![0xFF, 0xD8, tag, tag, 0xFF, 0xD9]);
    }
}

#[test]
fn buffers_grow_for_large_frames() {
    let image = RgbImage::from_fn(256, 256, |x, y| image::Rgb([x as u8, y as u8, (x ^ y) as u8]));
    let jpeg = encode_jpeg(&image, 100).unwrap();
    let config = ReceiverConfig {
        chunk_size: 512,
        raw_capacity: 64,
        frame_capacity: 64,
        ..quick_config()
    };
    let mut receiver = StreamReceiver::new(config);
    receiver.connect_reader("large", Box::new(Cursor::new(jpeg.clone())));

    let frame = receiver.next_frame().unwrap().to_vec();
    assert_eq!(frame, jpeg);
    let (raw, assembled) = receiver.buffer_capacities();
    assert!(raw >= jpeg.len());
    assert!(assembled >= jpeg.len());
}

#[test]
fn stub_stream_yields_decodable_frames() {
    let mut receiver = StreamReceiver::new(quick_config());
    receiver
        .connect("stub://bench?width=96&height=64&size=16&frames=3&fps=0")
        .unwrap();
    assert!(receiver.is_connected());

    for index in 0..3 {
        let frame = receiver.next_frame_image().unwrap();
        assert_eq!(frame.dimensions(), (96, 64));
        let rect = StubConfig {
            width: 96,
            height: 64,
            target_size: 16,
            ..StubConfig::default()
        }
        .target_rect(index);
        let (cx, cy) = rect.center();
        let pixel = frame.get_pixel(cx as u32, cy as u32);
        // JPEG is lossy; the target stays clearly red.
        assert!(pixel.0[0] > 150 && pixel.0[1] < 90, "{:?} vs {:?}", pixel, TARGET_COLOR);
    }
    assert!(receiver.next_frame().is_err());
    receiver.disconnect();
    assert!(!receiver.is_connected());
}

#[test]
fn extracted_frame_decodes() {
    let image = RgbImage::from_pixel(40, 30, image::Rgb([10, 20, 200]));
    let mut stream = b"--b\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
    stream.extend_from_slice(&encode_jpeg(&image, 80).unwrap());
    stream.extend_from_slice(b"\r\n--b\r\n");

    let mut receiver = StreamReceiver::new(quick_config());
    receiver.connect_reader("memory", Box::new(Cursor::new(stream)));
    let decoded = decode_jpeg(receiver.next_frame().unwrap()).unwrap();
    assert_eq!(decoded.dimensions(), (40, 30));
}
