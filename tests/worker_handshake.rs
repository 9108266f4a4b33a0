//! Integration tests for the streaming worker over `stub://` streams.
//!
//! These tests verify that:
//! 1. Stop-and-wait leaves the receiver idle (no frame requests after return)
//! 2. Capturing one frame restarts the loop without losing frames
//! 3. The tracking loop blocks until the callback signals completion
//! 4. Tracking reports follow the synthetic target

use std::sync::mpsc;
use std::time::{Duration, Instant};

use image::RgbImage;
use probe_vision::frame::crop_region;
use probe_vision::{
    CompletionSignal, HistogramParams, LatestFrameSink, NullSink, ReceiverConfig, Rect,
    RegionTracker, StreamWorker, StreamingMode, StubConfig, TrackingReport,
};

const STUB_URL: &str = "stub://bench?width=160&height=120&size=24&fps=0";

fn stub_scene() -> StubConfig {
    StubConfig {
        width: 160,
        height: 120,
        target_size: 24,
        ..StubConfig::default()
    }
}

fn connected_worker(sink: Box<dyn probe_vision::FrameSink>) -> StreamWorker {
    let mut worker = StreamWorker::new(STUB_URL, ReceiverConfig::default(), sink);
    worker.make_connection().expect("connect stub");
    worker
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for worker");
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// Bounding box of clearly red pixels.
fn locate_target(frame: &RgbImage) -> Rect {
    let (mut x0, mut y0, mut x1, mut y1) = (i32::MAX, i32::MAX, i32::MIN, i32::MIN);
    for (x, y, pixel) in frame.enumerate_pixels() {
        if pixel.0[0] > 160 && pixel.0[1] < 90 && pixel.0[2] < 90 {
            x0 = x0.min(x as i32);
            y0 = y0.min(y as i32);
            x1 = x1.max(x as i32);
            y1 = y1.max(y as i32);
        }
    }
    assert!(x0 <= x1, "no target in frame");
    Rect::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1)
}

fn assert_near(actual: (i32, i32), expected: (i32, i32), tolerance: i32) {
    assert!(
        (actual.0 - expected.0).abs() <= tolerance && (actual.1 - expected.1).abs() <= tolerance,
        "{:?} not within {} px of {:?}",
        actual,
        tolerance,
        expected
    );
}

#[test]
fn stop_and_wait_leaves_receiver_idle() {
    let sink = LatestFrameSink::new();
    let slot = sink.slot();
    let mut worker = connected_worker(Box::new(sink));
    worker.start().unwrap();
    let stats = worker.stats();
    wait_until(Duration::from_secs(10), || stats.frames_displayed() >= 3);

    worker.request_stop_and_wait().unwrap();
    assert!(!worker.is_streaming());
    let received = stats.frames_received();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(stats.frames_received(), received);
    assert_eq!(slot.latest().unwrap().unwrap().dimensions(), (160, 120));

    worker.disconnect().unwrap();
    assert!(!worker.connected());
}

#[test]
fn capture_one_frame_resumes_streaming_without_gaps() {
    let mut worker = connected_worker(Box::new(NullSink));
    worker.start().unwrap();
    let stats = worker.stats();
    wait_until(Duration::from_secs(10), || stats.frames_received() >= 2);

    let still = worker.capture_one_frame().unwrap();
    assert_eq!(still.dimensions(), (160, 120));
    assert!(worker.is_streaming());

    let after = stats.frames_received();
    wait_until(Duration::from_secs(10), || stats.frames_received() > after + 2);
    worker.disconnect().unwrap();
}

#[test]
fn captured_frame_is_the_next_frame_of_the_stream() {
    let mut worker = connected_worker(Box::new(NullSink));
    worker.start().unwrap();
    let stats = worker.stats();
    wait_until(Duration::from_secs(10), || stats.frames_received() >= 4);
    worker.request_stop_and_wait().unwrap();

    let index = stats.frames_received();
    let still = worker.capture_one_frame().unwrap();
    assert!(!worker.is_streaming());
    assert_near(
        locate_target(&still).center(),
        stub_scene().target_rect(index).center(),
        2,
    );
    worker.disconnect().unwrap();
}

#[test]
fn tracking_loop_waits_for_completion_signal() {
    let mut worker = connected_worker(Box::new(LatestFrameSink::new()));
    let still = worker.capture_one_frame().unwrap();
    let target = locate_target(&still);
    let inner = Rect::new(target.x + 3, target.y + 3, target.width - 6, target.height - 6);

    let mut tracker = RegionTracker::default();
    tracker.set_model(&crop_region(&still, inner).unwrap(), &HistogramParams::default());
    tracker.set_initial_window_rect(target);

    let (report_tx, report_rx) = mpsc::channel::<(TrackingReport, CompletionSignal)>();
    worker
        .set_tracking_callback(Box::new(move |report, done| {
            // A closed channel drops `done`, which also releases the loop.
            let _ = report_tx.send((report, done));
        }))
        .unwrap();
    worker.change_to_tracking_mode(tracker).unwrap();
    assert_eq!(worker.mode(), StreamingMode::Tracking);
    worker.start().unwrap();

    let stats = worker.stats();
    let (first, done) = report_rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert!(first.target_present);
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(stats.frames_tracked(), 1, "loop ran ahead of the callback");
    done.signal();

    let mut reports = vec![first];
    while reports.len() < 6 {
        let (report, done) = report_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        reports.push(report);
        done.signal();
    }
    drop(report_rx);

    // Frames after the captured still arrive in order, one report each.
    let start_index = 1;
    for (offset, report) in reports.iter().enumerate() {
        let expected = stub_scene().target_rect(start_index + offset as u64);
        assert!(report.target_present, "report {} lost the target", offset);
        assert_near((report.center_x, report.center_y), expected.center(), 4);
    }

    worker.disconnect().unwrap();
    let tracker = worker.take_tracker().unwrap().expect("tracker returned");
    assert!(tracker.window().is_some());
}
