//! Streaming worker.
//!
//! `StreamWorker` runs a `StreamReceiver` on a dedicated thread and feeds each
//! decoded frame either straight to a `FrameSink` (normal mode) or through a
//! `RegionTracker` (tracking mode). The controlling thread can:
//! - start and stop-and-wait the loop
//! - switch between normal and tracking mode while the loop runs
//! - grab one still frame between two runs of the loop
//!
//! Ownership rules:
//! - While the loop runs it owns the receiver, the sink, the tracker and the
//!   tracking callback. The loop thread returns them when it exits, so the
//!   controlling thread only touches them after a stop-and-wait.
//! - Mode changes travel over a channel and are applied between frames.
//! - In tracking mode the loop blocks after each callback until the callback
//!   fires its `CompletionSignal`, so at most one tracking decision is in
//!   flight.
//!
//! MUST NOT:
//! - call `next_frame` from the controlling thread, running or not
//! - process a frame after the pause flag has been observed

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SendError, Sender, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::frame::decode_jpeg;
use crate::ingest::{ReceiverConfig, StreamReceiver};
use crate::sink::FrameSink;
use crate::track::RegionTracker;
use crate::Rect;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamingMode {
    Normal,
    Tracking,
}

/// What the tracking callback learns about each tracked frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackingReport {
    pub center_x: i32,
    pub center_y: i32,
    pub target_present: bool,
    /// Spread of back-projection values inside the window.
    pub confidence: f64,
    pub window: Rect,
}

/// Releases the streaming loop after a tracking callback.
///
/// Consumed by `signal`, so it fires at most once. Dropping it without
/// signalling also releases the loop, with a warning.
#[derive(Debug)]
pub struct CompletionSignal {
    done: SyncSender<()>,
}

impl CompletionSignal {
    pub fn signal(self) {
        // The loop may already have given up waiting; nothing to do then.
        let _ = self.done.send(());
    }
}

/// Called once per tracked frame on the loop thread.
pub type TrackingCallback = Box<dyn FnMut(TrackingReport, CompletionSignal) + Send>;

/// Counters shared between the loop thread and its controller.
#[derive(Clone, Debug, Default)]
pub struct WorkerStats {
    frames_received: Arc<AtomicU64>,
    frames_displayed: Arc<AtomicU64>,
    frames_tracked: Arc<AtomicU64>,
    frames_skipped: Arc<AtomicU64>,
    bytes_read: Arc<AtomicU64>,
}

impl WorkerStats {
    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    /// Frames pushed to the sink, tracked or not.
    pub fn frames_displayed(&self) -> u64 {
        self.frames_displayed.load(Ordering::Relaxed)
    }

    pub fn frames_tracked(&self) -> u64 {
        self.frames_tracked.load(Ordering::Relaxed)
    }

    /// Frames that failed to decode or to track.
    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped.load(Ordering::Relaxed)
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

enum Control {
    Track(RegionTracker),
    Normal,
}

/// Everything the loop thread owns while it runs.
struct LoopState {
    receiver: StreamReceiver,
    sink: Box<dyn FrameSink>,
    tracker: Option<RegionTracker>,
    mode: StreamingMode,
    callback: Option<TrackingCallback>,
}

struct RunningLoop {
    join: JoinHandle<(LoopState, Result<()>)>,
    control: Sender<Control>,
}

pub struct StreamWorker {
    url: String,
    idle: Option<LoopState>,
    running: Option<RunningLoop>,
    pause: Arc<AtomicBool>,
    mode: StreamingMode,
    stats: WorkerStats,
}

impl StreamWorker {
    pub fn new(url: impl Into<String>, config: ReceiverConfig, sink: Box<dyn FrameSink>) -> Self {
        Self::with_receiver(url, StreamReceiver::new(config), sink)
    }

    /// Wrap an existing receiver, which may already be connected.
    pub fn with_receiver(
        url: impl Into<String>,
        receiver: StreamReceiver,
        sink: Box<dyn FrameSink>,
    ) -> Self {
        Self {
            url: url.into(),
            idle: Some(LoopState {
                receiver,
                sink,
                tracker: None,
                mode: StreamingMode::Normal,
                callback: None,
            }),
            running: None,
            pause: Arc::new(AtomicBool::new(false)),
            mode: StreamingMode::Normal,
            stats: WorkerStats::default(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Loop state while stopped.
    ///
    /// # Panics
    ///
    /// Panics while the loop is running.
    fn idle_state(&mut self) -> Result<&mut LoopState> {
        assert!(
            self.running.is_none(),
            "stream worker is running; call request_stop_and_wait() first"
        );
        self.idle
            .as_mut()
            .ok_or_else(|| anyhow!("stream worker lost its receiver when the loop thread panicked"))
    }

    /// Install the callback that receives tracking reports. Worker must be stopped.
    pub fn set_tracking_callback(&mut self, callback: TrackingCallback) -> Result<()> {
        self.idle_state()?.callback = Some(callback);
        Ok(())
    }

    /// Connect the receiver to the worker's URL. Worker must be stopped.
    pub fn make_connection(&mut self) -> Result<()> {
        let url = self.url.clone();
        let state = self.idle_state()?;
        if state.receiver.is_connected() {
            log::debug!("StreamWorker: already connected to {}", url);
            return Ok(());
        }
        state.receiver.connect(&url)
    }

    /// Start the streaming loop on its own thread.
    ///
    /// # Panics
    ///
    /// Panics if the loop is already running or the receiver is not connected.
    pub fn start(&mut self) -> Result<()> {
        assert!(self.running.is_none(), "stream worker already started");
        let connected = self.idle_state()?.receiver.is_connected();
        assert!(connected, "stream worker started before make_connection()");
        let Some(state) = self.idle.take() else {
            return Err(anyhow!("stream worker has no receiver"));
        };

        self.pause.store(false, Ordering::SeqCst);
        let (control_tx, control_rx) = mpsc::channel();
        let pause = self.pause.clone();
        let stats = self.stats.clone();
        let join = std::thread::spawn(move || run_loop(state, control_rx, pause, stats));
        self.running = Some(RunningLoop {
            join,
            control: control_tx,
        });
        log::info!("StreamWorker: streaming {} ({:?} mode)", self.url, self.mode);
        Ok(())
    }

    /// Ask the loop to stop and block until it has exited.
    ///
    /// Returns the error that ended the loop, if it ended on its own. The
    /// receiver and tracker are back under the caller's control either way.
    /// No-op when the loop is not running.
    pub fn request_stop_and_wait(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };
        self.pause.store(true, Ordering::SeqCst);
        drop(running.control);
        let joined = running.join.join();
        self.pause.store(false, Ordering::SeqCst);
        match joined {
            Ok((state, outcome)) => {
                self.mode = state.mode;
                self.idle = Some(state);
                outcome
            }
            Err(_) => Err(anyhow!("stream loop thread panicked")),
        }
    }

    /// Stop the loop, read one frame on a short-lived reader thread, then
    /// restart the loop if it was running.
    pub fn capture_one_frame(&mut self) -> Result<RgbImage> {
        let was_running = self.running.is_some();
        self.request_stop_and_wait()
            .context("stop stream loop before capture")?;
        self.idle_state()?;
        let Some(mut state) = self.idle.take() else {
            return Err(anyhow!("stream worker has no receiver"));
        };

        let reader = std::thread::spawn(move || {
            let frame = state.receiver.next_frame_image();
            (state, frame)
        });
        let (state, frame) = reader
            .join()
            .map_err(|_| anyhow!("frame capture thread panicked"))?;
        self.idle = Some(state);

        if was_running {
            self.start()?;
        }
        frame.context("capture one frame")
    }

    /// Switch to tracking with a ready tracker.
    ///
    /// # Panics
    ///
    /// Panics unless `tracker` has both a model and an initial window.
    pub fn change_to_tracking_mode(&mut self, tracker: RegionTracker) -> Result<()> {
        assert!(
            tracker.is_ready(),
            "tracking mode needs a tracker with model and initial window set"
        );
        self.mode = StreamingMode::Tracking;
        self.send_control(Control::Track(tracker))
    }

    /// Back to plain display. The tracker is reset and kept for `take_tracker`.
    pub fn change_to_normal_mode(&mut self) -> Result<()> {
        self.mode = StreamingMode::Normal;
        self.send_control(Control::Normal)
    }

    fn send_control(&mut self, control: Control) -> Result<()> {
        let Some(running) = &self.running else {
            self.idle_state()?.apply(control);
            return Ok(());
        };
        if let Err(SendError(control)) = running.control.send(control) {
            // Loop already exited; collect its state and apply the change there.
            let outcome = self.request_stop_and_wait();
            self.idle_state()?.apply(control);
            return outcome;
        }
        Ok(())
    }

    /// Last requested mode.
    pub fn mode(&self) -> StreamingMode {
        self.mode
    }

    /// Loop thread is alive.
    pub fn is_streaming(&self) -> bool {
        self.running
            .as_ref()
            .map(|running| !running.join.is_finished())
            .unwrap_or(false)
    }

    pub fn connected(&self) -> bool {
        match (&self.running, &self.idle) {
            (Some(_), _) => true,
            (None, Some(state)) => state.receiver.is_connected(),
            (None, None) => false,
        }
    }

    /// Stop the loop and close the connection.
    ///
    /// The connection is closed even when the loop had ended with an error;
    /// that error is returned.
    pub fn disconnect(&mut self) -> Result<()> {
        let outcome = self.request_stop_and_wait();
        if let Some(state) = self.idle.as_mut() {
            state.receiver.disconnect();
        }
        outcome
    }

    /// Take the tracker back out of a stopped worker; the worker reverts to
    /// normal mode.
    pub fn take_tracker(&mut self) -> Result<Option<RegionTracker>> {
        let state = self.idle_state()?;
        state.mode = StreamingMode::Normal;
        let tracker = state.tracker.take();
        self.mode = StreamingMode::Normal;
        Ok(tracker)
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats.clone()
    }
}

impl Drop for StreamWorker {
    fn drop(&mut self) {
        if let Err(err) = self.request_stop_and_wait() {
            log::warn!("StreamWorker: loop ended with error during drop: {:#}", err);
        }
    }
}

// ----------------------------------------------------------------------------
// Loop
// ----------------------------------------------------------------------------

fn run_loop(
    mut state: LoopState,
    control: Receiver<Control>,
    pause: Arc<AtomicBool>,
    stats: WorkerStats,
) -> (LoopState, Result<()>) {
    let outcome = state.stream(&control, &pause, &stats);
    match &outcome {
        Ok(()) => log::debug!("stream loop paused"),
        Err(err) => log::error!("stream loop stopped: {:#}", err),
    }
    (state, outcome)
}

impl LoopState {
    fn apply(&mut self, control: Control) {
        match control {
            Control::Track(tracker) => {
                log::info!("StreamWorker: tracking from window {:?}", tracker.window());
                self.tracker = Some(tracker);
                self.mode = StreamingMode::Tracking;
            }
            Control::Normal => {
                if let Some(tracker) = self.tracker.as_mut() {
                    tracker.reset();
                }
                self.mode = StreamingMode::Normal;
                log::info!("StreamWorker: normal mode");
            }
        }
    }

    fn stream(
        &mut self,
        control: &Receiver<Control>,
        pause: &AtomicBool,
        stats: &WorkerStats,
    ) -> Result<()> {
        loop {
            while let Ok(message) = control.try_recv() {
                self.apply(message);
            }

            let decoded = decode_jpeg(self.receiver.next_frame()?);
            WorkerStats::bump(&stats.frames_received);
            stats
                .bytes_read
                .store(self.receiver.stats().bytes_read, Ordering::Relaxed);

            if pause.swap(false, Ordering::SeqCst) {
                return Ok(());
            }

            let frame = match decoded {
                Ok(frame) => frame,
                Err(err) => {
                    log::warn!("skipping undecodable frame: {:#}", err);
                    WorkerStats::bump(&stats.frames_skipped);
                    continue;
                }
            };

            match self.mode {
                StreamingMode::Normal => self.display(&frame, stats),
                StreamingMode::Tracking => self.track(&frame, stats),
            }
        }
    }

    fn display(&mut self, frame: &RgbImage, stats: &WorkerStats) {
        match self.sink.present(frame) {
            Ok(()) => WorkerStats::bump(&stats.frames_displayed),
            Err(err) => log::warn!("frame sink rejected frame: {:#}", err),
        }
    }

    fn track(&mut self, frame: &RgbImage, stats: &WorkerStats) {
        let Some(tracker) = self.tracker.as_mut() else {
            self.display(frame, stats);
            return;
        };
        let result = match tracker.track(frame) {
            Ok(result) => result,
            Err(err) => {
                log::warn!("tracking skipped a frame: {:#}", err);
                WorkerStats::bump(&stats.frames_skipped);
                self.display(frame, stats);
                return;
            }
        };
        WorkerStats::bump(&stats.frames_tracked);
        self.display(&result.frame, stats);

        let Some(callback) = self.callback.as_mut() else {
            return;
        };
        let report = TrackingReport {
            center_x: result.center.0,
            center_y: result.center.1,
            target_present: result.target_present,
            confidence: result.spread,
            window: result.window,
        };
        let (done_tx, done_rx) = mpsc::sync_channel(1);
        callback(report, CompletionSignal { done: done_tx });
        if done_rx.recv().is_err() {
            log::warn!("tracking callback dropped its completion signal");
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
