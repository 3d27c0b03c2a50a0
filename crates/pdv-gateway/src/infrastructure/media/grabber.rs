//! Capture worker: a dedicated OS thread that reads frames from a source,
//! shapes them to a quality preset, and feeds a [`FrameQueue`].
//!
//! Video sources are blocking (an RTSP client waits on the network for each
//! frame), so the worker runs on its own thread rather than on the async
//! runtime.  The thread checks a shared `running` flag between frames;
//! [`FrameGrabber::stop`] clears it and waits a bounded time for the thread
//! to notice.
//!
//! For every frame read, the worker:
//!
//! 1. keeps it only if it is the `frame_stride`-th frame since the last kept one,
//! 2. downscales it by the preset's factor (nearest neighbour),
//! 3. blurs it with a 3x3 box filter when the preset compresses heavily,
//! 4. stamps it with a 90 kHz presentation timestamp,
//! 5. pushes it onto the queue (evicting the oldest frame when full).

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use pdv_core::QualityPreset;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::frame_queue::FrameQueue;

/// RTP video clock rate.
pub const VIDEO_CLOCK_RATE: u64 = 90_000;

/// How long `stop` waits for the worker thread to exit.
pub const STOP_GRACE: Duration = Duration::from_secs(1);

const IDLE_BACKOFF: Duration = Duration::from_millis(10);
const ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Error type for capture operations.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open media source {source_id}: {reason}")]
    Open { source_id: String, reason: String },

    #[error("failed to read frame: {0}")]
    Read(String),

    #[error("failed to spawn capture thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// A decoded frame of packed pixels, row-major, `channels` bytes per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            channels,
            data,
        }
    }

    /// Whether `data` holds exactly `width * height * channels` bytes.
    pub fn is_well_formed(&self) -> bool {
        self.channels > 0
            && self.data.len() == self.width as usize * self.height as usize * self.channels as usize
    }
}

/// A shaped frame ready for a media peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedFrame {
    pub frame: Frame,
    /// Presentation timestamp in 90 kHz ticks since capture started.
    pub pts: u64,
}

/// A blocking source of decoded frames.
pub trait FrameSource: Send {
    /// Reads the next frame.  `Ok(None)` means no frame is ready yet.
    fn read_frame(&mut self) -> Result<Option<Frame>, CaptureError>;

    /// Releases the source.  Called once, on the worker thread.
    fn close(&mut self) {}
}

/// Opens frame sources by id (e.g. an RTSP URL).
pub trait FrameSourceOpener: Send + Sync {
    fn open(&self, source_id: &str) -> Result<Box<dyn FrameSource>, CaptureError>;
}

// ── Shaping ───────────────────────────────────────────────────────────────────

/// Downscales a frame to the preset's dimensions (nearest neighbour).
pub fn downscale(frame: &Frame, preset: &QualityPreset) -> Frame {
    let (out_w, out_h) = preset.scaled_dimensions(frame.width, frame.height);
    if (out_w, out_h) == (frame.width, frame.height) || !frame.is_well_formed() {
        return frame.clone();
    }

    let ch = frame.channels as usize;
    let mut data = Vec::with_capacity(out_w as usize * out_h as usize * ch);
    for y in 0..out_h as u64 {
        let src_y = (y * frame.height as u64 / out_h as u64) as usize;
        for x in 0..out_w as u64 {
            let src_x = (x * frame.width as u64 / out_w as u64) as usize;
            let at = (src_y * frame.width as usize + src_x) * ch;
            data.extend_from_slice(&frame.data[at..at + ch]);
        }
    }
    Frame::new(out_w, out_h, frame.channels, data)
}

/// 3x3 box blur; edge pixels average over their in-bounds neighbours.
pub fn box_blur(frame: &Frame) -> Frame {
    if !frame.is_well_formed() {
        return frame.clone();
    }
    let (w, h, ch) = (
        frame.width as usize,
        frame.height as usize,
        frame.channels as usize,
    );
    let mut data = vec![0u8; frame.data.len()];
    for y in 0..h {
        for x in 0..w {
            for c in 0..ch {
                let mut sum = 0u32;
                let mut count = 0u32;
                for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
                    for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                        sum += frame.data[(ny * w + nx) * ch + c] as u32;
                        count += 1;
                    }
                }
                data[(y * w + x) * ch + c] = (sum / count) as u8;
            }
        }
    }
    Frame::new(frame.width, frame.height, frame.channels, data)
}

/// Applies the preset's downscale and, for heavy compression, the blur.
pub fn shape(frame: &Frame, preset: &QualityPreset) -> Frame {
    let scaled = downscale(frame, preset);
    if preset.blurs() {
        box_blur(&scaled)
    } else {
        scaled
    }
}

/// Converts elapsed capture time to 90 kHz ticks.
pub fn pts_for(elapsed: Duration) -> u64 {
    (elapsed.as_micros() as u64).saturating_mul(VIDEO_CLOCK_RATE) / 1_000_000
}

// ── Worker ────────────────────────────────────────────────────────────────────

/// Handle to a running capture thread.
pub struct FrameGrabber {
    source_id: String,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl FrameGrabber {
    /// Starts the capture thread.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Spawn`] if the OS refuses to create a thread.
    pub fn spawn(
        source_id: &str,
        source: Box<dyn FrameSource>,
        preset: QualityPreset,
        queue: Arc<FrameQueue<TimedFrame>>,
    ) -> Result<Self, CaptureError> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let id = source_id.to_string();

        let thread = std::thread::Builder::new()
            .name("pdv-capture".to_string())
            .spawn(move || capture_loop(&id, source, preset, &queue, &flag))
            .map_err(CaptureError::Spawn)?;

        info!(source = source_id, %preset, "capture worker started");
        Ok(Self {
            source_id: source_id.to_string(),
            running,
            thread: Some(thread),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
            && self.thread.as_ref().map_or(false, |t| !t.is_finished())
    }

    /// Signals the worker to stop and waits up to `grace` for it to exit.
    ///
    /// Blocks the calling thread; async callers run it via
    /// `spawn_blocking`.  Returns whether the thread exited in time; a worker
    /// stuck inside `read_frame` is detached.
    pub fn stop(&mut self, grace: Duration) -> bool {
        self.running.store(false, Ordering::Relaxed);
        let Some(thread) = self.thread.take() else {
            return true;
        };

        let deadline = Instant::now() + grace;
        while !thread.is_finished() {
            if Instant::now() >= deadline {
                warn!(source = %self.source_id, "capture worker did not stop in time; detaching");
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        if thread.join().is_err() {
            warn!(source = %self.source_id, "capture worker panicked");
        }
        debug!(source = %self.source_id, "capture worker stopped");
        true
    }
}

impl Drop for FrameGrabber {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

fn capture_loop(
    source_id: &str,
    mut source: Box<dyn FrameSource>,
    preset: QualityPreset,
    queue: &FrameQueue<TimedFrame>,
    running: &AtomicBool,
) {
    let started = Instant::now();
    let stride = preset.frame_stride.max(1) as u64;
    let mut counter: u64 = 0;

    while running.load(Ordering::Relaxed) {
        let frame = match source.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                std::thread::sleep(IDLE_BACKOFF);
                continue;
            }
            Err(e) => {
                warn!(source = source_id, "{e}");
                std::thread::sleep(ERROR_BACKOFF);
                continue;
            }
        };

        counter += 1;
        if counter % stride != 0 {
            continue;
        }

        let timed = TimedFrame {
            frame: shape(&frame, &preset),
            pts: pts_for(started.elapsed()),
        };
        if !queue.push(timed) {
            debug!(source = source_id, "frame queue full; dropped oldest frame");
        }
    }

    source.close();
    queue.close();
    debug!(source = source_id, frames = counter, "capture loop exited");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
