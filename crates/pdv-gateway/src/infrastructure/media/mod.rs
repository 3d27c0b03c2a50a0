//! Media relay engine implementations.
//!
//! - **`frame_queue`** – drop-oldest queue between the capture thread and
//!   async consumers.
//! - **`grabber`** – the capture thread and frame shaping (downscale, blur,
//!   frame stride).
//! - **`pipeline`** – [`CapturePipelineEngine`], one shared relay fanning
//!   frames out to per-viewer peers.
//! - **`disabled`** – the engine used when no video backend is configured.

pub mod disabled;
pub mod frame_queue;
pub mod grabber;
pub mod pipeline;

pub use disabled::{DisabledEngine, DisabledEngineFactory};
pub use frame_queue::FrameQueue;
pub use grabber::{CaptureError, Frame, FrameGrabber, FrameSource, FrameSourceOpener, TimedFrame};
pub use pipeline::{CaptureEngineFactory, CapturePipelineEngine, MediaPeer, MediaPeerFactory};
