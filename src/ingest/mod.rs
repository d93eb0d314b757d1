//! Frame ingestion sources.
//!
//! This module provides sources for full-resolution frames:
//! - Synthetic scenes (`stub://` URLs) for demos and tests
//! - Local raw frame recordings (`rgb24` / `nv12`)
//!
//! Sources report a stream that is not yet producing frames as
//! `Capture::NotReady`, which is distinct from a frame without motion.
//! The host downsamples each frame to the working resolution for presence
//! detection; the full frame goes to the classifier on demand.

mod normalize;
pub mod raw_file;
pub mod synthetic;

use anyhow::Result;

use crate::frame::FullFrame;

pub use normalize::PixelFormat;
pub use raw_file::RawFileSource;
pub use synthetic::SyntheticSource;

/// Configuration for a frame source.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceConfig {
    /// `stub://<name>` for a synthetic scene, otherwise a local file path.
    pub url: String,
    /// Target frame rate the host paces itself to.
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
    /// Pixel layout of raw recordings.
    pub pixel_format: PixelFormat,
    /// Frames a synthetic source reports as not ready after connecting.
    pub warmup_frames: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "stub://line_camera".to_string(),
            target_fps: 30,
            width: 640,
            height: 480,
            pixel_format: PixelFormat::Rgb24,
            warmup_frames: 5,
        }
    }
}

/// One poll of a frame source.
pub enum Capture {
    /// The stream is not producing frames yet. Not an error.
    NotReady,
    Frame(FullFrame),
    /// A finite source has no more frames.
    EndOfStream,
}

/// Statistics for a frame source.
#[derive(Clone, Debug, Default)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub not_ready_polls: u64,
    pub url: String,
}

/// Frame source port.
pub trait FrameSource {
    /// Open the underlying stream.
    fn connect(&mut self) -> Result<()>;

    /// Poll the next frame.
    fn next_frame(&mut self) -> Result<Capture>;

    /// Check if the source is healthy.
    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}

/// Open the source named by `config.url`.
pub fn open_source(config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    if config.url.starts_with("stub://") {
        Ok(Box::new(SyntheticSource::new(config.clone())))
    } else {
        Ok(Box::new(RawFileSource::new(config.clone())?))
    }
}
