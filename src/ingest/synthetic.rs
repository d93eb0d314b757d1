//! Synthetic line-camera scene (`stub://` URLs).
//!
//! A static gray background with low-amplitude sensor noise. Every pass, a
//! striped block sweeps across the field of view from left to right, then the
//! scene stays empty for a while. Block colours cycle through the palette, so
//! a classifier trained on the palette sees a mix of verdicts.

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Capture, FrameSource, SourceConfig, SourceStats};
use crate::frame::FullFrame;

const BACKGROUND: u8 = 96;
const NOISE_AMPLITUDE: i16 = 4;
const STRIPE_PERIOD: u32 = 8;
pub const DEFAULT_IDLE_FRAMES: u32 = 60;
pub const DEFAULT_TRAVEL_FRAMES: u32 = 45;

pub struct SyntheticSource {
    config: SourceConfig,
    palette: Vec<[u8; 3]>,
    idle_frames: u32,
    travel_frames: u32,
    rng: StdRng,
    connected: bool,
    polls: u64,
    frames_captured: u64,
    not_ready_polls: u64,
}

impl SyntheticSource {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config,
            palette: vec![[40, 160, 60], [200, 40, 40]],
            idle_frames: DEFAULT_IDLE_FRAMES,
            travel_frames: DEFAULT_TRAVEL_FRAMES,
            rng: StdRng::seed_from_u64(0x5eed),
            connected: false,
            polls: 0,
            frames_captured: 0,
            not_ready_polls: 0,
        }
    }

    /// Object colours, used in order, one per pass.
    pub fn with_palette(mut self, palette: Vec<[u8; 3]>) -> Self {
        if !palette.is_empty() {
            self.palette = palette;
        }
        self
    }

    /// Frames without an object, then frames of one sweep.
    pub fn with_timing(mut self, idle_frames: u32, travel_frames: u32) -> Self {
        self.idle_frames = idle_frames;
        self.travel_frames = travel_frames.max(1);
        self
    }

    /// Colour of the object in the pass that covers frame `index`, if any.
    pub fn object_at(&self, index: u64) -> Option<[u8; 3]> {
        let period = (self.idle_frames + self.travel_frames) as u64;
        let phase = index % period;
        if phase < self.idle_frames as u64 {
            return None;
        }
        let pass = (index / period) as usize;
        Some(self.palette[pass % self.palette.len()])
    }

    fn render(&mut self, index: u64) -> Result<FullFrame> {
        let width = self.config.width;
        let height = self.config.height;
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        for _ in 0..(width as usize * height as usize * 3) {
            let noise = self.rng.gen_range(-NOISE_AMPLITUDE..=NOISE_AMPLITUDE);
            data.push((BACKGROUND as i16 + noise) as u8);
        }

        if let Some(colour) = self.object_at(index) {
            let period = (self.idle_frames + self.travel_frames) as u64;
            let step = (index % period - self.idle_frames as u64) as i64;
            let block_w = (width / 3).max(1) as i64;
            let block_h = (height / 2).max(1);
            let y0 = (height - block_h) / 2;
            // Leading edge goes from 0 to width + block_w over the pass.
            let travel = width as i64 + block_w;
            let right = (step + 1) * travel / self.travel_frames as i64;
            let left = right - block_w;

            let dark = colour.map(|c| (c as u32 * 6 / 10) as u8);
            for y in y0..y0 + block_h {
                for x in left.max(0)..right.min(width as i64) {
                    let stripe = ((x - left) as u32 / (STRIPE_PERIOD / 2)) % 2 == 0;
                    let px = if stripe { colour } else { dark };
                    let offset = (y as usize * width as usize + x as usize) * 3;
                    data[offset..offset + 3].copy_from_slice(&px);
                }
            }
        }

        FullFrame::from_rgb(data, width, height)
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        if self.config.width == 0 || self.config.height == 0 {
            return Err(anyhow!("synthetic source needs a non-zero resolution"));
        }
        self.connected = true;
        log::info!("SyntheticSource: connected to {}", self.config.url);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Capture> {
        if !self.connected {
            return Err(anyhow!("synthetic source {} is not connected", self.config.url));
        }
        self.polls += 1;
        if self.polls <= self.config.warmup_frames as u64 {
            self.not_ready_polls += 1;
            return Ok(Capture::NotReady);
        }

        let index = self.frames_captured;
        let frame = self.render(index)?;
        self.frames_captured += 1;
        Ok(Capture::Frame(frame))
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frames_captured,
            not_ready_polls: self.not_ready_polls,
            url: self.config.url.clone(),
        }
    }
}
