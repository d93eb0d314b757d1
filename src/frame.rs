//! Frame containers.
//!
//! - `FullFrame`: full-resolution RGB24 capture from a frame source. Handed to the
//!   classifier and used for thumbnails.
//! - `WorkingFrame`: immutable low-resolution grid used only for presence differencing.
//! - `Thumbnail`: small owned RGB24 capture persisted with completed inspections.
//!
//! Frames are immutable once built. A `WorkingFrame` is moved into the presence
//! detector, which keeps it as the previous frame until the next one arrives.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Bytes per RGB24 pixel.
pub const RGB_CHANNELS: usize = 3;

fn rgb_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(RGB_CHANNELS))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

fn validate_rgb(data: &[u8], width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(anyhow!("frame dimensions must be non-zero"));
    }
    let expected = rgb_len(width, height)?;
    if data.len() != expected {
        return Err(anyhow!(
            "expected {} RGB bytes for {}x{}, received {}",
            expected,
            width,
            height,
            data.len()
        ));
    }
    Ok(())
}

/// Nearest-neighbour resample of an RGB24 buffer.
fn resample_rgb(src: &[u8], src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Result<Vec<u8>> {
    if dst_w == 0 || dst_h == 0 {
        return Err(anyhow!("target resolution must be non-zero"));
    }
    let mut out = Vec::with_capacity(rgb_len(dst_w, dst_h)?);
    for y in 0..dst_h as u64 {
        let sy = (y * src_h as u64 / dst_h as u64) as usize;
        for x in 0..dst_w as u64 {
            let sx = (x * src_w as u64 / dst_w as u64) as usize;
            let offset = (sy * src_w as usize + sx) * RGB_CHANNELS;
            out.extend_from_slice(&src[offset..offset + RGB_CHANNELS]);
        }
    }
    Ok(out)
}

// ----------------------------------------------------------------------------
// FullFrame: full-resolution capture
// ----------------------------------------------------------------------------

/// Full-resolution RGB24 frame as delivered by a `FrameSource`.
pub struct FullFrame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    /// Monotonic capture instant (diagnostics only).
    captured_at: Instant,
}

impl FullFrame {
    /// Wrap an RGB24 buffer. Fails when the length does not match the dimensions.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        validate_rgb(&data, width, height)?;
        Ok(Self {
            data,
            width,
            height,
            captured_at: Instant::now(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Read-only RGB24 bytes, row-major.
    pub fn rgb(&self) -> &[u8] {
        &self.data
    }

    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }

    /// Produce the low-resolution frame used for presence differencing.
    pub fn downsample(&self, width: u32, height: u32) -> Result<WorkingFrame> {
        let data = resample_rgb(&self.data, self.width, self.height, width, height)?;
        Ok(WorkingFrame {
            data,
            width,
            height,
        })
    }

    /// Capture a small thumbnail for history records.
    pub fn thumbnail(&self, width: u32, height: u32) -> Result<Thumbnail> {
        let rgb = resample_rgb(&self.data, self.width, self.height, width, height)?;
        Ok(Thumbnail { width, height, rgb })
    }

    /// Mean RGB colour of the centred region covering `fraction` of each axis.
    ///
    /// `fraction` is clamped to `(0, 1]`; the region always contains at least one pixel.
    pub fn central_mean_rgb(&self, fraction: f32) -> [f32; 3] {
        let fraction = if fraction.is_finite() {
            fraction.clamp(f32::EPSILON, 1.0)
        } else {
            1.0
        };
        let roi_w = ((self.width as f32 * fraction).round() as u32).clamp(1, self.width);
        let roi_h = ((self.height as f32 * fraction).round() as u32).clamp(1, self.height);
        let x0 = (self.width - roi_w) / 2;
        let y0 = (self.height - roi_h) / 2;

        let mut sums = [0u64; 3];
        for y in y0..y0 + roi_h {
            let row = (y as usize * self.width as usize + x0 as usize) * RGB_CHANNELS;
            for px in self.data[row..row + roi_w as usize * RGB_CHANNELS].chunks_exact(RGB_CHANNELS)
            {
                sums[0] += px[0] as u64;
                sums[1] += px[1] as u64;
                sums[2] += px[2] as u64;
            }
        }
        let count = (roi_w as u64 * roi_h as u64) as f32;
        [
            sums[0] as f32 / count,
            sums[1] as f32 / count,
            sums[2] as f32 / count,
        ]
    }
}

// ----------------------------------------------------------------------------
// WorkingFrame: low-resolution differencing grid
// ----------------------------------------------------------------------------

/// Immutable low-resolution RGB grid. There is no mutable access to the samples.
///
/// ```compile_fail
/// use inspection_kernel::WorkingFrame;
///
/// let mut frame = WorkingFrame::from_rgb(vec![0u8; 12], 2, 2).unwrap();
/// frame.data[0] = 255;
/// ```
///
/// Nor can it be duplicated; the detector owns each frame it compares against:
///
/// ```compile_fail
/// use inspection_kernel::WorkingFrame;
///
/// let frame = WorkingFrame::from_rgb(vec![0u8; 12], 2, 2).unwrap();
/// let _copy = frame.clone();
/// ```
pub struct WorkingFrame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl WorkingFrame {
    /// Build a working frame directly from RGB24 samples already at working resolution.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        validate_rgb(&data, width, height)?;
        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_count(&self) -> usize {
        self.data.len() / RGB_CHANNELS
    }

    /// RGB sample of the pixel at linear index `index`, if in range.
    pub fn pixel(&self, index: usize) -> Option<[u8; 3]> {
        let offset = index.checked_mul(RGB_CHANNELS)?;
        let px = self.data.get(offset..offset + RGB_CHANNELS)?;
        Some([px[0], px[1], px[2]])
    }

    pub(crate) fn samples(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn same_shape(&self, other: &WorkingFrame) -> bool {
        self.width == other.width && self.height == other.height
    }
}

// ----------------------------------------------------------------------------
// Thumbnail
// ----------------------------------------------------------------------------

/// Small RGB24 capture stored alongside a completed inspection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
