use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Pixel layouts a raw recording may use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    #[default]
    Rgb24,
    Nv12,
}

impl PixelFormat {
    /// Bytes per frame of `width` x `height`.
    ///
    /// NV12 shares one chroma pair between 2x2 pixels, so both dimensions must be even.
    pub fn frame_len(self, width: u32, height: u32) -> Result<usize> {
        if self == PixelFormat::Nv12 && (width % 2 != 0 || height % 2 != 0) {
            return Err(anyhow!(
                "nv12 frames need even dimensions, got {}x{}",
                width,
                height
            ));
        }
        let pixels = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        let len = match self {
            PixelFormat::Rgb24 => pixels.checked_mul(3),
            PixelFormat::Nv12 => pixels.checked_add(pixels / 2),
        };
        len.ok_or_else(|| anyhow!("frame dimensions overflow"))
    }

    /// Convert one frame to RGB24.
    pub fn to_rgb(self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
        let expected = self.frame_len(width, height)?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "{:?} frame length mismatch: expected {}, got {}",
                self,
                expected,
                pixels.len()
            ));
        }
        match self {
            PixelFormat::Rgb24 => Ok(pixels.to_vec()),
            PixelFormat::Nv12 => Ok(nv12_to_rgb(pixels, width as usize, height as usize)),
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rgb24" | "rgb" => Ok(PixelFormat::Rgb24),
            "nv12" => Ok(PixelFormat::Nv12),
            other => Err(anyhow!("unsupported pixel format '{}'", other)),
        }
    }
}

/// BT.601 full-range conversion. Length is checked by the caller.
fn nv12_to_rgb(pixels: &[u8], w: usize, h: usize) -> Vec<u8> {
    let y_plane = w * h;
    let mut rgb = Vec::with_capacity(y_plane * 3);
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * w + i] as f32;
            let uv = y_plane + (j / 2) * w + (i / 2) * 2;
            let u = pixels[uv] as f32 - 128.0;
            let v = pixels[uv + 1] as f32 - 128.0;

            rgb.push(to_u8(y + 1.402 * v));
            rgb.push(to_u8(y - 0.344_136 * u - 0.714_136 * v));
            rgb.push(to_u8(y + 1.772 * u));
        }
    }
    rgb
}

fn to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
