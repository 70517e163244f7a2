//! Raster frame types.
//!
//! - `Frame`: packed RGB24 raster as produced by a `FrameSource` and consumed by a `FrameSink`.
//! - `LumaPlane`: single-channel f32 intensity plane used by motion estimation.
//! - `VideoInfo`: stream metadata reported by a source.

use anyhow::{anyhow, Result};
use image::RgbImage;
use serde::Serialize;

/// Frame rate assumed when a source reports a non-positive or non-finite rate.
pub const FALLBACK_FPS: f64 = 25.0;

// ----------------------------------------------------------------------------
// Frame: packed RGB24 raster
// ----------------------------------------------------------------------------

/// Packed RGB24 frame (row-major, no padding).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap packed RGB24 bytes. The length must be exactly `width * height * 3`.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Frame of a single solid color.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * 3);
        for _ in 0..pixels {
            data.extend_from_slice(&rgb);
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// All-zero (black) frame.
    pub fn black(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; width as usize * height as usize * 3],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// RGB triple at `(x, y)`, or `None` when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 3;
        Some([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        ])
    }

    /// Bytes of row `y`.
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.width as usize * 3;
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }

    pub(crate) fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let stride = self.width as usize * 3;
        let start = y as usize * stride;
        &mut self.data[start..start + stride]
    }

    /// Luma plane using the BT.601 weights (0.299 R + 0.587 G + 0.114 B).
    pub fn to_luma(&self) -> LumaPlane {
        let data = self
            .data
            .chunks_exact(3)
            .map(|px| 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32)
            .collect();
        LumaPlane {
            width: self.width as usize,
            height: self.height as usize,
            data,
        }
    }

    pub(crate) fn to_rgb_image(&self) -> Result<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| anyhow!("frame buffer does not fit {}x{}", self.width, self.height))
    }

    pub(crate) fn from_rgb_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.into_raw(),
        }
    }
}

fn rgb_len(width: u32, height: u32) -> Result<usize> {
    width
        .checked_mul(height)
        .and_then(|v| v.checked_mul(3))
        .map(|v| v as usize)
        .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))
}

// ----------------------------------------------------------------------------
// LumaPlane: grayscale intensity plane
// ----------------------------------------------------------------------------

/// Single-channel intensity plane (0.0..=255.0), row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct LumaPlane {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl LumaPlane {
    pub fn new(width: usize, height: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != width * height {
            return Err(anyhow!(
                "luma plane length mismatch: expected {}, got {}",
                width * height,
                data.len()
            ));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn from_fn(width: usize, height: usize, f: impl Fn(usize, usize) -> f32) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    /// Pixel with replicated borders.
    #[inline]
    pub fn get_clamped(&self, x: isize, y: isize) -> f32 {
        let cx = x.clamp(0, self.width as isize - 1) as usize;
        let cy = y.clamp(0, self.height as isize - 1) as usize;
        self.data[cy * self.width + cx]
    }

    /// Bilinear sample with replicated borders.
    pub fn sample(&self, x: f32, y: f32) -> f32 {
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let xi = x0 as isize;
        let yi = y0 as isize;

        let p00 = self.get_clamped(xi, yi);
        let p10 = self.get_clamped(xi + 1, yi);
        let p01 = self.get_clamped(xi, yi + 1);
        let p11 = self.get_clamped(xi + 1, yi + 1);

        let top = p00 + (p10 - p00) * fx;
        let bottom = p01 + (p11 - p01) * fx;
        top + (bottom - top) * fy
    }

    /// Gaussian blur (5-tap binomial) followed by 2x decimation.
    pub fn pyr_down(&self) -> LumaPlane {
        const KERNEL: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];

        let mut horizontal = vec![0.0f32; self.width * self.height];
        for y in 0..self.height {
            for x in 0..self.width {
                let mut acc = 0.0;
                for (k, weight) in KERNEL.iter().enumerate() {
                    acc += weight * self.get_clamped(x as isize + k as isize - 2, y as isize);
                }
                horizontal[y * self.width + x] = acc;
            }
        }
        let blurred = LumaPlane {
            width: self.width,
            height: self.height,
            data: horizontal,
        };

        let out_w = self.width.div_ceil(2);
        let out_h = self.height.div_ceil(2);
        LumaPlane::from_fn(out_w, out_h, |x, y| {
            let sx = (x * 2) as isize;
            let sy = (y * 2) as isize;
            KERNEL
                .iter()
                .enumerate()
                .map(|(k, weight)| weight * blurred.get_clamped(sx, sy + k as isize - 2))
                .sum()
        })
    }
}

// ----------------------------------------------------------------------------
// VideoInfo: stream metadata
// ----------------------------------------------------------------------------

/// Metadata reported by a frame source.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct VideoInfo {
    /// Reported frame rate. May be zero or negative when the container does not say.
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    /// Reported frame count, when the container carries one.
    pub frame_count: Option<u64>,
}

impl VideoInfo {
    /// Reported frame rate, or `FALLBACK_FPS` when the source reports `<= 0`.
    pub fn effective_fps(&self) -> f64 {
        if self.fps.is_finite() && self.fps > 0.0 {
            self.fps
        } else {
            FALLBACK_FPS
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rejects_short_buffer() {
        assert!(Frame::new(2, 2, vec![0u8; 11]).is_err());
        assert!(Frame::new(2, 2, vec![0u8; 12]).is_ok());
    }

    #[test]
    fn luma_uses_bt601_weights() -> Result<()> {
        let frame = Frame::new(2, 1, vec![255, 0, 0, 0, 0, 255])?;
        let luma = frame.to_luma();
        assert!((luma.get(0, 0) - 76.245).abs() < 1e-3);
        assert!((luma.get(1, 0) - 29.07).abs() < 1e-3);
        Ok(())
    }

    #[test]
    fn bilinear_sample_interpolates_between_pixels() -> Result<()> {
        let plane = LumaPlane::new(2, 1, vec![0.0, 100.0])?;
        assert!((plane.sample(0.25, 0.0) - 25.0).abs() < 1e-4);
        // Replicated border beyond the last column.
        assert!((plane.sample(5.0, 0.0) - 100.0).abs() < 1e-4);
        Ok(())
    }

    #[test]
    fn pyr_down_halves_dimensions_and_preserves_constant() {
        let plane = LumaPlane::from_fn(9, 6, |_, _| 42.0);
        let down = plane.pyr_down();
        assert_eq!((down.width(), down.height()), (5, 3));
        assert!(down.data().iter().all(|v| (v - 42.0).abs() < 1e-4));
    }

    #[test]
    fn effective_fps_falls_back_when_unreported() {
        let mut info = VideoInfo {
            fps: 0.0,
            width: 4,
            height: 4,
            frame_count: None,
        };
        assert_eq!(info.effective_fps(), FALLBACK_FPS);
        info.fps = 29.97;
        assert_eq!(info.effective_fps(), 29.97);
    }
}
