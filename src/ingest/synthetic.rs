//! Synthetic `stub://` clips.
//!
//! A clip renders a fixed value-noise scene seen through a camera that pans at
//! a steady rate with an alternating horizontal jitter on top:
//!
//! `offset_x(i) = pan_x * i + jitter * (+1 on even frames, -1 on odd frames)`
//! `offset_y(i) = pan_y * i`
//!
//! Query parameters: `frames`, `width`, `height`, `fps`, `pan_x` (alias `pan`),
//! `pan_y`, `jitter`, `seed`. Example: `stub://shaky?frames=100&pan=1&jitter=5`.

use anyhow::{anyhow, Context, Result};

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::FrameSource;
use crate::frame::{Frame, VideoInfo};

/// Parameters of a synthetic clip.
#[derive(Clone, Debug, PartialEq)]
pub struct SyntheticClip {
    pub frames: usize,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub pan_x: f64,
    pub pan_y: f64,
    pub jitter: f64,
    pub seed: u64,
}

impl Default for SyntheticClip {
    fn default() -> Self {
        Self {
            frames: 100,
            width: 160,
            height: 120,
            fps: 30.0,
            pan_x: 1.0,
            pan_y: 0.0,
            jitter: 5.0,
            seed: 7,
        }
    }
}

impl SyntheticClip {
    /// Parse a `stub://` URL. Unknown keys are rejected.
    pub fn from_url(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("stub://")
            .ok_or_else(|| anyhow!("synthetic clips use the stub:// scheme: {}", url))?;
        let mut clip = Self::default();
        let Some((_, query)) = rest.split_once('?') else {
            return Ok(clip);
        };
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("malformed stub parameter '{}'", pair))?;
            let context = || format!("invalid value for stub parameter '{}': {}", key, value);
            match key {
                "frames" => clip.frames = value.parse().with_context(context)?,
                "width" => clip.width = value.parse().with_context(context)?,
                "height" => clip.height = value.parse().with_context(context)?,
                "fps" => clip.fps = value.parse().with_context(context)?,
                "pan" | "pan_x" => clip.pan_x = value.parse().with_context(context)?,
                "pan_y" => clip.pan_y = value.parse().with_context(context)?,
                "jitter" => clip.jitter = value.parse().with_context(context)?,
                "seed" => clip.seed = value.parse().with_context(context)?,
                other => return Err(anyhow!("unknown stub parameter '{}'", other)),
            }
        }
        if clip.width == 0 || clip.height == 0 {
            return Err(anyhow!("stub clip dimensions must be non-zero"));
        }
        Ok(clip)
    }

    /// Camera offset of frame `index`.
    pub fn offset(&self, index: usize) -> (f64, f64) {
        let sign = if index % 2 == 0 { 1.0 } else { -1.0 };
        (
            self.pan_x * index as f64 + self.jitter * sign,
            self.pan_y * index as f64,
        )
    }

    /// True relative motion between frames `index` and `index + 1`.
    pub fn true_motion(&self, index: usize) -> (f64, f64) {
        let (x0, y0) = self.offset(index);
        let (x1, y1) = self.offset(index + 1);
        (x1 - x0, y1 - y0)
    }

    pub fn info(&self) -> VideoInfo {
        VideoInfo {
            fps: self.fps,
            width: self.width,
            height: self.height,
            frame_count: Some(self.frames as u64),
        }
    }

    /// Render frame `index`; scene content moves by `offset(index)`.
    pub fn render(&self, index: usize) -> Result<Frame> {
        let (ox, oy) = self.offset(index);
        let mut gray = Vec::with_capacity(self.width as usize * self.height as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                let v = scene_value(x as f64 - ox, y as f64 - oy, self.seed);
                gray.push(v.round().clamp(0.0, 255.0) as u8);
            }
        }
        let rgb = normalize_to_rgb(&gray, self.width, self.height, PixelFormat::Gray8)?;
        Frame::new(self.width, self.height, rgb)
    }
}

/// Two octaves of smooth value noise, 0..255.
fn scene_value(x: f64, y: f64, seed: u64) -> f64 {
    let coarse = value_noise(x / 16.0, y / 16.0, seed);
    let fine = value_noise(x / 6.0, y / 6.0, seed.wrapping_add(1));
    255.0 * (0.6 * coarse + 0.4 * fine)
}

fn value_noise(x: f64, y: f64, seed: u64) -> f64 {
    let x0 = x.floor();
    let y0 = y.floor();
    let tx = smoothstep(x - x0);
    let ty = smoothstep(y - y0);
    let (ix, iy) = (x0 as i64, y0 as i64);

    let v00 = lattice(ix, iy, seed);
    let v10 = lattice(ix + 1, iy, seed);
    let v01 = lattice(ix, iy + 1, seed);
    let v11 = lattice(ix + 1, iy + 1, seed);

    let top = v00 + (v10 - v00) * tx;
    let bottom = v01 + (v11 - v01) * tx;
    top + (bottom - top) * ty
}

fn smoothstep(t: f64) -> f64 {
    t * t * (3.0 - 2.0 * t)
}

/// Deterministic lattice value in `[0, 1)` (splitmix64 of the cell coordinates).
fn lattice(ix: i64, iy: i64, seed: u64) -> f64 {
    let mut z = seed
        ^ (ix as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (iy as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    (z >> 11) as f64 / (1u64 << 53) as f64
}

/// Frame source that renders a `SyntheticClip` on demand.
pub struct SyntheticSource {
    clip: SyntheticClip,
    position: usize,
}

impl SyntheticSource {
    pub fn new(clip: SyntheticClip) -> Self {
        Self { clip, position: 0 }
    }

    pub fn clip(&self) -> &SyntheticClip {
        &self.clip
    }

    pub fn frames_served(&self) -> usize {
        self.position
    }
}

impl FrameSource for SyntheticSource {
    fn info(&self) -> VideoInfo {
        self.clip.info()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.position >= self.clip.frames {
            return Ok(None);
        }
        let frame = self.clip.render(self.position)?;
        self.position += 1;
        Ok(Some(frame))
    }

    fn rewind(&mut self) -> Result<()> {
        self.position = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_query_parameters() -> Result<()> {
        let clip = SyntheticClip::from_url("stub://shaky?frames=12&width=32&height=24&pan=2&jitter=0.5")?;
        assert_eq!(clip.frames, 12);
        assert_eq!((clip.width, clip.height), (32, 24));
        assert_eq!(clip.pan_x, 2.0);
        assert_eq!(clip.jitter, 0.5);
        Ok(())
    }

    #[test]
    fn rejects_unknown_parameters() {
        assert!(SyntheticClip::from_url("stub://x?zoom=2").is_err());
        assert!(SyntheticClip::from_url("stub://x?frames=abc").is_err());
        assert!(SyntheticClip::from_url("file.mp4").is_err());
    }

    #[test]
    fn offsets_alternate_around_steady_pan() {
        let clip = SyntheticClip::default();
        assert_eq!(clip.offset(0), (5.0, 0.0));
        assert_eq!(clip.offset(1), (-4.0, 0.0));
        assert_eq!(clip.offset(2), (7.0, 0.0));
        assert_eq!(clip.true_motion(0), (-9.0, 0.0));
        assert_eq!(clip.true_motion(1), (11.0, 0.0));
    }

    #[test]
    fn integer_offsets_shift_content_exactly() -> Result<()> {
        let clip = SyntheticClip {
            frames: 2,
            width: 40,
            height: 30,
            pan_x: 3.0,
            jitter: 0.0,
            ..SyntheticClip::default()
        };
        let a = clip.render(0)?;
        let b = clip.render(1)?;
        for y in 0..30 {
            for x in 0..37 {
                assert_eq!(a.pixel(x, y), b.pixel(x + 3, y));
            }
        }
        Ok(())
    }

    #[test]
    fn source_rewinds() -> Result<()> {
        let mut source = SyntheticSource::new(SyntheticClip::from_url("stub://x?frames=3&width=8&height=8")?);
        let first = source.next_frame()?;
        while source.next_frame()?.is_some() {}
        assert_eq!(source.frames_served(), 3);
        source.rewind()?;
        assert_eq!(source.next_frame()?, first);
        Ok(())
    }
}
