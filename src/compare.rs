//! Side-by-side before/after compositor.
//!
//! Each output canvas is `2 * W + GAP_PX` wide and `H` tall: the primary frame
//! on the left, the secondary on the right, a black gap between. `W x H` comes
//! from the primary stream. A secondary frame of another size is resized to
//! `W x H`; a missing or exhausted secondary stream is replaced by the primary
//! frame itself.

use anyhow::Result;
use image::imageops::{self, FilterType};
use serde::Serialize;

use crate::frame::{Frame, VideoInfo};
use crate::ingest::FrameSource;
use crate::sink::FrameSink;

/// Width of the black separator between the two halves.
pub const GAP_PX: u32 = 10;

/// Canvas size for `width x height` inputs.
pub fn canvas_dimensions(width: u32, height: u32) -> (u32, u32) {
    (2 * width + GAP_PX, height)
}

/// Bilinear resize.
pub fn resize(frame: &Frame, width: u32, height: u32) -> Result<Frame> {
    if frame.dimensions() == (width, height) {
        return Ok(frame.clone());
    }
    let img = frame.to_rgb_image()?;
    let resized = imageops::resize(&img, width, height, FilterType::Triangle);
    Ok(Frame::from_rgb_image(resized))
}

/// Place `left` and `right` side by side. `right` is resized to `left`'s size
/// when they differ.
pub fn compose_side_by_side(left: &Frame, right: &Frame) -> Result<Frame> {
    let (width, height) = left.dimensions();
    let resized;
    let right = if right.dimensions() == (width, height) {
        right
    } else {
        resized = resize(right, width, height)?;
        &resized
    };
    let (canvas_w, canvas_h) = canvas_dimensions(width, height);
    let mut canvas = Frame::black(canvas_w, canvas_h);

    let half = width as usize * 3;
    let right_start = (width + GAP_PX) as usize * 3;
    for y in 0..height {
        let row = canvas.row_mut(y);
        row[..half].copy_from_slice(left.row(y));
        row[right_start..right_start + half].copy_from_slice(right.row(y));
    }
    Ok(canvas)
}

/// Counters reported after a comparison run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CompareSummary {
    pub frames_written: usize,
    /// Canvases whose right half repeats the primary frame.
    pub duplicated: usize,
    /// Canvases whose secondary frame was resized.
    pub resized: usize,
}

/// Reads a primary and an optional secondary stream in lockstep.
pub struct Compositor<P, S> {
    primary: P,
    secondary: Option<S>,
}

impl<P: FrameSource, S: FrameSource> Compositor<P, S> {
    pub fn new(primary: P, secondary: Option<S>) -> Self {
        if secondary.is_none() {
            log::warn!("no secondary video; right half will repeat the original");
        }
        Self { primary, secondary }
    }

    /// Metadata of the composed stream.
    pub fn output_info(&self) -> VideoInfo {
        let info = self.primary.info();
        let (width, height) = canvas_dimensions(info.width, info.height);
        VideoInfo {
            fps: info.effective_fps(),
            width,
            height,
            frame_count: info.frame_count,
        }
    }

    fn next_secondary(&mut self) -> Option<Frame> {
        let source = self.secondary.as_mut()?;
        match source.next_frame() {
            Ok(Some(frame)) => Some(frame),
            Ok(None) => {
                log::info!("secondary video exhausted; repeating the original from here on");
                self.secondary = None;
                None
            }
            Err(err) => {
                log::warn!("secondary video read failed, repeating the original: {:#}", err);
                self.secondary = None;
                None
            }
        }
    }

    /// Write one canvas per primary frame into `sink`, then finish it.
    pub fn run(
        &mut self,
        sink: &mut dyn FrameSink,
        mut progress: impl FnMut(usize),
    ) -> Result<CompareSummary> {
        let mut summary = CompareSummary::default();
        while let Some(primary) = self.primary.next_frame()? {
            let canvas = match self.next_secondary() {
                Some(secondary) => {
                    if secondary.dimensions() != primary.dimensions() {
                        summary.resized += 1;
                    }
                    compose_side_by_side(&primary, &secondary)?
                }
                None => {
                    summary.duplicated += 1;
                    compose_side_by_side(&primary, &primary)?
                }
            };
            sink.write_frame(&canvas)?;
            summary.frames_written += 1;
            progress(summary.frames_written);
        }
        if summary.frames_written == 0 {
            log::warn!("original video yielded no frames");
        }
        sink.finish()?;
        log::info!(
            "comparison done: {} frames ({} duplicated, {} resized)",
            summary.frames_written,
            summary.duplicated,
            summary.resized
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canvas_adds_gap() {
        assert_eq!(canvas_dimensions(640, 480), (1290, 480));
    }

    #[test]
    fn halves_and_gap_are_placed() -> Result<()> {
        let left = Frame::filled(3, 2, [200, 10, 10]);
        let right = Frame::filled(3, 2, [10, 10, 200]);
        let canvas = compose_side_by_side(&left, &right)?;
        assert_eq!(canvas.dimensions(), (16, 2));
        for y in 0..2 {
            for x in 0..3 {
                assert_eq!(canvas.pixel(x, y), Some([200, 10, 10]));
                assert_eq!(canvas.pixel(x + 13, y), Some([10, 10, 200]));
            }
            for x in 3..13 {
                assert_eq!(canvas.pixel(x, y), Some([0, 0, 0]));
            }
        }
        Ok(())
    }

    #[test]
    fn mismatched_secondary_is_resized() -> Result<()> {
        let left = Frame::filled(4, 4, [1, 1, 1]);
        let right = Frame::filled(8, 2, [50, 60, 70]);
        let canvas = compose_side_by_side(&left, &right)?;
        assert_eq!(canvas.dimensions(), (18, 4));
        assert_eq!(canvas.pixel(14, 3), Some([50, 60, 70]));
        Ok(())
    }
}
