//! In-memory frame source.

use anyhow::{anyhow, Result};

use super::FrameSource;
use crate::frame::{Frame, VideoInfo};

/// Rewindable source over a fixed list of frames.
pub struct MemorySource {
    frames: Vec<Frame>,
    fps: f64,
    position: usize,
    /// Frames served per pass, when simulating a source that shrinks between passes.
    limit_after_rewind: Option<usize>,
    rewound: bool,
}

impl MemorySource {
    /// All frames must share the dimensions of the first one.
    pub fn new(frames: Vec<Frame>, fps: f64) -> Result<Self> {
        if let Some(first) = frames.first() {
            let dims = first.dimensions();
            if let Some((i, bad)) = frames.iter().enumerate().find(|(_, f)| f.dimensions() != dims) {
                return Err(anyhow!(
                    "frame {} is {}x{}, expected {}x{}",
                    i,
                    bad.width(),
                    bad.height(),
                    dims.0,
                    dims.1
                ));
            }
        }
        Ok(Self {
            frames,
            fps,
            position: 0,
            limit_after_rewind: None,
            rewound: false,
        })
    }

    /// Serve at most `frames` frames on every pass after the first rewind.
    pub fn truncate_after_rewind(mut self, frames: usize) -> Self {
        self.limit_after_rewind = Some(frames);
        self
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn available(&self) -> usize {
        match (self.rewound, self.limit_after_rewind) {
            (true, Some(limit)) => limit.min(self.frames.len()),
            _ => self.frames.len(),
        }
    }
}

impl FrameSource for MemorySource {
    fn info(&self) -> VideoInfo {
        let (width, height) = self
            .frames
            .first()
            .map(Frame::dimensions)
            .unwrap_or((0, 0));
        VideoInfo {
            fps: self.fps,
            width,
            height,
            frame_count: Some(self.frames.len() as u64),
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.position >= self.available() {
            return Ok(None);
        }
        let frame = self.frames[self.position].clone();
        self.position += 1;
        Ok(Some(frame))
    }

    fn rewind(&mut self) -> Result<()> {
        self.position = 0;
        self.rewound = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_after_rewind() -> Result<()> {
        let frames = vec![Frame::filled(2, 2, [1, 2, 3]), Frame::filled(2, 2, [4, 5, 6])];
        let mut source = MemorySource::new(frames, 30.0)?;
        assert_eq!(source.info().frame_count, Some(2));
        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame()?.is_none());
        source.rewind()?;
        assert_eq!(source.next_frame()?.and_then(|f| f.pixel(0, 0)), Some([1, 2, 3]));
        Ok(())
    }

    #[test]
    fn truncation_applies_only_after_rewind() -> Result<()> {
        let frames = vec![Frame::black(1, 1); 5];
        let mut source = MemorySource::new(frames, 30.0)?.truncate_after_rewind(2);
        let mut first_pass = 0;
        while source.next_frame()?.is_some() {
            first_pass += 1;
        }
        source.rewind()?;
        let mut second_pass = 0;
        while source.next_frame()?.is_some() {
            second_pass += 1;
        }
        assert_eq!((first_pass, second_pass), (5, 2));
        Ok(())
    }

    #[test]
    fn rejects_mixed_dimensions() {
        let frames = vec![Frame::black(2, 2), Frame::black(3, 2)];
        assert!(MemorySource::new(frames, 30.0).is_err());
    }
}
