//! Frame sinks.
//!
//! The stabilizer and comparator hand finished RGB24 frames to a `FrameSink`.
//! Two implementations exist:
//! - `AviWriter`: RIFF AVI container with MJPG or uncompressed ("DIB ") video
//! - `MemorySink`: collects frames in memory (tests, embedding)

pub mod avi;

use std::fmt;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};

use crate::frame::Frame;

pub use avi::{AviParams, AviWriter};

/// Destination for output frames.
pub trait FrameSink {
    /// Append one frame. All frames must share the sink's dimensions.
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Flush and finalize the output. Further writes are rejected.
    fn finish(&mut self) -> Result<()>;
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        (**self).write_frame(frame)
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }
}

/// Video codecs the AVI writer can produce.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Codec {
    /// Motion JPEG; every frame is an independent JPEG image.
    #[default]
    Mjpg,
    /// Uncompressed bottom-up BGR24.
    Dib,
}

impl Codec {
    /// Parse a four-character code such as `"MJPG"`.
    pub fn from_fourcc(code: &str) -> Result<Self> {
        if code.len() != 4 || !code.is_ascii() {
            return Err(anyhow!(
                "codec fourcc must be exactly four ASCII characters, got '{}'",
                code
            ));
        }
        match code.to_ascii_uppercase().as_str() {
            "MJPG" => Ok(Codec::Mjpg),
            "DIB " => Ok(Codec::Dib),
            _ => Err(anyhow!(
                "unsupported codec '{}' (supported: \"MJPG\", \"DIB \")",
                code
            )),
        }
    }

    pub fn fourcc(self) -> [u8; 4] {
        match self {
            Codec::Mjpg => *b"MJPG",
            Codec::Dib => *b"DIB ",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Codec::Mjpg => "MJPG",
            Codec::Dib => "DIB ",
        }
    }

    /// Chunk id of video data in the `movi` list: compressed vs. uncompressed.
    pub(crate) fn chunk_id(self) -> [u8; 4] {
        match self {
            Codec::Mjpg => *b"00dc",
            Codec::Dib => *b"00db",
        }
    }
}

impl FromStr for Codec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Codec::from_fourcc(s)
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Create `path` and open an AVI writer on it.
pub fn open_avi(
    path: &Path,
    codec: Codec,
    fps: f64,
    width: u32,
    height: u32,
) -> Result<AviWriter<BufWriter<File>>> {
    let file = File::create(path)
        .with_context(|| format!("failed to create output video {}", path.display()))?;
    let writer = AviWriter::new(
        BufWriter::new(file),
        AviParams {
            codec,
            fps,
            width,
            height,
            ..AviParams::default()
        },
    )
    .with_context(|| format!("failed to open output video {}", path.display()))?;
    log::info!(
        "writing {} ({}x{} @{:.3} fps, {})",
        path.display(),
        width,
        height,
        fps,
        codec
    );
    Ok(writer)
}

/// Sink that keeps every frame in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    frames: Vec<Frame>,
    finished: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl FrameSink for MemorySink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if self.finished {
            return Err(anyhow!("memory sink already finished"));
        }
        if let Some(first) = self.frames.first() {
            if first.dimensions() != frame.dimensions() {
                return Err(anyhow!(
                    "frame is {}x{}, sink expects {}x{}",
                    frame.width(),
                    frame.height(),
                    first.width(),
                    first.height()
                ));
            }
        }
        self.frames.push(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_fourccs() -> Result<()> {
        assert_eq!(Codec::from_fourcc("MJPG")?, Codec::Mjpg);
        assert_eq!(Codec::from_fourcc("mjpg")?, Codec::Mjpg);
        assert_eq!("DIB ".parse::<Codec>()?, Codec::Dib);
        Ok(())
    }

    #[test]
    fn rejects_bad_fourccs() {
        assert!(Codec::from_fourcc("MJPEG").is_err());
        assert!(Codec::from_fourcc("XVID").is_err());
        assert!(Codec::from_fourcc("").is_err());
    }

    #[test]
    fn memory_sink_enforces_dimensions_and_finish() -> Result<()> {
        let mut sink = MemorySink::new();
        sink.write_frame(&Frame::black(4, 4))?;
        assert!(sink.write_frame(&Frame::black(5, 4)).is_err());
        sink.finish()?;
        assert!(sink.is_finished());
        assert!(sink.write_frame(&Frame::black(4, 4)).is_err());
        assert_eq!(sink.frames().len(), 1);
        Ok(())
    }
}
