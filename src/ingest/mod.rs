//! Frame sources.
//!
//! This module provides the sources the stabilizer and comparator read from:
//! - Local video files (feature: ingest-file-ffmpeg)
//! - `stub://` synthetic clips (always available; testing and demos)
//! - In-memory frame lists (`MemorySource`)
//!
//! Every source yields RGB24 `Frame`s in presentation order and supports
//! rewinding to the first frame after a full forward read. The stabilizer
//! depends on that: its output pass re-reads the source from position 0.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod memory;
mod normalize;
pub mod synthetic;

use anyhow::Result;

use crate::frame::{Frame, VideoInfo};

pub use file::{FileConfig, FileSource};
pub use memory::MemorySource;
pub use normalize::{normalize_to_rgb, PixelFormat};
pub use synthetic::SyntheticClip;

/// Sequential, rewindable frame source.
pub trait FrameSource {
    /// Stream metadata. Available as soon as the source is open.
    fn info(&self) -> VideoInfo;

    /// Next frame, or `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Reposition at the first frame. Must succeed after a full forward read.
    fn rewind(&mut self) -> Result<()>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn info(&self) -> VideoInfo {
        (**self).info()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }

    fn rewind(&mut self) -> Result<()> {
        (**self).rewind()
    }
}

/// Open a local path or `stub://` URL as a frame source.
pub fn open_source(path: &str) -> Result<FileSource> {
    let mut source = FileSource::new(FileConfig {
        path: path.to_string(),
    })?;
    source.connect()?;
    Ok(source)
}
