//! Local file frame source.
//!
//! `FileSource` opens either a local video file (decoded in-memory with FFmpeg,
//! feature `ingest-file-ffmpeg`) or a `stub://` synthetic clip. Remote URL
//! schemes are rejected.

use anyhow::{anyhow, Result};

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::synthetic::{SyntheticClip, SyntheticSource};
use super::FrameSource;
use crate::frame::{Frame, VideoInfo};

/// Configuration for a local file source.
#[derive(Clone, Debug, Default)]
pub struct FileConfig {
    /// Local file path (e.g., "clips/handheld.mp4") or `stub://` URL.
    pub path: String,
}

/// Local file frame source.
pub struct FileSource {
    backend: FileBackend,
    frames_read: u64,
    passes: u32,
}

enum FileBackend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    pub fn new(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes): '{}'",
                config.path
            ));
        }
        let backend = if config.path.starts_with("stub://") {
            FileBackend::Synthetic(SyntheticSource::new(SyntheticClip::from_url(&config.path)?))
        } else {
            #[cfg(feature = "ingest-file-ffmpeg")]
            {
                FileBackend::Ffmpeg(FfmpegFileSource::new(config)?)
            }
            #[cfg(not(feature = "ingest-file-ffmpeg"))]
            {
                return Err(anyhow!(
                    "cannot open '{}': file decoding requires the ingest-file-ffmpeg feature",
                    config.path
                ));
            }
        };
        Ok(Self {
            backend,
            frames_read: 0,
            passes: 1,
        })
    }

    /// Log the opened stream.
    pub fn connect(&mut self) -> Result<()> {
        let info = self.info();
        match &self.backend {
            FileBackend::Synthetic(source) => {
                log::info!(
                    "FileSource: opened synthetic clip ({} frames, pan=({}, {}), jitter={})",
                    source.clip().frames,
                    source.clip().pan_x,
                    source.clip().pan_y,
                    source.clip().jitter
                );
            }
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.connect()?,
        }
        log::info!(
            "video info: {}x{} @{:.3} fps, {} frames",
            info.width,
            info.height,
            info.fps,
            info.frame_count
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        );
        Ok(())
    }

    /// Get frame statistics.
    pub fn stats(&self) -> FileStats {
        FileStats {
            frames_read: self.frames_read,
            passes: self.passes,
        }
    }
}

impl FrameSource for FileSource {
    fn info(&self) -> VideoInfo {
        match &self.backend {
            FileBackend::Synthetic(source) => source.info(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.info(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let frame = match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame()?,
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame()?,
        };
        if frame.is_some() {
            self.frames_read += 1;
        }
        Ok(frame)
    }

    fn rewind(&mut self) -> Result<()> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.rewind()?,
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.rewind()?,
        }
        self.passes += 1;
        Ok(())
    }
}

/// Statistics for a file source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileStats {
    /// Frames decoded across all passes.
    pub frames_read: u64,
    /// Forward passes started (1 + number of rewinds).
    pub passes: u32,
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}
