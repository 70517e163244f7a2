//! RIFF AVI writer.
//!
//! Layout produced (one video stream, AVI 1.0 with a legacy `idx1` index):
//!
//! ```text
//! RIFF 'AVI '
//!   LIST 'hdrl'
//!     'avih' MainAVIHeader
//!     LIST 'strl'
//!       'strh' AVIStreamHeader ('vids')
//!       'strf' BITMAPINFOHEADER
//!   LIST 'movi'
//!     '00dc' | '00db' frame chunks, padded to even length
//!   'idx1' one keyframe entry per chunk, offsets relative to the 'movi' fourcc
//! ```
//!
//! Frame counts and sizes are unknown until the end, so `finish` patches them
//! into the fixed-size header.

use std::io::{Seek, SeekFrom, Write};

use anyhow::{anyhow, Context, Result};

use super::{Codec, FrameSink};
use crate::frame::Frame;

pub const DEFAULT_JPEG_QUALITY: u8 = 95;

const AVIF_HASINDEX: u32 = 0x10;
const AVIIF_KEYFRAME: u32 = 0x10;
const BI_RGB: u32 = 0;

const HEADER_LEN: usize = 224;
const HDRL_LIST_SIZE: u32 = 192;
const STRL_LIST_SIZE: u32 = 116;

// Patched fields, relative to the start of the RIFF chunk.
const RIFF_SIZE_OFFSET: u64 = 4;
const AVIH_MAX_BYTES_PER_SEC_OFFSET: u64 = 36;
const AVIH_TOTAL_FRAMES_OFFSET: u64 = 48;
const AVIH_SUGGESTED_BUFFER_OFFSET: u64 = 60;
const STRH_LENGTH_OFFSET: u64 = 140;
const STRH_SUGGESTED_BUFFER_OFFSET: u64 = 144;
const MOVI_SIZE_OFFSET: u64 = 216;

/// Output stream parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct AviParams {
    pub codec: Codec,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    /// JPEG quality (1..=100) for `Codec::Mjpg`.
    pub jpeg_quality: u8,
}

impl Default for AviParams {
    fn default() -> Self {
        Self {
            codec: Codec::Mjpg,
            fps: 25.0,
            width: 0,
            height: 0,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

struct IndexEntry {
    offset: u32,
    size: u32,
}

/// Streaming AVI writer over any seekable byte sink.
pub struct AviWriter<W: Write + Seek> {
    writer: W,
    params: AviParams,
    base: u64,
    index: Vec<IndexEntry>,
    /// Bytes written after the 'movi' fourcc.
    movi_len: u64,
    max_chunk: u32,
    finished: bool,
    scratch: Vec<u8>,
}

impl<W: Write + Seek> AviWriter<W> {
    /// Write the container header and prepare for frames.
    pub fn new(mut writer: W, params: AviParams) -> Result<Self> {
        if params.width == 0 || params.height == 0 {
            return Err(anyhow!(
                "output dimensions must be non-zero, got {}x{}",
                params.width,
                params.height
            ));
        }
        if i32::try_from(params.width).is_err() || i32::try_from(params.height).is_err() {
            return Err(anyhow!("output dimensions too large for AVI"));
        }
        if !(params.fps.is_finite() && params.fps > 0.0) {
            return Err(anyhow!("output frame rate must be positive, got {}", params.fps));
        }
        if !(1..=100).contains(&params.jpeg_quality) {
            return Err(anyhow!("JPEG quality must be in 1..=100"));
        }

        let base = writer.stream_position().context("query output position")?;
        let header = build_header(&params)?;
        writer.write_all(&header).context("write AVI header")?;

        Ok(Self {
            writer,
            params,
            base,
            index: Vec::new(),
            movi_len: 0,
            max_chunk: 0,
            finished: false,
            scratch: Vec::new(),
        })
    }

    pub fn params(&self) -> &AviParams {
        &self.params
    }

    pub fn frames_written(&self) -> usize {
        self.index.len()
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    fn encode(&mut self, frame: &Frame) -> Result<()> {
        self.scratch.clear();
        match self.params.codec {
            Codec::Mjpg => {
                let img = frame.to_rgb_image()?;
                let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
                    &mut self.scratch,
                    self.params.jpeg_quality,
                );
                img.write_with_encoder(encoder)
                    .context("JPEG-encode frame")?;
            }
            Codec::Dib => {
                let row_len = frame.width() as usize * 3;
                let padded = (row_len + 3) & !3;
                self.scratch.reserve(padded * frame.height() as usize);
                for y in (0..frame.height()).rev() {
                    for px in frame.row(y).chunks_exact(3) {
                        self.scratch.extend_from_slice(&[px[2], px[1], px[0]]);
                    }
                    self.scratch.resize(self.scratch.len() + padded - row_len, 0);
                }
            }
        }
        Ok(())
    }

    fn patch_u32(&mut self, offset: u64, value: u32) -> Result<()> {
        self.writer
            .seek(SeekFrom::Start(self.base + offset))
            .context("seek in output video")?;
        self.writer
            .write_all(&value.to_le_bytes())
            .context("patch AVI header")?;
        Ok(())
    }
}

impl<W: Write + Seek> FrameSink for AviWriter<W> {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if self.finished {
            return Err(anyhow!("AVI writer already finished"));
        }
        if frame.dimensions() != (self.params.width, self.params.height) {
            return Err(anyhow!(
                "frame is {}x{}, output video is {}x{}",
                frame.width(),
                frame.height(),
                self.params.width,
                self.params.height
            ));
        }
        self.encode(frame)?;

        let size = u32::try_from(self.scratch.len()).context("frame chunk exceeds 4 GiB")?;
        let offset = u32::try_from(4 + self.movi_len).context("AVI file exceeds 4 GiB")?;
        let mut chunk_header = [0u8; 8];
        chunk_header[..4].copy_from_slice(&self.params.codec.chunk_id());
        chunk_header[4..].copy_from_slice(&size.to_le_bytes());
        self.writer
            .write_all(&chunk_header)
            .context("write frame chunk header")?;
        self.writer
            .write_all(&self.scratch)
            .context("write frame chunk")?;
        let mut chunk_len = 8 + u64::from(size);
        if size % 2 == 1 {
            self.writer.write_all(&[0]).context("write chunk padding")?;
            chunk_len += 1;
        }

        self.movi_len += chunk_len;
        self.max_chunk = self.max_chunk.max(size);
        self.index.push(IndexEntry { offset, size });
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        let chunk_id = self.params.codec.chunk_id();
        let idx_len = u32::try_from(self.index.len() * 16).context("AVI index exceeds 4 GiB")?;
        let mut idx = Vec::with_capacity(8 + idx_len as usize);
        idx.extend_from_slice(b"idx1");
        idx.extend_from_slice(&idx_len.to_le_bytes());
        for entry in &self.index {
            idx.extend_from_slice(&chunk_id);
            idx.extend_from_slice(&AVIIF_KEYFRAME.to_le_bytes());
            idx.extend_from_slice(&entry.offset.to_le_bytes());
            idx.extend_from_slice(&entry.size.to_le_bytes());
        }
        self.writer.write_all(&idx).context("write AVI index")?;

        let end = self.writer.stream_position().context("query output position")?;
        let riff_size = u32::try_from(end - self.base - 8).context("AVI file exceeds 4 GiB")?;
        let movi_size = u32::try_from(4 + self.movi_len).context("AVI file exceeds 4 GiB")?;
        let frames = u32::try_from(self.index.len()).context("too many frames for AVI")?;
        let max_bytes_per_sec =
            (f64::from(self.max_chunk) * self.params.fps).ceil().min(f64::from(u32::MAX)) as u32;
        let suggested = self.max_chunk + 8;

        self.patch_u32(RIFF_SIZE_OFFSET, riff_size)?;
        self.patch_u32(AVIH_MAX_BYTES_PER_SEC_OFFSET, max_bytes_per_sec)?;
        self.patch_u32(AVIH_TOTAL_FRAMES_OFFSET, frames)?;
        self.patch_u32(AVIH_SUGGESTED_BUFFER_OFFSET, suggested)?;
        self.patch_u32(STRH_LENGTH_OFFSET, frames)?;
        self.patch_u32(STRH_SUGGESTED_BUFFER_OFFSET, suggested)?;
        self.patch_u32(MOVI_SIZE_OFFSET, movi_size)?;
        self.writer
            .seek(SeekFrom::Start(end))
            .context("seek in output video")?;
        self.writer.flush().context("flush output video")?;

        log::debug!("AVI finalized: {} frames, {} bytes", frames, riff_size + 8);
        Ok(())
    }
}

impl<W: Write + Seek> Drop for AviWriter<W> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(err) = self.finish() {
                log::warn!("failed to finalize AVI output: {:#}", err);
            }
        }
    }
}

/// Frame rate as an AVI `rate / scale` pair.
pub fn rate_and_scale(fps: f64) -> (u32, u32) {
    let scale = 1000u64;
    let rate = ((fps * scale as f64).round() as u64).max(1);
    let divisor = gcd(rate, scale);
    let rate = (rate / divisor).min(u64::from(u32::MAX)) as u32;
    (rate, (scale / divisor) as u32)
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn build_header(params: &AviParams) -> Result<Vec<u8>> {
    let (rate, scale) = rate_and_scale(params.fps);
    let micros_per_frame = (1_000_000.0 / params.fps).round().min(f64::from(u32::MAX)) as u32;
    let width = params.width;
    let height = params.height;
    let frame_bytes = match params.codec {
        Codec::Mjpg => 0,
        Codec::Dib => {
            let padded = (u64::from(width) * 3 + 3) & !3;
            u32::try_from(padded * u64::from(height)).context("frame too large for AVI")?
        }
    };
    let rect_w = i16::try_from(width).unwrap_or(i16::MAX);
    let rect_h = i16::try_from(height).unwrap_or(i16::MAX);

    let mut h = Vec::with_capacity(HEADER_LEN);
    h.extend_from_slice(b"RIFF");
    put_u32(&mut h, 0);
    h.extend_from_slice(b"AVI ");

    h.extend_from_slice(b"LIST");
    put_u32(&mut h, HDRL_LIST_SIZE);
    h.extend_from_slice(b"hdrl");

    h.extend_from_slice(b"avih");
    put_u32(&mut h, 56);
    put_u32(&mut h, micros_per_frame);
    put_u32(&mut h, 0); // max bytes per second
    put_u32(&mut h, 0); // padding granularity
    put_u32(&mut h, AVIF_HASINDEX);
    put_u32(&mut h, 0); // total frames
    put_u32(&mut h, 0); // initial frames
    put_u32(&mut h, 1); // streams
    put_u32(&mut h, frame_bytes);
    put_u32(&mut h, width);
    put_u32(&mut h, height);
    h.extend_from_slice(&[0u8; 16]);

    h.extend_from_slice(b"LIST");
    put_u32(&mut h, STRL_LIST_SIZE);
    h.extend_from_slice(b"strl");

    h.extend_from_slice(b"strh");
    put_u32(&mut h, 56);
    h.extend_from_slice(b"vids");
    h.extend_from_slice(&params.codec.fourcc());
    put_u32(&mut h, 0); // flags
    h.extend_from_slice(&0u16.to_le_bytes()); // priority
    h.extend_from_slice(&0u16.to_le_bytes()); // language
    put_u32(&mut h, 0); // initial frames
    put_u32(&mut h, scale);
    put_u32(&mut h, rate);
    put_u32(&mut h, 0); // start
    put_u32(&mut h, 0); // length
    put_u32(&mut h, frame_bytes);
    put_u32(&mut h, u32::MAX); // quality: default
    put_u32(&mut h, 0); // sample size
    for v in [0i16, 0, rect_w, rect_h] {
        h.extend_from_slice(&v.to_le_bytes());
    }

    h.extend_from_slice(b"strf");
    put_u32(&mut h, 40);
    put_u32(&mut h, 40);
    h.extend_from_slice(&(width as i32).to_le_bytes());
    h.extend_from_slice(&(height as i32).to_le_bytes());
    h.extend_from_slice(&1u16.to_le_bytes());
    h.extend_from_slice(&24u16.to_le_bytes());
    match params.codec {
        Codec::Mjpg => h.extend_from_slice(&params.codec.fourcc()),
        Codec::Dib => put_u32(&mut h, BI_RGB),
    }
    put_u32(&mut h, frame_bytes);
    h.extend_from_slice(&[0u8; 16]);

    h.extend_from_slice(b"LIST");
    put_u32(&mut h, 4);
    h.extend_from_slice(b"movi");

    debug_assert_eq!(h.len(), HEADER_LEN);
    Ok(h)
}

fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn u32_at(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ])
    }

    #[test]
    fn rate_and_scale_reduce() {
        assert_eq!(rate_and_scale(30.0), (30, 1));
        assert_eq!(rate_and_scale(25.0), (25, 1));
        assert_eq!(rate_and_scale(29.97), (2997, 100));
        assert_eq!(rate_and_scale(12.5), (25, 2));
    }

    #[test]
    fn header_has_fixed_layout() -> Result<()> {
        let header = build_header(&AviParams {
            width: 64,
            height: 48,
            fps: 30.0,
            ..AviParams::default()
        })?;
        assert_eq!(header.len(), HEADER_LEN);
        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(&header[8..12], b"AVI ");
        assert_eq!(&header[24..28], b"avih");
        assert_eq!(u32_at(&header, 32), 33_333);
        assert_eq!(u32_at(&header, 64), 64);
        assert_eq!(u32_at(&header, 68), 48);
        assert_eq!(&header[100..104], b"strh");
        assert_eq!(&header[112..116], b"MJPG");
        assert_eq!(&header[164..168], b"strf");
        assert_eq!(&header[188..192], b"MJPG");
        assert_eq!(&header[212..216], b"LIST");
        assert_eq!(&header[220..224], b"movi");
        Ok(())
    }

    #[test]
    fn dib_chunks_are_bottom_up_bgr_with_padding() -> Result<()> {
        let frame = Frame::new(1, 2, vec![10, 20, 30, 40, 50, 60])?;
        let mut writer = AviWriter::new(
            Cursor::new(Vec::new()),
            AviParams {
                codec: Codec::Dib,
                width: 1,
                height: 2,
                ..AviParams::default()
            },
        )?;
        writer.write_frame(&frame)?;
        writer.finish()?;

        let bytes = writer.get_ref().get_ref();
        assert_eq!(&bytes[224..228], b"00db");
        assert_eq!(u32_at(bytes, 228), 8);
        assert_eq!(&bytes[232..240], &[60, 50, 40, 0, 30, 20, 10, 0]);
        assert_eq!(&bytes[240..244], b"idx1");
        assert_eq!(u32_at(bytes, 248 + 8), 4);
        assert_eq!(u32_at(bytes, 4) as usize, bytes.len() - 8);
        assert_eq!(u32_at(bytes, AVIH_TOTAL_FRAMES_OFFSET as usize), 1);
        Ok(())
    }

    #[test]
    fn rejects_wrong_dimensions_and_late_writes() -> Result<()> {
        let mut writer = AviWriter::new(
            Cursor::new(Vec::new()),
            AviParams {
                width: 8,
                height: 8,
                ..AviParams::default()
            },
        )?;
        assert!(writer.write_frame(&Frame::black(4, 8)).is_err());
        writer.write_frame(&Frame::black(8, 8))?;
        writer.finish()?;
        assert!(writer.write_frame(&Frame::black(8, 8)).is_err());
        assert_eq!(writer.frames_written(), 1);
        Ok(())
    }

    #[test]
    fn rejects_invalid_params() {
        let bad_fps = AviParams {
            width: 8,
            height: 8,
            fps: 0.0,
            ..AviParams::default()
        };
        assert!(AviWriter::new(Cursor::new(Vec::new()), bad_fps).is_err());
        assert!(AviWriter::new(Cursor::new(Vec::new()), AviParams::default()).is_err());
    }
}
