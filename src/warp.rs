//! Affine frame warping.
//!
//! `warp_affine` follows the forward-matrix convention: output pixel `(x, y)`
//! takes the source value at `M^-1 * (x, y)`. Sampling is bilinear; source
//! positions outside the frame read as black. Output dimensions always equal
//! the input dimensions.

use crate::frame::Frame;
use crate::transform::AffineMatrix;

/// Resample `frame` through `matrix`.
///
/// A singular matrix produces an all-black frame.
pub fn warp_affine(frame: &Frame, matrix: &AffineMatrix) -> Frame {
    let (width, height) = frame.dimensions();
    let Some(inverse) = matrix.invert() else {
        log::warn!("warp: singular matrix {:?}, emitting black frame", matrix);
        return Frame::black(width, height);
    };
    if inverse == AffineMatrix::IDENTITY {
        return frame.clone();
    }

    let mut out = Frame::black(width, height);
    for y in 0..height {
        let row = out.row_mut(y);
        for x in 0..width {
            let (sx, sy) = inverse.apply(x as f64, y as f64);
            let offset = x as usize * 3;
            row[offset..offset + 3].copy_from_slice(&sample_bilinear(frame, sx, sy));
        }
    }
    out
}

fn sample_bilinear(frame: &Frame, x: f64, y: f64) -> [u8; 3] {
    if !x.is_finite() || !y.is_finite() {
        return [0, 0, 0];
    }
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let xi = x0 as i64;
    let yi = y0 as i64;

    let fetch = |px: i64, py: i64| -> [f64; 3] {
        if px < 0 || py < 0 || px >= frame.width() as i64 || py >= frame.height() as i64 {
            return [0.0; 3];
        }
        match frame.pixel(px as u32, py as u32) {
            Some([r, g, b]) => [r as f64, g as f64, b as f64],
            None => [0.0; 3],
        }
    };

    let p00 = fetch(xi, yi);
    let p10 = fetch(xi + 1, yi);
    let p01 = fetch(xi, yi + 1);
    let p11 = fetch(xi + 1, yi + 1);

    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = p00[c] + (p10[c] - p00[c]) * fx;
        let bottom = p01[c] + (p11[c] - p01[c]) * fx;
        out[c] = (top + (bottom - top) * fy).round().clamp(0.0, 255.0) as u8;
    }
    out
}
