//! Shi-Tomasi corner detection ("good features to track").
//!
//! Response is the minimum eigenvalue of the 3x3-summed structure tensor built
//! from Sobel gradients. Candidates must clear `quality_level * max_response`,
//! survive 3x3 non-maximum suppression, and keep `min_distance` from every
//! stronger accepted corner.

use super::Point;
use crate::frame::LumaPlane;

/// Corner detector parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CornerParams {
    /// Maximum number of corners returned (strongest first).
    pub max_corners: usize,
    /// Fraction of the strongest response a corner must reach.
    pub quality_level: f64,
    /// Minimum Euclidean distance between returned corners, in pixels.
    pub min_distance: f64,
}

impl Default for CornerParams {
    fn default() -> Self {
        Self {
            max_corners: 200,
            quality_level: 0.01,
            min_distance: 30.0,
        }
    }
}

/// Detect corners in `plane`, strongest first.
pub fn good_features_to_track(plane: &LumaPlane, params: &CornerParams) -> Vec<Point> {
    let w = plane.width();
    let h = plane.height();
    if w < 3 || h < 3 || params.max_corners == 0 {
        return Vec::new();
    }

    let response = min_eigen_response(plane);
    let max_response = response.iter().cloned().fold(0.0f32, f32::max);
    if max_response <= 0.0 || !max_response.is_finite() {
        return Vec::new();
    }
    let threshold = (params.quality_level * max_response as f64) as f32;

    let mut candidates: Vec<(f32, usize, usize)> = Vec::new();
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let value = response[y * w + x];
            if value < threshold || value <= 0.0 {
                continue;
            }
            if is_local_max(&response, w, x, y, value) {
                candidates.push((value, x, y));
            }
        }
    }
    // Stable sort keeps raster order among equal responses.
    candidates.sort_by(|a, b| b.0.total_cmp(&a.0));

    let min_dist_sq = (params.min_distance * params.min_distance) as f32;
    let mut corners: Vec<Point> = Vec::with_capacity(params.max_corners.min(candidates.len()));
    for (_, x, y) in candidates {
        let p = Point::new(x as f32, y as f32);
        let too_close = corners.iter().any(|c| {
            let dx = c.x - p.x;
            let dy = c.y - p.y;
            dx * dx + dy * dy < min_dist_sq
        });
        if too_close {
            continue;
        }
        corners.push(p);
        if corners.len() == params.max_corners {
            break;
        }
    }
    corners
}

fn is_local_max(response: &[f32], w: usize, x: usize, y: usize, value: f32) -> bool {
    for ny in y - 1..=y + 1 {
        for nx in x - 1..=x + 1 {
            if response[ny * w + nx] > value {
                return false;
            }
        }
    }
    true
}

/// Per-pixel minimum eigenvalue of the structure tensor.
fn min_eigen_response(plane: &LumaPlane) -> Vec<f32> {
    let w = plane.width();
    let h = plane.height();

    let mut ixx = vec![0.0f32; w * h];
    let mut ixy = vec![0.0f32; w * h];
    let mut iyy = vec![0.0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            let (gx, gy) = sobel(plane, x as isize, y as isize);
            let idx = y * w + x;
            ixx[idx] = gx * gx;
            ixy[idx] = gx * gy;
            iyy[idx] = gy * gy;
        }
    }

    let mut response = vec![0.0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut a = 0.0;
            let mut b = 0.0;
            let mut c = 0.0;
            for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                    let idx = ny * w + nx;
                    a += ixx[idx];
                    b += ixy[idx];
                    c += iyy[idx];
                }
            }
            let half_trace = 0.5 * (a + c);
            let root = (0.25 * (a - c) * (a - c) + b * b).sqrt();
            response[y * w + x] = half_trace - root;
        }
    }
    response
}

fn sobel(plane: &LumaPlane, x: isize, y: isize) -> (f32, f32) {
    let p = |dx: isize, dy: isize| plane.get_clamped(x + dx, y + dy);
    let gx = (p(1, -1) + 2.0 * p(1, 0) + p(1, 1)) - (p(-1, -1) + 2.0 * p(-1, 0) + p(-1, 1));
    let gy = (p(-1, 1) + 2.0 * p(0, 1) + p(1, 1)) - (p(-1, -1) + 2.0 * p(0, -1) + p(1, -1));
    (gx, gy)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_scene(w: usize, h: usize, x0: usize, y0: usize, size: usize) -> LumaPlane {
        LumaPlane::from_fn(w, h, |x, y| {
            if x >= x0 && x < x0 + size && y >= y0 && y < y0 + size {
                220.0
            } else {
                20.0
            }
        })
    }

    #[test]
    fn blank_plane_has_no_corners() {
        let plane = LumaPlane::from_fn(64, 48, |_, _| 128.0);
        assert!(good_features_to_track(&plane, &CornerParams::default()).is_empty());
    }

    #[test]
    fn square_yields_corners_near_its_vertices() {
        let plane = square_scene(80, 80, 20, 20, 40);
        let params = CornerParams {
            max_corners: 10,
            quality_level: 0.1,
            min_distance: 10.0,
        };
        let corners = good_features_to_track(&plane, &params);
        assert_eq!(corners.len(), 4);
        for vertex in [(20.0, 20.0), (59.0, 20.0), (20.0, 59.0), (59.0, 59.0)] {
            assert!(
                corners
                    .iter()
                    .any(|c| (c.x - vertex.0).abs() <= 2.0 && (c.y - vertex.1).abs() <= 2.0),
                "missing corner near {:?}: {:?}",
                vertex,
                corners
            );
        }
    }

    #[test]
    fn min_distance_and_max_corners_are_honored() {
        let plane = LumaPlane::from_fn(120, 120, |x, y| if (x / 6 + y / 6) % 2 == 0 { 200.0 } else { 30.0 });
        let params = CornerParams {
            max_corners: 15,
            quality_level: 0.01,
            min_distance: 20.0,
        };
        let corners = good_features_to_track(&plane, &params);
        assert!(!corners.is_empty());
        assert!(corners.len() <= 15);
        for (i, a) in corners.iter().enumerate() {
            for b in &corners[i + 1..] {
                let d = ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt();
                assert!(d >= 20.0, "corners {:?} and {:?} too close", a, b);
            }
        }
    }
}
