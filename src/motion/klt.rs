//! Pyramidal Lucas-Kanade sparse optical flow.
//!
//! Forward-additive formulation: gradients are taken at the warped position in
//! the current frame, so the 2x2 normal matrix is rebuilt every iteration.
//! Displacements are estimated coarse-to-fine and doubled between levels.

use super::Point;
use crate::frame::LumaPlane;

/// Gaussian image pyramid. Level 0 is the full-resolution plane.
#[derive(Clone, Debug)]
pub struct Pyramid {
    levels: Vec<LumaPlane>,
}

impl Pyramid {
    /// Smallest level side length kept in the pyramid.
    const MIN_LEVEL_SIDE: usize = 8;

    /// Build up to `max_level` extra levels above the base plane.
    pub fn build(base: LumaPlane, max_level: usize) -> Self {
        let mut levels = vec![base];
        while levels.len() <= max_level {
            let last = &levels[levels.len() - 1];
            if last.width() / 2 < Self::MIN_LEVEL_SIDE || last.height() / 2 < Self::MIN_LEVEL_SIDE {
                break;
            }
            let next = last.pyr_down();
            levels.push(next);
        }
        Self { levels }
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, index: usize) -> &LumaPlane {
        &self.levels[index]
    }
}

/// Outcome of tracking a single point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackStatus {
    Tracked,
    /// Normal matrix too ill-conditioned to solve.
    Lost,
    /// Final position fell outside the frame.
    OutOfBounds,
}

/// A point after tracking, with its status.
#[derive(Clone, Copy, Debug)]
pub struct Track {
    pub from: Point,
    pub to: Point,
    pub status: TrackStatus,
}

impl Track {
    pub fn is_tracked(&self) -> bool {
        self.status == TrackStatus::Tracked
    }
}

/// Pyramidal Lucas-Kanade tracker.
#[derive(Clone, Debug)]
pub struct KltTracker {
    /// Patch half-size; the patch is `(2 * half_window + 1)^2`.
    pub half_window: usize,
    /// Gauss-Newton iterations per level.
    pub max_iterations: usize,
    /// Convergence threshold in pixels.
    pub epsilon: f32,
    /// Extra pyramid levels above the base.
    pub max_level: usize,
    /// Minimum eigenvalue of the normal matrix, normalized by patch area.
    pub min_eigen_threshold: f32,
}

impl Default for KltTracker {
    fn default() -> Self {
        Self {
            half_window: 10,
            max_iterations: 30,
            epsilon: 0.01,
            max_level: 3,
            min_eigen_threshold: 1e-4,
        }
    }
}

enum LkStep {
    Converged(f32, f32),
    MaxIter(f32, f32),
    Singular,
}

impl KltTracker {
    pub fn build_pyramid(&self, plane: LumaPlane) -> Pyramid {
        Pyramid::build(plane, self.max_level)
    }

    /// Track `points` from `prev` into `curr`. Output is index-aligned with `points`.
    pub fn track(&self, prev: &Pyramid, curr: &Pyramid, points: &[Point]) -> Vec<Track> {
        let levels = prev
            .num_levels()
            .min(curr.num_levels())
            .min(self.max_level + 1);
        points
            .iter()
            .map(|p| self.track_point(prev, curr, *p, levels))
            .collect()
    }

    fn track_point(&self, prev: &Pyramid, curr: &Pyramid, point: Point, levels: usize) -> Track {
        let mut dx = 0.0f32;
        let mut dy = 0.0f32;

        for level in (0..levels).rev() {
            let scale = 1.0 / (1u32 << level) as f32;
            let px = point.x * scale;
            let py = point.y * scale;

            match self.lk_forward_additive(prev.level(level), curr.level(level), px, py, dx, dy) {
                LkStep::Converged(ndx, ndy) | LkStep::MaxIter(ndx, ndy) => {
                    dx = ndx;
                    dy = ndy;
                }
                // A flat patch at a coarse level keeps the current estimate.
                LkStep::Singular if level > 0 => {}
                LkStep::Singular => {
                    return Track {
                        from: point,
                        to: Point::new(point.x + dx / scale, point.y + dy / scale),
                        status: TrackStatus::Lost,
                    };
                }
            }

            if level > 0 {
                dx *= 2.0;
                dy *= 2.0;
            }
        }

        let to = Point::new(point.x + dx, point.y + dy);
        let base = prev.level(0);
        let inside = to.x.is_finite()
            && to.y.is_finite()
            && to.x >= 0.0
            && to.y >= 0.0
            && to.x < base.width() as f32
            && to.y < base.height() as f32;
        Track {
            from: point,
            to,
            status: if inside {
                TrackStatus::Tracked
            } else {
                TrackStatus::OutOfBounds
            },
        }
    }

    fn lk_forward_additive(
        &self,
        prev: &LumaPlane,
        curr: &LumaPlane,
        fx: f32,
        fy: f32,
        mut dx: f32,
        mut dy: f32,
    ) -> LkStep {
        let half = self.half_window as isize;
        let side = (2 * self.half_window + 1) as f32;
        let area = side * side;

        // Template patch is fixed for the whole level.
        let template: Vec<f32> = (-half..=half)
            .flat_map(|oy| (-half..=half).map(move |ox| (ox as f32, oy as f32)))
            .map(|(ox, oy)| prev.sample(fx + ox, fy + oy))
            .collect();

        for _ in 0..self.max_iterations {
            let mut h00 = 0.0f32;
            let mut h01 = 0.0f32;
            let mut h11 = 0.0f32;
            let mut b0 = 0.0f32;
            let mut b1 = 0.0f32;

            let mut idx = 0;
            for oy in -half..=half {
                for ox in -half..=half {
                    let wx = fx + dx + ox as f32;
                    let wy = fy + dy + oy as f32;
                    let err = template[idx] - curr.sample(wx, wy);
                    let gx = 0.5 * (curr.sample(wx + 1.0, wy) - curr.sample(wx - 1.0, wy));
                    let gy = 0.5 * (curr.sample(wx, wy + 1.0) - curr.sample(wx, wy - 1.0));

                    h00 += gx * gx;
                    h01 += gx * gy;
                    h11 += gy * gy;
                    b0 += gx * err;
                    b1 += gy * err;
                    idx += 1;
                }
            }

            // Intensities are on a 0..255 scale; normalize to 0..1 before the eigen test.
            let norm = 1.0 / (255.0 * 255.0 * area);
            let half_trace = 0.5 * (h00 + h11);
            let root = (0.25 * (h00 - h11) * (h00 - h11) + h01 * h01).sqrt();
            let min_eigen = (half_trace - root) * norm;
            let det = h00 * h11 - h01 * h01;
            if min_eigen < self.min_eigen_threshold || det.abs() < f32::EPSILON {
                return LkStep::Singular;
            }

            let inv_det = 1.0 / det;
            let step_x = inv_det * (h11 * b0 - h01 * b1);
            let step_y = inv_det * (h00 * b1 - h01 * b0);
            dx += step_x;
            dy += step_y;

            if step_x * step_x + step_y * step_y < self.epsilon * self.epsilon {
                return LkStep::Converged(dx, dy);
            }
        }

        LkStep::MaxIter(dx, dy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn textured(w: usize, h: usize, shift_x: f32, shift_y: f32) -> LumaPlane {
        LumaPlane::from_fn(w, h, |x, y| {
            let u = x as f32 - shift_x;
            let v = y as f32 - shift_y;
            128.0 + 50.0 * (u * 0.21).sin() * (v * 0.17).cos() + 40.0 * ((u + v) * 0.09).sin()
        })
    }

    #[test]
    fn tracks_pure_translation() {
        let tracker = KltTracker::default();
        let prev = tracker.build_pyramid(textured(96, 96, 0.0, 0.0));
        let curr = tracker.build_pyramid(textured(96, 96, 3.0, -2.0));
        let points = [Point::new(48.0, 48.0), Point::new(40.0, 52.0)];
        let tracks = tracker.track(&prev, &curr, &points);
        for track in tracks {
            assert!(track.is_tracked(), "{:?}", track);
            assert!((track.to.x - track.from.x - 3.0).abs() < 0.1, "{:?}", track);
            assert!((track.to.y - track.from.y + 2.0).abs() < 0.1, "{:?}", track);
        }
    }

    #[test]
    fn flat_patch_is_lost() {
        let tracker = KltTracker::default();
        let flat = LumaPlane::from_fn(64, 64, |_, _| 90.0);
        let prev = tracker.build_pyramid(flat.clone());
        let curr = tracker.build_pyramid(flat);
        let tracks = tracker.track(&prev, &curr, &[Point::new(32.0, 32.0)]);
        assert_eq!(tracks[0].status, TrackStatus::Lost);
    }

    #[test]
    fn pyramid_stops_before_tiny_levels() {
        let pyramid = Pyramid::build(LumaPlane::from_fn(40, 20, |_, _| 0.0), 5);
        // 40x20 -> 20x10 -> stop (next would be 10x5).
        assert_eq!(pyramid.num_levels(), 2);
        assert_eq!(pyramid.level(1).width(), 20);
    }
}
