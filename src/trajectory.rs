//! Trajectory accumulation, smoothing, and corrective transform synthesis.
//!
//! All three stages are pure functions over whole sequences. Index `i` in every
//! sequence refers to the frame pair `(i, i + 1)`.

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::transform::{CorrectiveTransform, RelativeTransform, Trajectory};

/// Smoothing radius, in frames, used when none is configured.
pub const DEFAULT_SMOOTHING_RADIUS: usize = 30;

/// Running cumulative pose after each relative step, summed left to right.
fn running_poses(transforms: &[RelativeTransform]) -> impl Iterator<Item = Trajectory> + '_ {
    transforms
        .iter()
        .scan(Trajectory::default(), |pose, step| {
            *pose = pose.advance(step);
            Some(*pose)
        })
}

/// Prefix-sum the relative transforms into a cumulative trajectory.
pub fn accumulate(transforms: &[RelativeTransform]) -> Vec<Trajectory> {
    running_poses(transforms).collect()
}

/// Centered moving average with a window truncated at the sequence ends.
///
/// Entry `i` averages `trajectory[j]` for every in-bounds `j` in `[i - radius, i + radius]`.
pub fn smooth(trajectory: &[Trajectory], radius: usize) -> Vec<Trajectory> {
    let len = trajectory.len();
    (0..len)
        .map(|i| {
            let start = i.saturating_sub(radius);
            let end = i.saturating_add(radius).min(len - 1);
            let window = &trajectory[start..=end];
            let (sx, sy, sa) = window
                .iter()
                .fold((0.0, 0.0, 0.0), |(sx, sy, sa), p| (sx + p.x, sy + p.y, sa + p.a));
            let count = window.len() as f64;
            Trajectory::new(sx / count, sy / count, sa / count)
        })
        .collect()
}

/// Corrective transform per pair: `relative[i] + (smoothed[i] - running[i])`.
///
/// The running cumulative pose is recomputed here instead of being taken from
/// `accumulate`, so this stage only depends on its two inputs.
pub fn synthesize(
    transforms: &[RelativeTransform],
    smoothed: &[Trajectory],
) -> Result<Vec<CorrectiveTransform>> {
    if transforms.len() != smoothed.len() {
        return Err(anyhow!(
            "smoothed trajectory length {} does not match transform count {}",
            smoothed.len(),
            transforms.len()
        ));
    }
    Ok(transforms
        .iter()
        .zip(running_poses(transforms))
        .zip(smoothed)
        .map(|((step, running), target)| {
            let diff_x = target.x - running.x;
            let diff_y = target.y - running.y;
            let diff_a = target.a - running.a;
            CorrectiveTransform::new(step.dx + diff_x, step.dy + diff_y, step.da + diff_a)
        })
        .collect())
}

/// Output of the estimation and planning stages, ready for the output pass.
///
/// The sequences are fixed once built; callers only get shared slices.
#[derive(Clone, Debug, Serialize)]
pub struct StabilizationPlan {
    radius: usize,
    relative: Vec<RelativeTransform>,
    trajectory: Vec<Trajectory>,
    smoothed: Vec<Trajectory>,
    corrective: Vec<CorrectiveTransform>,
}

impl StabilizationPlan {
    /// Run accumulation, smoothing, and synthesis over the estimated transforms.
    pub fn build(relative: Vec<RelativeTransform>, radius: usize) -> Result<Self> {
        let trajectory = accumulate(&relative);
        let smoothed = smooth(&trajectory, radius);
        let corrective = synthesize(&relative, &smoothed)?;
        Ok(Self {
            radius,
            relative,
            trajectory,
            smoothed,
            corrective,
        })
    }

    pub fn radius(&self) -> usize {
        self.radius
    }

    /// Number of frame pairs covered.
    pub fn len(&self) -> usize {
        self.relative.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relative.is_empty()
    }

    pub fn relative(&self) -> &[RelativeTransform] {
        &self.relative
    }

    pub fn trajectory(&self) -> &[Trajectory] {
        &self.trajectory
    }

    pub fn smoothed(&self) -> &[Trajectory] {
        &self.smoothed
    }

    pub fn corrective(&self) -> &[CorrectiveTransform] {
        &self.corrective
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transforms(values: &[(f64, f64, f64)]) -> Vec<RelativeTransform> {
        values
            .iter()
            .map(|&(dx, dy, da)| RelativeTransform::new(dx, dy, da))
            .collect()
    }

    #[test]
    fn accumulate_is_exact_prefix_sum() {
        let rel = transforms(&[(0.1, 1.0, 0.01), (0.2, -2.0, 0.02), (0.3, 0.5, -0.03)]);
        let traj = accumulate(&rel);
        assert_eq!(traj.len(), 3);
        for i in 0..rel.len() {
            let mut x = 0.0;
            let mut y = 0.0;
            let mut a = 0.0;
            for step in &rel[..=i] {
                x += step.dx;
                y += step.dy;
                a += step.da;
            }
            assert_eq!(traj[i], Trajectory::new(x, y, a));
        }
    }

    #[test]
    fn accumulate_does_not_wrap_angles() {
        let rel = transforms(&[(0.0, 0.0, 3.0), (0.0, 0.0, 3.0)]);
        let traj = accumulate(&rel);
        assert_eq!(traj[1].a, 6.0);
    }

    #[test]
    fn accumulate_empty_sequence() {
        assert!(accumulate(&[]).is_empty());
        assert!(smooth(&[], 30).is_empty());
    }

    #[test]
    fn smooth_constant_input_is_unchanged_for_any_radius() {
        let value = Trajectory::new(2.5, -1.25, 0.125);
        let traj = vec![value; 17];
        for radius in [0, 1, 3, 16, 30, 100] {
            let smoothed = smooth(&traj, radius);
            assert_eq!(smoothed.len(), traj.len());
            assert!(smoothed.iter().all(|p| *p == value), "radius {}", radius);
        }
    }

    #[test]
    fn smooth_window_truncates_at_edges() {
        // x_i = i makes each mean equal to the midpoint of the in-bounds window.
        let traj: Vec<Trajectory> = (0..10).map(|i| Trajectory::new(i as f64, 0.0, 0.0)).collect();
        let smoothed = smooth(&traj, 3);
        // Index 0 averages samples 0..=3 (min(R + 1, N) = 4 samples).
        assert_eq!(smoothed[0].x, (0.0 + 1.0 + 2.0 + 3.0) / 4.0);
        // Interior uses the full 2R + 1 window.
        assert_eq!(smoothed[5].x, 5.0);
        // Last index averages samples 6..=9.
        assert_eq!(smoothed[9].x, (6.0 + 7.0 + 8.0 + 9.0) / 4.0);
    }

    #[test]
    fn smooth_radius_larger_than_sequence_uses_whole_sequence() {
        let traj: Vec<Trajectory> = (0..3).map(|i| Trajectory::new(i as f64, 0.0, 0.0)).collect();
        let smoothed = smooth(&traj, 30);
        assert!(smoothed.iter().all(|p| p.x == 1.0));
    }

    #[test]
    fn synthesize_without_smoothing_returns_relative_transforms() -> Result<()> {
        let rel = transforms(&[(1.0, 2.0, 0.1), (-3.0, 0.5, -0.2), (0.25, 0.25, 0.0)]);
        let traj = accumulate(&rel);
        let corrective = synthesize(&rel, &traj)?;
        for (c, r) in corrective.iter().zip(&rel) {
            assert_eq!((c.dx, c.dy, c.da), (r.dx, r.dy, r.da));
        }
        Ok(())
    }

    #[test]
    fn synthesize_rejects_length_mismatch() {
        let rel = transforms(&[(1.0, 0.0, 0.0)]);
        assert!(synthesize(&rel, &[]).is_err());
    }

    #[test]
    fn plan_sequences_share_length() -> Result<()> {
        let rel = transforms(&[(1.0, 0.0, 0.0); 12]);
        let plan = StabilizationPlan::build(rel, 4)?;
        assert_eq!(plan.len(), 12);
        assert_eq!(plan.trajectory().len(), 12);
        assert_eq!(plan.smoothed().len(), 12);
        assert_eq!(plan.corrective().len(), 12);
        Ok(())
    }
}
