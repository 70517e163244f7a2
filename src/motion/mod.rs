//! Inter-frame motion estimation.
//!
//! For each consecutive frame pair:
//! 1. Detect corners in the previous frame (`corners`)
//! 2. Track them into the current frame with pyramidal Lucas-Kanade (`klt`)
//! 3. Fit a robust partial affine to the surviving correspondences (`fit`)
//! 4. Decompose the matrix into `(dx, dy, da)`
//!
//! Detection runs from scratch on every pair; there are no persistent tracks.
//! Any failure along the way yields the identity transform, never an error.

pub mod corners;
pub mod fit;
pub mod klt;

pub use corners::{good_features_to_track, CornerParams};
pub use fit::{FitterKind, LmedsFitter, PointPair, RansacFitter, TransformFitter};
pub use klt::{KltTracker, Pyramid, Track, TrackStatus};

use crate::frame::LumaPlane;
use crate::transform::RelativeTransform;

/// 2D point in pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Why an estimate fell back to identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FallbackReason {
    NoCorners,
    TooFewTracks { tracked: usize },
    FitFailed { tracked: usize },
    NonFinite,
}

/// How an estimate was produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EstimateOutcome {
    Fitted { corners: usize, tracked: usize },
    Identity(FallbackReason),
}

/// Result of estimating one frame pair.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotionEstimate {
    pub transform: RelativeTransform,
    pub outcome: EstimateOutcome,
}

impl MotionEstimate {
    fn identity(reason: FallbackReason) -> Self {
        Self {
            transform: RelativeTransform::IDENTITY,
            outcome: EstimateOutcome::Identity(reason),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.outcome, EstimateOutcome::Identity(_))
    }
}

/// Corner detector + tracker + robust fitter.
pub struct MotionEstimator {
    corners: CornerParams,
    tracker: KltTracker,
    fitter: Box<dyn TransformFitter>,
}

impl MotionEstimator {
    pub fn new(corners: CornerParams, fitter: Box<dyn TransformFitter>) -> Self {
        Self {
            corners,
            tracker: KltTracker::default(),
            fitter,
        }
    }

    pub fn with_tracker(mut self, tracker: KltTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn corner_params(&self) -> &CornerParams {
        &self.corners
    }

    pub fn fitter_name(&self) -> &'static str {
        self.fitter.name()
    }

    pub fn pyramid(&self, plane: LumaPlane) -> Pyramid {
        self.tracker.build_pyramid(plane)
    }

    /// Estimate motion from `prev` to `curr`.
    pub fn estimate(&self, prev: &LumaPlane, curr: &LumaPlane) -> MotionEstimate {
        let prev_pyr = self.pyramid(prev.clone());
        let curr_pyr = self.pyramid(curr.clone());
        self.estimate_pyramids(&prev_pyr, &curr_pyr)
    }

    /// Estimate motion between two prebuilt pyramids.
    pub fn estimate_pyramids(&self, prev: &Pyramid, curr: &Pyramid) -> MotionEstimate {
        let corners = good_features_to_track(prev.level(0), &self.corners);
        if corners.is_empty() {
            return MotionEstimate::identity(FallbackReason::NoCorners);
        }

        let pairs: Vec<PointPair> = self
            .tracker
            .track(prev, curr, &corners)
            .into_iter()
            .filter(Track::is_tracked)
            .map(|t| PointPair::new(t.from, t.to))
            .collect();
        let tracked = pairs.len();
        if tracked < fit::MIN_SAMPLE {
            return MotionEstimate::identity(FallbackReason::TooFewTracks { tracked });
        }

        let Some(matrix) = self.fitter.fit(&pairs) else {
            return MotionEstimate::identity(FallbackReason::FitFailed { tracked });
        };
        let transform = RelativeTransform::from_matrix(&matrix);
        if !transform.is_finite() {
            return MotionEstimate::identity(FallbackReason::NonFinite);
        }
        MotionEstimate {
            transform,
            outcome: EstimateOutcome::Fitted {
                corners: corners.len(),
                tracked,
            },
        }
    }
}

impl Default for MotionEstimator {
    fn default() -> Self {
        Self::new(CornerParams::default(), FitterKind::default().build())
    }
}
