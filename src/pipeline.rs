//! Two-pass stabilization pipeline.
//!
//! Pass 1 reads every frame once and estimates the relative motion of each
//! consecutive pair. The motion sequence is then turned into a
//! `StabilizationPlan`. Pass 2 rewinds the source and writes each frame warped
//! through its corrective transform.
//!
//! N frames produce N-1 pairs and therefore N-1 output frames; the final source
//! frame has no corrective transform and is not written.

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::config::StabilizerConfig;
use crate::frame::VideoInfo;
use crate::ingest::FrameSource;
use crate::motion::{EstimateOutcome, MotionEstimator};
use crate::sink::FrameSink;
use crate::trajectory::{StabilizationPlan, DEFAULT_SMOOTHING_RADIUS};
use crate::transform::RelativeTransform;
use crate::warp::warp_affine;

/// Which pass a progress callback refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pass {
    Estimate,
    Render,
}

/// Output of the motion estimation pass.
#[derive(Clone, Debug)]
pub struct MotionPass {
    pub info: VideoInfo,
    pub relative: Vec<RelativeTransform>,
    pub frames_read: usize,
    /// Pairs that fell back to the identity transform.
    pub fallbacks: usize,
}

/// Counters reported after a full run.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub frames_read: usize,
    pub pairs: usize,
    pub fallbacks: usize,
    pub frames_written: usize,
    pub fps: f64,
}

/// Summary plus the plan that produced the output.
#[derive(Clone, Debug)]
pub struct StabilizationRun {
    pub summary: RunSummary,
    pub plan: StabilizationPlan,
}

/// Motion estimator plus smoothing radius.
pub struct Stabilizer {
    estimator: MotionEstimator,
    smoothing_radius: usize,
}

impl Default for Stabilizer {
    fn default() -> Self {
        Self::new(MotionEstimator::default(), DEFAULT_SMOOTHING_RADIUS)
    }
}

impl Stabilizer {
    pub fn new(estimator: MotionEstimator, smoothing_radius: usize) -> Self {
        Self {
            estimator,
            smoothing_radius,
        }
    }

    pub fn from_config(config: &StabilizerConfig) -> Self {
        Self::new(
            MotionEstimator::new(config.features, config.fitter.build()),
            config.smoothing_radius,
        )
    }

    pub fn smoothing_radius(&self) -> usize {
        self.smoothing_radius
    }

    pub fn estimator(&self) -> &MotionEstimator {
        &self.estimator
    }

    /// Pass 1: relative motion of every consecutive frame pair.
    pub fn estimate_motion<S: FrameSource + ?Sized>(
        &self,
        source: &mut S,
        mut progress: impl FnMut(Pass, usize),
    ) -> Result<MotionPass> {
        let mut info = source.info();
        let first = source
            .next_frame()?
            .ok_or_else(|| anyhow!("no frames in video"))?;
        let dims = first.dimensions();
        (info.width, info.height) = dims;
        let mut prev = self.estimator.pyramid(first.to_luma());
        let mut frames_read = 1;
        let mut relative = Vec::new();
        let mut fallbacks = 0;
        progress(Pass::Estimate, frames_read);

        while let Some(frame) = source.next_frame()? {
            if frame.dimensions() != dims {
                return Err(anyhow!(
                    "frame {} is {}x{}, stream started at {}x{}",
                    frames_read,
                    frame.width(),
                    frame.height(),
                    dims.0,
                    dims.1
                ));
            }
            let curr = self.estimator.pyramid(frame.to_luma());
            let estimate = self.estimator.estimate_pyramids(&prev, &curr);
            match estimate.outcome {
                EstimateOutcome::Fitted { corners, tracked } => log::debug!(
                    "pair {}: dx={:.3} dy={:.3} da={:.5} ({} corners, {} tracked)",
                    relative.len(),
                    estimate.transform.dx,
                    estimate.transform.dy,
                    estimate.transform.da,
                    corners,
                    tracked
                ),
                EstimateOutcome::Identity(reason) => {
                    fallbacks += 1;
                    log::debug!("pair {}: identity fallback ({:?})", relative.len(), reason);
                }
            }
            relative.push(estimate.transform);
            prev = curr;
            frames_read += 1;
            progress(Pass::Estimate, frames_read);
        }

        log::info!(
            "motion pass: {} frames, {} pairs, {} identity fallbacks ({})",
            frames_read,
            relative.len(),
            fallbacks,
            self.estimator.fitter_name()
        );
        if fallbacks * 2 > relative.len() && !relative.is_empty() {
            log::warn!(
                "{} of {} pairs fell back to identity; output may be barely stabilized",
                fallbacks,
                relative.len()
            );
        }
        Ok(MotionPass {
            info,
            relative,
            frames_read,
            fallbacks,
        })
    }

    /// Accumulate, smooth, and synthesize corrective transforms.
    pub fn plan(&self, motion: &MotionPass) -> Result<StabilizationPlan> {
        StabilizationPlan::build(motion.relative.clone(), self.smoothing_radius)
    }

    /// Pass 2: rewind, warp each frame through its corrective transform, write.
    ///
    /// Stops early without error when the source yields fewer frames than the
    /// plan covers. Returns the number of frames written.
    pub fn render<S: FrameSource + ?Sized, K: FrameSink + ?Sized>(
        &self,
        source: &mut S,
        plan: &StabilizationPlan,
        sink: &mut K,
        mut progress: impl FnMut(Pass, usize),
    ) -> Result<usize> {
        source.rewind()?;
        let mut written = 0;
        for (index, corrective) in plan.corrective().iter().enumerate() {
            let Some(frame) = source.next_frame()? else {
                log::warn!(
                    "source ended after {} frames on re-read, expected {}; output truncated",
                    index,
                    plan.len()
                );
                break;
            };
            let warped = warp_affine(&frame, &corrective.to_matrix());
            sink.write_frame(&warped)?;
            written += 1;
            progress(Pass::Render, written);
        }
        sink.finish()?;
        log::info!("render pass: {} frames written", written);
        Ok(written)
    }

    /// Run both passes. `open_sink` is called once the plan exists, with the
    /// source metadata (fps already defaulted when unreported).
    pub fn run<S, K, F>(
        &self,
        source: &mut S,
        open_sink: F,
        mut progress: impl FnMut(Pass, usize),
    ) -> Result<StabilizationRun>
    where
        S: FrameSource + ?Sized,
        K: FrameSink,
        F: FnOnce(&VideoInfo) -> Result<K>,
    {
        let motion = self.estimate_motion(source, &mut progress)?;
        let plan = self.plan(&motion)?;

        let mut info = motion.info;
        info.fps = info.effective_fps();
        let mut sink = open_sink(&info)?;
        let frames_written = self.render(source, &plan, &mut sink, &mut progress)?;

        Ok(StabilizationRun {
            summary: RunSummary {
                frames_read: motion.frames_read,
                pairs: plan.len(),
                fallbacks: motion.fallbacks,
                frames_written,
                fps: info.fps,
            },
            plan,
        })
    }
}
