//! Offline two-pass video stabilizer.
//!
//! Removes high-frequency camera shake from a recorded clip while keeping the
//! intentional camera path (pans, slow drift).
//!
//! # Pipeline
//!
//! 1. **Motion estimation**: for every consecutive frame pair, detect corners,
//!    track them with pyramidal Lucas-Kanade, and robustly fit a partial affine
//!    reduced to `(dx, dy, da)`. Failures degrade to the identity transform.
//! 2. **Accumulation**: prefix-sum the relative transforms into a trajectory.
//! 3. **Smoothing**: centered moving average with a truncated window.
//! 4. **Synthesis**: corrective transform = relative + (smoothed - running).
//! 5. **Output pass**: rewind, warp each frame through its corrective transform,
//!    encode into an AVI container.
//!
//! A separate compositor places an original and a stabilized clip side by side.
//!
//! # Module Structure
//!
//! - `frame`: RGB24 frames, luma planes, stream metadata
//! - `ingest`: frame sources (local files via FFmpeg, `stub://` clips, memory)
//! - `motion`: corner detection, KLT tracking, robust fitting
//! - `transform`: relative/trajectory/corrective value types and affine matrices
//! - `trajectory`: accumulation, smoothing, synthesis, `StabilizationPlan`
//! - `warp`: affine frame resampling
//! - `sink`: frame sinks (AVI writer, memory)
//! - `pipeline`: the two-pass `Stabilizer`
//! - `compare`: before/after compositor
//! - `config`: layered configuration (defaults, file, environment, CLI)

pub mod compare;
pub mod config;
pub mod frame;
pub mod ingest;
pub mod motion;
pub mod pipeline;
pub mod sink;
pub mod trajectory;
pub mod transform;
pub mod warp;

pub use compare::{compose_side_by_side, CompareSummary, Compositor, GAP_PX};
pub use config::{CompareConfig, StabilizerConfig, StabilizerOverrides};
pub use frame::{Frame, LumaPlane, VideoInfo, FALLBACK_FPS};
pub use ingest::{open_source, FileConfig, FileSource, FrameSource, MemorySource, SyntheticClip};
pub use motion::{CornerParams, FitterKind, MotionEstimate, MotionEstimator, TransformFitter};
pub use pipeline::{MotionPass, Pass, RunSummary, StabilizationRun, Stabilizer};
pub use sink::{open_avi, AviParams, AviWriter, Codec, FrameSink, MemorySink};
pub use trajectory::{accumulate, smooth, synthesize, StabilizationPlan, DEFAULT_SMOOTHING_RADIUS};
pub use transform::{AffineMatrix, CorrectiveTransform, RelativeTransform, Trajectory};
pub use warp::warp_affine;
