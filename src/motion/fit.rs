//! Robust 4-DOF partial affine fitting (rotation, uniform scale, translation).
//!
//! The model maps `(x, y)` to `(a*x - b*y + tx, b*x + a*y + ty)`. Two
//! non-coincident correspondences determine it exactly.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::Point;
use crate::transform::AffineMatrix;

/// Correspondences needed for a minimal fit.
pub const MIN_SAMPLE: usize = 2;

/// A point in the previous frame and where it was tracked to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointPair {
    pub from: Point,
    pub to: Point,
}

impl PointPair {
    pub fn new(from: Point, to: Point) -> Self {
        Self { from, to }
    }

    fn residual_sq(&self, model: &AffineMatrix) -> f64 {
        let (x, y) = model.apply(self.from.x as f64, self.from.y as f64);
        let ex = x - self.to.x as f64;
        let ey = y - self.to.y as f64;
        ex * ex + ey * ey
    }
}

/// Robust estimator that reduces correspondences to a single transform.
///
/// Returns `None` when no model can be fitted.
pub trait TransformFitter {
    /// Estimator identifier.
    fn name(&self) -> &'static str;

    fn fit(&self, pairs: &[PointPair]) -> Option<AffineMatrix>;
}

/// Selectable fitter implementations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FitterKind {
    #[default]
    Ransac,
    Lmeds,
}

impl FitterKind {
    pub fn build(self) -> Box<dyn TransformFitter> {
        match self {
            FitterKind::Ransac => Box::new(RansacFitter::default()),
            FitterKind::Lmeds => Box::new(LmedsFitter::default()),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FitterKind::Ransac => "ransac",
            FitterKind::Lmeds => "lmeds",
        }
    }
}

impl std::str::FromStr for FitterKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ransac" => Ok(FitterKind::Ransac),
            "lmeds" => Ok(FitterKind::Lmeds),
            other => Err(anyhow::anyhow!(
                "unknown fitter '{}' (expected ransac or lmeds)",
                other
            )),
        }
    }
}

/// Closed-form least-squares partial affine over all pairs.
pub fn least_squares(pairs: &[PointPair]) -> Option<AffineMatrix> {
    if pairs.len() < MIN_SAMPLE {
        return None;
    }
    let n = pairs.len() as f64;
    let (mut px, mut py, mut qx, mut qy) = (0.0, 0.0, 0.0, 0.0);
    for pair in pairs {
        px += pair.from.x as f64;
        py += pair.from.y as f64;
        qx += pair.to.x as f64;
        qy += pair.to.y as f64;
    }
    px /= n;
    py /= n;
    qx /= n;
    qy /= n;

    let (mut dot, mut cross, mut norm) = (0.0, 0.0, 0.0);
    for pair in pairs {
        let ux = pair.from.x as f64 - px;
        let uy = pair.from.y as f64 - py;
        let vx = pair.to.x as f64 - qx;
        let vy = pair.to.y as f64 - qy;
        dot += ux * vx + uy * vy;
        cross += ux * vy - uy * vx;
        norm += ux * ux + uy * uy;
    }
    if norm < 1e-9 {
        return None;
    }
    let a = dot / norm;
    let b = cross / norm;
    let tx = qx - (a * px - b * py);
    let ty = qy - (b * px + a * py);
    let model = AffineMatrix([[a, -b, tx], [b, a, ty]]);
    model.is_finite().then_some(model)
}

fn sample_pair(rng: &mut StdRng, pairs: &[PointPair]) -> Option<[PointPair; 2]> {
    let n = pairs.len();
    // A few redraws for coincident samples before giving up on this iteration.
    for _ in 0..8 {
        let i = rng.gen_range(0..n);
        let mut j = rng.gen_range(0..n - 1);
        if j >= i {
            j += 1;
        }
        let (p, q) = (pairs[i], pairs[j]);
        let dx = (p.from.x - q.from.x) as f64;
        let dy = (p.from.y - q.from.y) as f64;
        if dx * dx + dy * dy > 1e-6 {
            return Some([p, q]);
        }
    }
    None
}

fn inliers(pairs: &[PointPair], model: &AffineMatrix, threshold_sq: f64) -> Vec<PointPair> {
    pairs
        .iter()
        .filter(|p| p.residual_sq(model) <= threshold_sq)
        .copied()
        .collect()
}

/// Iterations needed to hit `confidence` given the current inlier ratio.
fn adaptive_iterations(confidence: f64, inlier_ratio: f64, max_iterations: usize) -> usize {
    let outlier_free = inlier_ratio.powi(MIN_SAMPLE as i32);
    if outlier_free >= 1.0 - f64::EPSILON {
        return 1;
    }
    if outlier_free <= f64::EPSILON {
        return max_iterations;
    }
    let needed = (1.0 - confidence).ln() / (1.0 - outlier_free).ln();
    if !needed.is_finite() {
        return max_iterations;
    }
    (needed.ceil() as usize).clamp(1, max_iterations)
}

// ----------------------------------------------------------------------------
// RANSAC
// ----------------------------------------------------------------------------

/// RANSAC with inlier-count scoring and least-squares refinement over inliers.
#[derive(Clone, Debug)]
pub struct RansacFitter {
    /// Inlier reprojection threshold in pixels.
    pub threshold: f64,
    pub max_iterations: usize,
    pub confidence: f64,
    pub seed: u64,
}

impl Default for RansacFitter {
    fn default() -> Self {
        Self {
            threshold: 3.0,
            max_iterations: 2000,
            confidence: 0.99,
            seed: 0x5EED_CAFE,
        }
    }
}

impl TransformFitter for RansacFitter {
    fn name(&self) -> &'static str {
        "ransac"
    }

    fn fit(&self, pairs: &[PointPair]) -> Option<AffineMatrix> {
        if pairs.len() < MIN_SAMPLE {
            return None;
        }
        if pairs.len() == MIN_SAMPLE {
            return least_squares(pairs);
        }

        let threshold_sq = self.threshold * self.threshold;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut best: Option<(usize, AffineMatrix)> = None;
        let mut budget = self.max_iterations;
        let mut iteration = 0;

        while iteration < budget {
            iteration += 1;
            let Some(sample) = sample_pair(&mut rng, pairs) else {
                continue;
            };
            let Some(model) = least_squares(&sample) else {
                continue;
            };
            let count = pairs
                .iter()
                .filter(|p| p.residual_sq(&model) <= threshold_sq)
                .count();
            if best.map_or(true, |(best_count, _)| count > best_count) {
                best = Some((count, model));
                let ratio = count as f64 / pairs.len() as f64;
                budget = adaptive_iterations(self.confidence, ratio, self.max_iterations);
            }
        }

        let (count, model) = best?;
        if count < MIN_SAMPLE {
            return None;
        }
        let support = inliers(pairs, &model, threshold_sq);
        least_squares(&support).or(Some(model))
    }
}

// ----------------------------------------------------------------------------
// Least-median-of-squares
// ----------------------------------------------------------------------------

/// Least-median-of-squares: keeps the minimal-sample model with the smallest
/// median residual, then refines over the inliers implied by that median.
///
/// Tolerates up to half of the correspondences being outliers without a
/// threshold parameter.
#[derive(Clone, Debug)]
pub struct LmedsFitter {
    pub max_iterations: usize,
    pub confidence: f64,
    pub seed: u64,
}

impl Default for LmedsFitter {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            confidence: 0.99,
            seed: 0x5EED_CAFE,
        }
    }
}

impl TransformFitter for LmedsFitter {
    fn name(&self) -> &'static str {
        "lmeds"
    }

    fn fit(&self, pairs: &[PointPair]) -> Option<AffineMatrix> {
        if pairs.len() < MIN_SAMPLE {
            return None;
        }
        if pairs.len() == MIN_SAMPLE {
            return least_squares(pairs);
        }

        // Worst case assumed by LMedS: half the data are outliers.
        let iterations = adaptive_iterations(self.confidence, 0.5, self.max_iterations);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut best: Option<(f64, AffineMatrix)> = None;
        let mut residuals = Vec::with_capacity(pairs.len());

        for _ in 0..iterations {
            let Some(sample) = sample_pair(&mut rng, pairs) else {
                continue;
            };
            let Some(model) = least_squares(&sample) else {
                continue;
            };
            residuals.clear();
            residuals.extend(pairs.iter().map(|p| p.residual_sq(&model)));
            let mid = residuals.len() / 2;
            let (_, median, _) = residuals.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
            let median = *median;
            if best.map_or(true, |(best_median, _)| median < best_median) {
                best = Some((median, model));
            }
        }

        let (median, model) = best?;
        // Robust standard deviation estimate (Rousseeuw), with a floor so an
        // exact fit still admits sub-pixel noise.
        let n = pairs.len() as f64;
        let sigma = 2.5 * 1.4826 * (1.0 + 5.0 / (n - MIN_SAMPLE as f64).max(1.0)) * median.sqrt();
        let threshold = sigma.max(0.5);
        let support = inliers(pairs, &model, threshold * threshold);
        least_squares(&support).or(Some(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs_with_outliers(model: &AffineMatrix, outliers: usize) -> Vec<PointPair> {
        let mut pairs = Vec::new();
        for i in 0..40 {
            let x = (i % 8) as f32 * 20.0 + 5.0;
            let y = (i / 8) as f32 * 25.0 + 3.0;
            let (tx, ty) = model.apply(x as f64, y as f64);
            pairs.push(PointPair::new(Point::new(x, y), Point::new(tx as f32, ty as f32)));
        }
        for i in 0..outliers {
            let x = i as f32 * 7.0;
            pairs.push(PointPair::new(
                Point::new(x, 50.0),
                Point::new(x + 60.0 + i as f32 * 3.0, -40.0),
            ));
        }
        pairs
    }

    fn assert_close(a: &AffineMatrix, b: &AffineMatrix, tol: f64) {
        for r in 0..2 {
            for c in 0..3 {
                assert!(
                    (a.0[r][c] - b.0[r][c]).abs() < tol,
                    "{:?} vs {:?}",
                    a,
                    b
                );
            }
        }
    }

    #[test]
    fn least_squares_recovers_exact_similarity() {
        let truth = AffineMatrix::similarity(4.0, -3.0, 0.05);
        let pairs = pairs_with_outliers(&truth, 0);
        let fitted = least_squares(&pairs).expect("fit");
        assert_close(&fitted, &truth, 1e-3);
    }

    #[test]
    fn least_squares_rejects_degenerate_input() {
        let p = PointPair::new(Point::new(1.0, 1.0), Point::new(2.0, 2.0));
        assert!(least_squares(&[p]).is_none());
        assert!(least_squares(&[p, p, p]).is_none());
    }

    #[test]
    fn ransac_ignores_outliers() {
        let truth = AffineMatrix::similarity(-6.0, 2.5, -0.03);
        let pairs = pairs_with_outliers(&truth, 15);
        let fitted = RansacFitter::default().fit(&pairs).expect("fit");
        assert_close(&fitted, &truth, 1e-2);
        // Plain least squares is pulled away by the same outliers.
        let naive = least_squares(&pairs).expect("fit");
        assert!((naive.0[0][2] - truth.0[0][2]).abs() > 0.5);
    }

    #[test]
    fn lmeds_ignores_outliers() {
        let truth = AffineMatrix::similarity(1.5, 7.0, 0.02);
        let pairs = pairs_with_outliers(&truth, 15);
        let fitted = LmedsFitter::default().fit(&pairs).expect("fit");
        assert_close(&fitted, &truth, 1e-2);
    }

    #[test]
    fn fitters_need_two_pairs() {
        let p = PointPair::new(Point::new(1.0, 1.0), Point::new(2.0, 2.0));
        assert!(RansacFitter::default().fit(&[]).is_none());
        assert!(RansacFitter::default().fit(&[p]).is_none());
        assert!(LmedsFitter::default().fit(&[p]).is_none());
    }

    #[test]
    fn fitter_kind_parses_names() {
        assert_eq!("RANSAC".parse::<FitterKind>().unwrap(), FitterKind::Ransac);
        assert_eq!("lmeds".parse::<FitterKind>().unwrap(), FitterKind::Lmeds);
        assert!("median".parse::<FitterKind>().is_err());
        assert_eq!(FitterKind::Lmeds.build().name(), "lmeds");
    }
}
