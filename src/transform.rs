//! Per-frame motion records and the 2x3 affine matrix they map to.

use serde::{Deserialize, Serialize};

/// Row-major 2x3 affine matrix `[[a, b, tx], [c, d, ty]]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AffineMatrix(pub [[f64; 3]; 2]);

impl AffineMatrix {
    pub const IDENTITY: AffineMatrix = AffineMatrix([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);

    /// Rotation by `angle` radians followed by translation `(dx, dy)`.
    pub fn similarity(dx: f64, dy: f64, angle: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        AffineMatrix([[cos, -sin, dx], [sin, cos, dy]])
    }

    /// Map a point through the matrix.
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let m = &self.0;
        (
            m[0][0] * x + m[0][1] * y + m[0][2],
            m[1][0] * x + m[1][1] * y + m[1][2],
        )
    }

    /// Inverse transform, or `None` when the linear part is singular.
    pub fn invert(&self) -> Option<AffineMatrix> {
        let [[a, b, tx], [c, d, ty]] = self.0;
        let det = a * d - b * c;
        if !det.is_finite() || det.abs() < 1e-12 {
            return None;
        }
        let inv_det = 1.0 / det;
        let ia = d * inv_det;
        let ib = -b * inv_det;
        let ic = -c * inv_det;
        let id = a * inv_det;
        Some(AffineMatrix([
            [ia, ib, -(ia * tx + ib * ty)],
            [ic, id, -(ic * tx + id * ty)],
        ]))
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().flatten().all(|v| v.is_finite())
    }
}

/// Motion of frame `i + 1` relative to frame `i`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RelativeTransform {
    pub dx: f64,
    pub dy: f64,
    /// Rotation in radians.
    pub da: f64,
}

impl RelativeTransform {
    pub const IDENTITY: RelativeTransform = RelativeTransform {
        dx: 0.0,
        dy: 0.0,
        da: 0.0,
    };

    pub fn new(dx: f64, dy: f64, da: f64) -> Self {
        Self { dx, dy, da }
    }

    /// Decompose a fitted matrix: translation column plus `atan2(m10, m00)`.
    ///
    /// Any uniform scale in the linear part is discarded.
    pub fn from_matrix(matrix: &AffineMatrix) -> Self {
        let m = &matrix.0;
        Self {
            dx: m[0][2],
            dy: m[1][2],
            da: m[1][0].atan2(m[0][0]),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.dx.is_finite() && self.dy.is_finite() && self.da.is_finite()
    }
}

/// Cumulative camera pose at a frame pair index.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub x: f64,
    pub y: f64,
    /// Accumulated angle in radians. Never wrapped.
    pub a: f64,
}

impl Trajectory {
    pub fn new(x: f64, y: f64, a: f64) -> Self {
        Self { x, y, a }
    }

    /// Pose advanced by one relative step.
    pub fn advance(self, step: &RelativeTransform) -> Self {
        Self {
            x: self.x + step.dx,
            y: self.y + step.dy,
            a: self.a + step.da,
        }
    }
}

/// Correction applied to a raw frame in the output pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrectiveTransform {
    pub dx: f64,
    pub dy: f64,
    pub da: f64,
}

impl CorrectiveTransform {
    pub fn new(dx: f64, dy: f64, da: f64) -> Self {
        Self { dx, dy, da }
    }

    /// `[[cos da, -sin da, dx], [sin da, cos da, dy]]`
    pub fn to_matrix(&self) -> AffineMatrix {
        AffineMatrix::similarity(self.dx, self.dy, self.da)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decomposition_recovers_similarity_parameters() {
        let matrix = AffineMatrix::similarity(3.5, -2.0, 0.1);
        let rel = RelativeTransform::from_matrix(&matrix);
        assert!((rel.dx - 3.5).abs() < 1e-12);
        assert!((rel.dy + 2.0).abs() < 1e-12);
        assert!((rel.da - 0.1).abs() < 1e-12);
    }

    #[test]
    fn decomposition_ignores_uniform_scale() {
        let (s, c) = 0.2f64.sin_cos();
        let matrix = AffineMatrix([[1.5 * c, -1.5 * s, 1.0], [1.5 * s, 1.5 * c, 2.0]]);
        let rel = RelativeTransform::from_matrix(&matrix);
        assert!((rel.da - 0.2).abs() < 1e-12);
    }

    #[test]
    fn inverse_round_trips_points() {
        let matrix = AffineMatrix::similarity(10.0, -4.0, 0.3);
        let inv = matrix.invert().expect("similarity is invertible");
        let (x, y) = matrix.apply(7.0, 11.0);
        let (bx, by) = inv.apply(x, y);
        assert!((bx - 7.0).abs() < 1e-9);
        assert!((by - 11.0).abs() < 1e-9);
    }

    #[test]
    fn singular_matrix_has_no_inverse() {
        let matrix = AffineMatrix([[0.0, 0.0, 1.0], [0.0, 0.0, 1.0]]);
        assert!(matrix.invert().is_none());
    }

    #[test]
    fn corrective_matrix_layout() {
        let m = CorrectiveTransform::new(1.0, 2.0, 0.0).to_matrix();
        assert_eq!(m, AffineMatrix([[1.0, -0.0, 1.0], [0.0, 1.0, 2.0]]));
    }
}
