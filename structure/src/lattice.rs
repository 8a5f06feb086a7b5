//! Periodic cell geometry.

use crate::error::ConstructionError;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

/// Cell lengths in Å and angles in degrees (α between b and c, β between a
/// and c, γ between a and b).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatticeParameters {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl LatticeParameters {
    pub fn new(a: f64, b: f64, c: f64, alpha: f64, beta: f64, gamma: f64) -> Self {
        Self {
            a,
            b,
            c,
            alpha,
            beta,
            gamma,
        }
    }

    pub fn orthogonal(a: f64, b: f64, c: f64) -> Self {
        Self::new(a, b, c, 90.0, 90.0, 90.0)
    }

    pub fn lengths(&self) -> [f64; 3] {
        [self.a, self.b, self.c]
    }

    pub fn angles(&self) -> [f64; 3] {
        [self.alpha, self.beta, self.gamma]
    }
}

/// Three lattice vectors stored as matrix rows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lattice {
    vectors: Matrix3<f64>,
    // (vectors^T)^-1, maps Cartesian to fractional
    inverse_transpose: Matrix3<f64>,
}

impl Lattice {
    pub fn from_vectors(vectors: Matrix3<f64>) -> Result<Self, ConstructionError> {
        for (i, row) in vectors.row_iter().enumerate() {
            let length = row.norm();
            if !length.is_finite() || length <= 0.0 {
                return Err(ConstructionError::DegenerateCell(format!(
                    "lattice vector {} has length {}",
                    i + 1,
                    length
                )));
            }
        }

        let volume = vectors.determinant().abs();
        if volume < 1e-10 {
            return Err(ConstructionError::DegenerateCell(format!(
                "cell volume {volume:e} is zero"
            )));
        }

        let inverse_transpose = vectors
            .transpose()
            .try_inverse()
            .ok_or_else(|| ConstructionError::DegenerateCell("cell is singular".to_string()))?;

        Ok(Self {
            vectors,
            inverse_transpose,
        })
    }

    /// Orthogonal box with edges along x, y and z.
    pub fn orthorhombic(a: f64, b: f64, c: f64) -> Result<Self, ConstructionError> {
        for (name, length) in [("a", a), ("b", b), ("c", c)] {
            if !length.is_finite() || length <= 0.0 {
                return Err(ConstructionError::DegenerateCell(format!(
                    "{name} = {length} must be positive"
                )));
            }
        }
        Self::from_vectors(Matrix3::from_diagonal(&Vector3::new(a, b, c)))
    }

    /// Build the standard orientation: a along x, b in the xy-plane.
    pub fn from_parameters(params: &LatticeParameters) -> Result<Self, ConstructionError> {
        for (name, length) in [("a", params.a), ("b", params.b), ("c", params.c)] {
            if !length.is_finite() || length <= 0.0 {
                return Err(ConstructionError::DegenerateCell(format!(
                    "{name} = {length} must be positive"
                )));
            }
        }
        for (name, angle) in [
            ("alpha", params.alpha),
            ("beta", params.beta),
            ("gamma", params.gamma),
        ] {
            if !angle.is_finite() || angle <= 0.0 || angle >= 360.0 {
                return Err(ConstructionError::InvalidAngles(format!(
                    "{name} = {angle} must lie in (0, 360) degrees"
                )));
            }
        }

        let cos_alpha = exact_cos(params.alpha);
        let cos_beta = exact_cos(params.beta);
        let cos_gamma = exact_cos(params.gamma);
        let sin_gamma = exact_sin(params.gamma);
        if sin_gamma.abs() < 1e-12 {
            return Err(ConstructionError::InvalidAngles(format!(
                "gamma = {} makes a and b collinear",
                params.gamma
            )));
        }

        let cx = cos_beta;
        let cy = (cos_alpha - cos_beta * cos_gamma) / sin_gamma;
        let cz_sqr = 1.0 - cx * cx - cy * cy;
        if cz_sqr <= 0.0 {
            return Err(ConstructionError::InvalidAngles(format!(
                "alpha = {}, beta = {}, gamma = {} do not form a cell",
                params.alpha, params.beta, params.gamma
            )));
        }

        let va = Vector3::new(params.a, 0.0, 0.0);
        let vb = Vector3::new(params.b * cos_gamma, params.b * sin_gamma, 0.0);
        let vc = Vector3::new(cx, cy, cz_sqr.sqrt()) * params.c;

        Self::from_vectors(Matrix3::from_rows(&[
            va.transpose(),
            vb.transpose(),
            vc.transpose(),
        ]))
    }

    pub fn vectors(&self) -> &Matrix3<f64> {
        &self.vectors
    }

    pub fn vector(&self, index: usize) -> Vector3<f64> {
        self.vectors.row(index).transpose()
    }

    pub fn volume(&self) -> f64 {
        self.vectors.determinant().abs()
    }

    pub fn parameters(&self) -> LatticeParameters {
        let (a, b, c) = (self.vector(0), self.vector(1), self.vector(2));
        LatticeParameters {
            a: a.norm(),
            b: b.norm(),
            c: c.norm(),
            alpha: angle_between(&b, &c),
            beta: angle_between(&a, &c),
            gamma: angle_between(&a, &b),
        }
    }

    pub fn to_cartesian(&self, fractional: &Vector3<f64>) -> Vector3<f64> {
        self.vectors.transpose() * fractional
    }

    pub fn to_fractional(&self, cartesian: &Vector3<f64>) -> Vector3<f64> {
        self.inverse_transpose * cartesian
    }

    /// Lattice of an `n[0] x n[1] x n[2]` supercell.
    pub fn scaled(&self, n: [usize; 3]) -> Result<Self, ConstructionError> {
        Self::from_vectors(Matrix3::from_rows(&[
            self.vectors.row(0) * n[0] as f64,
            self.vectors.row(1) * n[1] as f64,
            self.vectors.row(2) * n[2] as f64,
        ]))
    }
}

// cos/sin that return exact zeros at right angles so orthogonal cells stay
// orthogonal to the last bit.
fn exact_cos(degrees: f64) -> f64 {
    if (degrees - 90.0).abs() < 1e-12 || (degrees - 270.0).abs() < 1e-12 {
        0.0
    } else {
        degrees.to_radians().cos()
    }
}

fn exact_sin(degrees: f64) -> f64 {
    if (degrees - 180.0).abs() < 1e-12 {
        0.0
    } else {
        degrees.to_radians().sin()
    }
}

fn angle_between(u: &Vector3<f64>, v: &Vector3<f64>) -> f64 {
    let cos = (u.dot(v) / (u.norm() * v.norm())).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_orthogonal_parameters_round_trip() {
        let params = LatticeParameters::orthogonal(3.85, 3.85, 3.72);
        let lattice = Lattice::from_parameters(&params).unwrap();
        let back = lattice.parameters();
        assert!(close(back.a, 3.85) && close(back.b, 3.85) && close(back.c, 3.72));
        assert!(close(back.alpha, 90.0) && close(back.beta, 90.0) && close(back.gamma, 90.0));
        assert!(close(lattice.volume(), 3.85 * 3.85 * 3.72));
    }

    #[test]
    fn test_hexagonal_parameters_round_trip() {
        let params = LatticeParameters::new(2.95, 2.95, 4.68, 90.0, 90.0, 120.0);
        let lattice = Lattice::from_parameters(&params).unwrap();
        let back = lattice.parameters();
        assert!(close(back.a, 2.95) && close(back.c, 4.68));
        assert!(close(back.gamma, 120.0));
        assert!(close(back.alpha, 90.0));
    }

    #[test]
    fn test_fractional_cartesian_inverse() {
        let lattice =
            Lattice::from_parameters(&LatticeParameters::new(4.0, 5.0, 6.0, 80.0, 95.0, 110.0))
                .unwrap();
        let frac = Vector3::new(0.25, 0.5, 0.75);
        let back = lattice.to_fractional(&lattice.to_cartesian(&frac));
        assert!((back - frac).norm() < 1e-12);
    }

    #[test]
    fn test_degenerate_cells_are_rejected() {
        assert!(matches!(
            Lattice::orthorhombic(3.0, 0.0, 3.0),
            Err(ConstructionError::DegenerateCell(_))
        ));
        assert!(matches!(
            Lattice::from_parameters(&LatticeParameters::new(3.0, 3.0, 3.0, 90.0, 90.0, 180.0)),
            Err(ConstructionError::InvalidAngles(_))
        ));
        assert!(matches!(
            Lattice::from_parameters(&LatticeParameters::new(3.0, 3.0, 3.0, 10.0, 10.0, 120.0)),
            Err(ConstructionError::InvalidAngles(_))
        ));
        assert!(matches!(
            Lattice::from_parameters(&LatticeParameters::new(3.0, 3.0, 3.0, 0.0, 90.0, 90.0)),
            Err(ConstructionError::InvalidAngles(_))
        ));
    }
}
