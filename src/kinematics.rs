//! Differential geometry of spatial curves and surfaces.
//!
//! The submodules provide the per-integration-point metric quantities that
//! the element routines consume: [`curve`] covers beam center lines
//! (tangent frames transported by rotation operators), [`surface`] covers
//! shell mid-surfaces (covariant/contravariant metric and curvature).

use itertools::izip;
use nalgebra::{DVectorView, Matrix3, Matrix3xX, Vector3};
use numeric_literals::replace_float_literals;
use skald_traits::Real;
use std::error::Error;
use std::fmt;

pub mod curve;
pub mod surface;

/// Errors arising from degenerate element geometry.
///
/// These are precondition violations rather than numerical noise: evaluation
/// cannot continue because no frame can be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryError {
    /// A first parametric derivative has vanishing length, so neither a unit
    /// tangent (curves) nor a unit normal (surfaces) exists.
    DegenerateTangent,
    /// The supplied section director is (numerically) parallel to the
    /// tangent, leaving the cross-section frame undefined.
    DegenerateSectionFrame,
}

impl fmt::Display for GeometryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeometryError::DegenerateTangent => {
                write!(f, "Degenerate tangent: first parametric derivative has vanishing length.")
            }
            GeometryError::DegenerateSectionFrame => {
                write!(f, "Degenerate section frame: director is parallel to the tangent.")
            }
        }
    }
}

impl Error for GeometryError {}

/// The skew-symmetric matrix $[v]_\times$ satisfying $[v]_\times w = v \times w$.
pub fn skew_matrix<T: Real>(v: &Vector3<T>) -> Matrix3<T> {
    Matrix3::new(
        T::zero(), -v.z, v.y,
        v.z, T::zero(), -v.x,
        -v.y, v.x, T::zero(),
    )
}

/// Rotation by the angle $\varphi$ about the unit axis $v$,
/// $$ \mathrm{rod}(v, \varphi) = \cos\varphi \, I + [\sin\varphi \, v]_\times. $$
///
/// The axis must be normalized, and the operator is only applied to vectors
/// orthogonal to the axis.
pub fn rodrigues<T: Real>(axis: &Vector3<T>, angle: T) -> Matrix3<T> {
    let (sin, cos) = angle.sin_cos();
    Matrix3::identity() * cos + skew_matrix(&(axis * sin))
}

/// Derivative of [`rodrigues`] along the curve parameter, for an axis and
/// angle that both depend on the parameter.
pub fn rodrigues_derivative<T: Real>(
    axis: &Vector3<T>,
    axis_der: &Vector3<T>,
    angle: T,
    angle_der: T,
) -> Matrix3<T> {
    let (sin, cos) = angle.sin_cos();
    skew_matrix(&(axis * (cos * angle_der))) + skew_matrix(&(axis_der * sin))
        - Matrix3::identity() * (sin * angle_der)
}

/// The smallest rotation mapping the unit vector $v_1$ onto the unit vector
/// $v_2$,
/// $$ \mathrm{lam}(v_1, v_2) = (v_1 \cdot v_2) I + [v_1 \times v_2]_\times
///    + \frac{(v_1 \times v_2) (v_1 \times v_2)^T}{1 + v_1 \cdot v_2}. $$
///
/// For (numerically) antiparallel inputs the rank-one term degenerates; in
/// that case the rotation flips about the cross-product direction instead.
#[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
pub fn smallest_rotation<T: Real>(v1: &Vector3<T>, v2: &Vector3<T>) -> Matrix3<T> {
    let c = v1.dot(v2);
    let w = v1.cross(v2);
    let mut lam = Matrix3::identity() * c + skew_matrix(&w);
    if c + 1.0 > 1e-7 {
        lam += w * w.transpose() / (1.0 + c);
    } else if w.norm() > 1e-7 {
        let e = w.normalize();
        lam += e * e.transpose() * (1.0 - c);
    }
    lam
}

/// Derivative of [`smallest_rotation`] along the curve parameter.
///
/// Only valid on the main branch of [`smallest_rotation`], i.e. away from
/// the antiparallel configuration.
#[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
pub fn smallest_rotation_derivative<T: Real>(
    v1: &Vector3<T>,
    v1_der: &Vector3<T>,
    v2: &Vector3<T>,
    v2_der: &Vector3<T>,
) -> Matrix3<T> {
    let c = v1.dot(v2);
    debug_assert!(c + 1.0 > 1e-7, "antiparallel configuration has no smooth derivative");
    let c_der = v1_der.dot(v2) + v1.dot(v2_der);
    let w = v1.cross(v2);
    let w_der = v1_der.cross(v2) + v1.cross(v2_der);
    let d = 1.0 / (1.0 + c);
    Matrix3::identity() * c_der + skew_matrix(&w_der) - w * w.transpose() * (c_der * d * d)
        + (w_der * w.transpose() + w * w_der.transpose()) * d
}

/// Contracts nodal coordinates against a vector of per-node weights,
/// $\sum_i w_i \, x_i$.
pub(crate) fn contract<T: Real>(coordinates: &Matrix3xX<T>, weights: DVectorView<T>) -> Vector3<T> {
    assert_eq!(coordinates.ncols(), weights.len());
    let mut result = Vector3::zeros();
    for (x, w) in izip!(coordinates.column_iter(), weights.iter()) {
        result += x * *w;
    }
    result
}
