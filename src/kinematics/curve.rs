//! Geometry of spatial beam center lines.
//!
//! A beam element sees its center line through the first and second
//! parametric derivatives $R_1, R_2$ at an integration point. The reference
//! cross-section orientation is described by a frame transported along the
//! curve with the smallest-rotation and Rodrigues operators; the deformed
//! frame is reconstructed from the same operators in the element routines.

use crate::kinematics::{
    contract, rodrigues, rodrigues_derivative, smallest_rotation, smallest_rotation_derivative,
    GeometryError,
};
use nalgebra::{DVectorView, Matrix3, Matrix3xX, Vector3};
use numeric_literals::replace_float_literals;
use skald_traits::Real;

/// First and second parametric derivatives of a spatial curve at one
/// integration point, together with the associated norm measures.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveDerivatives<T: Real> {
    /// First derivative $R_1 = \sum_i N_i' \, x_i$.
    pub r1: Vector3<T>,
    /// Second derivative $R_2 = \sum_i N_i'' \, x_i$.
    pub r2: Vector3<T>,
    /// Axial measure $A = \lVert R_1 \rVert$.
    pub a: T,
    /// Bending measure $B = \sqrt{\lVert R_2 \rVert^2 - (R_1 \cdot R_2 / A)^2}$.
    pub b: T,
}

impl<T: Real> CurveDerivatives<T> {
    /// Evaluates the curve derivatives from nodal coordinates and the first
    /// and second shape function derivatives at the integration point.
    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    pub fn evaluate(
        coordinates: &Matrix3xX<T>,
        dn: DVectorView<T>,
        ddn: DVectorView<T>,
    ) -> Result<Self, GeometryError> {
        let r1 = contract(coordinates, dn);
        let r2 = contract(coordinates, ddn);
        let a = r1.norm();
        if a <= 1e-8 {
            return Err(GeometryError::DegenerateTangent);
        }
        let projected = r1.dot(&r2) / a;
        let tmp = r2.norm_squared() - projected * projected;
        // The difference cancels to roundoff on (almost) straight segments
        let b = if tmp.abs() > 1e-8 { tmp.abs().sqrt() } else { 0.0 };
        Ok(Self { r1, r2, a, b })
    }

    /// Unit tangent $T = R_1 / A$.
    pub fn unit_tangent(&self) -> Vector3<T> {
        self.r1 / self.a
    }

    /// Parametric derivative of the unit tangent,
    /// $T' = R_2 / A - (R_1 \cdot R_2) \, R_1 / A^3$.
    pub fn unit_tangent_derivative(&self) -> Vector3<T> {
        let a = self.a;
        self.r2 / a - self.r1 * (self.r1.dot(&self.r2) / (a * a * a))
    }
}

/// Reference cross-section frame of a beam at one integration point.
///
/// Captured once at element initialization from the user-supplied section
/// directors and the pretwist angle; every member is a constant of the
/// subsequent nonlinear iteration. The deformed frame is obtained by
/// composing the stored operators with their displacement-dependent
/// counterparts,
/// $$ \Lambda = \mathrm{rod}(t, \varphi) \,\mathrm{lam}(T, t)
///    \,\mathrm{rod}(T, \Phi) \,\mathrm{lam}(T_0, T). $$
#[derive(Debug, Clone, PartialEq)]
pub struct CrossSectionFrame<T: Real> {
    /// Unit tangent $T$.
    pub t: Vector3<T>,
    /// Parametric derivative $T'$.
    pub t_der: Vector3<T>,
    /// First section director $N_0$, orthonormalized against the supplied
    /// tangent director.
    pub n0: Vector3<T>,
    /// Second section director $V_0 = T_0 \times N_0$.
    pub v0: Vector3<T>,
    /// Pretwist rotation $\mathrm{rod}(T, \Phi)$.
    pub rod: Matrix3<T>,
    /// Parametric derivative of the pretwist rotation.
    pub rod_der: Matrix3<T>,
    /// Director transport $\mathrm{lam}(T_0, T)$.
    pub lam: Matrix3<T>,
    /// Parametric derivative of the director transport.
    pub lam_der: Matrix3<T>,
    /// Reference bending measure conjugate to the first director.
    pub b_n: T,
    /// Reference bending measure conjugate to the second director.
    pub b_v: T,
    /// Reference torsion measure $C_{12}$.
    pub c12: T,
    /// Reference torsion measure $C_{13}$.
    pub c13: T,
}

impl<T: Real> CrossSectionFrame<T> {
    /// Builds the reference frame from the curve derivatives, the section
    /// directors $T_0$ (tangent-like) and $N_0$, and the pretwist angle
    /// $\Phi$ with its parametric derivative.
    ///
    /// The directors need not be normalized; $N_0$ is orthonormalized
    /// against $T_0$ before use.
    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    pub fn reference(
        curve: &CurveDerivatives<T>,
        tangent_director: &Vector3<T>,
        section_director: &Vector3<T>,
        pretwist: T,
        pretwist_der: T,
    ) -> Result<Self, GeometryError> {
        let t = curve.unit_tangent();
        let t_der = curve.unit_tangent_derivative();

        let t0_norm = tangent_director.norm();
        if t0_norm <= 1e-8 {
            return Err(GeometryError::DegenerateSectionFrame);
        }
        let t0 = tangent_director / t0_norm;
        let mut n0 = section_director - t0 * t0.dot(section_director);
        let n0_norm = n0.norm();
        if n0_norm <= 1e-8 {
            return Err(GeometryError::DegenerateSectionFrame);
        }
        n0 /= n0_norm;
        let v0 = t0.cross(&n0);

        let lam = smallest_rotation(&t0, &t);
        let lam_der = smallest_rotation_derivative(&t0, &Vector3::zeros(), &t, &t_der);
        let rod = rodrigues(&t, pretwist);
        let rod_der = rodrigues_derivative(&t, &t_der, pretwist, pretwist_der);

        // Directors rotated into the pretwisted reference configuration
        let n_rot = (rod * lam * n0).normalize();
        let v_rot = t.cross(&n_rot);

        let frame_der = rod_der * lam + rod * lam_der;
        let n_der = frame_der * n0;
        let v_der = frame_der * v0;

        let b_n = n_der.dot(&curve.r1);
        let b_v = v_der.dot(&curve.r1);
        let c12 = v_der.dot(&n_rot);
        let c13 = n_der.dot(&v_rot);

        Ok(Self {
            t,
            t_der,
            n0,
            v0,
            rod,
            rod_der,
            lam,
            lam_der,
            b_n,
            b_v,
            c12,
            c13,
        })
    }
}
