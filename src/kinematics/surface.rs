//! Geometry of shell mid-surfaces.

use crate::kinematics::{contract, GeometryError};
use nalgebra::{DMatrixView, Matrix3, Matrix3xX, Vector3};
use numeric_literals::replace_float_literals;
use skald_traits::Real;

/// Metric quantities of a parametrized surface at one integration point.
///
/// Curvature-like 3-vectors are ordered by parametric direction pairs
/// $(\xi\xi, \eta\eta, \xi\eta)$, matching the Voigt ordering of the strain
/// measures built on top of them.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceMetric<T: Real> {
    /// Covariant base vector $g_1 = \partial_\xi x$.
    pub g1: Vector3<T>,
    /// Covariant base vector $g_2 = \partial_\eta x$.
    pub g2: Vector3<T>,
    /// Normal-direction vector $g_3 = g_1 \times g_2$.
    pub g3: Vector3<T>,
    /// Differential area measure $\mathrm{d}A = \lVert g_3 \rVert$.
    pub da: T,
    /// Unit normal $n = g_3 / \mathrm{d}A$.
    pub normal: Vector3<T>,
    /// Covariant metric coefficients $[g_{11}, g_{22}, g_{12}]$.
    pub gab: Vector3<T>,
    /// Curvature coefficients $b_{\alpha\beta} = H_{\alpha\beta} \cdot n$.
    pub curvature: Vector3<T>,
    /// Contravariant metric coefficients $[g^{11}, g^{22}, g^{12}]$.
    pub gab_con: Vector3<T>,
    /// Surface Hessian; column $k$ holds the second derivative of the
    /// position in the $k$-th parametric direction pair.
    pub h: Matrix3<T>,
    /// Transformation of strain-like covariant quantities into the local
    /// cartesian basis.
    pub q: Matrix3<T>,
    /// Transformation of stress-like contravariant quantities into the local
    /// cartesian basis.
    pub t: Matrix3<T>,
}

impl<T: Real> SurfaceMetric<T> {
    /// Evaluates the surface metric from nodal coordinates and the first and
    /// second parametric shape function derivatives at the integration
    /// point.
    ///
    /// `dn` has one row per node and columns $(\xi, \eta)$; `ddn` has one
    /// row per node and columns $(\xi\xi, \eta\eta, \xi\eta)$.
    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    pub fn evaluate(
        coordinates: &Matrix3xX<T>,
        dn: DMatrixView<T>,
        ddn: DMatrixView<T>,
    ) -> Result<Self, GeometryError> {
        assert_eq!(dn.ncols(), 2);
        assert_eq!(ddn.ncols(), 3);
        assert_eq!(coordinates.ncols(), dn.nrows());
        assert_eq!(coordinates.ncols(), ddn.nrows());

        let g1 = contract(coordinates, dn.column(0));
        let g2 = contract(coordinates, dn.column(1));
        let g3 = g1.cross(&g2);
        let da = g3.norm();
        if da <= 1e-8 {
            return Err(GeometryError::DegenerateTangent);
        }
        let normal = g3 / da;

        let gab = Vector3::new(g1.norm_squared(), g2.norm_squared(), g1.dot(&g2));

        let h = Matrix3::from_columns(&[
            contract(coordinates, ddn.column(0)),
            contract(coordinates, ddn.column(1)),
            contract(coordinates, ddn.column(2)),
        ]);
        let curvature = h.tr_mul(&normal);

        let inv_det = 1.0 / (gab.x * gab.y - gab.z * gab.z);
        let gab_con = Vector3::new(inv_det * gab.y, inv_det * gab.x, -inv_det * gab.z);

        // Contravariant base vector conjugate to g2; e1 is aligned with g1,
        // e2 with the reciprocal direction, which makes (e1, e2) orthonormal
        let g_con_2 = g1 * gab_con.z + g2 * gab_con.y;
        let e1 = g1.normalize();
        let e2 = g_con_2.normalize();

        let e_g11 = e1.dot(&g1);
        let e_g12 = e1.dot(&g2);
        let e_g21 = e2.dot(&g1);
        let e_g22 = e2.dot(&g2);

        let q = Matrix3::new(
            e_g11 * e_g11, e_g12 * e_g12, 2.0 * e_g11 * e_g12,
            e_g21 * e_g21, e_g22 * e_g22, 2.0 * e_g21 * e_g22,
            2.0 * e_g11 * e_g21, 2.0 * e_g12 * e_g22, 2.0 * e_g11 * e_g22 + e_g12 * e_g21,
        );
        let t = Matrix3::new(
            e_g11 * e_g11, e_g21 * e_g21, 2.0 * e_g11 * e_g21,
            e_g12 * e_g12, e_g22 * e_g22, 2.0 * e_g12 * e_g22,
            e_g11 * e_g12, e_g21 * e_g22, e_g11 * e_g22 + e_g12 * e_g21,
        );

        Ok(Self {
            g1,
            g2,
            g3,
            da,
            normal,
            gab,
            curvature,
            gab_con,
            h,
            q,
            t,
        })
    }
}
