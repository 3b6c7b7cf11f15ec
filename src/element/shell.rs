//! Geometrically nonlinear Kirchhoff-Love shell element.
//!
//! The element carries three displacement degrees of freedom per node and
//! requires $C^1$-continuous shape functions; rotations are implicit in the
//! mid-surface normal. Its measures are the cartesian membrane strain
//! $$ \hat{E} = Q \, \tfrac{1}{2} (g_{\alpha\beta} - G_{\alpha\beta}) $$
//! and the cartesian curvature change
//! $$ \hat{K} = Q \, (B_{\alpha\beta} - b_{\alpha\beta}), $$
//! both in Voigt order with the engineering shear in the third component.
//! The curvature measure carries bending stiffness $t^2/12$ relative to the
//! membrane stiffness; the common thickness factor sits in the integration
//! measure $w \, \mathrm{d}A \, t$. Variations of both measures with respect
//! to the DOFs are obtained by seeding the covariant base vectors and the
//! surface Hessian and pushing them through the [`variation`] combinators.

use crate::element::{Element, ElementError, ShapeFunctionData};
use crate::kinematics::surface::SurfaceMetric;
use crate::kinematics::{contract, GeometryError};
use crate::material::{ConstitutiveLaw, MaterialError};
use crate::variation::{self, Variation2};
use itertools::izip;
use nalgebra::{
    DMatrixView, DMatrixViewMut, DVector, DVectorView, DVectorViewMut, Matrix3, Matrix3xX, Vector3,
};
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};
use skald_traits::Real;

const DOFS_PER_NODE: usize = 3;

/// Thickness and density of a shell element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShellProperties<T> {
    pub thickness: T,
    pub density: T,
}

/// Stress resultants recovered at one integration point.
///
/// Forces and moments are per unit length of the mid-surface, in the local
/// cartesian basis and Voigt order. `von_mises_top` is the von Mises stress
/// of the outer fiber, $\sigma = n / t + 6 m / t^2$.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceResultants<T> {
    pub membrane_force: Vector3<T>,
    pub bending_moment: Vector3<T>,
    pub von_mises_top: T,
}

/// Kirchhoff-Love shell element over a $C^1$ mid-surface patch.
#[derive(Debug, Clone)]
pub struct ShellElement<T: Real> {
    node_indices: Vec<usize>,
    reference_coordinates: Matrix3xX<T>,
    shape_data: Vec<ShapeFunctionData<T>>,
    reference: Vec<SurfaceMetric<T>>,
    properties: ShellProperties<T>,
    law: Box<dyn ConstitutiveLaw<T>>,
}

impl<T: Real> ShellElement<T> {
    /// Builds the element and captures its reference metric.
    ///
    /// The constitutive law prototype is cloned into the element and must
    /// operate on three-component Voigt strain vectors.
    pub fn new(
        node_indices: Vec<usize>,
        reference_coordinates: Matrix3xX<T>,
        shape_data: Vec<ShapeFunctionData<T>>,
        properties: ShellProperties<T>,
        law: &dyn ConstitutiveLaw<T>,
    ) -> Result<Self, ElementError> {
        let num_nodes = node_indices.len();
        assert_eq!(reference_coordinates.ncols(), num_nodes);
        assert!(!shape_data.is_empty(), "element must have at least one integration point");
        for data in &shape_data {
            assert_eq!(data.values.len(), num_nodes);
            assert_eq!(data.first_derivatives.nrows(), num_nodes);
            assert_eq!(data.first_derivatives.ncols(), 2);
            assert_eq!(data.second_derivatives.nrows(), num_nodes);
            assert_eq!(data.second_derivatives.ncols(), 3);
        }

        let mut reference = Vec::with_capacity(shape_data.len());
        for data in &shape_data {
            let metric = SurfaceMetric::evaluate(
                &reference_coordinates,
                DMatrixView::from(&data.first_derivatives),
                DMatrixView::from(&data.second_derivatives),
            )?;
            reference.push(metric);
        }

        Ok(Self {
            node_indices,
            reference_coordinates,
            shape_data,
            reference,
            properties,
            law: law.clone_box(),
        })
    }

    pub fn properties(&self) -> &ShellProperties<T> {
        &self.properties
    }

    fn displaced_coordinates(&self, u_local: DVectorView<T>) -> Matrix3xX<T> {
        let mut coordinates = self.reference_coordinates.clone();
        for (i, mut column) in coordinates.column_iter_mut().enumerate() {
            for k in 0..3 {
                column[k] += u_local[DOFS_PER_NODE * i + k];
            }
        }
        coordinates
    }

    fn check_dimension(&self, actual: usize) -> Result<(), ElementError> {
        let expected = self.num_local_dofs();
        if actual != expected {
            return Err(ElementError::BufferDimensionMismatch { expected, actual });
        }
        Ok(())
    }

    /// Cartesian membrane strain and curvature change values at one
    /// integration point, from the current metric alone.
    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    fn measure_values(
        current: &SurfaceMetric<T>,
        reference: &SurfaceMetric<T>,
    ) -> (Vector3<T>, Vector3<T>) {
        let membrane = reference.q * ((current.gab - reference.gab) * 0.5);
        let bending = reference.q * (reference.curvature - current.curvature);
        (membrane, bending)
    }

    /// Membrane force and bending moment resultants per integration point at
    /// the given local displacements.
    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    pub fn surface_resultants(
        &mut self,
        u_local: DVectorView<T>,
    ) -> Result<Vec<SurfaceResultants<T>>, ElementError> {
        self.check_dimension(u_local.len())?;
        let current = self.displaced_coordinates(u_local);
        let thickness = self.properties.thickness;
        let mut resultants = Vec::with_capacity(self.shape_data.len());
        for (data, reference) in izip!(&self.shape_data, &self.reference) {
            let metric = SurfaceMetric::evaluate(
                &current,
                DMatrixView::from(&data.first_derivatives),
                DMatrixView::from(&data.second_derivatives),
            )?;
            let (membrane, bending) = Self::measure_values(&metric, reference);
            let response = self
                .law
                .calculate_material_response(&DVector::from_column_slice(membrane.as_slice()))?;

            let membrane_force = Vector3::new(
                response.stress[0],
                response.stress[1],
                response.stress[2],
            ) * thickness;
            let bending_moment =
                &response.tangent * bending * (thickness * thickness * thickness / 12.0);
            let bending_moment = Vector3::new(bending_moment[0], bending_moment[1], bending_moment[2]);

            let top = membrane_force / thickness
                + bending_moment * (6.0 / (thickness * thickness));
            let von_mises_top = (top.x * top.x + top.y * top.y - top.x * top.y
                + 3.0 * top.z * top.z)
                .sqrt();

            resultants.push(SurfaceResultants {
                membrane_force,
                bending_moment,
                von_mises_top,
            });
        }
        Ok(resultants)
    }
}

/// Transforms the three covariant measure components into the local
/// cartesian basis of the reference metric.
fn cartesian_components<T: Real>(
    q: &Matrix3<T>,
    covariant: &[Variation2<T>; 3],
) -> [Variation2<T>; 3] {
    std::array::from_fn(|i| {
        covariant[0].clone() * q[(i, 0)]
            + covariant[1].clone() * q[(i, 1)]
            + covariant[2].clone() * q[(i, 2)]
    })
}

/// Membrane and curvature measures at one integration point as variations
/// with respect to the local DOFs.
#[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
fn compute_measures<T: Real>(
    current: &Matrix3xX<T>,
    data: &ShapeFunctionData<T>,
    reference: &SurfaceMetric<T>,
) -> Result<([Variation2<T>; 3], [Variation2<T>; 3]), ElementError> {
    let num_nodes = current.ncols();
    let num_dofs = DOFS_PER_NODE * num_nodes;
    let dn = &data.first_derivatives;
    let ddn = &data.second_derivatives;

    // DOF-linear seeds: covariant base vectors and Hessian columns
    let seed = |weights: DVectorView<T>| {
        let value = contract(current, weights);
        let mut first = vec![Vector3::zeros(); num_dofs];
        for i in 0..num_nodes {
            for k in 0..3 {
                first[DOFS_PER_NODE * i + k][k] = weights[i];
            }
        }
        Variation2::from_first(value, first)
    };
    let g1 = seed(dn.column(0));
    let g2 = seed(dn.column(1));
    let hessian = [seed(ddn.column(0)), seed(ddn.column(1)), seed(ddn.column(2))];

    let g3 = variation::cross(&g1, &g2);
    if g3.value().norm() <= 1e-8 {
        return Err(GeometryError::DegenerateTangent.into());
    }
    let normal = variation::normalize(&g3);

    let membrane_cov = [
        (variation::dot(&g1, &g1) - Variation2::constant(reference.gab.x, num_dofs)) * 0.5,
        (variation::dot(&g2, &g2) - Variation2::constant(reference.gab.y, num_dofs)) * 0.5,
        (variation::dot(&g1, &g2) - Variation2::constant(reference.gab.z, num_dofs)) * 0.5,
    ];
    // Reference minus current, so that all measures share the assembly sign
    let bending_cov = [
        Variation2::constant(reference.curvature.x, num_dofs)
            - variation::dot(&hessian[0], &normal),
        Variation2::constant(reference.curvature.y, num_dofs)
            - variation::dot(&hessian[1], &normal),
        Variation2::constant(reference.curvature.z, num_dofs)
            - variation::dot(&hessian[2], &normal),
    ];

    let membrane = cartesian_components(&reference.q, &membrane_cov);
    let bending = cartesian_components(&reference.q, &bending_cov);
    Ok((membrane, bending))
}

impl<T: Real> Element<T> for ShellElement<T> {
    fn num_nodes(&self) -> usize {
        self.node_indices.len()
    }

    fn dofs_per_node(&self) -> usize {
        DOFS_PER_NODE
    }

    fn node_indices(&self) -> &[usize] {
        &self.node_indices
    }

    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    fn compute_local_system(
        &mut self,
        u_local: DVectorView<T>,
        mut stiffness: DMatrixViewMut<T>,
        mut forces: DVectorViewMut<T>,
    ) -> Result<(), ElementError> {
        let num_dofs = self.num_local_dofs();
        self.check_dimension(u_local.len())?;
        self.check_dimension(forces.len())?;
        self.check_dimension(stiffness.nrows())?;
        self.check_dimension(stiffness.ncols())?;

        let thickness = self.properties.thickness;
        let bend_factor = thickness * thickness / 12.0;
        let current = self.displaced_coordinates(u_local);

        for (data, reference) in izip!(&self.shape_data, &self.reference) {
            let (membrane, bending) = compute_measures(&current, data, reference)?;

            let strain = DVector::from_vec(vec![
                *membrane[0].value(),
                *membrane[1].value(),
                *membrane[2].value(),
            ]);
            let response = self.law.calculate_material_response(&strain)?;
            let tangent = &response.tangent;

            // Bending stress conjugate to the curvature measure, scaled so
            // the thickness cube distributes over measure and modulus
            let mut moment: Vector3<T> = Vector3::zeros();
            for i in 0..3 {
                for j in 0..3 {
                    moment[i] += tangent[(i, j)] * *bending[j].value() * bend_factor;
                }
            }

            let measure = data.weight * reference.da * thickness;

            for r in 0..num_dofs {
                let mut force = T::zero();
                for i in 0..3 {
                    force += response.stress[i] * *membrane[i].first(r)
                        + moment[i] * *bending[i].first(r);
                }
                forces[r] -= measure * force;

                for s in 0..num_dofs {
                    let mut entry = T::zero();
                    for i in 0..3 {
                        for j in 0..3 {
                            entry += tangent[(i, j)]
                                * (*membrane[i].first(r) * *membrane[j].first(s)
                                    + bend_factor
                                        * *bending[i].first(r)
                                        * *bending[j].first(s));
                        }
                        entry += response.stress[i] * *membrane[i].second(r, s)
                            + moment[i] * *bending[i].second(r, s);
                    }
                    stiffness[(r, s)] += measure * entry;
                }
            }
        }

        Ok(())
    }

    fn compute_mass_matrix(&self, mut mass: DMatrixViewMut<T>) -> Result<(), ElementError> {
        self.check_dimension(mass.nrows())?;
        self.check_dimension(mass.ncols())?;

        let num_nodes = self.num_nodes();
        for (data, reference) in izip!(&self.shape_data, &self.reference) {
            // Mass per mid-surface area is density times thickness
            let measure =
                self.properties.density * self.properties.thickness * reference.da * data.weight;
            for i in 0..num_nodes {
                for j in 0..num_nodes {
                    let entry = data.values[i] * data.values[j] * measure;
                    for k in 0..3 {
                        mass[(DOFS_PER_NODE * i + k, DOFS_PER_NODE * j + k)] += entry;
                    }
                }
            }
        }
        Ok(())
    }

    fn finalize_step(&mut self, u_local: DVectorView<T>) -> Result<(), ElementError> {
        self.check_dimension(u_local.len())?;
        let current = self.displaced_coordinates(u_local);
        for (data, reference) in izip!(&self.shape_data, &self.reference) {
            let metric = SurfaceMetric::evaluate(
                &current,
                DMatrixView::from(&data.first_derivatives),
                DMatrixView::from(&data.second_derivatives),
            )?;
            // History is driven by the membrane strain
            let (membrane, _) = Self::measure_values(&metric, reference);
            self.law
                .finalize_step(&DVector::from_column_slice(membrane.as_slice()))?;
        }
        Ok(())
    }

    fn check(&self) -> Result<(), ElementError> {
        self.law.check()?;
        if self.law.strain_size() != 3 {
            return Err(MaterialError::IncompatibleStrainSize {
                expected: 3,
                actual: self.law.strain_size(),
            }
            .into());
        }
        if self.properties.thickness <= T::zero() {
            return Err(MaterialError::InvalidParameter("thickness must be positive").into());
        }
        if self.properties.density < T::zero() {
            return Err(MaterialError::InvalidParameter("density must be non-negative").into());
        }
        Ok(())
    }
}
