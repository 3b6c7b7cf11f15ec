//! Geometrically nonlinear spatial beam element on curved center lines.
//!
//! The element carries four degrees of freedom per node (three displacements
//! and a twist angle about the current tangent). Its strain measures are the
//! axial Green-Lagrange strain, two bending curvature deviations and two
//! torsion deviations, all expressed relative to the reference configuration.
//! The deformed cross-section frame is reconstructed at every integration
//! point from the rotation chain
//! $$ \Lambda = \mathrm{rod}(t, \varphi) \,\mathrm{lam}(T, t)
//!    \,\mathrm{rod}(T, \Phi) \,\mathrm{lam}(T_0, T), $$
//! where the two left factors depend on the displacements and the two right
//! factors are reference constants. First and second variations of every
//! measure are obtained by seeding the DOF-linear quantities ($r_1$, $r_2$,
//! $\varphi$, $\varphi'$) and pushing them through the [`variation`]
//! combinators; no variation is hand-derived.

use crate::element::{Element, ElementError, ShapeFunctionData};
use crate::kinematics::curve::{CrossSectionFrame, CurveDerivatives};
use crate::kinematics::{contract, GeometryError};
use crate::material::{ConstitutiveLaw, MaterialError};
use crate::variation::{self, Variation2};
use itertools::izip;
use nalgebra::{DMatrixViewMut, DVector, DVectorView, DVectorViewMut, Matrix3xX, Vector3};
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};
use skald_traits::Real;

const DOFS_PER_NODE: usize = 4;

/// Cross-section and inertia constants of a beam element.
///
/// The moments of inertia are named after the curvature measure they resist:
/// `moment_of_inertia_n` multiplies the curvature conjugate to the first
/// section director $N_0$, `moment_of_inertia_v` the one conjugate to
/// $V_0$. The pretwist angle $\Phi$ and its parametric derivative are
/// constant over the element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeamProperties<T> {
    pub area: T,
    pub moment_of_inertia_n: T,
    pub moment_of_inertia_v: T,
    pub torsion_constant: T,
    pub shear_modulus: T,
    pub density: T,
    pub pretwist: T,
    pub pretwist_derivative: T,
    pub prestress_bending_n: T,
    pub prestress_bending_v: T,
    pub prestress_torsion: T,
}

/// Reference geometry captured once per integration point.
#[derive(Debug, Clone, PartialEq)]
struct ReferencePoint<T: Real> {
    curve: CurveDerivatives<T>,
    frame: CrossSectionFrame<T>,
}

/// Spatial Bernoulli beam element with torsion.
#[derive(Debug, Clone)]
pub struct BeamElement<T: Real> {
    node_indices: Vec<usize>,
    reference_coordinates: Matrix3xX<T>,
    shape_data: Vec<ShapeFunctionData<T>>,
    reference: Vec<ReferencePoint<T>>,
    properties: BeamProperties<T>,
    law: Box<dyn ConstitutiveLaw<T>>,
}

impl<T: Real> BeamElement<T> {
    /// Builds the element and captures its reference geometry.
    ///
    /// `tangent_director` and `section_director` describe the reference
    /// cross-section orientation; they need not be normalized. The
    /// constitutive law prototype is cloned into the element and must
    /// operate on the single axial strain component.
    pub fn new(
        node_indices: Vec<usize>,
        reference_coordinates: Matrix3xX<T>,
        shape_data: Vec<ShapeFunctionData<T>>,
        tangent_director: Vector3<T>,
        section_director: Vector3<T>,
        properties: BeamProperties<T>,
        law: &dyn ConstitutiveLaw<T>,
    ) -> Result<Self, ElementError> {
        let num_nodes = node_indices.len();
        assert_eq!(reference_coordinates.ncols(), num_nodes);
        assert!(!shape_data.is_empty(), "element must have at least one integration point");
        for data in &shape_data {
            assert_eq!(data.values.len(), num_nodes);
            assert_eq!(data.first_derivatives.nrows(), num_nodes);
            assert_eq!(data.first_derivatives.ncols(), 1);
            assert_eq!(data.second_derivatives.nrows(), num_nodes);
            assert_eq!(data.second_derivatives.ncols(), 1);
        }

        let mut reference = Vec::with_capacity(shape_data.len());
        for data in &shape_data {
            let curve = CurveDerivatives::evaluate(
                &reference_coordinates,
                data.first_derivatives.column(0),
                data.second_derivatives.column(0),
            )?;
            let frame = CrossSectionFrame::reference(
                &curve,
                &tangent_director,
                &section_director,
                properties.pretwist,
                properties.pretwist_derivative,
            )?;
            reference.push(ReferencePoint { curve, frame });
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

    pub fn properties(&self) -> &BeamProperties<T> {
        &self.properties
    }

    /// Nodal positions displaced by the translational DOFs.
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

    /// Axial strain at one integration point for given current coordinates.
    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    fn axial_strain(
        &self,
        current: &Matrix3xX<T>,
        data: &ShapeFunctionData<T>,
        reference: &ReferencePoint<T>,
    ) -> Result<T, ElementError> {
        let curve = CurveDerivatives::evaluate(
            current,
            data.first_derivatives.column(0),
            data.second_derivatives.column(0),
        )?;
        let a_ref = reference.curve.a;
        Ok(0.5 * (curve.a * curve.a - a_ref * a_ref) / (a_ref * a_ref))
    }

    /// Work-conjugate axial force $N = A \, S_{11}$ per integration point at
    /// the given local displacements.
    pub fn axial_forces(&mut self, u_local: DVectorView<T>) -> Result<Vec<T>, ElementError> {
        self.check_dimension(u_local.len())?;
        let current = self.displaced_coordinates(u_local);
        let mut forces = Vec::with_capacity(self.shape_data.len());
        for (data, reference) in izip!(&self.shape_data, &self.reference) {
            let strain = self.axial_strain(&current, data, reference)?;
            let response = self
                .law
                .calculate_material_response(&DVector::from_element(1, strain))?;
            forces.push(self.properties.area * response.stress[0]);
        }
        Ok(forces)
    }
}

/// Strain measures at one integration point as variations with respect to
/// the local DOFs.
struct BeamMeasures<T: Real> {
    axial: Variation2<T>,
    curvature_n: Variation2<T>,
    curvature_v: Variation2<T>,
    torsion_12: Variation2<T>,
    torsion_13: Variation2<T>,
}

#[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
fn compute_measures<T: Real>(
    current: &Matrix3xX<T>,
    u_local: DVectorView<T>,
    data: &ShapeFunctionData<T>,
    reference: &ReferencePoint<T>,
) -> Result<BeamMeasures<T>, ElementError> {
    let num_nodes = current.ncols();
    let num_dofs = DOFS_PER_NODE * num_nodes;
    let dn = data.first_derivatives.column(0);
    let ddn = data.second_derivatives.column(0);

    // DOF-linear seeds: the two curve derivatives from the translational
    // DOFs, the twist angle and its parametric derivative from the
    // rotational DOFs.
    let r1_value = contract(current, dn);
    let r2_value = contract(current, ddn);
    let mut phi_value = T::zero();
    let mut phi_der_value = T::zero();
    let mut r1_first = vec![Vector3::zeros(); num_dofs];
    let mut r2_first = vec![Vector3::zeros(); num_dofs];
    let mut phi_first = vec![T::zero(); num_dofs];
    let mut phi_der_first = vec![T::zero(); num_dofs];
    for i in 0..num_nodes {
        phi_value += data.values[i] * u_local[DOFS_PER_NODE * i + 3];
        phi_der_value += dn[i] * u_local[DOFS_PER_NODE * i + 3];
        for k in 0..3 {
            r1_first[DOFS_PER_NODE * i + k][k] = dn[i];
            r2_first[DOFS_PER_NODE * i + k][k] = ddn[i];
        }
        phi_first[DOFS_PER_NODE * i + 3] = data.values[i];
        phi_der_first[DOFS_PER_NODE * i + 3] = dn[i];
    }
    if r1_value.norm() <= 1e-8 {
        return Err(GeometryError::DegenerateTangent.into());
    }
    let r1 = Variation2::from_first(r1_value, r1_first);
    let r2 = Variation2::from_first(r2_value, r2_first);
    let phi = Variation2::from_first(phi_value, phi_first);
    let phi_der = Variation2::from_first(phi_der_value, phi_der_first);

    // Current unit tangent t = r1 / |r1| and its parametric derivative
    // t' = r2 / |r1| + r1 d/ds(1/|r1|), with d/ds(1/|r1|) = -(r1 . r2)/|r1|^3
    let inv_len = variation::inv_norm(&r1);
    let inv_len_cubed = variation::scale_by(&inv_len, &variation::scale_by(&inv_len, &inv_len));
    let inv_len_der = -variation::scale_by(&variation::dot(&r1, &r2), &inv_len_cubed);
    let tangent = variation::scale_by(&inv_len, &r1);
    let tangent_der =
        variation::scale_by(&inv_len, &r2) + variation::scale_by(&inv_len_der, &r1);

    // Rotation chain: the twist and transport factors depend on the DOFs,
    // the pretwist and reference transport factors are constants.
    let frame = &reference.frame;
    let (rod, rod_der) = variation::rodrigues_pair(&tangent, &tangent_der, &phi, &phi_der);
    let ref_t = Variation2::constant(frame.t, num_dofs);
    let ref_t_der = Variation2::constant(frame.t_der, num_dofs);
    let (lam, lam_der) = variation::smallest_rotation_pair(&ref_t, &ref_t_der, &tangent, &tangent_der);

    let ref_rod = Variation2::constant(frame.rod, num_dofs);
    let ref_rod_der = Variation2::constant(frame.rod_der, num_dofs);
    let ref_lam = Variation2::constant(frame.lam, num_dofs);
    let ref_lam_der = Variation2::constant(frame.lam_der, num_dofs);

    let tail = variation::compose(&ref_rod, &ref_lam);
    let tail_der =
        variation::compose(&ref_rod_der, &ref_lam) + variation::compose(&ref_rod, &ref_lam_der);
    let mid = variation::compose(&lam, &tail);
    let mid_der = variation::compose(&lam_der, &tail) + variation::compose(&lam, &tail_der);
    let full = variation::compose(&rod, &mid);
    let full_der = variation::compose(&rod_der, &mid) + variation::compose(&rod, &mid_der);

    // Deformed section directors and their parametric derivatives
    let n0 = Variation2::constant(frame.n0, num_dofs);
    let v0 = Variation2::constant(frame.v0, num_dofs);
    let director_n = variation::apply(&full, &n0);
    let director_v = variation::apply(&full, &v0);
    let director_n_der = variation::apply(&full_der, &n0);
    let director_v_der = variation::apply(&full_der, &v0);

    let a = reference.curve.a;
    let axial = (variation::dot(&r1, &r1) - Variation2::constant(a * a, num_dofs))
        * (0.5 / (a * a));
    let curvature_n = (variation::dot(&director_n_der, &r1)
        - Variation2::constant(frame.b_n, num_dofs))
        * (1.0 / (a * a));
    let curvature_v = (variation::dot(&director_v_der, &r1)
        - Variation2::constant(frame.b_v, num_dofs))
        * (1.0 / (a * a));
    let torsion_12 = (variation::dot(&director_v_der, &director_n)
        - Variation2::constant(frame.c12, num_dofs))
        * (1.0 / a);
    let torsion_13 = (variation::dot(&director_n_der, &director_v)
        - Variation2::constant(frame.c13, num_dofs))
        * (1.0 / a);

    Ok(BeamMeasures {
        axial,
        curvature_n,
        curvature_v,
        torsion_12,
        torsion_13,
    })
}

impl<T: Real> Element<T> for BeamElement<T> {
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

        let p = self.properties;
        let torsion_modulus = p.shear_modulus * p.torsion_constant;
        let current = self.displaced_coordinates(u_local);

        for (data, reference) in izip!(&self.shape_data, &self.reference) {
            let m = compute_measures(&current, u_local, data, reference)?;

            let response = self
                .law
                .calculate_material_response(&DVector::from_element(1, *m.axial.value()))?;
            let stress = response.stress[0];
            let tangent_modulus = response.tangent[(0, 0)];

            // Work-conjugate stresses of the five measures; the twist
            // prestress loads the two torsion measures with opposite sign.
            let blocks: [(T, T, &Variation2<T>); 5] = [
                (p.area * stress, tangent_modulus * p.area, &m.axial),
                (
                    p.prestress_bending_n
                        + tangent_modulus * p.moment_of_inertia_n * *m.curvature_n.value(),
                    tangent_modulus * p.moment_of_inertia_n,
                    &m.curvature_n,
                ),
                (
                    p.prestress_bending_v
                        + tangent_modulus * p.moment_of_inertia_v * *m.curvature_v.value(),
                    tangent_modulus * p.moment_of_inertia_v,
                    &m.curvature_v,
                ),
                (
                    0.5 * (torsion_modulus * *m.torsion_12.value() - p.prestress_torsion),
                    0.5 * torsion_modulus,
                    &m.torsion_12,
                ),
                (
                    0.5 * (torsion_modulus * *m.torsion_13.value() + p.prestress_torsion),
                    0.5 * torsion_modulus,
                    &m.torsion_13,
                ),
            ];

            // Arc length measure of the integration point
            let measure = data.weight * reference.curve.a;

            for r in 0..num_dofs {
                let mut force = T::zero();
                for (stress, _, strain) in &blocks {
                    force += *stress * *strain.first(r);
                }
                forces[r] -= measure * force;

                for s in 0..num_dofs {
                    let mut entry = T::zero();
                    for (stress, modulus, strain) in &blocks {
                        entry += *modulus * *strain.first(r) * *strain.first(s)
                            + *stress * *strain.second(r, s);
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
            let measure =
                self.properties.density * self.properties.area * reference.curve.a * data.weight;
            for i in 0..num_nodes {
                for j in 0..num_nodes {
                    let entry = data.values[i] * data.values[j] * measure;
                    // Rotational inertia is not carried; the twist rows stay zero
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
            let strain = self.axial_strain(&current, data, reference)?;
            self.law.finalize_step(&DVector::from_element(1, strain))?;
        }
        Ok(())
    }

    fn check(&self) -> Result<(), ElementError> {
        self.law.check()?;
        if self.law.strain_size() != 1 {
            return Err(MaterialError::IncompatibleStrainSize {
                expected: 1,
                actual: self.law.strain_size(),
            }
            .into());
        }
        let p = &self.properties;
        if p.area <= T::zero() {
            return Err(MaterialError::InvalidParameter("area must be positive").into());
        }
        if p.moment_of_inertia_n < T::zero()
            || p.moment_of_inertia_v < T::zero()
            || p.torsion_constant < T::zero()
            || p.shear_modulus < T::zero()
            || p.density < T::zero()
        {
            return Err(MaterialError::InvalidParameter(
                "section constants must be non-negative",
            )
            .into());
        }
        Ok(())
    }
}
