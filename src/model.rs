//! Structural model and nonlinear equilibrium driver.
//!
//! [`StructuralModel`] owns the node positions, the elements with their
//! cloned constitutive laws, the displacement state and the external
//! loads. It implements the solver-side function traits so that Newton
//! iteration and line search can drive it directly: the residual is
//! $F(u) = F_{int}(u) - F_{ext}$ and the Jacobian is the assembled
//! tangent stiffness, solved by a sparse Cholesky factorization after
//! symmetric elimination of the Dirichlet nodes.
//!
//! A typical quasi-static analysis registers materials, adds elements,
//! applies loads and constraints, then alternates
//! [`solve_step`](StructuralModel::solve_step) and
//! [`finalize_step`](StructuralModel::finalize_step) over the load
//! history.

use crate::assembly::{
    apply_homogeneous_dirichlet_bc_csr, apply_homogeneous_dirichlet_bc_rhs, gather_global_to_local,
    AssemblyError, CsrAssembler, CsrParAssembler, ElementConnectivityAssembler,
    ElementMatrixAssembler,
};
use crate::element::beam::{BeamElement, BeamProperties};
use crate::element::shell::{ShellElement, ShellProperties, SurfaceResultants};
use crate::element::{Element, ElementVariant, ShapeFunctionData};
use crate::material::{ConstitutiveLaw, MaterialError};
use eyre::{bail, ensure, eyre};
use log::{debug, warn};
use nalgebra::{
    DMatrix, DMatrixViewMut, DVector, DVectorView, DVectorViewMut, Matrix3xX, Vector3,
};
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::{CscMatrix, CsrMatrix};
use rustc_hash::FxHashMap;
use skald_optimize::calculus::{DifferentiableVectorFunction, VectorFunction};
use skald_optimize::newton::{ConvergenceCriterion, LineSearch};
use skald_traits::Real;
use std::error::Error;
use std::fmt;

/// Failure modes of the equilibrium solve.
#[derive(Debug)]
#[non_exhaustive]
pub enum SolveError<T> {
    /// Element evaluation failed while assembling the residual or tangent.
    Assembly(AssemblyError),
    /// The Cholesky factorization of the tangent stiffness failed.
    IndefiniteTangent,
    /// The iteration limit was reached before the convergence criterion
    /// accepted.
    NonConverged { iterations: usize, residual_norm: T },
}

impl<T: fmt::Display> fmt::Display for SolveError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Assembly(err) => write!(f, "{}", err),
            Self::IndefiniteTangent => {
                write!(f, "tangent stiffness is not positive definite")
            }
            Self::NonConverged {
                iterations,
                residual_norm,
            } => {
                write!(
                    f,
                    "no convergence after {} iterations, residual norm {}",
                    iterations, residual_norm
                )
            }
        }
    }
}

impl<T: fmt::Debug + fmt::Display> Error for SolveError<T> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Assembly(err) => Some(err),
            _ => None,
        }
    }
}

impl<T> From<AssemblyError> for SolveError<T> {
    fn from(err: AssemblyError) -> Self {
        Self::Assembly(err)
    }
}

/// Iteration statistics of a converged equilibrium solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveStats<T> {
    pub iterations: usize,
    pub residual_norm: T,
}

/// Node store, element registry and displacement state of one structure.
///
/// All nodes carry the same number of DOFs: 4 for beam models (three
/// displacements and the cross-section rotation), 3 for shell models.
/// Global DOF indices follow the node-major convention of
/// [`Element::populate_global_dofs`].
#[derive(Debug)]
pub struct StructuralModel<T: Real> {
    positions: Matrix3xX<T>,
    dofs_per_node: usize,
    elements: Vec<ElementVariant<T>>,
    materials: FxHashMap<usize, Box<dyn ConstitutiveLaw<T>>>,
    displacements: DVector<T>,
    external_forces: DVector<T>,
    dirichlet_nodes: Vec<usize>,
    parallel_assembly: bool,
    evaluation_failure: Option<AssemblyError>,
}

impl<T: Real> StructuralModel<T> {
    /// Creates an empty model over the given reference positions.
    pub fn new(positions: Matrix3xX<T>, dofs_per_node: usize) -> Self {
        assert!(
            dofs_per_node == 3 || dofs_per_node == 4,
            "dofs_per_node must be 3 (shell) or 4 (beam)"
        );
        let num_dofs = dofs_per_node * positions.ncols();
        Self {
            positions,
            dofs_per_node,
            elements: Vec::new(),
            materials: FxHashMap::default(),
            displacements: DVector::zeros(num_dofs),
            external_forces: DVector::zeros(num_dofs),
            dirichlet_nodes: Vec::new(),
            parallel_assembly: true,
            evaluation_failure: None,
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.positions.ncols()
    }

    pub fn dofs_per_node(&self) -> usize {
        self.dofs_per_node
    }

    pub fn num_dofs(&self) -> usize {
        self.displacements.len()
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    pub fn positions(&self) -> &Matrix3xX<T> {
        &self.positions
    }

    /// The elements of the model, in insertion order.
    pub fn elements(&self) -> &[ElementVariant<T>] {
        &self.elements
    }

    pub fn displacements(&self) -> &DVector<T> {
        &self.displacements
    }

    pub fn set_displacements(&mut self, displacements: DVector<T>) {
        assert_eq!(displacements.len(), self.num_dofs());
        self.displacements = displacements;
    }

    pub fn external_forces(&self) -> &DVector<T> {
        &self.external_forces
    }

    /// Switches between serial and rayon-parallel assembly. Parallel by
    /// default.
    pub fn set_parallel_assembly(&mut self, parallel: bool) {
        self.parallel_assembly = parallel;
    }

    /// Registers a constitutive law prototype under the given id.
    ///
    /// Elements referencing the id clone the prototype at construction, so
    /// later changes to the registry do not affect existing elements.
    pub fn register_material(&mut self, id: usize, law: Box<dyn ConstitutiveLaw<T>>) {
        self.materials.insert(id, law);
    }

    fn material(&self, id: usize) -> Result<&dyn ConstitutiveLaw<T>, MaterialError> {
        self.materials
            .get(&id)
            .map(|law| law.as_ref())
            .ok_or(MaterialError::MissingLaw)
    }

    fn element_coordinates(&self, node_indices: &[usize]) -> eyre::Result<Matrix3xX<T>> {
        let mut coordinates = Matrix3xX::zeros(node_indices.len());
        for (i, &node) in node_indices.iter().enumerate() {
            ensure!(
                node < self.num_nodes(),
                "node index {} out of bounds for {} nodes",
                node,
                self.num_nodes()
            );
            coordinates.set_column(i, &self.positions.column(node));
        }
        Ok(coordinates)
    }

    /// Adds a beam element over the given nodes.
    ///
    /// The directors orient the reference cross-section frame, see
    /// [`BeamElement::new`].
    pub fn add_beam_element(
        &mut self,
        node_indices: Vec<usize>,
        shape_data: Vec<ShapeFunctionData<T>>,
        tangent_director: Vector3<T>,
        section_director: Vector3<T>,
        properties: BeamProperties<T>,
        material_id: usize,
    ) -> eyre::Result<()> {
        ensure!(
            self.dofs_per_node == 4,
            "beam elements require a model with 4 dofs per node"
        );
        let coordinates = self.element_coordinates(&node_indices)?;
        let law = self.material(material_id)?;
        let element = BeamElement::new(
            node_indices,
            coordinates,
            shape_data,
            tangent_director,
            section_director,
            properties,
            law,
        )?;
        self.elements.push(ElementVariant::Beam(element));
        Ok(())
    }

    /// Adds a shell element over the given nodes.
    pub fn add_shell_element(
        &mut self,
        node_indices: Vec<usize>,
        shape_data: Vec<ShapeFunctionData<T>>,
        properties: ShellProperties<T>,
        material_id: usize,
    ) -> eyre::Result<()> {
        ensure!(
            self.dofs_per_node == 3,
            "shell elements require a model with 3 dofs per node"
        );
        let coordinates = self.element_coordinates(&node_indices)?;
        let law = self.material(material_id)?;
        let element = ShellElement::new(node_indices, coordinates, shape_data, properties, law)?;
        self.elements.push(ElementVariant::Shell(element));
        Ok(())
    }

    /// Adds a nodal point load component to the external force vector.
    pub fn add_point_load(&mut self, node: usize, component: usize, value: T) {
        assert!(node < self.num_nodes());
        assert!(component < self.dofs_per_node);
        self.external_forces[self.dofs_per_node * node + component] += value;
    }

    /// Constrains all DOF components of the given node to zero.
    pub fn fix_node(&mut self, node: usize) {
        assert!(node < self.num_nodes());
        if !self.dirichlet_nodes.contains(&node) {
            self.dirichlet_nodes.push(node);
        }
    }

    /// Gathers the local displacement vector of one element from the current
    /// global state.
    pub fn local_displacements(&self, index: usize) -> DVector<T> {
        let element = &self.elements[index];
        let mut u_local = DVector::zeros(element.num_local_dofs());
        gather_global_to_local(
            &self.displacements,
            &mut u_local,
            element.node_indices(),
            self.dofs_per_node,
        );
        u_local
    }

    /// Recovers the axial force at each integration point of a beam element
    /// at the current displacements.
    pub fn beam_axial_forces(&mut self, index: usize) -> eyre::Result<Vec<T>> {
        ensure!(
            index < self.elements.len(),
            "element index {} out of bounds",
            index
        );
        let u_local = self.local_displacements(index);
        match &mut self.elements[index] {
            ElementVariant::Beam(beam) => Ok(beam.axial_forces(DVectorView::from(&u_local))?),
            _ => bail!("element {} is not a beam element", index),
        }
    }

    /// Recovers the membrane force and bending moment resultants at each
    /// integration point of a shell element at the current displacements.
    pub fn shell_surface_resultants(
        &mut self,
        index: usize,
    ) -> eyre::Result<Vec<SurfaceResultants<T>>> {
        ensure!(
            index < self.elements.len(),
            "element index {} out of bounds",
            index
        );
        let u_local = self.local_displacements(index);
        match &mut self.elements[index] {
            ElementVariant::Shell(shell) => {
                Ok(shell.surface_resultants(DVectorView::from(&u_local))?)
            }
            _ => bail!("element {} is not a shell element", index),
        }
    }

    /// Commits constitutive history at the current displacements.
    ///
    /// Call once after a converged [`solve_step`](Self::solve_step), before
    /// the loads of the next step are applied.
    pub fn finalize_step(&mut self) -> eyre::Result<()> {
        let d = self.dofs_per_node;
        let mut u_local = DVector::zeros(0);
        for (index, element) in self.elements.iter_mut().enumerate() {
            u_local.resize_vertically_mut(element.num_local_dofs(), T::zero());
            gather_global_to_local(&self.displacements, &mut u_local, element.node_indices(), d);
            element
                .finalize_step(DVectorView::from(&u_local))
                .map_err(|source| AssemblyError::Element { index, source })?;
        }
        Ok(())
    }

    /// Validates the model before a solve.
    ///
    /// Checks element properties and constitutive parameters, node index
    /// bounds, and that every unconstrained node is referenced by at least
    /// one element. An untouched node leaves a zero row in the tangent and
    /// the factorization would only fail later with a less specific error.
    pub fn check(&self) -> eyre::Result<()> {
        let mut referenced = vec![false; self.num_nodes()];
        for (index, element) in self.elements.iter().enumerate() {
            element
                .check()
                .map_err(|source| AssemblyError::Element { index, source })?;
            for &node in element.node_indices() {
                ensure!(
                    node < self.num_nodes(),
                    "element {} references node {}, but the model has {} nodes",
                    index,
                    node,
                    self.num_nodes()
                );
                referenced[node] = true;
            }
        }
        for (node, &touched) in referenced.iter().enumerate() {
            ensure!(
                touched || self.dirichlet_nodes.contains(&node),
                "node {} is not referenced by any element",
                node
            );
        }
        Ok(())
    }

    /// Assembles the consistent mass matrix of the model.
    pub fn assemble_mass_matrix(&self) -> eyre::Result<CsrMatrix<T>> {
        CsrAssembler::default().assemble_matrix(&MassAssembler { model: self })
    }

    fn take_evaluation_failure(&mut self) -> Result<(), AssemblyError> {
        match self.evaluation_failure.take() {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }
}

impl<T: Real + Send + Sync> StructuralModel<T> {
    fn assemble(&mut self, u: DVectorView<T>) -> Result<(CsrMatrix<T>, DVector<T>), AssemblyError> {
        if self.parallel_assembly {
            CsrParAssembler::default().assemble_system(&mut self.elements, u)
        } else {
            CsrAssembler::default().assemble_system(&mut self.elements, u)
        }
    }

    /// Solves `K(x) sol = rhs` with the tangent stiffness at `x`, Dirichlet
    /// rows and columns eliminated.
    fn solve_tangent_correction(
        &mut self,
        x: DVectorView<T>,
        rhs: DVectorView<T>,
        solution: &mut DVectorViewMut<T>,
    ) -> Result<(), SolveError<T>> {
        let (mut stiffness, _) = self.assemble(x)?;
        apply_homogeneous_dirichlet_bc_csr(&mut stiffness, &self.dirichlet_nodes, self.dofs_per_node);
        let cholesky = CscCholesky::factor(&CscMatrix::from(&stiffness))
            .map_err(|_| SolveError::IndefiniteTangent)?;
        let mut columns = DMatrix::zeros(rhs.len(), 1);
        columns.column_mut(0).copy_from(&rhs);
        cholesky.solve_mut(&mut columns);
        solution.copy_from(&columns.column(0));
        Ok(())
    }

    /// Drives the model to equilibrium under the current loads with a
    /// Newton iteration.
    ///
    /// Per iteration the tangent system is factorized for the correction,
    /// the line search picks the step length along it, and the criterion
    /// judges the updated residual. On success the converged displacements
    /// are committed to the model; on failure the model keeps its previous
    /// displacement state.
    pub fn solve_step<LS>(
        &mut self,
        max_iterations: usize,
        criterion: &mut dyn ConvergenceCriterion<T>,
        line_search: &mut LS,
    ) -> eyre::Result<SolveStats<T>>
    where
        LS: LineSearch<T, Self>,
    {
        criterion.reset();

        let num_dofs = self.num_dofs();
        let mut x = self.displacements.clone();
        let mut f = DVector::zeros(num_dofs);
        let mut direction = DVector::zeros(num_dofs);

        self.eval_into(&mut DVectorViewMut::from(&mut f), &DVectorView::from(&x));
        self.take_evaluation_failure()?;

        let mut iteration = 0;
        let mut correction_norm = T::zero();
        loop {
            let residual_norm = f.norm();
            if criterion.evaluate(iteration, residual_norm, correction_norm) {
                debug!(
                    "Equilibrium after {} iterations, residual norm {}",
                    iteration, residual_norm
                );
                self.displacements.copy_from(&x);
                return Ok(SolveStats {
                    iterations: iteration,
                    residual_norm,
                });
            }
            if iteration >= max_iterations {
                warn!(
                    "No equilibrium within {} iterations, residual norm {}",
                    max_iterations, residual_norm
                );
                return Err(SolveError::NonConverged {
                    iterations: iteration,
                    residual_norm,
                }
                .into());
            }

            self.solve_tangent_correction(
                DVectorView::from(&x),
                DVectorView::from(&f),
                &mut DVectorViewMut::from(&mut direction),
            )?;
            // the solved system yields -dx
            direction.neg_mut();

            let step_length = line_search
                .step(
                    self,
                    DVectorViewMut::from(&mut f),
                    DVectorViewMut::from(&mut x),
                    DVectorView::from(&direction),
                )
                .map_err(|err| eyre!("line search failed: {}", err))?;
            self.take_evaluation_failure()?;

            correction_norm = direction.norm() * step_length;
            debug!(
                "Newton iteration {}: residual norm {}, step length {}",
                iteration, residual_norm, step_length
            );
            iteration += 1;
        }
    }
}

impl<T: Real + Send + Sync> VectorFunction<T> for StructuralModel<T> {
    fn dimension(&self) -> usize {
        self.num_dofs()
    }

    fn eval_into(&mut self, f: &mut DVectorViewMut<T>, x: &DVectorView<T>) {
        match self.assemble(*x) {
            Ok((_, forces)) => {
                // forces hold the negated internal force
                f.copy_from(&forces);
                *f += &self.external_forces;
                f.neg_mut();
                apply_homogeneous_dirichlet_bc_rhs(&mut *f, &self.dirichlet_nodes, self.dofs_per_node);
            }
            Err(failure) => {
                // eval_into is infallible by signature; poison the residual
                // so that no criterion accepts it and surface the stored
                // error from solve_step
                warn!("Residual assembly failed: {}", failure);
                self.evaluation_failure = Some(failure);
                f.fill(T::from_f64(f64::NAN).expect("scalar type must represent NaN"));
            }
        }
    }
}

impl<T: Real + Send + Sync> DifferentiableVectorFunction<T> for StructuralModel<T> {
    fn solve_jacobian_system(
        &mut self,
        sol: &mut DVectorViewMut<T>,
        x: &DVectorView<T>,
        rhs: &DVectorView<T>,
    ) -> Result<(), Box<dyn Error>> {
        self.solve_tangent_correction(*x, *rhs, sol)?;
        Ok(())
    }
}

/// Adapter exposing the element mass matrices through the matrix assembly
/// seam.
struct MassAssembler<'a, T: Real> {
    model: &'a StructuralModel<T>,
}

impl<'a, T: Real> ElementConnectivityAssembler for MassAssembler<'a, T> {
    fn solution_dim(&self) -> usize {
        self.model.dofs_per_node
    }

    fn num_elements(&self) -> usize {
        self.model.elements.len()
    }

    fn num_nodes(&self) -> usize {
        self.model.num_nodes()
    }

    fn element_node_count(&self, element_index: usize) -> usize {
        self.model.elements[element_index].num_nodes()
    }

    fn populate_element_nodes(&self, output: &mut [usize], element_index: usize) {
        output.copy_from_slice(self.model.elements[element_index].node_indices());
    }
}

impl<'a, T: Real> ElementMatrixAssembler<T> for MassAssembler<'a, T> {
    fn assemble_element_matrix_into(
        &self,
        element_index: usize,
        output: DMatrixViewMut<T>,
    ) -> eyre::Result<()> {
        self.model.elements[element_index].compute_mass_matrix(output)?;
        Ok(())
    }
}
