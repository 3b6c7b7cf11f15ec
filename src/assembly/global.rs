//! Global assembly and boundary condition application.

use crate::assembly::local::{gather_global_to_local, ElementMatrixAssembler, ElementScratch};
use crate::element::{Element, ElementError, ElementVariant};
use davenport::{define_thread_local_workspace, with_thread_local_workspace};
use eyre::WrapErr;
use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorView, DVectorViewMut};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rayon::prelude::*;
use skald_traits::Real;
use std::error::Error;
use std::fmt;

define_thread_local_workspace!(WORKSPACE);

#[derive(Debug)]
#[non_exhaustive]
pub enum AssemblyError {
    /// An element failed to produce its local system.
    Element { index: usize, source: ElementError },
}

impl fmt::Display for AssemblyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Element { index, source } => {
                write!(f, "assembly failed for element {}: {}", index, source)
            }
        }
    }
}

impl Error for AssemblyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Element { source, .. } => Some(source),
        }
    }
}

/// Computes one element's local system into the scratch buffers and
/// scatters it into the triplet list and global force vector.
fn assemble_element_system<T: Real>(
    element: &mut ElementVariant<T>,
    index: usize,
    u: DVectorView<T>,
    scratch: &mut ElementScratch<T>,
    coo: &mut CooMatrix<T>,
    forces: &mut DVector<T>,
) -> Result<(), AssemblyError> {
    let num_dofs = element.num_local_dofs();
    scratch.prepare(num_dofs);
    element.populate_global_dofs(&mut scratch.global_dofs);
    gather_global_to_local(
        u,
        &mut scratch.u_local,
        element.node_indices(),
        element.dofs_per_node(),
    );
    element
        .compute_local_system(
            DVectorView::from(&scratch.u_local),
            DMatrixViewMut::from(&mut scratch.stiffness),
            DVectorViewMut::from(&mut scratch.forces),
        )
        .map_err(|source| AssemblyError::Element { index, source })?;
    for (i_local, &i_global) in scratch.global_dofs.iter().enumerate() {
        forces[i_global] += scratch.forces[i_local];
        for (j_local, &j_global) in scratch.global_dofs.iter().enumerate() {
            coo.push(i_global, j_global, scratch.stiffness[(i_local, j_local)]);
        }
    }
    Ok(())
}

/// Serial assembler for CSR matrices.
#[derive(Debug, Default)]
pub struct CsrAssembler;

impl CsrAssembler {
    /// Assembles the global tangent stiffness and the negated internal force
    /// vector of the elements at the given global displacements.
    pub fn assemble_system<'a, T: Real>(
        &self,
        elements: &mut [ElementVariant<T>],
        u: impl Into<DVectorView<'a, T>>,
    ) -> Result<(CsrMatrix<T>, DVector<T>), AssemblyError> {
        let u = u.into();
        let num_dofs = u.len();
        let mut coo = CooMatrix::new(num_dofs, num_dofs);
        let mut forces = DVector::zeros(num_dofs);
        let mut scratch = ElementScratch::default();
        for (index, element) in elements.iter_mut().enumerate() {
            assemble_element_system(element, index, u, &mut scratch, &mut coo, &mut forces)?;
        }
        Ok((CsrMatrix::from(&coo), forces))
    }

    /// Assembles a global matrix through the [`ElementMatrixAssembler`]
    /// seam.
    pub fn assemble_matrix<T: Real>(
        &self,
        assembler: &dyn ElementMatrixAssembler<T>,
    ) -> eyre::Result<CsrMatrix<T>> {
        let sdim = assembler.solution_dim();
        let num_dofs = sdim * assembler.num_nodes();
        let mut coo = CooMatrix::new(num_dofs, num_dofs);
        let mut nodes = Vec::new();
        let mut local = DMatrix::zeros(0, 0);
        for index in 0..assembler.num_elements() {
            let node_count = assembler.element_node_count(index);
            nodes.resize(node_count, usize::MAX);
            assembler.populate_element_nodes(&mut nodes, index);
            let local_dofs = sdim * node_count;
            local.resize_mut(local_dofs, local_dofs, T::zero());
            local.fill(T::zero());
            assembler
                .assemble_element_matrix_into(index, DMatrixViewMut::from(&mut local))
                .wrap_err_with(|| format!("assembly failed for element {}", index))?;
            for (i_local, &i_node) in nodes.iter().enumerate() {
                for (j_local, &j_node) in nodes.iter().enumerate() {
                    for a in 0..sdim {
                        for b in 0..sdim {
                            coo.push(
                                sdim * i_node + a,
                                sdim * j_node + b,
                                local[(sdim * i_local + a, sdim * j_local + b)],
                            );
                        }
                    }
                }
            }
        }
        Ok(CsrMatrix::from(&coo))
    }
}

/// Parallel assembler for CSR matrices.
///
/// Elements are evaluated with rayon; each task folds its contributions
/// into a thread-local triplet list and force vector, which are then
/// reduced into the final system. Element scratch buffers are reused
/// across assemblies through a thread-local workspace.
#[derive(Debug, Default)]
pub struct CsrParAssembler;

impl CsrParAssembler {
    pub fn assemble_system<'a, T: Real + Send + Sync>(
        &self,
        elements: &mut [ElementVariant<T>],
        u: impl Into<DVectorView<'a, T>>,
    ) -> Result<(CsrMatrix<T>, DVector<T>), AssemblyError> {
        let u = u.into();
        let num_dofs = u.len();
        let identity = || Ok((CooMatrix::new(num_dofs, num_dofs), DVector::zeros(num_dofs)));
        let (coo, forces) = elements
            .par_iter_mut()
            .enumerate()
            .fold(identity, |accumulator, (index, element)| {
                let (mut coo, mut forces) = accumulator?;
                with_thread_local_workspace(&WORKSPACE, |scratch: &mut ElementScratch<T>| {
                    assemble_element_system(element, index, u, scratch, &mut coo, &mut forces)
                })?;
                Ok((coo, forces))
            })
            .reduce(identity, |left, right| {
                let (mut coo, mut forces) = left?;
                let (right_coo, right_forces) = right?;
                for (i, j, value) in right_coo.triplet_iter() {
                    coo.push(i, j, *value);
                }
                forces += right_forces;
                Ok((coo, forces))
            })?;
        Ok((CsrMatrix::from(&coo), forces))
    }
}

/// Zeroes the rows and columns of all DOFs belonging to the given nodes and
/// places a scaled unit entry on their diagonal.
///
/// The sparsity pattern is untouched; eliminated entries are zeroed in
/// place. The diagonal scale is taken from the first nonzero diagonal entry
/// of the matrix so that the eliminated equations do not distort the
/// conditioning of the remaining system.
pub fn apply_homogeneous_dirichlet_bc_csr<T: Real>(
    matrix: &mut CsrMatrix<T>,
    nodes: &[usize],
    solution_dim: usize,
) {
    let d = solution_dim;
    assert!(d >= 1);
    assert_eq!(matrix.nrows(), matrix.ncols());
    assert_eq!(matrix.nrows() % d, 0);

    let mut scale = T::one();
    for (i, j, value) in matrix.triplet_iter() {
        if i == j && value.abs() > T::zero() {
            scale = value.abs();
            break;
        }
    }

    let num_nodes = matrix.nrows() / d;
    let mut fixed = vec![false; num_nodes];
    for &node in nodes {
        fixed[node] = true;
    }

    for (i, j, value) in matrix.triplet_iter_mut() {
        if fixed[i / d] || fixed[j / d] {
            *value = if i == j { scale } else { T::zero() };
        }
    }
}

/// Zeroes the entries of all DOFs belonging to the given nodes.
pub fn apply_homogeneous_dirichlet_bc_rhs<'a, T: Real>(
    rhs: impl Into<DVectorViewMut<'a, T>>,
    nodes: &[usize],
    solution_dim: usize,
) {
    let mut rhs = rhs.into();
    for &node in nodes {
        for k in 0..solution_dim {
            rhs[solution_dim * node + k] = T::zero();
        }
    }
}
