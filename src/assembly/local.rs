//! Element-level assembly seams.

use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorView, DVectorViewMut, Scalar};
use skald_traits::Real;

/// Connectivity of an element collection: which nodes each element touches
/// and how many solution components each node carries.
pub trait ElementConnectivityAssembler {
    fn solution_dim(&self) -> usize;

    fn num_elements(&self) -> usize;

    fn num_nodes(&self) -> usize;

    fn element_node_count(&self, element_index: usize) -> usize;

    fn populate_element_nodes(&self, output: &mut [usize], element_index: usize);
}

/// Produces the local matrix of a single element, for matrix-valued
/// quantities that do not mutate the element (such as the mass matrix).
pub trait ElementMatrixAssembler<T: Scalar>: ElementConnectivityAssembler {
    fn assemble_element_matrix_into(
        &self,
        element_index: usize,
        output: DMatrixViewMut<T>,
    ) -> eyre::Result<()>;
}

/// Gathers the local DOF values of an element from a node-major global
/// vector: local node `i` receives the `solution_dim` components of global
/// node `indices[i]`.
pub fn gather_global_to_local<'a, T: Scalar>(
    global: impl Into<DVectorView<'a, T>>,
    local: impl Into<DVectorViewMut<'a, T>>,
    indices: &[usize],
    solution_dim: usize,
) {
    gather_global_to_local_(global.into(), local.into(), indices, solution_dim)
}

fn gather_global_to_local_<T: Scalar>(
    global: DVectorView<T>,
    mut local: DVectorViewMut<T>,
    indices: &[usize],
    solution_dim: usize,
) {
    let s = solution_dim;
    assert_eq!(local.len(), s * indices.len());
    for (i_local, &i_global) in indices.iter().enumerate() {
        local
            .rows_mut(s * i_local, s)
            .copy_from(&global.rows(s * i_global, s));
    }
}

/// Reusable local buffers for element system assembly.
#[derive(Debug)]
pub(crate) struct ElementScratch<T: Real> {
    pub global_dofs: Vec<usize>,
    pub u_local: DVector<T>,
    pub stiffness: DMatrix<T>,
    pub forces: DVector<T>,
}

impl<T: Real> Default for ElementScratch<T> {
    fn default() -> Self {
        Self {
            global_dofs: Vec::new(),
            u_local: DVector::zeros(0),
            stiffness: DMatrix::zeros(0, 0),
            forces: DVector::zeros(0),
        }
    }
}

impl<T: Real> ElementScratch<T> {
    /// Resizes the buffers for an element with the given local DOF count and
    /// zeroes the output buffers.
    pub fn prepare(&mut self, num_dofs: usize) {
        self.global_dofs.resize(num_dofs, usize::MAX);
        self.u_local.resize_vertically_mut(num_dofs, T::zero());
        self.stiffness.resize_mut(num_dofs, num_dofs, T::zero());
        self.forces.resize_vertically_mut(num_dofs, T::zero());
        self.stiffness.fill(T::zero());
        self.forces.fill(T::zero());
    }
}
