//! Structural elements and their local tangent systems.
//!
//! An element owns its node indices, the shape function data of its
//! quadrature points and a clone of its constitutive law. Given the local
//! displacement vector it fills the local tangent stiffness and internal
//! force contributions; the assembly layer scatters these into the global
//! system.

use crate::kinematics::GeometryError;
use crate::material::MaterialError;
use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorView, DVectorViewMut};
use skald_traits::Real;
use std::error::Error;
use std::fmt;

pub mod beam;
pub mod shell;

pub use beam::BeamElement;
pub use shell::ShellElement;

/// Shape function data of a single quadrature point.
///
/// `first_derivatives` has one column per parametric direction
/// ($\xi$ for curves, $\xi, \eta$ for surfaces); `second_derivatives`
/// likewise, with the surface column order
/// $\partial_{\xi\xi}, \partial_{\eta\eta}, \partial_{\xi\eta}$.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeFunctionData<T: Real> {
    pub values: DVector<T>,
    pub first_derivatives: DMatrix<T>,
    pub second_derivatives: DMatrix<T>,
    pub weight: T,
}

#[derive(Debug)]
#[non_exhaustive]
pub enum ElementError {
    Geometry(GeometryError),
    Material(MaterialError),
    /// A caller-provided buffer does not match the local DOF count.
    BufferDimensionMismatch { expected: usize, actual: usize },
}

impl fmt::Display for ElementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Geometry(err) => write!(f, "element geometry error: {}", err),
            Self::Material(err) => write!(f, "element material error: {}", err),
            Self::BufferDimensionMismatch { expected, actual } => {
                write!(
                    f,
                    "buffer dimension mismatch: element has {} local dofs, buffer has {}",
                    expected, actual
                )
            }
        }
    }
}

impl Error for ElementError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Geometry(err) => Some(err),
            Self::Material(err) => Some(err),
            Self::BufferDimensionMismatch { .. } => None,
        }
    }
}

impl From<GeometryError> for ElementError {
    fn from(err: GeometryError) -> Self {
        Self::Geometry(err)
    }
}

impl From<MaterialError> for ElementError {
    fn from(err: MaterialError) -> Self {
        Self::Material(err)
    }
}

/// A structural element contributing a local tangent system.
///
/// Local DOFs are ordered node-major: local DOF $r$ belongs to node
/// $\lfloor r / D \rfloor$ and component $r \bmod D$, where $D$ is
/// [`dofs_per_node`](Element::dofs_per_node).
pub trait Element<T: Real>: fmt::Debug + Send {
    fn num_nodes(&self) -> usize;

    fn dofs_per_node(&self) -> usize;

    /// Global node indices referenced by this element.
    fn node_indices(&self) -> &[usize];

    fn num_local_dofs(&self) -> usize {
        self.num_nodes() * self.dofs_per_node()
    }

    /// Maps local DOFs to global DOF indices, assuming the global vector
    /// uses the same node-major layout.
    fn populate_global_dofs(&self, dofs: &mut [usize]) {
        let d = self.dofs_per_node();
        assert_eq!(dofs.len(), self.num_local_dofs());
        for (i, node) in self.node_indices().iter().enumerate() {
            for k in 0..d {
                dofs[d * i + k] = d * node + k;
            }
        }
    }

    /// Accumulates the local tangent stiffness and internal force residual
    /// for the given local displacements.
    ///
    /// `stiffness` and `forces` are *added to*, not overwritten; forces
    /// follow the residual convention $f \mathrel{-}= w \, S \cdot \delta E$
    /// so that the assembled vector is the negated internal force.
    fn compute_local_system(
        &mut self,
        u_local: DVectorView<T>,
        stiffness: DMatrixViewMut<T>,
        forces: DVectorViewMut<T>,
    ) -> Result<(), ElementError>;

    /// Accumulates the consistent translational mass matrix.
    fn compute_mass_matrix(&self, mass: DMatrixViewMut<T>) -> Result<(), ElementError>;

    /// Commits constitutive state at the converged local displacements.
    fn finalize_step(&mut self, u_local: DVectorView<T>) -> Result<(), ElementError>;

    /// Validates element properties and constitutive parameters.
    fn check(&self) -> Result<(), ElementError>;
}

/// Concrete element dispatch used by the assembly layer.
#[derive(Debug, Clone)]
pub enum ElementVariant<T: Real> {
    Beam(BeamElement<T>),
    Shell(ShellElement<T>),
}

impl<T: Real> Element<T> for ElementVariant<T> {
    fn num_nodes(&self) -> usize {
        match self {
            Self::Beam(element) => element.num_nodes(),
            Self::Shell(element) => element.num_nodes(),
        }
    }

    fn dofs_per_node(&self) -> usize {
        match self {
            Self::Beam(element) => element.dofs_per_node(),
            Self::Shell(element) => element.dofs_per_node(),
        }
    }

    fn node_indices(&self) -> &[usize] {
        match self {
            Self::Beam(element) => element.node_indices(),
            Self::Shell(element) => element.node_indices(),
        }
    }

    fn compute_local_system(
        &mut self,
        u_local: DVectorView<T>,
        stiffness: DMatrixViewMut<T>,
        forces: DVectorViewMut<T>,
    ) -> Result<(), ElementError> {
        match self {
            Self::Beam(element) => element.compute_local_system(u_local, stiffness, forces),
            Self::Shell(element) => element.compute_local_system(u_local, stiffness, forces),
        }
    }

    fn compute_mass_matrix(&self, mass: DMatrixViewMut<T>) -> Result<(), ElementError> {
        match self {
            Self::Beam(element) => element.compute_mass_matrix(mass),
            Self::Shell(element) => element.compute_mass_matrix(mass),
        }
    }

    fn finalize_step(&mut self, u_local: DVectorView<T>) -> Result<(), ElementError> {
        match self {
            Self::Beam(element) => element.finalize_step(u_local),
            Self::Shell(element) => element.finalize_step(u_local),
        }
    }

    fn check(&self) -> Result<(), ElementError> {
        match self {
            Self::Beam(element) => element.check(),
            Self::Shell(element) => element.check(),
        }
    }
}
