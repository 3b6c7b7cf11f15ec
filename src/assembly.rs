//! Assembly of global sparse systems from element contributions.
//!
//! [`local`] holds the element-level seams: connectivity queries, the
//! matrix-assembler trait used for mass matrices, and the gather of local
//! DOF values from the global solution vector. [`global`] scatters element
//! systems into sparse matrices, serially or in parallel, and applies
//! homogeneous Dirichlet conditions by symmetric elimination.

pub mod global;
pub mod local;

pub use global::{
    apply_homogeneous_dirichlet_bc_csr, apply_homogeneous_dirichlet_bc_rhs, AssemblyError,
    CsrAssembler, CsrParAssembler,
};
pub use local::{gather_global_to_local, ElementConnectivityAssembler, ElementMatrixAssembler};
