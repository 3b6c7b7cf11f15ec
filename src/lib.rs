pub mod assembly;
pub mod element;
pub mod kinematics;
pub mod material;
pub mod model;
pub mod variation;

pub mod optimize {
    pub use skald_optimize::*;
}

#[cfg(feature = "proptest")]
pub mod proptest;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

pub use skald_traits::Real;
