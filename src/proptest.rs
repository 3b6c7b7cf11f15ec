//! Strategies for property-based tests.

use ::proptest::prelude::*;
use nalgebra::{DVector, Vector3};

/// Strategy for displacement-like vectors of the given length.
///
/// The magnitude is kept caller-controlled since kinematic tests typically
/// need perturbations small enough to stay clear of degenerate geometry.
pub fn displacement_vector(len: usize, magnitude: f64) -> impl Strategy<Value = DVector<f64>> {
    prop::collection::vec(-magnitude..magnitude, len).prop_map(DVector::from_vec)
}

/// Strategy for direction vectors bounded away from zero length.
pub fn nonzero_vector3() -> impl Strategy<Value = Vector3<f64>> {
    let range = -10.0..10.0;
    [range.clone(), range.clone(), range.clone()]
        .prop_map(|[x, y, z]| Vector3::new(x, y, z))
        .prop_filter("vector must be bounded away from zero", |v| v.norm() > 0.1)
}
