use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{DVector, DVectorView, DVectorViewMut};
use skald_optimize::calculus::ClosureVectorFunction;
use skald_optimize::line_search::{AdaptiveLineSearch, LineSearchMethod};
use skald_optimize::newton::*;
use std::error::Error;

#[test]
fn newton_converges_in_one_iteration_on_linear_system() {
    let mut function = ClosureVectorFunction::new(
        2,
        |f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>| {
            f[0] = 2.0 * x[0] - 2.0;
            f[1] = 3.0 * x[1] - 6.0;
        },
        |sol: &mut DVectorViewMut<f64>, _x: &DVectorView<f64>, rhs: &DVectorView<f64>| {
            sol[0] = rhs[0] / 2.0;
            sol[1] = rhs[1] / 3.0;
            Ok(())
        },
    );

    let mut x = DVector::zeros(2);
    let mut f = DVector::zeros(2);
    let mut dx = DVector::zeros(2);
    let iterations = newton(
        &mut function,
        &mut x,
        &mut f,
        &mut dx,
        NewtonSettings {
            max_iterations: Some(10),
            tolerance: 1e-12,
        },
    )
    .unwrap();

    assert_eq!(iterations, 1);
    assert_matrix_eq!(
        x,
        DVector::from_column_slice(&[1.0, 2.0]),
        comp = abs,
        tol = 1e-12
    );
}

#[test]
fn newton_stops_at_iteration_limit_on_cycling_function() {
    // The classic cycling example x^3 - 2x + 2 bounces between 0 and 1
    // under full Newton steps and never converges
    let mut function = ClosureVectorFunction::new(
        1,
        |f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>| {
            f[0] = x[0] * x[0] * x[0] - 2.0 * x[0] + 2.0;
        },
        |sol: &mut DVectorViewMut<f64>, x: &DVectorView<f64>, rhs: &DVectorView<f64>| {
            sol[0] = rhs[0] / (3.0 * x[0] * x[0] - 2.0);
            Ok(())
        },
    );

    let mut x = DVector::zeros(1);
    let mut f = DVector::zeros(1);
    let mut dx = DVector::zeros(1);
    let error = newton(
        &mut function,
        &mut x,
        &mut f,
        &mut dx,
        NewtonSettings {
            max_iterations: Some(4),
            tolerance: 1e-9,
        },
    )
    .unwrap_err();

    assert!(matches!(error, NewtonError::MaximumIterationsReached(4)));
}

#[test]
fn newton_surfaces_jacobian_solve_failure() {
    let mut function = ClosureVectorFunction::new(
        1,
        |f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>| {
            f[0] = x[0] + 1.0;
        },
        |_sol: &mut DVectorViewMut<f64>,
         _x: &DVectorView<f64>,
         _rhs: &DVectorView<f64>|
         -> Result<(), Box<dyn Error>> { Err("singular".into()) },
    );

    let mut x = DVector::zeros(1);
    let mut f = DVector::zeros(1);
    let mut dx = DVector::zeros(1);
    let error = newton(
        &mut function,
        &mut x,
        &mut f,
        &mut dx,
        NewtonSettings {
            max_iterations: Some(10),
            tolerance: 1e-9,
        },
    )
    .unwrap_err();

    assert!(matches!(error, NewtonError::JacobianError(_)));
}

#[test]
fn no_line_search_takes_the_full_step() {
    let mut search = NoLineSearch;
    let mut function = ClosureVectorFunction::new(
        1,
        |f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>| {
            f[0] = x[0];
        },
        |sol: &mut DVectorViewMut<f64>, _x: &DVectorView<f64>, rhs: &DVectorView<f64>| {
            sol[0] = rhs[0];
            Ok(())
        },
    );

    let mut x = DVector::from_element(1, 1.0);
    let mut f = DVector::from_element(1, 1.0);
    let direction = DVector::from_element(1, -1.0);
    let alpha = search
        .step(
            &mut function,
            DVectorViewMut::from(&mut f),
            DVectorViewMut::from(&mut x),
            DVectorView::from(&direction),
        )
        .unwrap();

    assert_eq!(alpha, 1.0);
    assert_eq!(x[0], 0.0);
    assert_eq!(f[0], 0.0);
}

#[test]
fn residual_criterion_combines_absolute_and_relative_tolerance() {
    let mut criterion = ResidualCriterion::new(1e-9, 1e-4);

    // First call pins the initial residual norm at 1.0
    assert!(!criterion.evaluate(0, 1.0, 0.0));
    assert!(!criterion.evaluate(1, 1e-3, 0.5));
    // Relative: 5e-5 <= 1e-4 * 1.0
    assert!(criterion.evaluate(2, 5e-5, 0.1));

    // After a reset the same norm no longer passes relative to itself
    criterion.reset();
    assert!(!criterion.evaluate(0, 5e-5, 0.0));
    // Absolute tolerance still applies
    assert!(criterion.evaluate(1, 1e-10, 0.0));
}

#[test]
fn newton_line_search_recovers_from_overshoot() {
    // x^3 - 4x from x0 = 1.5: the first full Newton step jumps across the
    // root at 2 and flips the slope sign, so the search must cut the step
    let mut function = ClosureVectorFunction::new(
        1,
        |f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>| {
            f[0] = x[0] * x[0] * x[0] - 4.0 * x[0];
        },
        |sol: &mut DVectorViewMut<f64>, x: &DVectorView<f64>, rhs: &DVectorView<f64>| {
            sol[0] = rhs[0] / (3.0 * x[0] * x[0] - 4.0);
            Ok(())
        },
    );
    let mut search = AdaptiveLineSearch::new(LineSearchMethod::BonetWood);

    let mut x = DVector::from_element(1, 1.5);
    let mut f = DVector::zeros(1);
    let mut dx = DVector::zeros(1);
    let iterations = newton_line_search(
        &mut function,
        &mut x,
        &mut f,
        &mut dx,
        NewtonSettings {
            max_iterations: Some(20),
            tolerance: 1e-10,
        },
        &mut search,
    )
    .unwrap();

    assert!(iterations >= 2 && iterations <= 10);
    assert_scalar_eq!(x[0], 2.0, comp = abs, tol = 1e-8);
    assert!(f[0].abs() <= 1e-10);
}
