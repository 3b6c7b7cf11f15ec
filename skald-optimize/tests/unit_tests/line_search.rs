use matrixcompare::assert_scalar_eq;
use nalgebra::{DVector, DVectorView, DVectorViewMut};
use skald_optimize::calculus::ClosureVectorFunction;
use skald_optimize::line_search::*;
use skald_optimize::newton::LineSearch;
use std::error::Error;

#[test]
fn bonet_wood_closed_form_step() {
    let mut policy = BonetWood;
    let mut probes = Vec::new();
    let mut probe = |alpha: f64| -> Result<SlopeProbe<f64>, Box<dyn Error>> {
        probes.push(alpha);
        // Slope small enough to stop after the first update
        Ok(SlopeProbe {
            slope: 0.1,
            residual_norm: 1.0,
        })
    };

    let alpha = policy.compute_alpha(1.0, -0.5, &mut probe).unwrap();

    // eta = s0 / s1 = -2  =>  alpha = (-2 + sqrt(12)) / 2
    let expected = 0.5 * (-2.0 + 12.0_f64.sqrt());
    assert_scalar_eq!(alpha, expected, comp = abs, tol = 1e-14);
    assert!(alpha > 0.0 && alpha <= 1.0);
    assert_eq!(probes.len(), 1);
    assert_scalar_eq!(probes[0], expected, comp = abs, tol = 1e-14);
}

#[test]
fn bonet_wood_switches_to_linear_update_for_positive_ratio() {
    let mut policy = BonetWood;
    let mut slopes = vec![0.9, 0.2].into_iter();
    let mut probe = |_alpha: f64| -> Result<SlopeProbe<f64>, Box<dyn Error>> {
        Ok(SlopeProbe {
            slope: slopes.next().unwrap(),
            residual_norm: 1.0,
        })
    };

    // First update uses eta = -1; the probe then reports a positive slope of
    // 0.9, still above half of s0, so the linear branch alpha = eta / 2 with
    // eta = 1 / 0.9 runs once more before the final probe of 0.2 stops it.
    let alpha = policy.compute_alpha(1.0, -1.0, &mut probe).unwrap();
    assert_scalar_eq!(alpha, 0.5 * (1.0 / 0.9), comp = abs, tol = 1e-14);
}

#[test]
fn secant_bisection_finds_midpoint_root() {
    let mut policy = SecantBisection;
    // Slope decays linearly with root exactly at the first midpoint
    let mut probe = |alpha: f64| -> Result<SlopeProbe<f64>, Box<dyn Error>> {
        Ok(SlopeProbe {
            slope: 1.0 - 2.0 * alpha,
            residual_norm: 0.0,
        })
    };

    let alpha = policy.compute_alpha(1.0, -1.0, &mut probe).unwrap();
    assert_eq!(alpha, 0.5);
}

#[test]
fn regula_falsi_secant_update() {
    let mut policy = RegulaFalsi;
    let mut probe = |alpha: f64| -> Result<SlopeProbe<f64>, Box<dyn Error>> {
        Ok(SlopeProbe {
            slope: 1.0 - 2.0 * alpha,
            residual_norm: 0.0,
        })
    };

    // alpha = 1 - s1 (1 - 0) / (s1 - s0) = 1 - (-1) / (-2) = 1/2, where the
    // probed slope vanishes and the 80% shrink target is met.
    let alpha = policy.compute_alpha(1.0, -1.0, &mut probe).unwrap();
    assert_eq!(alpha, 0.5);
}

#[test]
fn error_ratio_keeps_full_step_for_small_slope() {
    let mut policy = ErrorRatio;
    let mut probes = 0;
    let mut probe = |_alpha: f64| -> Result<SlopeProbe<f64>, Box<dyn Error>> {
        probes += 1;
        Ok(SlopeProbe {
            slope: 0.0,
            residual_norm: 0.0,
        })
    };

    // |s1 / s0| = 0.4 already meets the 50% shrink target
    let alpha = policy.compute_alpha(1.0, -0.4, &mut probe).unwrap();
    assert_eq!(alpha, 1.0);
    assert_eq!(probes, 0);
}

#[test]
fn parabola_fit_steps_to_minimizer() {
    let mut policy = ParabolaFit;
    // Residual norms sampled from (alpha - 0.3)^2 + 0.1; the fitted parabola
    // reproduces it exactly, so the minimizer is 0.3
    let mut probe = |alpha: f64| -> Result<SlopeProbe<f64>, Box<dyn Error>> {
        Ok(SlopeProbe {
            slope: 0.0,
            residual_norm: (alpha - 0.3) * (alpha - 0.3) + 0.1,
        })
    };

    let alpha = policy.compute_alpha(0.0, 0.0, &mut probe).unwrap();
    assert_scalar_eq!(alpha, 0.3, comp = abs, tol = 1e-14);
}

#[test]
fn parabola_fit_takes_endpoint_when_descending() {
    let mut policy = ParabolaFit;
    // Concave residual profile that still decreases towards alpha = 1
    let mut probe = |alpha: f64| -> Result<SlopeProbe<f64>, Box<dyn Error>> {
        Ok(SlopeProbe {
            slope: 0.0,
            residual_norm: 2.0 - alpha * alpha,
        })
    };

    let alpha = policy.compute_alpha(0.0, 0.0, &mut probe).unwrap();
    assert_eq!(alpha, 1.0);
}

#[test]
fn parabola_fit_falls_back_when_concave_and_not_descending() {
    let mut policy = ParabolaFit;
    let norms = [1.0, 2.0, 1.0];
    let mut index = 0;
    let mut probe = |_alpha: f64| -> Result<SlopeProbe<f64>, Box<dyn Error>> {
        let norm = norms[index];
        index += 1;
        Ok(SlopeProbe {
            slope: 0.0,
            residual_norm: norm,
        })
    };

    let alpha = policy.compute_alpha(0.0, 0.0, &mut probe).unwrap();
    assert_eq!(alpha, 1e-3);
}

fn linear_function() -> ClosureVectorFunction<
    impl FnMut(&mut DVectorViewMut<f64>, &DVectorView<f64>),
    impl FnMut(&mut DVectorViewMut<f64>, &DVectorView<f64>, &DVectorView<f64>) -> Result<(), Box<dyn Error>>,
> {
    ClosureVectorFunction::new(
        1,
        |f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>| {
            f[0] = x[0];
        },
        |sol: &mut DVectorViewMut<f64>, _x: &DVectorView<f64>, rhs: &DVectorView<f64>| {
            sol[0] = rhs[0];
            Ok(())
        },
    )
}

#[test]
fn adaptive_search_takes_full_step_without_bracket() {
    let mut search = AdaptiveLineSearch::<f64>::new(LineSearchMethod::SecantBisection);
    let mut function = linear_function();

    // F(x) = x from x0 = 1 along the Newton direction -1: the slope at the
    // full step is zero, so no bracket exists and the default step is kept
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
    assert_eq!(search.current_alpha(), 1.0);
    assert_eq!(x[0], 0.0);
    assert_eq!(f[0], 0.0);
}

#[test]
fn adaptive_search_cuts_overshooting_direction() {
    let mut search = AdaptiveLineSearch::<f64>::new(LineSearchMethod::SecantBisection);
    // F(x) = x^3 - 4 x with roots 0 and +-2; from x0 = 1 the direction -2
    // overshoots the root at 0 and flips the slope sign
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

    let mut x = DVector::from_element(1, 1.0);
    let mut f = DVector::from_element(1, -3.0);
    let direction = DVector::from_element(1, -2.0);

    let alpha = search
        .step(
            &mut function,
            DVectorViewMut::from(&mut f),
            DVectorViewMut::from(&mut x),
            DVectorView::from(&direction),
        )
        .unwrap();

    // The first bisection lands exactly on the root at x = 0
    assert_eq!(alpha, 0.5);
    assert_eq!(search.current_alpha(), 0.5);
    assert_eq!(x[0], 0.0);
    assert_eq!(f[0], 0.0);
}

#[test]
fn adaptive_search_reuses_previous_step_length_as_warm_start() {
    let mut search = AdaptiveLineSearch::<f64>::new(LineSearchMethod::BonetWood);

    // First step on the cubic accepts a reduced step length
    let mut cubic = ClosureVectorFunction::new(
        1,
        |f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>| {
            f[0] = x[0] * x[0] * x[0] - 4.0 * x[0];
        },
        |sol: &mut DVectorViewMut<f64>, x: &DVectorView<f64>, rhs: &DVectorView<f64>| {
            sol[0] = rhs[0] / (3.0 * x[0] * x[0] - 4.0);
            Ok(())
        },
    );
    let mut x = DVector::from_element(1, 1.0);
    let mut f = DVector::from_element(1, -3.0);
    let direction = DVector::from_element(1, -2.0);
    let first = search
        .step(
            &mut cubic,
            DVectorViewMut::from(&mut f),
            DVectorViewMut::from(&mut x),
            DVectorView::from(&direction),
        )
        .unwrap();

    // eta = s0 / s1 = -1  =>  alpha = (-1 + sqrt(5)) / 2
    let expected = 0.5 * (-1.0 + 5.0_f64.sqrt());
    assert_scalar_eq!(first, expected, comp = abs, tol = 1e-14);

    // Second step without a slope sign change: the accepted value must be
    // the stored warm start, and the state must be rewound to it
    let mut function = linear_function();
    let mut x = DVector::from_element(1, 1.0);
    let mut f = DVector::from_element(1, 1.0);
    let direction = DVector::from_element(1, -1.0);
    let second = search
        .step(
            &mut function,
            DVectorViewMut::from(&mut f),
            DVectorViewMut::from(&mut x),
            DVectorView::from(&direction),
        )
        .unwrap();

    assert_eq!(second, first);
    assert_scalar_eq!(x[0], 1.0 - expected, comp = abs, tol = 1e-14);
    assert_scalar_eq!(f[0], 1.0 - expected, comp = abs, tol = 1e-14);
}

#[test]
fn adaptive_search_clamps_negative_secant_to_floor() {
    let mut search = AdaptiveLineSearch::<f64>::new(LineSearchMethod::RegulaFalsi);

    // Values chosen so that the regula-falsi update walks out of the unit
    // interval to alpha = -1/8 and then meets its shrink target, forcing the
    // outer clamp to the 0.001 floor. The probe points are hit exactly.
    let value_at = |x: f64| -> f64 {
        if x.abs() < 1e-9 {
            1.0
        } else if (x - 1.0).abs() < 1e-9 {
            -3.0
        } else if (x - 0.25).abs() < 1e-9 {
            -1.0
        } else if (x + 0.125).abs() < 1e-9 {
            -0.05
        } else {
            0.0
        }
    };
    let mut function = ClosureVectorFunction::new(
        1,
        move |f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>| {
            f[0] = value_at(x[0]);
        },
        |_sol: &mut DVectorViewMut<f64>, _x: &DVectorView<f64>, _rhs: &DVectorView<f64>| Ok(()),
    );

    let mut x = DVector::from_element(1, 0.0);
    let mut f = DVector::from_element(1, 1.0);
    let direction = DVector::from_element(1, 1.0);

    let alpha = search
        .step(
            &mut function,
            DVectorViewMut::from(&mut f),
            DVectorViewMut::from(&mut x),
            DVectorView::from(&direction),
        )
        .unwrap();

    assert_eq!(alpha, 0.001);
    assert_eq!(search.current_alpha(), 0.001);
    assert_scalar_eq!(x[0], 0.001, comp = abs, tol = 1e-12);
}
