use crate::calculus::VectorFunction;
use crate::newton::LineSearch;
use log::debug;
use nalgebra::{DVectorView, DVectorViewMut};
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};
use skald_traits::Real;
use std::error::Error;
use std::fmt;

/// Measurements taken at a trial step length along the search direction.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SlopeProbe<T> {
    /// Directional derivative of the residual energy, $s(\alpha) = p^T F(x + \alpha p)$.
    pub slope: T,
    /// Euclidean norm of the residual at the trial point.
    pub residual_norm: T,
}

/// Evaluates [`SlopeProbe`] quantities at a given step length.
///
/// Implementations must not leave any lasting state change behind: after the
/// policy returns, the caller rewinds the trial state to the accepted step.
pub type Probe<'a, T> = dyn FnMut(T) -> Result<SlopeProbe<T>, Box<dyn Error>> + 'a;

/// Selects one of the interchangeable step-length policies understood by
/// [`AdaptiveLineSearch`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineSearchMethod {
    SecantBisection,
    BonetWood,
    ErrorRatio,
    RegulaFalsi,
    ParabolaFit,
}

/// A step-length selection rule for a single Newton iteration.
///
/// `s0` and `s1` are the slopes $s(0)$ and $s(1)$ along the Newton direction.
/// Policies for which [`requires_bracket`](Self::requires_bracket) is true are
/// only invoked when `s0 * s1 < 0`; the caller falls back to the previously
/// accepted step length otherwise. The returned value is clamped by the caller
/// to $(0, 1]$ with a floor of `0.001`.
pub trait LineSearchPolicy<T: Real> {
    fn requires_bracket(&self) -> bool {
        true
    }

    fn compute_alpha(&mut self, s0: T, s1: T, probe: &mut Probe<T>) -> Result<T, Box<dyn Error>>;
}

/// Bisects the bracket $[0, 1]$ until the trial slope has shrunk below
/// 30% of the initial slope, with a budget of 10 probes.
#[derive(Clone, Debug)]
pub struct SecantBisection;

impl<T: Real> LineSearchPolicy<T> for SecantBisection {
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    fn compute_alpha(&mut self, s0: T, s1: T, probe: &mut Probe<T>) -> Result<T, Box<dyn Error>> {
        let mut s_lower = s0;
        let mut s_upper = s1;
        // Start from the endpoint slope of larger magnitude so the shrink test
        // measures progress against the worst end of the bracket.
        let mut s_trial = if s1.abs() < s0.abs() { s0 } else { s1 };
        let mut lower = 0.0;
        let mut upper = 1.0;
        let mut alpha = 1.0;

        let mut iterations = 0;
        while (s_trial / s0).abs() > 0.3
            && iterations < 10
            && s_lower.abs() > 1e-7
            && s_upper.abs() > 1e-7
            && s_lower * s_upper < 0.0
        {
            alpha = 0.5 * (lower + upper);
            s_trial = probe(alpha)?.slope;

            if s_trial * s_upper < 0.0 {
                lower = alpha;
                s_lower = s_trial;
            } else if s_trial * s_lower < 0.0 {
                upper = alpha;
                s_upper = s_trial;
            } else {
                break;
            }
            iterations += 1;
        }

        Ok(alpha)
    }
}

/// Closed-form quadratic step estimate of Bonet & Wood, re-applied up to
/// 3 times until the trial slope has shrunk below half the initial slope.
///
/// With $\eta = s_0 / s(\alpha)$ the update is
/// $\alpha = \tfrac{1}{2}\left(\eta + \sqrt{\eta(\eta - 4)}\right)$ for
/// $\eta < 0$ and $\alpha = \eta / 2$ for $0 < \eta \le 2$.
#[derive(Clone, Debug)]
pub struct BonetWood;

impl<T: Real> LineSearchPolicy<T> for BonetWood {
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    fn compute_alpha(&mut self, s0: T, s1: T, probe: &mut Probe<T>) -> Result<T, Box<dyn Error>> {
        let mut s_trial = s1;
        let mut alpha = 1.0;

        // The closed form is applied at least once per invocation; the shrink
        // test only governs repeats.
        let mut iterations = 0;
        while iterations < 3 && s0.abs() > 1e-7 && s_trial.abs() > 1e-7 {
            let eta = s0 / s_trial;
            if eta < 0.0 {
                alpha = 0.5 * (eta + (eta * (eta - 4.0)).sqrt());
            } else if eta <= 2.0 {
                alpha = 0.5 * eta;
            } else {
                break;
            }
            s_trial = probe(alpha)?.slope;
            iterations += 1;
            if s_trial.abs() <= 0.5 * s0.abs() {
                break;
            }
        }

        Ok(alpha)
    }
}

/// Variant of the quadratic estimate driven by the slope ratio of the most
/// recent probe, $\eta = s_0 / s(\alpha)$, with a budget of 10 probes and an
/// absolute slope cutoff.
#[derive(Clone, Debug)]
pub struct ErrorRatio;

impl<T: Real> LineSearchPolicy<T> for ErrorRatio {
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    fn compute_alpha(&mut self, s0: T, s1: T, probe: &mut Probe<T>) -> Result<T, Box<dyn Error>> {
        let mut s_trial = s1;
        let mut eta = s0 / s1;
        let mut alpha = 1.0;

        let mut iterations = 0;
        while (s_trial / s0).abs() > 0.5 && iterations < 10 && s_trial.abs() > 1e-4 {
            if eta < 0.0 {
                alpha = eta / (0.5 * (eta - (eta * (eta - 4.0)).sqrt()));
            } else if eta > 0.0 && eta <= 2.0 {
                alpha = 0.5 * eta;
            } else {
                break;
            }
            s_trial = probe(alpha)?.slope;
            eta = s0 / s_trial;
            iterations += 1;
        }

        Ok(alpha)
    }
}

/// Regula-falsi secant update on the slope (Crisfield, Wriggers), with a
/// budget of 4 corrections and an 80% shrink target.
#[derive(Clone, Debug)]
pub struct RegulaFalsi;

impl<T: Real> LineSearchPolicy<T> for RegulaFalsi {
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    fn compute_alpha(&mut self, s0: T, s1: T, probe: &mut Probe<T>) -> Result<T, Box<dyn Error>> {
        let mut alpha = 1.0;
        let mut alpha_current = 1.0;
        let mut alpha_previous = 0.0;
        let mut s_current = s1;
        let mut s_previous = s0;

        let mut iterations = 0;
        while s_current.abs() > 0.8 * s0.abs()
            && iterations <= 3
            && s_current.abs() > 1e-5
            && s_previous.abs() > 1e-5
        {
            alpha = alpha_current - s_current * (alpha_current - alpha_previous) / (s_current - s_previous);

            alpha_previous = alpha_current;
            alpha_current = alpha;
            s_previous = s_current;
            s_current = probe(alpha_current)?.slope;

            iterations += 1;
        }

        Ok(alpha)
    }
}

/// Fits a parabola to the residual norms at $\alpha \in \{0, \tfrac{1}{2}, 1\}$
/// and steps to its minimizer when it is convex, otherwise to whichever
/// endpoint has the smaller residual.
///
/// The only policy that does not require a slope sign change; it runs on
/// every iteration.
#[derive(Clone, Debug)]
pub struct ParabolaFit;

impl<T: Real> LineSearchPolicy<T> for ParabolaFit {
    fn requires_bracket(&self) -> bool {
        false
    }

    #[replace_float_literals(T::from_f64(literal).unwrap())]
    fn compute_alpha(&mut self, _s0: T, _s1: T, probe: &mut Probe<T>) -> Result<T, Box<dyn Error>> {
        let r_zero = probe(0.0)?.residual_norm;
        let r_half = probe(0.5)?.residual_norm;
        let r_full = probe(1.0)?.residual_norm;

        // Parabola r(x) = a x^2 + b x + c through (0, r_zero), (1/2, r_half), (1, r_full)
        let a = 2.0 * r_full + 2.0 * r_zero - 4.0 * r_half;
        let b = 4.0 * r_half - r_full - 3.0 * r_zero;

        let alpha = if a > 0.0 {
            // Convex: minimizer at -b / 2a
            -0.5 * b / a
        } else if r_full < r_zero {
            1.0
        } else {
            // Should be zero, but the iteration would stagnate
            1e-3
        };

        Ok(alpha)
    }
}

/// Line search driving one of the [`LineSearchPolicy`] implementations,
/// usable wherever a [`LineSearch`] is expected.
///
/// The slope along the Newton direction is
/// $s(\alpha) = p^T F(x + \alpha p)$. A policy that requires bracketing is
/// only consulted when $s(0) \cdot s(1) < 0$; otherwise the previously
/// accepted step length (initially 1) is reused. The accepted value is
/// clamped to $(0, 1]$ with a floor of `0.001` and stored as the warm start
/// for the next iteration. Probing perturbs and rewinds the state in place;
/// on return, `x` and `f` correspond exactly to the accepted step.
pub struct AdaptiveLineSearch<T> {
    method: LineSearchMethod,
    policy: Box<dyn LineSearchPolicy<T>>,
    alpha: T,
}

impl<T: Real> AdaptiveLineSearch<T> {
    pub fn new(method: LineSearchMethod) -> Self {
        let policy: Box<dyn LineSearchPolicy<T>> = match method {
            LineSearchMethod::SecantBisection => Box::new(SecantBisection),
            LineSearchMethod::BonetWood => Box::new(BonetWood),
            LineSearchMethod::ErrorRatio => Box::new(ErrorRatio),
            LineSearchMethod::RegulaFalsi => Box::new(RegulaFalsi),
            LineSearchMethod::ParabolaFit => Box::new(ParabolaFit),
        };
        Self {
            method,
            policy,
            alpha: T::one(),
        }
    }

    pub fn method(&self) -> LineSearchMethod {
        self.method
    }

    /// The most recently accepted step length (the warm start for the next search).
    pub fn current_alpha(&self) -> T {
        self.alpha
    }
}

impl<T: fmt::Debug> fmt::Debug for AdaptiveLineSearch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptiveLineSearch")
            .field("method", &self.method)
            .field("alpha", &self.alpha)
            .finish_non_exhaustive()
    }
}

impl<T, F> LineSearch<T, F> for AdaptiveLineSearch<T>
where
    T: Real,
    F: VectorFunction<T>,
{
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    fn step(
        &mut self,
        function: &mut F,
        mut f: DVectorViewMut<T>,
        mut x: DVectorViewMut<T>,
        direction: DVectorView<T>,
    ) -> Result<T, Box<dyn Error>> {
        let p = direction;

        // f holds F(x) on entry
        let s0 = p.dot(&f);

        let needs_bracket = self.policy.requires_bracket();
        let mut accepted = self.alpha;

        // x is walked by delta-alpha increments, so probing needs no extra
        // position buffer
        let mut at_alpha = 0.0;
        let s1;
        let searched;
        {
            let mut probe = |alpha: T| -> Result<SlopeProbe<T>, Box<dyn Error>> {
                x.axpy(alpha - at_alpha, &p, T::one());
                at_alpha = alpha;
                function.eval_into(&mut f, &DVectorView::from(&x));
                Ok(SlopeProbe {
                    slope: p.dot(&f),
                    residual_norm: f.norm(),
                })
            };

            s1 = probe(1.0)?.slope;
            searched = !needs_bracket || s0 * s1 < 0.0;

            if searched {
                let mut alpha = self.policy.compute_alpha(s0, s1, &mut probe)?;
                if alpha > 1.0 {
                    alpha = 1.0;
                }
                if alpha <= 0.0 {
                    alpha = 0.001;
                }
                accepted = alpha;
            }
        }

        if searched {
            self.alpha = accepted;
        }

        // Rewind (or advance) to the accepted step and refresh the residual
        if accepted != at_alpha {
            x.axpy(accepted - at_alpha, &p, T::one());
            function.eval_into(&mut f, &DVectorView::from(&x));
        }

        debug!(
            "Line search ({:?}): s0 = {}, s1 = {}, accepted alpha = {}",
            self.method, s0, s1, accepted
        );

        Ok(accepted)
    }
}
