//! First and second variations of geometric quantities with respect to
//! element degrees of freedom.
//!
//! A [`Variation2`] bundles a quantity with its first and second directional
//! derivatives along every local DOF. Rather than hand-deriving the second
//! variation of each strain measure, the measures are composed from a small
//! set of primitives, each of which implements one differentiation rule. For
//! any bilinear operation $\circ$ the combinators realize
//! $$ (a \circ b)_{,r} = a_{,r} \circ b + a \circ b_{,r}, \qquad
//!    (a \circ b)_{,rs} = a_{,rs} \circ b + a_{,r} \circ b_{,s}
//!    + a_{,s} \circ b_{,r} + a \circ b_{,rs}, $$
//! and for scalar maps the chain rule
//! $$ f(g)_{,rs} = f'(g)\, g_{,rs} + f''(g)\, g_{,r}\, g_{,s}. $$
//!
//! DOF independence falls out of the seeds: a quantity that does not depend
//! on some DOF simply carries a zero first variation there, so the measure
//! construction code never special-cases translational versus rotational
//! DOFs.

use crate::kinematics::skew_matrix;
use itertools::izip;
use nalgebra::{ClosedAdd, ClosedMul, ClosedSub, Matrix3, Vector3};
use num::Zero;
use numeric_literals::replace_float_literals;
use skald_traits::Real;
use std::ops::{Add, Mul, Neg, Sub};

/// Payload types admissible in a variation: closed under addition,
/// subtraction and scaling by the underlying scalar.
///
/// Implemented by the scalar itself, `Vector3` and `Matrix3`.
pub trait VariationValue<T>: Clone + Zero + ClosedAdd + ClosedSub + ClosedMul<T> {}

impl<T, V> VariationValue<T> for V where V: Clone + Zero + ClosedAdd + ClosedSub + ClosedMul<T> {}

/// A quantity together with its first and second variations with respect to
/// the local degrees of freedom.
///
/// The second variation is stored dense and row-major over DOF pairs; it is
/// symmetric for every quantity constructed through the combinators in this
/// module.
#[derive(Debug, Clone, PartialEq)]
pub struct Variation2<V> {
    value: V,
    first: Vec<V>,
    second: Vec<V>,
}

impl<V> Variation2<V> {
    /// A fully populated variation. The lengths of `first` and `second`
    /// must be `n` and `n * n` for a common DOF count `n`.
    pub fn new(value: V, first: Vec<V>, second: Vec<V>) -> Self {
        assert_eq!(first.len() * first.len(), second.len());
        Self { value, first, second }
    }

    /// A DOF-independent quantity: all variations vanish.
    pub fn constant(value: V, num_dofs: usize) -> Self
    where
        V: Zero + Clone,
    {
        Self {
            value,
            first: vec![V::zero(); num_dofs],
            second: vec![V::zero(); num_dofs * num_dofs],
        }
    }

    /// A quantity that is linear in the DOFs: first variations as given,
    /// second variations zero.
    pub fn from_first(value: V, first: Vec<V>) -> Self
    where
        V: Zero + Clone,
    {
        let n = first.len();
        Self {
            value,
            first,
            second: vec![V::zero(); n * n],
        }
    }

    pub fn num_dofs(&self) -> usize {
        self.first.len()
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    /// First variation along DOF `r`.
    pub fn first(&self, r: usize) -> &V {
        &self.first[r]
    }

    /// Second variation along the DOF pair `(r, s)`.
    pub fn second(&self, r: usize, s: usize) -> &V {
        &self.second[r * self.first.len() + s]
    }

    pub fn firsts(&self) -> &[V] {
        &self.first
    }

    /// Row-major slice of all second variations.
    pub fn seconds(&self) -> &[V] {
        &self.second
    }
}

/// Applies a bilinear operation under the generalized product rule.
///
/// This is the workhorse behind [`dot`], [`cross`], [`outer`], [`compose`],
/// [`apply`] and [`scale_by`]; `op` must be bilinear in its arguments for
/// the propagated variations to be exact.
pub fn bilinear<A, B, C>(
    a: &Variation2<A>,
    b: &Variation2<B>,
    op: impl Fn(&A, &B) -> C,
) -> Variation2<C>
where
    C: ClosedAdd,
{
    let n = a.num_dofs();
    assert_eq!(n, b.num_dofs());

    let value = op(&a.value, &b.value);
    let mut first = Vec::with_capacity(n);
    for r in 0..n {
        first.push(op(&a.first[r], &b.value) + op(&a.value, &b.first[r]));
    }
    let mut second = Vec::with_capacity(n * n);
    for r in 0..n {
        for s in 0..n {
            let mut d2 = op(&a.second[r * n + s], &b.value);
            d2 += op(&a.first[r], &b.first[s]);
            d2 += op(&a.first[s], &b.first[r]);
            d2 += op(&a.value, &b.second[r * n + s]);
            second.push(d2);
        }
    }
    Variation2 { value, first, second }
}

/// Scalar product $a \cdot b$ of two vector variations.
pub fn dot<T: Real>(a: &Variation2<Vector3<T>>, b: &Variation2<Vector3<T>>) -> Variation2<T> {
    bilinear(a, b, |x, y| x.dot(y))
}

/// Cross product $a \times b$ of two vector variations.
pub fn cross<T: Real>(
    a: &Variation2<Vector3<T>>,
    b: &Variation2<Vector3<T>>,
) -> Variation2<Vector3<T>> {
    bilinear(a, b, |x, y| x.cross(y))
}

/// Outer product $a \, b^T$ of two vector variations.
pub fn outer<T: Real>(
    a: &Variation2<Vector3<T>>,
    b: &Variation2<Vector3<T>>,
) -> Variation2<Matrix3<T>> {
    bilinear(a, b, |x, y| x * y.transpose())
}

/// Matrix product $A B$ of two matrix variations.
pub fn compose<T: Real>(
    a: &Variation2<Matrix3<T>>,
    b: &Variation2<Matrix3<T>>,
) -> Variation2<Matrix3<T>> {
    bilinear(a, b, |x, y| x * y)
}

/// Matrix-vector product $A v$ of a matrix and a vector variation.
pub fn apply<T: Real>(
    a: &Variation2<Matrix3<T>>,
    v: &Variation2<Vector3<T>>,
) -> Variation2<Vector3<T>> {
    bilinear(a, v, |x, y| x * y)
}

/// Product of a scalar variation with an arbitrary payload variation.
pub fn scale_by<T, V>(scalar: &Variation2<T>, payload: &Variation2<V>) -> Variation2<V>
where
    T: Real,
    V: VariationValue<T>,
{
    bilinear(scalar, payload, |s, v| v.clone() * *s)
}

/// Pushes a *linear* map through a variation by applying it to the value and
/// to every variation entry.
pub fn map_linear<V, W>(x: &Variation2<V>, f: impl Fn(&V) -> W) -> Variation2<W> {
    Variation2 {
        value: f(&x.value),
        first: x.first.iter().map(&f).collect(),
        second: x.second.iter().map(&f).collect(),
    }
}

/// Skew lift $[v]_\times$ of a vector variation.
pub fn skew<T: Real>(v: &Variation2<Vector3<T>>) -> Variation2<Matrix3<T>> {
    map_linear(v, skew_matrix)
}

/// Chain rule through a scalar function with prescribed derivatives at the
/// inner value: `f`, `df` and `ddf` are $f(g)$, $f'(g)$ and $f''(g)$.
pub fn chain<T: Real>(g: &Variation2<T>, f: T, df: T, ddf: T) -> Variation2<T> {
    let n = g.num_dofs();
    let first = g.first.iter().map(|&g_r| g_r * df).collect();
    let mut second = Vec::with_capacity(n * n);
    for r in 0..n {
        for s in 0..n {
            second.push(g.second[r * n + s] * df + g.first[r] * g.first[s] * ddf);
        }
    }
    Variation2 {
        value: f,
        first,
        second,
    }
}

/// Sine of a scalar (typically angle) variation.
pub fn sin<T: Real>(angle: &Variation2<T>) -> Variation2<T> {
    let (s, c) = angle.value.sin_cos();
    chain(angle, s, c, -s)
}

/// Cosine of a scalar (typically angle) variation.
pub fn cos<T: Real>(angle: &Variation2<T>) -> Variation2<T> {
    let (s, c) = angle.value.sin_cos();
    chain(angle, c, -s, -c)
}

/// Reciprocal $1 / (1 + c)$ with the denominator clamped away from zero.
///
/// The clamp covers the antiparallel degeneracy of the smallest-rotation
/// operator; configurations near it have no smooth variation anyway.
#[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
pub fn recip_one_plus<T: Real>(c: &Variation2<T>) -> Variation2<T> {
    let denom = (1.0 + c.value).max(1e-7);
    let f = 1.0 / denom;
    chain(c, f, -f * f, 2.0 * f * f * f)
}

/// Inverse norm $(v \cdot v)^{-1/2}$ of a vector variation.
#[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
pub fn inv_norm<T: Real>(v: &Variation2<Vector3<T>>) -> Variation2<T> {
    let squared = dot(v, v);
    let s = squared.value;
    let f = 1.0 / s.sqrt();
    let df = -0.5 * f / s;
    let ddf = 0.75 * f / (s * s);
    chain(&squared, f, df, ddf)
}

/// Normalization $v / \lVert v \rVert$ of a vector variation.
pub fn normalize<T: Real>(v: &Variation2<Vector3<T>>) -> Variation2<Vector3<T>> {
    scale_by(&inv_norm(v), v)
}

fn scaled_identity<T: Real>(s: &Variation2<T>) -> Variation2<Matrix3<T>> {
    map_linear(s, |&v| Matrix3::identity() * v)
}

/// Rodrigues rotation $\mathrm{rod}(v, \varphi) = \cos\varphi \, I +
/// [\sin\varphi \, v]_\times$ and its derivative along the curve parameter,
/// both as variations.
///
/// `axis_der` and `angle_der` are the parametric derivatives of the axis and
/// angle, themselves carrying their own DOF variations.
pub fn rodrigues_pair<T: Real>(
    axis: &Variation2<Vector3<T>>,
    axis_der: &Variation2<Vector3<T>>,
    angle: &Variation2<T>,
    angle_der: &Variation2<T>,
) -> (Variation2<Matrix3<T>>, Variation2<Matrix3<T>>) {
    let s = sin(angle);
    let c = cos(angle);

    let sv = scale_by(&s, axis);
    let rod = scaled_identity(&c) + skew(&sv);

    // (cos φ)' = -sin(φ) φ' and (sin(φ) v)' = cos(φ) φ' v + sin(φ) v'
    let c_der = -scale_by(&s, angle_der);
    let sv_der = scale_by(&scale_by(&c, angle_der), axis) + scale_by(&s, axis_der);
    let rod_der = scaled_identity(&c_der) + skew(&sv_der);

    (rod, rod_der)
}

/// Smallest rotation $\mathrm{lam}(v_1, v_2)$ mapping one unit vector onto
/// another, and its derivative along the curve parameter, both as
/// variations.
pub fn smallest_rotation_pair<T: Real>(
    v1: &Variation2<Vector3<T>>,
    v1_der: &Variation2<Vector3<T>>,
    v2: &Variation2<Vector3<T>>,
    v2_der: &Variation2<Vector3<T>>,
) -> (Variation2<Matrix3<T>>, Variation2<Matrix3<T>>) {
    let c = dot(v1, v2);
    let c_der = dot(v1_der, v2) + dot(v1, v2_der);
    let w = cross(v1, v2);
    let w_der = cross(v1_der, v2) + cross(v1, v2_der);

    let d = recip_one_plus(&c);
    // d' = -c' d²
    let d_der = -scale_by(&c_der, &scale_by(&d, &d));

    let lam = scaled_identity(&c) + skew(&w) + scale_by(&d, &outer(&w, &w));
    let lam_der = scaled_identity(&c_der)
        + skew(&w_der)
        + scale_by(&d_der, &outer(&w, &w))
        + scale_by(&d, &(&outer(&w_der, &w) + &outer(&w, &w_der)));

    (lam, lam_der)
}

impl<V: ClosedAdd> Add for Variation2<V> {
    type Output = Variation2<V>;

    fn add(mut self, rhs: Variation2<V>) -> Self::Output {
        assert_eq!(self.num_dofs(), rhs.num_dofs());
        self.value += rhs.value;
        for (x, y) in izip!(&mut self.first, rhs.first) {
            *x += y;
        }
        for (x, y) in izip!(&mut self.second, rhs.second) {
            *x += y;
        }
        self
    }
}

impl<'a, 'b, V: ClosedAdd + Clone> Add<&'b Variation2<V>> for &'a Variation2<V> {
    type Output = Variation2<V>;

    fn add(self, rhs: &'b Variation2<V>) -> Self::Output {
        self.clone() + rhs.clone()
    }
}

impl<V: ClosedSub> Sub for Variation2<V> {
    type Output = Variation2<V>;

    fn sub(mut self, rhs: Variation2<V>) -> Self::Output {
        assert_eq!(self.num_dofs(), rhs.num_dofs());
        self.value -= rhs.value;
        for (x, y) in izip!(&mut self.first, rhs.first) {
            *x -= y;
        }
        for (x, y) in izip!(&mut self.second, rhs.second) {
            *x -= y;
        }
        self
    }
}

impl<'a, 'b, V: ClosedSub + Clone> Sub<&'b Variation2<V>> for &'a Variation2<V> {
    type Output = Variation2<V>;

    fn sub(self, rhs: &'b Variation2<V>) -> Self::Output {
        self.clone() - rhs.clone()
    }
}

impl<V: ClosedSub + Zero> Neg for Variation2<V> {
    type Output = Variation2<V>;

    fn neg(mut self) -> Self::Output {
        self.value = V::zero() - self.value;
        for x in &mut self.first {
            *x = V::zero() - std::mem::replace(x, V::zero());
        }
        for x in &mut self.second {
            *x = V::zero() - std::mem::replace(x, V::zero());
        }
        self
    }
}

impl<V, S> Mul<S> for Variation2<V>
where
    V: ClosedMul<S>,
    S: Copy,
{
    type Output = Variation2<V>;

    fn mul(mut self, rhs: S) -> Self::Output {
        self.value *= rhs;
        for x in &mut self.first {
            *x *= rhs;
        }
        for x in &mut self.second {
            *x *= rhs;
        }
        self
    }
}
