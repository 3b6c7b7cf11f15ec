/// Calculus helper traits and numerical differentiation
pub mod calculus;
/// Adaptive step-length policies for Newton iterations
pub mod line_search;
/// Implementations of the Newton method with different line search strategies
pub mod newton;
