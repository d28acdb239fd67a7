//! Solver contract.

use nalgebra::DVector;
use optal_core::Env;

use crate::builder::NlpBuilder;
use crate::error::NlpResult;

/// A solved point with its diagnostics.
#[derive(Clone, Debug)]
pub struct NlpPoint {
    /// Optimal decision vector, in builder variable order.
    pub x: DVector<f64>,
    /// Objective value at `x`.
    pub objective: f64,
    /// Worst constraint violation at `x` (infinity norm).
    pub constraint_violation: f64,
    /// Iterations spent.
    pub iterations: usize,
}

/// Boundary to any numerical NLP optimizer.
///
/// Implementations receive the assembled problem and the parameter values
/// for this solve, and either return an optimal point or a failure with
/// diagnostics. The builder is read-only here.
pub trait NlpSolver {
    fn solve(&self, nlp: &NlpBuilder, params: &Env) -> NlpResult<NlpPoint>;
}
