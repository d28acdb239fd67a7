//! Error types for NLP assembly and solving.

use optal_core::CoreError;
use thiserror::Error;

/// Errors that can occur while building or solving an NLP.
#[derive(Error, Debug)]
pub enum SolveError {
    #[error("Problem setup error: {what}")]
    Setup { what: String },

    #[error("Locally infeasible: constraint violation {violation:.3e} after {iterations} iterations")]
    Infeasible { violation: f64, iterations: usize },

    #[error("Iteration limit {limit} reached (KKT error {kkt:.3e})")]
    IterationLimit { limit: usize, kkt: f64 },

    #[error("Numerical failure: {what}")]
    Numerical { what: String },

    #[error("Math engine error: {0}")]
    Core(#[from] CoreError),
}

pub type NlpResult<T> = Result<T, SolveError>;
