//! Error types for problem declaration, transcription and solving.

use optal_core::CoreError;
use optal_nlp::SolveError;
use thiserror::Error;

/// Errors surfaced by stages, the orchestrator and solutions.
#[derive(Error, Debug)]
pub enum OcpError {
    #[error("Variable '{name}' already declared on this stage")]
    DuplicateVariable { name: String },

    #[error("'{name}' is not a state of this stage")]
    NotAState { name: String },

    #[error("Symbol '{name}' does not belong to this stage")]
    ForeignSymbol { name: String },

    #[error("State '{name}' has no derivative relation")]
    MissingDerivative { name: String },

    #[error("Expression is not differentiable along the stage time: {what}")]
    NonDifferentiable { what: String },

    #[error("Parameter '{name}' has no value; call set_value before solving")]
    MissingParameterValue { name: String },

    #[error("No method bound; call method() before solve()")]
    MissingMethod,

    #[error("No solver bound; call solver() before solve()")]
    MissingSolver,

    #[error("Problem already transcribed; {what} has no effect anymore")]
    AlreadyTranscribed { what: &'static str },

    #[error("No stage with index {index}")]
    UnknownStage { index: usize },

    #[error("Transcription failed: {what}")]
    Transcription { what: String },

    #[error("Solver failure: {0}")]
    Solve(#[from] SolveError),

    #[error("Math engine error: {0}")]
    Core(#[from] CoreError),
}

pub type OcpResult<T> = Result<T, OcpError>;
