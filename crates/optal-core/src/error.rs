use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

/// Failures of the expression algebra. Non-finite arithmetic propagates
/// as IEEE values instead; only an unbound symbol is an error.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unknown symbol '{name}' in evaluation environment")]
    UnknownSymbol { name: String },
}
