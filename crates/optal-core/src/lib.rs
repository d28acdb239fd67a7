//! optal-core: stable foundation for optal.
//!
//! Contains:
//! - expr (symbolic/numeric expression graph, symbol identity,
//!   differentiation)
//! - error (shared error types)

pub mod error;
pub mod expr;

// Re-exports: nice ergonomics for downstream crates
pub use error::{CoreError, CoreResult};
pub use expr::{Env, Expr, SymbolId};
