//! optal-nlp: nonlinear program assembly and solving.
//!
//! `NlpBuilder` collects decision variables, parameters, constraints and
//! an objective as symbolic expressions. The `NlpSolver` trait is the
//! boundary to any numerical optimizer; `InteriorPoint` is the bundled
//! reference implementation (slack-based primal-dual barrier method with
//! Newton steps on the reduced KKT system).

pub mod builder;
pub mod derivatives;
pub mod error;
pub mod ip;
pub mod jacobian;
pub mod solver;

pub use builder::{ConstraintKind, NlpBuilder, NlpConstraint, Parameter, Variable};
pub use derivatives::CompiledScalar;
pub use error::{NlpResult, SolveError};
pub use ip::{InteriorPoint, IpConfig};
pub use solver::{NlpPoint, NlpSolver};
