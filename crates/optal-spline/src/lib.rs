//! optal-spline: B-spline basis engine.
//!
//! Builds basis matrices and derivative operators over arbitrary knot
//! vectors with the Cox-de Boor recursion. Everything is written against
//! the `optal_core::Expr` algebra, so the same code path serves concrete
//! floating-point knots (results collapse to numbers) and symbolic knots
//! (results stay expression graphs).

pub mod basis;
pub mod derivative;
pub mod knots;

pub use basis::{BasisMatrix, eval_basis_knotindex, eval_basis_knotindex_subsampled, eval_on_knots};
pub use derivative::bspline_derivative;
pub use knots::KnotVector;
