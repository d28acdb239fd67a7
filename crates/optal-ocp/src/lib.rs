//! optal-ocp: multi-stage optimal-control transcription.
//!
//! Client code declares one or more `Stage`s (states, controls, dynamics,
//! constraints, objective), binds a transcription `Method` and an NLP
//! solver to an `OcpMultiStage`, and solves. The first solve transcribes
//! every stage exactly once into one shared NLP; later solves reuse the
//! frozen problem with refreshed parameter values. A `Solution` samples
//! arbitrary stage expressions back into numbers on a chosen grid.

pub mod constraint;
pub mod error;
pub mod freetime;
pub mod integrator;
pub mod method;
pub mod ocp;
pub mod shooting;
pub mod solution;
pub mod stage;

pub use constraint::{Constraint, Placement, between, eq, ge, le};
pub use error::{OcpError, OcpResult};
pub use freetime::FreeTime;
pub use integrator::{ForwardEuler, Integrator, Rk4};
pub use method::{Grid, Method, StagePlan};
pub use ocp::{OcpMultiStage, StageId};
pub use solution::Solution;
pub use shooting::{MultipleShooting, SingleShooting};
pub use stage::{Horizon, Stage, StageOptions, StageVar};
