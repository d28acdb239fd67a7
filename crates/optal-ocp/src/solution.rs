//! Read-only solution handle.

use std::rc::Rc;

use nalgebra::DVector;
use optal_core::{Env, Expr};
use optal_nlp::NlpPoint;

use crate::error::{OcpError, OcpResult};
use crate::method::{Grid, StagePlan};
use crate::ocp::{StageId, Transcription};
use crate::stage::Stage;

/// A solved problem: the optimal decision vector plus enough frozen
/// context to translate stage expressions into sampled numbers.
///
/// Holds its own snapshot of the transcription and the parameter values
/// of its solve, so it stays valid across later re-solves.
pub struct Solution {
    x: DVector<f64>,
    objective: f64,
    constraint_violation: f64,
    iterations: usize,
    env: Env,
    trans: Rc<Transcription>,
}

impl Solution {
    pub(crate) fn new(point: NlpPoint, env: Env, trans: Rc<Transcription>) -> Self {
        Self {
            x: point.x,
            objective: point.objective,
            constraint_violation: point.constraint_violation,
            iterations: point.iterations,
            env,
            trans,
        }
    }

    pub fn objective(&self) -> f64 {
        self.objective
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn constraint_violation(&self) -> f64 {
        self.constraint_violation
    }

    /// Raw decision vector in NLP variable order.
    pub fn decision_vector(&self) -> &DVector<f64> {
        &self.x
    }

    fn stage_context(&self, id: StageId) -> OcpResult<(&Stage, &StagePlan)> {
        match (self.trans.stages.get(id.0), self.trans.plans.get(id.0)) {
            (Some(stage), Some(plan)) => Ok((stage, plan)),
            _ => Err(OcpError::UnknownStage { index: id.0 }),
        }
    }

    /// Evaluate a stage expression at the optimum, end-of-stage
    /// convention: states at the final node, tracked integrals over the
    /// whole horizon.
    pub fn value(&self, stage: StageId, expr: &Expr) -> OcpResult<f64> {
        let (stage, plan) = self.stage_context(stage)?;
        let map = plan.node_map(stage, plan.n);
        Ok(expr.substitute(&map).eval(&self.env)?)
    }

    /// Sample a stage expression on the requested grid; returns the
    /// parallel `(points, values)` pair, delegated to the method that
    /// produced this solution.
    pub fn sample(
        &self,
        stage: StageId,
        expr: &Expr,
        grid: Grid,
    ) -> OcpResult<(Vec<f64>, Vec<f64>)> {
        let (stage, plan) = self.stage_context(stage)?;
        self.trans.method.sample(stage, plan, expr, grid, &self.env)
    }
}
