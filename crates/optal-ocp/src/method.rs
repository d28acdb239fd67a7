//! Transcription strategy contract.

use std::collections::HashMap;

use optal_core::{Env, Expr, SymbolId};
use optal_nlp::NlpBuilder;

use crate::error::OcpResult;
use crate::stage::Stage;

/// Which grid to sample a solved trajectory on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Grid {
    /// Decision-grid nodes only.
    Control,
    /// `refine` integrator sub-steps per control interval.
    Integrator { refine: usize },
}

/// Per-stage transcription record produced by a [`Method`].
///
/// Node expressions are decision symbols for methods that carry state
/// decision variables at every node, or chained expressions for methods
/// that do not; sampling and constraint placement work on either.
/// `state_nodes` lists declared states first, then tracked integrals, in
/// declaration order.
#[derive(Clone, Debug)]
pub struct StagePlan {
    /// Control intervals.
    pub n: usize,
    /// Stage start time.
    pub t0: f64,
    /// Horizon length: a constant, or the horizon decision symbol.
    pub horizon: Expr,
    /// Per-node expressions for each state-like symbol (n + 1 per entry).
    pub state_nodes: Vec<(SymbolId, Vec<Expr>)>,
    /// Per-interval expressions for each control symbol (n per entry).
    pub control_nodes: Vec<(SymbolId, Vec<Expr>)>,
}

impl StagePlan {
    /// Stage time at a (fractional) node index, as an expression so a
    /// free horizon stays symbolic.
    pub fn time_at(&self, node: f64) -> Expr {
        Expr::constant(self.t0) + (node / self.n as f64) * &self.horizon
    }

    /// Substitution map binding every stage symbol to its node-`k`
    /// expression. Controls are held on their interval; the last node
    /// reuses the final interval's control.
    pub fn node_map(&self, stage: &Stage, k: usize) -> HashMap<SymbolId, Expr> {
        let mut map = HashMap::new();
        for (id, nodes) in &self.state_nodes {
            map.insert(*id, nodes[k].clone());
        }
        for (id, nodes) in &self.control_nodes {
            map.insert(*id, nodes[k.min(self.n - 1)].clone());
        }
        map.insert(stage.time_id(), self.time_at(k as f64));
        map
    }
}

/// A transcription strategy.
///
/// The orchestrator guarantees `transcribe` runs exactly once per stage
/// per problem lifetime; the shared builder is read-only afterwards.
pub trait Method {
    fn name(&self) -> &'static str;

    /// Register one stage's decision variables, constraints and objective
    /// terms into the shared builder; return the sampling plan.
    fn transcribe(&self, stage: &Stage, nlp: &mut NlpBuilder) -> OcpResult<StagePlan>;

    /// Map a stage-scoped expression to `(points, values)` on the
    /// requested grid, given solved numeric values in `env`.
    fn sample(
        &self,
        stage: &Stage,
        plan: &StagePlan,
        expr: &Expr,
        grid: Grid,
        env: &Env,
    ) -> OcpResult<(Vec<f64>, Vec<f64>)>;
}
