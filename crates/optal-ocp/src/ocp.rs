//! Multi-stage orchestrator: transcribe once, solve many.

use std::rc::Rc;

use optal_core::Env;
use optal_nlp::{NlpBuilder, NlpSolver};
use tracing::info;

use crate::error::{OcpError, OcpResult};
use crate::freetime::FreeTime;
use crate::method::{Method, StagePlan};
use crate::solution::Solution;
use crate::stage::Stage;

/// Handle to a registered stage, issued by [`OcpMultiStage::add_stage`]
/// in registration order. Registration order is also transcription
/// order, so the handle doubles as the stage's position in the chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StageId(pub(crate) usize);

// Frozen transcription state: the assembled NLP plus everything needed to
// sample solutions later. Shared by reference with every Solution handle,
// so re-solving never invalidates earlier solutions.
pub(crate) struct Transcription {
    pub(crate) nlp: NlpBuilder,
    pub(crate) plans: Vec<StagePlan>,
    pub(crate) stages: Vec<Stage>,
    pub(crate) method: Rc<dyn Method>,
}

/// An ordered collection of stages sharing one transcription method and
/// one NLP solver.
///
/// The lifecycle is one-way: stages and the method are configured, the
/// first `solve` transcribes every stage exactly once, and later solves
/// reuse the frozen NLP with refreshed parameter values. A failed
/// transcription leaves the problem untranscribed so a corrected retry
/// can start over.
#[derive(Default)]
pub struct OcpMultiStage {
    stages: Vec<Stage>,
    method: Option<Rc<dyn Method>>,
    solver: Option<Box<dyn NlpSolver>>,
    transcription: Option<Rc<Transcription>>,
}

impl OcpMultiStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stage. Registration order is transcription order.
    pub fn add_stage(&mut self, stage: Stage) -> OcpResult<StageId> {
        if self.transcription.is_some() {
            return Err(OcpError::AlreadyTranscribed { what: "add_stage" });
        }
        let id = StageId(self.stages.len());
        self.stages.push(stage);
        Ok(id)
    }

    /// Register a deep copy of an already registered stage (template
    /// reuse); mutating the copy never affects the original.
    pub fn add_stage_from(&mut self, template: StageId) -> OcpResult<StageId> {
        let copy = self.stage(template)?.clone();
        self.add_stage(copy)
    }

    pub fn stage(&self, id: StageId) -> OcpResult<&Stage> {
        self.stages
            .get(id.0)
            .ok_or(OcpError::UnknownStage { index: id.0 })
    }

    pub fn stage_mut(&mut self, id: StageId) -> OcpResult<&mut Stage> {
        self.stages
            .get_mut(id.0)
            .ok_or(OcpError::UnknownStage { index: id.0 })
    }

    pub fn num_stages(&self) -> usize {
        self.stages.len()
    }

    /// Bind the single transcription method shared by all stages.
    pub fn method(&mut self, method: impl Method + 'static) -> OcpResult<()> {
        if self.transcription.is_some() {
            return Err(OcpError::AlreadyTranscribed { what: "method" });
        }
        self.method = Some(Rc::new(method));
        Ok(())
    }

    /// Bind the NLP solver used by `solve`. May be swapped between
    /// solves.
    pub fn solver(&mut self, solver: impl NlpSolver + 'static) {
        self.solver = Some(Box::new(solver));
    }

    /// Convenience constructor for a free-horizon marker.
    pub fn free(&self, t_init: f64) -> FreeTime {
        FreeTime::new(t_init)
    }

    pub fn is_transcribed(&self) -> bool {
        self.transcription.is_some()
    }

    /// Transcribe every stage in registration order, exactly once.
    pub fn transcribe(&mut self) -> OcpResult<()> {
        if self.transcription.is_some() {
            return Ok(());
        }
        let method = self.method.clone().ok_or(OcpError::MissingMethod)?;
        let mut nlp = NlpBuilder::new();
        let mut plans = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            plans.push(method.transcribe(stage, &mut nlp)?);
        }
        info!(
            stages = self.stages.len(),
            variables = nlp.num_variables(),
            constraints = nlp.num_constraints(),
            "problem transcribed"
        );
        self.transcription = Some(Rc::new(Transcription {
            nlp,
            plans,
            stages: self.stages.clone(),
            method,
        }));
        Ok(())
    }

    // Current parameter values across all stages.
    fn parameter_env(&self) -> OcpResult<Env> {
        let mut env = Env::new();
        for stage in &self.stages {
            for p in stage.parameters() {
                let v = stage
                    .value_of(p.id())
                    .ok_or_else(|| OcpError::MissingParameterValue {
                        name: p.name().to_string(),
                    })?;
                env.set(p.id(), v);
            }
        }
        Ok(env)
    }

    /// Solve the assembled problem and wrap the result.
    ///
    /// The first call transcribes; later calls reuse the frozen NLP and
    /// only pick up refreshed parameter values.
    pub fn solve(&mut self) -> OcpResult<Solution> {
        self.transcribe()?;
        let Some(trans) = self.transcription.clone() else {
            return Err(OcpError::Transcription {
                what: "transcription unavailable after transcribe".to_string(),
            });
        };
        let solver = self.solver.as_ref().ok_or(OcpError::MissingSolver)?;
        let params = self.parameter_env()?;
        let point = solver.solve(&trans.nlp, &params)?;
        let env = trans.nlp.env_for(&point.x, &params);
        Ok(Solution::new(point, env, trans))
    }

    /// Decision variable count of the transcribed NLP, if transcribed.
    pub fn num_variables(&self) -> Option<usize> {
        self.transcription.as_ref().map(|t| t.nlp.num_variables())
    }

    /// Constraint count of the transcribed NLP, if transcribed.
    pub fn num_constraints(&self) -> Option<usize> {
        self.transcription.as_ref().map(|t| t.nlp.num_constraints())
    }

    /// Constraint Jacobian sparsity pattern. Diagnostic only.
    pub fn jacobian_sparsity(&self) -> Option<Vec<(usize, usize)>> {
        self.transcription.as_ref().map(|t| t.nlp.jacobian_sparsity())
    }

    /// Lagrangian Hessian sparsity pattern. Diagnostic only.
    pub fn hessian_sparsity(&self) -> Option<Vec<(usize, usize)>> {
        self.transcription.as_ref().map(|t| t.nlp.hessian_sparsity())
    }
}
