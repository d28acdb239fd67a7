//! Direct shooting transcription strategies.

use std::collections::HashMap;
use std::rc::Rc;

use optal_core::{Env, Expr, SymbolId};
use optal_nlp::{ConstraintKind, NlpBuilder};
use tracing::debug;

use crate::constraint::Placement;
use crate::error::{OcpError, OcpResult};
use crate::integrator::{Integrator, Rk4};
use crate::method::{Grid, Method, StagePlan};
use crate::stage::{Horizon, Stage};

// One state-like quantity of the augmented dynamics: declared states
// first, then tracked integrals (integrated alongside from zero).
struct Aug {
    id: SymbolId,
    name: String,
    rhs: Expr,
    init: f64,
    quad: bool,
}

fn augmented_dynamics(stage: &Stage) -> OcpResult<Vec<Aug>> {
    let mut aug = Vec::with_capacity(stage.states().len() + stage.quadratures().len());
    for s in stage.states() {
        let rhs = stage
            .derivative_of(s.id())
            .cloned()
            .ok_or_else(|| OcpError::MissingDerivative {
                name: s.name().to_string(),
            })?;
        aug.push(Aug {
            id: s.id(),
            name: s.name().to_string(),
            rhs,
            init: stage.initial_of(s.id()).unwrap_or(0.0),
            quad: false,
        });
    }
    for (qi, q) in stage.quadratures().iter().enumerate() {
        aug.push(Aug {
            id: q.id(),
            name: format!("intg{qi}"),
            rhs: q.integrand().clone(),
            init: 0.0,
            quad: true,
        });
    }
    Ok(aug)
}

fn transcribe_shooting(
    stage: &Stage,
    nlp: &mut NlpBuilder,
    n: usize,
    integrator: &dyn Integrator,
    states_at_every_node: bool,
) -> OcpResult<StagePlan> {
    stage.check_ready()?;
    let label = stage.label().to_string();

    let horizon = match stage.horizon() {
        Horizon::Fixed(t) => Expr::constant(t),
        Horizon::Free(ft) => {
            let sym = stage
                .horizon_symbol()
                .ok_or_else(|| OcpError::Transcription {
                    what: format!("stage '{label}' has a free horizon but no horizon symbol"),
                })?
                .clone();
            nlp.variable_for(&sym, ft.t_init())?;
            // a negative horizon would run the integrator backwards
            nlp.subject_to(sym.clone(), ConstraintKind::Ineq);
            sym
        }
    };
    let dt = &horizon / n as f64;

    for p in stage.parameters() {
        nlp.register_parameter(p.sym())?;
    }

    let aug = augmented_dynamics(stage)?;

    let mut state_nodes: Vec<(SymbolId, Vec<Expr>)> = Vec::with_capacity(aug.len());
    for a in &aug {
        let nodes: Vec<Expr> = if states_at_every_node {
            (0..=n)
                .map(|k| {
                    if a.quad && k == 0 {
                        Expr::zero()
                    } else {
                        nlp.variable(format!("{label}.{}[{k}]", a.name), a.init)
                    }
                })
                .collect()
        } else {
            let mut nodes = Vec::with_capacity(n + 1);
            nodes.push(if a.quad {
                Expr::zero()
            } else {
                nlp.variable(format!("{label}.{}[0]", a.name), a.init)
            });
            nodes
        };
        state_nodes.push((a.id, nodes));
    }

    let mut control_nodes: Vec<(SymbolId, Vec<Expr>)> = Vec::with_capacity(stage.controls().len());
    for c in stage.controls() {
        let init = stage.initial_of(c.id()).unwrap_or(0.0);
        let nodes = (0..n)
            .map(|k| nlp.variable(format!("{label}.{}[{k}]", c.name()), init))
            .collect();
        control_nodes.push((c.id(), nodes));
    }

    let aug_ids: Vec<SymbolId> = aug.iter().map(|a| a.id).collect();
    let rhs_exprs: Vec<Expr> = aug.iter().map(|a| a.rhs.clone()).collect();
    let time_id = stage.time_id();

    for k in 0..n {
        let mut interval_map: HashMap<SymbolId, Expr> = HashMap::new();
        for (id, nodes) in &control_nodes {
            interval_map.insert(*id, nodes[k].clone());
        }
        let rhs_fn = |xv: &[Expr], tv: &Expr| -> Vec<Expr> {
            let mut map = interval_map.clone();
            for (i, id) in aug_ids.iter().enumerate() {
                map.insert(*id, xv[i].clone());
            }
            map.insert(time_id, tv.clone());
            rhs_exprs.iter().map(|e| e.substitute(&map)).collect()
        };

        let xk: Vec<Expr> = state_nodes.iter().map(|(_, nodes)| nodes[k].clone()).collect();
        let tk = Expr::constant(stage.t0()) + (k as f64 / n as f64) * &horizon;
        let phi = integrator.step(&rhs_fn, &xk, &tk, &dt);

        for (i, (_, nodes)) in state_nodes.iter_mut().enumerate() {
            if states_at_every_node {
                nlp.subject_to(&nodes[k + 1] - &phi[i], ConstraintKind::Eq);
            } else {
                nodes.push(phi[i].clone());
            }
        }
    }

    let plan = StagePlan {
        n,
        t0: stage.t0(),
        horizon,
        state_nodes,
        control_nodes,
    };

    for c in stage.constraints() {
        let ks: Vec<usize> = match c.placement() {
            Placement::AtStart => vec![0],
            Placement::AtEnd => vec![n],
            Placement::Everywhere => (0..=n).collect(),
        };
        for k in ks {
            let map = plan.node_map(stage, k);
            nlp.subject_to(c.expr().substitute(&map), c.kind());
        }
    }

    let objective = stage.objective().clone();
    if !objective.is_zero() {
        let final_map = plan.node_map(stage, n);
        nlp.add_objective(objective.substitute(&final_map));
    }

    debug!(
        stage = %label,
        intervals = n,
        integrator = integrator.name(),
        variables = nlp.num_variables(),
        constraints = nlp.num_constraints(),
        "transcribed stage"
    );
    Ok(plan)
}

fn sample_shooting(
    stage: &Stage,
    plan: &StagePlan,
    integrator: &dyn Integrator,
    expr: &Expr,
    grid: Grid,
    env: &Env,
) -> OcpResult<(Vec<f64>, Vec<f64>)> {
    let n = plan.n;
    let h = plan.horizon.eval(env)?;
    let dt = h / n as f64;
    let t0 = plan.t0;

    match grid {
        Grid::Control => {
            let mut ts = Vec::with_capacity(n + 1);
            let mut vs = Vec::with_capacity(n + 1);
            for k in 0..=n {
                let map = plan.node_map(stage, k);
                ts.push(t0 + k as f64 * dt);
                vs.push(expr.substitute(&map).eval(env)?);
            }
            Ok((ts, vs))
        }
        Grid::Integrator { refine } => {
            let refine = refine.max(1);
            let sub_dt = dt / refine as f64;
            let sub_dt_expr = Expr::constant(sub_dt);

            let aug = augmented_dynamics(stage)?;
            let aug_ids: Vec<SymbolId> = aug.iter().map(|a| a.id).collect();
            let rhs_exprs: Vec<Expr> = aug.iter().map(|a| a.rhs.clone()).collect();
            let time_id = stage.time_id();

            let mut ts = Vec::with_capacity(n * refine + 1);
            let mut vs = Vec::with_capacity(n * refine + 1);
            for k in 0..n {
                // restart each interval from the solved node values
                let mut xcur = Vec::with_capacity(plan.state_nodes.len());
                for (_, nodes) in &plan.state_nodes {
                    xcur.push(Expr::constant(nodes[k].eval(env)?));
                }
                let mut interval_map: HashMap<SymbolId, Expr> = HashMap::new();
                for (id, nodes) in &plan.control_nodes {
                    interval_map.insert(*id, Expr::constant(nodes[k].eval(env)?));
                }
                let rhs_fn = |xv: &[Expr], tv: &Expr| -> Vec<Expr> {
                    let mut map = interval_map.clone();
                    for (i, id) in aug_ids.iter().enumerate() {
                        map.insert(*id, xv[i].clone());
                    }
                    map.insert(time_id, tv.clone());
                    rhs_exprs.iter().map(|e| e.substitute(&map)).collect()
                };

                for j in 0..refine {
                    let t_val = t0 + k as f64 * dt + j as f64 * sub_dt;
                    let mut map = interval_map.clone();
                    for (i, (id, _)) in plan.state_nodes.iter().enumerate() {
                        map.insert(*id, xcur[i].clone());
                    }
                    map.insert(time_id, Expr::constant(t_val));
                    ts.push(t_val);
                    vs.push(expr.substitute(&map).eval(env)?);

                    xcur = integrator.step(&rhs_fn, &xcur, &Expr::constant(t_val), &sub_dt_expr);
                }
            }
            let map = plan.node_map(stage, n);
            ts.push(t0 + h);
            vs.push(expr.substitute(&map).eval(env)?);
            Ok((ts, vs))
        }
    }
}

/// Direct multiple shooting: states and controls become decision
/// variables at every node, with gap-closing equality constraints tying
/// each interval's integrated endpoint to the next node.
#[derive(Clone, Debug)]
pub struct MultipleShooting {
    n: usize,
    integrator: Rc<dyn Integrator>,
}

impl MultipleShooting {
    /// `n` control intervals, RK4 integration.
    pub fn new(n: usize) -> Self {
        Self {
            n,
            integrator: Rc::new(Rk4),
        }
    }

    pub fn with_integrator(n: usize, integrator: impl Integrator + 'static) -> Self {
        Self {
            n,
            integrator: Rc::new(integrator),
        }
    }
}

impl Method for MultipleShooting {
    fn name(&self) -> &'static str {
        "multiple_shooting"
    }

    fn transcribe(&self, stage: &Stage, nlp: &mut NlpBuilder) -> OcpResult<StagePlan> {
        transcribe_shooting(stage, nlp, self.n, self.integrator.as_ref(), true)
    }

    fn sample(
        &self,
        stage: &Stage,
        plan: &StagePlan,
        expr: &Expr,
        grid: Grid,
        env: &Env,
    ) -> OcpResult<(Vec<f64>, Vec<f64>)> {
        sample_shooting(stage, plan, self.integrator.as_ref(), expr, grid, env)
    }
}

/// Direct single shooting: only the initial state is a decision variable;
/// later nodes are chained integrator expressions. Fewer variables, denser
/// nonlinearity.
#[derive(Clone, Debug)]
pub struct SingleShooting {
    n: usize,
    integrator: Rc<dyn Integrator>,
}

impl SingleShooting {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            integrator: Rc::new(Rk4),
        }
    }

    pub fn with_integrator(n: usize, integrator: impl Integrator + 'static) -> Self {
        Self {
            n,
            integrator: Rc::new(integrator),
        }
    }
}

impl Method for SingleShooting {
    fn name(&self) -> &'static str {
        "single_shooting"
    }

    fn transcribe(&self, stage: &Stage, nlp: &mut NlpBuilder) -> OcpResult<StagePlan> {
        transcribe_shooting(stage, nlp, self.n, self.integrator.as_ref(), false)
    }

    fn sample(
        &self,
        stage: &Stage,
        plan: &StagePlan,
        expr: &Expr,
        grid: Grid,
        env: &Env,
    ) -> OcpResult<(Vec<f64>, Vec<f64>)> {
        sample_shooting(stage, plan, self.integrator.as_ref(), expr, grid, env)
    }
}
