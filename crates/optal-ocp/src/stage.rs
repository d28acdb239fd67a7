//! Stage: one phase of an optimal-control problem.

use std::collections::{HashMap, HashSet};

use optal_core::{Expr, SymbolId};

use crate::constraint::Constraint;
use crate::error::{OcpError, OcpResult};
use crate::freetime::FreeTime;

/// Stage horizon: fixed length, or itself a decision variable.
#[derive(Clone, Copy, Debug)]
pub enum Horizon {
    Fixed(f64),
    Free(FreeTime),
}

/// Configuration for a new stage.
#[derive(Clone, Debug)]
pub struct StageOptions {
    label: String,
    t0: f64,
    horizon: Horizon,
}

impl StageOptions {
    /// A stage with a fixed horizon length.
    pub fn fixed(horizon: f64) -> Self {
        Self {
            label: "stage".to_string(),
            t0: 0.0,
            horizon: Horizon::Fixed(horizon),
        }
    }

    /// A stage whose horizon length is optimized.
    pub fn free(horizon: FreeTime) -> Self {
        Self {
            label: "stage".to_string(),
            t0: 0.0,
            horizon: Horizon::Free(horizon),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_t0(mut self, t0: f64) -> Self {
        self.t0 = t0;
        self
    }
}

/// A declared stage variable: its symbol and logical name.
#[derive(Clone, Debug)]
pub struct StageVar {
    sym: Expr,
    id: SymbolId,
    name: String,
}

impl StageVar {
    pub fn sym(&self) -> &Expr {
        &self.sym
    }

    pub fn id(&self) -> SymbolId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A tracked integral: fresh symbol plus integrand.
#[derive(Clone, Debug)]
pub struct Quadrature {
    sym: Expr,
    id: SymbolId,
    integrand: Expr,
}

impl Quadrature {
    pub fn sym(&self) -> &Expr {
        &self.sym
    }

    pub fn id(&self) -> SymbolId {
        self.id
    }

    pub fn integrand(&self) -> &Expr {
        &self.integrand
    }
}

/// One phase of an OCP: its own time axis, declared variables, dynamics,
/// constraints, objective contribution and initial guesses.
///
/// `Clone` is the deep-copy/templating operation: expression nodes are
/// immutable, so the copy is a fully independent value whose later
/// declarations and constraints never touch the original.
#[derive(Clone, Debug)]
pub struct Stage {
    label: String,
    t0: f64,
    horizon: Horizon,
    time: Expr,
    time_id: SymbolId,
    horizon_sym: Option<Expr>,
    states: Vec<StageVar>,
    controls: Vec<StageVar>,
    parameters: Vec<StageVar>,
    names: HashSet<String>,
    derivatives: HashMap<SymbolId, Expr>,
    quadratures: Vec<Quadrature>,
    constraints: Vec<Constraint>,
    objective: Expr,
    initial: HashMap<SymbolId, f64>,
    values: HashMap<SymbolId, f64>,
}

impl Stage {
    pub fn new(opts: StageOptions) -> Self {
        let time = Expr::symbol(format!("{}.t", opts.label));
        let time_id = time.sym_id().expect("time is a symbol");
        let horizon_sym = match opts.horizon {
            Horizon::Fixed(_) => None,
            Horizon::Free(_) => Some(Expr::symbol(format!("{}.T", opts.label))),
        };
        Self {
            label: opts.label,
            t0: opts.t0,
            horizon: opts.horizon,
            time,
            time_id,
            horizon_sym,
            states: Vec::new(),
            controls: Vec::new(),
            parameters: Vec::new(),
            names: HashSet::new(),
            derivatives: HashMap::new(),
            quadratures: Vec::new(),
            constraints: Vec::new(),
            objective: Expr::zero(),
            initial: HashMap::new(),
            values: HashMap::new(),
        }
    }

    fn declare(&mut self, name: &str) -> OcpResult<StageVar> {
        if !self.names.insert(name.to_string()) {
            return Err(OcpError::DuplicateVariable {
                name: name.to_string(),
            });
        }
        let sym = Expr::symbol(name);
        let id = sym.sym_id().expect("declared variable is a symbol");
        Ok(StageVar {
            sym,
            id,
            name: name.to_string(),
        })
    }

    /// Declare a state variable.
    pub fn state(&mut self, name: &str) -> OcpResult<Expr> {
        let var = self.declare(name)?;
        let sym = var.sym.clone();
        self.states.push(var);
        Ok(sym)
    }

    /// Declare a control variable.
    pub fn control(&mut self, name: &str) -> OcpResult<Expr> {
        let var = self.declare(name)?;
        let sym = var.sym.clone();
        self.controls.push(var);
        Ok(sym)
    }

    /// Declare a parameter: a symbol fixed per solve, not optimized.
    pub fn parameter(&mut self, name: &str) -> OcpResult<Expr> {
        let var = self.declare(name)?;
        let sym = var.sym.clone();
        self.parameters.push(var);
        Ok(sym)
    }

    /// The stage's independent variable (its local time axis).
    pub fn t(&self) -> &Expr {
        &self.time
    }

    /// The horizon length as an expression: a constant for a fixed
    /// horizon, the horizon decision symbol for a free one.
    pub fn horizon_len(&self) -> Expr {
        match (&self.horizon, &self.horizon_sym) {
            (Horizon::Fixed(t), _) => Expr::constant(*t),
            (Horizon::Free(_), Some(sym)) => sym.clone(),
            (Horizon::Free(ft), None) => Expr::constant(ft.t_init()),
        }
    }

    // Every symbol an expression on this stage may legally reference.
    fn validate_symbols(&self, expr: &Expr) -> OcpResult<()> {
        for (id, name) in expr.symbols() {
            let owned = id == self.time_id
                || self.horizon_sym.as_ref().and_then(|s| s.sym_id()) == Some(id)
                || self.states.iter().any(|v| v.id == id)
                || self.controls.iter().any(|v| v.id == id)
                || self.parameters.iter().any(|v| v.id == id)
                || self.quadratures.iter().any(|q| q.id == id);
            if !owned {
                return Err(OcpError::ForeignSymbol { name });
            }
        }
        Ok(())
    }

    /// Associate the time derivative of a state with an expression.
    /// A later call for the same state replaces the earlier relation.
    pub fn set_der(&mut self, var: &Expr, rhs: impl Into<Expr>) -> OcpResult<()> {
        let id = var.sym_id().ok_or_else(|| OcpError::NotAState {
            name: var.to_string(),
        })?;
        if !self.states.iter().any(|v| v.id == id) {
            return Err(OcpError::NotAState {
                name: var.to_string(),
            });
        }
        let rhs = rhs.into();
        self.validate_symbols(&rhs)?;
        self.derivatives.insert(id, rhs);
        Ok(())
    }

    /// Add a constraint; use the `at_t0`/`at_tf` qualifiers on the
    /// constraint to restrict it to a boundary.
    pub fn subject_to(&mut self, constraint: Constraint) -> OcpResult<()> {
        self.validate_symbols(constraint.expr())?;
        self.constraints.push(constraint);
        Ok(())
    }

    /// Accumulate an objective contribution. Addition commutes, so the
    /// call order is irrelevant.
    pub fn add_objective(&mut self, term: impl Into<Expr>) -> OcpResult<()> {
        let term = term.into();
        self.validate_symbols(&term)?;
        self.objective = &self.objective + term;
        Ok(())
    }

    /// Numeric seed for a state or control. Overwrites any earlier guess;
    /// variables without a guess fall back to the method default.
    pub fn set_initial(&mut self, var: &Expr, value: f64) -> OcpResult<()> {
        let id = var.sym_id().ok_or_else(|| OcpError::ForeignSymbol {
            name: var.to_string(),
        })?;
        let known = self.states.iter().any(|v| v.id == id)
            || self.controls.iter().any(|v| v.id == id);
        if !known {
            return Err(OcpError::ForeignSymbol {
                name: var.to_string(),
            });
        }
        self.initial.insert(id, value);
        Ok(())
    }

    /// Fix or refresh a parameter value. Effective on the next solve; no
    /// re-transcription needed.
    pub fn set_value(&mut self, param: &Expr, value: f64) -> OcpResult<()> {
        let id = param.sym_id().ok_or_else(|| OcpError::ForeignSymbol {
            name: param.to_string(),
        })?;
        if !self.parameters.iter().any(|v| v.id == id) {
            return Err(OcpError::ForeignSymbol {
                name: param.to_string(),
            });
        }
        self.values.insert(id, value);
        Ok(())
    }

    /// Track the integral of `integrand` over the stage horizon. Returns
    /// a symbol standing for the accumulated integral; in the objective
    /// and at `t_f` it means the integral over the whole (possibly free)
    /// horizon.
    pub fn integral(&mut self, integrand: impl Into<Expr>) -> OcpResult<Expr> {
        let integrand = integrand.into();
        self.validate_symbols(&integrand)?;
        let sym = Expr::symbol(format!("intg{}", self.quadratures.len()));
        let id = sym.sym_id().expect("quadrature symbol");
        self.quadratures.push(Quadrature {
            sym: sym.clone(),
            id,
            integrand,
        });
        Ok(sym)
    }

    /// Total derivative of `expr` along the stage's independent variable:
    /// the explicit time partial plus chain-rule contributions through
    /// every declared state derivative and tracked integral.
    pub fn der(&self, expr: &Expr) -> OcpResult<Expr> {
        self.validate_symbols(expr)?;
        for c in &self.controls {
            if expr.depends_on(c.id) {
                return Err(OcpError::NonDifferentiable {
                    what: format!("depends on control '{}'", c.name),
                });
            }
        }
        let mut out = expr.diff(self.time_id);
        for s in &self.states {
            let partial = expr.diff(s.id);
            if partial.is_zero() {
                continue;
            }
            let rhs = self
                .derivatives
                .get(&s.id)
                .ok_or_else(|| OcpError::MissingDerivative {
                    name: s.name.clone(),
                })?;
            out = out + partial * rhs;
        }
        for q in &self.quadratures {
            let partial = expr.diff(q.id);
            if partial.is_zero() {
                continue;
            }
            out = out + partial * &q.integrand;
        }
        Ok(out)
    }

    /// Fail unless every declared state has a derivative relation.
    pub fn check_ready(&self) -> OcpResult<()> {
        for s in &self.states {
            if !self.derivatives.contains_key(&s.id) {
                return Err(OcpError::MissingDerivative {
                    name: s.name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn t0(&self) -> f64 {
        self.t0
    }

    pub fn horizon(&self) -> Horizon {
        self.horizon
    }

    pub fn horizon_symbol(&self) -> Option<&Expr> {
        self.horizon_sym.as_ref()
    }

    pub fn time_id(&self) -> SymbolId {
        self.time_id
    }

    pub fn states(&self) -> &[StageVar] {
        &self.states
    }

    pub fn controls(&self) -> &[StageVar] {
        &self.controls
    }

    pub fn parameters(&self) -> &[StageVar] {
        &self.parameters
    }

    pub fn quadratures(&self) -> &[Quadrature] {
        &self.quadratures
    }

    pub fn derivative_of(&self, id: SymbolId) -> Option<&Expr> {
        self.derivatives.get(&id)
    }

    pub fn initial_of(&self, id: SymbolId) -> Option<f64> {
        self.initial.get(&id).copied()
    }

    pub fn value_of(&self, id: SymbolId) -> Option<f64> {
        self.values.get(&id).copied()
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn objective(&self) -> &Expr {
        &self.objective
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::{eq, ge};
    use optal_core::Env;

    fn fixed_stage() -> Stage {
        Stage::new(StageOptions::fixed(1.0))
    }

    #[test]
    fn duplicate_declaration_is_rejected() {
        let mut stage = fixed_stage();
        stage.state("x").unwrap();
        let err = stage.state("x").unwrap_err();
        assert!(matches!(err, OcpError::DuplicateVariable { .. }));
        let err = stage.control("x").unwrap_err();
        assert!(matches!(err, OcpError::DuplicateVariable { .. }));
    }

    #[test]
    fn foreign_symbols_are_rejected() {
        let mut stage = fixed_stage();
        stage.state("x").unwrap();
        let alien = Expr::symbol("alien");
        let err = stage.subject_to(ge(&alien, 0.0)).unwrap_err();
        assert!(matches!(err, OcpError::ForeignSymbol { .. }));
        let err = stage.add_objective(&alien * 2.0).unwrap_err();
        assert!(matches!(err, OcpError::ForeignSymbol { .. }));
    }

    #[test]
    fn set_der_requires_a_state() {
        let mut stage = fixed_stage();
        let u = stage.control("u").unwrap();
        let err = stage.set_der(&u, Expr::constant(1.0)).unwrap_err();
        assert!(matches!(err, OcpError::NotAState { .. }));
    }

    #[test]
    fn check_ready_demands_all_derivatives() {
        let mut stage = fixed_stage();
        let x = stage.state("x").unwrap();
        stage.state("y").unwrap();
        stage.set_der(&x, Expr::constant(1.0)).unwrap();
        let err = stage.check_ready().unwrap_err();
        assert!(matches!(err, OcpError::MissingDerivative { name } if name == "y"));
    }

    #[test]
    fn der_applies_the_chain_rule() {
        let mut stage = fixed_stage();
        let x = stage.state("x").unwrap();
        let u = stage.control("u").unwrap();
        stage.set_der(&x, 2.0 * &u).unwrap();

        // d/dt (x^2) = 2 x xdot = 4 x u
        let d = stage.der(&(&x * &x)).unwrap();
        let mut env = Env::new();
        env.set(x.sym_id().unwrap(), 3.0);
        env.set(u.sym_id().unwrap(), 5.0);
        assert!((d.eval(&env).unwrap() - 60.0).abs() < 1e-12);

        // Expressions in the stage time differentiate directly.
        let t = stage.t().clone();
        let d = stage.der(&(&t * &t)).unwrap();
        env.set(stage.time_id(), 4.0);
        assert!((d.eval(&env).unwrap() - 8.0).abs() < 1e-12);

        // A control has no time derivative.
        let err = stage.der(&u).unwrap_err();
        assert!(matches!(err, OcpError::NonDifferentiable { .. }));
    }

    #[test]
    fn integral_symbol_differentiates_to_integrand() {
        let mut stage = fixed_stage();
        let x = stage.state("x").unwrap();
        stage.set_der(&x, Expr::constant(1.0)).unwrap();
        let q = stage.integral(&x * 2.0).unwrap();
        let d = stage.der(&q).unwrap();
        let mut env = Env::new();
        env.set(x.sym_id().unwrap(), 3.0);
        assert!((d.eval(&env).unwrap() - 6.0).abs() < 1e-12);
    }

    #[test]
    fn initial_guess_overwrites() {
        let mut stage = fixed_stage();
        let x = stage.state("x").unwrap();
        stage.set_initial(&x, 1.0).unwrap();
        stage.set_initial(&x, 4.0).unwrap();
        assert_eq!(stage.initial_of(x.sym_id().unwrap()), Some(4.0));
    }

    #[test]
    fn clone_is_a_deep_copy() {
        let mut stage = fixed_stage();
        let x = stage.state("x").unwrap();
        stage.set_der(&x, Expr::constant(0.0)).unwrap();
        stage.subject_to(ge(&x, 0.0)).unwrap();

        let mut copy = stage.clone();
        copy.subject_to(eq(&x, 1.0).at_tf()).unwrap();
        copy.control("u").unwrap();

        assert_eq!(stage.num_constraints(), 1);
        assert_eq!(copy.num_constraints(), 2);
        assert_eq!(stage.controls().len(), 0);
        assert_eq!(copy.controls().len(), 1);
    }
}
