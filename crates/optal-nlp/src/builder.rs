//! NLP problem assembly.

use std::collections::{BTreeSet, HashMap, HashSet};

use nalgebra::DVector;
use optal_core::{Env, Expr, SymbolId};

use crate::error::{NlpResult, SolveError};

/// Constraint classification in canonical form.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstraintKind {
    /// expr == 0
    Eq,
    /// expr >= 0
    Ineq,
}

/// One decision variable: a symbol, its display name and initial guess.
#[derive(Clone, Debug)]
pub struct Variable {
    pub sym: Expr,
    pub name: String,
    pub init: f64,
}

/// A symbol whose value is fixed per solve rather than optimized.
#[derive(Clone, Debug)]
pub struct Parameter {
    pub sym: Expr,
    pub name: String,
}

/// One registered constraint in canonical form.
#[derive(Clone, Debug)]
pub struct NlpConstraint {
    pub expr: Expr,
    pub kind: ConstraintKind,
}

/// Shared solver context: decision variables, parameters, constraints and
/// the additively accumulated objective.
///
/// Mutated only during transcription; read-only afterwards.
#[derive(Clone, Debug, Default)]
pub struct NlpBuilder {
    variables: Vec<Variable>,
    index: HashMap<SymbolId, usize>,
    parameters: Vec<Parameter>,
    param_ids: HashSet<SymbolId>,
    constraints: Vec<NlpConstraint>,
    objective: Option<Expr>,
}

impl NlpBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh decision variable and return its symbol.
    pub fn variable(&mut self, name: impl Into<String>, init: f64) -> Expr {
        let name = name.into();
        let sym = Expr::symbol(name.clone());
        let id = sym.sym_id().expect("freshly created symbol");
        self.index.insert(id, self.variables.len());
        self.variables.push(Variable { sym: sym.clone(), name, init });
        sym
    }

    /// Register an existing symbol as a decision variable.
    ///
    /// Used when the caller already owns the symbol (e.g. a free horizon
    /// length declared on a stage).
    pub fn variable_for(&mut self, sym: &Expr, init: f64) -> NlpResult<()> {
        let id = sym.sym_id().ok_or_else(|| SolveError::Setup {
            what: format!("'{sym}' is not a symbol"),
        })?;
        if self.index.contains_key(&id) {
            return Err(SolveError::Setup {
                what: format!("symbol '{sym}' registered twice"),
            });
        }
        let name = sym.sym_name().unwrap_or("var").to_string();
        self.index.insert(id, self.variables.len());
        self.variables.push(Variable { sym: sym.clone(), name, init });
        Ok(())
    }

    /// Register a per-solve parameter symbol.
    pub fn register_parameter(&mut self, sym: &Expr) -> NlpResult<()> {
        let id = sym.sym_id().ok_or_else(|| SolveError::Setup {
            what: format!("'{sym}' is not a symbol"),
        })?;
        if self.param_ids.insert(id) {
            let name = sym.sym_name().unwrap_or("param").to_string();
            self.parameters.push(Parameter { sym: sym.clone(), name });
        }
        Ok(())
    }

    /// Add a constraint in canonical form (`expr == 0` or `expr >= 0`).
    pub fn subject_to(&mut self, expr: Expr, kind: ConstraintKind) {
        self.constraints.push(NlpConstraint { expr, kind });
    }

    /// Accumulate an objective term. Addition is commutative, so the call
    /// order does not affect the assembled problem.
    pub fn add_objective(&mut self, expr: Expr) {
        self.objective = Some(match self.objective.take() {
            Some(acc) => acc + expr,
            None => expr,
        });
    }

    pub fn objective(&self) -> Expr {
        self.objective.clone().unwrap_or_else(Expr::zero)
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn constraints(&self) -> &[NlpConstraint] {
        &self.constraints
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// Column index of a decision variable symbol.
    pub fn var_index(&self, id: SymbolId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub fn is_parameter(&self, id: SymbolId) -> bool {
        self.param_ids.contains(&id)
    }

    /// Assemble the initial guess vector in variable order.
    pub fn initial_point(&self) -> DVector<f64> {
        DVector::from_iterator(self.variables.len(), self.variables.iter().map(|v| v.init))
    }

    /// Evaluation environment for a decision vector plus parameter values.
    pub fn env_for(&self, x: &DVector<f64>, params: &Env) -> Env {
        let mut env = params.clone();
        for (col, var) in self.variables.iter().enumerate() {
            if let Some(id) = var.sym.sym_id() {
                env.set(id, x[col]);
            }
        }
        env
    }

    /// Structural non-zeros of the constraint Jacobian as (row, col)
    /// pairs. Diagnostic introspection only.
    pub fn jacobian_sparsity(&self) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        for (row, c) in self.constraints.iter().enumerate() {
            for id in c.expr.symbols().keys() {
                if let Some(col) = self.var_index(*id) {
                    out.push((row, col));
                }
            }
        }
        out
    }

    /// Structural non-zeros of the Lagrangian Hessian (lower triangle),
    /// union over the objective and every constraint. Diagnostic only.
    pub fn hessian_sparsity(&self) -> Vec<(usize, usize)> {
        let mut set = BTreeSet::new();
        let mut add_expr = |expr: &Expr, set: &mut BTreeSet<(usize, usize)>| {
            let cols: Vec<usize> = expr
                .symbols()
                .keys()
                .filter_map(|id| self.var_index(*id))
                .collect();
            for &a in &cols {
                for &b in &cols {
                    if a >= b {
                        set.insert((a, b));
                    }
                }
            }
        };
        add_expr(&self.objective(), &mut set);
        for c in &self.constraints {
            add_expr(&c.expr, &mut set);
        }
        set.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variables_are_indexed_in_order() {
        let mut nlp = NlpBuilder::new();
        let a = nlp.variable("a", 1.0);
        let b = nlp.variable("b", 2.0);
        assert_eq!(nlp.num_variables(), 2);
        assert_eq!(nlp.var_index(a.sym_id().unwrap()), Some(0));
        assert_eq!(nlp.var_index(b.sym_id().unwrap()), Some(1));
        let x0 = nlp.initial_point();
        assert_eq!(x0[0], 1.0);
        assert_eq!(x0[1], 2.0);
    }

    #[test]
    fn variable_for_rejects_double_registration() {
        let mut nlp = NlpBuilder::new();
        let t = Expr::symbol("T");
        nlp.variable_for(&t, 1.0).unwrap();
        assert!(nlp.variable_for(&t, 2.0).is_err());
    }

    #[test]
    fn objective_accumulates() {
        let mut nlp = NlpBuilder::new();
        let a = nlp.variable("a", 0.0);
        nlp.add_objective(a.clone());
        nlp.add_objective(Expr::constant(3.0));
        let mut env = Env::new();
        env.set(a.sym_id().unwrap(), 2.0);
        assert!((nlp.objective().eval(&env).unwrap() - 5.0).abs() < 1e-14);
    }

    #[test]
    fn sparsity_patterns() {
        let mut nlp = NlpBuilder::new();
        let a = nlp.variable("a", 0.0);
        let b = nlp.variable("b", 0.0);
        nlp.subject_to(&a * &b - 1.0, ConstraintKind::Eq);
        nlp.subject_to(a.clone(), ConstraintKind::Ineq);
        let jac = nlp.jacobian_sparsity();
        assert!(jac.contains(&(0, 0)));
        assert!(jac.contains(&(0, 1)));
        assert!(jac.contains(&(1, 0)));
        assert!(!jac.contains(&(1, 1)));

        nlp.add_objective(&b * &b);
        let hess = nlp.hessian_sparsity();
        assert!(hess.contains(&(1, 0))); // from a*b
        assert!(hess.contains(&(1, 1))); // from b^2
    }
}
