//! Symbolic derivative compilation against a builder's variable order.

use nalgebra::{DMatrix, DVector};
use optal_core::{CoreResult, Env, Expr};

use crate::builder::NlpBuilder;

/// A scalar expression compiled with its first and second derivatives
/// with respect to the builder's decision variables.
///
/// Gradient entries are sparse `(column, expression)` pairs; Hessian
/// entries are lower-triangular `(row, column, expression)` triplets.
#[derive(Clone, Debug)]
pub struct CompiledScalar {
    pub expr: Expr,
    pub grad: Vec<(usize, Expr)>,
    pub hess: Vec<(usize, usize, Expr)>,
}

impl CompiledScalar {
    /// Differentiate `expr` with respect to every decision variable it
    /// references.
    pub fn compile(expr: &Expr, nlp: &NlpBuilder) -> CompiledScalar {
        let mut cols: Vec<(usize, optal_core::SymbolId)> = expr
            .symbols()
            .keys()
            .filter_map(|id| nlp.var_index(*id).map(|col| (col, *id)))
            .collect();
        cols.sort_unstable();

        let mut grad = Vec::new();
        for (col, id) in &cols {
            let d = expr.diff(*id);
            if !d.is_zero() {
                grad.push((*col, d));
            }
        }

        let mut hess = Vec::new();
        for (col_i, d) in &grad {
            for (col_j, id_j) in &cols {
                if col_j > col_i {
                    break;
                }
                let dd = d.diff(*id_j);
                if !dd.is_zero() {
                    hess.push((*col_i, *col_j, dd));
                }
            }
        }

        CompiledScalar {
            expr: expr.clone(),
            grad,
            hess,
        }
    }

    pub fn value(&self, env: &Env) -> CoreResult<f64> {
        self.expr.eval(env)
    }

    /// Evaluated sparse gradient as `(column, value)` pairs.
    pub fn grad_entries(&self, env: &Env) -> CoreResult<Vec<(usize, f64)>> {
        self.grad
            .iter()
            .map(|(col, e)| Ok((*col, e.eval(env)?)))
            .collect()
    }

    /// Accumulate `weight * grad` into a dense vector.
    pub fn grad_into(&self, env: &Env, out: &mut DVector<f64>, weight: f64) -> CoreResult<()> {
        for (col, e) in &self.grad {
            out[*col] += weight * e.eval(env)?;
        }
        Ok(())
    }

    /// Accumulate `weight * hess` (symmetric) into a dense matrix.
    pub fn hess_into(&self, env: &Env, out: &mut DMatrix<f64>, weight: f64) -> CoreResult<()> {
        for (i, j, e) in &self.hess {
            let v = weight * e.eval(env)?;
            out[(*i, *j)] += v;
            if i != j {
                out[(*j, *i)] += v;
            }
        }
        Ok(())
    }
}

/// Evaluate a set of compiled constraints into a dense vector.
pub fn eval_values(set: &[CompiledScalar], env: &Env) -> CoreResult<DVector<f64>> {
    let mut out = DVector::zeros(set.len());
    for (i, c) in set.iter().enumerate() {
        out[i] = c.value(env)?;
    }
    Ok(out)
}

/// Evaluate the sparse Jacobian rows of a set of compiled constraints.
pub fn eval_jacobian_rows(
    set: &[CompiledScalar],
    env: &Env,
) -> CoreResult<Vec<Vec<(usize, f64)>>> {
    set.iter().map(|c| c.grad_entries(env)).collect()
}
