//! Primal-dual interior-point reference solver.
//!
//! Inequalities get slack variables held strictly positive by a log
//! barrier; each outer iteration takes one Newton step on the reduced
//! KKT system, with a fraction-to-boundary rule, a backtracking line
//! search on an l1 merit function, and diagonal regularization when the
//! step computation misbehaves. The barrier parameter shrinks
//! monotonically once the current barrier sub-problem is solved to
//! proportional accuracy.

use nalgebra::{DMatrix, DVector};
use optal_core::Env;
use tracing::debug;

use crate::builder::{ConstraintKind, NlpBuilder};
use crate::derivatives::{CompiledScalar, eval_jacobian_rows, eval_values};
use crate::error::{NlpResult, SolveError};
use crate::solver::{NlpPoint, NlpSolver};

/// Interior-point solver configuration.
#[derive(Clone, Debug)]
pub struct IpConfig {
    /// Maximum outer iterations
    pub max_iterations: usize,
    /// KKT error tolerance
    pub tol: f64,
    /// Initial barrier parameter
    pub mu_init: f64,
    /// Barrier shrink factor per accepted sub-problem
    pub mu_shrink: f64,
    /// Shrink the barrier once the barrier KKT error is below this
    /// multiple of mu
    pub mu_accept: f64,
    /// Fraction-to-boundary safety factor for slacks and duals
    pub frac_to_boundary: f64,
    /// Maximum line search backtracks per step
    pub max_backtracks: usize,
    /// Lower bound on initial slack values
    pub slack_floor: f64,
    /// First diagonal regularization attempt
    pub reg_init: f64,
    /// Give up once regularization exceeds this
    pub reg_max: f64,
}

impl Default for IpConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tol: 1e-8,
            mu_init: 1.0,
            mu_shrink: 0.2,
            mu_accept: 10.0,
            frac_to_boundary: 0.995,
            max_backtracks: 30,
            slack_floor: 1e-2,
            reg_init: 1e-8,
            reg_max: 1e10,
        }
    }
}

/// The bundled reference NLP solver.
#[derive(Clone, Debug, Default)]
pub struct InteriorPoint {
    pub config: IpConfig,
}

impl InteriorPoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: IpConfig) -> Self {
        Self { config }
    }
}

fn inf_norm(v: &DVector<f64>) -> f64 {
    v.iter().fold(0.0_f64, |m, a| m.max(a.abs()))
}

// l1 merit: objective, barrier on slacks, penalized feasibility.
fn merit(f: f64, ce: &DVector<f64>, ci: &DVector<f64>, s: &DVector<f64>, mu: f64, nu: f64) -> f64 {
    let mut phi = f;
    for k in 0..s.len() {
        phi -= mu * s[k].ln();
        phi += nu * (ci[k] - s[k]).abs();
    }
    for v in ce.iter() {
        phi += nu * v.abs();
    }
    phi
}

impl NlpSolver for InteriorPoint {
    fn solve(&self, nlp: &NlpBuilder, params: &Env) -> NlpResult<NlpPoint> {
        let cfg = &self.config;
        let n = nlp.num_variables();

        let objective = CompiledScalar::compile(&nlp.objective(), nlp);
        let mut eqs = Vec::new();
        let mut ineqs = Vec::new();
        for c in nlp.constraints() {
            let compiled = CompiledScalar::compile(&c.expr, nlp);
            match c.kind {
                ConstraintKind::Eq => eqs.push(compiled),
                ConstraintKind::Ineq => ineqs.push(compiled),
            }
        }
        let m_e = eqs.len();
        let m_i = ineqs.len();

        let mut x = nlp.initial_point();
        let env0 = nlp.env_for(&x, params);
        let ci0 = eval_values(&ineqs, &env0)?;
        let mut s = DVector::from_fn(m_i, |k, _| ci0[k].max(cfg.slack_floor));
        let mut mu = cfg.mu_init;
        let mut z = DVector::from_fn(m_i, |k, _| mu / s[k]);
        let mut y = DVector::<f64>::zeros(m_e);

        let mut kkt = f64::INFINITY;
        let mut violation = f64::INFINITY;

        for iter in 0..cfg.max_iterations {
            let env = nlp.env_for(&x, params);
            let f = objective.value(&env)?;
            let mut g = DVector::zeros(n);
            objective.grad_into(&env, &mut g, 1.0)?;
            let ce = eval_values(&eqs, &env)?;
            let ci = eval_values(&ineqs, &env)?;
            let je_rows = eval_jacobian_rows(&eqs, &env)?;
            let ji_rows = eval_jacobian_rows(&ineqs, &env)?;

            // Dual residual g - JE^T y - JI^T z
            let mut r_d = g.clone();
            for (k, row) in je_rows.iter().enumerate() {
                for (col, v) in row {
                    r_d[*col] -= y[k] * v;
                }
            }
            for (k, row) in ji_rows.iter().enumerate() {
                for (col, v) in row {
                    r_d[*col] -= z[k] * v;
                }
            }

            let r_i = &ci - &s;
            violation = inf_norm(&ce).max(
                ci.iter().fold(0.0_f64, |m, &v| m.max((-v).max(0.0))),
            );

            let comp_inf = (0..m_i).fold(0.0_f64, |m, k| m.max((s[k] * z[k]).abs()));
            kkt = inf_norm(&r_d)
                .max(inf_norm(&ce))
                .max(inf_norm(&r_i))
                .max(comp_inf);
            if kkt < cfg.tol {
                debug!(iter, kkt, "interior point converged");
                return Ok(NlpPoint {
                    x,
                    objective: f,
                    constraint_violation: violation,
                    iterations: iter,
                });
            }

            // Barrier sub-problem solved to proportional accuracy -> shrink mu.
            let comp_mu_inf = (0..m_i).fold(0.0_f64, |m, k| m.max((s[k] * z[k] - mu).abs()));
            let kkt_mu = inf_norm(&r_d)
                .max(inf_norm(&ce))
                .max(inf_norm(&r_i))
                .max(comp_mu_inf);
            if kkt_mu < cfg.mu_accept * mu {
                mu = (mu * cfg.mu_shrink).max(cfg.tol / 10.0);
            }

            // Lagrangian Hessian
            let mut w = DMatrix::zeros(n, n);
            objective.hess_into(&env, &mut w, 1.0)?;
            for (k, c) in eqs.iter().enumerate() {
                c.hess_into(&env, &mut w, -y[k])?;
            }
            for (k, c) in ineqs.iter().enumerate() {
                c.hess_into(&env, &mut w, -z[k])?;
            }

            let mut delta = 0.0_f64;
            let mut accepted: Option<(DVector<f64>, DVector<f64>, f64, f64, DVector<f64>, DVector<f64>)> =
                None;
            loop {
                // H = W + JI^T diag(z/s) JI + delta I
                let mut h = w.clone();
                for k in 0..m_i {
                    let dk = z[k] / s[k];
                    for (c1, v1) in &ji_rows[k] {
                        for (c2, v2) in &ji_rows[k] {
                            h[(*c1, *c2)] += dk * v1 * v2;
                        }
                    }
                }
                for i in 0..n {
                    h[(i, i)] += delta;
                }

                // rhs of the condensed x-block
                let mut rhs1 = -&r_d;
                for k in 0..m_i {
                    let t = mu / s[k] - z[k] - (z[k] / s[k]) * r_i[k];
                    for (col, v) in &ji_rows[k] {
                        rhs1[*col] += t * v;
                    }
                }

                // [ H  JE^T ] [dx]   [rhs1]
                // [ JE  -dI ] [-dy] = [-ce ]
                let dim = n + m_e;
                let mut kmat = DMatrix::zeros(dim, dim);
                kmat.view_mut((0, 0), (n, n)).copy_from(&h);
                for (k, row) in je_rows.iter().enumerate() {
                    for (col, v) in row {
                        kmat[(*col, n + k)] = *v;
                        kmat[(n + k, *col)] = *v;
                    }
                }
                // keeps the LU nonsingular under redundant equality rows
                for k in 0..m_e {
                    kmat[(n + k, n + k)] = -1e-12;
                }
                let mut rhs = DVector::zeros(dim);
                rhs.rows_mut(0, n).copy_from(&rhs1);
                for k in 0..m_e {
                    rhs[n + k] = -ce[k];
                }

                let step = kmat
                    .lu()
                    .solve(&rhs)
                    .filter(|sol| sol.iter().all(|v| v.is_finite()));
                if let Some(step) = step {
                    let dx = step.rows(0, n).into_owned();
                    let dy = -step.rows(n, m_e).into_owned();

                    let mut ds = DVector::zeros(m_i);
                    for k in 0..m_i {
                        let mut jdx = 0.0;
                        for (col, v) in &ji_rows[k] {
                            jdx += v * dx[*col];
                        }
                        ds[k] = jdx + r_i[k];
                    }
                    let mut dz = DVector::zeros(m_i);
                    for k in 0..m_i {
                        dz[k] = mu / s[k] - z[k] - (z[k] / s[k]) * ds[k];
                    }

                    let tau = cfg.frac_to_boundary;
                    let mut alpha_p = 1.0_f64;
                    for k in 0..m_i {
                        if ds[k] < 0.0 {
                            alpha_p = alpha_p.min(-tau * s[k] / ds[k]);
                        }
                    }
                    let mut alpha_d = 1.0_f64;
                    for k in 0..m_i {
                        if dz[k] < 0.0 {
                            alpha_d = alpha_d.min(-tau * z[k] / dz[k]);
                        }
                    }

                    let nu = 10.0 + 2.0 * inf_norm(&y).max(inf_norm(&z));
                    let phi0 = merit(f, &ce, &ci, &s, mu, nu);
                    let mut alpha = alpha_p;
                    for _ in 0..cfg.max_backtracks {
                        let x_new = &x + alpha * &dx;
                        let s_new = &s + alpha * &ds;
                        let env_new = nlp.env_for(&x_new, params);
                        let f_new = objective.value(&env_new)?;
                        let ce_new = eval_values(&eqs, &env_new)?;
                        let ci_new = eval_values(&ineqs, &env_new)?;
                        let phi = merit(f_new, &ce_new, &ci_new, &s_new, mu, nu);
                        if phi.is_finite() && phi < phi0 {
                            accepted = Some((x_new, s_new, alpha, alpha_d, dy, dz));
                            break;
                        }
                        alpha *= 0.5;
                    }
                }
                if accepted.is_some() {
                    break;
                }
                delta = if delta == 0.0 {
                    cfg.reg_init
                } else {
                    delta * 100.0
                };
                if delta > cfg.reg_max {
                    return Err(SolveError::Numerical {
                        what: format!("line search failed at iteration {iter}"),
                    });
                }
            }

            let (x_new, s_new, alpha, alpha_d, dy, dz) = accepted.ok_or_else(|| {
                SolveError::Numerical {
                    what: "step acceptance lost".to_string(),
                }
            })?;
            x = x_new;
            s = s_new;
            y += alpha * dy;
            for k in 0..m_i {
                z[k] = (z[k] + alpha_d * dz[k]).max(1e-12);
            }
            debug!(iter, mu, kkt, alpha, "ip step");
        }

        if violation > 1e-6 {
            Err(SolveError::Infeasible {
                violation,
                iterations: cfg.max_iterations,
            })
        } else {
            Err(SolveError::IterationLimit {
                limit: cfg.max_iterations,
                kkt,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optal_core::Expr;

    fn solve_default(nlp: &NlpBuilder) -> NlpResult<NlpPoint> {
        InteriorPoint::new().solve(nlp, &Env::new())
    }

    #[test]
    fn unconstrained_quadratic() {
        let mut nlp = NlpBuilder::new();
        let x = nlp.variable("x", 5.0);
        nlp.add_objective((&x - 2.0).powi(2));
        let p = solve_default(&nlp).unwrap();
        assert!((p.x[0] - 2.0).abs() < 1e-6);
        assert!(p.objective < 1e-10);
    }

    #[test]
    fn active_bound() {
        // min x s.t. x >= 1
        let mut nlp = NlpBuilder::new();
        let x = nlp.variable("x", 3.0);
        nlp.add_objective(x.clone());
        nlp.subject_to(&x - 1.0, ConstraintKind::Ineq);
        let p = solve_default(&nlp).unwrap();
        assert!((p.x[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn equality_projection() {
        // min x^2 + y^2 s.t. x + y = 1
        let mut nlp = NlpBuilder::new();
        let x = nlp.variable("x", 0.0);
        let y = nlp.variable("y", 0.0);
        nlp.add_objective(&x * &x + &y * &y);
        nlp.subject_to(&x + &y - 1.0, ConstraintKind::Eq);
        let p = solve_default(&nlp).unwrap();
        assert!((p.x[0] - 0.5).abs() < 1e-6);
        assert!((p.x[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn nonlinear_inequality_on_circle() {
        // min -x - y s.t. x^2 + y^2 <= 1: optimum at (sqrt(.5), sqrt(.5))
        let mut nlp = NlpBuilder::new();
        let x = nlp.variable("x", 0.0);
        let y = nlp.variable("y", 0.0);
        nlp.add_objective(-&x - &y);
        nlp.subject_to(1.0 - &x * &x - &y * &y, ConstraintKind::Ineq);
        let p = solve_default(&nlp).unwrap();
        let r = 0.5_f64.sqrt();
        assert!((p.x[0] - r).abs() < 1e-5);
        assert!((p.x[1] - r).abs() < 1e-5);
        assert!((p.objective + 2.0 * r).abs() < 1e-5);
    }

    #[test]
    fn parameters_shift_the_optimum() {
        // min (x - p)^2 for p = 3, then p = -1, same compiled problem.
        let mut nlp = NlpBuilder::new();
        let x = nlp.variable("x", 0.0);
        let p = Expr::symbol("p");
        nlp.register_parameter(&p).unwrap();
        nlp.add_objective((&x - &p).powi(2));

        let solver = InteriorPoint::new();
        let mut env = Env::new();
        env.set(p.sym_id().unwrap(), 3.0);
        let sol = solver.solve(&nlp, &env).unwrap();
        assert!((sol.x[0] - 3.0).abs() < 1e-6);

        env.set(p.sym_id().unwrap(), -1.0);
        let sol = solver.solve(&nlp, &env).unwrap();
        assert!((sol.x[0] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn iteration_limit_is_reported() {
        let mut nlp = NlpBuilder::new();
        let x = nlp.variable("x", 0.0);
        let y = nlp.variable("y", 0.0);
        nlp.add_objective(-&x - &y);
        nlp.subject_to(1.0 - &x * &x - &y * &y, ConstraintKind::Ineq);
        let solver = InteriorPoint::with_config(IpConfig {
            max_iterations: 2,
            ..IpConfig::default()
        });
        let err = solver.solve(&nlp, &Env::new()).unwrap_err();
        assert!(matches!(
            err,
            SolveError::IterationLimit { .. } | SolveError::Infeasible { .. }
        ));
    }

    #[test]
    fn contradictory_constraints_fail() {
        // x >= 1 together with x = -1 has no feasible point.
        let mut nlp = NlpBuilder::new();
        let x = nlp.variable("x", 0.0);
        nlp.add_objective(&x * &x);
        nlp.subject_to(&x - 1.0, ConstraintKind::Ineq);
        nlp.subject_to(&x + 1.0, ConstraintKind::Eq);
        let err = solve_default(&nlp).unwrap_err();
        assert!(matches!(
            err,
            SolveError::Infeasible { .. }
                | SolveError::IterationLimit { .. }
                | SolveError::Numerical { .. }
        ));
    }
}
