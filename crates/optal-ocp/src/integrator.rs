//! Fixed-step symbolic integrators.
//!
//! A step maps symbolic state expressions over a (possibly symbolic) step
//! length, so one implementation serves both transcription (decision
//! symbols in, constraint expressions out) and refined trajectory
//! sampling (numbers in, numbers out after reduction).

use optal_core::Expr;

/// Right-hand side of the augmented stage dynamics: state vector and time
/// in, state derivatives out.
pub type Rhs<'a> = dyn Fn(&[Expr], &Expr) -> Vec<Expr> + 'a;

/// Trait for fixed-step integrators over expression states.
pub trait Integrator: std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Advance the state by one step of length `dt` starting at `t`.
    fn step(&self, rhs: &Rhs, x: &[Expr], t: &Expr, dt: &Expr) -> Vec<Expr>;
}

fn axpy(x: &[Expr], scale: &Expr, k: &[Expr]) -> Vec<Expr> {
    x.iter()
        .zip(k.iter())
        .map(|(xi, ki)| xi + scale * ki)
        .collect()
}

/// Classical RK4 (Runge-Kutta 4th order) integrator.
#[derive(Clone, Debug)]
pub struct Rk4;

impl Integrator for Rk4 {
    fn name(&self) -> &'static str {
        "rk4"
    }

    fn step(&self, rhs: &Rhs, x: &[Expr], t: &Expr, dt: &Expr) -> Vec<Expr> {
        let half_dt = dt / 2.0;
        let k1 = rhs(x, t);

        let x2 = axpy(x, &half_dt, &k1);
        let k2 = rhs(&x2, &(t + &half_dt));

        let x3 = axpy(x, &half_dt, &k2);
        let k3 = rhs(&x3, &(t + &half_dt));

        let x4 = axpy(x, dt, &k3);
        let k4 = rhs(&x4, &(t + dt));

        // x_new = x + (dt/6) * (k1 + 2*k2 + 2*k3 + k4)
        let sixth = dt / 6.0;
        x.iter()
            .enumerate()
            .map(|(i, xi)| xi + &sixth * (&k1[i] + 2.0 * &k2[i] + 2.0 * &k3[i] + &k4[i]))
            .collect()
    }
}

/// Forward Euler (explicit, 1st order). One rhs() call per step instead
/// of four.
#[derive(Clone, Debug)]
pub struct ForwardEuler;

impl Integrator for ForwardEuler {
    fn name(&self) -> &'static str {
        "euler"
    }

    fn step(&self, rhs: &Rhs, x: &[Expr], t: &Expr, dt: &Expr) -> Vec<Expr> {
        let xdot = rhs(x, t);
        axpy(x, dt, &xdot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(steps: &[Expr]) -> Vec<f64> {
        steps.iter().map(|e| e.as_const().unwrap()).collect()
    }

    #[test]
    fn rk4_is_exact_on_linear_dynamics() {
        // xdot = 2, from x = 1 over dt = 0.5
        let rhs = |_: &[Expr], _: &Expr| vec![Expr::constant(2.0)];
        let x = vec![Expr::constant(1.0)];
        let out = Rk4.step(&rhs, &x, &Expr::constant(0.0), &Expr::constant(0.5));
        assert!((num(&out)[0] - 2.0).abs() < 1e-14);
    }

    #[test]
    fn rk4_matches_exponential_closely() {
        // xdot = x: one RK4 step of 0.1 vs e^0.1
        let rhs = |x: &[Expr], _: &Expr| vec![x[0].clone()];
        let x = vec![Expr::constant(1.0)];
        let out = Rk4.step(&rhs, &x, &Expr::constant(0.0), &Expr::constant(0.1));
        assert!((num(&out)[0] - 0.1_f64.exp()).abs() < 1e-8);
    }

    #[test]
    fn euler_is_first_order() {
        let rhs = |x: &[Expr], _: &Expr| vec![x[0].clone()];
        let x = vec![Expr::constant(1.0)];
        let out = ForwardEuler.step(&rhs, &x, &Expr::constant(0.0), &Expr::constant(0.1));
        assert!((num(&out)[0] - 1.1).abs() < 1e-14);
    }

    #[test]
    fn symbolic_states_stay_symbolic() {
        let u = Expr::symbol("u");
        let rhs = move |_: &[Expr], _: &Expr| vec![2.0 * &u];
        let x0 = Expr::symbol("x0");
        let out = Rk4.step(&rhs, &[x0.clone()], &Expr::constant(0.0), &Expr::constant(0.25));
        assert!(out[0].as_const().is_none());
        assert!(out[0].depends_on(x0.sym_id().unwrap()));
    }
}
