//! Constraint expressions with boundary placement.

use optal_core::Expr;
use optal_nlp::ConstraintKind;

/// Where on the stage horizon a constraint applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// At every node of the discretized horizon.
    Everywhere,
    /// Only at the initial time of the stage.
    AtStart,
    /// Only at the final time of the stage.
    AtEnd,
}

/// A constraint in canonical form (`expr == 0` or `expr >= 0`) tagged
/// with its placement. Built through [`eq`], [`ge`] or [`le`] and
/// qualified with [`Constraint::at_t0`] / [`Constraint::at_tf`].
#[derive(Clone, Debug)]
pub struct Constraint {
    expr: Expr,
    kind: ConstraintKind,
    placement: Placement,
}

impl Constraint {
    /// Restrict to the initial boundary of the stage.
    pub fn at_t0(mut self) -> Self {
        self.placement = Placement::AtStart;
        self
    }

    /// Restrict to the final boundary of the stage.
    pub fn at_tf(mut self) -> Self {
        self.placement = Placement::AtEnd;
        self
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn kind(&self) -> ConstraintKind {
        self.kind
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }
}

/// `lhs == rhs`, everywhere unless qualified.
pub fn eq(lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Constraint {
    Constraint {
        expr: lhs.into() - rhs.into(),
        kind: ConstraintKind::Eq,
        placement: Placement::Everywhere,
    }
}

/// `lhs >= rhs`, everywhere unless qualified.
pub fn ge(lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Constraint {
    Constraint {
        expr: lhs.into() - rhs.into(),
        kind: ConstraintKind::Ineq,
        placement: Placement::Everywhere,
    }
}

/// `lhs <= rhs`, everywhere unless qualified.
pub fn le(lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Constraint {
    Constraint {
        expr: rhs.into() - lhs.into(),
        kind: ConstraintKind::Ineq,
        placement: Placement::Everywhere,
    }
}

/// Two-sided bound `lo <= expr <= hi` as a pair of constraints.
pub fn between(lo: impl Into<Expr>, expr: &Expr, hi: impl Into<Expr>) -> [Constraint; 2] {
    [ge(expr, lo), le(expr, hi)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use optal_core::Env;

    #[test]
    fn canonical_forms() {
        let x = Expr::symbol("x");
        let c = ge(&x, 1.0);
        assert_eq!(c.kind(), ConstraintKind::Ineq);
        assert_eq!(c.placement(), Placement::Everywhere);
        let mut env = Env::new();
        env.set(x.sym_id().unwrap(), 3.0);
        assert!((c.expr().eval(&env).unwrap() - 2.0).abs() < 1e-14);

        let c = le(&x, 1.0);
        assert!((c.expr().eval(&env).unwrap() + 2.0).abs() < 1e-14);

        let c = eq(&x, 3.0);
        assert_eq!(c.kind(), ConstraintKind::Eq);
        assert!(c.expr().eval(&env).unwrap().abs() < 1e-14);
    }

    #[test]
    fn placement_qualifiers() {
        let x = Expr::symbol("x");
        assert_eq!(eq(&x, 0.0).at_t0().placement(), Placement::AtStart);
        assert_eq!(eq(&x, 0.0).at_tf().placement(), Placement::AtEnd);
    }

    #[test]
    fn two_sided_bound_splits() {
        let x = Expr::symbol("x");
        let [lo, hi] = between(-1.0, &x, 1.0);
        assert_eq!(lo.kind(), ConstraintKind::Ineq);
        assert_eq!(hi.kind(), ConstraintKind::Ineq);
        let mut env = Env::new();
        env.set(x.sym_id().unwrap(), 0.25);
        assert!(lo.expr().eval(&env).unwrap() > 0.0);
        assert!(hi.expr().eval(&env).unwrap() > 0.0);
    }
}
