//! Clamped knot vectors.

use std::ops::Index;

use optal_core::Expr;

/// An open/clamped knot vector: the caller's breakpoints padded with the
/// first and last breakpoint repeated `degree` extra times on each side.
///
/// Immutable once constructed. The caller guarantees `degree >= 1`,
/// strictly increasing breakpoints, and more breakpoints than the degree;
/// violating that is a configuration error whose arithmetic consequences
/// (zero knot spans) propagate untouched.
#[derive(Clone, Debug)]
pub struct KnotVector {
    knots: Vec<Expr>,
    degree: usize,
}

impl KnotVector {
    /// Pad `breakpoints` into a clamped knot vector for `degree`.
    pub fn clamped(breakpoints: &[Expr], degree: usize) -> Self {
        debug_assert!(degree >= 1);
        debug_assert!(breakpoints.len() > degree);
        let first = &breakpoints[0];
        let last = &breakpoints[breakpoints.len() - 1];
        let mut knots = Vec::with_capacity(breakpoints.len() + 2 * degree);
        knots.extend(std::iter::repeat_with(|| first.clone()).take(degree));
        knots.extend(breakpoints.iter().cloned());
        knots.extend(std::iter::repeat_with(|| last.clone()).take(degree));
        Self { knots, degree }
    }

    /// Convenience constructor over concrete breakpoints.
    pub fn clamped_numeric(breakpoints: &[f64], degree: usize) -> Self {
        let exprs: Vec<Expr> = breakpoints.iter().map(|&v| Expr::constant(v)).collect();
        Self::clamped(&exprs, degree)
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Total knot count, padding included.
    pub fn len(&self) -> usize {
        self.knots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.knots.is_empty()
    }

    /// Number of basis functions this knot vector carries.
    pub fn num_basis(&self) -> usize {
        self.knots.len() - self.degree - 1
    }

    /// Number of caller-supplied breakpoints.
    pub fn num_breakpoints(&self) -> usize {
        self.knots.len() - 2 * self.degree
    }
}

impl Index<usize> for KnotVector {
    type Output = Expr;

    fn index(&self, i: usize) -> &Expr {
        &self.knots[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamped_pads_both_ends() {
        let kv = KnotVector::clamped_numeric(&[0.0, 0.5, 1.0], 2);
        assert_eq!(kv.len(), 7);
        assert_eq!(kv.num_breakpoints(), 3);
        assert_eq!(kv.num_basis(), 4);
        let vals: Vec<f64> = (0..kv.len()).map(|i| kv[i].as_const().unwrap()).collect();
        assert_eq!(vals, vec![0.0, 0.0, 0.0, 0.5, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn symbolic_breakpoints_stay_symbolic() {
        let a = Expr::symbol("a");
        let b = Expr::symbol("b");
        let kv = KnotVector::clamped(&[a.clone(), b.clone()], 1);
        assert_eq!(kv.len(), 4);
        assert!(kv[0].as_const().is_none());
        assert_eq!(kv[0].sym_id(), a.sym_id());
        assert_eq!(kv[3].sym_id(), b.sym_id());
    }
}
