//! Basis matrix construction via the Cox-de Boor recursion.

use std::collections::HashMap;

use nalgebra::DMatrix;
use optal_core::{Expr, SymbolId};

use crate::knots::KnotVector;

// Degree-0 seed. The tiny perturbation keeps the recursion away from an
// exact 0/0 when the evaluation point coincides with a knot; it washes
// out below 1e-15 in every evaluated basis value.
const SEED: f64 = 1.0 + f64::EPSILON;

/// Basis functions evaluated at a set of points.
///
/// Entry (i, j) is basis function `i` at evaluation point `j`. Columns sum
/// to one (partition of unity) and at most `degree + 1` consecutive
/// entries per column are non-zero (local support).
#[derive(Clone, Debug)]
pub struct BasisMatrix {
    num_basis: usize,
    cols: Vec<Vec<Expr>>,
}

impl BasisMatrix {
    pub fn num_basis(&self) -> usize {
        self.num_basis
    }

    pub fn num_points(&self) -> usize {
        self.cols.len()
    }

    pub fn value(&self, basis: usize, point: usize) -> &Expr {
        &self.cols[point][basis]
    }

    /// All basis values at one evaluation point.
    pub fn column(&self, point: usize) -> &[Expr] {
        &self.cols[point]
    }

    /// Concrete matrix, if every entry reduced to a number.
    pub fn to_numeric(&self) -> Option<DMatrix<f64>> {
        let mut out = DMatrix::zeros(self.num_basis, self.cols.len());
        for (j, col) in self.cols.iter().enumerate() {
            for (i, e) in col.iter().enumerate() {
                out[(i, j)] = e.as_const()?;
            }
        }
        Some(out)
    }

    /// Entry-wise symbol substitution.
    pub fn substitute(&self, map: &HashMap<SymbolId, Expr>) -> BasisMatrix {
        BasisMatrix {
            num_basis: self.num_basis,
            cols: self
                .cols
                .iter()
                .map(|col| col.iter().map(|e| e.substitute(map)).collect())
                .collect(),
        }
    }
}

/// Concrete point coordinates, if every entry reduced to a number.
pub fn numeric_points(points: &[Expr]) -> Option<Vec<f64>> {
    points.iter().map(|e| e.as_const()).collect()
}

// One Cox-de Boor elevation sweep per degree step. `basis` starts as the
// degree-0 seed vector (one slot per knot) and shrinks by one entry per
// sweep, ending at one entry per basis function.
fn cox_de_boor(mut basis: Vec<Expr>, x: &Expr, knots: &KnotVector) -> Vec<Expr> {
    let m = knots.len();
    let d = knots.degree();
    for e in 1..=d {
        let lo = d - e + 1;
        let hi = m - d - 1;
        let mut next = vec![Expr::zero(); m - e - 1];
        for i in lo..hi {
            let ki = &knots[i];
            let kid = &knots[i + e];
            // The active window never straddles a padded (zero-width) span.
            let norm = &basis[i] / (kid - ki);
            next[i] = &next[i] + (x - ki) * &norm;
            next[i - 1] = &next[i - 1] + (kid - x) * &norm;
        }
        basis = next;
    }
    basis
}

/// All basis values at the breakpoint with knot index `index`.
///
/// Index 0 seeds the whole leading `degree + 1` slot run (clamped left
/// boundary); every other index seeds the single slot `index + degree`,
/// clamped to the last valid interior slot.
pub fn eval_basis_knotindex(index: usize, knots: &KnotVector) -> Vec<Expr> {
    let m = knots.len();
    let d = knots.degree();
    let mut basis = vec![Expr::zero(); m];
    if index == 0 {
        for slot in basis.iter_mut().take(d + 1) {
            *slot = Expr::constant(SEED);
        }
    } else {
        basis[(index + d).min(m - d - 2)] = Expr::constant(SEED);
    }
    let x = knots[index + d].clone();
    cox_de_boor(basis, &x, knots)
}

/// Basis values at `samples` points uniformly spaced strictly between the
/// breakpoints with knot indices `index` and `index + 1` (both endpoints
/// excluded). Returns one column per sample point.
pub fn eval_basis_knotindex_subsampled(
    index: usize,
    samples: usize,
    knots: &KnotVector,
) -> Vec<Vec<Expr>> {
    let m = knots.len();
    let d = knots.degree();
    let slot = (index + d).min(m - d - 2);
    let mut cols = Vec::with_capacity(samples);
    for j in 0..samples {
        let tau = (j + 1) as f64 / (samples + 1) as f64;
        let x = &knots[index + d] * (1.0 - tau) + tau * &knots[index + d + 1];
        let mut basis = vec![Expr::zero(); m];
        basis[slot] = Expr::constant(SEED);
        cols.push(cox_de_boor(basis, &x, knots));
    }
    cols
}

/// Full basis table over `breakpoints` for `degree`, with `subsamples`
/// extra interior points per segment.
///
/// Returns the evaluation coordinates and the basis matrix, column order:
/// breakpoint, its subsamples, next breakpoint, ... Numeric inputs reduce
/// eagerly to concrete numbers; symbolic inputs pass through as
/// expression graphs.
pub fn eval_on_knots(
    breakpoints: &[Expr],
    degree: usize,
    subsamples: usize,
) -> (Vec<Expr>, BasisMatrix) {
    let knots = KnotVector::clamped(breakpoints, degree);
    let n = breakpoints.len();
    let mut points = Vec::new();
    let mut cols = Vec::new();
    for i in 0..n {
        cols.push(eval_basis_knotindex(i, &knots));
        points.push(breakpoints[i].clone());
        if subsamples > 0 && i < n - 1 {
            for j in 0..subsamples {
                let tau = (j + 1) as f64 / (subsamples + 1) as f64;
                points.push(&breakpoints[i] * (1.0 - tau) + tau * &breakpoints[i + 1]);
            }
            cols.extend(eval_basis_knotindex_subsampled(i, subsamples, &knots));
        }
    }
    (
        points,
        BasisMatrix {
            num_basis: knots.num_basis(),
            cols,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use optal_core::Env;

    fn consts(vals: &[f64]) -> Vec<Expr> {
        vals.iter().map(|&v| Expr::constant(v)).collect()
    }

    #[test]
    fn linear_hat_weights_at_quarter_point() {
        // Degree 1 over [0, 0.5, 1]: at x = 0.25 the two hats split 50/50.
        let (points, basis) = eval_on_knots(&consts(&[0.0, 0.5, 1.0]), 1, 1);
        let pts = numeric_points(&points).unwrap();
        assert_eq!(pts.len(), 5);
        assert!((pts[1] - 0.25).abs() < 1e-15);

        let col = basis.column(1);
        assert!((col[0].as_const().unwrap() - 0.5).abs() < 1e-12);
        assert!((col[1].as_const().unwrap() - 0.5).abs() < 1e-12);
        assert!(col[2].as_const().unwrap().abs() < 1e-12);
    }

    #[test]
    fn numeric_input_reduces_to_numbers() {
        let (points, basis) = eval_on_knots(&consts(&[0.0, 0.3, 0.6, 1.0]), 2, 2);
        assert!(numeric_points(&points).is_some());
        let mat = basis.to_numeric().unwrap();
        assert_eq!(mat.nrows(), 5);
        assert_eq!(mat.ncols(), 4 + 3 * 2);
    }

    #[test]
    fn columns_partition_unity_cubic() {
        let (_, basis) = eval_on_knots(&consts(&[0.0, 0.2, 0.5, 0.7, 1.0]), 3, 3);
        let mat = basis.to_numeric().unwrap();
        for j in 0..mat.ncols() {
            let sum: f64 = mat.column(j).iter().sum();
            assert!((sum - 1.0).abs() < 1e-9, "column {j} sums to {sum}");
        }
    }

    #[test]
    fn symbolic_knots_pass_through_and_match_numeric() {
        let xi_num = [0.0, 0.4, 1.0];
        let syms: Vec<Expr> = ["x0", "x1", "x2"].iter().map(|s| Expr::symbol(*s)).collect();
        let (points, basis) = eval_on_knots(&syms, 1, 1);
        assert!(basis.to_numeric().is_none());
        assert!(numeric_points(&points).is_none());

        let mut map = HashMap::new();
        for (sym, &v) in syms.iter().zip(xi_num.iter()) {
            map.insert(sym.sym_id().unwrap(), Expr::constant(v));
        }
        let substituted = basis.substitute(&map).to_numeric().unwrap();

        let (_, direct) = eval_on_knots(&consts(&xi_num), 1, 1);
        let direct = direct.to_numeric().unwrap();
        assert_eq!(substituted.nrows(), direct.nrows());
        for j in 0..direct.ncols() {
            for i in 0..direct.nrows() {
                assert!((substituted[(i, j)] - direct[(i, j)]).abs() < 1e-12);
            }
        }

        // The symbolic entries also evaluate to the same numbers.
        let mut env = Env::new();
        for (sym, &v) in syms.iter().zip(xi_num.iter()) {
            env.set(sym.sym_id().unwrap(), v);
        }
        let v = basis.value(0, 1).eval(&env).unwrap();
        assert!((v - direct[(0, 1)]).abs() < 1e-12);
    }

    #[test]
    fn subsample_points_strictly_interior_and_ordered() {
        let (points, _) = eval_on_knots(&consts(&[0.0, 1.0, 2.0]), 1, 2);
        let pts = numeric_points(&points).unwrap();
        let expected = [0.0, 1.0 / 3.0, 2.0 / 3.0, 1.0, 4.0 / 3.0, 5.0 / 3.0, 2.0];
        assert_eq!(pts.len(), expected.len());
        for (a, b) in pts.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
        for w in pts.windows(2) {
            assert!(w[0] < w[1]);
        }
    }
}
