//! Property tests for the basis engine.

use optal_core::Expr;
use optal_spline::eval_on_knots;
use proptest::prelude::*;

proptest! {
    #[test]
    fn partition_of_unity_and_local_support(
        degree in 1usize..=3,
        extra in 0usize..=4,
        subsamples in 0usize..=2,
        increments in prop::collection::vec(0.1f64..1.0, 8),
    ) {
        // Strictly increasing breakpoints, count > degree.
        let n = degree + 1 + extra;
        let mut breakpoints = Vec::with_capacity(n);
        let mut acc = 0.0;
        for i in 0..n {
            breakpoints.push(Expr::constant(acc));
            acc += increments[i % increments.len()];
        }

        let (points, basis) = eval_on_knots(&breakpoints, degree, subsamples);
        let mat = basis.to_numeric().unwrap();
        prop_assert_eq!(mat.nrows(), n + degree - 1);
        prop_assert_eq!(mat.ncols(), points.len());

        for j in 0..mat.ncols() {
            let col = mat.column(j);

            // Every column sums to one.
            let sum: f64 = col.iter().sum();
            prop_assert!((sum - 1.0).abs() < 1e-9, "column {} sums to {}", j, sum);

            // At most degree + 1 consecutive non-zero entries.
            let nonzero: Vec<usize> = col
                .iter()
                .enumerate()
                .filter(|(_, v)| v.abs() > 1e-9)
                .map(|(i, _)| i)
                .collect();
            prop_assert!(!nonzero.is_empty());
            let spread = nonzero[nonzero.len() - 1] - nonzero[0] + 1;
            prop_assert!(
                spread <= degree + 1,
                "column {} has support spread {}",
                j,
                spread
            );
        }
    }
}
