//! B-spline derivative operator on coefficient matrices.

use optal_core::Expr;

/// Derivative coefficients of a B-spline curve.
///
/// `coeffs` holds one row per output dimension, `breakpoints.len() +
/// degree - 1` columns each. The result is the degree-`(degree - 1)`
/// coefficient matrix, one column fewer: each new coefficient is
/// `degree * (c[k+1] - c[k]) / span`, where the spans come from the
/// breakpoints with the first and last repeated `degree - 1` times to
/// align index ranges. Applying the operator repeatedly lowers the degree
/// by one each time down to degree 0.
pub fn bspline_derivative(
    coeffs: &[Vec<Expr>],
    breakpoints: &[Expr],
    degree: usize,
) -> Vec<Vec<Expr>> {
    let n = breakpoints.len();
    debug_assert!(degree >= 1);
    debug_assert!(coeffs.iter().all(|row| row.len() == n + degree - 1));

    let spans = n + degree - 2;
    let mut upper = Vec::with_capacity(spans);
    upper.extend(breakpoints[1..].iter().cloned());
    upper.extend(std::iter::repeat_with(|| breakpoints[n - 1].clone()).take(degree - 1));
    let mut lower = Vec::with_capacity(spans);
    lower.extend(std::iter::repeat_with(|| breakpoints[0].clone()).take(degree - 1));
    lower.extend(breakpoints[..n - 1].iter().cloned());

    let scale: Vec<Expr> = upper
        .iter()
        .zip(lower.iter())
        .map(|(hi, lo)| degree as f64 / (hi - lo))
        .collect();

    coeffs
        .iter()
        .map(|row| {
            row.windows(2)
                .zip(scale.iter())
                .map(|(pair, s)| s * (&pair[1] - &pair[0]))
                .collect()
        })
        .collect()
}
