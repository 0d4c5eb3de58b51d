//! Ordinary least squares for the lag-length regressions.
//!
//! Every candidate lag count `K` is estimated on a small sample (one row per
//! earlier quarter), so the design matrix is tall, narrow and often poorly
//! conditioned early in the expanding window.
//!
//! Implementation choices:
//! - We solve via SVD rather than forming `(XᵀX)⁻¹`: squaring the condition
//!   number on a 10-row sample is exactly where normal equations break down.
//! - Rank deficiency is reported as `ModelFitError::Singular` instead of being
//!   papered over with a minimum-norm solution; the caller skips that candidate.
//!   (Nalgebra's `QR::solve` is intended for square systems and will panic for
//!   non-square matrices, so QR is not an option here either.)

use nalgebra::{DMatrix, DVector};

use crate::domain::FittedModel;
use crate::error::ModelFitError;

/// Smallest accepted ratio between the smallest and largest singular value.
const RCOND_MIN: f64 = 1e-10;

/// Floor for `SSE / n` inside the log so exact fits keep a finite BIC.
const SSE_PER_OBS_FLOOR: f64 = 1e-12;

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is rank deficient or the solution is non-finite.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);
    let max_sv = svd.singular_values.max();
    let min_sv = svd.singular_values.min();
    if !(max_sv.is_finite() && max_sv > 0.0) || min_sv / max_sv < RCOND_MIN {
        return None;
    }

    let beta = svd.solve(y, max_sv * RCOND_MIN).ok()?;
    beta.iter().all(|v| v.is_finite()).then_some(beta)
}

/// `BIC = n·ln(SSE/n) + p·ln(n)`.
pub fn bic(n: usize, sse: f64, params: usize) -> f64 {
    let n_f = n as f64;
    let sse_per = (sse / n_f).max(SSE_PER_OBS_FLOOR);
    n_f * sse_per.ln() + (params as f64) * n_f.ln()
}

/// Fit `y = X β` where each row of `rows` is one fully observed design row.
///
/// Any intercept column must already be part of the rows.
/// Fails with `Underdetermined` when `rows.len() <= params`.
pub fn fit_ols(rows: &[Vec<f64>], y: &[f64]) -> Result<FittedModel, ModelFitError> {
    let n = rows.len();
    let p = rows.first().map_or(0, Vec::len);
    if n <= p || p == 0 || y.len() != n {
        return Err(ModelFitError::Underdetermined { rows: n, params: p });
    }

    let x = DMatrix::from_fn(n, p, |i, j| rows[i][j]);
    let yv = DVector::from_column_slice(y);
    let beta = solve_least_squares(&x, &yv).ok_or(ModelFitError::Singular)?;

    let residuals = &yv - &x * &beta;
    let sse = residuals.norm_squared();
    if !sse.is_finite() {
        return Err(ModelFitError::NonFinite);
    }

    Ok(FittedModel {
        coefficients: beta.iter().copied().collect(),
        bic: bic(n, sse, p),
        sse,
        n_obs: n,
    })
}

/// Ridge regression without intercept: `β = (XᵀX + αI)⁻¹ Xᵀy`.
///
/// With `α > 0` the penalized Gram matrix is positive definite, so a Cholesky
/// solve is enough even for collinear columns. Returns `None` on ragged rows,
/// empty input or a non-finite solution.
pub fn ridge(rows: &[Vec<f64>], y: &[f64], alpha: f64) -> Option<Vec<f64>> {
    let n = rows.len();
    let p = rows.first().map_or(0, Vec::len);
    if n == 0 || p == 0 || y.len() != n || !(alpha > 0.0) || rows.iter().any(|r| r.len() != p) {
        return None;
    }

    let x = DMatrix::from_fn(n, p, |i, j| rows[i][j]);
    let yv = DVector::from_column_slice(y);
    let xt = x.transpose();
    let gram = &xt * &x + DMatrix::<f64>::identity(p, p) * alpha;
    let beta = gram.cholesky()?.solve(&(&xt * &yv));
    beta.iter().all(|v| v.is_finite()).then(|| beta.iter().copied().collect())
}

/// Evaluate a fitted model on one design row.
pub fn predict_row(model: &FittedModel, row: &[f64]) -> f64 {
    model
        .coefficients
        .iter()
        .zip(row.iter())
        .map(|(b, x)| b * x)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn fit_ols_reports_sse_and_bic() {
        let rows: Vec<Vec<f64>> = (0..6).map(|i| vec![1.0, i as f64]).collect();
        let y = [1.0, 3.1, 4.9, 7.2, 8.8, 11.0];
        let fit = fit_ols(&rows, &y).unwrap();

        assert_eq!(fit.n_obs, 6);
        assert_eq!(fit.coefficients.len(), 2);
        assert!(fit.sse > 0.0);
        let expected = 6.0 * (fit.sse / 6.0).ln() + 2.0 * 6.0_f64.ln();
        assert!((fit.bic - expected).abs() < 1e-12);
        assert!((predict_row(&fit, &[1.0, 6.0]) - 13.0).abs() < 0.3);
    }

    #[test]
    fn fit_ols_rejects_underdetermined() {
        let rows = vec![vec![1.0, 0.5], vec![1.0, 0.7]];
        let err = fit_ols(&rows, &[1.0, 2.0]).unwrap_err();
        assert_eq!(err, ModelFitError::Underdetermined { rows: 2, params: 2 });
    }

    #[test]
    fn fit_ols_rejects_collinear_columns() {
        let rows: Vec<Vec<f64>> = (0..8).map(|i| vec![1.0, i as f64, 2.0 * i as f64]).collect();
        let y: Vec<f64> = (0..8).map(|i| i as f64).collect();
        assert_eq!(fit_ols(&rows, &y).unwrap_err(), ModelFitError::Singular);
    }

    #[test]
    fn ridge_shrinks_and_handles_collinear_columns() {
        // One column of ones: (3 + 1)^-1 * 6.
        let beta = ridge(&[vec![1.0], vec![1.0], vec![1.0]], &[2.0, 2.0, 2.0], 1.0).unwrap();
        assert!((beta[0] - 1.5).abs() < 1e-12);

        // Identical columns split the load evenly: [[3, 2], [2, 3]] β = [4, 4].
        let beta = ridge(&[vec![1.0, 1.0], vec![1.0, 1.0]], &[2.0, 2.0], 1.0).unwrap();
        assert!((beta[0] - 0.8).abs() < 1e-12);
        assert!((beta[1] - 0.8).abs() < 1e-12);

        assert_eq!(ridge(&[vec![1.0], vec![1.0, 2.0]], &[1.0, 2.0], 1.0), None);
        assert_eq!(ridge(&[vec![1.0]], &[1.0], 0.0), None);
    }
}
