//! Least squares solver.
//!
//! Trend statistics regress an entity's values on their period index:
//!
//! ```text
//! minimize Σ (y_i - β0 - β1 t_i)^2
//! ```
//!
//! The design matrix is tall (one row per observation, two columns), so we
//! solve through SVD rather than `QR::solve`, which expects square systems.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Progressively looser tolerances before giving up.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Result of a simple linear regression `y = intercept + slope * x`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub intercept: f64,
    pub slope: f64,
    /// Coefficient of determination; `None` when `y` has zero variance.
    pub r_squared: Option<f64>,
}

/// Fit `y = a + b x` by ordinary least squares.
///
/// Needs at least two points with distinct `x`.
pub fn linear_fit(xs: &[f64], ys: &[f64]) -> Option<LinearFit> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let n = xs.len();
    let mut design = Vec::with_capacity(n * 2);
    for &x in xs {
        design.push(1.0);
        design.push(x);
    }
    let x = DMatrix::from_row_slice(n, 2, &design);
    let y = DVector::from_row_slice(ys);

    let beta = solve_least_squares(&x, &y)?;
    let (intercept, slope) = (beta[0], beta[1]);

    let y_mean = ys.iter().sum::<f64>() / n as f64;
    let sst: f64 = ys.iter().map(|v| (v - y_mean).powi(2)).sum();
    let sse: f64 = xs
        .iter()
        .zip(ys)
        .map(|(x, y)| (y - (intercept + slope * x)).powi(2))
        .sum();
    let r_squared = (sst > 0.0).then(|| 1.0 - sse / sst);

    Some(LinearFit {
        intercept,
        slope,
        r_squared,
    })
}
