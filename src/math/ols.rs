//! Linear least squares helpers for the Levenberg–Marquardt step.
//!
//! Each LM iteration solves the damped normal equations
//!
//! ```text
//! (JᵀJ + λ D) δ = -Jᵀ r,   D = diag(JᵀJ)
//! ```
//!
//! Forming `JᵀJ` squares the condition number, so we solve the equivalent
//! augmented least squares problem instead:
//!
//! ```text
//! minimize ‖ [ J ; sqrt(λ D) ] δ - [ -r ; 0 ] ‖²
//! ```
//!
//! Implementation choices:
//! - SVD handles tall, rank-deficient systems (e.g. a Gaussian with zero
//!   amplitude has zero Jacobian columns for its center and width).
//! - Parameter counts are tiny (a handful per slot), so SVD cost is negligible
//!   next to the objective evaluations.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Solve the damped LM step for `δ` given the Jacobian, residuals and damping.
///
/// The damping is scaled per column by `diag(JᵀJ)` (Marquardt scaling); a
/// column with zero norm gets unit scaling so the step stays bounded.
pub fn solve_damped_step(
    jacobian: &DMatrix<f64>,
    residuals: &DVector<f64>,
    lambda: f64,
) -> Option<DVector<f64>> {
    let n = jacobian.nrows();
    let p = jacobian.ncols();

    let mut a = DMatrix::<f64>::zeros(n + p, p);
    a.view_mut((0, 0), (n, p)).copy_from(jacobian);

    for j in 0..p {
        let col_sq = jacobian.column(j).norm_squared();
        let scale = if col_sq > 0.0 && col_sq.is_finite() { col_sq } else { 1.0 };
        a[(n + j, j)] = (lambda * scale).sqrt();
    }

    let mut b = DVector::<f64>::zeros(n + p);
    for i in 0..n {
        b[i] = -residuals[i];
    }

    solve_least_squares(&a, &b)
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
    fn damped_step_approaches_gauss_newton_for_small_lambda() {
        // r(p) = J p - y with p = 0, so the Gauss–Newton step solves J δ = y.
        let j = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let r = DVector::from_row_slice(&[-2.0, -5.0, -8.0]);

        let step = solve_damped_step(&j, &r, 1e-12).unwrap();
        assert!((step[0] - 2.0).abs() < 1e-6);
        assert!((step[1] - 3.0).abs() < 1e-6);
    }

    #[test]
    fn damped_step_tolerates_zero_columns() {
        let j = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 0.0, 1.0, 0.0]);
        let r = DVector::from_row_slice(&[-1.0, -1.0, -1.0]);

        let step = solve_damped_step(&j, &r, 1e-3).unwrap();
        assert!(step.iter().all(|v| v.is_finite()));
        assert!(step[1].abs() < 1e-12);
    }
}
