//! Bounded Levenberg–Marquardt minimizer.
//!
//! The fitting engine only talks to the [`Minimizer`] trait: an objective that
//! maps a full parameter vector to a residual vector, plus per-parameter
//! initial values, bounds and vary flags. [`LevenbergMarquardt`] is the
//! implementation used by default.
//!
//! Bounds are handled by reparameterization (the MINUIT transforms), so the
//! inner iteration is unconstrained:
//!
//! ```text
//! both bounds:  v = lo + (sin(u) + 1)(hi - lo)/2
//! lower only:   v = lo - 1 + sqrt(u² + 1)
//! upper only:   v = hi + 1 - sqrt(u² + 1)
//! ```
//!
//! Standard errors come from the covariance `(JᵀJ)⁻¹ · χ²/(n - m)` with the
//! Jacobian taken in external (user) coordinates.

use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

use crate::domain::{FittedParam, FittedParameterSet, ParamSpec};
use crate::error::MixfitError;
use crate::math::ols::solve_damped_step;

/// Relative forward-difference step (≈ sqrt of machine epsilon).
const FD_STEP: f64 = 1.490_116_119_384_765_6e-8;

const MIN_LAMBDA: f64 = 1e-15;
const MAX_LAMBDA: f64 = 1e16;

/// Output of one minimization.
#[derive(Debug, Clone, PartialEq)]
pub struct Minimized {
    /// Fitted values keyed by parameter id; callers look them up by id.
    pub params: FittedParameterSet,
    /// Sum of squared residuals at `params`.
    pub chi_square: f64,
    /// Accepted + rejected outer iterations performed.
    pub iterations: usize,
}

/// A nonlinear least squares capability.
///
/// `objective` receives the full parameter vector (fixed entries included) in
/// `params` order and returns residuals; implementations minimize their sum of
/// squares.
pub trait Minimizer: Send + Sync {
    fn minimize(
        &self,
        objective: &dyn Fn(&[f64]) -> Vec<f64>,
        params: &[ParamSpec],
    ) -> Result<Minimized, MixfitError>;
}

/// Levenberg–Marquardt with Marquardt diagonal scaling.
#[derive(Debug, Clone, PartialEq)]
pub struct LevenbergMarquardt {
    pub max_iterations: usize,
    /// Relative cost reduction below which an accepted step counts as converged.
    pub ftol: f64,
    /// Relative step size below which an accepted step counts as converged.
    pub xtol: f64,
    /// Gradient max-norm below which the current point counts as converged.
    pub gtol: f64,
    pub initial_lambda: f64,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            ftol: 1.5e-8,
            xtol: 1.5e-8,
            gtol: 1e-15,
            initial_lambda: 1e-3,
        }
    }
}

impl LevenbergMarquardt {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Transform {
    Free,
    Lower(f64),
    Upper(f64),
    Both(f64, f64),
}

impl Transform {
    fn from_spec(spec: &ParamSpec) -> Self {
        let lo = spec.min.filter(|v| v.is_finite());
        let hi = spec.max.filter(|v| v.is_finite());
        match (lo, hi) {
            (Some(lo), Some(hi)) => Transform::Both(lo, hi),
            (Some(lo), None) => Transform::Lower(lo),
            (None, Some(hi)) => Transform::Upper(hi),
            (None, None) => Transform::Free,
        }
    }

    fn clamp(self, v: f64) -> f64 {
        match self {
            Transform::Free => v,
            Transform::Lower(lo) => v.max(lo),
            Transform::Upper(hi) => v.min(hi),
            Transform::Both(lo, hi) => v.max(lo).min(hi),
        }
    }

    fn to_internal(self, v: f64) -> f64 {
        match self {
            Transform::Free => v,
            Transform::Lower(lo) => ((v - lo + 1.0).powi(2) - 1.0).max(0.0).sqrt(),
            Transform::Upper(hi) => ((hi - v + 1.0).powi(2) - 1.0).max(0.0).sqrt(),
            Transform::Both(lo, hi) => (2.0 * (v - lo) / (hi - lo) - 1.0).clamp(-1.0, 1.0).asin(),
        }
    }

    fn to_external(self, u: f64) -> f64 {
        match self {
            Transform::Free => u,
            Transform::Lower(lo) => lo - 1.0 + (u * u + 1.0).sqrt(),
            Transform::Upper(hi) => hi + 1.0 - (u * u + 1.0).sqrt(),
            Transform::Both(lo, hi) => lo + (u.sin() + 1.0) * (hi - lo) / 2.0,
        }
    }
}

/// A parameter the iteration is allowed to move.
#[derive(Debug, Clone, Copy)]
struct FreeParam {
    index: usize,
    transform: Transform,
}

impl Minimizer for LevenbergMarquardt {
    fn minimize(
        &self,
        objective: &dyn Fn(&[f64]) -> Vec<f64>,
        params: &[ParamSpec],
    ) -> Result<Minimized, MixfitError> {
        if params.is_empty() {
            return Err(MixfitError::optimization("no parameters to optimize"));
        }
        if let Some(bad) = params.iter().find(|s| !s.initial.is_finite()) {
            return Err(MixfitError::optimization(format!(
                "non-finite initial value for parameter {}",
                bad.id
            )));
        }

        let mut external: Vec<f64> = params
            .iter()
            .map(|s| Transform::from_spec(s).clamp(s.initial))
            .collect();

        // A spec whose bounds coincide cannot move even when flagged as varying.
        let free: Vec<FreeParam> = params
            .iter()
            .enumerate()
            .filter(|(_, s)| s.varies && !matches!((s.min, s.max), (Some(lo), Some(hi)) if lo == hi))
            .map(|(index, s)| FreeParam {
                index,
                transform: Transform::from_spec(s),
            })
            .collect();

        let first = objective(&external);
        let n = first.len();
        if n == 0 {
            return Err(MixfitError::optimization("objective returned no residuals"));
        }
        let mut r = DVector::from_vec(first);
        if r.iter().any(|v| !v.is_finite()) {
            return Err(MixfitError::optimization(
                "objective returned non-finite residuals at the initial parameters",
            ));
        }
        let mut cost = r.norm_squared();

        let mut u = DVector::from_iterator(
            free.len(),
            free.iter().map(|f| f.transform.to_internal(external[f.index])),
        );
        apply_internal(&free, &u, &mut external);

        let mut iterations = 0usize;
        let mut converged = free.is_empty() || cost == 0.0;
        let mut lambda = self.initial_lambda;
        let mut trial_external = external.clone();

        while !converged && iterations < self.max_iterations {
            iterations += 1;

            let jac = internal_jacobian(objective, &free, &u, &external, &r)?;
            let grad = jac.transpose() * &r;
            if grad.amax() <= self.gtol {
                converged = true;
                break;
            }

            loop {
                let Some(step) = solve_damped_step(&jac, &r, lambda) else {
                    lambda *= 10.0;
                    if lambda > MAX_LAMBDA {
                        converged = true;
                        break;
                    }
                    continue;
                };

                let trial_u = &u + &step;
                apply_internal(&free, &trial_u, &mut trial_external);
                let trial_r = call(objective, &trial_external, n)?;
                let trial_cost = trial_r.norm_squared();

                if trial_cost.is_finite() && trial_cost < cost {
                    let reduction = (cost - trial_cost) / cost;
                    let small_step = step.norm() <= self.xtol * (u.norm() + self.xtol);

                    u = trial_u;
                    r = trial_r;
                    cost = trial_cost;
                    external.copy_from_slice(&trial_external);
                    lambda = (lambda / 10.0).max(MIN_LAMBDA);

                    if reduction <= self.ftol || small_step || cost == 0.0 {
                        converged = true;
                    }
                    break;
                }

                // No downhill step at any damping: we are at a (local) minimum.
                lambda *= 10.0;
                if lambda > MAX_LAMBDA {
                    converged = true;
                    break;
                }
            }
        }

        if !converged {
            warn!(
                iterations,
                chi_square = cost,
                "levenberg-marquardt stopped at the iteration limit"
            );
        }
        debug!(
            iterations,
            chi_square = cost,
            free = free.len(),
            "levenberg-marquardt finished"
        );

        let stderrs = standard_errors(objective, &free, &external, &r, cost);
        let fitted = params
            .iter()
            .enumerate()
            .map(|(i, spec)| FittedParam {
                id: spec.id,
                value: external[i],
                stderr: free
                    .iter()
                    .position(|f| f.index == i)
                    .and_then(|k| stderrs[k]),
            })
            .collect();

        Ok(Minimized {
            params: FittedParameterSet::new(fitted),
            chi_square: cost,
            iterations,
        })
    }
}

fn call(
    objective: &dyn Fn(&[f64]) -> Vec<f64>,
    values: &[f64],
    expected: usize,
) -> Result<DVector<f64>, MixfitError> {
    let r = objective(values);
    if r.len() != expected {
        return Err(MixfitError::optimization(format!(
            "objective returned {} residuals, expected {expected}",
            r.len()
        )));
    }
    Ok(DVector::from_vec(r))
}

fn apply_internal(free: &[FreeParam], u: &DVector<f64>, external: &mut [f64]) {
    for (k, f) in free.iter().enumerate() {
        external[f.index] = f.transform.to_external(u[k]);
    }
}

/// Forward-difference Jacobian of the residuals with respect to internal coordinates.
///
/// Falls back to a backward difference when the forward probe is non-finite;
/// a column that cannot be probed either way stays zero.
fn internal_jacobian(
    objective: &dyn Fn(&[f64]) -> Vec<f64>,
    free: &[FreeParam],
    u: &DVector<f64>,
    external: &[f64],
    r: &DVector<f64>,
) -> Result<DMatrix<f64>, MixfitError> {
    let n = r.len();
    let mut jac = DMatrix::<f64>::zeros(n, free.len());
    let mut probe = external.to_vec();

    for (k, f) in free.iter().enumerate() {
        let h = FD_STEP * u[k].abs().max(1.0);

        probe[f.index] = f.transform.to_external(u[k] + h);
        let forward = call(objective, &probe, n)?;
        if forward.iter().all(|v| v.is_finite()) {
            for i in 0..n {
                jac[(i, k)] = (forward[i] - r[i]) / h;
            }
        } else {
            probe[f.index] = f.transform.to_external(u[k] - h);
            let backward = call(objective, &probe, n)?;
            if backward.iter().all(|v| v.is_finite()) {
                for i in 0..n {
                    jac[(i, k)] = (r[i] - backward[i]) / h;
                }
            }
        }
        probe[f.index] = external[f.index];
    }

    Ok(jac)
}

fn standard_errors(
    objective: &dyn Fn(&[f64]) -> Vec<f64>,
    free: &[FreeParam],
    external: &[f64],
    r: &DVector<f64>,
    chi_square: f64,
) -> Vec<Option<f64>> {
    let n = r.len();
    let m = free.len();
    if m == 0 || n <= m {
        return vec![None; m];
    }

    let mut jac = DMatrix::<f64>::zeros(n, m);
    let mut probe = external.to_vec();
    for (k, f) in free.iter().enumerate() {
        let v = external[f.index];
        let h = FD_STEP * v.abs().max(1.0);
        probe[f.index] = v + h;
        let forward = objective(&probe);
        probe[f.index] = v;
        if forward.len() != n || forward.iter().any(|x| !x.is_finite()) {
            return vec![None; m];
        }
        for i in 0..n {
            jac[(i, k)] = (forward[i] - r[i]) / h;
        }
    }

    let jtj = jac.transpose() * &jac;
    let Some(inv) = jtj.try_inverse() else {
        return vec![None; m];
    };

    let scale = chi_square / (n - m) as f64;
    (0..m)
        .map(|k| {
            let var = inv[(k, k)] * scale;
            (var.is_finite() && var >= 0.0).then(|| var.sqrt())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ParamId;
    use crate::math::basis::gaussian;

    fn spec(name: &'static str, initial: f64) -> ParamSpec {
        ParamSpec {
            id: ParamId::new(None, name),
            initial,
            min: None,
            max: None,
            varies: true,
        }
    }

    fn grid(n: usize, lo: f64, hi: f64) -> Vec<f64> {
        (0..n)
            .map(|i| lo + (hi - lo) * i as f64 / (n as f64 - 1.0))
            .collect()
    }

    #[test]
    fn recovers_exact_line() {
        let x = grid(20, -5.0, 5.0);
        let y: Vec<f64> = x.iter().map(|&v| 3.0 * v - 2.0).collect();
        let objective = |p: &[f64]| -> Vec<f64> {
            x.iter().zip(&y).map(|(&xi, &yi)| yi - (p[0] * xi + p[1])).collect()
        };

        let out = LevenbergMarquardt::new()
            .minimize(&objective, &[spec("slope", 0.0), spec("intercept", 0.0)])
            .unwrap();

        let values: Vec<f64> = out.params.iter().map(|p| p.value).collect();
        assert!((values[0] - 3.0).abs() < 1e-6, "slope {}", values[0]);
        assert!((values[1] + 2.0).abs() < 1e-6, "intercept {}", values[1]);
        assert!(out.chi_square < 1e-10);
    }

    #[test]
    fn fits_gaussian_from_rough_start() {
        let x = grid(100, -10.0, 10.0);
        let y: Vec<f64> = x.iter().map(|&v| gaussian(v, 2.0, 1.0, 3.0, 0.5)).collect();
        let objective = |p: &[f64]| -> Vec<f64> {
            x.iter()
                .zip(&y)
                .map(|(&xi, &yi)| yi - gaussian(xi, p[0], p[1], p[2], p[3]))
                .collect()
        };

        let start = [spec("amp", 1.5), spec("mu", 0.0), spec("sigma", 1.0), spec("offset", 0.5)];
        let out = LevenbergMarquardt::new().minimize(&objective, &start).unwrap();

        let v: Vec<f64> = out.params.iter().map(|p| p.value).collect();
        assert!((v[0] - 2.0).abs() < 1e-4);
        assert!((v[1] - 1.0).abs() < 1e-4);
        assert!((v[2].abs() - 3.0).abs() < 1e-4);
        assert!((v[3] - 0.5).abs() < 1e-4);
    }

    #[test]
    fn respects_upper_bound() {
        let data = [5.0; 10];
        let objective = |p: &[f64]| -> Vec<f64> { data.iter().map(|&d| d - p[0]).collect() };

        let mut bounded = spec("offset", 0.0);
        bounded.min = Some(-1.0);
        bounded.max = Some(3.0);
        let out = LevenbergMarquardt::new().minimize(&objective, &[bounded]).unwrap();

        let v = out.params.iter().next().unwrap().value;
        assert!(v <= 3.0 && v > 2.99, "bounded value {v}");
    }

    #[test]
    fn fixed_parameter_is_untouched() {
        let x = grid(15, 0.0, 1.0);
        let objective = |p: &[f64]| -> Vec<f64> { x.iter().map(|&xi| 2.0 * xi + 1.0 - (p[0] * xi + p[1])).collect() };

        let mut fixed = spec("intercept", 0.25);
        fixed.varies = false;
        let out = LevenbergMarquardt::new()
            .minimize(&objective, &[spec("slope", 0.0), fixed])
            .unwrap();

        let intercept = out.params.iter().nth(1).unwrap();
        assert_eq!(intercept.value, 0.25);
        assert_eq!(intercept.stderr, None);
    }

    #[test]
    fn noisy_fit_reports_stderr() {
        let x = grid(40, -1.0, 1.0);
        let y: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(i, &v)| 0.5 * v + 2.0 + if i % 2 == 0 { 0.05 } else { -0.05 })
            .collect();
        let objective = |p: &[f64]| -> Vec<f64> {
            x.iter().zip(&y).map(|(&xi, &yi)| yi - (p[0] * xi + p[1])).collect()
        };

        let out = LevenbergMarquardt::new()
            .minimize(&objective, &[spec("slope", 0.0), spec("intercept", 0.0)])
            .unwrap();
        for p in out.params.iter() {
            let se = p.stderr.expect("stderr should be estimable");
            assert!(se > 0.0 && se < 0.1, "{} stderr {se}", p.id);
        }
    }

    #[test]
    fn non_finite_start_is_an_optimization_error() {
        let objective = |p: &[f64]| -> Vec<f64> { vec![1.0 / p[0]; 3] };
        let err = LevenbergMarquardt::new()
            .minimize(&objective, &[spec("a", 0.0)])
            .unwrap_err();
        assert!(matches!(err, MixfitError::Optimization(_)));
    }

    #[test]
    fn bound_transforms_round_trip() {
        for t in [
            Transform::Free,
            Transform::Lower(-2.0),
            Transform::Upper(4.0),
            Transform::Both(-1.0, 3.0),
        ] {
            let v = t.clamp(0.7);
            let back = t.to_external(t.to_internal(v));
            assert!((back - v).abs() < 1e-12, "{t:?}: {v} -> {back}");
        }
    }
}
