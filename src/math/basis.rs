//! Basis function formulas for the mixture catalog.
//!
//! All functions are scalar and pure:
//!
//! - `gaussian(x) = amp · exp(-(x - mu)² / (2σ²)) + offset`
//! - `cauchy(x) = amp · γ / (π ((x - x0)² + γ²)) + offset`
//! - `differential_gaussian(x) = -amp · (x - mu) / σ² · exp(-½ ((x - mu)/σ)²) + offset`
//! - `differential_cauchy(x) = -amp · γ/π · 2(x - x0) / ((x - x0)² + γ²)² + offset`
//!
//! `amp` of the Cauchy pair is the area under the Lorentzian; the differential
//! forms are `amp` times the analytic x-derivative of the unit-offset shape.

use std::f64::consts::PI;

pub fn constant(_x: f64, offset: f64) -> f64 {
    offset
}

pub fn linear(x: f64, slope: f64, intercept: f64) -> f64 {
    x * slope + intercept
}

pub fn gaussian(x: f64, amp: f64, mu: f64, sigma: f64, offset: f64) -> f64 {
    let d = x - mu;
    amp * (-(d * d) / (2.0 * sigma * sigma)).exp() + offset
}

pub fn cauchy(x: f64, amp: f64, x0: f64, gamma: f64, offset: f64) -> f64 {
    let d = x - x0;
    amp * gamma / (PI * (d * d + gamma * gamma)) + offset
}

pub fn differential_gaussian(x: f64, amp: f64, mu: f64, sigma: f64, offset: f64) -> f64 {
    let u = (x - mu) / sigma;
    -amp / sigma * u * (-0.5 * u * u).exp() + offset
}

pub fn differential_cauchy(x: f64, amp: f64, x0: f64, gamma: f64, offset: f64) -> f64 {
    let d = x - x0;
    let q = d * d + gamma * gamma;
    -amp * gamma / PI * 2.0 * d / (q * q) + offset
}

#[cfg(test)]
mod tests {
    use super::*;

    fn central_diff(f: impl Fn(f64) -> f64, x: f64) -> f64 {
        let h = 1e-5;
        (f(x + h) - f(x - h)) / (2.0 * h)
    }

    #[test]
    fn gaussian_peak_and_offset() {
        assert!((gaussian(1.0, 2.0, 1.0, 3.0, 0.5) - 2.5).abs() < 1e-12);
        assert!((gaussian(1e6, 2.0, 1.0, 3.0, 0.5) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn cauchy_amp_is_area() {
        // Peak height of the unit-area Lorentzian is 1/(πγ).
        let gamma = 0.5;
        let peak = cauchy(0.0, 1.0, 0.0, gamma, 0.0);
        assert!((peak - 1.0 / (PI * gamma)).abs() < 1e-12);
    }

    #[test]
    fn differential_forms_match_numeric_derivatives() {
        for &x in &[-3.0, -0.7, 0.0, 0.4, 2.5] {
            let dg = central_diff(|t| gaussian(t, 1.0, 0.3, 1.2, 0.0), x);
            // d/dx of exp(-(x-mu)²/2σ²) is -(x-mu)/σ² · exp(..)
            assert!((differential_gaussian(x, 1.0, 0.3, 1.2, 0.0) - dg).abs() < 1e-6);

            let dc = central_diff(|t| cauchy(t, 1.0, 0.3, 1.2, 0.0), x);
            assert!((differential_cauchy(x, 1.0, 0.3, 1.2, 0.0) - dc).abs() < 1e-6);
        }
    }

    #[test]
    fn linear_and_constant() {
        assert_eq!(linear(2.0, 3.0, 1.0), 7.0);
        assert_eq!(constant(42.0, 5.5), 5.5);
    }
}
