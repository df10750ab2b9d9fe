//! Seeded synthetic scans.
//!
//! `demo_scan` produces a multi-line spectrum: three Gaussian lines of very
//! different widths, one derivative-shaped feature, a slight slope and a
//! baseline, plus Gaussian noise. `gaussian_scan` is the single-line fixture
//! used by tests.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use crate::domain::{Scan, SynthConfig};
use crate::error::MixfitError;
use crate::math::basis;

/// `(weight, mu, sigma)` of the demo lines; each line is normalized by
/// `sqrt(2π·σ)`.
const DEMO_LINES: [(f64, f64, f64); 3] = [(1.0, 1.0, 3.0), (0.3, -3.0, 0.7), (-0.1, 6.0, 0.1)];

/// `(amp, mu, sigma)` of the derivative-shaped feature.
const DEMO_DERIVATIVE: (f64, f64, f64) = (0.05, 2.0, 0.22);

const DEMO_SLOPE: f64 = 0.001;
const DEMO_BASELINE: f64 = 6.0;

/// Noise-free demo signal at `x`.
pub fn demo_signal(x: f64) -> f64 {
    let lines: f64 = DEMO_LINES
        .iter()
        .map(|&(w, mu, sigma)| {
            basis::gaussian(x, w / (2.0 * std::f64::consts::PI * sigma).sqrt(), mu, sigma, 0.0)
        })
        .sum();
    let (amp, mu, sigma) = DEMO_DERIVATIVE;
    lines + basis::differential_gaussian(x, amp, mu, sigma, 0.0) + DEMO_SLOPE * x + DEMO_BASELINE
}

pub fn demo_scan(config: &SynthConfig) -> Result<Scan, MixfitError> {
    if config.points < 2 {
        return Err(MixfitError::configuration("synthetic scan needs at least 2 points"));
    }
    if !(config.x_min.is_finite() && config.x_max.is_finite() && config.x_max > config.x_min) {
        return Err(MixfitError::configuration(format!(
            "invalid x range [{}, {}]",
            config.x_min, config.x_max
        )));
    }

    if !(config.noise.is_finite() && config.noise >= 0.0) {
        return Err(MixfitError::configuration(format!(
            "noise must be a finite non-negative std-dev, got {}",
            config.noise
        )));
    }

    let x = linspace(config.x_min, config.x_max, config.points);
    let clean: Vec<f64> = x.iter().map(|&v| demo_signal(v)).collect();
    let y = add_noise(&clean, config.noise, config.seed)?;
    Ok(Scan { x, y })
}

/// `2·exp(-(x-1)²/18) + 5.5` plus noise on 100 points over `[-10, 10]`.
pub fn gaussian_scan(seed: u64, noise: f64) -> Scan {
    let x = linspace(-10.0, 10.0, 100);
    let clean: Vec<f64> = x
        .iter()
        .map(|&v| basis::gaussian(v, 2.0, 1.0, 3.0, 0.0) + 5.5)
        .collect();
    // Callers pass small literal noise levels; fall back to the clean signal otherwise.
    let y = add_noise(&clean, noise, seed).unwrap_or(clean);
    Scan { x, y }
}

pub fn linspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![lo],
        _ => (0..n)
            .map(|i| lo + (hi - lo) * i as f64 / (n - 1) as f64)
            .collect(),
    }
}

fn add_noise(values: &[f64], sigma: f64, seed: u64) -> Result<Vec<f64>, MixfitError> {
    let normal = Normal::new(0.0, sigma)
        .map_err(|e| MixfitError::configuration(format!("noise distribution error: {e}")))?;
    let mut rng = StdRng::seed_from_u64(seed);
    Ok(values.iter().map(|v| v + normal.sample(&mut rng)).collect())
}
