//! Reporting utilities: residual statistics and formatted terminal output.

pub mod format;

pub use format::*;

use crate::domain::Scan;
use crate::fit::Mixture;

/// Aggregate residual diagnostics for a fitted scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResidualStats {
    pub chi_square: f64,
    pub rms: f64,
    pub max_abs: f64,
}

pub fn residual_stats(scan: &Scan, mixture: &Mixture) -> ResidualStats {
    let residuals = mixture.residual(&scan.x, &scan.y);
    let chi_square: f64 = residuals.iter().map(|r| r * r).sum();
    let n = residuals.len().max(1) as f64;
    ResidualStats {
        chi_square,
        rms: (chi_square / n).sqrt(),
        max_abs: residuals.iter().fold(0.0, |m, r| m.max(r.abs())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_mixture_residuals_are_the_data() {
        let scan = Scan {
            x: vec![0.0, 1.0],
            y: vec![3.0, -4.0],
        };
        let stats = residual_stats(&scan, &Mixture::new());
        assert_eq!(stats.chi_square, 25.0);
        assert_eq!(stats.max_abs, 4.0);
        assert!((stats.rms - 12.5f64.sqrt()).abs() < 1e-12);
    }
}
