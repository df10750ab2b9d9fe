//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the fitting code stays clean and testable
//! - output changes are localized

use crate::domain::{FitConfig, MixtureFile, ModelKind};
use crate::fit::Mixture;
use crate::io::ingest::IngestedScan;
use crate::models::model::fmt_stderr;
use crate::report::residual_stats;

/// Format the full run summary (dataset stats + per-iteration chi + slots).
pub fn format_run_summary(ingest: &IngestedScan, mixture: &Mixture, config: &FitConfig) -> String {
    let mut out = String::new();

    out.push_str("=== mixfit - greedy mixture fit ===\n");
    out.push_str(&format!("Input: {}\n", config.input.display()));
    out.push_str(&format!(
        "Points: n={} | x=[{:.4}, {:.4}] | y=[{:.4}, {:.4}]\n",
        ingest.stats.n_points,
        ingest.stats.x_min,
        ingest.stats.x_max,
        ingest.stats.y_min,
        ingest.stats.y_max
    ));
    if !ingest.row_errors.is_empty() {
        out.push_str(&format!(
            "Skipped rows: {} of {}\n",
            ingest.row_errors.len(),
            ingest.rows_read
        ));
        for e in ingest.row_errors.iter().take(5) {
            out.push_str(&format!("  line {}: {}\n", e.line, e.message));
        }
    }
    out.push_str(&format!("Candidates: {}\n", fmt_models(&config.models)));

    out.push_str("\nIterations:\n");
    for (i, chi) in mixture.chi_history().iter().enumerate() {
        let kind = mixture.slots()[i].model().kind();
        out.push_str(&format!("  {:>3}  +{:<13} chi2={chi:.6e}\n", i + 1, kind.title()));
    }
    match mixture.stop_reason() {
        Some(reason) => out.push_str(&format!("Stopped: {}\n", reason.description())),
        None => out.push_str("Stopped: (no reason recorded)\n"),
    }

    let stats = residual_stats(&ingest.scan, mixture);
    out.push_str(&format!(
        "Residual: rms={:.6} max|r|={:.6}\n",
        stats.rms, stats.max_abs
    ));

    out.push_str("\nMixture:\n");
    if mixture.is_empty() {
        out.push_str("  (empty)\n");
    }
    for line in mixture.to_string().lines() {
        out.push_str(&format!("  {line}\n"));
    }

    out
}

/// Format a saved mixture file.
pub fn format_mixture_file(file: &MixtureFile) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "=== {} mixture (generated {}) ===\n",
        file.tool,
        file.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out.push_str(&format!("Candidates: {}\n", fmt_models(&file.options.models)));
    out.push_str(&format!("Chi history: {}\n", fmt_vec(&file.chi_history)));
    if let Some(reason) = file.stop_reason {
        out.push_str(&format!("Stopped: {}\n", reason.description()));
    }

    out.push_str("\nSlots:\n");
    for slot in &file.slots {
        let params: Vec<String> = slot
            .parameters
            .iter()
            .map(|p| format!("{}={:.6}±{}", p.name, p.value, fmt_stderr(p.stderr)))
            .collect();
        out.push_str(&format!("  {}({})\n", slot.title, params.join(", ")));
    }

    out
}

fn fmt_models(models: &[ModelKind]) -> String {
    let names: Vec<&str> = models.iter().map(|k| k.title()).collect();
    names.join(", ")
}

fn fmt_vec(v: &[f64]) -> String {
    let parts: Vec<String> = v.iter().map(|x| format!("{x:.6}")).collect();
    format!("[{}]", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sample::gaussian_scan;
    use crate::fit::{Mixfit, MixfitOptions};
    use crate::io::ingest::compute_stats;
    use std::path::PathBuf;

    fn config(models: Vec<ModelKind>) -> FitConfig {
        FitConfig {
            input: PathBuf::from("scan.csv"),
            models,
            limits: vec![],
            max_iterations: Some(1),
            min_residuum_improvement: None,
            stop_error: None,
            export_results: None,
            export_mixture: None,
            grid_points: 11,
        }
    }

    #[test]
    fn summary_lists_iterations_and_slots() {
        let scan = gaussian_scan(8, 0.01);
        let models = vec![ModelKind::Gaussian, ModelKind::Constant];
        let mixture = Mixfit::new(MixfitOptions {
            max_iterations: Some(1),
            ..MixfitOptions::with_models(&models)
        })
        .unwrap()
        .fit(&scan.x, &scan.y)
        .unwrap();

        let ingest = IngestedScan {
            stats: compute_stats(&scan).unwrap(),
            rows_read: scan.x.len(),
            rows_used: scan.x.len(),
            row_errors: vec![],
            scan,
        };
        let text = format_run_summary(&ingest, &mixture, &config(models));

        assert!(text.contains("Points: n=100"));
        assert!(text.contains("Candidates: Gaussian, Constant"));
        assert!(text.contains("+Gaussian"));
        assert!(text.contains("Stopped: maximum iterations reached"));
        assert!(text.contains("  Gaussian(amp="));
    }

    #[test]
    fn vec_formatting() {
        assert_eq!(fmt_vec(&[1.0, 0.5]), "[1.000000, 0.500000]");
        assert_eq!(fmt_vec(&[]), "[]");
    }
}
