//! Shared fit pipeline: ingest -> engine construction -> fit -> exports.
//!
//! Keeping this separate from `app` lets tests drive a full run without
//! parsing argv or printing.

use std::collections::BTreeMap;

use tracing::info;

use crate::domain::{FitConfig, Limits, ModelKind, OptionsRecord};
use crate::error::MixfitError;
use crate::fit::{Mixfit, MixfitOptions, Mixture};
use crate::io::ingest::{IngestedScan, load_scan};
use crate::models::ModelFactory;

/// All computed outputs of a single `mixfit fit` run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub ingest: IngestedScan,
    pub mixture: Mixture,
    pub options: OptionsRecord,
}

/// Turn the run configuration into engine options.
///
/// Limits are grouped per kind and validated by the factories; a limit for a
/// kind that is not among the candidates is a configuration error.
pub fn engine_options(config: &FitConfig) -> Result<MixfitOptions, MixfitError> {
    let mut per_kind: BTreeMap<usize, Limits> = BTreeMap::new();
    for limit in &config.limits {
        let Some(idx) = config.models.iter().position(|&k| k == limit.kind) else {
            return Err(MixfitError::configuration(format!(
                "limit given for {} which is not a candidate model",
                limit.kind.title()
            )));
        };
        per_kind
            .entry(idx)
            .or_default()
            .insert(limit.param.clone(), (limit.min, limit.max));
    }

    let allowed = config
        .models
        .iter()
        .enumerate()
        .map(|(idx, &kind)| match per_kind.get(&idx) {
            Some(limits) => ModelFactory::with_limits(kind, limits),
            None => Ok(ModelFactory::new(kind)),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(MixfitOptions {
        allowed,
        max_iterations: config.max_iterations,
        min_residuum_improvement: config.min_residuum_improvement,
        stop_error: config.stop_error,
    })
}

/// Execute the full pipeline and return the computed outputs.
pub fn run_fit(config: &FitConfig) -> Result<RunOutput, MixfitError> {
    let ingest = load_scan(&config.input)?;
    info!(
        rows_used = ingest.rows_used,
        rows_skipped = ingest.row_errors.len(),
        "scan loaded"
    );
    run_fit_on(config, ingest)
}

/// Run the fit on an already-ingested scan.
pub fn run_fit_on(config: &FitConfig, ingest: IngestedScan) -> Result<RunOutput, MixfitError> {
    let engine = Mixfit::new(engine_options(config)?)?;
    let mixture = engine.fit(&ingest.scan.x, &ingest.scan.y)?;

    Ok(RunOutput {
        ingest,
        mixture,
        options: OptionsRecord {
            models: config.models.clone(),
            max_iterations: config.max_iterations,
            min_residuum_improvement: config.min_residuum_improvement,
            stop_error: config.stop_error,
        },
    })
}

/// Candidate kinds from the CLI; empty means the whole catalog.
pub fn resolve_models(models: &[ModelKind]) -> Vec<ModelKind> {
    if models.is_empty() {
        ModelKind::ALL.to_vec()
    } else {
        models.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sample::gaussian_scan;
    use crate::domain::LimitOverride;
    use crate::io::ingest::compute_stats;
    use std::path::PathBuf;

    fn config() -> FitConfig {
        FitConfig {
            input: PathBuf::from("unused.csv"),
            models: vec![ModelKind::Gaussian, ModelKind::Constant, ModelKind::Linear],
            limits: vec![],
            max_iterations: None,
            min_residuum_improvement: None,
            stop_error: Some(0.05),
            export_results: None,
            export_mixture: None,
            grid_points: 101,
        }
    }

    #[test]
    fn limits_reach_the_matching_factory() {
        let mut c = config();
        c.limits.push(LimitOverride {
            kind: ModelKind::Gaussian,
            param: "sigma".into(),
            min: 0.5,
            max: 4.0,
        });
        let options = engine_options(&c).unwrap();
        let sigma = options.allowed[0]
            .descriptors()
            .iter()
            .find(|d| d.name == "sigma")
            .unwrap();
        assert_eq!((sigma.min, sigma.max), (Some(0.5), Some(4.0)));
        assert!(options.allowed[1].descriptors()[0].min.is_none());
    }

    #[test]
    fn limit_for_missing_kind_is_configuration_error() {
        let mut c = config();
        c.limits.push(LimitOverride {
            kind: ModelKind::Cauchy,
            param: "gamma".into(),
            min: 0.5,
            max: 2.0,
        });
        assert!(matches!(engine_options(&c), Err(MixfitError::Configuration(_))));

        c.limits[0].kind = ModelKind::Gaussian;
        assert!(engine_options(&c).is_err(), "gamma is not a Gaussian parameter");
    }

    #[test]
    fn full_run_on_ingested_scan() {
        let scan = gaussian_scan(42, 0.01);
        let ingest = IngestedScan {
            stats: compute_stats(&scan).unwrap(),
            rows_read: scan.x.len(),
            rows_used: scan.x.len(),
            row_errors: vec![],
            scan,
        };
        let run = run_fit_on(&config(), ingest).unwrap();
        assert!(!run.mixture.is_empty());
        assert_eq!(run.options.stop_error, Some(0.05));
    }

    #[test]
    fn empty_model_list_means_catalog() {
        assert_eq!(resolve_models(&[]), ModelKind::ALL.to_vec());
        assert_eq!(resolve_models(&[ModelKind::Linear]), vec![ModelKind::Linear]);
    }
}
