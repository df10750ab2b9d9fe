//! Greedy stepwise mixture fitting.
//!
//! Each iteration:
//! - checks the stop/rollback rules against the chi-square history
//! - subtracts the current mixture from the data ("stage input")
//! - fits every allowed candidate to the stage input (parallel)
//! - appends the best candidate as a new slot
//! - re-optimizes all slots jointly against the original data
//!
//! Selection is deterministic: the smallest finite chi-square wins, ties go
//! to the candidate listed first.

use rayon::prelude::*;
use tracing::{debug, info};

use crate::domain::{FittedParameterSet, ModelKind};
use crate::error::MixfitError;
use crate::fit::mixture::{Mixture, MixtureSlot};
use crate::fit::stopping::{StopDecision, StopRules, check_stop};
use crate::math::{LevenbergMarquardt, Minimizer};
use crate::models::{CandidateModel, ModelFactory, default_catalog};

/// Engine settings.
#[derive(Debug, Clone, PartialEq)]
pub struct MixfitOptions {
    /// Candidate factories in selection order.
    pub allowed: Vec<ModelFactory>,
    /// Maximum number of slots (`>= 1`).
    pub max_iterations: Option<usize>,
    /// Minimum chi-square decrease required to keep the latest slot.
    pub min_residuum_improvement: Option<f64>,
    /// Stop once chi-square falls below this value.
    pub stop_error: Option<f64>,
}

impl Default for MixfitOptions {
    fn default() -> Self {
        Self {
            allowed: default_catalog(),
            max_iterations: None,
            min_residuum_improvement: None,
            stop_error: None,
        }
    }
}

impl MixfitOptions {
    /// Unconstrained factories for the given kinds, in the given order.
    pub fn with_models(kinds: &[ModelKind]) -> Self {
        Self {
            allowed: kinds.iter().map(|&k| ModelFactory::new(k)).collect(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), MixfitError> {
        if self.allowed.is_empty() {
            return Err(MixfitError::configuration(
                "at least one candidate model is required",
            ));
        }
        if self.max_iterations == Some(0) {
            return Err(MixfitError::configuration("max iterations must be >= 1"));
        }
        if let Some(v) = self.min_residuum_improvement {
            if !(v.is_finite() && v > 0.0) {
                return Err(MixfitError::configuration(format!(
                    "minimum residuum improvement must be a positive number (got {v})"
                )));
            }
        }
        if let Some(v) = self.stop_error {
            if !(v.is_finite() && v > 0.0) {
                return Err(MixfitError::configuration(format!(
                    "stop error must be a positive number (got {v})"
                )));
            }
        }
        Ok(())
    }

    fn stop_rules(&self) -> StopRules {
        StopRules {
            max_iterations: self.max_iterations,
            min_residuum_improvement: self.min_residuum_improvement,
            stop_error: self.stop_error,
        }
    }
}

/// The greedy fit engine.
#[derive(Debug, Clone)]
pub struct Mixfit<M: Minimizer = LevenbergMarquardt> {
    options: MixfitOptions,
    minimizer: M,
}

impl Mixfit<LevenbergMarquardt> {
    pub fn new(options: MixfitOptions) -> Result<Self, MixfitError> {
        Self::with_minimizer(options, LevenbergMarquardt::default())
    }
}

impl<M: Minimizer> Mixfit<M> {
    pub fn with_minimizer(options: MixfitOptions, minimizer: M) -> Result<Self, MixfitError> {
        options.validate()?;
        Ok(Self { options, minimizer })
    }

    pub fn options(&self) -> &MixfitOptions {
        &self.options
    }

    /// Grow a mixture for `(x, y)` until a stop rule fires.
    pub fn fit(&self, x: &[f64], y: &[f64]) -> Result<Mixture, MixfitError> {
        validate_input(x, y)?;

        let rules = self.options.stop_rules();
        let mut mixture = Mixture::new();

        loop {
            match check_stop(mixture.chi_history(), &rules) {
                StopDecision::Continue => {}
                StopDecision::Stop(reason) => {
                    mixture.set_stop_reason(reason);
                    break;
                }
                StopDecision::Rollback(reason) => {
                    mixture.rollback();
                    mixture.set_stop_reason(reason);
                    break;
                }
            }

            let slot = mixture.len();
            let stage_input = mixture.residual(x, y);

            let candidates = self.fit_candidates(slot, x, &stage_input)?;
            let Some(best) = select_best(candidates) else {
                return Err(MixfitError::optimization(format!(
                    "no candidate produced a finite chi-square for slot {slot}"
                )));
            };
            let kind = best.model.kind();

            mixture.push(MixtureSlot::new(best.model, best.params)?);
            let chi = mixture.refine(x, y, &self.minimizer)?;

            info!(
                slot,
                kind = %kind,
                candidate_chi_square = best.chi_square,
                chi_square = chi,
                "added mixture slot"
            );
        }

        if let Some(reason) = mixture.stop_reason() {
            info!(
                slots = mixture.len(),
                chi_square = mixture.last_chi_square().unwrap_or(f64::NAN),
                reason = reason.description(),
                "mixture fit finished"
            );
        }

        Ok(mixture)
    }

    fn fit_candidates(
        &self,
        slot: usize,
        x: &[f64],
        stage_input: &[f64],
    ) -> Result<Vec<CandidateFit>, MixfitError> {
        self.options
            .allowed
            .par_iter()
            .enumerate()
            .map(|(idx, factory)| -> Result<CandidateFit, MixfitError> {
                let model = factory.create(slot);
                let guess = model.guess(x, stage_input);
                let specs = model.initial_specs(&guess);

                let objective = |v: &[f64]| model.residual_values(v, x, stage_input);
                let out = self.minimizer.minimize(&objective, &specs)?;

                debug!(
                    slot,
                    kind = %model.kind(),
                    chi_square = out.chi_square,
                    iterations = out.iterations,
                    "candidate fitted"
                );

                Ok(CandidateFit {
                    idx,
                    model,
                    params: out.params,
                    chi_square: out.chi_square,
                })
            })
            .collect()
    }
}

/// One candidate fitted to the stage input.
#[derive(Debug, Clone)]
struct CandidateFit {
    idx: usize,
    model: CandidateModel,
    params: FittedParameterSet,
    chi_square: f64,
}

/// Smallest finite chi-square; ties go to the lowest configuration index.
fn select_best(candidates: Vec<CandidateFit>) -> Option<CandidateFit> {
    let mut best: Option<CandidateFit> = None;
    for c in candidates {
        if !c.chi_square.is_finite() {
            continue;
        }
        let better = match &best {
            None => true,
            Some(b) => c.chi_square < b.chi_square || (c.chi_square == b.chi_square && c.idx < b.idx),
        };
        if better {
            best = Some(c);
        }
    }
    best
}

fn validate_input(x: &[f64], y: &[f64]) -> Result<(), MixfitError> {
    if x.len() != y.len() {
        return Err(MixfitError::input(format!(
            "x and y lengths differ ({} vs {})",
            x.len(),
            y.len()
        )));
    }
    if x.is_empty() {
        return Err(MixfitError::input("no data points to fit"));
    }
    if let Some(i) = x.iter().zip(y).position(|(a, b)| !a.is_finite() || !b.is_finite()) {
        return Err(MixfitError::input(format!("non-finite sample at index {i}")));
    }
    Ok(())
}
