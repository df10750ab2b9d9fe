//! The accumulated additive model.
//!
//! A [`Mixture`] is an ordered list of fitted slots plus the chi-square
//! recorded after each joint refinement. Outside of the engine the two lists
//! always have the same length; the only mutators are crate-private.
//!
//! Joint refinement lays every slot's parameters out in one flat vector, slot
//! by slot in descriptor order, so a single minimizer call can move them all.

use std::fmt;

use tracing::debug;

use crate::domain::{FittedParameterSet, ParamSpec, StopReason};
use crate::error::MixfitError;
use crate::math::Minimizer;
use crate::models::CandidateModel;

/// One accepted model with its fitted parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct MixtureSlot {
    model: CandidateModel,
    params: FittedParameterSet,
    values: Vec<f64>,
}

impl MixtureSlot {
    /// Fails when `params` lacks a value for one of the model's parameters.
    pub fn new(model: CandidateModel, params: FittedParameterSet) -> Result<Self, MixfitError> {
        let values = model.values_from(&params)?;
        Ok(Self {
            model,
            params,
            values,
        })
    }

    pub fn model(&self) -> &CandidateModel {
        &self.model
    }

    pub fn params(&self) -> &FittedParameterSet {
        &self.params
    }

    /// Fitted values in descriptor order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn evaluate(&self, x: &[f64]) -> Vec<f64> {
        self.model.evaluate_values(&self.values, x)
    }

    pub fn render(&self) -> String {
        self.model.render(&self.params)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mixture {
    slots: Vec<MixtureSlot>,
    chi_history: Vec<f64>,
    stop_reason: Option<StopReason>,
}

impl Mixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slots(&self) -> &[MixtureSlot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn chi_history(&self) -> &[f64] {
        &self.chi_history
    }

    pub fn last_chi_square(&self) -> Option<f64> {
        self.chi_history.last().copied()
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    /// Sum of all slot contributions; zeros for an empty mixture.
    pub fn evaluate(&self, x: &[f64]) -> Vec<f64> {
        let mut total = vec![0.0; x.len()];
        for slot in &self.slots {
            for (t, &xi) in total.iter_mut().zip(x) {
                *t += slot.model.point(&slot.values, xi);
            }
        }
        total
    }

    pub fn residual(&self, x: &[f64], data: &[f64]) -> Vec<f64> {
        self.evaluate(x)
            .iter()
            .zip(data)
            .map(|(m, d)| d - m)
            .collect()
    }

    /// Per-slot contributions, one vector per slot.
    pub fn components(&self, x: &[f64]) -> Vec<Vec<f64>> {
        self.slots.iter().map(|s| s.evaluate(x)).collect()
    }

    /// Total parameter count across slots (the joint vector length).
    pub fn joint_len(&self) -> usize {
        self.slots.iter().map(|s| s.values.len()).sum()
    }

    /// Evaluate with every slot's values drawn from one flat vector.
    ///
    /// # Panics
    /// Panics if `values` is shorter than [`Mixture::joint_len`].
    pub fn joint_evaluate(&self, values: &[f64], x: &[f64]) -> Vec<f64> {
        let mut total = vec![0.0; x.len()];
        let mut offset = 0;
        for slot in &self.slots {
            let n = slot.values.len();
            let own = &values[offset..offset + n];
            for (t, &xi) in total.iter_mut().zip(x) {
                *t += slot.model.point(own, xi);
            }
            offset += n;
        }
        total
    }

    pub fn joint_residual(&self, values: &[f64], x: &[f64], data: &[f64]) -> Vec<f64> {
        self.joint_evaluate(values, x)
            .iter()
            .zip(data)
            .map(|(m, d)| d - m)
            .collect()
    }

    /// Starting point and constraints for a joint refinement.
    pub fn joint_specs(&self) -> Vec<ParamSpec> {
        self.slots
            .iter()
            .flat_map(|s| s.model.initial_specs(&s.values))
            .collect()
    }

    /// Re-optimize every slot jointly against `data` and record the chi-square.
    pub(crate) fn refine(
        &mut self,
        x: &[f64],
        data: &[f64],
        minimizer: &dyn Minimizer,
    ) -> Result<f64, MixfitError> {
        if self.slots.is_empty() {
            return Err(MixfitError::configuration("cannot refine an empty mixture"));
        }

        let specs = self.joint_specs();
        let out = {
            let objective = |v: &[f64]| self.joint_residual(v, x, data);
            minimizer.minimize(&objective, &specs)?
        };

        if out.params.len() != self.joint_len() {
            return Err(MixfitError::optimization(format!(
                "minimizer returned {} parameters, expected {}",
                out.params.len(),
                self.joint_len()
            )));
        }

        // Split by slot namespace; commit only once every slot resolves.
        let mut refined = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            let index = slot.model.slot().ok_or_else(|| {
                MixfitError::configuration("mixture slot model has no slot index")
            })?;
            let own = out.params.for_slot(index);
            let values = slot.model.values_from(&own).map_err(|e| {
                MixfitError::optimization(format!("joint refinement result: {e}"))
            })?;
            if own.len() != values.len() {
                return Err(MixfitError::optimization(format!(
                    "minimizer returned {} parameters for slot {index}, expected {}",
                    own.len(),
                    values.len()
                )));
            }
            refined.push((own, values));
        }
        for (slot, (params, values)) in self.slots.iter_mut().zip(refined) {
            slot.params = params;
            slot.values = values;
        }

        debug!(
            slots = self.slots.len(),
            iterations = out.iterations,
            chi_square = out.chi_square,
            "joint refinement"
        );
        self.chi_history.push(out.chi_square);
        Ok(out.chi_square)
    }

    pub(crate) fn push(&mut self, slot: MixtureSlot) {
        self.slots.push(slot);
    }

    /// Drop the latest slot and its chi-square.
    pub(crate) fn rollback(&mut self) {
        self.slots.pop();
        self.chi_history.pop();
    }

    pub(crate) fn set_stop_reason(&mut self, reason: StopReason) {
        self.stop_reason = Some(reason);
    }
}

impl fmt::Display for Mixture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self.slots.iter().map(MixtureSlot::render).collect();
        f.write_str(&lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FittedParam, ModelKind, ParamId};
    use crate::math::{LevenbergMarquardt, Minimized};
    use crate::models::ModelFactory;

    fn slot(kind: ModelKind, index: usize, values: &[f64]) -> MixtureSlot {
        let model = ModelFactory::new(kind).create(index);
        let params = model
            .param_ids()
            .into_iter()
            .zip(values)
            .map(|(id, &value)| FittedParam { id, value, stderr: None })
            .collect();
        MixtureSlot::new(model, FittedParameterSet::new(params)).unwrap()
    }

    fn two_slot_mixture() -> Mixture {
        let mut m = Mixture::new();
        m.push(slot(ModelKind::Gaussian, 0, &[2.0, 1.0, 3.0, 0.0]));
        m.push(slot(ModelKind::Constant, 1, &[5.5]));
        m.chi_history = vec![10.0, 1.0];
        m
    }

    fn grid(n: usize) -> Vec<f64> {
        (0..n).map(|i| -10.0 + 20.0 * i as f64 / (n as f64 - 1.0)).collect()
    }

    #[test]
    fn empty_mixture_evaluates_to_zero() {
        let m = Mixture::new();
        assert_eq!(m.evaluate(&[1.0, 2.0]), vec![0.0, 0.0]);
        assert_eq!(m.residual(&[1.0, 2.0], &[3.0, 4.0]), vec![3.0, 4.0]);
        assert_eq!(m.to_string(), "");
    }

    #[test]
    fn evaluate_sums_slots_and_is_repeatable() {
        let m = two_slot_mixture();
        let x = grid(11);
        let first = m.evaluate(&x);
        assert_eq!(first, m.evaluate(&x));

        let comps = m.components(&x);
        for (i, total) in first.iter().enumerate() {
            assert!((comps[0][i] + comps[1][i] - total).abs() < 1e-12);
        }
    }

    #[test]
    fn joint_evaluate_matches_slot_values() {
        let m = two_slot_mixture();
        let x = grid(11);
        let flat: Vec<f64> = m.slots().iter().flat_map(|s| s.values().to_vec()).collect();
        assert_eq!(flat.len(), m.joint_len());
        assert_eq!(m.joint_evaluate(&flat, &x), m.evaluate(&x));
    }

    #[test]
    fn joint_specs_are_namespaced_per_slot() {
        let m = two_slot_mixture();
        let names: Vec<String> = m.joint_specs().iter().map(|s| s.id.to_string()).collect();
        assert_eq!(names, ["f0_amp", "f0_mu", "f0_sigma", "f0_offset", "f1_offset"]);
    }

    #[test]
    fn refine_improves_and_keeps_slot_count() {
        let x = grid(80);
        let data: Vec<f64> = x
            .iter()
            .map(|&v| crate::math::basis::gaussian(v, 2.5, 0.5, 2.0, 0.0) + 5.0)
            .collect();

        let mut m = Mixture::new();
        m.push(slot(ModelKind::Gaussian, 0, &[2.0, 1.0, 3.0, 0.0]));
        m.push(slot(ModelKind::Constant, 1, &[5.5]));
        let before: f64 = m.residual(&x, &data).iter().map(|r| r * r).sum();

        let chi = m.refine(&x, &data, &LevenbergMarquardt::default()).unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!(m.chi_history(), &[chi]);
        assert!(chi < before);
        assert!(chi < 1e-6, "chi {chi}");
        assert!(m.slots()[1].params().get(ParamId::new(Some(1), "offset")).is_some());
    }

    /// Returns every spec at its starting value, in reverse order.
    struct ReversedOutput;

    impl Minimizer for ReversedOutput {
        fn minimize(
            &self,
            objective: &dyn Fn(&[f64]) -> Vec<f64>,
            params: &[ParamSpec],
        ) -> Result<Minimized, MixfitError> {
            let start: Vec<f64> = params.iter().map(|p| p.initial).collect();
            let chi_square = objective(&start).iter().map(|r| r * r).sum();
            let fitted = params
                .iter()
                .rev()
                .map(|p| FittedParam { id: p.id, value: p.initial, stderr: Some(0.1) })
                .collect();
            Ok(Minimized { params: FittedParameterSet::new(fitted), chi_square, iterations: 0 })
        }
    }

    /// Reports the last spec under a slot that is not in the mixture.
    struct ForeignIdOutput;

    impl Minimizer for ForeignIdOutput {
        fn minimize(
            &self,
            _objective: &dyn Fn(&[f64]) -> Vec<f64>,
            params: &[ParamSpec],
        ) -> Result<Minimized, MixfitError> {
            let last = params.len() - 1;
            let fitted = params
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    let id = if i == last { ParamId::new(Some(7), p.id.name) } else { p.id };
                    FittedParam { id, value: p.initial, stderr: None }
                })
                .collect();
            Ok(Minimized { params: FittedParameterSet::new(fitted), chi_square: 0.0, iterations: 0 })
        }
    }

    #[test]
    fn refine_splits_result_by_slot_id_not_position() {
        let x = grid(11);
        let mut m = two_slot_mixture();
        m.chi_history.clear();
        let before = m.evaluate(&x);

        m.refine(&x, &before, &ReversedOutput).unwrap();

        let ids: Vec<String> = m.slots()[0].params().iter().map(|p| p.id.to_string()).collect();
        assert!(ids.iter().all(|id| id.starts_with("f0_")), "{ids:?}");
        assert_eq!(m.slots()[0].values(), &[2.0, 1.0, 3.0, 0.0]);
        assert_eq!(m.slots()[1].params().value(ParamId::new(Some(1), "offset")), Some(5.5));
        assert_eq!(m.evaluate(&x), before);
        assert_eq!(m.chi_history(), &[0.0]);
    }

    #[test]
    fn refine_rejects_unknown_slot_ids_and_keeps_mixture() {
        let x = grid(11);
        let mut m = two_slot_mixture();
        let untouched = m.clone();
        let data = m.evaluate(&x);

        let err = m.refine(&x, &data, &ForeignIdOutput).unwrap_err();
        assert!(matches!(err, MixfitError::Optimization(_)));
        assert_eq!(m, untouched);
    }

    #[test]
    fn rollback_keeps_lengths_aligned() {
        let mut m = two_slot_mixture();
        m.rollback();
        assert_eq!(m.len(), 1);
        assert_eq!(m.chi_history(), &[10.0]);
    }

    #[test]
    fn display_joins_slots_by_line() {
        let m = two_slot_mixture();
        let text = m.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Gaussian(amp=2.000000±n/a"));
        assert_eq!(lines[1], "Constant(offset=5.500000±n/a)");
    }
}
