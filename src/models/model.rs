//! Candidate models and their factories.
//!
//! A [`CandidateModel`] is one catalog kind bound to an optional mixture slot
//! plus its parameter table after caller bound overrides. It knows how to:
//!
//! - evaluate itself from a flat value vector (descriptor order)
//! - guess initial values from `(x, data)` without iterating
//! - turn a guess into [`ParamSpec`]s for the minimizer
//! - render fitted values as `Title(name=value±stderr, ...)`
//!
//! [`ModelFactory`] holds a validated parameter table and stamps out fresh
//! models for a given slot.

use std::f64::consts::PI;

use crate::domain::{
    FittedParameterSet, Limits, ModelKind, ParamId, ParamSpec, ParameterDescriptor,
};
use crate::error::MixfitError;
use crate::math::basis;

/// One basis function instance, optionally namespaced to a mixture slot.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateModel {
    kind: ModelKind,
    slot: Option<usize>,
    descriptors: Vec<ParameterDescriptor>,
}

impl CandidateModel {
    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn slot(&self) -> Option<usize> {
        self.slot
    }

    pub fn descriptors(&self) -> &[ParameterDescriptor] {
        &self.descriptors
    }

    pub fn param_ids(&self) -> Vec<ParamId> {
        self.descriptors
            .iter()
            .map(|d| ParamId::new(self.slot, d.name))
            .collect()
    }

    /// Evaluate at a single point from values in descriptor order.
    pub(crate) fn point(&self, values: &[f64], x: f64) -> f64 {
        match self.kind {
            ModelKind::Constant => basis::constant(x, values[0]),
            ModelKind::Linear => basis::linear(x, values[0], values[1]),
            ModelKind::Gaussian => basis::gaussian(x, values[0], values[1], values[2], values[3]),
            ModelKind::Cauchy => basis::cauchy(x, values[0], values[1], values[2], values[3]),
            ModelKind::DifferentialGaussian => {
                basis::differential_gaussian(x, values[0], values[1], values[2], values[3])
            }
            ModelKind::DifferentialCauchy => {
                basis::differential_cauchy(x, values[0], values[1], values[2], values[3])
            }
        }
    }

    /// Evaluate from values in descriptor order.
    ///
    /// # Panics
    /// Panics if `values` is shorter than the parameter table.
    pub fn evaluate_values(&self, values: &[f64], x: &[f64]) -> Vec<f64> {
        x.iter().map(|&xi| self.point(values, xi)).collect()
    }

    /// `data - evaluate_values(values, x)`: the vector the minimizer drives to zero.
    pub fn residual_values(&self, values: &[f64], x: &[f64], data: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(data)
            .map(|(&xi, &di)| di - self.point(values, xi))
            .collect()
    }

    /// Pull this model's values out of a fitted set, in descriptor order.
    pub fn values_from(&self, params: &FittedParameterSet) -> Result<Vec<f64>, MixfitError> {
        self.param_ids()
            .into_iter()
            .map(|id| {
                params.value(id).ok_or_else(|| {
                    MixfitError::configuration(format!("missing value for parameter {id}"))
                })
            })
            .collect()
    }

    pub fn evaluate(&self, params: &FittedParameterSet, x: &[f64]) -> Result<Vec<f64>, MixfitError> {
        Ok(self.evaluate_values(&self.values_from(params)?, x))
    }

    /// Closed-form initial values in descriptor order.
    pub fn guess(&self, x: &[f64], data: &[f64]) -> Vec<f64> {
        let Some(ex) = Extrema::of(x, data) else {
            return self.fallback_guess();
        };

        match self.kind {
            ModelKind::Constant => vec![ex.mean],
            ModelKind::Linear => {
                let (x0, x1) = (x[0], x[ex.len - 1]);
                let (y0, y1) = (data[0], data[ex.len - 1]);
                let slope = if x1 != x0 { (y1 - y0) / (x1 - x0) } else { 0.0 };
                vec![slope, y0 - slope * x0]
            }
            ModelKind::Gaussian => {
                let (amp, center, offset) = ex.peak();
                vec![amp, center, 1.0, offset]
            }
            ModelKind::Cauchy => {
                let gamma = 1.0;
                let (amp, center, offset) = ex.peak();
                vec![amp * PI * gamma, center, gamma, offset]
            }
            ModelKind::DifferentialGaussian => {
                let mid = (ex.imin + ex.imax) / 2;
                let positive = ex.imax < ex.imin;
                let sigma = if positive {
                    (x[ex.imin] - x[ex.imax]) / 2.0
                } else {
                    (x[ex.imax] - x[ex.imin]) / 2.0
                };
                let area = data[..=mid].iter().sum::<f64>().abs();
                vec![
                    if positive { area } else { -area },
                    x[mid],
                    width_or_unit(sigma),
                    (ex.max + ex.min) / 2.0,
                ]
            }
            ModelKind::DifferentialCauchy => {
                // Extrema of the Lorentzian derivative sit at x0 ± γ/√3 with
                // height 9·amp / (8√3·π·γ²).
                let mid = (ex.imin + ex.imax) / 2;
                let positive = ex.imax < ex.imin;
                let gamma = width_or_unit(3f64.sqrt() * (x[ex.imin] - x[ex.imax]).abs() / 2.0);
                let half = (ex.max - ex.min) / 2.0;
                let amp = half * 8.0 * 3f64.sqrt() * PI * gamma * gamma / 9.0;
                vec![
                    if positive { amp } else { -amp },
                    x[mid],
                    gamma,
                    (ex.max + ex.min) / 2.0,
                ]
            }
        }
    }

    fn fallback_guess(&self) -> Vec<f64> {
        self.descriptors
            .iter()
            .map(|d| match d.name {
                "amp" | "sigma" | "gamma" => 1.0,
                _ => 0.0,
            })
            .collect()
    }

    /// Combine guessed values with parameter metadata.
    ///
    /// Pinned parameters take their pinned value; others are clamped into
    /// their bounds.
    pub fn initial_specs(&self, values: &[f64]) -> Vec<ParamSpec> {
        self.descriptors
            .iter()
            .zip(values)
            .map(|(d, &guess)| {
                let initial = match d.pinned_value() {
                    Some(pinned) => pinned,
                    None => {
                        let lo = d.min.unwrap_or(f64::NEG_INFINITY);
                        let hi = d.max.unwrap_or(f64::INFINITY);
                        guess.max(lo).min(hi)
                    }
                };
                ParamSpec {
                    id: ParamId::new(self.slot, d.name),
                    initial,
                    min: d.min,
                    max: d.max,
                    varies: d.varies,
                }
            })
            .collect()
    }

    /// `Title(name=value±stderr, ...)` in descriptor order.
    pub fn render(&self, params: &FittedParameterSet) -> String {
        let parts: Vec<String> = self
            .descriptors
            .iter()
            .map(|d| {
                let id = ParamId::new(self.slot, d.name);
                match params.get(id) {
                    Some(p) => format!("{}={:.6}±{}", d.name, p.value, fmt_stderr(p.stderr)),
                    None => format!("{}=n/a", d.name),
                }
            })
            .collect();
        format!("{}({})", self.kind.title(), parts.join(", "))
    }
}

/// Produces fresh [`CandidateModel`]s of one kind with a fixed parameter table.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelFactory {
    kind: ModelKind,
    descriptors: Vec<ParameterDescriptor>,
}

impl ModelFactory {
    pub fn new(kind: ModelKind) -> Self {
        Self {
            kind,
            descriptors: kind.descriptors().to_vec(),
        }
    }

    /// A factory whose models carry the given bound overrides.
    ///
    /// Each entry in `limits` must name a parameter of `kind`. Equal bounds pin
    /// the parameter; reversed or non-finite bounds are rejected.
    pub fn with_limits(kind: ModelKind, limits: &Limits) -> Result<Self, MixfitError> {
        Ok(Self {
            kind,
            descriptors: apply_limits(kind, limits)?,
        })
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn descriptors(&self) -> &[ParameterDescriptor] {
        &self.descriptors
    }

    /// A new model namespaced to `slot`.
    pub fn create(&self, slot: usize) -> CandidateModel {
        CandidateModel {
            kind: self.kind,
            slot: Some(slot),
            descriptors: self.descriptors.clone(),
        }
    }
}

/// One unconstrained factory per catalog kind, in default candidate order.
pub fn default_catalog() -> Vec<ModelFactory> {
    ModelKind::ALL.iter().map(|&k| ModelFactory::new(k)).collect()
}

pub(crate) fn fmt_stderr(stderr: Option<f64>) -> String {
    match stderr {
        Some(v) => format!("{v:.6}"),
        None => "n/a".to_string(),
    }
}

fn apply_limits(kind: ModelKind, limits: &Limits) -> Result<Vec<ParameterDescriptor>, MixfitError> {
    let mut descriptors = kind.descriptors().to_vec();

    for (name, &(lo, hi)) in limits {
        let Some(d) = descriptors.iter_mut().find(|d| d.name == name.as_str()) else {
            return Err(MixfitError::configuration(format!(
                "{} has no parameter named '{name}'",
                kind.title()
            )));
        };
        if !lo.is_finite() || !hi.is_finite() {
            return Err(MixfitError::configuration(format!(
                "limits for {}.{name} must be finite",
                kind.title()
            )));
        }
        if lo > hi {
            return Err(MixfitError::configuration(format!(
                "limits for {}.{name} are reversed: min {lo} > max {hi}",
                kind.title()
            )));
        }
        d.min = Some(lo);
        d.max = Some(hi);
        d.varies = lo != hi;
    }

    Ok(descriptors)
}

fn width_or_unit(w: f64) -> f64 {
    if w.is_finite() && w != 0.0 { w } else { 1.0 }
}

/// Location and value of the data extrema (first occurrence) plus the mean.
#[derive(Debug, Clone, Copy)]
struct Extrema {
    len: usize,
    min: f64,
    max: f64,
    imin: usize,
    imax: usize,
    mean: f64,
    center_max: f64,
    center_min: f64,
}

impl Extrema {
    fn of(x: &[f64], data: &[f64]) -> Option<Self> {
        let len = x.len().min(data.len());
        if len == 0 {
            return None;
        }
        let data = &data[..len];

        let (mut imin, mut imax) = (0, 0);
        for (i, &v) in data.iter().enumerate() {
            if v < data[imin] {
                imin = i;
            }
            if v > data[imax] {
                imax = i;
            }
        }

        Some(Self {
            len,
            min: data[imin],
            max: data[imax],
            imin,
            imax,
            mean: data.iter().sum::<f64>() / len as f64,
            center_max: x[imax],
            center_min: x[imin],
        })
    }

    /// `(amp, center, offset)` for a single peak or dip.
    fn peak(&self) -> (f64, f64, f64) {
        let span = self.max - self.min;
        if self.max - self.mean > self.mean - self.min {
            (span, self.center_max, self.min)
        } else {
            (-span, self.center_min, self.max)
        }
    }
}
