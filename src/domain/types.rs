//! Shared domain types.
//!
//! These types are intentionally kept small and serializable so they can be:
//!
//! - used in-memory during fitting
//! - exported to JSON/CSV
//! - rendered in terminal summaries

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize, Serializer};

/// Basis function families a mixture can be built from.
///
/// The declaration order is the default candidate order; it matters because
/// ties in candidate selection go to the earlier kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    Gaussian,
    Constant,
    Linear,
    DifferentialGaussian,
    Cauchy,
    DifferentialCauchy,
}

const GAUSSIAN_PARAMS: [ParameterDescriptor; 4] = [
    ParameterDescriptor::free("amp", "Amplitude"),
    ParameterDescriptor::free("mu", "Most probable value"),
    ParameterDescriptor::free("sigma", "Standard deviation"),
    ParameterDescriptor::free("offset", "Constant offset"),
];

const CAUCHY_PARAMS: [ParameterDescriptor; 4] = [
    ParameterDescriptor::free("amp", "Amplitude"),
    ParameterDescriptor::free("x0", "Most probable value"),
    ParameterDescriptor::free("gamma", "Width"),
    ParameterDescriptor::free("offset", "Constant offset"),
];

const LINEAR_PARAMS: [ParameterDescriptor; 2] = [
    ParameterDescriptor::free("slope", "Slope of linear function"),
    ParameterDescriptor::free(
        "intercept",
        "Position where linear function intercepts the ordinate",
    ),
];

const CONSTANT_PARAMS: [ParameterDescriptor; 1] =
    [ParameterDescriptor::free("offset", "Constant shift")];

impl ModelKind {
    /// Full catalog in default candidate order.
    pub const ALL: [ModelKind; 6] = [
        ModelKind::Gaussian,
        ModelKind::Constant,
        ModelKind::Linear,
        ModelKind::DifferentialGaussian,
        ModelKind::Cauchy,
        ModelKind::DifferentialCauchy,
    ];

    /// Stable identifier used in exports.
    pub fn id(self) -> &'static str {
        match self {
            ModelKind::Gaussian => "GAUSSIAN",
            ModelKind::Constant => "CONSTANT",
            ModelKind::Linear => "LINEAR",
            ModelKind::DifferentialGaussian => "DIFFGAUSSIAN",
            ModelKind::Cauchy => "CAUCHY",
            ModelKind::DifferentialCauchy => "DIFFERENTIALCAUCHY",
        }
    }

    /// Short label used in slot renderings.
    pub fn title(self) -> &'static str {
        match self {
            ModelKind::Gaussian => "Gaussian",
            ModelKind::Constant => "Constant",
            ModelKind::Linear => "Linear",
            ModelKind::DifferentialGaussian => "DiffGaussian",
            ModelKind::Cauchy => "Cauchy",
            ModelKind::DifferentialCauchy => "DiffCauchy",
        }
    }

    /// Default parameter table (unbounded, all varying).
    pub fn descriptors(self) -> &'static [ParameterDescriptor] {
        match self {
            ModelKind::Gaussian | ModelKind::DifferentialGaussian => &GAUSSIAN_PARAMS,
            ModelKind::Cauchy | ModelKind::DifferentialCauchy => &CAUCHY_PARAMS,
            ModelKind::Linear => &LINEAR_PARAMS,
            ModelKind::Constant => &CONSTANT_PARAMS,
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Static metadata for one scalar model parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub varies: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ParameterDescriptor {
    /// An unbounded, varying parameter.
    pub const fn free(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            varies: true,
            min: None,
            max: None,
        }
    }

    /// The fixed value, when both bounds coincide and the parameter does not vary.
    pub fn pinned_value(&self) -> Option<f64> {
        match (self.min, self.max) {
            (Some(lo), Some(hi)) if lo == hi && !self.varies => Some(lo),
            _ => None,
        }
    }
}

/// Per-parameter `(min, max)` overrides, keyed by the un-prefixed parameter name.
pub type Limits = BTreeMap<String, (f64, f64)>;

/// Identifier of a parameter inside a (possibly joint) optimization.
///
/// `slot` is the mixture slot the parameter belongs to; `name` is the
/// un-prefixed parameter name used to look up bounds and vary flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId {
    pub slot: Option<usize>,
    pub name: &'static str,
}

impl ParamId {
    pub fn new(slot: Option<usize>, name: &'static str) -> Self {
        Self { slot, name }
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slot {
            Some(slot) => write!(f, "f{slot}_{}", self.name),
            None => f.write_str(self.name),
        }
    }
}

impl Serialize for ParamId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Initial value and constraints for one parameter handed to a minimizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub id: ParamId,
    pub initial: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub varies: bool,
}

/// One fitted parameter: value and (when estimable) its standard error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FittedParam {
    pub id: ParamId,
    pub value: f64,
    pub stderr: Option<f64>,
}

/// Result of one optimization, in parameter-spec order.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct FittedParameterSet {
    params: Vec<FittedParam>,
}

impl FittedParameterSet {
    pub fn new(params: Vec<FittedParam>) -> Self {
        Self { params }
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FittedParam> {
        self.params.iter()
    }

    pub fn get(&self, id: ParamId) -> Option<&FittedParam> {
        self.params.iter().find(|p| p.id == id)
    }

    pub fn value(&self, id: ParamId) -> Option<f64> {
        self.get(id).map(|p| p.value)
    }

    /// Parameters belonging to one mixture slot, in their original order.
    pub fn for_slot(&self, slot: usize) -> FittedParameterSet {
        FittedParameterSet {
            params: self
                .params
                .iter()
                .filter(|p| p.id.slot == Some(slot))
                .copied()
                .collect(),
        }
    }
}

/// Why the greedy loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The configured iteration cap was reached.
    MaxIterations,
    /// The latest joint refinement increased chi-square; the slot was rolled back.
    Worsened,
    /// Chi-square reached exactly zero.
    PerfectFit,
    /// The latest improvement was below the configured minimum; rolled back.
    InsufficientImprovement,
    /// Chi-square dropped below the configured stop error.
    BelowStopError,
}

impl StopReason {
    /// Whether the most recent slot was removed before returning.
    pub fn rolled_back(self) -> bool {
        matches!(self, StopReason::Worsened | StopReason::InsufficientImprovement)
    }

    pub fn description(self) -> &'static str {
        match self {
            StopReason::MaxIterations => "maximum iterations reached",
            StopReason::Worsened => "last component worsened the fit (rolled back)",
            StopReason::PerfectFit => "perfect fit (chi-square = 0)",
            StopReason::InsufficientImprovement => {
                "improvement below minimum (rolled back)"
            }
            StopReason::BelowStopError => "chi-square below stop error",
        }
    }
}

/// A one-dimensional measurement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Scan {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

/// Summary stats about the samples actually used for fitting.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanStats {
    pub n_points: usize,
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

/// A `--limit` override as understood by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitOverride {
    pub kind: ModelKind,
    pub param: String,
    pub min: f64,
    pub max: f64,
}

/// A full `fit` run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct FitConfig {
    pub input: PathBuf,
    pub models: Vec<ModelKind>,
    pub limits: Vec<LimitOverride>,
    pub max_iterations: Option<usize>,
    pub min_residuum_improvement: Option<f64>,
    pub stop_error: Option<f64>,

    pub export_results: Option<PathBuf>,
    pub export_mixture: Option<PathBuf>,
    /// Number of samples in the exported fitted grid.
    pub grid_points: usize,
}

/// Settings for the synthetic scan generator.
#[derive(Debug, Clone)]
pub struct SynthConfig {
    pub output: PathBuf,
    pub points: usize,
    pub seed: u64,
    /// Standard deviation of the additive Gaussian noise.
    pub noise: f64,
    pub x_min: f64,
    pub x_max: f64,
}

/// Exported fitted parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRecord {
    pub name: String,
    pub value: f64,
    pub stderr: Option<f64>,
}

/// Exported mixture slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotRecord {
    pub kind: ModelKind,
    pub title: String,
    pub parameters: Vec<ParameterRecord>,
}

/// Engine settings recorded alongside an exported mixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionsRecord {
    pub models: Vec<ModelKind>,
    pub max_iterations: Option<usize>,
    pub min_residuum_improvement: Option<f64>,
    pub stop_error: Option<f64>,
}

/// A saved mixture file (JSON).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixtureFile {
    pub tool: String,
    pub generated_at: DateTime<Utc>,
    pub options: OptionsRecord,
    pub slots: Vec<SlotRecord>,
    pub chi_history: Vec<f64>,
    pub stop_reason: Option<StopReason>,
    pub grid: FitGrid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitGrid {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_id_renders_slot_prefix() {
        assert_eq!(ParamId::new(Some(3), "sigma").to_string(), "f3_sigma");
        assert_eq!(ParamId::new(None, "sigma").to_string(), "sigma");
    }

    #[test]
    fn catalog_parameter_counts() {
        assert_eq!(ModelKind::Constant.descriptors().len(), 1);
        assert_eq!(ModelKind::Linear.descriptors().len(), 2);
        for kind in [
            ModelKind::Gaussian,
            ModelKind::Cauchy,
            ModelKind::DifferentialGaussian,
            ModelKind::DifferentialCauchy,
        ] {
            assert_eq!(kind.descriptors().len(), 4);
        }
    }

    #[test]
    fn for_slot_splits_joint_set() {
        let set = FittedParameterSet::new(vec![
            FittedParam { id: ParamId::new(Some(0), "offset"), value: 1.0, stderr: None },
            FittedParam { id: ParamId::new(Some(1), "slope"), value: 2.0, stderr: Some(0.1) },
            FittedParam { id: ParamId::new(Some(1), "intercept"), value: 3.0, stderr: None },
        ]);

        let second = set.for_slot(1);
        assert_eq!(second.len(), 2);
        assert_eq!(second.value(ParamId::new(Some(1), "intercept")), Some(3.0));
        assert!(second.get(ParamId::new(Some(0), "offset")).is_none());
    }

    #[test]
    fn rollback_reasons() {
        assert!(StopReason::Worsened.rolled_back());
        assert!(StopReason::InsufficientImprovement.rolled_back());
        assert!(!StopReason::PerfectFit.rolled_back());
        assert!(!StopReason::BelowStopError.rolled_back());
        assert!(!StopReason::MaxIterations.rolled_back());
    }
}
