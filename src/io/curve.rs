//! Read/write mixture JSON files.
//!
//! Mixture JSON is the portable representation of a fit:
//! - engine settings used for the run
//! - every slot (kind + fitted parameters with standard errors)
//! - chi-square history and stop reason
//! - a precomputed fitted grid for quick plotting elsewhere
//!
//! The schema is defined by `domain::MixtureFile`.

use std::fs::File;
use std::path::Path;

use chrono::Utc;

use crate::data::sample::linspace;
use crate::domain::{
    FitGrid, MixtureFile, OptionsRecord, ParameterRecord, ScanStats, SlotRecord,
};
use crate::error::MixfitError;
use crate::fit::Mixture;

/// Build the serializable view of a fitted mixture.
pub fn mixture_file(
    mixture: &Mixture,
    options: OptionsRecord,
    stats: &ScanStats,
    grid_points: usize,
) -> MixtureFile {
    let slots = mixture
        .slots()
        .iter()
        .map(|slot| SlotRecord {
            kind: slot.model().kind(),
            title: slot.model().kind().title().to_string(),
            parameters: slot
                .params()
                .iter()
                .map(|p| ParameterRecord {
                    name: p.id.to_string(),
                    value: p.value,
                    stderr: p.stderr,
                })
                .collect(),
        })
        .collect();

    let (x0, x1) = if stats.x_max > stats.x_min {
        (stats.x_min, stats.x_max)
    } else {
        (stats.x_min - 0.5, stats.x_min + 0.5)
    };
    let x = linspace(x0, x1, grid_points.max(2));
    let y = mixture.evaluate(&x);

    MixtureFile {
        tool: "mixfit".to_string(),
        generated_at: Utc::now(),
        options,
        slots,
        chi_history: mixture.chi_history().to_vec(),
        stop_reason: mixture.stop_reason(),
        grid: FitGrid { x, y },
    }
}

pub fn write_mixture_json(path: &Path, file: &MixtureFile) -> Result<(), MixfitError> {
    let out = File::create(path).map_err(|e| {
        MixfitError::io(format!("failed to create mixture JSON '{}': {e}", path.display()))
    })?;
    serde_json::to_writer_pretty(out, file)
        .map_err(|e| MixfitError::io(format!("failed to write mixture JSON: {e}")))?;
    Ok(())
}

pub fn read_mixture_json(path: &Path) -> Result<MixtureFile, MixfitError> {
    let file = File::open(path).map_err(|e| {
        MixfitError::io(format!("failed to open mixture JSON '{}': {e}", path.display()))
    })?;
    serde_json::from_reader(file)
        .map_err(|e| MixfitError::input(format!("invalid mixture JSON: {e}")))
}
