//! Export per-point fit results to CSV.
//!
//! Columns: `x,y,fit,residual` followed by one `slot{i}_{kind}` column per
//! mixture slot holding that slot's contribution.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::domain::Scan;
use crate::error::MixfitError;
use crate::fit::Mixture;

pub fn write_results_csv(path: &Path, scan: &Scan, mixture: &Mixture) -> Result<(), MixfitError> {
    let file = File::create(path).map_err(|e| {
        MixfitError::io(format!("failed to create export CSV '{}': {e}", path.display()))
    })?;
    write_results(BufWriter::new(file), scan, mixture)
}

pub fn write_results<W: Write>(mut out: W, scan: &Scan, mixture: &Mixture) -> Result<(), MixfitError> {
    let write_err = |e: std::io::Error| MixfitError::io(format!("failed to write export CSV: {e}"));

    let fit = mixture.evaluate(&scan.x);
    let components = mixture.components(&scan.x);

    let mut header = String::from("x,y,fit,residual");
    for (i, slot) in mixture.slots().iter().enumerate() {
        header.push_str(&format!(",slot{i}_{}", slot.model().kind().id().to_lowercase()));
    }
    writeln!(out, "{header}").map_err(write_err)?;

    for (i, (&x, &y)) in scan.x.iter().zip(&scan.y).enumerate() {
        let mut row = format!("{x:.10},{y:.10},{:.10},{:.10}", fit[i], y - fit[i]);
        for c in &components {
            row.push_str(&format!(",{:.10}", c[i]));
        }
        writeln!(out, "{row}").map_err(write_err)?;
    }

    out.flush().map_err(write_err)?;
    Ok(())
}
