//! Scan CSV ingest.
//!
//! A scan file holds two numeric columns, `x` and `y`:
//!
//! - the header row is optional; when present, `x`/`y` columns are located by
//!   name (case-insensitive), otherwise the first two columns are used
//! - lines starting with `#` are comments
//! - rows that fail to parse are skipped and reported, not fatal
//! - zero usable rows is an input error

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use csv::StringRecord;

use crate::domain::{Scan, ScanStats};
use crate::error::MixfitError;

/// A row-level problem encountered during ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub line: u64,
    pub message: String,
}

/// Ingest output: usable samples + stats + skipped rows.
#[derive(Debug, Clone)]
pub struct IngestedScan {
    pub scan: Scan,
    pub stats: ScanStats,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
    pub rows_used: usize,
}

pub fn load_scan(path: &Path) -> Result<IngestedScan, MixfitError> {
    let file = File::open(path)
        .map_err(|e| MixfitError::io(format!("failed to open scan '{}': {e}", path.display())))?;
    read_scan(file)
}

pub fn read_scan<R: Read>(input: R) -> Result<IngestedScan, MixfitError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(input);

    let mut columns = (0usize, 1usize);
    let mut scan = Scan::default();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                rows_read += 1;
                row_errors.push(RowError {
                    line: e.position().map_or(0, |p| p.line()),
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };
        let line = record.position().map_or(idx as u64 + 1, |p| p.line());

        if idx == 0 {
            if let Some(found) = header_columns(&record) {
                columns = found;
                continue;
            }
        }
        rows_read += 1;

        match parse_row(&record, columns) {
            Ok((x, y)) => {
                scan.x.push(x);
                scan.y.push(y);
            }
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    let rows_used = scan.x.len();
    let Some(stats) = compute_stats(&scan) else {
        return Err(MixfitError::input("no usable (x, y) rows in scan"));
    };

    Ok(IngestedScan {
        scan,
        stats,
        row_errors,
        rows_read,
        rows_used,
    })
}

/// Write a scan as `x,y` CSV with a header row.
pub fn write_scan(path: &Path, scan: &Scan) -> Result<(), MixfitError> {
    let file = File::create(path)
        .map_err(|e| MixfitError::io(format!("failed to create '{}': {e}", path.display())))?;
    let mut w = BufWriter::new(file);

    let write_err = |e: std::io::Error| MixfitError::io(format!("failed to write scan: {e}"));
    writeln!(w, "x,y").map_err(write_err)?;
    for (x, y) in scan.x.iter().zip(&scan.y) {
        writeln!(w, "{x},{y}").map_err(write_err)?;
    }
    w.flush().map_err(write_err)?;
    Ok(())
}

/// Column indices of `x` and `y` when `record` is a header row.
///
/// A row is a header when it names both `x` and `y`, or when none of its
/// fields is a number. Anything else is data, even if some fields are bad.
fn header_columns(record: &StringRecord) -> Option<(usize, usize)> {
    let find = |name: &str| record.iter().position(|f| strip_bom(f).eq_ignore_ascii_case(name));
    if let (Some(x), Some(y)) = (find("x"), find("y")) {
        return Some((x, y));
    }
    if record.iter().any(|f| strip_bom(f).parse::<f64>().is_ok()) {
        return None;
    }
    Some((0, 1))
}

fn strip_bom(field: &str) -> &str {
    field.trim_start_matches('\u{feff}')
}

fn parse_row(record: &StringRecord, (xi, yi): (usize, usize)) -> Result<(f64, f64), String> {
    let field = |i: usize, name: &str| -> Result<f64, String> {
        let raw = record
            .get(i)
            .map(strip_bom)
            .ok_or_else(|| format!("missing {name} column"))?;
        let v: f64 = raw
            .parse()
            .map_err(|_| format!("{name} is not a number: '{raw}'"))?;
        if !v.is_finite() {
            return Err(format!("{name} is not finite: '{raw}'"));
        }
        Ok(v)
    };
    Ok((field(xi, "x")?, field(yi, "y")?))
}

pub fn compute_stats(scan: &Scan) -> Option<ScanStats> {
    if scan.x.is_empty() {
        return None;
    }
    let fold = |v: &[f64]| {
        v.iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| (lo.min(x), hi.max(x)))
    };
    let (x_min, x_max) = fold(&scan.x);
    let (y_min, y_max) = fold(&scan.y);
    Some(ScanStats {
        n_points: scan.x.len(),
        x_min,
        x_max,
        y_min,
        y_max,
    })
}
