//! Command-line parsing for the mixture fitter.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! fitting code. Everything here turns into `domain` configuration types.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::domain::{LimitOverride, ModelKind};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "mixfit", version, about = "Greedy mixture-model fitting for 1-D scans")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit a mixture to a scan CSV, print the summary, and optionally export.
    Fit(FitArgs),
    /// Write a seeded synthetic multi-line scan to CSV.
    Synth(SynthArgs),
    /// Print a previously exported mixture JSON.
    Show(ShowArgs),
}

#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Scan CSV with `x,y` columns.
    #[arg(short = 'i', long, value_name = "CSV")]
    pub input: PathBuf,

    /// Candidate models in selection order (default: all).
    #[arg(short = 'm', long, value_enum, value_delimiter = ',')]
    pub models: Vec<ModelKind>,

    /// Parameter bounds, e.g. `gaussian.sigma=0.5:3`; a single value pins the parameter.
    #[arg(long = "limit", value_name = "KIND.PARAM=MIN:MAX", value_parser = parse_limit)]
    pub limits: Vec<LimitOverride>,

    /// Maximum number of mixture slots.
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Roll back the last slot if chi-square improved by less than this.
    #[arg(long = "min-improvement")]
    pub min_improvement: Option<f64>,

    /// Stop once chi-square drops below this.
    #[arg(long)]
    pub stop_error: Option<f64>,

    /// Export per-point results (fit, residual, components) to CSV.
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Export the mixture (slots + params + fitted grid) to JSON.
    #[arg(long = "export-mixture")]
    pub export_mixture: Option<PathBuf>,

    /// Samples in the exported fitted grid.
    #[arg(long, default_value_t = 201)]
    pub grid_points: usize,
}

#[derive(Debug, Parser, Clone)]
pub struct SynthArgs {
    /// Output CSV path.
    #[arg(short = 'o', long, value_name = "CSV")]
    pub output: PathBuf,

    #[arg(short = 'n', long, default_value_t = 200)]
    pub points: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Standard deviation of additive Gaussian noise.
    #[arg(long, default_value_t = 0.015)]
    pub noise: f64,

    #[arg(long, default_value_t = -10.0, allow_negative_numbers = true)]
    pub x_min: f64,

    #[arg(long, default_value_t = 10.0, allow_negative_numbers = true)]
    pub x_max: f64,
}

#[derive(Debug, Parser, Clone)]
pub struct ShowArgs {
    /// Mixture JSON produced by `mixfit fit --export-mixture`.
    #[arg(long, value_name = "JSON")]
    pub mixture: PathBuf,
}

/// Parse `kind.param=min:max` (or `kind.param=value` to pin).
pub fn parse_limit(s: &str) -> Result<LimitOverride, String> {
    let (target, range) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KIND.PARAM=MIN:MAX, got '{s}'"))?;
    let (kind, param) = target
        .split_once('.')
        .ok_or_else(|| format!("expected KIND.PARAM before '=', got '{target}'"))?;
    let kind = ModelKind::from_str(kind.trim(), true)
        .map_err(|_| format!("unknown model kind '{kind}'"))?;

    let number = |v: &str| -> Result<f64, String> {
        let parsed: f64 = v
            .trim()
            .parse()
            .map_err(|_| format!("'{v}' is not a number"))?;
        if parsed.is_finite() {
            Ok(parsed)
        } else {
            Err(format!("'{v}' is not finite"))
        }
    };
    let (min, max) = match range.split_once(':') {
        Some((lo, hi)) => (number(lo)?, number(hi)?),
        None => {
            let v = number(range)?;
            (v, v)
        }
    };

    Ok(LimitOverride {
        kind,
        param: param.trim().to_string(),
        min,
        max,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_parses_range_and_pin() {
        let l = parse_limit("gaussian.sigma=0.5:3").unwrap();
        assert_eq!(l.kind, ModelKind::Gaussian);
        assert_eq!(l.param, "sigma");
        assert_eq!((l.min, l.max), (0.5, 3.0));

        let l = parse_limit("differential-cauchy.gamma=-1:2").unwrap();
        assert_eq!(l.kind, ModelKind::DifferentialCauchy);
        assert_eq!((l.min, l.max), (-1.0, 2.0));

        let l = parse_limit("Constant.offset=5.5").unwrap();
        assert_eq!((l.min, l.max), (5.5, 5.5));
    }

    #[test]
    fn limit_rejects_malformed_input() {
        assert!(parse_limit("gaussian.sigma").is_err());
        assert!(parse_limit("sigma=1:2").is_err());
        assert!(parse_limit("spline.k=1:2").is_err());
        assert!(parse_limit("gaussian.sigma=a:2").is_err());
        assert!(parse_limit("gaussian.sigma=inf:2").is_err());
    }

    #[test]
    fn fit_args_parse_model_list() {
        let cli = Cli::try_parse_from([
            "mixfit",
            "fit",
            "--input",
            "scan.csv",
            "--models",
            "gaussian,differential-cauchy",
            "--limit",
            "gaussian.sigma=3:20",
            "--stop-error",
            "0.05",
        ])
        .unwrap();

        let Command::Fit(args) = cli.command else {
            panic!("expected fit subcommand");
        };
        assert_eq!(args.models, vec![ModelKind::Gaussian, ModelKind::DifferentialCauchy]);
        assert_eq!(args.limits.len(), 1);
        assert_eq!(args.stop_error, Some(0.05));
        assert_eq!(args.max_iterations, None);
    }

    #[test]
    fn synth_accepts_negative_range() {
        let cli = Cli::try_parse_from(["mixfit", "synth", "-o", "out.csv", "--x-min", "-5", "--x-max", "-1"])
            .unwrap();
        let Command::Synth(args) = cli.command else {
            panic!("expected synth subcommand");
        };
        assert_eq!((args.x_min, args.x_max), (-5.0, -1.0));
    }
}
