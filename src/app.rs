//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and installs the log subscriber
//! - parses CLI arguments
//! - runs the fit pipeline or the synthetic scan generator
//! - prints reports and writes optional exports

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Command, FitArgs, ShowArgs, SynthArgs};
use crate::domain::{FitConfig, SynthConfig};
use crate::error::MixfitError;

pub mod pipeline;

/// Environment variable holding the log filter (e.g. `MIXFIT_LOG=mixfit=debug`).
pub const LOG_ENV: &str = "MIXFIT_LOG";

/// Entry point for the `mixfit` binary.
pub fn run() -> Result<(), MixfitError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = crate::cli::Cli::parse();
    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Synth(args) => handle_synth(args),
        Command::Show(args) => handle_show(args),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    // A subscriber may already be installed when embedded; that is fine.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn handle_fit(args: FitArgs) -> Result<(), MixfitError> {
    let config = fit_config_from_args(&args);
    let run = pipeline::run_fit(&config)?;

    println!(
        "{}",
        crate::report::format_run_summary(&run.ingest, &run.mixture, &config)
    );

    if let Some(path) = &config.export_results {
        crate::io::export::write_results_csv(path, &run.ingest.scan, &run.mixture)?;
        info!(path = %path.display(), "wrote per-point results");
    }
    if let Some(path) = &config.export_mixture {
        let file = crate::io::curve::mixture_file(
            &run.mixture,
            run.options.clone(),
            &run.ingest.stats,
            config.grid_points,
        );
        crate::io::curve::write_mixture_json(path, &file)?;
        info!(path = %path.display(), "wrote mixture JSON");
    }

    Ok(())
}

fn handle_synth(args: SynthArgs) -> Result<(), MixfitError> {
    let config = synth_config_from_args(&args);
    let scan = crate::data::sample::demo_scan(&config)?;
    crate::io::ingest::write_scan(&config.output, &scan)?;
    println!(
        "Wrote {} points to {} (seed {}, noise {})",
        scan.x.len(),
        config.output.display(),
        config.seed,
        config.noise
    );
    Ok(())
}

fn handle_show(args: ShowArgs) -> Result<(), MixfitError> {
    let file = crate::io::curve::read_mixture_json(&args.mixture)?;
    println!("{}", crate::report::format_mixture_file(&file));
    Ok(())
}

pub fn fit_config_from_args(args: &FitArgs) -> FitConfig {
    FitConfig {
        input: args.input.clone(),
        models: pipeline::resolve_models(&args.models),
        limits: args.limits.clone(),
        max_iterations: args.max_iterations,
        min_residuum_improvement: args.min_improvement,
        stop_error: args.stop_error,
        export_results: args.export.clone(),
        export_mixture: args.export_mixture.clone(),
        grid_points: args.grid_points,
    }
}

pub fn synth_config_from_args(args: &SynthArgs) -> SynthConfig {
    SynthConfig {
        output: args.output.clone(),
        points: args.points,
        seed: args.seed,
        noise: args.noise,
        x_min: args.x_min,
        x_max: args.x_max,
    }
}
