//! `mixfit` library crate.
//!
//! Greedy stepwise fitting of additive basis-function mixtures to 1-D scans.
//! The binary (`mixfit`) is a thin wrapper around this library so that:
//!
//! - the engine is testable without spawning processes
//! - other tools can embed `fit::Mixfit` directly
//!
//! ```no_run
//! use mixfit::fit::{Mixfit, MixfitOptions};
//!
//! # fn demo(x: &[f64], y: &[f64]) -> Result<(), mixfit::error::MixfitError> {
//! let engine = Mixfit::new(MixfitOptions {
//!     stop_error: Some(0.05),
//!     ..MixfitOptions::default()
//! })?;
//! let mixture = engine.fit(x, y)?;
//! println!("{mixture}");
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
