//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the model catalog and parameter metadata (`ModelKind`, `ParameterDescriptor`)
//! - parameter identities and fit outputs (`ParamId`, `FittedParameterSet`)
//! - run configuration and export schemas (`FitConfig`, `MixtureFile`)

pub mod types;

pub use types::*;
