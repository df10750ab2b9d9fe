//! Candidate basis-function models.
//!
//! Evaluation formulas live in `math::basis`; this module adds parameter
//! metadata, bound overrides, guess heuristics and slot namespacing.

pub mod model;

pub use model::*;
