//! Mixture fitting orchestration.
//!
//! Responsibilities:
//!
//! - hold the accumulated mixture and its chi-square history (`mixture`)
//! - decide when to stop or roll back (`stopping`)
//! - run the greedy add-then-refine loop (`fitter`)

pub mod fitter;
pub mod mixture;
pub mod stopping;

pub use fitter::*;
pub use mixture::*;
pub use stopping::*;
