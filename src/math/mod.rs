//! Numerical building blocks: basis formulas, linear solves and the LM minimizer.

pub mod basis;
pub mod lm;
pub mod ols;

pub use lm::{LevenbergMarquardt, Minimized, Minimizer};
pub use ols::*;
