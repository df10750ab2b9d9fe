//! Input/output helpers.
//!
//! - scan CSV ingest + validation (`ingest`)
//! - per-point result export (`export`)
//! - mixture JSON read/write (`curve`)

pub mod curve;
pub mod export;
pub mod ingest;

pub use curve::*;
pub use export::*;
pub use ingest::*;
