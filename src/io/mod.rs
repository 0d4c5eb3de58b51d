//! Input/output helpers.
//!
//! - CSV ingest + validation (`ingest`)
//! - write-once run directories (`artifacts`)
//! - the per-run tables and JSON documents (`export`)

pub mod artifacts;
pub mod export;
pub mod ingest;

pub use artifacts::*;
pub use export::*;
pub use ingest::*;
