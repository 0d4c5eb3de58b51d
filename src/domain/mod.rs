//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - calendar periods (`Month`, `Quarter`) and the Friday cadence
//! - reference data (`Indicator`, `ReleaseCalendarEntry`)
//! - stage outputs (`Vintage`, `ModelSpec`, `ForecastRecord`, `CombinationResult`)
//! - run configuration (`NowcastConfig`)

pub mod period;
pub mod types;

pub use period::*;
pub use types::*;
