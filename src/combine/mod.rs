//! Trimming, weighting and combining per-model forecasts.

pub mod combiner;
pub mod trim;
pub mod weights;

pub use combiner::*;
pub use trim::*;
pub use weights::*;
