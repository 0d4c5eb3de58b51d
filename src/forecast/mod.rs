//! Forecasting with fixed model specs.

pub mod engine;
pub mod producer;

pub use engine::*;
pub use producer::*;
