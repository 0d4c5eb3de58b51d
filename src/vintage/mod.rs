//! Vintage construction: what was legally knowable at each weekly as-of date.

pub mod builder;

pub use builder::*;
