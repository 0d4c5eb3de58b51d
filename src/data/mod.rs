//! Demo data.

pub mod synthetic;

pub use synthetic::{SynthConfig, SyntheticData, SyntheticFiles, generate, write_csvs};
