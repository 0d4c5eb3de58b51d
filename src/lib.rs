//! `midas-nowcast` library crate.
//!
//! The binary (`nowcast`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - each pipeline stage (vintages, selection, forecasting, combination) is reusable
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod calendar;
pub mod cli;
pub mod combine;
pub mod data;
pub mod domain;
pub mod error;
pub mod features;
pub mod forecast;
pub mod io;
pub mod math;
pub mod news;
pub mod report;
pub mod select;
pub mod vintage;
