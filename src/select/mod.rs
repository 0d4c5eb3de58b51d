//! Lag-length selection.
//!
//! - `panel`: per-indicator feature arena over all (quarter, Friday) pairs
//! - `selector`: expanding-window BIC search, full or frozen per quarter
//! - `registry`: the persisted (indicator, period) -> spec mapping
//! - `evaluation`: RMSE, MAE and directional accuracy of a forecast history

pub mod evaluation;
pub mod panel;
pub mod registry;
pub mod selector;

pub use evaluation::*;
pub use panel::*;
pub use registry::*;
pub use selector::*;
