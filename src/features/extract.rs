//! Ragged-edge feature extraction.
//!
//! A feature vector for lag count `K` holds the `K` most recent monthly values
//! ending at the vintage's last available month:
//!
//! ```text
//! position 0     -> last_available_month
//! position i     -> last_available_month - i months
//! ```
//!
//! The vector always has exactly `K` entries. Months that predate the series
//! or are missing inside it stay `None`; the padding therefore sits at the
//! oldest positions.
//!
//! Reads are bounded above by `last_available_month`. This is the one place
//! that stops later observations from leaking into a vintage.

use crate::domain::Month;
use crate::features::series::MonthlySeries;

/// Fixed-length lag vector; `None` marks a missing regressor.
pub type FeatureVector = Vec<Option<f64>>;

/// Extract `k` lags of `series` ending at `last_available`, most recent first.
pub fn extract(series: &MonthlySeries, last_available: Option<Month>, k: usize) -> FeatureVector {
    let mut out = vec![None; k];
    let Some(last) = last_available else {
        return out;
    };
    if k == 0 {
        return out;
    }

    let oldest = last.offset(-(k as i64 - 1));
    for (month, value) in series.window(oldest, last) {
        let pos = month.months_until(last);
        if let Ok(pos) = usize::try_from(pos) {
            if pos < k {
                out[pos] = Some(value);
            }
        }
    }
    out
}

/// `true` when every position is observed.
pub fn is_complete(features: &[Option<f64>]) -> bool {
    features.iter().all(Option::is_some)
}
