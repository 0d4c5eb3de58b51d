//! Series transformations applied before vintage construction.
//!
//! `dmean`, `dllog` and `std` use full-sample moments; they are level shifts
//! and rescalings, so they move every vintage's features consistently.

use crate::domain::Transform;
use crate::math::{mean, std_dev};

/// Transform a dense, gap-aware sequence (`None` = missing).
///
/// Log-based transforms of a sequence containing a non-positive value return an
/// all-missing sequence.
pub fn transform_dense(values: &[Option<f64>], transform: Transform) -> Vec<Option<f64>> {
    let observed: Vec<f64> = values.iter().flatten().copied().collect();
    let needs_log = matches!(transform, Transform::Ldiff | Transform::Log | Transform::Dllog);
    if needs_log && observed.iter().any(|v| *v <= 0.0) {
        return vec![None; values.len()];
    }

    match transform {
        Transform::None => values.to_vec(),
        Transform::Diff => diff(values),
        Transform::Ldiff => diff(&map(values, f64::ln)),
        Transform::Log => map(values, f64::ln),
        Transform::Dmean => match mean(&observed) {
            Some(m) => map(values, |v| v - m),
            None => values.to_vec(),
        },
        Transform::Dllog => {
            let logs = map(values, f64::ln);
            let log_obs: Vec<f64> = logs.iter().flatten().copied().collect();
            match mean(&log_obs) {
                Some(m) => map(&logs, |v| v - m),
                None => logs,
            }
        }
        Transform::Std => match (mean(&observed), std_dev(&observed)) {
            (Some(m), Some(s)) if s > 0.0 => map(values, |v| (v - m) / s),
            _ => vec![None; values.len()],
        },
    }
}

fn map(values: &[Option<f64>], f: impl Fn(f64) -> f64) -> Vec<Option<f64>> {
    values.iter().map(|v| v.map(&f)).collect()
}

fn diff(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    out.push(None);
    for w in values.windows(2) {
        out.push(match (w[0], w[1]) {
            (Some(a), Some(b)) => Some(b - a),
            _ => None,
        });
    }
    out.truncate(values.len());
    out
}
