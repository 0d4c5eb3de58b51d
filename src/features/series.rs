//! In-memory time series keyed by calendar period.
//!
//! Series are loaded once before selection begins and shared read-only across
//! indicator tasks. Missing observations are simply absent from the map.

use std::collections::BTreeMap;

use crate::domain::{Month, Quarter, Transform};
use crate::features::transform::transform_dense;

/// One monthly indicator, keyed by month (observations dated at month end).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonthlySeries {
    values: BTreeMap<Month, f64>,
}

impl MonthlySeries {
    /// Build from `(month, value)` pairs; non-finite values are treated as missing.
    pub fn from_points(points: impl IntoIterator<Item = (Month, f64)>) -> Self {
        Self {
            values: points.into_iter().filter(|(_, v)| v.is_finite()).collect(),
        }
    }

    pub fn get(&self, month: Month) -> Option<f64> {
        self.values.get(&month).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn first_month(&self) -> Option<Month> {
        self.values.keys().next().copied()
    }

    pub fn last_month(&self) -> Option<Month> {
        self.values.keys().next_back().copied()
    }

    /// Latest observed month that is not after `cutoff`.
    pub fn latest_at_or_before(&self, cutoff: Month) -> Option<Month> {
        self.values.range(..=cutoff).next_back().map(|(m, _)| *m)
    }

    /// Observations in `[from, to]`, oldest first. Never yields anything after `to`.
    pub fn window(&self, from: Month, to: Month) -> impl Iterator<Item = (Month, f64)> + '_ {
        let from = from.min(to);
        self.values.range(from..=to).map(|(m, v)| (*m, *v))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Month, f64)> + '_ {
        self.values.iter().map(|(m, v)| (*m, *v))
    }

    /// Apply `transform` over the dense month grid from first to last observation.
    pub fn transformed(&self, transform: Transform) -> Self {
        let (Some(first), Some(last)) = (self.first_month(), self.last_month()) else {
            return self.clone();
        };
        let months: Vec<Month> = (0..=first.months_until(last)).map(|i| first.offset(i)).collect();
        let dense: Vec<Option<f64>> = months.iter().map(|m| self.get(*m)).collect();
        let out = transform_dense(&dense, transform);
        Self::from_points(
            months
                .into_iter()
                .zip(out)
                .filter_map(|(m, v)| v.map(|v| (m, v))),
        )
    }
}

/// The quarterly target, one value per quarter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuarterlySeries {
    values: BTreeMap<Quarter, f64>,
}

impl QuarterlySeries {
    pub fn from_points(points: impl IntoIterator<Item = (Quarter, f64)>) -> Self {
        Self {
            values: points.into_iter().filter(|(_, v)| v.is_finite()).collect(),
        }
    }

    pub fn get(&self, quarter: Quarter) -> Option<f64> {
        self.values.get(&quarter).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn first_quarter(&self) -> Option<Quarter> {
        self.values.keys().next().copied()
    }

    pub fn last_quarter(&self) -> Option<Quarter> {
        self.values.keys().next_back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Quarter, f64)> + '_ {
        self.values.iter().map(|(q, v)| (*q, *v))
    }

    pub fn transformed(&self, transform: Transform) -> Self {
        let (Some(first), Some(last)) = (self.first_quarter(), self.last_quarter()) else {
            return self.clone();
        };
        let quarters = first.range_inclusive(last);
        let dense: Vec<Option<f64>> = quarters.iter().map(|q| self.get(*q)).collect();
        let out = transform_dense(&dense, transform);
        Self::from_points(
            quarters
                .into_iter()
                .zip(out)
                .filter_map(|(q, v)| v.map(|v| (q, v))),
        )
    }
}

/// All inputs of a run: monthly indicators (by id) and the quarterly target.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub monthly: BTreeMap<String, MonthlySeries>,
    pub target: QuarterlySeries,
}
