//! Per-indicator evaluation panel.
//!
//! The lag search visits every (quarter, Friday) pair once per candidate `K`.
//! Rather than re-extracting features on each visit we extract once at the
//! largest `K` into a flat arena and hand out prefixes:
//!
//! ```text
//! slot(t, f)        = offsets[t] + f
//! features(t, f, K) = cells[slot * max_k .. slot * max_k + K]
//! ```
//!
//! Taking a prefix is exact because position `i` always means
//! `last_available_month - i` regardless of `K`.
//!
//! Lagged targets are stored per slot as well: `y(t-j)` is visible at a
//! Friday only once `quarter_end(t-j) + target_lag_days` has passed.

use chrono::{NaiveDate, TimeDelta};

use crate::domain::Quarter;
use crate::features::{MonthlySeries, QuarterlySeries, extract};
use crate::vintage::VintageSnapshot;

#[derive(Debug, Clone)]
pub struct IndicatorPanel {
    indicator: String,
    quarters: Vec<Quarter>,
    actuals: Vec<Option<f64>>,
    as_of: Vec<Vec<NaiveDate>>,
    offsets: Vec<usize>,
    max_k: usize,
    cells: Vec<Option<f64>>,
    ar_lags: usize,
    ar_cells: Vec<Option<f64>>,
}

impl IndicatorPanel {
    /// Build the panel for `indicator` over the quarters covered by `snapshots`.
    ///
    /// `snapshots` must be in chronological order.
    pub fn build(
        indicator: &str,
        series: &MonthlySeries,
        target: &QuarterlySeries,
        snapshots: &[VintageSnapshot],
        max_k: usize,
        ar_lags: usize,
        target_lag_days: i64,
    ) -> Self {
        let mut quarters = Vec::with_capacity(snapshots.len());
        let mut actuals = Vec::with_capacity(snapshots.len());
        let mut as_of = Vec::with_capacity(snapshots.len());
        let mut offsets = Vec::with_capacity(snapshots.len());

        let slots: usize = snapshots.iter().map(|s| s.vintages.len()).sum();
        let mut cells = Vec::with_capacity(slots * max_k);
        let mut ar_cells = Vec::with_capacity(slots * ar_lags);

        let mut next_slot = 0;
        for snapshot in snapshots {
            let q = snapshot.quarter;
            quarters.push(q);
            actuals.push(target.get(q));
            offsets.push(next_slot);
            next_slot += snapshot.vintages.len();

            as_of.push(snapshot.vintages.iter().map(|v| v.as_of).collect());
            for vintage in &snapshot.vintages {
                let last = vintage.availability_of(indicator).last_available_month;
                cells.extend(extract(series, last, max_k));
                ar_cells.extend((1..=ar_lags).map(|lag| {
                    let earlier = q.offset(-(lag as i64));
                    target_released(earlier, target_lag_days, vintage.as_of)
                        .then(|| target.get(earlier))
                        .flatten()
                }));
            }
        }

        Self {
            indicator: indicator.to_string(),
            quarters,
            actuals,
            as_of,
            offsets,
            max_k,
            cells,
            ar_lags,
            ar_cells,
        }
    }

    pub fn indicator(&self) -> &str {
        &self.indicator
    }

    /// Number of quarters in the panel.
    pub fn len(&self) -> usize {
        self.quarters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quarters.is_empty()
    }

    pub fn max_k(&self) -> usize {
        self.max_k
    }

    pub fn quarters(&self) -> &[Quarter] {
        &self.quarters
    }

    pub fn quarter(&self, t: usize) -> Option<Quarter> {
        self.quarters.get(t).copied()
    }

    pub fn quarter_index(&self, quarter: Quarter) -> Option<usize> {
        self.quarters.binary_search(&quarter).ok()
    }

    /// Realized target value of quarter `t`, if known.
    pub fn actual(&self, t: usize) -> Option<f64> {
        self.actuals.get(t).copied().flatten()
    }

    pub fn friday_count(&self, t: usize) -> usize {
        self.as_of.get(t).map_or(0, Vec::len)
    }

    pub fn max_fridays(&self) -> usize {
        self.as_of.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn as_of(&self, t: usize, f: usize) -> Option<NaiveDate> {
        self.as_of.get(t)?.get(f).copied()
    }

    /// Total number of (quarter, Friday) slots.
    pub fn slot_count(&self) -> usize {
        self.offsets
            .last()
            .map_or(0, |last| last + self.friday_count(self.len() - 1))
    }

    pub fn slot(&self, t: usize, f: usize) -> Option<usize> {
        (f < self.friday_count(t)).then(|| self.offsets[t] + f)
    }

    /// The first `k` lags at (quarter `t`, Friday `f`), most recent first.
    pub fn features(&self, t: usize, f: usize, k: usize) -> Option<&[Option<f64>]> {
        if k > self.max_k {
            return None;
        }
        let start = self.slot(t, f)? * self.max_k;
        Some(&self.cells[start..start + k])
    }

    /// Lagged target values visible at (quarter `t`, Friday `f`):
    /// `[y(t-1), y(t-2), ...]`, `None` where not yet published.
    pub fn ar_values(&self, t: usize, f: usize) -> &[Option<f64>] {
        let Some(slot) = self.slot(t, f) else {
            return &[];
        };
        let start = slot * self.ar_lags;
        self.ar_cells.get(start..start + self.ar_lags).unwrap_or(&[])
    }
}

/// Whether `quarter`'s target value is published by `as_of`.
fn target_released(quarter: Quarter, lag_days: i64, as_of: NaiveDate) -> bool {
    TimeDelta::try_days(lag_days)
        .and_then(|lag| quarter.end().checked_add_signed(lag))
        .is_some_and(|release| release <= as_of)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::CalendarAvailabilityModel;
    use crate::domain::Month;
    use crate::vintage::VintageBuilder;
    use std::collections::BTreeMap;

    fn m(y: i32, mo: u32) -> Month {
        Month::new(y, mo).unwrap()
    }

    fn q(y: i32, n: u32) -> Quarter {
        Quarter::new(y, n).unwrap()
    }

    fn d(y: i32, mo: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, mo, day).unwrap()
    }

    fn panel_over(
        first: Quarter,
        last: Quarter,
        max_k: usize,
        ar_lags: usize,
        target_lag_days: i64,
    ) -> IndicatorPanel {
        let series = MonthlySeries::from_points((0..36).map(|i| (m(2022, 1).offset(i), i as f64)));
        let target = QuarterlySeries::from_points(
            q(2022, 1)
                .range_inclusive(q(2024, 4))
                .into_iter()
                .enumerate()
                .map(|(i, q)| (q, 100.0 + i as f64)),
        );
        let mut monthly = BTreeMap::new();
        monthly.insert("X".to_string(), series.clone());
        let cal = CalendarAvailabilityModel::new(&[], 10);
        let builder = VintageBuilder::new(&cal, &monthly);
        let snaps: Vec<_> = first
            .range_inclusive(last)
            .into_iter()
            .map(|q| builder.build_quarter(q))
            .collect();
        IndicatorPanel::build("X", &series, &target, &snaps, max_k, ar_lags, target_lag_days)
    }

    fn panel(max_k: usize, ar_lags: usize) -> IndicatorPanel {
        panel_over(q(2023, 1), q(2023, 4), max_k, ar_lags, 25)
    }

    #[test]
    fn prefix_matches_direct_extraction() {
        let p = panel(6, 0);
        for t in 0..p.len() {
            for f in 0..p.friday_count(t) {
                let full = p.features(t, f, 6).unwrap().to_vec();
                for k in 0..=6 {
                    assert_eq!(p.features(t, f, k).unwrap(), &full[..k]);
                }
            }
        }
        assert!(p.features(0, 0, 7).is_none());
        assert!(p.features(0, 99, 1).is_none());
    }

    #[test]
    fn slots_are_contiguous() {
        let p = panel(3, 0);
        let mut expected = 0;
        for t in 0..p.len() {
            for f in 0..p.friday_count(t) {
                assert_eq!(p.slot(t, f), Some(expected));
                expected += 1;
            }
        }
        assert_eq!(p.slot_count(), expected);
    }

    #[test]
    fn ar_values_are_previous_quarters_once_released() {
        let p = panel(2, 2);
        // 2023Q1 is the 5th quarter of the target (index 4 -> 104).
        assert_eq!(p.actual(0), Some(104.0));
        // Fridays of 2023Q1: Jan 6, 13, 20, 27. 2022Q4 is published on Jan 25.
        assert_eq!(p.as_of(0, 2), Some(d(2023, 1, 20)));
        assert_eq!(p.ar_values(0, 2), &[None, Some(102.0)]);
        assert_eq!(p.ar_values(0, 3), &[Some(103.0), Some(102.0)]);
        let last = p.friday_count(3) - 1;
        assert_eq!(p.ar_values(3, last), &[Some(106.0), Some(105.0)]);
        assert!(p.ar_values(0, 99).is_empty());
        assert_eq!(p.quarter_index(q(2023, 3)), Some(2));
        assert_eq!(p.quarter(2), Some(q(2023, 3)));
        assert_eq!(p.quarter(4), None);
    }

    #[test]
    fn first_friday_of_quarter_cannot_see_last_quarter() {
        let p = panel_over(q(2023, 4), q(2024, 1), 2, 1, 25);
        assert_eq!(p.as_of(1, 0), Some(d(2024, 1, 5)));
        assert_eq!(p.ar_values(1, 0), &[None]);

        // Without a publication lag the quarter is known from its last day.
        let p = panel_over(q(2023, 4), q(2024, 1), 2, 1, 0);
        assert_eq!(p.ar_values(1, 0), &[Some(107.0)]);
    }

    #[test]
    fn out_of_range_target_lag_hides_every_lag() {
        let p = panel_over(q(2023, 1), q(2023, 1), 2, 1, i64::MAX);
        let last = p.friday_count(0) - 1;
        assert_eq!(p.ar_values(0, last), &[None]);
    }
}
