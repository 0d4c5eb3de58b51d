//! Pseudo-real-time vintage construction.
//!
//! For a target quarter we step through every Friday from the quarter's first
//! to its last calendar day. At each Friday `T` and for each indicator `v`:
//!
//! ```text
//! release(m)                = month_end(m) + lag_days(v)
//! last_available_month(v,T) = max { m observed : release(m) <= T }
//! horizon_months            = months from last_available_month to the quarter's last month
//! ```
//!
//! Because `release` is increasing in `m`, the latest admissible month is found
//! directly from `T - lag_days`. Knowledge is cumulative: a later Friday can
//! only add months, never remove them.

use std::collections::BTreeMap;

use chrono::{NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::calendar::CalendarAvailabilityModel;
use crate::domain::{IndicatorAvailability, Month, Quarter, Vintage, fridays_between};
use crate::features::MonthlySeries;

/// All vintages of one target quarter, in Friday order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VintageSnapshot {
    pub quarter: Quarter,
    pub vintages: Vec<Vintage>,
}

impl VintageSnapshot {
    pub fn at(&self, friday_index: usize) -> Option<&Vintage> {
        self.vintages.get(friday_index)
    }
}

pub struct VintageBuilder<'a> {
    calendar: &'a CalendarAvailabilityModel,
    monthly: &'a BTreeMap<String, MonthlySeries>,
}

impl<'a> VintageBuilder<'a> {
    pub fn new(
        calendar: &'a CalendarAvailabilityModel,
        monthly: &'a BTreeMap<String, MonthlySeries>,
    ) -> Self {
        Self { calendar, monthly }
    }

    /// Build one vintage per Friday of `quarter`.
    pub fn build_quarter(&self, quarter: Quarter) -> VintageSnapshot {
        let vintages = fridays_between(quarter.first_day(), quarter.end())
            .into_iter()
            .enumerate()
            .map(|(friday_index, as_of)| self.build(quarter, friday_index, as_of))
            .collect();
        VintageSnapshot { quarter, vintages }
    }

    pub fn build(&self, quarter: Quarter, friday_index: usize, as_of: NaiveDate) -> Vintage {
        let availability = self
            .monthly
            .iter()
            .map(|(id, series)| (id.clone(), self.availability(id, series, quarter, as_of)))
            .collect();
        Vintage {
            quarter,
            as_of,
            friday_index,
            availability,
        }
    }

    pub fn availability(
        &self,
        indicator: &str,
        series: &MonthlySeries,
        quarter: Quarter,
        as_of: NaiveDate,
    ) -> IndicatorAvailability {
        let last = last_available_month(series, self.calendar.lag_days(indicator), as_of);
        IndicatorAvailability {
            last_available_month: last,
            horizon_months: last.map(|m| m.months_until(quarter.last_month())),
        }
    }
}

/// Latest observed month of `series` whose release date is on or before `as_of`.
pub fn last_available_month(series: &MonthlySeries, lag_days: i64, as_of: NaiveDate) -> Option<Month> {
    let cutoff = latest_released_month(lag_days, as_of)?;
    series.latest_at_or_before(cutoff)
}

/// Latest calendar month `m` with `month_end(m) + lag_days <= as_of`.
fn latest_released_month(lag_days: i64, as_of: NaiveDate) -> Option<Month> {
    let shifted = as_of.checked_sub_signed(TimeDelta::try_days(lag_days)?)?;
    let month = Month::from_date(shifted);
    if month.end() <= shifted {
        Some(month)
    } else {
        Some(month.offset(-1))
    }
}
