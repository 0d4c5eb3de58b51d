//! Publication-lag lookup.
//!
//! The release calendar maps an indicator code to an approximate lag in days
//! between a month's end and the publication of that month's value. Lookups
//! never fail: exact match first, then a case- and punctuation-insensitive
//! alias match, then the configured default lag.

use std::collections::HashMap;

use chrono::{NaiveDate, TimeDelta};
use tracing::debug;

use crate::domain::{Indicator, Month, ReleaseCalendarEntry};

/// Lag used when neither the calendar nor the CLI provides one: available at month end.
pub const DEFAULT_LAG_DAYS: i64 = 0;

/// Largest publication lag accepted from a calendar file or the command line.
pub const MAX_LAG_DAYS: i64 = 3650;

#[derive(Debug, Clone)]
pub struct CalendarAvailabilityModel {
    exact: HashMap<String, i64>,
    folded: HashMap<String, i64>,
    default_lag_days: i64,
}

impl CalendarAvailabilityModel {
    pub fn new(entries: &[ReleaseCalendarEntry], default_lag_days: i64) -> Self {
        let mut exact = HashMap::with_capacity(entries.len());
        let mut folded = HashMap::with_capacity(entries.len());
        for entry in entries {
            exact.insert(entry.indicator.clone(), entry.lag_days);
            folded
                .entry(fold_alias(&entry.indicator))
                .or_insert(entry.lag_days);
        }
        Self {
            exact,
            folded,
            default_lag_days,
        }
    }

    pub fn default_lag_days(&self) -> i64 {
        self.default_lag_days
    }

    /// Publication lag in days for `indicator`.
    pub fn lag_days(&self, indicator: &str) -> i64 {
        if let Some(&lag) = self.exact.get(indicator) {
            return lag;
        }
        if let Some(&lag) = self.folded.get(&fold_alias(indicator)) {
            return lag;
        }
        debug!(indicator, lag = self.default_lag_days, "no calendar entry; using default lag");
        self.default_lag_days
    }

    /// Reference data for `id` with its resolved lag.
    pub fn indicator(&self, id: &str) -> Indicator {
        Indicator {
            id: id.to_string(),
            lag_days: self.lag_days(id),
        }
    }

    /// Estimated release date of `month`'s observation: `month_end + lag_days`.
    ///
    /// `None` when the date falls outside chrono's range.
    pub fn release_date(&self, indicator: &str, month: Month) -> Option<NaiveDate> {
        month
            .end()
            .checked_add_signed(TimeDelta::try_days(self.lag_days(indicator))?)
    }
}

/// Lowercase and drop everything that is not alphanumeric (`US-Retail_Sales` → `usretailsales`).
fn fold_alias(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}
