//! Calendar periods: months, quarters and the weekly Friday cadence.
//!
//! Monthly observations are keyed by `Month` and always dated at the month end;
//! quarterly targets are keyed by `Quarter` and dated at the quarter end.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// A calendar month. Ordered chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Month {
    year: i32,
    month: u32,
}

impl Month {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(self) -> i32 {
        self.year
    }

    pub fn month(self) -> u32 {
        self.month
    }

    /// Months since year 0; used for arithmetic.
    fn index(self) -> i64 {
        self.year as i64 * 12 + (self.month as i64 - 1)
    }

    fn from_index(idx: i64) -> Self {
        Self {
            year: idx.div_euclid(12) as i32,
            month: (idx.rem_euclid(12) + 1) as u32,
        }
    }

    /// Shift by `n` months (negative goes back in time).
    pub fn offset(self, n: i64) -> Self {
        Self::from_index(self.index() + n)
    }

    pub fn first_day(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn end(self) -> NaiveDate {
        self.offset(1).first_day() - Duration::days(1)
    }

    /// Signed number of months from `self` to `later`.
    pub fn months_until(self, later: Month) -> i64 {
        later.index() - self.index()
    }

    pub fn quarter(self) -> Quarter {
        Quarter {
            year: self.year,
            q: (self.month - 1) / 3 + 1,
        }
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.end().format("%Y-%m-%d"))
    }
}

impl From<Month> for String {
    fn from(value: Month) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for Month {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
            .map(Month::from_date)
            .map_err(|e| format!("Invalid month '{value}': {e}"))
    }
}

/// A calendar quarter (`2024Q1`). Ordered chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Quarter {
    year: i32,
    q: u32,
}

impl Quarter {
    pub fn new(year: i32, q: u32) -> Option<Self> {
        (1..=4).contains(&q).then_some(Self { year, q })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Month::from_date(date).quarter()
    }

    pub fn year(self) -> i32 {
        self.year
    }

    pub fn number(self) -> u32 {
        self.q
    }

    fn index(self) -> i64 {
        self.year as i64 * 4 + (self.q as i64 - 1)
    }

    pub fn offset(self, n: i64) -> Self {
        let idx = self.index() + n;
        Self {
            year: idx.div_euclid(4) as i32,
            q: (idx.rem_euclid(4) + 1) as u32,
        }
    }

    pub fn next(self) -> Self {
        self.offset(1)
    }

    pub fn prev(self) -> Self {
        self.offset(-1)
    }

    pub fn first_month(self) -> Month {
        Month {
            year: self.year,
            month: (self.q - 1) * 3 + 1,
        }
    }

    pub fn last_month(self) -> Month {
        self.first_month().offset(2)
    }

    pub fn first_day(self) -> NaiveDate {
        self.first_month().first_day()
    }

    /// Quarter-end date: the date quarterly observations are keyed on.
    pub fn end(self) -> NaiveDate {
        self.last_month().end()
    }

    /// Inclusive range of quarters from `self` to `last`; empty when `last < self`.
    pub fn range_inclusive(self, last: Quarter) -> Vec<Quarter> {
        let n = last.index() - self.index() + 1;
        (0..n.max(0)).map(|i| self.offset(i)).collect()
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Q{}", self.year, self.q)
    }
}

impl FromStr for Quarter {
    type Err = String;

    /// Accepts `2024Q1`, `2024-Q1` and `2024q1`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let (year, q) = upper
            .split_once('Q')
            .ok_or_else(|| format!("Invalid quarter '{s}'. Expected e.g. 2024Q1."))?;
        let year: i32 = year
            .trim_end_matches('-')
            .parse()
            .map_err(|_| format!("Invalid quarter year in '{s}'."))?;
        let q: u32 = q
            .parse()
            .map_err(|_| format!("Invalid quarter number in '{s}'."))?;
        Quarter::new(year, q).ok_or_else(|| format!("Quarter number must be 1-4 in '{s}'."))
    }
}

impl From<Quarter> for String {
    fn from(value: Quarter) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for Quarter {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Every Friday in `[start, end]`, inclusive on both ends.
pub fn fridays_between(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let ahead = (Weekday::Fri.num_days_from_monday() + 7
        - start.weekday().num_days_from_monday())
        % 7;
    let mut out = Vec::with_capacity(14);
    let mut day = start + Duration::days(ahead as i64);
    while day <= end {
        out.push(day);
        day += Duration::days(7);
    }
    out
}
