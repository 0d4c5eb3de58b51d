//! Week-over-week forecast revisions ("news").
//!
//! The delta between two consecutive as-of dates is only pure data news when
//! every model spec stayed fixed across the pair; the registry guarantees that
//! inside one quarter.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{CombinationResult, ModelForecast};

/// Label used for the combined forecast in news output.
pub const COMBINED: &str = "combined";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    /// `combined` or a model name.
    pub component: String,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub previous: Option<f64>,
    pub current: Option<f64>,
    /// `current - previous`; `None` unless both sides exist.
    pub news: Option<f64>,
}

pub struct NewsDecomposer;

impl NewsDecomposer {
    /// Difference of two combined forecasts.
    pub fn between(previous: &CombinationResult, current: &CombinationResult) -> NewsItem {
        item(COMBINED, previous.as_of, current.as_of, previous.point, current.point)
    }

    /// News for each consecutive pair in `results`, in order.
    pub fn sequence(results: &[CombinationResult]) -> Vec<NewsItem> {
        results
            .windows(2)
            .map(|pair| Self::between(&pair[0], &pair[1]))
            .collect()
    }

    /// Per-model differences; models present on only one side get `news = None`.
    pub fn by_model(
        from: Option<NaiveDate>,
        previous: &[ModelForecast],
        to: Option<NaiveDate>,
        current: &[ModelForecast],
    ) -> Vec<NewsItem> {
        let mut names: Vec<&str> = previous
            .iter()
            .chain(current)
            .map(|m| m.name.as_str())
            .collect();
        names.sort_unstable();
        names.dedup();

        names
            .into_iter()
            .map(|name| {
                let prev = previous.iter().find(|m| m.name == name).map(|m| m.point);
                let cur = current.iter().find(|m| m.name == name).map(|m| m.point);
                item(name, from, to, prev, cur)
            })
            .collect()
    }
}

fn item(
    component: &str,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    previous: Option<f64>,
    current: Option<f64>,
) -> NewsItem {
    NewsItem {
        component: component.to_string(),
        from,
        to,
        previous,
        current,
        news: previous.zip(current).map(|(p, c)| c - p),
    }
}
