//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - passed between the vintage, selection, forecast and combination stages
//! - written as immutable run artifacts (JSON/CSV)
//! - reloaded later for audits or news decomposition

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use super::period::{Month, Quarter};

/// A monthly indicator and its approximate publication delay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Indicator {
    pub id: String,
    /// Days between the month end and the release of that month's value.
    pub lag_days: i64,
}

/// One row of the release calendar. Absent rows fall back to the default lag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseCalendarEntry {
    pub indicator: String,
    pub lag_days: i64,
    /// Optional pre-processing applied to the indicator before vintage construction.
    pub transform: Option<Transform>,
}

/// Series transformation applied once, before any vintage is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Transform {
    None,
    /// First difference.
    Diff,
    /// Difference of logs (growth rate).
    Ldiff,
    Log,
    /// Subtract the full-sample mean.
    Dmean,
    /// Demeaned log.
    Dllog,
    /// Standardize with full-sample mean and standard deviation.
    Std,
}

impl Transform {
    pub fn parse_label(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "level" => Some(Transform::None),
            "diff" => Some(Transform::Diff),
            "ldiff" => Some(Transform::Ldiff),
            "log" => Some(Transform::Log),
            "dmean" => Some(Transform::Dmean),
            "dllog" => Some(Transform::Dllog),
            "std" => Some(Transform::Std),
            _ => None,
        }
    }
}

/// What is knowable about one indicator at one as-of date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorAvailability {
    /// Latest month whose estimated release date is on or before the as-of date.
    pub last_available_month: Option<Month>,
    /// Months from `last_available_month` to the quarter's last month.
    pub horizon_months: Option<i64>,
}

impl IndicatorAvailability {
    pub const NONE: IndicatorAvailability = IndicatorAvailability {
        last_available_month: None,
        horizon_months: None,
    };
}

/// An immutable snapshot of data availability for one (quarter, Friday) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vintage {
    pub quarter: Quarter,
    pub as_of: NaiveDate,
    /// Position of `as_of` among the quarter's Fridays (0-based).
    pub friday_index: usize,
    pub availability: BTreeMap<String, IndicatorAvailability>,
}

impl Vintage {
    pub fn availability_of(&self, indicator: &str) -> IndicatorAvailability {
        self.availability
            .get(indicator)
            .copied()
            .unwrap_or(IndicatorAvailability::NONE)
    }
}

/// How the regressors of a model are assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RegressorMode {
    /// Monthly lags only, ending at the vintage's last available month.
    Ragged,
    /// Monthly lags plus `ar_lags` lagged quarterly target values.
    Autoregressive { ar_lags: usize },
}

impl RegressorMode {
    pub fn ar_lags(self) -> usize {
        match self {
            RegressorMode::Ragged => 0,
            RegressorMode::Autoregressive { ar_lags } => ar_lags,
        }
    }
}

/// A selected model: which indicator, how many monthly lags, which regressors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub indicator: String,
    pub k: usize,
    pub intercept: bool,
    pub regressors: RegressorMode,
}

impl ModelSpec {
    /// Number of estimated coefficients.
    pub fn param_count(&self) -> usize {
        self.k + self.regressors.ar_lags() + usize::from(self.intercept)
    }
}

/// Result of one least-squares fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    /// Intercept first (when present), then monthly lags, then AR lags.
    pub coefficients: Vec<f64>,
    pub bic: f64,
    pub sse: f64,
    pub n_obs: usize,
}

impl FittedModel {
    /// Residual standard error with a degrees-of-freedom correction.
    pub fn residual_se(&self) -> f64 {
        let dof = self.n_obs.saturating_sub(self.coefficients.len()).max(1);
        (self.sse / dof as f64).sqrt()
    }
}

/// One nowcast for one indicator at one vintage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    pub indicator: String,
    pub quarter: Quarter,
    pub vintage_date: NaiveDate,
    pub k: usize,
    pub predicted: f64,
    pub actual: Option<f64>,
}

/// A single model's contribution to a combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelForecast {
    pub name: String,
    pub point: f64,
    /// Standard error of the point forecast.
    pub se: f64,
    pub bic: Option<f64>,
    pub rmse: Option<f64>,
    pub mae: Option<f64>,
    pub directional_accuracy: Option<f64>,
    /// Final nowcast and realized value of earlier quarters, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<QuarterOutcome>,
}

/// The last nowcast of a past quarter next to what was realized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuarterOutcome {
    pub quarter: Quarter,
    pub predicted: f64,
    pub actual: f64,
}

/// Which metric drives trimming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TrimMetric {
    Bic,
    Rmse,
    Both,
}

/// Combination weighting scheme.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum WeightScheme {
    Equal,
    InverseBic,
    InverseRmse,
    BicLikelihood,
    InverseMseShrinkage { lambda: f64 },
    /// Inverse of summed RMSE, MAE and directional-accuracy ranks.
    PerformanceRank,
    /// Equal weights over the `top_n` lowest-RMSE models.
    Thick { top_n: usize },
    /// Recent RMSE and direction hit rate over the last `window` quarters,
    /// leaning harder on direction when recent actuals are volatile.
    Adaptive { window: usize },
    /// Non-negative ridge weights fitted on the last `window` forecast/actual pairs.
    RegressionBased { window: usize },
}

impl WeightScheme {
    pub fn label(&self) -> &'static str {
        match self {
            WeightScheme::Equal => "equal",
            WeightScheme::InverseBic => "inverse-bic",
            WeightScheme::InverseRmse => "inverse-rmse",
            WeightScheme::BicLikelihood => "bic-likelihood",
            WeightScheme::InverseMseShrinkage { .. } => "inverse-mse-shrinkage",
            WeightScheme::PerformanceRank => "performance-rank",
            WeightScheme::Thick { .. } => "thick",
            WeightScheme::Adaptive { .. } => "adaptive",
            WeightScheme::RegressionBased { .. } => "regression-based",
        }
    }
}

/// A blended forecast with its uncertainty band.
///
/// `point`, `lo`, `hi` and `se` are `None` when nothing could be combined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinationResult {
    pub scheme: WeightScheme,
    pub as_of: Option<NaiveDate>,
    pub weights: BTreeMap<String, f64>,
    pub point: Option<f64>,
    pub lo: Option<f64>,
    pub hi: Option<f64>,
    pub se: Option<f64>,
    pub within_var: Option<f64>,
    pub between_var: Option<f64>,
    pub coverage: f64,
    pub n_models_input: usize,
    pub n_models_used: usize,
}

/// When lag selection runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// One search over the whole in-sample window; the result holds for every period.
    Full,
    /// Re-select at each quarter boundary from strictly earlier quarters, then hold.
    Frozen,
}

/// Trimming settings. `percentile` is the share of models cut from the bad tail.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimConfig {
    pub percentile: f64,
    pub metric: TrimMetric,
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct NowcastConfig {
    pub start: Quarter,
    pub end: Quarter,
    pub monthly_path: PathBuf,
    pub quarterly_path: PathBuf,
    pub calendar_path: Option<PathBuf>,
    pub out_dir: PathBuf,

    pub default_lag_days: i64,
    /// Days after quarter end before the target value is published.
    pub target_lag_days: i64,
    pub max_lag: usize,
    pub intercept: bool,
    pub regressors: RegressorMode,
    pub selection: SelectionMode,
    pub target_transform: Transform,

    pub scheme: WeightScheme,
    pub trim: Option<TrimConfig>,
    pub coverage: f64,
    /// Accuracy metrics over the last N quarters only.
    pub metric_window: Option<usize>,

    /// Per-indicator wall-clock budget for lag selection.
    pub indicator_timeout_secs: Option<u64>,
}
