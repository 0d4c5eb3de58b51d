//! Run artifacts: the tables and JSON documents written for every run.
//!
//! The exports are meant to be easy to consume in spreadsheets or downstream scripts.

use std::path::PathBuf;

use serde::Serialize;

use crate::domain::{CombinationResult, ForecastRecord, ModelSpec, Quarter};
use crate::error::AppError;
use crate::io::artifacts::RunDirectory;
use crate::news::NewsItem;
use crate::select::{IndicatorSelection, ModelRegistry};
use crate::vintage::VintageSnapshot;

/// Outcome of the lag search for one indicator, as written to `selection_summary.csv`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionSummaryRow {
    pub indicator: String,
    pub selected_k: Option<usize>,
    pub total_bic: Option<f64>,
    pub rmse: Option<f64>,
    pub mae: Option<f64>,
    pub directional_accuracy: Option<f64>,
    pub forecasts: usize,
    /// `selected`, `no_valid_candidate` or `cancelled`.
    pub status: String,
}

impl SelectionSummaryRow {
    pub fn selected(selection: &IndicatorSelection) -> Self {
        Self {
            indicator: selection.indicator.clone(),
            selected_k: Some(selection.spec.k),
            total_bic: Some(selection.total_bic),
            rmse: selection.accuracy.rmse,
            mae: selection.accuracy.mae,
            directional_accuracy: selection.accuracy.directional_accuracy,
            forecasts: selection.forecasts.len(),
            status: "selected".to_string(),
        }
    }

    pub fn excluded(indicator: &str, status: &str) -> Self {
        Self {
            indicator: indicator.to_string(),
            selected_k: None,
            total_bic: None,
            rmse: None,
            mae: None,
            directional_accuracy: None,
            forecasts: 0,
            status: status.to_string(),
        }
    }
}

/// One entry of `model_registry.json`.
#[derive(Debug, Clone, Serialize)]
struct RegistryRow<'a> {
    indicator: &'a str,
    period: Quarter,
    k: usize,
    spec: &'a ModelSpec,
}

/// `combination.json`: one result per as-of Friday of the target quarter.
#[derive(Debug, Clone, Serialize)]
pub struct CombinationReport<'a> {
    pub quarter: Quarter,
    pub results: &'a [CombinationResult],
}

const SUMMARY_HEADER: [&str; 8] = [
    "indicator",
    "selected_k",
    "total_bic",
    "rmse",
    "mae",
    "directional_accuracy",
    "forecasts",
    "status",
];
const NOWCAST_HEADER: [&str; 6] = ["indicator", "quarter", "vintage_date", "k", "predicted", "actual"];
const NEWS_HEADER: [&str; 6] = ["component", "from", "to", "previous", "current", "news"];

pub fn write_vintages(run: &RunDirectory, snapshots: &[VintageSnapshot]) -> Result<(), AppError> {
    for snapshot in snapshots {
        run.write_json(&format!("vintages/{}.json", snapshot.quarter), snapshot)?;
    }
    Ok(())
}

pub fn write_selection_summary(run: &RunDirectory, rows: &[SelectionSummaryRow]) -> Result<PathBuf, AppError> {
    run.write_csv_with_header("selection_summary.csv", &SUMMARY_HEADER, rows)
}

pub fn write_registry(run: &RunDirectory, registry: &ModelRegistry) -> Result<PathBuf, AppError> {
    let rows: Vec<RegistryRow> = registry
        .entries()
        .map(|(indicator, period, spec)| RegistryRow {
            indicator,
            period,
            k: spec.k,
            spec,
        })
        .collect();
    run.write_json("model_registry.json", &rows)
}

pub fn write_nowcasts(run: &RunDirectory, records: &[ForecastRecord]) -> Result<PathBuf, AppError> {
    run.write_csv_with_header("nowcasts.csv", &NOWCAST_HEADER, records)
}

pub fn write_combination(run: &RunDirectory, report: &CombinationReport<'_>) -> Result<PathBuf, AppError> {
    run.write_json("combination.json", report)
}

pub fn write_news(run: &RunDirectory, items: &[NewsItem]) -> Result<PathBuf, AppError> {
    run.write_csv_with_header("news.csv", &NEWS_HEADER, items)
}
