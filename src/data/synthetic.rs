//! Synthetic monthly indicators and a quarterly target for demos and tests.
//!
//! A latent monthly factor follows an AR(1):
//!
//! ```text
//! f_t = 0.6 f_{t-1} + e_t
//! x_{i,t} = λ_i f_t + σ_i u_{i,t}
//! y_q = 0.5 + 1.5 · mean(f over q's months) + 0.3 v_q
//! ```
//!
//! Indicators differ in loading, noise and publication lag, so some are
//! genuinely more useful than others at each point of the quarter.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;
use serde::Serialize;

use crate::domain::{Month, Quarter, ReleaseCalendarEntry, Transform};
use crate::error::{AppError, EXIT_INTERNAL};
use crate::features::{MonthlySeries, QuarterlySeries};

/// Publication lags cycled across generated indicators.
const LAG_CYCLE: [i64; 6] = [3, 14, 25, 33, 45, 60];

/// Share of monthly cells blanked out to exercise the missing-data paths.
const MISSING_PROB: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynthConfig {
    pub seed: u64,
    pub start_year: i32,
    pub years: u32,
    pub indicators: usize,
}

#[derive(Debug, Clone)]
pub struct SyntheticData {
    pub monthly: BTreeMap<String, MonthlySeries>,
    pub target: QuarterlySeries,
    pub calendar: Vec<ReleaseCalendarEntry>,
}

/// Paths of a written synthetic input triple.
#[derive(Debug, Clone)]
pub struct SyntheticFiles {
    pub monthly: PathBuf,
    pub quarterly: PathBuf,
    pub calendar: PathBuf,
}

pub fn generate(config: &SynthConfig) -> Result<SyntheticData, AppError> {
    if config.years == 0 {
        return Err(AppError::config("Synthetic data needs at least one year."));
    }
    if config.indicators == 0 {
        return Err(AppError::config("Synthetic data needs at least one indicator."));
    }
    let start = Month::new(config.start_year, 1)
        .ok_or_else(|| AppError::config("Invalid synthetic start year."))?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| AppError::new(EXIT_INTERNAL, format!("Noise distribution error: {e}")))?;

    let n_months = config.years as usize * 12;
    let mut factor = Vec::with_capacity(n_months);
    let mut prev = 0.0;
    for _ in 0..n_months {
        prev = 0.6 * prev + normal.sample(&mut rng);
        factor.push(prev);
    }

    let mut monthly = BTreeMap::new();
    let mut calendar = Vec::with_capacity(config.indicators);
    for i in 0..config.indicators {
        let id = format!("IND{:02}", i + 1);
        let loading = rng.gen_range(0.3..1.5);
        let noise = rng.gen_range(0.2..1.2);
        let points = factor.iter().enumerate().filter_map(|(t, f)| {
            let value = loading * f + noise * normal.sample(&mut rng);
            let missing = rng.gen_bool(MISSING_PROB);
            (!missing).then(|| (start.offset(t as i64), value))
        });
        monthly.insert(id.clone(), MonthlySeries::from_points(points.collect::<Vec<_>>()));
        calendar.push(ReleaseCalendarEntry {
            indicator: id,
            lag_days: LAG_CYCLE[i % LAG_CYCLE.len()],
            transform: None,
        });
    }

    let first_quarter = start.quarter();
    let n_quarters = n_months / 3;
    let target = QuarterlySeries::from_points(
        (0..n_quarters)
            .map(|q| {
                let mean_f = factor[q * 3..q * 3 + 3].iter().sum::<f64>() / 3.0;
                let y = 0.5 + 1.5 * mean_f + 0.3 * normal.sample(&mut rng);
                (first_quarter.offset(q as i64), y)
            })
            .collect::<Vec<_>>(),
    );

    Ok(SyntheticData {
        monthly,
        target,
        calendar,
    })
}

#[derive(Serialize)]
struct QuarterlyRow {
    date: String,
    quarter: Quarter,
    value: f64,
}

#[derive(Serialize)]
struct CalendarRow<'a> {
    indicator: &'a str,
    lag_days: i64,
    transform: &'static str,
}

/// Write `monthly.csv`, `quarterly.csv` and `calendar.csv` into `dir`.
pub fn write_csvs(data: &SyntheticData, dir: &Path) -> Result<SyntheticFiles, AppError> {
    std::fs::create_dir_all(dir).map_err(|e| {
        AppError::new(
            EXIT_INTERNAL,
            format!("Failed to create directory '{}': {e}", dir.display()),
        )
    })?;
    let files = SyntheticFiles {
        monthly: dir.join("monthly.csv"),
        quarterly: dir.join("quarterly.csv"),
        calendar: dir.join("calendar.csv"),
    };

    // Wide monthly table over the union of observed months.
    let ids: Vec<&String> = data.monthly.keys().collect();
    let months: Vec<Month> = {
        let mut all: Vec<Month> = data
            .monthly
            .values()
            .flat_map(|s| s.iter().map(|(m, _)| m))
            .collect();
        all.sort();
        all.dedup();
        all
    };
    let mut w = writer(&files.monthly)?;
    let mut header = vec!["date".to_string()];
    header.extend(ids.iter().map(|s| s.to_string()));
    write_record(&mut w, &files.monthly, &header)?;
    for m in months {
        let mut row = vec![m.to_string()];
        row.extend(ids.iter().map(|id| {
            data.monthly[*id]
                .get(m)
                .map(|v| format!("{v:.6}"))
                .unwrap_or_else(|| "NA".to_string())
        }));
        write_record(&mut w, &files.monthly, &row)?;
    }
    flush(w, &files.monthly)?;

    let mut w = writer(&files.quarterly)?;
    for (q, value) in data.target.iter() {
        let row = QuarterlyRow {
            date: q.end().format("%Y-%m-%d").to_string(),
            quarter: q,
            value,
        };
        w.serialize(row).map_err(|e| write_error(&files.quarterly, e))?;
    }
    flush(w, &files.quarterly)?;

    let mut w = writer(&files.calendar)?;
    for entry in &data.calendar {
        let row = CalendarRow {
            indicator: &entry.indicator,
            lag_days: entry.lag_days,
            transform: transform_label(entry.transform),
        };
        w.serialize(row).map_err(|e| write_error(&files.calendar, e))?;
    }
    flush(w, &files.calendar)?;

    Ok(files)
}

fn transform_label(t: Option<Transform>) -> &'static str {
    match t {
        None | Some(Transform::None) => "none",
        Some(Transform::Diff) => "diff",
        Some(Transform::Ldiff) => "ldiff",
        Some(Transform::Log) => "log",
        Some(Transform::Dmean) => "dmean",
        Some(Transform::Dllog) => "dllog",
        Some(Transform::Std) => "std",
    }
}

fn writer(path: &Path) -> Result<csv::Writer<File>, AppError> {
    csv::Writer::from_path(path).map_err(|e| write_error(path, e))
}

fn write_record(w: &mut csv::Writer<File>, path: &Path, row: &[String]) -> Result<(), AppError> {
    w.write_record(row).map_err(|e| write_error(path, e))
}

fn flush(mut w: csv::Writer<File>, path: &Path) -> Result<(), AppError> {
    w.flush().map_err(|e| write_error(path, e))
}

fn write_error(path: &Path, e: impl std::fmt::Display) -> AppError {
    AppError::new(
        EXIT_INTERNAL,
        format!("Failed to write '{}': {e}", path.display()),
    )
}
