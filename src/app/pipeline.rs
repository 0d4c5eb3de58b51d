//! Shared nowcasting pipeline.
//!
//! Keeping this in one place avoids duplicating the core workflow between the
//! CLI and the integration tests:
//! load -> vintages -> lag selection -> registry -> nowcasts -> combination -> news
//!
//! All inputs are read before any computation starts; all artifacts land in a
//! fresh run directory.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::calendar::{CalendarAvailabilityModel, MAX_LAG_DAYS};
use crate::combine::Combiner;
use crate::domain::{
    CombinationResult, ForecastRecord, ModelForecast, NowcastConfig, Quarter, ReleaseCalendarEntry,
    SelectionMode, Transform, WeightScheme,
};
use crate::error::{AppError, EXIT_INTERNAL, SelectionError};
use crate::features::{Dataset, MonthlySeries};
use crate::forecast::{ForecastProducer, UMidasProducer, collect_forecasts};
use crate::io::export::{
    CombinationReport, SelectionSummaryRow, write_combination, write_news, write_nowcasts, write_registry,
    write_selection_summary, write_vintages,
};
use crate::io::{RunDirectory, load_calendar, load_monthly, load_quarterly};
use crate::news::{NewsDecomposer, NewsItem};
use crate::select::{
    Deadline, IndicatorPanel, IndicatorSelection, ModelRegistry, ModelSelector, SelectorConfig,
    TrackRecord,
};
use crate::vintage::{VintageBuilder, VintageSnapshot};

/// All computed outputs of a single `nowcast run`.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub run_dir: PathBuf,
    pub target_quarter: Quarter,
    pub snapshots: Vec<VintageSnapshot>,
    pub selections: Vec<IndicatorSelection>,
    pub summary: Vec<SelectionSummaryRow>,
    pub registry: ModelRegistry,
    pub nowcasts: Vec<ForecastRecord>,
    pub combinations: Vec<CombinationResult>,
    pub news: Vec<NewsItem>,
}

/// Load the configured inputs and run the full pipeline.
pub fn run_nowcast(config: &NowcastConfig) -> Result<RunOutput, AppError> {
    validate_config(config)?;

    // 1) Load everything up front; nothing below touches the input files.
    let monthly = load_monthly(&config.monthly_path)?;
    let quarterly = load_quarterly(&config.quarterly_path)?;
    let calendar = match &config.calendar_path {
        Some(path) => load_calendar(path)?.entries,
        None => Vec::new(),
    };

    let dataset = prepare_dataset(monthly.series, quarterly.series, &calendar, config.target_transform);
    run_with_dataset(config, &dataset, &calendar)
}

/// Run the pipeline on already-loaded (and transformed) data.
pub fn run_with_dataset(
    config: &NowcastConfig,
    dataset: &Dataset,
    calendar: &[ReleaseCalendarEntry],
) -> Result<RunOutput, AppError> {
    validate_config(config)?;
    let calendar = CalendarAvailabilityModel::new(calendar, config.default_lag_days);
    let quarters = config.start.range_inclusive(config.end);
    let target_quarter = config.end;

    // 2) Vintages, persisted before anything consumes them.
    for id in dataset.monthly.keys() {
        let indicator = calendar.indicator(id);
        debug!(indicator = %indicator.id, lag_days = indicator.lag_days, "publication lag");
    }
    let builder = VintageBuilder::new(&calendar, &dataset.monthly);
    let snapshots: Vec<VintageSnapshot> = quarters.iter().map(|q| builder.build_quarter(*q)).collect();
    let run = RunDirectory::create(&config.out_dir)?;
    write_vintages(&run, &snapshots)?;
    info!(
        run_dir = %run.path().display(),
        quarters = quarters.len(),
        indicators = dataset.monthly.len(),
        "vintages built"
    );

    // 3) Lag selection, one task per indicator.
    let selector = ModelSelector::new(SelectorConfig {
        max_lag: config.max_lag,
        intercept: config.intercept,
        regressors: config.regressors,
    });
    let outcomes: Vec<(IndicatorPanel, Result<IndicatorSelection, SelectionError>)> = dataset
        .monthly
        .par_iter()
        .map(|(id, series)| {
            let panel = IndicatorPanel::build(
                id,
                series,
                &dataset.target,
                &snapshots,
                config.max_lag,
                config.regressors.ar_lags(),
                config.target_lag_days,
            );
            let deadline = config
                .indicator_timeout_secs
                .map_or(Deadline::none(), |secs| Deadline::after(Duration::from_secs(secs)));
            let result = match config.selection {
                SelectionMode::Full => selector.select_full(&panel, deadline),
                SelectionMode::Frozen => selector.select_frozen(&panel, deadline),
            };
            (panel, result)
        })
        .collect();

    // 4) Registry, summary and the nowcast table.
    let mut registry = ModelRegistry::new();
    let mut summary = Vec::with_capacity(outcomes.len());
    let mut selections = Vec::new();
    let mut panels: BTreeMap<String, &IndicatorPanel> = BTreeMap::new();
    for (panel, result) in &outcomes {
        let id = panel.indicator();
        match result {
            Ok(selection) => {
                registry
                    .record(selection, &quarters, config.selection)
                    .map_err(|e| AppError::new(EXIT_INTERNAL, e.to_string()))?;
                info!(
                    indicator = %id,
                    k = selection.spec.k,
                    total_bic = selection.total_bic,
                    rmse = ?selection.accuracy.rmse,
                    forecasts = selection.forecasts.len(),
                    "lag selected"
                );
                summary.push(SelectionSummaryRow::selected(selection));
                selections.push(selection.clone());
                panels.insert(id.to_string(), panel);
            }
            Err(err) => {
                warn!(indicator = %id, %err, "indicator excluded");
                let status = match err {
                    SelectionError::NoValidCandidate => "no_valid_candidate",
                    SelectionError::Cancelled => "cancelled",
                };
                summary.push(SelectionSummaryRow::excluded(id, status));
            }
        }
    }
    if selections.is_empty() {
        warn!("no indicator produced a valid model; combination will be empty");
    }

    let nowcasts: Vec<ForecastRecord> = selections
        .iter()
        .flat_map(|s| s.forecasts.iter().cloned())
        .collect();

    // 5) Combine per as-of Friday of the target quarter, with specs held fixed.
    let target_idx = quarters.len() - 1;
    let producers: Vec<Box<dyn ForecastProducer + '_>> = selections
        .iter()
        .filter_map(|selection| {
            let id = selection.indicator.as_str();
            let panel: &IndicatorPanel = panels.get(id).copied()?;
            let Some(spec) = registry.spec_for(id, target_quarter) else {
                warn!(indicator = %id, quarter = %target_quarter, "no model in force for target quarter");
                return None;
            };
            let track = TrackRecord::before(&selection.forecasts, target_quarter, config.metric_window);
            Some(Box::new(UMidasProducer::new(panel, spec.clone(), target_idx, track))
                as Box<dyn ForecastProducer + '_>)
        })
        .collect();

    let combiner = Combiner::new(config.scheme)
        .with_trim(config.trim)
        .with_coverage(config.coverage);
    let target_snapshot = &snapshots[target_idx];
    let mut combinations = Vec::with_capacity(target_snapshot.vintages.len());
    let mut per_model: Vec<Vec<ModelForecast>> = Vec::with_capacity(target_snapshot.vintages.len());
    for vintage in &target_snapshot.vintages {
        let models = collect_forecasts(&producers, vintage.friday_index);
        combinations.push(combiner.combine(&models, Some(vintage.as_of)));
        per_model.push(models);
    }

    // 6) News between consecutive Fridays.
    let mut news = NewsDecomposer::sequence(&combinations);
    for (i, pair) in per_model.windows(2).enumerate() {
        news.extend(NewsDecomposer::by_model(
            combinations[i].as_of,
            &pair[0],
            combinations[i + 1].as_of,
            &pair[1],
        ));
    }

    // 7) Artifacts.
    write_selection_summary(&run, &summary)?;
    write_registry(&run, &registry)?;
    write_nowcasts(&run, &nowcasts)?;
    write_combination(
        &run,
        &CombinationReport {
            quarter: target_quarter,
            results: &combinations,
        },
    )?;
    write_news(&run, &news)?;

    Ok(RunOutput {
        run_dir: run.path().to_path_buf(),
        target_quarter,
        snapshots,
        selections,
        summary,
        registry,
        nowcasts,
        combinations,
        news,
    })
}

/// Reject settings that cannot produce a meaningful run.
pub fn validate_config(config: &NowcastConfig) -> Result<(), AppError> {
    if config.end < config.start {
        return Err(AppError::config(format!(
            "End quarter {} is before start quarter {}.",
            config.end, config.start
        )));
    }
    if config.max_lag == 0 {
        return Err(AppError::config("`--max-lag` must be at least 1."));
    }
    if !(config.coverage > 0.0 && config.coverage < 1.0) {
        return Err(AppError::config("`--coverage` must be in (0, 1)."));
    }
    if !(0..=MAX_LAG_DAYS).contains(&config.default_lag_days) {
        return Err(AppError::config(format!(
            "`--default-lag-days` must be in 0..={MAX_LAG_DAYS}."
        )));
    }
    if !(0..=MAX_LAG_DAYS).contains(&config.target_lag_days) {
        return Err(AppError::config(format!(
            "`--target-lag-days` must be in 0..={MAX_LAG_DAYS}."
        )));
    }
    match config.scheme {
        WeightScheme::Adaptive { window } | WeightScheme::RegressionBased { window } if window == 0 => {
            return Err(AppError::config("`--scheme-window` must be at least 1."));
        }
        _ => {}
    }
    if let Some(trim) = config.trim {
        if !(0.0..1.0).contains(&trim.percentile) {
            return Err(AppError::config("`--trim-percentile` must be in [0, 1)."));
        }
    }
    Ok(())
}

/// Apply per-indicator calendar transforms and the target transform.
pub fn prepare_dataset(
    monthly: BTreeMap<String, MonthlySeries>,
    target: crate::features::QuarterlySeries,
    calendar: &[ReleaseCalendarEntry],
    target_transform: Transform,
) -> Dataset {
    let transforms: BTreeMap<&str, Transform> = calendar
        .iter()
        .filter_map(|e| e.transform.map(|t| (e.indicator.as_str(), t)))
        .collect();

    let monthly = monthly
        .into_iter()
        .map(|(id, series)| {
            let series = match transforms.get(id.as_str()) {
                Some(t) if *t != Transform::None => {
                    let out = series.transformed(*t);
                    if out.is_empty() && !series.is_empty() {
                        warn!(indicator = %id, transform = ?t, "transform left no usable values");
                    }
                    out
                }
                _ => series,
            };
            (id, series)
        })
        .collect();

    let target = if target_transform == Transform::None {
        target
    } else {
        let out = target.transformed(target_transform);
        if out.is_empty() && !target.is_empty() {
            warn!(transform = ?target_transform, "target transform left no usable values");
        }
        out
    };

    Dataset { monthly, target }
}
