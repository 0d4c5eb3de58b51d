use std::path::Path;

use midas_nowcast::app::pipeline::{RunOutput, prepare_dataset, run_nowcast, run_with_dataset};
use midas_nowcast::data::{SynthConfig, SyntheticData, generate, write_csvs};
use midas_nowcast::domain::{
    NowcastConfig, Quarter, RegressorMode, SelectionMode, Transform, TrimConfig, TrimMetric, WeightScheme,
};
use midas_nowcast::features::Dataset;

fn synthetic() -> SyntheticData {
    generate(&SynthConfig {
        seed: 11,
        start_year: 2010,
        years: 8,
        indicators: 4,
    })
    .unwrap()
}

fn config(out_dir: &Path, selection: SelectionMode) -> NowcastConfig {
    NowcastConfig {
        start: Quarter::new(2012, 1).unwrap(),
        end: Quarter::new(2017, 4).unwrap(),
        monthly_path: out_dir.join("monthly.csv"),
        quarterly_path: out_dir.join("quarterly.csv"),
        calendar_path: Some(out_dir.join("calendar.csv")),
        out_dir: out_dir.join("out"),
        default_lag_days: 30,
        target_lag_days: 25,
        max_lag: 4,
        intercept: true,
        regressors: RegressorMode::Ragged,
        selection,
        target_transform: Transform::None,
        scheme: WeightScheme::InverseRmse,
        trim: None,
        coverage: 0.9,
        metric_window: None,
        indicator_timeout_secs: None,
    }
}

fn run(cfg: &NowcastConfig, data: &SyntheticData) -> RunOutput {
    let dataset = Dataset {
        monthly: data.monthly.clone(),
        target: data.target.clone(),
    };
    run_with_dataset(cfg, &dataset, &data.calendar).unwrap()
}

#[test]
fn full_run_writes_every_artifact() {
    let tmp = tempfile::tempdir().unwrap();
    let data = synthetic();
    let out = run(&config(tmp.path(), SelectionMode::Full), &data);

    assert!(out.run_dir.starts_with(tmp.path().join("out")));
    for file in [
        "selection_summary.csv",
        "model_registry.json",
        "nowcasts.csv",
        "combination.json",
        "news.csv",
        "vintages/2012Q1.json",
        "vintages/2017Q4.json",
    ] {
        assert!(out.run_dir.join(file).is_file(), "missing {file}");
    }

    assert_eq!(out.snapshots.len(), 24);
    assert_eq!(out.summary.len(), 4);
    assert!(!out.selections.is_empty());
    assert!(!out.nowcasts.is_empty());
    assert_eq!(out.target_quarter, Quarter::new(2017, 4).unwrap());
}

#[test]
fn combined_weights_sum_to_one_and_intervals_bracket_the_point() {
    let tmp = tempfile::tempdir().unwrap();
    let data = synthetic();
    let out = run(&config(tmp.path(), SelectionMode::Full), &data);

    let target = out.snapshots.last().unwrap();
    assert_eq!(out.combinations.len(), target.vintages.len());
    let mut combined_any = false;
    for result in &out.combinations {
        let Some(point) = result.point else {
            continue;
        };
        combined_any = true;
        let sum: f64 = result.weights.values().sum();
        assert!((sum - 1.0).abs() < 1e-9, "weights sum to {sum}");
        assert!(result.weights.values().all(|w| *w >= 0.0));
        let (lo, hi) = (result.lo.unwrap(), result.hi.unwrap());
        assert!(lo <= point && point <= hi);
        assert!(result.n_models_used <= result.n_models_input);
    }
    assert!(combined_any, "no Friday produced a combination");

    // One combined news item per consecutive Friday pair.
    let combined_news = out.news.iter().filter(|n| n.component == "combined").count();
    assert_eq!(combined_news, target.vintages.len() - 1);
}

#[test]
fn vintages_never_look_ahead_and_only_accumulate() {
    let tmp = tempfile::tempdir().unwrap();
    let data = synthetic();
    let out = run(&config(tmp.path(), SelectionMode::Full), &data);

    for snapshot in &out.snapshots {
        for pair in snapshot.vintages.windows(2) {
            assert!(pair[0].as_of < pair[1].as_of);
            for (id, later) in &pair[1].availability {
                let earlier = pair[0].availability_of(id);
                assert!(earlier.last_available_month <= later.last_available_month);
            }
        }
        for vintage in &snapshot.vintages {
            for entry in &data.calendar {
                let Some(month) = vintage.availability_of(&entry.indicator).last_available_month else {
                    continue;
                };
                let release = month.end() + chrono::Duration::days(entry.lag_days);
                assert!(release <= vintage.as_of, "{} {month} visible before release", entry.indicator);
            }
        }
    }
}

#[test]
fn nowcasts_only_cover_selected_indicators_and_known_quarters() {
    let tmp = tempfile::tempdir().unwrap();
    let data = synthetic();
    let cfg = config(tmp.path(), SelectionMode::Full);
    let out = run(&cfg, &data);

    for record in &out.nowcasts {
        assert!(record.quarter >= cfg.start && record.quarter <= cfg.end);
        assert!(record.predicted.is_finite());
        assert!(out.selections.iter().any(|s| s.indicator == record.indicator));
        assert_eq!(record.actual, data.target.get(record.quarter));
    }
}

#[test]
fn frozen_mode_holds_one_spec_per_quarter() {
    let tmp = tempfile::tempdir().unwrap();
    let data = synthetic();
    let mut cfg = config(tmp.path(), SelectionMode::Frozen);
    cfg.scheme = WeightScheme::Equal;
    cfg.trim = Some(TrimConfig {
        percentile: 0.25,
        metric: TrimMetric::Rmse,
    });
    let out = run(&cfg, &data);

    assert!(!out.registry.is_empty());
    for selection in &out.selections {
        // The first quarter has no history, so nothing is in force yet.
        assert!(selection.period_specs[0].is_none());
        for (t, spec) in selection.period_specs.iter().enumerate() {
            let q = cfg.start.offset(t as i64);
            assert_eq!(out.registry.spec_for(&selection.indicator, q), spec.as_ref());
        }
        for record in &selection.forecasts {
            let t = out.snapshots.iter().position(|s| s.quarter == record.quarter).unwrap();
            let spec = selection.period_specs[t].as_ref().unwrap();
            assert_eq!(record.k, spec.k);
        }
    }
}

#[test]
fn autoregressive_run_waits_for_the_previous_quarter_release() {
    let tmp = tempfile::tempdir().unwrap();
    let data = synthetic();
    let mut cfg = config(tmp.path(), SelectionMode::Full);
    cfg.regressors = RegressorMode::Autoregressive { ar_lags: 1 };
    let out = run(&cfg, &data);

    assert!(!out.selections.is_empty());
    assert!(!out.nowcasts.is_empty());
    let lag = chrono::Duration::days(cfg.target_lag_days);
    for record in &out.nowcasts {
        assert!(record.vintage_date >= record.quarter.prev().end() + lag);
    }

    // 2017Q3 is published on 2017-10-25; earlier Fridays of 2017Q4 have no AR model.
    let released = out.target_quarter.prev().end() + lag;
    let target = out.snapshots.last().unwrap();
    assert_eq!(out.combinations.len(), target.vintages.len());
    for result in &out.combinations {
        let as_of = result.as_of.unwrap();
        if as_of < released {
            assert_eq!(result.n_models_input, 0, "{as_of}");
            assert!(result.point.is_none());
        }
    }
    let later: Vec<_> = out
        .combinations
        .iter()
        .filter(|r| r.as_of.is_some_and(|d| d >= released))
        .collect();
    assert!(later.iter().any(|r| r.point.is_some()));
    for result in later.iter().filter(|r| r.point.is_some()) {
        let sum: f64 = result.weights.values().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }
}

#[test]
fn performance_schemes_combine_on_past_quarters() {
    let tmp = tempfile::tempdir().unwrap();
    let data = synthetic();
    for scheme in [
        WeightScheme::Adaptive { window: 4 },
        WeightScheme::RegressionBased { window: 8 },
    ] {
        let mut cfg = config(tmp.path(), SelectionMode::Full);
        cfg.scheme = scheme;
        let out = run(&cfg, &data);
        let combined: Vec<_> = out.combinations.iter().filter(|r| r.point.is_some()).collect();
        assert!(!combined.is_empty(), "{scheme:?}");
        for result in combined {
            assert_eq!(result.scheme, scheme);
            let sum: f64 = result.weights.values().sum();
            assert!((sum - 1.0).abs() < 1e-9, "{scheme:?} weights sum to {sum}");
            assert!(result.weights.values().all(|w| *w >= 0.0));
        }
    }
}

#[test]
fn each_run_gets_a_fresh_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let data = synthetic();
    let cfg = config(tmp.path(), SelectionMode::Full);
    let a = run(&cfg, &data);
    let b = run(&cfg, &data);
    assert_ne!(a.run_dir, b.run_dir);
    assert_eq!(a.combinations, b.combinations);
}

#[test]
fn run_from_csv_files_matches_in_memory_run() {
    let tmp = tempfile::tempdir().unwrap();
    let data = synthetic();
    write_csvs(&data, tmp.path()).unwrap();
    let cfg = config(tmp.path(), SelectionMode::Full);

    let from_files = run_nowcast(&cfg).unwrap();
    let calendar = data.calendar.clone();
    let dataset = prepare_dataset(data.monthly.clone(), data.target.clone(), &calendar, Transform::None);
    let in_memory = run_with_dataset(&cfg, &dataset, &calendar).unwrap();

    // CSV values are rounded, so compare structure rather than estimates.
    assert_eq!(from_files.summary.len(), in_memory.summary.len());
    for (a, b) in from_files.summary.iter().zip(&in_memory.summary) {
        assert_eq!(a.indicator, b.indicator);
    }
    assert_eq!(from_files.snapshots.len(), in_memory.snapshots.len());
    assert_eq!(from_files.combinations.len(), in_memory.combinations.len());
}

#[test]
fn missing_input_file_is_a_configuration_error() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = config(tmp.path(), SelectionMode::Full);
    let err = run_nowcast(&cfg).unwrap_err();
    assert_eq!(err.exit_code(), 2);
}
