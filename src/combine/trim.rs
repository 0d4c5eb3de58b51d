//! Drop the worst models before weighting.

use tracing::warn;

use crate::domain::{ModelForecast, TrimMetric};
use crate::math::{average_ranks, quantile};

/// Never trim below this many survivors (or all of them, if fewer).
pub const TRIM_FLOOR: usize = 3;

/// Keep models whose metric is at or below the `(1 - percentile)` quantile.
///
/// With `TrimMetric::Both` a model must pass both thresholds. If that leaves
/// fewer than `min(3, N)` models, the best remaining ones by the same metric are
/// added back. If nothing survives, the input comes back untrimmed.
pub fn trim(models: &[ModelForecast], percentile: f64, metric: TrimMetric) -> Vec<ModelForecast> {
    let n = models.len();
    if n == 0 {
        return Vec::new();
    }
    let floor = TRIM_FLOOR.min(n);
    let level = 1.0 - percentile.clamp(0.0, 1.0);

    let keep: Vec<bool> = match metric {
        TrimMetric::Bic => within_threshold(&values(models, |m| m.bic), level),
        TrimMetric::Rmse => within_threshold(&values(models, |m| m.rmse), level),
        TrimMetric::Both => {
            let by_bic = within_threshold(&values(models, |m| m.bic), level);
            let by_rmse = within_threshold(&values(models, |m| m.rmse), level);
            by_bic.iter().zip(&by_rmse).map(|(a, b)| *a && *b).collect()
        }
    };

    let kept = keep.iter().filter(|k| **k).count();
    if kept == 0 {
        warn!(models = n, percentile, "trimming would drop every model; keeping all");
        return models.to_vec();
    }

    let mut keep = keep;
    if kept < floor {
        for idx in order_by_quality(models, metric) {
            if keep.iter().filter(|k| **k).count() >= floor {
                break;
            }
            keep[idx] = true;
        }
    }

    models
        .iter()
        .zip(&keep)
        .filter(|(_, k)| **k)
        .map(|(m, _)| m.clone())
        .collect()
}

fn values(models: &[ModelForecast], f: impl Fn(&ModelForecast) -> Option<f64>) -> Vec<Option<f64>> {
    models.iter().map(|m| f(m).filter(|v| v.is_finite())).collect()
}

fn within_threshold(values: &[Option<f64>], level: f64) -> Vec<bool> {
    let valid: Vec<f64> = values.iter().flatten().copied().collect();
    let Some(threshold) = quantile(&valid, level) else {
        return vec![false; values.len()];
    };
    values
        .iter()
        .map(|v| v.is_some_and(|v| v <= threshold))
        .collect()
}

/// Model indices from best to worst; models lacking the metric come last.
fn order_by_quality(models: &[ModelForecast], metric: TrimMetric) -> Vec<usize> {
    let score: Vec<Option<f64>> = match metric {
        TrimMetric::Bic => values(models, |m| m.bic),
        TrimMetric::Rmse => values(models, |m| m.rmse),
        TrimMetric::Both => {
            let bic = values(models, |m| m.bic);
            let rmse = values(models, |m| m.rmse);
            let both: Vec<usize> = (0..models.len())
                .filter(|&i| bic[i].is_some() && rmse[i].is_some())
                .collect();
            let rb = average_ranks(&both.iter().filter_map(|&i| bic[i]).collect::<Vec<_>>());
            let rr = average_ranks(&both.iter().filter_map(|&i| rmse[i]).collect::<Vec<_>>());
            let mut score = vec![None; models.len()];
            for (j, &i) in both.iter().enumerate() {
                score[i] = Some(rb[j] + rr[j]);
            }
            score
        }
    };

    let mut order: Vec<usize> = (0..models.len()).collect();
    order.sort_by(|&a, &b| match (score[a], score[b]) {
        (Some(x), Some(y)) => x.total_cmp(&y).then(a.cmp(&b)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.cmp(&b),
    });
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(name: &str, bic: Option<f64>, rmse: Option<f64>) -> ModelForecast {
        ModelForecast {
            name: name.to_string(),
            point: 1.0,
            se: 0.1,
            bic,
            rmse,
            mae: None,
            directional_accuracy: None,
            history: Vec::new(),
        }
    }

    fn names(models: &[ModelForecast]) -> Vec<String> {
        models.iter().map(|m| m.name.clone()).collect()
    }

    #[test]
    fn twenty_models_at_25th_percentile_drop_the_five_worst() {
        let models: Vec<ModelForecast> = (1..=20)
            .map(|i| model(&format!("m{i:02}"), None, Some(i as f64 / 10.0)))
            .collect();
        let out = trim(&models, 0.25, TrimMetric::Rmse);
        assert_eq!(out.len(), 15);
        assert!(out.iter().all(|m| m.rmse.unwrap() <= 1.5));
    }

    #[test]
    fn floor_of_three_survivors() {
        let models: Vec<ModelForecast> = (1..=6)
            .map(|i| model(&format!("m{i}"), Some(100.0 + i as f64), None))
            .collect();
        let out = trim(&models, 0.95, TrimMetric::Bic);
        assert_eq!(names(&out), vec!["m1", "m2", "m3"]);

        let two = trim(&models[..2], 0.99, TrimMetric::Bic);
        assert_eq!(two.len(), 2);
    }

    #[test]
    fn floor_holds_for_every_percentile() {
        let models: Vec<ModelForecast> = (0..9)
            .map(|i| model(&format!("m{i}"), Some((i * 7 % 9) as f64), Some((i * 4 % 9) as f64)))
            .collect();
        for metric in [TrimMetric::Bic, TrimMetric::Rmse, TrimMetric::Both] {
            for p in [0.0, 0.1, 0.3, 0.5, 0.8, 1.0] {
                for n in 1..=models.len() {
                    let out = trim(&models[..n], p, metric);
                    assert!(out.len() >= TRIM_FLOOR.min(n), "{metric:?} p={p} n={n}");
                }
            }
        }
    }

    #[test]
    fn both_intersects_thresholds() {
        let models = vec![
            model("good", Some(1.0), Some(0.1)),
            model("bic_only", Some(2.0), Some(9.0)),
            model("rmse_only", Some(9.0), Some(0.2)),
            model("mid", Some(3.0), Some(0.3)),
            model("bad", Some(10.0), Some(10.0)),
        ];
        let out = trim(&models, 0.25, TrimMetric::Both);
        // Thresholds: BIC 9.0, RMSE 9.0 -> only `bad` fails both sides.
        assert_eq!(names(&out), vec!["good", "bic_only", "rmse_only", "mid"]);

        let out = trim(&models, 0.6, TrimMetric::Both);
        // Thresholds: BIC 2.6, RMSE 0.26 -> only `good` passes, floor adds the next best.
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].name, "good");
    }

    #[test]
    fn no_metric_anywhere_returns_input() {
        let models = vec![model("a", None, None), model("b", None, None)];
        assert_eq!(trim(&models, 0.5, TrimMetric::Rmse), models);
    }
}
