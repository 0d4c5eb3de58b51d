//! Combination weights, one rule per `WeightScheme` variant.
//!
//! A metric only counts when it is finite (and strictly positive for the
//! inverse schemes). Models without it get zero weight. When no model has the
//! metric the scheme needs, weights fall back to equal with a warning.

use tracing::warn;

use crate::domain::{ModelForecast, Quarter, QuarterOutcome, WeightScheme};
use crate::math::{average_ranks, mean, quantile, ridge};
use crate::select::directional_hit_rate;

/// RMSE share of the adaptive score in calm and in volatile periods.
const ADAPTIVE_RMSE_SHARE: f64 = 0.7;
const ADAPTIVE_VOLATILE_RMSE_SHARE: f64 = 0.5;

/// Ridge penalty of the regression-based scheme.
const RIDGE_ALPHA: f64 = 1.0;

/// Weights aligned with the input models, summing to 1.
#[derive(Debug, Clone, PartialEq)]
pub struct Weights {
    pub values: Vec<f64>,
    /// `true` when the scheme could not be applied and equal weights were used.
    pub fell_back: bool,
}

pub fn compute_weights(scheme: WeightScheme, models: &[ModelForecast]) -> Weights {
    let n = models.len();
    if n == 0 {
        return Weights {
            values: Vec::new(),
            fell_back: false,
        };
    }

    let raw: Option<Vec<f64>> = match scheme {
        WeightScheme::Equal => Some(vec![1.0; n]),
        WeightScheme::InverseBic => inverse(models, |m| m.bic),
        WeightScheme::InverseRmse => inverse(models, |m| m.rmse),
        WeightScheme::BicLikelihood => bic_likelihood(models),
        WeightScheme::InverseMseShrinkage { lambda } => inverse_mse_shrinkage(models, lambda),
        WeightScheme::PerformanceRank => performance_rank(models),
        WeightScheme::Thick { top_n } => thick(models, top_n),
        WeightScheme::Adaptive { window } => adaptive(models, window),
        WeightScheme::RegressionBased { window } => regression_based(models, window),
    };

    match raw.and_then(normalize) {
        Some(values) => Weights {
            values,
            fell_back: false,
        },
        None => {
            warn!(scheme = scheme.label(), models = n, "metric unavailable for every model; using equal weights");
            Weights {
                values: vec![1.0 / n as f64; n],
                fell_back: true,
            }
        }
    }
}

fn normalize(raw: Vec<f64>) -> Option<Vec<f64>> {
    let total: f64 = raw.iter().sum();
    if !(total.is_finite() && total > 0.0) {
        return None;
    }
    Some(raw.into_iter().map(|w| w / total).collect())
}

fn positive(v: Option<f64>) -> Option<f64> {
    v.filter(|v| v.is_finite() && *v > 0.0)
}

fn inverse(models: &[ModelForecast], metric: impl Fn(&ModelForecast) -> Option<f64>) -> Option<Vec<f64>> {
    let raw: Vec<f64> = models
        .iter()
        .map(|m| positive(metric(m)).map_or(0.0, |v| 1.0 / v))
        .collect();
    raw.iter().any(|w| *w > 0.0).then_some(raw)
}

/// `exp(-0.5 (BIC_i - min BIC))`.
fn bic_likelihood(models: &[ModelForecast]) -> Option<Vec<f64>> {
    let bics: Vec<Option<f64>> = models
        .iter()
        .map(|m| m.bic.filter(|b| b.is_finite()))
        .collect();
    let min = bics.iter().flatten().copied().reduce(f64::min)?;
    Some(
        bics.iter()
            .map(|b| b.map_or(0.0, |b| (-0.5 * (b - min)).exp()))
            .collect(),
    )
}

/// `(1 - λ) w_invMSE + λ / N`, with `MSE = RMSE²`.
fn inverse_mse_shrinkage(models: &[ModelForecast], lambda: f64) -> Option<Vec<f64>> {
    let lambda = lambda.clamp(0.0, 1.0);
    let inv = inverse(models, |m| m.rmse.map(|r| r * r))?;
    let inv = normalize(inv)?;
    let equal = 1.0 / models.len() as f64;
    Some(inv.into_iter().map(|w| (1.0 - lambda) * w + lambda * equal).collect())
}

/// `1 / (rank RMSE + rank MAE + rank(-directional accuracy))`.
fn performance_rank(models: &[ModelForecast]) -> Option<Vec<f64>> {
    let scored: Vec<(usize, f64, f64, f64)> = models
        .iter()
        .enumerate()
        .filter_map(|(i, m)| {
            let rmse = positive(m.rmse)?;
            let mae = positive(m.mae)?;
            let dir = m.directional_accuracy.filter(|d| d.is_finite())?;
            Some((i, rmse, mae, dir))
        })
        .collect();
    if scored.is_empty() {
        return None;
    }

    let r_rmse = average_ranks(&scored.iter().map(|s| s.1).collect::<Vec<_>>());
    let r_mae = average_ranks(&scored.iter().map(|s| s.2).collect::<Vec<_>>());
    let r_dir = average_ranks(&scored.iter().map(|s| -s.3).collect::<Vec<_>>());

    let mut raw = vec![0.0; models.len()];
    for (j, s) in scored.iter().enumerate() {
        raw[s.0] = 1.0 / (r_rmse[j] + r_mae[j] + r_dir[j]);
    }
    Some(raw)
}

/// Equal weights over the `top_n` lowest-RMSE models.
fn thick(models: &[ModelForecast], top_n: usize) -> Option<Vec<f64>> {
    let mut ranked: Vec<(usize, f64)> = models
        .iter()
        .enumerate()
        .filter_map(|(i, m)| positive(m.rmse).map(|r| (i, r)))
        .collect();
    if ranked.is_empty() || top_n == 0 {
        return None;
    }
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

    let mut raw = vec![0.0; models.len()];
    for (i, _) in ranked.into_iter().take(top_n) {
        raw[i] = 1.0;
    }
    Some(raw)
}

/// `s / RMSE_w + (1 - s) · dir_acc_w` over each model's last `window` quarters.
///
/// `s` drops from 0.7 to 0.5 when the recent actuals are more dispersed than
/// their median level.
fn adaptive(models: &[ModelForecast], window: usize) -> Option<Vec<f64>> {
    if window == 0 {
        return None;
    }
    let rmse_share = if volatile_regime(models, window) {
        ADAPTIVE_VOLATILE_RMSE_SHARE
    } else {
        ADAPTIVE_RMSE_SHARE
    };
    let raw: Vec<f64> = models
        .iter()
        .map(|m| {
            let recent = tail(&m.history, window);
            match positive(outcome_rmse(recent)) {
                Some(rmse) => rmse_share / rmse + (1.0 - rmse_share) * directional_hit_rate(recent),
                None => 0.0,
            }
        })
        .collect();
    raw.iter().any(|w| *w > 0.0).then_some(raw)
}

fn tail(history: &[QuarterOutcome], window: usize) -> &[QuarterOutcome] {
    &history[history.len().saturating_sub(window)..]
}

fn outcome_rmse(outcomes: &[QuarterOutcome]) -> Option<f64> {
    let squared: Vec<f64> = outcomes
        .iter()
        .map(|o| (o.predicted - o.actual).powi(2))
        .collect();
    mean(&squared).map(f64::sqrt)
}

/// Population std of the last `window` actuals above the median of all of them.
///
/// Uses the first model with at least `window` quarters of history.
fn volatile_regime(models: &[ModelForecast], window: usize) -> bool {
    let Some(history) = models.iter().map(|m| &m.history).find(|h| h.len() >= window) else {
        return false;
    };
    let actuals: Vec<f64> = history.iter().map(|o| o.actual).collect();
    let recent = &actuals[actuals.len() - window..];
    let (Some(centre), Some(median)) = (mean(recent), quantile(&actuals, 0.5)) else {
        return false;
    };
    let volatility = (recent.iter().map(|a| (a - centre).powi(2)).sum::<f64>() / recent.len() as f64).sqrt();
    median != 0.0 && volatility > median
}

/// Ridge weights of the actuals on the models' past forecasts, negatives clipped.
///
/// Only models with at least `window` quarters of history take part, over the
/// latest `window` quarters they all share; everyone else gets zero.
fn regression_based(models: &[ModelForecast], window: usize) -> Option<Vec<f64>> {
    if window == 0 {
        return None;
    }
    let eligible: Vec<usize> = (0..models.len())
        .filter(|&i| models[i].history.len() >= window)
        .collect();
    let (&first, rest) = eligible.split_first()?;

    let mut shared: Vec<Quarter> = models[first].history.iter().map(|o| o.quarter).collect();
    for &i in rest {
        shared.retain(|q| models[i].history.iter().any(|o| o.quarter == *q));
    }
    if shared.len() < window {
        return None;
    }

    let outcome = |i: usize, q: Quarter| models[i].history.iter().find(|o| o.quarter == q);
    let mut rows = Vec::with_capacity(window);
    let mut y = Vec::with_capacity(window);
    for &q in &shared[shared.len() - window..] {
        let row = eligible
            .iter()
            .map(|&i| outcome(i, q).map(|o| o.predicted))
            .collect::<Option<Vec<f64>>>()?;
        rows.push(row);
        y.push(outcome(first, q)?.actual);
    }

    let beta = ridge(&rows, &y, RIDGE_ALPHA)?;
    let mut raw = vec![0.0; models.len()];
    for (&i, b) in eligible.iter().zip(beta) {
        raw[i] = b.max(0.0);
    }
    Some(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(point: f64, bic: Option<f64>, rmse: Option<f64>) -> ModelForecast {
        ModelForecast {
            name: format!("m{point}"),
            point,
            se: 0.2,
            bic,
            rmse,
            mae: rmse.map(|r| r * 0.8),
            directional_accuracy: rmse.map(|r| 1.0 / (1.0 + r)),
            history: Vec::new(),
        }
    }

    fn all_schemes() -> Vec<WeightScheme> {
        vec![
            WeightScheme::Equal,
            WeightScheme::InverseBic,
            WeightScheme::InverseRmse,
            WeightScheme::BicLikelihood,
            WeightScheme::InverseMseShrinkage { lambda: 0.2 },
            WeightScheme::PerformanceRank,
            WeightScheme::Thick { top_n: 2 },
            WeightScheme::Adaptive { window: 2 },
            WeightScheme::RegressionBased { window: 3 },
        ]
    }

    #[test]
    fn every_scheme_sums_to_one() {
        let models = vec![
            model(2.5, Some(150.0), Some(0.4)),
            model(2.3, Some(145.0), Some(0.6)),
            model(2.8, Some(155.0), None),
            model(2.1, None, Some(0.5)),
        ];
        for scheme in all_schemes() {
            let w = compute_weights(scheme, &models);
            let total: f64 = w.values.iter().sum();
            assert!((total - 1.0).abs() < 1e-9, "{scheme:?} sums to {total}");
            assert!(w.values.iter().all(|v| *v >= 0.0));
        }
    }

    #[test]
    fn inverse_bic_matches_hand_computation() {
        let models = vec![
            model(2.5, Some(150.0), None),
            model(2.3, Some(145.0), None),
            model(2.8, Some(155.0), None),
        ];
        let w = compute_weights(WeightScheme::InverseBic, &models).values;
        let raw = [1.0 / 150.0, 1.0 / 145.0, 1.0 / 155.0];
        let total: f64 = raw.iter().sum();
        for (got, r) in w.iter().zip(raw) {
            assert!((got - r / total).abs() < 1e-15);
        }
    }

    #[test]
    fn missing_metric_gets_zero_weight() {
        let models = vec![model(1.0, None, Some(0.5)), model(2.0, None, None)];
        let w = compute_weights(WeightScheme::InverseRmse, &models);
        assert_eq!(w.values, vec![1.0, 0.0]);
        assert!(!w.fell_back);
    }

    #[test]
    fn no_metric_falls_back_to_equal() {
        let models = vec![model(1.0, None, None), model(2.0, Some(-3.0), None)];
        for scheme in [WeightScheme::InverseRmse, WeightScheme::InverseBic, WeightScheme::PerformanceRank] {
            let w = compute_weights(scheme, &models);
            assert!(w.fell_back, "{scheme:?}");
            assert_eq!(w.values, vec![0.5, 0.5]);
        }
    }

    #[test]
    fn bic_likelihood_prefers_lower_bic() {
        let models = vec![model(1.0, Some(100.0), None), model(2.0, Some(102.0), None)];
        let w = compute_weights(WeightScheme::BicLikelihood, &models).values;
        let ratio = w[1] / w[0];
        assert!((ratio - (-1.0_f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn shrinkage_blends_toward_equal() {
        let models = vec![model(1.0, None, Some(1.0)), model(2.0, None, Some(2.0))];
        let w = compute_weights(WeightScheme::InverseMseShrinkage { lambda: 0.2 }, &models).values;
        // inverse MSE: [1, 0.25] -> [0.8, 0.2]; blended: 0.8*0.8 + 0.1, 0.8*0.2 + 0.1.
        assert!((w[0] - 0.74).abs() < 1e-12);
        assert!((w[1] - 0.26).abs() < 1e-12);
    }

    #[test]
    fn thick_keeps_top_n_by_rmse() {
        let models = vec![
            model(1.0, None, Some(0.9)),
            model(2.0, None, Some(0.1)),
            model(3.0, None, Some(0.5)),
        ];
        let w = compute_weights(WeightScheme::Thick { top_n: 2 }, &models).values;
        assert_eq!(w, vec![0.0, 0.5, 0.5]);
    }

    #[test]
    fn performance_rank_orders_by_summed_ranks() {
        let models = vec![model(1.0, None, Some(0.3)), model(2.0, None, Some(0.1)), model(3.0, None, Some(0.2))];
        let w = compute_weights(WeightScheme::PerformanceRank, &models).values;
        // Rank sums: 9, 3, 6.
        let raw = [1.0 / 9.0, 1.0 / 3.0, 1.0 / 6.0];
        let total: f64 = raw.iter().sum();
        for (got, r) in w.iter().zip(raw) {
            assert!((got - r / total).abs() < 1e-12);
        }
    }

    fn with_history(mut m: ModelForecast, pairs: &[(f64, f64)]) -> ModelForecast {
        let start = Quarter::new(2020, 1).unwrap();
        m.history = pairs
            .iter()
            .enumerate()
            .map(|(i, &(predicted, actual))| QuarterOutcome {
                quarter: start.offset(i as i64),
                predicted,
                actual,
            })
            .collect();
        m
    }

    #[test]
    fn adaptive_scores_recent_rmse_and_direction() {
        let models = vec![
            with_history(model(1.0, None, None), &[(1.1, 1.0), (2.1, 2.0), (3.1, 3.0), (4.1, 4.0)]),
            with_history(model(2.0, None, None), &[(1.5, 1.0), (2.5, 2.0), (3.5, 3.0), (3.0, 4.0)]),
            model(3.0, None, None),
        ];
        let w = compute_weights(WeightScheme::Adaptive { window: 2 }, &models);
        assert!(!w.fell_back);

        // Calm period: std of [3, 4] is 0.5, below the median 2.5.
        let a = 0.7 / 0.1 + 0.3 * 1.0;
        let b = 0.7 / ((0.25_f64 + 1.0) / 2.0).sqrt();
        assert!((w.values[0] - a / (a + b)).abs() < 1e-9);
        assert!((w.values[1] - b / (a + b)).abs() < 1e-9);
        assert_eq!(w.values[2], 0.0);
    }

    #[test]
    fn volatile_actuals_switch_the_adaptive_mix() {
        let calm = vec![with_history(model(1.0, None, None), &[(1.0, 1.0), (2.0, 2.0), (3.0, 3.0)])];
        assert!(!volatile_regime(&calm, 2));
        let wild = vec![with_history(model(1.0, None, None), &[(0.0, 0.1), (0.0, 0.1), (0.0, 5.0), (0.0, -5.0)])];
        assert!(volatile_regime(&wild, 2));
        assert!(!volatile_regime(&wild, 5));
    }

    #[test]
    fn regression_based_matches_ridge_solution() {
        let actuals = [1.0, 2.0, 3.0, 4.0, 5.0];
        let exact: Vec<(f64, f64)> = actuals.iter().map(|a| (*a, *a)).collect();
        let flat: Vec<(f64, f64)> = actuals.iter().map(|a| (3.0, *a)).collect();
        let models = vec![
            with_history(model(1.0, None, None), &exact),
            with_history(model(2.0, None, None), &flat),
            with_history(model(3.0, None, None), &exact[..2]),
        ];
        let w = compute_weights(WeightScheme::RegressionBased { window: 5 }, &models);
        assert!(!w.fell_back);
        // [[56, 45], [45, 46]] β = [55, 45] -> β = [505, 45] / 551.
        assert!((w.values[0] - 505.0 / 550.0).abs() < 1e-9);
        assert!((w.values[1] - 45.0 / 550.0).abs() < 1e-9);
        assert_eq!(w.values[2], 0.0);
    }

    #[test]
    fn regression_based_clips_negative_weights() {
        let actuals = [1.0, 2.0, 3.0, 4.0, 5.0];
        let exact: Vec<(f64, f64)> = actuals.iter().map(|a| (*a, *a)).collect();
        let mirrored: Vec<(f64, f64)> = actuals.iter().map(|a| (-*a, *a)).collect();
        let models = vec![
            with_history(model(1.0, None, None), &exact),
            with_history(model(2.0, None, None), &mirrored),
        ];
        let w = compute_weights(WeightScheme::RegressionBased { window: 5 }, &models);
        assert_eq!(w.values, vec![1.0, 0.0]);
    }

    #[test]
    fn short_histories_fall_back_to_equal() {
        let models = vec![
            with_history(model(1.0, None, None), &[(1.0, 1.0)]),
            model(2.0, None, None),
        ];
        let w = compute_weights(WeightScheme::RegressionBased { window: 4 }, &models);
        assert!(w.fell_back);
        assert_eq!(w.values, vec![0.5, 0.5]);
    }
}
