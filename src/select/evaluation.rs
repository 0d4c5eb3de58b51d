//! Out-of-sample accuracy of a forecast history.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{ForecastRecord, Quarter, QuarterOutcome};

/// Accuracy statistics over forecasts with a known actual.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastAccuracy {
    /// Number of forecasts with a known actual.
    pub n: usize,
    pub rmse: Option<f64>,
    pub mae: Option<f64>,
    /// Share of quarter-to-quarter moves whose direction the final nowcast got right.
    pub directional_accuracy: Option<f64>,
}

impl ForecastAccuracy {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ForecastRecord>) -> Self {
        let scored: Vec<&ForecastRecord> = records
            .into_iter()
            .filter(|r| r.actual.is_some() && r.predicted.is_finite())
            .collect();
        if scored.is_empty() {
            return Self::default();
        }

        let n = scored.len();
        let errors: Vec<f64> = scored
            .iter()
            .filter_map(|r| r.actual.map(|a| r.predicted - a))
            .collect();
        let mse = errors.iter().map(|e| e * e).sum::<f64>() / n as f64;
        let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n as f64;

        Self {
            n,
            rmse: Some(mse.sqrt()),
            mae: Some(mae),
            directional_accuracy: Some(directional_hit_rate(&final_outcomes(scored.iter().copied()))),
        }
    }

    /// Accuracy over the last `window` quarters present in `records`.
    pub fn trailing(records: &[ForecastRecord], window: usize) -> Self {
        let mut quarters: Vec<Quarter> = records
            .iter()
            .filter(|r| r.actual.is_some())
            .map(|r| r.quarter)
            .collect();
        quarters.sort();
        quarters.dedup();
        let Some(first) = quarters.len().checked_sub(window).and_then(|i| quarters.get(i)) else {
            return Self::from_records(records);
        };
        Self::from_records(records.iter().filter(|r| r.quarter >= *first))
    }
}

/// What the combiner knows about a model's past when nowcasting `target`:
/// only quarters strictly before it count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackRecord {
    pub accuracy: ForecastAccuracy,
    pub outcomes: Vec<QuarterOutcome>,
}

impl TrackRecord {
    /// `window` limits the accuracy metrics to the last N quarters; the
    /// outcome list always keeps every earlier quarter.
    pub fn before(records: &[ForecastRecord], target: Quarter, window: Option<usize>) -> Self {
        let history: Vec<ForecastRecord> = records
            .iter()
            .filter(|r| r.quarter < target)
            .cloned()
            .collect();
        let accuracy = match window {
            Some(n) => ForecastAccuracy::trailing(&history, n),
            None => ForecastAccuracy::from_records(&history),
        };
        Self {
            accuracy,
            outcomes: final_outcomes(&history),
        }
    }
}

/// Last nowcast of each quarter with a known actual, oldest first.
pub fn final_outcomes<'a>(records: impl IntoIterator<Item = &'a ForecastRecord>) -> Vec<QuarterOutcome> {
    let mut finals: BTreeMap<Quarter, &ForecastRecord> = BTreeMap::new();
    for r in records {
        if r.actual.is_none() || !r.predicted.is_finite() {
            continue;
        }
        finals
            .entry(r.quarter)
            .and_modify(|cur| {
                if r.vintage_date > cur.vintage_date {
                    *cur = r;
                }
            })
            .or_insert(r);
    }
    finals
        .into_values()
        .filter_map(|r| {
            r.actual.map(|actual| QuarterOutcome {
                quarter: r.quarter,
                predicted: r.predicted,
                actual,
            })
        })
        .collect()
}

/// Share of consecutive moves where forecast and actual changed in the same
/// strict direction. A flat move on either side is a miss. `0.5` below two points.
pub fn directional_hit_rate(outcomes: &[QuarterOutcome]) -> f64 {
    if outcomes.len() < 2 {
        return 0.5;
    }
    let hits = outcomes
        .windows(2)
        .filter(|pair| {
            let forecast_move = pair[1].predicted - pair[0].predicted;
            let actual_move = pair[1].actual - pair[0].actual;
            forecast_move * actual_move > 0.0
        })
        .count();
    hits as f64 / (outcomes.len() - 1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn rec(q: u32, day: u32, predicted: f64, actual: Option<f64>) -> ForecastRecord {
        ForecastRecord {
            indicator: "X".to_string(),
            quarter: Quarter::new(2023, q).unwrap(),
            vintage_date: NaiveDate::from_ymd_opt(2023, q * 3, day).unwrap(),
            k: 1,
            predicted,
            actual,
        }
    }

    #[test]
    fn rmse_and_mae_skip_unknown_actuals() {
        let records = vec![
            rec(1, 3, 1.0, Some(2.0)),
            rec(1, 10, 4.0, Some(2.0)),
            rec(2, 3, 9.0, None),
        ];
        let acc = ForecastAccuracy::from_records(&records);
        assert_eq!(acc.n, 2);
        assert!((acc.rmse.unwrap() - (2.5_f64).sqrt()).abs() < 1e-12);
        assert!((acc.mae.unwrap() - 1.5).abs() < 1e-12);
        assert_eq!(acc.directional_accuracy, Some(0.5));
    }

    #[test]
    fn nothing_scored_is_all_none() {
        let acc = ForecastAccuracy::from_records(&[rec(1, 3, 1.0, None)]);
        assert_eq!(acc, ForecastAccuracy::default());
    }

    #[test]
    fn direction_uses_final_nowcast_per_quarter() {
        let records = vec![
            rec(1, 10, 1.0, Some(1.0)),
            // Early nowcast of Q2 points the wrong way; the final one is right.
            rec(2, 3, 0.0, Some(2.0)),
            rec(2, 10, 3.0, Some(2.0)),
            rec(3, 10, 2.5, Some(1.5)),
            rec(4, 10, 2.0, Some(1.8)),
        ];
        let acc = ForecastAccuracy::from_records(&records);
        // Q1->Q2 up/up hit, Q2->Q3 down/down hit, Q3->Q4 down/up miss.
        assert!((acc.directional_accuracy.unwrap() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn trailing_window_keeps_latest_quarters() {
        let records = vec![
            rec(1, 10, 10.0, Some(0.0)),
            rec(2, 10, 1.0, Some(0.0)),
            rec(3, 10, 1.0, Some(0.0)),
        ];
        let acc = ForecastAccuracy::trailing(&records, 2);
        assert_eq!(acc.n, 2);
        assert!((acc.rmse.unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(ForecastAccuracy::trailing(&records, 10).n, 3);
    }

    #[test]
    fn flat_moves_are_not_direction_hits() {
        let records = vec![
            rec(1, 10, 1.0, Some(1.0)),
            rec(2, 10, 1.0, Some(1.0)),
            rec(3, 10, 2.0, Some(3.0)),
        ];
        let acc = ForecastAccuracy::from_records(&records);
        // Q1->Q2 flat/flat is a miss, Q2->Q3 up/up a hit.
        assert_eq!(acc.directional_accuracy, Some(0.5));
    }

    #[test]
    fn final_outcomes_keep_latest_vintage_with_actual() {
        let records = vec![
            rec(1, 3, 0.5, Some(1.0)),
            rec(1, 10, 0.9, Some(1.0)),
            rec(2, 10, 2.0, None),
        ];
        let outcomes = final_outcomes(&records);
        assert_eq!(
            outcomes,
            vec![QuarterOutcome {
                quarter: Quarter::new(2023, 1).unwrap(),
                predicted: 0.9,
                actual: 1.0,
            }]
        );
        assert_eq!(directional_hit_rate(&outcomes), 0.5);
    }

    #[test]
    fn track_record_ignores_target_and_later_quarters() {
        let records = vec![
            rec(1, 10, 1.0, Some(1.5)),
            rec(2, 10, 2.0, Some(2.0)),
            rec(3, 10, 9.0, Some(0.0)),
        ];
        let track = TrackRecord::before(&records, Quarter::new(2023, 3).unwrap(), None);
        assert_eq!(track.accuracy.n, 2);
        assert_eq!(track.outcomes.len(), 2);
        assert!(track.outcomes.iter().all(|o| o.quarter < Quarter::new(2023, 3).unwrap()));

        let windowed = TrackRecord::before(&records, Quarter::new(2023, 4).unwrap(), Some(1));
        assert_eq!(windowed.accuracy.n, 1);
        assert_eq!(windowed.outcomes.len(), 3);
    }
}
