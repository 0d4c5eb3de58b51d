//! Forecast combination with a two-part variance.
//!
//! ```text
//! point       = Σ w_i p_i
//! within_var  = Σ w_i² se_i²
//! between_var = Σ w_i (p_i - point)²
//! se          = sqrt(within_var + between_var)
//! interval    = point ± z(coverage) · se
//! ```

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::combine::trim::trim;
use crate::combine::weights::compute_weights;
use crate::domain::{CombinationResult, ModelForecast, TrimConfig, WeightScheme};
use crate::math::z_for_coverage;

pub const DEFAULT_COVERAGE: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Combiner {
    pub scheme: WeightScheme,
    pub trim: Option<TrimConfig>,
    pub coverage: f64,
}

impl Combiner {
    pub fn new(scheme: WeightScheme) -> Self {
        Self {
            scheme,
            trim: None,
            coverage: DEFAULT_COVERAGE,
        }
    }

    pub fn with_trim(mut self, trim: Option<TrimConfig>) -> Self {
        self.trim = trim;
        self
    }

    pub fn with_coverage(mut self, coverage: f64) -> Self {
        self.coverage = coverage;
        self
    }

    /// Combine one vintage's forecasts. Never fails: with nothing valid to
    /// combine, the result's numeric fields are `None`.
    pub fn combine(&self, models: &[ModelForecast], as_of: Option<NaiveDate>) -> CombinationResult {
        let valid: Vec<ModelForecast> = models
            .iter()
            .filter(|m| m.point.is_finite() && m.se.is_finite() && m.se >= 0.0)
            .cloned()
            .collect();

        if valid.is_empty() {
            warn!(as_of = ?as_of, models = models.len(), "no valid forecasts to combine");
            return self.empty(as_of, models.len());
        }

        let survivors = match self.trim {
            Some(cfg) => trim(&valid, cfg.percentile, cfg.metric),
            None => valid,
        };

        let weights = compute_weights(self.scheme, &survivors).values;
        let point: f64 = survivors.iter().zip(&weights).map(|(m, w)| w * m.point).sum();
        let within_var: f64 = survivors
            .iter()
            .zip(&weights)
            .map(|(m, w)| w * w * m.se * m.se)
            .sum();
        let between_var: f64 = survivors
            .iter()
            .zip(&weights)
            .map(|(m, w)| w * (m.point - point).powi(2))
            .sum();
        let se = (within_var + between_var).sqrt();
        let z = z_for_coverage(self.coverage);

        debug!(
            as_of = ?as_of,
            scheme = self.scheme.label(),
            survivors = survivors.len(),
            point,
            se,
            "combined forecast"
        );

        let weight_map: BTreeMap<String, f64> = survivors
            .iter()
            .zip(&weights)
            .map(|(m, w)| (m.name.clone(), *w))
            .collect();

        CombinationResult {
            scheme: self.scheme,
            as_of,
            n_models_input: models.len(),
            n_models_used: weights.iter().filter(|w| **w > 0.0).count(),
            weights: weight_map,
            point: Some(point),
            lo: Some(point - z * se),
            hi: Some(point + z * se),
            se: Some(se),
            within_var: Some(within_var),
            between_var: Some(between_var),
            coverage: self.coverage,
        }
    }

    fn empty(&self, as_of: Option<NaiveDate>, n_input: usize) -> CombinationResult {
        CombinationResult {
            scheme: self.scheme,
            as_of,
            weights: BTreeMap::new(),
            point: None,
            lo: None,
            hi: None,
            se: None,
            within_var: None,
            between_var: None,
            coverage: self.coverage,
            n_models_input: n_input,
            n_models_used: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TrimMetric;

    fn model(name: &str, point: f64, se: f64, bic: Option<f64>, rmse: Option<f64>) -> ModelForecast {
        ModelForecast {
            name: name.to_string(),
            point,
            se,
            bic,
            rmse,
            mae: None,
            directional_accuracy: None,
            history: Vec::new(),
        }
    }

    fn three() -> Vec<ModelForecast> {
        vec![
            model("a", 2.5, 0.3, Some(150.0), Some(0.5)),
            model("b", 2.3, 0.4, Some(145.0), Some(0.6)),
            model("c", 2.8, 0.2, Some(155.0), Some(0.4)),
        ]
    }

    #[test]
    fn equal_weights_average() {
        let r = Combiner::new(WeightScheme::Equal).combine(&three(), None);
        assert!((r.point.unwrap() - 2.533).abs() < 1e-3);
        assert_eq!(r.n_models_input, 3);
        assert_eq!(r.n_models_used, 3);
    }

    #[test]
    fn inverse_bic_point_is_the_weighted_average() {
        let r = Combiner::new(WeightScheme::InverseBic).combine(&three(), None);
        let raw = [1.0 / 150.0, 1.0 / 145.0, 1.0 / 155.0];
        let total: f64 = raw.iter().sum();
        let expected = (raw[0] * 2.5 + raw[1] * 2.3 + raw[2] * 2.8) / total;
        assert!((r.point.unwrap() - expected).abs() < 1e-12);
        assert!((r.weights["b"] - raw[1] / total).abs() < 1e-15);
    }

    #[test]
    fn variance_decomposes_and_interval_is_symmetric() {
        let r = Combiner::new(WeightScheme::InverseRmse)
            .with_coverage(0.95)
            .combine(&three(), None);
        let se = r.se.unwrap();
        assert_eq!(se, (r.within_var.unwrap() + r.between_var.unwrap()).sqrt());
        let point = r.point.unwrap();
        let half = 1.959_963_985 * se;
        assert!((r.hi.unwrap() - point - half).abs() < 1e-6);
        assert!((point - r.lo.unwrap() - half).abs() < 1e-6);
        let total: f64 = r.weights.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn nothing_valid_gives_an_empty_result() {
        let models = vec![model("a", f64::NAN, 0.1, None, None), model("b", 1.0, f64::INFINITY, None, None)];
        let r = Combiner::new(WeightScheme::Equal).combine(&models, None);
        assert_eq!(r.point, None);
        assert_eq!(r.lo, None);
        assert_eq!(r.hi, None);
        assert_eq!(r.n_models_input, 2);
        assert_eq!(r.n_models_used, 0);
        assert!(r.weights.is_empty());

        let r = Combiner::new(WeightScheme::Equal).combine(&[], None);
        assert_eq!(r.se, None);
    }

    #[test]
    fn trimming_happens_before_weighting() {
        let models: Vec<ModelForecast> = (1..=20)
            .map(|i| model(&format!("m{i:02}"), i as f64, 0.1, None, Some(i as f64)))
            .collect();
        let r = Combiner::new(WeightScheme::Equal)
            .with_trim(Some(TrimConfig {
                percentile: 0.25,
                metric: TrimMetric::Rmse,
            }))
            .combine(&models, None);
        assert_eq!(r.n_models_used, 15);
        assert!((r.point.unwrap() - 8.0).abs() < 1e-12);
    }
}
