//! Apply a fixed `ModelSpec` to vintage features.
//!
//! Design rows are laid out as
//!
//! ```text
//! [1 (if intercept), x_0 .. x_{K-1}, y(t-1) .. y(t-p)]
//! ```
//!
//! where `x_i` is the monthly value `i` months before the vintage's last
//! available month and `y(t-j)` are lagged quarterly targets (autoregressive
//! mode only). A missing entry anywhere is a `MissingRegressorError`; it never
//! becomes a NaN in the row.

use crate::domain::{FittedModel, ModelSpec};
use crate::error::{ForecastError, MissingRegressorError, ModelFitError};
use crate::math::{fit_ols, predict_row};
use crate::select::IndicatorPanel;

/// A point forecast with its standard error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointForecast {
    pub point: f64,
    pub se: f64,
    /// BIC of the fit that produced the forecast.
    pub bic: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct ForecastEngine<'a> {
    spec: &'a ModelSpec,
}

impl<'a> ForecastEngine<'a> {
    pub fn new(spec: &'a ModelSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &ModelSpec {
        self.spec
    }

    pub fn design_row(
        &self,
        features: &[Option<f64>],
        ar: &[Option<f64>],
    ) -> Result<Vec<f64>, MissingRegressorError> {
        let k = self.spec.k;
        let p = self.spec.regressors.ar_lags();
        let mut row = Vec::with_capacity(self.spec.param_count());
        if self.spec.intercept {
            row.push(1.0);
        }
        for position in 0..k + p {
            let value = if position < k {
                features.get(position).copied().flatten()
            } else {
                ar.get(position - k).copied().flatten()
            };
            match value {
                Some(v) => row.push(v),
                None => {
                    return Err(MissingRegressorError {
                        indicator: self.spec.indicator.clone(),
                        position,
                    });
                }
            }
        }
        Ok(row)
    }

    /// Design row of quarter `t` at Friday `f`.
    pub fn panel_row(
        &self,
        panel: &IndicatorPanel,
        t: usize,
        f: usize,
    ) -> Result<Vec<f64>, MissingRegressorError> {
        let features = panel
            .features(t, f, self.spec.k)
            .ok_or_else(|| MissingRegressorError {
                indicator: self.spec.indicator.clone(),
                position: 0,
            })?;
        self.design_row(features, panel.ar_values(t, f))
    }

    /// Estimate on every quarter before `before` with a known actual, each at
    /// its own vintage with the same Friday index.
    pub fn train(
        &self,
        panel: &IndicatorPanel,
        friday_index: usize,
        before: usize,
    ) -> Result<FittedModel, ModelFitError> {
        let mut rows = Vec::new();
        let mut y = Vec::new();
        for j in 0..before.min(panel.len()) {
            let Some(actual) = panel.actual(j) else {
                continue;
            };
            if let Ok(row) = self.panel_row(panel, j, friday_index) {
                rows.push(row);
                y.push(actual);
            }
        }
        fit_ols(&rows, &y)
    }

    /// Forecast quarter `t` at Friday `f` with already-estimated coefficients.
    pub fn forecast(
        &self,
        fitted: &FittedModel,
        panel: &IndicatorPanel,
        t: usize,
        f: usize,
    ) -> Result<PointForecast, MissingRegressorError> {
        let row = self.panel_row(panel, t, f)?;
        Ok(PointForecast {
            point: predict_row(fitted, &row),
            se: fitted.residual_se(),
            bic: fitted.bic,
        })
    }

    /// Train on the quarters before `t`, then forecast `t` at Friday `f`.
    pub fn nowcast(
        &self,
        panel: &IndicatorPanel,
        t: usize,
        f: usize,
    ) -> Result<PointForecast, ForecastError> {
        let fitted = self.train(panel, f, t)?;
        let forecast = self.forecast(&fitted, panel, t, f)?;
        if !forecast.point.is_finite() {
            return Err(ModelFitError::NonFinite.into());
        }
        Ok(forecast)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RegressorMode;

    fn spec(k: usize, intercept: bool, regressors: RegressorMode) -> ModelSpec {
        ModelSpec {
            indicator: "IP".to_string(),
            k,
            intercept,
            regressors,
        }
    }

    #[test]
    fn design_row_layout() {
        let s = spec(2, true, RegressorMode::Autoregressive { ar_lags: 1 });
        let engine = ForecastEngine::new(&s);
        let row = engine
            .design_row(&[Some(0.5), Some(0.4)], &[Some(2.0)])
            .unwrap();
        assert_eq!(row, vec![1.0, 0.5, 0.4, 2.0]);
        assert_eq!(row.len(), s.param_count());
    }

    #[test]
    fn missing_monthly_lag_is_an_error() {
        let s = spec(3, true, RegressorMode::Ragged);
        let engine = ForecastEngine::new(&s);
        let err = engine.design_row(&[Some(1.0), None, Some(3.0)], &[]).unwrap_err();
        assert_eq!(
            err,
            MissingRegressorError {
                indicator: "IP".to_string(),
                position: 1
            }
        );
    }

    #[test]
    fn missing_ar_lag_is_an_error() {
        let s = spec(1, false, RegressorMode::Autoregressive { ar_lags: 2 });
        let engine = ForecastEngine::new(&s);
        let err = engine.design_row(&[Some(1.0)], &[Some(2.0), None]).unwrap_err();
        assert_eq!(err.position, 2);
    }

    #[test]
    fn short_feature_vector_is_missing_not_panic() {
        let s = spec(4, false, RegressorMode::Ragged);
        let engine = ForecastEngine::new(&s);
        let err = engine.design_row(&[Some(1.0), Some(2.0)], &[]).unwrap_err();
        assert_eq!(err.position, 2);
    }
}
