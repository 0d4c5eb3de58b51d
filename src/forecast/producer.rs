//! Model families that feed the combiner.
//!
//! Anything that can forecast the target quarter at an as-of Friday and report
//! its fit quality can take part in trimming and weighting.

use crate::domain::{ModelForecast, ModelSpec};
use crate::error::ForecastError;
use crate::forecast::engine::ForecastEngine;
use crate::select::{IndicatorPanel, TrackRecord};

pub trait ForecastProducer: Send + Sync {
    /// Name used as the model key in combination weights.
    fn name(&self) -> &str;

    /// Forecast the target quarter at the given Friday index.
    fn produce(&self, friday_index: usize) -> Result<ModelForecast, ForecastError>;
}

/// U-MIDAS regression of the target on one indicator's monthly lags.
pub struct UMidasProducer<'a> {
    panel: &'a IndicatorPanel,
    spec: ModelSpec,
    target: usize,
    track: TrackRecord,
}

impl<'a> UMidasProducer<'a> {
    /// `target` is the panel index of the quarter being nowcast; `track`
    /// should only cover quarters before it.
    pub fn new(
        panel: &'a IndicatorPanel,
        spec: ModelSpec,
        target: usize,
        track: TrackRecord,
    ) -> Self {
        Self {
            panel,
            spec,
            target,
            track,
        }
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }
}

impl ForecastProducer for UMidasProducer<'_> {
    fn name(&self) -> &str {
        &self.spec.indicator
    }

    fn produce(&self, friday_index: usize) -> Result<ModelForecast, ForecastError> {
        let engine = ForecastEngine::new(&self.spec);
        let forecast = engine.nowcast(self.panel, self.target, friday_index)?;
        Ok(ModelForecast {
            name: self.spec.indicator.clone(),
            point: forecast.point,
            se: forecast.se,
            bic: Some(forecast.bic),
            rmse: self.track.accuracy.rmse,
            mae: self.track.accuracy.mae,
            directional_accuracy: self.track.accuracy.directional_accuracy,
            history: self.track.outcomes.clone(),
        })
    }
}

/// Forecasts of every producer that succeeds at `friday_index`, in input order.
///
/// Failures only drop that producer for this vintage.
pub fn collect_forecasts(
    producers: &[Box<dyn ForecastProducer + '_>],
    friday_index: usize,
) -> Vec<ModelForecast> {
    producers
        .iter()
        .filter_map(|p| match p.produce(friday_index) {
            Ok(forecast) => Some(forecast),
            Err(err) => {
                tracing::debug!(model = %p.name(), friday_index, %err, "model excluded from vintage");
                None
            }
        })
        .collect()
}
