//! BIC lag-length selection with a pseudo-real-time expanding window.
//!
//! For one indicator and each candidate `K`:
//!
//! 1. For each Friday index `f` and each quarter `t` (from the second onward),
//!    train on every earlier quarter's vintage at the same Friday index.
//! 2. OLS via SVD, `BIC = n ln(SSE/n) + p ln n`.
//! 3. Predict quarter `t` with the same coefficients and record it.
//! 4. Sum BIC over all successful evaluations.
//!
//! The training matrix for a fixed `f` only ever grows by one row per quarter,
//! so it is kept append-only instead of rebuilt for every `t`.
//!
//! `K* = argmin` of the summed BIC over candidates with at least one valid
//! evaluation. Exact ties go to the smaller `K`.

use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::domain::{ForecastRecord, ModelSpec, RegressorMode};
use crate::error::SelectionError;
use crate::forecast::ForecastEngine;
use crate::math::{fit_ols, predict_row};
use crate::select::evaluation::ForecastAccuracy;
use crate::select::panel::IndicatorPanel;

/// Per-indicator wall-clock budget. Checked between evaluation sweeps.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    pub fn none() -> Self {
        Self { at: None }
    }

    pub fn after(budget: Duration) -> Self {
        Self {
            at: Some(Instant::now() + budget),
        }
    }

    pub fn expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SelectorConfig {
    pub max_lag: usize,
    pub intercept: bool,
    pub regressors: RegressorMode,
}

/// Evaluation history of one candidate lag count.
#[derive(Debug, Clone)]
pub struct CandidateEvaluation {
    pub k: usize,
    /// BIC summed over the evaluations of each panel quarter.
    quarter_bic: Vec<f64>,
    quarter_evals: Vec<usize>,
    /// Predicted value per panel slot.
    predictions: Vec<Option<f64>>,
}

impl CandidateEvaluation {
    fn new(k: usize, quarters: usize, slots: usize) -> Self {
        Self {
            k,
            quarter_bic: vec![0.0; quarters],
            quarter_evals: vec![0; quarters],
            predictions: vec![None; slots],
        }
    }

    fn record(&mut self, t: usize, slot: usize, bic: f64, predicted: f64) {
        self.quarter_bic[t] += bic;
        self.quarter_evals[t] += 1;
        self.predictions[slot] = Some(predicted);
    }

    pub fn total_bic(&self) -> f64 {
        self.quarter_bic.iter().sum()
    }

    pub fn evaluations(&self) -> usize {
        self.quarter_evals.iter().sum()
    }

    /// `(summed BIC, evaluations)` over quarters strictly before `t`.
    pub fn before(&self, t: usize) -> (f64, usize) {
        let t = t.min(self.quarter_bic.len());
        (
            self.quarter_bic[..t].iter().sum(),
            self.quarter_evals[..t].iter().sum(),
        )
    }

    pub fn prediction(&self, slot: usize) -> Option<f64> {
        self.predictions.get(slot).copied().flatten()
    }
}

/// One row of the candidate table in the selection summary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateSummary {
    pub k: usize,
    pub total_bic: f64,
    pub evaluations: usize,
}

/// Outcome of the lag search for one indicator.
#[derive(Debug, Clone)]
pub struct IndicatorSelection {
    pub indicator: String,
    /// Spec in force for the latest period that has one.
    pub spec: ModelSpec,
    /// Spec in force for each panel quarter; `None` while warming up (frozen mode).
    pub period_specs: Vec<Option<ModelSpec>>,
    pub total_bic: f64,
    /// Nowcasts of the in-force spec, ordered by quarter then as-of date.
    pub forecasts: Vec<ForecastRecord>,
    pub accuracy: ForecastAccuracy,
    pub candidates: Vec<CandidateSummary>,
}

pub struct ModelSelector {
    config: SelectorConfig,
}

impl ModelSelector {
    pub fn new(config: SelectorConfig) -> Self {
        Self { config }
    }

    pub fn spec_for(&self, indicator: &str, k: usize) -> ModelSpec {
        ModelSpec {
            indicator: indicator.to_string(),
            k,
            intercept: self.config.intercept,
            regressors: self.config.regressors,
        }
    }

    /// Evaluate every candidate `K` in `1..=max_lag`.
    pub fn evaluate(
        &self,
        panel: &IndicatorPanel,
        deadline: Deadline,
    ) -> Result<Vec<CandidateEvaluation>, SelectionError> {
        let max_k = self.config.max_lag.min(panel.max_k());
        (1..=max_k)
            .into_par_iter()
            .map(|k| self.evaluate_k(panel, k, deadline))
            .collect()
    }

    fn evaluate_k(
        &self,
        panel: &IndicatorPanel,
        k: usize,
        deadline: Deadline,
    ) -> Result<CandidateEvaluation, SelectionError> {
        let spec = self.spec_for(panel.indicator(), k);
        let engine = ForecastEngine::new(&spec);
        let params = spec.param_count();
        let mut eval = CandidateEvaluation::new(k, panel.len(), panel.slot_count());

        for f in 0..panel.max_fridays() {
            if deadline.expired() {
                return Err(SelectionError::Cancelled);
            }

            let mut rows: Vec<Vec<f64>> = Vec::with_capacity(panel.len());
            let mut y: Vec<f64> = Vec::with_capacity(panel.len());

            for t in 0..panel.len() {
                if t > 0 {
                    if let (Some(actual), Ok(row)) =
                        (panel.actual(t - 1), engine.panel_row(panel, t - 1, f))
                    {
                        rows.push(row);
                        y.push(actual);
                    }
                }

                let Some(slot) = panel.slot(t, f) else {
                    continue;
                };
                if t == 0 || rows.len() <= params {
                    continue;
                }

                let fitted = match fit_ols(&rows, &y) {
                    Ok(fitted) => fitted,
                    Err(err) => {
                        trace!(indicator = %panel.indicator(), k, t, f, %err, "candidate skipped");
                        continue;
                    }
                };
                let Ok(row) = engine.panel_row(panel, t, f) else {
                    continue;
                };
                let predicted = predict_row(&fitted, &row);
                if predicted.is_finite() && fitted.bic.is_finite() {
                    eval.record(t, slot, fitted.bic, predicted);
                }
            }
        }

        debug!(
            indicator = %panel.indicator(),
            k,
            evaluations = eval.evaluations(),
            total_bic = eval.total_bic(),
            "lag candidate evaluated"
        );
        Ok(eval)
    }

    /// One search over the whole panel; the winner holds for every quarter.
    pub fn select_full(
        &self,
        panel: &IndicatorPanel,
        deadline: Deadline,
    ) -> Result<IndicatorSelection, SelectionError> {
        let candidates = self.evaluate(panel, deadline)?;
        let (best, total_bic) =
            argmin_bic(candidates.iter().map(|c| (c.k, c.total_bic(), c.evaluations())))
                .ok_or(SelectionError::NoValidCandidate)?;

        let spec = self.spec_for(panel.indicator(), best);
        let period_specs = vec![Some(spec.clone()); panel.len()];
        Ok(self.assemble(panel, &candidates, spec, period_specs, total_bic))
    }

    /// Re-select at every quarter boundary from the quarters strictly before it.
    ///
    /// Every evaluation of quarter `t'` only uses data up to `t'`, so the BIC
    /// accumulated over `t' < t` is exactly what a search run at the start of
    /// `t` would see.
    pub fn select_frozen(
        &self,
        panel: &IndicatorPanel,
        deadline: Deadline,
    ) -> Result<IndicatorSelection, SelectionError> {
        let candidates = self.evaluate(panel, deadline)?;

        let mut period_specs = Vec::with_capacity(panel.len());
        let mut last = None;
        for t in 0..panel.len() {
            let choice = argmin_bic(candidates.iter().map(|c| {
                let (bic, evals) = c.before(t);
                (c.k, bic, evals)
            }));
            let spec = choice.map(|(k, _)| self.spec_for(panel.indicator(), k));
            if choice.is_some() {
                last = choice;
            }
            period_specs.push(spec);
        }

        let (best, total_bic) = last.ok_or(SelectionError::NoValidCandidate)?;
        let spec = self.spec_for(panel.indicator(), best);
        Ok(self.assemble(panel, &candidates, spec, period_specs, total_bic))
    }

    fn assemble(
        &self,
        panel: &IndicatorPanel,
        candidates: &[CandidateEvaluation],
        spec: ModelSpec,
        period_specs: Vec<Option<ModelSpec>>,
        total_bic: f64,
    ) -> IndicatorSelection {
        let mut forecasts = Vec::new();
        for (t, period_spec) in period_specs.iter().enumerate() {
            let (Some(period_spec), Some(quarter)) = (period_spec, panel.quarter(t)) else {
                continue;
            };
            let Some(candidate) = candidates.iter().find(|c| c.k == period_spec.k) else {
                continue;
            };
            for f in 0..panel.friday_count(t) {
                let (Some(slot), Some(vintage_date)) = (panel.slot(t, f), panel.as_of(t, f)) else {
                    continue;
                };
                if let Some(predicted) = candidate.prediction(slot) {
                    forecasts.push(ForecastRecord {
                        indicator: panel.indicator().to_string(),
                        quarter,
                        vintage_date,
                        k: period_spec.k,
                        predicted,
                        actual: panel.actual(t),
                    });
                }
            }
        }

        let accuracy = ForecastAccuracy::from_records(&forecasts);
        let summaries = candidates
            .iter()
            .map(|c| CandidateSummary {
                k: c.k,
                total_bic: c.total_bic(),
                evaluations: c.evaluations(),
            })
            .collect();

        IndicatorSelection {
            indicator: panel.indicator().to_string(),
            spec,
            period_specs,
            total_bic,
            forecasts,
            accuracy,
            candidates: summaries,
        }
    }
}

/// Smallest summed BIC among candidates with at least one evaluation.
///
/// Candidates must arrive in increasing `K`; a later candidate only wins when
/// strictly better, so ties keep the smaller `K`.
pub fn argmin_bic(candidates: impl Iterator<Item = (usize, f64, usize)>) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (k, bic, evals) in candidates {
        if evals == 0 || !bic.is_finite() {
            continue;
        }
        match best {
            Some((_, b)) if bic >= b => {}
            _ => best = Some((k, bic)),
        }
    }
    best
}
