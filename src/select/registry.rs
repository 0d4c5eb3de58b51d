//! Explicit (indicator, period) -> `ModelSpec` mapping.
//!
//! Each indicator moves through
//!
//! ```text
//! Unselected -> Selected(K)                       full mode, one search
//! Unselected -> Frozen(K, period)                 frozen mode, first boundary
//! Frozen     -> Reselecting -> Frozen(K', next)   every later boundary
//! ```
//!
//! Once a spec is recorded for a period it cannot change, so forecast moves
//! inside a period are attributable to new data alone.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{ModelSpec, Quarter, SelectionMode};
use crate::error::RegistryError;
use crate::select::selector::IndicatorSelection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SelectionState {
    Unselected,
    Selected { k: usize },
    Frozen { k: usize, period: Quarter },
    Reselecting { k: usize, period: Quarter },
}

impl SelectionState {
    fn label(&self) -> &'static str {
        match self {
            SelectionState::Unselected => "unselected",
            SelectionState::Selected { .. } => "selected",
            SelectionState::Frozen { .. } => "frozen",
            SelectionState::Reselecting { .. } => "reselecting",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelRegistry {
    states: BTreeMap<String, SelectionState>,
    specs: BTreeMap<String, BTreeMap<Quarter, ModelSpec>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, indicator: &str) -> SelectionState {
        self.states
            .get(indicator)
            .copied()
            .unwrap_or(SelectionState::Unselected)
    }

    pub fn spec_for(&self, indicator: &str, period: Quarter) -> Option<&ModelSpec> {
        self.specs.get(indicator)?.get(&period)
    }

    pub fn indicators(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    /// All recorded `(indicator, period, spec)` triples, ordered.
    pub fn entries(&self) -> impl Iterator<Item = (&str, Quarter, &ModelSpec)> {
        self.specs.iter().flat_map(|(id, by_period)| {
            by_period
                .iter()
                .map(move |(period, spec)| (id.as_str(), *period, spec))
        })
    }

    pub fn len(&self) -> usize {
        self.specs.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `Unselected -> Selected(K)`: one spec for every period in `periods`.
    pub fn select(&mut self, spec: &ModelSpec, periods: &[Quarter]) -> Result<(), RegistryError> {
        let indicator = spec.indicator.clone();
        match self.state(&indicator) {
            SelectionState::Unselected => {}
            other => return Err(invalid(&indicator, other, "selected")),
        }
        for period in periods {
            self.insert(spec, *period)?;
        }
        self.states
            .insert(indicator, SelectionState::Selected { k: spec.k });
        Ok(())
    }

    /// Hold `spec` fixed for `period`.
    pub fn freeze(&mut self, spec: &ModelSpec, period: Quarter) -> Result<(), RegistryError> {
        let indicator = spec.indicator.clone();
        match self.state(&indicator) {
            SelectionState::Unselected | SelectionState::Selected { .. } => {}
            SelectionState::Reselecting { period: p, .. } if p == period => {}
            other => return Err(invalid(&indicator, other, "frozen")),
        }
        self.insert(spec, period)?;
        self.states
            .insert(indicator, SelectionState::Frozen { k: spec.k, period });
        Ok(())
    }

    /// `Frozen(K, p) -> Reselecting` at the boundary into `next`.
    pub fn begin_reselect(&mut self, indicator: &str, next: Quarter) -> Result<(), RegistryError> {
        match self.state(indicator) {
            SelectionState::Frozen { k, period } if next > period => {
                self.states.insert(
                    indicator.to_string(),
                    SelectionState::Reselecting { k, period: next },
                );
                Ok(())
            }
            other => Err(invalid(indicator, other, "reselecting")),
        }
    }

    /// Record a finished lag search under `mode`.
    pub fn record(
        &mut self,
        selection: &IndicatorSelection,
        periods: &[Quarter],
        mode: SelectionMode,
    ) -> Result<(), RegistryError> {
        match mode {
            SelectionMode::Full => self.select(&selection.spec, periods),
            SelectionMode::Frozen => {
                for (period, spec) in periods.iter().zip(&selection.period_specs) {
                    let Some(spec) = spec else {
                        continue;
                    };
                    if matches!(self.state(&spec.indicator), SelectionState::Frozen { .. }) {
                        self.begin_reselect(&spec.indicator, *period)?;
                    }
                    self.freeze(spec, *period)?;
                }
                Ok(())
            }
        }
    }

    fn insert(&mut self, spec: &ModelSpec, period: Quarter) -> Result<(), RegistryError> {
        let by_period = self.specs.entry(spec.indicator.clone()).or_default();
        match by_period.get(&period) {
            Some(existing) if existing != spec => Err(RegistryError::Immutable {
                indicator: spec.indicator.clone(),
                period,
                existing: existing.k,
            }),
            Some(_) => Ok(()),
            None => {
                by_period.insert(period, spec.clone());
                Ok(())
            }
        }
    }
}

fn invalid(indicator: &str, from: SelectionState, to: &'static str) -> RegistryError {
    RegistryError::InvalidTransition {
        indicator: indicator.to_string(),
        from: from.label(),
        to,
    }
}
