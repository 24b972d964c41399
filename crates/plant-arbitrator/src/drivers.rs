//! Collaborator seams: the physiology that produces rates and raw supplies,
//! the soil that grants nitrogen uptake, and the spatial model that spreads
//! an organ's daily flows over soil layers.

use std::fmt;

use arbitration_core::{NutrientPoolsState, OrganNutrientsState};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Per-organ daily inputs. Every method sees the organ's live biomass as it
/// stood at the start of the day.
pub trait OrganDrivers: fmt::Debug {
    fn senescence_rate(&self, live: &OrganNutrientsState) -> f64;
    fn detachment_rate(&self, dead: &OrganNutrientsState) -> f64;
    /// Fraction of non-structural live carbon lost to maintenance respiration.
    fn respiration_fraction(&self, live: &OrganNutrientsState) -> f64;
    fn carbon_demand(&self, live: &OrganNutrientsState) -> NutrientPoolsState;
    fn carbon_fixation(&self, live: &OrganNutrientsState) -> f64;
    fn nitrogen_fixation(&self, _live: &OrganNutrientsState) -> f64 {
        0.0
    }
}

/// Drivers that return the same numbers every day.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstantDrivers {
    pub senescence_rate: f64,
    pub detachment_rate: f64,
    pub respiration_fraction: f64,
    pub carbon_demand: NutrientPoolsState,
    pub carbon_fixation: f64,
    pub nitrogen_fixation: f64,
}

impl OrganDrivers for ConstantDrivers {
    fn senescence_rate(&self, _live: &OrganNutrientsState) -> f64 {
        self.senescence_rate
    }

    fn detachment_rate(&self, _dead: &OrganNutrientsState) -> f64 {
        self.detachment_rate
    }

    fn respiration_fraction(&self, _live: &OrganNutrientsState) -> f64 {
        self.respiration_fraction
    }

    fn carbon_demand(&self, _live: &OrganNutrientsState) -> NutrientPoolsState {
        self.carbon_demand
    }

    fn carbon_fixation(&self, _live: &OrganNutrientsState) -> f64 {
        self.carbon_fixation
    }

    fn nitrogen_fixation(&self, _live: &OrganNutrientsState) -> f64 {
        self.nitrogen_fixation
    }
}

/// One organ's outstanding nitrogen demand, reported to the soil before uptake.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UptakeDemand {
    pub organ: String,
    pub amount: f64,
}

/// Soil-side arbitration between plants. Receives this plant's demand
/// estimates and returns the nitrogen it actually grants (g/m2).
pub trait SoilUptake {
    fn grant(&mut self, date: NaiveDate, demands: &[UptakeDemand]) -> f64;
}

/// Soil with a fixed daily nitrogen availability and no competing plants.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FixedSoilUptake {
    pub available_per_day: f64,
}

impl FixedSoilUptake {
    pub fn new(available_per_day: f64) -> Self {
        Self { available_per_day }
    }
}

impl SoilUptake for FixedSoilUptake {
    fn grant(&mut self, _date: NaiveDate, demands: &[UptakeDemand]) -> f64 {
        let wanted: f64 = demands.iter().map(|d| d.amount.max(0.0)).sum();
        wanted.min(self.available_per_day.max(0.0))
    }
}

/// Whole-organ flow pools for one day, as handed to the spatial model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DailyFlows {
    pub allocated: OrganNutrientsState,
    pub senesced: OrganNutrientsState,
    pub reallocated: OrganNutrientsState,
    pub retranslocated: OrganNutrientsState,
    pub detached: OrganNutrientsState,
    pub respired: OrganNutrientsState,
    pub live_removed: OrganNutrientsState,
    pub dead_removed: OrganNutrientsState,
}

impl DailyFlows {
    pub fn empty(carbon_concentration: f64) -> Self {
        let e = OrganNutrientsState::empty(carbon_concentration);
        Self {
            allocated: e,
            senesced: e,
            reallocated: e,
            retranslocated: e,
            detached: e,
            respired: e,
            live_removed: e,
            dead_removed: e,
        }
    }

    fn all(&self) -> [&OrganNutrientsState; 8] {
        [
            &self.allocated,
            &self.senesced,
            &self.reallocated,
            &self.retranslocated,
            &self.detached,
            &self.respired,
            &self.live_removed,
            &self.dead_removed,
        ]
    }

    /// Sum of every flow's carbon, the quantity a partitioner must account for.
    pub fn carbon_total(&self) -> f64 {
        self.all().iter().map(|f| f.c()).sum()
    }

    pub fn nitrogen_total(&self) -> f64 {
        self.all().iter().map(|f| f.n()).sum()
    }
}

/// Totals a partitioner reports after spreading an organ's flows.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PartitionedTotals {
    pub carbon: f64,
    pub nitrogen: f64,
}

/// Spatial redistribution of an organ's flows. Owns its own layer state; it
/// never touches the organ's pools.
pub trait ZonePartitioner: fmt::Debug {
    fn partition(&mut self, flows: &DailyFlows) -> PartitionedTotals;
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct LayerState {
    pub live_carbon: f64,
    pub live_nitrogen: f64,
    pub dead_carbon: f64,
    pub dead_nitrogen: f64,
}

/// Spreads flows over soil layers by fixed relative weights (for example root
/// length per layer) and mirrors live and dead mass per layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayeredPartitioner {
    fractions: Vec<f64>,
    layers: Vec<LayerState>,
}

impl LayeredPartitioner {
    /// Weights are normalised; an all-zero or empty set puts everything in one layer.
    pub fn new(weights: &[f64]) -> Self {
        let total: f64 = weights.iter().map(|w| w.max(0.0)).sum();
        let fractions = if total > 0.0 {
            weights.iter().map(|w| w.max(0.0) / total).collect()
        } else {
            vec![1.0]
        };
        let layers = vec![LayerState::default(); fractions.len()];
        Self { fractions, layers }
    }

    pub fn layers(&self) -> &[LayerState] {
        &self.layers
    }
}

impl ZonePartitioner for LayeredPartitioner {
    fn partition(&mut self, flows: &DailyFlows) -> PartitionedTotals {
        let live_gain = |f: fn(&OrganNutrientsState) -> f64| {
            f(&flows.allocated)
                - f(&flows.senesced)
                - f(&flows.reallocated)
                - f(&flows.retranslocated)
                - f(&flows.respired)
                - f(&flows.live_removed)
        };
        let dead_gain = |f: fn(&OrganNutrientsState) -> f64| {
            f(&flows.senesced) - f(&flows.detached) - f(&flows.dead_removed)
        };
        let live_c = live_gain(OrganNutrientsState::c);
        let live_n = live_gain(OrganNutrientsState::n);
        let dead_c = dead_gain(OrganNutrientsState::c);
        let dead_n = dead_gain(OrganNutrientsState::n);
        let carbon = flows.carbon_total();
        let nitrogen = flows.nitrogen_total();

        let mut totals = PartitionedTotals::default();
        for (layer, share) in self.layers.iter_mut().zip(&self.fractions) {
            layer.live_carbon += live_c * share;
            layer.live_nitrogen += live_n * share;
            layer.dead_carbon += dead_c * share;
            layer.dead_nitrogen += dead_n * share;
            totals.carbon += carbon * share;
            totals.nitrogen += nitrogen * share;
        }
        totals
    }
}
