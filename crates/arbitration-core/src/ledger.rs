use serde::{Deserialize, Serialize};

use crate::nutrient::{Nutrient, SupplyCategory};
use crate::pools::NutrientPoolsState;

/// Supplies (or supply allocations) of one nutrient offered by one organ.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganSupplies {
    pub fixation: f64,
    pub uptake: f64,
    pub reallocation: NutrientPoolsState,
    pub retranslocation: NutrientPoolsState,
}

impl OrganSupplies {
    pub const ZERO: Self = Self {
        fixation: 0.0,
        uptake: 0.0,
        reallocation: NutrientPoolsState::ZERO,
        retranslocation: NutrientPoolsState::ZERO,
    };

    pub fn category(&self, category: SupplyCategory) -> f64 {
        match category {
            SupplyCategory::Fixation => self.fixation,
            SupplyCategory::Uptake => self.uptake,
            SupplyCategory::Reallocation => self.reallocation.total(),
            SupplyCategory::Retranslocation => self.retranslocation.total(),
        }
    }

    pub fn total(&self) -> f64 {
        self.fixation + self.uptake + self.reallocation.total() + self.retranslocation.total()
    }
}

/// Demand and supply one organ pushes into the ledger for one nutrient and day.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NutrientRequest {
    pub demand: NutrientPoolsState,
    /// Per-pool priority factors; the first allocation pass weights demand by these.
    pub priority: NutrientPoolsState,
    pub supplies: OrganSupplies,
    /// Minimum / critical / maximum concentration, held in the structural /
    /// metabolic / storage slots. Only meaningful for nitrogen.
    pub concentration: NutrientPoolsState,
}

/// Largest carbon increment the nitrogen actually allocated to an organ can support.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CarbonCap {
    /// Nitrogen demand was met; carbon growth is not limited.
    Unconstrained,
    Limited(f64),
}

impl CarbonCap {
    /// Numeric form, with `sentinel` standing in for an unconstrained organ.
    pub fn value_or(&self, sentinel: f64) -> f64 {
        match self {
            CarbonCap::Unconstrained => sentinel,
            CarbonCap::Limited(v) => *v,
        }
    }
}

/// Per-organ, per-nutrient record of today's demands, supplies and allocations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrganNutrientLedger {
    organ: String,
    nutrient: Nutrient,
    demands: NutrientPoolsState,
    priority_scaled_demand: NutrientPoolsState,
    supplies: OrganSupplies,
    supplies_allocated: OrganSupplies,
    demands_allocated: NutrientPoolsState,
    concentration: NutrientPoolsState,
    max_c_delta: CarbonCap,
}

impl OrganNutrientLedger {
    pub fn new(organ: impl Into<String>, nutrient: Nutrient) -> Self {
        Self {
            organ: organ.into(),
            nutrient,
            demands: NutrientPoolsState::ZERO,
            priority_scaled_demand: NutrientPoolsState::ZERO,
            supplies: OrganSupplies::ZERO,
            supplies_allocated: OrganSupplies::ZERO,
            demands_allocated: NutrientPoolsState::ZERO,
            concentration: NutrientPoolsState::ZERO,
            max_c_delta: CarbonCap::Unconstrained,
        }
    }

    pub fn organ(&self) -> &str {
        &self.organ
    }

    pub fn nutrient(&self) -> Nutrient {
        self.nutrient
    }

    /// Reset everything computed for the previous day.
    pub fn clear(&mut self) {
        let organ = std::mem::take(&mut self.organ);
        *self = Self::new(organ, self.nutrient);
    }

    /// Replace demand and supplies with today's request. Allocations are untouched.
    pub fn set_request(&mut self, request: &NutrientRequest) {
        self.demands = request.demand;
        self.priority_scaled_demand = request.demand.scaled_by(&request.priority);
        self.supplies = request.supplies;
        self.concentration = request.concentration;
    }

    /// Uptake is offered by the soil, not the organ, so it is set separately.
    pub fn set_uptake_supply(&mut self, uptake: f64) {
        self.supplies.uptake = uptake.max(0.0);
    }

    pub fn demands(&self) -> NutrientPoolsState {
        self.demands
    }

    pub fn priority_scaled_demand(&self) -> NutrientPoolsState {
        self.priority_scaled_demand
    }

    /// Demand not yet allocated; never negative.
    pub fn outstanding_demands(&self) -> NutrientPoolsState {
        self.demands - self.demands_allocated
    }

    pub fn supplies(&self) -> &OrganSupplies {
        &self.supplies
    }

    pub fn supplies_allocated(&self) -> &OrganSupplies {
        &self.supplies_allocated
    }

    pub fn demands_allocated(&self) -> NutrientPoolsState {
        self.demands_allocated
    }

    pub fn concentration(&self) -> NutrientPoolsState {
        self.concentration
    }

    pub fn max_c_delta(&self) -> CarbonCap {
        self.max_c_delta
    }

    pub fn set_max_c_delta(&mut self, cap: CarbonCap) {
        self.max_c_delta = cap;
    }

    /// Allocations only ever grow while an allocation pass runs.
    pub fn add_allocation(&mut self, allocation: NutrientPoolsState) {
        self.demands_allocated = self.demands_allocated + allocation;
    }

    /// Lower the demand allocation; components can only shrink.
    pub fn constrain_allocation(&mut self, capped: NutrientPoolsState) {
        self.demands_allocated = self.demands_allocated.min_each(&capped);
    }

    pub fn set_fixation_allocated(&mut self, amount: f64) {
        self.supplies_allocated.fixation = amount.max(0.0);
    }

    pub fn set_uptake_allocated(&mut self, amount: f64) {
        self.supplies_allocated.uptake = amount.max(0.0);
    }

    pub fn set_reallocation_allocated(&mut self, pools: NutrientPoolsState) {
        self.supplies_allocated.reallocation = pools;
    }

    pub fn set_retranslocation_allocated(&mut self, pools: NutrientPoolsState) {
        self.supplies_allocated.retranslocation = pools;
    }
}

/// Plant-level sums for one category, both offered and allocated.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SupplyTotals {
    pub fixation: f64,
    pub uptake: f64,
    pub reallocation: f64,
    pub retranslocation: f64,
}

impl SupplyTotals {
    pub fn category(&self, category: SupplyCategory) -> f64 {
        match category {
            SupplyCategory::Fixation => self.fixation,
            SupplyCategory::Uptake => self.uptake,
            SupplyCategory::Reallocation => self.reallocation,
            SupplyCategory::Retranslocation => self.retranslocation,
        }
    }

    pub fn total(&self) -> f64 {
        self.fixation + self.uptake + self.reallocation + self.retranslocation
    }

    fn accumulate(&mut self, s: &OrganSupplies) {
        self.fixation += s.fixation;
        self.uptake += s.uptake;
        self.reallocation += s.reallocation.total();
        self.retranslocation += s.retranslocation.total();
    }
}

/// Immutable aggregate of a [`PlantNutrientLedger`] taken at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct LedgerTotals {
    pub total_demand: f64,
    pub total_priority_scaled_demand: f64,
    pub total_demands_allocated: f64,
    pub supply: SupplyTotals,
    pub supply_allocated: SupplyTotals,
}

impl LedgerTotals {
    /// Demand not yet allocated, as computed (may be slightly negative from rounding).
    pub fn remaining_demand(&self) -> f64 {
        self.total_demand - self.total_demands_allocated
    }
}

/// All organs' ledgers for one nutrient, in registration order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlantNutrientLedger {
    nutrient: Nutrient,
    organs: Vec<OrganNutrientLedger>,
}

impl PlantNutrientLedger {
    pub fn new<I, S>(nutrient: Nutrient, organ_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let organs = organ_names
            .into_iter()
            .map(|name| OrganNutrientLedger::new(name, nutrient))
            .collect();
        Self { nutrient, organs }
    }

    pub fn nutrient(&self) -> Nutrient {
        self.nutrient
    }

    pub fn len(&self) -> usize {
        self.organs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.organs.is_empty()
    }

    pub fn organs(&self) -> &[OrganNutrientLedger] {
        &self.organs
    }

    pub fn organs_mut(&mut self) -> &mut [OrganNutrientLedger] {
        &mut self.organs
    }

    pub fn organ(&self, index: usize) -> Option<&OrganNutrientLedger> {
        self.organs.get(index)
    }

    pub fn organ_mut(&mut self, index: usize) -> Option<&mut OrganNutrientLedger> {
        self.organs.get_mut(index)
    }

    pub fn clear(&mut self) {
        for o in &mut self.organs {
            o.clear();
        }
    }

    /// One aggregation pass over the organ ledgers.
    pub fn totals(&self) -> LedgerTotals {
        let mut t = LedgerTotals::default();
        for o in &self.organs {
            t.total_demand += o.demands.total();
            t.total_priority_scaled_demand += o.priority_scaled_demand.total();
            t.total_demands_allocated += o.demands_allocated.total();
            t.supply.accumulate(&o.supplies);
            t.supply_allocated.accumulate(&o.supplies_allocated);
        }
        t
    }
}
