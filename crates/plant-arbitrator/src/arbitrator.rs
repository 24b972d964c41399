use std::collections::HashSet;

use arbitration_core::{
    do_allocation, share_of_allocation, share_of_pooled_allocation, ArbitrationConfig,
    ArbitrationError, CarbonCap, Nutrient, NutrientPoolsState, NutrientRequest,
    PlantNutrientLedger, SupplyCategory,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::drivers::UptakeDemand;
use crate::params::{OrganParams, OrganRole};

/// Order in which supply allocations give carbon back when nitrogen cannot
/// support the growth already allocated.
pub const WIND_BACK_ORDER: [SupplyCategory; 3] = [
    SupplyCategory::Retranslocation,
    SupplyCategory::Fixation,
    SupplyCategory::Reallocation,
];

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PoolPair {
    pub carbon: NutrientPoolsState,
    pub nitrogen: NutrientPoolsState,
}

/// Everything one organ needs from arbitration to apply its daily flows.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct OrganAllocation {
    pub reallocation: PoolPair,
    pub retranslocation: PoolPair,
    pub growth: PoolPair,
}

/// Whole-plant results of one day's arbitration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ArbitrationOutputs {
    pub unallocated_c: f64,
    pub unallocated_n: f64,
    /// Nitrogen supply relative to demand, capped at 1.
    pub fn_ratio: f64,
    /// Carbon supply relative to demand, capped at 1.
    pub fdm: f64,
    pub c_unallocated_due_to_n_limitation: f64,
    pub n_uptake_granted: f64,
    pub n_uptake_allocated: f64,
}

impl Default for ArbitrationOutputs {
    fn default() -> Self {
        Self {
            unallocated_c: 0.0,
            unallocated_n: 0.0,
            fn_ratio: 1.0,
            fdm: 1.0,
            c_unallocated_due_to_n_limitation: 0.0,
            n_uptake_granted: 0.0,
            n_uptake_allocated: 0.0,
        }
    }
}

fn supply_ratio(supply: f64, demand: f64) -> f64 {
    if demand > 0.0 {
        (supply / demand).min(1.0)
    } else {
        1.0
    }
}

/// Hands `allocated` (out of `total_supply`) back to the organs that offered
/// `category`, in proportion to what each offered.
fn distribute_supply_share(
    ledger: &mut PlantNutrientLedger,
    category: SupplyCategory,
    allocated: f64,
    total_supply: f64,
    config: &ArbitrationConfig,
) -> Result<(), ArbitrationError> {
    let nutrient = ledger.nutrient();
    for organ in ledger.organs_mut() {
        let offered = *organ.supplies();
        match category {
            SupplyCategory::Fixation => {
                let share = share_of_allocation(
                    allocated,
                    offered.fixation,
                    total_supply,
                    nutrient,
                    category,
                    config,
                )?;
                organ.set_fixation_allocated(share);
            }
            SupplyCategory::Uptake => {
                let share = share_of_allocation(
                    allocated,
                    offered.uptake,
                    total_supply,
                    nutrient,
                    category,
                    config,
                )?;
                organ.set_uptake_allocated(share);
            }
            SupplyCategory::Reallocation => {
                let share = share_of_pooled_allocation(
                    allocated,
                    &offered.reallocation,
                    total_supply,
                    nutrient,
                    category,
                    config,
                )?;
                organ.set_reallocation_allocated(share);
            }
            SupplyCategory::Retranslocation => {
                let share = share_of_pooled_allocation(
                    allocated,
                    &offered.retranslocation,
                    total_supply,
                    nutrient,
                    category,
                    config,
                )?;
                organ.set_retranslocation_allocated(share);
            }
        }
    }
    Ok(())
}

/// Owns the carbon and nitrogen ledgers and runs the daily protocol against
/// them. Organ pools are never held here; organs read their allocation back
/// through [`BiomassArbitrator::organ_allocation`].
#[derive(Debug, Clone)]
pub struct BiomassArbitrator {
    config: ArbitrationConfig,
    carbon: PlantNutrientLedger,
    nitrogen: PlantNutrientLedger,
    uptake_sink: Option<usize>,
    n_reallocation_allocated: f64,
    outputs: ArbitrationOutputs,
}

impl BiomassArbitrator {
    /// Builds the ledgers and the role table. Duplicate organ names, more than
    /// one nitrogen uptake sink, a non-positive carbon concentration or a
    /// nonsensical tolerance are rejected here, before any day runs.
    pub fn new(organs: &[OrganParams], config: ArbitrationConfig) -> Result<Self, ArbitrationError> {
        let tolerances = [
            ("allocation_tolerance", config.allocation_tolerance),
            ("mass_balance_relative", config.mass_balance_relative),
            ("mass_balance_absolute", config.mass_balance_absolute),
            ("negative_noise", config.negative_noise),
            ("detachment_residue_threshold", config.detachment_residue_threshold),
            ("unconstrained_c_delta", config.unconstrained_c_delta),
        ];
        for (name, value) in tolerances {
            if !value.is_finite() || value < 0.0 {
                return Err(ArbitrationError::configuration(format!(
                    "{name} must be a finite non-negative number, got {value}"
                )));
            }
        }

        let mut seen = HashSet::new();
        for organ in organs {
            if !seen.insert(organ.name.as_str()) {
                error!(organ = %organ.name, "duplicate organ registration");
                return Err(ArbitrationError::configuration(format!(
                    "organ `{}` registered twice",
                    organ.name
                )));
            }
        }

        for organ in organs {
            let cconc = organ.carbon_concentration;
            if !cconc.is_finite() || cconc <= 0.0 {
                error!(organ = %organ.name, cconc, "carbon concentration must be positive");
                return Err(ArbitrationError::configuration(format!(
                    "organ `{}` has carbon concentration {cconc}; it must be a positive number",
                    organ.name
                )));
            }
        }

        let sinks: Vec<&str> = organs
            .iter()
            .filter(|o| o.has_role(OrganRole::NitrogenUptakeSink))
            .map(|o| o.name.as_str())
            .collect();
        if sinks.len() > 1 {
            error!(?sinks, "more than one nitrogen uptake sink");
            return Err(ArbitrationError::configuration(format!(
                "only one organ may take up nitrogen, found {}",
                sinks.join(", ")
            )));
        }
        let uptake_sink = organs
            .iter()
            .position(|o| o.has_role(OrganRole::NitrogenUptakeSink));

        let names: Vec<&str> = organs.iter().map(|o| o.name.as_str()).collect();
        Ok(Self {
            config,
            carbon: PlantNutrientLedger::new(Nutrient::Carbon, names.iter().copied()),
            nitrogen: PlantNutrientLedger::new(Nutrient::Nitrogen, names.iter().copied()),
            uptake_sink,
            n_reallocation_allocated: 0.0,
            outputs: ArbitrationOutputs::default(),
        })
    }

    pub fn config(&self) -> &ArbitrationConfig {
        &self.config
    }

    pub fn ledger(&self, nutrient: Nutrient) -> &PlantNutrientLedger {
        match nutrient {
            Nutrient::Carbon => &self.carbon,
            Nutrient::Nitrogen => &self.nitrogen,
        }
    }

    fn ledger_mut(&mut self, nutrient: Nutrient) -> &mut PlantNutrientLedger {
        match nutrient {
            Nutrient::Carbon => &mut self.carbon,
            Nutrient::Nitrogen => &mut self.nitrogen,
        }
    }

    pub fn uptake_sink(&self) -> Option<usize> {
        self.uptake_sink
    }

    /// Forget yesterday's demands, supplies, allocations and outputs.
    pub fn begin_day(&mut self) {
        self.carbon.clear();
        self.nitrogen.clear();
        self.n_reallocation_allocated = 0.0;
        self.outputs = ArbitrationOutputs::default();
    }

    pub fn set_request(
        &mut self,
        nutrient: Nutrient,
        index: usize,
        request: &NutrientRequest,
    ) -> Result<(), ArbitrationError> {
        let ledger = self.ledger_mut(nutrient);
        let organ = ledger.organ_mut(index).ok_or_else(|| {
            ArbitrationError::configuration(format!("no organ registered at index {index}"))
        })?;
        organ.set_request(request);
        Ok(())
    }

    /// Fair-share allocation of `total_supply` against one nutrient's ledger.
    pub fn do_allocation(
        &mut self,
        nutrient: Nutrient,
        total_supply: f64,
    ) -> Result<f64, ArbitrationError> {
        let config = self.config;
        do_allocation(total_supply, self.ledger_mut(nutrient), &config)
    }

    /// Allocate everything offered under `category` and record each organ's share.
    fn allocate_category(
        &mut self,
        nutrient: Nutrient,
        category: SupplyCategory,
    ) -> Result<f64, ArbitrationError> {
        let config = self.config;
        let ledger = self.ledger_mut(nutrient);
        let supply = ledger.totals().supply.category(category);
        let allocated = do_allocation(supply, ledger, &config)?;
        distribute_supply_share(ledger, category, allocated, supply, &config)?;
        debug!(%nutrient, %category, supply, allocated, "supply category arbitrated");
        Ok(allocated)
    }

    /// Carbon reallocation, fixation and retranslocation in that order, then
    /// nitrogen demand from each organ's potential carbon growth, then
    /// nitrogen reallocation.
    ///
    /// `nitrogen_request` receives an organ's index and the carbon allocated to
    /// it so far, and returns that organ's nitrogen demand and supplies or the
    /// error that stops the day.
    pub fn on_potential_partition<F>(&mut self, mut nitrogen_request: F) -> Result<(), ArbitrationError>
    where
        F: FnMut(usize, f64) -> Result<NutrientRequest, ArbitrationError>,
    {
        let c_reallocated = self.allocate_category(Nutrient::Carbon, SupplyCategory::Reallocation)?;
        let c_fixed = self.allocate_category(Nutrient::Carbon, SupplyCategory::Fixation)?;
        let c_retranslocated =
            self.allocate_category(Nutrient::Carbon, SupplyCategory::Retranslocation)?;

        for index in 0..self.carbon.len() {
            let potential = self.carbon.organs()[index].demands_allocated().total();
            let request = nitrogen_request(index, potential)?;
            self.set_request(Nutrient::Nitrogen, index, &request)?;
        }

        self.n_reallocation_allocated =
            self.allocate_category(Nutrient::Nitrogen, SupplyCategory::Reallocation)?;

        info!(
            c_reallocated,
            c_fixed,
            c_retranslocated,
            n_reallocated = self.n_reallocation_allocated,
            "potential partition complete"
        );
        Ok(())
    }

    /// Per-organ nitrogen still wanted after reallocation, for the soil.
    pub fn uptake_demand_by_organ(&self) -> Vec<UptakeDemand> {
        self.nitrogen
            .organs()
            .iter()
            .map(|o| UptakeDemand {
                organ: o.organ().to_string(),
                amount: o.outstanding_demands().total(),
            })
            .collect()
    }

    /// Distributes the soil's granted nitrogen. The uptake sink organ is
    /// credited with the amount actually allocated.
    pub fn allocate_n_uptake(&mut self, total_plant_uptake: f64) -> Result<f64, ArbitrationError> {
        if !total_plant_uptake.is_finite() || total_plant_uptake < 0.0 {
            error!(total_plant_uptake, "uptake must be a non-negative amount");
            return Err(ArbitrationError::inconsistency(
                Nutrient::Nitrogen,
                format!("granted uptake {total_plant_uptake} is not a non-negative amount"),
            ));
        }
        let config = self.config;
        let sink = match self.uptake_sink {
            Some(sink) => sink,
            None if total_plant_uptake <= config.allocation_tolerance => {
                return Ok(0.0);
            }
            None => {
                error!(total_plant_uptake, "uptake granted but no sink organ registered");
                return Err(ArbitrationError::configuration(
                    "nitrogen uptake granted but no organ is a nitrogen uptake sink",
                ));
            }
        };

        let total_demand = self.nitrogen.totals().total_demand;
        if let Some(organ) = self.nitrogen.organ_mut(sink) {
            organ.set_uptake_supply(total_plant_uptake);
        }
        let allocated = do_allocation(total_plant_uptake, &mut self.nitrogen, &config)?;

        let limit = total_demand - self.n_reallocation_allocated;
        if allocated - limit > config.allocation_tolerance {
            error!(allocated, limit, "nitrogen uptake exceeds demand");
            return Err(ArbitrationError::ConservationViolation {
                nutrient: Nutrient::Nitrogen,
                category: SupplyCategory::Uptake,
                allocated,
                limit,
            });
        }
        if let Some(organ) = self.nitrogen.organ_mut(sink) {
            organ.set_uptake_allocated(allocated);
        }

        self.outputs.n_uptake_granted = total_plant_uptake;
        self.outputs.n_uptake_allocated = allocated;
        info!(granted = total_plant_uptake, allocated, "nitrogen uptake allocated");
        Ok(allocated)
    }

    /// Nitrogen fixation and retranslocation, the nitrogen cap on carbon
    /// growth, then the day's residual supplies.
    pub fn on_actual_partition(&mut self) -> Result<(), ArbitrationError> {
        let n_fixed = self.allocate_category(Nutrient::Nitrogen, SupplyCategory::Fixation)?;
        let n_retranslocated =
            self.allocate_category(Nutrient::Nitrogen, SupplyCategory::Retranslocation)?;

        self.nutrient_constrained_dm_allocation()?;
        self.verify_supply_bounds()?;

        let c = self.carbon.totals();
        let n = self.nitrogen.totals();
        self.outputs.unallocated_c = (c.supply.total() - c.total_demands_allocated).max(0.0);
        self.outputs.unallocated_n = (n.supply.total() - n.total_demands_allocated).max(0.0);
        self.outputs.fn_ratio = supply_ratio(n.supply.total(), n.total_demand);
        self.outputs.fdm = supply_ratio(c.supply.total(), c.total_demand);

        info!(
            n_fixed,
            n_retranslocated,
            unallocated_c = self.outputs.unallocated_c,
            unallocated_n = self.outputs.unallocated_n,
            fn_ratio = self.outputs.fn_ratio,
            "actual partition complete"
        );
        Ok(())
    }

    /// Caps each organ's carbon allocation at what its allocated nitrogen can
    /// support, keeping the structural / metabolic / storage ratios, and winds
    /// the plant-wide shortfall back out of the supply allocations.
    /// Returns the carbon left unallocated by the cap.
    pub fn nutrient_constrained_dm_allocation(&mut self) -> Result<f64, ArbitrationError> {
        let config = self.config;
        let before = self.carbon.totals().total_demands_allocated;

        for index in 0..self.nitrogen.len() {
            let n = &self.nitrogen.organs()[index];
            let demand = n.demands().total();
            let allocated = n.demands_allocated().total();
            let minimum = n.concentration().structural();

            let cap = if allocated >= demand || (allocated - demand).abs() <= config.allocation_tolerance
            {
                CarbonCap::Unconstrained
            } else if allocated == 0.0 || minimum == 0.0 {
                CarbonCap::Limited(0.0)
            } else {
                CarbonCap::Limited(allocated / minimum)
            };
            self.nitrogen.organs_mut()[index].set_max_c_delta(cap);

            if let CarbonCap::Limited(max_delta) = cap {
                let c = &mut self.carbon.organs_mut()[index];
                let current = c.demands_allocated();
                if current.total() > 0.0 {
                    c.constrain_allocation(current.proportions() * max_delta);
                }
            }
        }

        let after = self.carbon.totals().total_demands_allocated;
        let shortfall = (before - after).max(0.0);
        self.outputs.c_unallocated_due_to_n_limitation = shortfall;
        if shortfall > 0.0 {
            warn!(before, after, shortfall, "nitrogen limits carbon growth");
            self.wind_back(shortfall)?;
        }
        Ok(shortfall)
    }

    fn wind_back(&mut self, shortfall: f64) -> Result<(), ArbitrationError> {
        let config = self.config;
        let mut remaining = shortfall;
        for category in WIND_BACK_ORDER {
            if remaining <= config.allocation_tolerance {
                break;
            }
            let totals = self.carbon.totals();
            let allocated = totals.supply_allocated.category(category);
            let cut = allocated.min(remaining);
            if cut <= 0.0 {
                continue;
            }
            distribute_supply_share(
                &mut self.carbon,
                category,
                allocated - cut,
                totals.supply.category(category),
                &config,
            )?;
            remaining -= cut;
            warn!(%category, cut, remaining, "carbon supply allocation wound back");
        }
        if remaining > config.allocation_tolerance {
            error!(shortfall, remaining, "wind-back could not absorb the carbon shortfall");
            return Err(ArbitrationError::inconsistency(
                Nutrient::Carbon,
                format!("{remaining} of a {shortfall} shortfall left after wind-back"),
            ));
        }
        Ok(())
    }

    /// Every category's organ allocations stay within the plant's supply.
    fn verify_supply_bounds(&self) -> Result<(), ArbitrationError> {
        for ledger in [&self.carbon, &self.nitrogen] {
            let t = ledger.totals();
            for category in SupplyCategory::ALL {
                let limit = t.supply.category(category);
                let allocated = t.supply_allocated.category(category);
                if allocated - limit > self.config.allocation_tolerance * limit.max(1.0) {
                    error!(nutrient = %ledger.nutrient(), %category, allocated, limit, "supply overdrawn");
                    return Err(ArbitrationError::ConservationViolation {
                        nutrient: ledger.nutrient(),
                        category,
                        allocated,
                        limit,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn organ_allocation(&self, index: usize) -> Result<OrganAllocation, ArbitrationError> {
        let missing =
            || ArbitrationError::configuration(format!("no organ registered at index {index}"));
        let c = self.carbon.organ(index).ok_or_else(missing)?;
        let n = self.nitrogen.organ(index).ok_or_else(missing)?;
        Ok(OrganAllocation {
            reallocation: PoolPair {
                carbon: c.supplies_allocated().reallocation,
                nitrogen: n.supplies_allocated().reallocation,
            },
            retranslocation: PoolPair {
                carbon: c.supplies_allocated().retranslocation,
                nitrogen: n.supplies_allocated().retranslocation,
            },
            growth: PoolPair {
                carbon: c.demands_allocated(),
                nitrogen: n.demands_allocated(),
            },
        })
    }

    pub fn outputs(&self) -> &ArbitrationOutputs {
        &self.outputs
    }

    pub fn unallocated_c(&self) -> f64 {
        self.outputs.unallocated_c
    }

    pub fn unallocated_n(&self) -> f64 {
        self.outputs.unallocated_n
    }

    pub fn fn_ratio(&self) -> f64 {
        self.outputs.fn_ratio
    }

    pub fn fdm(&self) -> f64 {
        self.outputs.fdm
    }

    pub fn c_unallocated_due_to_n_limitation(&self) -> f64 {
        self.outputs.c_unallocated_due_to_n_limitation
    }

    /// Total nitrogen the plant would take from the soil today.
    pub fn uptake_demand(&self) -> f64 {
        self.uptake_demand_by_organ().iter().map(|d| d.amount).sum()
    }

    /// Plant ending: nothing left to arbitrate.
    pub fn end(&mut self) {
        self.begin_day();
    }
}
