use arbitration_core::{
    ArbitrationConfig, ArbitrationError, Nutrient, NutrientPoolsState, NutrientRequest,
    OrganNutrientsState, OrganSupplies, PoolKind,
};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::arbitrator::OrganAllocation;
use crate::drivers::{DailyFlows, OrganDrivers, ZonePartitioner};
use crate::params::{OrganParams, OrganRole};
use crate::removal::{RemovalFractions, RemovedBiomass};

fn unit_interval(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct DailyRates {
    pub senescence: f64,
    pub detachment: f64,
    pub respiration: f64,
}

/// One plant organ: persistent live and dead biomass plus today's flows.
#[derive(Debug)]
pub struct Organ {
    params: OrganParams,
    drivers: Box<dyn OrganDrivers>,
    partitioner: Option<Box<dyn ZonePartitioner>>,
    live: OrganNutrientsState,
    dead: OrganNutrientsState,
    start_live: OrganNutrientsState,
    start_dead: OrganNutrientsState,
    flows: DailyFlows,
    to_residue: OrganNutrientsState,
    exported: OrganNutrientsState,
    pending_removal: Option<RemovalFractions>,
    rates: DailyRates,
}

impl Organ {
    pub fn new(params: OrganParams, drivers: Box<dyn OrganDrivers>) -> Self {
        let empty = OrganNutrientsState::empty(params.carbon_concentration);
        Self {
            drivers,
            partitioner: None,
            live: empty,
            dead: empty,
            start_live: empty,
            start_dead: empty,
            flows: DailyFlows::empty(params.carbon_concentration),
            to_residue: empty,
            exported: empty,
            pending_removal: None,
            rates: DailyRates::default(),
            params,
        }
    }

    pub fn with_partitioner(mut self, partitioner: Box<dyn ZonePartitioner>) -> Self {
        self.partitioner = Some(partitioner);
        self
    }

    fn empty_state(&self) -> OrganNutrientsState {
        OrganNutrientsState::empty(self.params.carbon_concentration)
    }

    /// Pool subtraction that treats an overdraw beyond rounding noise as an
    /// allocation fault.
    fn withdraw(
        &self,
        from: &OrganNutrientsState,
        amount: &OrganNutrientsState,
        what: &str,
        config: &ArbitrationConfig,
    ) -> Result<OrganNutrientsState, ArbitrationError> {
        let tolerance = config.noise_tolerance(from.c().max(from.n()));
        from.checked_minus(amount, tolerance).map_err(|nutrient| {
            error!(organ = %self.params.name, %nutrient, what, "withdrawal exceeds pool");
            ArbitrationError::inconsistency(
                nutrient,
                format!("{what} exceeds what {} holds", self.params.name),
            )
        })
    }

    /// Sowing: live carbon from the initial weight split by the carbon pool
    /// fractions, live nitrogen at the concentration thresholds, dead empty.
    pub fn sow(&mut self) {
        let cconc = self.params.carbon_concentration;
        let carbon = self
            .params
            .carbon_fractions
            .scaled_to_total(self.params.initial_wt * cconc);
        let nitrogen = self.params.nitrogen_concentrations.per_pool() * carbon.total();
        self.live = OrganNutrientsState::from_pools(carbon, nitrogen, cconc);
        self.dead = self.empty_state();
        self.start_live = self.live;
        self.start_dead = self.dead;
        self.flows = DailyFlows::empty(cconc);
        self.to_residue = self.empty_state();
        self.exported = self.empty_state();
        self.pending_removal = None;
        info!(organ = %self.params.name, wt = self.live.wt(), n = self.live.n(), "organ sown");
    }

    /// Snapshot for the close-of-day mass balance and fresh flow pools.
    pub fn begin_day(&mut self) {
        self.start_live = self.live;
        self.start_dead = self.dead;
        self.flows = DailyFlows::empty(self.params.carbon_concentration);
        self.to_residue = self.empty_state();
        self.exported = self.empty_state();
    }

    /// Takes biomass flagged by [`Organ::remove_biomass`] out of live and
    /// dead, then clears the flag.
    pub fn apply_pending_removals(
        &mut self,
        config: &ArbitrationConfig,
    ) -> Result<Option<RemovedBiomass>, ArbitrationError> {
        let Some(fractions) = self.pending_removal.take() else {
            return Ok(None);
        };
        let removed = fractions.split(&self.live, &self.dead);
        self.live = self.withdraw(&self.live, &removed.live(), "live removal", config)?;
        self.dead = self.withdraw(&self.dead, &removed.dead(), "dead removal", config)?;
        self.flows.live_removed = removed.live();
        self.flows.dead_removed = removed.dead();
        self.to_residue = self.to_residue.plus(&removed.residue());
        self.exported = self.exported.plus(&removed.exported());
        info!(
            organ = %self.params.name,
            removed_wt = removed.total_wt(),
            residue_wt = removed.residue().wt(),
            "pending removal applied"
        );
        Ok(Some(removed))
    }

    /// A driver output that is `NaN` or infinite cannot be arbitrated.
    fn checked_driver(
        &self,
        nutrient: Nutrient,
        what: &str,
        value: f64,
    ) -> Result<f64, ArbitrationError> {
        if value.is_finite() {
            return Ok(value);
        }
        error!(organ = %self.params.name, %nutrient, what, value, "driver returned a non-finite value");
        Err(ArbitrationError::inconsistency(
            nutrient,
            format!("{what} for {} is {value}", self.params.name),
        ))
    }

    fn checked_demand(
        &self,
        nutrient: Nutrient,
        demand: NutrientPoolsState,
    ) -> Result<NutrientPoolsState, ArbitrationError> {
        for value in demand.components() {
            self.checked_driver(nutrient, "demand", value)?;
        }
        Ok(demand)
    }

    /// Rates clamp to `[0,1]`.
    pub fn compute_daily_rates(&mut self) -> Result<(), ArbitrationError> {
        let senescence = self.drivers.senescence_rate(&self.live);
        let detachment = self.drivers.detachment_rate(&self.dead);
        let respiration = self.drivers.respiration_fraction(&self.live);
        self.rates = DailyRates {
            senescence: unit_interval(self.checked_driver(
                Nutrient::Carbon,
                "senescence rate",
                senescence,
            )?),
            detachment: unit_interval(self.checked_driver(
                Nutrient::Carbon,
                "detachment rate",
                detachment,
            )?),
            respiration: unit_interval(self.checked_driver(
                Nutrient::Carbon,
                "respiration fraction",
                respiration,
            )?),
        };
        debug!(organ = %self.params.name, rates = ?self.rates, "daily rates");
        Ok(())
    }

    /// Supplies drawn from one nutrient's live pools: reallocation out of the
    /// senescing non-structural mass, retranslocation out of what survives.
    fn mobile_supplies(
        &self,
        live: NutrientPoolsState,
        reallocation_factor: f64,
        retranslocation_factor: f64,
        fixation: f64,
    ) -> OrganSupplies {
        let senescing = live * self.rates.senescence;
        OrganSupplies {
            fixation: fixation.max(0.0),
            uptake: 0.0,
            reallocation: senescing.non_structural() * unit_interval(reallocation_factor),
            retranslocation: (live - senescing).non_structural()
                * unit_interval(retranslocation_factor),
        }
    }

    pub fn carbon_request(&self) -> Result<NutrientRequest, ArbitrationError> {
        let factors = self.params.carbon;
        let demand = self.checked_demand(Nutrient::Carbon, self.drivers.carbon_demand(&self.live))?;
        let fixation = self.checked_driver(
            Nutrient::Carbon,
            "fixation",
            self.drivers.carbon_fixation(&self.live),
        )?;
        Ok(NutrientRequest {
            demand,
            priority: factors.priority,
            supplies: self.mobile_supplies(
                self.live.carbon,
                factors.reallocation,
                factors.retranslocation,
                fixation,
            ),
            concentration: NutrientPoolsState::ZERO,
        })
    }

    /// Nitrogen needed to build `potential_c` of new carbon at the organ's
    /// concentration thresholds, plus whatever the live tissue lacks to reach
    /// its maximum concentration.
    pub fn nitrogen_request(&self, potential_c: f64) -> Result<NutrientRequest, ArbitrationError> {
        let factors = self.params.nitrogen;
        let thresholds = self.params.nitrogen_concentrations;
        let per_pool = thresholds.per_pool();
        let growth = self
            .checked_driver(Nutrient::Carbon, "potential growth", potential_c)?
            .max(0.0);
        let fixation = self.checked_driver(
            Nutrient::Nitrogen,
            "fixation",
            self.drivers.nitrogen_fixation(&self.live),
        )?;
        let luxury = (self.live.c() * thresholds.maximum - self.live.n()).max(0.0);
        let demand = NutrientPoolsState::new(
            growth * per_pool.structural(),
            growth * per_pool.metabolic(),
            growth * per_pool.storage() + luxury,
        );
        Ok(NutrientRequest {
            demand: self.checked_demand(Nutrient::Nitrogen, demand)?,
            priority: factors.priority,
            supplies: self.mobile_supplies(
                self.live.nitrogen,
                factors.reallocation,
                factors.retranslocation,
                fixation,
            ),
            concentration: thresholds.as_pools(),
        })
    }

    /// Moves today's senescing share of live to dead, less what was reallocated.
    pub fn apply_senescence(
        &mut self,
        allocation: &OrganAllocation,
        config: &ArbitrationConfig,
    ) -> Result<(), ArbitrationError> {
        let senescing = self.live.scaled(self.rates.senescence);
        self.live = self.withdraw(&self.live, &senescing, "senescence", config)?;
        let reallocated = OrganNutrientsState::from_pools(
            allocation.reallocation.carbon,
            allocation.reallocation.nitrogen,
            self.params.carbon_concentration,
        );
        let to_dead = self.withdraw(&senescing, &reallocated, "reallocation", config)?;
        self.dead = self.dead.plus(&to_dead);
        self.flows.senesced = to_dead;
        self.flows.reallocated = reallocated;
        Ok(())
    }

    pub fn apply_retranslocation(
        &mut self,
        allocation: &OrganAllocation,
        config: &ArbitrationConfig,
    ) -> Result<(), ArbitrationError> {
        let retranslocated = OrganNutrientsState::from_pools(
            allocation.retranslocation.carbon,
            allocation.retranslocation.nitrogen,
            self.params.carbon_concentration,
        );
        self.live = self.withdraw(&self.live, &retranslocated, "retranslocation", config)?;
        self.flows.retranslocated = retranslocated;
        Ok(())
    }

    pub fn apply_growth_allocation(&mut self, allocation: &OrganAllocation) {
        let allocated = OrganNutrientsState::from_pools(
            allocation.growth.carbon,
            allocation.growth.nitrogen,
            self.params.carbon_concentration,
        );
        self.live = self.live.plus(&allocated);
        self.flows.allocated = allocated;
    }

    pub fn apply_detachment_and_respiration(
        &mut self,
        config: &ArbitrationConfig,
    ) -> Result<(), ArbitrationError> {
        let mut rate = self.rates.detachment;
        if rate > 0.0 && self.dead.wt() > 0.0 {
            if self.dead.wt() * (1.0 - rate) < config.detachment_residue_threshold {
                rate = 1.0;
            }
            let detached = self.dead.scaled(rate);
            self.dead = self.withdraw(&self.dead, &detached, "detachment", config)?;
            self.flows.detached = detached;
            self.to_residue = self.to_residue.plus(&detached);
        }

        let respired_c = self.live.carbon.non_structural() * self.rates.respiration;
        if respired_c.total() > 0.0 {
            let respired = OrganNutrientsState::from_pools(
                respired_c,
                NutrientPoolsState::ZERO,
                self.params.carbon_concentration,
            );
            self.live = self.withdraw(&self.live, &respired, "respiration", config)?;
            self.flows.respired = respired;
        }
        Ok(())
    }

    /// Hands today's flows to the spatial model, if any, and checks it
    /// accounted for all of them.
    pub fn partition_flows(
        &mut self,
        date: Option<NaiveDate>,
        config: &ArbitrationConfig,
    ) -> Result<(), ArbitrationError> {
        let Some(partitioner) = self.partitioner.as_mut() else {
            return Ok(());
        };
        let reported = partitioner.partition(&self.flows);
        let expected = [
            (Nutrient::Carbon, self.flows.carbon_total(), reported.carbon),
            (Nutrient::Nitrogen, self.flows.nitrogen_total(), reported.nitrogen),
        ];
        for (nutrient, expected, found) in expected {
            if (expected - found).abs() > config.mass_balance_tolerance(expected) {
                error!(organ = %self.params.name, %nutrient, expected, found, "partitioned flows do not add up");
                return Err(ArbitrationError::MassBalanceViolation {
                    organ: self.params.name.clone(),
                    nutrient,
                    pool: PoolKind::Live,
                    date,
                    expected,
                    found,
                });
            }
        }
        Ok(())
    }

    /// Live and dead pools against the day's opening snapshot and flows.
    pub fn check_mass_balance(
        &self,
        date: Option<NaiveDate>,
        config: &ArbitrationConfig,
    ) -> Result<(), ArbitrationError> {
        let f = &self.flows;
        for nutrient in [Nutrient::Carbon, Nutrient::Nitrogen] {
            let t = |s: &OrganNutrientsState| s.nutrient(nutrient).total();
            let expected_live = t(&self.start_live) + t(&f.allocated)
                - t(&f.senesced)
                - t(&f.reallocated)
                - t(&f.retranslocated)
                - t(&f.live_removed)
                - t(&f.respired);
            let expected_dead =
                t(&self.start_dead) + t(&f.senesced) - t(&f.dead_removed) - t(&f.detached);

            for (pool, expected, found) in [
                (PoolKind::Live, expected_live, t(&self.live)),
                (PoolKind::Dead, expected_dead, t(&self.dead)),
            ] {
                if (found - expected).abs() > config.mass_balance_tolerance(found) {
                    error!(
                        organ = %self.params.name,
                        %nutrient,
                        %pool,
                        expected,
                        found,
                        "mass balance violated"
                    );
                    return Err(ArbitrationError::MassBalanceViolation {
                        organ: self.params.name.clone(),
                        nutrient,
                        pool,
                        date,
                        expected,
                        found,
                    });
                }
            }
        }
        Ok(())
    }

    /// Flags biomass for removal at the start of the next day and returns the
    /// live plus dead dry weight that will go.
    pub fn remove_biomass(&mut self, fractions: RemovalFractions) -> Result<f64, ArbitrationError> {
        self.check_removal(&fractions)?;
        let removed = fractions.split(&self.live, &self.dead).total_wt();
        if !fractions.is_empty() {
            self.pending_removal = Some(fractions);
        }
        info!(organ = %self.params.name, removed, "biomass removal flagged");
        Ok(removed)
    }

    /// Whether [`Organ::remove_biomass`] would accept `fractions` right now.
    pub fn check_removal(&self, fractions: &RemovalFractions) -> Result<(), ArbitrationError> {
        fractions.validate(&self.params.name)?;
        if self.pending_removal.is_some() {
            return Err(ArbitrationError::InvalidRemoval {
                organ: self.params.name.clone(),
                detail: "a removal is already pending".to_string(),
            });
        }
        Ok(())
    }

    /// [`Organ::remove_biomass`] with the organ's default harvest fractions.
    pub fn harvest(&mut self) -> Result<f64, ArbitrationError> {
        self.remove_biomass(self.params.harvest)
    }

    /// Plant ending: everything goes to residue and the organ is emptied.
    pub fn end(&mut self) -> OrganNutrientsState {
        let everything = self.live.plus(&self.dead);
        self.flows.detached = self.flows.detached.plus(&everything);
        self.to_residue = self.to_residue.plus(&everything);
        self.live = self.empty_state();
        self.dead = self.empty_state();
        self.pending_removal = None;
        info!(organ = %self.params.name, wt = everything.wt(), "organ ended");
        everything
    }

    pub fn name(&self) -> &str {
        &self.params.name
    }

    pub fn params(&self) -> &OrganParams {
        &self.params
    }

    pub fn has_role(&self, role: OrganRole) -> bool {
        self.params.has_role(role)
    }

    pub fn live(&self) -> &OrganNutrientsState {
        &self.live
    }

    pub fn dead(&self) -> &OrganNutrientsState {
        &self.dead
    }

    pub fn flows(&self) -> &DailyFlows {
        &self.flows
    }

    pub fn rates(&self) -> &DailyRates {
        &self.rates
    }

    /// Detached and residue-bound removed biomass since the day began.
    pub fn to_residue(&self) -> &OrganNutrientsState {
        &self.to_residue
    }

    /// Biomass carried off the field since the day began.
    pub fn exported(&self) -> &OrganNutrientsState {
        &self.exported
    }

    pub fn pending_removal(&self) -> Option<&RemovalFractions> {
        self.pending_removal.as_ref()
    }

    pub fn partitioner(&self) -> Option<&dyn ZonePartitioner> {
        self.partitioner.as_deref()
    }

    pub fn wt(&self) -> f64 {
        self.live.wt() + self.dead.wt()
    }

    pub fn c(&self) -> f64 {
        self.live.c() + self.dead.c()
    }

    pub fn n(&self) -> f64 {
        self.live.n() + self.dead.n()
    }

    pub fn n_conc(&self) -> f64 {
        let wt = self.wt();
        if wt > 0.0 {
            self.n() / wt
        } else {
            0.0
        }
    }

    /// Live nitrogen relative to live carbon at maximum concentration; 1 when empty.
    pub fn fn_ratio(&self) -> f64 {
        let ceiling = self.live.c() * self.params.nitrogen_concentrations.maximum;
        if ceiling > 0.0 {
            self.live.n() / ceiling
        } else {
            1.0
        }
    }

    /// Position of the organ's N per unit carbon between the minimum and
    /// critical thresholds, capped at 1.
    pub fn fn_metabolic(&self) -> f64 {
        let t = self.params.nitrogen_concentrations;
        let c = self.c();
        let span = t.critical - t.minimum;
        if c <= 0.0 || span <= 0.0 {
            return 0.0;
        }
        ((self.n() / c - t.minimum) / span).clamp(0.0, 1.0)
    }
}
