use std::fmt;

use arbitration_core::{ArbitrationConfig, ArbitrationError, Nutrient, OrganNutrientsState};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{error, info};

use crate::arbitrator::{ArbitrationOutputs, BiomassArbitrator};
use crate::drivers::{SoilUptake, UptakeDemand};
use crate::organ::Organ;
use crate::removal::RemovalFractions;

/// Where the plant is within one simulated day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Idle,
    GrowthStarted,
    PotentialPartitioned,
    UptakeAllocated,
    ActualPartitioned,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::GrowthStarted => "growth-started",
            Phase::PotentialPartitioned => "potential-partitioned",
            Phase::UptakeAllocated => "uptake-allocated",
            Phase::ActualPartitioned => "actual-partitioned",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrganReport {
    pub name: String,
    pub live_wt: f64,
    pub dead_wt: f64,
    pub wt: f64,
    pub live_c: f64,
    pub live_n: f64,
    pub n: f64,
    pub n_conc: f64,
    pub fn_ratio: f64,
    pub fn_metabolic: f64,
    pub allocated_wt: f64,
    pub senesced_wt: f64,
    pub detached_wt: f64,
    pub removed_wt: f64,
    pub to_residue_wt: f64,
    pub to_residue_n: f64,
}

impl OrganReport {
    fn from_organ(organ: &Organ) -> Self {
        let flows = organ.flows();
        Self {
            name: organ.name().to_string(),
            live_wt: organ.live().wt(),
            dead_wt: organ.dead().wt(),
            wt: organ.wt(),
            live_c: organ.live().c(),
            live_n: organ.live().n(),
            n: organ.n(),
            n_conc: organ.n_conc(),
            fn_ratio: organ.fn_ratio(),
            fn_metabolic: organ.fn_metabolic(),
            allocated_wt: flows.allocated.wt(),
            senesced_wt: flows.senesced.wt(),
            detached_wt: flows.detached.wt(),
            removed_wt: flows.live_removed.wt() + flows.dead_removed.wt(),
            to_residue_wt: organ.to_residue().wt(),
            to_residue_n: organ.to_residue().n(),
        }
    }
}

/// Everything reported at close of day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyReport {
    pub date: NaiveDate,
    pub plant: String,
    pub unallocated_c: f64,
    pub unallocated_n: f64,
    pub fn_ratio: f64,
    pub fdm: f64,
    pub c_unallocated_due_to_n_limitation: f64,
    pub n_uptake_demand: f64,
    pub n_uptake_granted: f64,
    pub n_uptake_allocated: f64,
    pub delta_wt: f64,
    pub total_wt: f64,
    pub organs: Vec<OrganReport>,
}

/// A plant: its organs, its arbitrator, and the phase order between them.
#[derive(Debug)]
pub struct Plant {
    name: String,
    organs: Vec<Organ>,
    arbitrator: BiomassArbitrator,
    config: ArbitrationConfig,
    phase: Phase,
    date: Option<NaiveDate>,
    sown: bool,
    start_wt: f64,
    uptake_demand: f64,
}

impl Plant {
    /// Wires organs to a fresh arbitrator; role and naming problems surface here.
    pub fn new(
        name: impl Into<String>,
        organs: Vec<Organ>,
        config: ArbitrationConfig,
    ) -> Result<Self, ArbitrationError> {
        let params: Vec<_> = organs.iter().map(|o| o.params().clone()).collect();
        let arbitrator = BiomassArbitrator::new(&params, config)?;
        Ok(Self {
            name: name.into(),
            organs,
            arbitrator,
            config,
            phase: Phase::Idle,
            date: None,
            sown: false,
            start_wt: 0.0,
            uptake_demand: 0.0,
        })
    }

    fn expect_phase(&self, expected: Phase, requested: &'static str) -> Result<(), ArbitrationError> {
        if self.phase != expected {
            error!(plant = %self.name, expected = %expected, current = %self.phase, requested, "phase out of order");
            return Err(ArbitrationError::PhaseSequence {
                expected: expected.name(),
                requested,
            });
        }
        Ok(())
    }

    pub fn sow(&mut self, date: NaiveDate) -> Result<(), ArbitrationError> {
        self.expect_phase(Phase::Idle, "sow")?;
        for organ in &mut self.organs {
            organ.sow();
        }
        self.arbitrator.begin_day();
        self.sown = true;
        self.date = Some(date);
        info!(plant = %self.name, %date, wt = self.total_wt(), "plant sown");
        Ok(())
    }

    /// Clears flows, applies yesterday's removals, reads today's rates and
    /// pushes every organ's carbon demand and supplies into the ledger.
    pub fn start_growth(&mut self, date: NaiveDate) -> Result<(), ArbitrationError> {
        self.expect_phase(Phase::Idle, "start-growth")?;
        if !self.sown {
            return Err(ArbitrationError::PhaseSequence {
                expected: "sow",
                requested: "start-growth",
            });
        }
        self.date = Some(date);
        self.start_wt = self.total_wt();
        self.arbitrator.begin_day();
        for (index, organ) in self.organs.iter_mut().enumerate() {
            organ.begin_day();
            organ.apply_pending_removals(&self.config)?;
            organ.compute_daily_rates()?;
            self.arbitrator
                .set_request(Nutrient::Carbon, index, &organ.carbon_request()?)?;
        }
        self.phase = Phase::GrowthStarted;
        Ok(())
    }

    pub fn potential_partition(&mut self) -> Result<(), ArbitrationError> {
        self.expect_phase(Phase::GrowthStarted, "potential-partition")?;
        let organs = &self.organs;
        self.arbitrator
            .on_potential_partition(|index, potential_c| organs[index].nitrogen_request(potential_c))?;
        self.uptake_demand = self.arbitrator.uptake_demand();
        self.phase = Phase::PotentialPartitioned;
        Ok(())
    }

    /// Nitrogen each organ still wants, to hand to the soil.
    pub fn uptake_demand(&self) -> Vec<UptakeDemand> {
        self.arbitrator.uptake_demand_by_organ()
    }

    pub fn allocate_n_uptake(&mut self, total_plant_uptake: f64) -> Result<f64, ArbitrationError> {
        self.expect_phase(Phase::PotentialPartitioned, "allocate-n-uptake")?;
        let allocated = self.arbitrator.allocate_n_uptake(total_plant_uptake)?;
        self.phase = Phase::UptakeAllocated;
        Ok(allocated)
    }

    /// Finishes arbitration and applies the day's flows to every organ.
    pub fn actual_partition(&mut self) -> Result<(), ArbitrationError> {
        self.expect_phase(Phase::UptakeAllocated, "actual-partition")?;
        self.arbitrator.on_actual_partition()?;
        for (index, organ) in self.organs.iter_mut().enumerate() {
            let allocation = self.arbitrator.organ_allocation(index)?;
            organ.apply_senescence(&allocation, &self.config)?;
            organ.apply_retranslocation(&allocation, &self.config)?;
            organ.apply_growth_allocation(&allocation);
            organ.apply_detachment_and_respiration(&self.config)?;
            organ.partition_flows(self.date, &self.config)?;
        }
        self.phase = Phase::ActualPartitioned;
        Ok(())
    }

    /// Asserts every organ's mass balance and reports the day.
    pub fn close_day(&mut self) -> Result<DailyReport, ArbitrationError> {
        self.expect_phase(Phase::ActualPartitioned, "close-day")?;
        for organ in &self.organs {
            organ.check_mass_balance(self.date, &self.config)?;
        }
        let date = self.date.ok_or(ArbitrationError::PhaseSequence {
            expected: "start-growth",
            requested: "close-day",
        })?;
        self.phase = Phase::Idle;
        let report = self.report(date);
        info!(
            plant = %self.name,
            date = %report.date,
            delta_wt = report.delta_wt,
            fn_ratio = report.fn_ratio,
            "day closed"
        );
        Ok(report)
    }

    /// The whole protocol for one day, with `soil` granting nitrogen uptake.
    pub fn run_day(
        &mut self,
        date: NaiveDate,
        soil: &mut dyn SoilUptake,
    ) -> Result<DailyReport, ArbitrationError> {
        self.start_growth(date)?;
        self.potential_partition()?;
        let granted = soil.grant(date, &self.uptake_demand());
        self.allocate_n_uptake(granted)?;
        self.actual_partition()?;
        self.close_day()
    }

    fn organ_index(&self, organ: &str) -> Result<usize, ArbitrationError> {
        self.organs
            .iter()
            .position(|o| o.name() == organ)
            .ok_or_else(|| ArbitrationError::InvalidRemoval {
                organ: organ.to_string(),
                detail: "no such organ".to_string(),
            })
    }

    /// Flags a removal from one organ; applied at the start of the next day.
    pub fn remove_biomass(
        &mut self,
        organ: &str,
        fractions: RemovalFractions,
    ) -> Result<f64, ArbitrationError> {
        self.expect_phase(Phase::Idle, "remove-biomass")?;
        let index = self.organ_index(organ)?;
        self.organs[index].remove_biomass(fractions)
    }

    /// Harvests every organ at its default fractions; returns the total removed.
    /// Nothing is flagged unless every organ accepts its fractions.
    pub fn harvest(&mut self) -> Result<f64, ArbitrationError> {
        self.expect_phase(Phase::Idle, "harvest")?;
        for organ in &self.organs {
            organ.check_removal(&organ.params().harvest)?;
        }
        let mut removed = 0.0;
        for organ in &mut self.organs {
            removed += organ.harvest()?;
        }
        info!(plant = %self.name, removed, "plant harvested");
        Ok(removed)
    }

    /// Ends the crop: all biomass to residue. Returns what each organ shed.
    pub fn end(&mut self) -> Result<Vec<(String, OrganNutrientsState)>, ArbitrationError> {
        self.expect_phase(Phase::Idle, "end")?;
        let shed: Vec<_> = self
            .organs
            .iter_mut()
            .map(|o| (o.name().to_string(), o.end()))
            .collect();
        self.arbitrator.end();
        self.sown = false;
        info!(plant = %self.name, "plant ended");
        Ok(shed)
    }

    fn report(&self, date: NaiveDate) -> DailyReport {
        let outputs: &ArbitrationOutputs = self.arbitrator.outputs();
        let total_wt = self.total_wt();
        DailyReport {
            date,
            plant: self.name.clone(),
            unallocated_c: outputs.unallocated_c,
            unallocated_n: outputs.unallocated_n,
            fn_ratio: outputs.fn_ratio,
            fdm: outputs.fdm,
            c_unallocated_due_to_n_limitation: outputs.c_unallocated_due_to_n_limitation,
            n_uptake_demand: self.uptake_demand,
            n_uptake_granted: outputs.n_uptake_granted,
            n_uptake_allocated: outputs.n_uptake_allocated,
            delta_wt: total_wt - self.start_wt,
            total_wt,
            organs: self.organs.iter().map(OrganReport::from_organ).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_sown(&self) -> bool {
        self.sown
    }

    pub fn organs(&self) -> &[Organ] {
        &self.organs
    }

    pub fn organ(&self, name: &str) -> Option<&Organ> {
        self.organs.iter().find(|o| o.name() == name)
    }

    pub fn arbitrator(&self) -> &BiomassArbitrator {
        &self.arbitrator
    }

    pub fn total_wt(&self) -> f64 {
        self.organs.iter().map(Organ::wt).sum()
    }

    pub fn total_n(&self) -> f64 {
        self.organs.iter().map(Organ::n).sum()
    }
}
