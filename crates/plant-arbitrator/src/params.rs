use arbitration_core::NutrientPoolsState;
use serde::{Deserialize, Serialize};

use crate::removal::RemovalFractions;

/// Roles an organ plays in whole-plant arbitration beyond being a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrganRole {
    /// Receives the soil's nitrogen uptake grant. At most one per plant.
    NitrogenUptakeSink,
}

/// Nitrogen concentration thresholds, g N per g C.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NitrogenConcentrations {
    pub minimum: f64,
    pub critical: f64,
    pub maximum: f64,
}

impl NitrogenConcentrations {
    /// Thresholds as a pool value: minimum / critical / maximum in the
    /// structural / metabolic / storage slots.
    pub fn as_pools(&self) -> NutrientPoolsState {
        NutrientPoolsState::new(self.minimum, self.critical, self.maximum)
    }

    /// Nitrogen needed per unit of carbon in each pool.
    pub fn per_pool(&self) -> NutrientPoolsState {
        NutrientPoolsState::new(
            self.minimum,
            self.critical - self.minimum,
            self.maximum - self.critical,
        )
    }
}

/// How freely one nutrient moves out of an organ and how hard it pulls in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NutrientFactors {
    /// Share of senescing non-structural mass that can be reallocated.
    pub reallocation: f64,
    /// Share of surviving non-structural mass that can be retranslocated.
    pub retranslocation: f64,
    pub priority: NutrientPoolsState,
}

impl Default for NutrientFactors {
    fn default() -> Self {
        Self {
            reallocation: 0.0,
            retranslocation: 0.0,
            priority: NutrientPoolsState::new(1.0, 1.0, 1.0),
        }
    }
}

fn default_carbon_concentration() -> f64 {
    0.4
}

fn default_carbon_fractions() -> NutrientPoolsState {
    NutrientPoolsState::structural_only(1.0)
}

/// Static description of one organ.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganParams {
    pub name: String,
    #[serde(default)]
    pub roles: Vec<OrganRole>,
    #[serde(default = "default_carbon_concentration")]
    pub carbon_concentration: f64,
    /// Dry weight at sowing, g/m2.
    #[serde(default)]
    pub initial_wt: f64,
    /// Split of sowing carbon across structural / metabolic / storage.
    #[serde(default = "default_carbon_fractions")]
    pub carbon_fractions: NutrientPoolsState,
    #[serde(default)]
    pub nitrogen_concentrations: NitrogenConcentrations,
    #[serde(default)]
    pub carbon: NutrientFactors,
    #[serde(default)]
    pub nitrogen: NutrientFactors,
    #[serde(default)]
    pub harvest: RemovalFractions,
}

impl OrganParams {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            roles: Vec::new(),
            carbon_concentration: default_carbon_concentration(),
            initial_wt: 0.0,
            carbon_fractions: default_carbon_fractions(),
            nitrogen_concentrations: NitrogenConcentrations::default(),
            carbon: NutrientFactors::default(),
            nitrogen: NutrientFactors::default(),
            harvest: RemovalFractions::default(),
        }
    }

    pub fn has_role(&self, role: OrganRole) -> bool {
        self.roles.contains(&role)
    }
}
