use arbitration_core::{ArbitrationError, OrganNutrientsState};
use serde::{Deserialize, Serialize};

/// Rounding allowed when a live or dead pair of fractions adds up to one.
const FRACTION_SLACK: f64 = 1e-12;

/// Management removal of biomass, as fractions of the organ's current pools.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemovalFractions {
    pub live_to_remove: f64,
    pub dead_to_remove: f64,
    pub live_to_residue: f64,
    pub dead_to_residue: f64,
}

impl RemovalFractions {
    pub fn new(
        live_to_remove: f64,
        dead_to_remove: f64,
        live_to_residue: f64,
        dead_to_residue: f64,
    ) -> Self {
        Self {
            live_to_remove,
            dead_to_remove,
            live_to_residue,
            dead_to_residue,
        }
    }

    pub fn live_total(&self) -> f64 {
        self.live_to_remove + self.live_to_residue
    }

    pub fn dead_total(&self) -> f64 {
        self.dead_to_remove + self.dead_to_residue
    }

    pub fn is_empty(&self) -> bool {
        self.live_total() <= 0.0 && self.dead_total() <= 0.0
    }

    /// Each fraction in `[0,1]` and each live/dead pair summing to at most 1.
    pub fn validate(&self, organ: &str) -> Result<(), ArbitrationError> {
        let named = [
            ("live_to_remove", self.live_to_remove),
            ("dead_to_remove", self.dead_to_remove),
            ("live_to_residue", self.live_to_residue),
            ("dead_to_residue", self.dead_to_residue),
        ];
        for (name, value) in named {
            if !(0.0..=1.0).contains(&value) {
                return Err(ArbitrationError::InvalidRemoval {
                    organ: organ.to_string(),
                    detail: format!("{name} = {value} is outside [0, 1]"),
                });
            }
        }
        if self.live_total() > 1.0 + FRACTION_SLACK {
            return Err(ArbitrationError::InvalidRemoval {
                organ: organ.to_string(),
                detail: format!("live fractions sum to {}", self.live_total()),
            });
        }
        if self.dead_total() > 1.0 + FRACTION_SLACK {
            return Err(ArbitrationError::InvalidRemoval {
                organ: organ.to_string(),
                detail: format!("dead fractions sum to {}", self.dead_total()),
            });
        }
        Ok(())
    }

    /// Amounts taken from `live` and `dead`. A pair that overshoots 1 by
    /// rounding is rescaled so it never takes more than the whole pool.
    pub fn split(&self, live: &OrganNutrientsState, dead: &OrganNutrientsState) -> RemovedBiomass {
        let live_scale = 1.0 / self.live_total().max(1.0);
        let dead_scale = 1.0 / self.dead_total().max(1.0);
        RemovedBiomass {
            live_exported: live.scaled(self.live_to_remove * live_scale),
            live_to_residue: live.scaled(self.live_to_residue * live_scale),
            dead_exported: dead.scaled(self.dead_to_remove * dead_scale),
            dead_to_residue: dead.scaled(self.dead_to_residue * dead_scale),
        }
    }
}

/// Where removed biomass goes: off the field, or onto the soil surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RemovedBiomass {
    pub live_exported: OrganNutrientsState,
    pub live_to_residue: OrganNutrientsState,
    pub dead_exported: OrganNutrientsState,
    pub dead_to_residue: OrganNutrientsState,
}

impl RemovedBiomass {
    pub fn live(&self) -> OrganNutrientsState {
        self.live_exported.plus(&self.live_to_residue)
    }

    pub fn dead(&self) -> OrganNutrientsState {
        self.dead_exported.plus(&self.dead_to_residue)
    }

    pub fn residue(&self) -> OrganNutrientsState {
        self.live_to_residue.plus(&self.dead_to_residue)
    }

    pub fn exported(&self) -> OrganNutrientsState {
        self.live_exported.plus(&self.dead_exported)
    }

    /// Live plus dead dry weight leaving the organ.
    pub fn total_wt(&self) -> f64 {
        self.live().wt() + self.dead().wt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_fractions_outside_unit_interval() {
        let f = RemovalFractions::new(1.2, 0.0, 0.0, 0.0);
        assert!(matches!(
            f.validate("leaf"),
            Err(ArbitrationError::InvalidRemoval { .. })
        ));
        let f = RemovalFractions::new(0.0, -0.1, 0.0, 0.0);
        assert!(f.validate("leaf").is_err());
        let f = RemovalFractions::new(0.0, 0.0, f64::NAN, 0.0);
        assert!(f.validate("leaf").is_err());
    }

    #[test]
    fn rejects_pairs_summing_above_one() {
        assert!(RemovalFractions::new(0.7, 0.0, 0.4, 0.0).validate("stem").is_err());
        assert!(RemovalFractions::new(0.0, 0.5, 0.0, 0.6).validate("stem").is_err());
        assert!(RemovalFractions::new(0.6, 0.5, 0.4, 0.5).validate("stem").is_ok());
    }
}
