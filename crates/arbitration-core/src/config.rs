use serde::{Deserialize, Serialize};

/// Numeric tolerances shared by every arbitration step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbitrationConfig {
    /// Supplies at or below this are not arbitrated; allocation overshoot beyond it is fatal.
    pub allocation_tolerance: f64,
    /// Relative part of the mass-balance tolerance, scaled by the pool size.
    pub mass_balance_relative: f64,
    /// Absolute floor of the mass-balance tolerance.
    pub mass_balance_absolute: f64,
    /// A withdrawal may overdraw a pool by this share of the pool (floored at
    /// this absolute amount) before it counts as a real deficit.
    pub negative_noise: f64,
    /// Dead biomass that would remain below this after detachment is detached in full.
    pub detachment_residue_threshold: f64,
    /// Carbon increment reported for organs whose nitrogen demand is fully met.
    pub unconstrained_c_delta: f64,
}

impl Default for ArbitrationConfig {
    fn default() -> Self {
        Self {
            allocation_tolerance: 1e-12,
            mass_balance_relative: 1e-13,
            mass_balance_absolute: 1e-11,
            negative_noise: 1e-13,
            detachment_residue_threshold: 1e-8,
            unconstrained_c_delta: 1e8,
        }
    }
}

impl ArbitrationConfig {
    /// `max(|value| * relative, absolute)`.
    pub fn mass_balance_tolerance(&self, value: f64) -> f64 {
        (value.abs() * self.mass_balance_relative).max(self.mass_balance_absolute)
    }

    /// Overdraw accepted as rounding noise when taking from a pool of size `value`.
    pub fn noise_tolerance(&self, value: f64) -> f64 {
        self.negative_noise * value.abs().max(1.0)
    }
}
