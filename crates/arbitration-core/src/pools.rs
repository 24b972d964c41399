use serde::{Deserialize, Serialize};
use std::iter::Sum;
use std::ops::{Add, Div, Mul, Sub};

use crate::nutrient::Nutrient;

/// Clamp a pool component at zero. `NaN` is kept so that [`NutrientPoolsState::is_finite`]
/// can report it.
#[inline]
fn clamp_component(value: f64) -> f64 {
    if value.is_nan() || value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Structural / metabolic / storage quantities of one nutrient in one organ (g/m2).
///
/// Every constructor and operator clamps components at zero, so a value of this
/// type is never negative (a `NaN` component stays `NaN`). Values are immutable: arithmetic returns a new value.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "PoolsRepr", into = "PoolsRepr")]
pub struct NutrientPoolsState {
    structural: f64,
    metabolic: f64,
    storage: f64,
}

#[derive(Serialize, Deserialize)]
struct PoolsRepr {
    #[serde(default)]
    structural: f64,
    #[serde(default)]
    metabolic: f64,
    #[serde(default)]
    storage: f64,
}

impl From<PoolsRepr> for NutrientPoolsState {
    fn from(r: PoolsRepr) -> Self {
        Self::new(r.structural, r.metabolic, r.storage)
    }
}

impl From<NutrientPoolsState> for PoolsRepr {
    fn from(p: NutrientPoolsState) -> Self {
        Self {
            structural: p.structural,
            metabolic: p.metabolic,
            storage: p.storage,
        }
    }
}

impl NutrientPoolsState {
    pub const ZERO: Self = Self {
        structural: 0.0,
        metabolic: 0.0,
        storage: 0.0,
    };

    pub fn new(structural: f64, metabolic: f64, storage: f64) -> Self {
        Self {
            structural: clamp_component(structural),
            metabolic: clamp_component(metabolic),
            storage: clamp_component(storage),
        }
    }

    pub fn structural_only(structural: f64) -> Self {
        Self::new(structural, 0.0, 0.0)
    }

    pub fn structural(&self) -> f64 {
        self.structural
    }

    pub fn metabolic(&self) -> f64 {
        self.metabolic
    }

    pub fn storage(&self) -> f64 {
        self.storage
    }

    pub fn total(&self) -> f64 {
        self.structural + self.metabolic + self.storage
    }

    /// Metabolic + storage, the pools that can be moved out of living tissue.
    pub fn non_structural(&self) -> Self {
        Self::new(0.0, self.metabolic, self.storage)
    }

    pub fn components(&self) -> [f64; 3] {
        [self.structural, self.metabolic, self.storage]
    }

    pub fn from_components(c: [f64; 3]) -> Self {
        Self::new(c[0], c[1], c[2])
    }

    /// Component-wise product, used for priority scaling.
    pub fn scaled_by(&self, factors: &NutrientPoolsState) -> Self {
        Self::new(
            self.structural * factors.structural,
            self.metabolic * factors.metabolic,
            self.storage * factors.storage,
        )
    }

    pub fn min_each(&self, other: &NutrientPoolsState) -> Self {
        Self::new(
            self.structural.min(other.structural),
            self.metabolic.min(other.metabolic),
            self.storage.min(other.storage),
        )
    }

    /// Share of the total held by each pool; all zero when the total is zero.
    pub fn proportions(&self) -> Self {
        let total = self.total();
        if total > 0.0 {
            *self / total
        } else {
            Self::ZERO
        }
    }

    /// Same pool ratios, rescaled to `total`.
    pub fn scaled_to_total(&self, total: f64) -> Self {
        self.proportions() * total
    }

    /// Subtraction that refuses to hide a real deficit: any component that would
    /// fall below `-tolerance` yields `None`; smaller negatives are clamped.
    pub fn checked_sub(&self, other: &NutrientPoolsState, tolerance: f64) -> Option<Self> {
        let s = self.structural - other.structural;
        let m = self.metabolic - other.metabolic;
        let st = self.storage - other.storage;
        if s < -tolerance || m < -tolerance || st < -tolerance {
            return None;
        }
        Some(Self::new(s, m, st))
    }

    pub fn is_zero(&self) -> bool {
        self.total() <= 0.0
    }

    pub fn is_finite(&self) -> bool {
        self.structural.is_finite() && self.metabolic.is_finite() && self.storage.is_finite()
    }
}

impl Add for NutrientPoolsState {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(
            self.structural + rhs.structural,
            self.metabolic + rhs.metabolic,
            self.storage + rhs.storage,
        )
    }
}

impl Sub for NutrientPoolsState {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(
            self.structural - rhs.structural,
            self.metabolic - rhs.metabolic,
            self.storage - rhs.storage,
        )
    }
}

impl Mul<f64> for NutrientPoolsState {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self::new(self.structural * rhs, self.metabolic * rhs, self.storage * rhs)
    }
}

impl Div<f64> for NutrientPoolsState {
    type Output = Self;

    fn div(self, rhs: f64) -> Self {
        if rhs == 0.0 {
            return Self::ZERO;
        }
        Self::new(self.structural / rhs, self.metabolic / rhs, self.storage / rhs)
    }
}

impl Sum for NutrientPoolsState {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, p| acc + p)
    }
}

/// Carbon and nitrogen pools of one biomass compartment (live, dead or a daily flow).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrganNutrientsState {
    pub carbon: NutrientPoolsState,
    pub nitrogen: NutrientPoolsState,
    /// Carbon content of dry matter (g C / g DM).
    pub carbon_concentration: f64,
}

impl OrganNutrientsState {
    pub fn empty(carbon_concentration: f64) -> Self {
        Self {
            carbon: NutrientPoolsState::ZERO,
            nitrogen: NutrientPoolsState::ZERO,
            carbon_concentration,
        }
    }

    pub fn from_pools(
        carbon: NutrientPoolsState,
        nitrogen: NutrientPoolsState,
        carbon_concentration: f64,
    ) -> Self {
        Self {
            carbon,
            nitrogen,
            carbon_concentration,
        }
    }

    pub fn nutrient(&self, nutrient: Nutrient) -> NutrientPoolsState {
        match nutrient {
            Nutrient::Carbon => self.carbon,
            Nutrient::Nitrogen => self.nitrogen,
        }
    }

    /// Dry weight implied by the carbon pools.
    pub fn weight(&self) -> NutrientPoolsState {
        self.carbon / self.carbon_concentration
    }

    pub fn wt(&self) -> f64 {
        self.weight().total()
    }

    pub fn c(&self) -> f64 {
        self.carbon.total()
    }

    pub fn n(&self) -> f64 {
        self.nitrogen.total()
    }

    pub fn n_conc(&self) -> f64 {
        let wt = self.wt();
        if wt > 0.0 {
            self.n() / wt
        } else {
            0.0
        }
    }

    pub fn plus(&self, delta: &OrganNutrientsState) -> Self {
        Self {
            carbon: self.carbon + delta.carbon,
            nitrogen: self.nitrogen + delta.nitrogen,
            carbon_concentration: self.carbon_concentration,
        }
    }

    /// Joint checked subtraction; returns the nutrient that would go negative.
    pub fn checked_minus(
        &self,
        delta: &OrganNutrientsState,
        tolerance: f64,
    ) -> Result<Self, Nutrient> {
        let carbon = self
            .carbon
            .checked_sub(&delta.carbon, tolerance)
            .ok_or(Nutrient::Carbon)?;
        let nitrogen = self
            .nitrogen
            .checked_sub(&delta.nitrogen, tolerance)
            .ok_or(Nutrient::Nitrogen)?;
        Ok(Self {
            carbon,
            nitrogen,
            carbon_concentration: self.carbon_concentration,
        })
    }

    pub fn scaled(&self, fraction: f64) -> Self {
        Self {
            carbon: self.carbon * fraction,
            nitrogen: self.nitrogen * fraction,
            carbon_concentration: self.carbon_concentration,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.carbon.is_zero() && self.nitrogen.is_zero()
    }
}
