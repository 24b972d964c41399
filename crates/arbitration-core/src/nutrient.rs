use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Nutrient {
    Carbon,
    Nitrogen,
}

impl fmt::Display for Nutrient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Nutrient::Carbon => write!(f, "carbon"),
            Nutrient::Nitrogen => write!(f, "nitrogen"),
        }
    }
}

/// Sources a nutrient can be allocated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SupplyCategory {
    /// Photosynthesis (carbon) or symbiotic fixation (nitrogen).
    Fixation,
    /// Soil uptake.
    Uptake,
    /// Drawn from senescing tissue.
    Reallocation,
    /// Drawn from the non-structural pools of living tissue.
    Retranslocation,
}

impl SupplyCategory {
    pub const ALL: [SupplyCategory; 4] = [
        SupplyCategory::Fixation,
        SupplyCategory::Uptake,
        SupplyCategory::Reallocation,
        SupplyCategory::Retranslocation,
    ];
}

impl fmt::Display for SupplyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SupplyCategory::Fixation => "fixation",
            SupplyCategory::Uptake => "uptake",
            SupplyCategory::Reallocation => "reallocation",
            SupplyCategory::Retranslocation => "retranslocation",
        };
        f.write_str(s)
    }
}

/// The two persistent biomass compartments of an organ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolKind {
    Live,
    Dead,
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolKind::Live => write!(f, "live"),
            PoolKind::Dead => write!(f, "dead"),
        }
    }
}
