use chrono::NaiveDate;
use thiserror::Error;

use crate::nutrient::{Nutrient, PoolKind, SupplyCategory};

/// Fatal conditions raised by the daily arbitration protocol.
///
/// None of these are recovered inside the engine; the simulation driver decides
/// whether the run halts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArbitrationError {
    #[error("{nutrient} {category} allocation {allocated} exceeds its limit {limit}")]
    ConservationViolation {
        nutrient: Nutrient,
        category: SupplyCategory,
        allocated: f64,
        limit: f64,
    },
    #[error("{nutrient} allocation inconsistency: {detail}")]
    AllocationInconsistency { nutrient: Nutrient, detail: String },
    #[error(
        "{nutrient} mass balance violated for {organ} ({pool}) on {}: expected {expected}, found {found}",
        day_label(.date)
    )]
    MassBalanceViolation {
        organ: String,
        nutrient: Nutrient,
        pool: PoolKind,
        date: Option<NaiveDate>,
        expected: f64,
        found: f64,
    },
    #[error("configuration error: {0}")]
    ConfigurationError(String),
    #[error("phase `{requested}` delivered while the plant expected `{expected}`")]
    PhaseSequence {
        expected: &'static str,
        requested: &'static str,
    },
    #[error("invalid biomass removal for {organ}: {detail}")]
    InvalidRemoval { organ: String, detail: String },
}

fn day_label(date: &Option<NaiveDate>) -> String {
    match date {
        Some(d) => d.format("%Y-%m-%d").to_string(),
        None => "an undated day".to_string(),
    }
}

impl ArbitrationError {
    pub fn inconsistency(nutrient: Nutrient, detail: impl Into<String>) -> Self {
        ArbitrationError::AllocationInconsistency {
            nutrient,
            detail: detail.into(),
        }
    }

    pub fn configuration(detail: impl Into<String>) -> Self {
        ArbitrationError::ConfigurationError(detail.into())
    }
}
