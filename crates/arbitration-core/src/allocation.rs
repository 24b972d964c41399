use tracing::{debug, error};

use crate::config::ArbitrationConfig;
use crate::error::ArbitrationError;
use crate::ledger::PlantNutrientLedger;
use crate::nutrient::{Nutrient, SupplyCategory};
use crate::pools::NutrientPoolsState;

/// `numerator / denominator`, or 0 when the denominator is 0.
#[inline]
fn divide_or_zero(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Clamp rounding noise at zero and refuse to hide a `NaN`.
fn checked_pools(
    nutrient: Nutrient,
    organ: &str,
    parts: [f64; 3],
) -> Result<NutrientPoolsState, ArbitrationError> {
    if parts.iter().any(|v| v.is_nan()) {
        error!(%nutrient, organ, "allocation produced NaN");
        return Err(ArbitrationError::inconsistency(
            nutrient,
            format!("allocation to {organ} produced NaN"),
        ));
    }
    Ok(NutrientPoolsState::from_components(parts))
}

/// Two-pass fair-share allocation of `total_supply` against the outstanding
/// demand in `ledger`. Returns the amount actually allocated.
///
/// Pass 1 weights every organ by its share of the plant's priority-scaled
/// demand. Pass 2 hands whatever pass 1 left over to organs that still have
/// outstanding demand, in proportion to that outstanding demand. Organs are
/// visited in registration order, which decides ties.
pub fn do_allocation(
    total_supply: f64,
    ledger: &mut PlantNutrientLedger,
    config: &ArbitrationConfig,
) -> Result<f64, ArbitrationError> {
    let nutrient = ledger.nutrient();
    if total_supply.is_nan() {
        error!(%nutrient, "supply is NaN");
        return Err(ArbitrationError::inconsistency(nutrient, "supply is NaN"));
    }
    if total_supply <= config.allocation_tolerance {
        return Ok(0.0);
    }

    let snapshot = ledger.totals();
    let priority_total = snapshot.total_priority_scaled_demand;
    let mut not_allocated = total_supply;
    let mut total_allocated = 0.0;

    // 1. priority-weighted pass
    for organ in ledger.organs_mut() {
        let outstanding = organ.outstanding_demands();
        if outstanding.total() <= 0.0 {
            continue;
        }
        let weighted = organ.priority_scaled_demand().components();
        let out = outstanding.components();
        let parts: [f64; 3] = std::array::from_fn(|i| {
            out[i].min(total_supply * divide_or_zero(weighted[i], priority_total))
        });
        let allocation = checked_pools(nutrient, organ.organ(), parts)?;
        organ.add_allocation(allocation);
        not_allocated -= allocation.total();
        total_allocated += allocation.total();
    }

    // 2. fair-share pass over what is left
    let after_first = ledger.totals();
    let mut remaining_demand = after_first.remaining_demand();
    if remaining_demand < -config.allocation_tolerance {
        error!(%nutrient, remaining_demand, "demand allocated exceeds demand");
        return Err(ArbitrationError::inconsistency(
            nutrient,
            format!(
                "allocated {} against a total demand of {}",
                after_first.total_demands_allocated, after_first.total_demand
            ),
        ));
    }
    remaining_demand = remaining_demand.max(0.0);
    not_allocated = not_allocated.max(0.0);

    if not_allocated > 0.0 && remaining_demand > 0.0 {
        for organ in ledger.organs_mut() {
            let outstanding = organ.outstanding_demands();
            if outstanding.total() <= 0.0 {
                continue;
            }
            let out = outstanding.components();
            let parts: [f64; 3] = std::array::from_fn(|i| {
                out[i].min(not_allocated * divide_or_zero(out[i], remaining_demand))
            });
            let allocation = checked_pools(nutrient, organ.organ(), parts)?;
            organ.add_allocation(allocation);
            total_allocated += allocation.total();
        }
    }

    debug!(
        %nutrient,
        total_supply,
        total_allocated,
        first_pass_remaining = not_allocated,
        "allocation pass complete"
    );
    Ok(total_allocated)
}

/// Part of `total_allocated` owed to one organ that offered `organ_supply`
/// out of a plant-wide `total_supply` for `category`.
pub fn share_of_allocation(
    total_allocated: f64,
    organ_supply: f64,
    total_supply: f64,
    nutrient: Nutrient,
    category: SupplyCategory,
    config: &ArbitrationConfig,
) -> Result<f64, ArbitrationError> {
    if total_allocated - total_supply > config.allocation_tolerance {
        error!(%nutrient, %category, total_allocated, total_supply, "allocation greater than supply");
        return Err(ArbitrationError::ConservationViolation {
            nutrient,
            category,
            allocated: total_allocated,
            limit: total_supply,
        });
    }
    let share = total_allocated * divide_or_zero(organ_supply, total_supply);
    if share.is_nan() {
        error!(%nutrient, %category, "supply share is NaN");
        return Err(ArbitrationError::inconsistency(
            nutrient,
            format!("{category} share is NaN"),
        ));
    }
    if share < -config.allocation_tolerance {
        error!(%nutrient, %category, share, "supply share is negative");
        return Err(ArbitrationError::inconsistency(
            nutrient,
            format!("{category} share {share} is negative"),
        ));
    }
    Ok(share.max(0.0))
}

/// [`share_of_allocation`] applied pool by pool. The structural pool never
/// supplies, so it always receives zero.
pub fn share_of_pooled_allocation(
    total_allocated: f64,
    organ_supply: &NutrientPoolsState,
    total_supply: f64,
    nutrient: Nutrient,
    category: SupplyCategory,
    config: &ArbitrationConfig,
) -> Result<NutrientPoolsState, ArbitrationError> {
    let metabolic = share_of_allocation(
        total_allocated,
        organ_supply.metabolic(),
        total_supply,
        nutrient,
        category,
        config,
    )?;
    let storage = share_of_allocation(
        total_allocated,
        organ_supply.storage(),
        total_supply,
        nutrient,
        category,
        config,
    )?;
    Ok(NutrientPoolsState::new(0.0, metabolic, storage))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn divide_by_zero_is_zero_not_nan() {
        assert_eq!(divide_or_zero(0.0, 0.0), 0.0);
        assert_eq!(divide_or_zero(3.0, 0.0), 0.0);
        assert_eq!(divide_or_zero(3.0, 2.0), 1.5);
    }

    #[test]
    fn share_splits_by_supply() {
        let cfg = ArbitrationConfig::default();
        let a = share_of_allocation(2.0, 3.0, 4.0, Nutrient::Carbon, SupplyCategory::Fixation, &cfg)
            .unwrap();
        let b = share_of_allocation(2.0, 1.0, 4.0, Nutrient::Carbon, SupplyCategory::Fixation, &cfg)
            .unwrap();
        assert!((a - 1.5).abs() < 1e-12);
        assert!((b - 0.5).abs() < 1e-12);
    }

    #[test]
    fn share_with_zero_total_supply_is_zero() {
        let cfg = ArbitrationConfig::default();
        let s = share_of_allocation(0.0, 0.0, 0.0, Nutrient::Nitrogen, SupplyCategory::Uptake, &cfg)
            .unwrap();
        assert_eq!(s, 0.0);
    }

    #[test]
    fn share_rejects_allocation_above_supply() {
        let cfg = ArbitrationConfig::default();
        let err = share_of_allocation(
            5.0,
            1.0,
            4.0,
            Nutrient::Carbon,
            SupplyCategory::Retranslocation,
            &cfg,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ArbitrationError::ConservationViolation {
                category: SupplyCategory::Retranslocation,
                ..
            }
        ));
    }

    #[test]
    fn pooled_share_leaves_structural_empty() {
        let cfg = ArbitrationConfig::default();
        let supply = NutrientPoolsState::new(0.0, 2.0, 2.0);
        let s = share_of_pooled_allocation(
            2.0,
            &supply,
            4.0,
            Nutrient::Carbon,
            SupplyCategory::Reallocation,
            &cfg,
        )
        .unwrap();
        assert_eq!(s.structural(), 0.0);
        assert!((s.metabolic() - 1.0).abs() < 1e-12);
        assert!((s.storage() - 1.0).abs() < 1e-12);
    }
}
