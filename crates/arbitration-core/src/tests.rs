use crate::{
    do_allocation, ArbitrationConfig, Nutrient, NutrientPoolsState, NutrientRequest,
    OrganNutrientsState, PlantNutrientLedger,
};
use rand::Rng;

fn structural_demand(value: f64) -> NutrientRequest {
    NutrientRequest {
        demand: NutrientPoolsState::structural_only(value),
        priority: NutrientPoolsState::new(1.0, 1.0, 1.0),
        ..Default::default()
    }
}

fn two_organ_ledger(a: NutrientRequest, b: NutrientRequest) -> PlantNutrientLedger {
    let mut ledger = PlantNutrientLedger::new(Nutrient::Carbon, ["leaf", "root"]);
    ledger.organs_mut()[0].set_request(&a);
    ledger.organs_mut()[1].set_request(&b);
    ledger
}

#[test]
fn pools_never_go_negative() {
    let a = NutrientPoolsState::new(1.0, 2.0, 3.0);
    let b = NutrientPoolsState::new(2.0, 1.0, 5.0);
    let d = a - b;
    assert_eq!(d.structural(), 0.0);
    assert_eq!(d.metabolic(), 1.0);
    assert_eq!(d.storage(), 0.0);
    let noisy = NutrientPoolsState::new(-1e-14, 0.0, 4.0);
    assert_eq!(noisy.components(), [0.0, 0.0, 4.0]);
    let broken = NutrientPoolsState::new(1.0, f64::NAN, 4.0);
    assert!(!broken.is_finite());
    assert!(!(broken * 2.0).is_finite());
    assert!(noisy.is_finite());
    assert_eq!(a / 0.0, NutrientPoolsState::ZERO);
}

#[test]
fn checked_sub_absorbs_noise_but_reports_deficit() {
    let a = NutrientPoolsState::new(1.0, 1.0, 1.0);
    let noisy = NutrientPoolsState::new(1.0 + 1e-15, 0.5, 0.0);
    assert!(a.checked_sub(&noisy, 1e-13).is_some());
    let deficit = NutrientPoolsState::new(1.5, 0.0, 0.0);
    assert!(a.checked_sub(&deficit, 1e-13).is_none());
}

#[test]
fn proportions_preserve_pool_ratios() {
    let p = NutrientPoolsState::new(2.0, 1.0, 1.0);
    let scaled = p.scaled_to_total(2.0);
    assert!((scaled.structural() - 1.0).abs() < 1e-12);
    assert!((scaled.metabolic() - 0.5).abs() < 1e-12);
    assert!((scaled.storage() - 0.5).abs() < 1e-12);
    assert_eq!(NutrientPoolsState::ZERO.proportions(), NutrientPoolsState::ZERO);
}

#[test]
fn organ_state_weight_follows_carbon_concentration() {
    let s = OrganNutrientsState::from_pools(
        NutrientPoolsState::new(4.0, 0.0, 0.0),
        NutrientPoolsState::new(0.1, 0.0, 0.0),
        0.4,
    );
    assert!((s.wt() - 10.0).abs() < 1e-12);
    assert!((s.n_conc() - 0.01).abs() < 1e-12);
    let removed = s.checked_minus(&s.scaled(0.5), 1e-13).unwrap();
    assert!((removed.wt() - 5.0).abs() < 1e-12);
}

#[test]
fn fair_share_splits_nine_into_six_and_three() {
    let cfg = ArbitrationConfig::default();
    let mut ledger = two_organ_ledger(structural_demand(10.0), structural_demand(5.0));

    let allocated = do_allocation(9.0, &mut ledger, &cfg).unwrap();

    assert!((allocated - 9.0).abs() < 1e-12);
    assert!((ledger.organs()[0].demands_allocated().total() - 6.0).abs() < 1e-12);
    assert!((ledger.organs()[1].demands_allocated().total() - 3.0).abs() < 1e-12);
    assert!((ledger.organs()[0].outstanding_demands().total() - 4.0).abs() < 1e-12);
    assert!((ledger.organs()[1].outstanding_demands().total() - 2.0).abs() < 1e-12);
}

#[test]
fn zero_supply_is_idempotent() {
    let cfg = ArbitrationConfig::default();
    let mut ledger = two_organ_ledger(structural_demand(10.0), structural_demand(5.0));
    let before = ledger.clone();

    assert_eq!(do_allocation(0.0, &mut ledger, &cfg).unwrap(), 0.0);
    assert_eq!(do_allocation(1e-13, &mut ledger, &cfg).unwrap(), 0.0);
    assert_eq!(ledger, before);
}

#[test]
fn nan_supply_is_fatal() {
    let cfg = ArbitrationConfig::default();
    let mut ledger = two_organ_ledger(structural_demand(1.0), structural_demand(1.0));
    assert!(do_allocation(f64::NAN, &mut ledger, &cfg).is_err());
}

#[test]
fn second_pass_serves_low_priority_organ() {
    let cfg = ArbitrationConfig::default();
    let favoured = NutrientRequest {
        demand: NutrientPoolsState::structural_only(4.0),
        priority: NutrientPoolsState::new(3.0, 1.0, 1.0),
        ..Default::default()
    };
    let mut ledger = two_organ_ledger(favoured, structural_demand(4.0));

    // Pass 1: 8 * 12/16 = 6 capped at 4, and 8 * 4/16 = 2. Pass 2 tops up the rest.
    let allocated = do_allocation(8.0, &mut ledger, &cfg).unwrap();

    assert!((allocated - 8.0).abs() < 1e-12);
    assert!((ledger.organs()[0].demands_allocated().total() - 4.0).abs() < 1e-12);
    assert!((ledger.organs()[1].demands_allocated().total() - 4.0).abs() < 1e-12);
}

#[test]
fn surplus_supply_is_left_unallocated() {
    let cfg = ArbitrationConfig::default();
    let mut ledger = two_organ_ledger(structural_demand(2.0), structural_demand(1.0));
    let allocated = do_allocation(10.0, &mut ledger, &cfg).unwrap();
    assert!((allocated - 3.0).abs() < 1e-12);
    let t = ledger.totals();
    assert!(t.remaining_demand().abs() < 1e-12);
}

#[test]
fn equal_priority_ties_resolve_in_registration_order() {
    let cfg = ArbitrationConfig::default();
    let mut forward = two_organ_ledger(structural_demand(3.0), structural_demand(3.0));
    do_allocation(4.0, &mut forward, &cfg).unwrap();
    let first: Vec<f64> = forward
        .organs()
        .iter()
        .map(|o| o.demands_allocated().total())
        .collect();
    assert!((first[0] - 2.0).abs() < 1e-12);
    assert!((first[1] - 2.0).abs() < 1e-12);
    assert_eq!(forward.organs()[0].organ(), "leaf");
    assert_eq!(forward.organs()[1].organ(), "root");
}

#[test]
fn clear_resets_allocations_but_keeps_organ_names() {
    let cfg = ArbitrationConfig::default();
    let mut ledger = two_organ_ledger(structural_demand(3.0), structural_demand(3.0));
    do_allocation(4.0, &mut ledger, &cfg).unwrap();
    ledger.clear();
    assert_eq!(ledger.totals().total_demands_allocated, 0.0);
    assert_eq!(ledger.organs()[1].organ(), "root");
}

#[test]
fn random_allocations_respect_supply_and_demand() {
    let cfg = ArbitrationConfig::default();
    let mut rng = rand::thread_rng();

    for _ in 0..200 {
        let organs = rng.gen_range(1..6);
        let names: Vec<String> = (0..organs).map(|i| format!("organ{i}")).collect();
        let mut ledger = PlantNutrientLedger::new(Nutrient::Carbon, names);
        for organ in ledger.organs_mut() {
            let request = NutrientRequest {
                demand: NutrientPoolsState::new(
                    rng.gen_range(0.0..10.0),
                    rng.gen_range(0.0..5.0),
                    rng.gen_range(0.0..5.0),
                ),
                priority: NutrientPoolsState::new(
                    rng.gen_range(0.5..3.0),
                    rng.gen_range(0.5..3.0),
                    rng.gen_range(0.5..3.0),
                ),
                ..Default::default()
            };
            organ.set_request(&request);
        }

        let mut supplied = 0.0;
        for _ in 0..3 {
            let supply = rng.gen_range(0.0..15.0);
            let before: Vec<NutrientPoolsState> =
                ledger.organs().iter().map(|o| o.demands_allocated()).collect();

            let allocated = do_allocation(supply, &mut ledger, &cfg).unwrap();
            supplied += supply;

            assert!(allocated <= supply + 1e-9);
            assert!(allocated >= 0.0);
            let t = ledger.totals();
            assert!(t.total_demands_allocated <= t.total_demand + 1e-9);
            assert!(t.total_demands_allocated <= supplied + 1e-9);
            for (organ, prior) in ledger.organs().iter().zip(before) {
                let now = organ.demands_allocated().components();
                let was = prior.components();
                let demand = organ.demands().components();
                for i in 0..3 {
                    assert!(now[i] + 1e-12 >= was[i], "allocation shrank");
                    assert!(now[i] <= demand[i] + 1e-9, "allocation above demand");
                }
            }
        }
    }
}

#[test]
fn config_fills_missing_tolerances_with_defaults() {
    let cfg: ArbitrationConfig =
        serde_json::from_str(r#"{ "detachment_residue_threshold": 1e-6 }"#).unwrap();
    assert_eq!(cfg.detachment_residue_threshold, 1e-6);
    assert_eq!(cfg.allocation_tolerance, 1e-12);
    assert_eq!(cfg.mass_balance_tolerance(0.0), 1e-11);
    assert!((cfg.mass_balance_tolerance(1e3) - 1e-10).abs() < 1e-20);
}

#[test]
fn pools_deserialize_clamped() {
    let p: NutrientPoolsState =
        serde_json::from_str(r#"{ "structural": 2.0, "storage": -1.0 }"#).unwrap();
    assert_eq!(p.components(), [2.0, 0.0, 0.0]);
}
