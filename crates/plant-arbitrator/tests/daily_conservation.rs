use arbitration_core::{ArbitrationConfig, ArbitrationError, Nutrient, NutrientPoolsState};
use chrono::NaiveDate;
use plant_arbitrator::{
    ConstantDrivers, FixedSoilUptake, LayeredPartitioner, Organ, OrganParams, Plant,
    RemovalFractions, SoilUptake, UptakeDemand,
};

const ORGANS: &str = r#"[
  {
    "name": "leaf",
    "initial_wt": 5.0,
    "carbon_fractions": { "structural": 0.8, "metabolic": 0.2 },
    "nitrogen_concentrations": { "minimum": 0.03, "critical": 0.05, "maximum": 0.08 },
    "carbon": { "reallocation": 0.3, "retranslocation": 0.0 },
    "nitrogen": { "reallocation": 0.6, "retranslocation": 0.1 },
    "harvest": { "live_to_remove": 0.0, "live_to_residue": 0.5 }
  },
  {
    "name": "grain",
    "carbon_fractions": { "structural": 0.2, "storage": 0.8 },
    "nitrogen_concentrations": { "minimum": 0.02, "critical": 0.04, "maximum": 0.04 },
    "carbon": { "priority": { "structural": 2.0, "metabolic": 2.0, "storage": 2.0 } },
    "harvest": { "live_to_remove": 1.0 }
  },
  {
    "name": "root",
    "roles": ["nitrogen_uptake_sink"],
    "initial_wt": 3.0,
    "nitrogen_concentrations": { "minimum": 0.01, "critical": 0.02, "maximum": 0.03 },
    "carbon": { "retranslocation": 0.05 }
  }
]"#;

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 10, 1).unwrap()
}

fn drivers_for(name: &str) -> ConstantDrivers {
    match name {
        "leaf" => ConstantDrivers {
            senescence_rate: 0.03,
            detachment_rate: 0.05,
            respiration_fraction: 0.02,
            carbon_demand: NutrientPoolsState::new(1.5, 0.4, 0.0),
            carbon_fixation: 3.0,
            nitrogen_fixation: 0.0,
        },
        "grain" => ConstantDrivers {
            carbon_demand: NutrientPoolsState::new(0.3, 0.0, 1.2),
            ..Default::default()
        },
        _ => ConstantDrivers {
            senescence_rate: 0.02,
            detachment_rate: 0.3,
            carbon_demand: NutrientPoolsState::new(0.6, 0.1, 0.0),
            ..Default::default()
        },
    }
}

fn build_plant() -> Plant {
    let params: Vec<OrganParams> = serde_json::from_str(ORGANS).unwrap();
    let organs = params
        .into_iter()
        .map(|p| {
            let drivers = drivers_for(&p.name);
            let organ = Organ::new(p, Box::new(drivers));
            if organ.name() == "root" {
                organ.with_partitioner(Box::new(LayeredPartitioner::new(&[0.6, 0.3, 0.1])))
            } else {
                organ
            }
        })
        .collect();
    Plant::new("wheat", organs, ArbitrationConfig::default()).unwrap()
}

/// A soil shared with a crowded neighbour: grants a tenth of what the plant asks for.
struct SharedSoil {
    asked: f64,
}

impl SoilUptake for SharedSoil {
    fn grant(&mut self, _date: NaiveDate, demands: &[UptakeDemand]) -> f64 {
        self.asked = demands.iter().map(|d| d.amount).sum();
        self.asked * 0.1
    }
}

#[test]
fn a_season_closes_every_day_in_balance() {
    let mut plant = build_plant();
    plant.sow(start()).unwrap();
    let mut soil = FixedSoilUptake::new(0.15);

    let mut residue = 0.0;
    let mut harvested = 0.0;
    for d in 1..=60 {
        if d == 45 {
            harvested = plant.harvest().unwrap();
            assert!(harvested > 0.0);
        }
        let date = start() + chrono::Duration::days(d);
        let report = plant.run_day(date, &mut soil).unwrap();
        assert_eq!(report.date, date);
        assert_eq!(report.organs.len(), 3);
        residue += report.organs.iter().map(|o| o.to_residue_wt).sum::<f64>();
        for organ in &report.organs {
            assert!(organ.live_wt >= 0.0 && organ.dead_wt >= 0.0);
            assert!(organ.n_conc.is_finite());
        }
    }

    let grain = plant.organ("grain").unwrap();
    assert!(grain.live().wt() > 0.0, "grain regrows after harvest");
    assert!(residue > 0.0);
    assert!(harvested > 0.0);

    let before = plant.total_wt();
    let shed = plant.end().unwrap();
    let shed_wt: f64 = shed.iter().map(|(_, s)| s.wt()).sum();
    assert!((shed_wt - before).abs() < 1e-9);
}

#[test]
fn a_competing_soil_limits_growth_through_nitrogen() {
    let mut plant = build_plant();
    plant.sow(start()).unwrap();
    let mut soil = SharedSoil { asked: 0.0 };

    let mut limited_days = 0;
    for d in 1..=20 {
        let report = plant
            .run_day(start() + chrono::Duration::days(d), &mut soil)
            .unwrap();
        assert!((report.n_uptake_demand - soil.asked).abs() < 1e-12);
        assert!((report.n_uptake_granted - soil.asked * 0.1).abs() < 1e-12);
        if report.c_unallocated_due_to_n_limitation > 0.0 {
            limited_days += 1;
            assert!(report.unallocated_c >= report.c_unallocated_due_to_n_limitation - 1e-9);
        }
        let t = plant.arbitrator().ledger(Nutrient::Carbon).totals();
        assert!(t.total_demands_allocated <= t.total_demand + 1e-9);
    }
    assert!(limited_days > 0);
}

#[test]
fn a_day_cannot_be_closed_twice() {
    let mut plant = build_plant();
    plant.sow(start()).unwrap();
    let mut soil = FixedSoilUptake::new(0.1);
    plant
        .run_day(start() + chrono::Duration::days(1), &mut soil)
        .unwrap();
    assert!(matches!(
        plant.close_day(),
        Err(ArbitrationError::PhaseSequence { requested: "close-day", .. })
    ));
}

#[test]
fn removal_fractions_apply_once() {
    let mut plant = build_plant();
    plant.sow(start()).unwrap();
    let mut soil = FixedSoilUptake::new(0.1);
    let leaf_wt = plant.organ("leaf").unwrap().wt();

    let removed = plant
        .remove_biomass("leaf", RemovalFractions::new(0.5, 0.0, 0.0, 0.0))
        .unwrap();
    assert!((removed - leaf_wt * 0.5).abs() < 1e-9);

    let first = plant
        .run_day(start() + chrono::Duration::days(1), &mut soil)
        .unwrap();
    let second = plant
        .run_day(start() + chrono::Duration::days(2), &mut soil)
        .unwrap();
    assert!((first.organs[0].removed_wt - removed).abs() < 1e-9);
    assert_eq!(second.organs[0].removed_wt, 0.0);
}

#[test]
fn daily_report_serializes() {
    let mut plant = build_plant();
    plant.sow(start()).unwrap();
    let mut soil = FixedSoilUptake::new(0.1);
    let report = plant
        .run_day(start() + chrono::Duration::days(1), &mut soil)
        .unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["plant"], "wheat");
    assert_eq!(json["date"], "2023-10-02");
    assert_eq!(json["organs"][2]["name"], "root");
}
