//! JSON scenario: one plant, its organs and drivers, a soil, and the
//! management calendar.

use arbitration_core::ArbitrationConfig;
use chrono::{Duration, NaiveDate};
use plant_arbitrator::{
    ConstantDrivers, FixedSoilUptake, LayeredPartitioner, Organ, OrganParams, Plant,
    RemovalFractions,
};
use serde::Deserialize;

fn default_days() -> u32 {
    120
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrganSetup {
    #[serde(flatten)]
    pub params: OrganParams,
    #[serde(default)]
    pub drivers: ConstantDrivers,
    /// Relative weight per soil layer; organs without one are not partitioned.
    #[serde(default)]
    pub layers: Option<Vec<f64>>,
}

impl OrganSetup {
    fn build(&self) -> Organ {
        let organ = Organ::new(self.params.clone(), Box::new(self.drivers.clone()));
        match &self.layers {
            Some(weights) => organ.with_partitioner(Box::new(LayeredPartitioner::new(weights))),
            None => organ,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Remove {
        organ: String,
        #[serde(default)]
        fractions: RemovalFractions,
    },
    Harvest,
    End,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ManagementEvent {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub plant: String,
    /// Sowing date; the first simulated day is the day after.
    pub start: NaiveDate,
    #[serde(default = "default_days")]
    pub days: u32,
    #[serde(default)]
    pub config: ArbitrationConfig,
    pub organs: Vec<OrganSetup>,
    #[serde(default)]
    pub soil: FixedSoilUptake,
    #[serde(default)]
    pub management: Vec<ManagementEvent>,
}

impl Scenario {
    pub fn build_plant(&self) -> Result<Plant, arbitration_core::ArbitrationError> {
        let organs = self.organs.iter().map(OrganSetup::build).collect();
        Plant::new(self.plant.clone(), organs, self.config)
    }

    pub fn date_of(&self, day: u32) -> NaiveDate {
        self.start + Duration::days(i64::from(day))
    }

    /// Events due on `date`, in the order they were written.
    pub fn events_on(&self, date: NaiveDate) -> impl Iterator<Item = &Action> {
        self.management
            .iter()
            .filter(move |e| e.date == date)
            .map(|e| &e.action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHEAT: &str = include_str!("../../../demos/wheat.json");

    #[test]
    fn demo_scenario_parses_and_builds() {
        let scenario: Scenario = serde_json::from_str(WHEAT).unwrap();
        assert_eq!(scenario.plant, "wheat");
        assert!(scenario.organs.iter().any(|o| o.layers.is_some()));
        let plant = scenario.build_plant().unwrap();
        assert_eq!(plant.organs().len(), scenario.organs.len());
    }

    #[test]
    fn management_actions_are_tagged() {
        let events: Vec<ManagementEvent> = serde_json::from_str(
            r#"[
                {"date": "2024-01-10", "action": "remove", "organ": "leaf",
                 "fractions": {"live_to_remove": 0.3, "live_to_residue": 0.2}},
                {"date": "2024-01-20", "action": "harvest"},
                {"date": "2024-01-30", "action": "end"}
            ]"#,
        )
        .unwrap();
        assert_eq!(
            events[0].action,
            Action::Remove {
                organ: "leaf".into(),
                fractions: RemovalFractions::new(0.3, 0.0, 0.2, 0.0),
            }
        );
        assert_eq!(events[1].action, Action::Harvest);
        assert_eq!(events[2].action, Action::End);
    }

    #[test]
    fn scenario_defaults_fill_missing_sections() {
        let scenario: Scenario = serde_json::from_str(
            r#"{"plant": "p", "start": "2024-05-01", "organs": [{"name": "leaf"}]}"#,
        )
        .unwrap();
        assert_eq!(scenario.days, 120);
        assert!(scenario.management.is_empty());
        assert_eq!(scenario.config, ArbitrationConfig::default());
        assert_eq!(
            scenario.date_of(1),
            NaiveDate::from_ymd_opt(2024, 5, 2).unwrap()
        );
    }
}
