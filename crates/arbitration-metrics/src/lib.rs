use plant_arbitrator::DailyReport;
use prometheus::{register_gauge_vec_with_registry, GaugeVec, Registry};

/// Gauges for the outputs other models read from the arbitrator each day.
pub struct ArbitrationMetrics {
    pub unallocated_c: GaugeVec,
    pub unallocated_n: GaugeVec,
    pub fn_ratio: GaugeVec,
    pub fdm: GaugeVec,
    pub n_limited_carbon: GaugeVec,
    pub n_uptake_demand: GaugeVec,
    pub n_uptake_allocated: GaugeVec,
    pub organ_live_wt: GaugeVec,
    pub organ_dead_wt: GaugeVec,
    pub organ_n_conc: GaugeVec,
    pub organ_to_residue_wt: GaugeVec,
}

impl ArbitrationMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let unallocated_c = register_gauge_vec_with_registry!(
            "plant_unallocated_carbon",
            "Carbon supply left unallocated at close of day (g/m2)",
            &["plant"],
            registry
        )?;
        let unallocated_n = register_gauge_vec_with_registry!(
            "plant_unallocated_nitrogen",
            "Nitrogen supply left unallocated at close of day (g/m2)",
            &["plant"],
            registry
        )?;
        let fn_ratio = register_gauge_vec_with_registry!(
            "plant_nitrogen_supply_ratio",
            "Nitrogen supply over demand, capped at 1",
            &["plant"],
            registry
        )?;
        let fdm = register_gauge_vec_with_registry!(
            "plant_carbon_supply_ratio",
            "Carbon supply over demand, capped at 1",
            &["plant"],
            registry
        )?;
        let n_limited_carbon = register_gauge_vec_with_registry!(
            "plant_carbon_unallocated_due_to_nitrogen",
            "Carbon allocation withdrawn because nitrogen could not support it (g/m2)",
            &["plant"],
            registry
        )?;
        let n_uptake_demand = register_gauge_vec_with_registry!(
            "plant_nitrogen_uptake_demand",
            "Nitrogen the plant asked of the soil (g/m2)",
            &["plant"],
            registry
        )?;
        let n_uptake_allocated = register_gauge_vec_with_registry!(
            "plant_nitrogen_uptake_allocated",
            "Granted soil nitrogen actually allocated to organs (g/m2)",
            &["plant"],
            registry
        )?;
        let organ_live_wt = register_gauge_vec_with_registry!(
            "organ_live_weight",
            "Live dry weight per organ (g/m2)",
            &["plant", "organ"],
            registry
        )?;
        let organ_dead_wt = register_gauge_vec_with_registry!(
            "organ_dead_weight",
            "Dead dry weight per organ (g/m2)",
            &["plant", "organ"],
            registry
        )?;
        let organ_n_conc = register_gauge_vec_with_registry!(
            "organ_nitrogen_concentration",
            "Nitrogen per unit dry weight, live plus dead",
            &["plant", "organ"],
            registry
        )?;
        let organ_to_residue_wt = register_gauge_vec_with_registry!(
            "organ_to_residue_weight",
            "Dry weight sent to surface residue today (g/m2)",
            &["plant", "organ"],
            registry
        )?;

        Ok(Self {
            unallocated_c,
            unallocated_n,
            fn_ratio,
            fdm,
            n_limited_carbon,
            n_uptake_demand,
            n_uptake_allocated,
            organ_live_wt,
            organ_dead_wt,
            organ_n_conc,
            organ_to_residue_wt,
        })
    }

    pub fn observe(&self, plant: &str, report: &DailyReport) {
        self.unallocated_c
            .with_label_values(&[plant])
            .set(report.unallocated_c);
        self.unallocated_n
            .with_label_values(&[plant])
            .set(report.unallocated_n);
        self.fn_ratio.with_label_values(&[plant]).set(report.fn_ratio);
        self.fdm.with_label_values(&[plant]).set(report.fdm);
        self.n_limited_carbon
            .with_label_values(&[plant])
            .set(report.c_unallocated_due_to_n_limitation);
        self.n_uptake_demand
            .with_label_values(&[plant])
            .set(report.n_uptake_demand);
        self.n_uptake_allocated
            .with_label_values(&[plant])
            .set(report.n_uptake_allocated);

        for organ in &report.organs {
            let labels = [plant, organ.name.as_str()];
            self.organ_live_wt.with_label_values(&labels).set(organ.live_wt);
            self.organ_dead_wt.with_label_values(&labels).set(organ.dead_wt);
            self.organ_n_conc.with_label_values(&labels).set(organ.n_conc);
            self.organ_to_residue_wt
                .with_label_values(&labels)
                .set(organ.to_residue_wt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use plant_arbitrator::OrganReport;

    fn dummy_report() -> DailyReport {
        DailyReport {
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            plant: "wheat".into(),
            unallocated_c: 1.25,
            unallocated_n: 0.0,
            fn_ratio: 0.8,
            fdm: 1.0,
            c_unallocated_due_to_n_limitation: 0.5,
            n_uptake_demand: 0.2,
            n_uptake_granted: 0.1,
            n_uptake_allocated: 0.1,
            delta_wt: 3.0,
            total_wt: 120.0,
            organs: vec![OrganReport {
                name: "leaf".into(),
                live_wt: 40.0,
                dead_wt: 2.0,
                wt: 42.0,
                live_c: 16.0,
                live_n: 0.9,
                n: 0.92,
                n_conc: 0.92 / 42.0,
                fn_ratio: 0.9,
                fn_metabolic: 0.7,
                allocated_wt: 3.0,
                senesced_wt: 0.5,
                detached_wt: 0.1,
                removed_wt: 0.0,
                to_residue_wt: 0.1,
                to_residue_n: 0.001,
            }],
        }
    }

    #[test]
    fn observe_sets_plant_and_organ_gauges() {
        let registry = Registry::new();
        let metrics = ArbitrationMetrics::new(&registry).unwrap();
        metrics.observe("wheat", &dummy_report());

        assert_eq!(metrics.unallocated_c.with_label_values(&["wheat"]).get(), 1.25);
        assert_eq!(metrics.n_limited_carbon.with_label_values(&["wheat"]).get(), 0.5);
        assert_eq!(
            metrics.organ_live_wt.with_label_values(&["wheat", "leaf"]).get(),
            40.0
        );
        let families = registry.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "organ_nitrogen_concentration"));
    }

    #[test]
    fn registering_twice_on_one_registry_fails() {
        let registry = Registry::new();
        let _first = ArbitrationMetrics::new(&registry).unwrap();
        assert!(ArbitrationMetrics::new(&registry).is_err());
    }
}
