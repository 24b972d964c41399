mod arbitrator;
mod drivers;
mod organ;
mod params;
mod plant;
mod removal;

pub use arbitrator::{
    ArbitrationOutputs, BiomassArbitrator, OrganAllocation, PoolPair, WIND_BACK_ORDER,
};
pub use drivers::{
    ConstantDrivers, DailyFlows, FixedSoilUptake, LayerState, LayeredPartitioner,
    OrganDrivers, PartitionedTotals, SoilUptake, UptakeDemand, ZonePartitioner,
};
pub use organ::{DailyRates, Organ};
pub use params::{NitrogenConcentrations, NutrientFactors, OrganParams, OrganRole};
pub use plant::{DailyReport, OrganReport, Phase, Plant};
pub use removal::{RemovalFractions, RemovedBiomass};
