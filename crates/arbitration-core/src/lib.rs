pub mod allocation;
pub mod config;
pub mod error;
pub mod ledger;
pub mod nutrient;
pub mod pools;

pub use allocation::*;
pub use config::*;
pub use error::*;
pub use ledger::*;
pub use nutrient::*;
pub use pools::*;

#[cfg(test)]
mod tests;
