// Synthetic stress scenarios for the gateway
pub mod runner;
pub mod synthetic;

pub use runner::{StressOptions, StressReport, StressRunner};
pub use synthetic::{StressScenario, SyntheticPriceGenerator};
