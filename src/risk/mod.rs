// Pre-trade risk management
pub mod correlation;
pub mod engine;
pub mod price_history;

pub use engine::{RiskAssessment, RiskEngine};
pub use price_history::PriceHistory;
