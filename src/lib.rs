// Core modules
pub mod alerts;
pub mod breakers;
pub mod clock;
pub mod drift;
pub mod error;
pub mod execution;
pub mod gateway;
pub mod models;
pub mod risk;
pub mod settings;
pub mod simulation;

// Re-export commonly used types
pub use error::GatewayError;
pub use gateway::{SafetyGateway, TradeRequest};
pub use models::*;
pub use settings::GatewayConfig;

// Error handling
pub type Result<T> = std::result::Result<T, GatewayError>;
