// Order execution adapters
pub mod broker;

pub use broker::{BrokerAdapter, PaperBroker};
