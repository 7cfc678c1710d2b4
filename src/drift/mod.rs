// Statistical performance drift monitoring
pub mod guard;
pub mod metrics;

pub use guard::DriftGuard;
pub use metrics::{
    DriftMetrics, DriftReason, DriftSnapshot, DriftStatus, HealthReport, MarketRegime,
    VolatilityRegime,
};
