// Circuit breaker layers
pub mod breaker;
pub mod specialized;
pub mod system;

pub use breaker::{
    BreakerConfig, BreakerSnapshot, BreakerState, CircuitBreaker, MAX_COOLDOWN_SECONDS,
};
pub use specialized::{ApiBreaker, Breaker, LatencyBreaker, RiskBreaker, SemanticDriftBreaker};
pub use system::{BreakerCallError, BreakerStatus, CircuitBreakerSystem, SystemStatus};
