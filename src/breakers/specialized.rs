use super::breaker::{BreakerConfig, BreakerSnapshot, BreakerState, CircuitBreaker};
use crate::clock::SharedClock;
use crate::error::GatewayError;
use crate::Result;
use std::collections::VecDeque;
use std::time::Duration;

/// Common surface of every breaker kind
pub trait Breaker: Send {
    fn core(&self) -> &CircuitBreaker;
    fn core_mut(&mut self) -> &mut CircuitBreaker;

    fn name(&self) -> &str {
        self.core().name()
    }

    fn state(&self) -> BreakerState {
        self.core().state()
    }

    fn can_execute(&mut self) -> bool {
        self.core_mut().can_execute()
    }

    fn snapshot(&self) -> BreakerSnapshot {
        self.core().snapshot()
    }
}

/// Success/failure recording around remote calls
pub struct ApiBreaker {
    inner: CircuitBreaker,
}

impl ApiBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig, clock: SharedClock) -> Result<Self> {
        Ok(Self {
            inner: CircuitBreaker::new(name, config, clock)?,
        })
    }

    pub fn record_success(&mut self) {
        self.inner.record_success();
    }

    pub fn record_failure(&mut self) {
        self.inner.record_failure();
    }
}

impl Breaker for ApiBreaker {
    fn core(&self) -> &CircuitBreaker {
        &self.inner
    }

    fn core_mut(&mut self) -> &mut CircuitBreaker {
        &mut self.inner
    }
}

/// Trips when execution round-trips are too slow
pub struct LatencyBreaker {
    inner: CircuitBreaker,
    max_latency: Duration,
}

impl LatencyBreaker {
    pub fn new(max_latency_seconds: f64, config: BreakerConfig, clock: SharedClock) -> Result<Self> {
        if !max_latency_seconds.is_finite() || max_latency_seconds <= 0.0 {
            return Err(GatewayError::invalid(format!(
                "max_latency must be positive, got {}",
                max_latency_seconds
            )));
        }
        let config = BreakerConfig {
            timeout_seconds: max_latency_seconds,
            ..config
        };
        Ok(Self {
            inner: CircuitBreaker::new("latency_breaker", config, clock)?,
            max_latency: Duration::from_secs_f64(max_latency_seconds),
        })
    }

    pub fn max_latency(&self) -> Duration {
        self.max_latency
    }

    /// Failure if the call took longer than `max_latency`, success otherwise
    pub fn record_latency(&mut self, seconds: f64) {
        if seconds > self.max_latency.as_secs_f64() {
            tracing::warn!(
                latency_secs = seconds,
                max_secs = self.max_latency.as_secs_f64(),
                "Latency breach"
            );
            self.inner.record_failure();
        } else {
            self.inner.record_success();
        }
    }

    /// Timed-out call
    pub fn record_timeout(&mut self) {
        self.inner.record_failure();
    }
}

impl Breaker for LatencyBreaker {
    fn core(&self) -> &CircuitBreaker {
        &self.inner
    }

    fn core_mut(&mut self) -> &mut CircuitBreaker {
        &mut self.inner
    }
}

/// Trips on the first drawdown from peak beyond `max_drawdown`
pub struct RiskBreaker {
    inner: CircuitBreaker,
    max_drawdown: f64,
    peak_value: Option<f64>,
    last_drawdown: f64,
}

impl RiskBreaker {
    pub fn new(max_drawdown: f64, cooldown_seconds: u64, clock: SharedClock) -> Result<Self> {
        let config = BreakerConfig {
            max_failures: 1,
            cooldown_seconds,
            ..Default::default()
        };
        Ok(Self {
            inner: CircuitBreaker::new("risk_breaker", config, clock)?,
            max_drawdown,
            peak_value: None,
            last_drawdown: 0.0,
        })
    }

    /// Seed the running peak if nothing has been observed yet
    pub fn seed(&mut self, initial_value: f64) {
        if self.peak_value.is_none() && initial_value.is_finite() && initial_value > 0.0 {
            self.peak_value = Some(initial_value);
        }
    }

    /// Feed the current portfolio value; returns the drawdown from peak
    pub fn update_portfolio_value(&mut self, current_value: f64) -> f64 {
        if !current_value.is_finite() {
            tracing::warn!(current_value, "Ignoring non-finite portfolio value");
            return self.last_drawdown;
        }

        let peak = match self.peak_value {
            Some(peak) if peak >= current_value => peak,
            _ => {
                self.peak_value = Some(current_value);
                current_value
            }
        };

        let drawdown = if peak > 0.0 {
            (peak - current_value) / peak
        } else {
            0.0
        };
        self.last_drawdown = drawdown;

        if drawdown > self.max_drawdown {
            tracing::error!(
                drawdown_pct = drawdown * 100.0,
                max_pct = self.max_drawdown * 100.0,
                "Risk breaker: drawdown limit exceeded"
            );
            self.inner.record_failure();
        } else {
            self.inner.record_success();
        }

        drawdown
    }

    pub fn peak_value(&self) -> Option<f64> {
        self.peak_value
    }

    pub fn last_drawdown(&self) -> f64 {
        self.last_drawdown
    }
}

impl Breaker for RiskBreaker {
    fn core(&self) -> &CircuitBreaker {
        &self.inner
    }

    fn core_mut(&mut self) -> &mut CircuitBreaker {
        &mut self.inner
    }
}

/// Detects collapse of two decision sources that should disagree sometimes
///
/// Once the window is full, an agreement rate above the threshold counts
/// as a failure.
pub struct SemanticDriftBreaker {
    inner: CircuitBreaker,
    window: VecDeque<bool>,
    window_size: usize,
    collapse_threshold: f64,
}

impl SemanticDriftBreaker {
    pub fn new(
        window_size: usize,
        collapse_threshold: f64,
        config: BreakerConfig,
        clock: SharedClock,
    ) -> Result<Self> {
        if window_size == 0 {
            return Err(GatewayError::invalid("semantic window must be at least 1"));
        }
        Ok(Self {
            inner: CircuitBreaker::new("semantic_drift_breaker", config, clock)?,
            window: VecDeque::with_capacity(window_size),
            window_size,
            collapse_threshold,
        })
    }

    /// Record whether the two sources agreed; returns the agreement rate once
    /// the window is full
    pub fn record_dialectic(&mut self, agreement: bool) -> Option<f64> {
        self.window.push_back(agreement);
        while self.window.len() > self.window_size {
            self.window.pop_front();
        }

        if self.window.len() < self.window_size {
            return None;
        }

        let rate = self.agreement_rate();
        if rate > self.collapse_threshold {
            tracing::error!(
                agreement_pct = rate * 100.0,
                "Semantic drift: decision sources collapsed"
            );
            self.inner.record_failure();
        } else {
            self.inner.record_success();
        }
        Some(rate)
    }

    pub fn agreement_rate(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.window.iter().filter(|a| **a).count() as f64 / self.window.len() as f64
    }

    pub fn samples(&self) -> usize {
        self.window.len()
    }
}

impl Breaker for SemanticDriftBreaker {
    fn core(&self) -> &CircuitBreaker {
        &self.inner
    }

    fn core_mut(&mut self) -> &mut CircuitBreaker {
        &mut self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    fn clock() -> SharedClock {
        Arc::new(ManualClock::default())
    }

    #[test]
    fn test_latency_breaker_trips_after_slow_calls() {
        let mut breaker = LatencyBreaker::new(15.0, BreakerConfig::default(), clock()).unwrap();

        breaker.record_latency(3.0);
        assert_eq!(breaker.state(), BreakerState::Closed);

        for _ in 0..3 {
            breaker.record_latency(16.0);
        }
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.can_execute());
    }

    #[test]
    fn test_risk_breaker_trips_immediately() {
        let mut breaker = RiskBreaker::new(0.05, 300, clock()).unwrap();
        breaker.seed(10000.0);

        let dd = breaker.update_portfolio_value(9600.0);
        assert!((dd - 0.04).abs() < 1e-9);
        assert_eq!(breaker.state(), BreakerState::Closed);

        breaker.update_portfolio_value(9400.0);
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn test_risk_breaker_tracks_running_peak() {
        let mut breaker = RiskBreaker::new(0.05, 300, clock()).unwrap();
        breaker.seed(10000.0);

        breaker.update_portfolio_value(12000.0);
        assert_eq!(breaker.peak_value(), Some(12000.0));

        // 11000 is above the initial value but 8.3% below the peak
        breaker.update_portfolio_value(11000.0);
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn test_semantic_breaker_waits_for_full_window() {
        let config = BreakerConfig {
            max_failures: 1,
            ..Default::default()
        };
        let mut breaker = SemanticDriftBreaker::new(10, 0.9, config, clock()).unwrap();

        for _ in 0..9 {
            assert_eq!(breaker.record_dialectic(true), None);
        }
        assert_eq!(breaker.state(), BreakerState::Closed);

        assert_eq!(breaker.record_dialectic(true), Some(1.0));
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn test_semantic_breaker_healthy_disagreement() {
        let mut breaker =
            SemanticDriftBreaker::new(10, 0.9, BreakerConfig::default(), clock()).unwrap();

        for i in 0..20 {
            breaker.record_dialectic(i % 3 != 0);
        }

        assert!(breaker.agreement_rate() <= 0.9);
        assert_eq!(breaker.samples(), 10);
        assert_eq!(breaker.state(), BreakerState::Closed);
    }
}
