use crate::clock::SharedClock;
use crate::error::GatewayError;
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest cooldown accepted: ten years
pub const MAX_COOLDOWN_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "CLOSED"),
            BreakerState::Open => write!(f, "OPEN"),
            BreakerState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Static per-breaker thresholds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BreakerConfig {
    pub max_failures: u32,
    pub cooldown_seconds: u64,
    pub timeout_seconds: f64,
    pub half_open_max_calls: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 3,
            cooldown_seconds: 300, // 5 minutes
            timeout_seconds: 15.0,
            half_open_max_calls: 1,
        }
    }
}

impl BreakerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_failures == 0 {
            return Err(GatewayError::invalid("breaker max_failures must be at least 1"));
        }
        if self.half_open_max_calls == 0 {
            return Err(GatewayError::invalid(
                "breaker half_open_max_calls must be at least 1",
            ));
        }
        if self.cooldown_seconds > MAX_COOLDOWN_SECONDS {
            return Err(GatewayError::invalid(format!(
                "breaker cooldown_seconds must be at most {}, got {}",
                MAX_COOLDOWN_SECONDS, self.cooldown_seconds
            )));
        }
        if !self.timeout_seconds.is_finite() || self.timeout_seconds < 0.0 {
            return Err(GatewayError::invalid(format!(
                "breaker timeout_seconds must be non-negative, got {}",
                self.timeout_seconds
            )));
        }
        Ok(())
    }
}

/// Point-in-time view of one breaker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: BreakerState,
    pub failure_count: u32,
    pub half_open_calls: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub halted: bool,
}

/// CLOSED / OPEN / HALF_OPEN state machine
///
/// - CLOSED: every call allowed; a success clears the failure count, so
///   only consecutive failures trip.
/// - OPEN: blocked until `cooldown_seconds` after the last failure, then
///   moves to HALF_OPEN on the next `can_execute`.
/// - HALF_OPEN: up to `half_open_max_calls` probes; one success closes,
///   one failure reopens and restarts the cooldown.
///
/// A halted breaker (emergency) stays OPEN until `reset`.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    state: BreakerState,
    failure_count: u32,
    last_failure_time: Option<DateTime<Utc>>,
    half_open_calls: u32,
    halted: bool,
    clock: SharedClock,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig, clock: SharedClock) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            name: name.into(),
            config,
            state: BreakerState::Closed,
            failure_count: 0,
            last_failure_time: None,
            half_open_calls: 0,
            halted: false,
            clock,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Whether a call may proceed now
    ///
    /// Moves OPEN to HALF_OPEN once the cooldown has elapsed and counts the
    /// admitted probe.
    pub fn can_execute(&mut self) -> bool {
        match self.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                if self.halted || !self.cooldown_elapsed() {
                    return false;
                }
                self.transition_to_half_open();
                self.half_open_calls += 1;
                true
            }
            BreakerState::HalfOpen => {
                if self.half_open_calls < self.config.half_open_max_calls {
                    self.half_open_calls += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Read-only variant of `can_execute` (no transition, no probe consumed)
    pub fn would_allow(&self) -> bool {
        match self.state {
            BreakerState::Closed => true,
            BreakerState::Open => !self.halted && self.cooldown_elapsed(),
            BreakerState::HalfOpen => self.half_open_calls < self.config.half_open_max_calls,
        }
    }

    pub fn record_success(&mut self) {
        match self.state {
            BreakerState::HalfOpen => self.transition_to_closed(),
            BreakerState::Closed => self.failure_count = 0,
            BreakerState::Open => {}
        }
    }

    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        self.last_failure_time = Some(self.clock.now());

        match self.state {
            BreakerState::HalfOpen => self.transition_to_open(),
            BreakerState::Closed if self.failure_count >= self.config.max_failures => {
                self.transition_to_open()
            }
            _ => {}
        }
    }

    /// Give back a half-open slot taken by a call that never ran
    pub fn release_probe(&mut self) {
        if self.state == BreakerState::HalfOpen {
            self.half_open_calls = self.half_open_calls.saturating_sub(1);
        }
    }

    /// Emergency trip with no automatic recovery
    pub fn force_open(&mut self, reason: &str) {
        self.halted = true;
        self.last_failure_time = Some(self.clock.now());
        if self.state != BreakerState::Open {
            tracing::error!(breaker = %self.name, reason, "Circuit breaker FORCED -> OPEN");
        }
        self.state = BreakerState::Open;
    }

    /// Manual return to CLOSED, clearing counters and any halt
    pub fn reset(&mut self) {
        self.halted = false;
        self.last_failure_time = None;
        self.transition_to_closed();
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            name: self.name.clone(),
            state: self.state,
            failure_count: self.failure_count,
            half_open_calls: self.half_open_calls,
            last_failure_time: self.last_failure_time,
            halted: self.halted,
        }
    }

    fn cooldown_elapsed(&self) -> bool {
        match self.last_failure_time {
            None => true,
            Some(last) => {
                let cooldown = i64::try_from(self.config.cooldown_seconds)
                    .ok()
                    .and_then(Duration::try_seconds)
                    .unwrap_or(Duration::MAX);
                self.clock.now() - last >= cooldown
            }
        }
    }

    fn transition_to_open(&mut self) {
        tracing::warn!(
            breaker = %self.name,
            failures = self.failure_count,
            "Circuit breaker TRIPPED -> OPEN"
        );
        self.state = BreakerState::Open;
        self.half_open_calls = 0;
        self.last_failure_time = Some(self.clock.now());
    }

    fn transition_to_half_open(&mut self) {
        tracing::info!(breaker = %self.name, "Circuit breaker -> HALF_OPEN (probing)");
        self.state = BreakerState::HalfOpen;
        self.half_open_calls = 0;
    }

    fn transition_to_closed(&mut self) {
        if self.state != BreakerState::Closed {
            tracing::info!(breaker = %self.name, "Circuit breaker -> CLOSED (recovered)");
        }
        self.state = BreakerState::Closed;
        self.failure_count = 0;
        self.half_open_calls = 0;
    }
}
