use super::breaker::{BreakerConfig, BreakerSnapshot, BreakerState, CircuitBreaker};
use super::specialized::{ApiBreaker, Breaker, LatencyBreaker, RiskBreaker, SemanticDriftBreaker};
use crate::alerts::{Alert, AlertHub};
use crate::clock::SharedClock;
use crate::error::GatewayError;
use crate::models::{BlockReason, OrderResult, Severity, TradeOutcome, TradeSignal};
use crate::settings::BreakerSettings;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;
use thiserror::Error;

pub const API_BREAKER: &str = "api_breaker";
pub const LATENCY_BREAKER: &str = "latency_breaker";
pub const RISK_BREAKER: &str = "risk_breaker";
pub const SEMANTIC_DRIFT_BREAKER: &str = "semantic_drift_breaker";

/// Error from running a call through a named breaker
#[derive(Error, Debug)]
pub enum BreakerCallError {
    #[error("circuit breaker {0} is open")]
    Open(String),

    #[error("unknown circuit breaker: {0}")]
    Unknown(String),

    #[error("call failed: {0}")]
    Failed(#[source] anyhow::Error),
}

/// Serializable view of the whole system
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemStatus {
    pub system_halted: bool,
    pub halt_reason: Option<String>,
    pub breakers: Vec<BreakerStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BreakerStatus {
    #[serde(flatten)]
    pub snapshot: BreakerSnapshot,
    pub check_allowed: bool,
}

struct BreakerSet {
    api: ApiBreaker,
    latency: LatencyBreaker,
    risk: RiskBreaker,
    semantic: SemanticDriftBreaker,
    named: Vec<ApiBreaker>,
    halt_reason: Option<String>,
}

impl BreakerSet {
    /// Registration order: the four standard breakers, then named extras
    fn all(&self) -> Vec<&dyn Breaker> {
        let mut all: Vec<&dyn Breaker> = vec![
            &self.api as &dyn Breaker,
            &self.latency as &dyn Breaker,
            &self.risk as &dyn Breaker,
            &self.semantic as &dyn Breaker,
        ];
        all.extend(self.named.iter().map(|b| b as &dyn Breaker));
        all
    }

    fn all_mut(&mut self) -> Vec<&mut dyn Breaker> {
        let mut all: Vec<&mut dyn Breaker> = vec![
            &mut self.api as &mut dyn Breaker,
            &mut self.latency as &mut dyn Breaker,
            &mut self.risk as &mut dyn Breaker,
            &mut self.semantic as &mut dyn Breaker,
        ];
        all.extend(self.named.iter_mut().map(|b| b as &mut dyn Breaker));
        all
    }

    fn api_named_mut(&mut self, name: &str) -> Option<&mut ApiBreaker> {
        if name == API_BREAKER {
            return Some(&mut self.api);
        }
        self.named.iter_mut().find(|b| b.name() == name)
    }

    fn states(&self) -> Vec<BreakerState> {
        self.all().into_iter().map(|b| b.state()).collect()
    }

    /// Settle the probes a trade took, except on breakers that record their
    /// own outcome
    fn settle_probes(
        &mut self,
        probes: &[String],
        skip: &[&str],
        settle: impl Fn(&mut CircuitBreaker),
    ) {
        for breaker in self.all_mut() {
            let name = breaker.name();
            if skip.iter().any(|s| *s == name) || !probes.iter().any(|p| p == name) {
                continue;
            }
            if breaker.state() == BreakerState::HalfOpen {
                settle(breaker.core_mut());
            }
        }
    }
}

/// Multi-layer breaker set wrapping trade execution
///
/// All breaker state lives behind one mutex that is never held while the
/// execution function runs.
pub struct CircuitBreakerSystem {
    inner: Mutex<BreakerSet>,
    alerts: AlertHub,
    clock: SharedClock,
}

impl CircuitBreakerSystem {
    pub fn new(settings: &BreakerSettings, alerts: AlertHub, clock: SharedClock) -> Result<Self> {
        let api_config = BreakerConfig {
            max_failures: settings.max_failures,
            cooldown_seconds: settings.cooldown_seconds,
            timeout_seconds: settings.max_latency_seconds,
            half_open_max_calls: settings.half_open_max_calls,
        };

        let mut named: Vec<ApiBreaker> = Vec::new();
        for name in &settings.extra_api_breakers {
            if is_reserved(name) || named.iter().any(|b| b.name() == name.as_str()) {
                return Err(GatewayError::invalid(format!(
                    "duplicate circuit breaker name: {}",
                    name
                )));
            }
            named.push(ApiBreaker::new(name.clone(), api_config.clone(), clock.clone())?);
        }

        let set = BreakerSet {
            api: ApiBreaker::new(API_BREAKER, api_config.clone(), clock.clone())?,
            latency: LatencyBreaker::new(
                settings.max_latency_seconds,
                api_config.clone(),
                clock.clone(),
            )?,
            risk: RiskBreaker::new(
                settings.max_drawdown,
                settings.risk_cooldown_seconds,
                clock.clone(),
            )?,
            semantic: SemanticDriftBreaker::new(
                settings.semantic_window,
                settings.semantic_collapse_threshold,
                api_config,
                clock.clone(),
            )?,
            named,
            halt_reason: None,
        };

        Ok(Self {
            inner: Mutex::new(set),
            alerts,
            clock,
        })
    }

    /// Add another named API breaker (e.g. for a database or price oracle)
    pub fn register_api_breaker(&self, name: &str, config: BreakerConfig) -> Result<()> {
        let mut set = self.lock();
        if is_reserved(name) || set.named.iter().any(|b| b.name() == name) {
            return Err(GatewayError::invalid(format!(
                "duplicate circuit breaker name: {}",
                name
            )));
        }
        let breaker = ApiBreaker::new(name, config, self.clock.clone())?;
        set.named.push(breaker);
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, BreakerSet> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `f` under the lock and publish an alert for every breaker it tripped
    fn mutate<T>(&self, f: impl FnOnce(&mut BreakerSet) -> T) -> T {
        let (result, tripped) = {
            let mut set = self.lock();
            let before = set.states();
            let result = f(&mut *set);
            let tripped: Vec<BreakerSnapshot> = set
                .all()
                .into_iter()
                .zip(before)
                .filter(|(b, prev)| {
                    b.state() == BreakerState::Open && *prev != BreakerState::Open
                })
                .map(|(b, _)| b.snapshot())
                .collect();
            (result, tripped)
        };

        for snapshot in tripped {
            let alert = Alert::new(
                snapshot.name.clone(),
                snapshot.state.to_string(),
                Severity::High,
                format!(
                    "Circuit breaker {} tripped after {} failure(s)",
                    snapshot.name, snapshot.failure_count
                ),
                "Trading through this path is suspended until the cooldown elapses",
                self.clock.now(),
            )
            .with_metrics(&snapshot);
            self.alerts.publish(alert);
        }

        result
    }

    fn alert_blocked(&self, source: &str, state: &str, signal: &TradeSignal) {
        tracing::warn!(source, symbol = %signal.symbol, signal_id = %signal.id, "Trade blocked");
        let alert = Alert::new(
            source,
            state,
            Severity::Medium,
            format!("Trade blocked by {}: {} {}", source, signal.side, signal.symbol),
            "No action needed unless blocks persist",
            self.clock.now(),
        )
        .with_metrics(signal);
        self.alerts.publish(alert);
    }

    /// Execute a trade behind every breaker
    ///
    /// 1. Any breaker refusing -> `Blocked`, nothing recorded.
    /// 2. Portfolio value fed to the risk breaker; a fresh trip blocks and
    ///    hands back every half-open slot taken in step 1.
    /// 3. `execution_fn` runs under the latency deadline: timeout ->
    ///    `Blocked`, error -> `Failed`, success -> `Executed`. Every breaker
    ///    probing on this trade closes on success and reopens otherwise.
    pub async fn execute_trade<F, Fut>(
        &self,
        signal: TradeSignal,
        portfolio_value: f64,
        initial_value: f64,
        execution_fn: F,
    ) -> TradeOutcome
    where
        F: FnOnce(TradeSignal) -> Fut,
        Fut: Future<Output = anyhow::Result<OrderResult>>,
    {
        enum Gate {
            Halted(String),
            Blocked(String),
            Proceed {
                deadline: std::time::Duration,
                probes: Vec<String>,
            },
        }

        let gate = self.mutate(|set| {
            if let Some(reason) = &set.halt_reason {
                return Gate::Halted(reason.clone());
            }

            // Probe check first so a half-open slot is only consumed when
            // every other breaker admits the trade too
            if let Some(blocker) = set.all().into_iter().find(|b| !b.core().would_allow()) {
                return Gate::Blocked(blocker.name().to_string());
            }
            let mut refused = None;
            let mut probes = Vec::new();
            for breaker in set.all_mut() {
                if !breaker.can_execute() {
                    refused = Some(breaker.name().to_string());
                    break;
                }
                if breaker.state() == BreakerState::HalfOpen {
                    probes.push(breaker.name().to_string());
                }
            }
            if let Some(name) = refused {
                set.settle_probes(&probes, &[], CircuitBreaker::release_probe);
                return Gate::Blocked(name);
            }

            set.risk.seed(initial_value);
            set.risk.update_portfolio_value(portfolio_value);
            if set.risk.state() == BreakerState::Open {
                set.settle_probes(&probes, &[RISK_BREAKER], CircuitBreaker::release_probe);
                return Gate::Blocked(RISK_BREAKER.to_string());
            }

            Gate::Proceed {
                deadline: set.latency.max_latency(),
                probes,
            }
        });

        let (deadline, probes) = match gate {
            Gate::Halted(reason) => {
                self.alert_blocked("EMERGENCY", "HALTED", &signal);
                return TradeOutcome::blocked(BlockReason::EmergencyHalt(reason));
            }
            Gate::Blocked(name) => {
                self.alert_blocked(&name, &BreakerState::Open.to_string(), &signal);
                return TradeOutcome::blocked(BlockReason::Breaker(name));
            }
            Gate::Proceed { deadline, probes } => (deadline, probes),
        };

        let started = Instant::now();
        let result = tokio::time::timeout(deadline, execution_fn(signal.clone())).await;
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(Ok(order)) => {
                self.mutate(|set| {
                    set.latency.record_latency(elapsed);
                    set.api.record_success();
                    set.settle_probes(
                        &probes,
                        &[API_BREAKER, LATENCY_BREAKER],
                        CircuitBreaker::record_success,
                    );
                });
                tracing::info!(
                    symbol = %signal.symbol,
                    order_id = %order.order_id,
                    latency_secs = elapsed,
                    "Trade executed"
                );
                TradeOutcome::Executed { order }
            }
            Ok(Err(e)) => {
                self.mutate(|set| {
                    set.api.record_failure();
                    set.settle_probes(&probes, &[API_BREAKER], CircuitBreaker::record_failure);
                });
                tracing::error!(symbol = %signal.symbol, "Trade execution error: {:#}", e);
                TradeOutcome::Failed {
                    error: format!("{:#}", e),
                }
            }
            Err(_) => {
                self.mutate(|set| {
                    set.latency.record_timeout();
                    set.settle_probes(&probes, &[LATENCY_BREAKER], CircuitBreaker::record_failure);
                });
                tracing::error!(
                    symbol = %signal.symbol,
                    deadline_secs = deadline.as_secs_f64(),
                    "Trade execution timed out"
                );
                TradeOutcome::blocked(BlockReason::Timeout {
                    after_secs: deadline.as_secs_f64(),
                })
            }
        }
    }

    /// Run any remote call through a named API breaker
    pub async fn call<T, Fut>(&self, name: &str, fut: Fut) -> std::result::Result<T, BreakerCallError>
    where
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let admitted = self.mutate(|set| {
            if set.halt_reason.is_some() {
                return Some(false);
            }
            set.api_named_mut(name).map(|b| b.can_execute())
        });

        match admitted {
            None => return Err(BreakerCallError::Unknown(name.to_string())),
            Some(false) => {
                tracing::debug!(breaker = name, "Call skipped: breaker open");
                return Err(BreakerCallError::Open(name.to_string()));
            }
            Some(true) => {}
        }

        match fut.await {
            Ok(value) => {
                self.mutate(|set| {
                    if let Some(b) = set.api_named_mut(name) {
                        b.record_success();
                    }
                });
                Ok(value)
            }
            Err(e) => {
                self.mutate(|set| {
                    if let Some(b) = set.api_named_mut(name) {
                        b.record_failure();
                    }
                });
                Err(BreakerCallError::Failed(e))
            }
        }
    }

    /// Feed a core/shadow agreement sample to the semantic drift breaker
    pub fn record_dialectic(&self, agreement: bool) -> Option<f64> {
        self.mutate(|set| set.semantic.record_dialectic(agreement))
    }

    /// Force every breaker open; only `clear_emergency_halt` undoes this
    pub fn trigger_emergency_halt(&self, reason: &str) {
        tracing::error!(reason, "EMERGENCY HALT");
        {
            let mut set = self.lock();
            set.halt_reason = Some(reason.to_string());
            for breaker in set.all_mut() {
                breaker.core_mut().force_open(reason);
            }
        }

        let alert = Alert::new(
            "EMERGENCY",
            "HALTED",
            Severity::Critical,
            format!("Emergency halt: {}", reason),
            "Manual intervention required before trading resumes",
            self.clock.now(),
        );
        self.alerts.publish(alert);
    }

    /// Manual reset of every breaker after an emergency halt
    pub fn clear_emergency_halt(&self) {
        let mut set = self.lock();
        if let Some(reason) = set.halt_reason.take() {
            tracing::warn!(previous_reason = %reason, "Emergency halt cleared");
        }
        for breaker in set.all_mut() {
            breaker.core_mut().reset();
        }
    }

    pub fn is_halted(&self) -> bool {
        self.lock().halt_reason.is_some()
    }

    pub fn breaker_state(&self, name: &str) -> Option<BreakerState> {
        self.lock()
            .all()
            .into_iter()
            .find(|b| b.name() == name)
            .map(|b| b.state())
    }

    /// Snapshot of every breaker; causes no state transitions
    pub fn status(&self) -> SystemStatus {
        let set = self.lock();
        SystemStatus {
            system_halted: set.halt_reason.is_some(),
            halt_reason: set.halt_reason.clone(),
            breakers: set
                .all()
                .into_iter()
                .map(|b| BreakerStatus {
                    snapshot: b.snapshot(),
                    check_allowed: b.core().would_allow(),
                })
                .collect(),
        }
    }
}

fn is_reserved(name: &str) -> bool {
    [API_BREAKER, LATENCY_BREAKER, RISK_BREAKER, SEMANTIC_DRIFT_BREAKER].contains(&name)
}
