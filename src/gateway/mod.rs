// Safety gateway: risk -> breakers -> drift in one call
pub mod ledger;

pub use ledger::DailyLedger;

use crate::alerts::{Alert, AlertHub, LogSink};
use crate::breakers::{CircuitBreakerSystem, SystemStatus};
use crate::clock::{system_clock, SharedClock};
use crate::drift::{DriftGuard, DriftSnapshot, DriftStatus, MarketRegime, VolatilityRegime};
use crate::execution::BrokerAdapter;
use crate::models::{BlockReason, PositionView, TradeOutcome, TradeSide, TradeSignal, TradingMode};
use crate::risk::{RiskAssessment, RiskEngine};
use crate::settings::GatewayConfig;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A trade proposed by a strategy, before sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRequest {
    pub symbol: String,
    pub side: TradeSide,
    /// Proposed notional in account currency
    pub size: f64,
    pub account_balance: f64,
    pub portfolio_value: f64,
    /// Portfolio value at session start; drawdown is measured against it
    pub initial_value: f64,
    #[serde(default)]
    pub positions: Vec<PositionView>,
}

impl TradeRequest {
    /// Request with portfolio and initial value equal to the balance
    pub fn new(symbol: impl Into<String>, side: TradeSide, size: f64, account_balance: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            size,
            account_balance,
            portfolio_value: account_balance,
            initial_value: account_balance,
            positions: Vec::new(),
        }
    }

    pub fn with_portfolio(mut self, portfolio_value: f64, initial_value: f64) -> Self {
        self.portfolio_value = portfolio_value;
        self.initial_value = initial_value;
        self
    }

    pub fn with_positions(mut self, positions: Vec<PositionView>) -> Self {
        self.positions = positions;
        self
    }

    /// Signed move from the initial value: positive for a loss, negative
    /// for a gain
    pub fn drawdown(&self) -> f64 {
        if self.initial_value <= 0.0 || !self.initial_value.is_finite() {
            return 0.0;
        }
        (self.initial_value - self.portfolio_value) / self.initial_value
    }
}

/// Serializable view of the whole gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayStatus {
    pub trading_mode: TradingMode,
    pub trading_allowed: bool,
    pub drift: DriftSnapshot,
    pub breakers: SystemStatus,
    pub daily: DailyLedger,
    pub recent_alerts: Vec<Alert>,
}

/// Single entry point for every trade
///
/// Owns one risk engine, one breaker system and one drift guard. All
/// methods take `&self`, so the gateway can be shared behind an `Arc`.
pub struct SafetyGateway {
    config: GatewayConfig,
    risk: RwLock<RiskEngine>,
    breakers: CircuitBreakerSystem,
    drift: RwLock<DriftGuard>,
    ledger: Mutex<DailyLedger>,
    alerts: AlertHub,
    broker: Arc<dyn BrokerAdapter>,
    clock: SharedClock,
}

impl SafetyGateway {
    pub fn new(config: GatewayConfig, broker: Arc<dyn BrokerAdapter>) -> Result<Self> {
        Self::with_clock(config, broker, system_clock())
    }

    /// Build a gateway reading time from `clock`
    ///
    /// Fails only on invalid configuration.
    pub fn with_clock(
        config: GatewayConfig,
        broker: Arc<dyn BrokerAdapter>,
        clock: SharedClock,
    ) -> Result<Self> {
        config.validate()?;

        let alerts = AlertHub::new(config.alerts.history_size);
        alerts.register(Arc::new(LogSink));

        let risk = RiskEngine::with_clock(config.risk.clone(), clock.clone());
        let breakers = CircuitBreakerSystem::new(&config.breakers, alerts.clone(), clock.clone())?;
        let drift =
            DriftGuard::with_clock(config.drift.clone(), clock.clone()).with_alert_hub(alerts.clone());
        let ledger = DailyLedger::new(clock.now());

        tracing::info!(
            mode = %config.trading_mode,
            broker = broker.name(),
            "Safety gateway initialized"
        );

        Ok(Self {
            config,
            risk: RwLock::new(risk),
            breakers,
            drift: RwLock::new(drift),
            ledger: Mutex::new(ledger),
            alerts,
            broker,
            clock,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn trading_mode(&self) -> TradingMode {
        self.config.trading_mode
    }

    pub fn alerts(&self) -> &AlertHub {
        &self.alerts
    }

    pub fn breakers(&self) -> &CircuitBreakerSystem {
        &self.breakers
    }

    fn risk_read(&self) -> RwLockReadGuard<'_, RiskEngine> {
        self.risk.read().unwrap_or_else(|e| e.into_inner())
    }

    fn risk_write(&self) -> RwLockWriteGuard<'_, RiskEngine> {
        self.risk.write().unwrap_or_else(|e| e.into_inner())
    }

    fn drift_read(&self) -> RwLockReadGuard<'_, DriftGuard> {
        self.drift.read().unwrap_or_else(|e| e.into_inner())
    }

    fn drift_write(&self) -> RwLockWriteGuard<'_, DriftGuard> {
        self.drift.write().unwrap_or_else(|e| e.into_inner())
    }

    fn ledger(&self) -> MutexGuard<'_, DailyLedger> {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run a trade through every safety layer and, if admitted, the broker
    ///
    /// Order: drift guard, daily loss, emergency drawdown, risk sizing,
    /// then the breaker-wrapped broker call.
    pub async fn submit_trade(&self, request: TradeRequest) -> TradeOutcome {
        if let Some(reason) = self.pre_trade_block(&request) {
            tracing::info!(
                symbol = %request.symbol,
                side = %request.side,
                "Trade blocked: {}",
                reason
            );
            return TradeOutcome::blocked(reason);
        }

        let assessment = self.evaluate(&request);
        if !assessment.approved {
            tracing::info!(symbol = %request.symbol, reason = %assessment.reason, "Risk engine rejected trade");
            return TradeOutcome::blocked(BlockReason::Risk(assessment.reason));
        }
        if assessment.adjusted_size < request.size {
            tracing::debug!(
                symbol = %request.symbol,
                proposed = request.size,
                adjusted = assessment.adjusted_size,
                reason = %assessment.reason,
                "Trade resized"
            );
        }

        let signal = TradeSignal::new(request.symbol.clone(), request.side, assessment.adjusted_size);
        let broker = Arc::clone(&self.broker);
        let outcome = self
            .breakers
            .execute_trade(
                signal,
                request.portfolio_value,
                request.initial_value,
                move |signal| async move { broker.place_order(signal).await },
            )
            .await;

        if outcome.is_executed() {
            self.ledger().record_trade(self.clock.now());
        }
        outcome
    }

    fn pre_trade_block(&self, request: &TradeRequest) -> Option<BlockReason> {
        let mode = self.config.trading_mode;
        {
            let drift = self.drift_read();
            if !drift.is_trading_allowed(mode) {
                return Some(BlockReason::DriftPaused(drift.status().to_string()));
            }
        }

        let daily_pnl = self.ledger().daily_pnl(self.clock.now());
        let risk = self.risk_read();
        if risk.daily_loss_breached(daily_pnl, request.account_balance) {
            return Some(BlockReason::DailyLossLimit {
                daily_pnl,
                limit: risk.config().max_daily_loss * request.account_balance,
            });
        }

        let drawdown = request.drawdown();
        if risk.emergency_check(drawdown) {
            return Some(BlockReason::EmergencyDrawdown { drawdown });
        }

        None
    }

    /// Risk sizing only, without executing
    pub fn evaluate(&self, request: &TradeRequest) -> RiskAssessment {
        self.risk_read().evaluate_trade(
            &request.symbol,
            request.size,
            request.side,
            request.account_balance,
            &request.positions,
        )
    }

    /// Feed a closed trade's result to the drift guard and the daily ledger
    ///
    /// # Arguments
    /// * `is_success` - Whether the trade was a win
    /// * `pnl` - Realized PnL in account currency
    pub fn record_outcome(&self, is_success: bool, pnl: f64) -> DriftStatus {
        self.ledger().record_pnl(pnl, self.clock.now());
        self.drift_write().record_outcome(is_success, pnl)
    }

    /// Same as `record_outcome`, first moving the drift guard to the regime
    /// the trade closed in
    pub fn record_outcome_with_regime(
        &self,
        is_success: bool,
        pnl: f64,
        market_regime: MarketRegime,
        volatility_regime: VolatilityRegime,
    ) -> DriftStatus {
        self.ledger().record_pnl(pnl, self.clock.now());
        self.drift_write()
            .record_outcome_with_regime(is_success, pnl, market_regime, volatility_regime)
    }

    /// Externally detected regime; a HIGH volatility regime tightens the
    /// drift guard's accuracy check
    pub fn update_regime(&self, market_regime: MarketRegime, volatility_regime: VolatilityRegime) {
        self.drift_write().update_regime(market_regime, volatility_regime);
    }

    pub fn update_price(&self, symbol: &str, price: f64) {
        self.risk_write().update_price(symbol, price);
    }

    /// Core/shadow decision agreement for the semantic drift breaker
    pub fn record_dialectic(&self, agreement: bool) -> Option<f64> {
        self.breakers.record_dialectic(agreement)
    }

    pub fn trigger_emergency_halt(&self, reason: &str) {
        self.breakers.trigger_emergency_halt(reason);
    }

    pub fn clear_emergency_halt(&self) {
        self.breakers.clear_emergency_halt();
    }

    pub fn acknowledge_drift(&self) {
        self.drift_write().acknowledge_alert();
    }

    pub fn reset_baseline(&self, new_baseline: f64) -> DriftStatus {
        self.drift_write().reset_baseline(new_baseline)
    }

    pub fn force_pause(&self, reason: &str) {
        self.drift_write().force_pause(reason);
    }

    pub fn drift_status(&self) -> DriftStatus {
        self.drift_read().status()
    }

    /// True when the current drawdown alone would block new trades
    pub fn emergency_check(&self, drawdown: f64) -> bool {
        self.risk_read().emergency_check(drawdown)
    }

    pub fn status(&self) -> GatewayStatus {
        let drift = self.drift_read().snapshot();
        let breakers = self.breakers.status();
        let trading_allowed = drift.live_trading_allowed || !self.config.trading_mode.is_live();

        GatewayStatus {
            trading_mode: self.config.trading_mode,
            trading_allowed: trading_allowed && !breakers.system_halted,
            drift,
            breakers,
            daily: self.ledger().clone(),
            recent_alerts: self.alerts.recent(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::execution::PaperBroker;

    fn gateway(mode: TradingMode) -> (SafetyGateway, Arc<PaperBroker>, ManualClock) {
        let config = GatewayConfig {
            trading_mode: mode,
            ..Default::default()
        };
        let broker = Arc::new(PaperBroker::new());
        broker.set_price("SOL", 100.0);
        let clock = ManualClock::default();
        let gateway = SafetyGateway::with_clock(config, broker.clone(), Arc::new(clock.clone()))
            .unwrap();
        (gateway, broker, clock)
    }

    #[tokio::test]
    async fn test_trade_executes_through_all_layers() {
        let (gateway, broker, _) = gateway(TradingMode::Paper);

        let outcome = gateway
            .submit_trade(TradeRequest::new("SOL", TradeSide::Buy, 500.0, 10000.0))
            .await;

        assert!(outcome.is_executed());
        assert_eq!(broker.orders_filled(), 1);
        assert_eq!(gateway.status().daily.trades, 1);
    }

    #[tokio::test]
    async fn test_oversized_trade_is_clipped() {
        let (gateway, _, _) = gateway(TradingMode::Paper);

        let request = TradeRequest::new("SOL", TradeSide::Buy, 2000.0, 10000.0);
        let outcome = gateway.submit_trade(request).await;

        match outcome {
            TradeOutcome::Executed { order } => assert!((order.filled_size - 1000.0).abs() < 1e-9),
            other => panic!("expected execution, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_drift_blocks_live_but_not_paper() {
        let (live, _, _) = gateway(TradingMode::Live);
        let (paper, _, _) = gateway(TradingMode::Paper);

        for _ in 0..5 {
            live.record_outcome(false, -1.0);
            paper.record_outcome(false, -1.0);
        }

        let outcome = live
            .submit_trade(TradeRequest::new("SOL", TradeSide::Buy, 100.0, 10000.0))
            .await;
        assert_eq!(
            outcome,
            TradeOutcome::blocked(BlockReason::DriftPaused("drift_detected".to_string()))
        );

        let outcome = paper
            .submit_trade(TradeRequest::new("SOL", TradeSide::Buy, 100.0, 10000.0))
            .await;
        assert!(outcome.is_executed());
    }

    #[tokio::test]
    async fn test_daily_loss_limit_blocks() {
        let (gateway, _, _) = gateway(TradingMode::Paper);
        gateway.record_outcome(false, -300.0);
        gateway.record_outcome(false, -250.0);

        let outcome = gateway
            .submit_trade(TradeRequest::new("SOL", TradeSide::Buy, 100.0, 10000.0))
            .await;

        assert!(matches!(
            outcome,
            TradeOutcome::Blocked {
                reason: BlockReason::DailyLossLimit { .. }
            }
        ));
    }

    #[tokio::test]
    async fn test_emergency_drawdown_blocks() {
        let (gateway, broker, _) = gateway(TradingMode::Paper);

        let request =
            TradeRequest::new("SOL", TradeSide::Buy, 100.0, 9500.0).with_portfolio(9500.0, 10000.0);
        let outcome = gateway.submit_trade(request).await;

        assert!(matches!(
            outcome,
            TradeOutcome::Blocked {
                reason: BlockReason::EmergencyDrawdown { .. }
            }
        ));
        assert_eq!(broker.orders_filled(), 0);
    }

    #[tokio::test]
    async fn test_emergency_check_is_symmetric_through_gateway() {
        let (gateway, broker, _) = gateway(TradingMode::Paper);

        let request = TradeRequest::new("SOL", TradeSide::Buy, 100.0, 10500.0)
            .with_portfolio(10500.0, 10000.0);
        assert!(request.drawdown() < 0.0);

        let outcome = gateway.submit_trade(request).await;
        match outcome {
            TradeOutcome::Blocked {
                reason: BlockReason::EmergencyDrawdown { drawdown },
            } => assert!((drawdown + 0.05).abs() < 1e-9),
            other => panic!("expected emergency block, got {:?}", other),
        }
        assert_eq!(broker.orders_filled(), 0);

        let request = TradeRequest::new("SOL", TradeSide::Buy, 100.0, 10400.0)
            .with_portfolio(10400.0, 10000.0);
        assert!(gateway.submit_trade(request).await.is_executed());
    }

    #[tokio::test]
    async fn test_high_volatility_regime_tightens_drift_check() {
        let (calm, _, _) = gateway(TradingMode::Live);
        let (volatile, _, _) = gateway(TradingMode::Live);
        volatile.update_regime(MarketRegime::HighVolatility, VolatilityRegime::High);

        // 40% accuracy, deviation 0.20, longest losing streak 2
        let pattern = [true, false, false, true, false, false, true, false, true, false];
        for outcome in pattern {
            calm.record_outcome(outcome, 0.0);
            volatile.record_outcome(outcome, 0.0);
        }

        assert_eq!(calm.drift_status(), DriftStatus::Warning);
        assert_eq!(volatile.drift_status(), DriftStatus::DriftDetected);
        assert_eq!(
            volatile.status().drift.health.metrics.volatility_regime,
            VolatilityRegime::High
        );

        let outcome = volatile
            .submit_trade(TradeRequest::new("SOL", TradeSide::Buy, 100.0, 10000.0))
            .await;
        assert!(matches!(
            outcome,
            TradeOutcome::Blocked {
                reason: BlockReason::DriftPaused(_)
            }
        ));
    }

    #[test]
    fn test_outcome_with_regime_updates_guard_and_ledger() {
        let (gateway, _, _) = gateway(TradingMode::Paper);

        gateway.record_outcome_with_regime(
            false,
            -40.0,
            MarketRegime::TrendingDown,
            VolatilityRegime::High,
        );

        let status = gateway.status();
        assert_eq!(status.drift.health.metrics.market_regime, MarketRegime::TrendingDown);
        assert_eq!(status.drift.health.metrics.volatility_regime, VolatilityRegime::High);
        assert_eq!(status.daily.realized_pnl, -40.0);
    }

    #[tokio::test]
    async fn test_full_exposure_rejected_by_risk() {
        let (gateway, _, _) = gateway(TradingMode::Paper);
        let request = TradeRequest::new("SOL", TradeSide::Buy, 100.0, 10000.0)
            .with_positions(vec![PositionView::new("BTC", TradeSide::Buy, 1000.0)]);

        let outcome = gateway.submit_trade(request).await;

        assert!(matches!(
            outcome,
            TradeOutcome::Blocked {
                reason: BlockReason::Risk(_)
            }
        ));
    }

    #[test]
    fn test_status_serializes() {
        let (gateway, _, _) = gateway(TradingMode::Live);
        gateway.force_pause("maintenance");

        let status = gateway.status();
        assert!(!status.trading_allowed);
        assert_eq!(status.drift.status, DriftStatus::Paused);
        assert!(serde_json::to_string(&status).is_ok());
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let mut config = GatewayConfig::default();
        config.risk.max_portfolio_risk = 1.5;

        let result = SafetyGateway::new(config, Arc::new(PaperBroker::new()));
        assert!(result.is_err());
    }
}
