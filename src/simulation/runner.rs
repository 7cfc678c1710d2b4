use super::synthetic::{StressScenario, SyntheticPriceGenerator};
use crate::clock::ManualClock;
use crate::drift::DriftStatus;
use crate::execution::PaperBroker;
use crate::gateway::{SafetyGateway, TradeRequest};
use crate::models::{TradeOutcome, TradeSide};
use crate::settings::GatewayConfig;
use crate::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Knobs for a stress run
#[derive(Debug, Clone)]
pub struct StressOptions {
    pub symbol: String,
    pub ticks: usize,
    /// Submit a trade every N ticks
    pub trade_every: usize,
    pub base_price: f64,
    pub initial_balance: f64,
    /// Fraction of balance proposed per trade
    pub trade_fraction: f64,
    /// Probability that core and shadow decisions agree
    pub agreement_rate: f64,
}

impl Default for StressOptions {
    fn default() -> Self {
        Self {
            symbol: "BTCUSD".to_string(),
            ticks: 500,
            trade_every: 10,
            base_price: 10000.0,
            initial_balance: 10000.0,
            trade_fraction: 0.10, // try 10% size
            agreement_rate: 0.7,
        }
    }
}

/// What happened during one scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressReport {
    pub scenario: StressScenario,
    pub ticks_run: usize,
    pub trades_submitted: usize,
    pub executed: usize,
    pub blocked: usize,
    pub failed: usize,
    pub blocked_by: BTreeMap<String, usize>,
    pub start_price: f64,
    pub final_price: f64,
    pub initial_balance: f64,
    pub final_balance: f64,
    pub max_drawdown: f64,
    pub halted: bool,
    pub drift_status: DriftStatus,
    pub alerts_raised: usize,
}

struct OpenTrade {
    side: TradeSide,
    notional: f64,
    entry_price: f64,
}

impl OpenTrade {
    fn pnl_at(&self, price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        self.notional * (price / self.entry_price - 1.0) * self.side.sign()
    }
}

/// Drives a paper-trading gateway through a synthetic scenario
///
/// Every run builds a fresh gateway with a manual clock advanced one second
/// per tick, so results depend only on the seed.
pub struct StressRunner {
    config: GatewayConfig,
    seed: u64,
    options: StressOptions,
}

impl StressRunner {
    pub fn new(config: GatewayConfig, seed: u64) -> Self {
        Self {
            config,
            seed,
            options: StressOptions::default(),
        }
    }

    pub fn with_options(mut self, options: StressOptions) -> Self {
        self.options = options;
        self
    }

    pub async fn run(&self, scenario: StressScenario) -> Result<StressReport> {
        let opts = &self.options;
        let broker = Arc::new(PaperBroker::new());
        let clock = ManualClock::default();
        let gateway =
            SafetyGateway::with_clock(self.config.clone(), broker.clone(), Arc::new(clock.clone()))?;

        let prices = SyntheticPriceGenerator::new(self.seed, opts.base_price)
            .generate(scenario, opts.ticks);
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(1));

        tracing::info!(
            %scenario,
            ticks = opts.ticks,
            target_pct = scenario.target_change() * 100.0,
            "Stress scenario started"
        );

        let mut report = StressReport {
            scenario,
            ticks_run: 0,
            trades_submitted: 0,
            executed: 0,
            blocked: 0,
            failed: 0,
            blocked_by: BTreeMap::new(),
            start_price: opts.base_price,
            final_price: opts.base_price,
            initial_balance: opts.initial_balance,
            final_balance: opts.initial_balance,
            max_drawdown: 0.0,
            halted: false,
            drift_status: DriftStatus::WarmingUp,
            alerts_raised: 0,
        };

        let mut balance = opts.initial_balance;
        let mut peak = opts.initial_balance;
        let mut open: Option<OpenTrade> = None;
        let trade_every = opts.trade_every.max(1);

        for (i, price) in prices.iter().copied().enumerate() {
            clock.advance(chrono::Duration::seconds(1));
            broker.set_price(&opts.symbol, price);
            gateway.update_price(&opts.symbol, price);
            report.ticks_run = i + 1;
            report.final_price = price;

            // Mark to market
            let equity = balance + open.as_ref().map(|t| t.pnl_at(price)).unwrap_or(0.0);
            peak = peak.max(equity);
            let drawdown = if peak > 0.0 { (peak - equity) / peak } else { 0.0 };
            report.max_drawdown = report.max_drawdown.max(drawdown);

            if gateway.emergency_check(drawdown) {
                tracing::error!(
                    drawdown_pct = drawdown * 100.0,
                    tick = i,
                    "HALT TRADING: emergency drawdown"
                );
                gateway.trigger_emergency_halt(&format!(
                    "stress {}: drawdown {:.2}%",
                    scenario,
                    drawdown * 100.0
                ));
                report.halted = true;
                break;
            }

            if i % trade_every != 0 {
                continue;
            }

            if let Some(trade) = open.take() {
                let pnl = trade.pnl_at(price);
                balance += pnl;
                gateway.record_outcome(pnl > 0.0, pnl);
            }

            gateway.record_dialectic(rng.gen_bool(opts.agreement_rate.clamp(0.0, 1.0)));

            let side = if rng.gen_bool(0.5) {
                TradeSide::Buy
            } else {
                TradeSide::Sell
            };
            let request = TradeRequest::new(
                opts.symbol.clone(),
                side,
                balance * opts.trade_fraction,
                balance,
            )
            .with_portfolio(balance, opts.initial_balance);

            report.trades_submitted += 1;
            match gateway.submit_trade(request).await {
                TradeOutcome::Executed { order } => {
                    report.executed += 1;
                    open = Some(OpenTrade {
                        side: order.side,
                        notional: order.filled_size,
                        entry_price: order.fill_price.unwrap_or(price),
                    });
                }
                TradeOutcome::Blocked { reason } => {
                    report.blocked += 1;
                    *report.blocked_by.entry(reason.kind().to_string()).or_insert(0) += 1;
                }
                TradeOutcome::Failed { error } => {
                    report.failed += 1;
                    tracing::debug!(%error, "Stress trade failed");
                }
            }
        }

        if let Some(trade) = open.take() {
            let pnl = trade.pnl_at(report.final_price);
            balance += pnl;
            gateway.record_outcome(pnl > 0.0, pnl);
        }

        report.final_balance = balance;
        report.drift_status = gateway.drift_status();
        report.alerts_raised = gateway.alerts().len();

        tracing::info!(
            %scenario,
            final_price = report.final_price,
            final_balance = report.final_balance,
            executed = report.executed,
            blocked = report.blocked,
            failed = report.failed,
            halted = report.halted,
            "Stress scenario finished"
        );

        Ok(report)
    }

    /// Run every scenario in order, each on a fresh gateway
    pub async fn run_all(&self) -> Result<Vec<StressReport>> {
        let mut reports = Vec::with_capacity(StressScenario::ALL.len());
        for scenario in StressScenario::ALL {
            reports.push(self.run(scenario).await?);
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(ticks: usize) -> StressOptions {
        StressOptions {
            ticks,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_runs_are_reproducible() {
        let runner = StressRunner::new(GatewayConfig::default(), 11).with_options(options(200));

        let a = runner.run(StressScenario::Chop).await.unwrap();
        let b = runner.run(StressScenario::Chop).await.unwrap();

        assert_eq!(a.executed, b.executed);
        assert_eq!(a.blocked_by, b.blocked_by);
        assert_eq!(a.final_balance, b.final_balance);
    }

    #[tokio::test]
    async fn test_counts_add_up() {
        let runner = StressRunner::new(GatewayConfig::default(), 3).with_options(options(300));

        for report in runner.run_all().await.unwrap() {
            assert_eq!(
                report.executed + report.blocked + report.failed,
                report.trades_submitted
            );
            assert!(report.ticks_run <= 300);
            assert!(report.max_drawdown >= 0.0);
        }
    }

    #[tokio::test]
    async fn test_chop_submits_trades() {
        let runner = StressRunner::new(GatewayConfig::default(), 5).with_options(options(100));
        let report = runner.run(StressScenario::Chop).await.unwrap();

        assert_eq!(report.trades_submitted, 10);
        assert!(!report.halted);
    }
}
