use super::correlation::tail_correlation;
use super::PriceHistory;
use crate::clock::{system_clock, SharedClock};
use crate::models::{PositionView, TradeSide};
use crate::settings::RiskConfig;
use serde::{Deserialize, Serialize};

/// Outcome of a pre-trade risk evaluation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskAssessment {
    pub approved: bool,
    pub adjusted_size: f64,
    pub reason: String,
}

impl RiskAssessment {
    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            adjusted_size: 0.0,
            reason: reason.into(),
        }
    }
}

/// Approves and resizes proposed trades against correlation and exposure
/// limits.
pub struct RiskEngine {
    config: RiskConfig,
    history: PriceHistory,
    clock: SharedClock,
}

impl RiskEngine {
    pub fn new(config: RiskConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    pub fn with_clock(config: RiskConfig, clock: SharedClock) -> Self {
        let history = PriceHistory::new(config.price_history_size);
        Self {
            config,
            history,
            clock,
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn history(&self) -> &PriceHistory {
        &self.history
    }

    /// Record a market data tick
    pub fn update_price(&mut self, symbol: &str, price: f64) {
        if !price.is_finite() || price <= 0.0 {
            tracing::warn!(symbol, price, "Ignoring invalid price tick");
            return;
        }
        self.history.push(symbol, price, self.clock.now());
    }

    /// True when the drawdown magnitude reaches the emergency threshold
    pub fn emergency_check(&self, drawdown: f64) -> bool {
        drawdown.abs() >= self.config.emergency_drawdown_threshold
    }

    /// True when today's realized loss reaches `max_daily_loss` of the balance
    pub fn daily_loss_breached(&self, daily_pnl: f64, account_balance: f64) -> bool {
        if account_balance <= 0.0 {
            return daily_pnl < 0.0;
        }
        -daily_pnl >= self.config.max_daily_loss * account_balance
    }

    /// Quantity whose stop-out loses exactly `max_risk_per_trade` of the balance
    pub fn fixed_fractional_size(
        &self,
        account_balance: f64,
        entry_price: f64,
        stop_price: f64,
    ) -> f64 {
        let stop_distance = (entry_price - stop_price).abs();
        if account_balance <= 0.0 || !stop_distance.is_finite() || stop_distance <= 0.0 {
            return 0.0;
        }
        account_balance * self.config.max_risk_per_trade / stop_distance
    }

    /// Evaluate a proposed trade
    ///
    /// Correlation halving runs first, then the exposure clip on the
    /// (possibly halved) size. Malformed positions are skipped.
    pub fn evaluate_trade(
        &self,
        symbol: &str,
        proposed_size: f64,
        side: TradeSide,
        account_balance: f64,
        current_positions: &[PositionView],
    ) -> RiskAssessment {
        if !proposed_size.is_finite() || proposed_size <= 0.0 {
            return RiskAssessment::rejected(format!("Invalid proposed size: {}", proposed_size));
        }
        if !account_balance.is_finite() || account_balance <= 0.0 {
            return RiskAssessment::rejected(format!(
                "Invalid account balance: {}",
                account_balance
            ));
        }

        let positions: Vec<&PositionView> = current_positions
            .iter()
            .filter(|p| {
                let ok = p.is_well_formed();
                if !ok {
                    tracing::debug!(?p, "Skipping malformed position");
                }
                ok
            })
            .collect();

        let mut adjusted_size = proposed_size;
        let mut reasons: Vec<String> = Vec::new();

        // 1. Correlation: first match in iteration order wins
        if let Some((other, r)) = self.first_correlated(symbol, side, &positions) {
            adjusted_size /= 2.0;
            reasons.push(format!(
                "Correlated with {} (r={:.2}): size halved to {:.4}",
                other, r, adjusted_size
            ));
        }

        // 2. Portfolio exposure
        let current_exposure: f64 = positions.iter().map(|p| p.size.abs()).sum();
        let budget = account_balance * self.config.max_portfolio_risk;

        if current_exposure + adjusted_size > budget {
            let remaining = budget - current_exposure;
            if remaining <= 0.0 {
                tracing::info!(
                    symbol,
                    current_exposure,
                    budget,
                    "Trade rejected: portfolio risk limit reached"
                );
                return RiskAssessment::rejected(format!(
                    "Portfolio risk limit reached (exposure {:.2} of {:.2})",
                    current_exposure, budget
                ));
            }

            adjusted_size = remaining;
            reasons.push(format!(
                "Size reduced to {:.2} to fit portfolio risk limit ({:.0}% of balance)",
                remaining,
                self.config.max_portfolio_risk * 100.0
            ));
        }

        let reason = if reasons.is_empty() {
            "OK".to_string()
        } else {
            reasons.join("; ")
        };

        tracing::debug!(symbol, proposed_size, adjusted_size, %reason, "Trade evaluated");

        RiskAssessment {
            approved: true,
            adjusted_size,
            reason,
        }
    }

    // TODO: pick the most correlated symbol instead of the first one once
    // callers stop relying on position order.
    fn first_correlated<'a>(
        &self,
        symbol: &str,
        side: TradeSide,
        positions: &[&'a PositionView],
    ) -> Option<(&'a str, f64)> {
        let proposed = self.history.prices(symbol);
        if proposed.len() < 2 {
            return None;
        }

        for position in positions {
            if position.symbol == symbol {
                continue;
            }
            let Some(existing_side) = position.side else {
                continue;
            };
            if self.history.overlap(symbol, &position.symbol) < 2 {
                continue;
            }

            let existing = self.history.prices(&position.symbol);
            let Some(r) = tail_correlation(&existing, &proposed) else {
                continue;
            };

            // Same side moves together when r > 0, opposite sides when r < 0
            let co_moving = r.signum() * existing_side.sign() == side.sign();
            if r.abs() > self.config.correlation_threshold && co_moving {
                return Some((position.symbol.as_str(), r));
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> RiskEngine {
        RiskEngine::new(RiskConfig::default())
    }

    fn feed_trend(engine: &mut RiskEngine, symbol: &str, start: f64, step: f64) {
        for i in 0..10 {
            engine.update_price(symbol, start + step * i as f64);
        }
    }

    #[test]
    fn test_emergency_check_threshold() {
        let engine = engine();

        assert!(!engine.emergency_check(0.04));
        assert!(engine.emergency_check(0.05));
        assert!(engine.emergency_check(0.06));
        assert!(engine.emergency_check(-0.06));
    }

    #[test]
    fn test_emergency_check_is_symmetric() {
        let engine = engine();
        for dd in [0.0, 0.01, 0.049, 0.05, 0.2, 1.5] {
            assert_eq!(engine.emergency_check(dd), engine.emergency_check(-dd));
        }
    }

    #[test]
    fn test_correlated_assets_halve_size() {
        let mut engine = engine();
        feed_trend(&mut engine, "BTCUSDT", 100.0, 1.0);
        feed_trend(&mut engine, "ETHUSDT", 10.0, 1.0);

        let positions = vec![PositionView::new("BTCUSDT", TradeSide::Buy, 1.0)];
        let assessment =
            engine.evaluate_trade("ETHUSDT", 1.0, TradeSide::Buy, 10000.0, &positions);

        assert!(assessment.approved);
        assert_eq!(assessment.adjusted_size, 0.5);
        assert!(assessment.reason.contains("Correlated with BTCUSDT"));
    }

    #[test]
    fn test_correlated_but_opposite_side_is_a_hedge() {
        let mut engine = engine();
        feed_trend(&mut engine, "BTCUSDT", 100.0, 1.0);
        feed_trend(&mut engine, "ETHUSDT", 10.0, 1.0);

        let positions = vec![PositionView::new("BTCUSDT", TradeSide::Sell, 1.0)];
        let assessment =
            engine.evaluate_trade("ETHUSDT", 1.0, TradeSide::Buy, 10000.0, &positions);

        assert_eq!(assessment.adjusted_size, 1.0);
        assert_eq!(assessment.reason, "OK");
    }

    #[test]
    fn test_negative_correlation_with_opposite_side_halves() {
        let mut engine = engine();
        feed_trend(&mut engine, "BTCUSDT", 100.0, 1.0);
        feed_trend(&mut engine, "INVERSE", 50.0, -1.0);

        let positions = vec![PositionView::new("BTCUSDT", TradeSide::Sell, 1.0)];
        let assessment =
            engine.evaluate_trade("INVERSE", 1.0, TradeSide::Buy, 10000.0, &positions);

        assert_eq!(assessment.adjusted_size, 0.5);
        assert!(assessment.reason.contains("BTCUSDT"));
    }

    #[test]
    fn test_only_first_correlated_symbol_applies() {
        let mut engine = engine();
        feed_trend(&mut engine, "BTCUSDT", 100.0, 1.0);
        feed_trend(&mut engine, "SOLUSDT", 20.0, 2.0);
        feed_trend(&mut engine, "ETHUSDT", 10.0, 1.0);

        let positions = vec![
            PositionView::new("SOLUSDT", TradeSide::Buy, 1.0),
            PositionView::new("BTCUSDT", TradeSide::Buy, 1.0),
        ];
        let assessment =
            engine.evaluate_trade("ETHUSDT", 1.0, TradeSide::Buy, 10000.0, &positions);

        assert_eq!(assessment.adjusted_size, 0.5);
        assert!(assessment.reason.contains("SOLUSDT"));
        assert!(!assessment.reason.contains("BTCUSDT"));
    }

    #[test]
    fn test_portfolio_risk_limit_clips_size() {
        let engine = engine();
        let positions = vec![PositionView::exposure_only("A", 9000.0)];

        let assessment = engine.evaluate_trade("B", 2000.0, TradeSide::Buy, 100000.0, &positions);

        assert!(assessment.approved);
        assert_eq!(assessment.adjusted_size, 1000.0);
        assert!(assessment.reason.contains("Size reduced"));
    }

    #[test]
    fn test_portfolio_full_rejects() {
        let engine = engine();
        let positions = vec![PositionView::exposure_only("A", 10000.0)];

        let assessment = engine.evaluate_trade("B", 500.0, TradeSide::Buy, 100000.0, &positions);

        assert!(!assessment.approved);
        assert_eq!(assessment.adjusted_size, 0.0);
        assert!(assessment.reason.contains("Portfolio risk limit"));
    }

    #[test]
    fn test_correlation_then_exposure_clip() {
        let mut engine = engine();
        feed_trend(&mut engine, "BTCUSDT", 100.0, 1.0);
        feed_trend(&mut engine, "ETHUSDT", 10.0, 1.0);

        // Budget 1000, exposure 900, proposed 400 -> halved to 200 -> clipped to 100
        let positions = vec![PositionView::new("BTCUSDT", TradeSide::Buy, 900.0)];
        let assessment =
            engine.evaluate_trade("ETHUSDT", 400.0, TradeSide::Buy, 10000.0, &positions);

        assert!(assessment.approved);
        assert!((assessment.adjusted_size - 100.0).abs() < 1e-9);
        assert!(assessment.reason.contains("Correlated with BTCUSDT"));
        assert!(assessment.reason.contains("Size reduced"));
    }

    #[test]
    fn test_no_rules_triggered() {
        let engine = engine();
        let assessment = engine.evaluate_trade("SOL", 100.0, TradeSide::Buy, 10000.0, &[]);

        assert!(assessment.approved);
        assert_eq!(assessment.adjusted_size, 100.0);
        assert_eq!(assessment.reason, "OK");
    }

    #[test]
    fn test_malformed_positions_skipped() {
        let engine = engine();
        let positions = vec![
            PositionView::exposure_only("", 5000.0),
            PositionView::exposure_only("BAD", f64::NAN),
            PositionView::exposure_only("A", 100.0),
        ];

        let assessment = engine.evaluate_trade("B", 100.0, TradeSide::Buy, 10000.0, &positions);

        assert!(assessment.approved);
        assert_eq!(assessment.adjusted_size, 100.0);
    }

    #[test]
    fn test_insufficient_history_skips_correlation() {
        let mut engine = engine();
        engine.update_price("BTCUSDT", 100.0);
        feed_trend(&mut engine, "ETHUSDT", 10.0, 1.0);

        let positions = vec![PositionView::new("BTCUSDT", TradeSide::Buy, 1.0)];
        let assessment =
            engine.evaluate_trade("ETHUSDT", 1.0, TradeSide::Buy, 10000.0, &positions);

        assert_eq!(assessment.adjusted_size, 1.0);
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        let engine = engine();

        assert!(!engine.evaluate_trade("A", 0.0, TradeSide::Buy, 1000.0, &[]).approved);
        assert!(!engine.evaluate_trade("A", f64::NAN, TradeSide::Buy, 1000.0, &[]).approved);
        assert!(!engine.evaluate_trade("A", 10.0, TradeSide::Buy, 0.0, &[]).approved);
    }

    #[test]
    fn test_invalid_price_ignored() {
        let mut engine = engine();
        engine.update_price("SOL", -1.0);
        engine.update_price("SOL", f64::INFINITY);

        assert_eq!(engine.history().len("SOL"), 0);
    }

    #[test]
    fn test_daily_loss_and_fixed_fractional() {
        let engine = engine();

        assert!(engine.daily_loss_breached(-600.0, 10000.0));
        assert!(!engine.daily_loss_breached(-400.0, 10000.0));

        // 2% of 10000 = 200 at risk, stop distance 8 -> 25 units
        assert_eq!(engine.fixed_fractional_size(10000.0, 100.0, 92.0), 25.0);
        assert_eq!(engine.fixed_fractional_size(10000.0, 100.0, 100.0), 0.0);
    }
}
