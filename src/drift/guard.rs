use super::metrics::{
    DriftMetrics, DriftReason, DriftSnapshot, DriftStatus, HealthReport, MarketRegime,
    VolatilityRegime,
};
use crate::alerts::{Alert, AlertHub};
use crate::clock::{system_clock, SharedClock};
use crate::models::{Severity, TradingMode};
use crate::settings::DriftConfig;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

const ALERT_HISTORY: usize = 20;
const SNAPSHOT_ALERTS: usize = 5;

/// Rolling-window performance monitor
///
/// Watches realized trade outcomes against a baseline accuracy and pauses
/// live trading when performance degrades. Detection is latched: once
/// drift is detected only `acknowledge_alert` or `reset_baseline` clears it.
pub struct DriftGuard {
    config: DriftConfig,
    results: VecDeque<bool>,
    pnl_window: VecDeque<f64>,
    consecutive_losses: u32,
    peak_equity: f64,
    cumulative_pnl: f64,
    current_drawdown: f64,
    market_regime: MarketRegime,
    volatility_regime: VolatilityRegime,
    status: DriftStatus,
    is_active: bool,
    last_check_time: Option<DateTime<Utc>>,
    alerts: VecDeque<Alert>,
    hub: Option<AlertHub>,
    clock: SharedClock,
}

impl DriftGuard {
    pub fn new(config: DriftConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    pub fn with_clock(config: DriftConfig, clock: SharedClock) -> Self {
        let window = config.window_size.max(1);
        Self {
            config,
            results: VecDeque::with_capacity(window),
            pnl_window: VecDeque::with_capacity(window),
            consecutive_losses: 0,
            peak_equity: 0.0,
            cumulative_pnl: 0.0,
            current_drawdown: 0.0,
            market_regime: MarketRegime::Unknown,
            volatility_regime: VolatilityRegime::Moderate,
            status: DriftStatus::WarmingUp,
            is_active: false,
            last_check_time: None,
            alerts: VecDeque::with_capacity(ALERT_HISTORY),
            hub: None,
            clock,
        }
    }

    /// Forward every drift alert to a shared hub as well
    pub fn with_alert_hub(mut self, hub: AlertHub) -> Self {
        self.hub = Some(hub);
        self
    }

    pub fn config(&self) -> &DriftConfig {
        &self.config
    }

    pub fn status(&self) -> DriftStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn sample_size(&self) -> usize {
        self.results.len()
    }

    pub fn consecutive_losses(&self) -> u32 {
        self.consecutive_losses
    }

    /// Sum of PnL currently inside the window
    pub fn window_pnl(&self) -> f64 {
        self.pnl_window.iter().sum()
    }

    /// Record one closed trade and re-evaluate
    ///
    /// # Arguments
    /// * `is_success` - Whether the trade was a win
    /// * `pnl` - Realized profit/loss of the trade
    pub fn record_outcome(&mut self, is_success: bool, pnl: f64) -> DriftStatus {
        let window = self.config.window_size.max(1);

        self.results.push_back(is_success);
        self.pnl_window.push_back(pnl);
        while self.results.len() > window {
            self.results.pop_front();
        }
        while self.pnl_window.len() > window {
            self.pnl_window.pop_front();
        }

        if is_success {
            self.consecutive_losses = 0;
        } else {
            self.consecutive_losses += 1;
        }

        if pnl.is_finite() {
            self.cumulative_pnl += pnl;
        } else {
            tracing::warn!(pnl, "Ignoring non-finite PnL in drift guard");
        }
        if self.cumulative_pnl > self.peak_equity {
            self.peak_equity = self.cumulative_pnl;
        }
        self.current_drawdown = if self.peak_equity > 0.0 {
            (self.peak_equity - self.cumulative_pnl) / self.peak_equity
        } else {
            0.0
        };

        self.evaluate()
    }

    /// Same as `record_outcome`, updating the regime first
    pub fn record_outcome_with_regime(
        &mut self,
        is_success: bool,
        pnl: f64,
        market_regime: MarketRegime,
        volatility_regime: VolatilityRegime,
    ) -> DriftStatus {
        self.update_regime(market_regime, volatility_regime);
        self.record_outcome(is_success, pnl)
    }

    pub fn update_regime(&mut self, market_regime: MarketRegime, volatility_regime: VolatilityRegime) {
        if market_regime != self.market_regime || volatility_regime != self.volatility_regime {
            tracing::info!(
                market = ?market_regime,
                volatility = ?volatility_regime,
                "Drift guard regime updated"
            );
        }
        self.market_regime = market_regime;
        self.volatility_regime = volatility_regime;
    }

    /// Apply a fresh assessment to the stored status
    fn evaluate(&mut self) -> DriftStatus {
        let report = self.assess();
        self.last_check_time = Some(self.clock.now());

        if self.status.is_latched() {
            tracing::debug!(status = %self.status, "Drift status latched; metrics updated");
            return self.status;
        }

        let previous = self.status;
        self.status = report.status;

        match report.status {
            DriftStatus::DriftDetected => {
                self.is_active = true;
                tracing::error!(
                    reasons = %join_reasons(&report.reasons),
                    accuracy = report.metrics.current_accuracy,
                    consecutive_losses = report.metrics.consecutive_losses,
                    "DRIFT DETECTED: live trading paused"
                );
                self.emit(&report);
            }
            DriftStatus::Warning if previous != DriftStatus::Warning => {
                tracing::warn!(
                    deviation = report.metrics.deviation,
                    "Drift warning: {}",
                    report.message
                );
            }
            _ => {}
        }

        self.status
    }

    /// Classify the current window without touching any state
    fn assess(&self) -> HealthReport {
        let cfg = &self.config;
        let sample_size = self.results.len();

        let current_accuracy = if sample_size == 0 {
            0.0
        } else {
            self.results.iter().filter(|r| **r).count() as f64 / sample_size as f64
        };
        let deviation = if sample_size == 0 {
            0.0
        } else {
            cfg.baseline_accuracy - current_accuracy
        };

        let metrics = DriftMetrics {
            current_accuracy,
            baseline_accuracy: cfg.baseline_accuracy,
            deviation,
            sample_size,
            window_size: cfg.window_size,
            consecutive_losses: self.consecutive_losses,
            max_drawdown: self.current_drawdown,
            cumulative_pnl: self.cumulative_pnl,
            market_regime: self.market_regime,
            volatility_regime: self.volatility_regime,
        };

        let warmed_up = sample_size >= cfg.min_samples;
        let losses_breached = self.consecutive_losses >= cfg.max_consecutive_losses;

        let mut reasons = Vec::new();
        if warmed_up && deviation >= cfg.drift_threshold {
            reasons.push(DriftReason::AccuracyDeviation { deviation });
        }
        if losses_breached {
            reasons.push(DriftReason::ConsecutiveLosses {
                count: self.consecutive_losses,
            });
        }
        if self.current_drawdown >= cfg.max_drawdown_pct {
            reasons.push(DriftReason::Drawdown {
                drawdown: self.current_drawdown,
            });
        }
        if warmed_up
            && self.volatility_regime == VolatilityRegime::High
            && deviation >= cfg.drift_threshold * cfg.high_volatility_factor
        {
            reasons.push(DriftReason::HighVolatilityUnderperformance { deviation });
        }

        let status = if reasons.len() >= 2 || losses_breached {
            DriftStatus::DriftDetected
        } else if !warmed_up {
            DriftStatus::WarmingUp
        } else if reasons.len() == 1 || deviation >= cfg.warning_threshold {
            DriftStatus::Warning
        } else {
            DriftStatus::Healthy
        };

        let (severity, message) = match status {
            DriftStatus::DriftDetected => (
                Severity::Critical,
                format!("DRIFT: {}", join_reasons(&reasons)),
            ),
            DriftStatus::Warning => (
                Severity::Medium,
                format!(
                    "Warning: {}",
                    reasons
                        .first()
                        .map(|r| r.to_string())
                        .unwrap_or_else(|| "performance slipping".to_string())
                ),
            ),
            DriftStatus::WarmingUp => (
                Severity::Low,
                format!("Collecting data ({}/{})", sample_size, cfg.min_samples),
            ),
            _ => (Severity::Low, "Performance within normal range".to_string()),
        };

        let recommended_action = self.recommended_action(status, &metrics);

        HealthReport {
            status,
            drift_detected: status == DriftStatus::DriftDetected,
            severity,
            message,
            reasons,
            recommended_action,
            metrics,
        }
    }

    fn recommended_action(&self, status: DriftStatus, metrics: &DriftMetrics) -> String {
        let action = match status {
            DriftStatus::DriftDetected => {
                if metrics.consecutive_losses >= self.config.max_consecutive_losses {
                    "Stop trading immediately and analyse the losing streak"
                } else if metrics.max_drawdown >= self.config.max_drawdown_pct {
                    "Stop trading: drawdown exceeded the allowed limit"
                } else {
                    "Pause live trading and retrain the model"
                }
            }
            DriftStatus::Paused => "Investigate the pause reason before resuming",
            DriftStatus::Warning => "Halve position sizes and monitor performance",
            _ => "Continue with monitoring",
        };
        action.to_string()
    }

    /// Current health report; never changes state
    ///
    /// A latched status is reported as-is even if the window has recovered.
    pub fn check_health(&self) -> HealthReport {
        let mut report = self.assess();
        if self.status.is_latched() {
            report.status = self.status;
            report.drift_detected = true;
            report.severity = if self.status == DriftStatus::Paused {
                Severity::High
            } else {
                Severity::Critical
            };
            report.recommended_action = self.recommended_action(self.status, &report.metrics);
        }
        report
    }

    /// Live trading needs an inactive guard; other modes always proceed
    pub fn is_trading_allowed(&self, mode: TradingMode) -> bool {
        !mode.is_live() || !self.is_active
    }

    /// Clear all tracking after a retrain, starting over from warm-up
    pub fn reset_baseline(&mut self, new_baseline: f64) -> DriftStatus {
        if new_baseline.is_finite() {
            self.config.baseline_accuracy = new_baseline.clamp(0.0, 1.0);
        } else {
            tracing::warn!(new_baseline, "Non-finite baseline ignored; keeping previous");
        }

        self.results.clear();
        self.pnl_window.clear();
        self.consecutive_losses = 0;
        self.peak_equity = 0.0;
        self.cumulative_pnl = 0.0;
        self.current_drawdown = 0.0;
        self.is_active = false;
        self.status = DriftStatus::WarmingUp;

        tracing::info!(
            baseline = self.config.baseline_accuracy,
            "Drift guard baseline reset"
        );
        self.status
    }

    /// Manual override: resume without resetting the baseline
    pub fn acknowledge_alert(&mut self) {
        tracing::warn!(previous = %self.status, "Drift alert acknowledged; trading resumed");
        self.is_active = false;
        self.consecutive_losses = 0;
        self.status = DriftStatus::Healthy;
    }

    pub fn force_pause(&mut self, reason: &str) {
        tracing::warn!(reason, "Drift guard paused manually");
        self.status = DriftStatus::Paused;
        self.is_active = true;

        let metrics = self.assess().metrics;
        let alert = Alert::new(
            "drift_guard",
            DriftStatus::Paused.to_string(),
            Severity::High,
            format!("Manual pause: {}", reason),
            self.recommended_action(DriftStatus::Paused, &metrics),
            self.clock.now(),
        )
        .with_metrics(&metrics);
        self.store_alert(alert);
    }

    fn emit(&mut self, report: &HealthReport) {
        let alert = Alert::new(
            "drift_guard",
            report.status.to_string(),
            report.severity,
            report.message.clone(),
            report.recommended_action.clone(),
            self.clock.now(),
        )
        .with_metrics(&report.metrics);
        self.store_alert(alert);
    }

    fn store_alert(&mut self, alert: Alert) {
        self.alerts.push_back(alert.clone());
        while self.alerts.len() > ALERT_HISTORY {
            self.alerts.pop_front();
        }
        if let Some(hub) = &self.hub {
            hub.publish(alert);
        }
    }

    /// Drift alerts, oldest first
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.iter().cloned().collect()
    }

    pub fn latest_alert(&self) -> Option<&Alert> {
        self.alerts.back()
    }

    pub fn snapshot(&self) -> DriftSnapshot {
        let skip = self.alerts.len().saturating_sub(SNAPSHOT_ALERTS);
        DriftSnapshot {
            config: self.config.clone(),
            status: self.status,
            is_active: self.is_active,
            live_trading_allowed: self.is_trading_allowed(TradingMode::Live),
            health: self.check_health(),
            last_check_time: self.last_check_time,
            recent_alerts: self.alerts.iter().skip(skip).cloned().collect(),
        }
    }
}

fn join_reasons(reasons: &[DriftReason]) -> String {
    reasons
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
