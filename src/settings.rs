use crate::breakers::MAX_COOLDOWN_SECONDS;
use crate::error::GatewayError;
use crate::models::TradingMode;
use crate::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Risk engine limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RiskConfig {
    pub max_risk_per_trade: f64,
    pub max_portfolio_risk: f64,
    pub max_daily_loss: f64,
    pub emergency_drawdown_threshold: f64,
    pub correlation_threshold: f64,
    pub price_history_size: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_risk_per_trade: 0.02,           // 2% of balance at risk per trade
            max_portfolio_risk: 0.10,           // 10% total exposure
            max_daily_loss: 0.05,               // -5% daily
            emergency_drawdown_threshold: 0.05, // 5% drawdown halts new trades
            correlation_threshold: 0.8,
            price_history_size: 100,
        }
    }
}

/// Thresholds for the standard breaker set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BreakerSettings {
    pub max_failures: u32,
    pub cooldown_seconds: u64,
    pub half_open_max_calls: u32,
    pub max_latency_seconds: f64,
    pub max_drawdown: f64,
    pub risk_cooldown_seconds: u64,
    pub semantic_window: usize,
    pub semantic_collapse_threshold: f64,
    /// Additional named API breakers (e.g. "d1", "oracle")
    pub extra_api_breakers: Vec<String>,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            max_failures: 3,
            cooldown_seconds: 300,
            half_open_max_calls: 1,
            max_latency_seconds: 15.0,
            max_drawdown: 0.05,
            risk_cooldown_seconds: 300,
            semantic_window: 50,
            semantic_collapse_threshold: 0.9,
            extra_api_breakers: Vec::new(),
        }
    }
}

/// Drift guard thresholds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DriftConfig {
    pub baseline_accuracy: f64,
    pub window_size: usize,
    pub drift_threshold: f64,
    pub warning_threshold: f64,
    pub max_consecutive_losses: u32,
    pub max_drawdown_pct: f64,
    pub min_samples: usize,
    /// Multiplier on `drift_threshold` in a HIGH volatility regime
    pub high_volatility_factor: f64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            baseline_accuracy: 0.60,
            window_size: 50,
            drift_threshold: 0.15,
            warning_threshold: 0.08,
            max_consecutive_losses: 5,
            max_drawdown_pct: 0.05,
            min_samples: 10,
            high_volatility_factor: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlertConfig {
    pub history_size: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self { history_size: 20 }
    }
}

/// Complete gateway configuration, validated once at startup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct GatewayConfig {
    pub trading_mode: TradingMode,
    pub risk: RiskConfig,
    pub breakers: BreakerSettings,
    pub drift: DriftConfig,
    pub alerts: AlertConfig,
}

impl GatewayConfig {
    /// Load configuration using layered sources.
    ///
    /// 1. Compiled-in defaults.
    /// 2. TOML file at `path` (if given).
    /// 3. Environment overrides with prefix `GATEWAY_` and `__` as the
    ///    nesting separator (e.g. `GATEWAY_RISK__MAX_PORTFOLIO_RISK=0.2`).
    /// 4. `TRADING_MODE` for the trading mode.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        // Prefix separator must be `_` explicitly, otherwise the crate uses
        // the nesting separator for it as well.
        builder = builder.add_source(
            Environment::with_prefix("GATEWAY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("breakers.extra_api_breakers"),
        );

        let mut cfg: GatewayConfig = builder.build()?.try_deserialize()?;

        if let Ok(mode) = std::env::var("TRADING_MODE") {
            cfg.trading_mode = mode.parse().map_err(GatewayError::InvalidConfig)?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject thresholds that would make the engines meaningless
    pub fn validate(&self) -> Result<()> {
        let risk = &self.risk;
        check_fraction("risk.max_risk_per_trade", risk.max_risk_per_trade)?;
        check_fraction("risk.max_portfolio_risk", risk.max_portfolio_risk)?;
        check_fraction("risk.max_daily_loss", risk.max_daily_loss)?;
        check_fraction(
            "risk.emergency_drawdown_threshold",
            risk.emergency_drawdown_threshold,
        )?;
        check_fraction("risk.correlation_threshold", risk.correlation_threshold)?;
        check_nonzero("risk.price_history_size", risk.price_history_size)?;

        let breakers = &self.breakers;
        check_nonzero("breakers.max_failures", breakers.max_failures as usize)?;
        check_nonzero(
            "breakers.half_open_max_calls",
            breakers.half_open_max_calls as usize,
        )?;
        if !breakers.max_latency_seconds.is_finite() || breakers.max_latency_seconds <= 0.0 {
            return Err(GatewayError::invalid(format!(
                "breakers.max_latency_seconds must be positive, got {}",
                breakers.max_latency_seconds
            )));
        }
        check_cooldown("breakers.cooldown_seconds", breakers.cooldown_seconds)?;
        check_cooldown(
            "breakers.risk_cooldown_seconds",
            breakers.risk_cooldown_seconds,
        )?;
        check_fraction("breakers.max_drawdown", breakers.max_drawdown)?;
        check_nonzero("breakers.semantic_window", breakers.semantic_window)?;
        check_fraction(
            "breakers.semantic_collapse_threshold",
            breakers.semantic_collapse_threshold,
        )?;
        if breakers.extra_api_breakers.iter().any(|n| n.trim().is_empty()) {
            return Err(GatewayError::invalid(
                "breakers.extra_api_breakers contains an empty name",
            ));
        }

        let drift = &self.drift;
        check_fraction("drift.baseline_accuracy", drift.baseline_accuracy)?;
        check_nonzero("drift.window_size", drift.window_size)?;
        check_fraction("drift.drift_threshold", drift.drift_threshold)?;
        check_fraction("drift.warning_threshold", drift.warning_threshold)?;
        check_nonzero(
            "drift.max_consecutive_losses",
            drift.max_consecutive_losses as usize,
        )?;
        check_fraction("drift.max_drawdown_pct", drift.max_drawdown_pct)?;
        check_fraction("drift.high_volatility_factor", drift.high_volatility_factor)?;
        if drift.min_samples > drift.window_size {
            return Err(GatewayError::invalid(format!(
                "drift.min_samples ({}) exceeds drift.window_size ({})",
                drift.min_samples, drift.window_size
            )));
        }

        check_nonzero("alerts.history_size", self.alerts.history_size)?;

        Ok(())
    }
}

fn check_fraction(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(GatewayError::invalid(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}

fn check_cooldown(name: &str, seconds: u64) -> Result<()> {
    if seconds > MAX_COOLDOWN_SECONDS {
        return Err(GatewayError::invalid(format!(
            "{} must be at most {}, got {}",
            name, MAX_COOLDOWN_SECONDS, seconds
        )));
    }
    Ok(())
}

fn check_nonzero(name: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(GatewayError::invalid(format!("{} must be at least 1", name)));
    }
    Ok(())
}
