use crate::alerts::Alert;
use crate::models::Severity;
use crate::settings::DriftConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftStatus {
    /// Fewer than `min_samples` outcomes recorded
    WarmingUp,
    Healthy,
    /// Performance slipping, trading continues
    Warning,
    /// Live trading blocked until acknowledged or reset
    DriftDetected,
    /// Manually paused
    Paused,
}

impl DriftStatus {
    /// Statuses that only `acknowledge_alert` or `reset_baseline` clear
    pub fn is_latched(self) -> bool {
        matches!(self, DriftStatus::DriftDetected | DriftStatus::Paused)
    }
}

impl fmt::Display for DriftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DriftStatus::WarmingUp => "warming_up",
            DriftStatus::Healthy => "healthy",
            DriftStatus::Warning => "warning",
            DriftStatus::DriftDetected => "drift_detected",
            DriftStatus::Paused => "paused",
        };
        write!(f, "{}", s)
    }
}

/// Market regime as reported by an upstream detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MarketRegime {
    TrendingUp,
    TrendingDown,
    Ranging,
    HighVolatility,
    Crash,
    #[default]
    Unknown,
}

impl FromStr for MarketRegime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trending_up" => Ok(MarketRegime::TrendingUp),
            "trending_down" => Ok(MarketRegime::TrendingDown),
            "ranging" | "sideways" => Ok(MarketRegime::Ranging),
            "high_volatility" => Ok(MarketRegime::HighVolatility),
            "crash" => Ok(MarketRegime::Crash),
            "unknown" => Ok(MarketRegime::Unknown),
            other => Err(format!("unknown market regime: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum VolatilityRegime {
    Low,
    #[default]
    Moderate,
    High,
}

impl FromStr for VolatilityRegime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(VolatilityRegime::Low),
            "MODERATE" | "NORMAL" => Ok(VolatilityRegime::Moderate),
            "HIGH" => Ok(VolatilityRegime::High),
            other => Err(format!("unknown volatility regime: {}", other)),
        }
    }
}

/// Serializable performance snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftMetrics {
    pub current_accuracy: f64,
    pub baseline_accuracy: f64,
    /// baseline - current; positive means underperforming
    pub deviation: f64,
    pub sample_size: usize,
    pub window_size: usize,
    pub consecutive_losses: u32,
    pub max_drawdown: f64,
    pub cumulative_pnl: f64,
    pub market_regime: MarketRegime,
    pub volatility_regime: VolatilityRegime,
}

/// One independent piece of evidence that performance has drifted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DriftReason {
    AccuracyDeviation { deviation: f64 },
    ConsecutiveLosses { count: u32 },
    Drawdown { drawdown: f64 },
    /// Stricter accuracy check while volatility is HIGH
    HighVolatilityUnderperformance { deviation: f64 },
}

impl fmt::Display for DriftReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriftReason::AccuracyDeviation { deviation } => {
                write!(f, "accuracy deviation {:.1}%", deviation * 100.0)
            }
            DriftReason::ConsecutiveLosses { count } => write!(f, "{} consecutive losses", count),
            DriftReason::Drawdown { drawdown } => write!(f, "drawdown {:.1}%", drawdown * 100.0),
            DriftReason::HighVolatilityUnderperformance { deviation } => write!(
                f,
                "underperforming by {:.1}% in high volatility",
                deviation * 100.0
            ),
        }
    }
}

/// Result of a health evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: DriftStatus,
    pub drift_detected: bool,
    pub severity: Severity,
    pub message: String,
    pub reasons: Vec<DriftReason>,
    pub recommended_action: String,
    pub metrics: DriftMetrics,
}

/// Full export of the guard for dashboards
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftSnapshot {
    pub config: DriftConfig,
    pub status: DriftStatus,
    pub is_active: bool,
    pub live_trading_allowed: bool,
    pub health: HealthReport,
    pub last_check_time: Option<DateTime<Utc>>,
    pub recent_alerts: Vec<Alert>,
}
