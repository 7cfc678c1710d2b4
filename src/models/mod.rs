use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Direction of a trade or position
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    /// +1 for buy, -1 for sell
    pub fn sign(self) -> f64 {
        match self {
            TradeSide::Buy => 1.0,
            TradeSide::Sell => -1.0,
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "buy"),
            TradeSide::Sell => write!(f, "sell"),
        }
    }
}

impl FromStr for TradeSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" | "long" => Ok(TradeSide::Buy),
            "sell" | "short" => Ok(TradeSide::Sell),
            other => Err(format!("unknown trade side: {}", other)),
        }
    }
}

/// Snapshot of an open position supplied by the caller
///
/// Never owned or mutated by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionView {
    pub symbol: String,
    #[serde(default)]
    pub side: Option<TradeSide>,
    pub size: f64,
}

impl PositionView {
    pub fn new(symbol: impl Into<String>, side: TradeSide, size: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side: Some(side),
            size,
        }
    }

    /// Position known only by its exposure (no side)
    pub fn exposure_only(symbol: impl Into<String>, size: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side: None,
            size,
        }
    }

    /// Entries with an empty symbol or a non-finite size are skipped by the
    /// risk checks.
    pub fn is_well_formed(&self) -> bool {
        !self.symbol.trim().is_empty() && self.size.is_finite()
    }
}

/// One observed price tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSample {
    pub symbol: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

/// Sized order handed to the execution function
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeSignal {
    pub id: Uuid,
    pub symbol: String,
    pub side: TradeSide,
    pub size: f64,
    pub created_at: DateTime<Utc>,
}

impl TradeSignal {
    pub fn new(symbol: impl Into<String>, side: TradeSide, size: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            side,
            size,
            created_at: Utc::now(),
        }
    }
}

/// Broker acknowledgement of an executed order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderResult {
    pub order_id: String,
    pub symbol: String,
    pub side: TradeSide,
    pub filled_size: f64,
    pub fill_price: Option<f64>,
    pub broker: String,
    pub timestamp: DateTime<Utc>,
}

/// Where orders end up
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradingMode {
    #[default]
    #[serde(alias = "simulation", alias = "Simulation")]
    Simulation,
    #[serde(alias = "paper", alias = "Paper")]
    Paper,
    #[serde(alias = "live", alias = "Live")]
    Live,
}

impl TradingMode {
    pub fn is_live(self) -> bool {
        self == TradingMode::Live
    }
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradingMode::Simulation => write!(f, "SIMULATION"),
            TradingMode::Paper => write!(f, "PAPER"),
            TradingMode::Live => write!(f, "LIVE"),
        }
    }
}

impl FromStr for TradingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SIMULATION" | "SIM" => Ok(TradingMode::Simulation),
            "PAPER" => Ok(TradingMode::Paper),
            "LIVE" => Ok(TradingMode::Live),
            other => Err(format!("unknown trading mode: {}", other)),
        }
    }
}

/// Why a trade did not reach the broker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum BlockReason {
    /// Rejected by the risk engine
    Risk(String),
    /// A breaker refused the call
    Breaker(String),
    /// Execution exceeded the latency deadline
    Timeout { after_secs: f64 },
    /// Drift guard paused live trading
    DriftPaused(String),
    DailyLossLimit { daily_pnl: f64, limit: f64 },
    EmergencyDrawdown { drawdown: f64 },
    EmergencyHalt(String),
}

impl BlockReason {
    /// Stable label matching the serialized `kind`
    pub fn kind(&self) -> &'static str {
        match self {
            BlockReason::Risk(_) => "risk",
            BlockReason::Breaker(_) => "breaker",
            BlockReason::Timeout { .. } => "timeout",
            BlockReason::DriftPaused(_) => "drift_paused",
            BlockReason::DailyLossLimit { .. } => "daily_loss_limit",
            BlockReason::EmergencyDrawdown { .. } => "emergency_drawdown",
            BlockReason::EmergencyHalt(_) => "emergency_halt",
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::Risk(reason) => write!(f, "risk engine: {}", reason),
            BlockReason::Breaker(name) => write!(f, "circuit breaker tripped: {}", name),
            BlockReason::Timeout { after_secs } => {
                write!(f, "execution timed out after {:.1}s", after_secs)
            }
            BlockReason::DriftPaused(status) => write!(f, "drift guard paused trading ({})", status),
            BlockReason::DailyLossLimit { daily_pnl, limit } => {
                write!(f, "daily loss {:.2} reached limit {:.2}", daily_pnl, limit)
            }
            BlockReason::EmergencyDrawdown { drawdown } => {
                write!(f, "emergency drawdown {:.2}%", drawdown * 100.0)
            }
            BlockReason::EmergencyHalt(reason) => write!(f, "emergency halt: {}", reason),
        }
    }
}

/// Result of pushing a trade through the gateway
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeOutcome {
    Executed { order: OrderResult },
    Blocked { reason: BlockReason },
    Failed { error: String },
}

impl TradeOutcome {
    pub fn blocked(reason: BlockReason) -> Self {
        TradeOutcome::Blocked { reason }
    }

    pub fn is_executed(&self) -> bool {
        matches!(self, TradeOutcome::Executed { .. })
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, TradeOutcome::Blocked { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TradeOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        };
        write!(f, "{}", label)
    }
}
