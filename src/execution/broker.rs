use crate::models::{OrderResult, TradeSignal};
use anyhow::{anyhow, bail};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

/// Capability every broker integration provides
///
/// The gateway only ever hands a fully sized `TradeSignal` to the adapter;
/// breakers and timeouts wrap the call from outside.
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    fn name(&self) -> &str;

    async fn place_order(&self, signal: TradeSignal) -> anyhow::Result<OrderResult>;
}

/// Simulated broker filling at the last known price
///
/// Latency and failures can be injected to exercise the breakers.
pub struct PaperBroker {
    prices: RwLock<HashMap<String, f64>>,
    latency_ms: AtomicU64,
    fail_orders: AtomicBool,
    order_seq: AtomicU64,
}

impl PaperBroker {
    pub fn new() -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
            latency_ms: AtomicU64::new(0),
            fail_orders: AtomicBool::new(false),
            order_seq: AtomicU64::new(0),
        }
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        let mut prices = self.prices.write().unwrap_or_else(|e| e.into_inner());
        prices.insert(symbol.to_string(), price);
    }

    pub fn price(&self, symbol: &str) -> Option<f64> {
        let prices = self.prices.read().unwrap_or_else(|e| e.into_inner());
        prices.get(symbol).copied()
    }

    /// Delay every order by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Reject every order until switched back
    pub fn set_failing(&self, failing: bool) {
        self.fail_orders.store(failing, Ordering::Relaxed);
    }

    pub fn orders_filled(&self) -> u64 {
        self.order_seq.load(Ordering::Relaxed)
    }
}

impl Default for PaperBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerAdapter for PaperBroker {
    fn name(&self) -> &str {
        "paper"
    }

    async fn place_order(&self, signal: TradeSignal) -> anyhow::Result<OrderResult> {
        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.fail_orders.load(Ordering::Relaxed) {
            bail!("paper broker rejected order for {}", signal.symbol);
        }

        let fill_price = self
            .price(&signal.symbol)
            .ok_or_else(|| anyhow!("no price available for {}", signal.symbol))?;

        let seq = self.order_seq.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(
            symbol = %signal.symbol,
            side = %signal.side,
            size = signal.size,
            fill_price,
            "Paper fill"
        );

        Ok(OrderResult {
            order_id: format!("paper-{}", seq),
            symbol: signal.symbol,
            side: signal.side,
            filled_size: signal.size,
            fill_price: Some(fill_price),
            broker: self.name().to_string(),
            timestamp: Utc::now(),
        })
    }
}
