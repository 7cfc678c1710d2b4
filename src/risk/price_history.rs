use crate::models::PriceSample;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};

/// Rolling per-symbol price buffer
///
/// Maintains the most recent `capacity` samples for each symbol.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    series: HashMap<String, VecDeque<PriceSample>>,
    capacity: usize,
}

impl PriceHistory {
    /// # Arguments
    /// * `capacity` - Maximum number of samples kept per symbol
    pub fn new(capacity: usize) -> Self {
        Self {
            series: HashMap::new(),
            capacity: capacity.max(2),
        }
    }

    /// Append a sample, evicting the oldest if the buffer is full
    pub fn push(&mut self, symbol: &str, price: f64, timestamp: DateTime<Utc>) {
        let capacity = self.capacity;
        let samples = self
            .series
            .entry(symbol.to_string())
            .or_insert_with(|| VecDeque::with_capacity(capacity));

        samples.push_back(PriceSample {
            symbol: symbol.to_string(),
            price,
            timestamp,
        });

        while samples.len() > capacity {
            samples.pop_front();
        }
    }

    /// Prices for a symbol, oldest first
    pub fn prices(&self, symbol: &str) -> Vec<f64> {
        self.series
            .get(symbol)
            .map(|deque| deque.iter().map(|s| s.price).collect())
            .unwrap_or_default()
    }

    pub fn latest(&self, symbol: &str) -> Option<&PriceSample> {
        self.series.get(symbol).and_then(|deque| deque.back())
    }

    pub fn len(&self, symbol: &str) -> usize {
        self.series.get(symbol).map(|d| d.len()).unwrap_or(0)
    }

    /// Number of samples available on both symbols
    pub fn overlap(&self, a: &str, b: &str) -> usize {
        self.len(a).min(self.len(b))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
