use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Realized PnL and trade count for the current UTC day
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyLedger {
    pub day: NaiveDate,
    pub realized_pnl: f64,
    pub trades: u32,
}

impl DailyLedger {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            day: now.date_naive(),
            realized_pnl: 0.0,
            trades: 0,
        }
    }

    /// Start a fresh day if the date moved on
    fn roll(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if today != self.day {
            tracing::info!(
                previous_day = %self.day,
                realized_pnl = self.realized_pnl,
                trades = self.trades,
                "Daily ledger reset"
            );
            *self = Self::new(now);
        }
    }

    pub fn record_pnl(&mut self, pnl: f64, now: DateTime<Utc>) {
        self.roll(now);
        if pnl.is_finite() {
            self.realized_pnl += pnl;
        }
    }

    pub fn record_trade(&mut self, now: DateTime<Utc>) {
        self.roll(now);
        self.trades += 1;
    }

    pub fn daily_pnl(&mut self, now: DateTime<Utc>) -> f64 {
        self.roll(now);
        self.realized_pnl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_accumulates_within_day() {
        let now = Utc::now();
        let mut ledger = DailyLedger::new(now);

        ledger.record_pnl(-30.0, now);
        ledger.record_pnl(10.0, now);
        ledger.record_trade(now);

        assert_eq!(ledger.daily_pnl(now), -20.0);
        assert_eq!(ledger.trades, 1);
    }

    #[test]
    fn test_resets_on_new_day() {
        let now = Utc::now();
        let mut ledger = DailyLedger::new(now);
        ledger.record_pnl(-500.0, now);

        let tomorrow = now + Duration::days(1);
        assert_eq!(ledger.daily_pnl(tomorrow), 0.0);
        assert_eq!(ledger.day, tomorrow.date_naive());
    }
}
