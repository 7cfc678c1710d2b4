use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Market stress scenarios
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StressScenario {
    /// -30% over the run with ±1% noise per tick
    Crash,
    /// +50% rally with ±2% noise
    Pump,
    /// Flat with ±0.5% noise
    Chop,
}

impl StressScenario {
    pub const ALL: [StressScenario; 3] = [
        StressScenario::Crash,
        StressScenario::Pump,
        StressScenario::Chop,
    ];

    /// Total price change from first to last tick, before noise
    pub fn target_change(self) -> f64 {
        match self {
            StressScenario::Crash => -0.30,
            StressScenario::Pump => 0.50,
            StressScenario::Chop => 0.0,
        }
    }

    /// Per-tick noise amplitude as a fraction of price
    pub fn volatility(self) -> f64 {
        match self {
            StressScenario::Crash => 0.01,
            StressScenario::Pump => 0.02,
            StressScenario::Chop => 0.005,
        }
    }
}

impl fmt::Display for StressScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StressScenario::Crash => write!(f, "crash"),
            StressScenario::Pump => write!(f, "pump"),
            StressScenario::Chop => write!(f, "chop"),
        }
    }
}

impl FromStr for StressScenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "crash" => Ok(StressScenario::Crash),
            "pump" => Ok(StressScenario::Pump),
            "chop" => Ok(StressScenario::Chop),
            other => Err(format!("unknown scenario: {}", other)),
        }
    }
}

/// Seeded price path generator
pub struct SyntheticPriceGenerator {
    rng: StdRng,
    base_price: f64,
}

impl SyntheticPriceGenerator {
    /// Create a new generator with a seed for reproducibility
    pub fn new(seed: u64, base_price: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            base_price,
        }
    }

    /// Price path for a scenario
    ///
    /// # Arguments
    /// * `scenario` - The stress scenario to simulate
    /// * `ticks` - Number of prices to produce
    ///
    /// # Returns
    /// Linear drift toward the scenario target plus uniform noise
    pub fn generate(&mut self, scenario: StressScenario, ticks: usize) -> Vec<f64> {
        let mut prices = Vec::with_capacity(ticks);
        if ticks == 0 {
            return prices;
        }

        let start = self.base_price;
        let target = start * (1.0 + scenario.target_change());
        let step = (target - start) / ticks as f64;
        let volatility = scenario.volatility();
        let floor = start * 0.01;

        let mut price = start;
        for _ in 0..ticks {
            let noise = price * self.rng.gen_range(-volatility..=volatility);
            price = (price + step + noise).max(floor);
            prices.push(price);
        }

        prices
    }
}
