//! Position and per-token PnL state

/// Open position in a single token
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    /// Quantity held
    pub qty: f64,
    /// Volume-weighted average entry price
    pub cost: f64,
}

impl Position {
    pub fn new(qty: f64, cost: f64) -> Self {
        Self { qty, cost }
    }

    /// Notional value at `mark`
    pub fn notional(&self, mark: f64) -> f64 {
        self.qty * mark
    }

    /// Unrealized PnL at `mark`
    pub fn unrealized(&self, mark: f64) -> f64 {
        (mark - self.cost) * self.qty
    }
}

/// Realized / unrealized PnL for one token
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PnlState {
    pub realized: f64,
    pub unrealized: f64,
}

impl PnlState {
    pub fn total(&self) -> f64 {
        self.realized + self.unrealized
    }
}
