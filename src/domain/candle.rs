//! OHLCV candle representation.

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

/// One aggregated OHLCV interval. Timestamps are epoch milliseconds and a
/// series is always ordered by strictly increasing timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// Absolute size of the candle body.
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    /// Full high-to-low range.
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Wick below the body (buying rejection).
    pub fn lower_wick(&self) -> f64 {
        self.open.min(self.close) - self.low
    }

    /// Wick above the body (selling rejection).
    pub fn upper_wick(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }

    pub fn datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.timestamp)
            .single()
            .unwrap_or_default()
    }
}

/// Candle aggregation interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Timeframe {
    M15,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }

    pub fn duration_ms(&self) -> i64 {
        match self {
            Timeframe::M15 => 15 * 60 * 1000,
            Timeframe::H1 => 60 * 60 * 1000,
            Timeframe::H4 => 4 * 60 * 60 * 1000,
            Timeframe::D1 => 24 * 60 * 60 * 1000,
        }
    }

    /// Annualization constant for Sharpe: intervals per year on a 365-day
    /// crypto calendar. Deliberately explicit rather than baked into the
    /// metrics math.
    pub fn periods_per_year(&self) -> f64 {
        match self {
            Timeframe::M15 => 96.0 * 365.0,
            Timeframe::H1 => 24.0 * 365.0,
            Timeframe::H4 => 6.0 * 365.0,
            Timeframe::D1 => 365.0,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "15m" | "m15" => Some(Timeframe::M15),
            "1h" | "h1" => Some(Timeframe::H1),
            "4h" | "h4" => Some(Timeframe::H4),
            "1d" | "d1" => Some(Timeframe::D1),
            _ => None,
        }
    }
}
