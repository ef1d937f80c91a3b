//! Confirmed swing point detection.
//!
//! A swing is only usable once its right-hand window has fully printed, so
//! every [`SwingPoint`] carries `confirmed_at = index + right`: consumers that
//! scan candles chronologically must not reference a swing before that index.

use crate::domain::candle::Candle;

pub const DEFAULT_SWING_LEFT: usize = 2;
pub const DEFAULT_SWING_RIGHT: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwingKind {
    High,
    Low,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwingPoint {
    pub kind: SwingKind,
    pub price: f64,
    pub index: usize,
    pub timestamp: i64,
    /// First candle index at which this swing counts as confirmed.
    pub confirmed_at: usize,
}

/// Detect confirmed swing highs and lows, ascending by index.
///
/// Candle `i` is a swing high iff no high in `[i-left, i-1]` is `>=` it and no
/// high in `[i+1, i+right]` is `>` it. The left side is strict, the right side
/// tolerates equal highs; the asymmetry is intentional and load-bearing for
/// equal-high liquidity clusters, so it is documented rather than unified.
/// Mirrored comparisons for lows.
///
/// Fewer than `left + right + 1` candles yields an empty list, never an error.
///
/// # Panics
///
/// Panics if either window is zero (programmer error, not a data shape).
pub fn detect_swings(candles: &[Candle], left: usize, right: usize) -> Vec<SwingPoint> {
    assert!(left > 0 && right > 0, "swing windows must be positive");

    if candles.len() < left + right + 1 {
        return Vec::new();
    }

    let mut swings = Vec::new();

    for i in left..candles.len() - right {
        let c = &candles[i];

        let high_left = candles[i - left..i].iter().all(|o| o.high < c.high);
        let high_right = candles[i + 1..=i + right].iter().all(|o| o.high <= c.high);
        if high_left && high_right {
            swings.push(SwingPoint {
                kind: SwingKind::High,
                price: c.high,
                index: i,
                timestamp: c.timestamp,
                confirmed_at: i + right,
            });
        }

        let low_left = candles[i - left..i].iter().all(|o| o.low > c.low);
        let low_right = candles[i + 1..=i + right].iter().all(|o| o.low >= c.low);
        if low_left && low_right {
            swings.push(SwingPoint {
                kind: SwingKind::Low,
                price: c.low,
                index: i,
                timestamp: c.timestamp,
                confirmed_at: i + right,
            });
        }
    }

    swings
}
