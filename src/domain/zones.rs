//! Supply/demand zone extraction: order blocks, fair value gaps and the
//! dealing range.
//!
//! Zones are append-only snapshots except for the `mitigated` flag, which
//! flips false→true the first time price re-enters the zone and never
//! reverts. Re-analyzing a longer candle range can only add zones or mitigate
//! existing ones.

use crate::domain::candle::Candle;
use crate::domain::structure::{Direction, StructureBreak};
use crate::domain::swing::{SwingKind, SwingPoint};

/// Backward scan bound when searching for an order block candle.
pub const DEFAULT_ORDER_BLOCK_LOOKBACK: usize = 50;
/// Candles to skip after a zone's origin before mitigation checks begin.
pub const DEFAULT_MITIGATION_BUFFER: usize = 5;

const RANGE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneSource {
    OrderBlock,
    FairValueGap,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    pub kind: Direction,
    pub source: ZoneSource,
    pub top: f64,
    pub bottom: f64,
    pub origin_index: usize,
    pub mitigated: bool,
    pub mitigation_index: Option<usize>,
}

impl Zone {
    pub fn midpoint(&self) -> f64 {
        (self.top + self.bottom) / 2.0
    }

    pub fn contains(&self, price: f64) -> bool {
        price >= self.bottom && price <= self.top
    }

    /// Distance from `price` to the nearest zone edge, as a fraction of price.
    /// Zero when the price is inside the zone.
    pub fn proximity(&self, price: f64) -> f64 {
        if self.contains(price) {
            return 0.0;
        }
        let edge = if price > self.top { self.top } else { self.bottom };
        (price - edge).abs() / price.max(RANGE_EPSILON)
    }
}

/// Derive order blocks from confirmed structure breaks.
///
/// For each confirmed break the last candle with body color opposite the break
/// direction, at most `lookback` candles back, becomes the zone (its full
/// high/low). Mitigation scanning starts `buffer` candles after the origin:
/// a bullish zone is mitigated by the first candle whose low trades back into
/// it, a bearish zone by the first high that does.
pub fn detect_order_blocks(
    candles: &[Candle],
    breaks: &[StructureBreak],
    lookback: usize,
    buffer: usize,
) -> Vec<Zone> {
    let mut zones: Vec<Zone> = Vec::new();

    for brk in breaks.iter().filter(|b| b.confirmed) {
        let earliest = brk.index.saturating_sub(lookback);
        let origin = (earliest..brk.index).rev().find(|&j| match brk.direction {
            Direction::Bullish => candles[j].is_bearish(),
            Direction::Bearish => candles[j].is_bullish(),
        });

        let Some(origin_index) = origin else { continue };
        if zones
            .iter()
            .any(|z| z.origin_index == origin_index && z.kind == brk.direction)
        {
            continue;
        }

        let candle = &candles[origin_index];
        let mut zone = Zone {
            kind: brk.direction,
            source: ZoneSource::OrderBlock,
            top: candle.high,
            bottom: candle.low,
            origin_index,
            mitigated: false,
            mitigation_index: None,
        };
        scan_mitigation(&mut zone, candles, origin_index + buffer);
        zones.push(zone);
    }

    zones
}

/// Detect three-candle fair value gaps.
///
/// Interior index `i` forms a bullish gap when `candle[i+1].low >
/// candle[i-1].high` (band between the two), a bearish gap when
/// `candle[i+1].high < candle[i-1].low`. The middle candle is the origin;
/// mitigation scanning starts at `i + 2`, the first index at which the gap
/// fully exists.
pub fn detect_fair_value_gaps(candles: &[Candle]) -> Vec<Zone> {
    let mut zones = Vec::new();
    if candles.len() < 3 {
        return zones;
    }

    for i in 1..candles.len() - 1 {
        let prev = &candles[i - 1];
        let next = &candles[i + 1];

        if next.low > prev.high {
            let mut zone = Zone {
                kind: Direction::Bullish,
                source: ZoneSource::FairValueGap,
                top: next.low,
                bottom: prev.high,
                origin_index: i,
                mitigated: false,
                mitigation_index: None,
            };
            scan_mitigation(&mut zone, candles, i + 2);
            zones.push(zone);
        } else if next.high < prev.low {
            let mut zone = Zone {
                kind: Direction::Bearish,
                source: ZoneSource::FairValueGap,
                top: prev.low,
                bottom: next.high,
                origin_index: i,
                mitigated: false,
                mitigation_index: None,
            };
            scan_mitigation(&mut zone, candles, i + 2);
            zones.push(zone);
        }
    }

    zones
}

fn scan_mitigation(zone: &mut Zone, candles: &[Candle], start: usize) {
    for (j, candle) in candles.iter().enumerate().skip(start) {
        let touched = match zone.kind {
            Direction::Bullish => candle.low <= zone.top,
            Direction::Bearish => candle.high >= zone.bottom,
        };
        if touched {
            zone.mitigated = true;
            zone.mitigation_index = Some(j);
            return;
        }
    }
}

/// Band between the most recent confirmed swing high/low pair.
#[derive(Debug, Clone, PartialEq)]
pub struct DealingRange {
    pub high: f64,
    pub low: f64,
    pub equilibrium: f64,
}

/// Retracement ratios for the optional Fibonacci sub-bands.
pub const FIB_RATIOS: [f64; 5] = [0.236, 0.382, 0.5, 0.618, 0.786];

impl DealingRange {
    /// Build from the latest confirmed swing high and low. `None` until one
    /// of each exists.
    pub fn from_swings(swings: &[SwingPoint]) -> Option<Self> {
        let high = swings.iter().rev().find(|s| s.kind == SwingKind::High)?;
        let low = swings.iter().rev().find(|s| s.kind == SwingKind::Low)?;
        if high.price - low.price <= RANGE_EPSILON {
            return None;
        }
        Some(DealingRange {
            high: high.price,
            low: low.price,
            equilibrium: (high.price + low.price) / 2.0,
        })
    }

    pub fn is_premium(&self, price: f64) -> bool {
        price > self.equilibrium
    }

    pub fn is_discount(&self, price: f64) -> bool {
        price < self.equilibrium
    }

    /// Position of `price` inside the range: 0.0 at the low, 1.0 at the high.
    /// Not clamped, so values outside [0, 1] mean price left the range.
    pub fn position(&self, price: f64) -> f64 {
        (price - self.low) / (self.high - self.low)
    }

    /// Price at a retracement ratio measured down from the high.
    pub fn fib_level(&self, ratio: f64) -> f64 {
        self.high - (self.high - self.low) * ratio
    }

    pub fn fib_levels(&self) -> Vec<(f64, f64)> {
        FIB_RATIOS.iter().map(|&r| (r, self.fib_level(r))).collect()
    }
}
