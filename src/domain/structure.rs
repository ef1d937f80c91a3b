//! Structure break classification: BOS, CHOCH and liquidity sweeps.
//!
//! Walks the candle series chronologically against the confirmed swing list,
//! keeping one monotonic cursor per swing side. The active high/low is the
//! most recently *confirmed* swing (not the running extreme), and a swing is
//! never consulted before its `confirmed_at` index — the classifier cannot
//! look ahead.
//!
//! Known limitation: the trend variable is seeded Bullish before any break has
//! been classified, which biases the very first emitted break. Downstream
//! consumers that care should wait for a confirmed break before trusting the
//! trend.

use crate::domain::candle::Candle;
use crate::domain::swing::{SwingKind, SwingPoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Bullish,
    Bearish,
}

impl Direction {
    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Bullish => Direction::Bearish,
            Direction::Bearish => Direction::Bullish,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakKind {
    /// Continuation: close beyond the active extreme in the trend direction.
    Bos,
    /// Reversal: close beyond the opposite active extreme.
    Choch,
    /// Wick-only breach without a confirming close. No structural effect.
    Sweep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Structure {
    Bullish,
    Bearish,
    Ranging,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructureBreak {
    pub kind: BreakKind,
    pub direction: Direction,
    pub index: usize,
    /// The swing level that was breached.
    pub price: f64,
    pub timestamp: i64,
    pub confirmed: bool,
}

/// Full classifier output for one candle series.
#[derive(Debug, Clone)]
pub struct StructureAnalysis {
    pub breaks: Vec<StructureBreak>,
    pub structure: Structure,
    pub trend: Direction,
    pub swings: Vec<SwingPoint>,
}

impl StructureAnalysis {
    pub fn last_confirmed_break(&self) -> Option<&StructureBreak> {
        self.breaks.iter().rev().find(|b| b.confirmed)
    }
}

/// Classify BOS/CHOCH/SWEEP events over `candles` given its confirmed swings.
///
/// Within a single candle the high side is checked before the low side; an
/// extreme candle can therefore emit one event per side, in that order.
pub fn classify_breaks(candles: &[Candle], swings: &[SwingPoint]) -> StructureAnalysis {
    let highs: Vec<&SwingPoint> = swings.iter().filter(|s| s.kind == SwingKind::High).collect();
    let lows: Vec<&SwingPoint> = swings.iter().filter(|s| s.kind == SwingKind::Low).collect();

    let mut breaks: Vec<StructureBreak> = Vec::new();
    let mut trend = Direction::Bullish;

    let mut high_cursor = 0usize;
    let mut low_cursor = 0usize;
    let mut active_high: Option<&SwingPoint> = None;
    let mut active_low: Option<&SwingPoint> = None;

    for (i, candle) in candles.iter().enumerate() {
        while high_cursor < highs.len() && highs[high_cursor].confirmed_at < i {
            active_high = Some(highs[high_cursor]);
            high_cursor += 1;
        }
        while low_cursor < lows.len() && lows[low_cursor].confirmed_at < i {
            active_low = Some(lows[low_cursor]);
            low_cursor += 1;
        }

        if let Some(swing) = active_high {
            if candle.close > swing.price {
                let kind = if trend == Direction::Bullish {
                    BreakKind::Bos
                } else {
                    BreakKind::Choch
                };
                breaks.push(StructureBreak {
                    kind,
                    direction: Direction::Bullish,
                    index: i,
                    price: swing.price,
                    timestamp: candle.timestamp,
                    confirmed: true,
                });
                trend = Direction::Bullish;
                active_high = None;
            } else if candle.high > swing.price {
                breaks.push(StructureBreak {
                    kind: BreakKind::Sweep,
                    direction: Direction::Bullish,
                    index: i,
                    price: swing.price,
                    timestamp: candle.timestamp,
                    confirmed: false,
                });
            }
        }

        if let Some(swing) = active_low {
            if candle.close < swing.price {
                let kind = if trend == Direction::Bearish {
                    BreakKind::Bos
                } else {
                    BreakKind::Choch
                };
                breaks.push(StructureBreak {
                    kind,
                    direction: Direction::Bearish,
                    index: i,
                    price: swing.price,
                    timestamp: candle.timestamp,
                    confirmed: true,
                });
                trend = Direction::Bearish;
                active_low = None;
            } else if candle.low < swing.price {
                breaks.push(StructureBreak {
                    kind: BreakKind::Sweep,
                    direction: Direction::Bearish,
                    index: i,
                    price: swing.price,
                    timestamp: candle.timestamp,
                    confirmed: false,
                });
            }
        }
    }

    let structure = breaks
        .iter()
        .rev()
        .find(|b| b.confirmed)
        .map(|b| match b.direction {
            Direction::Bullish => Structure::Bullish,
            Direction::Bearish => Structure::Bearish,
        })
        .unwrap_or(Structure::Ranging);

    StructureAnalysis {
        breaks,
        structure,
        trend,
        swings: swings.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::swing::detect_swings;

    fn make_candle(index: usize, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            timestamp: index as i64 * 60_000,
            open,
            high,
            low,
            close,
            volume: 1_000.0,
        }
    }

    /// Strictly increasing closes (open_i < close_i < open_{i+1}) with
    /// periodic high spikes tall enough to print confirmed swing highs that
    /// the rising closes later break.
    fn rising_candles(count: usize) -> Vec<Candle> {
        (0..count)
            .map(|i| {
                let open = 100.0 + i as f64;
                let close = open + 0.6;
                let spike = if i % 7 == 3 { 2.5 } else { 0.05 };
                make_candle(i, open, close + spike, open - 0.05, close)
            })
            .collect()
    }

    #[test]
    fn rising_market_is_bullish_with_bos_and_no_sweeps() {
        let candles = rising_candles(60);
        let swings = detect_swings(&candles, 2, 2);
        let analysis = classify_breaks(&candles, &swings);

        assert_eq!(analysis.structure, Structure::Bullish);
        assert!(
            analysis
                .breaks
                .iter()
                .any(|b| b.kind == BreakKind::Bos && b.direction == Direction::Bullish)
        );
        assert!(analysis.breaks.iter().all(|b| b.kind != BreakKind::Sweep));
    }

    #[test]
    fn no_swings_means_ranging() {
        let candles = rising_candles(3);
        let analysis = classify_breaks(&candles, &[]);
        assert_eq!(analysis.structure, Structure::Ranging);
        assert!(analysis.breaks.is_empty());
    }

    #[test]
    fn wick_breach_without_close_is_a_sweep() {
        // A confirmed swing high at 110, then a candle that wicks above but
        // closes back below.
        let mut candles = vec![
            make_candle(0, 100.0, 101.0, 99.0, 100.5),
            make_candle(1, 100.5, 102.0, 100.0, 101.0),
            make_candle(2, 101.0, 110.0, 100.5, 105.0),
            make_candle(3, 105.0, 106.0, 103.0, 104.0),
            make_candle(4, 104.0, 105.0, 102.0, 103.0),
        ];
        candles.push(make_candle(5, 103.0, 111.0, 102.5, 104.5));
        let swings = detect_swings(&candles, 2, 2);
        let analysis = classify_breaks(&candles, &swings);

        let sweeps: Vec<_> = analysis
            .breaks
            .iter()
            .filter(|b| b.kind == BreakKind::Sweep)
            .collect();
        assert_eq!(sweeps.len(), 1);
        assert_eq!(sweeps[0].direction, Direction::Bullish);
        assert_eq!(sweeps[0].index, 5);
        assert!(!sweeps[0].confirmed);
        // A sweep alone never sets structure.
        assert_eq!(analysis.structure, Structure::Ranging);
    }

    #[test]
    fn close_below_swing_low_flips_trend_to_bearish() {
        // Build a swing low around 100 then close decisively below it.
        let candles = vec![
            make_candle(0, 103.0, 104.0, 102.0, 103.5),
            make_candle(1, 103.5, 104.5, 101.0, 102.0),
            make_candle(2, 102.0, 103.0, 100.0, 101.0),
            make_candle(3, 101.0, 103.5, 101.0, 103.0),
            make_candle(4, 103.0, 104.0, 102.0, 103.5),
            make_candle(5, 103.5, 104.0, 101.5, 102.0),
            make_candle(6, 102.0, 102.5, 99.0, 99.2),
        ];
        let swings = detect_swings(&candles, 2, 2);
        assert!(swings.iter().any(|s| s.kind == SwingKind::Low));

        let analysis = classify_breaks(&candles, &swings);
        let choch = analysis
            .breaks
            .iter()
            .find(|b| b.kind == BreakKind::Choch)
            .expect("expected a change of character");
        assert_eq!(choch.direction, Direction::Bearish);
        assert_eq!(analysis.trend, Direction::Bearish);
        assert_eq!(analysis.structure, Structure::Bearish);
    }

    #[test]
    fn breaks_never_reference_unconfirmed_swings() {
        let candles = rising_candles(60);
        let swings = detect_swings(&candles, 2, 2);
        let analysis = classify_breaks(&candles, &swings);

        for brk in &analysis.breaks {
            let swing = swings
                .iter()
                .find(|s| (s.price - brk.price).abs() < f64::EPSILON)
                .expect("break must reference a known swing level");
            assert!(
                swing.confirmed_at < brk.index,
                "swing confirmed at {} used by break at {}",
                swing.confirmed_at,
                brk.index
            );
        }
    }

    #[test]
    fn breaks_are_index_ordered() {
        let candles = rising_candles(80);
        let swings = detect_swings(&candles, 2, 2);
        let analysis = classify_breaks(&candles, &swings);
        assert!(analysis.breaks.windows(2).all(|w| w[0].index <= w[1].index));
    }
}
