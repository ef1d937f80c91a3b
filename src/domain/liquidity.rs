//! Liquidity level clustering.
//!
//! Swing points of the same kind within a relative tolerance merge into one
//! running-average level. A level is only "active" (presumed to hold resting
//! orders) once it has at least two touches; it is marked swept when a later
//! candle wicks through it.

use crate::domain::candle::Candle;
use crate::domain::swing::{SwingKind, SwingPoint};

/// Relative price tolerance for merging swing touches (0.2%).
pub const DEFAULT_CLUSTER_TOLERANCE: f64 = 0.002;

/// Touches required before a level counts as active.
pub const MIN_TOUCHES: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct LiquidityLevel {
    /// Running average of the merged swing prices.
    pub price: f64,
    pub kind: SwingKind,
    pub touch_count: usize,
    pub touch_indices: Vec<usize>,
    pub swept: bool,
    /// Candle index of the sweep, when one happened.
    pub swept_index: Option<usize>,
}

impl LiquidityLevel {
    pub fn is_active(&self) -> bool {
        self.touch_count >= MIN_TOUCHES
    }

    fn merge(&mut self, swing: &SwingPoint) {
        let n = self.touch_count as f64;
        self.price = (self.price * n + swing.price) / (n + 1.0);
        self.touch_count += 1;
        self.touch_indices.push(swing.index);
    }

    fn matches(&self, swing: &SwingPoint, tolerance: f64) -> bool {
        self.kind == swing.kind && (swing.price - self.price).abs() / self.price <= tolerance
    }
}

/// Cluster swings into levels and mark sweeps.
///
/// Sweep scanning starts after a level's last touch: a high-side level is
/// swept by the first later candle whose high exceeds it, a low-side level by
/// the first lower low.
pub fn detect_liquidity_levels(
    candles: &[Candle],
    swings: &[SwingPoint],
    tolerance: f64,
) -> Vec<LiquidityLevel> {
    let mut levels: Vec<LiquidityLevel> = Vec::new();

    for swing in swings {
        match levels.iter_mut().find(|l| l.matches(swing, tolerance)) {
            Some(level) => level.merge(swing),
            None => levels.push(LiquidityLevel {
                price: swing.price,
                kind: swing.kind,
                touch_count: 1,
                touch_indices: vec![swing.index],
                swept: false,
                swept_index: None,
            }),
        }
    }

    for level in &mut levels {
        let last_touch = level.touch_indices.last().copied().unwrap_or(0);
        for (j, candle) in candles.iter().enumerate().skip(last_touch + 1) {
            let breached = match level.kind {
                SwingKind::High => candle.high > level.price,
                SwingKind::Low => candle.low < level.price,
            };
            if breached {
                level.swept = true;
                level.swept_index = Some(j);
                break;
            }
        }
    }

    levels
}

/// The nearest active level in the given direction from `price`: above for
/// high-side liquidity, below for low-side. Swept levels are skipped.
pub fn nearest_active_level<'a>(
    levels: &'a [LiquidityLevel],
    price: f64,
    kind: SwingKind,
) -> Option<&'a LiquidityLevel> {
    levels
        .iter()
        .filter(|l| l.is_active() && !l.swept && l.kind == kind)
        .filter(|l| match kind {
            SwingKind::High => l.price > price,
            SwingKind::Low => l.price < price,
        })
        .min_by(|a, b| {
            let da = (a.price - price).abs();
            let db = (b.price - price).abs();
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
}
