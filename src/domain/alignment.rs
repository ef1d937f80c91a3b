//! Multi-timeframe alignment.
//!
//! Runs the structure pipeline independently per timeframe and combines the
//! results into one bias with a confidence score. The cache only bounds
//! recomputation; nothing downstream depends on it for correctness.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::domain::candle::Candle;
use crate::domain::liquidity::{detect_liquidity_levels, nearest_active_level, DEFAULT_CLUSTER_TOLERANCE};
use crate::domain::structure::{classify_breaks, Structure};
use crate::domain::swing::{detect_swings, SwingKind, DEFAULT_SWING_LEFT, DEFAULT_SWING_RIGHT};

/// Close-to-close moves sampled for the strength score.
const STRENGTH_WINDOW: usize = 20;

/// Minimum strength for the single-timeframe fallback.
pub const DEFAULT_FALLBACK_STRENGTH: f64 = 60.0;

/// One timeframe's verdict: prevailing structure, how much of the recent tape
/// agrees with it (0–100), and the nearest resting-liquidity target in the
/// trend direction.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeframeAssessment {
    pub trend: Structure,
    pub strength: f64,
    pub nearest_liquidity: Option<f64>,
}

/// Combined higher/lower timeframe bias.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignedBias {
    pub trend: Structure,
    pub aligned: bool,
    pub confidence: f64,
}

impl AlignedBias {
    pub fn unaligned() -> Self {
        AlignedBias {
            trend: Structure::Ranging,
            aligned: false,
            confidence: 0.0,
        }
    }
}

/// Assess one timeframe's candle series.
pub fn assess_timeframe(candles: &[Candle]) -> TimeframeAssessment {
    let swings = detect_swings(candles, DEFAULT_SWING_LEFT, DEFAULT_SWING_RIGHT);
    let analysis = classify_breaks(candles, &swings);

    let strength = match analysis.structure {
        Structure::Ranging => 0.0,
        Structure::Bullish => directional_strength(candles, true),
        Structure::Bearish => directional_strength(candles, false),
    };

    let nearest_liquidity = candles.last().and_then(|last| {
        let levels = detect_liquidity_levels(candles, &swings, DEFAULT_CLUSTER_TOLERANCE);
        let kind = match analysis.structure {
            Structure::Bullish => SwingKind::High,
            Structure::Bearish => SwingKind::Low,
            Structure::Ranging => return None,
        };
        nearest_active_level(&levels, last.close, kind).map(|l| l.price)
    });

    TimeframeAssessment {
        trend: analysis.structure,
        strength,
        nearest_liquidity,
    }
}

/// Fraction of recent close-to-close moves agreeing with the trend, 0–100.
fn directional_strength(candles: &[Candle], bullish: bool) -> f64 {
    if candles.len() < 2 {
        return 0.0;
    }
    let start = candles.len().saturating_sub(STRENGTH_WINDOW + 1);
    let window = &candles[start..];
    let moves = window.len() - 1;
    let agreeing = window
        .windows(2)
        .filter(|w| {
            if bullish {
                w[1].close > w[0].close
            } else {
                w[1].close < w[0].close
            }
        })
        .count();
    agreeing as f64 / moves as f64 * 100.0
}

/// Combine two timeframe assessments (higher first) into a bias.
///
/// Both agreeing on a non-ranging trend: aligned, confidence is the mean of
/// the strengths mapped to [0, 1]. Only one non-ranging with strength above
/// `fallback_strength`: fall back to it with a penalized confidence of
/// strength/150. Anything else: unaligned, confidence 0.
pub fn align_with_threshold(
    higher: &TimeframeAssessment,
    lower: &TimeframeAssessment,
    fallback_strength: f64,
) -> AlignedBias {
    let higher_trending = higher.trend != Structure::Ranging;
    let lower_trending = lower.trend != Structure::Ranging;

    if higher_trending && lower_trending && higher.trend == lower.trend {
        return AlignedBias {
            trend: higher.trend,
            aligned: true,
            confidence: (higher.strength + lower.strength) / 2.0 / 100.0,
        };
    }

    let solo = match (higher_trending, lower_trending) {
        (true, false) => Some(higher),
        (false, true) => Some(lower),
        _ => None,
    };
    if let Some(tf) = solo {
        if tf.strength > fallback_strength {
            return AlignedBias {
                trend: tf.trend,
                aligned: false,
                confidence: tf.strength / 150.0,
            };
        }
    }

    AlignedBias::unaligned()
}

pub fn align(higher: &TimeframeAssessment, lower: &TimeframeAssessment) -> AlignedBias {
    align_with_threshold(higher, lower, DEFAULT_FALLBACK_STRENGTH)
}

/// Per-instrument bias cache with a short time-to-live.
#[derive(Debug)]
pub struct AlignmentCache {
    ttl: Duration,
    entries: HashMap<String, (Instant, AlignedBias)>,
}

impl AlignmentCache {
    pub fn new(ttl: Duration) -> Self {
        AlignmentCache {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, instrument: &str) -> Option<AlignedBias> {
        self.entries
            .get(instrument)
            .filter(|(at, _)| at.elapsed() <= self.ttl)
            .map(|(_, bias)| *bias)
    }

    pub fn insert(&mut self, instrument: &str, bias: AlignedBias) {
        self.entries
            .insert(instrument.to_string(), (Instant::now(), bias));
    }

    pub fn get_or_compute(
        &mut self,
        instrument: &str,
        compute: impl FnOnce() -> AlignedBias,
    ) -> AlignedBias {
        if let Some(bias) = self.get(instrument) {
            return bias;
        }
        let bias = compute();
        self.insert(instrument, bias);
        bias
    }
}
