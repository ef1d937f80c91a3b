//! Signal evaluation: structure + zones + bias + configuration → TradeSignal.
//!
//! Pure rule engine: same inputs always produce the same signal, so the
//! backtester and a live caller share this code path. Every accepted or
//! rejected branch appends a structured [`Reason`]; the trail is part of the
//! output contract, not a log side-effect, and the detail string must never be
//! parsed back into logic.

use serde::Serialize;

use crate::domain::alignment::AlignedBias;
use crate::domain::candle::Candle;
use crate::domain::liquidity::LiquidityLevel;
use crate::domain::structure::{Direction, Structure, StructureAnalysis};
use crate::domain::swing::SwingKind;
use crate::domain::zones::{DealingRange, Zone, ZoneSource};

/// Minimum candle window for a full evaluation.
pub const MIN_SIGNAL_CANDLES: usize = 100;

/// Stop distance floor as a fraction of price, to keep stops out of noise.
const MIN_STOP_DISTANCE_PCT: f64 = 0.002;

/// Reward:risk is capped here before the threshold check, for sizing stability.
pub const MAX_RISK_REWARD: f64 = 10.0;

/// Displacement multiple for the projected target.
const TARGET_PROJECTION: f64 = 2.0;

/// How recent a liquidity sweep must be to qualify as a turtle-soup entry.
const SWEEP_RECENCY: usize = 10;

const CONFIDENCE_ORDER_BLOCK: f64 = 0.8;
const CONFIDENCE_SWEEP_REVERSAL: f64 = 0.75;
const CONFIDENCE_FVG: f64 = 0.7;
const CONFIDENCE_HTF_MULTIPLIER: f64 = 1.1;
const CONFIDENCE_MIN: f64 = 0.2;
const CONFIDENCE_MAX: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Action {
    Buy,
    Sell,
    NoTrade,
}

/// Closed enumeration of evaluation outcomes; a human-readable detail rides
/// along but carries no control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReasonCode {
    InsufficientData,
    RangingStructure,
    HtfMisaligned,
    HtfAligned,
    WrongSideOfRange,
    EquilibriumAccepted,
    DiscountPremiumOk,
    NoEntryZone,
    SweepReversalEntry,
    ZoneEntry,
    StopPlaced,
    TargetProjected,
    RiskRewardTooLow,
    SignalAccepted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reason {
    pub code: ReasonCode,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeSignal {
    pub action: Action,
    pub price: f64,
    pub stop: f64,
    pub targets: Vec<f64>,
    pub confidence: f64,
    pub reasoning: Vec<Reason>,
}

impl TradeSignal {
    fn no_trade(reasoning: Vec<Reason>) -> Self {
        TradeSignal {
            action: Action::NoTrade,
            price: 0.0,
            stop: 0.0,
            targets: Vec::new(),
            confidence: 0.0,
            reasoning,
        }
    }
}

/// Named evaluation options; presets are just fixed instances.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalConfig {
    pub require_htf_alignment: bool,
    pub allow_equilibrium_zone: bool,
    pub require_order_block_retest: bool,
    /// Maximum distance from price to a zone edge, percent of price.
    pub order_block_proximity_percent: f64,
    pub min_risk_reward: f64,
    /// Minimum rejection wick on the sweep candle, percent of its range.
    pub cls_wick_min_percent: f64,
}

impl SignalConfig {
    pub fn strict() -> Self {
        SignalConfig {
            require_htf_alignment: true,
            allow_equilibrium_zone: false,
            require_order_block_retest: true,
            order_block_proximity_percent: 0.5,
            min_risk_reward: 3.0,
            cls_wick_min_percent: 50.0,
        }
    }

    pub fn balanced() -> Self {
        SignalConfig {
            require_htf_alignment: true,
            allow_equilibrium_zone: true,
            require_order_block_retest: false,
            order_block_proximity_percent: 1.0,
            min_risk_reward: 2.0,
            cls_wick_min_percent: 40.0,
        }
    }

    pub fn optimized() -> Self {
        SignalConfig {
            require_htf_alignment: false,
            allow_equilibrium_zone: true,
            require_order_block_retest: false,
            order_block_proximity_percent: 1.5,
            min_risk_reward: 1.5,
            cls_wick_min_percent: 30.0,
        }
    }

    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "strict" => Some(Self::strict()),
            "balanced" => Some(Self::balanced()),
            "optimized" => Some(Self::optimized()),
            _ => None,
        }
    }
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self::balanced()
    }
}

/// Everything the evaluator reads. All fields must be derived from the same
/// candle window, which never extends past the evaluation index.
#[derive(Debug)]
pub struct MarketView<'a> {
    pub candles: &'a [Candle],
    pub analysis: &'a StructureAnalysis,
    pub zones: &'a [Zone],
    pub levels: &'a [LiquidityLevel],
    pub dealing_range: Option<&'a DealingRange>,
    pub bias: Option<&'a AlignedBias>,
}

enum Entry<'a> {
    SweepReversal { sweep_extreme: f64 },
    Zone(&'a Zone),
}

pub fn evaluate(view: &MarketView, config: &SignalConfig) -> TradeSignal {
    let mut reasoning: Vec<Reason> = Vec::new();

    if view.candles.len() < MIN_SIGNAL_CANDLES {
        reasoning.push(Reason {
            code: ReasonCode::InsufficientData,
            detail: format!(
                "{} candles, need {}",
                view.candles.len(),
                MIN_SIGNAL_CANDLES
            ),
        });
        return TradeSignal::no_trade(reasoning);
    }

    let direction = match view.analysis.structure {
        Structure::Bullish => Direction::Bullish,
        Structure::Bearish => Direction::Bearish,
        Structure::Ranging => {
            reasoning.push(Reason {
                code: ReasonCode::RangingStructure,
                detail: "no confirmed break yet, structure is ranging".into(),
            });
            return TradeSignal::no_trade(reasoning);
        }
    };

    let price = view.candles[view.candles.len() - 1].close;

    let htf_aligned = view
        .bias
        .is_some_and(|b| b.aligned && structure_matches(b.trend, direction));
    if config.require_htf_alignment && !htf_aligned {
        reasoning.push(Reason {
            code: ReasonCode::HtfMisaligned,
            detail: "higher-timeframe bias absent or conflicting".into(),
        });
        return TradeSignal::no_trade(reasoning);
    }
    if htf_aligned {
        reasoning.push(Reason {
            code: ReasonCode::HtfAligned,
            detail: format!(
                "higher timeframes aligned at confidence {:.2}",
                view.bias.map(|b| b.confidence).unwrap_or(0.0)
            ),
        });
    }

    if let Some(dr) = view.dealing_range {
        let congruent = match direction {
            Direction::Bullish => dr.is_discount(price),
            Direction::Bearish => dr.is_premium(price),
        };
        if congruent {
            reasoning.push(Reason {
                code: ReasonCode::DiscountPremiumOk,
                detail: format!(
                    "price at {:.1}% of dealing range",
                    dr.position(price) * 100.0
                ),
            });
        } else {
            let pos = dr.position(price);
            let near_equilibrium = (0.382..=0.618).contains(&pos);
            if config.allow_equilibrium_zone && near_equilibrium {
                reasoning.push(Reason {
                    code: ReasonCode::EquilibriumAccepted,
                    detail: format!("price near equilibrium ({:.1}%), allowed", pos * 100.0),
                });
            } else {
                reasoning.push(Reason {
                    code: ReasonCode::WrongSideOfRange,
                    detail: match direction {
                        Direction::Bullish => "bullish entry requires discount pricing".into(),
                        Direction::Bearish => "bearish entry requires premium pricing".into(),
                    },
                });
                return TradeSignal::no_trade(reasoning);
            }
        }
    }

    let Some(entry) = find_entry(view, config, direction, price, &mut reasoning) else {
        reasoning.push(Reason {
            code: ReasonCode::NoEntryZone,
            detail: "no recent sweep reversal and no unmitigated zone in reach".into(),
        });
        return TradeSignal::no_trade(reasoning);
    };

    let (raw_stop, base_confidence) = match &entry {
        Entry::SweepReversal { sweep_extreme } => (*sweep_extreme, CONFIDENCE_SWEEP_REVERSAL),
        Entry::Zone(zone) => {
            let stop = match direction {
                Direction::Bullish => zone.bottom,
                Direction::Bearish => zone.top,
            };
            let base = match zone.source {
                ZoneSource::OrderBlock => CONFIDENCE_ORDER_BLOCK,
                ZoneSource::FairValueGap => CONFIDENCE_FVG,
            };
            (stop, base)
        }
    };

    let min_distance = price * MIN_STOP_DISTANCE_PCT;
    let stop = match direction {
        Direction::Bullish => raw_stop.min(price - min_distance),
        Direction::Bearish => raw_stop.max(price + min_distance),
    };
    reasoning.push(Reason {
        code: ReasonCode::StopPlaced,
        detail: format!("stop {:.4} ({:.2}% from entry)", stop, (price - stop).abs() / price * 100.0),
    });

    let target = project_target(view, direction, price);
    reasoning.push(Reason {
        code: ReasonCode::TargetProjected,
        detail: format!("target {:.4}", target),
    });

    let risk = (price - stop).abs();
    let reward = match direction {
        Direction::Bullish => target - price,
        Direction::Bearish => price - target,
    };
    let rr = (reward / risk).min(MAX_RISK_REWARD);
    if rr < config.min_risk_reward {
        reasoning.push(Reason {
            code: ReasonCode::RiskRewardTooLow,
            detail: format!("{:.2}:1 below minimum {:.2}:1", rr, config.min_risk_reward),
        });
        return TradeSignal::no_trade(reasoning);
    }

    let mut confidence = base_confidence;
    if htf_aligned {
        confidence *= CONFIDENCE_HTF_MULTIPLIER;
    }
    let confidence = confidence.clamp(CONFIDENCE_MIN, CONFIDENCE_MAX);

    let action = match direction {
        Direction::Bullish => Action::Buy,
        Direction::Bearish => Action::Sell,
    };
    reasoning.push(Reason {
        code: ReasonCode::SignalAccepted,
        detail: format!("{:?} at {:.4}, {:.2}:1 reward:risk", action, price, rr),
    });

    TradeSignal {
        action,
        price,
        stop,
        targets: vec![target],
        confidence,
        reasoning,
    }
}

fn structure_matches(structure: Structure, direction: Direction) -> bool {
    matches!(
        (structure, direction),
        (Structure::Bullish, Direction::Bullish) | (Structure::Bearish, Direction::Bearish)
    )
}

/// Preferred entry: a liquidity sweep with a same-candle rejection and a
/// reclaim close ("turtle soup"). Fallback: the most recent unmitigated
/// trend-matching zone within proximity of price.
fn find_entry<'a>(
    view: &'a MarketView,
    config: &SignalConfig,
    direction: Direction,
    price: f64,
    reasoning: &mut Vec<Reason>,
) -> Option<Entry<'a>> {
    let len = view.candles.len();
    let sweep_kind = match direction {
        Direction::Bullish => SwingKind::Low,
        Direction::Bearish => SwingKind::High,
    };

    let recent_sweeps = view.levels.iter().filter_map(|l| {
        if !l.is_active() || l.kind != sweep_kind || !l.swept {
            return None;
        }
        l.swept_index
            .filter(|&i| i + SWEEP_RECENCY >= len)
            .map(|i| (l, i))
    });

    for (level, sweep_index) in recent_sweeps {
        let sweep_candle = &view.candles[sweep_index];
        let range = sweep_candle.range();
        if range <= f64::EPSILON {
            continue;
        }
        let (reclaimed, wick_pct, extreme) = match direction {
            Direction::Bullish => (
                price > level.price,
                sweep_candle.lower_wick() / range * 100.0,
                sweep_candle.low,
            ),
            Direction::Bearish => (
                price < level.price,
                sweep_candle.upper_wick() / range * 100.0,
                sweep_candle.high,
            ),
        };
        if reclaimed && wick_pct >= config.cls_wick_min_percent {
            reasoning.push(Reason {
                code: ReasonCode::SweepReversalEntry,
                detail: format!(
                    "liquidity at {:.4} swept and reclaimed, {:.0}% rejection wick",
                    level.price, wick_pct
                ),
            });
            return Some(Entry::SweepReversal {
                sweep_extreme: extreme,
            });
        }
    }

    let proximity_limit = config.order_block_proximity_percent / 100.0;
    let zone = view
        .zones
        .iter()
        .filter(|z| z.kind == direction && !z.mitigated)
        .filter(|z| {
            if config.require_order_block_retest {
                z.contains(price)
            } else {
                z.proximity(price) <= proximity_limit
            }
        })
        .max_by_key(|z| z.origin_index)?;

    reasoning.push(Reason {
        code: ReasonCode::ZoneEntry,
        detail: format!(
            "{} zone {:.4}–{:.4} from candle {}",
            match zone.source {
                ZoneSource::OrderBlock => "order block",
                ZoneSource::FairValueGap => "fair value gap",
            },
            zone.bottom,
            zone.top,
            zone.origin_index
        ),
    });
    Some(Entry::Zone(zone))
}

/// Target from a 2.0× projection of the latest confirmed break's displacement
/// (broken level to the opposite active extreme at break time); structural
/// extreme fallback when no displacement can be measured.
fn project_target(view: &MarketView, direction: Direction, price: f64) -> f64 {
    let displacement = view.analysis.last_confirmed_break().and_then(|brk| {
        let opposite = match brk.direction {
            Direction::Bullish => SwingKind::Low,
            Direction::Bearish => SwingKind::High,
        };
        view.analysis
            .swings
            .iter()
            .filter(|s| s.kind == opposite && s.confirmed_at < brk.index)
            .next_back()
            .map(|s| (brk.price - s.price).abs())
    });

    if let Some(distance) = displacement {
        if distance > f64::EPSILON {
            return match direction {
                Direction::Bullish => price + TARGET_PROJECTION * distance,
                Direction::Bearish => price - TARGET_PROJECTION * distance,
            };
        }
    }

    match direction {
        Direction::Bullish => view
            .analysis
            .swings
            .iter()
            .filter(|s| s.kind == SwingKind::High)
            .map(|s| s.price)
            .fold(price, f64::max),
        Direction::Bearish => view
            .analysis
            .swings
            .iter()
            .filter(|s| s.kind == SwingKind::Low)
            .map(|s| s.price)
            .fold(price, f64::min),
    }
}
