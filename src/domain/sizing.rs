//! Position sizing and the pre-trade risk gate.
//!
//! The base recommendation is fixed-fractional: risk a configured percent of
//! balance against the entry-to-stop distance, capped by leverage. On top of
//! it, five heuristics are blended with fixed weights into an "intelligent"
//! risk fraction. The gate is independent: it can block a trade the sizer
//! would happily size, and it always reports the failing rules by name.

use serde::Serialize;

/// Hard ceiling on risk per trade, percent of balance.
pub const MAX_RISK_CEILING_PCT: f64 = 5.0;

const STOP_DISTANCE_EPSILON: f64 = 1e-9;

const WEIGHT_FIXED: f64 = 0.20;
const WEIGHT_KELLY: f64 = 0.20;
const WEIGHT_VOLATILITY: f64 = 0.20;
const WEIGHT_CONFIDENCE: f64 = 0.25;
const WEIGHT_MOMENTUM: f64 = 0.15;

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum SizingError {
    #[error("missing sizing input: {0}")]
    MissingInput(&'static str),

    #[error("account balance must be positive, got {0}")]
    NonPositiveBalance(f64),
}

/// Discrete setup quality grade with a fixed multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TradeGrade {
    A,
    B,
    C,
}

impl TradeGrade {
    fn multiplier(&self) -> f64 {
        match self {
            TradeGrade::A => 1.2,
            TradeGrade::B => 1.0,
            TradeGrade::C => 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SizingConfig {
    /// Risk per trade, percent of balance.
    pub risk_percent: f64,
    /// Maximum notional as a multiple of balance.
    pub max_leverage: f64,
    pub max_open_positions: usize,
    pub max_consecutive_losses: usize,
    /// Daily / monthly loss caps, percent of balance.
    pub daily_loss_cap_percent: f64,
    pub monthly_loss_cap_percent: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        SizingConfig {
            risk_percent: 2.0,
            max_leverage: 3.0,
            max_open_positions: 3,
            max_consecutive_losses: 4,
            daily_loss_cap_percent: 6.0,
            monthly_loss_cap_percent: 15.0,
        }
    }
}

/// Rolling account numbers the sizer and gate read. Losses are positive
/// amounts already realized in the current day/month.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountState {
    pub balance: f64,
    pub daily_loss: f64,
    pub monthly_loss: f64,
    pub open_positions: usize,
    pub consecutive_losses: usize,
    /// Historical win rate in [0, 1], for the Kelly heuristic.
    pub win_rate: f64,
    /// Historical average win / average loss.
    pub payoff_ratio: f64,
}

impl AccountState {
    pub fn new(balance: f64) -> Self {
        AccountState {
            balance,
            daily_loss: 0.0,
            monthly_loss: 0.0,
            open_positions: 0,
            consecutive_losses: 0,
            win_rate: 0.5,
            payoff_ratio: 1.5,
        }
    }
}

/// Inputs for one sizing call. Entry and stop are optional so a malformed
/// upstream signal surfaces as a tagged error instead of a bad quantity.
#[derive(Debug, Clone, PartialEq)]
pub struct SizeRequest {
    pub entry: Option<f64>,
    pub stop: Option<f64>,
    pub confidence: f64,
    pub grade: TradeGrade,
    /// Latest ATR as a fraction of price, and its average.
    pub atr_ratio: f64,
    pub avg_atr_ratio: f64,
    /// Recent percent move in the trade direction.
    pub momentum_percent: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SizeRecommendation {
    pub quantity: f64,
    pub risk_amount: f64,
    /// Risk as percent of balance actually applied.
    pub risk_percent: f64,
    pub leverage_capped: bool,
}

/// Named pre-trade gate rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error, Serialize)]
pub enum GateViolation {
    #[error("daily loss cap would be breached")]
    DailyLossCap,
    #[error("monthly loss cap would be breached")]
    MonthlyLossCap,
    #[error("maximum open positions reached")]
    MaxOpenPositions,
    #[error("consecutive loss streak limit reached")]
    ConsecutiveLossStreak,
    #[error("risk exceeds hard ceiling")]
    RiskCeiling,
}

/// Fixed-fractional quantity: `balance × risk% / |entry − stop|`, capped so
/// notional never exceeds `balance × max_leverage`. A zero stop distance is
/// substituted with an epsilon rather than dividing by zero.
pub fn recommend_quantity(
    account: &AccountState,
    request: &SizeRequest,
    config: &SizingConfig,
) -> Result<SizeRecommendation, SizingError> {
    size_with_risk_percent(account, request, config, config.risk_percent)
}

/// Blend of the five sizing heuristics into one risk fraction, then the same
/// quantity/leverage math as [`recommend_quantity`].
pub fn recommend_intelligent(
    account: &AccountState,
    request: &SizeRequest,
    config: &SizingConfig,
) -> Result<SizeRecommendation, SizingError> {
    let risk_percent = blended_risk_percent(account, request, config);
    size_with_risk_percent(account, request, config, risk_percent)
}

fn size_with_risk_percent(
    account: &AccountState,
    request: &SizeRequest,
    config: &SizingConfig,
    risk_percent: f64,
) -> Result<SizeRecommendation, SizingError> {
    let entry = request
        .entry
        .filter(|e| e.is_finite() && *e > 0.0)
        .ok_or(SizingError::MissingInput("entry price"))?;
    let stop = request
        .stop
        .filter(|s| s.is_finite() && *s > 0.0)
        .ok_or(SizingError::MissingInput("stop price"))?;
    if account.balance <= 0.0 {
        return Err(SizingError::NonPositiveBalance(account.balance));
    }

    let risk_amount = account.balance * risk_percent / 100.0;
    let distance = (entry - stop).abs().max(STOP_DISTANCE_EPSILON);
    let mut quantity = risk_amount / distance;

    let max_notional = account.balance * config.max_leverage;
    let mut leverage_capped = false;
    if quantity * entry > max_notional {
        quantity = max_notional / entry;
        leverage_capped = true;
    }

    Ok(SizeRecommendation {
        quantity,
        risk_amount: quantity * distance,
        risk_percent,
        leverage_capped,
    })
}

/// The five heuristics, each producing a risk percent, combined with fixed
/// weights.
pub fn blended_risk_percent(
    account: &AccountState,
    request: &SizeRequest,
    config: &SizingConfig,
) -> f64 {
    let fixed = config.risk_percent;

    let kelly = half_kelly_percent(account.win_rate, account.payoff_ratio)
        .min(config.risk_percent);

    let volatility = {
        let ratio = if request.atr_ratio > STOP_DISTANCE_EPSILON {
            request.avg_atr_ratio / request.atr_ratio
        } else {
            1.0
        };
        config.risk_percent * ratio.clamp(0.5, 1.5)
    };

    let confidence =
        config.risk_percent * request.grade.multiplier() * request.confidence.clamp(0.0, 1.0);

    let momentum = config.risk_percent * momentum_multiplier(request.momentum_percent);

    WEIGHT_FIXED * fixed
        + WEIGHT_KELLY * kelly
        + WEIGHT_VOLATILITY * volatility
        + WEIGHT_CONFIDENCE * confidence
        + WEIGHT_MOMENTUM * momentum
}

/// Half-Kelly as a percent, floored at zero for negative-edge inputs.
fn half_kelly_percent(win_rate: f64, payoff_ratio: f64) -> f64 {
    if payoff_ratio <= 0.0 {
        return 0.0;
    }
    let kelly = win_rate - (1.0 - win_rate) / payoff_ratio;
    (kelly / 2.0).max(0.0) * 100.0
}

fn momentum_multiplier(momentum_percent: f64) -> f64 {
    let m = momentum_percent.abs();
    if m >= 5.0 {
        1.2
    } else if m >= 2.0 {
        1.0
    } else {
        0.8
    }
}

/// Independent pre-trade gate. Empty result means the trade may open.
pub fn check_gate(
    account: &AccountState,
    risk_amount: f64,
    config: &SizingConfig,
) -> Vec<GateViolation> {
    let mut violations = Vec::new();

    let daily_cap = account.balance * config.daily_loss_cap_percent / 100.0;
    if account.daily_loss + risk_amount > daily_cap {
        violations.push(GateViolation::DailyLossCap);
    }

    let monthly_cap = account.balance * config.monthly_loss_cap_percent / 100.0;
    if account.monthly_loss + risk_amount > monthly_cap {
        violations.push(GateViolation::MonthlyLossCap);
    }

    if account.open_positions >= config.max_open_positions {
        violations.push(GateViolation::MaxOpenPositions);
    }

    if account.consecutive_losses >= config.max_consecutive_losses {
        violations.push(GateViolation::ConsecutiveLossStreak);
    }

    if risk_amount > account.balance * MAX_RISK_CEILING_PCT / 100.0 {
        violations.push(GateViolation::RiskCeiling);
    }

    violations
}


#[cfg(test)]
mod sizing_properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn notional_never_exceeds_leverage(
            balance in 100.0f64..1_000_000.0,
            entry in 1.0f64..10_000.0,
            stop_frac in 0.0001f64..0.2,
            risk in 0.1f64..5.0,
            leverage in 1.0f64..10.0,
        ) {
            let account = AccountState::new(balance);
            let request = SizeRequest {
                entry: Some(entry),
                stop: Some(entry * (1.0 - stop_frac)),
                confidence: 0.8,
                grade: TradeGrade::B,
                atr_ratio: 0.02,
                avg_atr_ratio: 0.02,
                momentum_percent: 1.0,
            };
            let config = SizingConfig {
                risk_percent: risk,
                max_leverage: leverage,
                ..SizingConfig::default()
            };
            let rec = recommend_quantity(&account, &request, &config).unwrap();
            prop_assert!(rec.quantity * entry <= balance * leverage * (1.0 + 1e-9));
            prop_assert!(rec.quantity >= 0.0);
        }
    }
}
