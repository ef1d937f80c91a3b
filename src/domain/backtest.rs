//! Bar-by-bar signal backtest.
//!
//! Each candle is processed in two phases: manage the open position (exits
//! first, then stop maintenance), then look for a new entry. At most one
//! position is open at a time. When a candle's range touches both the stop
//! and a target, the stop is assumed to have filled first.

use super::candle::{Candle, Timeframe};
use super::alignment::AlignedBias;
use super::liquidity::{DEFAULT_CLUSTER_TOLERANCE, detect_liquidity_levels};
use super::signal::{
    Action, MIN_SIGNAL_CANDLES, MarketView, SignalConfig, TradeSignal, evaluate,
};
use super::sizing::{
    AccountState, SizeRequest, SizingConfig, TradeGrade, check_gate, recommend_quantity,
};
use super::structure::classify_breaks;
use super::swing::{DEFAULT_SWING_LEFT, DEFAULT_SWING_RIGHT, detect_swings};
use super::volatility::atr_ratio;
use super::zones::{
    DEFAULT_MITIGATION_BUFFER, DEFAULT_ORDER_BLOCK_LOOKBACK, DealingRange,
    detect_fair_value_gaps, detect_order_blocks,
};
use serde::Serialize;

const ATR_PERIOD: usize = 14;
const MOMENTUM_LOOKBACK: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    /// Commission per side, percent of notional.
    pub commission_pct: f64,
    /// Adverse slippage per fill, percent of price.
    pub slippage_pct: f64,
    pub timeframe: Timeframe,
    /// Unrealized profit (percent of entry) that arms the trailing stop.
    pub trailing_activation_pct: f64,
    /// Unrealized profit in R that moves the stop to entry.
    pub breakeven_trigger_r: f64,
    pub signal: SignalConfig,
    pub sizing: SizingConfig,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_capital: 10_000.0,
            commission_pct: 0.1,
            slippage_pct: 0.0,
            timeframe: Timeframe::H1,
            trailing_activation_pct: 3.0,
            breakeven_trigger_r: 0.5,
            signal: SignalConfig::optimized(),
            sizing: SizingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Side {
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    EndOfData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub side: Side,
    pub entry_price: f64,
    pub quantity: f64,
    pub stop: f64,
    pub target: f64,
    /// Entry-to-initial-stop distance, the R unit for this trade.
    pub initial_risk: f64,
    pub entry_timestamp: i64,
    pub entry_commission: f64,
    /// Best price seen since entry (highest for longs, lowest for shorts).
    pub high_water_mark: f64,
    pub breakeven_applied: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedTrade {
    pub side: Side,
    pub quantity: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_timestamp: i64,
    pub exit_timestamp: i64,
    pub gross_pnl: f64,
    pub net_pnl: f64,
    pub fees: f64,
    pub exit_reason: ExitReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EquityPoint {
    pub timestamp: i64,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestResult {
    pub initial_capital: f64,
    pub final_balance: f64,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<CompletedTrade>,
    pub signals_evaluated: usize,
    pub trades_blocked: usize,
}

pub fn run_backtest(candles: &[Candle], config: &BacktestConfig) -> BacktestResult {
    let mut balance = config.initial_capital;
    let mut account = AccountState::new(balance);
    let mut position: Option<Position> = None;
    let mut equity_curve = Vec::with_capacity(candles.len());
    let mut trades: Vec<CompletedTrade> = Vec::new();
    let mut signals_evaluated = 0usize;
    let mut trades_blocked = 0usize;
    let mut loss_day: Option<i64> = None;
    let mut loss_month: Option<(i32, u32)> = None;

    for (i, candle) in candles.iter().enumerate() {
        roll_loss_buckets(&mut account, candle, &mut loss_day, &mut loss_month);

        if let Some(pos) = position.take() {
            match check_exit(&pos, candle) {
                Some((raw_price, reason)) => {
                    let trade = close_position(&pos, raw_price, candle.timestamp, reason, config);
                    balance += trade.gross_pnl - (trade.fees - pos.entry_commission);
                    record_outcome(&mut account, &trade);
                    account.balance = balance;
                    account.open_positions = 0;
                    trades.push(trade);
                }
                None => {
                    let mut pos = pos;
                    maintain_stops(&mut pos, candle, config);
                    position = Some(pos);
                }
            }
        }

        if position.is_none() && i + 1 >= MIN_SIGNAL_CANDLES {
            let window = &candles[..=i];
            signals_evaluated += 1;
            let signal = evaluate_window(window, &config.signal, None);
            if signal.action != Action::NoTrade {
                match try_open(&account, &signal, window, config) {
                    OpenOutcome::Opened(mut pos) => {
                        balance -= pos.entry_commission;
                        account.balance = balance;
                        account.open_positions = 1;
                        pos.entry_timestamp = candle.timestamp;
                        position = Some(pos);
                    }
                    OpenOutcome::Blocked => trades_blocked += 1,
                    OpenOutcome::Unsizable => {}
                }
            }
        }

        // Force close on the last candle, before its equity point is
        // recorded. The curve is append-only.
        if i + 1 == candles.len() {
            if let Some(pos) = position.take() {
                let trade =
                    close_position(&pos, candle.close, candle.timestamp, ExitReason::EndOfData, config);
                balance += trade.gross_pnl - (trade.fees - pos.entry_commission);
                trades.push(trade);
            }
        }

        let unrealized = position.as_ref().map_or(0.0, |p| mark_to_market(p, candle));
        equity_curve.push(EquityPoint {
            timestamp: candle.timestamp,
            equity: balance + unrealized,
        });
    }

    BacktestResult {
        initial_capital: config.initial_capital,
        final_balance: balance,
        equity_curve,
        trades,
        signals_evaluated,
        trades_blocked,
    }
}

/// Build the evaluator's view over a candle prefix and run it.
pub fn evaluate_window(
    window: &[Candle],
    config: &SignalConfig,
    bias: Option<&AlignedBias>,
) -> TradeSignal {
    let swings = detect_swings(window, DEFAULT_SWING_LEFT, DEFAULT_SWING_RIGHT);
    let analysis = classify_breaks(window, &swings);
    let mut zones = detect_order_blocks(
        window,
        &analysis.breaks,
        DEFAULT_ORDER_BLOCK_LOOKBACK,
        DEFAULT_MITIGATION_BUFFER,
    );
    zones.extend(detect_fair_value_gaps(window));
    let levels = detect_liquidity_levels(window, &swings, DEFAULT_CLUSTER_TOLERANCE);
    let dealing_range = DealingRange::from_swings(&analysis.swings);

    let view = MarketView {
        candles: window,
        analysis: &analysis,
        zones: &zones,
        levels: &levels,
        dealing_range: dealing_range.as_ref(),
        bias,
    };
    evaluate(&view, config)
}

enum OpenOutcome {
    Opened(Position),
    Blocked,
    Unsizable,
}

fn try_open(
    account: &AccountState,
    signal: &TradeSignal,
    window: &[Candle],
    config: &BacktestConfig,
) -> OpenOutcome {
    let (latest_atr, avg_atr) = atr_ratio(window, ATR_PERIOD).unwrap_or((0.02, 0.02));
    let request = SizeRequest {
        entry: Some(signal.price),
        stop: Some(signal.stop),
        confidence: signal.confidence,
        grade: grade_from_confidence(signal.confidence),
        atr_ratio: latest_atr,
        avg_atr_ratio: avg_atr,
        momentum_percent: recent_momentum(window),
    };

    let Ok(rec) = recommend_quantity(account, &request, &config.sizing) else {
        return OpenOutcome::Unsizable;
    };
    if rec.quantity <= 0.0 {
        return OpenOutcome::Unsizable;
    }
    if !check_gate(account, rec.risk_amount, &config.sizing).is_empty() {
        return OpenOutcome::Blocked;
    }

    let side = match signal.action {
        Action::Buy => Side::Long,
        Action::Sell => Side::Short,
        Action::NoTrade => return OpenOutcome::Unsizable,
    };
    let entry_price = match side {
        Side::Long => signal.price * (1.0 + config.slippage_pct / 100.0),
        Side::Short => signal.price * (1.0 - config.slippage_pct / 100.0),
    };
    let target = signal.targets.first().copied().unwrap_or(signal.price);

    OpenOutcome::Opened(Position {
        side,
        entry_price,
        quantity: rec.quantity,
        stop: signal.stop,
        target,
        initial_risk: (entry_price - signal.stop).abs(),
        entry_timestamp: 0,
        entry_commission: rec.quantity * entry_price * config.commission_pct / 100.0,
        high_water_mark: entry_price,
        breakeven_applied: false,
    })
}

fn grade_from_confidence(confidence: f64) -> TradeGrade {
    if confidence >= 0.8 {
        TradeGrade::A
    } else if confidence >= 0.6 {
        TradeGrade::B
    } else {
        TradeGrade::C
    }
}

fn recent_momentum(window: &[Candle]) -> f64 {
    if window.len() <= MOMENTUM_LOOKBACK {
        return 0.0;
    }
    let past = window[window.len() - 1 - MOMENTUM_LOOKBACK].close;
    let now = window[window.len() - 1].close;
    if past > 0.0 {
        (now - past) / past * 100.0
    } else {
        0.0
    }
}

/// Raw exit fill for this candle, if any. Stop wins when both are touched.
/// A gap through the stop or target fills at the open.
fn check_exit(pos: &Position, candle: &Candle) -> Option<(f64, ExitReason)> {
    match pos.side {
        Side::Long => {
            if candle.low <= pos.stop {
                let fill = if candle.open < pos.stop { candle.open } else { pos.stop };
                return Some((fill, ExitReason::StopLoss));
            }
            if candle.high >= pos.target {
                let fill = if candle.open > pos.target { candle.open } else { pos.target };
                return Some((fill, ExitReason::TakeProfit));
            }
        }
        Side::Short => {
            if candle.high >= pos.stop {
                let fill = if candle.open > pos.stop { candle.open } else { pos.stop };
                return Some((fill, ExitReason::StopLoss));
            }
            if candle.low <= pos.target {
                let fill = if candle.open < pos.target { candle.open } else { pos.target };
                return Some((fill, ExitReason::TakeProfit));
            }
        }
    }
    None
}

/// Breakeven and trailing maintenance for a position that survived the
/// candle. Stops only ever tighten.
fn maintain_stops(pos: &mut Position, candle: &Candle, config: &BacktestConfig) {
    match pos.side {
        Side::Long => {
            if candle.high > pos.high_water_mark {
                pos.high_water_mark = candle.high;
            }
            let open_profit = pos.high_water_mark - pos.entry_price;
            if !pos.breakeven_applied
                && pos.initial_risk > 0.0
                && open_profit >= config.breakeven_trigger_r * pos.initial_risk
            {
                pos.stop = pos.stop.max(pos.entry_price);
                pos.breakeven_applied = true;
            }
            if open_profit >= pos.entry_price * config.trailing_activation_pct / 100.0 {
                pos.stop = pos.stop.max(pos.high_water_mark - pos.initial_risk);
            }
        }
        Side::Short => {
            if candle.low < pos.high_water_mark {
                pos.high_water_mark = candle.low;
            }
            let open_profit = pos.entry_price - pos.high_water_mark;
            if !pos.breakeven_applied
                && pos.initial_risk > 0.0
                && open_profit >= config.breakeven_trigger_r * pos.initial_risk
            {
                pos.stop = pos.stop.min(pos.entry_price);
                pos.breakeven_applied = true;
            }
            if open_profit >= pos.entry_price * config.trailing_activation_pct / 100.0 {
                pos.stop = pos.stop.min(pos.high_water_mark + pos.initial_risk);
            }
        }
    }
}

fn mark_to_market(pos: &Position, candle: &Candle) -> f64 {
    match pos.side {
        Side::Long => pos.quantity * (candle.close - pos.entry_price),
        Side::Short => pos.quantity * (pos.entry_price - candle.close),
    }
}

fn close_position(
    pos: &Position,
    raw_price: f64,
    timestamp: i64,
    reason: ExitReason,
    config: &BacktestConfig,
) -> CompletedTrade {
    let exit_price = match pos.side {
        Side::Long => raw_price * (1.0 - config.slippage_pct / 100.0),
        Side::Short => raw_price * (1.0 + config.slippage_pct / 100.0),
    };
    let exit_commission = pos.quantity * exit_price * config.commission_pct / 100.0;
    let gross_pnl = match pos.side {
        Side::Long => pos.quantity * (exit_price - pos.entry_price),
        Side::Short => pos.quantity * (pos.entry_price - exit_price),
    };
    let fees = pos.entry_commission + exit_commission;

    CompletedTrade {
        side: pos.side,
        quantity: pos.quantity,
        entry_price: pos.entry_price,
        exit_price,
        entry_timestamp: pos.entry_timestamp,
        exit_timestamp: timestamp,
        gross_pnl,
        net_pnl: gross_pnl - fees,
        fees,
        exit_reason: reason,
    }
}

/// Daily and monthly loss buckets reset when the candle enters a new
/// calendar bucket, trade or no trade. Runs before the gate sees the
/// account, so yesterday's losses never block today's first entry.
fn roll_loss_buckets(
    account: &mut AccountState,
    candle: &Candle,
    loss_day: &mut Option<i64>,
    loss_month: &mut Option<(i32, u32)>,
) {
    use chrono::Datelike;

    let day = candle.timestamp.div_euclid(86_400_000);
    let dt = candle.datetime();
    let month = (dt.year(), dt.month());

    if *loss_day != Some(day) {
        *loss_day = Some(day);
        account.daily_loss = 0.0;
    }
    if *loss_month != Some(month) {
        *loss_month = Some(month);
        account.monthly_loss = 0.0;
    }
}

fn record_outcome(account: &mut AccountState, trade: &CompletedTrade) {
    if trade.net_pnl < 0.0 {
        account.daily_loss += -trade.net_pnl;
        account.monthly_loss += -trade.net_pnl;
        account.consecutive_losses += 1;
    } else if trade.net_pnl > 0.0 {
        account.consecutive_losses = 0;
    }
}
