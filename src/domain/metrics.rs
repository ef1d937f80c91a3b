//! Backtest performance statistics.

use super::backtest::{BacktestResult, CompletedTrade, EquityPoint};
use super::candle::Timeframe;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    /// Longest drawdown stretch, in candle periods.
    pub max_drawdown_duration: i64,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    /// Mean holding time, in candle periods.
    pub avg_trade_duration: f64,
    pub total_fees: f64,
}

impl Metrics {
    /// Per-period returns are annualized with the timeframe's period count
    /// on a 365-day calendar.
    pub fn compute(result: &BacktestResult, timeframe: Timeframe) -> Self {
        let equity_curve = &result.equity_curve;
        let trades = &result.trades;
        let initial_capital = result.initial_capital;
        let periods_per_year = timeframe.periods_per_year();

        let final_equity = equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(initial_capital);

        let total_return = if initial_capital > 0.0 {
            (final_equity - initial_capital) / initial_capital
        } else {
            0.0
        };

        let periods = equity_curve.len() as f64;
        let years = periods / periods_per_year;
        let annualized_return = if years > 0.0 && total_return > -1.0 {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(equity_curve);
        let (sharpe_ratio, sortino_ratio) = compute_risk_adjusted(equity_curve, periods_per_year);

        let mut trades_won = 0usize;
        let mut trades_lost = 0usize;
        let mut trades_breakeven = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;
        let mut total_fees = 0.0_f64;
        let mut total_duration_periods = 0.0_f64;
        let period_ms = timeframe.duration_ms() as f64;

        for trade in trades {
            let pnl = trade.net_pnl;
            if pnl > 0.0 {
                trades_won += 1;
                total_wins += pnl;
                if pnl > largest_win {
                    largest_win = pnl;
                }
            } else if pnl < 0.0 {
                trades_lost += 1;
                total_losses += pnl.abs();
                if pnl.abs() > largest_loss {
                    largest_loss = pnl.abs();
                }
            } else {
                trades_breakeven += 1;
            }
            total_fees += trade.fees;
            total_duration_periods +=
                (trade.exit_timestamp - trade.entry_timestamp) as f64 / period_ms;
        }

        let total_trades = trades_won + trades_lost + trades_breakeven;
        let win_rate = if total_trades > 0 {
            trades_won as f64 / total_trades as f64
        } else {
            0.0
        };

        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let avg_win = if trades_won > 0 {
            total_wins / trades_won as f64
        } else {
            0.0
        };

        let avg_loss = if trades_lost > 0 {
            total_losses / trades_lost as f64
        } else {
            0.0
        };

        let avg_trade_duration = if total_trades > 0 {
            total_duration_periods / total_trades as f64
        } else {
            0.0
        };

        Metrics {
            total_return,
            annualized_return,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            max_drawdown_duration,
            trades_won,
            trades_lost,
            trades_breakeven,
            win_rate,
            profit_factor,
            avg_win,
            avg_loss,
            largest_win,
            largest_loss,
            avg_trade_duration,
            total_fees,
        }
    }
}

fn compute_drawdown(equity_curve: &[EquityPoint]) -> (f64, i64) {
    if equity_curve.is_empty() {
        return (0.0, 0);
    }

    let mut peak = equity_curve[0].equity;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0i64;
    let mut current_dd_duration = 0i64;

    for point in equity_curve {
        if point.equity > peak {
            peak = point.equity;
            current_dd_duration = 0;
        } else if peak > 0.0 {
            let dd = (peak - point.equity) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
            current_dd_duration += 1;
            if current_dd_duration > max_dd_duration {
                max_dd_duration = current_dd_duration;
            }
        }
    }

    (max_dd, max_dd_duration)
}

fn compute_risk_adjusted(equity_curve: &[EquityPoint], periods_per_year: f64) -> (f64, f64) {
    if equity_curve.len() < 2 {
        return (0.0, 0.0);
    }

    let returns: Vec<f64> = equity_curve
        .windows(2)
        .map(|w| {
            let prev = w[0].equity;
            let curr = w[1].equity;
            if prev > 0.0 { (curr - prev) / prev } else { 0.0 }
        })
        .collect();

    let n = returns.len() as f64;
    let mean: f64 = returns.iter().sum::<f64>() / n;
    let variance: f64 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();

    let sharpe = if stddev > 0.0 {
        (mean / stddev) * periods_per_year.sqrt()
    } else {
        0.0
    };

    let downside: Vec<f64> = returns
        .iter()
        .filter(|&&r| r < 0.0)
        .map(|&r| r.powi(2))
        .collect();

    let downside_stddev = if !downside.is_empty() {
        (downside.iter().sum::<f64>() / n).sqrt()
    } else {
        0.0
    };

    let sortino = if downside_stddev > 0.0 {
        (mean / downside_stddev) * periods_per_year.sqrt()
    } else {
        0.0
    };

    (sharpe, sortino)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::backtest::{ExitReason, Side};
    use approx::assert_relative_eq;

    const HOUR_MS: i64 = 3_600_000;

    fn make_equity_curve(values: &[f64]) -> Vec<EquityPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| EquityPoint {
                timestamp: i as i64 * HOUR_MS,
                equity: v,
            })
            .collect()
    }

    fn make_result(equity: Vec<f64>, trades: Vec<CompletedTrade>) -> BacktestResult {
        let initial = equity.first().copied().unwrap_or(10_000.0);
        let final_balance = equity.last().copied().unwrap_or(initial);
        BacktestResult {
            initial_capital: initial,
            final_balance,
            equity_curve: make_equity_curve(&equity),
            trades,
            signals_evaluated: 0,
            trades_blocked: 0,
        }
    }

    fn make_trade(net_pnl: f64, periods: i64) -> CompletedTrade {
        CompletedTrade {
            side: Side::Long,
            quantity: 100.0,
            entry_price: 100.0,
            exit_price: 100.0 + net_pnl / 100.0,
            entry_timestamp: 0,
            exit_timestamp: periods * HOUR_MS,
            gross_pnl: net_pnl,
            net_pnl,
            fees: 0.0,
            exit_reason: ExitReason::TakeProfit,
        }
    }

    #[test]
    fn empty_result() {
        let result = make_result(vec![], vec![]);
        let metrics = Metrics::compute(&result, Timeframe::H1);
        assert!((metrics.total_return - 0.0).abs() < f64::EPSILON);
        assert_eq!(metrics.trades_won, 0);
        assert_eq!(metrics.trades_lost, 0);
    }

    #[test]
    fn total_return_positive() {
        let result = make_result(vec![10_000.0, 11_000.0], vec![]);
        let metrics = Metrics::compute(&result, Timeframe::H1);
        assert!((metrics.total_return - 0.10).abs() < 1e-9);
    }

    #[test]
    fn total_return_negative() {
        let result = make_result(vec![10_000.0, 9_000.0], vec![]);
        let metrics = Metrics::compute(&result, Timeframe::H1);
        assert!((metrics.total_return - (-0.10)).abs() < 1e-9);
    }

    #[test]
    fn flat_curve_annualizes_to_zero() {
        let result = make_result(vec![10_000.0; 8760], vec![]);
        let metrics = Metrics::compute(&result, Timeframe::H1);
        assert!((metrics.annualized_return - 0.0).abs() < 1e-9);
    }

    #[test]
    fn trade_stats_wins_losses_breakeven() {
        let trades = vec![
            make_trade(100.0, 5),
            make_trade(-50.0, 3),
            make_trade(200.0, 10),
            make_trade(0.0, 1),
        ];
        let result = make_result(vec![10_000.0, 10_250.0], trades);
        let metrics = Metrics::compute(&result, Timeframe::H1);

        assert_eq!(metrics.trades_won, 2);
        assert_eq!(metrics.trades_lost, 1);
        assert_eq!(metrics.trades_breakeven, 1);
        assert!((metrics.win_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn profit_factor_basic() {
        let trades = vec![make_trade(100.0, 5), make_trade(-50.0, 3), make_trade(200.0, 10)];
        let result = make_result(vec![10_000.0, 10_250.0], trades);
        let metrics = Metrics::compute(&result, Timeframe::H1);
        assert_relative_eq!(metrics.profit_factor, 6.0);
    }

    #[test]
    fn profit_factor_no_losses_is_infinite() {
        let trades = vec![make_trade(100.0, 5), make_trade(200.0, 3)];
        let result = make_result(vec![10_000.0, 10_300.0], trades);
        let metrics = Metrics::compute(&result, Timeframe::H1);
        assert!(metrics.profit_factor.is_infinite());
    }

    #[test]
    fn profit_factor_no_trades_is_zero() {
        let result = make_result(vec![10_000.0, 10_000.0], vec![]);
        let metrics = Metrics::compute(&result, Timeframe::H1);
        assert!((metrics.profit_factor - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn avg_and_largest_win_loss() {
        let trades = vec![
            make_trade(100.0, 5),
            make_trade(-60.0, 3),
            make_trade(200.0, 10),
            make_trade(-40.0, 2),
        ];
        let result = make_result(vec![10_000.0, 10_200.0], trades);
        let metrics = Metrics::compute(&result, Timeframe::H1);

        assert_relative_eq!(metrics.avg_win, 150.0);
        assert_relative_eq!(metrics.avg_loss, 50.0);
        assert_relative_eq!(metrics.largest_win, 200.0);
        assert_relative_eq!(metrics.largest_loss, 60.0);
    }

    #[test]
    fn avg_trade_duration_in_periods() {
        let trades = vec![make_trade(100.0, 5), make_trade(-50.0, 10), make_trade(200.0, 15)];
        let result = make_result(vec![10_000.0, 10_250.0], trades);
        let metrics = Metrics::compute(&result, Timeframe::H1);
        assert!((metrics.avg_trade_duration - 10.0).abs() < 1e-9);
    }

    #[test]
    fn max_drawdown_depth() {
        let curve = make_equity_curve(&[100.0, 110.0, 90.0, 95.0, 80.0, 100.0]);
        let (dd, _) = compute_drawdown(&curve);
        assert_relative_eq!(dd, (110.0 - 80.0) / 110.0);
    }

    #[test]
    fn max_drawdown_duration_counts_periods() {
        let curve = make_equity_curve(&[100.0, 110.0, 100.0, 90.0, 85.0, 95.0]);
        let (_, duration) = compute_drawdown(&curve);
        assert_eq!(duration, 4);
    }

    #[test]
    fn sharpe_positive_for_steady_gains() {
        let values: Vec<f64> = (0..500).map(|i| 10_000.0 * (1.0 + 0.0005 * i as f64)).collect();
        let result = make_result(values, vec![]);
        let metrics = Metrics::compute(&result, Timeframe::H1);
        assert!(metrics.sharpe_ratio > 0.0);
    }

    #[test]
    fn annualization_scales_with_timeframe() {
        let values: Vec<f64> = (0..200)
            .map(|i| 10_000.0 + (i % 3) as f64 * 5.0 + i as f64)
            .collect();
        let result = make_result(values, vec![]);
        let hourly = Metrics::compute(&result, Timeframe::H1);
        let daily = Metrics::compute(&result, Timeframe::D1);
        // Same per-period returns, more periods per year, larger Sharpe.
        assert!(hourly.sharpe_ratio > daily.sharpe_ratio);
    }

    #[test]
    fn sortino_finite_on_mixed_curve() {
        let curve = make_equity_curve(&[100.0, 101.0, 100.5, 101.5, 100.0, 102.0]);
        let (sharpe, sortino) = compute_risk_adjusted(&curve, 8760.0);
        assert!(sharpe.is_finite());
        assert!(sortino.is_finite());
    }

    #[test]
    fn report_serializes_to_json() {
        let trades = vec![make_trade(100.0, 5), make_trade(-50.0, 3)];
        let result = make_result(vec![10_000.0, 10_050.0], trades);
        let metrics = Metrics::compute(&result, Timeframe::H1);

        let json = serde_json::to_string(&metrics).unwrap();
        assert!(json.contains("\"win_rate\""));
        assert!(json.contains("\"profit_factor\""));

        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"final_balance\""));
        assert!(json.contains("\"equity_curve\""));
    }

    #[test]
    fn fees_are_summed() {
        let mut t1 = make_trade(100.0, 5);
        t1.fees = 12.5;
        let mut t2 = make_trade(-50.0, 3);
        t2.fees = 7.5;
        let result = make_result(vec![10_000.0, 10_050.0], vec![t1, t2]);
        let metrics = Metrics::compute(&result, Timeframe::H1);
        assert_relative_eq!(metrics.total_fees, 20.0);
    }
}
