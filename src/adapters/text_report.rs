//! Plain-text backtest report adapter.

use crate::domain::backtest::{BacktestResult, ExitReason, Side};
use crate::domain::error::StructraderError;
use crate::domain::metrics::Metrics;
use crate::ports::report_port::ReportPort;
use std::fmt::Write as _;
use std::fs;

pub struct TextReportAdapter;

impl TextReportAdapter {
    pub fn render(result: &BacktestResult, metrics: &Metrics) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "=== Backtest Report ===");
        let _ = writeln!(out, "Initial capital:   {:.2}", result.initial_capital);
        let _ = writeln!(out, "Final balance:     {:.2}", result.final_balance);
        let _ = writeln!(out, "Total return:      {:.2}%", metrics.total_return * 100.0);
        let _ = writeln!(
            out,
            "Annualized return: {:.2}%",
            metrics.annualized_return * 100.0
        );
        let _ = writeln!(out, "Sharpe ratio:      {:.3}", metrics.sharpe_ratio);
        let _ = writeln!(out, "Sortino ratio:     {:.3}", metrics.sortino_ratio);
        let _ = writeln!(out, "Max drawdown:      {:.2}%", metrics.max_drawdown * 100.0);
        let _ = writeln!(
            out,
            "Drawdown duration: {} candles",
            metrics.max_drawdown_duration
        );
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Trades: {} won / {} lost / {} breakeven",
            metrics.trades_won, metrics.trades_lost, metrics.trades_breakeven
        );
        let _ = writeln!(out, "Win rate:          {:.1}%", metrics.win_rate * 100.0);
        if metrics.profit_factor.is_infinite() {
            let _ = writeln!(out, "Profit factor:     inf (no losing trades)");
        } else {
            let _ = writeln!(out, "Profit factor:     {:.2}", metrics.profit_factor);
        }
        let _ = writeln!(out, "Avg win / loss:    {:.2} / {:.2}", metrics.avg_win, metrics.avg_loss);
        let _ = writeln!(out, "Total fees:        {:.2}", metrics.total_fees);
        let _ = writeln!(
            out,
            "Signals evaluated: {} ({} blocked by risk gate)",
            result.signals_evaluated, result.trades_blocked
        );

        if !result.trades.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "--- Trades ---");
            for (i, trade) in result.trades.iter().enumerate() {
                let side = match trade.side {
                    Side::Long => "LONG ",
                    Side::Short => "SHORT",
                };
                let reason = match trade.exit_reason {
                    ExitReason::StopLoss => "stop",
                    ExitReason::TakeProfit => "target",
                    ExitReason::EndOfData => "end of data",
                };
                let _ = writeln!(
                    out,
                    "{:>4}  {}  {:>10.4} -> {:>10.4}  qty {:>10.4}  net {:>10.2}  ({})",
                    i + 1,
                    side,
                    trade.entry_price,
                    trade.exit_price,
                    trade.quantity,
                    trade.net_pnl,
                    reason
                );
            }
        }

        out
    }
}

impl ReportPort for TextReportAdapter {
    fn write(
        &self,
        result: &BacktestResult,
        metrics: &Metrics,
        output_path: &str,
    ) -> Result<(), StructraderError> {
        let rendered = Self::render(result, metrics);
        fs::write(output_path, rendered)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::backtest::{CompletedTrade, EquityPoint};
    use crate::domain::candle::Timeframe;
    use tempfile::TempDir;

    fn sample_result() -> BacktestResult {
        BacktestResult {
            initial_capital: 10_000.0,
            final_balance: 10_380.2,
            equity_curve: vec![
                EquityPoint { timestamp: 0, equity: 10_000.0 },
                EquityPoint { timestamp: 3_600_000, equity: 10_380.2 },
            ],
            trades: vec![CompletedTrade {
                side: Side::Long,
                quantity: 100.0,
                entry_price: 100.0,
                exit_price: 104.0,
                entry_timestamp: 0,
                exit_timestamp: 3_600_000,
                gross_pnl: 400.0,
                net_pnl: 380.2,
                fees: 19.8,
                exit_reason: ExitReason::TakeProfit,
            }],
            signals_evaluated: 40,
            trades_blocked: 2,
        }
    }

    #[test]
    fn render_includes_headline_numbers() {
        let result = sample_result();
        let metrics = Metrics::compute(&result, Timeframe::H1);
        let text = TextReportAdapter::render(&result, &metrics);

        assert!(text.contains("Initial capital:   10000.00"));
        assert!(text.contains("Final balance:     10380.20"));
        assert!(text.contains("1 won / 0 lost / 0 breakeven"));
        assert!(text.contains("LONG "));
        assert!(text.contains("(target)"));
        assert!(text.contains("2 blocked by risk gate"));
    }

    #[test]
    fn infinite_profit_factor_rendered_as_text() {
        let result = sample_result();
        let metrics = Metrics::compute(&result, Timeframe::H1);
        let text = TextReportAdapter::render(&result, &metrics);
        assert!(text.contains("inf (no losing trades)"));
    }

    #[test]
    fn write_creates_report_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.txt");
        let result = sample_result();
        let metrics = Metrics::compute(&result, Timeframe::H1);

        TextReportAdapter
            .write(&result, &metrics, path.to_str().unwrap())
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("=== Backtest Report ==="));
    }
}
