//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::text_report::TextReportAdapter;
use crate::domain::alignment;
use crate::domain::backtest::{BacktestConfig, evaluate_window, run_backtest};
use crate::domain::candle::Timeframe;
use crate::domain::config_validation::{
    validate_backtest_config, validate_signal_config, validate_sizing_config,
};
use crate::domain::error::StructraderError;
use crate::domain::metrics::Metrics;
use crate::domain::signal::{MIN_SIGNAL_CANDLES, SignalConfig};
use crate::domain::sizing::SizingConfig;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "structrader", about = "Market-structure signal detector and backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        code: Option<String>,
        #[arg(long)]
        timeframe: Option<String>,
    },
    /// Evaluate the latest signal for an instrument
    Signal {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        code: Option<String>,
        #[arg(long)]
        timeframe: Option<String>,
        /// Signal preset override: strict, balanced or optimized
        #[arg(long)]
        preset: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List instruments available in the data directory
    ListCodes {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            output,
            code,
            timeframe,
        } => run_backtest_command(&config, output.as_ref(), code.as_deref(), timeframe.as_deref()),
        Command::Signal {
            config,
            code,
            timeframe,
            preset,
            json,
        } => run_signal_command(
            &config,
            code.as_deref(),
            timeframe.as_deref(),
            preset.as_deref(),
            json,
        ),
        Command::Validate { config } => run_validate(&config),
        Command::ListCodes { config } => run_list_codes(&config),
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = StructraderError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn run_backtest_command(
    config_path: &PathBuf,
    output_path: Option<&PathBuf>,
    code_override: Option<&str>,
    timeframe_override: Option<&str>,
) -> ExitCode {
    // Stage 1: Load and validate config
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    if let Err(e) = validate_all(&adapter) {
        eprintln!("error: {e}");
        return (&e).into();
    }

    // Stage 2: Resolve instrument and timeframe
    let (code, timeframe) = match resolve_target(&adapter, code_override, timeframe_override) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    // Stage 3: Build engine config
    let bt_config = match build_backtest_config(&adapter, timeframe) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    // Stage 4: Fetch candles
    let data_port = data_port_from(&adapter);
    eprintln!("Fetching {} candles for {}...", timeframe.label(), code);
    let candles = match fetch_checked(&data_port, &code, timeframe) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    eprintln!("Loaded {} candles", candles.len());

    // Stage 5: Run and report
    let result = run_backtest(&candles, &bt_config);
    let metrics = Metrics::compute(&result, timeframe);
    let rendered = TextReportAdapter::render(&result, &metrics);
    println!("{rendered}");

    if let Some(path) = output_path {
        let path_str = path.display().to_string();
        if let Err(e) = TextReportAdapter.write(&result, &metrics, &path_str) {
            eprintln!("error: {e}");
            return (&e).into();
        }
        eprintln!("Report written to {path_str}");
    }

    ExitCode::SUCCESS
}

fn run_signal_command(
    config_path: &PathBuf,
    code_override: Option<&str>,
    timeframe_override: Option<&str>,
    preset_override: Option<&str>,
    json: bool,
) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    if let Err(e) = validate_all(&adapter) {
        eprintln!("error: {e}");
        return (&e).into();
    }

    let (code, timeframe) = match resolve_target(&adapter, code_override, timeframe_override) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let signal_config = match preset_override {
        Some(name) => match SignalConfig::preset(name) {
            Some(c) => c,
            None => {
                eprintln!("error: unknown preset '{name}'");
                return ExitCode::from(2);
            }
        },
        None => build_signal_config(&adapter),
    };

    let data_port = data_port_from(&adapter);
    let candles = match fetch_checked(&data_port, &code, timeframe) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    // Higher-timeframe series is optional; without it the signal runs solo.
    let bias = higher_timeframe(timeframe)
        .and_then(|htf| data_port.fetch_candles(&code, htf).ok())
        .map(|htf_candles| {
            let higher = alignment::assess_timeframe(&htf_candles);
            let lower = alignment::assess_timeframe(&candles);
            alignment::align(&higher, &lower)
        });

    let signal = evaluate_window(&candles, &signal_config, bias.as_ref());

    if json {
        match serde_json::to_string_pretty(&signal) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("error: failed to serialize signal: {e}");
                return ExitCode::from(1);
            }
        }
    } else {
        println!("{} {} @ {}", code, timeframe.label(), describe(&signal.action));
        if !signal.targets.is_empty() {
            println!(
                "entry {:.4}  stop {:.4}  target {:.4}  confidence {:.2}",
                signal.price, signal.stop, signal.targets[0], signal.confidence
            );
        }
        for reason in &signal.reasoning {
            println!("  [{:?}] {}", reason.code, reason.detail);
        }
    }

    ExitCode::SUCCESS
}

fn describe(action: &crate::domain::signal::Action) -> &'static str {
    use crate::domain::signal::Action;
    match action {
        Action::Buy => "BUY",
        Action::Sell => "SELL",
        Action::NoTrade => "NO TRADE",
    }
}

fn run_validate(config_path: &PathBuf) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    match validate_all(&adapter) {
        Ok(()) => {
            println!("Configuration OK");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn run_list_codes(config_path: &PathBuf) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let data_port = data_port_from(&adapter);
    match data_port.list_codes() {
        Ok(codes) => {
            for code in codes {
                println!("{code}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn validate_all(adapter: &dyn ConfigPort) -> Result<(), StructraderError> {
    validate_backtest_config(adapter)?;
    validate_signal_config(adapter)?;
    validate_sizing_config(adapter)?;
    Ok(())
}

fn data_port_from(adapter: &dyn ConfigPort) -> CsvAdapter {
    let data_dir = adapter
        .get_string("backtest", "data_dir")
        .unwrap_or_else(|| ".".to_string());
    CsvAdapter::new(PathBuf::from(data_dir))
}

fn resolve_target(
    adapter: &dyn ConfigPort,
    code_override: Option<&str>,
    timeframe_override: Option<&str>,
) -> Result<(String, Timeframe), StructraderError> {
    let code = match code_override {
        Some(c) => c.to_string(),
        None => adapter.get_string("backtest", "code").ok_or_else(|| {
            StructraderError::ConfigMissing {
                section: "backtest".to_string(),
                key: "code".to_string(),
            }
        })?,
    };

    let tf_str = match timeframe_override {
        Some(t) => t.to_string(),
        None => adapter.get_string("backtest", "timeframe").ok_or_else(|| {
            StructraderError::ConfigMissing {
                section: "backtest".to_string(),
                key: "timeframe".to_string(),
            }
        })?,
    };
    let timeframe = Timeframe::parse(&tf_str)
        .ok_or_else(|| StructraderError::UnknownTimeframe(tf_str.clone()))?;

    Ok((code, timeframe))
}

fn fetch_checked(
    data_port: &CsvAdapter,
    code: &str,
    timeframe: Timeframe,
) -> Result<Vec<crate::domain::candle::Candle>, StructraderError> {
    let candles = data_port.fetch_candles(code, timeframe)?;
    if candles.len() < MIN_SIGNAL_CANDLES {
        return Err(StructraderError::InsufficientData {
            code: code.to_string(),
            timeframe: timeframe.label().to_string(),
            candles: candles.len(),
            minimum: MIN_SIGNAL_CANDLES,
        });
    }
    Ok(candles)
}

fn higher_timeframe(timeframe: Timeframe) -> Option<Timeframe> {
    match timeframe {
        Timeframe::M15 => Some(Timeframe::H1),
        Timeframe::H1 => Some(Timeframe::H4),
        Timeframe::H4 => Some(Timeframe::D1),
        Timeframe::D1 => None,
    }
}

pub fn build_backtest_config(
    adapter: &dyn ConfigPort,
    timeframe: Timeframe,
) -> Result<BacktestConfig, StructraderError> {
    Ok(BacktestConfig {
        initial_capital: adapter.get_double("backtest", "initial_capital", 10_000.0),
        commission_pct: adapter.get_double("backtest", "commission_pct", 0.1),
        slippage_pct: adapter.get_double("backtest", "slippage_pct", 0.0),
        timeframe,
        trailing_activation_pct: adapter.get_double("backtest", "trailing_activation_pct", 3.0),
        breakeven_trigger_r: adapter.get_double("backtest", "breakeven_trigger_r", 0.5),
        signal: build_signal_config(adapter),
        sizing: build_sizing_config(adapter),
    })
}

pub fn build_signal_config(adapter: &dyn ConfigPort) -> SignalConfig {
    let base = adapter
        .get_string("signal", "preset")
        .and_then(|name| SignalConfig::preset(&name))
        .unwrap_or_default();

    SignalConfig {
        require_htf_alignment: adapter.get_bool(
            "signal",
            "require_htf_alignment",
            base.require_htf_alignment,
        ),
        allow_equilibrium_zone: adapter.get_bool(
            "signal",
            "allow_equilibrium_zone",
            base.allow_equilibrium_zone,
        ),
        require_order_block_retest: adapter.get_bool(
            "signal",
            "require_order_block_retest",
            base.require_order_block_retest,
        ),
        order_block_proximity_percent: adapter.get_double(
            "signal",
            "order_block_proximity_percent",
            base.order_block_proximity_percent,
        ),
        min_risk_reward: adapter.get_double("signal", "min_risk_reward", base.min_risk_reward),
        cls_wick_min_percent: adapter.get_double(
            "signal",
            "cls_wick_min_percent",
            base.cls_wick_min_percent,
        ),
    }
}

pub fn build_sizing_config(adapter: &dyn ConfigPort) -> SizingConfig {
    let base = SizingConfig::default();
    SizingConfig {
        risk_percent: adapter.get_double("sizing", "risk_percent", base.risk_percent),
        max_leverage: adapter.get_double("sizing", "max_leverage", base.max_leverage),
        max_open_positions: adapter.get_int(
            "sizing",
            "max_open_positions",
            base.max_open_positions as i64,
        ) as usize,
        max_consecutive_losses: adapter.get_int(
            "sizing",
            "max_consecutive_losses",
            base.max_consecutive_losses as i64,
        ) as usize,
        daily_loss_cap_percent: adapter.get_double(
            "sizing",
            "daily_loss_cap_percent",
            base.daily_loss_cap_percent,
        ),
        monthly_loss_cap_percent: adapter.get_double(
            "sizing",
            "monthly_loss_cap_percent",
            base.monthly_loss_cap_percent,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_adapter(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    #[test]
    fn backtest_config_reads_values() {
        let adapter = make_adapter(
            r#"
[backtest]
initial_capital = 25000
commission_pct = 0.2
slippage_pct = 0.05
trailing_activation_pct = 4.0
"#,
        );
        let config = build_backtest_config(&adapter, Timeframe::H4).unwrap();
        assert!((config.initial_capital - 25_000.0).abs() < f64::EPSILON);
        assert!((config.commission_pct - 0.2).abs() < f64::EPSILON);
        assert!((config.trailing_activation_pct - 4.0).abs() < f64::EPSILON);
        assert_eq!(config.timeframe, Timeframe::H4);
    }

    #[test]
    fn signal_config_preset_with_overrides() {
        let adapter = make_adapter(
            "[signal]\npreset = strict\nmin_risk_reward = 2.5\n",
        );
        let config = build_signal_config(&adapter);
        // Preset values survive except where overridden.
        assert!(config.require_htf_alignment);
        assert!(config.require_order_block_retest);
        assert!((config.min_risk_reward - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn signal_config_defaults_to_balanced() {
        let adapter = make_adapter("[signal]\n");
        let config = build_signal_config(&adapter);
        assert_eq!(config, SignalConfig::balanced());
    }

    #[test]
    fn sizing_config_reads_values() {
        let adapter = make_adapter("[sizing]\nrisk_percent = 1.0\nmax_open_positions = 5\n");
        let config = build_sizing_config(&adapter);
        assert!((config.risk_percent - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.max_open_positions, 5);
        assert_eq!(config.max_consecutive_losses, 4);
    }

    #[test]
    fn resolve_target_prefers_overrides() {
        let adapter = make_adapter("[backtest]\ncode = BTCUSDT\ntimeframe = 1h\n");
        let (code, tf) = resolve_target(&adapter, Some("ETHUSDT"), Some("4h")).unwrap();
        assert_eq!(code, "ETHUSDT");
        assert_eq!(tf, Timeframe::H4);

        let (code, tf) = resolve_target(&adapter, None, None).unwrap();
        assert_eq!(code, "BTCUSDT");
        assert_eq!(tf, Timeframe::H1);
    }

    #[test]
    fn resolve_target_rejects_bad_timeframe() {
        let adapter = make_adapter("[backtest]\ncode = BTCUSDT\ntimeframe = 1h\n");
        let err = resolve_target(&adapter, None, Some("7m")).unwrap_err();
        assert!(matches!(err, StructraderError::UnknownTimeframe(s) if s == "7m"));
    }

    #[test]
    fn higher_timeframe_ladder() {
        assert_eq!(higher_timeframe(Timeframe::M15), Some(Timeframe::H1));
        assert_eq!(higher_timeframe(Timeframe::H1), Some(Timeframe::H4));
        assert_eq!(higher_timeframe(Timeframe::H4), Some(Timeframe::D1));
        assert_eq!(higher_timeframe(Timeframe::D1), None);
    }
}
