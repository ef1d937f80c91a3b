//! Configuration validation.
//!
//! All config fields are checked before a backtest or signal run starts.

use crate::domain::candle::Timeframe;
use crate::domain::error::StructraderError;
use crate::domain::signal::{MAX_RISK_REWARD, SignalConfig};
use crate::domain::sizing::MAX_RISK_CEILING_PCT;
use crate::ports::config_port::ConfigPort;

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), StructraderError> {
    validate_initial_capital(config)?;
    validate_costs(config)?;
    validate_timeframe(config)?;
    validate_data_dir(config)?;
    validate_code(config)?;
    validate_exit_management(config)?;
    Ok(())
}

pub fn validate_signal_config(config: &dyn ConfigPort) -> Result<(), StructraderError> {
    if let Some(preset) = config.get_string("signal", "preset") {
        if SignalConfig::preset(&preset).is_none() {
            return Err(StructraderError::ConfigInvalid {
                section: "signal".to_string(),
                key: "preset".to_string(),
                reason: format!(
                    "unknown preset '{}', expected strict, balanced or optimized",
                    preset
                ),
            });
        }
    }

    let rr = config.get_double("signal", "min_risk_reward", 2.0);
    if rr <= 0.0 || rr > MAX_RISK_REWARD {
        return Err(StructraderError::ConfigInvalid {
            section: "signal".to_string(),
            key: "min_risk_reward".to_string(),
            reason: format!("min_risk_reward must be in (0, {}]", MAX_RISK_REWARD),
        });
    }

    let proximity = config.get_double("signal", "order_block_proximity_percent", 1.0);
    if proximity < 0.0 {
        return Err(StructraderError::ConfigInvalid {
            section: "signal".to_string(),
            key: "order_block_proximity_percent".to_string(),
            reason: "order_block_proximity_percent must be non-negative".to_string(),
        });
    }

    let wick = config.get_double("signal", "cls_wick_min_percent", 40.0);
    if !(0.0..=100.0).contains(&wick) {
        return Err(StructraderError::ConfigInvalid {
            section: "signal".to_string(),
            key: "cls_wick_min_percent".to_string(),
            reason: "cls_wick_min_percent must be between 0 and 100".to_string(),
        });
    }

    Ok(())
}

pub fn validate_sizing_config(config: &dyn ConfigPort) -> Result<(), StructraderError> {
    let risk = config.get_double("sizing", "risk_percent", 2.0);
    if risk <= 0.0 || risk > MAX_RISK_CEILING_PCT {
        return Err(StructraderError::ConfigInvalid {
            section: "sizing".to_string(),
            key: "risk_percent".to_string(),
            reason: format!("risk_percent must be in (0, {}]", MAX_RISK_CEILING_PCT),
        });
    }

    let leverage = config.get_double("sizing", "max_leverage", 3.0);
    if leverage < 1.0 {
        return Err(StructraderError::ConfigInvalid {
            section: "sizing".to_string(),
            key: "max_leverage".to_string(),
            reason: "max_leverage must be at least 1".to_string(),
        });
    }

    let positions = config.get_int("sizing", "max_open_positions", 3);
    if positions < 1 {
        return Err(StructraderError::ConfigInvalid {
            section: "sizing".to_string(),
            key: "max_open_positions".to_string(),
            reason: "max_open_positions must be at least 1".to_string(),
        });
    }

    let streak = config.get_int("sizing", "max_consecutive_losses", 4);
    if streak < 1 {
        return Err(StructraderError::ConfigInvalid {
            section: "sizing".to_string(),
            key: "max_consecutive_losses".to_string(),
            reason: "max_consecutive_losses must be at least 1".to_string(),
        });
    }

    for key in ["daily_loss_cap_percent", "monthly_loss_cap_percent"] {
        let value = config.get_double("sizing", key, 0.0);
        if value < 0.0 {
            return Err(StructraderError::ConfigInvalid {
                section: "sizing".to_string(),
                key: key.to_string(),
                reason: format!("{} must be non-negative", key),
            });
        }
    }

    Ok(())
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), StructraderError> {
    let value = config.get_double("backtest", "initial_capital", 0.0);
    if value <= 0.0 {
        return Err(StructraderError::ConfigInvalid {
            section: "backtest".to_string(),
            key: "initial_capital".to_string(),
            reason: "initial_capital must be positive".to_string(),
        });
    }
    Ok(())
}

fn validate_costs(config: &dyn ConfigPort) -> Result<(), StructraderError> {
    for key in ["commission_pct", "slippage_pct"] {
        let value = config.get_double("backtest", key, 0.0);
        if value < 0.0 {
            return Err(StructraderError::ConfigInvalid {
                section: "backtest".to_string(),
                key: key.to_string(),
                reason: format!("{} must be non-negative", key),
            });
        }
    }
    Ok(())
}

fn validate_timeframe(config: &dyn ConfigPort) -> Result<(), StructraderError> {
    match config.get_string("backtest", "timeframe") {
        None => Err(StructraderError::ConfigMissing {
            section: "backtest".to_string(),
            key: "timeframe".to_string(),
        }),
        Some(s) => match Timeframe::parse(&s) {
            Some(_) => Ok(()),
            None => Err(StructraderError::ConfigInvalid {
                section: "backtest".to_string(),
                key: "timeframe".to_string(),
                reason: format!("unknown timeframe '{}', expected 15m, 1h, 4h or 1d", s),
            }),
        },
    }
}

fn validate_data_dir(config: &dyn ConfigPort) -> Result<(), StructraderError> {
    match config.get_string("backtest", "data_dir") {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(StructraderError::ConfigMissing {
            section: "backtest".to_string(),
            key: "data_dir".to_string(),
        }),
    }
}

fn validate_code(config: &dyn ConfigPort) -> Result<(), StructraderError> {
    match config.get_string("backtest", "code") {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(StructraderError::ConfigMissing {
            section: "backtest".to_string(),
            key: "code".to_string(),
        }),
    }
}

fn validate_exit_management(config: &dyn ConfigPort) -> Result<(), StructraderError> {
    let trailing = config.get_double("backtest", "trailing_activation_pct", 3.0);
    if trailing < 0.0 {
        return Err(StructraderError::ConfigInvalid {
            section: "backtest".to_string(),
            key: "trailing_activation_pct".to_string(),
            reason: "trailing_activation_pct must be non-negative".to_string(),
        });
    }
    let breakeven = config.get_double("backtest", "breakeven_trigger_r", 0.5);
    if breakeven < 0.0 {
        return Err(StructraderError::ConfigInvalid {
            section: "backtest".to_string(),
            key: "breakeven_trigger_r".to_string(),
            reason: "breakeven_trigger_r must be non-negative".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    fn valid_backtest_section() -> &'static str {
        r#"
[backtest]
initial_capital = 10000.0
commission_pct = 0.1
slippage_pct = 0.05
timeframe = 1h
data_dir = ./data
code = BTCUSDT
"#
    }

    #[test]
    fn valid_backtest_config_passes() {
        let config = make_config(valid_backtest_section());
        assert!(validate_backtest_config(&config).is_ok());
    }

    #[test]
    fn initial_capital_must_be_positive() {
        let config = make_config(
            "[backtest]\ninitial_capital = -100\ntimeframe = 1h\ndata_dir = ./data\ncode = X\n",
        );
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(
            matches!(err, StructraderError::ConfigInvalid { key, .. } if key == "initial_capital")
        );
    }

    #[test]
    fn missing_timeframe_fails() {
        let config =
            make_config("[backtest]\ninitial_capital = 10000\ndata_dir = ./data\ncode = X\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, StructraderError::ConfigMissing { key, .. } if key == "timeframe"));
    }

    #[test]
    fn bad_timeframe_fails() {
        let config = make_config(
            "[backtest]\ninitial_capital = 10000\ntimeframe = 2h\ndata_dir = ./data\ncode = X\n",
        );
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, StructraderError::ConfigInvalid { key, .. } if key == "timeframe"));
    }

    #[test]
    fn missing_code_fails() {
        let config =
            make_config("[backtest]\ninitial_capital = 10000\ntimeframe = 1h\ndata_dir = ./data\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, StructraderError::ConfigMissing { key, .. } if key == "code"));
    }

    #[test]
    fn negative_commission_fails() {
        let config = make_config(
            "[backtest]\ninitial_capital = 10000\ncommission_pct = -0.1\ntimeframe = 1h\ndata_dir = ./data\ncode = X\n",
        );
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(
            matches!(err, StructraderError::ConfigInvalid { key, .. } if key == "commission_pct")
        );
    }

    #[test]
    fn signal_defaults_pass() {
        let config = make_config("[signal]\n");
        assert!(validate_signal_config(&config).is_ok());
    }

    #[test]
    fn unknown_preset_fails() {
        let config = make_config("[signal]\npreset = aggressive\n");
        let err = validate_signal_config(&config).unwrap_err();
        assert!(matches!(err, StructraderError::ConfigInvalid { key, .. } if key == "preset"));
    }

    #[test]
    fn risk_reward_above_cap_fails() {
        let config = make_config("[signal]\nmin_risk_reward = 50\n");
        let err = validate_signal_config(&config).unwrap_err();
        assert!(
            matches!(err, StructraderError::ConfigInvalid { key, .. } if key == "min_risk_reward")
        );
    }

    #[test]
    fn wick_percent_out_of_range_fails() {
        let config = make_config("[signal]\ncls_wick_min_percent = 150\n");
        let err = validate_signal_config(&config).unwrap_err();
        assert!(
            matches!(err, StructraderError::ConfigInvalid { key, .. } if key == "cls_wick_min_percent")
        );
    }

    #[test]
    fn sizing_defaults_pass() {
        let config = make_config("[sizing]\n");
        assert!(validate_sizing_config(&config).is_ok());
    }

    #[test]
    fn risk_percent_above_ceiling_fails() {
        let config = make_config("[sizing]\nrisk_percent = 10\n");
        let err = validate_sizing_config(&config).unwrap_err();
        assert!(matches!(err, StructraderError::ConfigInvalid { key, .. } if key == "risk_percent"));
    }

    #[test]
    fn leverage_below_one_fails() {
        let config = make_config("[sizing]\nmax_leverage = 0.5\n");
        let err = validate_sizing_config(&config).unwrap_err();
        assert!(matches!(err, StructraderError::ConfigInvalid { key, .. } if key == "max_leverage"));
    }

    #[test]
    fn zero_open_positions_fails() {
        let config = make_config("[sizing]\nmax_open_positions = 0\n");
        let err = validate_sizing_config(&config).unwrap_err();
        assert!(
            matches!(err, StructraderError::ConfigInvalid { key, .. } if key == "max_open_positions")
        );
    }
}
