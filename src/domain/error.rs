//! Top-level error type and exit-code mapping.

/// Top-level error type for structrader.
#[derive(Debug, thiserror::Error)]
pub enum StructraderError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("no data for {code} on {timeframe}")]
    NoData { code: String, timeframe: String },

    #[error("insufficient data for {code} on {timeframe}: have {candles} candles, need {minimum}")]
    InsufficientData {
        code: String,
        timeframe: String,
        candles: usize,
        minimum: usize,
    },

    #[error("malformed candle data in {file}: {reason}")]
    DataFormat { file: String, reason: String },

    #[error("unknown timeframe '{0}'")]
    UnknownTimeframe(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&StructraderError> for std::process::ExitCode {
    fn from(err: &StructraderError) -> Self {
        let code: u8 = match err {
            StructraderError::Io(_) => 1,
            StructraderError::ConfigParse { .. }
            | StructraderError::ConfigMissing { .. }
            | StructraderError::ConfigInvalid { .. } => 2,
            StructraderError::DataFormat { .. } | StructraderError::UnknownTimeframe(_) => 3,
            StructraderError::NoData { .. } | StructraderError::InsufficientData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::ExitCode;

    fn code_of(err: &StructraderError) -> String {
        format!("{:?}", ExitCode::from(err))
    }

    #[test]
    fn config_errors_map_to_exit_code_two() {
        let err = StructraderError::ConfigMissing {
            section: "backtest".to_string(),
            key: "initial_capital".to_string(),
        };
        assert_eq!(code_of(&err), format!("{:?}", ExitCode::from(2)));
    }

    #[test]
    fn data_errors_map_to_exit_code_five() {
        let err = StructraderError::InsufficientData {
            code: "BTCUSDT".to_string(),
            timeframe: "1h".to_string(),
            candles: 50,
            minimum: 100,
        };
        assert_eq!(code_of(&err), format!("{:?}", ExitCode::from(5)));
    }

    #[test]
    fn io_errors_map_to_exit_code_one() {
        let err = StructraderError::Io(std::io::Error::other("boom"));
        assert_eq!(code_of(&err), format!("{:?}", ExitCode::from(1)));
    }

    #[test]
    fn display_includes_section_and_key() {
        let err = StructraderError::ConfigInvalid {
            section: "sizing".to_string(),
            key: "risk_percent".to_string(),
            reason: "must be positive".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("[sizing] risk_percent"));
        assert!(text.contains("must be positive"));
    }
}
