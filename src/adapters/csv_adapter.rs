//! CSV candle data adapter.
//!
//! Files are named `{code}_{timeframe}.csv` with a header row and columns
//! `timestamp,open,high,low,close,volume`, timestamps in epoch milliseconds.

use crate::domain::candle::{Candle, Timeframe};
use crate::domain::error::StructraderError;
use crate::ports::data_port::DataPort;
use std::fs;
use std::path::PathBuf;

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, code: &str, timeframe: Timeframe) -> PathBuf {
        self.base_path
            .join(format!("{}_{}.csv", code, timeframe.label()))
    }

    fn parse_field<T: std::str::FromStr>(
        record: &csv::StringRecord,
        index: usize,
        name: &str,
        file: &str,
    ) -> Result<T, StructraderError>
    where
        T::Err: std::fmt::Display,
    {
        record
            .get(index)
            .ok_or_else(|| StructraderError::DataFormat {
                file: file.to_string(),
                reason: format!("missing {} column", name),
            })?
            .trim()
            .parse()
            .map_err(|e| StructraderError::DataFormat {
                file: file.to_string(),
                reason: format!("invalid {} value: {}", name, e),
            })
    }
}

impl DataPort for CsvAdapter {
    fn fetch_candles(
        &self,
        code: &str,
        timeframe: Timeframe,
    ) -> Result<Vec<Candle>, StructraderError> {
        let path = self.csv_path(code, timeframe);
        let file = path.display().to_string();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StructraderError::NoData {
                    code: code.to_string(),
                    timeframe: timeframe.label().to_string(),
                });
            }
            Err(e) => return Err(StructraderError::Io(e)),
        };

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut candles: Vec<Candle> = Vec::new();

        for result in rdr.records() {
            let record = result.map_err(|e| StructraderError::DataFormat {
                file: file.clone(),
                reason: format!("CSV parse error: {}", e),
            })?;

            let candle = Candle {
                timestamp: Self::parse_field(&record, 0, "timestamp", &file)?,
                open: Self::parse_field(&record, 1, "open", &file)?,
                high: Self::parse_field(&record, 2, "high", &file)?,
                low: Self::parse_field(&record, 3, "low", &file)?,
                close: Self::parse_field(&record, 4, "close", &file)?,
                volume: Self::parse_field(&record, 5, "volume", &file)?,
            };

            if let Some(prev) = candles.last() {
                if candle.timestamp <= prev.timestamp {
                    return Err(StructraderError::DataFormat {
                        file: file.clone(),
                        reason: format!(
                            "timestamps must be strictly ascending, {} follows {}",
                            candle.timestamp, prev.timestamp
                        ),
                    });
                }
            }
            candles.push(candle);
        }

        if candles.is_empty() {
            return Err(StructraderError::NoData {
                code: code.to_string(),
                timeframe: timeframe.label().to_string(),
            });
        }

        Ok(candles)
    }

    fn list_codes(&self) -> Result<Vec<String>, StructraderError> {
        let entries = fs::read_dir(&self.base_path)?;
        let mut codes = Vec::new();

        for entry in entries {
            let name = entry?.file_name();
            let name_str = name.to_string_lossy();
            let Some(stem) = name_str.strip_suffix(".csv") else {
                continue;
            };
            if let Some((code, tf)) = stem.rsplit_once('_') {
                if Timeframe::parse(tf).is_some() && !codes.contains(&code.to_string()) {
                    codes.push(code.to_string());
                }
            }
        }

        codes.sort();
        Ok(codes)
    }
}
