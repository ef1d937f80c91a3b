#![allow(dead_code)]

use std::collections::HashMap;
use structrader::domain::candle::{Candle, Timeframe};
use structrader::domain::error::StructraderError;
use structrader::ports::data_port::DataPort;

pub const HOUR_MS: i64 = 3_600_000;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<Candle>>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
        }
    }

    pub fn with_candles(mut self, code: &str, candles: Vec<Candle>) -> Self {
        self.data.insert(code.to_string(), candles);
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_candles(
        &self,
        code: &str,
        timeframe: Timeframe,
    ) -> Result<Vec<Candle>, StructraderError> {
        self.data
            .get(code)
            .cloned()
            .ok_or_else(|| StructraderError::NoData {
                code: code.to_string(),
                timeframe: timeframe.label().to_string(),
            })
    }

    fn list_codes(&self) -> Result<Vec<String>, StructraderError> {
        let mut codes: Vec<String> = self.data.keys().cloned().collect();
        codes.sort();
        Ok(codes)
    }
}

pub fn make_candle(index: usize, open: f64, high: f64, low: f64, close: f64) -> Candle {
    Candle {
        timestamp: index as i64 * HOUR_MS,
        open,
        high,
        low,
        close,
        volume: 1_000.0,
    }
}

/// A steady uptrend with a periodic spike high so swings confirm.
pub fn trending_candles(count: usize) -> Vec<Candle> {
    (0..count)
        .map(|i| {
            let open = 100.0 + i as f64;
            let spike = if i % 7 == 3 { 2.5 } else { 0.0 };
            make_candle(i, open, open + 0.6 + spike, open - 0.05, open + 0.6)
        })
        .collect()
}

/// A tight sideways tape that should never produce a confirmed break.
pub fn ranging_candles(count: usize) -> Vec<Candle> {
    (0..count)
        .map(|i| {
            let wiggle = (i % 4) as f64 * 0.05;
            make_candle(i, 100.0 + wiggle, 100.2 + wiggle, 99.8 + wiggle, 100.1 + wiggle)
        })
        .collect()
}

/// Render candles as the CSV format the data adapter reads.
pub fn candles_to_csv(candles: &[Candle]) -> String {
    let mut out = String::from("timestamp,open,high,low,close,volume\n");
    for c in candles {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            c.timestamp, c.open, c.high, c.low, c.close, c.volume
        ));
    }
    out
}
