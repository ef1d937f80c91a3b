//! Candle data access port trait.

use crate::domain::candle::{Candle, Timeframe};
use crate::domain::error::StructraderError;

pub trait DataPort {
    fn fetch_candles(
        &self,
        code: &str,
        timeframe: Timeframe,
    ) -> Result<Vec<Candle>, StructraderError>;

    fn list_codes(&self) -> Result<Vec<String>, StructraderError>;
}
