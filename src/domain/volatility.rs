//! ATR helper used by volatility-scaled position sizing.

use crate::domain::candle::Candle;

/// Average true range with Wilder smoothing. Returns one value per candle;
/// the first `period - 1` entries are `None` while the seed accumulates.
/// Fewer candles than `period` (or a zero period) yields an empty vector.
pub fn calc_atr(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    if candles.len() < period || period == 0 {
        return Vec::new();
    }

    let mut tr_values: Vec<f64> = Vec::with_capacity(candles.len());
    for (i, candle) in candles.iter().enumerate() {
        let tr = if i == 0 {
            candle.high - candle.low
        } else {
            candle.true_range(candles[i - 1].close)
        };
        tr_values.push(tr);
    }

    let mut results: Vec<Option<f64>> = Vec::with_capacity(candles.len());
    let mut prev_atr = 0.0;

    for i in 0..candles.len() {
        if i < period - 1 {
            results.push(None);
        } else if i == period - 1 {
            prev_atr = tr_values[0..=i].iter().sum::<f64>() / period as f64;
            results.push(Some(prev_atr));
        } else {
            prev_atr = (prev_atr * (period - 1) as f64 + tr_values[i]) / period as f64;
            results.push(Some(prev_atr));
        }
    }

    results
}

/// Latest ATR as a fraction of the latest close, plus its average over the
/// valid window. Inputs for the volatility-scaled sizing heuristic.
pub fn atr_ratio(candles: &[Candle], period: usize) -> Option<(f64, f64)> {
    let atr = calc_atr(candles, period);
    let close = candles.last()?.close;
    if close <= 0.0 {
        return None;
    }

    let valid: Vec<f64> = atr.iter().flatten().copied().collect();
    let latest = *valid.last()?;
    let avg = valid.iter().sum::<f64>() / valid.len() as f64;

    Some((latest / close, avg / close))
}
