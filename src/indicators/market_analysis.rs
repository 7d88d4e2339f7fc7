/// Volume, change and price-level helpers over bar windows
use crate::models::Bar;

/// Percent change of the last close versus the previous close (0.01 = +1%)
pub fn close_change_pct(bars: &[Bar]) -> Option<f64> {
    if bars.len() < 2 {
        return None;
    }

    let last = &bars[bars.len() - 1];
    let prev = &bars[bars.len() - 2];
    if prev.close <= 0.0 {
        return None;
    }

    Some((last.close - prev.close) / prev.close)
}

/// Average volume over the last `period` bars, current bar included
pub fn calculate_average_volume(bars: &[Bar], period: usize) -> Option<f64> {
    if bars.is_empty() || period == 0 {
        return None;
    }

    let start_idx = bars.len().saturating_sub(period);
    let recent = &bars[start_idx..];

    let total: f64 = recent.iter().map(|b| b.volume as f64).sum();
    Some(total / recent.len() as f64)
}

/// Average volume of up to `lookback` bars immediately preceding the latest one
///
/// The latest bar never contributes to its own reference average.
pub fn preceding_average_volume(bars: &[Bar], lookback: usize) -> Option<f64> {
    if bars.len() < 2 || lookback == 0 {
        return None;
    }

    let end = bars.len() - 1;
    let start = end.saturating_sub(lookback);
    let window = &bars[start..end];

    let total: f64 = window.iter().map(|b| b.volume as f64).sum();
    Some(total / window.len() as f64)
}

/// Lowest low of the last `lookback` bars
pub fn support_level(bars: &[Bar], lookback: usize) -> Option<f64> {
    if bars.is_empty() {
        return None;
    }

    let start_idx = bars.len().saturating_sub(lookback);
    bars[start_idx..]
        .iter()
        .map(|b| b.low)
        .fold(None, |acc: Option<f64>, low| Some(acc.map_or(low, |a| a.min(low))))
}

/// Highest high of the last `lookback` bars
pub fn resistance_level(bars: &[Bar], lookback: usize) -> Option<f64> {
    if bars.is_empty() {
        return None;
    }

    let start_idx = bars.len().saturating_sub(lookback);
    bars[start_idx..]
        .iter()
        .map(|b| b.high)
        .fold(None, |acc: Option<f64>, high| Some(acc.map_or(high, |a| a.max(high))))
}
