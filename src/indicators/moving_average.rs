use crate::models::Bar;

/// Calculate Simple Moving Average (SMA) over the most recent `period` values
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let sum: f64 = prices.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Last close above its SMA (trend flag, informational only)
pub fn is_above_sma(bars: &[Bar], period: usize) -> Option<bool> {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let sma = calculate_sma(&closes, period)?;
    let last = closes.last()?;
    Some(*last > sma)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma() {
        let prices = vec![100.0, 102.0, 104.0, 106.0, 108.0];
        let sma = calculate_sma(&prices, 5);
        assert_eq!(sma, Some(104.0));
    }

    #[test]
    fn test_sma_uses_most_recent_values() {
        let prices = vec![1.0, 100.0, 102.0, 104.0];
        assert_eq!(calculate_sma(&prices, 3), Some(102.0));
    }

    #[test]
    fn test_sma_insufficient_data() {
        let prices = vec![100.0, 102.0];
        let sma = calculate_sma(&prices, 5);
        assert!(sma.is_none());
    }

    #[test]
    fn test_above_sma() {
        let mut bars: Vec<Bar> = (0..19)
            .map(|_| Bar::new(100.0, 101.0, 99.0, 100.0, 1_000))
            .collect();
        bars.push(Bar::new(100.0, 106.0, 99.0, 105.0, 1_000));

        assert_eq!(is_above_sma(&bars, 20), Some(true));
        assert_eq!(is_above_sma(&bars[..10], 20), None);
    }
}
