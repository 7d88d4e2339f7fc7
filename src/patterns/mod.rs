//! Candlestick pattern classifier
//!
//! Pure functions over bars. Shape detectors return `false` on a zero range bar
//! (the doji detector returns `true`), so no division by zero can occur.
use crate::models::{Bar, PatternKind, PatternMatch};

const HAMMER_MAX_BODY_PCT: f64 = 0.35;
const HAMMER_SHADOW_TO_BODY: f64 = 2.0;
const HAMMER_MAX_OPPOSITE_SHADOW_PCT: f64 = 0.10;
const HAMMER_BODY_ZONE_PCT: f64 = 0.20;
const SOLDIERS_MAX_BODY_RATIO: f64 = 1.5;
const SOLDIERS_MAX_UPPER_SHADOW_PCT: f64 = 0.25;
const DOJI_MAX_BODY_PCT: f64 = 0.10;

/// Small body near the top of the range with a long lower shadow
pub fn detect_hammer(bar: &Bar) -> bool {
    let range = bar.range();
    if range <= 0.0 {
        return false;
    }

    let body = bar.body();
    if body / range > HAMMER_MAX_BODY_PCT {
        return false;
    }
    if bar.lower_shadow() < body * HAMMER_SHADOW_TO_BODY {
        return false;
    }
    if bar.upper_shadow() > range * HAMMER_MAX_OPPOSITE_SHADOW_PCT {
        return false;
    }

    // Top of the body must sit in the upper 20% of the range
    let body_position = (bar.open.max(bar.close) - bar.low) / range;
    body_position >= 1.0 - HAMMER_BODY_ZONE_PCT
}

/// Mirror of the hammer: small body near the bottom with a long upper shadow
pub fn detect_inverted_hammer(bar: &Bar) -> bool {
    let range = bar.range();
    if range <= 0.0 {
        return false;
    }

    let body = bar.body();
    if body / range > HAMMER_MAX_BODY_PCT {
        return false;
    }
    if bar.upper_shadow() < body * HAMMER_SHADOW_TO_BODY {
        return false;
    }
    if bar.lower_shadow() > range * HAMMER_MAX_OPPOSITE_SHADOW_PCT {
        return false;
    }

    let body_position = (bar.open.max(bar.close) - bar.low) / range;
    body_position <= HAMMER_BODY_ZONE_PCT
}

pub fn detect_bullish_engulfing(prev: &Bar, current: &Bar) -> bool {
    prev.is_bearish()
        && current.is_bullish()
        && current.open <= prev.close
        && current.close >= prev.open
}

pub fn detect_piercing_line(prev: &Bar, current: &Bar) -> bool {
    if !prev.is_bearish() || !current.is_bullish() {
        return false;
    }
    if current.open >= prev.close {
        return false;
    }

    let prev_mid = (prev.open + prev.close) / 2.0;
    current.close > prev_mid
}

/// Three rising green bars of similar size with short upper shadows
pub fn detect_three_white_soldiers(bars: &[Bar]) -> bool {
    if bars.len() < 3 {
        return false;
    }

    let last_three = &bars[bars.len() - 3..];
    if !last_three.iter().all(Bar::is_bullish) {
        return false;
    }
    if !(last_three[0].close < last_three[1].close && last_three[1].close < last_three[2].close) {
        return false;
    }

    let bodies: Vec<f64> = last_three.iter().map(Bar::body).collect();
    let min_body = bodies.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_body = bodies.iter().cloned().fold(0.0, f64::max);
    if max_body > min_body * SOLDIERS_MAX_BODY_RATIO {
        return false;
    }

    last_three.iter().all(|bar| {
        let range = bar.range();
        range <= 0.0 || bar.upper_shadow() / range <= SOLDIERS_MAX_UPPER_SHADOW_PCT
    })
}

pub fn detect_doji(bar: &Bar) -> bool {
    let range = bar.range();
    if range <= 0.0 {
        return true;
    }
    bar.body() / range < DOJI_MAX_BODY_PCT
}

pub fn detect_bearish_engulfing(prev: &Bar, current: &Bar) -> bool {
    prev.is_bullish()
        && current.is_bearish()
        && current.open >= prev.close
        && current.close <= prev.open
}

/// Same shape as the inverted hammer; trend context is not checked
pub fn detect_shooting_star(bar: &Bar) -> bool {
    detect_inverted_hammer(bar)
}

/// Same shape as the hammer; trend context is not checked
pub fn detect_hanging_man(bar: &Bar) -> bool {
    detect_hammer(bar)
}

/// Highest priority bullish pattern on the latest bars, if any
///
/// Priority: three white soldiers (90), bullish engulfing (85), piercing line (80),
/// hammer (75), inverted hammer (70). Needs at least 3 bars.
pub fn detect_bullish_pattern(bars: &[Bar]) -> Option<PatternMatch> {
    if bars.len() < 3 {
        return None;
    }

    let last = &bars[bars.len() - 1];
    let prev = &bars[bars.len() - 2];

    let kind = if detect_three_white_soldiers(bars) {
        PatternKind::ThreeWhiteSoldiers
    } else if detect_bullish_engulfing(prev, last) {
        PatternKind::BullishEngulfing
    } else if detect_piercing_line(prev, last) {
        PatternKind::PiercingLine
    } else if detect_hammer(last) {
        PatternKind::Hammer
    } else if detect_inverted_hammer(last) {
        PatternKind::InvertedHammer
    } else {
        return None;
    };

    Some(PatternMatch {
        kind,
        confidence: confidence(kind),
    })
}

/// Highest priority bearish pattern on the latest bars, if any
pub fn detect_bearish_pattern(bars: &[Bar]) -> Option<PatternMatch> {
    if bars.len() < 2 {
        return None;
    }

    let last = &bars[bars.len() - 1];
    let prev = &bars[bars.len() - 2];

    let kind = if detect_doji(last) {
        PatternKind::Doji
    } else if detect_bearish_engulfing(prev, last) {
        PatternKind::BearishEngulfing
    } else if detect_shooting_star(last) {
        PatternKind::ShootingStar
    } else if detect_hanging_man(last) {
        PatternKind::HangingMan
    } else {
        return None;
    };

    Some(PatternMatch {
        kind,
        confidence: confidence(kind),
    })
}

pub fn confidence(kind: PatternKind) -> u8 {
    match kind {
        PatternKind::ThreeWhiteSoldiers => 90,
        PatternKind::BullishEngulfing => 85,
        PatternKind::PiercingLine => 80,
        PatternKind::Hammer => 75,
        PatternKind::InvertedHammer => 70,
        PatternKind::Doji => 60,
        PatternKind::BearishEngulfing => 85,
        PatternKind::ShootingStar => 75,
        PatternKind::HangingMan => 75,
    }
}

/// Candle volume must reach `multiplier` times the reference average
pub fn validate_volume(bar: &Bar, avg_volume: f64, multiplier: f64) -> bool {
    if avg_volume <= 0.0 {
        return false;
    }
    bar.volume as f64 / avg_volume >= multiplier
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar::new(open, high, low, close, 1_000_000)
    }

    fn bearish_filler() -> Bar {
        bar(101.0, 101.5, 99.5, 100.0)
    }

    #[test]
    fn test_zero_range_bar() {
        let flat = bar(100.0, 100.0, 100.0, 100.0);
        assert!(detect_doji(&flat));
        assert!(!detect_hammer(&flat));
        assert!(!detect_inverted_hammer(&flat));
        assert!(!detect_shooting_star(&flat));
        assert!(!detect_hanging_man(&flat));
    }

    #[test]
    fn test_hammer() {
        // Body 0.5 at the top of a 6.0 range, long lower shadow
        let hammer = bar(100.0, 100.55, 94.55, 100.5);
        assert!(detect_hammer(&hammer));
        assert!(!detect_inverted_hammer(&hammer));
    }

    #[test]
    fn test_hammer_with_quarter_body() {
        // Body 1.0 of a 4.0 range, top of the body at the high
        let hammer = bar(100.0, 101.0, 97.0, 101.0);
        assert!(detect_hammer(&hammer));
    }

    #[test]
    fn test_hammer_rejects_long_upper_shadow() {
        // Upper shadow 1.5 exceeds 10% of the 7.0 range
        let candle = bar(100.0, 102.0, 95.0, 100.5);
        assert!(!detect_hammer(&candle));
    }

    #[test]
    fn test_hammer_rejects_large_body() {
        let candle = bar(98.0, 100.6, 95.0, 100.5);
        assert!(!detect_hammer(&candle));
    }

    #[test]
    fn test_inverted_hammer() {
        let inverted = bar(100.0, 106.0, 99.95, 100.5);
        assert!(detect_inverted_hammer(&inverted));
        assert!(!detect_hammer(&inverted));
    }

    #[test]
    fn test_bullish_engulfing() {
        let prev = bar(102.0, 103.0, 100.0, 100.5);
        let current = bar(100.0, 104.0, 99.0, 103.5);
        assert!(detect_bullish_engulfing(&prev, &current));
        assert!(!detect_bullish_engulfing(&current, &prev));
    }

    #[test]
    fn test_piercing_line() {
        let prev = bar(104.0, 104.5, 99.5, 100.0);
        let current = bar(99.0, 103.0, 98.5, 102.5);
        assert!(detect_piercing_line(&prev, &current));

        // Close below the midpoint of the previous body
        let weak = bar(99.0, 101.5, 98.5, 101.0);
        assert!(!detect_piercing_line(&prev, &weak));
    }

    #[test]
    fn test_three_white_soldiers() {
        let bars = vec![
            bar(100.0, 102.2, 99.9, 102.0),
            bar(101.5, 103.7, 101.4, 103.5),
            bar(103.0, 105.2, 102.9, 105.0),
        ];
        assert!(detect_three_white_soldiers(&bars));

        let result = detect_bullish_pattern(&bars).unwrap();
        assert_eq!(result.kind, PatternKind::ThreeWhiteSoldiers);
        assert_eq!(result.confidence, 90);
    }

    #[test]
    fn test_three_white_soldiers_rejects_uneven_bodies() {
        let bars = vec![
            bar(100.0, 101.1, 99.9, 101.0),
            bar(101.0, 104.1, 100.9, 104.0),
            bar(104.0, 105.1, 103.9, 105.0),
        ];
        assert!(!detect_three_white_soldiers(&bars));
    }

    #[test]
    fn test_engulfing_takes_priority_over_hammer() {
        let prev = bar(100.2, 100.3, 99.9, 100.0);
        let current = bar(99.95, 100.33, 98.0, 100.3);

        assert!(detect_bullish_engulfing(&prev, &current));
        assert!(detect_hammer(&current));

        let bars = vec![bearish_filler(), prev, current];
        let result = detect_bullish_pattern(&bars).unwrap();
        assert_eq!(result.kind, PatternKind::BullishEngulfing);
        assert_eq!(result.confidence, 85);
    }

    #[test]
    fn test_bullish_pattern_needs_three_bars() {
        let bars = vec![bar(100.2, 100.3, 99.9, 100.0), bar(99.95, 100.33, 98.0, 100.3)];
        assert!(detect_bullish_pattern(&bars).is_none());
    }

    #[test]
    fn test_no_bullish_pattern() {
        let bars = vec![bearish_filler(), bearish_filler(), bearish_filler()];
        assert!(detect_bullish_pattern(&bars).is_none());
    }

    #[test]
    fn test_bearish_pattern_priority() {
        let doji = bar(100.0, 101.0, 99.0, 100.05);
        let bars = vec![bearish_filler(), doji];
        let result = detect_bearish_pattern(&bars).unwrap();
        assert_eq!(result.kind, PatternKind::Doji);
        assert_eq!(result.confidence, 60);

        let prev = bar(100.0, 103.0, 99.5, 102.5);
        let current = bar(103.0, 103.5, 99.0, 99.5);
        let result = detect_bearish_pattern(&[prev, current]).unwrap();
        assert_eq!(result.kind, PatternKind::BearishEngulfing);
    }

    #[test]
    fn test_validate_volume() {
        let candle = Bar::new(100.0, 101.0, 99.0, 100.5, 1_200);
        assert!(validate_volume(&candle, 1_000.0, 1.2));
        assert!(!validate_volume(&candle, 1_001.0, 1.2));
        assert!(!validate_volume(&candle, 0.0, 1.2));
    }
}
