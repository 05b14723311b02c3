//! Indicator math over a window of bars.

use chrono::Utc;
use tplan_models::{Candle, IndicatorSnapshot, StructureSignal, Timeframe};

pub const ATR_PERIOD: usize = 14;
pub const RSI_PERIOD: usize = 14;
pub const EMA_PERIOD: usize = 20;

/// Bars on each side a swing point must dominate.
const SWING_WINDOW: usize = 2;

/// Average true range over the last `period` bars (simple average of TR).
pub fn atr(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    let true_ranges: Vec<f64> = candles
        .windows(2)
        .map(|w| {
            let prev_close = w[0].close;
            let bar = &w[1];
            (bar.high - bar.low)
                .max((bar.high - prev_close).abs())
                .max((bar.low - prev_close).abs())
        })
        .collect();

    let recent = &true_ranges[true_ranges.len() - period..];
    Some(recent.iter().sum::<f64>() / period as f64)
}

/// RSI = 100 - 100 / (1 + avg_gain / avg_loss) over the last `period` changes.
pub fn rsi(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    let changes: Vec<f64> = candles.windows(2).map(|w| w[1].close - w[0].close).collect();
    let recent = &changes[changes.len() - period..];

    let avg_gain = recent.iter().filter(|c| **c > 0.0).sum::<f64>() / period as f64;
    let avg_loss = recent.iter().filter(|c| **c < 0.0).map(|c| c.abs()).sum::<f64>() / period as f64;

    if avg_loss == 0.0 {
        return Some(if avg_gain == 0.0 { 50.0 } else { 100.0 });
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Exponential moving average of closes, seeded with the SMA of the first
/// `period` closes.
pub fn ema(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period {
        return None;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let seed = candles[..period].iter().map(|c| c.close).sum::<f64>() / period as f64;
    Some(
        candles[period..]
            .iter()
            .fold(seed, |prev, c| c.close * k + prev * (1.0 - k)),
    )
}

/// Cumulative volume delta, approximating each bar's aggressor side from
/// its direction: up bars add volume, down bars subtract it.
pub fn cvd(candles: &[Candle]) -> f64 {
    candles
        .iter()
        .map(|c| {
            if c.close > c.open {
                c.volume
            } else if c.close < c.open {
                -c.volume
            } else {
                0.0
            }
        })
        .sum()
}

/// (index, price) of swing highs and swing lows.
fn swing_points(candles: &[Candle]) -> (Vec<(usize, f64)>, Vec<(usize, f64)>) {
    let mut highs = Vec::new();
    let mut lows = Vec::new();
    if candles.len() < SWING_WINDOW * 2 + 1 {
        return (highs, lows);
    }

    for i in SWING_WINDOW..candles.len() - SWING_WINDOW {
        let neighbours = (i - SWING_WINDOW..=i + SWING_WINDOW).filter(|j| *j != i);
        let bar = &candles[i];
        if neighbours.clone().all(|j| bar.high > candles[j].high) {
            highs.push((i, bar.high));
        }
        if neighbours.clone().all(|j| bar.low < candles[j].low) {
            lows.push((i, bar.low));
        }
    }
    (highs, lows)
}

/// Change of character on the last bar.
///
/// Bullish when the two most recent swing highs and lows are both falling
/// and the last close breaks above the latest swing high; bearish is the
/// mirror image.
pub fn detect_choch(candles: &[Candle]) -> Option<StructureSignal> {
    let (highs, lows) = swing_points(candles);
    if highs.len() < 2 || lows.len() < 2 {
        return None;
    }

    let last_close = candles.last()?.close;
    let (prev_high, last_high) = (highs[highs.len() - 2].1, highs[highs.len() - 1].1);
    let (prev_low, last_low) = (lows[lows.len() - 2].1, lows[lows.len() - 1].1);

    let bearish_structure = last_high < prev_high && last_low < prev_low;
    let bullish_structure = last_high > prev_high && last_low > prev_low;

    if bearish_structure && last_close > last_high {
        Some(StructureSignal::ChochBull)
    } else if bullish_structure && last_close < last_low {
        Some(StructureSignal::ChochBear)
    } else {
        None
    }
}

/// Compute a snapshot from bars ordered oldest first. None when empty.
pub fn compute_snapshot(
    symbol: &str,
    timeframe: Timeframe,
    candles: &[Candle],
) -> Option<IndicatorSnapshot> {
    let last = candles.last()?;
    let atr_value = atr(candles, ATR_PERIOD);
    let volatility = atr_value
        .filter(|_| last.close > 0.0)
        .map(|a| a / last.close * 100.0);

    Some(IndicatorSnapshot {
        symbol: symbol.to_string(),
        timeframe,
        computed_at: Utc::now(),
        bar_count: candles.len(),
        last_bar_at: last.timestamp,
        last_close: last.close,
        atr: atr_value,
        volatility,
        rsi: rsi(candles, RSI_PERIOD),
        ema: ema(candles, EMA_PERIOD),
        cvd: cvd(candles),
        structure: detect_choch(candles),
    })
}
