//! Decimal arithmetic utilities for financial calculations.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Round a decimal to a specific number of decimal places.
///
/// `Decimal`'s `{:.N}` formatting truncates, so display paths round first.
pub fn round_to_precision(value: Decimal, decimals: u32) -> Decimal {
    value.round_dp(decimals)
}

/// Lossy conversion for statistics that need floating point.
pub fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// Convert back from `f64`, mapping NaN and infinities to zero.
pub fn from_f64(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or(Decimal::ZERO)
}

/// Express an amount in display units (e.g. 10,000 for "万").
pub fn scale_to_unit(value: Decimal, unit: Decimal) -> Decimal {
    if unit <= Decimal::ZERO {
        return value;
    }
    value / unit
}

/// Arithmetic mean, zero for an empty slice.
pub fn mean(values: &[Decimal]) -> Decimal {
    if values.is_empty() {
        return Decimal::ZERO;
    }
    values.iter().sum::<Decimal>() / Decimal::from(values.len())
}

/// Sample standard deviation (n - 1 denominator), zero below two values.
pub fn sample_std_dev(values: &[Decimal]) -> Decimal {
    if values.len() < 2 {
        return Decimal::ZERO;
    }

    let samples: Vec<f64> = values.iter().copied().map(to_f64).collect();
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);

    from_f64(variance.sqrt())
}

/// Percentile of an ascending slice with linear interpolation between ranks.
///
/// `p` is a fraction in `[0, 1]` and is clamped to that range.
pub fn percentile(sorted: &[Decimal], p: Decimal) -> Option<Decimal> {
    let last = sorted.len().checked_sub(1)?;

    let p = p.clamp(Decimal::ZERO, Decimal::ONE);
    let rank = p * Decimal::from(last);
    let lower = rank.floor().to_usize().unwrap_or(0).min(last);
    let upper = (lower + 1).min(last);
    let fraction = rank - Decimal::from(lower);

    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Relative reduction of `after` against `before`, in percent.
///
/// Zero when `before` is zero.
pub fn reduction_pct(before: Decimal, after: Decimal) -> Decimal {
    if before == Decimal::ZERO {
        return Decimal::ZERO;
    }
    (Decimal::ONE - after / before) * dec!(100)
}
