//! Error and warning types for margin simulation.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by [`MarginSimulator::simulate`](super::MarginSimulator::simulate).
///
/// There is never a partial result. Series shape and parameters are checked
/// before the recurrence starts; arithmetic overflow aborts it on the row
/// where it happens.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    /// The price series cannot be simulated. The caller must fix the data.
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InputError),

    /// A fatal parameter issue was found while running in strict mode.
    #[error("invalid configuration: {0}")]
    Configuration(ParameterIssue),
}

impl SimulationError {
    /// True when the error is about the data rather than the parameters.
    pub fn is_input_error(&self) -> bool {
        matches!(self, SimulationError::InvalidInput(_))
    }
}

/// Problems with the shape of the price series.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    #[error("price series is empty")]
    EmptySeries,

    #[error("dates must be strictly ascending: row {index} ({current}) follows {previous}")]
    NonMonotonicDates {
        index: usize,
        previous: NaiveDate,
        current: NaiveDate,
    },

    /// A price or parameter is so large that a derived amount leaves the
    /// representable decimal range.
    #[error("arithmetic overflow at row {index} ({date})")]
    ArithmeticOverflow { index: usize, date: NaiveDate },
}

/// A questionable parameter combination.
///
/// A lenient simulator runs with all of these. Fatal issues
/// ([`ParameterIssue::is_fatal`]) are rejected only by a strict simulator;
/// the rest are always reported as warnings alongside the output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ParameterIssue {
    /// Withdraw line at or below the inject line. Inject wins every tie and
    /// the account can oscillate between the two lines.
    #[error("withdraw threshold {withdraw} must be greater than inject threshold {inject}")]
    InvertedThresholds { inject: Decimal, withdraw: Decimal },

    #[error("quantity must be positive, got {0}")]
    NonPositiveQuantity(Decimal),

    #[error("margin rate must be positive, got {0}")]
    NonPositiveMarginRate(Decimal),

    #[error("hedge ratio must not be negative, got {0}")]
    NegativeHedgeRatio(Decimal),

    /// Over-hedged relative to the usual 0..=1.2 range.
    #[error("hedge ratio {0} is above the usual maximum of 1.2")]
    HedgeRatioAboveRange(Decimal),

    /// The inject line sits below the required margin itself.
    #[error("inject threshold {0} is below 1.0, equity may fall under the required margin")]
    InjectBelowRequiredMargin(Decimal),

    /// No row will have a defined cycle P&L.
    #[error("cycle of {cycle_days} observations exceeds series length {len}")]
    CycleExceedsSeries { cycle_days: usize, len: usize },
}

impl ParameterIssue {
    /// Whether a strict simulator refuses to run with this issue present.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ParameterIssue::InvertedThresholds { .. }
                | ParameterIssue::NonPositiveQuantity(_)
                | ParameterIssue::NonPositiveMarginRate(_)
                | ParameterIssue::NegativeHedgeRatio(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_fatal_classification() {
        assert!(ParameterIssue::InvertedThresholds {
            inject: dec!(1.5),
            withdraw: dec!(1.2)
        }
        .is_fatal());
        assert!(ParameterIssue::NonPositiveQuantity(dec!(0)).is_fatal());
        assert!(ParameterIssue::NonPositiveMarginRate(dec!(-0.1)).is_fatal());
        assert!(ParameterIssue::NegativeHedgeRatio(dec!(-1)).is_fatal());

        assert!(!ParameterIssue::HedgeRatioAboveRange(dec!(1.5)).is_fatal());
        assert!(!ParameterIssue::InjectBelowRequiredMargin(dec!(0.9)).is_fatal());
        assert!(!ParameterIssue::CycleExceedsSeries { cycle_days: 30, len: 10 }.is_fatal());
    }

    #[test]
    fn test_error_messages() {
        let err = SimulationError::from(InputError::EmptySeries);
        assert!(err.is_input_error());
        assert_eq!(err.to_string(), "invalid input: price series is empty");

        let err = SimulationError::Configuration(ParameterIssue::NonPositiveQuantity(dec!(-5)));
        assert!(!err.is_input_error());
        assert!(err.to_string().contains("quantity must be positive"));

        let err = SimulationError::from(InputError::ArithmeticOverflow {
            index: 3,
            date: NaiveDate::from_ymd_opt(2024, 1, 4).unwrap(),
        });
        assert!(err.is_input_error());
        assert_eq!(
            err.to_string(),
            "invalid input: arithmetic overflow at row 3 (2024-01-04)"
        );
    }
}
