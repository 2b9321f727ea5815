//! Daily margin simulation for a short hedge against a long physical position.
//!
//! This module provides:
//! - The forward margin recurrence ([`MarginSimulator`])
//! - Summary statistics over a finished run
//! - CSV / JSON export of the per-day rows
//! - A content-addressed cache of finished runs
//! - A parameter sweep that runs many simulations in parallel
//!
//! # Example
//!
//! ```rust,ignore
//! use hedge_margin_sim::data::{CsvPriceLoader, PriceSource};
//! use hedge_margin_sim::simulation::{MarginSimulator, SimulationParameters, SimulationSummary};
//!
//! let loader = CsvPriceLoader::new("data/prices.csv", &Default::default())?;
//! let series = loader.load()?;
//! let output = MarginSimulator::strict(SimulationParameters::default()).simulate(&series)?;
//! let summary = SimulationSummary::calculate(&output);
//! println!("{}", summary.summary(dec!(10000), "10k"));
//! ```

mod analysis;
mod cache;
mod engine;
mod error;
mod metrics;
mod report;
mod sweep;

pub use analysis::{AnalysisResult, HedgeAnalysis};
pub use cache::{cache_key, SimulationCache};
pub use engine::{MarginSimulator, SimulationOutput, SimulationRow};
pub use error::{InputError, ParameterIssue, SimulationError};
pub use metrics::{DistributionStats, SimulationSummary};
pub use report::{write_daily_report, write_json, write_report_files, write_rows_csv};
pub use sweep::{ParameterSpace, SweepResults, SweepRun, SweepRunner};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Parameters for one simulation run.
///
/// Constructed once and passed by value; a run never changes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationParameters {
    /// Physical position size, in the same unit basis as prices
    #[serde(default = "default_quantity")]
    pub quantity: Decimal,

    /// Fraction of the position hedged with futures (1.0 = fully hedged)
    #[serde(default = "default_hedge_ratio")]
    pub hedge_ratio: Decimal,

    /// Fraction of futures notional held as required margin
    #[serde(default = "default_margin_rate")]
    pub margin_rate: Decimal,

    /// Equity / margin ratio below which cash is injected
    #[serde(default = "default_inject_threshold")]
    pub inject_threshold_multiple: Decimal,

    /// Equity / margin ratio above which surplus is withdrawn
    #[serde(default = "default_withdraw_threshold")]
    pub withdraw_threshold_multiple: Decimal,

    /// Lookback window, in observations, for periodic P&L
    #[serde(default = "default_cycle_days")]
    pub cycle_days: usize,
}

/// Usual upper bound for the hedge ratio.
pub const MAX_TYPICAL_HEDGE_RATIO: Decimal = dec!(1.2);

fn default_quantity() -> Decimal {
    dec!(30)
}

fn default_hedge_ratio() -> Decimal {
    Decimal::ONE
}

fn default_margin_rate() -> Decimal {
    dec!(0.12)
}

fn default_inject_threshold() -> Decimal {
    dec!(1.2)
}

fn default_withdraw_threshold() -> Decimal {
    dec!(1.5)
}

fn default_cycle_days() -> usize {
    30
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            quantity: default_quantity(),
            hedge_ratio: default_hedge_ratio(),
            margin_rate: default_margin_rate(),
            inject_threshold_multiple: default_inject_threshold(),
            withdraw_threshold_multiple: default_withdraw_threshold(),
            cycle_days: default_cycle_days(),
        }
    }
}

impl SimulationParameters {
    /// Hedged futures position size (`quantity * hedge_ratio`), None on overflow.
    pub fn hedged_quantity(&self) -> Option<Decimal> {
        self.quantity.checked_mul(self.hedge_ratio)
    }

    /// Required margin at a given futures price, None on overflow.
    pub fn required_margin(&self, futures_price: Decimal) -> Option<Decimal> {
        futures_price
            .checked_mul(self.hedged_quantity()?)?
            .checked_mul(self.margin_rate)
    }

    /// Parameter issues that do not depend on the price series.
    pub fn issues(&self) -> Vec<ParameterIssue> {
        let mut issues = Vec::new();

        if self.withdraw_threshold_multiple <= self.inject_threshold_multiple {
            issues.push(ParameterIssue::InvertedThresholds {
                inject: self.inject_threshold_multiple,
                withdraw: self.withdraw_threshold_multiple,
            });
        }
        if self.quantity <= Decimal::ZERO {
            issues.push(ParameterIssue::NonPositiveQuantity(self.quantity));
        }
        if self.margin_rate <= Decimal::ZERO {
            issues.push(ParameterIssue::NonPositiveMarginRate(self.margin_rate));
        }
        if self.hedge_ratio < Decimal::ZERO {
            issues.push(ParameterIssue::NegativeHedgeRatio(self.hedge_ratio));
        } else if self.hedge_ratio > MAX_TYPICAL_HEDGE_RATIO {
            issues.push(ParameterIssue::HedgeRatioAboveRange(self.hedge_ratio));
        }
        if self.inject_threshold_multiple < Decimal::ONE {
            issues.push(ParameterIssue::InjectBelowRequiredMargin(
                self.inject_threshold_multiple,
            ));
        }

        issues
    }

    /// Reject the first fatal issue, if any.
    pub fn validate(&self) -> Result<(), SimulationError> {
        match self.issues().into_iter().find(ParameterIssue::is_fatal) {
            Some(issue) => Err(SimulationError::Configuration(issue)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_parameters_are_clean() {
        let params = SimulationParameters::default();
        assert!(params.issues().is_empty());
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_required_margin() {
        let params = SimulationParameters::default();
        // 10200 * 30 * 1.0 * 0.12
        assert_eq!(params.required_margin(dec!(10200)), Some(dec!(36720)));
        assert_eq!(params.hedged_quantity(), Some(dec!(30)));
    }

    #[test]
    fn test_required_margin_overflow_is_none() {
        let params = SimulationParameters::default();
        let huge = Decimal::from_scientific("5e27").unwrap();

        assert_eq!(params.required_margin(huge), None);

        let params = SimulationParameters {
            quantity: Decimal::MAX,
            hedge_ratio: dec!(2),
            ..Default::default()
        };
        assert_eq!(params.hedged_quantity(), None);
        assert_eq!(params.required_margin(dec!(1)), None);
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let params = SimulationParameters {
            inject_threshold_multiple: dec!(1.5),
            withdraw_threshold_multiple: dec!(1.2),
            ..Default::default()
        };

        let err = params.validate().unwrap_err();
        assert!(matches!(
            err,
            SimulationError::Configuration(ParameterIssue::InvertedThresholds { .. })
        ));
    }

    #[test]
    fn test_equal_thresholds_count_as_inverted() {
        let params = SimulationParameters {
            inject_threshold_multiple: dec!(1.3),
            withdraw_threshold_multiple: dec!(1.3),
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_non_fatal_issues_pass_validation() {
        let params = SimulationParameters {
            hedge_ratio: dec!(1.5),
            inject_threshold_multiple: dec!(0.9),
            ..Default::default()
        };

        let issues = params.issues();
        assert_eq!(issues.len(), 2);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_degenerate_quantity_and_rate() {
        let params = SimulationParameters {
            quantity: Decimal::ZERO,
            margin_rate: dec!(-0.1),
            ..Default::default()
        };

        let issues = params.issues();
        assert!(issues.contains(&ParameterIssue::NonPositiveQuantity(Decimal::ZERO)));
        assert!(issues.contains(&ParameterIssue::NonPositiveMarginRate(dec!(-0.1))));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let params: SimulationParameters =
            serde_json::from_str(r#"{"hedge_ratio": "0.8", "cycle_days": 7}"#).unwrap();

        assert_eq!(params.hedge_ratio, dec!(0.8));
        assert_eq!(params.cycle_days, 7);
        assert_eq!(params.quantity, dec!(30));
        assert_eq!(params.margin_rate, dec!(0.12));
    }
}
