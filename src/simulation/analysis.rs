//! End-to-end hedge analysis: load a date range, simulate, summarize.

use super::{
    MarginSimulator, SimulationCache, SimulationOutput, SimulationParameters, SimulationSummary,
};
use crate::data::PriceSource;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::info;

/// Result of an analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub output: Arc<SimulationOutput>,
    pub summary: SimulationSummary,
}

impl AnalysisResult {
    /// Get a summary string.
    pub fn summary(&self, unit: rust_decimal::Decimal, label: &str) -> String {
        let mut text = self.summary.summary(unit, label);
        for issue in &self.output.warnings {
            text.push_str(&format!("\nwarning: {}", issue));
        }
        if self.output.degenerate_margin_rows > 0 {
            text.push_str(&format!(
                "\nwarning: required margin not positive on {} rows",
                self.output.degenerate_margin_rows
            ));
        }
        text
    }
}

/// Runs the margin simulation against a price source.
pub struct HedgeAnalysis<S: PriceSource> {
    source: S,
    params: SimulationParameters,
    strict: bool,
    cache: Option<Arc<SimulationCache>>,
}

impl<S: PriceSource> HedgeAnalysis<S> {
    /// Create a strict analysis with no cache.
    pub fn new(source: S, params: SimulationParameters) -> Self {
        Self {
            source,
            params,
            strict: true,
            cache: None,
        }
    }

    /// Accept fatal parameter issues and report them as warnings.
    pub fn lenient(mut self) -> Self {
        self.strict = false;
        self
    }

    /// Reuse results from a shared cache.
    pub fn with_cache(mut self, cache: Arc<SimulationCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn parameters(&self) -> &SimulationParameters {
        &self.params
    }

    /// Run the analysis over `start..=end` (either bound optional).
    pub async fn run(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<AnalysisResult> {
        let series = self
            .source
            .load_range(start, end)
            .context("Failed to load price series")?;

        info!(
            "Running hedge analysis over {} observations ({} to {})",
            series.len(),
            series.first().map_or("-".to_string(), |o| o.date.to_string()),
            series.last().map_or("-".to_string(), |o| o.date.to_string()),
        );

        if self.strict {
            self.params.validate()?;
        }

        let output = match &self.cache {
            Some(cache) => cache.get_or_simulate(&series, &self.params).await?,
            None => Arc::new(MarginSimulator::new(self.params.clone()).simulate(&series)?),
        };

        let summary = SimulationSummary::calculate(&output);

        Ok(AnalysisResult { output, summary })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataError, MockPriceSource, PriceObservation};
    use crate::simulation::{ParameterIssue, SimulationError};
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn series() -> Vec<PriceObservation> {
        vec![
            PriceObservation::new(day(2), dec!(10000), dec!(9800)),
            PriceObservation::new(day(3), dec!(10100), dec!(10200)),
            PriceObservation::new(day(4), dec!(10080), dec!(10150)),
        ]
    }

    #[tokio::test]
    async fn test_run_passes_range_to_source() {
        let mut source = MockPriceSource::new();
        source
            .expect_load_range()
            .withf(|start, end| *start == Some(day(2)) && end.is_none())
            .times(1)
            .returning(|_, _| Ok(series()));

        let analysis = HedgeAnalysis::new(source, SimulationParameters::default());
        let result = analysis.run(Some(day(2)), None).await.unwrap();

        assert_eq!(result.output.len(), 3);
        assert_eq!(result.summary.total_injected, dec!(13728));
        assert_eq!(result.summary.start_date, Some(day(2)));
    }

    #[tokio::test]
    async fn test_load_failure_has_context() {
        let mut source = MockPriceSource::new();
        source
            .expect_load_range()
            .returning(|_, _| Err(DataError::Empty));

        let analysis = HedgeAnalysis::new(source, SimulationParameters::default());
        let err = analysis.run(None, None).await.unwrap_err();

        assert_eq!(err.to_string(), "Failed to load price series");
        assert!(err.downcast_ref::<DataError>().is_some());
    }

    #[tokio::test]
    async fn test_empty_range_is_input_error() {
        let mut source = MockPriceSource::new();
        source.expect_load_range().returning(|_, _| Ok(Vec::new()));

        let analysis = HedgeAnalysis::new(source, SimulationParameters::default());
        let err = analysis.run(Some(day(20)), Some(day(25))).await.unwrap_err();

        let sim_err = err.downcast_ref::<SimulationError>().unwrap();
        assert!(sim_err.is_input_error());
    }

    #[tokio::test]
    async fn test_strict_and_lenient() {
        let inverted = SimulationParameters {
            inject_threshold_multiple: dec!(1.5),
            withdraw_threshold_multiple: dec!(1.2),
            ..Default::default()
        };

        let mut source = MockPriceSource::new();
        source.expect_load_range().returning(|_, _| Ok(series()));
        let err = HedgeAnalysis::new(source, inverted.clone())
            .run(None, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SimulationError>(),
            Some(SimulationError::Configuration(ParameterIssue::InvertedThresholds { .. }))
        ));

        let mut source = MockPriceSource::new();
        source.expect_load_range().returning(|_, _| Ok(series()));
        let result = HedgeAnalysis::new(source, inverted)
            .lenient()
            .run(None, None)
            .await
            .unwrap();
        assert!(!result.output.warnings.is_empty());
        assert!(result.summary(dec!(10000), "10k").contains("warning: withdraw threshold"));
    }

    #[tokio::test]
    async fn test_cached_runs_share_output() {
        let cache = Arc::new(SimulationCache::new(4));

        let mut source = MockPriceSource::new();
        source
            .expect_load_range()
            .times(2)
            .returning(|_, _| Ok(series()));

        let analysis =
            HedgeAnalysis::new(source, SimulationParameters::default()).with_cache(Arc::clone(&cache));
        let first = analysis.run(None, None).await.unwrap();
        let second = analysis.run(None, None).await.unwrap();

        assert!(Arc::ptr_eq(&first.output, &second.output));
        assert_eq!(cache.hits(), 1);
    }
}
