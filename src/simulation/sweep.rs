//! Parameter sweep over hedge configurations.
//!
//! Runs every combination of a [`ParameterSpace`] against the same price
//! series in parallel and ranks the results.

use super::{MarginSimulator, SimulationParameters, SimulationSummary};
use crate::data::PriceObservation;
use crate::utils::decimal::{round_to_precision, scale_to_unit};
use anyhow::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Defines the parameter space to explore.
///
/// Quantity is not swept; every run inherits it from the base parameters.
/// An empty `cycle_days` list also inherits the base cycle length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpace {
    pub hedge_ratio: Vec<Decimal>,
    pub margin_rate: Vec<Decimal>,
    pub inject_threshold_multiple: Vec<Decimal>,
    pub withdraw_threshold_multiple: Vec<Decimal>,
    pub cycle_days: Vec<usize>,
}

impl Default for ParameterSpace {
    fn default() -> Self {
        Self {
            hedge_ratio: vec![dec!(0.5), dec!(0.8), dec!(1.0), dec!(1.2)],
            margin_rate: vec![dec!(0.10), dec!(0.12), dec!(0.15)],
            inject_threshold_multiple: vec![dec!(1.1), dec!(1.2), dec!(1.3)],
            withdraw_threshold_multiple: vec![dec!(1.4), dec!(1.5), dec!(1.8)],
            cycle_days: Vec::new(),
        }
    }
}

impl ParameterSpace {
    /// Create a minimal parameter space for quick testing.
    pub fn minimal() -> Self {
        Self {
            hedge_ratio: vec![dec!(1.0)],
            margin_rate: vec![dec!(0.12)],
            inject_threshold_multiple: vec![dec!(1.2)],
            withdraw_threshold_multiple: vec![dec!(1.5)],
            cycle_days: Vec::new(),
        }
    }

    /// Count total number of combinations, including ones later skipped.
    pub fn combination_count(&self) -> usize {
        self.hedge_ratio.len()
            * self.margin_rate.len()
            * self.inject_threshold_multiple.len()
            * self.withdraw_threshold_multiple.len()
            * self.cycle_days.len().max(1)
    }

    /// Generate all parameter combinations on top of `base`.
    ///
    /// Combinations whose withdraw multiple is not above the inject multiple
    /// are skipped.
    pub fn generate_parameters(&self, base: &SimulationParameters) -> Vec<SimulationParameters> {
        let mut params = Vec::with_capacity(self.combination_count());
        let cycles = if self.cycle_days.is_empty() {
            vec![base.cycle_days]
        } else {
            self.cycle_days.clone()
        };

        for &hedge_ratio in &self.hedge_ratio {
            for &margin_rate in &self.margin_rate {
                for &inject in &self.inject_threshold_multiple {
                    for &withdraw in &self.withdraw_threshold_multiple {
                        if withdraw <= inject {
                            continue;
                        }
                        for &cycle_days in &cycles {
                            params.push(SimulationParameters {
                                hedge_ratio,
                                margin_rate,
                                inject_threshold_multiple: inject,
                                withdraw_threshold_multiple: withdraw,
                                cycle_days,
                                ..base.clone()
                            });
                        }
                    }
                }
            }
        }

        params
    }

    /// Describe a parameter set in one line.
    pub fn describe(params: &SimulationParameters) -> String {
        format!(
            "hedge={:.0}% margin={:.0}% band={}x..{}x cycle={}d",
            round_to_precision(params.hedge_ratio.saturating_mul(dec!(100)), 0),
            round_to_precision(params.margin_rate.saturating_mul(dec!(100)), 0),
            params.inject_threshold_multiple,
            params.withdraw_threshold_multiple,
            params.cycle_days,
        )
    }
}

/// One finished sweep combination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepRun {
    pub parameters: SimulationParameters,
    pub summary: SimulationSummary,
}

/// Results from a parameter sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResults {
    /// All individual run results
    pub runs: Vec<SweepRun>,

    /// Highest volatility reduction
    pub best_by_volatility_reduction: Option<usize>,

    /// Smallest total cash injected
    pub best_by_least_injected: Option<usize>,

    /// Smallest peak funding need
    pub best_by_peak_funding: Option<usize>,

    /// Total combinations tested
    pub total_combinations: usize,

    /// Successful runs
    pub successful_runs: usize,

    /// Failed runs
    pub failed_runs: usize,
}

fn best_by<F>(runs: &[SweepRun], key: F) -> Option<usize>
where
    F: Fn(&SimulationSummary) -> Decimal,
{
    runs.iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| {
            key(&a.summary)
                .partial_cmp(&key(&b.summary))
                .unwrap_or(Ordering::Equal)
        })
        .map(|(i, _)| i)
}

impl SweepResults {
    /// Rank a finished set of runs.
    pub fn from_runs(runs: Vec<SweepRun>, total_combinations: usize, failed_runs: usize) -> Self {
        let best_by_volatility_reduction = best_by(&runs, |s| s.volatility_reduction_pct);
        let best_by_least_injected = best_by(&runs, |s| -s.total_injected);
        let best_by_peak_funding = best_by(&runs, |s| -s.peak_funding_need);

        Self {
            successful_runs: runs.len(),
            runs,
            best_by_volatility_reduction,
            best_by_least_injected,
            best_by_peak_funding,
            total_combinations,
            failed_runs,
        }
    }

    pub fn best_volatility_reduction(&self) -> Option<&SweepRun> {
        self.best_by_volatility_reduction.map(|i| &self.runs[i])
    }

    pub fn best_least_injected(&self) -> Option<&SweepRun> {
        self.best_by_least_injected.map(|i| &self.runs[i])
    }

    pub fn best_peak_funding(&self) -> Option<&SweepRun> {
        self.best_by_peak_funding.map(|i| &self.runs[i])
    }

    /// Export results as CSV.
    pub fn to_csv<W: Write>(&self, mut writer: W) -> Result<()> {
        writeln!(
            writer,
            "quantity,hedge_ratio,margin_rate,inject_threshold,withdraw_threshold,cycle_days,total_injected,total_withdrawn,net_cash_flow,injection_count,withdrawal_count,peak_funding_need,final_equity,unhedged_std,hedged_std,volatility_reduction_pct"
        )?;

        for run in &self.runs {
            let (p, s) = (&run.parameters, &run.summary);
            writeln!(
                writer,
                "{},{},{},{},{},{},{},{},{},{},{},{},{},{:.2},{:.2},{:.2}",
                p.quantity,
                p.hedge_ratio,
                p.margin_rate,
                p.inject_threshold_multiple,
                p.withdraw_threshold_multiple,
                p.cycle_days,
                s.total_injected,
                s.total_withdrawn,
                s.net_cash_flow,
                s.injection_count,
                s.withdrawal_count,
                s.peak_funding_need,
                s.final_equity,
                round_to_precision(s.unhedged_std_dev, 2),
                round_to_precision(s.hedged_std_dev, 2),
                round_to_precision(s.volatility_reduction_pct, 2),
            )?;
        }
        writer.flush()?;

        Ok(())
    }

    /// Generate a summary comparison table.
    pub fn summary(&self, unit: Decimal, label: &str) -> String {
        let scale = |v: Decimal| round_to_precision(scale_to_unit(v, unit), 2);
        let mut s = String::new();

        s.push_str("═══════════════════════════════════════════════════════════════\n");
        s.push_str("PARAMETER SWEEP RESULTS\n");
        s.push_str("═══════════════════════════════════════════════════════════════\n");
        s.push_str(&format!(
            "Total: {} | Successful: {} | Failed: {}\n\n",
            self.total_combinations, self.successful_runs, self.failed_runs
        ));

        let sections = [
            ("BEST BY VOLATILITY REDUCTION", self.best_volatility_reduction()),
            ("LEAST CASH INJECTED", self.best_least_injected()),
            ("LOWEST PEAK FUNDING NEED", self.best_peak_funding()),
        ];

        for (title, run) in sections {
            if let Some(run) = run {
                let summary = &run.summary;
                s.push_str(&format!("{}:\n", title));
                s.push_str(&format!("  Params: {}\n", ParameterSpace::describe(&run.parameters)));
                s.push_str(&format!(
                    "  Vol Reduction: {:.2}% | Injected: {:.2} {label} | Peak Need: {:.2} {label}\n\n",
                    round_to_precision(summary.volatility_reduction_pct, 2),
                    scale(summary.total_injected),
                    scale(summary.peak_funding_need),
                ));
            }
        }

        s.push_str("═══════════════════════════════════════════════════════════════\n");

        s
    }
}

/// Parameter sweep runner for parallel simulation.
pub struct SweepRunner {
    parameter_space: ParameterSpace,
    base_params: SimulationParameters,
    parallelism: usize,
}

impl SweepRunner {
    /// Create a new sweep runner.
    pub fn new(
        parameter_space: ParameterSpace,
        base_params: SimulationParameters,
        parallelism: usize,
    ) -> Self {
        Self {
            parameter_space,
            base_params,
            parallelism: parallelism.max(1),
        }
    }

    /// Run the parameter sweep over a shared series.
    pub async fn run(&self, series: Arc<Vec<PriceObservation>>) -> Result<SweepResults> {
        let combinations = self.parameter_space.generate_parameters(&self.base_params);
        let total_combinations = combinations.len();

        info!(
            "Starting parameter sweep with {} combinations over {} observations, parallelism={}",
            total_combinations,
            series.len(),
            self.parallelism
        );

        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let mut handles = Vec::with_capacity(total_combinations);

        for (i, params) in combinations.into_iter().enumerate() {
            let sem = Arc::clone(&semaphore);
            let series = Arc::clone(&series);

            let handle = tokio::spawn(async move {
                let _permit = match sem.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        warn!("[{}/{}] Semaphore closed: {}", i + 1, total_combinations, e);
                        return None;
                    }
                };

                debug!(
                    "[{}/{}] Testing: {}",
                    i + 1,
                    total_combinations,
                    ParameterSpace::describe(&params)
                );

                match MarginSimulator::strict(params.clone()).simulate(&series) {
                    Ok(output) => {
                        let summary = SimulationSummary::calculate(&output);
                        debug!(
                            "[{}/{}] Complete: VolReduction={:.2}% Injected={:.2}",
                            i + 1,
                            total_combinations,
                            summary.volatility_reduction_pct.round_dp(2),
                            summary.total_injected.round_dp(2)
                        );
                        Some(SweepRun {
                            parameters: params,
                            summary,
                        })
                    }
                    Err(e) => {
                        warn!("[{}/{}] Failed: {}", i + 1, total_combinations, e);
                        None
                    }
                }
            });

            handles.push(handle);
        }

        // Collect results
        let mut runs = Vec::new();
        let mut failed_runs = 0;

        for handle in handles {
            match handle.await {
                Ok(Some(run)) => runs.push(run),
                Ok(None) => failed_runs += 1,
                Err(e) => {
                    warn!("Task panicked: {}", e);
                    failed_runs += 1;
                }
            }
        }

        info!(
            "Sweep complete: {} successful, {} failed",
            runs.len(),
            failed_runs
        );

        Ok(SweepResults::from_runs(runs, total_combinations, failed_runs))
    }
}
