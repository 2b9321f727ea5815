//! Summary statistics over a finished simulation.
//!
//! Everything here is a read-only reduction of [`SimulationOutput`]; nothing
//! feeds back into the recurrence.

use super::SimulationOutput;
use crate::utils::decimal::{
    mean, percentile, reduction_pct, round_to_precision, sample_std_dev, scale_to_unit,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Shape of a distribution of cycle P&L values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionStats {
    pub count: usize,
    pub mean: Decimal,
    /// Sample standard deviation
    pub std_dev: Decimal,
    pub min: Decimal,
    pub p05: Decimal,
    pub median: Decimal,
    pub p95: Decimal,
    pub max: Decimal,
}

impl DistributionStats {
    /// Describe a set of values, `None` when the iterator is empty.
    pub fn from_values(values: impl IntoIterator<Item = Decimal>) -> Option<Self> {
        let mut sorted: Vec<Decimal> = values.into_iter().collect();
        sorted.sort();

        let min = *sorted.first()?;
        let max = *sorted.last()?;

        Some(Self {
            count: sorted.len(),
            mean: mean(&sorted),
            std_dev: sample_std_dev(&sorted),
            min,
            p05: percentile(&sorted, dec!(0.05))?,
            median: percentile(&sorted, dec!(0.5))?,
            p95: percentile(&sorted, dec!(0.95))?,
            max,
        })
    }

    /// Width of the central 90% band.
    pub fn spread_90(&self) -> Decimal {
        self.p95 - self.p05
    }
}

/// Headline numbers of a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSummary {
    // Coverage
    pub observations: usize,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,

    // Cash flow
    pub total_injected: Decimal,
    pub total_withdrawn: Decimal,
    /// Withdrawn minus injected
    pub net_cash_flow: Decimal,
    pub injection_count: usize,
    pub withdrawal_count: usize,
    pub largest_injection: Decimal,
    /// Deepest point of cumulative net cash below zero
    pub peak_funding_need: Decimal,

    // Account
    pub initial_equity: Decimal,
    pub final_equity: Decimal,
    pub latest_risk_degree: Decimal,
    /// Over rows with positive required margin only
    pub min_risk_degree: Decimal,
    pub max_risk_degree: Decimal,

    // Hedge effectiveness
    pub unhedged_std_dev: Decimal,
    pub hedged_std_dev: Decimal,
    /// (1 - hedged std / unhedged std) * 100
    pub volatility_reduction_pct: Decimal,

    // Cycle P&L
    pub cycle_unhedged: Option<DistributionStats>,
    pub cycle_hedged: Option<DistributionStats>,
}

impl SimulationSummary {
    /// Reduce a simulation output to its summary.
    pub fn calculate(output: &SimulationOutput) -> Self {
        let rows = &output.rows;

        let total_injected: Decimal = rows.iter().map(|r| r.cash_injected).sum();
        let total_withdrawn: Decimal = rows.iter().map(|r| r.cash_withdrawn).sum();
        let injection_count = rows.iter().filter(|r| r.cash_injected > Decimal::ZERO).count();
        let withdrawal_count = rows.iter().filter(|r| r.cash_withdrawn > Decimal::ZERO).count();
        let largest_injection = rows
            .iter()
            .map(|r| r.cash_injected)
            .max()
            .unwrap_or(Decimal::ZERO);
        let peak_funding_need = rows
            .iter()
            .map(|r| -r.cumulative_net_cash)
            .max()
            .unwrap_or(Decimal::ZERO)
            .max(Decimal::ZERO);

        let risk_degrees: Vec<Decimal> = rows
            .iter()
            .filter(|r| r.required_margin > Decimal::ZERO)
            .map(|r| r.risk_degree)
            .collect();

        let unhedged: Vec<Decimal> = rows.iter().map(|r| r.value_change_unhedged).collect();
        let hedged: Vec<Decimal> = rows.iter().map(|r| r.value_change_hedged).collect();
        let unhedged_std_dev = sample_std_dev(&unhedged);
        let hedged_std_dev = sample_std_dev(&hedged);

        Self {
            observations: rows.len(),
            start_date: output.first_date(),
            end_date: output.last_date(),
            total_injected,
            total_withdrawn,
            net_cash_flow: total_withdrawn - total_injected,
            injection_count,
            withdrawal_count,
            largest_injection,
            peak_funding_need,
            initial_equity: output.initial_equity,
            final_equity: rows
                .last()
                .map_or(output.initial_equity, |r| r.account_equity),
            latest_risk_degree: rows.last().map_or(Decimal::ZERO, |r| r.risk_degree),
            min_risk_degree: risk_degrees.iter().copied().min().unwrap_or(Decimal::ZERO),
            max_risk_degree: risk_degrees.iter().copied().max().unwrap_or(Decimal::ZERO),
            unhedged_std_dev,
            hedged_std_dev,
            volatility_reduction_pct: reduction_pct(unhedged_std_dev, hedged_std_dev),
            cycle_unhedged: DistributionStats::from_values(
                rows.iter().filter_map(|r| r.cycle_pnl_unhedged),
            ),
            cycle_hedged: DistributionStats::from_values(
                rows.iter().filter_map(|r| r.cycle_pnl_hedged),
            ),
        }
    }

    /// Number of days with any cash movement.
    pub fn cash_event_count(&self) -> usize {
        self.injection_count + self.withdrawal_count
    }

    /// Format the summary as a text report, amounts divided by `unit`.
    pub fn summary(&self, unit: Decimal, label: &str) -> String {
        let s = |v: Decimal| round_to_precision(scale_to_unit(v, unit), 2);
        let ratio = |v: Decimal| round_to_precision(v, 4);
        let period = match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => format!("{} to {}", start, end),
            _ => "n/a".to_string(),
        };

        let mut out = format!(
            r#"═══════════════════════════════════════════════
MARGIN SIMULATION ({} observations, {})
═══════════════════════════════════════════════
CASH FLOW (in {label})
  Total Injected:    {:.2} ({} events)
  Total Withdrawn:   {:.2} ({} events)
  Net Cash Flow:     {:.2}
  Largest Inject:    {:.2}
  Peak Funding Need: {:.2}

ACCOUNT (in {label})
  Initial Equity:    {:.2}
  Final Equity:      {:.2}
  Risk Degree:       {:.4} (min {:.4}, max {:.4})

HEDGE EFFECTIVENESS (in {label})
  Unhedged Std Dev:  {:.2}
  Hedged Std Dev:    {:.2}
  Vol Reduction:     {:.2}%"#,
            self.observations,
            period,
            s(self.total_injected),
            self.injection_count,
            s(self.total_withdrawn),
            self.withdrawal_count,
            s(self.net_cash_flow),
            s(self.largest_injection),
            s(self.peak_funding_need),
            s(self.initial_equity),
            s(self.final_equity),
            ratio(self.latest_risk_degree),
            ratio(self.min_risk_degree),
            ratio(self.max_risk_degree),
            s(self.unhedged_std_dev),
            s(self.hedged_std_dev),
            round_to_precision(self.volatility_reduction_pct, 2),
        );

        for (name, stats) in [
            ("Unhedged", &self.cycle_unhedged),
            ("Hedged", &self.cycle_hedged),
        ] {
            if let Some(d) = stats {
                out.push_str(&format!(
                    "\n\nCYCLE P&L {} (in {label}, n={})\n  Mean / Std:        {:.2} / {:.2}\n  P05 / Median / P95: {:.2} / {:.2} / {:.2}\n  Min / Max:         {:.2} / {:.2}",
                    name.to_uppercase(),
                    d.count,
                    s(d.mean),
                    s(d.std_dev),
                    s(d.p05),
                    s(d.median),
                    s(d.p95),
                    s(d.min),
                    s(d.max),
                ));
            }
        }

        out.push_str("\n═══════════════════════════════════════════════");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PriceObservation;
    use crate::simulation::{MarginSimulator, SimulationParameters};
    use crate::utils::decimal::to_f64;

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Days::new(n as u64)
    }

    fn output(prices: &[(Decimal, Decimal)], cycle_days: usize) -> SimulationOutput {
        let series: Vec<PriceObservation> = prices
            .iter()
            .enumerate()
            .map(|(i, &(s, f))| PriceObservation::new(day(i as u32), s, f))
            .collect();
        let params = SimulationParameters {
            cycle_days,
            ..Default::default()
        };
        MarginSimulator::new(params).simulate(&series).unwrap()
    }

    #[test]
    fn test_cash_flow_totals() {
        // Day 1 injects 13728, day 2 (futures back to 9000) withdraws
        let out = output(
            &[
                (dec!(10000), dec!(9800)),
                (dec!(10100), dec!(10200)),
                (dec!(9500), dec!(9000)),
            ],
            30,
        );
        let summary = SimulationSummary::calculate(&out);

        assert_eq!(summary.observations, 3);
        assert_eq!(summary.start_date, Some(day(0)));
        assert_eq!(summary.end_date, Some(day(2)));
        assert_eq!(summary.total_injected, dec!(13728));
        assert_eq!(summary.injection_count, 1);
        assert_eq!(summary.withdrawal_count, 1);
        assert_eq!(summary.cash_event_count(), 2);
        assert_eq!(summary.largest_injection, dec!(13728));
        assert_eq!(summary.peak_funding_need, dec!(13728));
        assert_eq!(
            summary.net_cash_flow,
            summary.total_withdrawn - summary.total_injected
        );
        assert_eq!(summary.final_equity, out.rows[2].account_equity);
        assert_eq!(summary.latest_risk_degree, dec!(1.5));
        assert_eq!(summary.min_risk_degree, dec!(1.2));
        assert_eq!(summary.max_risk_degree, dec!(1.5));
    }

    #[test]
    fn test_no_funding_need_when_only_withdrawing() {
        let out = output(&[(dec!(10000), dec!(9800)), (dec!(9500), dec!(9000))], 30);
        let summary = SimulationSummary::calculate(&out);

        assert_eq!(summary.total_injected, Decimal::ZERO);
        assert_eq!(summary.peak_funding_need, Decimal::ZERO);
        assert_eq!(summary.largest_injection, Decimal::ZERO);
        assert!(summary.net_cash_flow > Decimal::ZERO);
    }

    #[test]
    fn test_full_hedge_removes_volatility_of_parallel_moves() {
        // Spot and futures move together, so the hedged value never changes
        let out = output(
            &[
                (dec!(10000), dec!(9900)),
                (dec!(10200), dec!(10100)),
                (dec!(9700), dec!(9600)),
                (dec!(10400), dec!(10300)),
            ],
            1,
        );
        let summary = SimulationSummary::calculate(&out);

        assert!(summary.unhedged_std_dev > Decimal::ZERO);
        assert_eq!(summary.hedged_std_dev, Decimal::ZERO);
        assert_eq!(summary.volatility_reduction_pct, dec!(100));

        let hedged = summary.cycle_hedged.unwrap();
        assert_eq!(hedged.count, 3);
        assert_eq!(hedged.max, Decimal::ZERO);
        assert_eq!(hedged.min, Decimal::ZERO);
    }

    #[test]
    fn test_cycle_stats_absent_without_full_cycle() {
        let out = output(&[(dec!(10000), dec!(9800)), (dec!(10100), dec!(10200))], 30);
        let summary = SimulationSummary::calculate(&out);

        assert!(summary.cycle_unhedged.is_none());
        assert!(summary.cycle_hedged.is_none());
    }

    #[test]
    fn test_flat_prices_give_zero_reduction() {
        let out = output(&[(dec!(100), dec!(100)); 3], 1);
        let summary = SimulationSummary::calculate(&out);

        assert_eq!(summary.unhedged_std_dev, Decimal::ZERO);
        assert_eq!(summary.volatility_reduction_pct, Decimal::ZERO);
    }

    #[test]
    fn test_distribution_stats() {
        let stats = DistributionStats::from_values(
            [dec!(50), dec!(10), dec!(40), dec!(20), dec!(30)],
        )
        .unwrap();

        assert_eq!(stats.count, 5);
        assert_eq!(stats.mean, dec!(30));
        assert_eq!(stats.median, dec!(30));
        assert_eq!(stats.min, dec!(10));
        assert_eq!(stats.max, dec!(50));
        assert_eq!(stats.p05, dec!(12));
        assert_eq!(stats.p95, dec!(48));
        assert_eq!(stats.spread_90(), dec!(36));
        assert!((to_f64(stats.std_dev) - 250f64.sqrt()).abs() < 1e-9);

        assert!(DistributionStats::from_values(Vec::new()).is_none());
    }

    #[test]
    fn test_summary_scales_by_unit() {
        let out = output(&[(dec!(10000), dec!(9800)), (dec!(10100), dec!(10200))], 1);
        let text = SimulationSummary::calculate(&out).summary(dec!(10000), "10k");

        assert!(text.contains("MARGIN SIMULATION (2 observations, 2024-01-01 to 2024-01-02)"));
        assert!(text.contains("Total Injected:    1.37 (1 events)"));
        assert!(text.contains("in 10k"));
        assert!(text.contains("CYCLE P&L HEDGED"));
    }

    #[test]
    fn test_summary_rounds_instead_of_truncating() {
        let out = output(&[(dec!(10000), dec!(9800)), (dec!(10100), dec!(10200))], 1);
        let mut summary = SimulationSummary::calculate(&out);
        summary.total_injected = dec!(9999.9);
        summary.latest_risk_degree = dec!(1.23456);
        summary.volatility_reduction_pct = dec!(12.3456);

        let text = summary.summary(dec!(10000), "10k");

        assert!(text.contains("Total Injected:    1.00 (1 events)"), "{}", text);
        assert!(text.contains("Risk Degree:       1.2346"), "{}", text);
        assert!(text.contains("Vol Reduction:     12.35%"), "{}", text);
    }
}
