//! Margin simulation engine.
//!
//! Walks the price series forward one observation at a time, marking the
//! short futures leg to market and topping up or skimming the margin account
//! whenever equity leaves the band between the inject and withdraw lines.

use crate::data::PriceObservation;
use crate::simulation::{InputError, ParameterIssue, SimulationError, SimulationParameters};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Derived values for one observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRow {
    pub date: NaiveDate,
    pub spot_price: Decimal,
    pub futures_price: Decimal,
    /// Spot minus futures
    pub basis: Decimal,
    pub required_margin: Decimal,
    /// Account equity after any injection or withdrawal
    pub account_equity: Decimal,
    pub cash_injected: Decimal,
    pub cash_withdrawn: Decimal,
    /// Equity / required margin, 0 when the margin is not positive
    pub risk_degree: Decimal,
    pub inject_line: Decimal,
    pub withdraw_line: Decimal,
    /// Withdrawn minus injected, cumulated up to and including this row
    pub cumulative_net_cash: Decimal,
    /// Physical stock value + account equity + net cash taken out
    pub combined_asset_value: Decimal,
    pub value_change_unhedged: Decimal,
    pub value_change_hedged: Decimal,
    /// P&L over the last `cycle_days` observations, None before the first full cycle
    pub cycle_pnl_unhedged: Option<Decimal>,
    pub cycle_futures_pnl: Option<Decimal>,
    pub cycle_pnl_hedged: Option<Decimal>,
}

impl SimulationRow {
    /// True if cash moved in either direction on this day.
    pub fn had_cash_movement(&self) -> bool {
        self.cash_injected > Decimal::ZERO || self.cash_withdrawn > Decimal::ZERO
    }
}

/// Complete result of a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationOutput {
    pub parameters: SimulationParameters,
    /// Opening account equity, placed exactly on day 0's inject line
    pub initial_equity: Decimal,
    /// Opening stock value plus opening equity
    pub base_asset_value: Decimal,
    pub rows: Vec<SimulationRow>,
    /// Non-fatal parameter issues found for this run
    pub warnings: Vec<ParameterIssue>,
    /// Rows where the required margin was zero or negative
    pub degenerate_margin_rows: usize,
}

impl SimulationOutput {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.rows.first().map(|r| r.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.rows.last().map(|r| r.date)
    }
}

/// Cash movement decided for one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CashAction {
    Inject(Decimal),
    Withdraw(Decimal),
    Hold,
}

/// Running account balances carried from one row to the next.
struct AccountState {
    equity: Decimal,
    cumulative_net_cash: Decimal,
}

/// Runs the margin recurrence for a fixed parameter set.
#[derive(Debug, Clone)]
pub struct MarginSimulator {
    params: SimulationParameters,
    strict: bool,
}

impl MarginSimulator {
    /// Create a simulator that accepts any parameters and reports issues as warnings.
    pub fn new(params: SimulationParameters) -> Self {
        Self {
            params,
            strict: false,
        }
    }

    /// Create a simulator that refuses to run with fatal parameter issues.
    pub fn strict(params: SimulationParameters) -> Self {
        Self {
            params,
            strict: true,
        }
    }

    pub fn parameters(&self) -> &SimulationParameters {
        &self.params
    }

    /// Run the simulation over an ordered price series.
    pub fn simulate(&self, series: &[PriceObservation]) -> Result<SimulationOutput, SimulationError> {
        validate_series(series)?;

        let params = &self.params;
        let mut warnings = params.issues();
        if params.cycle_days >= series.len() {
            warnings.push(ParameterIssue::CycleExceedsSeries {
                cycle_days: params.cycle_days,
                len: series.len(),
            });
        }

        if self.strict {
            if let Some(issue) = warnings.iter().find(|w| w.is_fatal()) {
                return Err(SimulationError::Configuration(issue.clone()));
            }
        }
        for issue in &warnings {
            warn!("Parameter issue: {}", issue);
        }

        debug!(
            "Simulating {} observations: qty={} hedge={} margin={} band={}x..{}x cycle={}",
            series.len(),
            params.quantity,
            params.hedge_ratio,
            params.margin_rate,
            params.inject_threshold_multiple,
            params.withdraw_threshold_multiple,
            params.cycle_days,
        );

        let first = &series[0];
        let overflow_at = |index: usize| {
            SimulationError::InvalidInput(InputError::ArithmeticOverflow {
                index,
                date: series[index].date,
            })
        };

        let initial_equity = params
            .required_margin(first.futures_price)
            .and_then(|margin| margin.checked_mul(params.inject_threshold_multiple))
            .ok_or_else(|| overflow_at(0))?;
        let base_asset_value = first
            .spot_price
            .checked_mul(params.quantity)
            .and_then(|stock| stock.checked_add(initial_equity))
            .ok_or_else(|| overflow_at(0))?;

        let mut account = AccountState {
            equity: initial_equity,
            cumulative_net_cash: Decimal::ZERO,
        };
        let mut degenerate_margin_rows = 0;
        let mut rows = Vec::with_capacity(series.len());

        for i in 0..series.len() {
            let row = self
                .step(series, i, base_asset_value, &mut account)
                .ok_or_else(|| overflow_at(i))?;
            if row.required_margin <= Decimal::ZERO {
                degenerate_margin_rows += 1;
            }
            rows.push(row);
        }

        if degenerate_margin_rows > 0 {
            warn!(
                "Required margin was not positive on {} of {} rows, risk degree reported as 0",
                degenerate_margin_rows,
                rows.len()
            );
        }

        info!(
            "Simulation complete: {} rows, final equity {:.2}, net cash {:.2}",
            rows.len(),
            account.equity.round_dp(2),
            account.cumulative_net_cash.round_dp(2)
        );

        Ok(SimulationOutput {
            parameters: params.clone(),
            initial_equity,
            base_asset_value,
            rows,
            warnings,
            degenerate_margin_rows,
        })
    }

    /// Advance the account through observation `i`. None on overflow.
    fn step(
        &self,
        series: &[PriceObservation],
        i: usize,
        base_asset_value: Decimal,
        account: &mut AccountState,
    ) -> Option<SimulationRow> {
        let params = &self.params;
        let (first, obs) = (&series[0], &series[i]);

        let mut equity = account.equity;
        if i > 0 {
            let mtm = self.futures_pnl(series[i - 1].futures_price, obs.futures_price)?;
            equity = equity.checked_add(mtm)?;
        }

        let required_margin = params.required_margin(obs.futures_price)?;
        let inject_line = required_margin.checked_mul(params.inject_threshold_multiple)?;
        let withdraw_line = required_margin.checked_mul(params.withdraw_threshold_multiple)?;

        let (cash_injected, cash_withdrawn) =
            match decide_cash_action(equity, inject_line, withdraw_line)? {
                CashAction::Inject(amount) => {
                    equity = inject_line;
                    (amount, Decimal::ZERO)
                }
                CashAction::Withdraw(amount) => {
                    equity = withdraw_line;
                    (Decimal::ZERO, amount)
                }
                CashAction::Hold => (Decimal::ZERO, Decimal::ZERO),
            };

        let risk_degree = if required_margin > Decimal::ZERO {
            equity.checked_div(required_margin)?
        } else {
            Decimal::ZERO
        };

        let cumulative_net_cash = account
            .cumulative_net_cash
            .checked_add(cash_withdrawn.checked_sub(cash_injected)?)?;
        let combined_asset_value = obs
            .spot_price
            .checked_mul(params.quantity)?
            .checked_add(equity)?
            .checked_add(cumulative_net_cash)?;

        let (cycle_pnl_unhedged, cycle_futures_pnl, cycle_pnl_hedged) =
            match i.checked_sub(params.cycle_days) {
                Some(start) => {
                    let (spot_pnl, futures_pnl) = self.cycle_pnl(&series[start], obs)?;
                    (
                        Some(spot_pnl),
                        Some(futures_pnl),
                        Some(spot_pnl.checked_add(futures_pnl)?),
                    )
                }
                None => (None, None, None),
            };

        account.equity = equity;
        account.cumulative_net_cash = cumulative_net_cash;

        Some(SimulationRow {
            date: obs.date,
            spot_price: obs.spot_price,
            futures_price: obs.futures_price,
            basis: obs.basis()?,
            required_margin,
            account_equity: equity,
            cash_injected,
            cash_withdrawn,
            risk_degree,
            inject_line,
            withdraw_line,
            cumulative_net_cash,
            combined_asset_value,
            value_change_unhedged: obs
                .spot_price
                .checked_sub(first.spot_price)?
                .checked_mul(params.quantity)?,
            value_change_hedged: combined_asset_value.checked_sub(base_asset_value)?,
            cycle_pnl_unhedged,
            cycle_futures_pnl,
            cycle_pnl_hedged,
        })
    }

    /// Mark-to-market P&L of the short futures leg between two prices.
    fn futures_pnl(&self, from: Decimal, to: Decimal) -> Option<Decimal> {
        from.checked_sub(to)?
            .checked_mul(self.params.hedged_quantity()?)
    }

    /// Spot and futures P&L between the start and end of a cycle.
    fn cycle_pnl(
        &self,
        then: &PriceObservation,
        now: &PriceObservation,
    ) -> Option<(Decimal, Decimal)> {
        let spot_pnl = now
            .spot_price
            .checked_sub(then.spot_price)?
            .checked_mul(self.params.quantity)?;
        let futures_pnl = self.futures_pnl(then.futures_price, now.futures_price)?;

        Some((spot_pnl, futures_pnl))
    }
}

/// Inject is checked first, so it wins whenever the lines overlap.
fn decide_cash_action(
    equity: Decimal,
    inject_line: Decimal,
    withdraw_line: Decimal,
) -> Option<CashAction> {
    let action = if equity < inject_line {
        CashAction::Inject(inject_line.checked_sub(equity)?)
    } else if equity > withdraw_line {
        CashAction::Withdraw(equity.checked_sub(withdraw_line)?)
    } else {
        CashAction::Hold
    };
    Some(action)
}

fn validate_series(series: &[PriceObservation]) -> Result<(), InputError> {
    if series.is_empty() {
        return Err(InputError::EmptySeries);
    }

    if let Some((i, pair)) = series
        .windows(2)
        .enumerate()
        .find(|(_, w)| w[1].date <= w[0].date)
    {
        return Err(InputError::NonMonotonicDates {
            index: i + 1,
            previous: pair[0].date,
            current: pair[1].date,
        });
    }

    Ok(())
}
