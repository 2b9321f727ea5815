//! CSV and JSON export of simulation results.

use super::{SimulationOutput, SimulationSummary};
use crate::utils::decimal::{round_to_precision, scale_to_unit};
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

pub const DAILY_REPORT_FILE: &str = "daily_report.csv";
pub const ROWS_FILE: &str = "simulation_rows.csv";
pub const SUMMARY_FILE: &str = "summary.json";

const DAILY_REPORT_HEADER: &str =
    "date,spot,futures,basis,margin_required,account_equity,cash_injection,cash_withdrawal,value_change_hedged";

const ROWS_HEADER: &str = "date,spot_price,futures_price,basis,required_margin,account_equity,cash_injected,cash_withdrawn,risk_degree,inject_line,withdraw_line,cumulative_net_cash,combined_asset_value,value_change_unhedged,value_change_hedged,cycle_pnl_unhedged,cycle_futures_pnl,cycle_pnl_hedged";

/// Write the operations report: prices unscaled, amounts in display units
/// with four decimal places.
pub fn write_daily_report<W: Write>(output: &SimulationOutput, unit: Decimal, mut writer: W) -> Result<()> {
    let scaled = |v: Decimal| round_to_precision(scale_to_unit(v, unit), 4);

    writeln!(writer, "{}", DAILY_REPORT_HEADER)?;
    for row in &output.rows {
        writeln!(
            writer,
            "{},{},{},{},{:.4},{:.4},{:.4},{:.4},{:.4}",
            row.date,
            row.spot_price,
            row.futures_price,
            row.basis,
            scaled(row.required_margin),
            scaled(row.account_equity),
            scaled(row.cash_injected),
            scaled(row.cash_withdrawn),
            scaled(row.value_change_hedged),
        )?;
    }
    writer.flush()?;

    Ok(())
}

/// Write every row field unscaled. Undefined cycle values are empty cells.
pub fn write_rows_csv<W: Write>(output: &SimulationOutput, mut writer: W) -> Result<()> {
    let opt = |v: Option<Decimal>| v.map(|d| d.to_string()).unwrap_or_default();

    writeln!(writer, "{}", ROWS_HEADER)?;
    for row in &output.rows {
        writeln!(
            writer,
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
            row.date,
            row.spot_price,
            row.futures_price,
            row.basis,
            row.required_margin,
            row.account_equity,
            row.cash_injected,
            row.cash_withdrawn,
            row.risk_degree,
            row.inject_line,
            row.withdraw_line,
            row.cumulative_net_cash,
            row.combined_asset_value,
            row.value_change_unhedged,
            row.value_change_hedged,
            opt(row.cycle_pnl_unhedged),
            opt(row.cycle_futures_pnl),
            opt(row.cycle_pnl_hedged),
        )?;
    }
    writer.flush()?;

    Ok(())
}

/// Pretty-printed JSON of any serializable result.
pub fn write_json<T: Serialize, W: Write>(value: &T, mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, value)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct SummaryDocument<'a> {
    parameters: &'a super::SimulationParameters,
    warnings: &'a [super::ParameterIssue],
    degenerate_margin_rows: usize,
    summary: &'a SimulationSummary,
}

fn create(dir: &Path, name: &str) -> Result<(PathBuf, BufWriter<File>)> {
    let path = dir.join(name);
    let file = File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
    Ok((path, BufWriter::new(file)))
}

/// Write the daily report, full rows and summary JSON into `dir`.
///
/// Creates the directory if needed and returns the written paths.
pub fn write_report_files(
    dir: impl AsRef<Path>,
    output: &SimulationOutput,
    summary: &SimulationSummary,
    unit: Decimal,
) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let (daily_path, daily) = create(dir, DAILY_REPORT_FILE)?;
    write_daily_report(output, unit, daily)?;

    let (rows_path, rows) = create(dir, ROWS_FILE)?;
    write_rows_csv(output, rows)?;

    let (summary_path, summary_file) = create(dir, SUMMARY_FILE)?;
    let document = SummaryDocument {
        parameters: &output.parameters,
        warnings: &output.warnings,
        degenerate_margin_rows: output.degenerate_margin_rows,
        summary,
    };
    write_json(&document, summary_file)?;

    info!("Wrote report files to {}", dir.display());

    Ok(vec![daily_path, rows_path, summary_path])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PriceObservation;
    use crate::simulation::{MarginSimulator, SimulationParameters};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn sample_output(cycle_days: usize) -> SimulationOutput {
        let series = vec![
            PriceObservation::new(
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                dec!(10000),
                dec!(9800),
            ),
            PriceObservation::new(
                NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
                dec!(10100),
                dec!(10200),
            ),
        ];
        let params = SimulationParameters {
            cycle_days,
            ..Default::default()
        };
        MarginSimulator::new(params).simulate(&series).unwrap()
    }

    #[test]
    fn test_daily_report_scales_amounts() {
        let mut buf = Vec::new();
        write_daily_report(&sample_output(30), dec!(10000), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], DAILY_REPORT_HEADER);
        assert_eq!(
            lines[2],
            "2024-01-03,10100,10200,-100,3.6720,4.4064,1.3728,0.0000,-0.9000"
        );
    }

    #[test]
    fn test_daily_report_rounds_to_nearest() {
        let series = vec![PriceObservation::new(
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            dec!(10000),
            dec!(9800.37),
        )];
        let output = MarginSimulator::new(SimulationParameters::default())
            .simulate(&series)
            .unwrap();
        // 9800.37 * 30 * 0.12 = 35281.332, opening equity 1.2x = 42337.5984
        assert_eq!(output.initial_equity, dec!(42337.5984));

        let mut buf = Vec::new();
        write_daily_report(&output, dec!(10000), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert_eq!(
            text.lines().nth(1),
            Some("2024-01-02,10000,9800.37,199.63,3.5281,4.2338,0.0000,0.0000,0.0000")
        );
    }

    #[test]
    fn test_rows_csv_leaves_undefined_cycles_empty() {
        let mut buf = Vec::new();
        write_rows_csv(&sample_output(1), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].split(',').count(), 18);
        assert!(lines[1].ends_with(",,,"));
        assert!(lines[2].ends_with(",3000,-12000,-9000"));
    }

    #[test]
    fn test_json_round_trips_output() {
        let output = sample_output(1);
        let mut buf = Vec::new();
        write_json(&output, &mut buf).unwrap();

        let parsed: SimulationOutput = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed, output);
    }

    #[test]
    fn test_write_report_files() {
        let dir = std::env::temp_dir().join(format!("hms-report-{}", std::process::id()));
        let output = sample_output(1);
        let summary = SimulationSummary::calculate(&output);

        let paths = write_report_files(&dir, &output, &summary, dec!(10000)).unwrap();
        assert_eq!(paths.len(), 3);
        for path in &paths {
            assert!(path.exists(), "{} missing", path.display());
        }

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.join(SUMMARY_FILE)).unwrap()).unwrap();
        assert_eq!(json["summary"]["observations"], 2);
        assert!(json["warnings"].as_array().unwrap().is_empty());

        fs::remove_dir_all(&dir).unwrap();
    }
}
