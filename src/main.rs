//! Hedge Margin Simulator - Main Entry Point
//!
//! Replays a spot/futures price history through the margin recurrence of a
//! short hedge and reports the cash the futures account would have needed.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use hedge_margin_sim::config::Config;
use hedge_margin_sim::data::{CsvPriceLoader, PriceSource};
use hedge_margin_sim::simulation::{
    write_report_files, HedgeAnalysis, ParameterSpace, SweepRunner,
};
use rust_decimal::Decimal;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Hedge Margin Simulator CLI
#[derive(Parser)]
#[command(name = "hedge-margin-sim")]
#[command(version, about = "Margin cash-flow simulation for commodity short hedges")]
struct Cli {
    /// Config file name (extension optional)
    #[arg(short, long, global = true, default_value = "config")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for the `[simulation]` config section.
#[derive(clap::Args, Debug, Default)]
struct ParameterArgs {
    /// Physical position size
    #[arg(short, long)]
    quantity: Option<Decimal>,

    /// Fraction of the position hedged (1.0 = fully hedged)
    #[arg(long)]
    hedge_ratio: Option<Decimal>,

    /// Margin rate as a fraction of futures notional
    #[arg(long)]
    margin_rate: Option<Decimal>,

    /// Inject when equity falls below this multiple of required margin
    #[arg(long)]
    inject: Option<Decimal>,

    /// Withdraw when equity rises above this multiple of required margin
    #[arg(long)]
    withdraw: Option<Decimal>,

    /// Holding cycle in observations for periodic P&L
    #[arg(long)]
    cycle_days: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate the margin account over a price file
    Simulate {
        /// Path to CSV price file
        #[arg(short, long)]
        data: String,

        /// Start date (YYYY-MM-DD)
        #[arg(short, long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD)
        #[arg(short, long)]
        end: Option<String>,

        #[command(flatten)]
        params: ParameterArgs,

        /// Output directory for report files
        #[arg(short, long)]
        output: Option<String>,

        /// Run with questionable parameters instead of rejecting them
        #[arg(long)]
        lenient: bool,
    },

    /// Run a parameter sweep over hedge configurations
    Sweep {
        /// Path to CSV price file
        #[arg(short, long)]
        data: String,

        /// Start date (YYYY-MM-DD)
        #[arg(short, long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD)
        #[arg(short, long)]
        end: Option<String>,

        /// Number of parallel simulations (defaults to config)
        #[arg(short, long)]
        parallelism: Option<usize>,

        /// Output directory for results
        #[arg(short, long)]
        output: Option<String>,

        /// Use minimal parameter space (faster, for testing)
        #[arg(long)]
        minimal: bool,
    },

    /// Show how a price file is read
    Inspect {
        /// Path to CSV price file
        #[arg(short, long)]
        data: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _guard = init_logging()?;

    let config = Config::load_from(&cli.config)?;

    match cli.command {
        Commands::Simulate {
            data,
            start,
            end,
            params,
            output,
            lenient,
        } => {
            run_simulate(
                config,
                &data,
                start.as_deref(),
                end.as_deref(),
                params,
                output.as_deref(),
                lenient,
            )
            .await
        }
        Commands::Sweep {
            data,
            start,
            end,
            parallelism,
            output,
            minimal,
        } => {
            run_sweep(
                config,
                &data,
                start.as_deref(),
                end.as_deref(),
                parallelism,
                output.as_deref(),
                minimal,
            )
            .await
        }
        Commands::Inspect { data } => run_inspect(&config, &data),
    }
}

/// Initialize logging to stdout and a daily rolling file under `logs/`.
fn init_logging() -> Result<WorkerGuard> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::daily("logs", "hedge-margin-sim.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("hedge_margin_sim=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(true)
        .init();

    Ok(guard)
}

fn parse_date(label: &str, value: Option<&str>) -> Result<Option<NaiveDate>> {
    value
        .map(|s| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|e| anyhow::anyhow!("Invalid {} date '{}': {}", label, s, e))
        })
        .transpose()
}

fn apply_overrides(config: &mut Config, args: ParameterArgs) {
    let params = &mut config.simulation;
    if let Some(v) = args.quantity {
        params.quantity = v;
    }
    if let Some(v) = args.hedge_ratio {
        params.hedge_ratio = v;
    }
    if let Some(v) = args.margin_rate {
        params.margin_rate = v;
    }
    if let Some(v) = args.inject {
        params.inject_threshold_multiple = v;
    }
    if let Some(v) = args.withdraw {
        params.withdraw_threshold_multiple = v;
    }
    if let Some(v) = args.cycle_days {
        params.cycle_days = v;
    }
}

fn load_prices(config: &Config, data_path: &str) -> Result<CsvPriceLoader> {
    info!("Loading price data from: {}", data_path);
    let loader = CsvPriceLoader::new(data_path, &config.data)
        .with_context(|| format!("Failed to load {}", data_path))?;

    if let Some((first, last)) = loader.available_range() {
        info!("   Data range: {} to {} ({} rows)", first, last, loader.len());
    }

    Ok(loader)
}

async fn run_simulate(
    mut config: Config,
    data_path: &str,
    start: Option<&str>,
    end: Option<&str>,
    params: ParameterArgs,
    output_dir: Option<&str>,
    lenient: bool,
) -> Result<()> {
    info!("╔════════════════════════════════════════════════════════════╗");
    info!("║              MARGIN SIMULATION                             ║");
    info!("╚════════════════════════════════════════════════════════════╝");

    let start = parse_date("start", start)?;
    let end = parse_date("end", end)?;

    apply_overrides(&mut config, params);
    if lenient {
        config.validate_settings()?;
    } else {
        config.validate()?;
    }

    let loader = load_prices(&config, data_path)?;

    let p = &config.simulation;
    info!(
        "   Quantity: {} | Hedge: {} | Margin: {} | Band: {}x..{}x | Cycle: {}",
        p.quantity,
        p.hedge_ratio,
        p.margin_rate,
        p.inject_threshold_multiple,
        p.withdraw_threshold_multiple,
        p.cycle_days
    );

    let mut analysis = HedgeAnalysis::new(loader, config.simulation.clone());
    if lenient {
        analysis = analysis.lenient();
    }

    let result = analysis.run(start, end).await?;

    println!(
        "\n{}",
        result.summary(config.report.display_unit, &config.report.unit_label)
    );

    if let Some(dir) = output_dir {
        let paths = write_report_files(
            dir,
            &result.output,
            &result.summary,
            config.report.display_unit,
        )?;
        for path in paths {
            info!("Saved: {}", path.display());
        }
    }

    Ok(())
}

async fn run_sweep(
    config: Config,
    data_path: &str,
    start: Option<&str>,
    end: Option<&str>,
    parallelism: Option<usize>,
    output_dir: Option<&str>,
    minimal: bool,
) -> Result<()> {
    info!("╔════════════════════════════════════════════════════════════╗");
    info!("║           PARAMETER SWEEP MODE                             ║");
    info!("╚════════════════════════════════════════════════════════════╝");

    let start = parse_date("start", start)?;
    let end = parse_date("end", end)?;
    config.validate_settings()?;

    let loader = load_prices(&config, data_path)?;
    let series = loader.load_range(start, end)?;
    anyhow::ensure!(!series.is_empty(), "No price data in the requested range");

    let param_space = if minimal {
        info!("Using minimal parameter space (quick test)");
        ParameterSpace::minimal()
    } else {
        info!("Using full parameter space");
        ParameterSpace::default()
    };
    info!("   Combinations to test: {}", param_space.combination_count());

    let parallelism = parallelism.unwrap_or(config.sweep.parallelism);
    let runner = SweepRunner::new(param_space, config.simulation.clone(), parallelism);
    let results = runner.run(Arc::new(series)).await?;

    if results.successful_runs == 0 {
        warn!("No sweep combination completed");
    }

    println!(
        "\n{}",
        results.summary(config.report.display_unit, &config.report.unit_label)
    );

    if let Some(dir) = output_dir {
        std::fs::create_dir_all(dir)?;

        let results_path = Path::new(dir).join("sweep_results.csv");
        let file = File::create(&results_path)
            .with_context(|| format!("Failed to create {}", results_path.display()))?;
        results.to_csv(BufWriter::new(file))?;
        info!("Sweep results saved to: {}", results_path.display());
    }

    Ok(())
}

fn run_inspect(config: &Config, data_path: &str) -> Result<()> {
    let loader = load_prices(config, data_path)?;

    println!("File:     {}", data_path);
    if let Some(mapping) = loader.mapping() {
        println!("Date:     column {} ('{}')", mapping.date.index, mapping.date.name);
        println!("Spot:     column {} ('{}')", mapping.spot.index, mapping.spot.name);
        println!(
            "Futures:  column {} ('{}')",
            mapping.futures.index, mapping.futures.name
        );
    }
    println!("Rows:     {}", loader.len());
    if let Some((first, last)) = loader.available_range() {
        println!("Range:    {} to {}", first, last);
    }

    Ok(())
}
