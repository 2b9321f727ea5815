//! Configuration management for the hedge margin simulator.
//!
//! Loads settings from environment variables and config files.

use crate::data::SchemaConfig;
use crate::simulation::SimulationParameters;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Default simulation parameters (CLI flags override these)
    #[serde(default)]
    pub simulation: SimulationParameters,
    /// Price file column mapping
    #[serde(default)]
    pub data: SchemaConfig,
    /// Report formatting
    #[serde(default)]
    pub report: ReportConfig,
    /// Parameter sweep settings
    #[serde(default)]
    pub sweep: SweepConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Currency amounts are divided by this for display (10000 = 万)
    #[serde(default = "default_display_unit")]
    pub display_unit: Decimal,
    /// Label printed next to scaled amounts
    #[serde(default = "default_unit_label")]
    pub unit_label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Number of simulations run concurrently
    #[serde(default = "default_sweep_parallelism")]
    pub parallelism: usize,
}

fn default_display_unit() -> Decimal {
    Decimal::new(10000, 0)
}

fn default_unit_label() -> String {
    "10k".to_string()
}

fn default_sweep_parallelism() -> usize {
    4
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            display_unit: default_display_unit(),
            unit_label: default_unit_label(),
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            parallelism: default_sweep_parallelism(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables and `config.*` files.
    pub fn load() -> Result<Self> {
        Self::load_from("config")
    }

    /// Load configuration from the named file (extension optional, file
    /// optional), then `HMS__SECTION__KEY` environment variables.
    pub fn load_from(file: &str) -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name(file).required(false))
            .add_source(config::Environment::default().separator("__").prefix("HMS"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate everything except the simulation parameters.
    pub fn validate_settings(&self) -> Result<()> {
        anyhow::ensure!(
            self.report.display_unit > Decimal::ZERO,
            "display_unit must be positive"
        );

        anyhow::ensure!(
            self.sweep.parallelism >= 1,
            "sweep.parallelism must be at least 1"
        );

        anyhow::ensure!(
            !self.data.date_formats.is_empty(),
            "data.date_formats must list at least one format"
        );

        Ok(())
    }

    /// Validate configuration values, rejecting fatal parameter issues.
    pub fn validate(&self) -> Result<()> {
        self.validate_settings()?;
        self.simulation
            .validate()
            .context("Invalid simulation parameters")?;
        Ok(())
    }
}
