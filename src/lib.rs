//! # Hedge Margin Simulator
//!
//! Daily margin cash-flow simulation for a commodity short hedge: a long
//! physical position offset by short futures, with the futures account
//! topped up or skimmed whenever equity leaves a band around the required
//! margin.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `data`: CSV price loading and column mapping
//! - `simulation`: Margin recurrence, summaries, export, cache and sweeps
//! - `utils`: Shared utilities and decimal arithmetic

pub mod config;
pub mod data;
pub mod simulation;
pub mod utils;

pub use config::Config;
