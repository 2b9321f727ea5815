//! Price series loading.
//!
//! Turns a CSV export of daily spot and futures prices into a sorted,
//! validated sequence of [`PriceObservation`]s. Column selection is an
//! explicit schema-mapping step ([`SchemaConfig::resolve`]) that fails with
//! [`DataError::ColumnNotFound`] before the simulator ever sees the data.

mod loader;
mod schema;

pub use loader::{normalize_number, split_record, CsvPriceLoader};
pub use schema::{ColumnMapping, ResolvedColumn, SchemaConfig};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// One calendar entry of the price series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub date: NaiveDate,
    pub spot_price: Decimal,
    pub futures_price: Decimal,
}

impl PriceObservation {
    pub fn new(date: NaiveDate, spot_price: Decimal, futures_price: Decimal) -> Self {
        Self {
            date,
            spot_price,
            futures_price,
        }
    }

    /// Spot minus futures, None on overflow.
    pub fn basis(&self) -> Option<Decimal> {
        self.spot_price.checked_sub(self.futures_price)
    }
}

/// Errors raised while loading a price series.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no {field} column found, available columns: {}", available.join(", "))]
    ColumnNotFound {
        field: &'static str,
        available: Vec<String>,
    },

    #[error("line {line}: expected at least {expected} columns, got {found}")]
    MalformedRow {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: invalid date '{value}'")]
    InvalidDate { line: usize, value: String },

    #[error("line {line}: invalid {column} value '{value}'")]
    InvalidNumber {
        line: usize,
        column: &'static str,
        value: String,
    },

    #[error("duplicate observation for {date}")]
    DuplicateDate { date: NaiveDate },

    #[error("price file contains no data rows")]
    Empty,
}

/// A source of daily price observations.
#[cfg_attr(test, mockall::automock)]
pub trait PriceSource: Send + Sync {
    /// Load the full series, sorted ascending by date.
    fn load(&self) -> Result<Vec<PriceObservation>, DataError>;

    /// Load observations with `start <= date <= end`.
    fn load_range(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<PriceObservation>, DataError> {
        let series = self
            .load()?
            .into_iter()
            .filter(|o| start.map_or(true, |s| o.date >= s) && end.map_or(true, |e| o.date <= e))
            .collect();

        Ok(series)
    }
}
