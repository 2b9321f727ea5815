//! CSV price loader.
//!
//! Expected input is a header row followed by one row per day, e.g.
//!
//! ```csv
//! Date,Spot,Futures
//! 2024-01-02,"10,000",9800
//! 2024-01-03,"10,100",10200
//! ```
//!
//! Any column order works; extra columns are ignored.

use super::{ColumnMapping, DataError, PriceObservation, PriceSource, SchemaConfig};
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Loads a price series from a CSV file into memory.
#[derive(Debug, Clone)]
pub struct CsvPriceLoader {
    /// Observations sorted ascending by date
    observations: Vec<PriceObservation>,
    /// Header mapping used to parse the file (None when built in memory)
    mapping: Option<ColumnMapping>,
}

impl CsvPriceLoader {
    /// Load data from a CSV file.
    pub fn new<P: AsRef<Path>>(path: P, schema: &SchemaConfig) -> Result<Self, DataError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| DataError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let loader = Self::from_csv_content(&content, schema)?;
        debug!(
            "Loaded {} observations from {}",
            loader.len(),
            path.display()
        );

        Ok(loader)
    }

    /// Load data from CSV content string.
    pub fn from_csv_content(content: &str, schema: &SchemaConfig) -> Result<Self, DataError> {
        let content = content.trim_start_matches('\u{feff}');
        let mut records = content
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line))
            .filter(|(_, line)| !is_blank(line));

        let (_, header_line) = records.next().ok_or(DataError::Empty)?;
        let headers = split_record(header_line);
        let mapping = schema.resolve(&headers)?;
        let min_columns = mapping.min_columns();

        let mut observations = Vec::new();
        for (line_num, line) in records {
            let fields = split_record(line);
            if fields.len() < min_columns {
                return Err(DataError::MalformedRow {
                    line: line_num,
                    expected: min_columns,
                    found: fields.len(),
                });
            }

            let raw_date = fields[mapping.date.index].trim();
            let date = parse_date(raw_date, &schema.date_formats).ok_or_else(|| {
                DataError::InvalidDate {
                    line: line_num,
                    value: raw_date.to_string(),
                }
            })?;

            observations.push(PriceObservation {
                date,
                spot_price: parse_price(&fields[mapping.spot.index], line_num, "spot")?,
                futures_price: parse_price(&fields[mapping.futures.index], line_num, "futures")?,
            });
        }

        if observations.is_empty() {
            return Err(DataError::Empty);
        }

        let observations = sort_and_check(observations)?;

        Ok(Self {
            observations,
            mapping: Some(mapping),
        })
    }

    /// Create a loader from in-memory observations.
    pub fn from_observations(observations: Vec<PriceObservation>) -> Result<Self, DataError> {
        Ok(Self {
            observations: sort_and_check(observations)?,
            mapping: None,
        })
    }

    /// Get total number of observations.
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// Check if the loader has no data.
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// First and last date in the data.
    pub fn available_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        match (self.observations.first(), self.observations.last()) {
            (Some(first), Some(last)) => Some((first.date, last.date)),
            _ => None,
        }
    }

    /// Header mapping the file was parsed with.
    pub fn mapping(&self) -> Option<&ColumnMapping> {
        self.mapping.as_ref()
    }
}

impl PriceSource for CsvPriceLoader {
    fn load(&self) -> Result<Vec<PriceObservation>, DataError> {
        Ok(self.observations.clone())
    }
}

fn is_blank(line: &str) -> bool {
    line.chars().all(|c| c == ',' || c.is_whitespace())
}

fn sort_and_check(
    mut observations: Vec<PriceObservation>,
) -> Result<Vec<PriceObservation>, DataError> {
    observations.sort_by_key(|o| o.date);

    if let Some(pair) = observations.windows(2).find(|w| w[0].date == w[1].date) {
        return Err(DataError::DuplicateDate { date: pair[1].date });
    }

    Ok(observations)
}

fn parse_date(raw: &str, formats: &[String]) -> Option<NaiveDate> {
    let raw = raw.trim_matches('"').trim();

    formats.iter().find_map(|fmt| {
        if fmt.contains("%H") {
            NaiveDateTime::parse_from_str(raw, fmt)
                .ok()
                .map(|dt| dt.date())
        } else {
            NaiveDate::parse_from_str(raw, fmt).ok()
        }
    })
}

fn parse_price(raw: &str, line: usize, column: &'static str) -> Result<Decimal, DataError> {
    let normalized = normalize_number(raw);

    Decimal::from_str(&normalized)
        .or_else(|_| Decimal::from_scientific(&normalized))
        .map_err(|_| DataError::InvalidNumber {
            line,
            column,
            value: raw.trim().to_string(),
        })
}

/// Strip quotes, whitespace and thousands separators from a numeric cell.
///
/// `" 12,345.50 "` becomes `12345.50`.
pub fn normalize_number(raw: &str) -> String {
    raw.trim()
        .trim_matches('"')
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect()
}

/// Split one CSV record, honoring double-quoted fields and `""` escapes.
pub fn split_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);

    fields
}
