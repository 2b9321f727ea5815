//! Mapping of CSV headers onto the three logical price fields.

use super::DataError;
use serde::{Deserialize, Serialize};

/// How to find the date, spot and futures columns in a price file.
///
/// An explicit column name always wins. Without one, the first header equal
/// to any alias (trimmed, case-insensitive) is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Exact header of the date column
    #[serde(default)]
    pub date_column: Option<String>,
    /// Exact header of the spot price column
    #[serde(default)]
    pub spot_column: Option<String>,
    /// Exact header of the futures price column
    #[serde(default)]
    pub futures_column: Option<String>,

    #[serde(default = "default_date_aliases")]
    pub date_aliases: Vec<String>,
    #[serde(default = "default_spot_aliases")]
    pub spot_aliases: Vec<String>,
    #[serde(default = "default_futures_aliases")]
    pub futures_aliases: Vec<String>,

    /// chrono format strings tried in order; date-time formats drop the time
    #[serde(default = "default_date_formats")]
    pub date_formats: Vec<String>,
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

fn default_date_aliases() -> Vec<String> {
    to_strings(&["date", "time", "timestamp", "日期", "时间"])
}

fn default_spot_aliases() -> Vec<String> {
    to_strings(&["spot", "spot_price", "spot price", "现货", "现货价格"])
}

fn default_futures_aliases() -> Vec<String> {
    to_strings(&[
        "futures",
        "futures_price",
        "futures price",
        "期货价格",
        "主力合约价格",
        "期货主力合约价格",
    ])
}

fn default_date_formats() -> Vec<String> {
    to_strings(&[
        "%Y-%m-%d",
        "%Y/%m/%d",
        "%Y.%m.%d",
        "%Y%m%d",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y/%m/%d %H:%M:%S",
        "%Y/%m/%d %H:%M",
    ])
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            date_column: None,
            spot_column: None,
            futures_column: None,
            date_aliases: default_date_aliases(),
            spot_aliases: default_spot_aliases(),
            futures_aliases: default_futures_aliases(),
            date_formats: default_date_formats(),
        }
    }
}

/// A header resolved to its position in each record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumn {
    pub index: usize,
    pub name: String,
}

/// Positions of the three logical fields in a CSV record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub date: ResolvedColumn,
    pub spot: ResolvedColumn,
    pub futures: ResolvedColumn,
}

impl ColumnMapping {
    /// Minimum number of fields a record needs to cover every column.
    pub fn min_columns(&self) -> usize {
        self.date.index.max(self.spot.index).max(self.futures.index) + 1
    }
}

fn normalize_header(header: &str) -> String {
    header
        .trim_start_matches('\u{feff}')
        .trim()
        .trim_matches('"')
        .trim()
        .to_lowercase()
}

impl SchemaConfig {
    /// Resolve the column mapping for a header row.
    pub fn resolve(&self, headers: &[String]) -> Result<ColumnMapping, DataError> {
        let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();

        let find = |field: &'static str, explicit: &Option<String>, aliases: &[String]| {
            let candidates: Vec<String> = match explicit {
                Some(name) => vec![normalize_header(name)],
                None => aliases.iter().map(|a| normalize_header(a)).collect(),
            };

            candidates
                .iter()
                .find_map(|c| normalized.iter().position(|h| h == c))
                .map(|index| ResolvedColumn {
                    index,
                    name: headers[index].trim().to_string(),
                })
                .ok_or_else(|| DataError::ColumnNotFound {
                    field,
                    available: headers.iter().map(|h| h.trim().to_string()).collect(),
                })
        };

        Ok(ColumnMapping {
            date: find("date", &self.date_column, self.date_aliases.as_slice())?,
            spot: find("spot", &self.spot_column, self.spot_aliases.as_slice())?,
            futures: find("futures", &self.futures_column, self.futures_aliases.as_slice())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        to_strings(names)
    }

    #[test]
    fn test_resolve_english_headers() {
        let schema = SchemaConfig::default();
        let mapping = schema
            .resolve(&headers(&["Date", "Spot", "Futures"]))
            .unwrap();

        assert_eq!(mapping.date.index, 0);
        assert_eq!(mapping.spot.index, 1);
        assert_eq!(mapping.futures.index, 2);
        assert_eq!(mapping.min_columns(), 3);
    }

    #[test]
    fn test_resolve_chinese_headers() {
        let schema = SchemaConfig::default();
        let mapping = schema
            .resolve(&headers(&["时间", "主力合约价格", "成交量", "现货价格"]))
            .unwrap();

        assert_eq!(mapping.date.name, "时间");
        assert_eq!(mapping.futures.index, 1);
        assert_eq!(mapping.spot.index, 3);
        assert_eq!(mapping.min_columns(), 4);
    }

    #[test]
    fn test_resolve_ignores_case_whitespace_and_bom() {
        let schema = SchemaConfig::default();
        let mapping = schema
            .resolve(&headers(&["\u{feff}DATE ", " \"Spot_Price\"", "futures price"]))
            .unwrap();

        assert_eq!(mapping.date.index, 0);
        assert_eq!(mapping.spot.index, 1);
        assert_eq!(mapping.futures.index, 2);
    }

    #[test]
    fn test_explicit_column_wins_over_aliases() {
        let schema = SchemaConfig {
            futures_column: Some("RB2405".to_string()),
            ..Default::default()
        };
        let mapping = schema
            .resolve(&headers(&["date", "spot", "futures", "RB2405"]))
            .unwrap();

        assert_eq!(mapping.futures.index, 3);
        assert_eq!(mapping.futures.name, "RB2405");
    }

    #[test]
    fn test_explicit_column_missing_does_not_fall_back() {
        let schema = SchemaConfig {
            spot_column: Some("Cash".to_string()),
            ..Default::default()
        };
        let err = schema
            .resolve(&headers(&["date", "spot", "futures"]))
            .unwrap_err();

        assert!(matches!(err, DataError::ColumnNotFound { field: "spot", .. }));
    }

    #[test]
    fn test_missing_column_lists_available() {
        let schema = SchemaConfig::default();
        let err = schema.resolve(&headers(&["date", "spot", "close"])).unwrap_err();

        match err {
            DataError::ColumnNotFound { field, available } => {
                assert_eq!(field, "futures");
                assert_eq!(available, vec!["date", "spot", "close"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_substring_is_not_a_match() {
        let schema = SchemaConfig::default();
        // "spot premium" contains "spot" but is not an alias
        let err = schema
            .resolve(&headers(&["date", "spot premium", "futures"]))
            .unwrap_err();
        assert!(matches!(err, DataError::ColumnNotFound { field: "spot", .. }));
    }
}
