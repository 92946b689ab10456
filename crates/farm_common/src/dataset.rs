//! Dataset Loader
//!
//! Reads the pesticide usage table (region, year, value) from CSV into memory.
//! The table is immutable after load and shared read-only by the predictor and
//! the trend view.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Region column names, in order of preference
pub const REGION_COLUMNS: [&str; 2] = ["Area", "Country"];
pub const YEAR_COLUMN: &str = "Year";
pub const VALUE_COLUMN: &str = "Value";

/// Dataset load errors
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("missing required column: {0}")]
    MissingColumn(String),

    #[error("line {line}: bad {column} value {value:?}")]
    Malformed {
        line: u64,
        column: String,
        value: String,
    },

    #[error("dataset contains no records")]
    Empty,
}

/// One row of the usage table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub region: String,
    pub year: i32,
    pub value: f64,
}

/// Average usage for one year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub year: i32,
    pub average: f64,
}

/// In-memory usage table
#[derive(Debug, Clone)]
pub struct Dataset {
    records: Vec<UsageRecord>,
}

impl Dataset {
    /// Load a CSV file. Missing or malformed files are errors.
    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        let file = std::fs::File::open(path).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let dataset = Self::from_reader(file)?;
        tracing::debug!(
            "Loaded {} usage records from {}",
            dataset.len(),
            path.display()
        );
        Ok(dataset)
    }

    /// Parse CSV with a header row from any reader
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DatasetError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        let column = |name: &str| headers.iter().position(|h| h == name);

        let region_idx = REGION_COLUMNS
            .iter()
            .find_map(|&name| column(name))
            .ok_or_else(|| DatasetError::MissingColumn(REGION_COLUMNS.join("/")))?;
        let region_name = &headers[region_idx];
        let year_idx =
            column(YEAR_COLUMN).ok_or_else(|| DatasetError::MissingColumn(YEAR_COLUMN.into()))?;
        let value_idx = column(VALUE_COLUMN)
            .ok_or_else(|| DatasetError::MissingColumn(VALUE_COLUMN.into()))?;

        let mut records = Vec::new();
        for result in rdr.records() {
            let row = result?;
            let line = row.position().map(|p| p.line()).unwrap_or_default();
            let cell = |idx: usize| row.get(idx).unwrap_or("");

            let region = cell(region_idx);
            if region.is_empty() {
                return Err(malformed(line, region_name, region));
            }
            let year = parse_year(cell(year_idx))
                .ok_or_else(|| malformed(line, YEAR_COLUMN, cell(year_idx)))?;
            let value = cell(value_idx)
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| malformed(line, VALUE_COLUMN, cell(value_idx)))?;

            records.push(UsageRecord {
                region: region.to_string(),
                year,
                value,
            });
        }

        Self::from_records(records)
    }

    /// Build from already-parsed records
    pub fn from_records(records: Vec<UsageRecord>) -> Result<Self, DatasetError> {
        if records.is_empty() {
            return Err(DatasetError::Empty);
        }
        Ok(Self { records })
    }

    pub fn records(&self) -> &[UsageRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sorted distinct region identifiers
    pub fn regions(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|r| r.region.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(String::from)
            .collect()
    }

    /// Earliest and latest year present
    pub fn year_range(&self) -> Option<(i32, i32)> {
        let min = self.records.iter().map(|r| r.year).min()?;
        let max = self.records.iter().map(|r| r.year).max()?;
        Some((min, max))
    }

    /// Mean usage per year for every year in `[start, end]` present in the data.
    ///
    /// Years come back ascending. An inverted range yields no points.
    pub fn trend(&self, start: i32, end: i32) -> Vec<TrendPoint> {
        let mut sums: BTreeMap<i32, (f64, usize)> = BTreeMap::new();
        for record in self
            .records
            .iter()
            .filter(|r| r.year >= start && r.year <= end)
        {
            let entry = sums.entry(record.year).or_insert((0.0, 0));
            entry.0 += record.value;
            entry.1 += 1;
        }

        sums.into_iter()
            .map(|(year, (sum, count))| TrendPoint {
                year,
                average: sum / count as f64,
            })
            .collect()
    }
}

fn malformed(line: u64, column: &str, value: &str) -> DatasetError {
    DatasetError::Malformed {
        line,
        column: column.to_string(),
        value: value.to_string(),
    }
}

/// Years are integers, but exported tables sometimes write them as `1990.0`
fn parse_year(cell: &str) -> Option<i32> {
    if let Ok(year) = cell.parse::<i32>() {
        return Some(year);
    }
    let as_float = cell.parse::<f64>().ok()?;
    if as_float.fract() == 0.0 && as_float.abs() <= i32::MAX as f64 {
        Some(as_float as i32)
    } else {
        None
    }
}
