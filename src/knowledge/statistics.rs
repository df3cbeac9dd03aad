use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::decode_text;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub year: i32,
    pub value: f64,
}

/// Yearly statistics keyed by column name, one value per year and column.
#[derive(Debug, Clone, Default)]
pub struct StatisticsTable {
    columns: BTreeMap<String, BTreeMap<i32, f64>>,
}

impl StatisticsTable {
    /// Loads a `Year,<column>,...` CSV. A missing or unreadable file yields an
    /// empty table so the chat keeps working without charts.
    pub fn load(path: &Path) -> Self {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(file = %path.display(), "Statistics unavailable: {}", e);
                return Self::default();
            }
        };
        let (text, latin1) = decode_text(&bytes);
        if latin1 {
            tracing::warn!(file = %path.display(), "Statistics file decoded as Latin-1");
        }

        match Self::parse(&text) {
            Ok(table) => {
                tracing::info!(
                    columns = table.columns.len(),
                    "Statistics loaded from {}",
                    path.display()
                );
                table
            }
            Err(e) => {
                tracing::warn!(file = %path.display(), "Failed to parse statistics: {}", e);
                Self::default()
            }
        }
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(text.as_bytes());
        let headers = reader.headers()?.clone();
        let year_col = headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case("year"))
            .ok_or_else(|| anyhow::anyhow!("missing Year column"))?;

        let mut table = Self::default();
        for row in reader.records() {
            let row = row?;
            let Some(year) = row.get(year_col).and_then(parse_year) else {
                continue;
            };
            for (index, header) in headers.iter().enumerate() {
                if index == year_col {
                    continue;
                }
                if let Some(value) = row.get(index).and_then(|v| v.trim().parse::<f64>().ok()) {
                    table.insert(header.trim(), year, value);
                }
            }
        }
        Ok(table)
    }

    pub fn insert(&mut self, column: &str, year: i32, value: f64) {
        self.columns
            .entry(column.to_string())
            .or_default()
            .insert(year, value);
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// The `n` most recent years that have a value for `column`, oldest first.
    /// Column names match case-insensitively.
    pub fn recent(&self, column: &str, n: usize) -> Vec<DataPoint> {
        let Some(values) = self
            .columns
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, values)| values)
        else {
            return Vec::new();
        };

        let mut points: Vec<DataPoint> = values
            .iter()
            .rev()
            .take(n)
            .map(|(&year, &value)| DataPoint { year, value })
            .collect();
        points.reverse();
        points
    }
}

fn parse_year(raw: &str) -> Option<i32> {
    let raw = raw.trim();
    raw.parse::<i32>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|y| y.fract() == 0.0)
            .map(|y| y as i32)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Year,HIV (per 1000),chlamydia (per 1000)\n\
2016,1.0,20.5\n\
2017,1.1,\n\
2018,1.2,22.0\n\
2019.0,1.3,23.5\n\
2020,1.4,24.0\n\
2021,1.5,25.5\n\
unknown,9.9,9.9\n";

    #[test]
    fn recent_returns_latest_years_ascending() {
        let table = StatisticsTable::parse(SAMPLE).unwrap();
        let years: Vec<i32> = table
            .recent("HIV (per 1000)", 5)
            .iter()
            .map(|p| p.year)
            .collect();
        assert_eq!(years, vec![2017, 2018, 2019, 2020, 2021]);
    }

    #[test]
    fn recent_skips_missing_values_and_ignores_case() {
        let table = StatisticsTable::parse(SAMPLE).unwrap();
        let points = table.recent("CHLAMYDIA (per 1000)", 5);
        assert_eq!(
            points.iter().map(|p| p.year).collect::<Vec<_>>(),
            vec![2016, 2018, 2019, 2020, 2021]
        );
        assert_eq!(points.last().unwrap().value, 25.5);
    }

    #[test]
    fn unknown_column_is_empty() {
        let table = StatisticsTable::parse(SAMPLE).unwrap();
        assert!(table.recent("syphilis (per 1000)", 5).is_empty());
    }

    #[test]
    fn missing_file_yields_empty_table() {
        let tmp = tempfile::tempdir().unwrap();
        let table = StatisticsTable::load(&tmp.path().join("missing.csv"));
        assert!(table.is_empty());
    }

    #[test]
    fn parse_requires_year_column() {
        assert!(StatisticsTable::parse("Date,HIV\n2020,1\n").is_err());
    }
}
