use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, SecondsFormat};
use serde::{Deserialize, Serialize};

/// Cell text that parses as a missing value
const NA_TOKENS: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "null", "NULL", "None", "#N/A",
];

/// A single cell in a sensor table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Type a raw CSV cell: missing markers, then integers, then floats, then text.
    pub fn parse_cell(raw: &str) -> Self {
        let trimmed = raw.trim();
        if NA_TOKENS.contains(&trimmed) {
            return Value::Null;
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            return Value::Float(f);
        }
        Value::Text(raw.to_string())
    }

    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Numeric view of the cell; NaN counts as missing.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) if !f.is_nan() => Some(*f),
            _ => None,
        }
    }

    /// Integer view of the cell, accepting integral floats and numeric text.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(*f as i64),
            Value::Text(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// JSON rendering; missing and non-finite numbers become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

/// A parsed CSV file before timestamp normalization
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    headers: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Frame {
    /// Create an empty frame. Repeated header names get `.1`, `.2` suffixes.
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut unique = Vec::new();

        for header in headers {
            let header = header.into();
            let count = seen.entry(header.clone()).or_insert(0);
            if *count == 0 {
                unique.push(header);
            } else {
                unique.push(format!("{}.{}", header, count));
            }
            *count += 1;
        }

        Self {
            headers: unique,
            rows: Vec::new(),
        }
    }

    /// Append a row, padding short rows with nulls.
    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.headers.len(), Value::Null);
        self.rows.push(row);
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<Vec<Value>>) {
        (self.headers, self.rows)
    }
}

pub type Timestamp = DateTime<FixedOffset>;

/// One sensor sample: a derived timestamp plus values aligned to the table columns
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub timestamp: Option<Timestamp>,
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(timestamp: Option<Timestamp>, values: Vec<Value>) -> Self {
        Self { timestamp, values }
    }
}

/// Ascending timestamp order with missing timestamps last.
pub fn compare_timestamps(a: &Option<Timestamp>, b: &Option<Timestamp>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// RFC 3339 rendering used on the wire, e.g. `2025-11-18T14:44:23+07:00`.
pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

/// Column-named, timestamped sensor table
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a table from rows, padding or truncating each to the column count.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Row>) -> Self {
        let mut table = Self::new(columns);
        for row in rows {
            table.push(row);
        }
        table
    }

    pub fn push(&mut self, mut row: Row) {
        row.values.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut Vec<Row> {
        &mut self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// A column is numeric when every non-null cell holds a number.
    pub fn is_numeric_column(&self, index: usize) -> bool {
        self.rows.iter().all(|row| match row.values.get(index) {
            Some(v) => v.is_null() || v.is_numeric(),
            None => true,
        })
    }

    /// Concatenate tables under the union of their columns, in first-seen order.
    pub fn concat(tables: Vec<Table>) -> Table {
        let mut columns: Vec<String> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for table in &tables {
            for column in &table.columns {
                if !positions.contains_key(column) {
                    positions.insert(column.clone(), columns.len());
                    columns.push(column.clone());
                }
            }
        }

        let total = tables.iter().map(Table::len).sum();
        let mut rows = Vec::with_capacity(total);

        for table in tables {
            let mapping: Vec<usize> = table.columns.iter().map(|c| positions[c]).collect();
            for row in table.rows {
                let mut values = vec![Value::Null; columns.len()];
                for (value, &target) in row.values.into_iter().zip(mapping.iter()) {
                    values[target] = value;
                }
                rows.push(Row::new(row.timestamp, values));
            }
        }

        Table { columns, rows }
    }

    /// Stable sort ascending by timestamp, missing timestamps last.
    pub fn sort_by_timestamp(&mut self) {
        self.rows
            .sort_by(|a, b| compare_timestamps(&a.timestamp, &b.timestamp));
    }

    pub fn is_sorted_by_timestamp(&self) -> bool {
        self.rows
            .windows(2)
            .all(|w| compare_timestamps(&w[0].timestamp, &w[1].timestamp) != Ordering::Greater)
    }

    /// Positional slice `[skip, skip + limit)`, clamped to the table bounds.
    pub fn slice(&self, skip: usize, limit: usize) -> Table {
        let start = skip.min(self.rows.len());
        let end = start.saturating_add(limit).min(self.rows.len());
        Table {
            columns: self.columns.clone(),
            rows: self.rows[start..end].to_vec(),
        }
    }

    pub fn head(&self, n: usize) -> Table {
        self.slice(0, n)
    }

    pub fn tail(&self, n: usize) -> Table {
        let start = self.rows.len().saturating_sub(n);
        self.slice(start, n)
    }

    /// Flat records: column → value plus `timestamp`, nulls explicit.
    pub fn to_records(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.rows
            .iter()
            .map(|row| {
                let mut record = serde_json::Map::with_capacity(self.columns.len() + 1);
                for (column, value) in self.columns.iter().zip(row.values.iter()) {
                    record.insert(column.clone(), value.to_json());
                }
                record.insert(
                    "timestamp".to_string(),
                    row.timestamp
                        .as_ref()
                        .map(|ts| serde_json::Value::String(format_timestamp(ts)))
                        .unwrap_or(serde_json::Value::Null),
                );
                record
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> Option<Timestamp> {
        Some(DateTime::parse_from_rfc3339(s).unwrap())
    }

    #[test]
    fn test_parse_cell_types() {
        assert_eq!(Value::parse_cell("42"), Value::Int(42));
        assert_eq!(Value::parse_cell("415.5"), Value::Float(415.5));
        assert_eq!(Value::parse_cell(""), Value::Null);
        assert_eq!(Value::parse_cell("NaN"), Value::Null);
        assert_eq!(Value::parse_cell("OK"), Value::Text("OK".to_string()));
    }

    #[test]
    fn test_non_finite_values_render_as_null() {
        assert_eq!(Value::Float(f64::NAN).to_json(), serde_json::Value::Null);
        assert_eq!(Value::Float(f64::INFINITY).to_json(), serde_json::Value::Null);
        assert_eq!(Value::Null.to_json(), serde_json::Value::Null);
    }

    #[test]
    fn test_frame_dedupes_headers_and_pads_rows() {
        let mut frame = Frame::new(["a", "b", "a"]);
        assert_eq!(frame.headers(), &["a", "b", "a.1"]);

        frame.push_row(vec![Value::Int(1)]);
        assert_eq!(frame.rows()[0], vec![Value::Int(1), Value::Null, Value::Null]);
    }

    #[test]
    fn test_concat_unions_columns() {
        let a = Table::from_rows(
            vec!["x".to_string()],
            vec![Row::new(ts("2025-01-01T00:00:00+00:00"), vec![Value::Int(1)])],
        );
        let b = Table::from_rows(
            vec!["y".to_string(), "x".to_string()],
            vec![Row::new(
                ts("2025-01-01T00:01:00+00:00"),
                vec![Value::Text("ok".into()), Value::Int(2)],
            )],
        );

        let merged = Table::concat(vec![a, b]);
        assert_eq!(merged.columns(), &["x", "y"]);
        assert_eq!(merged.rows()[0].values, vec![Value::Int(1), Value::Null]);
        assert_eq!(
            merged.rows()[1].values,
            vec![Value::Int(2), Value::Text("ok".into())]
        );
    }

    #[test]
    fn test_sort_puts_missing_timestamps_last() {
        let mut table = Table::from_rows(
            vec!["v".to_string()],
            vec![
                Row::new(None, vec![Value::Int(0)]),
                Row::new(ts("2025-01-01T00:02:00+00:00"), vec![Value::Int(2)]),
                Row::new(ts("2025-01-01T00:01:00+00:00"), vec![Value::Int(1)]),
            ],
        );
        table.sort_by_timestamp();

        assert!(table.is_sorted_by_timestamp());
        assert_eq!(table.rows()[0].values[0], Value::Int(1));
        assert!(table.rows()[2].timestamp.is_none());
    }

    #[test]
    fn test_slice_and_tail() {
        let rows = (0..5)
            .map(|i| Row::new(None, vec![Value::Int(i)]))
            .collect();
        let table = Table::from_rows(vec!["v".to_string()], rows);

        let page = table.slice(0, 2);
        assert_eq!(page.len(), 2);
        assert_eq!(page.rows()[0].values[0], Value::Int(0));
        assert_eq!(page.rows()[1].values[0], Value::Int(1));

        assert_eq!(table.slice(4, 10).len(), 1);
        assert!(table.slice(9, 10).is_empty());
        assert_eq!(table.tail(2).rows()[0].values[0], Value::Int(3));
    }

    #[test]
    fn test_records_render_timestamp_with_offset() {
        let table = Table::from_rows(
            vec!["COM_1 Wd_0".to_string()],
            vec![Row::new(ts("2025-11-18T14:44:23+07:00"), vec![Value::Null])],
        );
        let records = table.to_records();

        assert_eq!(records[0]["timestamp"], "2025-11-18T14:44:23+07:00");
        assert!(records[0]["COM_1 Wd_0"].is_null());
    }
}
