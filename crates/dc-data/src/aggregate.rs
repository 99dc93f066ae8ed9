//! Time-bucket resampling and hourly/daily rollups of sensor tables.

use chrono::{DateTime, FixedOffset, NaiveDate, Timelike};
use dc_types::{Interval, Row, Table, Timestamp, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mean of one column over a clock hour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyPoint {
    /// `%Y-%m-%d %H:%M:%S`, truncated to the hour
    pub time: String,
    pub value: Option<f64>,
}

/// Mean of one column over a calendar day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPoint {
    /// `%Y-%m-%d`
    pub date: String,
    pub value: Option<f64>,
}

struct Bucket<'a> {
    offset: FixedOffset,
    rows: Vec<&'a Row>,
}

/// Resample `table` into fixed-width buckets aligned on the local wall clock.
///
/// Numeric columns take the bucket mean rounded to two decimals, the rest take
/// their first non-null value. Numeric columns come first in the output.
/// Rows without a timestamp are left out and buckets without rows are not emitted.
pub fn aggregate(table: &Table, interval: Interval) -> Table {
    let width = match interval.to_seconds() {
        Some(width) if !table.is_empty() => width,
        _ => return table.clone(),
    };

    let (numeric, other): (Vec<usize>, Vec<usize>) =
        (0..table.columns().len()).partition(|&i| table.is_numeric_column(i));

    let mut buckets: BTreeMap<i64, Bucket> = BTreeMap::new();
    for row in table.rows() {
        let Some(ts) = row.timestamp.as_ref() else {
            continue;
        };
        let offset = *ts.offset();
        let local = ts.naive_local().and_utc().timestamp();
        let start = local.div_euclid(width) * width - i64::from(offset.local_minus_utc());

        buckets
            .entry(start)
            .or_insert_with(|| Bucket {
                offset,
                rows: Vec::new(),
            })
            .rows
            .push(row);
    }

    let columns = numeric
        .iter()
        .chain(other.iter())
        .map(|&i| table.columns()[i].clone())
        .collect();

    let rows = buckets
        .into_iter()
        .filter_map(|(start, bucket)| {
            let timestamp = DateTime::from_timestamp(start, 0)?.with_timezone(&bucket.offset);

            let mut values = Vec::with_capacity(numeric.len() + other.len());
            values.extend(numeric.iter().map(|&i| {
                mean(bucket.rows.iter().filter_map(|row| row.values[i].as_f64()))
                    .map(|m| Value::Float(round2(m)))
                    .unwrap_or(Value::Null)
            }));
            values.extend(other.iter().map(|&i| {
                bucket
                    .rows
                    .iter()
                    .map(|row| &row.values[i])
                    .find(|v| !v.is_null())
                    .cloned()
                    .unwrap_or(Value::Null)
            }));

            Some(Row::new(Some(timestamp), values))
        })
        .collect();

    Table::from_rows(columns, rows)
}

/// Per-hour mean of `column`. Empty when the table is empty or lacks the column.
pub fn group_hourly(table: &Table, column: &str) -> Vec<HourlyPoint> {
    group_by(table, column, |ts| {
        let naive = ts.naive_local();
        naive.date().and_hms_opt(naive.hour(), 0, 0)
    })
    .into_iter()
    .map(|(hour, value)| HourlyPoint {
        time: hour.format("%Y-%m-%d %H:%M:%S").to_string(),
        value,
    })
    .collect()
}

/// Per-day mean of `column`. Empty when the table is empty or lacks the column.
pub fn group_daily(table: &Table, column: &str) -> Vec<DailyPoint> {
    group_by(table, column, |ts| Some(ts.naive_local().date()))
        .into_iter()
        .map(|(day, value): (NaiveDate, _)| DailyPoint {
            date: day.format("%Y-%m-%d").to_string(),
            value,
        })
        .collect()
}

fn group_by<K, F>(table: &Table, column: &str, key: F) -> Vec<(K, Option<f64>)>
where
    K: Ord,
    F: Fn(&Timestamp) -> Option<K>,
{
    let Some(index) = table.column_index(column) else {
        return Vec::new();
    };

    let mut groups: BTreeMap<K, (f64, usize)> = BTreeMap::new();
    for row in table.rows() {
        let Some(group) = row.timestamp.as_ref().and_then(&key) else {
            continue;
        };
        let entry = groups.entry(group).or_insert((0.0, 0));
        if let Some(v) = row.values[index].as_f64() {
            entry.0 += v;
            entry.1 += 1;
        }
    }

    groups
        .into_iter()
        .map(|(group, (sum, count))| (group, (count > 0).then(|| sum / count as f64)))
        .collect()
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
