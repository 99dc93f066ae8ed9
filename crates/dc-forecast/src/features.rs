//! Feature engineering for the carbon rate models.
//!
//! [`prepare`] turns a raw WISE-4051 table into a column-oriented
//! [`FeatureFrame`] with model-facing column names, and [`engineer_features`]
//! derives the lag, rolling-window, calendar and interaction features the
//! models were trained on. Every derived feature only looks backwards in time.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use chrono::{Datelike, Timelike};
use dc_types::{compare_timestamps, DcResult, ForecastError, Table, Timestamp};

/// Numeric column with missing values
pub type Series = Vec<Option<f64>>;

/// Logger status columns that carry no signal for the models.
pub const EVENT_COLUMNS: [&str; 11] = [
    "COM_1 Wd_0 Evt",
    "COM_1 Wd_1 Evt",
    "COM_1 Wd_2 Evt",
    "COM_1 Wd_3",
    "COM_1 Wd_3 Evt",
    "COM_1 Wd_4 Evt",
    "COM_1 Wd_5",
    "COM_1 Wd_5 Evt",
    "COM_1 Wd_6 Evt",
    "COM_1 Wd_7",
    "COM_1 Wd_7 Evt",
];

/// Logger column → model feature name.
pub const COLUMN_RENAMES: [(&str, &str); 5] = [
    ("COM_1 Wd_0", "carbon"),
    ("COM_1 Wd_1", "Temp"),
    ("COM_1 Wd_2", "Humidity"),
    ("COM_1 Wd_4", "light_intensity"),
    ("COM_1 Wd_6", "lux"),
];

/// Features standardized before prediction.
pub const SCALED_NUMERICAL_FEATURES: [&str; 28] = [
    "Temp",
    "Humidity",
    "light_intensity",
    "lux",
    "instantaneous_rate_change",
    "instantaneous_rate_per_hour",
    "carbon_lag1",
    "carbon_lag2",
    "carbon_lag3",
    "carbon_lag4",
    "carbon_lag5",
    "carbon_rolling_mean_3",
    "carbon_rolling_std_3",
    "carbon_rolling_min_3",
    "carbon_rolling_max_3",
    "carbon_rolling_mean_5",
    "carbon_rolling_std_5",
    "carbon_rolling_min_5",
    "carbon_rolling_max_5",
    "carbon_rolling_mean_10",
    "carbon_rolling_std_10",
    "carbon_rolling_min_10",
    "carbon_rolling_max_10",
    "carbon_lag1_diff",
    "carbon_lag2_diff",
    "temp_humidity_interaction",
    "comfort_index",
    "carbon_zscore",
];

/// Features fed to the models, in training order.
pub const FINAL_FEATURE_COLUMNS: [&str; 38] = [
    "Temp",
    "Humidity",
    "light_intensity",
    "lux",
    "instantaneous_rate_change",
    "instantaneous_rate_per_hour",
    "hour",
    "day_of_week",
    "minute",
    "is_weekend",
    "time_of_day",
    "carbon_lag1",
    "carbon_lag2",
    "carbon_lag3",
    "carbon_lag4",
    "carbon_lag5",
    "carbon_rolling_mean_3",
    "carbon_rolling_std_3",
    "carbon_rolling_min_3",
    "carbon_rolling_max_3",
    "carbon_rolling_mean_5",
    "carbon_rolling_std_5",
    "carbon_rolling_min_5",
    "carbon_rolling_max_5",
    "carbon_rolling_mean_10",
    "carbon_rolling_std_10",
    "carbon_rolling_min_10",
    "carbon_rolling_max_10",
    "carbon_lag1_diff",
    "carbon_lag2_diff",
    "temp_humidity_interaction",
    "comfort_index",
    "light_category",
    "hour_sin",
    "hour_cos",
    "day_sin",
    "day_cos",
    "carbon_zscore",
];

/// Extra columns the trained pipeline expects alongside the final features.
pub const PIPELINE_COLUMNS: [&str; 2] = ["light intensity", "time_diff_hours"];

const ROLLING_WINDOWS: [usize; 3] = [3, 5, 10];
const MAX_LAG: usize = 5;

/// Every column a model row must carry.
pub fn model_input_columns() -> impl Iterator<Item = &'static str> {
    FINAL_FEATURE_COLUMNS
        .into_iter()
        .chain(PIPELINE_COLUMNS)
}

/// Time-sorted, column-oriented feature table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureFrame {
    times: Vec<Timestamp>,
    numeric: BTreeMap<String, Series>,
    categorical: BTreeMap<String, Vec<Option<&'static str>>>,
}

impl FeatureFrame {
    pub fn new(times: Vec<Timestamp>) -> Self {
        Self {
            times,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[Timestamp] {
        &self.times
    }

    pub fn numeric(&self, name: &str) -> Option<&Series> {
        self.numeric.get(name)
    }

    pub fn categorical(&self, name: &str) -> Option<&[Option<&'static str>]> {
        self.categorical.get(name).map(Vec::as_slice)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.numeric.contains_key(name) || self.categorical.contains_key(name)
    }

    /// Whether `name` holds a value at `row`; absent columns count as missing.
    pub fn is_present(&self, name: &str, row: usize) -> bool {
        if let Some(series) = self.numeric.get(name) {
            return matches!(series.get(row), Some(Some(v)) if v.is_finite());
        }
        if let Some(labels) = self.categorical.get(name) {
            return matches!(labels.get(row), Some(Some(_)));
        }
        false
    }

    pub fn insert_numeric(&mut self, name: &str, series: Series) {
        debug_assert_eq!(series.len(), self.len());
        self.numeric.insert(name.to_string(), series);
    }

    pub fn insert_categorical(&mut self, name: &str, labels: Vec<Option<&'static str>>) {
        debug_assert_eq!(labels.len(), self.len());
        self.categorical.insert(name.to_string(), labels);
    }
}

/// Drop logger status columns, rename sensor channels and sort by time.
///
/// Rows without a timestamp are dropped and only numeric columns are kept.
pub fn prepare(table: &Table) -> DcResult<FeatureFrame> {
    let mut order: Vec<usize> = (0..table.len())
        .filter(|&i| table.rows()[i].timestamp.is_some())
        .collect();
    order.sort_by(|&a, &b| compare_timestamps(&table.rows()[a].timestamp, &table.rows()[b].timestamp));

    let times = order
        .iter()
        .filter_map(|&i| table.rows()[i].timestamp)
        .collect();
    let mut frame = FeatureFrame::new(times);

    for (index, column) in table.columns().iter().enumerate() {
        if EVENT_COLUMNS.contains(&column.as_str()) || !table.is_numeric_column(index) {
            continue;
        }
        let name = COLUMN_RENAMES
            .iter()
            .find(|(from, _)| *from == column.as_str())
            .map(|(_, to)| *to)
            .unwrap_or(column.as_str());

        let series = order
            .iter()
            .map(|&i| table.rows()[i].values[index].as_f64())
            .collect();
        frame.insert_numeric(name, series);
    }

    if !frame.has_column("carbon") {
        return Err(ForecastError::MissingColumn {
            column: "carbon".to_string(),
        }
        .into());
    }

    Ok(frame)
}

/// Derive every model feature in place. Requires a `carbon` column.
pub fn engineer_features(frame: &mut FeatureFrame) {
    let Some(carbon) = frame.numeric("carbon").cloned() else {
        return;
    };

    let rate_change = diff(&carbon, 1);
    let mut time_diff_hours: Series = frame
        .times
        .iter()
        .enumerate()
        .map(|(i, t)| {
            (i > 0).then(|| (*t - frame.times[i - 1]).num_milliseconds() as f64 / 3_600_000.0)
        })
        .collect();
    let rate_per_hour = zip_with(&rate_change, &time_diff_hours, |change, hours| {
        (hours != 0.0).then(|| change / hours)
    });
    if let Some(first) = time_diff_hours.first_mut() {
        *first = first.or(Some(0.0));
    }

    frame.insert_numeric("instantaneous_rate_change", rate_change);
    frame.insert_numeric("instantaneous_rate_per_hour", rate_per_hour);
    frame.insert_numeric("time_diff_hours", time_diff_hours);

    if let Some(light) = frame.numeric("light_intensity").cloned() {
        frame.insert_numeric("light intensity", light);
    }

    let hours: Vec<u32> = frame.times.iter().map(|t| t.naive_local().hour()).collect();
    let weekdays: Vec<u32> = frame
        .times
        .iter()
        .map(|t| t.naive_local().weekday().num_days_from_monday())
        .collect();

    frame.insert_numeric("hour", hours.iter().map(|&h| Some(f64::from(h))).collect());
    frame.insert_numeric("day_of_week", weekdays.iter().map(|&d| Some(f64::from(d))).collect());
    let minutes = frame
        .times
        .iter()
        .map(|t| Some(f64::from(t.naive_local().minute())))
        .collect();
    frame.insert_numeric("minute", minutes);
    frame.insert_numeric(
        "is_weekend",
        weekdays.iter().map(|&d| Some(if d >= 5 { 1.0 } else { 0.0 })).collect(),
    );
    frame.insert_categorical("time_of_day", hours.iter().map(|&h| time_of_day(h)).collect());

    for lag in 1..=MAX_LAG {
        frame.insert_numeric(&format!("carbon_lag{}", lag), shift(&carbon, lag));
    }

    for window in ROLLING_WINDOWS {
        frame.insert_numeric(
            &format!("carbon_rolling_mean_{}", window),
            shift(&rolling(&carbon, window, mean), 1),
        );
        frame.insert_numeric(
            &format!("carbon_rolling_std_{}", window),
            shift(&rolling(&carbon, window, sample_std), 1),
        );
        frame.insert_numeric(
            &format!("carbon_rolling_min_{}", window),
            shift(&rolling(&carbon, window, |w| w.iter().copied().reduce(f64::min)), 1),
        );
        frame.insert_numeric(
            &format!("carbon_rolling_max_{}", window),
            shift(&rolling(&carbon, window, |w| w.iter().copied().reduce(f64::max)), 1),
        );
    }

    let lag1 = shift(&carbon, 1);
    let lag2 = shift(&carbon, 2);
    let lag3 = shift(&carbon, 3);
    frame.insert_numeric("carbon_lag1_diff", zip_with(&lag1, &lag2, |a, b| Some(a - b)));
    frame.insert_numeric("carbon_lag2_diff", zip_with(&lag2, &lag3, |a, b| Some(a - b)));

    if let (Some(temp), Some(humidity)) = (
        frame.numeric("Temp").cloned(),
        frame.numeric("Humidity").cloned(),
    ) {
        frame.insert_numeric(
            "temp_humidity_interaction",
            zip_with(&temp, &humidity, |t, h| Some(t * h)),
        );
        frame.insert_numeric(
            "comfort_index",
            zip_with(&temp, &humidity, |t, h| Some(0.5 * (t + h))),
        );
    }

    if let Some(light) = frame.numeric("light_intensity").cloned() {
        let categories = light.iter().map(|v| v.and_then(light_category)).collect();
        frame.insert_categorical("light_category", categories);
    }

    let cyclical = |values: &[u32], period: f64, f: fn(f64) -> f64| -> Series {
        values
            .iter()
            .map(|&v| Some(f(2.0 * PI * f64::from(v) / period)))
            .collect()
    };
    frame.insert_numeric("hour_sin", cyclical(&hours, 24.0, f64::sin));
    frame.insert_numeric("hour_cos", cyclical(&hours, 24.0, f64::cos));
    frame.insert_numeric("day_sin", cyclical(&weekdays, 7.0, f64::sin));
    frame.insert_numeric("day_cos", cyclical(&weekdays, 7.0, f64::cos));

    let present: Vec<f64> = carbon.iter().flatten().copied().collect();
    let zscore = match (mean(&present), sample_std(&present)) {
        (Some(mu), Some(sigma)) if sigma > 0.0 => {
            carbon.iter().map(|v| v.map(|c| (c - mu) / sigma)).collect()
        }
        _ => vec![None; carbon.len()],
    };
    frame.insert_numeric("carbon_zscore", zscore);
}

/// Hour-of-day bucket on `[0, 6, 12, 18, 24)`.
pub fn time_of_day(hour: u32) -> Option<&'static str> {
    match hour {
        0..=5 => Some("night"),
        6..=11 => Some("morning"),
        12..=17 => Some("afternoon"),
        18..=23 => Some("evening"),
        _ => None,
    }
}

/// Light level bucket on `[0, 100, 500, 1000, inf)`; negative readings have none.
pub fn light_category(intensity: f64) -> Option<&'static str> {
    match intensity {
        v if !(0.0..).contains(&v) => None,
        v if v < 100.0 => Some("dark"),
        v if v < 500.0 => Some("low"),
        v if v < 1000.0 => Some("medium"),
        _ => Some("bright"),
    }
}

fn shift(series: &[Option<f64>], n: usize) -> Series {
    (0..series.len())
        .map(|i| if i >= n { series[i - n] } else { None })
        .collect()
}

fn diff(series: &[Option<f64>], n: usize) -> Series {
    zip_with(series, &shift(series, n), |current, previous| Some(current - previous))
}

fn zip_with<F>(a: &[Option<f64>], b: &[Option<f64>], f: F) -> Series
where
    F: Fn(f64, f64) -> Option<f64>,
{
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| match (x, y) {
            (Some(x), Some(y)) => f(*x, *y),
            _ => None,
        })
        .collect()
}

/// Trailing window statistic; a window with any missing value yields `None`.
fn rolling<F>(series: &[Option<f64>], window: usize, f: F) -> Series
where
    F: Fn(&[f64]) -> Option<f64>,
{
    (0..series.len())
        .map(|i| {
            if i + 1 < window {
                return None;
            }
            let values: Option<Vec<f64>> = series[i + 1 - window..=i].iter().copied().collect();
            values.and_then(|w| f(&w))
        })
        .collect()
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

/// Standard deviation with one degree of freedom removed.
fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mu = mean(values)?;
    let var = values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}
