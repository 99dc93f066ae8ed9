use std::path::Path;

use dc_types::{format_timestamp, DcResult, ForecastError, Table, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::features::{
    engineer_features, model_input_columns, prepare, FeatureFrame, SCALED_NUMERICAL_FEATURES,
};
use crate::model::{FeatureRow, LinearModel, RateModel};
use crate::scaler::StandardScaler;

/// Trailing rows considered when picking the prediction input.
pub const HISTORY_ROWS: usize = 11;

/// Dual-target carbon forecast for the latest reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub timestamp_current: String,
    pub carbon_current: f64,
    pub carbon_predicted_rate_change_5min: f64,
    pub carbon_predicted_rate_per_hour: f64,
    pub carbon_predicted_next_level: f64,
    pub message: String,
}

/// Model-ready view of the most recent history
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionInput {
    pub row: FeatureRow,
    pub timestamp_current: Timestamp,
    pub carbon_current: f64,
}

/// Engineer features over `table` and select the newest complete row.
pub fn build_input(table: &Table) -> DcResult<PredictionInput> {
    if table.is_empty() {
        return Err(ForecastError::NoData.into());
    }

    let mut frame = prepare(table)?;
    if frame.is_empty() {
        return Err(ForecastError::NoData.into());
    }
    engineer_features(&mut frame);

    if let Some(missing) = model_input_columns().find(|c| !frame.has_column(c)) {
        return Err(ForecastError::MissingColumn {
            column: missing.to_string(),
        }
        .into());
    }

    let start = frame.len().saturating_sub(HISTORY_ROWS);
    let selected = (start..frame.len())
        .rev()
        .find(|&i| model_input_columns().all(|c| frame.is_present(c, i)))
        .ok_or(ForecastError::InsufficientHistory)?;

    let last = frame.len() - 1;
    let carbon_current = frame
        .numeric("carbon")
        .and_then(|series| series[last])
        .ok_or(ForecastError::InsufficientHistory)?;

    let scaler = StandardScaler::fit(&frame, SCALED_NUMERICAL_FEATURES);

    Ok(PredictionInput {
        row: feature_row(&frame, &scaler, selected),
        timestamp_current: frame.times()[last],
        carbon_current,
    })
}

fn feature_row(frame: &FeatureFrame, scaler: &StandardScaler, index: usize) -> FeatureRow {
    let mut row = FeatureRow::default();
    for column in model_input_columns() {
        if let Some(value) = frame.numeric(column).and_then(|series| series[index]) {
            row.numeric
                .insert(column.to_string(), scaler.transform(column, value));
        } else if let Some(label) = frame.categorical(column).and_then(|labels| labels[index]) {
            row.categorical.insert(column.to_string(), label.to_string());
        }
    }
    row
}

/// Pair of rate models: change over the next 5 minutes, and change per hour.
#[derive(Debug)]
pub struct CarbonPredictor {
    rate_change: Box<dyn RateModel>,
    rate_per_hour: Box<dyn RateModel>,
}

impl CarbonPredictor {
    pub fn new(rate_change: Box<dyn RateModel>, rate_per_hour: Box<dyn RateModel>) -> Self {
        Self {
            rate_change,
            rate_per_hour,
        }
    }

    /// Load both models from JSON files.
    pub fn load<P: AsRef<Path>>(rate_change_path: P, rate_per_hour_path: P) -> DcResult<Self> {
        Ok(Self::new(
            Box::new(LinearModel::load(rate_change_path)?),
            Box::new(LinearModel::load(rate_per_hour_path)?),
        ))
    }

    pub fn predict(&self, table: &Table) -> DcResult<Prediction> {
        let input = build_input(table)?;

        let rate_change = self.rate_change.predict(&input.row)?;
        let rate_per_hour = self.rate_per_hour.predict(&input.row)?;

        info!(
            carbon = input.carbon_current,
            rate_change,
            rate_per_hour,
            "Carbon prediction complete"
        );

        Ok(Prediction {
            timestamp_current: format_timestamp(&input.timestamp_current),
            carbon_current: input.carbon_current,
            carbon_predicted_rate_change_5min: rate_change,
            carbon_predicted_rate_per_hour: rate_per_hour,
            carbon_predicted_next_level: input.carbon_current + rate_change,
            message: "Prediction successful.".to_string(),
        })
    }
}
