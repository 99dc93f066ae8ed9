use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::Path;

use dc_types::{DcError, DcResult, ForecastError};
use serde::{Deserialize, Serialize};

/// One prediction input: scaled numeric features plus categorical labels.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeatureRow {
    pub numeric: BTreeMap<String, f64>,
    pub categorical: BTreeMap<String, String>,
}

/// A trained regressor over [`FeatureRow`]s
pub trait RateModel: Send + Sync + Debug {
    fn predict(&self, row: &FeatureRow) -> DcResult<f64>;

    fn name(&self) -> &str;
}

/// Linear model exported as JSON:
/// `{"intercept": f, "weights": {feature: w}, "categorical": {"feature=value": w}}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    #[serde(default)]
    pub name: String,
    pub intercept: f64,
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
    #[serde(default)]
    pub categorical: BTreeMap<String, f64>,
}

impl LinearModel {
    pub fn load<P: AsRef<Path>>(path: P) -> DcResult<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();

        let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ForecastError::ModelNotFound {
                path: display.clone(),
            }
            .into(),
            _ => DcError::Io(e),
        })?;

        let mut model: LinearModel =
            serde_json::from_str(&text).map_err(|e| ForecastError::InvalidModel {
                path: display.clone(),
                message: e.to_string(),
            })?;

        if model.name.is_empty() {
            model.name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or(display);
        }

        tracing::debug!(model = %model.name, features = model.weights.len(), "Loaded linear model");
        Ok(model)
    }
}

impl RateModel for LinearModel {
    fn predict(&self, row: &FeatureRow) -> DcResult<f64> {
        let mut total = self.intercept;

        for (feature, weight) in &self.weights {
            let value = row.numeric.get(feature).ok_or_else(|| ForecastError::MissingColumn {
                column: feature.clone(),
            })?;
            total += weight * value;
        }

        for (feature, label) in &row.categorical {
            if let Some(weight) = self.categorical.get(&format!("{}={}", feature, label)) {
                total += weight;
            }
        }

        Ok(total)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn row() -> FeatureRow {
        let mut row = FeatureRow::default();
        row.numeric.insert("hour".to_string(), 12.0);
        row.numeric.insert("carbon_lag1".to_string(), -0.5);
        row.categorical.insert("time_of_day".to_string(), "afternoon".to_string());
        row
    }

    #[test]
    fn test_linear_prediction() {
        let model = LinearModel {
            name: "rate_change".to_string(),
            intercept: 1.0,
            weights: [("hour".to_string(), 0.5), ("carbon_lag1".to_string(), 2.0)]
                .into_iter()
                .collect(),
            categorical: [("time_of_day=afternoon".to_string(), 3.0)].into_iter().collect(),
        };

        assert_eq!(model.predict(&row()).unwrap(), 1.0 + 6.0 - 1.0 + 3.0);
    }

    #[test]
    fn test_missing_feature_is_an_error() {
        let model = LinearModel {
            intercept: 0.0,
            weights: [("lux".to_string(), 1.0)].into_iter().collect(),
            ..Default::default()
        };
        assert!(matches!(
            model.predict(&row()),
            Err(DcError::Forecast(ForecastError::MissingColumn { .. }))
        ));
    }

    #[test]
    fn test_load_from_json() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"intercept": 0.25, "weights": {{"hour": 1.0}}}}"#).unwrap();

        let model = LinearModel::load(file.path()).unwrap();
        assert_eq!(model.intercept, 0.25);
        assert!(!model.name().is_empty());
        assert_eq!(model.predict(&row()).unwrap(), 12.25);
    }

    #[test]
    fn test_load_errors() {
        match LinearModel::load("/nonexistent/models/rate_change.json") {
            Err(DcError::Forecast(ForecastError::ModelNotFound { path })) => {
                assert!(path.ends_with("rate_change.json"))
            }
            other => panic!("Expected ModelNotFound, got: {:?}", other),
        }

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            LinearModel::load(file.path()),
            Err(DcError::Forecast(ForecastError::InvalidModel { .. }))
        ));
    }
}
