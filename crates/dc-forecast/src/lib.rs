//! Carbon trend forecasting for Decarbonator.
//!
//! Provides:
//! - Feature engineering over the merged WISE-4051 table (lags, rolling windows, calendar features)
//! - Standard scaling fitted on the available history
//! - Pluggable rate models with a JSON-backed linear implementation

pub mod features;
pub mod model;
pub mod predictor;
pub mod scaler;

pub use features::{engineer_features, prepare, FeatureFrame};
pub use model::{FeatureRow, LinearModel, RateModel};
pub use predictor::{build_input, CarbonPredictor, Prediction, PredictionInput, HISTORY_ROWS};
pub use scaler::StandardScaler;
