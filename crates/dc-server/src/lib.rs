//! HTTP surface of Decarbonator.
//!
//! Provides:
//! - Environment configuration
//! - axum routes over cached sensor data and carbon forecasts
//! - Process startup and graceful shutdown

pub mod app;
pub mod config;
pub mod error;
pub mod routes;
pub mod signal;
pub mod telemetry;

pub use app::{build_store, run};
pub use config::{AppConfig, ModelPaths, StoreConfig};
pub use error::{ApiError, ApiResult};
pub use routes::{router, AppState};
pub use telemetry::init_tracing;
