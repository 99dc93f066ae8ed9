use thiserror::Error;

/// Main error type for the Decarbonator system
#[derive(Error, Debug)]
pub enum DcError {
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Remote storage error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Forecast error: {0}")]
    Forecast(#[from] ForecastError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Errors raised while turning remote bytes into a timestamped table
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Data parsing error: {message}")]
    ParseError { message: String },

    #[error("{column} column exists but cannot parse timestamps")]
    TimestampUnparseable { column: String },

    #[error("Cannot build timestamp column from CSV (no usable time columns)")]
    NoTimeColumns,

    #[error("Column not found: {column}")]
    ColumnNotFound { column: String },
}

/// Errors surfaced by a remote file-storage backend
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Remote request failed: {message}")]
    Request { message: String },

    #[error("Remote returned HTTP {status} for {endpoint}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Remote path not found: {path}")]
    NotFound { path: String },

    #[error("Malformed remote response: {message}")]
    MalformedResponse { message: String },
}

/// Errors from the carbon forecasting path
#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("Failed to load any sensor data for prediction")]
    NoData,

    #[error("Not enough historical data (need >10 clean rows) to calculate lag/rolling features")]
    InsufficientHistory,

    #[error("Model files not found. Ensure models are trained and present: {path}")]
    ModelNotFound { path: String },

    #[error("Invalid model definition in {path}: {message}")]
    InvalidModel { path: String, message: String },

    #[error("Required column missing: {column}")]
    MissingColumn { column: String },
}

/// Result type alias for Decarbonator operations
pub type DcResult<T> = Result<T, DcError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::DcError::Validation(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::DcError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::DcError::Config(format!($($arg)*))
    };
}
