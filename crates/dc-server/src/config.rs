use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use dc_data::{parse_utc_offset, DEFAULT_REFRESH_INTERVAL};
use dc_types::{config_error, DcResult};

pub const DEFAULT_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_RATE_CHANGE_MODEL: &str = "./models/rate_change.json";
pub const DEFAULT_RATE_PER_HOUR_MODEL: &str = "./models/rate_per_hour.json";

/// Where sensor folders are read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Dropbox { token: String },
    /// A local mirror of the remote folder tree
    Local { root: PathBuf },
}

/// Paths of the two rate models
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPaths {
    pub rate_change: PathBuf,
    pub rate_per_hour: PathBuf,
}

/// Process configuration, read from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub addr: SocketAddr,
    pub store: StoreConfig,
    pub wise4051_root: String,
    pub wise4012_root: String,
    pub refresh_interval: Duration,
    /// Offset assumed for CSV times written without one
    pub naive_offset: FixedOffset,
    pub models: ModelPaths,
}

impl AppConfig {
    pub fn from_env() -> DcResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> DcResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| get(key).ok_or_else(|| config_error!("{} must be set", key));

        let addr_text = get("DECARB_ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_string());
        let addr = addr_text
            .parse::<SocketAddr>()
            .map_err(|e| config_error!("DECARB_ADDR '{}' is not a socket address: {}", addr_text, e))?;

        let store = match get("DECARB_LOCAL_ROOT") {
            Some(root) => StoreConfig::Local {
                root: PathBuf::from(root),
            },
            None => StoreConfig::Dropbox {
                token: require("DROPBOX_TOKEN")?,
            },
        };

        let refresh_interval = match get("DECARB_REFRESH_SECS") {
            Some(text) => text
                .parse::<u64>()
                .ok()
                .filter(|&secs| secs > 0)
                .map(Duration::from_secs)
                .ok_or_else(|| {
                    config_error!("DECARB_REFRESH_SECS must be a positive integer (got '{}')", text)
                })?,
            None => DEFAULT_REFRESH_INTERVAL,
        };

        let naive_offset = match get("DECARB_NAIVE_UTC_OFFSET") {
            Some(text) => parse_utc_offset(&text).ok_or_else(|| {
                config_error!("DECARB_NAIVE_UTC_OFFSET '{}' is not a UTC offset like +07:00", text)
            })?,
            None => Utc.fix(),
        };

        Ok(Self {
            addr,
            store,
            wise4051_root: require("WISE4051_ROOT")?,
            wise4012_root: require("WISE4012_ROOT")?,
            refresh_interval,
            naive_offset,
            models: ModelPaths {
                rate_change: get("DECARB_MODEL_RATE_CHANGE")
                    .unwrap_or_else(|| DEFAULT_RATE_CHANGE_MODEL.to_string())
                    .into(),
                rate_per_hour: get("DECARB_MODEL_RATE_PER_HOUR")
                    .unwrap_or_else(|| DEFAULT_RATE_PER_HOUR_MODEL.to_string())
                    .into(),
            },
        })
    }
}
