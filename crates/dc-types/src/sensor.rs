use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{DcError, DcResult};

/// CO2 reading column on the WISE-4051 logger
pub const CO2_COLUMN: &str = "COM_1 Wd_0";
/// Temperature reading column on the WISE-4012 logger
pub const TEMP_COLUMN: &str = "COM_1 Wd_1";
/// Humidity reading column on the WISE-4012 logger
pub const HUMIDITY_COLUMN: &str = "COM_1 Wd_2";

/// A logical sensor root in remote storage
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub root: String,
}

impl Source {
    pub fn new(name: &str, root: &str) -> Self {
        Self {
            name: name.to_string(),
            root: root.to_string(),
        }
    }

    /// Cache identity of the source: its remote root path.
    pub fn id(&self) -> &str {
        &self.root
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.root)
    }
}

/// Physical data loggers feeding the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// CO2 logger
    Wise4051,
    /// Temperature / humidity logger
    Wise4012,
}

impl Device {
    pub fn name(&self) -> &'static str {
        match self {
            Device::Wise4051 => "wise4051",
            Device::Wise4012 => "wise4012",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Measurements exposed over HTTP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Measurement {
    Co2,
    Temperature,
    Humidity,
}

impl Measurement {
    pub const ALL: [Measurement; 3] = [
        Measurement::Co2,
        Measurement::Temperature,
        Measurement::Humidity,
    ];

    pub fn device(&self) -> Device {
        match self {
            Measurement::Co2 => Device::Wise4051,
            Measurement::Temperature | Measurement::Humidity => Device::Wise4012,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            Measurement::Co2 => CO2_COLUMN,
            Measurement::Temperature => TEMP_COLUMN,
            Measurement::Humidity => HUMIDITY_COLUMN,
        }
    }

    /// URL segment used by the route layer.
    pub fn slug(&self) -> &'static str {
        match self {
            Measurement::Co2 => "co2",
            Measurement::Temperature => "temp",
            Measurement::Humidity => "humid",
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.slug())
    }
}

impl FromStr for Measurement {
    type Err = DcError;

    fn from_str(s: &str) -> DcResult<Self> {
        Measurement::ALL
            .into_iter()
            .find(|m| m.slug() == s)
            .ok_or_else(|| crate::validation_error!("unknown measurement '{}'", s))
    }
}

/// Aggregation granularity for sensor readings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "raw")]
    Raw,
    #[serde(rename = "1min")]
    OneMinute,
    #[default]
    #[serde(rename = "5min")]
    FiveMinutes,
    #[serde(rename = "15min")]
    FifteenMinutes,
    #[serde(rename = "30min")]
    ThirtyMinutes,
    #[serde(rename = "1hour")]
    OneHour,
}

impl Interval {
    pub const ALL: [Interval; 6] = [
        Interval::Raw,
        Interval::OneMinute,
        Interval::FiveMinutes,
        Interval::FifteenMinutes,
        Interval::ThirtyMinutes,
        Interval::OneHour,
    ];

    /// Bucket width; `None` for raw.
    pub fn to_seconds(&self) -> Option<i64> {
        match self {
            Interval::Raw => None,
            Interval::OneMinute => Some(60),
            Interval::FiveMinutes => Some(300),
            Interval::FifteenMinutes => Some(900),
            Interval::ThirtyMinutes => Some(1800),
            Interval::OneHour => Some(3600),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Raw => "raw",
            Interval::OneMinute => "1min",
            Interval::FiveMinutes => "5min",
            Interval::FifteenMinutes => "15min",
            Interval::ThirtyMinutes => "30min",
            Interval::OneHour => "1hour",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Interval {
    type Err = DcError;

    fn from_str(s: &str) -> DcResult<Self> {
        Interval::ALL
            .into_iter()
            .find(|i| i.as_str() == s)
            .ok_or_else(|| {
                crate::validation_error!(
                    "interval must be one of raw, 1min, 5min, 15min, 30min, 1hour (got '{}')",
                    s
                )
            })
    }
}
