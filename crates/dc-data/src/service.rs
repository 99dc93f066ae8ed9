use dc_types::{internal_error, DcResult, Device, Interval, Measurement, Source, Table};
use serde::Serialize;
use std::sync::Arc;

use crate::aggregate::{aggregate, group_daily, group_hourly, DailyPoint, HourlyPoint};
use crate::cache::{CacheInfo, CacheStats};
use crate::ingest::{IngestOptions, Ingestor};

/// One flat JSON record of a table row
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Rows included in a debug sample
const DEBUG_SAMPLE_ROWS: usize = 5;

/// Remote roots of the two configured loggers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorSources {
    pub wise4051: Source,
    pub wise4012: Source,
}

impl SensorSources {
    pub fn new(wise4051_root: &str, wise4012_root: &str) -> Self {
        Self {
            wise4051: Source::new(Device::Wise4051.name(), wise4051_root),
            wise4012: Source::new(Device::Wise4012.name(), wise4012_root),
        }
    }

    pub fn source(&self, device: Device) -> &Source {
        match device {
            Device::Wise4051 => &self.wise4051,
            Device::Wise4012 => &self.wise4012,
        }
    }
}

/// Shape summary of a source's merged table, with the cache counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebugSummary {
    pub rows: usize,
    pub columns: Vec<String>,
    pub sample: Vec<Record>,
    pub cache: CacheReport,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheReport {
    #[serde(flatten)]
    pub info: CacheInfo,
    #[serde(flatten)]
    pub stats: CacheStats,
    pub hit_rate: f64,
}

/// Read operations over the cached sensor tables.
#[derive(Debug)]
pub struct SensorService {
    ingestor: Arc<Ingestor>,
    sources: SensorSources,
}

impl SensorService {
    pub fn new(ingestor: Arc<Ingestor>, sources: SensorSources) -> Self {
        Self { ingestor, sources }
    }

    pub fn ingestor(&self) -> &Arc<Ingestor> {
        &self.ingestor
    }

    pub fn sources(&self) -> &SensorSources {
        &self.sources
    }

    /// Source kept warm by the refresh loop.
    pub fn primary_source(&self) -> &Source {
        &self.sources.wise4051
    }

    /// Merged raw table for `device`, from the cache when populated.
    pub async fn raw_table(&self, device: Device) -> DcResult<Arc<Table>> {
        self.ingestor
            .ingest(self.sources.source(device), IngestOptions::default())
            .await
    }

    /// Re-read `device` from remote storage without touching the cache.
    pub async fn fresh_table(&self, device: Device) -> DcResult<Arc<Table>> {
        self.ingestor
            .ingest(self.sources.source(device), IngestOptions::fresh())
            .await
    }

    /// Resampled records for a measurement's device, keeping the last `limit` rows.
    pub async fn records(
        &self,
        measurement: Measurement,
        interval: Interval,
        limit: Option<usize>,
    ) -> DcResult<Vec<Record>> {
        let table = self.raw_table(measurement.device()).await?;
        blocking(move || {
            let aggregated = aggregate(&table, interval);
            let kept = match limit {
                Some(limit) => aggregated.tail(limit),
                None => aggregated,
            };
            kept.to_records()
        })
        .await
    }

    /// Every raw row of `device`.
    pub async fn all_records(&self, device: Device) -> DcResult<Vec<Record>> {
        let table = self.raw_table(device).await?;
        blocking(move || table.to_records()).await
    }

    pub async fn hourly(&self, measurement: Measurement) -> DcResult<Vec<HourlyPoint>> {
        let table = self.raw_table(measurement.device()).await?;
        blocking(move || group_hourly(&table, measurement.column())).await
    }

    pub async fn daily(&self, measurement: Measurement) -> DcResult<Vec<DailyPoint>> {
        let table = self.raw_table(measurement.device()).await?;
        blocking(move || group_daily(&table, measurement.column())).await
    }

    pub async fn count(&self, device: Device) -> DcResult<usize> {
        Ok(self.raw_table(device).await?.len())
    }

    /// Rows `[skip, skip + limit)` of the raw table in timestamp order.
    pub async fn page(&self, device: Device, skip: usize, limit: usize) -> DcResult<Vec<Record>> {
        let table = self.raw_table(device).await?;
        Ok(table.slice(skip, limit).to_records())
    }

    pub async fn debug(&self, device: Device) -> DcResult<DebugSummary> {
        let table = self.raw_table(device).await?;
        let cache = self.ingestor.cache();
        let stats = cache.stats();
        Ok(DebugSummary {
            rows: table.len(),
            columns: table.columns().to_vec(),
            sample: table.head(DEBUG_SAMPLE_ROWS).to_records(),
            cache: CacheReport {
                info: cache.info(),
                hit_rate: stats.hit_rate(),
                stats,
            },
        })
    }

    pub fn clear_cache(&self) {
        self.ingestor.cache().clear();
        tracing::info!("Sensor cache cleared");
    }
}

async fn blocking<T, F>(f: F) -> DcResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| internal_error!("Blocking task failed: {}", e))
}
