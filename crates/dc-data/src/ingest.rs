use chrono::{FixedOffset, Offset, Utc};
use dc_types::{compare_timestamps, internal_error, DcResult, Source, Table};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::SourceCache;
use crate::listing::{list_csv_files, list_date_folders};
use crate::loaders::CsvLoader;
use crate::remote::RemoteStore;
use crate::timestamp::normalize_with_offset;

/// Number of most recent date folders read when the window is enabled.
pub const RECENT_FOLDER_WINDOW: usize = 7;

/// Per-call ingestion switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    /// Serve from and store into the cache.
    pub use_cache: bool,
    /// Only read the last [`RECENT_FOLDER_WINDOW`] date folders.
    pub skip_recent_window: bool,
}

impl IngestOptions {
    /// Bypass the cache but keep the folder window.
    pub fn fresh() -> Self {
        Self {
            use_cache: false,
            skip_recent_window: true,
        }
    }
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            skip_recent_window: true,
        }
    }
}

/// Walks a source's date folders and merges every readable CSV into one
/// time-sorted table.
#[derive(Debug)]
pub struct Ingestor {
    store: Arc<dyn RemoteStore>,
    cache: Arc<SourceCache>,
    loader: CsvLoader,
    naive_offset: FixedOffset,
}

impl Ingestor {
    pub fn new(store: Arc<dyn RemoteStore>, cache: Arc<SourceCache>) -> Self {
        Self {
            store,
            cache,
            loader: CsvLoader::new(),
            naive_offset: Utc.fix(),
        }
    }

    pub fn with_loader(mut self, loader: CsvLoader) -> Self {
        self.loader = loader;
        self
    }

    /// Offset given to file timestamps that carry none.
    pub fn with_naive_offset(mut self, offset: FixedOffset) -> Self {
        self.naive_offset = offset;
        self
    }

    pub fn cache(&self) -> &Arc<SourceCache> {
        &self.cache
    }

    /// Merged table for `source`, served from the cache when allowed.
    ///
    /// A source with no readable files yields an empty table, which is never cached.
    pub async fn ingest(&self, source: &Source, options: IngestOptions) -> DcResult<Arc<Table>> {
        if options.use_cache {
            if let Some(table) = self.cache.get(source.id()) {
                return Ok(table);
            }
        }

        match self.read_source(source, options.skip_recent_window).await? {
            Some(table) => {
                let table = Arc::new(table);
                if options.use_cache {
                    self.cache.put(source.id(), Arc::clone(&table));
                }
                Ok(table)
            }
            None => Ok(Arc::new(Table::empty())),
        }
    }

    /// Re-read `source` and replace its cache entry.
    ///
    /// A read that finds no files leaves an existing entry in place.
    pub async fn refresh(&self, source: &Source) -> DcResult<Arc<Table>> {
        match self.read_source(source, true).await? {
            Some(table) => {
                let table = Arc::new(table);
                self.cache.put(source.id(), Arc::clone(&table));
                Ok(table)
            }
            None => {
                warn!(source = %source, "Refresh found no readable files, keeping cached data");
                Ok(self
                    .cache
                    .get(source.id())
                    .unwrap_or_else(|| Arc::new(Table::empty())))
            }
        }
    }

    /// Read the source from remote storage. `None` when no file could be read.
    pub async fn read_source(&self, source: &Source, skip_recent_window: bool) -> DcResult<Option<Table>> {
        let mut folders = list_date_folders(self.store.as_ref(), &source.root).await?;
        folders.sort();

        if skip_recent_window && folders.len() > RECENT_FOLDER_WINDOW {
            folders.drain(..folders.len() - RECENT_FOLDER_WINDOW);
        }

        info!(source = %source, folders = folders.len(), "Ingesting source");

        let mut downloaded = Vec::new();
        let mut failed_downloads = 0usize;

        for folder in &folders {
            for path in list_csv_files(self.store.as_ref(), folder).await? {
                match self.store.download(&path).await {
                    Ok(bytes) => downloaded.push((path, bytes)),
                    Err(e) => {
                        warn!(path = %path, error = %e, "Skipping file that failed to download");
                        failed_downloads += 1;
                    }
                }
            }
        }

        let (loader, naive_offset) = (self.loader, self.naive_offset);
        let (table, files_read) =
            tokio::task::spawn_blocking(move || merge_files(loader, naive_offset, downloaded))
                .await
                .map_err(|e| internal_error!("Ingestion task failed: {}", e))?;

        if files_read == 0 {
            info!(source = %source, failed_downloads, "No readable files found");
            return Ok(None);
        }

        info!(
            source = %source,
            files = files_read,
            failed_downloads,
            rows = table.len(),
            "Ingestion complete"
        );

        Ok(Some(table))
    }
}

/// Parse and normalize every downloaded file in parallel, then concatenate in
/// download order and sort by timestamp.
fn merge_files(
    loader: CsvLoader,
    naive_offset: FixedOffset,
    downloaded: Vec<(String, Vec<u8>)>,
) -> (Table, usize) {
    let tables: Vec<Table> = downloaded
        .par_iter()
        .filter_map(|(path, bytes)| {
            let parsed = loader
                .parse_csv(bytes)
                .and_then(|frame| normalize_with_offset(frame, naive_offset));
            match parsed {
                Ok(table) => Some(table),
                Err(e) => {
                    warn!(path = %path, error = %e, "Skipping unreadable file");
                    None
                }
            }
        })
        .collect();

    let files_read = tables.len();
    let mut table = Table::concat(tables);
    table
        .rows_mut()
        .par_sort_by(|a, b| compare_timestamps(&a.timestamp, &b.timestamp));

    (table, files_read)
}
