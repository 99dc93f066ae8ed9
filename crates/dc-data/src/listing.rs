//! Paged folder and file discovery on top of a [`RemoteStore`].
//!
//! Neither lister retries: a remote failure surfaces to the caller as-is.

use dc_types::DcResult;

use crate::remote::{Entry, RemoteStore};

/// Every entry directly under `path`, following the continuation cursor.
pub async fn list_entries(store: &dyn RemoteStore, path: &str) -> DcResult<Vec<Entry>> {
    let mut page = store.list_folder(path).await?;
    let mut entries = Vec::new();

    loop {
        entries.append(&mut page.entries);
        if !page.has_more {
            break;
        }
        page = store.list_folder_continue(&page.cursor).await?;
    }

    Ok(entries)
}

/// Paths of the date-named subfolders under `root`.
pub async fn list_date_folders(store: &dyn RemoteStore, root: &str) -> DcResult<Vec<String>> {
    let folders = list_entries(store, root)
        .await?
        .into_iter()
        .filter(Entry::is_folder)
        .map(|entry| entry.path().to_string())
        .collect();

    Ok(folders)
}

/// Paths of the `.csv` files (any case) directly inside `folder`.
pub async fn list_csv_files(store: &dyn RemoteStore, folder: &str) -> DcResult<Vec<String>> {
    let files = list_entries(store, folder)
        .await?
        .into_iter()
        .filter(|entry| entry.is_file() && entry.name().to_lowercase().ends_with(".csv"))
        .map(|entry| entry.path().to_string())
        .collect();

    Ok(files)
}
