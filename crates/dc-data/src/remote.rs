use async_trait::async_trait;
use dc_types::RemoteError;
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

const DROPBOX_API_URL: &str = "https://api.dropboxapi.com/2";
const DROPBOX_CONTENT_URL: &str = "https://content.dropboxapi.com/2";

/// Result alias for remote storage operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Metadata shared by every listing entry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EntryMetadata {
    pub name: String,
    #[serde(default)]
    pub path_lower: Option<String>,
    #[serde(default)]
    pub path_display: Option<String>,
}

/// A listing entry, discriminated by its `.tag`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = ".tag", rename_all = "lowercase")]
pub enum Entry {
    Folder(EntryMetadata),
    File(EntryMetadata),
    Deleted(EntryMetadata),
}

impl Entry {
    pub fn folder(name: &str, path: &str) -> Self {
        Entry::Folder(EntryMetadata::at(name, path))
    }

    pub fn file(name: &str, path: &str) -> Self {
        Entry::File(EntryMetadata::at(name, path))
    }

    fn metadata(&self) -> &EntryMetadata {
        match self {
            Entry::Folder(m) | Entry::File(m) | Entry::Deleted(m) => m,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, Entry::Folder(_))
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Entry::File(_))
    }

    pub fn name(&self) -> &str {
        &self.metadata().name
    }

    /// Lower-cased path when the backend provides one, else the display path.
    pub fn path(&self) -> &str {
        let meta = self.metadata();
        meta.path_lower
            .as_deref()
            .or(meta.path_display.as_deref())
            .unwrap_or(&meta.name)
    }
}

impl EntryMetadata {
    fn at(name: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            path_lower: Some(path.to_lowercase()),
            path_display: Some(path.to_string()),
        }
    }
}

/// One page of a folder listing
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ListPage {
    pub entries: Vec<Entry>,
    #[serde(default)]
    pub cursor: String,
    #[serde(default)]
    pub has_more: bool,
}

/// Remote file storage holding date-partitioned sensor folders.
///
/// Implementations list one folder level at a time, paging through an opaque
/// cursor, and download file contents as raw bytes.
#[async_trait]
pub trait RemoteStore: Send + Sync + std::fmt::Debug {
    /// First page of the immediate children of `path`.
    async fn list_folder(&self, path: &str) -> RemoteResult<ListPage>;

    /// Next page of a listing started with [`RemoteStore::list_folder`].
    async fn list_folder_continue(&self, cursor: &str) -> RemoteResult<ListPage>;

    /// Raw contents of the file at `path`.
    async fn download(&self, path: &str) -> RemoteResult<Vec<u8>>;

    /// Get store name
    fn name(&self) -> &str;
}

/// Dropbox API v2 client
#[derive(Debug)]
pub struct DropboxStore {
    pub name: String,
    token: String,
    api_url: String,
    content_url: String,
    client: reqwest::Client,
}

impl DropboxStore {
    pub fn new(token: String) -> Self {
        Self {
            name: "Dropbox".to_string(),
            token,
            api_url: DROPBOX_API_URL.to_string(),
            content_url: DROPBOX_CONTENT_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn rpc(&self, endpoint: &str, body: serde_json::Value) -> RemoteResult<ListPage> {
        let url = format!("{}/{}", self.api_url, endpoint);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| RemoteError::Request {
                message: format!("{}: {}", endpoint, e),
            })?;

        let response = check_status(endpoint, response).await?;

        response
            .json::<ListPage>()
            .await
            .map_err(|e| RemoteError::MalformedResponse {
                message: format!("{}: {}", endpoint, e),
            })
    }
}

async fn check_status(endpoint: &str, response: reqwest::Response) -> RemoteResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Status {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        body,
    })
}

/// JSON for the `Dropbox-API-Arg` header; header values must be ASCII, so
/// everything outside printable ASCII is written as `\uXXXX` escapes.
fn api_arg_header(path: &str) -> String {
    let json = serde_json::json!({ "path": path }).to_string();
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() && !c.is_ascii_control() {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    out
}

#[async_trait]
impl RemoteStore for DropboxStore {
    async fn list_folder(&self, path: &str) -> RemoteResult<ListPage> {
        self.rpc(
            "files/list_folder",
            serde_json::json!({ "path": path, "recursive": false }),
        )
        .await
    }

    async fn list_folder_continue(&self, cursor: &str) -> RemoteResult<ListPage> {
        self.rpc(
            "files/list_folder/continue",
            serde_json::json!({ "cursor": cursor }),
        )
        .await
    }

    async fn download(&self, path: &str) -> RemoteResult<Vec<u8>> {
        let endpoint = "files/download";
        let url = format!("{}/{}", self.content_url, endpoint);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .header("Dropbox-API-Arg", api_arg_header(path))
            .send()
            .await
            .map_err(|e| RemoteError::Request {
                message: format!("{} {}: {}", endpoint, path, e),
            })?;

        let response = check_status(endpoint, response).await?;

        let bytes = response.bytes().await.map_err(|e| RemoteError::Request {
            message: format!("{} {}: {}", endpoint, path, e),
        })?;
        Ok(bytes.to_vec())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Serves a local directory tree as if it were the remote store.
///
/// Remote paths are resolved relative to `root`; every listing fits in a
/// single page.
#[derive(Debug)]
pub struct LocalStore {
    pub name: String,
    pub root: PathBuf,
}

impl LocalStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            name: "Local Directory".to_string(),
            root: root.as_ref().to_path_buf(),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let relative = path.trim_start_matches('/');
        if relative.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative)
        }
    }
}

fn io_error(path: &str, error: std::io::Error) -> RemoteError {
    if error.kind() == std::io::ErrorKind::NotFound {
        RemoteError::NotFound {
            path: path.to_string(),
        }
    } else {
        RemoteError::Request {
            message: format!("{}: {}", path, error),
        }
    }
}

#[async_trait]
impl RemoteStore for LocalStore {
    async fn list_folder(&self, path: &str) -> RemoteResult<ListPage> {
        let dir = self.resolve(path);
        let mut reader = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| io_error(path, e))?;

        let prefix = path.trim_end_matches('/');
        let mut entries = Vec::new();

        while let Some(item) = reader.next_entry().await.map_err(|e| io_error(path, e))? {
            let name = item.file_name().to_string_lossy().to_string();
            let file_type = item.file_type().await.map_err(|e| io_error(path, e))?;
            let metadata = EntryMetadata {
                name: name.clone(),
                // Case-sensitive filesystems need the display path for lookups.
                path_lower: None,
                path_display: Some(format!("{}/{}", prefix, name)),
            };

            if file_type.is_dir() {
                entries.push(Entry::Folder(metadata));
            } else if file_type.is_file() {
                entries.push(Entry::File(metadata));
            }
        }

        entries.sort_by(|a, b| a.name().cmp(b.name()));

        Ok(ListPage {
            entries,
            cursor: String::new(),
            has_more: false,
        })
    }

    async fn list_folder_continue(&self, cursor: &str) -> RemoteResult<ListPage> {
        Err(RemoteError::Request {
            message: format!("local store listings are never paged (cursor '{}')", cursor),
        })
    }

    async fn download(&self, path: &str) -> RemoteResult<Vec<u8>> {
        tokio::fs::read(self.resolve(path))
            .await
            .map_err(|e| io_error(path, e))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone)]
struct MemoryFile {
    display: String,
    contents: Vec<u8>,
}

/// In-memory store with paged listings and injectable failures
#[derive(Debug)]
pub struct MemoryStore {
    pub name: String,
    page_size: usize,
    /// lower-cased path → display path
    folders: RwLock<BTreeMap<String, String>>,
    files: RwLock<BTreeMap<String, MemoryFile>>,
    failing: RwLock<HashSet<String>>,
    downloads: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            name: "Memory Store".to_string(),
            page_size: 2,
            folders: RwLock::new(BTreeMap::new()),
            files: RwLock::new(BTreeMap::new()),
            failing: RwLock::new(HashSet::new()),
            downloads: Mutex::new(Vec::new()),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn normalize(path: &str) -> String {
        path.trim_end_matches('/').to_lowercase()
    }

    fn parent(path: &str) -> &str {
        path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
    }

    /// Register a folder and all of its ancestors.
    pub fn add_folder(&self, path: &str) {
        let mut folders = self.folders.write();
        let mut current = path.trim_end_matches('/').to_string();
        while !current.is_empty() {
            folders.insert(current.to_lowercase(), current.clone());
            current = Self::parent(&current).to_string();
        }
    }

    pub fn add_file(&self, path: &str, contents: impl Into<Vec<u8>>) {
        self.add_folder(Self::parent(path));
        self.files.write().insert(
            Self::normalize(path),
            MemoryFile {
                display: path.to_string(),
                contents: contents.into(),
            },
        );
    }

    /// Make listings and downloads of `path` fail until cleared.
    pub fn fail_path(&self, path: &str) {
        self.failing.write().insert(Self::normalize(path));
    }

    pub fn clear_failures(&self) {
        self.failing.write().clear();
    }

    /// Paths downloaded so far, in request order.
    pub fn downloaded(&self) -> Vec<String> {
        self.downloads.lock().clone()
    }

    fn check_failure(&self, path: &str) -> RemoteResult<()> {
        if self.failing.read().contains(&Self::normalize(path)) {
            return Err(RemoteError::Request {
                message: format!("injected failure for {}", path),
            });
        }
        Ok(())
    }

    fn children(&self, path: &str) -> RemoteResult<Vec<Entry>> {
        let key = Self::normalize(path);
        let folders = self.folders.read();
        let files = self.files.read();

        if !key.is_empty() && !folders.contains_key(&key) {
            return Err(RemoteError::NotFound {
                path: path.to_string(),
            });
        }

        let mut entries: Vec<Entry> = folders
            .iter()
            .filter(|(lower, _)| Self::parent(lower) == key)
            .map(|(_, display)| {
                let name = display.rsplit('/').next().unwrap_or(display);
                Entry::folder(name, display)
            })
            .collect();

        entries.extend(
            files
                .iter()
                .filter(|(lower, _)| Self::parent(lower) == key)
                .map(|(_, file)| {
                    let name = file.display.rsplit('/').next().unwrap_or(&file.display);
                    Entry::file(name, &file.display)
                }),
        );

        Ok(entries)
    }

    fn page(&self, path: &str, offset: usize) -> RemoteResult<ListPage> {
        let entries = self.children(path)?;
        let end = (offset + self.page_size).min(entries.len());
        let has_more = end < entries.len();

        Ok(ListPage {
            entries: entries[offset.min(end)..end].to_vec(),
            cursor: if has_more {
                format!("{}|{}", end, path)
            } else {
                String::new()
            },
            has_more,
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn list_folder(&self, path: &str) -> RemoteResult<ListPage> {
        self.check_failure(path)?;
        self.page(path, 0)
    }

    async fn list_folder_continue(&self, cursor: &str) -> RemoteResult<ListPage> {
        let (offset, path) = cursor
            .split_once('|')
            .and_then(|(offset, path)| offset.parse::<usize>().ok().map(|o| (o, path)))
            .ok_or_else(|| RemoteError::MalformedResponse {
                message: format!("invalid cursor '{}'", cursor),
            })?;

        self.check_failure(path)?;
        self.page(path, offset)
    }

    async fn download(&self, path: &str) -> RemoteResult<Vec<u8>> {
        self.downloads.lock().push(path.to_string());
        self.check_failure(path)?;

        self.files
            .read()
            .get(&Self::normalize(path))
            .map(|file| file.contents.clone())
            .ok_or_else(|| RemoteError::NotFound {
                path: path.to_string(),
            })
    }

    fn name(&self) -> &str {
        &self.name
    }
}
