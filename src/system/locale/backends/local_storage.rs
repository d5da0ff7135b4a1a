use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::shared::utils::date_util::{DateTime, DateUtil, Duration};
use crate::system::locale::backend::{Backend, LayerError, WriteAck};
use crate::system::locale::language::LanguageTag;
use crate::system::locale::resource::{Bundle, ResourceKey};

pub const DEFAULT_PREFIX: &str = "i18next_res_";

/// One persisted bundle as the store sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub resources: Map<String, Value>,
    pub fetched_at: DateTime,
    pub expires_at: DateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Persistent key-value store shared by every loader of a runtime.
///
/// `set` is last-writer-wins by `fetched_at`: an entry older than the one
/// already stored is dropped and reported as `false`.
#[async_trait]
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    async fn get(&self, key: &str) -> Result<Option<StoredEntry>, LayerError>;

    async fn set(&self, key: &str, entry: StoredEntry) -> Result<bool, LayerError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, StoredEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<StoredEntry>, LayerError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, entry: StoredEntry) -> Result<bool, LayerError> {
        let mut entries = self.entries.write().await;
        if let Some(existing) = entries.get(key) {
            if existing.fetched_at > entry.fetched_at {
                return Ok(false);
            }
        }
        entries.insert(key.to_string(), entry);
        Ok(true)
    }
}

/// Stores each entry as `<dir>/<key>.json`.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", file_name))
    }

    async fn read_entry(&self, path: &Path) -> Result<Option<StoredEntry>, LayerError> {
        let content = match tokio::fs::read(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(LayerError::Storage(format!(
                    "Failed to read {:?}: {}",
                    path, e
                )));
            }
        };

        serde_json::from_slice(&content)
            .map(Some)
            .map_err(|e| LayerError::Decode(format!("Failed to parse {:?}: {}", path, e)))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<StoredEntry>, LayerError> {
        self.read_entry(&self.entry_path(key)).await
    }

    async fn set(&self, key: &str, entry: StoredEntry) -> Result<bool, LayerError> {
        let path = self.entry_path(key);
        let _guard = self.write_lock.lock().await;

        // A corrupt entry is simply replaced.
        if let Ok(Some(existing)) = self.read_entry(&path).await {
            if existing.fetched_at > entry.fetched_at {
                return Ok(false);
            }
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| LayerError::Storage(format!("Failed to create {:?}: {}", self.dir, e)))?;

        let content = serde_json::to_vec_pretty(&entry)
            .map_err(|e| LayerError::Storage(format!("Failed to encode {}: {}", key, e)))?;

        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, content)
            .await
            .map_err(|e| LayerError::Storage(format!("Failed to write {:?}: {}", tmp_path, e)))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| LayerError::Storage(format!("Failed to replace {:?}: {}", path, e)))?;

        Ok(true)
    }
}

/// Cache layer over a [`KeyValueStore`], keyed `{prefix}{lng}-{ns}`.
///
/// Entries expire `expiration` after they are written. When a version is
/// configured for a language, entries written under another version read as
/// absent.
#[derive(Debug)]
pub struct LocalStorageBackend {
    name: String,
    store: Arc<dyn KeyValueStore>,
    prefix: String,
    expiration: Duration,
    versions: HashMap<LanguageTag, String>,
}

impl LocalStorageBackend {
    pub fn new(store: Arc<dyn KeyValueStore>, expiration: Duration) -> Self {
        Self {
            name: "local-storage".to_string(),
            store,
            prefix: DEFAULT_PREFIX.to_string(),
            expiration,
            versions: HashMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_versions(mut self, versions: HashMap<LanguageTag, String>) -> Self {
        self.versions = versions;
        self
    }

    pub fn store_key(&self, key: &ResourceKey) -> String {
        format!("{}{}-{}", self.prefix, key.language, key.namespace)
    }
}

#[async_trait]
impl Backend for LocalStorageBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read(&self, key: &ResourceKey) -> Result<Option<Bundle>, LayerError> {
        let Some(entry) = self.store.get(&self.store_key(key)).await? else {
            return Ok(None);
        };

        if DateUtil::is_elapsed(&entry.expires_at) {
            debug!("{}: {} expired at {}", self.name, key, entry.expires_at);
            return Ok(None);
        }

        if let Some(expected) = self.versions.get(&key.language) {
            if entry.version.as_ref() != Some(expected) {
                debug!("{}: {} has version {:?}, expected {}", self.name, key, entry.version, expected);
                return Ok(None);
            }
        }

        Ok(Some(Bundle {
            key: key.clone(),
            resources: entry.resources,
            fetched_at: entry.fetched_at,
            expires_at: Some(entry.expires_at),
        }))
    }

    async fn write(&self, key: &ResourceKey, bundle: &Bundle) -> Result<WriteAck, LayerError> {
        let entry = StoredEntry {
            resources: bundle.resources.clone(),
            fetched_at: bundle.fetched_at,
            expires_at: DateUtil::add_duration(&DateUtil::now(), self.expiration),
            version: self.versions.get(&key.language).cloned(),
        };

        if self.store.set(&self.store_key(key), entry).await? {
            Ok(WriteAck::Stored)
        } else {
            Ok(WriteAck::Ignored)
        }
    }
}
