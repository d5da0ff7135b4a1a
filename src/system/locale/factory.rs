use reqwest::Client;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;
use tracing::debug;

use super::backend::SharedBackend;
use super::backends::{
    FileStore, FilesystemBackend, HttpBackend, HttpBackendOptions, KeyValueStore,
    LocalStorageBackend, MemoryBackend, MemoryStore,
};
use super::language::LanguageTag;
use super::loader::LayeredLoader;
use crate::shared::utils::date_util::{DateUtil, Duration};
use crate::system::config::{ConfigError, I18nConfig, LayerConfig, StoreConfig};

/// Builds backends and loaders from configuration.
///
/// Stores are shared by name (memory) or path (file), so every loader built
/// by the same factory sees the same persistent cache.
#[derive(Debug)]
pub struct LayerFactory {
    client: Client,
    stores: Mutex<HashMap<String, Arc<dyn KeyValueStore>>>,
}

impl LayerFactory {
    pub fn new() -> Result<Self, ConfigError> {
        let client = Client::builder()
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            stores: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self, config: &StoreConfig) -> Arc<dyn KeyValueStore> {
        let id = match config {
            StoreConfig::Memory { name } => format!("memory:{}", name),
            StoreConfig::File { path } => format!("file:{}", path),
        };

        let mut stores = self.stores.lock().unwrap_or_else(|e| e.into_inner());
        stores
            .entry(id)
            .or_insert_with(|| match config {
                StoreConfig::Memory { .. } => Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>,
                StoreConfig::File { path } => Arc::new(FileStore::new(PathBuf::from(path))),
            })
            .clone()
    }

    pub fn backend(&self, config: &LayerConfig) -> Result<SharedBackend, ConfigError> {
        let backend: SharedBackend = match config {
            LayerConfig::Memory { expiration_secs } => {
                let backend = MemoryBackend::new("memory");
                match expiration_secs {
                    Some(secs) => Arc::new(backend.with_ttl(config_seconds(*secs))),
                    None => Arc::new(backend),
                }
            }
            LayerConfig::LocalStorage {
                store,
                prefix,
                expiration_secs,
                versions,
            } => {
                let versions = versions
                    .iter()
                    .map(|(language, version)| {
                        LanguageTag::parse(language)
                            .map(|tag| (tag, version.clone()))
                            .map_err(|_| ConfigError::InvalidLanguage(language.clone()))
                    })
                    .collect::<Result<HashMap<_, _>, _>>()?;

                Arc::new(
                    LocalStorageBackend::new(self.store(store), config_seconds(*expiration_secs))
                        .with_prefix(prefix.clone())
                        .with_versions(versions),
                )
            }
            LayerConfig::Http {
                base_url,
                load_path,
                add_path,
                timeout_ms,
                cache,
                request_mode,
                headers,
            } => {
                let options = HttpBackendOptions {
                    base_url: base_url.clone(),
                    load_path: load_path.clone(),
                    add_path: add_path.clone(),
                    timeout: StdDuration::from_millis(*timeout_ms),
                    cache: cache.clone(),
                    request_mode: request_mode.clone(),
                    headers: headers.clone(),
                };
                Arc::new(HttpBackend::new(self.client.clone(), options))
            }
            LayerConfig::Filesystem { base_path } => Arc::new(FilesystemBackend::new(base_path)),
        };

        debug!("Built layer {}", backend.name());
        Ok(backend)
    }

    pub fn build_loader(&self, config: &I18nConfig) -> Result<LayeredLoader, ConfigError> {
        config.validate()?;

        let layers = config
            .layers
            .iter()
            .map(|layer| self.backend(layer))
            .collect::<Result<Vec<_>, _>>()?;

        let loader = LayeredLoader::builder(config.language_registry()?)
            .layers(layers)
            .default_backend(Arc::new(FilesystemBackend::new(&config.resources_path)))
            .debug(config.debug)
            .save_missing(config.save_missing)
            .build();

        Ok(loader)
    }
}

fn config_seconds(secs: u64) -> Duration {
    DateUtil::from_std(StdDuration::from_secs(secs))
}
