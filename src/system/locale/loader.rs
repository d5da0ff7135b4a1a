use futures::future::{BoxFuture, FutureExt, Shared, join_all};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::backend::{LayerError, SharedBackend, WriteAck};
use super::backends::filesystem::{DEFAULT_RESOURCES_PATH, FilesystemBackend};
use super::language::{LanguageRegistry, LanguageTag, LocaleError, Namespace};
use super::resource::{Bundle, ResourceKey};
use super::session::Session;
use crate::shared::utils::date_util::{DateTime, DateUtil};

/// A bundle together with the layer that produced it.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub bundle: Bundle,
    pub layer: String,
    pub layer_index: usize,
}

/// No layer held the bundle. `cause` is set when the final layer failed
/// rather than reporting absence.
#[derive(Debug, Clone)]
pub struct Miss {
    pub key: ResourceKey,
    pub cause: Option<LayerError>,
}

#[derive(Debug, Clone)]
pub enum Resolution {
    Found(Resolved),
    Missing(Miss),
}

impl Resolution {
    pub fn is_found(&self) -> bool {
        matches!(self, Resolution::Found(_))
    }

    pub fn key(&self) -> &ResourceKey {
        match self {
            Resolution::Found(resolved) => &resolved.bundle.key,
            Resolution::Missing(miss) => &miss.key,
        }
    }

    pub fn bundle(&self) -> Option<&Bundle> {
        match self {
            Resolution::Found(resolved) => Some(&resolved.bundle),
            Resolution::Missing(_) => None,
        }
    }

    pub fn cause(&self) -> Option<&LayerError> {
        match self {
            Resolution::Found(_) => None,
            Resolution::Missing(miss) => miss.cause.as_ref(),
        }
    }

    pub fn into_bundle(self) -> Option<Bundle> {
        match self {
            Resolution::Found(resolved) => Some(resolved.bundle),
            Resolution::Missing(_) => None,
        }
    }

    /// For contexts where a missing bundle is a hard failure (server rendering).
    pub fn into_result(self) -> Result<Bundle, LocaleError> {
        match self {
            Resolution::Found(resolved) => Ok(resolved.bundle),
            Resolution::Missing(miss) => Err(LocaleError::BundleMissing {
                key: miss.key,
                cause: miss.cause,
            }),
        }
    }
}

type Walk = Shared<BoxFuture<'static, Resolution>>;

struct InFlight {
    generation: u64,
    walk: Walk,
}

struct LoaderInner {
    layers: Vec<SharedBackend>,
    registry: LanguageRegistry,
    debug: bool,
    save_missing: bool,
    inflight: Mutex<HashMap<ResourceKey, InFlight>>,
    invalidated: Mutex<HashMap<ResourceKey, DateTime>>,
    background: Mutex<JoinSet<()>>,
    generation: AtomicU64,
    shut_down: AtomicBool,
}

/// Resolves bundles through an ordered chain of backends.
///
/// Cloning is cheap; clones share caches, in-flight requests and background
/// tasks.
#[derive(Clone)]
pub struct LayeredLoader {
    inner: Arc<LoaderInner>,
}

impl std::fmt::Debug for LayeredLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayeredLoader")
            .field("layers", &self.layer_names())
            .field("debug", &self.inner.debug)
            .finish()
    }
}

pub struct LoaderBuilder {
    layers: Vec<SharedBackend>,
    default_backend: Option<SharedBackend>,
    registry: LanguageRegistry,
    debug: bool,
    save_missing: bool,
}

impl LoaderBuilder {
    pub fn new(registry: LanguageRegistry) -> Self {
        Self {
            layers: Vec::new(),
            default_backend: None,
            registry,
            debug: false,
            save_missing: false,
        }
    }

    /// Appends a layer; earlier layers have higher priority.
    pub fn layer(mut self, backend: SharedBackend) -> Self {
        self.layers.push(backend);
        self
    }

    pub fn layers(mut self, backends: Vec<SharedBackend>) -> Self {
        self.layers.extend(backends);
        self
    }

    /// Backend used when no layer is configured.
    pub fn default_backend(mut self, backend: SharedBackend) -> Self {
        self.default_backend = Some(backend);
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn save_missing(mut self, save_missing: bool) -> Self {
        self.save_missing = save_missing;
        self
    }

    pub fn build(self) -> LayeredLoader {
        let layers = if self.layers.is_empty() {
            let fallback = self
                .default_backend
                .unwrap_or_else(|| Arc::new(FilesystemBackend::new(DEFAULT_RESOURCES_PATH)) as SharedBackend);
            vec![fallback]
        } else {
            self.layers
        };

        LayeredLoader {
            inner: Arc::new(LoaderInner {
                layers,
                registry: self.registry,
                debug: self.debug,
                save_missing: self.save_missing,
                inflight: Mutex::new(HashMap::new()),
                invalidated: Mutex::new(HashMap::new()),
                background: Mutex::new(JoinSet::new()),
                generation: AtomicU64::new(0),
                shut_down: AtomicBool::new(false),
            }),
        }
    }
}

impl LayeredLoader {
    pub fn builder(registry: LanguageRegistry) -> LoaderBuilder {
        LoaderBuilder::new(registry)
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.inner.registry
    }

    pub fn layer_names(&self) -> Vec<String> {
        self.inner.layers.iter().map(|l| l.name().to_string()).collect()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    /// Returns the bundle from the first layer holding a fresh copy.
    ///
    /// Concurrent calls for the same key share one walk of the chain. The
    /// walk runs on its own task, so dropping the returned future does not
    /// cancel it and backfill still happens.
    pub async fn resolve(&self, key: &ResourceKey) -> Resolution {
        if self.is_shut_down() {
            return Resolution::Missing(Miss {
                key: key.clone(),
                cause: Some(LayerError::ShutDown),
            });
        }

        let walk = {
            let mut inflight = lock(&self.inner.inflight);
            match inflight.get(key) {
                Some(entry) => {
                    debug!("Joining in-flight resolve for {}", key);
                    entry.walk.clone()
                }
                None => {
                    let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst);
                    let handle = tokio::spawn(walk_layers(self.inner.clone(), key.clone(), generation));
                    let aborted_key = key.clone();
                    let walk = async move {
                        handle.await.unwrap_or_else(|e| {
                            warn!("Resolve task for {} failed: {}", aborted_key, e);
                            Resolution::Missing(Miss {
                                key: aborted_key,
                                cause: Some(LayerError::Aborted),
                            })
                        })
                    }
                    .boxed()
                    .shared();
                    inflight.insert(
                        key.clone(),
                        InFlight {
                            generation,
                            walk: walk.clone(),
                        },
                    );
                    walk
                }
            }
        };

        walk.await
    }

    pub async fn resolve_many(
        &self,
        language: &LanguageTag,
        namespaces: &[Namespace],
    ) -> Vec<Resolution> {
        let keys = ResourceKey::cartesian(std::slice::from_ref(language), namespaces);
        join_all(keys.iter().map(|key| self.resolve(key))).await
    }

    /// Tries `language`, then its base, fallbacks and the default language.
    /// A total miss reports the requested language's key and cause.
    pub async fn resolve_with_fallback(
        &self,
        language: &LanguageTag,
        namespace: &Namespace,
    ) -> Resolution {
        let mut first_miss = None;
        for candidate in self.inner.registry.languages_to_load(language) {
            let key = ResourceKey::new(candidate, namespace.clone());
            match self.resolve(&key).await {
                Resolution::Found(resolved) => return Resolution::Found(resolved),
                miss => {
                    first_miss.get_or_insert(miss);
                }
            }
        }
        first_miss.unwrap_or_else(|| {
            Resolution::Missing(Miss {
                key: ResourceKey::new(language.clone(), namespace.clone()),
                cause: None,
            })
        })
    }

    /// Treats every cached copy of `key` as stale from now on and detaches
    /// any in-flight resolve so the next call fetches again.
    pub fn invalidate(&self, key: &ResourceKey) {
        lock(&self.inner.invalidated).insert(key.clone(), DateUtil::now());
        lock(&self.inner.inflight).remove(key);
        if self.inner.debug {
            info!("Invalidated {}", key);
        } else {
            debug!("Invalidated {}", key);
        }
    }

    pub fn invalidate_many(&self, language: &LanguageTag, namespaces: &[Namespace]) {
        for key in ResourceKey::cartesian(std::slice::from_ref(language), namespaces) {
            self.invalidate(&key);
        }
    }

    /// Sends keys the application could not translate to every layer with an
    /// add path. Fire-and-forget; disabled unless `save_missing` is set.
    pub fn report_missing(&self, key: &ResourceKey, missing: Map<String, Value>) {
        if !self.inner.save_missing || missing.is_empty() || self.is_shut_down() {
            return;
        }

        for layer in &self.inner.layers {
            let layer = layer.clone();
            let key = key.clone();
            let missing = missing.clone();
            let debug_enabled = self.inner.debug;
            spawn_background(&self.inner, async move {
                match layer.create(&key, &missing).await {
                    Ok(WriteAck::Stored) => debug!("{}: reported {} missing keys for {}", layer.name(), missing.len(), key),
                    Ok(WriteAck::Ignored) => {}
                    Err(e) if debug_enabled => warn!("{}: failed to report missing keys for {}: {}", layer.name(), key, e),
                    Err(e) => debug!("{}: failed to report missing keys for {}: {}", layer.name(), key, e),
                }
            });
        }
    }

    /// Waits until every background backfill and add-path task has finished.
    pub async fn settle(&self) {
        loop {
            let mut tasks = std::mem::take(&mut *lock(&self.inner.background));
            if tasks.is_empty() {
                break;
            }
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    warn!("Background loader task failed: {}", e);
                }
            }
        }
    }

    /// Stops accepting resolves and drains background work.
    pub async fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::SeqCst);
        self.settle().await;
        info!("Translation loader shut down");
    }

    /// Opens a consumer session for `language` and its fallbacks.
    pub fn session(&self, language: &LanguageTag, namespaces: &[Namespace]) -> Session {
        let languages = self.inner.registry.languages_to_load(language);
        Session::new(self.clone(), languages, namespaces.to_vec())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn spawn_background<F>(inner: &LoaderInner, task: F)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    lock(&inner.background).spawn(task);
}

async fn walk_layers(inner: Arc<LoaderInner>, key: ResourceKey, generation: u64) -> Resolution {
    let invalidated_at = lock(&inner.invalidated).get(&key).copied();
    let last = inner.layers.len().saturating_sub(1);
    let mut missed = Vec::new();
    let mut outcome = None;
    let mut cause = None;

    for (index, layer) in inner.layers.iter().enumerate() {
        match layer.read(&key).await {
            Ok(Some(bundle)) if invalidated_at.is_some_and(|at| bundle.fetched_at < at) => {
                debug!("{}: {} predates invalidation, skipping", layer.name(), key);
                missed.push(index);
            }
            Ok(Some(bundle)) => {
                debug!("{}: hit for {}", layer.name(), key);
                outcome = Some(Resolved {
                    bundle,
                    layer: layer.name().to_string(),
                    layer_index: index,
                });
                break;
            }
            Ok(None) => {
                debug!("{}: miss for {}", layer.name(), key);
                missed.push(index);
            }
            Err(e) => {
                if inner.debug {
                    warn!("{}: failed to read {}: {}", layer.name(), key, e);
                } else {
                    debug!("{}: failed to read {}: {}", layer.name(), key, e);
                }
                if index == last {
                    cause = Some(e);
                }
                missed.push(index);
            }
        }
    }

    let resolution = match outcome {
        Some(resolved) => {
            backfill(&inner, &missed, &resolved);
            Resolution::Found(resolved)
        }
        None => {
            if inner.debug {
                info!("No layer could provide {}", key);
            }
            Resolution::Missing(Miss { key: key.clone(), cause })
        }
    };

    let mut inflight = lock(&inner.inflight);
    if inflight.get(&key).is_some_and(|entry| entry.generation == generation) {
        inflight.remove(&key);
    }

    resolution
}

fn backfill(inner: &LoaderInner, missed: &[usize], resolved: &Resolved) {
    for &index in missed {
        let layer = inner.layers[index].clone();
        let bundle = resolved.bundle.clone();
        let source = resolved.layer.clone();
        let debug_enabled = inner.debug;
        spawn_background(inner, async move {
            match layer.write(&bundle.key, &bundle).await {
                Ok(WriteAck::Stored) => debug!("{}: backfilled {} from {}", layer.name(), bundle.key, source),
                Ok(WriteAck::Ignored) => {}
                Err(e) if debug_enabled => warn!("{}: backfill of {} failed: {}", layer.name(), bundle.key, e),
                Err(e) => debug!("{}: backfill of {} failed: {}", layer.name(), bundle.key, e),
            }
        });
    }
}
