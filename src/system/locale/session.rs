use futures::future::join_all;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{broadcast, watch};
use tracing::debug;
use uuid::Uuid;

use super::backend::LayerError;
use super::language::{LanguageTag, Namespace};
use super::loader::{LayeredLoader, Resolution};
use super::resource::{Bundle, ResourceKey};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    NotReady,
    Ready,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Ready,
    NotReady,
    BundleChanged(ResourceKey),
    BundleMissing {
        key: ResourceKey,
        cause: Option<LayerError>,
    },
}

struct SessionState {
    id: Uuid,
    languages: Vec<LanguageTag>,
    namespaces: RwLock<Vec<Namespace>>,
    bundles: RwLock<HashMap<ResourceKey, Bundle>>,
    readiness: watch::Sender<Readiness>,
    events: broadcast::Sender<SessionEvent>,
    closed: AtomicBool,
    /// Loads still running; readiness waits for this to reach zero.
    pending: Mutex<usize>,
    /// Missing keys already sent to the add path.
    reported: Mutex<HashSet<(ResourceKey, String)>>,
}

/// One running load. Dropping it unfinished (a cancelled load) still
/// releases its slot, leaving the session not ready.
struct PendingLoad<'a> {
    session: &'a Session,
    finished: bool,
}

impl Drop for PendingLoad<'_> {
    fn drop(&mut self) {
        if !self.finished {
            *lock(&self.session.state.pending) -= 1;
        }
    }
}

/// One consumer of translations (a page, a request, a component tree).
///
/// Holds the bundles delivered so far and a readiness flag. Clones share the
/// same state; once [`Session::close`] is called nothing more is delivered,
/// even by resolves that were already running.
#[derive(Clone)]
pub struct Session {
    loader: LayeredLoader,
    state: Arc<SessionState>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.state.id)
            .field("languages", &self.state.languages)
            .field("readiness", &*self.state.readiness.borrow())
            .finish()
    }
}

impl Session {
    pub(crate) fn new(
        loader: LayeredLoader,
        languages: Vec<LanguageTag>,
        namespaces: Vec<Namespace>,
    ) -> Self {
        let (readiness, _) = watch::channel(Readiness::NotReady);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            loader,
            state: Arc::new(SessionState {
                id: Uuid::new_v4(),
                languages,
                namespaces: RwLock::new(namespaces),
                bundles: RwLock::new(HashMap::new()),
                readiness,
                events,
                closed: AtomicBool::new(false),
                pending: Mutex::new(0),
                reported: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.state.id
    }

    /// Lookup order: requested language first, then its fallbacks.
    pub fn languages(&self) -> &[LanguageTag] {
        &self.state.languages
    }

    pub fn namespaces(&self) -> Vec<Namespace> {
        read(&self.state.namespaces).clone()
    }

    pub fn readiness(&self) -> watch::Receiver<Readiness> {
        self.state.readiness.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        *self.state.readiness.borrow() == Readiness::Ready
    }

    /// Resolves once the session is ready.
    pub async fn wait_ready(&self) {
        let mut readiness = self.readiness();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = readiness.wait_for(|r| *r == Readiness::Ready).await;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.state.events.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Tears the session down. Pending resolves keep running for backfill
    /// but their results are dropped.
    pub fn close(&self) {
        if !self.state.closed.swap(true, Ordering::SeqCst) {
            debug!("Session {} closed", self.state.id);
        }
    }

    /// Resolves every requested bundle and marks the session ready.
    pub async fn load(&self) -> Readiness {
        let keys = self.keys_for(&self.namespaces());
        let load = self.begin(false);
        let delivered = self.deliver(&keys).await;
        self.finish(load, delivered)
    }

    /// Adds namespaces to the session; readiness drops until they resolve.
    pub async fn load_namespaces(&self, namespaces: &[Namespace]) -> Readiness {
        let added: Vec<Namespace> = {
            let mut current = write(&self.state.namespaces);
            let added: Vec<Namespace> = namespaces
                .iter()
                .filter(|ns| !current.contains(ns))
                .cloned()
                .collect();
            current.extend(added.iter().cloned());
            added
        };
        if added.is_empty() {
            return self.current();
        }

        let load = self.begin(true);
        let delivered = self.deliver(&self.keys_for(&added)).await;
        self.finish(load, delivered)
    }

    /// Re-fetches the given namespaces from their source.
    ///
    /// Readiness drops to not-ready while the reload runs. Bundles already
    /// delivered stay visible until their replacements arrive, and are kept
    /// if the reload fails.
    pub async fn reload(&self, namespaces: &[Namespace]) -> Readiness {
        let keys = self.keys_for(namespaces);
        for key in &keys {
            self.loader.invalidate(key);
        }

        let load = self.begin(true);
        let delivered = self.deliver(&keys).await;
        self.finish(load, delivered)
    }

    pub async fn reload_all(&self) -> Readiness {
        let namespaces = self.namespaces();
        self.reload(&namespaces).await
    }

    pub fn bundle(&self, key: &ResourceKey) -> Option<Bundle> {
        read(&self.state.bundles).get(key).cloned()
    }

    /// Translation for `key`, written `path` or `namespace:path`. Without a
    /// namespace prefix the session's first namespace is used.
    pub fn t(&self, key: &str) -> Option<String> {
        let (namespace, path) = self.split_key(key)?;
        let bundles = read(&self.state.bundles);
        self.state.languages.iter().find_map(|language| {
            bundles
                .get(&ResourceKey::new(language.clone(), namespace.clone()))
                .and_then(|bundle| bundle.get_str(path))
                .map(str::to_string)
        })
    }

    pub fn t_with_params(&self, key: &str, params: &HashMap<String, String>) -> Option<String> {
        self.t(key).map(|template| interpolate(&template, params))
    }

    /// What a consumer should render for `key`: the translation, or an empty
    /// placeholder. Never the raw key. Once the session is ready, a missing
    /// translation is reported to the add path.
    pub fn display(&self, key: &str) -> String {
        if let Some(text) = self.t(key) {
            return text;
        }

        if self.is_ready() {
            if let (Some((namespace, path)), Some(language)) =
                (self.split_key(key), self.state.languages.first())
            {
                let key = ResourceKey::new(language.clone(), namespace);
                if lock(&self.state.reported).insert((key.clone(), path.to_string())) {
                    let mut missing = Map::new();
                    missing.insert(path.to_string(), Value::String(path.to_string()));
                    self.loader.report_missing(&key, missing);
                }
            }
        }
        String::new()
    }

    fn split_key<'a>(&self, key: &'a str) -> Option<(Namespace, &'a str)> {
        if let Some((ns, path)) = key.split_once(':') {
            if let Ok(namespace) = Namespace::parse(ns) {
                return Some((namespace, path));
            }
        }
        read(&self.state.namespaces)
            .first()
            .cloned()
            .map(|namespace| (namespace, key))
    }

    fn keys_for(&self, namespaces: &[Namespace]) -> Vec<ResourceKey> {
        ResourceKey::cartesian(&self.state.languages, namespaces)
    }

    fn current(&self) -> Readiness {
        *self.state.readiness.borrow()
    }

    fn begin(&self, drop_readiness: bool) -> PendingLoad<'_> {
        let mut pending = lock(&self.state.pending);
        *pending += 1;
        if drop_readiness {
            self.mark_not_ready();
        }
        PendingLoad {
            session: self,
            finished: false,
        }
    }

    fn mark_not_ready(&self) {
        if self.is_closed() {
            return;
        }
        let previous = self.state.readiness.send_replace(Readiness::NotReady);
        if previous == Readiness::Ready {
            let _ = self.state.events.send(SessionEvent::NotReady);
        }
    }

    /// Flips to ready once the last running load has delivered.
    fn finish(&self, mut load: PendingLoad<'_>, delivered: bool) -> Readiness {
        load.finished = true;
        let mut pending = lock(&self.state.pending);
        *pending -= 1;
        if !delivered || *pending > 0 || self.is_closed() {
            return self.current();
        }
        let previous = self.state.readiness.send_replace(Readiness::Ready);
        if previous != Readiness::Ready {
            let _ = self.state.events.send(SessionEvent::Ready);
        }
        Readiness::Ready
    }

    /// Resolves `keys` and applies the results; `false` if the session was
    /// closed in the meantime.
    async fn deliver(&self, keys: &[ResourceKey]) -> bool {
        let results = join_all(keys.iter().map(|key| self.loader.resolve(key))).await;
        if self.is_closed() {
            debug!("Session {} closed before delivery, dropping {} results", self.state.id, results.len());
            return false;
        }

        for resolution in results {
            self.apply(resolution);
        }
        true
    }

    fn apply(&self, resolution: Resolution) {
        match resolution {
            Resolution::Found(resolved) => {
                let key = resolved.bundle.key.clone();
                let changed = {
                    let mut bundles = write(&self.state.bundles);
                    let changed = bundles
                        .get(&key)
                        .is_none_or(|existing| !existing.same_content(&resolved.bundle));
                    bundles.insert(key.clone(), resolved.bundle);
                    changed
                };
                if changed {
                    let _ = self.state.events.send(SessionEvent::BundleChanged(key));
                }
            }
            Resolution::Missing(miss) => {
                let _ = self.state.events.send(SessionEvent::BundleMissing {
                    key: miss.key,
                    cause: miss.cause,
                });
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Replaces `{{name}}` placeholders.
fn interpolate(template: &str, params: &HashMap<String, String>) -> String {
    let mut result = template.to_string();

    for (key, value) in params {
        let placeholder = format!("{{{{{}}}}}", key);
        result = result.replace(&placeholder, value);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::locale::backend::{Backend, SharedBackend, WriteAck};
    use crate::system::locale::backends::memory::MemoryBackend;
    use crate::system::locale::language::LanguageRegistry;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Network stand-in with adjustable content, latency and failure.
    #[derive(Debug)]
    struct Network {
        content: Mutex<HashMap<ResourceKey, Value>>,
        delay: Duration,
        slow_namespaces: Mutex<HashMap<String, Duration>>,
        down: AtomicBool,
        created: Mutex<Vec<(ResourceKey, Map<String, Value>)>>,
    }

    impl Network {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                content: Mutex::new(HashMap::new()),
                delay,
                slow_namespaces: Mutex::new(HashMap::new()),
                down: AtomicBool::new(false),
                created: Mutex::new(Vec::new()),
            })
        }

        fn serve(&self, lng: &str, ns: &str, value: Value) {
            self.content.lock().unwrap().insert(key(lng, ns), value);
        }
    }

    #[async_trait]
    impl Backend for Network {
        fn name(&self) -> &str {
            "network"
        }

        async fn read(&self, key: &ResourceKey) -> Result<Option<Bundle>, LayerError> {
            let delay = self
                .slow_namespaces
                .lock()
                .unwrap()
                .get(key.namespace.as_str())
                .copied()
                .unwrap_or(self.delay);
            tokio::time::sleep(delay).await;
            if self.down.load(Ordering::SeqCst) {
                return Err(LayerError::Unreachable("offline".to_string()));
            }
            let value = self.content.lock().unwrap().get(key).cloned();
            Ok(value.and_then(|v| Bundle::from_value(key.clone(), v)))
        }

        async fn create(
            &self,
            key: &ResourceKey,
            missing: &Map<String, Value>,
        ) -> Result<WriteAck, LayerError> {
            self.created.lock().unwrap().push((key.clone(), missing.clone()));
            Ok(WriteAck::Stored)
        }
    }

    fn key(lng: &str, ns: &str) -> ResourceKey {
        ResourceKey::parse(lng, ns).unwrap()
    }

    fn ns(name: &str) -> Namespace {
        Namespace::parse(name).unwrap()
    }

    fn loader(network: &Arc<Network>, cache: &Arc<MemoryBackend>) -> LayeredLoader {
        let mut registry = LanguageRegistry::new(LanguageTag::parse("en").unwrap());
        registry.add_language(LanguageTag::parse("de").unwrap(), None);
        LayeredLoader::builder(registry)
            .layer(cache.clone() as SharedBackend)
            .layer(network.clone() as SharedBackend)
            .save_missing(true)
            .build()
    }

    fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        seen
    }

    #[tokio::test]
    async fn test_load_marks_ready_after_all_bundles() {
        let network = Network::new(Duration::from_millis(20));
        network.serve("en", "client-page", json!({ "h1": "Hello" }));
        let cache = Arc::new(MemoryBackend::new("cache"));
        let loader = loader(&network, &cache);

        let session = loader.session(&LanguageTag::parse("en").unwrap(), &[ns("client-page"), ns("footer")]);
        let mut events = session.subscribe();
        assert!(!session.is_ready());
        assert_eq!(session.display("h1"), "");

        assert_eq!(session.load().await, Readiness::Ready);
        assert!(session.is_ready());
        session.wait_ready().await;
        assert_eq!(session.t("h1").as_deref(), Some("Hello"));

        let seen = drain(&mut events);
        assert!(seen.contains(&SessionEvent::BundleChanged(key("en", "client-page"))));
        assert!(seen.contains(&SessionEvent::BundleMissing { key: key("en", "footer"), cause: None }));
        assert_eq!(seen.last(), Some(&SessionEvent::Ready));
    }

    #[tokio::test]
    async fn test_lazy_reload_keeps_content_until_ready() {
        let network = Network::new(Duration::from_millis(100));
        network.serve("en", "lazy-reload-page", json!({ "title": "Server rendered" }));
        let cache = Arc::new(MemoryBackend::new("cache"));
        let loader = loader(&network, &cache);

        let session = loader.session(&LanguageTag::parse("en").unwrap(), &[ns("lazy-reload-page")]);
        session.load().await;
        loader.settle().await;
        let mut events = session.subscribe();
        let mut readiness = session.readiness();
        readiness.borrow_and_update();

        network.serve("en", "lazy-reload-page", json!({ "title": "Fresh" }));
        let reload = tokio::spawn({
            let session = session.clone();
            async move { session.reload(&[ns("lazy-reload-page")]).await }
        });

        readiness.changed().await.unwrap();
        assert_eq!(*readiness.borrow_and_update(), Readiness::NotReady);
        assert_eq!(session.t("title").as_deref(), Some("Server rendered"));

        assert_eq!(reload.await.unwrap(), Readiness::Ready);
        assert!(session.is_ready());
        assert_eq!(session.t("title").as_deref(), Some("Fresh"));
        assert_eq!(
            drain(&mut events),
            vec![
                SessionEvent::NotReady,
                SessionEvent::BundleChanged(key("en", "lazy-reload-page")),
                SessionEvent::Ready,
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_previous_bundle() {
        let network = Network::new(Duration::ZERO);
        network.serve("en", "footer", json!({ "copyright": "(c) 2026" }));
        let cache = Arc::new(MemoryBackend::new("cache"));
        let loader = loader(&network, &cache);

        let session = loader.session(&LanguageTag::parse("en").unwrap(), &[ns("footer")]);
        session.load().await;
        network.down.store(true, Ordering::SeqCst);

        let mut events = session.subscribe();
        assert_eq!(session.reload_all().await, Readiness::Ready);
        assert_eq!(session.t("copyright").as_deref(), Some("(c) 2026"));
        assert!(drain(&mut events).contains(&SessionEvent::BundleMissing {
            key: key("en", "footer"),
            cause: Some(LayerError::Unreachable("offline".to_string())),
        }));
    }

    #[tokio::test]
    async fn test_closed_session_receives_nothing() {
        let network = Network::new(Duration::from_millis(50));
        network.serve("en", "client-page", json!({ "h1": "Hello" }));
        let cache = Arc::new(MemoryBackend::new("cache"));
        let loader = loader(&network, &cache);

        let session = loader.session(&LanguageTag::parse("en").unwrap(), &[ns("client-page")]);
        let pending = tokio::spawn({
            let session = session.clone();
            async move { session.load().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        session.close();

        assert_eq!(pending.await.unwrap(), Readiness::NotReady);
        assert!(session.bundle(&key("en", "client-page")).is_none());
        assert!(!session.is_ready());

        // The walk still completed and warmed the cache.
        loader.settle().await;
        assert!(cache.read(&key("en", "client-page")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_fallback_language_and_namespaces() {
        let network = Network::new(Duration::ZERO);
        network.serve("de", "common", json!({ "greeting": "Hallo {{name}}" }));
        network.serve("en", "common", json!({ "greeting": "Hello {{name}}", "bye": "Bye" }));
        network.serve("en", "footer", json!({ "nav": { "home": "Home" } }));
        let cache = Arc::new(MemoryBackend::new("cache"));
        let loader = loader(&network, &cache);

        let session = loader.session(&LanguageTag::parse("de-AT").unwrap(), &[ns("common")]);
        assert_eq!(
            session.languages(),
            &[
                LanguageTag::parse("de-AT").unwrap(),
                LanguageTag::parse("de").unwrap(),
                LanguageTag::parse("en").unwrap(),
            ]
        );
        session.load().await;

        let params = HashMap::from([("name".to_string(), "Ada".to_string())]);
        assert_eq!(session.t_with_params("greeting", &params).as_deref(), Some("Hallo Ada"));
        assert_eq!(session.t("bye").as_deref(), Some("Bye"));
        assert_eq!(session.t("footer:nav.home"), None);

        let mut readiness = session.readiness();
        assert_eq!(session.load_namespaces(&[ns("footer")]).await, Readiness::Ready);
        assert_eq!(*readiness.borrow_and_update(), Readiness::Ready);
        assert_eq!(session.t("footer:nav.home").as_deref(), Some("Home"));
        assert_eq!(session.namespaces(), vec![ns("common"), ns("footer")]);
    }

    #[tokio::test]
    async fn test_ready_waits_for_every_running_load() {
        let network = Network::new(Duration::ZERO);
        network.serve("en", "slow", json!({ "a": "A" }));
        network.serve("en", "fast", json!({ "b": "B" }));
        network
            .slow_namespaces
            .lock()
            .unwrap()
            .insert("slow".to_string(), Duration::from_millis(300));
        let cache = Arc::new(MemoryBackend::new("cache"));
        let loader = loader(&network, &cache);

        let session = loader.session(&LanguageTag::parse("en").unwrap(), &[ns("slow")]);
        let initial = tokio::spawn({
            let session = session.clone();
            async move { session.load().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The fast namespace settles first; the slow one is still requested.
        assert_eq!(session.load_namespaces(&[ns("fast")]).await, Readiness::NotReady);
        assert!(!session.is_ready());
        assert_eq!(session.t("fast:b").as_deref(), Some("B"));
        assert!(session.bundle(&key("en", "slow")).is_none());

        assert_eq!(initial.await.unwrap(), Readiness::Ready);
        assert!(session.is_ready());
        assert_eq!(session.t("slow:a").as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn test_cancelled_load_leaves_session_not_ready() {
        let network = Network::new(Duration::from_millis(200));
        network.serve("en", "common", json!({ "h1": "Hello" }));
        let cache = Arc::new(MemoryBackend::new("cache"));
        let loader = loader(&network, &cache);

        let session = loader.session(&LanguageTag::parse("en").unwrap(), &[ns("common")]);
        let cancelled = tokio::time::timeout(Duration::from_millis(20), session.load()).await;
        assert!(cancelled.is_err());
        assert!(!session.is_ready());

        assert_eq!(session.load().await, Readiness::Ready);
    }

    #[tokio::test]
    async fn test_display_reports_missing_keys_once_ready() {
        let network = Network::new(Duration::ZERO);
        network.serve("en", "common", json!({ "h1": "Hello" }));
        let cache = Arc::new(MemoryBackend::new("cache"));
        let loader = loader(&network, &cache);

        let session = loader.session(&LanguageTag::parse("en").unwrap(), &[ns("common")]);
        assert_eq!(session.display("subtitle"), "");
        loader.settle().await;
        assert!(network.created.lock().unwrap().is_empty());

        session.load().await;
        assert_eq!(session.display("h1"), "Hello");
        assert_eq!(session.display("subtitle"), "");
        // Rendering the same missing key again is not reported twice.
        assert_eq!(session.display("subtitle"), "");
        loader.settle().await;

        let created = network.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].0, key("en", "common"));
        assert_eq!(created[0].1.get("subtitle"), Some(&json!("subtitle")));
    }

    #[test]
    fn test_interpolate() {
        let template = "Hello, {{name}}! You have {{count}} messages.";
        let mut params = HashMap::new();
        params.insert("name".to_string(), "Alice".to_string());
        params.insert("count".to_string(), "5".to_string());

        assert_eq!(interpolate(template, &params), "Hello, Alice! You have 5 messages.");
    }
}
