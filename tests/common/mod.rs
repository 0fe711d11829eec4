//! Shared test doubles for the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use kyrosite::{
    BackendError, BackendFactory, BackendInstance, Cache, CacheBinding, CancelToken, EntityDereferencer,
    EntitySearcher, FieldQuery, InMemoryCache, OfflineMode, PluginRegistry, ReferencedSite, Representation,
    SiteConfiguration, StoreError, Value,
};

pub const SPARQL: &str = "http://dbpedia.org/sparql";
pub const CACHE_ID: &str = "dbpediaCache";

pub fn berlin() -> Representation {
    Representation::new("http://dbpedia.org/resource/Berlin")
        .with("rdfs:label", Value::text("Berlin", Some("de")))
        .with("dbp-ont:populationTotal", 3_645_000i64)
        .with("dbp-prop:mayor", Value::uri("http://dbpedia.org/resource/Kai_Wegner"))
}

pub fn paris() -> Representation {
    Representation::new("http://dbpedia.org/resource/Paris")
        .with("rdfs:label", Value::text("Paris", Some("fr")))
        .with("dbp-ont:populationTotal", 2_102_650i64)
}

pub fn vienna() -> Representation {
    Representation::new("http://dbpedia.org/resource/Vienna")
        .with("rdfs:label", Value::text("Wien", Some("de")))
        .with("dbp-ont:populationTotal", 1_931_000i64)
}

/// Data and call counters shared by every `MockRemote` a factory creates.
#[derive(Default)]
pub struct RemoteState {
    entities: Mutex<BTreeMap<String, Representation>>,
    failing: Mutex<HashSet<String>>,
    search_ids: Mutex<Vec<String>>,
    search_fails: Mutex<bool>,
    pub dereference_calls: AtomicUsize,
    pub content_calls: AtomicUsize,
    pub find_calls: AtomicUsize,
    pub find_entities_calls: AtomicUsize,
    pub closed: AtomicUsize,
}

impl RemoteState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_entities(reps: impl IntoIterator<Item = Representation>) -> Arc<Self> {
        let state = Self::new();
        for rep in reps {
            state.add(rep);
        }
        state
    }

    pub fn add(&self, rep: Representation) {
        self.entities.lock().unwrap().insert(rep.id().to_string(), rep);
    }

    /// Makes dereferencing `id` fail with a transport error.
    pub fn fail_on(&self, id: &str) {
        self.failing.lock().unwrap().insert(id.to_string());
    }

    /// Ids returned by `find_entities`, in ranking order.
    pub fn set_search_ids(&self, ids: &[&str]) {
        *self.search_ids.lock().unwrap() = ids.iter().map(|s| (*s).to_string()).collect();
    }

    pub fn fail_searches(&self) {
        *self.search_fails.lock().unwrap() = true;
    }

    pub fn remote_calls(&self) -> usize {
        self.dereference_calls.load(Ordering::SeqCst)
            + self.content_calls.load(Ordering::SeqCst)
            + self.find_calls.load(Ordering::SeqCst)
            + self.find_entities_calls.load(Ordering::SeqCst)
    }
}

/// Remote site double implementing both backend roles.
pub struct MockRemote {
    name: &'static str,
    state: Arc<RemoteState>,
}

impl MockRemote {
    pub fn new(name: &'static str, state: Arc<RemoteState>) -> Self {
        Self { name, state }
    }
}

impl EntityDereferencer for MockRemote {
    fn dereference(&self, id: &str, _: &CancelToken) -> Result<Option<Representation>, BackendError> {
        self.state.dereference_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.failing.lock().unwrap().contains(id) {
            return Err(BackendError::transport(format!("connection reset while loading {id}")));
        }
        Ok(self.state.entities.lock().unwrap().get(id).cloned())
    }

    fn dereference_content(&self, id: &str, content_type: &str, cancel: &CancelToken) -> Result<Vec<u8>, BackendError> {
        self.state.content_calls.fetch_add(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        Ok(format!("<{id}> as {content_type}").into_bytes())
    }

    fn backend_type(&self) -> &str {
        self.name
    }

    fn close(&self) {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
    }
}

impl EntitySearcher for MockRemote {
    fn find(&self, query: &FieldQuery, _: &CancelToken) -> Result<Vec<Representation>, BackendError> {
        self.state.find_calls.fetch_add(1, Ordering::SeqCst);
        if *self.state.search_fails.lock().unwrap() {
            return Err(BackendError::Remote {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }
        let entities = self.state.entities.lock().unwrap();
        Ok(entities.values().filter(|r| query.matches(r)).cloned().collect())
    }

    fn find_entities(&self, _: &FieldQuery, _: &CancelToken) -> Result<Vec<String>, BackendError> {
        self.state.find_entities_calls.fetch_add(1, Ordering::SeqCst);
        if *self.state.search_fails.lock().unwrap() {
            return Err(BackendError::Remote {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }
        Ok(self.state.search_ids.lock().unwrap().clone())
    }

    fn backend_type(&self) -> &str {
        self.name
    }

    fn close(&self) {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Which roles the instances created by a `MockFactory` serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Produces {
    Both,
    Dereferencer,
    Searcher,
    Error,
}

/// Factory creating a new `MockRemote` per call, all sharing one `RemoteState`.
pub struct MockFactory {
    name: &'static str,
    produces: Produces,
    delay: Duration,
    state: Arc<RemoteState>,
    pub created: AtomicUsize,
    instances: Mutex<Vec<Arc<MockRemote>>>,
}

impl MockFactory {
    pub fn new(name: &'static str, state: Arc<RemoteState>) -> Arc<Self> {
        Self::build(name, state, Produces::Both, Duration::ZERO)
    }

    pub fn build(name: &'static str, state: Arc<RemoteState>, produces: Produces, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name,
            produces,
            delay,
            state,
            created: AtomicUsize::new(0),
            instances: Mutex::new(Vec::new()),
        })
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl BackendFactory for MockFactory {
    fn create(&self, _: &SiteConfiguration) -> Result<BackendInstance, BackendError> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        let remote = Arc::new(MockRemote::new(self.name, Arc::clone(&self.state)));
        self.instances.lock().unwrap().push(Arc::clone(&remote));
        Ok(match self.produces {
            Produces::Both => BackendInstance::Both(remote),
            Produces::Dereferencer => BackendInstance::Dereferencer(remote),
            Produces::Searcher => BackendInstance::Searcher(remote),
            Produces::Error => {
                return Err(BackendError::Creation {
                    selector: self.name.to_string(),
                    reason: "endpoint rejected configuration".to_string(),
                })
            }
        })
    }
}

/// Cache whose store is unreachable: every call fails with a connection error.
#[derive(Default)]
pub struct UnreachableCache {
    pub calls: AtomicUsize,
}

impl UnreachableCache {
    fn fail<T>(&self) -> Result<T, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::ConnectionError("connection refused".to_string()))
    }
}

impl Cache for UnreachableCache {
    fn get(&self, _: &str, _: &CancelToken) -> Result<Option<Representation>, StoreError> {
        self.fail()
    }

    fn find(&self, _: &FieldQuery, _: &CancelToken) -> Result<Vec<Representation>, StoreError> {
        self.fail()
    }

    fn find_references(&self, _: &FieldQuery, _: &CancelToken) -> Result<Vec<String>, StoreError> {
        self.fail()
    }

    fn store(&self, _: Representation, _: &CancelToken) -> Result<Representation, StoreError> {
        self.fail()
    }

    fn tracked_fields(&self) -> Option<&[String]> {
        None
    }
}

/// `InMemoryCache` that counts calls per operation.
pub struct SpyCache {
    pub inner: InMemoryCache,
    pub gets: AtomicUsize,
    pub finds: AtomicUsize,
    pub stores: Mutex<Vec<Representation>>,
}

impl SpyCache {
    pub fn new(inner: InMemoryCache) -> Arc<Self> {
        Arc::new(Self {
            inner,
            gets: AtomicUsize::new(0),
            finds: AtomicUsize::new(0),
            stores: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
            + self.finds.load(Ordering::SeqCst)
            + self.stores.lock().unwrap().len()
    }
}

impl Cache for SpyCache {
    fn get(&self, id: &str, cancel: &CancelToken) -> Result<Option<Representation>, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(id, cancel)
    }

    fn find(&self, query: &FieldQuery, cancel: &CancelToken) -> Result<Vec<Representation>, StoreError> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        self.inner.find(query, cancel)
    }

    fn find_references(&self, query: &FieldQuery, cancel: &CancelToken) -> Result<Vec<String>, StoreError> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        self.inner.find_references(query, cancel)
    }

    fn store(&self, rep: Representation, cancel: &CancelToken) -> Result<Representation, StoreError> {
        self.stores.lock().unwrap().push(rep.clone());
        self.inner.store(rep, cancel)
    }

    fn tracked_fields(&self) -> Option<&[String]> {
        self.inner.tracked_fields()
    }
}

/// Configuration of a site with one shared SPARQL backend.
pub fn sparql_site(id: &str) -> kyrosite::SiteConfigurationBuilder {
    SiteConfiguration::builder(id)
        .access_uri(SPARQL)
        .query_uri(SPARQL)
        .dereferencer_type("sparql")
        .searcher_type("sparql")
}

pub struct Fixture {
    pub site: ReferencedSite,
    pub registry: Arc<PluginRegistry>,
    pub state: Arc<RemoteState>,
    pub factory: Arc<MockFactory>,
    pub binding: CacheBinding,
    pub offline: OfflineMode,
}

/// Builds a site over a registered mock factory for selector `sparql`.
pub fn fixture(config: SiteConfiguration, state: Arc<RemoteState>) -> Fixture {
    let registry = Arc::new(PluginRegistry::new());
    let factory = MockFactory::new("MockSparql", Arc::clone(&state));
    registry.register("sparql", factory.clone());
    let binding = CacheBinding::new();
    let offline = OfflineMode::new();
    let site = ReferencedSite::new(config, registry.clone(), binding.clone(), offline.clone()).unwrap();
    Fixture {
        site,
        registry,
        state,
        factory,
        binding,
        offline,
    }
}

/// A log event captured by `CaptureLayer`.
#[derive(Debug, Clone)]
pub struct Captured {
    pub level: Level,
    pub message: String,
    pub fields: BTreeMap<String, String>,
}

#[derive(Default)]
struct Recorder {
    message: String,
    fields: BTreeMap<String, String>,
}

impl Visit for Recorder {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.insert(field.name().to_string(), value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields.insert(field.name().to_string(), format!("{value:?}"));
        }
    }
}

/// Layer collecting every event for assertions.
#[derive(Clone, Default)]
pub struct CaptureLayer {
    events: Arc<Mutex<Vec<Captured>>>,
}

impl CaptureLayer {
    pub fn events(&self) -> Vec<Captured> {
        self.events.lock().unwrap().clone()
    }

    pub fn warnings(&self) -> Vec<Captured> {
        self.events()
            .into_iter()
            .filter(|e| e.level == Level::WARN)
            .collect()
    }
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut recorder = Recorder::default();
        event.record(&mut recorder);
        self.events.lock().unwrap().push(Captured {
            level: *event.metadata().level(),
            message: recorder.message,
            fields: recorder.fields,
        });
    }
}

/// Runs `f` with a subscriber that captures its events.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, CaptureLayer) {
    use tracing_subscriber::layer::SubscriberExt;

    let layer = CaptureLayer::default();
    let subscriber = tracing_subscriber::registry().with(layer.clone());
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, layer)
}
