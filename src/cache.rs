//! Local cache of a referenced site.
//!
//! A `Cache` is an external store the host binds into a `CacheBinding` while
//! it is active. The `CachePort` puts the site's cache strategy in front of
//! the binding and reports three distinct outcomes: a hit, a miss, and
//! "unavailable" (strategy `none` or nothing bound). I/O failures of a bound
//! cache are reported separately as `StoreError`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::cancel::CancelToken;
use crate::config::CacheStrategy;
use crate::error::StoreError;
use crate::query::FieldQuery;
use crate::representation::Representation;

/// Storage contract of a site cache.
///
/// Not-found is `Ok(None)`; `Err` is reserved for store failures.
pub trait Cache: Send + Sync {
    /// Loads the cached representation of `id`.
    fn get(&self, id: &str, cancel: &CancelToken) -> Result<Option<Representation>, StoreError>;

    /// Evaluates `query` against the cached representations.
    fn find(&self, query: &FieldQuery, cancel: &CancelToken) -> Result<Vec<Representation>, StoreError>;

    /// Evaluates `query` and returns only the ids of matching entities.
    fn find_references(&self, query: &FieldQuery, cancel: &CancelToken) -> Result<Vec<String>, StoreError>;

    /// Stores `rep` and returns the representation as persisted, which may
    /// lack fields the cache does not track.
    fn store(&self, rep: Representation, cancel: &CancelToken) -> Result<Representation, StoreError>;

    /// Fields kept by `store`. `None` means every field is kept.
    fn tracked_fields(&self) -> Option<&[String]>;
}

/// Slot the host binds the active cache into.
///
/// Clones share the slot, so a host can keep one clone and bind or unbind
/// the cache while sites hold theirs.
#[derive(Clone, Default)]
pub struct CacheBinding {
    slot: Arc<RwLock<Option<Arc<dyn Cache>>>>,
}

impl CacheBinding {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a binding with `cache` already bound.
    #[must_use]
    pub fn bound(cache: Arc<dyn Cache>) -> Self {
        let binding = Self::new();
        binding.bind(cache);
        binding
    }

    /// Binds `cache`, replacing any previous one.
    pub fn bind(&self, cache: Arc<dyn Cache>) {
        let mut slot = self
            .slot
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *slot = Some(cache);
    }

    /// Unbinds the current cache and returns it.
    pub fn unbind(&self) -> Option<Arc<dyn Cache>> {
        let mut slot = self
            .slot
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        slot.take()
    }

    /// The currently bound cache.
    #[must_use]
    pub fn current(&self) -> Option<Arc<dyn Cache>> {
        self.slot
            .read()
            .map(|slot| slot.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.current().is_some()
    }
}

impl fmt::Debug for CacheBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheBinding")
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// Outcome of a cache read through the `CachePort`.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheRead<T> {
    /// The cache answered.
    Hit(T),
    /// The cache was reachable but does not know the entity.
    Miss,
    /// Strategy `none`, or no cache bound.
    Unavailable,
}

impl<T> CacheRead<T> {
    #[must_use]
    pub const fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }

    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable)
    }

    /// The hit value, if any.
    pub fn hit(self) -> Option<T> {
        match self {
            Self::Hit(value) => Some(value),
            Self::Miss | Self::Unavailable => None,
        }
    }
}

/// Strategy-aware access to a site's cache.
#[derive(Debug, Clone)]
pub struct CachePort {
    strategy: CacheStrategy,
    cache_id: Option<String>,
    binding: CacheBinding,
}

impl CachePort {
    #[must_use]
    pub fn new(strategy: CacheStrategy, cache_id: Option<String>, binding: CacheBinding) -> Self {
        Self {
            strategy,
            cache_id,
            binding,
        }
    }

    /// A port that never touches a cache.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(CacheStrategy::None, None, CacheBinding::new())
    }

    #[must_use]
    pub const fn strategy(&self) -> CacheStrategy {
        self.strategy
    }

    #[must_use]
    pub fn cache_id(&self) -> Option<&str> {
        self.cache_id.as_deref()
    }

    /// The bound cache; always `None` for strategy `none`.
    #[must_use]
    pub fn cache(&self) -> Option<Arc<dyn Cache>> {
        if self.strategy == CacheStrategy::None {
            return None;
        }
        self.binding.current()
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.cache().is_some()
    }

    pub fn try_get(&self, id: &str, cancel: &CancelToken) -> Result<CacheRead<Representation>, StoreError> {
        let Some(cache) = self.cache() else {
            return Ok(CacheRead::Unavailable);
        };
        Ok(match cache.get(id, cancel)? {
            Some(rep) => CacheRead::Hit(rep),
            None => CacheRead::Miss,
        })
    }

    pub fn try_find(&self, query: &FieldQuery, cancel: &CancelToken) -> Result<CacheRead<Vec<Representation>>, StoreError> {
        let Some(cache) = self.cache() else {
            return Ok(CacheRead::Unavailable);
        };
        cache.find(query, cancel).map(CacheRead::Hit)
    }

    pub fn try_find_references(
        &self,
        query: &FieldQuery,
        cancel: &CancelToken,
    ) -> Result<CacheRead<Vec<String>>, StoreError> {
        let Some(cache) = self.cache() else {
            return Ok(CacheRead::Unavailable);
        };
        cache.find_references(query, cancel).map(CacheRead::Hit)
    }

    /// Stores `rep`; a hit carries the persisted representation.
    pub fn try_store(&self, rep: Representation, cancel: &CancelToken) -> Result<CacheRead<Representation>, StoreError> {
        let Some(cache) = self.cache() else {
            return Ok(CacheRead::Unavailable);
        };
        cache.store(rep, cancel).map(CacheRead::Hit)
    }
}

fn lock_err(context: &'static str) -> StoreError {
    StoreError::BackendError(format!("poisoned lock: {context}"))
}

fn check_cancel(cancel: &CancelToken) -> Result<(), StoreError> {
    if cancel.is_cancelled() {
        return Err(StoreError::Cancelled);
    }
    Ok(())
}

/// Thread-safe in-memory `Cache`.
///
/// Intended for embedded usage, tests, and as a reference implementation.
/// Results are ordered by entity id.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    id: String,
    tracked: Option<Vec<String>>,
    entries: RwLock<BTreeMap<String, Representation>>,
}

impl InMemoryCache {
    /// Creates an empty cache that keeps every field.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Restricts stored representations to `fields`.
    #[must_use]
    pub fn with_tracked_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tracked = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Number of cached entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes `id` from the cache.
    pub fn remove(&self, id: &str) -> Result<Option<Representation>, StoreError> {
        let mut entries = self.entries.write().map_err(|_| lock_err("cache entries"))?;
        Ok(entries.remove(id))
    }

    fn filter_tracked(&self, rep: &Representation) -> Representation {
        match &self.tracked {
            Some(tracked) => rep.retain_fields(|field| tracked.iter().any(|t| t == field)),
            None => rep.clone(),
        }
    }
}

impl Cache for InMemoryCache {
    fn get(&self, id: &str, cancel: &CancelToken) -> Result<Option<Representation>, StoreError> {
        check_cancel(cancel)?;
        let entries = self.entries.read().map_err(|_| lock_err("cache entries"))?;
        Ok(entries.get(id).cloned())
    }

    fn find(&self, query: &FieldQuery, cancel: &CancelToken) -> Result<Vec<Representation>, StoreError> {
        check_cancel(cancel)?;
        let entries = self.entries.read().map_err(|_| lock_err("cache entries"))?;
        let matches = entries
            .values()
            .filter(|rep| query.matches(rep))
            .map(|rep| query.project(rep));
        Ok(query.page(matches))
    }

    fn find_references(&self, query: &FieldQuery, cancel: &CancelToken) -> Result<Vec<String>, StoreError> {
        check_cancel(cancel)?;
        let entries = self.entries.read().map_err(|_| lock_err("cache entries"))?;
        let ids = entries
            .values()
            .filter(|rep| query.matches(rep))
            .map(|rep| rep.id().to_string());
        Ok(query.page(ids))
    }

    fn store(&self, rep: Representation, cancel: &CancelToken) -> Result<Representation, StoreError> {
        check_cancel(cancel)?;
        let persisted = self.filter_tracked(&rep);
        let mut entries = self.entries.write().map_err(|_| lock_err("cache entries"))?;
        entries.insert(persisted.id().to_string(), persisted.clone());
        Ok(persisted)
    }

    fn tracked_fields(&self) -> Option<&[String]> {
        self.tracked.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Constraint;
    use crate::value::Value;

    fn berlin() -> Representation {
        Representation::new("http://dbpedia.org/resource/Berlin")
            .with("rdfs:label", Value::text("Berlin", Some("de")))
            .with("dbp-ont:populationTotal", 3_645_000i64)
            .with("dbp-prop:mayor", Value::uri("http://dbpedia.org/resource/Kai_Wegner"))
    }

    fn vienna() -> Representation {
        Representation::new("http://dbpedia.org/resource/Vienna")
            .with("rdfs:label", Value::text("Wien", Some("de")))
            .with("dbp-ont:populationTotal", 1_931_000i64)
    }

    #[test]
    fn test_store_filters_untracked_fields() {
        let cache = InMemoryCache::new("dbpediaCache")
            .with_tracked_fields(["rdfs:label", "dbp-ont:populationTotal"]);
        let cancel = CancelToken::new();

        let persisted = cache.store(berlin(), &cancel).unwrap();
        assert!(persisted.contains_field("rdfs:label"));
        assert!(!persisted.contains_field("dbp-prop:mayor"));

        let loaded = cache.get("http://dbpedia.org/resource/Berlin", &cancel).unwrap();
        assert_eq!(loaded, Some(persisted));
        assert_eq!(cache.tracked_fields().map(<[String]>::len), Some(2));
    }

    #[test]
    fn test_get_missing_is_none() {
        let cache = InMemoryCache::new("c");
        assert_eq!(cache.get("unknown", &CancelToken::new()).unwrap(), None);
    }

    #[test]
    fn test_find_evaluates_query() {
        let cache = InMemoryCache::new("c");
        let cancel = CancelToken::new();
        cache.store(berlin(), &cancel).unwrap();
        cache.store(vienna(), &cancel).unwrap();

        let query = FieldQuery::new()
            .constrain("rdfs:label", Constraint::text("wien"))
            .select("rdfs:label");
        let found = cache.find(&query, &cancel).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id(), "http://dbpedia.org/resource/Vienna");
        assert!(!found[0].contains_field("dbp-ont:populationTotal"));

        let all = FieldQuery::new().constrain("dbp-ont:populationTotal", Constraint::Exists);
        let ids = cache.find_references(&all, &cancel).unwrap();
        assert_eq!(
            ids,
            vec![
                "http://dbpedia.org/resource/Berlin".to_string(),
                "http://dbpedia.org/resource/Vienna".to_string(),
            ]
        );
    }

    #[test]
    fn test_cancelled_calls_fail() {
        let cache = InMemoryCache::new("c");
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(cache.get("x", &cancel), Err(StoreError::Cancelled)));
        assert!(matches!(cache.store(berlin(), &cancel), Err(StoreError::Cancelled)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_port_with_strategy_none_is_unavailable() {
        let cache = Arc::new(InMemoryCache::new("c"));
        cache.store(berlin(), &CancelToken::new()).unwrap();
        let port = CachePort::new(CacheStrategy::None, None, CacheBinding::bound(cache));

        let read = port.try_get("http://dbpedia.org/resource/Berlin", &CancelToken::new()).unwrap();
        assert!(read.is_unavailable());
        assert!(port.cache().is_none());
    }

    #[test]
    fn test_port_outcomes() {
        let binding = CacheBinding::new();
        let port = CachePort::new(CacheStrategy::All, Some("c".to_string()), binding.clone());
        let cancel = CancelToken::new();
        assert!(port.try_get("x", &cancel).unwrap().is_unavailable());

        binding.bind(Arc::new(InMemoryCache::new("c")));
        assert_eq!(port.try_get("x", &cancel).unwrap(), CacheRead::Miss);

        let stored = port.try_store(berlin(), &cancel).unwrap().hit().unwrap();
        let read = port.try_get(stored.id(), &cancel).unwrap();
        assert_eq!(read, CacheRead::Hit(stored));

        assert!(binding.unbind().is_some());
        assert!(!port.is_available());
    }
}
