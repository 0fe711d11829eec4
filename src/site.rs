//! Entity resolution against a referenced site.
//!
//! A `ReferencedSite` answers entity lookups and queries from its local
//! cache and its remote backends, according to the configured cache
//! strategy:
//!
//! - `all`: the cache is asked first. If it cannot answer and a remote
//!   backend for the role is configured (and offline mode is off), the call
//!   falls back to the remote site; otherwise the cache failure is returned.
//! - `used`: reads go to the remote site; representations fetched by id are
//!   written back to the cache.
//! - `none`: the cache is never touched.
//!
//! Remote calls are gated by the shared `OfflineMode` immediately before
//! they are issued. Write-back is best effort and never fails a call.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Instant;

use crate::backend::{
    BackendHandle, BackendRole, EntityDereferencer, EntitySearcher, PluginResolver,
};
use crate::cache::{Cache, CacheBinding, CachePort, CacheRead};
use crate::cancel::CancelToken;
use crate::config::{CacheStrategy, SiteConfiguration};
use crate::error::{BackendError, SiteError, SiteResult, StoreError};
use crate::mapping::FieldMapper;
use crate::offline::OfflineMode;
use crate::query::FieldQuery;
use crate::representation::Representation;
use crate::result::{BatchAssembler, Entity, Origin, QueryResultList};

/// A remote knowledge source with an optional local cache.
///
/// Methods take `&self` and are safe to call concurrently; the only
/// synchronisation is the one-time creation of the backends.
pub struct ReferencedSite {
    config: Arc<SiteConfiguration>,
    backends: BackendHandle,
    cache: CachePort,
    offline: OfflineMode,
}

impl ReferencedSite {
    /// Creates a site. Backends are resolved through `resolver` on first use;
    /// `cache` is the binding the host binds the site's cache into.
    pub fn new(
        config: SiteConfiguration,
        resolver: Arc<dyn PluginResolver>,
        cache: CacheBinding,
        offline: OfflineMode,
    ) -> SiteResult<Self> {
        let config = Arc::new(config);
        let cache = CachePort::new(
            config.cache_strategy(),
            config.cache_id().map(str::to_string),
            cache,
        );
        tracing::info!(
            site = %config.id(),
            strategy = %config.cache_strategy(),
            mappings = config.field_mapper().mappings().len(),
            "referenced site created"
        );
        Ok(Self {
            backends: BackendHandle::new(Arc::clone(&config), resolver),
            config,
            cache,
            offline,
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        self.config.id()
    }

    #[must_use]
    pub fn configuration(&self) -> &SiteConfiguration {
        &self.config
    }

    /// Field mappings configured for this site.
    #[must_use]
    pub fn field_mapper(&self) -> &FieldMapper {
        self.config.field_mapper()
    }

    #[must_use]
    pub fn backends(&self) -> &BackendHandle {
        &self.backends
    }

    #[must_use]
    pub fn offline_mode(&self) -> &OfflineMode {
        &self.offline
    }

    /// The bound cache; `None` for strategy `none` or while unbound.
    #[must_use]
    pub fn cache(&self) -> Option<Arc<dyn Cache>> {
        self.cache.cache()
    }

    /// True if queries can be answered from the cache alone.
    #[must_use]
    pub fn supports_local_mode(&self) -> bool {
        self.config.cache_strategy() == CacheStrategy::All && self.cache.is_available()
    }

    /// True if queries can be answered now. Does not create backends.
    #[must_use]
    pub fn supports_search(&self) -> bool {
        self.supports_local_mode() || self.backends.current().searcher().is_some()
    }

    /// Resolves one entity by id. `Ok(None)` if neither the cache nor the
    /// remote site knows it.
    pub fn get_entity(&self, id: &str) -> SiteResult<Option<Entity>> {
        self.get_entity_with_cancel(id, &CancelToken::new())
    }

    pub fn get_entity_with_cancel(&self, id: &str, cancel: &CancelToken) -> SiteResult<Option<Entity>> {
        if let Some(rep) = self.read_cache(BackendRole::Dereferencer, || self.cache.try_get(id, cancel))? {
            return Ok(Some(Entity::new(self.id(), rep, Origin::Cache)));
        }

        let (dereferencer, uri) = self.remote_dereferencer()?;
        let rep = dereferencer
            .dereference(id, cancel)
            .map_err(|source| remote_error(uri, dereferencer.backend_type(), source))?;
        let Some(rep) = rep else {
            tracing::debug!(site = %self.id(), %id, "entity not found on remote site");
            return Ok(None);
        };
        let rep = self.write_back(rep, cancel);
        Ok(Some(Entity::new(self.id(), rep, Origin::Remote)))
    }

    /// Executes `query` and resolves every matching entity.
    ///
    /// On the remote path the searcher selects ids and each id is resolved
    /// with [`ReferencedSite::get_entity`]. Entities are scored by position.
    /// Ids that fail to resolve are dropped from the result unless all of
    /// them fail.
    pub fn find_entities(&self, query: &FieldQuery) -> SiteResult<QueryResultList<Entity>> {
        self.find_entities_with_cancel(query, &CancelToken::new())
    }

    pub fn find_entities_with_cancel(
        &self,
        query: &FieldQuery,
        cancel: &CancelToken,
    ) -> SiteResult<QueryResultList<Entity>> {
        if let Some(reps) = self.read_cache(BackendRole::Searcher, || self.cache.try_find(query, cancel))? {
            let mut batch = BatchAssembler::new(self.id(), reps.len());
            for rep in reps {
                batch.push_resolved(Entity::new(self.id(), rep, Origin::Cache));
            }
            return Ok(QueryResultList::new(query.clone(), batch.finish()?));
        }

        let (searcher, uri) = self.remote_searcher()?;
        let ids = searcher
            .find_entities(query, cancel)
            .map_err(|source| remote_error(uri, searcher.backend_type(), source))?;

        let mut batch = BatchAssembler::new(self.id(), ids.len());
        for id in &ids {
            match self.get_entity_with_cancel(id, cancel) {
                Ok(Some(entity)) => batch.push_resolved(entity),
                Ok(None) => batch.push_missing(id),
                Err(e) => batch.push_failure(id, e),
            }
        }
        Ok(QueryResultList::new(query.clone(), batch.finish()?))
    }

    /// Executes `query` and returns matching representations.
    pub fn find(&self, query: &FieldQuery) -> SiteResult<QueryResultList<Representation>> {
        self.find_with_cancel(query, &CancelToken::new())
    }

    pub fn find_with_cancel(
        &self,
        query: &FieldQuery,
        cancel: &CancelToken,
    ) -> SiteResult<QueryResultList<Representation>> {
        if let Some(reps) = self.read_cache(BackendRole::Searcher, || self.cache.try_find(query, cancel))? {
            return Ok(QueryResultList::new(query.clone(), reps));
        }

        let (searcher, uri) = self.remote_searcher()?;
        let reps = searcher
            .find(query, cancel)
            .map_err(|source| remote_error(uri, searcher.backend_type(), source))?;
        Ok(QueryResultList::new(query.clone(), reps))
    }

    /// Executes `query` and returns the ids of matching entities.
    pub fn find_references(&self, query: &FieldQuery) -> SiteResult<QueryResultList<String>> {
        self.find_references_with_cancel(query, &CancelToken::new())
    }

    pub fn find_references_with_cancel(
        &self,
        query: &FieldQuery,
        cancel: &CancelToken,
    ) -> SiteResult<QueryResultList<String>> {
        if let Some(ids) = self.read_cache(BackendRole::Searcher, || {
            self.cache.try_find_references(query, cancel)
        })? {
            return Ok(QueryResultList::new(query.clone(), ids));
        }

        let (searcher, uri) = self.remote_searcher()?;
        let ids = searcher
            .find_entities(query, cancel)
            .map_err(|source| remote_error(uri, searcher.backend_type(), source))?;
        Ok(QueryResultList::new(query.clone(), ids))
    }

    /// Loads the raw content of `id` in `content_type` from the remote site.
    /// Content is never cached.
    pub fn get_content(&self, id: &str, content_type: &str) -> SiteResult<Vec<u8>> {
        self.get_content_with_cancel(id, content_type, &CancelToken::new())
    }

    pub fn get_content_with_cancel(
        &self,
        id: &str,
        content_type: &str,
        cancel: &CancelToken,
    ) -> SiteResult<Vec<u8>> {
        let (dereferencer, uri) = self.remote_dereferencer()?;
        dereferencer
            .dereference_content(id, content_type, cancel)
            .map_err(|source| remote_error(uri, dereferencer.backend_type(), source))
    }

    /// Closes the backends and cancels pending factory subscriptions.
    /// Remote calls fail with `BackendUnavailable` afterwards.
    pub fn shutdown(&self) {
        self.backends.shutdown();
        tracing::info!(site = %self.id(), "referenced site shut down");
    }

    /// Runs a cache read for strategy `all`.
    ///
    /// `Ok(None)` means the caller continues on the remote path.
    fn read_cache<T>(
        &self,
        role: BackendRole,
        read: impl FnOnce() -> Result<CacheRead<T>, StoreError>,
    ) -> SiteResult<Option<T>> {
        if self.config.cache_strategy() != CacheStrategy::All {
            return Ok(None);
        }
        let start = Instant::now();
        match read() {
            Ok(CacheRead::Hit(value)) => {
                tracing::info!(site = %self.id(), %role, elapsed = ?start.elapsed(), "answered from cache");
                Ok(Some(value))
            }
            Ok(CacheRead::Miss) => {
                tracing::debug!(site = %self.id(), %role, "cache miss");
                Ok(None)
            }
            Ok(CacheRead::Unavailable) => {
                if !self.can_fall_back(role) {
                    return Err(SiteError::CacheUnavailable {
                        cache_id: self.cache_id(),
                    });
                }
                tracing::warn!(
                    site = %self.id(),
                    cache = %self.cache_id(),
                    uri = ?self.remote_uri(role),
                    "cache not available; using remote site"
                );
                Ok(None)
            }
            Err(source) => {
                if !self.can_fall_back(role) {
                    return Err(SiteError::Cache {
                        cache_id: self.cache_id(),
                        source,
                    });
                }
                tracing::warn!(
                    site = %self.id(),
                    cache = %self.cache_id(),
                    uri = ?self.remote_uri(role),
                    error = %source,
                    "cache failed; using remote site"
                );
                Ok(None)
            }
        }
    }

    /// Stores a remotely fetched representation and returns it as persisted.
    fn write_back(&self, rep: Representation, cancel: &CancelToken) -> Representation {
        if self.config.cache_strategy() == CacheStrategy::None {
            return rep;
        }
        let start = Instant::now();
        match self.cache.try_store(rep.clone(), cancel) {
            Ok(CacheRead::Hit(persisted)) => {
                tracing::info!(site = %self.id(), id = %persisted.id(), elapsed = ?start.elapsed(), "cached representation");
                persisted
            }
            Ok(CacheRead::Miss | CacheRead::Unavailable) => rep,
            Err(e) => {
                tracing::warn!(
                    site = %self.id(),
                    id = %rep.id(),
                    cache = %self.cache_id(),
                    error = %e,
                    "unable to cache representation"
                );
                rep
            }
        }
    }

    fn remote_dereferencer(&self) -> SiteResult<(Arc<dyn EntityDereferencer>, &str)> {
        let dereferencer = self
            .backends
            .dereferencer()
            .ok_or_else(|| self.backend_unavailable(BackendRole::Dereferencer))?;
        let uri = self.config.access_uri().unwrap_or_default();
        self.offline.ensure_online(uri, dereferencer.backend_type())?;
        Ok((dereferencer, uri))
    }

    fn remote_searcher(&self) -> SiteResult<(Arc<dyn EntitySearcher>, &str)> {
        let searcher = self
            .backends
            .searcher()
            .ok_or_else(|| self.backend_unavailable(BackendRole::Searcher))?;
        let uri = self.config.query_uri().unwrap_or_default();
        self.offline.ensure_online(uri, searcher.backend_type())?;
        Ok((searcher, uri))
    }

    fn can_fall_back(&self, role: BackendRole) -> bool {
        self.remote_selector(role).is_some() && !self.offline.is_offline()
    }

    fn remote_selector(&self, role: BackendRole) -> Option<&str> {
        match role {
            BackendRole::Dereferencer => self.config.dereferencer_type(),
            BackendRole::Searcher => self.config.searcher_type(),
        }
    }

    fn remote_uri(&self, role: BackendRole) -> Option<&str> {
        match role {
            BackendRole::Dereferencer => self.config.access_uri(),
            BackendRole::Searcher => self.config.query_uri(),
        }
    }

    fn backend_unavailable(&self, role: BackendRole) -> SiteError {
        SiteError::BackendUnavailable {
            role,
            selector: self.remote_selector(role).map(str::to_string),
            uri: self.remote_uri(role).map(str::to_string),
        }
    }

    fn cache_id(&self) -> String {
        self.config.cache_id().unwrap_or_default().to_string()
    }
}

fn remote_error(uri: &str, backend: &str, source: BackendError) -> SiteError {
    SiteError::RemoteCall {
        uri: uri.to_string(),
        backend: backend.to_string(),
        source,
    }
}

impl PartialEq for ReferencedSite {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for ReferencedSite {}

impl Hash for ReferencedSite {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Display for ReferencedSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config.name())
    }
}

impl fmt::Debug for ReferencedSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferencedSite")
            .field("id", &self.id())
            .field("strategy", &self.config.cache_strategy())
            .field("cache", &self.cache)
            .field("offline", &self.offline.is_offline())
            .finish_non_exhaustive()
    }
}
