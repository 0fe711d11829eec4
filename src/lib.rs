//! # kyrosite - Referenced-site entity resolution
//!
//! kyrosite resolves entities against a remote knowledge source (a
//! "referenced site") with an optional local cache acting as a write-through
//! accelerator and offline fallback.
//!
//! ## Core Concepts
//!
//! - **ReferencedSite**: answers entity lookups and queries from cache or remote backends
//! - **CacheStrategy**: `none`, `used` (write-back only) or `all` (cache first)
//! - **OfflineMode**: shared gate that refuses every remote call while set
//! - **BackendHandle**: lazily creates exactly one dereferencer and one searcher per site
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use kyrosite::{
//!     CacheBinding, CacheStrategy, FieldQuery, InMemoryCache, OfflineMode, PluginRegistry,
//!     ReferencedSite, SiteConfiguration,
//! };
//!
//! let config = SiteConfiguration::builder("dbpedia")
//!     .access_uri("http://dbpedia.org/sparql")
//!     .query_uri("http://dbpedia.org/sparql")
//!     .dereferencer_type("sparql")
//!     .searcher_type("sparql")
//!     .cache("dbpediaCache", CacheStrategy::All)
//!     .build()?;
//!
//! let registry = Arc::new(PluginRegistry::new());
//! let cache = CacheBinding::bound(Arc::new(InMemoryCache::new("dbpediaCache")));
//! let site = ReferencedSite::new(config, registry, cache, OfflineMode::new())?;
//!
//! // Answered by the (empty) cache; the remote site is not contacted.
//! let results = site.find(&FieldQuery::new())?;
//! assert!(results.is_empty());
//! # Ok::<(), kyrosite::SiteError>(())
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Data model
pub mod config;
pub mod error;
pub mod mapping;
pub mod query;
pub mod representation;
pub mod value;

// Resolution
pub mod backend;
pub mod cache;
pub mod cancel;
pub mod offline;
pub mod result;
pub mod site;

// Re-export primary types at crate root for convenience
pub use backend::{
    BackendFactory, BackendHandle, BackendInstance, BackendRole, Backends, EntityDereferencer,
    EntitySearcher, PluginRegistry, PluginResolver, Resolution, RoleState, SiteBackend,
    SubscriptionId,
};
pub use cache::{Cache, CacheBinding, CachePort, CacheRead, InMemoryCache};
pub use cancel::CancelToken;
pub use config::{CacheStrategy, RawSiteConfiguration, SiteConfiguration, SiteConfigurationBuilder};
pub use error::{BackendError, ConfigError, SiteError, SiteResult, StoreError};
pub use mapping::{DataType, FieldMapper, FieldMapping};
pub use offline::OfflineMode;
pub use query::{Constraint, FieldQuery};
pub use representation::Representation;
pub use result::{BatchAssembler, Entity, Origin, QueryResultList};
pub use site::ReferencedSite;
pub use value::Value;
