//! Abstract backend traits.
//!
//! Remote sites are accessed through two capabilities: an
//! `EntityDereferencer` fetches one entity by id, an `EntitySearcher`
//! executes structured queries. Implementations are specific to the protocol
//! of the remote site and are created by a `BackendFactory` resolved by type
//! selector.

use std::fmt;
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::config::SiteConfiguration;
use crate::error::BackendError;
use crate::query::FieldQuery;
use crate::representation::Representation;

/// The two roles a backend instance can serve for a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendRole {
    Dereferencer,
    Searcher,
}

impl fmt::Display for BackendRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dereferencer => write!(f, "dereferencer"),
            Self::Searcher => write!(f, "searcher"),
        }
    }
}

/// Fetches single entities from a remote site.
///
/// Transport failures are reported as `BackendError`; an entity unknown to
/// the remote site is `Ok(None)`.
pub trait EntityDereferencer: Send + Sync {
    /// Loads the representation of `id`.
    fn dereference(&self, id: &str, cancel: &CancelToken)
        -> Result<Option<Representation>, BackendError>;

    /// Loads the raw content of `id` in the requested media type.
    fn dereference_content(
        &self,
        id: &str,
        content_type: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, BackendError>;

    /// Short implementation name used in logs and errors.
    fn backend_type(&self) -> &str;

    /// Releases resources when the owning site shuts down.
    fn close(&self) {}
}

/// Executes structured queries against a remote site.
pub trait EntitySearcher: Send + Sync {
    /// Returns matching representations.
    fn find(&self, query: &FieldQuery, cancel: &CancelToken)
        -> Result<Vec<Representation>, BackendError>;

    /// Returns the ids of matching entities, in ranking order.
    fn find_entities(&self, query: &FieldQuery, cancel: &CancelToken)
        -> Result<Vec<String>, BackendError>;

    /// Short implementation name used in logs and errors.
    fn backend_type(&self) -> &str;

    /// Releases resources when the owning site shuts down.
    fn close(&self) {}
}

/// A backend implementing both roles with one instance.
///
/// Blanket-implemented for every type that implements both traits; the
/// conversions hand out role views of the same allocation.
pub trait SiteBackend: EntityDereferencer + EntitySearcher {
    /// View this instance as a dereferencer.
    fn into_dereferencer(self: Arc<Self>) -> Arc<dyn EntityDereferencer>;

    /// View this instance as a searcher.
    fn into_searcher(self: Arc<Self>) -> Arc<dyn EntitySearcher>;
}

impl<T> SiteBackend for T
where
    T: EntityDereferencer + EntitySearcher + 'static,
{
    fn into_dereferencer(self: Arc<Self>) -> Arc<dyn EntityDereferencer> {
        self
    }

    fn into_searcher(self: Arc<Self>) -> Arc<dyn EntitySearcher> {
        self
    }
}

/// What a factory produced, tagged by the capabilities it offers.
#[derive(Clone)]
pub enum BackendInstance {
    Dereferencer(Arc<dyn EntityDereferencer>),
    Searcher(Arc<dyn EntitySearcher>),
    Both(Arc<dyn SiteBackend>),
}

impl BackendInstance {
    /// The instance in its dereferencer role, if it has one.
    #[must_use]
    pub fn dereferencer(&self) -> Option<Arc<dyn EntityDereferencer>> {
        match self {
            Self::Dereferencer(d) => Some(Arc::clone(d)),
            Self::Both(b) => Some(Arc::clone(b).into_dereferencer()),
            Self::Searcher(_) => None,
        }
    }

    /// The instance in its searcher role, if it has one.
    #[must_use]
    pub fn searcher(&self) -> Option<Arc<dyn EntitySearcher>> {
        match self {
            Self::Searcher(s) => Some(Arc::clone(s)),
            Self::Both(b) => Some(Arc::clone(b).into_searcher()),
            Self::Dereferencer(_) => None,
        }
    }

    #[must_use]
    pub fn supports(&self, role: BackendRole) -> bool {
        match role {
            BackendRole::Dereferencer => !matches!(self, Self::Searcher(_)),
            BackendRole::Searcher => !matches!(self, Self::Dereferencer(_)),
        }
    }

    /// Closes the instance once, whichever roles it serves.
    pub fn close(&self) {
        match self {
            Self::Dereferencer(d) => d.close(),
            Self::Searcher(s) => s.close(),
            Self::Both(b) => EntityDereferencer::close(&**b),
        }
    }
}

impl fmt::Debug for BackendInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dereferencer(d) => f.debug_tuple("Dereferencer").field(&d.backend_type()).finish(),
            Self::Searcher(s) => f.debug_tuple("Searcher").field(&s.backend_type()).finish(),
            Self::Both(b) => f
                .debug_tuple("Both")
                .field(&EntityDereferencer::backend_type(&**b))
                .finish(),
        }
    }
}

/// Creates backend instances for a site.
pub trait BackendFactory: Send + Sync {
    /// Creates a new instance configured for `config`.
    fn create(&self, config: &SiteConfiguration) -> Result<BackendInstance, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dual;

    impl EntityDereferencer for Dual {
        fn dereference(&self, id: &str, _: &CancelToken) -> Result<Option<Representation>, BackendError> {
            Ok(Some(Representation::new(id)))
        }

        fn dereference_content(&self, _: &str, _: &str, _: &CancelToken) -> Result<Vec<u8>, BackendError> {
            Ok(Vec::new())
        }

        fn backend_type(&self) -> &str {
            "dual"
        }
    }

    impl EntitySearcher for Dual {
        fn find(&self, _: &FieldQuery, _: &CancelToken) -> Result<Vec<Representation>, BackendError> {
            Ok(Vec::new())
        }

        fn find_entities(&self, _: &FieldQuery, _: &CancelToken) -> Result<Vec<String>, BackendError> {
            Ok(vec!["a".to_string()])
        }

        fn backend_type(&self) -> &str {
            "dual"
        }
    }

    // Compile-time test: ensure traits are object-safe
    fn _assert_dereferencer_object_safe(_: &dyn EntityDereferencer) {}
    fn _assert_searcher_object_safe(_: &dyn EntitySearcher) {}
    fn _assert_site_backend_object_safe(_: &dyn SiteBackend) {}
    fn _assert_factory_object_safe(_: &dyn BackendFactory) {}

    #[test]
    fn test_both_roles_share_allocation() {
        let instance = BackendInstance::Both(Arc::new(Dual));
        let d = instance.dereferencer().unwrap();
        let s = instance.searcher().unwrap();
        assert_eq!(Arc::as_ptr(&d).cast::<()>(), Arc::as_ptr(&s).cast::<()>());
        assert!(instance.supports(BackendRole::Dereferencer));
        assert!(instance.supports(BackendRole::Searcher));
    }

    #[test]
    fn test_single_role_instance() {
        let instance = BackendInstance::Dereferencer(Arc::new(Dual));
        assert!(instance.dereferencer().is_some());
        assert!(instance.searcher().is_none());
        assert!(!instance.supports(BackendRole::Searcher));
        assert_eq!(format!("{instance:?}"), "Dereferencer(\"dual\")");
    }

    #[test]
    fn test_role_display() {
        assert_eq!(BackendRole::Dereferencer.to_string(), "dereferencer");
        assert_eq!(BackendRole::Searcher.to_string(), "searcher");
    }
}
