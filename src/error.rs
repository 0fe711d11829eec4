//! Error types for kyrosite.
//!
//! All errors are strongly typed using thiserror. Each layer has its own
//! enum (configuration, cache store, remote backend) and `SiteError` is the
//! single type surfaced by `ReferencedSite` operations.

use thiserror::Error;

use crate::backend::BackendRole;

/// Validation errors raised while constructing a `SiteConfiguration`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Site id cannot be empty")]
    EmptySiteId,

    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },

    #[error("Cache strategy '{strategy}' requires a cache id")]
    MissingCacheId {
        strategy: String,
    },

    #[error("Cache id '{cache_id}' is configured but the cache strategy is 'none'")]
    UnexpectedCacheId {
        cache_id: String,
    },

    #[error("Unknown cache strategy '{value}' (expected none, used or all)")]
    UnknownCacheStrategy {
        value: String,
    },

    #[error("Invalid field mapping '{rule}': {reason}")]
    InvalidFieldMapping {
        rule: String,
        reason: String,
    },

    #[error("Unable to read configuration: {message}")]
    Unreadable {
        message: String,
    },
}

/// Errors reported by a cache store.
///
/// A missing entry is not an error: stores return `Ok(None)` for that.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be reached.
    #[error("Cache connection error: {0}")]
    ConnectionError(String),

    /// Backend error.
    #[error("Cache backend error: {0}")]
    BackendError(String),

    /// Serialization failed.
    #[error("Cache serialization error: {0}")]
    SerializationError(String),

    /// The caller cancelled the operation.
    #[error("Cache operation cancelled")]
    Cancelled,
}

/// Errors reported by remote backends and their factories.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport error: {message}")]
    Transport {
        message: String,
    },

    #[error("Remote site answered with status {status}: {message}")]
    Remote {
        status: u16,
        message: String,
    },

    #[error("Unable to create backend '{selector}': {reason}")]
    Creation {
        selector: String,
        reason: String,
    },

    #[error("Remote call cancelled")]
    Cancelled,
}

impl BackendError {
    /// Creates a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

/// Top-level error type for referenced-site operations.
#[derive(Debug, Error)]
pub enum SiteError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{role} {} not available for remote site {}", .selector.as_deref().unwrap_or("<none>"), .uri.as_deref().unwrap_or("<none>"))]
    BackendUnavailable {
        role: BackendRole,
        selector: Option<String>,
        uri: Option<String>,
    },

    #[error("Unable to access remote service {uri} by using {backend} because offline mode is active")]
    Offline {
        uri: String,
        backend: String,
    },

    #[error("Cache {cache_id} is currently not available")]
    CacheUnavailable {
        cache_id: String,
    },

    #[error("Cache {cache_id} failed: {source}")]
    Cache {
        cache_id: String,
        #[source]
        source: StoreError,
    },

    #[error("Remote call to {uri} with {backend} failed: {source}")]
    RemoteCall {
        uri: String,
        backend: String,
        #[source]
        source: BackendError,
    },

    #[error("Unable to resolve any of {total} entities ({failed} failed); last error: {last}")]
    AggregateBatch {
        failed: usize,
        total: usize,
        #[source]
        last: Box<SiteError>,
    },
}

impl SiteError {
    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if a required backend role is missing.
    #[must_use]
    pub const fn is_backend_unavailable(&self) -> bool {
        matches!(self, Self::BackendUnavailable { .. })
    }

    /// Returns true if the call was refused because of offline mode.
    #[must_use]
    pub const fn is_offline(&self) -> bool {
        matches!(self, Self::Offline { .. })
    }

    /// Returns true if the configured cache could not be used.
    #[must_use]
    pub const fn is_cache(&self) -> bool {
        matches!(self, Self::Cache { .. } | Self::CacheUnavailable { .. })
    }

    /// Returns true if the remote backend failed.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(self, Self::RemoteCall { .. })
    }

    /// Returns true if every item of a batch failed.
    #[must_use]
    pub const fn is_aggregate(&self) -> bool {
        matches!(self, Self::AggregateBatch { .. })
    }

    /// Returns true if this error may go away on retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Config(_) | Self::BackendUnavailable { .. } | Self::Offline { .. } => false,
            Self::CacheUnavailable { .. } => true,
            Self::Cache { source, .. } => matches!(source, StoreError::ConnectionError(_)),
            Self::RemoteCall { source, .. } => match source {
                BackendError::Io(_) | BackendError::Transport { .. } => true,
                BackendError::Remote { status, .. } => *status >= 500,
                BackendError::Creation { .. } | BackendError::Cancelled => false,
            },
            Self::AggregateBatch { last, .. } => last.is_retryable(),
        }
    }
}

/// Result type alias for referenced-site operations.
pub type SiteResult<T> = Result<T, SiteError>;
