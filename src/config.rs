//! Site configuration.
//!
//! A `SiteConfiguration` is validated once at construction and immutable
//! afterwards. It can be assembled with [`SiteConfigurationBuilder`] or loaded
//! from JSON (object, string or file) via serde.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::mapping::FieldMapper;

/// Policy controlling whether and when the local cache is consulted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStrategy {
    /// Never touch the cache.
    #[default]
    None,
    /// Populate the cache with remotely fetched entities, but never read it first.
    Used,
    /// The cache is the primary read path; the remote site is the fallback.
    All,
}

impl CacheStrategy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Used => "used",
            Self::All => "all",
        }
    }
}

impl fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "used" => Ok(Self::Used),
            "all" => Ok(Self::All),
            other => Err(ConfigError::UnknownCacheStrategy {
                value: other.to_string(),
            }),
        }
    }
}

/// Raw, unvalidated configuration as it appears in a config source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawSiteConfiguration {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub access_uri: Option<String>,
    pub query_uri: Option<String>,
    pub dereferencer_type: Option<String>,
    pub searcher_type: Option<String>,
    pub cache_strategy: CacheStrategy,
    pub cache_id: Option<String>,
    pub field_mappings: Vec<String>,
}

/// Validated, immutable configuration of one referenced site.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteConfiguration {
    id: String,
    name: String,
    description: Option<String>,
    access_uri: Option<String>,
    query_uri: Option<String>,
    dereferencer_type: Option<String>,
    searcher_type: Option<String>,
    cache_strategy: CacheStrategy,
    cache_id: Option<String>,
    field_mappings: Vec<String>,
    #[serde(skip)]
    field_mapper: FieldMapper,
}

/// Blank strings mean "not configured".
fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl SiteConfiguration {
    /// Validates a raw configuration.
    ///
    /// # Errors
    /// - `EmptySiteId` if the id is blank
    /// - `MissingCacheId` / `UnexpectedCacheId` if the cache id does not agree
    ///   with the cache strategy
    /// - `MissingField` if a backend type is configured without its URI
    /// - `InvalidFieldMapping` if a mapping rule does not parse
    pub fn new(raw: RawSiteConfiguration) -> Result<Self, ConfigError> {
        let id = raw.id.trim().to_string();
        if id.is_empty() {
            return Err(ConfigError::EmptySiteId);
        }

        let access_uri = normalize(raw.access_uri);
        let query_uri = normalize(raw.query_uri);
        let dereferencer_type = normalize(raw.dereferencer_type);
        let searcher_type = normalize(raw.searcher_type);
        let cache_id = normalize(raw.cache_id);

        match (raw.cache_strategy, &cache_id) {
            (CacheStrategy::None, Some(cache_id)) => {
                return Err(ConfigError::UnexpectedCacheId {
                    cache_id: cache_id.clone(),
                });
            }
            (strategy @ (CacheStrategy::Used | CacheStrategy::All), None) => {
                return Err(ConfigError::MissingCacheId {
                    strategy: strategy.to_string(),
                });
            }
            _ => {}
        }

        if dereferencer_type.is_some() && access_uri.is_none() {
            return Err(ConfigError::MissingField {
                field: "access_uri".to_string(),
            });
        }
        if searcher_type.is_some() && query_uri.is_none() {
            return Err(ConfigError::MissingField {
                field: "query_uri".to_string(),
            });
        }

        let field_mappings: Vec<String> = raw
            .field_mappings
            .into_iter()
            .map(|rule| rule.trim().to_string())
            .filter(|rule| !rule.is_empty())
            .collect();
        // Fail at construction rather than on first use.
        let field_mapper = FieldMapper::from_rules(field_mappings.as_slice())?;

        Ok(Self {
            name: normalize(raw.name).unwrap_or_else(|| id.clone()),
            id,
            description: normalize(raw.description),
            access_uri,
            query_uri,
            dereferencer_type,
            searcher_type,
            cache_strategy: raw.cache_strategy,
            cache_id,
            field_mappings,
            field_mapper,
        })
    }

    /// Starts a builder for the site `id`.
    pub fn builder(id: impl Into<String>) -> SiteConfigurationBuilder {
        SiteConfigurationBuilder::new(id)
    }

    /// Parses and validates a JSON object.
    pub fn from_json(value: serde_json::Value) -> Result<Self, ConfigError> {
        let raw: RawSiteConfiguration =
            serde_json::from_value(value).map_err(|e| ConfigError::Unreadable {
                message: e.to_string(),
            })?;
        Self::new(raw)
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let raw: RawSiteConfiguration =
            serde_json::from_str(json).map_err(|e| ConfigError::Unreadable {
                message: e.to_string(),
            })?;
        Self::new(raw)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            message: format!("{}: {e}", path.display()),
        })?;
        Self::from_json_str(&json)
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// URI used to dereference entities and fetch content.
    #[must_use]
    pub fn access_uri(&self) -> Option<&str> {
        self.access_uri.as_deref()
    }

    /// URI used to execute queries.
    #[must_use]
    pub fn query_uri(&self) -> Option<&str> {
        self.query_uri.as_deref()
    }

    #[must_use]
    pub fn dereferencer_type(&self) -> Option<&str> {
        self.dereferencer_type.as_deref()
    }

    #[must_use]
    pub fn searcher_type(&self) -> Option<&str> {
        self.searcher_type.as_deref()
    }

    #[must_use]
    pub const fn cache_strategy(&self) -> CacheStrategy {
        self.cache_strategy
    }

    #[must_use]
    pub fn cache_id(&self) -> Option<&str> {
        self.cache_id.as_deref()
    }

    #[must_use]
    pub fn field_mappings(&self) -> &[String] {
        &self.field_mappings
    }

    /// The mapper parsed from `field_mappings`.
    #[must_use]
    pub fn field_mapper(&self) -> &FieldMapper {
        &self.field_mapper
    }

    /// True if one backend instance can serve both the dereferencer and the
    /// searcher role: same URI and same type selector.
    #[must_use]
    pub fn shares_backend(&self) -> bool {
        self.access_uri.is_some()
            && self.access_uri == self.query_uri
            && self.dereferencer_type.is_some()
            && self.dereferencer_type == self.searcher_type
    }
}

/// Builder for `SiteConfiguration`.
///
/// # Example
/// ```
/// use kyrosite::{CacheStrategy, SiteConfiguration};
///
/// let config = SiteConfiguration::builder("dbpedia")
///     .access_uri("http://dbpedia.org/sparql")
///     .query_uri("http://dbpedia.org/sparql")
///     .dereferencer_type("sparql")
///     .searcher_type("sparql")
///     .cache("dbpediaCache", CacheStrategy::All)
///     .build()
///     .unwrap();
/// assert!(config.shares_backend());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SiteConfigurationBuilder {
    raw: RawSiteConfiguration,
}

impl SiteConfigurationBuilder {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            raw: RawSiteConfiguration {
                id: id.into(),
                ..RawSiteConfiguration::default()
            },
        }
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.raw.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.raw.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn access_uri(mut self, uri: impl Into<String>) -> Self {
        self.raw.access_uri = Some(uri.into());
        self
    }

    #[must_use]
    pub fn query_uri(mut self, uri: impl Into<String>) -> Self {
        self.raw.query_uri = Some(uri.into());
        self
    }

    #[must_use]
    pub fn dereferencer_type(mut self, selector: impl Into<String>) -> Self {
        self.raw.dereferencer_type = Some(selector.into());
        self
    }

    #[must_use]
    pub fn searcher_type(mut self, selector: impl Into<String>) -> Self {
        self.raw.searcher_type = Some(selector.into());
        self
    }

    /// Sets the cache id together with the strategy it is used with.
    #[must_use]
    pub fn cache(mut self, cache_id: impl Into<String>, strategy: CacheStrategy) -> Self {
        self.raw.cache_id = Some(cache_id.into());
        self.raw.cache_strategy = strategy;
        self
    }

    #[must_use]
    pub fn cache_strategy(mut self, strategy: CacheStrategy) -> Self {
        self.raw.cache_strategy = strategy;
        self
    }

    #[must_use]
    pub fn field_mapping(mut self, rule: impl Into<String>) -> Self {
        self.raw.field_mappings.push(rule.into());
        self
    }

    /// Validates and builds the configuration.
    pub fn build(self) -> Result<SiteConfiguration, ConfigError> {
        SiteConfiguration::new(self.raw)
    }
}
