//! Result values returned by a referenced site.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SiteError, SiteResult};
use crate::query::FieldQuery;
use crate::representation::Representation;

/// Where an entity's representation was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Cache,
    Remote,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => write!(f, "cache"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// A representation resolved by a referenced site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Id of the site that resolved the entity.
    pub site: String,

    pub representation: Representation,

    /// Positional rank within a query result; `None` outside of queries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,

    pub retrieved_at: DateTime<Utc>,

    pub origin: Origin,
}

impl Entity {
    #[must_use]
    pub fn new(site: impl Into<String>, representation: Representation, origin: Origin) -> Self {
        Self {
            site: site.into(),
            representation,
            score: None,
            retrieved_at: Utc::now(),
            origin,
        }
    }

    #[must_use]
    pub const fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }

    /// Id of the entity.
    #[must_use]
    pub fn id(&self) -> &str {
        self.representation.id()
    }
}

/// Ordered results of a query together with the query that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResultList<T> {
    query: FieldQuery,
    results: Vec<T>,
}

impl<T> QueryResultList<T> {
    #[must_use]
    pub fn new(query: FieldQuery, results: Vec<T>) -> Self {
        Self { query, results }
    }

    #[must_use]
    pub fn query(&self) -> &FieldQuery {
        &self.query
    }

    #[must_use]
    pub fn results(&self) -> &[T] {
        &self.results
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.results.iter()
    }

    #[must_use]
    pub fn into_results(self) -> Vec<T> {
        self.results
    }
}

impl<T> IntoIterator for QueryResultList<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a QueryResultList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

/// Collects the per-id outcomes of a batch resolution.
///
/// Outcomes must be pushed in query order. Every position consumes one rank,
/// so the entity at position `p` of `total` ids scores `total - p` whether or
/// not its neighbours resolved.
#[derive(Debug)]
pub struct BatchAssembler {
    site: String,
    total: usize,
    position: usize,
    entities: Vec<Entity>,
    failed: usize,
    last_error: Option<SiteError>,
}

impl BatchAssembler {
    #[must_use]
    pub fn new(site: impl Into<String>, total: usize) -> Self {
        Self {
            site: site.into(),
            total,
            position: 0,
            entities: Vec::with_capacity(total),
            failed: 0,
            last_error: None,
        }
    }

    /// Records a resolved entity at the next position.
    pub fn push_resolved(&mut self, entity: Entity) {
        #[allow(clippy::cast_precision_loss)]
        let score = self.total.saturating_sub(self.position) as f32;
        self.entities.push(entity.with_score(score));
        self.position += 1;
    }

    /// Records an id neither the cache nor the remote site knows.
    pub fn push_missing(&mut self, id: &str) {
        tracing::warn!(site = %self.site, %id, "no entity found for id selected by query");
        self.position += 1;
    }

    /// Records an id whose resolution failed.
    pub fn push_failure(&mut self, id: &str, error: SiteError) {
        self.failed += 1;
        tracing::warn!(
            site = %self.site,
            %id,
            failed = self.failed,
            total = self.total,
            error = %error,
            "unable to resolve entity selected by query"
        );
        self.last_error = Some(error);
        self.position += 1;
    }

    /// Number of failures recorded so far.
    #[must_use]
    pub const fn failed(&self) -> usize {
        self.failed
    }

    /// Returns the resolved entities, or `AggregateBatch` if there were
    /// failures and nothing resolved.
    pub fn finish(self) -> SiteResult<Vec<Entity>> {
        let Some(last) = self.last_error else {
            return Ok(self.entities);
        };
        if self.entities.is_empty() {
            return Err(SiteError::AggregateBatch {
                failed: self.failed,
                total: self.total,
                last: Box::new(last),
            });
        }
        tracing::warn!(
            site = %self.site,
            failed = self.failed,
            total = self.total,
            last_error = %last,
            "query result is missing entities that could not be resolved"
        );
        Ok(self.entities)
    }
}
