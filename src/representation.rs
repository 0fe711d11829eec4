//! Entity representations.
//!
//! A `Representation` is the field → values description of one entity as
//! delivered by a cache store or a remote backend. The resolution layer only
//! passes representations around; it never edits them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Field → values description of one entity.
///
/// Fields keep their values in insertion order; field names are ordered so
/// that two representations with the same content compare and serialize
/// identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Representation {
    id: String,
    #[serde(default)]
    fields: BTreeMap<String, Vec<Value>>,
}

impl Representation {
    /// Creates an empty representation for the given entity id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style variant of [`Representation::add`].
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.add(field, value);
        self
    }

    /// The entity identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Appends a value to a field.
    pub fn add(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.entry(field.into()).or_default().push(value.into());
    }

    /// Replaces all values of a field.
    pub fn set(&mut self, field: impl Into<String>, values: Vec<Value>) {
        let field = field.into();
        if values.is_empty() {
            self.fields.remove(&field);
        } else {
            self.fields.insert(field, values);
        }
    }

    /// Removes a field, returning its values.
    pub fn remove(&mut self, field: &str) -> Option<Vec<Value>> {
        self.fields.remove(field)
    }

    /// All values of a field (empty if the field is absent).
    #[must_use]
    pub fn get(&self, field: &str) -> &[Value] {
        self.fields.get(field).map_or(&[], Vec::as_slice)
    }

    /// The first value of a field.
    #[must_use]
    pub fn first(&self, field: &str) -> Option<&Value> {
        self.get(field).first()
    }

    #[must_use]
    pub fn contains_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Iterates field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Iterates `(field, values)` pairs in field order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns a copy restricted to the fields accepted by `keep`.
    #[must_use]
    pub fn retain_fields(&self, mut keep: impl FnMut(&str) -> bool) -> Self {
        Self {
            id: self.id.clone(),
            fields: self
                .fields
                .iter()
                .filter(|(name, _)| keep(name))
                .map(|(name, values)| (name.clone(), values.clone()))
                .collect(),
        }
    }
}
