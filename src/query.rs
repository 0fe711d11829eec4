//! Structured field queries.
//!
//! A `FieldQuery` is a conjunction of per-field constraints plus a field
//! selection and paging. Remote searchers translate it into their own query
//! language; in-process caches evaluate it with [`FieldQuery::matches`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::representation::Representation;
use crate::value::Value;

/// Constraint placed on the values of one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Constraint {
    /// Field has at least one value.
    Exists,

    /// Field has a value equal to `value`.
    Value {
        value: Value,
    },

    /// Field has a text value containing `text`.
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
        #[serde(default)]
        case_sensitive: bool,
    },

    /// Field references the entity `uri`.
    Reference {
        uri: String,
    },

    /// Field has a numeric value inside the range.
    Range {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lower: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        upper: Option<f64>,
        #[serde(default = "default_inclusive")]
        inclusive: bool,
    },
}

const fn default_inclusive() -> bool {
    true
}

impl Constraint {
    /// Text constraint, case-insensitive and without language restriction.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            language: None,
            case_sensitive: false,
        }
    }

    /// Equality constraint.
    #[must_use]
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value {
            value: value.into(),
        }
    }

    /// Reference constraint.
    #[must_use]
    pub fn reference(uri: impl Into<String>) -> Self {
        Self::Reference { uri: uri.into() }
    }

    /// Returns true if any of `values` satisfies the constraint.
    #[must_use]
    pub fn is_satisfied_by(&self, values: &[Value]) -> bool {
        match self {
            Self::Exists => !values.is_empty(),
            Self::Value { value } => values.iter().any(|v| v == value),
            Self::Reference { uri } => values
                .iter()
                .any(|v| matches!(v, Value::Uri(u) if u == uri)),
            Self::Text {
                text,
                language,
                case_sensitive,
            } => values.iter().any(|v| {
                let Some(lexical) = v.as_str() else {
                    return false;
                };
                if v.is_uri() {
                    return false;
                }
                if let Some(lang) = language {
                    if v.language() != Some(lang.as_str()) {
                        return false;
                    }
                }
                if *case_sensitive {
                    lexical.contains(text.as_str())
                } else {
                    lexical.to_lowercase().contains(&text.to_lowercase())
                }
            }),
            Self::Range {
                lower,
                upper,
                inclusive,
            } => values.iter().filter_map(Value::as_float).any(|n| {
                let above = lower.map_or(true, |l| if *inclusive { n >= l } else { n > l });
                let below = upper.map_or(true, |u| if *inclusive { n <= u } else { n < u });
                above && below
            }),
        }
    }
}

/// Conjunctive query over representation fields.
///
/// # Example
/// ```
/// use kyrosite::{Constraint, FieldQuery};
///
/// let query = FieldQuery::new()
///     .constrain("rdfs:label", Constraint::text("paris"))
///     .select("rdfs:label")
///     .limit(10);
/// assert_eq!(query.limit_value(), Some(10));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldQuery {
    #[serde(default)]
    constraints: BTreeMap<String, Constraint>,
    #[serde(default)]
    selected: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    limit: Option<usize>,
    #[serde(default)]
    offset: usize,
}

impl FieldQuery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the constraint for `field`.
    #[must_use]
    pub fn constrain(mut self, field: impl Into<String>, constraint: Constraint) -> Self {
        self.constraints.insert(field.into(), constraint);
        self
    }

    /// Adds a field to the selection. An empty selection returns all fields.
    #[must_use]
    pub fn select(mut self, field: impl Into<String>) -> Self {
        let field = field.into();
        if !self.selected.contains(&field) {
            self.selected.push(field);
        }
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn constraints(&self) -> impl Iterator<Item = (&str, &Constraint)> {
        self.constraints.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    #[must_use]
    pub const fn limit_value(&self) -> Option<usize> {
        self.limit
    }

    #[must_use]
    pub const fn offset_value(&self) -> usize {
        self.offset
    }

    /// Returns true if `rep` satisfies every constraint.
    #[must_use]
    pub fn matches(&self, rep: &Representation) -> bool {
        self.constraints
            .iter()
            .all(|(field, constraint)| constraint.is_satisfied_by(rep.get(field)))
    }

    /// Applies the field selection to `rep`.
    #[must_use]
    pub fn project(&self, rep: &Representation) -> Representation {
        if self.selected.is_empty() {
            return rep.clone();
        }
        rep.retain_fields(|f| self.selected.iter().any(|s| s == f))
    }

    /// Applies offset and limit to an ordered result sequence.
    pub fn page<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        let iter = items.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paris() -> Representation {
        Representation::new("http://dbpedia.org/resource/Paris")
            .with("rdfs:label", Value::text("Paris", Some("en")))
            .with("dbp-prop:population", 2_102_650i64)
            .with("dbp-ont:country", Value::uri("http://dbpedia.org/resource/France"))
    }

    #[test]
    fn test_text_constraint_case_insensitive() {
        let q = FieldQuery::new().constrain("rdfs:label", Constraint::text("PAR"));
        assert!(q.matches(&paris()));
    }

    #[test]
    fn test_text_constraint_language() {
        let q = FieldQuery::new().constrain(
            "rdfs:label",
            Constraint::Text {
                text: "Paris".to_string(),
                language: Some("fr".to_string()),
                case_sensitive: true,
            },
        );
        assert!(!q.matches(&paris()));
    }

    #[test]
    fn test_reference_and_range() {
        let q = FieldQuery::new()
            .constrain(
                "dbp-ont:country",
                Constraint::reference("http://dbpedia.org/resource/France"),
            )
            .constrain(
                "dbp-prop:population",
                Constraint::Range {
                    lower: Some(1_000_000.0),
                    upper: None,
                    inclusive: true,
                },
            );
        assert!(q.matches(&paris()));

        let q = q.constrain(
            "dbp-prop:population",
            Constraint::Range {
                lower: None,
                upper: Some(2_102_650.0),
                inclusive: false,
            },
        );
        assert!(!q.matches(&paris()));
    }

    #[test]
    fn test_exists_on_missing_field() {
        let q = FieldQuery::new().constrain("foaf:depiction", Constraint::Exists);
        assert!(!q.matches(&paris()));
    }

    #[test]
    fn test_project_and_page() {
        let q = FieldQuery::new().select("rdfs:label").offset(1).limit(2);
        let projected = q.project(&paris());
        assert_eq!(projected.field_names().collect::<Vec<_>>(), vec!["rdfs:label"]);
        assert_eq!(q.page(vec![1, 2, 3, 4]), vec![2, 3]);
    }

    #[test]
    fn test_query_deserialize() {
        let q: FieldQuery = serde_json::from_value(serde_json::json!({
            "constraints": {
                "rdfs:label": {"type": "text", "text": "paris"},
                "dbp-prop:population": {"type": "range", "lower": 10.0}
            },
            "limit": 5
        }))
        .unwrap();
        assert_eq!(q.limit_value(), Some(5));
        assert!(q.matches(&paris()));
    }
}
