//! Value types a representation field can hold.
//!
//! Values mirror the literal kinds found in linked-data sources: plain
//! strings, language-tagged text, numbers, booleans and references (URIs)
//! to other entities.

use serde::{Deserialize, Serialize};

/// Possible values of a representation field.
///
/// # Examples
///
/// ```
/// use kyrosite::Value;
///
/// let label = Value::text("Paris", Some("en"));
/// let population = Value::Int(2_102_650);
/// let link = Value::uri("http://dbpedia.org/resource/France");
///
/// assert_eq!(label.as_str(), Some("Paris"));
/// assert_eq!(population.as_float(), Some(2_102_650.0));
/// assert!(link.is_uri());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    String(String),
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
    },
    Int(i64),
    Float(f64),
    Bool(bool),
    Uri(String),
}

impl Value {
    /// Creates a natural-language text value.
    #[must_use]
    pub fn text(text: impl Into<String>, language: Option<&str>) -> Self {
        Self::Text {
            text: text.into(),
            language: language.map(str::to_string),
        }
    }

    /// Creates a reference to another entity.
    #[must_use]
    pub fn uri(uri: impl Into<String>) -> Self {
        Self::Uri(uri.into())
    }

    pub const fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    pub const fn is_text(&self) -> bool {
        matches!(self, Self::Text { .. })
    }

    pub const fn is_int(&self) -> bool {
        matches!(self, Self::Int(_))
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float(_))
    }

    pub const fn is_bool(&self) -> bool {
        matches!(self, Self::Bool(_))
    }

    pub const fn is_uri(&self) -> bool {
        matches!(self, Self::Uri(_))
    }

    /// Lexical form of string-like values (string, text and URI).
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) | Self::Uri(v) => Some(v),
            Self::Text { text, .. } => Some(text),
            _ => None,
        }
    }

    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Language tag of a text value.
    pub fn language(&self) -> Option<&str> {
        match self {
            Self::Text { language, .. } => language.as_deref(),
            _ => None,
        }
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Text { .. } => "text",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::Uri(_) => "uri",
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(v) => write!(f, "{v:?}"),
            Self::Text {
                text,
                language: Some(lang),
            } => write!(f, "{text:?}@{lang}"),
            Self::Text { text, language: None } => write!(f, "{text:?}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Uri(v) => write!(f, "<{v}>"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}
