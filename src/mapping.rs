//! Field mapping rules.
//!
//! Sites describe how fields of the remote vocabulary are carried into the
//! local schema with one rule per line:
//!
//! ```text
//! dbp-ont:*                                         copy every dbp-ont field
//! dbp-ont:thumbnail | d=xsd:anyURI > foaf:depiction  copy URIs to another field
//! dbp-prop:population | d=xsd:integer               keep/convert integers only
//! rdfs:label | @=en,de                              keep English and German labels
//! -dbp-prop:wikiPageUsesTemplate                     never copy this field
//! ```
//!
//! The mapper is a pure function over representations; the resolution engine
//! only builds it from configuration and exposes it to callers.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::ConfigError;
use crate::representation::Representation;
use crate::value::Value;

fn rule_regex() -> &'static Regex {
    static RULE: OnceLock<Regex> = OnceLock::new();
    RULE.get_or_init(|| {
        Regex::new(r"^\s*(-)?\s*([^\s|>]+)\s*(?:\|([^>]*))?(?:>\s*(\S+))?\s*$")
            .unwrap_or_else(|e| unreachable!("static field mapping regex is valid: {e}"))
    })
}

/// Target datatype of a `d=` filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    String,
    Text,
    Uri,
    Integer,
    Decimal,
    Boolean,
}

impl DataType {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "xsd:string" => Some(Self::String),
            "rdf:PlainLiteral" | "rdf:langString" => Some(Self::Text),
            "xsd:anyURI" => Some(Self::Uri),
            "xsd:integer" | "xsd:int" | "xsd:long" => Some(Self::Integer),
            "xsd:decimal" | "xsd:double" | "xsd:float" => Some(Self::Decimal),
            "xsd:boolean" => Some(Self::Boolean),
            _ => None,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::String => "xsd:string",
            Self::Text => "rdf:PlainLiteral",
            Self::Uri => "xsd:anyURI",
            Self::Integer => "xsd:integer",
            Self::Decimal => "xsd:decimal",
            Self::Boolean => "xsd:boolean",
        }
    }

    /// Converts `value` into this datatype, if it has a sensible lexical form.
    fn convert(self, value: &Value) -> Option<Value> {
        match (self, value) {
            (Self::String, Value::String(_)) | (Self::Text, Value::Text { .. }) => {
                Some(value.clone())
            }
            (Self::String, Value::Text { text, .. }) => Some(Value::String(text.clone())),
            (Self::Text, Value::String(s)) => Some(Value::text(s.clone(), None)),
            (Self::Uri, Value::Uri(_)) => Some(value.clone()),
            (Self::Uri, Value::String(s)) if s.contains(':') => Some(Value::Uri(s.clone())),
            (Self::Integer, Value::Int(_)) => Some(value.clone()),
            (Self::Integer, Value::String(s)) => s.trim().parse().ok().map(Value::Int),
            (Self::Decimal, Value::Float(_)) => Some(value.clone()),
            (Self::Decimal, Value::Int(_)) => value.as_float().map(Value::Float),
            (Self::Decimal, Value::String(s)) => s.trim().parse().ok().map(Value::Float),
            (Self::Boolean, Value::Bool(_)) => Some(value.clone()),
            (Self::Boolean, Value::String(s)) => s.trim().parse().ok().map(Value::Bool),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
enum FieldPattern {
    Exact(String),
    Wildcard { pattern: String, regex: Regex },
}

impl FieldPattern {
    fn parse(raw: &str) -> Result<Self, String> {
        if !raw.contains('*') {
            return Ok(Self::Exact(raw.to_string()));
        }
        let body = raw
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^{body}$")).map_err(|e| e.to_string())?;
        Ok(Self::Wildcard {
            pattern: raw.to_string(),
            regex,
        })
    }

    fn matches(&self, field: &str) -> bool {
        match self {
            Self::Exact(name) => name == field,
            Self::Wildcard { regex, .. } => regex.is_match(field),
        }
    }

    fn as_str(&self) -> &str {
        match self {
            Self::Exact(name) => name,
            Self::Wildcard { pattern, .. } => pattern,
        }
    }
}

// The regex is derived from the pattern text.
impl PartialEq for FieldPattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

/// One parsed mapping rule.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMapping {
    source: FieldPattern,
    target: Option<String>,
    data_types: Vec<DataType>,
    languages: Vec<String>,
    exclude: bool,
}

impl FieldMapping {
    /// Parses a rule in the `[-]source [| filters] [> target]` syntax.
    pub fn parse(rule: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidFieldMapping {
            rule: rule.to_string(),
            reason: reason.to_string(),
        };

        let caps = rule_regex()
            .captures(rule)
            .ok_or_else(|| invalid("expected '[-]field [| filters] [> target]'"))?;

        let exclude = caps.get(1).is_some();
        let source = FieldPattern::parse(&caps[2]).map_err(|e| invalid(&e))?;
        let target = caps.get(4).map(|m| m.as_str().to_string());

        if exclude && target.is_some() {
            return Err(invalid("exclusions cannot have a target field"));
        }
        if matches!(source, FieldPattern::Wildcard { .. }) && target.is_some() {
            return Err(invalid("wildcard fields cannot have a target field"));
        }

        let mut data_types = Vec::new();
        let mut languages = Vec::new();
        if let Some(filters) = caps.get(3) {
            for token in filters.as_str().split_whitespace() {
                if let Some(list) = token.strip_prefix("d=") {
                    for name in list.split(',').filter(|s| !s.is_empty()) {
                        let dt = DataType::parse(name)
                            .ok_or_else(|| invalid(&format!("unknown datatype '{name}'")))?;
                        data_types.push(dt);
                    }
                } else if let Some(list) = token.strip_prefix("@=") {
                    languages.extend(
                        list.split(',')
                            .filter(|s| !s.is_empty())
                            .map(str::to_string),
                    );
                } else {
                    return Err(invalid(&format!("unknown filter '{token}'")));
                }
            }
        }

        Ok(Self {
            source,
            target,
            data_types,
            languages,
            exclude,
        })
    }

    #[must_use]
    pub fn is_exclusion(&self) -> bool {
        self.exclude
    }

    #[must_use]
    pub fn source(&self) -> &str {
        self.source.as_str()
    }

    #[must_use]
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    fn applies_to(&self, field: &str) -> bool {
        self.source.matches(field)
    }

    fn filter_values(&self, values: &[Value]) -> Vec<Value> {
        values
            .iter()
            .filter(|v| {
                self.languages.is_empty()
                    || v.language().is_some_and(|l| self.languages.iter().any(|x| x == l))
            })
            .filter_map(|v| {
                if self.data_types.is_empty() {
                    Some(v.clone())
                } else {
                    self.data_types.iter().find_map(|dt| dt.convert(v))
                }
            })
            .collect()
    }
}

impl fmt::Display for FieldMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exclude {
            write!(f, "-")?;
        }
        write!(f, "{}", self.source.as_str())?;
        if !self.data_types.is_empty() || !self.languages.is_empty() {
            write!(f, " |")?;
            if !self.data_types.is_empty() {
                let names: Vec<_> = self.data_types.iter().map(|dt| dt.name()).collect();
                write!(f, " d={}", names.join(","))?;
            }
            if !self.languages.is_empty() {
                write!(f, " @={}", self.languages.join(","))?;
            }
        }
        if let Some(target) = &self.target {
            write!(f, " > {target}")?;
        }
        Ok(())
    }
}

/// Applies a list of mapping rules to representations.
///
/// Exclusions win over inclusions. A field matched by several inclusion rules
/// contributes to every target. A mapper without rules copies everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMapper {
    mappings: Vec<FieldMapping>,
}

impl FieldMapper {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses every rule; the first invalid rule fails the whole mapper.
    pub fn from_rules<S: AsRef<str>>(rules: &[S]) -> Result<Self, ConfigError> {
        let mut mapper = Self::new();
        for rule in rules {
            let rule = rule.as_ref();
            if rule.trim().is_empty() {
                continue;
            }
            mapper.add_mapping(FieldMapping::parse(rule)?);
        }
        Ok(mapper)
    }

    pub fn add_mapping(&mut self, mapping: FieldMapping) {
        tracing::debug!(mapping = %mapping, "add field mapping");
        self.mappings.push(mapping);
    }

    #[must_use]
    pub fn mappings(&self) -> &[FieldMapping] {
        &self.mappings
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Maps `source` into a new representation with the same id.
    #[must_use]
    pub fn apply(&self, source: &Representation) -> Representation {
        if self.mappings.is_empty() {
            return source.clone();
        }

        let mut out = Representation::new(source.id());
        for (field, values) in source.fields() {
            if self
                .mappings
                .iter()
                .any(|m| m.exclude && m.applies_to(field))
            {
                continue;
            }
            for mapping in self.mappings.iter().filter(|m| !m.exclude && m.applies_to(field)) {
                let target = mapping.target.as_deref().unwrap_or(field);
                for value in mapping.filter_values(values) {
                    if !out.get(target).contains(&value) {
                        out.add(target, value);
                    }
                }
            }
        }
        out
    }
}
