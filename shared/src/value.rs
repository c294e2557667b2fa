//! A small dynamic value type used everywhere the source's runtime document
//! schema (`obj["a"]["b"]`) leaked into business logic: template rendering
//! context, automation condition evaluation, and webhook payload
//! normalization all walk dotted paths over contact/organization data.
//!
//! Re-expressing that as a closed sum type with a single recursive
//! `lookup_path` lets the renderer and the condition evaluator share one
//! implementation instead of each growing their own reflection-ish helper.

use serde::{Deserialize, Serialize};
use serde_json::Number;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    pub fn object() -> Value {
        Value::Object(BTreeMap::new())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        if let Value::Object(map) = self {
            map.insert(key.into(), value.into());
        }
        self
    }

    /// Sets a dotted path (`contact.nickname`), creating intermediate
    /// objects as needed. Used to splice a declared default into a context
    /// tree at exactly the spot the renderer will later look it up.
    pub fn set_path(&mut self, path: &str, value: impl Into<Value>) {
        let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
        let Some((last, init)) = segments.split_last() else { return };

        let mut current = self;
        for segment in init {
            if !matches!(current, Value::Object(_)) {
                *current = Value::object();
            }
            let Value::Object(map) = current else { unreachable!() };
            current = map.entry((*segment).to_owned()).or_insert_with(Value::object);
        }

        if !matches!(current, Value::Object(_)) {
            *current = Value::object();
        }
        if let Value::Object(map) = current {
            map.insert((*last).to_owned(), value.into());
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Null) || matches!(self, Value::String(s) if s.is_empty())
    }

    /// Renders the value the way it would be substituted into a template:
    /// strings as-is, scalars stringified, everything else (lists/objects/null)
    /// as an empty string.
    pub fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::List(_) | Value::Object(_) => String::new(),
        }
    }

    /// Walks a dotted path (`contact.profile.firstName`) over this value,
    /// returning `None` if any segment is missing or not an object.
    pub fn lookup_path(&self, path: &str) -> Option<&Value> {
        let mut current = self;

        for segment in path.split('.') {
            if segment.is_empty() {
                continue;
            }

            match current {
                Value::Object(map) => current = map.get(segment)?,
                _ => return None,
            }
        }

        Some(current)
    }

    /// Numeric comparison helper used by the automation condition evaluator's
    /// `greater_than` / `less_than` operators; non-numeric values compare as
    /// unordered (`None`).
    pub fn partial_cmp_numeric(&self, other: &Value) -> Option<std::cmp::Ordering> {
        let a = self.as_f64()?;
        let b = other.as_f64()?;
        a.partial_cmp(&b)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Treats the value as a list-ish collection for the `in_list` /
    /// `has_tag` condition operators, accepting either a `List` or a single
    /// scalar (treated as a one-element list).
    pub fn contains(&self, needle: &Value) -> bool {
        match self {
            Value::List(items) => items.iter().any(|v| v == needle),
            other => other == needle,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => number_to_value(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

fn number_to_value(n: Number) -> Value {
    if let Some(i) = n.as_i64() {
        Value::Int(i)
    } else {
        Value::Float(n.as_f64().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_contact() -> Value {
        let mut contact = Value::object();
        contact.set("firstName", "Ada");
        contact.set("score", 42_i64);

        let mut profile = Value::object();
        profile.set("city", "London");
        contact.set("profile", profile);

        let mut root = Value::object();
        root.set("contact", contact);
        root
    }

    #[test]
    fn lookup_path_walks_nested_objects() {
        let root = sample_contact();

        assert_eq!(
            root.lookup_path("contact.firstName"),
            Some(&Value::String("Ada".into()))
        );
        assert_eq!(
            root.lookup_path("contact.profile.city"),
            Some(&Value::String("London".into()))
        );
    }

    #[test]
    fn lookup_path_missing_segment_is_none() {
        let root = sample_contact();
        assert_eq!(root.lookup_path("contact.profile.country"), None);
        assert_eq!(root.lookup_path("organization.name"), None);
    }

    #[test]
    fn lookup_path_through_scalar_is_none() {
        let root = sample_contact();
        assert_eq!(root.lookup_path("contact.firstName.nested"), None);
    }

    #[test]
    fn numeric_comparison_ignores_strings() {
        let a = Value::Int(10);
        let b = Value::String("abc".into());
        assert_eq!(a.partial_cmp_numeric(&b), None);
    }

    #[test]
    fn set_path_creates_intermediate_objects() {
        let mut root = Value::object();
        root.set_path("contact.nickname", "Ace");
        assert_eq!(root.lookup_path("contact.nickname"), Some(&Value::String("Ace".into())));
    }

    #[test]
    fn set_path_single_segment_behaves_like_set() {
        let mut root = Value::object();
        root.set_path("title", "Hi");
        assert_eq!(root.lookup_path("title"), Some(&Value::String("Hi".into())));
    }
}
