//! Typed values carried by channels and task bindings.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// A value flowing through a channel into a task input, or out of a task
/// output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent value
    Null,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// Text
    Str(String),
    /// Filesystem path
    Path(PathBuf),
    /// Ordered collection
    List(Vec<Value>),
}

impl Value {
    /// Short name of the variant, used in error messages
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Path(_) => "path",
            Self::List(_) => "list",
        }
    }

    /// Canonical, byte-stable encoding used for cache keys.
    ///
    /// Variant tags are part of the encoding, so `Str("a")` and
    /// `Path("a")` encode differently.
    ///
    /// # Errors
    ///
    /// Returns error if a path is not valid UTF-8
    pub fn canonical_bytes(&self) -> CoreResult<Vec<u8>> {
        Ok(postcard::to_allocvec(self)?)
    }

    /// Render as script text
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Str(s) => s.clone(),
            Self::Path(p) => p.display().to_string(),
            Self::List(items) => items
                .iter()
                .map(Value::render)
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    /// Borrow as a path, if this is one
    #[must_use]
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::Path(p) => Some(p),
            _ => None,
        }
    }

    /// Borrow as a string, if this is one
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Coerce into a path value.
    ///
    /// Strings are accepted as paths; paths pass through.
    ///
    /// # Errors
    ///
    /// Returns error for any other variant
    pub fn into_path(self, field: &str) -> CoreResult<Self> {
        match self {
            Self::Path(_) => Ok(self),
            Self::Str(s) => Ok(Self::Path(PathBuf::from(s))),
            other => Err(CoreError::TypeMismatch {
                field: field.to_string(),
                expected: "path".to_string(),
                actual: other.kind().to_string(),
            }),
        }
    }

    /// Convert from an untyped JSON value.
    ///
    /// JSON carries no path type, so strings become `Str`; callers that
    /// know a parameter is a file coerce with [`Value::into_path`].
    ///
    /// # Errors
    ///
    /// Returns error for JSON objects, which have no value counterpart
    pub fn from_json(json: serde_json::Value) -> CoreResult<Self> {
        Ok(match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::Str(s),
            serde_json::Value::Array(items) => Self::List(
                items
                    .into_iter()
                    .map(Self::from_json)
                    .collect::<CoreResult<Vec<_>>>()?,
            ),
            serde_json::Value::Object(_) => {
                return Err(CoreError::TypeMismatch {
                    field: "value".to_string(),
                    expected: "scalar or array".to_string(),
                    actual: "object".to_string(),
                });
            }
        })
    }

    /// Convert into untyped JSON for display
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::Str(s) => serde_json::Value::String(s.clone()),
            Self::Path(p) => serde_json::Value::String(p.display().to_string()),
            Self::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<PathBuf> for Value {
    fn from(p: PathBuf) -> Self {
        Self::Path(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_scalars() {
        assert_eq!(Value::Null.render(), "");
        assert_eq!(Value::Bool(true).render(), "true");
        assert_eq!(Value::Int(-3).render(), "-3");
        assert_eq!(Value::Float(2.5).render(), "2.5");
        assert_eq!(Value::from("abc").render(), "abc");
        assert_eq!(Value::Path(PathBuf::from("/data/x.fa")).render(), "/data/x.fa");
    }

    #[test]
    fn test_render_list_space_joined() {
        let list = Value::List(vec![Value::from("a"), Value::Int(1), Value::from("c")]);
        assert_eq!(list.render(), "a 1 c");
    }

    #[test]
    fn test_canonical_bytes_distinguishes_variants() {
        let s = Value::from("a").canonical_bytes().unwrap();
        let p = Value::Path(PathBuf::from("a")).canonical_bytes().unwrap();
        assert_ne!(s, p);
    }

    #[test]
    fn test_canonical_bytes_deterministic() {
        let v = Value::List(vec![Value::Float(0.1), Value::from("x")]);
        assert_eq!(v.canonical_bytes().unwrap(), v.canonical_bytes().unwrap());
    }

    #[test]
    fn test_into_path() {
        let p = Value::from("reads.fq").into_path("reads").unwrap();
        assert_eq!(p.as_path(), Some(Path::new("reads.fq")));

        let err = Value::Int(4).into_path("reads").unwrap_err();
        assert!(matches!(err, CoreError::TypeMismatch { .. }));
    }

    #[test]
    fn test_from_json() {
        let v = Value::from_json(json!(["a", 1, 1.5, true, null])).unwrap();
        assert_eq!(
            v,
            Value::List(vec![
                Value::from("a"),
                Value::Int(1),
                Value::Float(1.5),
                Value::Bool(true),
                Value::Null,
            ])
        );
        assert!(Value::from_json(json!({"k": 1})).is_err());
    }

    #[test]
    fn test_to_json_path_is_string() {
        let v = Value::Path(PathBuf::from("out/result.txt"));
        assert_eq!(v.to_json(), json!("out/result.txt"));
    }
}
