//! Extension values - open key-value metadata attached to any entity

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Extension map carried by every entity.
pub type Extensions = BTreeMap<String, ExtensionValue>;

/// A single extension value.
///
/// Extension maps are open: unknown keys are stored and returned unchanged.
/// Schema rules only constrain presence and primitive type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtensionValue {
    /// Boolean flag
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Double precision float
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Nested map (addressed by dotted paths)
    Map(Extensions),
}

/// Primitive type constraint a schema rule can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    /// String value
    String,
    /// Integer value
    Int,
    /// Float value (integers are accepted)
    Float,
    /// Boolean value
    Bool,
}

impl PrimitiveType {
    /// Get type name as string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ExtensionValue {
    /// Name of the value's type, as used in error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Map(_) => "map",
        }
    }

    /// Check whether this value satisfies a primitive type constraint.
    #[must_use]
    pub const fn satisfies(&self, ty: PrimitiveType) -> bool {
        matches!(
            (self, ty),
            (Self::String(_), PrimitiveType::String)
                | (Self::Int(_), PrimitiveType::Int | PrimitiveType::Float)
                | (Self::Float(_), PrimitiveType::Float)
                | (Self::Bool(_), PrimitiveType::Bool)
        )
    }

    /// Numeric view of the value, if it has one.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }
}

/// Look up a dotted path (`a.b.c`) inside an extension map.
///
/// Intermediate segments must be nested maps.
#[must_use]
pub fn lookup_path<'a>(extensions: &'a Extensions, path: &str) -> Option<&'a ExtensionValue> {
    let mut segments = path.split('.');
    let mut current = extensions.get(segments.next()?)?;
    for segment in segments {
        match current {
            ExtensionValue::Map(map) => current = map.get(segment)?,
            _ => return None,
        }
    }
    Some(current)
}

impl fmt::Display for ExtensionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(s) => f.write_str(s),
            Self::Map(map) => {
                let json = serde_json::to_string(map).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}

impl From<&str> for ExtensionValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ExtensionValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for ExtensionValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for ExtensionValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for ExtensionValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for ExtensionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Extensions> for ExtensionValue {
    fn from(value: Extensions) -> Self {
        Self::Map(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_nested_path() {
        let mut calibration = Extensions::new();
        calibration.insert("due".to_string(), "2025-01-01".into());
        let mut extensions = Extensions::new();
        extensions.insert("calibration".to_string(), calibration.into());
        extensions.insert("bandwidth".to_string(), "1GHz".into());

        assert_eq!(
            lookup_path(&extensions, "calibration.due"),
            Some(&ExtensionValue::from("2025-01-01"))
        );
        assert_eq!(
            lookup_path(&extensions, "bandwidth"),
            Some(&ExtensionValue::from("1GHz"))
        );
        assert!(lookup_path(&extensions, "bandwidth.unit").is_none());
        assert!(lookup_path(&extensions, "missing").is_none());
    }

    #[test]
    fn test_float_constraint_accepts_int() {
        assert!(ExtensionValue::Int(3).satisfies(PrimitiveType::Float));
        assert!(!ExtensionValue::Float(3.0).satisfies(PrimitiveType::Int));
        assert!(!ExtensionValue::from("3").satisfies(PrimitiveType::Int));
    }

    #[test]
    fn test_untagged_json_shapes() {
        let value: Extensions =
            serde_json::from_str(r#"{"a": 1, "b": 1.5, "c": "x", "d": true, "e": {"f": 2}}"#)
                .unwrap();
        assert_eq!(value["a"], ExtensionValue::Int(1));
        assert_eq!(value["b"], ExtensionValue::Float(1.5));
        assert_eq!(value["c"], ExtensionValue::from("x"));
        assert_eq!(value["d"], ExtensionValue::Bool(true));
        assert_eq!(lookup_path(&value, "e.f"), Some(&ExtensionValue::Int(2)));
    }
}
