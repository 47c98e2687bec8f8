//! Extension schema registry and validation
//!
//! A schema is a set of field rules keyed by dotted path. The first path
//! segment names the entity section the rule applies to, the rest is the path
//! inside the entity's extension map:
//!
//! ```text
//! hardware_item.bandwidth          -> HardwareItem extensions["bandwidth"]
//! test_result.environment.humidity -> TestResult extensions["environment"]["humidity"]
//! ```
//!
//! A path with a single segment applies to every entity kind. Fields with no
//! rule pass through unvalidated.

mod inheritance;

pub use inheritance::{effective_schema_id, SchemaAncestor};

use std::collections::BTreeMap;
use std::fmt;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::value::{lookup_path, Extensions, PrimitiveType};
use crate::{Error, Result};

/// Presence and type rule for one extension field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FieldRule {
    /// Field must be present
    #[serde(default)]
    pub required: bool,
    /// Optional primitive type constraint
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub ty: Option<PrimitiveType>,
}

impl FieldRule {
    /// Required field, any type.
    #[must_use]
    pub const fn required() -> Self {
        Self {
            required: true,
            ty: None,
        }
    }

    /// Optional field, any type.
    #[must_use]
    pub const fn optional() -> Self {
        Self {
            required: false,
            ty: None,
        }
    }

    /// Add a type constraint.
    #[must_use]
    pub const fn typed(mut self, ty: PrimitiveType) -> Self {
        self.ty = Some(ty);
        self
    }
}

/// Extension schema document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionSchema {
    id: String,
    #[serde(default)]
    fields: BTreeMap<String, FieldRule>,
}

/// A present field whose value does not satisfy its declared type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldTypeMismatch {
    /// Full rule path (`hardware_item.bandwidth`)
    pub path: String,
    /// Declared type
    pub expected: PrimitiveType,
    /// Type actually found
    pub actual: String,
}

/// Why a set of extensions failed validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFailure {
    /// Required rule paths absent from the extensions
    pub missing_required_fields: Vec<String>,
    /// Present fields with the wrong type
    pub type_mismatches: Vec<FieldTypeMismatch>,
}

impl ValidationFailure {
    /// No violations recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.missing_required_fields.is_empty() && self.type_mismatches.is_empty()
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.missing_required_fields.is_empty() {
            parts.push(format!(
                "missing required fields [{}]",
                self.missing_required_fields.join(", ")
            ));
        }
        for mismatch in &self.type_mismatches {
            parts.push(format!(
                "`{}` must be {} (found {})",
                mismatch.path, mismatch.expected, mismatch.actual
            ));
        }
        f.write_str(&parts.join("; "))
    }
}

impl ExtensionSchema {
    /// Create an empty schema with the given id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Parse a schema document from JSON:
    /// `{"id": "S", "fields": {"hardware_item.bandwidth": {"required": true}}}`.
    ///
    /// # Errors
    ///
    /// Returns `ParseError` for malformed documents or an empty id.
    pub fn from_json(document: &str) -> Result<Self> {
        let schema: Self = serde_json::from_str(document)
            .map_err(|e| Error::ParseError(format!("Invalid schema document: {e}")))?;
        if schema.id.trim().is_empty() {
            return Err(Error::ParseError("Schema id must not be empty".to_string()));
        }
        Ok(schema)
    }

    /// Add or replace a field rule.
    #[must_use]
    pub fn field(mut self, path: impl Into<String>, rule: FieldRule) -> Self {
        self.fields.insert(path.into(), rule);
        self
    }

    /// Get the schema ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// All field rules keyed by full path.
    #[must_use]
    pub const fn fields(&self) -> &BTreeMap<String, FieldRule> {
        &self.fields
    }

    /// Rules that apply to `section`, paired with the path inside the
    /// extension map.
    fn rules_for<'a>(
        &'a self,
        section: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a str, &'a FieldRule)> + 'a {
        self.fields.iter().filter_map(move |(path, rule)| {
            match path.split_once('.') {
                Some((prefix, rest)) if prefix == section => Some((path.as_str(), rest, rule)),
                Some(_) => None,
                None => Some((path.as_str(), path.as_str(), rule)),
            }
        })
    }

    /// Declared type of an extension path for entities of `section`.
    #[must_use]
    pub fn field_type(&self, section: &str, extension_path: &str) -> Option<PrimitiveType> {
        self.rules_for(section)
            .find(|(_, inner, _)| *inner == extension_path)
            .and_then(|(_, _, rule)| rule.ty)
    }

    /// Validate extensions of an entity in `section` against this schema.
    ///
    /// Pure: no registry access, no side effects.
    ///
    /// # Errors
    ///
    /// Returns the full list of missing required fields and type mismatches.
    pub fn check(
        &self,
        extensions: &Extensions,
        section: &str,
    ) -> std::result::Result<(), ValidationFailure> {
        let mut failure = ValidationFailure::default();

        for (path, inner, rule) in self.rules_for(section) {
            match lookup_path(extensions, inner) {
                None if rule.required => failure.missing_required_fields.push(path.to_string()),
                None => {}
                Some(value) => {
                    if let Some(ty) = rule.ty {
                        if !value.satisfies(ty) {
                            failure.type_mismatches.push(FieldTypeMismatch {
                                path: path.to_string(),
                                expected: ty,
                                actual: value.type_name().to_string(),
                            });
                        }
                    }
                }
            }
        }

        if failure.is_empty() {
            Ok(())
        } else {
            Err(failure)
        }
    }
}

/// Registry of extension schemas.
///
/// Registration is visible to every subsequent lookup as soon as `register`
/// returns.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: DashMap<String, ExtensionSchema, FxBuildHasher>,
}

impl SchemaRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema and return its id.
    ///
    /// Registering identical content under an existing id is a no-op.
    ///
    /// # Errors
    ///
    /// `Conflict` if the id is taken by different content, `ParseError` if the
    /// id is empty.
    pub fn register(&self, schema: ExtensionSchema) -> Result<String> {
        if schema.id.trim().is_empty() {
            return Err(Error::ParseError("Schema id must not be empty".to_string()));
        }
        let id = schema.id.clone();
        match self.schemas.entry(id.clone()) {
            Entry::Occupied(existing) => {
                if existing.get() == &schema {
                    Ok(id)
                } else {
                    warn!(schema_id = %id, "schema id already registered with different content");
                    Err(Error::Conflict(format!(
                        "Schema '{id}' is already registered with different content"
                    )))
                }
            }
            Entry::Vacant(slot) => {
                debug!(schema_id = %id, rules = schema.fields.len(), "schema registered");
                slot.insert(schema);
                Ok(id)
            }
        }
    }

    /// Get a schema by id.
    ///
    /// # Errors
    ///
    /// `NotFound` if no schema has that id.
    pub fn get(&self, schema_id: &str) -> Result<ExtensionSchema> {
        self.schemas
            .get(schema_id)
            .map(|s| s.value().clone())
            .ok_or_else(|| Error::not_found("schema", schema_id))
    }

    /// All registered schemas, ordered by id.
    #[must_use]
    pub fn list(&self) -> Vec<ExtensionSchema> {
        let mut schemas: Vec<ExtensionSchema> =
            self.schemas.iter().map(|s| s.value().clone()).collect();
        schemas.sort_by(|a, b| a.id.cmp(&b.id));
        schemas
    }

    /// Number of registered schemas.
    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Validate extensions for an entity in `section` against the schema
    /// `schema_id` (own or inherited; the caller resolves which).
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown schema, `Validation` for rule violations.
    pub fn validate(&self, extensions: &Extensions, schema_id: &str, section: &str) -> Result<()> {
        let schema = self
            .schemas
            .get(schema_id)
            .ok_or_else(|| Error::not_found("schema", schema_id))?;
        schema.check(extensions, section).map_err(Error::Validation)
    }

    /// Declared type of an extension path, if the schema exists and has a
    /// typed rule for it.
    #[must_use]
    pub fn field_type(
        &self,
        schema_id: &str,
        section: &str,
        extension_path: &str,
    ) -> Option<PrimitiveType> {
        self.schemas
            .get(schema_id)
            .and_then(|schema| schema.field_type(section, extension_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ExtensionValue;

    fn bandwidth_schema() -> ExtensionSchema {
        ExtensionSchema::new("S").field("hardware_item.bandwidth", FieldRule::required())
    }

    #[test]
    fn test_required_field_present() {
        let mut extensions = Extensions::new();
        extensions.insert("bandwidth".to_string(), "1GHz".into());
        assert!(bandwidth_schema().check(&extensions, "hardware_item").is_ok());
    }

    #[test]
    fn test_required_field_missing() {
        let failure = bandwidth_schema()
            .check(&Extensions::new(), "hardware_item")
            .unwrap_err();
        assert_eq!(failure.missing_required_fields, vec!["hardware_item.bandwidth"]);
        assert!(failure.type_mismatches.is_empty());
    }

    #[test]
    fn test_rules_for_other_sections_ignored() {
        assert!(bandwidth_schema().check(&Extensions::new(), "operator").is_ok());
    }

    #[test]
    fn test_unknown_fields_pass_through() {
        let mut extensions = Extensions::new();
        extensions.insert("bandwidth".to_string(), "1GHz".into());
        extensions.insert("anything".to_string(), ExtensionValue::Bool(true));
        assert!(bandwidth_schema().check(&extensions, "hardware_item").is_ok());
    }

    #[test]
    fn test_type_mismatch_reported() {
        let schema = ExtensionSchema::new("T")
            .field("step.retries", FieldRule::optional().typed(PrimitiveType::Int))
            .field("step.limit", FieldRule::required().typed(PrimitiveType::Float));
        let mut extensions = Extensions::new();
        extensions.insert("retries".to_string(), "three".into());
        extensions.insert("limit".to_string(), 5.into());

        let failure = schema.check(&extensions, "step").unwrap_err();
        assert!(failure.missing_required_fields.is_empty());
        assert_eq!(failure.type_mismatches.len(), 1);
        assert_eq!(failure.type_mismatches[0].path, "step.retries");
        assert_eq!(failure.type_mismatches[0].expected, PrimitiveType::Int);
        assert_eq!(failure.type_mismatches[0].actual, "string");
    }

    #[test]
    fn test_register_is_idempotent_for_identical_content() {
        let registry = SchemaRegistry::new();
        assert_eq!(registry.register(bandwidth_schema()).unwrap(), "S");
        assert_eq!(registry.register(bandwidth_schema()).unwrap(), "S");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_conflict() {
        let registry = SchemaRegistry::new();
        registry.register(bandwidth_schema()).unwrap();
        let different = ExtensionSchema::new("S").field("hardware_item.model", FieldRule::required());
        assert!(matches!(registry.register(different), Err(Error::Conflict(_))));
        assert_eq!(registry.get("S").unwrap(), bandwidth_schema());
    }

    #[test]
    fn test_get_unknown_schema() {
        let registry = SchemaRegistry::new();
        assert!(matches!(registry.get("nope"), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_from_json_document() {
        let schema = ExtensionSchema::from_json(
            r#"{"id": "doc", "fields": {"uut.family": {"required": true, "type": "string"}}}"#,
        )
        .unwrap();
        assert_eq!(schema.id(), "doc");
        assert_eq!(
            schema.fields()["uut.family"],
            FieldRule::required().typed(PrimitiveType::String)
        );
        assert!(ExtensionSchema::from_json(r#"{"id": ""}"#).is_err());
        assert!(ExtensionSchema::from_json("not json").is_err());
    }
}
