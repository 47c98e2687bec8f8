//! Entity records and the create/update requests that produce them

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{EntityKind, ErrorInformation, Outcome};
use crate::moniker::Moniker;
use crate::value::{ExtensionValue, Extensions};

/// A reference field input: either a literal entity id or an alias name.
///
/// The store resolves aliases before any further processing, so alias
/// indirection is invisible past the create/update/query boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityRef {
    /// Literal entity id
    Id(String),
    /// Alias name
    Alias(String),
}

impl EntityRef {
    /// Classify a string: GUIDs are ids, anything else is an alias name.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        if Uuid::parse_str(value).is_ok() {
            Self::Id(value.to_string())
        } else {
            Self::Alias(value.to_string())
        }
    }

    /// The raw id or alias text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Id(s) | Self::Alias(s) => s,
        }
    }
}

impl From<&str> for EntityRef {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<String> for EntityRef {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<&String> for EntityRef {
    fn from(value: &String) -> Self {
        Self::parse(value)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => f.write_str(id),
            Self::Alias(name) => write!(f, "alias '{name}'"),
        }
    }
}

/// A stored entity.
///
/// Entities never embed other entities: every link is an id held in a
/// relationship field. Payload values live behind the optional moniker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub(crate) id: String,
    pub(crate) kind: EntityKind,
    pub(crate) sequence: u64,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) properties: BTreeMap<String, String>,
    pub(crate) links: BTreeMap<String, Vec<String>>,
    pub(crate) extensions: Extensions,
    pub(crate) schema_id: Option<String>,
    pub(crate) outcome: Outcome,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) ended_at: Option<DateTime<Utc>>,
    pub(crate) error_information: Option<ErrorInformation>,
    pub(crate) moniker: Option<Moniker>,
}

impl Entity {
    /// Get the entity ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the entity kind.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Creation order within the store (ties in query ordering break on this).
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Get a descriptive property (`name`, `serial_number`, ...).
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// All descriptive properties.
    #[must_use]
    pub const fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Shorthand for the `name` property.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.property("name")
    }

    /// Single-valued relationship field (`step_id`, `uut_id`, ...).
    #[must_use]
    pub fn link(&self, field: &str) -> Option<&str> {
        self.links
            .get(field)
            .and_then(|ids| ids.first())
            .map(String::as_str)
    }

    /// List-valued relationship field (`hardware_item_ids`, ...).
    /// Missing fields read as empty.
    #[must_use]
    pub fn links(&self, field: &str) -> &[String] {
        self.links.get(field).map_or(&[], Vec::as_slice)
    }

    /// All relationship fields.
    #[must_use]
    pub const fn all_links(&self) -> &BTreeMap<String, Vec<String>> {
        &self.links
    }

    /// Get the extension map.
    #[must_use]
    pub const fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// The entity's own schema id, if set (inheritance is not applied here).
    #[must_use]
    pub fn schema_id(&self) -> Option<&str> {
        self.schema_id.as_deref()
    }

    /// Get the outcome.
    #[must_use]
    pub const fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// Get the start timestamp, if recorded.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Get the end timestamp, if recorded.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Get the error information, if recorded.
    #[must_use]
    pub const fn error_information(&self) -> Option<&ErrorInformation> {
        self.error_information.as_ref()
    }

    /// Locator of the published value (measurements and conditions).
    #[must_use]
    pub const fn moniker(&self) -> Option<&Moniker> {
        self.moniker.as_ref()
    }

    /// Position within a batch publish, or -1 for a whole-set publish.
    #[must_use]
    pub fn parametric_index(&self) -> Option<i64> {
        self.moniker.as_ref().map(|m| m.parametric_index)
    }
}

/// Request to create an entity. The store assigns the identifier.
///
/// ## Example
///
/// ```rust
/// use datastore_core::entity::{EntityKind, NewEntity};
///
/// let item = NewEntity::new(EntityKind::HardwareItem)
///     .property("manufacturer", "NI")
///     .property("model", "PXIe-4080")
///     .extension("bandwidth", "1GHz")
///     .schema_id("bench-schema");
/// assert_eq!(item.kind(), EntityKind::HardwareItem);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntity {
    pub(crate) kind: EntityKind,
    pub(crate) properties: BTreeMap<String, String>,
    pub(crate) links: BTreeMap<String, Vec<EntityRef>>,
    pub(crate) extensions: Extensions,
    pub(crate) schema_id: Option<String>,
    pub(crate) outcome: Outcome,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) ended_at: Option<DateTime<Utc>>,
    pub(crate) error_information: Option<ErrorInformation>,
    pub(crate) moniker: Option<Moniker>,
}

impl NewEntity {
    /// Start a create request for the given kind.
    #[must_use]
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            properties: BTreeMap::new(),
            links: BTreeMap::new(),
            extensions: Extensions::new(),
            schema_id: None,
            outcome: Outcome::Unspecified,
            started_at: None,
            ended_at: None,
            error_information: None,
            moniker: None,
        }
    }

    /// Kind being created.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Set a descriptive property. Keys are stored lowercase.
    #[must_use]
    pub fn property(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.properties
            .insert(key.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Set a single-valued relationship field to an id or alias.
    #[must_use]
    pub fn link(mut self, field: impl Into<String>, target: impl Into<EntityRef>) -> Self {
        self.links.insert(field.into(), vec![target.into()]);
        self
    }

    /// Set a list-valued relationship field.
    #[must_use]
    pub fn links<I, T>(mut self, field: impl Into<String>, targets: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<EntityRef>,
    {
        self.links
            .insert(field.into(), targets.into_iter().map(Into::into).collect());
        self
    }

    /// Set one extension field.
    #[must_use]
    pub fn extension(mut self, key: impl Into<String>, value: impl Into<ExtensionValue>) -> Self {
        self.extensions.insert(key.into(), value.into());
        self
    }

    /// Replace the whole extension map.
    #[must_use]
    pub fn extensions(mut self, extensions: Extensions) -> Self {
        self.extensions = extensions;
        self
    }

    /// Set the entity's own schema id.
    #[must_use]
    pub fn schema_id(mut self, schema_id: impl Into<String>) -> Self {
        self.schema_id = Some(schema_id.into());
        self
    }

    /// Set the outcome.
    #[must_use]
    pub const fn outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Set the start timestamp.
    #[must_use]
    pub const fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    /// Set the end timestamp.
    #[must_use]
    pub const fn ended_at(mut self, at: DateTime<Utc>) -> Self {
        self.ended_at = Some(at);
        self
    }

    /// Set the error information.
    #[must_use]
    pub fn error_information(mut self, error_information: ErrorInformation) -> Self {
        self.error_information = Some(error_information);
        self
    }

    /// Attach the locator of an already published value.
    #[must_use]
    pub fn moniker(mut self, moniker: Moniker) -> Self {
        self.moniker = Some(moniker);
        self
    }
}

/// Partial update of an existing entity.
///
/// Properties merge per key. Extensions are replaced per top-level key (a
/// nested map under one key is replaced wholesale). Relationship fields named
/// in the patch are replaced wholesale, never appended.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityPatch {
    pub(crate) properties: BTreeMap<String, String>,
    pub(crate) links: BTreeMap<String, Vec<EntityRef>>,
    pub(crate) extensions: Extensions,
    pub(crate) schema_id: Option<String>,
    pub(crate) outcome: Option<Outcome>,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) ended_at: Option<DateTime<Utc>>,
    pub(crate) error_information: Option<ErrorInformation>,
}

impl EntityPatch {
    /// Create an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a descriptive property.
    #[must_use]
    pub fn property(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.properties
            .insert(key.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Replace a single-valued relationship field.
    #[must_use]
    pub fn link(mut self, field: impl Into<String>, target: impl Into<EntityRef>) -> Self {
        self.links.insert(field.into(), vec![target.into()]);
        self
    }

    /// Replace a list-valued relationship field.
    #[must_use]
    pub fn links<I, T>(mut self, field: impl Into<String>, targets: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<EntityRef>,
    {
        self.links
            .insert(field.into(), targets.into_iter().map(Into::into).collect());
        self
    }

    /// Replace one top-level extension key.
    #[must_use]
    pub fn extension(mut self, key: impl Into<String>, value: impl Into<ExtensionValue>) -> Self {
        self.extensions.insert(key.into(), value.into());
        self
    }

    /// Set the entity's own schema id.
    #[must_use]
    pub fn schema_id(mut self, schema_id: impl Into<String>) -> Self {
        self.schema_id = Some(schema_id.into());
        self
    }

    /// Set the outcome.
    #[must_use]
    pub const fn outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    /// Set the start timestamp.
    #[must_use]
    pub const fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    /// Set the end timestamp.
    #[must_use]
    pub const fn ended_at(mut self, at: DateTime<Utc>) -> Self {
        self.ended_at = Some(at);
        self
    }

    /// Set the error information.
    #[must_use]
    pub fn error_information(mut self, error_information: ErrorInformation) -> Self {
        self.error_information = Some(error_information);
        self
    }

    /// Apply the non-relationship parts of the patch to a copy of `entity`.
    pub(crate) fn merge_into(&self, entity: &mut Entity) {
        for (key, value) in &self.properties {
            entity.properties.insert(key.clone(), value.clone());
        }
        for (key, value) in &self.extensions {
            entity.extensions.insert(key.clone(), value.clone());
        }
        if let Some(schema_id) = &self.schema_id {
            entity.schema_id = Some(schema_id.clone());
        }
        if let Some(outcome) = self.outcome {
            entity.outcome = outcome;
        }
        if self.started_at.is_some() {
            entity.started_at = self.started_at;
        }
        if self.ended_at.is_some() {
            entity.ended_at = self.ended_at;
        }
        if let Some(error_information) = &self.error_information {
            entity.error_information = Some(error_information.clone());
        }
    }
}
