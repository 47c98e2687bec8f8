//! Alias resolver - human-readable names for metadata entities
//!
//! Resolution is a pure lookup. Whether the target still exists is checked
//! by whoever dereferences the alias, so dangling aliases can be created but
//! fail to resolve into a stored entity.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entity::EntityKind;
use crate::{Error, Result};

/// Named indirection to a `(kind, id)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    name: String,
    target_type: EntityKind,
    target_id: String,
}

impl Alias {
    /// Get the alias name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the kind of the aliased entity.
    #[must_use]
    pub const fn target_type(&self) -> EntityKind {
        self.target_type
    }

    /// Get the id of the aliased entity.
    #[must_use]
    pub fn target_id(&self) -> &str {
        &self.target_id
    }
}

/// Wire code of an alias target type (`ALIAS_TARGET_TYPE_*`).
///
/// # Errors
///
/// `InvalidInput` for kinds that cannot be alias targets.
pub fn target_type_code(kind: EntityKind) -> Result<i32> {
    let code = match kind {
        EntityKind::UutInstance => 1,
        EntityKind::Uut => 2,
        EntityKind::HardwareItem => 3,
        EntityKind::SoftwareItem => 4,
        EntityKind::Operator => 5,
        EntityKind::TestDescription => 6,
        EntityKind::Test => 7,
        EntityKind::TestStation => 8,
        EntityKind::TestAdapter => 9,
        other => {
            return Err(Error::InvalidInput(format!(
                "{other} cannot be an alias target"
            )))
        }
    };
    Ok(code)
}

/// Inverse of [`target_type_code`]. Code 0 (unspecified) is rejected.
///
/// # Errors
///
/// `InvalidInput` for unknown or unspecified codes.
pub fn target_type_from_code(code: i32) -> Result<EntityKind> {
    EntityKind::ALL
        .into_iter()
        .find(|kind| target_type_code(*kind).ok() == Some(code))
        .ok_or_else(|| Error::InvalidInput(format!("Unknown alias target type code: {code}")))
}

/// Registry mapping alias names to entity references.
#[derive(Debug, Default)]
pub struct AliasResolver {
    aliases: DashMap<String, Alias, FxBuildHasher>,
}

impl AliasResolver {
    /// Create an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an alias.
    ///
    /// # Errors
    ///
    /// `Conflict` if the name is taken, `InvalidInput` for an empty name or a
    /// kind that cannot be aliased.
    pub fn create(
        &self,
        name: impl Into<String>,
        target_type: EntityKind,
        target_id: impl Into<String>,
    ) -> Result<Alias> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidInput("Alias name must not be empty".to_string()));
        }
        target_type_code(target_type)?;

        match self.aliases.entry(name.clone()) {
            Entry::Occupied(_) => Err(Error::Conflict(format!(
                "Alias '{name}' is already registered"
            ))),
            Entry::Vacant(slot) => {
                let alias = Alias {
                    name,
                    target_type,
                    target_id: target_id.into(),
                };
                debug!(alias = %alias.name, target = %alias.target_type, "alias created");
                slot.insert(alias.clone());
                Ok(alias)
            }
        }
    }

    /// Get the full alias record.
    ///
    /// # Errors
    ///
    /// `NotFound` if the name is not registered.
    pub fn get(&self, name: &str) -> Result<Alias> {
        self.aliases
            .get(name)
            .map(|a| a.value().clone())
            .ok_or_else(|| Error::not_found("alias", name))
    }

    /// Resolve an alias to `(kind, id)`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the name is not registered.
    pub fn resolve(&self, name: &str) -> Result<(EntityKind, String)> {
        self.get(name).map(|a| (a.target_type, a.target_id))
    }

    /// Resolve an alias that must point at `expected`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the name is not registered, `TypeMismatch` if it targets
    /// another kind.
    pub fn resolve_typed(&self, name: &str, expected: EntityKind) -> Result<String> {
        let (kind, id) = self.resolve(name)?;
        if kind == expected {
            Ok(id)
        } else {
            Err(Error::type_mismatch(expected, kind))
        }
    }

    /// Remove an alias. Returns whether it existed.
    pub fn delete(&self, name: &str) -> bool {
        let removed = self.aliases.remove(name).is_some();
        if removed {
            debug!(alias = %name, "alias deleted");
        }
        removed
    }

    /// All aliases, ordered by name.
    #[must_use]
    pub fn list(&self) -> Vec<Alias> {
        let mut aliases: Vec<Alias> = self.aliases.iter().map(|a| a.value().clone()).collect();
        aliases.sort_by(|a, b| a.name.cmp(&b.name));
        aliases
    }

    /// Number of registered aliases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    /// Check if no aliases are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}
