//! Schema inheritance along an entity's ancestry path

/// One ancestor on the path from an entity up to its test result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaAncestor<'a> {
    /// The ancestor's own schema id
    pub schema_id: Option<&'a str>,
    /// Whether the ancestor's schema applies to its descendants
    pub propagates: bool,
}

impl<'a> SchemaAncestor<'a> {
    /// Ancestor whose schema is inherited by descendants (a test result).
    #[must_use]
    pub const fn root(schema_id: Option<&'a str>) -> Self {
        Self {
            schema_id,
            propagates: true,
        }
    }

    /// Ancestor whose own schema only applies to itself (a step).
    #[must_use]
    pub const fn local(schema_id: Option<&'a str>) -> Self {
        Self {
            schema_id,
            propagates: false,
        }
    }
}

/// Resolve the schema that applies to an entity.
///
/// The entity's own schema wins. Otherwise the nearest ancestor (ordered
/// nearest first) with a propagating schema supplies it. Overrides on
/// intermediate steps do not propagate.
#[must_use]
pub fn effective_schema_id<'a>(
    own: Option<&'a str>,
    ancestry: &[SchemaAncestor<'a>],
) -> Option<&'a str> {
    own.or_else(|| {
        ancestry
            .iter()
            .filter(|ancestor| ancestor.propagates)
            .find_map(|ancestor| ancestor.schema_id)
    })
}
