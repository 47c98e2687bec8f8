//! Query execution engine
//!
//! Evaluates a parsed [`QueryPlan`] against one collection of the entity
//! store: filter, then stable sort, then limit. The scan is bounded by the
//! collection size and checks the caller's deadline as it goes.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::{CompareOp, Literal, OrderBy, OrderDirection, Predicate, QueryPlan};
use crate::config::Deadline;
use crate::entity::{Cardinality, Entity, EntityKind, EntityStore, Outcome, Relation};
use crate::value::{lookup_path, ExtensionValue, PrimitiveType};
use crate::{Error, Result};

/// How many entities are evaluated between deadline checks.
const DEADLINE_STRIDE: usize = 256;

/// A field value read off an entity.
#[derive(Debug, Clone)]
enum FieldValue<'a> {
    Text(Cow<'a, str>),
    Int(i64),
    Instant(DateTime<Utc>),
    Outcome(Outcome),
    Ids(&'a [String]),
    Extension {
        value: &'a ExtensionValue,
        declared: Option<PrimitiveType>,
    },
}

impl FieldValue<'_> {
    const fn type_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "string",
            Self::Int(_) => "int",
            Self::Instant(_) => "datetime",
            Self::Outcome(_) => "outcome",
            Self::Ids(_) => "id list",
            Self::Extension { value, declared } => match declared {
                Some(ty) => ty.as_str(),
                None => value.type_name(),
            },
        }
    }
}

/// Value used to order results.
#[derive(Debug, Clone, PartialEq)]
enum SortKey {
    Number(f64),
    Instant(DateTime<Utc>),
    Text(String),
}

impl SortKey {
    const fn rank(&self) -> u8 {
        match self {
            Self::Number(_) => 0,
            Self::Instant(_) => 1,
            Self::Text(_) => 2,
        }
    }

    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Instant(a), Self::Instant(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

fn extension_path(field: &str) -> Option<String> {
    let lowered = field.to_ascii_lowercase();
    ["extensions.", "extensions/", "extension.", "extension/"]
        .into_iter()
        .find(|prefix| lowered.starts_with(prefix))
        .map(|prefix| field[prefix.len()..].replace('/', "."))
}

/// Fields every entity of a kind exposes with a fixed type.
#[derive(Debug, Clone, Copy)]
enum Builtin {
    Id,
    Outcome,
    StartedAt,
    EndedAt,
    CreatedAt,
    SchemaId,
    ParametricIndex,
    ValueType,
    ErrorCode,
    ErrorMessage,
    ErrorSource,
}

/// What a field name in a query refers to.
#[derive(Debug, Clone)]
enum FieldRef {
    Extension(String),
    Builtin(Builtin),
    Relation(&'static Relation),
    Property(String),
}

impl FieldRef {
    fn resolve(kind: EntityKind, field: &str) -> Self {
        if let Some(path) = extension_path(field) {
            return Self::Extension(path);
        }
        let lowered = field.to_ascii_lowercase().replace('/', ".");
        let builtin = match lowered.as_str() {
            "id" => Builtin::Id,
            "outcome" => Builtin::Outcome,
            "started_at" | "start_date_time" => Builtin::StartedAt,
            "ended_at" | "end_date_time" => Builtin::EndedAt,
            "created_at" => Builtin::CreatedAt,
            "schema_id" => Builtin::SchemaId,
            "parametric_index" => Builtin::ParametricIndex,
            "value_type" | "data_type" => Builtin::ValueType,
            "error_information.error_code" | "error_code" => Builtin::ErrorCode,
            "error_information.message" => Builtin::ErrorMessage,
            "error_information.source" => Builtin::ErrorSource,
            _ => {
                return kind
                    .relation(&lowered)
                    .map_or(Self::Property(lowered), Self::Relation)
            }
        };
        Self::Builtin(builtin)
    }

    /// A stand-in value of the field's fixed type, used to type-check a
    /// plan before any entity is read. `None` for extension fields, whose
    /// type depends on each entity's schema.
    fn type_witness(&self) -> Option<FieldValue<'static>> {
        let text = || FieldValue::Text(Cow::Borrowed(""));
        match self {
            Self::Extension(_) => None,
            Self::Property(_) => Some(text()),
            Self::Relation(relation) => Some(match relation.cardinality {
                Cardinality::One => text(),
                Cardinality::Many => FieldValue::Ids(&[]),
            }),
            Self::Builtin(builtin) => Some(match builtin {
                Builtin::Id
                | Builtin::SchemaId
                | Builtin::ValueType
                | Builtin::ErrorMessage
                | Builtin::ErrorSource => text(),
                Builtin::Outcome => FieldValue::Outcome(Outcome::default()),
                Builtin::StartedAt | Builtin::EndedAt | Builtin::CreatedAt => {
                    FieldValue::Instant(DateTime::<Utc>::default())
                }
                Builtin::ParametricIndex | Builtin::ErrorCode => FieldValue::Int(0),
            }),
        }
    }
}

/// Query executor for parsed filter queries
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryExecutor;

impl QueryExecutor {
    /// Create a new query executor
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Execute a query plan against one collection of the store
    ///
    /// # Arguments
    /// * `plan` - Parsed query plan from `QueryEngine::parse()`
    /// * `kind` - Collection to scan
    /// * `store` - Entity store holding the collection
    ///
    /// # Errors
    /// Returns `TypeMismatch` if a predicate or ordering applies an operator
    /// to a field whose type does not support it.
    pub fn execute(&self, plan: &QueryPlan, kind: EntityKind, store: &EntityStore) -> Result<Vec<Entity>> {
        self.execute_within(plan, kind, store, Deadline::NONE)
    }

    /// Execute a query plan, failing with `Timeout` once `deadline` passes.
    ///
    /// # Errors
    /// See [`QueryExecutor::execute`].
    pub fn execute_within(
        &self,
        plan: &QueryPlan,
        kind: EntityKind,
        store: &EntityStore,
        deadline: Deadline,
    ) -> Result<Vec<Entity>> {
        deadline.check("query")?;
        let filter = plan
            .filter
            .as_ref()
            .map(|p| Self::dereference_aliases(p, kind, store));
        let context = Context { kind, store };
        context.check_plan(filter.as_ref(), plan.order_by.as_ref())?;

        let mut matched: Vec<Arc<Entity>> = Vec::new();
        for (i, entity) in store.snapshot_all(kind).into_iter().enumerate() {
            if i % DEADLINE_STRIDE == 0 {
                deadline.check("query")?;
            }
            let keep = match &filter {
                Some(predicate) => context.evaluate(predicate, &entity)?,
                None => true,
            };
            if keep {
                matched.push(entity);
            }
        }

        if let Some(order_by) = &plan.order_by {
            context.sort(&mut matched, order_by)?;
        }
        if let Some(limit) = plan.limit {
            matched.truncate(limit);
        }
        deadline.check("query")?;

        debug!(kind = %kind, matched = matched.len(), "query executed");
        Ok(matched.into_iter().map(|e| e.as_ref().clone()).collect())
    }

    /// Replace alias names in string literals on `id` and relationship
    /// fields with the ids they resolve to. Unknown names are left as-is and
    /// simply match nothing.
    fn dereference_aliases(predicate: &Predicate, kind: EntityKind, store: &EntityStore) -> Predicate {
        let resolve = |field: &str, value: &Literal| -> Literal {
            let Literal::String(name) = value else {
                return value.clone();
            };
            let target = if field.eq_ignore_ascii_case("id") {
                Some(kind)
            } else {
                kind.relations()
                    .iter()
                    .find(|r| r.field.eq_ignore_ascii_case(field))
                    .map(|r| r.target)
            };
            target
                .and_then(|target| store.aliases().resolve_typed(name, target).ok())
                .map_or_else(|| value.clone(), Literal::String)
        };

        match predicate {
            Predicate::Compare { field, op, value } => Predicate::Compare {
                field: field.clone(),
                op: *op,
                value: resolve(field, value),
            },
            Predicate::Contains { field, value } => Predicate::Contains {
                field: field.clone(),
                value: resolve(field, value),
            },
            Predicate::And(a, b) => Predicate::And(
                Box::new(Self::dereference_aliases(a, kind, store)),
                Box::new(Self::dereference_aliases(b, kind, store)),
            ),
            Predicate::Or(a, b) => Predicate::Or(
                Box::new(Self::dereference_aliases(a, kind, store)),
                Box::new(Self::dereference_aliases(b, kind, store)),
            ),
            Predicate::Not(inner) => {
                Predicate::Not(Box::new(Self::dereference_aliases(inner, kind, store)))
            }
        }
    }
}

struct Context<'s> {
    kind: EntityKind,
    store: &'s EntityStore,
}

impl Context<'_> {
    /// Read a field off an entity; `None` if the entity lacks it.
    fn field<'e>(&self, entity: &'e Entity, field: &str) -> Option<FieldValue<'e>> {
        match FieldRef::resolve(self.kind, field) {
            FieldRef::Extension(path) => {
                let value = lookup_path(entity.extensions(), &path)?;
                let declared = self.store.effective_schema_id(entity).and_then(|schema_id| {
                    self.store
                        .schemas()
                        .field_type(&schema_id, self.kind.schema_section(), &path)
                });
                Some(FieldValue::Extension { value, declared })
            }
            FieldRef::Builtin(builtin) => match builtin {
                Builtin::Id => Some(FieldValue::Text(Cow::Borrowed(entity.id()))),
                Builtin::Outcome => Some(FieldValue::Outcome(entity.outcome())),
                Builtin::StartedAt => entity.started_at().map(FieldValue::Instant),
                Builtin::EndedAt => entity.ended_at().map(FieldValue::Instant),
                Builtin::CreatedAt => Some(FieldValue::Instant(entity.created_at())),
                Builtin::SchemaId => entity.schema_id().map(|s| FieldValue::Text(Cow::Borrowed(s))),
                Builtin::ParametricIndex => entity.parametric_index().map(FieldValue::Int),
                Builtin::ValueType => entity
                    .moniker()
                    .map(|m| FieldValue::Text(Cow::Owned(m.value_type().to_string()))),
                Builtin::ErrorCode => entity
                    .error_information()
                    .map(|e| FieldValue::Int(i64::from(e.error_code))),
                Builtin::ErrorMessage => entity
                    .error_information()
                    .map(|e| FieldValue::Text(Cow::Borrowed(e.message.as_str()))),
                Builtin::ErrorSource => entity
                    .error_information()
                    .map(|e| FieldValue::Text(Cow::Borrowed(e.source.as_str()))),
            },
            FieldRef::Relation(relation) => match relation.cardinality {
                Cardinality::One => entity
                    .link(relation.field)
                    .map(|id| FieldValue::Text(Cow::Borrowed(id))),
                Cardinality::Many => Some(FieldValue::Ids(entity.links(relation.field))),
            },
            FieldRef::Property(name) => entity
                .property(&name)
                .map(|p| FieldValue::Text(Cow::Borrowed(p))),
        }
    }

    /// Type-check every predicate and the ordering against fields whose
    /// type is fixed, so the outcome does not depend on what is stored.
    fn check_plan(&self, filter: Option<&Predicate>, order_by: Option<&OrderBy>) -> Result<()> {
        if let Some(predicate) = filter {
            self.check_predicate(predicate)?;
        }
        if let Some(order_by) = order_by {
            if let Some(witness) = FieldRef::resolve(self.kind, &order_by.field).type_witness() {
                key_of(witness, &order_by.field)?;
            }
        }
        Ok(())
    }

    fn check_predicate(&self, predicate: &Predicate) -> Result<()> {
        match predicate {
            Predicate::And(a, b) | Predicate::Or(a, b) => {
                self.check_predicate(a)?;
                self.check_predicate(b)
            }
            Predicate::Not(inner) => self.check_predicate(inner),
            Predicate::Compare { field, op, value } => {
                match FieldRef::resolve(self.kind, field).type_witness() {
                    Some(witness) => compare(&witness, *op, value, field).map(drop),
                    None => Ok(()),
                }
            }
            Predicate::Contains { field, value } => {
                match FieldRef::resolve(self.kind, field).type_witness() {
                    Some(witness) => contains(&witness, value, field).map(drop),
                    None => Ok(()),
                }
            }
        }
    }

    fn evaluate(&self, predicate: &Predicate, entity: &Entity) -> Result<bool> {
        match predicate {
            Predicate::And(a, b) => Ok(self.evaluate(a, entity)? && self.evaluate(b, entity)?),
            Predicate::Or(a, b) => Ok(self.evaluate(a, entity)? || self.evaluate(b, entity)?),
            Predicate::Not(inner) => Ok(!self.evaluate(inner, entity)?),
            Predicate::Compare { field, op, value } => match self.field(entity, field) {
                None => Ok(false),
                Some(actual) => compare(&actual, *op, value, field),
            },
            Predicate::Contains { field, value } => match self.field(entity, field) {
                None => Ok(false),
                Some(actual) => contains(&actual, value, field),
            },
        }
    }

    fn sort_key(&self, entity: &Entity, field: &str) -> Result<Option<SortKey>> {
        self.field(entity, field)
            .map(|value| key_of(value, field))
            .transpose()
    }


    /// Stable sort: ties keep creation order, entities lacking the field go
    /// last in either direction.
    fn sort(&self, entities: &mut Vec<Arc<Entity>>, order_by: &OrderBy) -> Result<()> {
        let mut keyed = Vec::with_capacity(entities.len());
        for entity in entities.drain(..) {
            let key = self.sort_key(&entity, &order_by.field)?;
            keyed.push((key, entity));
        }
        keyed.sort_by(|(a, _), (b, _)| match (a, b) {
            (Some(a), Some(b)) => match order_by.direction {
                OrderDirection::Asc => a.compare(b),
                OrderDirection::Desc => b.compare(a),
            },
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
        entities.extend(keyed.into_iter().map(|(_, entity)| entity));
        Ok(())
    }
}

#[allow(clippy::cast_precision_loss)]
fn key_of(value: FieldValue<'_>, field: &str) -> Result<SortKey> {
    Ok(match value {
        FieldValue::Text(s) => SortKey::Text(s.into_owned()),
        FieldValue::Int(i) => SortKey::Number(i as f64),
        FieldValue::Instant(t) => SortKey::Instant(t),
        FieldValue::Outcome(o) => SortKey::Number(f64::from(i32::from(o))),
        FieldValue::Ids(_) => {
            return Err(Error::type_mismatch("sortable field", format!("{field} (id list)")))
        }
        FieldValue::Extension { value, declared } => match (declared, value.as_f64()) {
            (Some(PrimitiveType::Int | PrimitiveType::Float), Some(n)) => SortKey::Number(n),
            _ => SortKey::Text(value.to_string()),
        },
    })
}

fn mismatch(field: &str, actual: &FieldValue<'_>, op: &str, literal: &Literal) -> Error {
    Error::type_mismatch(
        format!("{} operand for `{field}` ({op})", actual.type_name()),
        literal.type_name(),
    )
}

#[allow(clippy::cast_precision_loss)]
fn compare_numbers(actual: i64, literal: &Literal) -> Option<Ordering> {
    match literal {
        Literal::Int(i) => Some(actual.cmp(i)),
        Literal::Float(f) => (actual as f64).partial_cmp(f),
        _ => None,
    }
}

fn compare(actual: &FieldValue<'_>, op: CompareOp, literal: &Literal, field: &str) -> Result<bool> {
    let ordering = match actual {
        FieldValue::Text(text) => literal
            .as_text()
            .map(|s| text.as_ref().cmp(s))
            .ok_or_else(|| mismatch(field, actual, op.as_str(), literal))?,
        FieldValue::Int(i) => compare_numbers(*i, literal)
            .ok_or_else(|| mismatch(field, actual, op.as_str(), literal))?,
        FieldValue::Instant(t) => {
            let other = match literal {
                Literal::DateTime(other) => *other,
                Literal::String(s) => DateTime::parse_from_rfc3339(s)
                    .map(|d| d.with_timezone(&Utc))
                    .map_err(|_| mismatch(field, actual, op.as_str(), literal))?,
                _ => return Err(mismatch(field, actual, op.as_str(), literal)),
            };
            t.cmp(&other)
        }
        FieldValue::Outcome(outcome) => {
            if op.is_ordering() {
                return Err(mismatch(field, actual, op.as_str(), literal));
            }
            let other = match literal {
                Literal::String(s) => s.parse::<Outcome>(),
                Literal::Int(i) => i32::try_from(*i)
                    .map_err(|_| Error::InvalidInput(format!("{i} is not an outcome")))
                    .and_then(Outcome::try_from),
                _ => return Err(mismatch(field, actual, op.as_str(), literal)),
            }
            .map_err(|_| mismatch(field, actual, op.as_str(), literal))?;
            outcome.cmp(&other)
        }
        FieldValue::Ids(_) => return Err(mismatch(field, actual, op.as_str(), literal)),
        FieldValue::Extension { value, declared } => {
            match compare_extension(value, *declared, op, literal) {
                Ok(Some(ordering)) => ordering,
                Ok(None) => return Ok(false),
                Err(()) => return Err(mismatch(field, actual, op.as_str(), literal)),
            }
        }
    };
    Ok(op.test(ordering))
}

/// Typed comparison when the schema declares a type, raw string comparison
/// otherwise. `Ok(None)` means the stored value does not fit the declared
/// type (the entity predates the schema) and the predicate is false.
#[allow(clippy::cast_precision_loss)]
fn compare_extension(
    value: &ExtensionValue,
    declared: Option<PrimitiveType>,
    op: CompareOp,
    literal: &Literal,
) -> std::result::Result<Option<Ordering>, ()> {
    let Some(ty) = declared else {
        return Ok(Some(value.to_string().as_str().cmp(literal.to_string().as_str())));
    };
    match ty {
        PrimitiveType::String => {
            let other = literal.as_text().ok_or(())?;
            Ok(match value {
                ExtensionValue::String(s) => Some(s.as_str().cmp(other)),
                _ => None,
            })
        }
        PrimitiveType::Int | PrimitiveType::Float => {
            let other = match literal {
                Literal::Int(i) => {
                    if let ExtensionValue::Int(own) = value {
                        return Ok(Some(own.cmp(i)));
                    }
                    *i as f64
                }
                Literal::Float(f) => *f,
                _ => return Err(()),
            };
            Ok(value.as_f64().and_then(|own| own.partial_cmp(&other)))
        }
        PrimitiveType::Bool => {
            if op.is_ordering() {
                return Err(());
            }
            let Literal::Bool(other) = literal else {
                return Err(());
            };
            Ok(match value {
                ExtensionValue::Bool(own) => Some(own.cmp(other)),
                _ => None,
            })
        }
    }
}

fn contains(actual: &FieldValue<'_>, literal: &Literal, field: &str) -> Result<bool> {
    let needle = literal
        .as_text()
        .ok_or_else(|| mismatch(field, actual, "contains", literal))?;
    match actual {
        FieldValue::Text(text) => Ok(text.contains(needle)),
        FieldValue::Ids(ids) => Ok(ids.iter().any(|id| id == needle)),
        FieldValue::Extension { value, declared } => match declared {
            None => Ok(value.to_string().contains(needle)),
            Some(PrimitiveType::String) => Ok(matches!(value, ExtensionValue::String(s) if s.contains(needle))),
            Some(_) => Err(mismatch(field, actual, "contains", literal)),
        },
        _ => Err(mismatch(field, actual, "contains", literal)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::AliasResolver;
    use crate::entity::NewEntity;
    use crate::query::QueryEngine;
    use crate::schema::{ExtensionSchema, FieldRule, SchemaRegistry};

    fn store() -> EntityStore {
        EntityStore::new(
            Arc::new(SchemaRegistry::new()),
            Arc::new(AliasResolver::new()),
            None,
        )
    }

    fn run(store: &EntityStore, kind: EntityKind, text: &str) -> Result<Vec<Entity>> {
        let plan = QueryEngine::new().parse(text)?;
        QueryExecutor::new().execute(&plan, kind, store)
    }

    fn names(entities: &[Entity]) -> Vec<&str> {
        entities.iter().filter_map(Entity::name).collect()
    }

    fn seed_items(store: &EntityStore) {
        for (name, bandwidth) in [("dmm", 100), ("scope", 1000), ("psu", 0), ("smu", 100)] {
            store
                .create(
                    NewEntity::new(EntityKind::HardwareItem)
                        .property("name", name)
                        .extension("bandwidth", bandwidth),
                )
                .unwrap();
        }
    }

    #[test]
    fn test_no_filter_returns_creation_order() {
        let store = store();
        seed_items(&store);
        let all = run(&store, EntityKind::HardwareItem, "").unwrap();
        assert_eq!(names(&all), vec!["dmm", "scope", "psu", "smu"]);
    }

    #[test]
    fn test_property_filter_is_case_sensitive() {
        let store = store();
        seed_items(&store);
        assert_eq!(names(&run(&store, EntityKind::HardwareItem, "Name eq 'dmm'").unwrap()), vec!["dmm"]);
        assert!(run(&store, EntityKind::HardwareItem, "name eq 'DMM'").unwrap().is_empty());
        assert_eq!(
            names(&run(&store, EntityKind::HardwareItem, "contains(name, 'm')").unwrap()),
            vec!["dmm", "smu"]
        );
    }

    #[test]
    fn test_untyped_extension_compares_as_string() {
        let store = store();
        seed_items(&store);
        // "1000" < "200" as strings
        let result = run(&store, EntityKind::HardwareItem, "extensions.bandwidth lt '200'").unwrap();
        assert_eq!(names(&result), vec!["dmm", "scope", "psu", "smu"]);
    }

    #[test]
    fn test_typed_extension_compares_numerically() {
        let store = store();
        store
            .schemas()
            .register(
                ExtensionSchema::new("S")
                    .field("hardware_item.bandwidth", FieldRule::optional().typed(PrimitiveType::Int)),
            )
            .unwrap();
        for (name, bandwidth) in [("a", 1000), ("b", 50)] {
            store
                .create(
                    NewEntity::new(EntityKind::HardwareItem)
                        .schema_id("S")
                        .property("name", name)
                        .extension("bandwidth", bandwidth),
                )
                .unwrap();
        }
        let result = run(&store, EntityKind::HardwareItem, "extensions/bandwidth gt 200").unwrap();
        assert_eq!(names(&result), vec!["a"]);

        let mismatch = run(&store, EntityKind::HardwareItem, "extensions.bandwidth gt 'big'");
        assert!(matches!(mismatch, Err(Error::TypeMismatch { .. })));
    }

    #[test]
    fn test_missing_field_fails_predicate() {
        let store = store();
        seed_items(&store);
        store
            .create(NewEntity::new(EntityKind::HardwareItem).property("name", "bare"))
            .unwrap();
        let result = run(&store, EntityKind::HardwareItem, "extensions.bandwidth eq '100'").unwrap();
        assert_eq!(names(&result), vec!["dmm", "smu"]);
        let negated = run(&store, EntityKind::HardwareItem, "not extensions.bandwidth eq '100'").unwrap();
        assert_eq!(names(&negated), vec!["scope", "psu", "bare"]);
    }

    #[test]
    fn test_order_by_is_stable_and_limited() {
        let store = store();
        seed_items(&store);
        let result = run(
            &store,
            EntityKind::HardwareItem,
            "$orderby=extensions.bandwidth desc&$top=3",
        )
        .unwrap();
        // untyped extensions order as strings; ties keep creation order
        assert_eq!(names(&result), vec!["scope", "dmm", "smu"]);
    }

    #[test]
    fn test_entities_missing_sort_key_go_last() {
        let store = store();
        store
            .create(NewEntity::new(EntityKind::Operator).property("name", "nobody"))
            .unwrap();
        store
            .create(
                NewEntity::new(EntityKind::Operator)
                    .property("name", "b")
                    .property("role", "tech"),
            )
            .unwrap();
        store
            .create(
                NewEntity::new(EntityKind::Operator)
                    .property("name", "a")
                    .property("role", "admin"),
            )
            .unwrap();
        for direction in ["asc", "desc"] {
            let result = run(&store, EntityKind::Operator, &format!("$orderby=role {direction}")).unwrap();
            assert_eq!(names(&result).last(), Some(&"nobody"));
        }
    }

    #[test]
    fn test_outcome_comparisons() {
        let store = store();
        store
            .create(NewEntity::new(EntityKind::TestResult).outcome(Outcome::Failed).property("name", "f"))
            .unwrap();
        store
            .create(NewEntity::new(EntityKind::TestResult).outcome(Outcome::Passed).property("name", "p"))
            .unwrap();
        assert_eq!(names(&run(&store, EntityKind::TestResult, "outcome eq 'FAILED'").unwrap()), vec!["f"]);
        assert_eq!(names(&run(&store, EntityKind::TestResult, "outcome eq 1").unwrap()), vec!["p"]);
        assert!(matches!(
            run(&store, EntityKind::TestResult, "outcome gt 1"),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_type_errors_do_not_depend_on_stored_data() {
        let store = store();
        for text in [
            "outcome gt 1",
            "id eq 'nope' and outcome gt 1",
            "not (started_at gt 5)",
            "name eq 7 or outcome eq 'PASSED'",
            "contains(parametric_index, '1')",
            "hardware_item_ids eq 'x'",
            "$orderby=hardware_item_ids",
        ] {
            assert!(
                matches!(run(&store, EntityKind::TestResult, text), Err(Error::TypeMismatch { .. })),
                "{text} on an empty collection"
            );
        }

        store
            .create(NewEntity::new(EntityKind::TestResult).property("name", "only"))
            .unwrap();
        assert!(matches!(
            run(&store, EntityKind::TestResult, "id eq 'nope' and outcome gt 1"),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(run(&store, EntityKind::TestResult, "extensions.anything gt 1").unwrap().is_empty());
    }

    #[test]
    fn test_relationship_list_contains_with_alias() {
        let store = store();
        let dmm = store.create(NewEntity::new(EntityKind::HardwareItem)).unwrap();
        let psu = store.create(NewEntity::new(EntityKind::HardwareItem)).unwrap();
        store.aliases().create("bench-dmm", EntityKind::HardwareItem, dmm.clone()).unwrap();

        store
            .create(
                NewEntity::new(EntityKind::TestResult)
                    .property("name", "with-dmm")
                    .links("hardware_item_ids", [dmm.as_str(), psu.as_str()]),
            )
            .unwrap();
        store
            .create(
                NewEntity::new(EntityKind::TestResult)
                    .property("name", "psu-only")
                    .links("hardware_item_ids", [psu.as_str()]),
            )
            .unwrap();

        let by_alias = run(&store, EntityKind::TestResult, "contains(hardware_item_ids, 'bench-dmm')").unwrap();
        assert_eq!(names(&by_alias), vec!["with-dmm"]);
        let by_id = run(&store, EntityKind::TestResult, &format!("contains(hardware_item_ids, {psu})")).unwrap();
        assert_eq!(names(&by_id), vec!["with-dmm", "psu-only"]);
        assert!(matches!(
            run(&store, EntityKind::TestResult, "hardware_item_ids eq 'x'"),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_id_filter_accepts_alias() {
        let store = store();
        let id = store
            .create(NewEntity::new(EntityKind::Operator).property("name", "ada"))
            .unwrap();
        store.aliases().create("lead", EntityKind::Operator, id).unwrap();
        assert_eq!(names(&run(&store, EntityKind::Operator, "id eq 'lead'").unwrap()), vec!["ada"]);
    }

    #[test]
    fn test_timestamp_comparison() {
        let store = store();
        let early: DateTime<Utc> = "2024-01-01T00:00:00Z".parse().unwrap();
        let late: DateTime<Utc> = "2024-06-01T00:00:00Z".parse().unwrap();
        for (name, at) in [("late", late), ("early", early)] {
            store
                .create(NewEntity::new(EntityKind::TestResult).property("name", name).started_at(at))
                .unwrap();
        }
        let result = run(
            &store,
            EntityKind::TestResult,
            "$filter=started_at gt 2024-03-01T00:00:00Z",
        )
        .unwrap();
        assert_eq!(names(&result), vec!["late"]);
        let ordered = run(&store, EntityKind::TestResult, "$orderby=start_date_time").unwrap();
        assert_eq!(names(&ordered), vec!["early", "late"]);
    }

    #[test]
    fn test_expired_deadline_times_out() {
        let store = store();
        seed_items(&store);
        let plan = QueryPlan::default();
        let result = QueryExecutor::new().execute_within(
            &plan,
            EntityKind::HardwareItem,
            &store,
            Deadline::at(std::time::Instant::now()),
        );
        assert!(matches!(result, Err(Error::Timeout(_))));
    }
}
