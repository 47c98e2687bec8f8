//! Entity Store - referential-integrity engine for every entity kind
//!
//! ## Design
//!
//! One concurrent table per kind holds immutable `Arc<Entity>` snapshots.
//! A create or update builds a complete new record off to the side and
//! publishes it with a single insert, so readers (including a child create
//! walking its ancestors for schema inheritance) always see a whole record.
//!
//! Updates to one id are serialized by a per-id mutex acquired with the
//! caller's deadline. Creates never contend: each gets a fresh id.
//!
//! The step tree (steps, measurements, conditions) has one more lock.
//! Creates and updates in the tree share it; an update that relinks a step
//! takes it exclusively, so a tree check never races a concurrent move.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use rustc_hash::{FxBuildHasher, FxHashSet};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{Cardinality, Entity, EntityKind, EntityPatch, EntityRef, NewEntity};
use crate::alias::AliasResolver;
use crate::config::Deadline;
use crate::schema::{effective_schema_id, SchemaAncestor, SchemaRegistry};
use crate::{Error, Result};

type Table = DashMap<String, Arc<Entity>, FxBuildHasher>;

const TEST_RESULT_ID: &str = "test_result_id";
const STEP_ID: &str = "step_id";
const PARENT_STEP_ID: &str = "parent_step_id";

/// Store for all entity kinds.
#[derive(Debug)]
pub struct EntityStore {
    tables: [Table; EntityKind::ALL.len()],
    update_locks: DashMap<String, Arc<Mutex<()>>, FxBuildHasher>,
    hierarchy: RwLock<()>,
    sequence: AtomicU64,
    schemas: Arc<SchemaRegistry>,
    aliases: Arc<AliasResolver>,
    default_timeout: Option<Duration>,
}

impl EntityStore {
    /// Create an empty store validating against `schemas` and resolving
    /// references through `aliases`.
    #[must_use]
    pub fn new(
        schemas: Arc<SchemaRegistry>,
        aliases: Arc<AliasResolver>,
        default_timeout: Option<Duration>,
    ) -> Self {
        Self {
            tables: std::array::from_fn(|_| Table::default()),
            update_locks: DashMap::default(),
            hierarchy: RwLock::new(()),
            sequence: AtomicU64::new(0),
            schemas,
            aliases,
            default_timeout,
        }
    }

    /// Schema registry used for validation.
    #[must_use]
    pub fn schemas(&self) -> &Arc<SchemaRegistry> {
        &self.schemas
    }

    /// Alias resolver used for id-or-alias inputs.
    #[must_use]
    pub fn aliases(&self) -> &Arc<AliasResolver> {
        &self.aliases
    }

    fn default_deadline(&self) -> Deadline {
        self.default_timeout.map_or(Deadline::NONE, Deadline::after)
    }

    fn table(&self, kind: EntityKind) -> &Table {
        &self.tables[kind.index()]
    }

    fn share_hierarchy(&self, deadline: Deadline) -> Result<RwLockReadGuard<'_, ()>> {
        match deadline.instant() {
            Some(instant) => self
                .hierarchy
                .try_read_until(instant)
                .ok_or_else(|| Error::Timeout("step tree lock".to_string())),
            None => Ok(self.hierarchy.read()),
        }
    }

    fn own_hierarchy(&self, deadline: Deadline) -> Result<RwLockWriteGuard<'_, ()>> {
        match deadline.instant() {
            Some(instant) => self
                .hierarchy
                .try_write_until(instant)
                .ok_or_else(|| Error::Timeout("step tree lock".to_string())),
            None => Ok(self.hierarchy.write()),
        }
    }

    /// Committed snapshot of one entity.
    pub(crate) fn snapshot(&self, kind: EntityKind, id: &str) -> Option<Arc<Entity>> {
        self.table(kind).get(id).map(|e| Arc::clone(e.value()))
    }

    /// Committed snapshots of one kind in creation order.
    pub(crate) fn snapshot_all(&self, kind: EntityKind) -> Vec<Arc<Entity>> {
        let mut entities: Vec<Arc<Entity>> = self
            .table(kind)
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        entities.sort_by_key(|e| e.sequence);
        entities
    }

    /// Create an entity and return its new id.
    ///
    /// # Errors
    ///
    /// `DanglingReference` for missing, unresolvable or wrong-kind references,
    /// `InvalidInput` for unknown relationship fields, `NotFound` for an unknown
    /// schema, `Validation` for schema violations, `Timeout` if the default
    /// deadline passes first.
    pub fn create(&self, request: NewEntity) -> Result<String> {
        self.create_within(request, self.default_deadline())
    }

    /// Create an entity, giving up with `Timeout` once `deadline` passes.
    ///
    /// # Errors
    ///
    /// See [`EntityStore::create`].
    pub fn create_within(&self, request: NewEntity, deadline: Deadline) -> Result<String> {
        let kind = request.kind;
        let result = self.try_create(request, deadline);
        match &result {
            Ok(id) => debug!(kind = %kind, id = %id, "entity created"),
            Err(e) => warn!(kind = %kind, error = %e, "entity create rejected"),
        }
        result
    }

    fn try_create(&self, request: NewEntity, deadline: Deadline) -> Result<String> {
        deadline.check("create")?;
        let _tree = if in_step_tree(request.kind) {
            Some(self.share_hierarchy(deadline)?)
        } else {
            None
        };
        let entity = self.prepare(request)?;
        deadline.check("create")?;
        Ok(self.commit(entity))
    }

    /// Create several entities together: either all are stored or none is.
    ///
    /// # Errors
    ///
    /// As [`EntityStore::create`], for the first failing request.
    pub fn create_batch(&self, requests: Vec<NewEntity>) -> Result<Vec<String>> {
        self.create_batch_within(requests, self.default_deadline())
    }

    /// [`EntityStore::create_batch`] under an explicit deadline.
    ///
    /// # Errors
    ///
    /// See [`EntityStore::create`].
    pub fn create_batch_within(&self, requests: Vec<NewEntity>, deadline: Deadline) -> Result<Vec<String>> {
        deadline.check("create batch")?;
        let count = requests.len();
        let _tree = if requests.iter().any(|r| in_step_tree(r.kind)) {
            Some(self.share_hierarchy(deadline)?)
        } else {
            None
        };
        let prepared = requests
            .into_iter()
            .map(|request| self.prepare(request))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| {
                warn!(count, error = %e, "entity batch rejected");
                e
            })?;
        deadline.check("create batch")?;

        let ids: Vec<String> = prepared.into_iter().map(|entity| self.commit(entity)).collect();
        debug!(count, "entity batch created");
        Ok(ids)
    }

    /// Resolve, check and validate a create request into a complete record.
    fn prepare(&self, request: NewEntity) -> Result<Entity> {
        let kind = request.kind;

        let mut links = self.resolve_links(kind, &request.links)?;
        self.check_hierarchy(kind, None, &mut links)?;

        let schema_id = self.effective_schema(kind, request.schema_id.as_deref(), &links);
        if let Some(schema_id) = &schema_id {
            self.schemas
                .validate(&request.extensions, schema_id, kind.schema_section())?;
        }

        Ok(Entity {
            id: Uuid::new_v4().to_string(),
            kind,
            sequence: 0,
            created_at: Utc::now(),
            properties: request.properties,
            links,
            extensions: request.extensions,
            schema_id: request.schema_id,
            outcome: request.outcome,
            started_at: request.started_at,
            ended_at: request.ended_at,
            error_information: request.error_information,
            moniker: request.moniker,
        })
    }

    /// Single commit point: stamp creation order and publish the record.
    fn commit(&self, mut entity: Entity) -> String {
        entity.sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let id = entity.id.clone();
        self.table(entity.kind).insert(id.clone(), Arc::new(entity));
        id
    }

    /// Get an entity by id or alias.
    ///
    /// # Errors
    ///
    /// `NotFound` if no entity of `kind` has the id (or the alias is unknown),
    /// `TypeMismatch` if the alias targets another kind.
    pub fn get(&self, kind: EntityKind, reference: impl Into<EntityRef>) -> Result<Entity> {
        let id = match reference.into() {
            EntityRef::Id(id) => id,
            EntityRef::Alias(name) => self.aliases.resolve_typed(&name, kind)?,
        };
        self.snapshot(kind, &id)
            .map(|e| e.as_ref().clone())
            .ok_or_else(|| Error::not_found(kind.as_str(), id))
    }

    /// Find the kind of a stored id.
    fn locate(&self, id: &str) -> Option<EntityKind> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| self.table(*kind).contains_key(id))
    }

    /// Apply a partial update and return the committed record.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, `Validation` if the merged extensions
    /// violate the effective schema, `DanglingReference` for replaced links
    /// that do not resolve, `Timeout` if the default deadline passes first.
    pub fn update(&self, reference: impl Into<EntityRef>, patch: &EntityPatch) -> Result<Entity> {
        self.update_within(reference, patch, self.default_deadline())
    }

    /// Apply a partial update, giving up with `Timeout` once `deadline`
    /// passes. Nothing is committed on failure.
    ///
    /// # Errors
    ///
    /// See [`EntityStore::update`].
    pub fn update_within(
        &self,
        reference: impl Into<EntityRef>,
        patch: &EntityPatch,
        deadline: Deadline,
    ) -> Result<Entity> {
        let (kind, id) = match reference.into() {
            EntityRef::Id(id) => {
                let kind = self
                    .locate(&id)
                    .ok_or_else(|| Error::not_found("entity", id.clone()))?;
                (kind, id)
            }
            EntityRef::Alias(name) => self.aliases.resolve(&name)?,
        };

        let result = self.try_update(kind, &id, patch, deadline);
        match &result {
            Ok(_) => debug!(kind = %kind, id = %id, "entity updated"),
            Err(e) => warn!(kind = %kind, id = %id, error = %e, "entity update rejected"),
        }
        result
    }

    fn try_update(
        &self,
        kind: EntityKind,
        id: &str,
        patch: &EntityPatch,
        deadline: Deadline,
    ) -> Result<Entity> {
        let lock = Arc::clone(
            self.update_locks
                .entry(id.to_string())
                .or_default()
                .value(),
        );
        let result = self.update_locked(&lock, kind, id, patch, deadline);
        // Only this call and the map still hold the mutex: nobody waits on it
        self.update_locks
            .remove_if(id, |_, held| Arc::strong_count(held) == 2);
        result
    }

    fn update_locked(
        &self,
        lock: &Mutex<()>,
        kind: EntityKind,
        id: &str,
        patch: &EntityPatch,
        deadline: Deadline,
    ) -> Result<Entity> {
        let _guard = match deadline.instant() {
            Some(instant) => lock
                .try_lock_until(instant)
                .ok_or_else(|| Error::Timeout(format!("update {id}")))?,
            None => lock.lock(),
        };
        let relinks = !patch.links.is_empty() && in_step_tree(kind);
        let _moving_step = if relinks && kind == EntityKind::Step {
            Some(self.own_hierarchy(deadline)?)
        } else {
            None
        };
        let _tree = if relinks && kind != EntityKind::Step {
            Some(self.share_hierarchy(deadline)?)
        } else {
            None
        };

        let current = self
            .snapshot(kind, id)
            .ok_or_else(|| Error::not_found(kind.as_str(), id))?;
        let mut next = current.as_ref().clone();
        patch.merge_into(&mut next);

        if !patch.links.is_empty() {
            let mut requested: BTreeMap<String, Vec<EntityRef>> = next
                .links
                .iter()
                .map(|(field, ids)| {
                    let refs = ids.iter().map(|i| EntityRef::Id(i.clone())).collect();
                    (field.clone(), refs)
                })
                .collect();
            // A moved measurement or condition takes its test result from the new step
            if matches!(kind, EntityKind::Measurement | EntityKind::Condition)
                && patch.links.contains_key(STEP_ID)
                && !patch.links.contains_key(TEST_RESULT_ID)
            {
                requested.remove(TEST_RESULT_ID);
            }
            requested.extend(patch.links.clone());

            let mut links = self.resolve_links(kind, &requested)?;
            self.check_hierarchy(kind, Some(id), &mut links)?;
            if kind == EntityKind::Step
                && first_link(&links, TEST_RESULT_ID) != current.link(TEST_RESULT_ID)
                && self.has_dependents(id)
            {
                return Err(Error::InvalidInput(format!(
                    "step {id} has child steps, measurements or conditions; its test result cannot change"
                )));
            }
            next.links = links;
        }

        let schema_id = self.effective_schema(kind, next.schema_id.as_deref(), &next.links);
        if let Some(schema_id) = &schema_id {
            self.schemas
                .validate(&next.extensions, schema_id, kind.schema_section())?;
        }

        deadline.check("update")?;
        self.table(kind).insert(id.to_string(), Arc::new(next.clone()));
        Ok(next)
    }

    /// Whether any step, measurement or condition hangs off step `id`.
    fn has_dependents(&self, id: &str) -> bool {
        let points_at = |kind: EntityKind, field: &str| {
            self.table(kind)
                .iter()
                .any(|e| e.value().link(field) == Some(id))
        };
        points_at(EntityKind::Step, PARENT_STEP_ID)
            || points_at(EntityKind::Measurement, STEP_ID)
            || points_at(EntityKind::Condition, STEP_ID)
    }

    /// All entities of a kind in creation order.
    #[must_use]
    pub fn list(&self, kind: EntityKind) -> Vec<Entity> {
        self.snapshot_all(kind)
            .into_iter()
            .map(|e| e.as_ref().clone())
            .collect()
    }

    /// Number of stored entities of a kind.
    #[must_use]
    pub fn count(&self, kind: EntityKind) -> usize {
        self.table(kind).len()
    }

    /// Total number of stored entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.iter().map(DashMap::len).sum()
    }

    /// Check if no entities are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(DashMap::is_empty)
    }

    /// Schema id that applies to a stored entity: its own, else the one
    /// inherited from its test result.
    #[must_use]
    pub fn effective_schema_id(&self, entity: &Entity) -> Option<String> {
        self.effective_schema(entity.kind, entity.schema_id(), &entity.links)
    }

    fn effective_schema(
        &self,
        kind: EntityKind,
        own: Option<&str>,
        links: &BTreeMap<String, Vec<String>>,
    ) -> Option<String> {
        let step_field = match kind {
            EntityKind::Step => PARENT_STEP_ID,
            EntityKind::Measurement | EntityKind::Condition => STEP_ID,
            _ => return own.map(str::to_string),
        };

        let step = first_link(links, step_field).and_then(|id| self.snapshot(EntityKind::Step, id));
        let test_result =
            first_link(links, TEST_RESULT_ID).and_then(|id| self.snapshot(EntityKind::TestResult, id));

        let mut ancestry = Vec::with_capacity(2);
        if let Some(step) = &step {
            ancestry.push(SchemaAncestor::local(step.schema_id()));
        }
        if let Some(test_result) = &test_result {
            ancestry.push(SchemaAncestor::root(test_result.schema_id()));
        }
        effective_schema_id(own, &ancestry).map(str::to_string)
    }

    /// Resolve id-or-alias inputs and check every target exists with the
    /// declared kind.
    fn resolve_links(
        &self,
        kind: EntityKind,
        requested: &BTreeMap<String, Vec<EntityRef>>,
    ) -> Result<BTreeMap<String, Vec<String>>> {
        let mut resolved = BTreeMap::new();

        for (field, refs) in requested {
            let relation = kind.relation(field).ok_or_else(|| {
                Error::InvalidInput(format!("{kind} has no relationship field `{field}`"))
            })?;
            if relation.cardinality == Cardinality::One && refs.len() > 1 {
                return Err(Error::InvalidInput(format!(
                    "`{field}` holds a single id, got {}",
                    refs.len()
                )));
            }

            let mut ids = Vec::with_capacity(refs.len());
            for reference in refs {
                let id = match reference {
                    EntityRef::Id(id) => id.clone(),
                    EntityRef::Alias(name) => self
                        .aliases
                        .resolve_typed(name, relation.target)
                        .map_err(|e| Error::dangling(field.as_str(), format!("alias '{name}': {e}")))?,
                };
                if !self.table(relation.target).contains_key(&id) {
                    return Err(Error::dangling(
                        field.as_str(),
                        format!("no {} with id {id}", relation.target),
                    ));
                }
                ids.push(id);
            }
            if !ids.is_empty() {
                resolved.insert(field.clone(), ids);
            }
        }

        for relation in kind.relations().iter().filter(|r| r.required) {
            if !resolved.contains_key(relation.field) {
                return Err(Error::dangling(relation.field, "required reference is missing"));
            }
        }
        Ok(resolved)
    }

    /// Cross-entity rules that go beyond existence: a parent step must share
    /// the child's test result and must not descend from the child, and a
    /// measurement or condition belongs to its step's test result.
    ///
    /// `own_id` is the entity being updated, `None` on create.
    fn check_hierarchy(
        &self,
        kind: EntityKind,
        own_id: Option<&str>,
        links: &mut BTreeMap<String, Vec<String>>,
    ) -> Result<()> {
        match kind {
            EntityKind::Step => {
                if let Some(parent_id) = first_link(links, PARENT_STEP_ID) {
                    let parent = self
                        .snapshot(EntityKind::Step, parent_id)
                        .ok_or_else(|| Error::dangling(PARENT_STEP_ID, format!("no Step with id {parent_id}")))?;
                    if parent.link(TEST_RESULT_ID) != first_link(links, TEST_RESULT_ID) {
                        return Err(Error::dangling(
                            PARENT_STEP_ID,
                            format!("step {parent_id} belongs to a different test result"),
                        ));
                    }
                    if let Some(own_id) = own_id {
                        self.check_acyclic(own_id, parent_id)?;
                    }
                }
            }
            EntityKind::Measurement | EntityKind::Condition => {
                let Some(step_id) = first_link(links, STEP_ID).map(str::to_string) else {
                    return Ok(());
                };
                let step = self
                    .snapshot(EntityKind::Step, &step_id)
                    .ok_or_else(|| Error::dangling(STEP_ID, format!("no Step with id {step_id}")))?;
                let Some(step_result) = step.link(TEST_RESULT_ID) else {
                    return Ok(());
                };
                match first_link(links, TEST_RESULT_ID).map(str::to_string) {
                    None => {
                        links.insert(TEST_RESULT_ID.to_string(), vec![step_result.to_string()]);
                    }
                    Some(given) if given != step_result => {
                        return Err(Error::dangling(
                            TEST_RESULT_ID,
                            format!("test result {given} does not own step {step_id}"),
                        ));
                    }
                    Some(_) => {}
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Walk up from `parent_id`; reaching `own_id` means the new link would
    /// close a loop.
    fn check_acyclic(&self, own_id: &str, parent_id: &str) -> Result<()> {
        let mut seen = FxHashSet::default();
        let mut cursor = Some(parent_id.to_string());
        while let Some(step_id) = cursor {
            if step_id == own_id {
                return Err(Error::dangling(
                    PARENT_STEP_ID,
                    format!("step {parent_id} is {own_id} or one of its descendants"),
                ));
            }
            if !seen.insert(step_id.clone()) {
                break;
            }
            cursor = self
                .snapshot(EntityKind::Step, &step_id)
                .and_then(|step| step.link(PARENT_STEP_ID).map(str::to_string));
        }
        Ok(())
    }
}

const fn in_step_tree(kind: EntityKind) -> bool {
    matches!(kind, EntityKind::Step | EntityKind::Measurement | EntityKind::Condition)
}

fn first_link<'a>(links: &'a BTreeMap<String, Vec<String>>, field: &str) -> Option<&'a str> {
    links.get(field).and_then(|ids| ids.first()).map(String::as_str)
}
