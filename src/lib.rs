//! # datastore-core: Measurement and Metadata Store
//!
//! **Version**: 0.1.0
//!
//! The storage, validation and retrieval core of a test-measurement data
//! store. It records hierarchical test-execution data (test results, steps,
//! measurements, conditions) next to a graph of descriptive metadata
//! (operators, stations, units under test, hardware and software items) and
//! answers filter queries over both.
//!
//! ## Components
//!
//! - [`schema`]: extension schemas, validation and inheritance
//! - [`alias`]: human-readable names for metadata entities
//! - [`entity`]: typed entity graph with referential integrity
//! - [`moniker`]: indirect locators for published values
//! - [`query`]: filter expression parser and evaluator
//!
//! Transport adapters sit on top of [`DataStore`]; the core never sees the
//! wire format.
//!
//! ## Example Usage
//!
//! ```rust
//! use datastore_core::entity::{EntityKind, NewEntity};
//! use datastore_core::moniker::Value;
//! use datastore_core::publish::MeasurementOptions;
//! use datastore_core::DataStore;
//!
//! # async fn example() -> datastore_core::Result<()> {
//! let store = DataStore::builder().service_location("localhost:42000").build()?;
//!
//! let test_result = store.create(NewEntity::new(EntityKind::TestResult))?;
//! let step = store.create(
//!     NewEntity::new(EntityKind::Step)
//!         .property("name", "Power rail check")
//!         .link("test_result_id", test_result.as_str()),
//! )?;
//!
//! let measurement = store
//!     .publish_measurement(step.as_str(), "Vout", &Value::from(3.29), &MeasurementOptions::new())
//!     .await?;
//!
//! let found = store.query(EntityKind::Measurement, "$filter=name eq 'Vout'")?;
//! assert_eq!(found.len(), 1);
//! assert_eq!(found[0].link("test_result_id"), Some(test_result.as_str()));
//! # let _ = measurement;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod alias;
pub mod config;
pub mod entity;
pub mod error;
pub mod kv;
pub mod moniker;
pub mod publish;
pub mod query;
pub mod schema;
pub mod telemetry;
pub mod value;

pub use error::{Error, Result};

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use alias::{Alias, AliasResolver};
use config::{Deadline, StoreConfig};
use entity::{Entity, EntityKind, EntityPatch, EntityRef, EntityStore, NewEntity};
use kv::{KvStore, MemoryKvStore};
use moniker::{DataLocator, Moniker, Value, ValueType};
use publish::{ConditionSpec, MeasurementOptions};
use query::{QueryEngine, QueryExecutor};
use schema::{ExtensionSchema, SchemaRegistry};

/// Store instance wiring the schema registry, alias resolver, entity store,
/// data locator and query engine together.
#[derive(Debug)]
pub struct DataStore<S: KvStore = MemoryKvStore> {
    config: StoreConfig,
    entities: EntityStore,
    locator: DataLocator<S>,
    engine: QueryEngine,
    executor: QueryExecutor,
}

impl DataStore {
    /// Create a new store builder
    #[must_use]
    pub fn builder() -> DataStoreBuilder {
        DataStoreBuilder::default()
    }
}

/// Store builder
#[derive(Debug, Clone, Default)]
pub struct DataStoreBuilder {
    config: StoreConfig,
}

impl DataStoreBuilder {
    /// Set the service location stamped into monikers
    #[must_use]
    pub fn service_location(mut self, location: impl Into<String>) -> Self {
        self.config.service_location = location.into();
        self
    }

    /// Set the timeout applied when callers pass no deadline
    #[must_use]
    pub const fn default_timeout(mut self, timeout: Duration) -> Self {
        self.config.default_timeout = Some(timeout);
        self
    }

    /// Start from a loaded configuration
    #[must_use]
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Build a store with in-memory payload storage
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the configuration is unusable
    pub fn build(self) -> Result<DataStore> {
        self.build_with_store(MemoryKvStore::new())
    }

    /// Build a store over the given payload backend
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the configuration is unusable
    pub fn build_with_store<S: KvStore>(self, store: S) -> Result<DataStore<S>> {
        self.config.validate()?;
        let config = self.config;
        let entities = EntityStore::new(
            Arc::new(SchemaRegistry::new()),
            Arc::new(AliasResolver::new()),
            config.default_timeout,
        );
        let locator = DataLocator::new(store, config.service_location.clone())
            .with_default_timeout(config.default_timeout);
        debug!(service_location = %config.service_location, "data store ready");
        Ok(DataStore {
            config,
            entities,
            locator,
            engine: QueryEngine::new(),
            executor: QueryExecutor::new(),
        })
    }
}

impl<S: KvStore> DataStore<S> {
    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Underlying entity store.
    #[must_use]
    pub const fn entities(&self) -> &EntityStore {
        &self.entities
    }

    /// Underlying data locator.
    #[must_use]
    pub const fn locator(&self) -> &DataLocator<S> {
        &self.locator
    }

    fn schemas(&self) -> &SchemaRegistry {
        self.entities.schemas()
    }

    fn aliases(&self) -> &AliasResolver {
        self.entities.aliases()
    }

    // Schemas

    /// Register an extension schema and return its id.
    ///
    /// # Errors
    ///
    /// `Conflict` if the id is registered with different content,
    /// `ParseError` for an empty id.
    pub fn register_schema(&self, schema: ExtensionSchema) -> Result<String> {
        self.schemas().register(schema)
    }

    /// Get a registered schema.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id.
    pub fn get_schema(&self, schema_id: &str) -> Result<ExtensionSchema> {
        self.schemas().get(schema_id)
    }

    /// All registered schemas, ordered by id.
    #[must_use]
    pub fn list_schemas(&self) -> Vec<ExtensionSchema> {
        self.schemas().list()
    }

    // Aliases

    /// Register an alias. The target is not checked until resolution.
    ///
    /// # Errors
    ///
    /// `Conflict` if the name is taken, `InvalidInput` for an empty name or a
    /// kind that cannot be aliased.
    pub fn create_alias(
        &self,
        name: impl Into<String>,
        target_type: EntityKind,
        target_id: impl Into<String>,
    ) -> Result<Alias> {
        self.aliases().create(name, target_type, target_id)
    }

    /// Get an alias record.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown name.
    pub fn get_alias(&self, name: &str) -> Result<Alias> {
        self.aliases().get(name)
    }

    /// Resolve an alias to `(kind, id)`.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown name.
    pub fn resolve_alias(&self, name: &str) -> Result<(EntityKind, String)> {
        self.aliases().resolve(name)
    }

    /// Resolve an alias that must target `expected`.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown name, `TypeMismatch` for another kind.
    pub fn resolve_alias_typed(&self, name: &str, expected: EntityKind) -> Result<String> {
        self.aliases().resolve_typed(name, expected)
    }

    /// Remove an alias. Returns whether it existed.
    pub fn delete_alias(&self, name: &str) -> bool {
        self.aliases().delete(name)
    }

    /// All aliases, ordered by name.
    #[must_use]
    pub fn list_aliases(&self) -> Vec<Alias> {
        self.aliases().list()
    }

    // Entities

    /// Create an entity and return its id.
    ///
    /// # Errors
    ///
    /// See [`EntityStore::create`].
    pub fn create(&self, request: NewEntity) -> Result<String> {
        self.entities.create_within(request, self.config.deadline())
    }

    /// Create an entity under an explicit deadline.
    ///
    /// # Errors
    ///
    /// See [`EntityStore::create`].
    pub fn create_within(&self, request: NewEntity, deadline: Deadline) -> Result<String> {
        self.entities.create_within(request, deadline)
    }

    /// Get an entity by id or alias.
    ///
    /// # Errors
    ///
    /// See [`EntityStore::get`].
    pub fn get(&self, kind: EntityKind, reference: impl Into<EntityRef>) -> Result<Entity> {
        self.entities.get(kind, reference)
    }

    /// Apply a partial update and return the updated entity.
    ///
    /// # Errors
    ///
    /// See [`EntityStore::update`].
    pub fn update(&self, reference: impl Into<EntityRef>, patch: &EntityPatch) -> Result<Entity> {
        self.entities
            .update_within(reference, patch, self.config.deadline())
    }

    /// Apply a partial update under an explicit deadline.
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
        self.entities.update_within(reference, patch, deadline)
    }

    /// All entities of a kind in creation order.
    #[must_use]
    pub fn list(&self, kind: EntityKind) -> Vec<Entity> {
        self.entities.list(kind)
    }

    // Publishing

    /// Drop payloads whose entity never got committed.
    async fn discard_payloads(&self, monikers: &[Moniker]) {
        for moniker in monikers {
            if let Err(e) = self.locator.discard(moniker).await {
                warn!(data_source = %moniker.data_source(), error = %e, "orphaned payload not discarded");
            }
        }
    }

    fn committed(&self, kind: EntityKind, ids: &[String]) -> Result<Vec<Entity>> {
        ids.iter()
            .map(|id| self.entities.get(kind, id.as_str()))
            .collect()
    }

    /// Publish one measurement value under `step` (id or alias).
    ///
    /// The value is stored through the data locator and a
    /// `PublishedMeasurement` with parametric index -1 records its moniker.
    ///
    /// # Errors
    ///
    /// Locator errors for a malformed value, entity store errors for bad
    /// references or schema violations (the stored payload is then removed).
    pub async fn publish_measurement(
        &self,
        step: impl Into<EntityRef>,
        name: &str,
        value: &Value,
        options: &MeasurementOptions,
    ) -> Result<Entity> {
        self.publish_measurement_within(step, name, value, options, self.config.deadline())
            .await
    }

    /// [`DataStore::publish_measurement`] under an explicit deadline.
    ///
    /// # Errors
    ///
    /// See [`DataStore::publish_measurement`].
    pub async fn publish_measurement_within(
        &self,
        step: impl Into<EntityRef>,
        name: &str,
        value: &Value,
        options: &MeasurementOptions,
        deadline: Deadline,
    ) -> Result<Entity> {
        let step = step.into();
        options.check_outcome_count(1)?;
        let value_type = options.declared_type().unwrap_or_else(|| value.value_type());

        let moniker = self
            .locator
            .publish_value_within(value, value_type, deadline)
            .await?;
        let request = options.request(&step, name, moniker.clone(), 0);
        match self.entities.create_within(request, deadline) {
            Ok(id) => self.entities.get(EntityKind::Measurement, id.as_str()),
            Err(e) => {
                self.discard_payloads(&[moniker]).await;
                Err(e)
            }
        }
    }

    /// Publish a parametric batch: one `PublishedMeasurement` per element
    /// with parametric index equal to its position. All or nothing.
    ///
    /// # Errors
    ///
    /// As [`DataStore::publish_measurement`]; `InvalidInput` if the number of
    /// outcomes is neither 0, 1 nor the number of values.
    pub async fn publish_measurement_batch(
        &self,
        step: impl Into<EntityRef>,
        name: &str,
        values: &[Value],
        value_type: ValueType,
        options: &MeasurementOptions,
    ) -> Result<Vec<Entity>> {
        self.publish_measurement_batch_within(step, name, values, value_type, options, self.config.deadline())
            .await
    }

    /// [`DataStore::publish_measurement_batch`] under an explicit deadline.
    ///
    /// # Errors
    ///
    /// See [`DataStore::publish_measurement_batch`].
    #[allow(clippy::too_many_arguments)]
    pub async fn publish_measurement_batch_within(
        &self,
        step: impl Into<EntityRef>,
        name: &str,
        values: &[Value],
        value_type: ValueType,
        options: &MeasurementOptions,
        deadline: Deadline,
    ) -> Result<Vec<Entity>> {
        let step = step.into();
        options.check_outcome_count(values.len())?;

        let monikers = self
            .locator
            .publish_value_batch_within(values, value_type, deadline)
            .await?;
        let requests = monikers
            .iter()
            .enumerate()
            .map(|(i, moniker)| options.request(&step, name, moniker.clone(), i))
            .collect();
        match self.entities.create_batch_within(requests, deadline) {
            Ok(ids) => self.committed(EntityKind::Measurement, &ids),
            Err(e) => {
                self.discard_payloads(&monikers).await;
                Err(e)
            }
        }
    }

    /// Publish one condition value under `step` (id or alias).
    ///
    /// # Errors
    ///
    /// See [`DataStore::publish_measurement`].
    pub async fn publish_condition(
        &self,
        step: impl Into<EntityRef>,
        condition: &ConditionSpec,
        value: &Value,
    ) -> Result<Entity> {
        self.publish_condition_within(step, condition, value, self.config.deadline())
            .await
    }

    /// [`DataStore::publish_condition`] under an explicit deadline.
    ///
    /// # Errors
    ///
    /// See [`DataStore::publish_measurement`].
    pub async fn publish_condition_within(
        &self,
        step: impl Into<EntityRef>,
        condition: &ConditionSpec,
        value: &Value,
        deadline: Deadline,
    ) -> Result<Entity> {
        let step = step.into();
        let moniker = self
            .locator
            .publish_value_within(value, value.value_type(), deadline)
            .await?;
        match self
            .entities
            .create_within(condition.request(&step, moniker.clone()), deadline)
        {
            Ok(id) => self.entities.get(EntityKind::Condition, id.as_str()),
            Err(e) => {
                self.discard_payloads(&[moniker]).await;
                Err(e)
            }
        }
    }

    /// Publish a batch of condition values, one `PublishedCondition` per
    /// element. All or nothing.
    ///
    /// # Errors
    ///
    /// See [`DataStore::publish_measurement_batch`].
    pub async fn publish_condition_batch(
        &self,
        step: impl Into<EntityRef>,
        condition: &ConditionSpec,
        values: &[Value],
        value_type: ValueType,
    ) -> Result<Vec<Entity>> {
        self.publish_condition_batch_within(step, condition, values, value_type, self.config.deadline())
            .await
    }

    /// [`DataStore::publish_condition_batch`] under an explicit deadline.
    ///
    /// # Errors
    ///
    /// See [`DataStore::publish_measurement_batch`].
    pub async fn publish_condition_batch_within(
        &self,
        step: impl Into<EntityRef>,
        condition: &ConditionSpec,
        values: &[Value],
        value_type: ValueType,
        deadline: Deadline,
    ) -> Result<Vec<Entity>> {
        let step = step.into();
        let monikers = self
            .locator
            .publish_value_batch_within(values, value_type, deadline)
            .await?;
        let requests = monikers
            .iter()
            .map(|moniker| condition.request(&step, moniker.clone()))
            .collect();
        match self.entities.create_batch_within(requests, deadline) {
            Ok(ids) => self.committed(EntityKind::Condition, &ids),
            Err(e) => {
                self.discard_payloads(&monikers).await;
                Err(e)
            }
        }
    }

    /// Read the value behind a moniker.
    ///
    /// # Errors
    ///
    /// `TypeMismatch` if `expected` is not the moniker's value type,
    /// `NotFound` if the payload is absent.
    pub async fn read_data(&self, moniker: &Moniker, expected: ValueType) -> Result<Value> {
        self.locator
            .read_value_within(moniker, expected, self.config.deadline())
            .await
    }

    /// [`DataStore::read_data`] under an explicit deadline.
    ///
    /// # Errors
    ///
    /// See [`DataStore::read_data`].
    pub async fn read_data_within(
        &self,
        moniker: &Moniker,
        expected: ValueType,
        deadline: Deadline,
    ) -> Result<Value> {
        self.locator.read_value_within(moniker, expected, deadline).await
    }

    // Queries

    /// Run a filter query (`$filter=...&$orderby=...&$top=N`, or a bare
    /// filter expression) over one entity collection.
    ///
    /// # Errors
    ///
    /// `ParseError` for malformed query text, `TypeMismatch` for an operator
    /// applied to an incompatible field, `Timeout` if the default deadline
    /// passes.
    pub fn query(&self, kind: EntityKind, query_text: &str) -> Result<Vec<Entity>> {
        self.query_within(kind, query_text, self.config.deadline())
    }

    /// [`DataStore::query`] under an explicit deadline.
    ///
    /// # Errors
    ///
    /// See [`DataStore::query`].
    pub fn query_within(&self, kind: EntityKind, query_text: &str, deadline: Deadline) -> Result<Vec<Entity>> {
        let plan = self.engine.parse(query_text).map_err(|e| {
            warn!(kind = %kind, error = %e, "query rejected");
            e
        })?;
        self.executor
            .execute_within(&plan, kind, &self.entities, deadline)
    }
}
