//! Entity graph - metadata and test-execution records
//!
//! Every persisted object is an [`Entity`] tagged with an [`EntityKind`].
//! Entities link to each other by id only, through the relationship fields
//! each kind declares in [`EntityKind::relations`].
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use datastore_core::alias::AliasResolver;
//! use datastore_core::entity::{EntityKind, EntityStore, NewEntity};
//! use datastore_core::schema::SchemaRegistry;
//!
//! let store = EntityStore::new(
//!     Arc::new(SchemaRegistry::new()),
//!     Arc::new(AliasResolver::new()),
//!     None,
//! );
//! let uut = store.create(NewEntity::new(EntityKind::Uut).property("part_number", "P-100"))?;
//! let instance = store.create(
//!     NewEntity::new(EntityKind::UutInstance)
//!         .property("serial_number", "SN-1")
//!         .link("uut_id", uut.as_str()),
//! )?;
//! assert_eq!(store.get(EntityKind::UutInstance, instance.as_str())?.link("uut_id"), Some(uut.as_str()));
//! # Ok::<(), datastore_core::Error>(())
//! ```

mod kind;
mod outcome;
mod record;
mod store;

pub use kind::{Cardinality, EntityKind, Relation};
pub use outcome::{ErrorInformation, Outcome};
pub use record::{Entity, EntityPatch, EntityRef, NewEntity};
pub use store::EntityStore;
