//! Integration tests for the entity graph
//!
//! Covers the end-to-end create/validate/resolve pipeline through the
//! `DataStore` facade:
//! 1. Register schemas and aliases
//! 2. Build metadata and a test result / step / measurement hierarchy
//! 3. Check referential integrity and schema inheritance

use datastore_core::entity::{EntityKind, EntityPatch, ErrorInformation, NewEntity, Outcome};
use datastore_core::schema::{ExtensionSchema, FieldRule};
use datastore_core::value::PrimitiveType;
use datastore_core::{DataStore, Error};
use uuid::Uuid;

fn store() -> DataStore {
    DataStore::builder().build().unwrap()
}

fn bandwidth_schema() -> ExtensionSchema {
    ExtensionSchema::new("S").field("hardware_item.bandwidth", FieldRule::required())
}

#[test]
fn test_required_extension_field_enforced() {
    let store = store();
    store.register_schema(bandwidth_schema()).unwrap();

    let ok = store.create(
        NewEntity::new(EntityKind::HardwareItem)
            .extension("bandwidth", "1GHz")
            .schema_id("S"),
    );
    assert!(ok.is_ok());

    let err = store
        .create(NewEntity::new(EntityKind::HardwareItem).schema_id("S"))
        .unwrap_err();
    match err {
        Error::Validation(failure) => {
            assert_eq!(failure.missing_required_fields, vec!["hardware_item.bandwidth"]);
            assert!(failure.type_mismatches.is_empty());
        }
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(store.list(EntityKind::HardwareItem).len(), 1);
}

#[test]
fn test_unknown_extension_fields_pass_through() {
    let store = store();
    store.register_schema(bandwidth_schema()).unwrap();
    let id = store
        .create(
            NewEntity::new(EntityKind::HardwareItem)
                .schema_id("S")
                .extension("bandwidth", "1GHz")
                .extension("calibration_due", "2025-01-01"),
        )
        .unwrap();
    let item = store.get(EntityKind::HardwareItem, id.as_str()).unwrap();
    assert_eq!(item.extensions().len(), 2);
}

#[test]
fn test_parent_step_from_other_test_result_is_dangling() {
    let store = store();
    let t = store.create(NewEntity::new(EntityKind::TestResult)).unwrap();
    let other = store.create(NewEntity::new(EntityKind::TestResult)).unwrap();
    let foreign_step = store
        .create(NewEntity::new(EntityKind::Step).link("test_result_id", other.as_str()))
        .unwrap();

    let result = store.create(
        NewEntity::new(EntityKind::Step)
            .link("test_result_id", t.as_str())
            .link("parent_step_id", foreign_step.as_str()),
    );
    assert!(matches!(result, Err(Error::DanglingReference { .. })));
    assert_eq!(store.list(EntityKind::Step).len(), 1);
}

#[test]
fn test_nonexistent_reference_is_dangling() {
    let store = store();
    for kind in [EntityKind::UutInstance, EntityKind::TestDescription] {
        let result = store.create(NewEntity::new(kind).link("uut_id", Uuid::new_v4().to_string()));
        assert!(matches!(result, Err(Error::DanglingReference { .. })), "{kind}");
    }
}

#[test]
fn test_references_resolve_to_expected_kind() {
    let store = store();
    let uut = store
        .create(NewEntity::new(EntityKind::Uut).property("part_number", "PMIC-7"))
        .unwrap();
    let instance = store
        .create(
            NewEntity::new(EntityKind::UutInstance)
                .property("serial_number", "SN-1")
                .link("uut_id", uut.as_str()),
        )
        .unwrap();

    let stored = store.get(EntityKind::UutInstance, instance.as_str()).unwrap();
    let target = stored.link("uut_id").unwrap();
    assert_eq!(store.get(EntityKind::Uut, target).unwrap().kind(), EntityKind::Uut);
}

#[test]
fn test_schema_inheritance_with_non_propagating_override() {
    let store = store();
    store
        .register_schema(
            ExtensionSchema::new("S")
                .field("step.fixture", FieldRule::required())
                .field("measurement.units", FieldRule::required()),
        )
        .unwrap();
    store
        .register_schema(ExtensionSchema::new("S2").field("step.firmware", FieldRule::required()))
        .unwrap();

    let t = store
        .create(NewEntity::new(EntityKind::TestResult).schema_id("S"))
        .unwrap();

    // Inherits S
    let missing = store.create(NewEntity::new(EntityKind::Step).link("test_result_id", t.as_str()));
    assert!(matches!(missing, Err(Error::Validation(_))));

    // Own S2 overrides S for this step only
    let step = store
        .create(
            NewEntity::new(EntityKind::Step)
                .link("test_result_id", t.as_str())
                .schema_id("S2")
                .extension("firmware", "1.2.0"),
        )
        .unwrap();
    let child = store
        .create(
            NewEntity::new(EntityKind::Step)
                .link("test_result_id", t.as_str())
                .link("parent_step_id", step.as_str())
                .extension("fixture", "F-12"),
        )
        .unwrap();
    assert_eq!(
        store
            .entities()
            .effective_schema_id(&store.get(EntityKind::Step, child.as_str()).unwrap()),
        Some("S".to_string())
    );

    // Measurement under the overriding step still validates against S
    let measurement = store.create(
        NewEntity::new(EntityKind::Measurement)
            .link("step_id", step.as_str())
            .extension("firmware", "ignored"),
    );
    assert!(matches!(measurement, Err(Error::Validation(_))));
}

#[test]
fn test_typed_rule_reports_mismatch() {
    let store = store();
    store
        .register_schema(
            ExtensionSchema::new("typed").field(
                "test_result.environment.humidity",
                FieldRule::optional().typed(PrimitiveType::Float),
            ),
        )
        .unwrap();

    let bad = store
        .create(
            NewEntity::new(EntityKind::TestResult)
                .schema_id("typed")
                .extension("environment", datastore_core::value::Extensions::from([(
                    "humidity".to_string(),
                    "damp".into(),
                )])),
        )
        .unwrap_err();
    match bad {
        Error::Validation(failure) => {
            assert_eq!(failure.type_mismatches.len(), 1);
            assert_eq!(failure.type_mismatches[0].path, "test_result.environment.humidity");
        }
        other => panic!("expected validation error, got {other:?}"),
    }

    // Integers satisfy float
    let ok = store.create(
        NewEntity::new(EntityKind::TestResult)
            .schema_id("typed")
            .extension("environment", datastore_core::value::Extensions::from([(
                "humidity".to_string(),
                40.into(),
            )])),
    );
    assert!(ok.is_ok());
}

#[test]
fn test_alias_round_trip_and_conflict() {
    let store = store();
    let station = store.create(NewEntity::new(EntityKind::TestStation)).unwrap();
    store
        .create_alias("line-3", EntityKind::TestStation, station.as_str())
        .unwrap();

    assert_eq!(
        store.resolve_alias("line-3").unwrap(),
        (EntityKind::TestStation, station.clone())
    );
    assert!(matches!(
        store.create_alias("line-3", EntityKind::TestStation, station.as_str()),
        Err(Error::Conflict(_))
    ));
    assert!(matches!(
        store.resolve_alias_typed("line-3", EntityKind::Operator),
        Err(Error::TypeMismatch { .. })
    ));

    let t = store
        .create(NewEntity::new(EntityKind::TestResult).link("test_station_id", "line-3"))
        .unwrap();
    let stored = store.get(EntityKind::TestResult, t.as_str()).unwrap();
    assert_eq!(stored.link("test_station_id"), Some(station.as_str()));

    assert!(store.delete_alias("line-3"));
    assert!(!store.delete_alias("line-3"));
    assert!(store.list_aliases().is_empty());
}

#[test]
fn test_dangling_alias_can_be_created_but_not_used() {
    let store = store();
    store
        .create_alias("ghost", EntityKind::Operator, Uuid::new_v4().to_string())
        .unwrap();
    let result = store.create(NewEntity::new(EntityKind::TestResult).link("operator_id", "ghost"));
    assert!(matches!(result, Err(Error::DanglingReference { .. })));
    assert!(matches!(
        store.get(EntityKind::Operator, "ghost"),
        Err(Error::NotFound { .. })
    ));
}

#[test]
fn test_update_lifecycle() {
    let store = store();
    let t = store
        .create(
            NewEntity::new(EntityKind::TestResult)
                .property("name", "run 1")
                .outcome(Outcome::Unspecified),
        )
        .unwrap();

    let updated = store
        .update(
            t.as_str(),
            &EntityPatch::new()
                .outcome(Outcome::Failed)
                .error_information(ErrorInformation::new(-42, "rail out of range", "psu.py")),
        )
        .unwrap();
    assert_eq!(updated.outcome(), Outcome::Failed);
    assert_eq!(updated.name(), Some("run 1"));
    assert_eq!(updated.error_information().unwrap().error_code, -42);

    let fetched = store.get(EntityKind::TestResult, t.as_str()).unwrap();
    assert_eq!(fetched, updated);
}

#[test]
fn test_schema_registration_rules() {
    let store = store();
    assert_eq!(store.register_schema(bandwidth_schema()).unwrap(), "S");
    // Identical content is idempotent
    assert_eq!(store.register_schema(bandwidth_schema()).unwrap(), "S");
    assert!(matches!(
        store.register_schema(ExtensionSchema::new("S")),
        Err(Error::Conflict(_))
    ));
    assert!(matches!(store.get_schema("nope"), Err(Error::NotFound { .. })));

    let parsed = ExtensionSchema::from_json(
        r#"{"id": "json", "fields": {"operator.badge": {"required": true, "type": "int"}}}"#,
    )
    .unwrap();
    store.register_schema(parsed).unwrap();
    let ids: Vec<String> = store
        .list_schemas()
        .iter()
        .map(|s| s.id().to_string())
        .collect();
    assert_eq!(ids, vec!["S", "json"]);
}
