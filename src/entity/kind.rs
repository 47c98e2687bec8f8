//! Entity kinds and their relationship tables

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Type tag of a stored entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    /// Person running the test
    Operator,
    /// Station the test ran on
    TestStation,
    /// Instrument or other hardware asset
    HardwareItem,
    /// Software product and version
    SoftwareItem,
    /// Product definition (unit under test)
    Uut,
    /// One physical unit of a product
    UutInstance,
    /// Test plan for a product
    TestDescription,
    /// Reusable test definition
    Test,
    /// Fixture or adapter between station and unit
    TestAdapter,
    /// Root of a test session
    TestResult,
    /// Step within a test result
    Step,
    /// Published measurement
    Measurement,
    /// Published condition
    Condition,
}

/// Whether a relationship field holds one id or a list of ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Single id
    One,
    /// List of ids
    Many,
}

/// A relationship field declared by an entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation {
    /// Field name, e.g. `uut_id`
    pub field: &'static str,
    /// Kind every referenced id must have
    pub target: EntityKind,
    /// One id or many
    pub cardinality: Cardinality,
    /// Whether the field must be present at creation
    pub required: bool,
}

const fn one(field: &'static str, target: EntityKind, required: bool) -> Relation {
    Relation {
        field,
        target,
        cardinality: Cardinality::One,
        required,
    }
}

const fn many(field: &'static str, target: EntityKind) -> Relation {
    Relation {
        field,
        target,
        cardinality: Cardinality::Many,
        required: false,
    }
}

const NO_RELATIONS: &[Relation] = &[];

const UUT_INSTANCE_RELATIONS: &[Relation] = &[one("uut_id", EntityKind::Uut, false)];

const TEST_DESCRIPTION_RELATIONS: &[Relation] = &[one("uut_id", EntityKind::Uut, false)];

const TEST_RESULT_RELATIONS: &[Relation] = &[
    one("uut_instance_id", EntityKind::UutInstance, false),
    one("operator_id", EntityKind::Operator, false),
    one("test_station_id", EntityKind::TestStation, false),
    one("test_description_id", EntityKind::TestDescription, false),
    many("software_item_ids", EntityKind::SoftwareItem),
    many("hardware_item_ids", EntityKind::HardwareItem),
    many("test_adapter_ids", EntityKind::TestAdapter),
];

const STEP_RELATIONS: &[Relation] = &[
    one("test_result_id", EntityKind::TestResult, true),
    one("parent_step_id", EntityKind::Step, false),
    one("test_id", EntityKind::Test, false),
];

// test_result_id is derived from the step when omitted
const MEASUREMENT_RELATIONS: &[Relation] = &[
    one("test_result_id", EntityKind::TestResult, false),
    one("step_id", EntityKind::Step, true),
    many("software_item_ids", EntityKind::SoftwareItem),
    many("hardware_item_ids", EntityKind::HardwareItem),
    many("test_adapter_ids", EntityKind::TestAdapter),
];

const CONDITION_RELATIONS: &[Relation] = &[
    one("test_result_id", EntityKind::TestResult, false),
    one("step_id", EntityKind::Step, true),
];

impl EntityKind {
    /// Every kind, in table order.
    pub const ALL: [Self; 13] = [
        Self::Operator,
        Self::TestStation,
        Self::HardwareItem,
        Self::SoftwareItem,
        Self::Uut,
        Self::UutInstance,
        Self::TestDescription,
        Self::Test,
        Self::TestAdapter,
        Self::TestResult,
        Self::Step,
        Self::Measurement,
        Self::Condition,
    ];

    /// Position of this kind in [`EntityKind::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Get kind name as string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Operator => "Operator",
            Self::TestStation => "TestStation",
            Self::HardwareItem => "HardwareItem",
            Self::SoftwareItem => "SoftwareItem",
            Self::Uut => "Uut",
            Self::UutInstance => "UutInstance",
            Self::TestDescription => "TestDescription",
            Self::Test => "Test",
            Self::TestAdapter => "TestAdapter",
            Self::TestResult => "TestResult",
            Self::Step => "Step",
            Self::Measurement => "PublishedMeasurement",
            Self::Condition => "PublishedCondition",
        }
    }

    /// Section name schema field paths use for this kind
    /// (`hardware_item.bandwidth` applies to hardware items).
    #[must_use]
    pub const fn schema_section(&self) -> &'static str {
        match self {
            Self::Operator => "operator",
            Self::TestStation => "test_station",
            Self::HardwareItem => "hardware_item",
            Self::SoftwareItem => "software_item",
            Self::Uut => "uut",
            Self::UutInstance => "uut_instance",
            Self::TestDescription => "test_description",
            Self::Test => "test",
            Self::TestAdapter => "test_adapter",
            Self::TestResult => "test_result",
            Self::Step => "step",
            Self::Measurement => "measurement",
            Self::Condition => "condition",
        }
    }

    /// Relationship fields this kind declares.
    #[must_use]
    pub const fn relations(&self) -> &'static [Relation] {
        match self {
            Self::UutInstance => UUT_INSTANCE_RELATIONS,
            Self::TestDescription => TEST_DESCRIPTION_RELATIONS,
            Self::TestResult => TEST_RESULT_RELATIONS,
            Self::Step => STEP_RELATIONS,
            Self::Measurement => MEASUREMENT_RELATIONS,
            Self::Condition => CONDITION_RELATIONS,
            _ => NO_RELATIONS,
        }
    }

    /// Look up one relationship field by name.
    #[must_use]
    pub fn relation(&self, field: &str) -> Option<&'static Relation> {
        self.relations().iter().find(|r| r.field == field)
    }

    /// Descriptive metadata kinds (no required parent, alias targets).
    #[must_use]
    pub const fn is_metadata(&self) -> bool {
        !matches!(
            self,
            Self::TestResult | Self::Step | Self::Measurement | Self::Condition
        )
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    /// Accepts the type name (`HardwareItem`) or the schema section
    /// (`hardware_item`), ignoring ASCII case.
    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| {
                kind.as_str().eq_ignore_ascii_case(s) || kind.schema_section().eq_ignore_ascii_case(s)
            })
            .ok_or_else(|| Error::InvalidInput(format!("Unknown entity kind: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_matches_table_order() {
        for (i, kind) in EntityKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn test_parse_kind_names() {
        assert_eq!("HardwareItem".parse::<EntityKind>().unwrap(), EntityKind::HardwareItem);
        assert_eq!("uut_instance".parse::<EntityKind>().unwrap(), EntityKind::UutInstance);
        assert_eq!("step".parse::<EntityKind>().unwrap(), EntityKind::Step);
        assert!("Widget".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_step_requires_test_result() {
        let relation = EntityKind::Step.relation("test_result_id").unwrap();
        assert!(relation.required);
        assert_eq!(relation.target, EntityKind::TestResult);
        assert!(EntityKind::Operator.relations().is_empty());
        assert!(!EntityKind::Step.is_metadata());
        assert!(EntityKind::TestAdapter.is_metadata());
    }
}
