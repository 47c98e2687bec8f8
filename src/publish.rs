//! Options for publishing measurements and conditions through the facade
//!
//! A publish stores the value through the data locator and records a
//! `PublishedMeasurement` or `PublishedCondition` entity carrying the moniker.

use crate::entity::{EntityKind, EntityRef, ErrorInformation, NewEntity, Outcome};
use crate::moniker::{Moniker, ValueType};
use crate::value::{ExtensionValue, Extensions};
use crate::{Error, Result};

/// Optional parts of a measurement publish.
///
/// ## Example
///
/// ```rust
/// use datastore_core::entity::Outcome;
/// use datastore_core::publish::MeasurementOptions;
///
/// let options = MeasurementOptions::new()
///     .outcome(Outcome::Passed)
///     .hardware_items(["bench-dmm"])
///     .extension("units", "V");
/// assert_eq!(options.outcome_list(), &[Outcome::Passed]);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasurementOptions {
    value_type: Option<ValueType>,
    test_result: Option<EntityRef>,
    outcomes: Vec<Outcome>,
    software_items: Vec<EntityRef>,
    hardware_items: Vec<EntityRef>,
    test_adapters: Vec<EntityRef>,
    extensions: Extensions,
    schema_id: Option<String>,
    error_information: Option<ErrorInformation>,
}

impl MeasurementOptions {
    /// Defaults: value type taken from the value, test result derived from
    /// the step, outcome unspecified.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the value type; values of another type are rejected.
    #[must_use]
    pub const fn value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = Some(value_type);
        self
    }

    /// Name the test result explicitly. It must be the step's.
    #[must_use]
    pub fn test_result(mut self, test_result: impl Into<EntityRef>) -> Self {
        self.test_result = Some(test_result.into());
        self
    }

    /// One outcome for the measurement (or every element of a batch).
    #[must_use]
    pub fn outcome(mut self, outcome: Outcome) -> Self {
        self.outcomes = vec![outcome];
        self
    }

    /// Per-element outcomes for a batch publish.
    #[must_use]
    pub fn outcomes(mut self, outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        self.outcomes = outcomes.into_iter().collect();
        self
    }

    /// Software items used for the measurement (ids or aliases).
    #[must_use]
    pub fn software_items<I, T>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<EntityRef>,
    {
        self.software_items = items.into_iter().map(Into::into).collect();
        self
    }

    /// Hardware items used for the measurement (ids or aliases).
    #[must_use]
    pub fn hardware_items<I, T>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<EntityRef>,
    {
        self.hardware_items = items.into_iter().map(Into::into).collect();
        self
    }

    /// Test adapters used for the measurement (ids or aliases).
    #[must_use]
    pub fn test_adapters<I, T>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<EntityRef>,
    {
        self.test_adapters = items.into_iter().map(Into::into).collect();
        self
    }

    /// Set one extension field on the measurement record.
    #[must_use]
    pub fn extension(mut self, key: impl Into<String>, value: impl Into<ExtensionValue>) -> Self {
        self.extensions.insert(key.into(), value.into());
        self
    }

    /// Own schema id, overriding the inherited one.
    #[must_use]
    pub fn schema_id(mut self, schema_id: impl Into<String>) -> Self {
        self.schema_id = Some(schema_id.into());
        self
    }

    /// Error details for a failed measurement.
    #[must_use]
    pub fn error_information(mut self, error_information: ErrorInformation) -> Self {
        self.error_information = Some(error_information);
        self
    }

    /// Outcomes as given.
    #[must_use]
    pub fn outcome_list(&self) -> &[Outcome] {
        &self.outcomes
    }

    pub(crate) fn declared_type(&self) -> Option<ValueType> {
        self.value_type
    }

    /// Outcome of element `index`: none given means unspecified, one applies
    /// to all.
    pub(crate) fn outcome_at(&self, index: usize) -> Outcome {
        match self.outcomes.as_slice() {
            [] => Outcome::Unspecified,
            [single] => *single,
            many => many.get(index).copied().unwrap_or_default(),
        }
    }

    pub(crate) fn check_outcome_count(&self, count: usize) -> Result<()> {
        let given = self.outcomes.len();
        if given > 1 && given != count {
            return Err(Error::InvalidInput(format!(
                "{given} outcomes given for {count} values"
            )));
        }
        Ok(())
    }

    pub(crate) fn request(&self, step: &EntityRef, name: &str, moniker: Moniker, index: usize) -> NewEntity {
        let mut request = NewEntity::new(EntityKind::Measurement)
            .property("name", name)
            .link("step_id", step.clone())
            .extensions(self.extensions.clone())
            .outcome(self.outcome_at(index))
            .moniker(moniker);
        if let Some(test_result) = &self.test_result {
            request = request.link("test_result_id", test_result.clone());
        }
        for (field, items) in [
            ("software_item_ids", &self.software_items),
            ("hardware_item_ids", &self.hardware_items),
            ("test_adapter_ids", &self.test_adapters),
        ] {
            if !items.is_empty() {
                request = request.links(field, items.iter().cloned());
            }
        }
        if let Some(schema_id) = &self.schema_id {
            request = request.schema_id(schema_id.clone());
        }
        if let Some(error_information) = &self.error_information {
            request = request.error_information(error_information.clone());
        }
        request
    }
}

/// Identity of a published condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionSpec {
    name: String,
    condition_type: String,
    test_result: Option<EntityRef>,
}

impl ConditionSpec {
    /// Condition `name` of `condition_type` (e.g. "Temperature", "Environment").
    #[must_use]
    pub fn new(name: impl Into<String>, condition_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            condition_type: condition_type.into(),
            test_result: None,
        }
    }

    /// Name the test result explicitly. It must be the step's.
    #[must_use]
    pub fn test_result(mut self, test_result: impl Into<EntityRef>) -> Self {
        self.test_result = Some(test_result.into());
        self
    }

    /// Condition name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Condition type.
    #[must_use]
    pub fn condition_type(&self) -> &str {
        &self.condition_type
    }

    pub(crate) fn request(&self, step: &EntityRef, moniker: Moniker) -> NewEntity {
        let request = NewEntity::new(EntityKind::Condition)
            .property("name", self.name.as_str())
            .property("condition_type", self.condition_type.as_str())
            .link("step_id", step.clone())
            .moniker(moniker);
        match &self.test_result {
            Some(test_result) => request.link("test_result_id", test_result.clone()),
            None => request,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_broadcast() {
        let none = MeasurementOptions::new();
        assert_eq!(none.outcome_at(3), Outcome::Unspecified);

        let one = MeasurementOptions::new().outcome(Outcome::Failed);
        assert!(one.check_outcome_count(4).is_ok());
        assert_eq!(one.outcome_at(3), Outcome::Failed);

        let each = MeasurementOptions::new().outcomes([Outcome::Passed, Outcome::Failed]);
        assert!(each.check_outcome_count(2).is_ok());
        assert_eq!(each.outcome_at(1), Outcome::Failed);
        assert!(matches!(each.check_outcome_count(3), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_condition_request_shape() {
        let spec = ConditionSpec::new("Vcc", "Voltage");
        let step = EntityRef::Alias("s".to_string());
        let moniker = Moniker::from_parts(
            "localhost:42000",
            "src",
            0,
            ValueType::Scalar(crate::moniker::ScalarKind::Float),
            crate::moniker::ShapeHint { length: 1 },
            -1,
        );
        let request = spec.request(&step, moniker);
        assert_eq!(request.kind(), EntityKind::Condition);
        assert_eq!(request.properties["condition_type"], "Voltage");
        assert_eq!(request.links["step_id"], vec![step]);
    }
}
