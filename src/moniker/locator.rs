//! Data locator - publishes payloads and dereferences monikers

use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use super::{Moniker, Value, ValueType};
use crate::config::Deadline;
use crate::kv::{KvStore, MemoryKvStore};
use crate::{Error, Result};

/// Parametric index of a value published on its own.
pub const WHOLE_SET: i64 = -1;

/// Stores payload values and hands out monikers for them.
#[derive(Debug)]
pub struct DataLocator<S: KvStore = MemoryKvStore> {
    store: S,
    service_location: String,
    default_timeout: Option<Duration>,
}

impl<S: KvStore> DataLocator<S> {
    /// Create a locator over `store`, stamping `service_location` into every
    /// moniker it issues.
    #[must_use]
    pub fn new(store: S, service_location: impl Into<String>) -> Self {
        Self {
            store,
            service_location: service_location.into(),
            default_timeout: None,
        }
    }

    /// Apply `timeout` to calls that do not pass a deadline.
    #[must_use]
    pub const fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Backing payload store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Service location stamped into monikers.
    #[must_use]
    pub fn service_location(&self) -> &str {
        &self.service_location
    }

    fn default_deadline(&self) -> Deadline {
        self.default_timeout.map_or(Deadline::NONE, Deadline::after)
    }

    fn moniker(&self, data_source: &str, instance: i64, value: &Value, parametric_index: i64) -> Moniker {
        Moniker {
            service_location: self.service_location.clone(),
            data_source: data_source.to_string(),
            data_instance: instance,
            value_type: value.value_type(),
            shape: value.shape(),
            parametric_index,
        }
    }

    /// Store one value and return its moniker (`parametric_index` -1).
    ///
    /// # Errors
    ///
    /// `TypeMismatch` if `value` is not a `value_type`, `InvalidInput` for a
    /// malformed value, `Timeout` if the default deadline passes first.
    pub async fn publish_value(&self, value: &Value, value_type: ValueType) -> Result<Moniker> {
        self.publish_value_within(value, value_type, self.default_deadline())
            .await
    }

    /// [`DataLocator::publish_value`] under an explicit deadline.
    ///
    /// # Errors
    ///
    /// See [`DataLocator::publish_value`].
    pub async fn publish_value_within(
        &self,
        value: &Value,
        value_type: ValueType,
        deadline: Deadline,
    ) -> Result<Moniker> {
        value.validate(value_type)?;
        let payload = serde_json::to_vec(value)?;
        let moniker = self.moniker(&Uuid::new_v4().to_string(), 0, value, WHOLE_SET);
        let key = moniker.storage_key();

        deadline
            .run("publish value", async { self.store.put(&key, payload).await })
            .await
            .map_err(|e| {
                warn!(error = %e, "publish rejected");
                e
            })?;

        // A put that finished after the deadline fired must not survive
        if deadline.is_expired() {
            return Err(self.roll_back(&[key], "publish value").await);
        }
        debug!(data_source = %moniker.data_source, value_type = %value_type, "value published");
        Ok(moniker)
    }

    /// Store a batch of values, one moniker per element with
    /// `parametric_index` equal to its position.
    ///
    /// Every element is validated before anything is stored; a failed batch
    /// stores nothing.
    ///
    /// # Errors
    ///
    /// As [`DataLocator::publish_value`], for the first failing element.
    pub async fn publish_value_batch(
        &self,
        values: &[Value],
        value_type: ValueType,
    ) -> Result<Vec<Moniker>> {
        self.publish_value_batch_within(values, value_type, self.default_deadline())
            .await
    }

    /// [`DataLocator::publish_value_batch`] under an explicit deadline.
    ///
    /// # Errors
    ///
    /// See [`DataLocator::publish_value_batch`].
    pub async fn publish_value_batch_within(
        &self,
        values: &[Value],
        value_type: ValueType,
        deadline: Deadline,
    ) -> Result<Vec<Moniker>> {
        let data_source = Uuid::new_v4().to_string();
        let mut monikers = Vec::with_capacity(values.len());
        let mut pairs = Vec::with_capacity(values.len());

        for (i, value) in values.iter().enumerate() {
            value.validate(value_type)?;
            let index = i64::try_from(i)
                .map_err(|_| Error::InvalidInput("batch too large".to_string()))?;
            let moniker = self.moniker(&data_source, index, value, index);
            pairs.push((moniker.storage_key(), serde_json::to_vec(value)?));
            monikers.push(moniker);
        }

        let keys: Vec<String> = pairs.iter().map(|(key, _)| key.clone()).collect();
        deadline
            .run("publish batch", async { self.store.batch_put(pairs).await })
            .await?;

        if deadline.is_expired() {
            return Err(self.roll_back(&keys, "publish batch").await);
        }
        debug!(%data_source, count = monikers.len(), value_type = %value_type, "batch published");
        Ok(monikers)
    }

    /// Read the value behind a moniker.
    ///
    /// # Errors
    ///
    /// `TypeMismatch` if `expected` differs from the moniker's value type,
    /// `NotFound` if the payload is absent or held by another service.
    pub async fn read_value(&self, moniker: &Moniker, expected: ValueType) -> Result<Value> {
        self.read_value_within(moniker, expected, self.default_deadline())
            .await
    }

    /// [`DataLocator::read_value`] under an explicit deadline.
    ///
    /// # Errors
    ///
    /// See [`DataLocator::read_value`].
    pub async fn read_value_within(
        &self,
        moniker: &Moniker,
        expected: ValueType,
        deadline: Deadline,
    ) -> Result<Value> {
        if moniker.value_type != expected {
            return Err(Error::type_mismatch(expected, moniker.value_type));
        }
        let key = moniker.storage_key();
        if moniker.service_location != self.service_location {
            return Err(Error::not_found("moniker", key));
        }

        let payload = deadline
            .run("read value", async { self.store.get(&key).await })
            .await?
            .ok_or_else(|| Error::not_found("moniker", key.clone()))?;
        let value: Value = serde_json::from_slice(&payload)?;
        if value.value_type() != moniker.value_type {
            return Err(Error::type_mismatch(moniker.value_type, value.value_type()));
        }
        Ok(value)
    }

    /// Read several monikers that share one expected type.
    ///
    /// # Errors
    ///
    /// As [`DataLocator::read_value`], for the first failing moniker.
    pub async fn read_values(&self, monikers: &[Moniker], expected: ValueType) -> Result<Vec<Value>> {
        let mut values = Vec::with_capacity(monikers.len());
        for moniker in monikers {
            values.push(self.read_value(moniker, expected).await?);
        }
        Ok(values)
    }

    /// Remove payloads stored by a publish that missed its deadline. The
    /// caller always gets `Timeout`; a failed delete is only logged.
    async fn roll_back(&self, keys: &[String], operation: &str) -> Error {
        for key in keys {
            if let Err(e) = self.store.delete(key).await {
                warn!(%key, error = %e, "orphaned payload not rolled back");
            }
        }
        Error::Timeout(operation.to_string())
    }

    /// Remove the payload behind a moniker. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn discard(&self, moniker: &Moniker) -> Result<bool> {
        let removed = self.store.delete(&moniker.storage_key()).await?;
        if removed {
            debug!(data_source = %moniker.data_source, "payload discarded");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moniker::{AnalogWaveform, ScalarKind, Spectrum, Vector, XyData};

    fn locator() -> DataLocator {
        DataLocator::new(MemoryKvStore::new(), "localhost:42000")
    }

    #[tokio::test]
    async fn test_publish_and_read_scalar() {
        let locator = locator();
        let ty = ValueType::Scalar(ScalarKind::Float);

        let moniker = locator.publish_value(&Value::from(1.25), ty).await.unwrap();

        assert_eq!(moniker.parametric_index(), WHOLE_SET);
        assert_eq!(moniker.service_location(), "localhost:42000");
        assert_eq!(locator.read_value(&moniker, ty).await.unwrap(), Value::from(1.25));
    }

    #[tokio::test]
    async fn test_read_with_wrong_type() {
        let locator = locator();
        let moniker = locator
            .publish_value(&Value::from(7_i64), ValueType::Scalar(ScalarKind::Int))
            .await
            .unwrap();

        let result = locator
            .read_value(&moniker, ValueType::Scalar(ScalarKind::Float))
            .await;
        assert!(matches!(result, Err(Error::TypeMismatch { .. })));
    }

    #[tokio::test]
    async fn test_read_missing_payload() {
        let locator = locator();
        let moniker = locator
            .publish_value(&Value::from(true), ValueType::Scalar(ScalarKind::Bool))
            .await
            .unwrap();
        assert!(locator.discard(&moniker).await.unwrap());

        let result = locator.read_value(&moniker, moniker.value_type()).await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_foreign_service_location_is_not_found() {
        let locator = locator();
        let moniker = locator
            .publish_value(&Value::from("x"), ValueType::Scalar(ScalarKind::String))
            .await
            .unwrap();
        let foreign = Moniker {
            service_location: "elsewhere:1".to_string(),
            ..moniker
        };
        let result = locator.read_value(&foreign, foreign.value_type()).await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_publish_rejects_declared_type_mismatch() {
        let locator = locator();
        let result = locator
            .publish_value(&Value::from("3.3"), ValueType::Scalar(ScalarKind::Float))
            .await;
        assert!(matches!(result, Err(Error::TypeMismatch { .. })));
        assert!(locator.store().is_empty());
    }

    #[tokio::test]
    async fn test_batch_indices_and_values() {
        let locator = locator();
        let values: Vec<Value> = (0..5).map(|i| Value::from(f64::from(i) * 0.5)).collect();
        let ty = ValueType::Scalar(ScalarKind::Float);

        let monikers = locator.publish_value_batch(&values, ty).await.unwrap();

        assert_eq!(monikers.len(), 5);
        for (i, (moniker, value)) in monikers.iter().zip(&values).enumerate() {
            assert_eq!(moniker.parametric_index(), i as i64);
            assert_eq!(&locator.read_value(moniker, ty).await.unwrap(), value);
        }
        assert_eq!(locator.read_values(&monikers, ty).await.unwrap(), values);
    }

    #[tokio::test]
    async fn test_invalid_batch_stores_nothing() {
        let locator = locator();
        let values = vec![Value::from(1.0), Value::from(f64::NAN)];
        let result = locator
            .publish_value_batch(&values, ValueType::Scalar(ScalarKind::Float))
            .await;
        assert!(result.is_err());
        assert!(locator.store().is_empty());
    }

    #[tokio::test]
    async fn test_typed_values_round_trip() {
        let locator = locator();
        let values = [
            Value::from(AnalogWaveform::new(Some(chrono::Utc::now()), 1e-3, vec![0.1, -0.2])),
            Value::from(AnalogWaveform::<i16>::new(None, 0.5, vec![i16::MIN, 0, i16::MAX])),
            Value::from(Spectrum {
                start_frequency: 10.0,
                frequency_increment: 2.5,
                data: vec![1.0, 0.0],
            }),
            Value::from(XyData {
                x: vec![1.0, 2.0],
                y: vec![3.0, 4.0],
            }),
            Value::from(vec![1_i64, 2, 3]),
            Value::Vector(Vector::String(vec!["a".to_string(), String::new()])),
            Value::Vector(Vector::Bool(vec![true, false, true])),
        ];
        for value in values {
            let ty = value.value_type();
            let moniker = locator.publish_value(&value, ty).await.unwrap();
            assert_eq!(moniker.shape(), value.shape());
            assert_eq!(locator.read_value(&moniker, ty).await.unwrap(), value);
        }
    }

    #[tokio::test]
    async fn test_expired_deadline_stores_nothing() {
        let locator = locator();
        let deadline = Deadline::at(std::time::Instant::now());
        let result = locator
            .publish_value_within(&Value::from(1_i64), ValueType::Scalar(ScalarKind::Int), deadline)
            .await;
        assert!(matches!(result, Err(Error::Timeout(_))));
        assert!(locator.store().is_empty());
    }

    /// Accepts writes but cannot delete.
    #[derive(Debug, Default)]
    struct WriteOnceStore {
        inner: MemoryKvStore,
    }

    impl KvStore for WriteOnceStore {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            self.inner.get(key).await
        }

        async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
            self.inner.put(key, value).await
        }

        async fn delete(&self, _key: &str) -> Result<bool> {
            Err(Error::InvalidInput("backend refuses deletes".to_string()))
        }

        async fn exists(&self, key: &str) -> Result<bool> {
            self.inner.exists(key).await
        }
    }

    #[tokio::test]
    async fn test_failed_rollback_still_times_out() {
        let locator = DataLocator::new(WriteOnceStore::default(), "localhost:42000");
        let deadline = Deadline::at(std::time::Instant::now());

        let single = locator
            .publish_value_within(&Value::from(1_i64), ValueType::Scalar(ScalarKind::Int), deadline)
            .await;
        assert!(matches!(single, Err(Error::Timeout(_))));

        let batch = locator
            .publish_value_batch_within(
                &[Value::from(1.0), Value::from(2.0)],
                ValueType::Scalar(ScalarKind::Float),
                deadline,
            )
            .await;
        assert!(matches!(batch, Err(Error::Timeout(_))));
    }
}
