//! Store configuration and per-operation deadlines

use std::future::Future;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default service location stamped into monikers.
pub const DEFAULT_SERVICE_LOCATION: &str = "localhost:42000";

/// Configuration for a [`crate::DataStore`].
///
/// Deserializable so an adapter can load it from its own config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Service location recorded in every moniker
    pub service_location: String,
    /// Timeout applied when a caller does not supply a deadline
    #[serde(with = "optional_millis")]
    pub default_timeout: Option<Duration>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            service_location: DEFAULT_SERVICE_LOCATION.to_string(),
            default_timeout: None,
        }
    }
}

impl StoreConfig {
    /// Check the configuration for unusable values.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for an empty service location or a zero timeout.
    pub fn validate(&self) -> Result<()> {
        if self.service_location.trim().is_empty() {
            return Err(Error::InvalidInput(
                "service_location must not be empty".to_string(),
            ));
        }
        if self.default_timeout == Some(Duration::ZERO) {
            return Err(Error::InvalidInput(
                "default_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Deadline for an operation starting now.
    #[must_use]
    pub fn deadline(&self) -> Deadline {
        self.default_timeout.map_or(Deadline::NONE, Deadline::after)
    }
}

/// Point in time after which an operation must give up without committing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// No deadline.
    pub const NONE: Self = Self(None);

    /// Deadline `timeout` from now.
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now().checked_add(timeout))
    }

    /// Deadline at a fixed instant.
    #[must_use]
    pub const fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    /// The instant, if bounded.
    #[must_use]
    pub const fn instant(&self) -> Option<Instant> {
        self.0
    }

    /// Time left, or `None` when unbounded. Saturates at zero.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.0
            .map(|instant| instant.saturating_duration_since(Instant::now()))
    }

    /// Whether the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.0.is_some_and(|instant| Instant::now() >= instant)
    }

    /// Fail with `Timeout` if the deadline has passed.
    ///
    /// # Errors
    ///
    /// `Timeout` naming `operation`.
    pub fn check(&self, operation: &str) -> Result<()> {
        if self.is_expired() {
            Err(Error::Timeout(operation.to_string()))
        } else {
            Ok(())
        }
    }

    /// Run a future under this deadline.
    ///
    /// # Errors
    ///
    /// `Timeout` if the deadline passes first, otherwise the future's result.
    pub async fn run<T, F>(&self, operation: &str, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.remaining() {
            None => future.await,
            Some(remaining) => tokio::time::timeout(remaining, future)
                .await
                .map_err(|_| Error::Timeout(operation.to_string()))?,
        }
    }
}

mod optional_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => {
                serializer.serialize_some(&u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
