//! Monikers - indirect locators for published measurement and condition values
//!
//! A [`Moniker`] stands in for a value that may be large (waveforms, spectra)
//! or batched (parametric sweeps). Entity records carry the moniker, never the
//! payload. The [`DataLocator`] stores payloads in a [`crate::kv::KvStore`]
//! and dereferences monikers on demand.
//!
//! ## Example
//!
//! ```rust
//! use datastore_core::kv::MemoryKvStore;
//! use datastore_core::moniker::{DataLocator, ScalarKind, Value, ValueType};
//!
//! # async fn example() -> datastore_core::Result<()> {
//! let locator = DataLocator::new(MemoryKvStore::new(), "localhost:42000");
//! let moniker = locator
//!     .publish_value(&Value::from(3.3), ValueType::Scalar(ScalarKind::Float))
//!     .await?;
//! let value = locator
//!     .read_value(&moniker, ValueType::Scalar(ScalarKind::Float))
//!     .await?;
//! assert_eq!(value, Value::from(3.3));
//! # Ok(())
//! # }
//! ```

mod locator;
mod value;

pub use locator::{DataLocator, WHOLE_SET};
pub use value::{AnalogWaveform, Scalar, Spectrum, Value, Vector, XyData};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Primitive element type of scalars and vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    /// 64-bit signed integer
    Int,
    /// 64-bit float
    Float,
    /// UTF-8 string
    String,
    /// Boolean
    Bool,
}

impl ScalarKind {
    /// Get kind name as string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::Bool => "bool",
        }
    }

    const ALL: [Self; 4] = [Self::Int, Self::Float, Self::String, Self::Bool];
}

/// Type tag of a published value.
///
/// Textual form (used in queries): `scalar:float`, `vector:int`,
/// `double_analog_waveform`, `i16_analog_waveform`, `double_spectrum`,
/// `double_xy_data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    /// Single scalar
    Scalar(ScalarKind),
    /// Homogeneous array of scalars
    Vector(ScalarKind),
    /// Analog waveform with `f64` samples
    DoubleAnalogWaveform,
    /// Analog waveform with `i16` samples
    I16AnalogWaveform,
    /// Frequency spectrum with `f64` samples
    DoubleSpectrum,
    /// Paired `f64` x/y data
    DoubleXyData,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(kind) => write!(f, "scalar:{}", kind.as_str()),
            Self::Vector(kind) => write!(f, "vector:{}", kind.as_str()),
            Self::DoubleAnalogWaveform => f.write_str("double_analog_waveform"),
            Self::I16AnalogWaveform => f.write_str("i16_analog_waveform"),
            Self::DoubleSpectrum => f.write_str("double_spectrum"),
            Self::DoubleXyData => f.write_str("double_xy_data"),
        }
    }
}

impl FromStr for ValueType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        let element = |name: &str| {
            ScalarKind::ALL
                .into_iter()
                .find(|kind| kind.as_str() == name)
                .ok_or_else(|| Error::InvalidInput(format!("Unknown value type: {s}")))
        };
        match lowered.split_once(':') {
            Some(("scalar", name)) => element(name).map(Self::Scalar),
            Some(("vector", name)) => element(name).map(Self::Vector),
            Some(_) => Err(Error::InvalidInput(format!("Unknown value type: {s}"))),
            None => match lowered.as_str() {
                "double_analog_waveform" => Ok(Self::DoubleAnalogWaveform),
                "i16_analog_waveform" => Ok(Self::I16AnalogWaveform),
                "double_spectrum" => Ok(Self::DoubleSpectrum),
                "double_xy_data" => Ok(Self::DoubleXyData),
                _ => Err(Error::InvalidInput(format!("Unknown value type: {s}"))),
            },
        }
    }
}

/// Size of the stored value: element count for vectors, sample count for
/// waveforms and spectra, point count for XY data, 1 for scalars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ShapeHint {
    /// Number of elements
    pub length: usize,
}

/// Opaque locator for a published value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Moniker {
    pub(crate) service_location: String,
    pub(crate) data_source: String,
    pub(crate) data_instance: i64,
    pub(crate) value_type: ValueType,
    pub(crate) shape: ShapeHint,
    pub(crate) parametric_index: i64,
}

impl Moniker {
    /// Rebuild a moniker from its parts (used by transport adapters).
    #[must_use]
    pub fn from_parts(
        service_location: impl Into<String>,
        data_source: impl Into<String>,
        data_instance: i64,
        value_type: ValueType,
        shape: ShapeHint,
        parametric_index: i64,
    ) -> Self {
        Self {
            service_location: service_location.into(),
            data_source: data_source.into(),
            data_instance,
            value_type,
            shape,
            parametric_index,
        }
    }

    /// Service that holds the payload.
    #[must_use]
    pub fn service_location(&self) -> &str {
        &self.service_location
    }

    /// Locator key generated at publish time.
    #[must_use]
    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    /// Instance within the data source (element position for a batch).
    #[must_use]
    pub const fn data_instance(&self) -> i64 {
        self.data_instance
    }

    /// Type of the stored value.
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Size of the stored value.
    #[must_use]
    pub const fn shape(&self) -> ShapeHint {
        self.shape
    }

    /// Position within a batch, or -1 for a single publish.
    #[must_use]
    pub const fn parametric_index(&self) -> i64 {
        self.parametric_index
    }

    /// Key of the payload in the backing store.
    pub(crate) fn storage_key(&self) -> String {
        format!("{}/{}", self.data_source, self.data_instance)
    }
}
