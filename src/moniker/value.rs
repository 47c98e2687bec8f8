//! Payload values that can be published behind a moniker

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ScalarKind, ShapeHint, ValueType};
use crate::{Error, Result};

/// Single scalar value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    /// Integer
    Int(i64),
    /// Float
    Float(f64),
    /// String
    String(String),
    /// Boolean
    Bool(bool),
}

impl Scalar {
    /// Element kind.
    #[must_use]
    pub const fn kind(&self) -> ScalarKind {
        match self {
            Self::Int(_) => ScalarKind::Int,
            Self::Float(_) => ScalarKind::Float,
            Self::String(_) => ScalarKind::String,
            Self::Bool(_) => ScalarKind::Bool,
        }
    }
}

/// Homogeneous array of scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Vector {
    /// Integers
    Int(Vec<i64>),
    /// Floats
    Float(Vec<f64>),
    /// Strings
    String(Vec<String>),
    /// Booleans
    Bool(Vec<bool>),
}

impl Vector {
    /// Element kind.
    #[must_use]
    pub const fn kind(&self) -> ScalarKind {
        match self {
            Self::Int(_) => ScalarKind::Int,
            Self::Float(_) => ScalarKind::Float,
            Self::String(_) => ScalarKind::String,
            Self::Bool(_) => ScalarKind::Bool,
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Int(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::String(v) => v.len(),
            Self::Bool(v) => v.len(),
        }
    }

    /// Check if the vector has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Uniformly sampled analog waveform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalogWaveform<T> {
    /// Timestamp of the first sample
    pub t0: Option<DateTime<Utc>>,
    /// Seconds between samples
    pub dt: f64,
    /// Sample values
    pub samples: Vec<T>,
}

impl<T> AnalogWaveform<T> {
    /// Create a waveform from its timing and samples.
    #[must_use]
    pub const fn new(t0: Option<DateTime<Utc>>, dt: f64, samples: Vec<T>) -> Self {
        Self { t0, dt, samples }
    }
}

/// Frequency-domain samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    /// Frequency of the first sample in Hz
    pub start_frequency: f64,
    /// Spacing between samples in Hz
    pub frequency_increment: f64,
    /// Sample values
    pub data: Vec<f64>,
}

/// Paired x/y samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XyData {
    /// X values
    pub x: Vec<f64>,
    /// Y values, same length as `x`
    pub y: Vec<f64>,
}

/// A value published through the data locator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Single scalar
    Scalar(Scalar),
    /// Homogeneous array
    Vector(Vector),
    /// Analog waveform, `f64` samples
    DoubleAnalogWaveform(AnalogWaveform<f64>),
    /// Analog waveform, `i16` samples
    I16AnalogWaveform(AnalogWaveform<i16>),
    /// Frequency spectrum
    DoubleSpectrum(Spectrum),
    /// X/Y data
    DoubleXyData(XyData),
}

fn all_finite(what: &str, values: &[f64]) -> Result<()> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(i) => Err(Error::InvalidInput(format!(
            "{what}[{i}] is not a finite number"
        ))),
        None => Ok(()),
    }
}

impl Value {
    /// Type tag of this value.
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::Scalar(s) => ValueType::Scalar(s.kind()),
            Self::Vector(v) => ValueType::Vector(v.kind()),
            Self::DoubleAnalogWaveform(_) => ValueType::DoubleAnalogWaveform,
            Self::I16AnalogWaveform(_) => ValueType::I16AnalogWaveform,
            Self::DoubleSpectrum(_) => ValueType::DoubleSpectrum,
            Self::DoubleXyData(_) => ValueType::DoubleXyData,
        }
    }

    /// Element count of this value.
    #[must_use]
    pub fn shape(&self) -> ShapeHint {
        let length = match self {
            Self::Scalar(_) => 1,
            Self::Vector(v) => v.len(),
            Self::DoubleAnalogWaveform(w) => w.samples.len(),
            Self::I16AnalogWaveform(w) => w.samples.len(),
            Self::DoubleSpectrum(s) => s.data.len(),
            Self::DoubleXyData(xy) => xy.x.len(),
        };
        ShapeHint { length }
    }

    /// Check the value is well formed and has the declared type.
    ///
    /// # Errors
    ///
    /// `TypeMismatch` if the value is not a `declared`, `InvalidInput` for
    /// non-finite floats, a non-positive sample interval, a negative
    /// frequency increment or unequal XY lengths.
    pub fn validate(&self, declared: ValueType) -> Result<()> {
        if self.value_type() != declared {
            return Err(Error::type_mismatch(declared, self.value_type()));
        }
        match self {
            Self::Scalar(Scalar::Float(v)) => all_finite("value", &[*v]),
            Self::Scalar(_) => Ok(()),
            Self::I16AnalogWaveform(w) => check_interval(w.dt),
            Self::Vector(Vector::Float(v)) => all_finite("values", v),
            Self::Vector(_) => Ok(()),
            Self::DoubleAnalogWaveform(w) => {
                check_interval(w.dt)?;
                all_finite("samples", &w.samples)
            }
            Self::DoubleSpectrum(s) => {
                all_finite("start_frequency", &[s.start_frequency])?;
                if !(s.frequency_increment.is_finite() && s.frequency_increment >= 0.0) {
                    return Err(Error::InvalidInput(format!(
                        "frequency_increment must be finite and non-negative, got {}",
                        s.frequency_increment
                    )));
                }
                all_finite("data", &s.data)
            }
            Self::DoubleXyData(xy) => {
                if xy.x.len() != xy.y.len() {
                    return Err(Error::InvalidInput(format!(
                        "x and y must have equal lengths, got {} and {}",
                        xy.x.len(),
                        xy.y.len()
                    )));
                }
                all_finite("x", &xy.x)?;
                all_finite("y", &xy.y)
            }
        }
    }
}

fn check_interval(dt: f64) -> Result<()> {
    if dt.is_finite() && dt > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "dt must be finite and positive, got {dt}"
        )))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Scalar(Scalar::Int(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Scalar(Scalar::Float(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Scalar(Scalar::Bool(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Scalar(Scalar::String(value.to_string()))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Scalar(Scalar::String(value))
    }
}

impl From<Vec<f64>> for Value {
    fn from(value: Vec<f64>) -> Self {
        Self::Vector(Vector::Float(value))
    }
}

impl From<Vec<i64>> for Value {
    fn from(value: Vec<i64>) -> Self {
        Self::Vector(Vector::Int(value))
    }
}

impl From<AnalogWaveform<f64>> for Value {
    fn from(value: AnalogWaveform<f64>) -> Self {
        Self::DoubleAnalogWaveform(value)
    }
}

impl From<AnalogWaveform<i16>> for Value {
    fn from(value: AnalogWaveform<i16>) -> Self {
        Self::I16AnalogWaveform(value)
    }
}

impl From<Spectrum> for Value {
    fn from(value: Spectrum) -> Self {
        Self::DoubleSpectrum(value)
    }
}

impl From<XyData> for Value {
    fn from(value: XyData) -> Self {
        Self::DoubleXyData(value)
    }
}
