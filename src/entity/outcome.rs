//! Outcome and error information shared by test results, steps and measurements

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Outcome of a test result, step or measurement.
///
/// Discriminants are stable; transport adapters map them to their own wire
/// representation with `i32::from` / `TryFrom<i32>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i32)]
pub enum Outcome {
    /// No outcome recorded
    #[default]
    Unspecified = 0,
    /// Passed
    Passed = 1,
    /// Failed
    Failed = 2,
    /// Could not be determined
    Indeterminate = 3,
}

impl Outcome {
    /// Get outcome name as string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unspecified => "UNSPECIFIED",
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
            Self::Indeterminate => "INDETERMINATE",
        }
    }
}

impl From<Outcome> for i32 {
    fn from(outcome: Outcome) -> Self {
        outcome as Self
    }
}

impl TryFrom<i32> for Outcome {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(Self::Unspecified),
            1 => Ok(Self::Passed),
            2 => Ok(Self::Failed),
            3 => Ok(Self::Indeterminate),
            other => Err(Error::InvalidInput(format!("Unknown outcome value: {other}"))),
        }
    }
}

impl FromStr for Outcome {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        let name = name
            .strip_prefix("OUTCOME_")
            .or_else(|| name.strip_prefix("outcome_"))
            .unwrap_or(name);
        [Self::Unspecified, Self::Passed, Self::Failed, Self::Indeterminate]
            .into_iter()
            .find(|o| o.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::InvalidInput(format!("Unknown outcome: {s}")))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error or exception details recorded on a failed result, step or measurement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInformation {
    /// Numeric error code
    pub error_code: i32,
    /// Human-readable message
    pub message: String,
    /// Where the error came from (file, module, instrument)
    pub source: String,
}

impl ErrorInformation {
    /// Create error information from its parts.
    #[must_use]
    pub fn new(error_code: i32, message: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            error_code,
            message: message.into(),
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_integer_values() {
        assert_eq!(i32::from(Outcome::Unspecified), 0);
        assert_eq!(i32::from(Outcome::Passed), 1);
        assert_eq!(i32::from(Outcome::Failed), 2);
        assert_eq!(i32::from(Outcome::Indeterminate), 3);
        assert_eq!(Outcome::try_from(2).unwrap(), Outcome::Failed);
        assert!(Outcome::try_from(99).is_err());
    }

    #[test]
    fn test_outcome_default_is_unspecified() {
        assert_eq!(Outcome::default(), Outcome::Unspecified);
    }

    #[test]
    fn test_outcome_parse() {
        assert_eq!("PASSED".parse::<Outcome>().unwrap(), Outcome::Passed);
        assert_eq!("failed".parse::<Outcome>().unwrap(), Outcome::Failed);
        assert_eq!("OUTCOME_INDETERMINATE".parse::<Outcome>().unwrap(), Outcome::Indeterminate);
        assert!("maybe".parse::<Outcome>().is_err());
    }
}
