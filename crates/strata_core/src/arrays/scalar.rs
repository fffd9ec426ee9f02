use std::fmt;

use strata_error::{DbError, Result};

/// A single typed value read from or written to a chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Int64(i64),
    Float64(f64),
    Utf8(String),
}

impl ScalarValue {
    pub const fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// Get the value as a float, with missing values mapping to NaN.
    pub fn as_f64_or_nan(&self) -> Result<f64> {
        match self {
            Self::Null => Ok(f64::NAN),
            Self::Int64(v) => Ok(*v as f64),
            Self::Float64(v) => Ok(*v),
            Self::Utf8(s) => Err(DbError::validation("Expected a number, got a string")
                .with_field("value", s)),
        }
    }

    pub fn try_as_f64(&self) -> Result<f64> {
        match self {
            Self::Null => Err(DbError::validation("Expected a number, got a missing value")),
            other => other.as_f64_or_nan(),
        }
    }

    /// Get the value as an integer.
    ///
    /// Floats are accepted only if they hold an integral value.
    pub fn try_as_i64(&self) -> Result<i64> {
        match self {
            Self::Int64(v) => Ok(*v),
            Self::Float64(v) if v.fract() == 0.0 && v.is_finite() => Ok(*v as i64),
            other => Err(DbError::validation("Expected an integer").with_field("value", other)),
        }
    }

    pub fn try_into_string(self) -> Result<String> {
        match self {
            Self::Utf8(s) => Ok(s),
            other => Err(DbError::validation("Expected a string").with_field("value", other)),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NA"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Utf8(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Int64(value)
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        if value.is_nan() {
            ScalarValue::Null
        } else {
            ScalarValue::Float64(value)
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        ScalarValue::Int64(value as i64)
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::Utf8(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::Utf8(value)
    }
}

impl<T: Into<ScalarValue>> From<Option<T>> for ScalarValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => ScalarValue::Null,
        }
    }
}
