//! Dense chunk encodings holding one value per row.

use strata_error::{DbError, Result};

use crate::arrays::scalar::ScalarValue;
use crate::arrays::validity::Validity;

/// Whole numbers with a validity mask.
///
/// Also used for categorical codes and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct IntChunk {
    values: Vec<i64>,
    validity: Validity,
}

impl IntChunk {
    pub fn new(values: Vec<i64>) -> Self {
        let validity = Validity::new_all_valid(values.len());
        IntChunk { values, validity }
    }

    /// Build from values and a mask of the same length.
    pub(crate) fn from_parts(values: Vec<i64>, validity: Validity) -> Self {
        debug_assert_eq!(values.len(), validity.len());
        IntChunk { values, validity }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<i64> {
        if self.validity.is_valid(idx) {
            Some(self.values[idx])
        } else {
            None
        }
    }

    pub fn is_missing(&self, idx: usize) -> bool {
        !self.validity.is_valid(idx)
    }

    /// Write a value.
    ///
    /// Errors on values that aren't whole numbers. The caller is expected to
    /// widen the chunk to floats for those.
    pub fn set(&mut self, idx: usize, value: &ScalarValue) -> Result<()> {
        match value {
            ScalarValue::Null => self.validity.set_invalid(idx),
            other => {
                self.values[idx] = other.try_as_i64()?;
                self.validity.set_valid(idx);
            }
        }
        Ok(())
    }

    pub fn to_float(&self) -> FloatChunk {
        let values = self
            .values
            .iter()
            .enumerate()
            .map(|(idx, v)| {
                if self.validity.is_valid(idx) {
                    *v as f64
                } else {
                    f64::NAN
                }
            })
            .collect();
        FloatChunk::new(values)
    }

    pub(crate) fn iter_valid(&self) -> impl Iterator<Item = (usize, i64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter(|(idx, _)| self.validity.is_valid(*idx))
            .map(|(idx, v)| (idx, *v))
    }
}

/// Floating point values. NaN marks a missing value.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatChunk {
    values: Vec<f64>,
}

impl FloatChunk {
    pub fn new(values: Vec<f64>) -> Self {
        FloatChunk { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, idx: usize) -> f64 {
        self.values[idx]
    }

    pub fn is_missing(&self, idx: usize) -> bool {
        self.values[idx].is_nan()
    }

    pub fn set(&mut self, idx: usize, value: &ScalarValue) -> Result<()> {
        self.values[idx] = value.as_f64_or_nan()?;
        Ok(())
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Nullable strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrChunk {
    values: Vec<Option<String>>,
}

impl StrChunk {
    pub fn new(values: Vec<Option<String>>) -> Self {
        StrChunk { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        self.values[idx].as_deref()
    }

    pub fn is_missing(&self, idx: usize) -> bool {
        self.values[idx].is_none()
    }

    pub fn set(&mut self, idx: usize, value: &ScalarValue) -> Result<()> {
        self.values[idx] = match value {
            ScalarValue::Null => None,
            ScalarValue::Utf8(s) => Some(s.clone()),
            other => {
                return Err(DbError::validation("Cannot write a number into a string chunk")
                    .with_field("index", idx)
                    .with_field("value", other));
            }
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_set_missing_and_back() {
        let mut c = IntChunk::new(vec![1, 2, 3]);
        c.set(1, &ScalarValue::Null).unwrap();
        assert_eq!(None, c.get(1));
        assert!(c.is_missing(1));

        c.set(1, &ScalarValue::Float64(8.0)).unwrap();
        assert_eq!(Some(8), c.get(1));
    }

    #[test]
    fn int_rejects_fraction() {
        let mut c = IntChunk::new(vec![1]);
        c.set(0, &ScalarValue::Float64(0.5)).unwrap_err();
    }

    #[test]
    fn int_to_float_keeps_missing() {
        let mut c = IntChunk::new(vec![1, 2]);
        c.set(0, &ScalarValue::Null).unwrap();
        let f = c.to_float();
        assert!(f.is_missing(0));
        assert_eq!(2.0, f.get(1));
    }

    #[test]
    fn str_rejects_numbers() {
        let mut c = StrChunk::new(vec![Some("a".to_string())]);
        c.set(0, &ScalarValue::Int64(1)).unwrap_err();
        c.set(0, &ScalarValue::Null).unwrap();
        assert!(c.is_missing(0));
    }
}
