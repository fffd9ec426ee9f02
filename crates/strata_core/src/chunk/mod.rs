//! Physical encodings for one contiguous run of a column's rows.

pub mod appendable;
pub mod constant;
pub mod dense;
pub mod subset;

use strata_error::{DbError, Result};

use self::appendable::AppendableChunk;
use self::constant::ConstantChunk;
use self::dense::{FloatChunk, IntChunk, StrChunk};
use self::subset::SubsetChunk;
use crate::arrays::datatype::ColumnType;
use crate::arrays::scalar::ScalarValue;

/// A sealed chunk.
///
/// Reads never fail: reading a row past the end panics like slice indexing,
/// and a missing value reads as `Null`/NaN. Writes return an error when the
/// encoding can't hold the value.
#[derive(Debug, Clone)]
pub enum Chunk {
    Constant(ConstantChunk),
    Int(IntChunk),
    Float(FloatChunk),
    Str(StrChunk),
    Subset(SubsetChunk),
}

impl Chunk {
    pub fn len(&self) -> usize {
        match self {
            Self::Constant(c) => c.len(),
            Self::Int(c) => c.len(),
            Self::Float(c) => c.len(),
            Self::Str(c) => c.len(),
            Self::Subset(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// If writes into this chunk are always rejected.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::Subset(_))
    }

    pub fn get(&self, idx: usize) -> ScalarValue {
        match self {
            Self::Constant(c) => c.get(idx).clone(),
            Self::Int(c) => c.get(idx).into(),
            Self::Float(c) => c.get(idx).into(),
            Self::Str(c) => c.get(idx).into(),
            Self::Subset(c) => c.get(idx),
        }
    }

    /// Numeric value at `idx`, NaN if missing or not a number.
    pub fn at_f64(&self, idx: usize) -> f64 {
        match self {
            Self::Constant(c) => c.get(idx).as_f64_or_nan().unwrap_or(f64::NAN),
            Self::Int(c) => c.get(idx).map(|v| v as f64).unwrap_or(f64::NAN),
            Self::Float(c) => c.get(idx),
            Self::Str(_) => f64::NAN,
            Self::Subset(c) => c.at_f64(idx),
        }
    }

    /// Integer value at `idx` if this chunk stores integers.
    pub fn at_i64(&self, idx: usize) -> Option<i64> {
        match self {
            Self::Constant(c) => match c.get(idx) {
                ScalarValue::Int64(v) => Some(*v),
                _ => None,
            },
            Self::Int(c) => c.get(idx),
            Self::Float(_) | Self::Str(_) => None,
            Self::Subset(c) => c.at_i64(idx),
        }
    }

    pub fn at_str(&self, idx: usize) -> Option<&str> {
        match self {
            Self::Constant(c) => match c.get(idx) {
                ScalarValue::Utf8(v) => Some(v.as_str()),
                _ => None,
            },
            Self::Str(c) => c.get(idx),
            Self::Int(_) | Self::Float(_) => None,
            Self::Subset(c) => c.at_str(idx),
        }
    }

    pub fn is_missing(&self, idx: usize) -> bool {
        match self {
            Self::Constant(c) => c.get(idx).is_null(),
            Self::Int(c) => c.is_missing(idx),
            Self::Float(c) => c.is_missing(idx),
            Self::Str(c) => c.is_missing(idx),
            Self::Subset(c) => c.is_missing(idx),
        }
    }

    /// Write a value at `idx`.
    ///
    /// An integer chunk receiving a fractional value is widened to floats in
    /// place.
    pub fn set(&mut self, idx: usize, value: &ScalarValue) -> Result<()> {
        if idx >= self.len() {
            return Err(DbError::bounds("Chunk offset out of range")
                .with_field("index", idx)
                .with_field("len", self.len()));
        }

        match self {
            Self::Constant(c) => c.set(idx, value),
            Self::Int(c) => {
                if let ScalarValue::Float64(v) = value {
                    if v.fract() != 0.0 || !v.is_finite() {
                        let mut widened = c.to_float();
                        widened.set(idx, value)?;
                        *self = Self::Float(widened);
                        return Ok(());
                    }
                }
                c.set(idx, value)
            }
            Self::Float(c) => c.set(idx, value),
            Self::Str(c) => c.set(idx, value),
            Self::Subset(_) => Err(DbError::unsupported("Cannot write into a subset view chunk")
                .with_field("index", idx)),
        }
    }

    pub fn set_missing(&mut self, idx: usize) -> Result<()> {
        self.set(idx, &ScalarValue::Null)
    }

    /// Values in `start..end`.
    pub fn get_range(&self, start: usize, end: usize) -> Vec<ScalarValue> {
        (start..end).map(|idx| self.get(idx)).collect()
    }

    pub fn get_by_indices(&self, indices: &[usize]) -> Vec<ScalarValue> {
        indices.iter().map(|&idx| self.get(idx)).collect()
    }

    fn is_zero_at(&self, idx: usize) -> bool {
        match self.get(idx) {
            ScalarValue::Int64(v) => v == 0,
            ScalarValue::Float64(v) => v == 0.0,
            _ => false,
        }
    }

    /// First offset at or after `from` holding a value other than numeric
    /// zero. Missing values count as non-zero.
    pub fn next_non_zero(&self, from: usize) -> Option<usize> {
        match self {
            Self::Constant(c) if c.is_zero() => None,
            Self::Constant(c) => (from < c.len()).then_some(from),
            Self::Int(c) => (from..c.len()).find(|&idx| c.get(idx) != Some(0)),
            _ => (from..self.len()).find(|&idx| !self.is_zero_at(idx)),
        }
    }

    pub fn count_non_zero(&self) -> usize {
        match self {
            Self::Constant(c) if c.is_zero() => 0,
            Self::Constant(c) => c.len(),
            Self::Int(c) => c.len() - c.iter_valid().filter(|(_, v)| *v == 0).count(),
            _ => (0..self.len()).filter(|&idx| !self.is_zero_at(idx)).count(),
        }
    }

    /// Smallest non-missing numeric value.
    pub fn min(&self) -> Option<f64> {
        self.numeric_values().reduce(f64::min)
    }

    /// Largest non-missing numeric value.
    pub fn max(&self) -> Option<f64> {
        self.numeric_values().reduce(f64::max)
    }

    fn numeric_values(&self) -> Box<dyn Iterator<Item = f64> + '_> {
        match self {
            Self::Constant(c) => match c.value().try_as_f64() {
                Ok(v) if !c.is_empty() => Box::new(std::iter::once(v)),
                _ => Box::new(std::iter::empty()),
            },
            Self::Int(c) => Box::new(c.iter_valid().map(|(_, v)| v as f64)),
            Self::Float(c) => Box::new(c.values().iter().copied().filter(|v| !v.is_nan())),
            Self::Str(_) => Box::new(std::iter::empty()),
            Self::Subset(c) => Box::new((0..c.len()).map(|idx| c.at_f64(idx)).filter(|v| !v.is_nan())),
        }
    }

    /// Copy a view chunk into a standalone chunk. Other encodings are cloned.
    pub fn materialize(&self) -> Result<Chunk> {
        match self {
            Self::Subset(c) => {
                let values = (0..c.len()).map(|idx| c.get(idx)).collect::<Vec<_>>();
                let column_type = if values.iter().any(|v| matches!(v, ScalarValue::Utf8(_))) {
                    ColumnType::String
                } else {
                    ColumnType::Numeric
                };
                let mut builder = AppendableChunk::for_type(column_type);
                for value in &values {
                    builder.add_scalar(value)?;
                }
                Ok(builder.close())
            }
            other => Ok(other.clone()),
        }
    }

    /// A chunk holding the same values that accepts arbitrary writes of its
    /// type.
    pub fn to_writable(&self) -> Result<Chunk> {
        match self {
            Self::Constant(c) => Ok(c.to_writable()),
            Self::Subset(_) => self.materialize()?.to_writable(),
            other => Ok(other.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "index out of bounds")]
    fn constant_read_past_end() {
        let c = Chunk::Constant(ConstantChunk::new(ScalarValue::Int64(4), 2));
        assert_eq!(ScalarValue::Int64(4), c.get(1));
        c.get(2);
    }

    #[test]
    fn int_widens_on_fraction() {
        let mut c = Chunk::Int(IntChunk::new(vec![1, 2, 3]));
        c.set(1, &ScalarValue::Float64(2.5)).unwrap();

        assert!(matches!(c, Chunk::Float(_)));
        assert_eq!(ScalarValue::Float64(1.0), c.get(0));
        assert_eq!(ScalarValue::Float64(2.5), c.get(1));
    }

    #[test]
    fn set_out_of_range() {
        let mut c = Chunk::Int(IntChunk::new(vec![1]));
        let err = c.set(1, &ScalarValue::Int64(1)).unwrap_err();
        assert_eq!(strata_error::DbErrorKind::Bounds, err.kind());
    }

    #[test]
    fn constant_zero_short_circuits() {
        let c = Chunk::Constant(ConstantChunk::new(ScalarValue::Int64(0), 1000));
        assert_eq!(0, c.count_non_zero());
        assert_eq!(None, c.next_non_zero(0));

        let c = Chunk::Constant(ConstantChunk::new_missing(5));
        assert_eq!(5, c.count_non_zero());
        assert_eq!(Some(3), c.next_non_zero(3));
        assert_eq!(None, c.next_non_zero(5));
    }

    #[test]
    fn sparse_queries_dense() {
        let c = Chunk::Float(FloatChunk::new(vec![0.0, 1.5, 0.0, f64::NAN, 0.0]));
        assert_eq!(2, c.count_non_zero());
        assert_eq!(Some(1), c.next_non_zero(0));
        assert_eq!(Some(3), c.next_non_zero(2));
        assert_eq!(None, c.next_non_zero(4));

        let mut b = AppendableChunk::for_type(ColumnType::Numeric);
        for v in [0, 3, 0, 0] {
            b.add_int(v).unwrap();
        }
        b.add_missing();
        let c = b.close();
        assert_eq!(2, c.count_non_zero());
        assert_eq!(Some(4), c.next_non_zero(2));
    }

    #[test]
    fn min_max_skip_missing() {
        let c = Chunk::Float(FloatChunk::new(vec![2.0, f64::NAN, -1.0]));
        assert_eq!(Some(-1.0), c.min());
        assert_eq!(Some(2.0), c.max());

        let c = Chunk::Constant(ConstantChunk::new_missing(3));
        assert_eq!(None, c.min());
    }

    #[test]
    fn bulk_extraction() {
        let c = Chunk::Str(StrChunk::new(vec![Some("a".into()), None, Some("c".into())]));
        assert_eq!(
            vec![ScalarValue::Null, ScalarValue::from("c")],
            c.get_range(1, 3)
        );
        assert_eq!(
            vec![ScalarValue::from("c"), ScalarValue::from("a")],
            c.get_by_indices(&[2, 0])
        );
    }

    #[test]
    fn constant_to_writable_then_set() {
        let c = Chunk::Constant(ConstantChunk::new(ScalarValue::Int64(4), 3));
        let mut w = c.to_writable().unwrap();
        w.set(1, &ScalarValue::Int64(9)).unwrap();

        assert_eq!(ScalarValue::Int64(4), w.get(0));
        assert_eq!(ScalarValue::Int64(9), w.get(1));
    }

    #[test]
    fn set_missing_on_constants() {
        let mut missing = Chunk::Constant(ConstantChunk::new_missing(2));
        missing.set_missing(1).unwrap();

        let mut fives = Chunk::Constant(ConstantChunk::new(ScalarValue::Int64(5), 2));
        let err = fives.set_missing(0).unwrap_err();
        assert_eq!(strata_error::DbErrorKind::Unsupported, err.kind());

        let mut dense = fives.to_writable().unwrap();
        dense.set_missing(0).unwrap();
        assert!(dense.is_missing(0));
        assert!(!dense.is_missing(1));
    }
}
