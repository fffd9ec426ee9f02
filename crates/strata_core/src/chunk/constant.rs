use strata_error::{DbError, Result};

use super::dense::{FloatChunk, IntChunk, StrChunk};
use super::Chunk;
use crate::arrays::scalar::ScalarValue;

/// A run of rows all holding the same value.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantChunk {
    value: ScalarValue,
    len: usize,
}

impl ConstantChunk {
    pub fn new(value: ScalarValue, len: usize) -> Self {
        // Keep NaN out of the float variant, missing is always `Null`.
        let value = match value {
            ScalarValue::Float64(v) if v.is_nan() => ScalarValue::Null,
            other => other,
        };
        ConstantChunk { value, len }
    }

    pub fn new_missing(len: usize) -> Self {
        ConstantChunk {
            value: ScalarValue::Null,
            len,
        }
    }

    pub fn value(&self) -> &ScalarValue {
        &self.value
    }

    /// The constant, as read from row `idx`.
    ///
    /// Panics if `idx` is past the end, the same as the dense encodings.
    pub fn get(&self, idx: usize) -> &ScalarValue {
        assert!(
            idx < self.len,
            "index out of bounds: the len is {} but the index is {idx}",
            self.len
        );
        &self.value
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// If the constant is numeric zero.
    pub fn is_zero(&self) -> bool {
        match &self.value {
            ScalarValue::Int64(v) => *v == 0,
            ScalarValue::Float64(v) => *v == 0.0,
            _ => false,
        }
    }

    /// Writing the constant itself is accepted as a no-op. Anything else needs
    /// a writable chunk.
    pub fn set(&self, idx: usize, value: &ScalarValue) -> Result<()> {
        if scalar_eq(&self.value, value) {
            return Ok(());
        }
        Err(DbError::unsupported("Cannot write a different value into a constant chunk")
            .with_field("index", idx)
            .with_field("constant", &self.value)
            .with_field("value", value))
    }

    /// Inflate into a dense chunk of the same values.
    pub fn to_writable(&self) -> Chunk {
        match &self.value {
            ScalarValue::Null => Chunk::Float(FloatChunk::new(vec![f64::NAN; self.len])),
            ScalarValue::Int64(v) => Chunk::Int(IntChunk::new(vec![*v; self.len])),
            ScalarValue::Float64(v) => Chunk::Float(FloatChunk::new(vec![*v; self.len])),
            ScalarValue::Utf8(v) => {
                Chunk::Str(StrChunk::new(vec![Some(v.clone()); self.len]))
            }
        }
    }
}

/// Numeric values compare by value regardless of integer or float storage.
fn scalar_eq(a: &ScalarValue, b: &ScalarValue) -> bool {
    match (a, b) {
        (ScalarValue::Int64(a), ScalarValue::Float64(b))
        | (ScalarValue::Float64(b), ScalarValue::Int64(a)) => (*a as f64) == *b,
        (ScalarValue::Float64(b), ScalarValue::Null) | (ScalarValue::Null, ScalarValue::Float64(b)) => {
            b.is_nan()
        }
        (a, b) => a == b,
    }
}
