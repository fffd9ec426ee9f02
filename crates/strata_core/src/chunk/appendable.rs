use strata_error::{DbError, Result};

use super::constant::ConstantChunk;
use super::dense::{FloatChunk, IntChunk, StrChunk};
use super::Chunk;
use crate::arrays::bitmap::Bitmap;
use crate::arrays::datatype::ColumnType;
use crate::arrays::scalar::ScalarValue;
use crate::arrays::validity::Validity;

/// A single buffered numeric value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumCell {
    Missing,
    Int(i64),
    Float(f64),
}

impl NumCell {
    fn as_int(&self) -> Option<i64> {
        match self {
            NumCell::Int(v) => Some(*v),
            NumCell::Float(v) if v.fract() == 0.0 && v.abs() < i64::MAX as f64 => Some(*v as i64),
            _ => None,
        }
    }
}

/// Write-only buffer for building a chunk one row at a time.
///
/// Nothing can be read back until the buffer is closed into a sealed chunk.
#[derive(Debug, Clone)]
pub enum AppendableChunk {
    Numeric(Vec<NumCell>),
    Str(Vec<Option<String>>),
}

impl AppendableChunk {
    pub fn for_type(column_type: ColumnType) -> Self {
        if column_type.is_numeric_storage() {
            AppendableChunk::Numeric(Vec::new())
        } else {
            AppendableChunk::Str(Vec::new())
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Numeric(cells) => cells.len(),
            Self::Str(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add_num(&mut self, value: f64) -> Result<()> {
        let cell = if value.is_nan() {
            NumCell::Missing
        } else {
            NumCell::Float(value)
        };
        self.numeric_cells()?.push(cell);
        Ok(())
    }

    pub fn add_int(&mut self, value: i64) -> Result<()> {
        self.numeric_cells()?.push(NumCell::Int(value));
        Ok(())
    }

    pub fn add_str(&mut self, value: Option<&str>) -> Result<()> {
        match self {
            Self::Str(values) => {
                values.push(value.map(|s| s.to_string()));
                Ok(())
            }
            Self::Numeric(_) => Err(DbError::validation("Cannot append a string to a numeric chunk")
                .with_field("value", value.unwrap_or("NA"))),
        }
    }

    pub fn add_missing(&mut self) {
        match self {
            Self::Numeric(cells) => cells.push(NumCell::Missing),
            Self::Str(values) => values.push(None),
        }
    }

    pub fn add_zeros(&mut self, n: usize) -> Result<()> {
        let cells = self.numeric_cells()?;
        cells.resize(cells.len() + n, NumCell::Int(0));
        Ok(())
    }

    pub fn add_scalar(&mut self, value: &ScalarValue) -> Result<()> {
        match value {
            ScalarValue::Null => {
                self.add_missing();
                Ok(())
            }
            ScalarValue::Int64(v) => self.add_int(*v),
            ScalarValue::Float64(v) => self.add_num(*v),
            ScalarValue::Utf8(v) => self.add_str(Some(v)),
        }
    }

    /// Copy a single row out of a sealed chunk, using the accessor matching
    /// this buffer's storage.
    pub fn add_from_chunk(&mut self, chunk: &Chunk, idx: usize) -> Result<()> {
        if chunk.is_missing(idx) {
            self.add_missing();
            return Ok(());
        }
        match self {
            Self::Str(values) => {
                let s = chunk.at_str(idx).ok_or_else(|| {
                    DbError::validation("Expected a string value").with_field("index", idx)
                })?;
                values.push(Some(s.to_string()));
                Ok(())
            }
            Self::Numeric(cells) => {
                let cell = match chunk.at_i64(idx) {
                    Some(v) => NumCell::Int(v),
                    None => NumCell::Float(chunk.at_f64(idx)),
                };
                cells.push(cell);
                Ok(())
            }
        }
    }

    /// Seal the buffer, picking the most compact encoding that keeps every
    /// value and missing marker.
    pub fn close(self) -> Chunk {
        match self {
            Self::Str(values) => {
                if values.is_empty() {
                    return Chunk::Constant(ConstantChunk::new(ScalarValue::Int64(0), 0));
                }
                if values.iter().all(|v| v.is_none()) {
                    return Chunk::Constant(ConstantChunk::new_missing(values.len()));
                }
                if values.iter().all(|v| v.is_some() && *v == values[0]) {
                    let value = ScalarValue::from(values[0].clone());
                    return Chunk::Constant(ConstantChunk::new(value, values.len()));
                }
                Chunk::Str(StrChunk::new(values))
            }
            Self::Numeric(cells) => close_numeric(cells),
        }
    }

    fn numeric_cells(&mut self) -> Result<&mut Vec<NumCell>> {
        match self {
            Self::Numeric(cells) => Ok(cells),
            Self::Str(_) => Err(DbError::validation("Cannot append a number to a string chunk")),
        }
    }
}

fn close_numeric(cells: Vec<NumCell>) -> Chunk {
    let len = cells.len();
    if len == 0 {
        return Chunk::Constant(ConstantChunk::new(ScalarValue::Int64(0), 0));
    }
    if cells.iter().all(|c| *c == NumCell::Missing) {
        return Chunk::Constant(ConstantChunk::new_missing(len));
    }

    let all_int = cells
        .iter()
        .all(|c| *c == NumCell::Missing || c.as_int().is_some());

    if all_int {
        let first = cells[0].as_int();
        if first.is_some() && cells.iter().all(|c| c.as_int() == first) {
            return Chunk::Constant(ConstantChunk::new(ScalarValue::from(first), len));
        }

        let mut validity = Bitmap::with_capacity(len);
        let values = cells
            .iter()
            .map(|c| {
                let v = c.as_int();
                validity.push(v.is_some());
                v.unwrap_or(0)
            })
            .collect::<Vec<_>>();
        return Chunk::Int(IntChunk::from_parts(values, Validity::from_bitmap(validity)));
    }

    let values: Vec<f64> = cells
        .iter()
        .map(|c| match c {
            NumCell::Missing => f64::NAN,
            NumCell::Int(v) => *v as f64,
            NumCell::Float(v) => *v,
        })
        .collect();

    let first = values[0];
    if !first.is_nan() && values.iter().all(|v| *v == first) {
        return Chunk::Constant(ConstantChunk::new(ScalarValue::Float64(first), len));
    }

    Chunk::Float(FloatChunk::new(values))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric() -> AppendableChunk {
        AppendableChunk::for_type(ColumnType::Numeric)
    }

    #[test]
    fn empty_is_zero_len_constant() {
        let c = numeric().close();
        assert!(matches!(c, Chunk::Constant(_)));
        assert_eq!(0, c.len());
    }

    #[test]
    fn equal_values_become_constant() {
        let mut b = numeric();
        b.add_int(7).unwrap();
        b.add_num(7.0).unwrap();
        b.add_int(7).unwrap();

        let c = b.close();
        assert!(matches!(c, Chunk::Constant(_)));
        assert_eq!(ScalarValue::Int64(7), c.get(1));
    }

    #[test]
    fn all_missing_constant() {
        let mut b = numeric();
        b.add_missing();
        b.add_num(f64::NAN).unwrap();

        let c = b.close();
        assert!(c.is_missing(0));
        assert!(c.is_missing(1));
    }

    #[test]
    fn integral_with_missing_becomes_int() {
        let mut b = numeric();
        b.add_int(1).unwrap();
        b.add_missing();
        b.add_num(3.0).unwrap();

        let c = b.close();
        assert!(matches!(c, Chunk::Int(_)));
        assert_eq!(ScalarValue::Int64(1), c.get(0));
        assert_eq!(ScalarValue::Null, c.get(1));
        assert_eq!(ScalarValue::Int64(3), c.get(2));
    }

    #[test]
    fn fractions_become_float() {
        let mut b = numeric();
        b.add_int(1).unwrap();
        b.add_num(2.5).unwrap();
        b.add_missing();

        let c = b.close();
        assert!(matches!(c, Chunk::Float(_)));
        assert_eq!(ScalarValue::Float64(1.0), c.get(0));
        assert_eq!(ScalarValue::Float64(2.5), c.get(1));
        assert!(c.is_missing(2));
    }

    #[test]
    fn strings() {
        let mut b = AppendableChunk::for_type(ColumnType::String);
        b.add_str(Some("a")).unwrap();
        b.add_missing();
        b.add_str(Some("b")).unwrap();
        b.add_num(1.0).unwrap_err();

        let c = b.close();
        assert_eq!(Some("a"), c.at_str(0));
        assert!(c.is_missing(1));
        assert_eq!(Some("b"), c.at_str(2));
    }

    #[test]
    fn copy_from_chunk_keeps_types() {
        let mut src = AppendableChunk::for_type(ColumnType::String);
        src.add_str(Some("x")).unwrap();
        src.add_missing();
        let src = src.close();

        let mut dst = AppendableChunk::for_type(ColumnType::String);
        dst.add_from_chunk(&src, 1).unwrap();
        dst.add_from_chunk(&src, 0).unwrap();
        let dst = dst.close();

        assert!(dst.is_missing(0));
        assert_eq!(Some("x"), dst.at_str(1));
    }
}
