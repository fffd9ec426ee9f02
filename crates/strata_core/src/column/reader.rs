use std::sync::Arc;

use strata_error::{DbError, Result};

use super::Column;
use crate::arrays::scalar::ScalarValue;
use crate::chunk::Chunk;
use crate::cluster::Cluster;

/// Random access reader over a column.
///
/// Keeps the most recently used chunk around, so scanning rows in order only
/// touches the store once per chunk.
#[derive(Debug)]
pub struct ColumnReader<'a> {
    cluster: &'a Cluster,
    column: &'a Column,
    current: Option<(usize, Arc<Chunk>)>,
}

impl<'a> ColumnReader<'a> {
    pub fn new(cluster: &'a Cluster, column: &'a Column) -> Self {
        ColumnReader {
            cluster,
            column,
            current: None,
        }
    }

    fn chunk_for(&mut self, row: u64) -> Result<(&Chunk, usize)> {
        let column = self.column;
        let layout = column.layout();
        let cidx = layout.chunk_for_row(row).ok_or_else(|| {
            DbError::bounds("Row out of range")
                .with_field("row", row)
                .with_field("num_rows", layout.num_rows())
        })?;

        let cached = matches!(&self.current, Some((idx, _)) if *idx == cidx);
        if !cached {
            self.current = Some((cidx, column.chunk(self.cluster, cidx)?));
        }

        let offset = (row - layout.chunk_start(cidx)) as usize;
        match &self.current {
            Some((_, chunk)) => Ok((chunk.as_ref(), offset)),
            None => Err(DbError::new("Reader lost its chunk")),
        }
    }

    pub fn get(&mut self, row: u64) -> Result<ScalarValue> {
        let (chunk, offset) = self.chunk_for(row)?;
        Ok(chunk.get(offset))
    }

    pub fn at_f64(&mut self, row: u64) -> Result<f64> {
        let (chunk, offset) = self.chunk_for(row)?;
        Ok(chunk.at_f64(offset))
    }

    pub fn is_missing(&mut self, row: u64) -> Result<bool> {
        let (chunk, offset) = self.chunk_for(row)?;
        Ok(chunk.is_missing(offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::datatype::ColumnType;
    use crate::testutil::{numeric_column, test_cluster};

    #[test]
    fn read_across_chunks() {
        let cluster = test_cluster();
        let col = numeric_column(&cluster, &[&[1.0, 2.0], &[], &[f64::NAN, 4.0]]).unwrap();
        assert_eq!(ColumnType::Numeric, col.column_type());

        let mut reader = ColumnReader::new(&cluster, &col);
        assert_eq!(ScalarValue::Int64(1), reader.get(0).unwrap());
        assert_eq!(2.0, reader.at_f64(1).unwrap());
        assert!(reader.is_missing(2).unwrap());
        assert_eq!(4.0, reader.at_f64(3).unwrap());
        reader.get(4).unwrap_err();
    }
}
