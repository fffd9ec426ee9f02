use std::collections::BTreeMap;
use std::sync::Arc;

use strata_error::{DbError, Result};

use super::Chunk;
use crate::arrays::scalar::ScalarValue;
use crate::column::row_layout::RowLayout;

/// Read-only view selecting rows of a master column.
///
/// Holds a chunk of row indices into the master column along with every master
/// chunk those indices touch, fetched when the view chunk is built.
#[derive(Debug, Clone)]
pub struct SubsetChunk {
    rows: Arc<Chunk>,
    master_layout: Arc<RowLayout>,
    master_chunks: BTreeMap<usize, Arc<Chunk>>,
}

impl SubsetChunk {
    /// Build a view over `rows`, fetching master chunks with `fetch`.
    ///
    /// Every non-missing row index must fall inside the master column.
    pub fn try_new<F>(rows: Arc<Chunk>, master_layout: Arc<RowLayout>, mut fetch: F) -> Result<Self>
    where
        F: FnMut(usize) -> Result<Arc<Chunk>>,
    {
        let mut master_chunks = BTreeMap::new();

        for idx in 0..rows.len() {
            let Some(row) = rows.at_i64(idx) else {
                continue;
            };
            let cidx = u64::try_from(row)
                .ok()
                .and_then(|row| master_layout.chunk_for_row(row))
                .ok_or_else(|| {
                    DbError::bounds("Row index outside of the master column")
                        .with_field("row", row)
                        .with_field("num_rows", master_layout.num_rows())
                })?;

            if !master_chunks.contains_key(&cidx) {
                master_chunks.insert(cidx, fetch(cidx)?);
            }
        }

        Ok(SubsetChunk {
            rows,
            master_layout,
            master_chunks,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &Chunk {
        &self.rows
    }

    /// Resolve a view offset to the master chunk and the offset inside it.
    fn resolve(&self, idx: usize) -> Option<(&Chunk, usize)> {
        let row = self.rows.at_i64(idx)? as u64;
        let cidx = self.master_layout.chunk_for_row(row)?;
        let chunk = self.master_chunks.get(&cidx)?;
        let offset = (row - self.master_layout.chunk_start(cidx)) as usize;
        Some((chunk.as_ref(), offset))
    }

    pub fn get(&self, idx: usize) -> ScalarValue {
        match self.resolve(idx) {
            Some((chunk, offset)) => chunk.get(offset),
            None => ScalarValue::Null,
        }
    }

    pub fn at_f64(&self, idx: usize) -> f64 {
        match self.resolve(idx) {
            Some((chunk, offset)) => chunk.at_f64(offset),
            None => f64::NAN,
        }
    }

    pub fn at_i64(&self, idx: usize) -> Option<i64> {
        let (chunk, offset) = self.resolve(idx)?;
        chunk.at_i64(offset)
    }

    pub fn at_str(&self, idx: usize) -> Option<&str> {
        let (chunk, offset) = self.resolve(idx)?;
        chunk.at_str(offset)
    }

    pub fn is_missing(&self, idx: usize) -> bool {
        match self.resolve(idx) {
            Some((chunk, offset)) => chunk.is_missing(offset),
            None => true,
        }
    }
}
