pub mod appendable;
pub mod reader;
pub mod row_layout;

use std::fmt;
use std::sync::Arc;

use strata_error::{DbError, Result};
use tracing::trace;

use self::row_layout::RowLayout;
use crate::arrays::datatype::ColumnType;
use crate::arrays::scalar::ScalarValue;
use crate::chunk::Chunk;
use crate::chunk::constant::ConstantChunk;
use crate::chunk::dense::StrChunk;
use crate::chunk::subset::SubsetChunk;
use crate::cluster::Cluster;
use crate::cluster::futures::Futures;
use crate::cluster::key::Key;
use crate::cluster::store::StoreValue;

/// How a column's chunks came to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnKind {
    /// Chunks hold their own data.
    Plain,
    /// Read-only view selecting rows of `master` by the row indices stored in
    /// the `rows` column. The view owns its `rows` column.
    Subset { master: Key, rows: Key },
}

/// Header of a column stored in the cluster.
///
/// The header is immutable. Chunk contents live under their own keys and are
/// the only part of a column that changes after creation.
#[derive(Clone, PartialEq)]
pub struct Column {
    key: Key,
    column_type: ColumnType,
    domain: Option<Arc<[String]>>,
    layout: Arc<RowLayout>,
    kind: ColumnKind,
}

impl Column {
    pub(crate) fn new(
        key: Key,
        column_type: ColumnType,
        domain: Option<Arc<[String]>>,
        layout: Arc<RowLayout>,
        kind: ColumnKind,
    ) -> Self {
        Column {
            key,
            column_type,
            domain,
            layout,
            kind,
        }
    }

    /// Load a finished column header from the store.
    pub fn load(cluster: &Cluster, key: &Key) -> Result<Arc<Column>> {
        match cluster.get(key) {
            Some(StoreValue::Column(col)) => Ok(col),
            Some(StoreValue::Building(_)) => Err(DbError::unsupported(
                "Cannot read a column that is still being built",
            )
            .with_field("column", key)),
            Some(other) => Err(DbError::new("Key does not hold a column")
                .with_field("key", key)
                .with_field("value", other.kind_name())),
            None => Err(DbError::validation("Column not found in store").with_field("column", key)),
        }
    }

    /// Create a column where every row holds `value`, chunked by `layout`.
    pub fn new_constant(
        cluster: &Cluster,
        value: ScalarValue,
        column_type: ColumnType,
        layout: Arc<RowLayout>,
    ) -> Result<Arc<Column>> {
        let key = Key::random_column();
        let fs = Futures::new();
        for cidx in 0..layout.num_chunks() {
            let chunk = ConstantChunk::new(value.clone(), layout.chunk_len(cidx));
            cluster.put_deferred(
                key.chunk_key(cidx),
                StoreValue::Chunk(Arc::new(Chunk::Constant(chunk))),
                &fs,
            );
        }
        fs.block_for_pending()?;

        let col = Arc::new(Column::new(key, column_type, None, layout, ColumnKind::Plain));
        col.publish(cluster);
        Ok(col)
    }

    /// Create a read-only view of `master` at the row indices held in `rows`.
    ///
    /// The view takes `rows`' layout and owns `rows` from here on.
    pub fn new_subset(cluster: &Cluster, master: &Column, rows: &Column) -> Result<Arc<Column>> {
        if rows.column_type != ColumnType::Numeric {
            return Err(DbError::validation("Row index column must be numeric")
                .with_field("type", rows.column_type));
        }

        let key = Key::random_column();
        cluster.map_chunks(rows.num_chunks(), |cidx| {
            let row_chunk = rows.chunk(cluster, cidx)?;
            let chunk = SubsetChunk::try_new(row_chunk, master.layout.clone(), |master_cidx| {
                master.chunk(cluster, master_cidx)
            })?;
            cluster.put(key.chunk_key(cidx), StoreValue::Chunk(Arc::new(Chunk::Subset(chunk))));
            Ok(())
        })?;

        let col = Arc::new(Column::new(
            key,
            master.column_type,
            master.domain.clone(),
            rows.layout.clone(),
            ColumnKind::Subset {
                master: master.key.clone(),
                rows: rows.key.clone(),
            },
        ));
        col.publish(cluster);
        Ok(col)
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn domain(&self) -> Option<&[String]> {
        self.domain.as_deref()
    }

    pub fn layout(&self) -> &Arc<RowLayout> {
        &self.layout
    }

    pub fn kind(&self) -> &ColumnKind {
        &self.kind
    }

    pub fn num_rows(&self) -> u64 {
        self.layout.num_rows()
    }

    pub fn num_chunks(&self) -> usize {
        self.layout.num_chunks()
    }

    /// Views reject every write.
    pub fn is_read_only(&self) -> bool {
        matches!(self.kind, ColumnKind::Subset { .. })
    }

    /// Store the header under the column's key.
    pub(crate) fn publish(self: &Arc<Self>, cluster: &Cluster) {
        cluster.put(self.key.clone(), StoreValue::Column(self.clone()));
    }

    pub fn chunk(&self, cluster: &Cluster, cidx: usize) -> Result<Arc<Chunk>> {
        let key = self.key.chunk_key(cidx);
        match cluster.get(&key) {
            Some(value) => value.try_into_chunk(),
            None => Err(DbError::new("Missing chunk for column")
                .with_field("column", &self.key)
                .with_field("chunk", cidx)),
        }
    }

    /// Replace a chunk. The chunk must keep the layout's length.
    pub fn put_chunk(&self, cluster: &Cluster, cidx: usize, chunk: Chunk) -> Result<()> {
        if self.is_read_only() {
            return Err(DbError::unsupported("Cannot write into a read-only view column")
                .with_field("column", &self.key));
        }
        if chunk.len() != self.layout.chunk_len(cidx) {
            return Err(DbError::invariant("Chunk length does not match column layout")
                .with_field("column", &self.key)
                .with_field("chunk", cidx)
                .with_field("expected", self.layout.chunk_len(cidx))
                .with_field("got", chunk.len()));
        }
        cluster.put(self.key.chunk_key(cidx), StoreValue::Chunk(Arc::new(chunk)));
        Ok(())
    }

    /// Get a chunk in a form that accepts writes.
    pub fn writable_chunk(&self, cluster: &Cluster, cidx: usize) -> Result<Chunk> {
        if self.is_read_only() {
            return Err(DbError::unsupported("Cannot write into a read-only view column")
                .with_field("column", &self.key));
        }
        let chunk = self.chunk(cluster, cidx)?;
        match chunk.as_ref() {
            // A missing constant carries no storage type, take it from the column.
            Chunk::Constant(c) if self.column_type == ColumnType::String && matches!(c.value(), ScalarValue::Null) => {
                Ok(Chunk::Str(StrChunk::new(vec![None; c.len()])))
            }
            other => other.to_writable(),
        }
    }

    fn locate(&self, row: u64) -> Result<(usize, usize)> {
        let cidx = self.layout.chunk_for_row(row).ok_or_else(|| {
            DbError::bounds(format!(
                "Row must be an integer from 0 to {}",
                self.num_rows() as i64 - 1
            ))
            .with_field("row", row)
        })?;
        Ok((cidx, (row - self.layout.chunk_start(cidx)) as usize))
    }

    pub fn get(&self, cluster: &Cluster, row: u64) -> Result<ScalarValue> {
        let (cidx, offset) = self.locate(row)?;
        Ok(self.chunk(cluster, cidx)?.get(offset))
    }

    /// Write a single row.
    pub fn set(&self, cluster: &Cluster, row: u64, value: &ScalarValue) -> Result<()> {
        let (cidx, offset) = self.locate(row)?;
        let mut chunk = self.writable_chunk(cluster, cidx)?;
        chunk.set(offset, value)?;
        self.put_chunk(cluster, cidx, chunk)
    }

    /// Copy every chunk into a new plain column with a fresh key.
    ///
    /// Views are materialized, so the copy never depends on another column.
    pub fn deep_copy(&self, cluster: &Cluster) -> Result<Arc<Column>> {
        let key = Key::random_column();
        cluster.map_chunks(self.num_chunks(), |cidx| {
            let chunk = self.chunk(cluster, cidx)?.materialize()?;
            cluster.put(key.chunk_key(cidx), StoreValue::Chunk(Arc::new(chunk)));
            Ok(())
        })?;

        trace!(src = %self.key, dst = %key, "deep copied column");

        let col = Arc::new(Column::new(
            key,
            self.column_type,
            self.domain.clone(),
            self.layout.clone(),
            ColumnKind::Plain,
        ));
        col.publish(cluster);
        Ok(col)
    }

    /// Remove the header and every chunk. A view also removes its row index
    /// column.
    pub fn remove(&self, cluster: &Cluster, fs: &Futures) {
        for cidx in 0..self.num_chunks() {
            cluster.remove_deferred(self.key.chunk_key(cidx), fs);
        }
        cluster.remove_deferred(self.key.clone(), fs);

        if let ColumnKind::Subset { rows, .. } = &self.kind {
            if let Ok(rows) = Column::load(cluster, rows) {
                rows.remove(cluster, fs);
            }
        }
    }
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("key", &self.key)
            .field("column_type", &self.column_type)
            .field("layout", &self.layout.id())
            .field("kind", &self.kind)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{column_values, test_cluster};

    #[test]
    fn constant_column_then_write() {
        let cluster = test_cluster();
        let layout = cluster.layouts().intern_lens(&[2, 3]).unwrap();
        let col = Column::new_constant(&cluster, ScalarValue::Int64(1), ColumnType::Numeric, layout).unwrap();

        col.set(&cluster, 3, &ScalarValue::Int64(5)).unwrap();
        assert_eq!(
            vec![1, 1, 1, 5, 1].into_iter().map(ScalarValue::Int64).collect::<Vec<_>>(),
            column_values(&cluster, &col).unwrap()
        );
    }

    #[test]
    fn set_out_of_bounds() {
        let cluster = test_cluster();
        let layout = cluster.layouts().intern_lens(&[2]).unwrap();
        let col = Column::new_constant(&cluster, ScalarValue::Int64(1), ColumnType::Numeric, layout).unwrap();

        let err = col.set(&cluster, 2, &ScalarValue::Int64(5)).unwrap_err();
        assert_eq!(strata_error::DbErrorKind::Bounds, err.kind());
        assert_eq!("Row must be an integer from 0 to 1", err.get_msg());
    }

    #[test]
    fn deep_copy_is_independent() {
        let cluster = test_cluster();
        let layout = cluster.layouts().intern_lens(&[3]).unwrap();
        let col = Column::new_constant(&cluster, ScalarValue::Int64(0), ColumnType::Numeric, layout).unwrap();
        let copy = col.deep_copy(&cluster).unwrap();

        copy.set(&cluster, 0, &ScalarValue::Int64(9)).unwrap();
        assert_eq!(ScalarValue::Int64(0), col.get(&cluster, 0).unwrap());
        assert_eq!(ScalarValue::Int64(9), copy.get(&cluster, 0).unwrap());
    }

    #[test]
    fn remove_clears_store() {
        let cluster = test_cluster();
        let layout = cluster.layouts().intern_lens(&[3, 3]).unwrap();
        let col = Column::new_constant(&cluster, ScalarValue::Int64(0), ColumnType::Numeric, layout).unwrap();

        let fs = Futures::new();
        col.remove(&cluster, &fs);
        fs.block_for_pending().unwrap();
        assert!(cluster.store().keys().is_empty());
    }

    #[test]
    fn load_building_column_unsupported() {
        let cluster = test_cluster();
        let key = Key::random_column();
        cluster.put(key.clone(), StoreValue::Building(ColumnType::Numeric));

        let err = Column::load(&cluster, &key).unwrap_err();
        assert_eq!(strata_error::DbErrorKind::Unsupported, err.kind());
    }
}
