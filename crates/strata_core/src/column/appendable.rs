use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use strata_error::{DbError, Result};
use tracing::debug;

use super::{Column, ColumnKind};
use crate::arrays::datatype::ColumnType;
use crate::arrays::scalar::ScalarValue;
use crate::chunk::Chunk;
use crate::chunk::appendable::AppendableChunk;
use crate::chunk::constant::ConstantChunk;
use crate::cluster::Cluster;
use crate::cluster::futures::Futures;
use crate::cluster::key::Key;
use crate::cluster::store::StoreValue;

const INITIAL_LEN_SLOTS: usize = 4;

/// A column being built in parallel, one chunk per writer.
///
/// Writers seal chunks with `close_chunk` in any order. Once every writer is
/// done, `close` publishes a finished column under the same key. A builder
/// with a non-zero chunk offset writes its chunks after those of other
/// builders so several of them can be folded together with `reduce`.
#[derive(Debug)]
pub struct AppendableColumn {
    key: Key,
    column_type: ColumnType,
    domain: Mutex<Option<Arc<[String]>>>,
    chunk_off: usize,
    /// Row count of each sealed chunk. Zero for chunks not seen yet.
    chunk_lens: Mutex<Vec<u64>>,
    closed: AtomicBool,
}

impl AppendableColumn {
    pub fn new(cluster: &Cluster, key: Key, column_type: ColumnType) -> Self {
        Self::new_with_chunk_offset(cluster, key, column_type, 0)
    }

    /// Create a builder whose first chunk lands at `chunk_off`.
    pub fn new_with_chunk_offset(
        cluster: &Cluster,
        key: Key,
        column_type: ColumnType,
        chunk_off: usize,
    ) -> Self {
        cluster.put(key.clone(), StoreValue::Building(column_type));
        AppendableColumn {
            key,
            column_type,
            domain: Mutex::new(None),
            chunk_off,
            chunk_lens: Mutex::new(vec![0; INITIAL_LEN_SLOTS]),
            closed: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn set_domain(&self, domain: Option<Arc<[String]>>) {
        *self.domain.lock() = domain;
    }

    /// A fresh buffer for one of this column's chunks.
    pub fn chunk_builder(&self) -> AppendableChunk {
        AppendableChunk::for_type(self.column_type)
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DbError::invariant("Column builder already closed").with_field("column", &self.key));
        }
        Ok(())
    }

    /// Store a sealed chunk and record its length.
    ///
    /// `local_cidx` is relative to this builder's chunk offset.
    pub fn close_chunk(&self, cluster: &Cluster, local_cidx: usize, chunk: Chunk, fs: &Futures) -> Result<()> {
        self.check_open()?;

        let cidx = self.chunk_off + local_cidx;
        {
            let mut lens = self.chunk_lens.lock();
            if cidx >= lens.len() {
                let mut new_len = lens.len().max(1);
                while new_len <= cidx {
                    new_len *= 2;
                }
                lens.resize(new_len, 0);
            }
            lens[cidx] = chunk.len() as u64;
        }

        cluster.put_deferred(self.key.chunk_key(cidx), StoreValue::Chunk(Arc::new(chunk)), fs);
        Ok(())
    }

    /// Seal a buffer and store it as chunk `local_cidx`.
    pub fn append_chunk(
        &self,
        cluster: &Cluster,
        local_cidx: usize,
        builder: AppendableChunk,
        fs: &Futures,
    ) -> Result<()> {
        self.close_chunk(cluster, local_cidx, builder.close(), fs)
    }

    /// Fold another builder's recorded lengths into this one.
    ///
    /// Only slots empty on this side are filled. Both sides recording
    /// different non-zero lengths for one chunk is an error.
    pub fn reduce(&self, other: &AppendableColumn) -> Result<()> {
        self.check_open()?;
        if self.key != other.key {
            return Err(DbError::validation("Cannot fold builders of different columns")
                .with_field("left", &self.key)
                .with_field("right", &other.key));
        }

        let theirs = other.chunk_lens.lock().clone();
        let mut ours = self.chunk_lens.lock();
        if ours.len() < theirs.len() {
            ours.resize(theirs.len(), 0);
        }

        for (cidx, (ours, theirs)) in ours.iter_mut().zip(theirs.iter()).enumerate() {
            if *theirs == 0 {
                continue;
            }
            if *ours == 0 {
                *ours = *theirs;
            } else if *ours != *theirs {
                return Err(DbError::invariant("Builders recorded different lengths for a chunk")
                    .with_field("column", &self.key)
                    .with_field("chunk", cidx)
                    .with_field("left", *ours)
                    .with_field("right", *theirs));
            }
        }

        let mut domain = self.domain.lock();
        if domain.is_none() {
            *domain = other.domain.lock().clone();
        }

        Ok(())
    }

    /// Publish the finished column, replacing the builder in the store.
    ///
    /// Trailing empty chunks are dropped, interior ones kept. Waits for all
    /// pending chunk writes in `fs`.
    pub fn close(&self, cluster: &Cluster, fs: &Futures) -> Result<Arc<Column>> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(DbError::invariant("Column builder already closed").with_field("column", &self.key));
        }
        fs.block_for_pending()?;

        let mut lens = std::mem::take(&mut *self.chunk_lens.lock());
        let recorded = lens.len();
        while lens.len() > 1 && lens.last() == Some(&0) {
            lens.pop();
        }
        if lens.is_empty() {
            lens.push(0);
        }

        for cidx in lens.len()..recorded {
            cluster.remove(&self.key.chunk_key(cidx));
        }
        for cidx in 0..lens.len() {
            let chunk_key = self.key.chunk_key(cidx);
            if !cluster.store().contains(&chunk_key) {
                let empty = ConstantChunk::new(ScalarValue::Int64(0), 0);
                cluster.put(chunk_key, StoreValue::Chunk(Arc::new(Chunk::Constant(empty))));
            }
        }

        let layout = cluster.layouts().intern_lens(&lens)?;
        debug!(column = %self.key, chunks = layout.num_chunks(), rows = layout.num_rows(), "closed column");

        let col = Arc::new(Column::new(
            self.key.clone(),
            self.column_type,
            self.domain.lock().clone(),
            layout,
            ColumnKind::Plain,
        ));
        col.publish(cluster);
        Ok(col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{column_values, test_cluster};

    fn ints(values: &[i64]) -> Chunk {
        let mut b = AppendableChunk::for_type(ColumnType::Numeric);
        for v in values {
            b.add_int(*v).unwrap();
        }
        b.close()
    }

    #[test]
    fn close_keeps_interior_empty_chunk() {
        let cluster = test_cluster();
        let builder = AppendableColumn::new(&cluster, Key::random_column(), ColumnType::Numeric);
        let fs = Futures::new();

        builder.close_chunk(&cluster, 2, ints(&[5, 6, 7, 8, 9, 10, 11]), &fs).unwrap();
        builder.close_chunk(&cluster, 0, ints(&[1, 2, 3, 4]), &fs).unwrap();
        builder.close_chunk(&cluster, 1, ints(&[]), &fs).unwrap();

        let col = builder.close(&cluster, &fs).unwrap();
        assert_eq!(&[0, 4, 4, 11], col.layout().espc());
        assert_eq!(11, column_values(&cluster, &col).unwrap().len());
    }

    #[test]
    fn reads_rejected_until_closed() {
        let cluster = test_cluster();
        let builder = AppendableColumn::new(&cluster, Key::random_column(), ColumnType::Numeric);

        Column::load(&cluster, builder.key()).unwrap_err();

        let fs = Futures::new();
        builder.close_chunk(&cluster, 0, ints(&[1]), &fs).unwrap();
        builder.close(&cluster, &fs).unwrap();
        Column::load(&cluster, builder.key()).unwrap();
    }

    #[test]
    fn close_twice_errors() {
        let cluster = test_cluster();
        let builder = AppendableColumn::new(&cluster, Key::random_column(), ColumnType::Numeric);
        let fs = Futures::new();

        builder.close(&cluster, &fs).unwrap();
        builder.close(&cluster, &fs).unwrap_err();
        builder.close_chunk(&cluster, 0, ints(&[1]), &fs).unwrap_err();
    }

    #[test]
    fn grows_past_initial_slots() {
        let cluster = test_cluster();
        let builder = AppendableColumn::new(&cluster, Key::random_column(), ColumnType::Numeric);
        let fs = Futures::new();

        builder.close_chunk(&cluster, 9, ints(&[1, 2]), &fs).unwrap();
        let col = builder.close(&cluster, &fs).unwrap();

        assert_eq!(10, col.num_chunks());
        assert_eq!(2, col.num_rows());
    }

    #[test]
    fn reduce_fills_empty_slots() {
        let cluster = test_cluster();
        let key = Key::random_column();
        let fs = Futures::new();

        let first = AppendableColumn::new(&cluster, key.clone(), ColumnType::Numeric);
        first.close_chunk(&cluster, 0, ints(&[1, 2]), &fs).unwrap();

        let second = AppendableColumn::new_with_chunk_offset(&cluster, key, ColumnType::Numeric, 1);
        second.close_chunk(&cluster, 0, ints(&[3, 4, 5]), &fs).unwrap();

        first.reduce(&second).unwrap();
        let col = first.close(&cluster, &fs).unwrap();

        assert_eq!(&[0, 2, 5], col.layout().espc());
        assert_eq!(
            vec![1, 2, 3, 4, 5].into_iter().map(ScalarValue::Int64).collect::<Vec<_>>(),
            column_values(&cluster, &col).unwrap()
        );
    }

    #[test]
    fn reduce_conflict_errors() {
        let cluster = test_cluster();
        let key = Key::random_column();
        let fs = Futures::new();

        let first = AppendableColumn::new(&cluster, key.clone(), ColumnType::Numeric);
        first.close_chunk(&cluster, 0, ints(&[1, 2]), &fs).unwrap();
        let second = AppendableColumn::new(&cluster, key, ColumnType::Numeric);
        second.close_chunk(&cluster, 0, ints(&[1, 2, 3]), &fs).unwrap();

        let err = first.reduce(&second).unwrap_err();
        assert_eq!(strata_error::DbErrorKind::Invariant, err.kind());
    }
}
