//! Helpers for building clusters and frames in tests.

use std::sync::Arc;

use strata_error::Result;

use crate::arrays::datatype::ColumnType;
use crate::arrays::scalar::ScalarValue;
use crate::cluster::Cluster;
use crate::cluster::futures::Futures;
use crate::cluster::key::Key;
use crate::column::Column;
use crate::column::appendable::AppendableColumn;
use crate::column::reader::ColumnReader;
use crate::config::{ClusterConfig, RefCountVerification};
use crate::frame::Frame;

/// A small multi-node cluster with strict refcount checking.
pub fn test_cluster() -> Arc<Cluster> {
    let config = ClusterConfig {
        num_nodes: 3,
        num_threads: 4,
        verify_refcounts: RefCountVerification::Strict,
        ..Default::default()
    };
    match Cluster::try_new(config) {
        Ok(cluster) => cluster,
        Err(e) => panic!("failed to create test cluster: {e}"),
    }
}

/// Build a column of the given type with one chunk per inner slice.
pub fn column_from_scalars(
    cluster: &Cluster,
    column_type: ColumnType,
    chunks: &[Vec<ScalarValue>],
) -> Result<Arc<Column>> {
    let builder = AppendableColumn::new(cluster, Key::random_column(), column_type);
    let fs = Futures::new();
    for (cidx, values) in chunks.iter().enumerate() {
        let mut chunk = builder.chunk_builder();
        for value in values {
            chunk.add_scalar(value)?;
        }
        builder.append_chunk(cluster, cidx, chunk, &fs)?;
    }
    builder.close(cluster, &fs)
}

/// Numeric column, NaN for missing.
pub fn numeric_column(cluster: &Cluster, chunks: &[&[f64]]) -> Result<Arc<Column>> {
    let chunks: Vec<Vec<ScalarValue>> = chunks
        .iter()
        .map(|c| c.iter().map(|v| ScalarValue::from(*v)).collect())
        .collect();
    column_from_scalars(cluster, ColumnType::Numeric, &chunks)
}

pub fn str_column(cluster: &Cluster, chunks: &[&[Option<&str>]]) -> Result<Arc<Column>> {
    let chunks: Vec<Vec<ScalarValue>> = chunks
        .iter()
        .map(|c| c.iter().map(|v| ScalarValue::from(*v)).collect())
        .collect();
    column_from_scalars(cluster, ColumnType::String, &chunks)
}

/// Frame from named columns, without a key.
pub fn frame_from_columns(names: &[&str], columns: Vec<Arc<Column>>) -> Result<Frame> {
    Frame::try_new(names.iter().map(|n| n.to_string()).collect(), columns)
}

/// All values of a column in row order.
pub fn column_values(cluster: &Cluster, column: &Column) -> Result<Vec<ScalarValue>> {
    let mut reader = ColumnReader::new(cluster, column);
    (0..column.num_rows()).map(|row| reader.get(row)).collect()
}

/// All values of a frame, one vec per row.
pub fn frame_values(cluster: &Cluster, frame: &Frame) -> Result<Vec<Vec<ScalarValue>>> {
    let columns = frame
        .columns()
        .iter()
        .map(|c| column_values(cluster, c))
        .collect::<Result<Vec<_>>>()?;

    Ok((0..frame.num_rows() as usize)
        .map(|row| columns.iter().map(|c| c[row].clone()).collect())
        .collect())
}
