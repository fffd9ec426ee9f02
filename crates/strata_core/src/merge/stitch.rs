//! Assembling bucket outputs into the joined frame.

use std::sync::Arc;

use strata_error::{DbError, Result};
use tracing::trace;

use super::binary_merge::{BINARY_MERGE_PREFIX, BucketResult, output_chunk_key};
use super::radix::RADIX_ORDER_PREFIX;
use crate::arrays::datatype::ColumnType;
use crate::chunk::Chunk;
use crate::chunk::constant::ConstantChunk;
use crate::cluster::Cluster;
use crate::cluster::key::{Key, KeyKind};
use crate::cluster::store::StoreValue;
use crate::column::{Column, ColumnKind};

/// Where one output chunk of the join comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkEntry {
    pub size: u64,
    pub left_msb: usize,
    pub right_msb: Option<usize>,
    pub batch: usize,
}

/// Flatten bucket results into one entry per output chunk.
///
/// Results must already be in dispatch order, the table keeps that order.
pub fn chunk_table(results: &[BucketResult]) -> Vec<ChunkEntry> {
    results
        .iter()
        .flat_map(|result| {
            result
                .chunk_sizes
                .iter()
                .enumerate()
                .map(move |(batch, &size)| ChunkEntry {
                    size,
                    left_msb: result.left_msb,
                    right_msb: result.right_msb,
                    batch,
                })
        })
        .collect()
}

/// Name, type and domain of one output column.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputColumn {
    pub name: String,
    pub column_type: ColumnType,
    pub domain: Option<Arc<[String]>>,
}

/// Move every bucket output chunk to its place in freshly keyed output
/// columns.
pub fn stitch(
    cluster: &Cluster,
    join_id: &str,
    table: &[ChunkEntry],
    schema: &[OutputColumn],
) -> Result<Vec<Arc<Column>>> {
    let keys: Vec<_> = schema.iter().map(|_| Key::random_column()).collect();

    let layout = if table.is_empty() {
        let layout = cluster.layouts().intern_lens(&[0])?;
        for key in &keys {
            let chunk = Chunk::Constant(ConstantChunk::new_missing(0));
            cluster.put(key.chunk_key(0), StoreValue::Chunk(Arc::new(chunk)));
        }
        layout
    } else {
        let lens: Vec<_> = table.iter().map(|entry| entry.size).collect();
        let layout = cluster.layouts().intern_lens(&lens)?;

        let moved = cluster.map_chunks(table.len(), |cidx| {
            let entry = &table[cidx];
            for (col, key) in keys.iter().enumerate() {
                let src = output_chunk_key(join_id, entry.left_msb, entry.right_msb, col, entry.batch);
                let chunk = match cluster.remove(&src) {
                    Some(value) => value.try_into_chunk()?,
                    None => {
                        return Err(DbError::distributed("Missing merge output chunk")
                            .with_field("key", &src));
                    }
                };
                if chunk.len() as u64 != entry.size {
                    return Err(DbError::invariant("Merge output chunk has unexpected length")
                        .with_field("key", &src)
                        .with_field("expected", entry.size)
                        .with_field("got", chunk.len()));
                }
                cluster.put(key.chunk_key(cidx), StoreValue::Chunk(chunk));
            }
            Ok(())
        });
        if let Err(e) = moved {
            discard_chunks(cluster, &keys, table.len());
            return Err(e);
        }
        layout
    };

    let columns = keys
        .into_iter()
        .zip(schema)
        .map(|(key, out)| {
            let col = Arc::new(Column::new(
                key,
                out.column_type,
                out.domain.clone(),
                layout.clone(),
                ColumnKind::Plain,
            ));
            col.publish(cluster);
            col
        })
        .collect();

    Ok(columns)
}

/// Drop whatever output chunks a failed stitch already wrote.
fn discard_chunks(cluster: &Cluster, keys: &[Key], num_chunks: usize) {
    let mut removed = 0;
    for key in keys {
        for cidx in 0..num_chunks {
            if cluster.remove(&key.chunk_key(cidx)).is_some() {
                removed += 1;
            }
        }
    }
    trace!(removed, "discarded partial join output");
}

/// Remove every intermediate key left behind by a join.
///
/// Each node only removes the keys it is home to. Returns the number of keys
/// removed.
pub fn cleanup(cluster: &Cluster, join_id: &str) -> Result<usize> {
    let radix_prefix = format!("{RADIX_ORDER_PREFIX}{join_id}_");
    let merge_prefix = format!("{BINARY_MERGE_PREFIX}{join_id}_");
    let removed = std::sync::atomic::AtomicUsize::new(0);

    let keys = cluster.store().keys();
    cluster.for_each_node(|node| {
        for key in &keys {
            if key.kind() != KeyKind::Internal {
                continue;
            }
            let name = key.name();
            if !(name.starts_with(&radix_prefix) || name.starts_with(&merge_prefix)) {
                continue;
            }
            if cluster.home_node(key) == node && cluster.remove(key).is_some() {
                removed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
        }
        Ok(())
    })?;

    let removed = removed.into_inner();
    trace!(join_id, removed, "cleaned up join intermediates");
    Ok(removed)
}
