use std::sync::Arc;

use strata_error::Result;
use tracing::trace;

use super::radix::{NUM_MSB_BUCKETS, RadixBucket, Side, bucket_key};
use crate::chunk::appendable::AppendableChunk;
use crate::cluster::Cluster;
use crate::cluster::key::Key;
use crate::cluster::store::StoreValue;
use crate::column::reader::ColumnReader;
use crate::frame::Frame;

pub const BINARY_MERGE_PREFIX: &str = "__binary_merge__";

/// Key of one output chunk produced by a bucket pairing.
pub fn output_chunk_key(
    join_id: &str,
    left_msb: usize,
    right_msb: Option<usize>,
    col: usize,
    batch: usize,
) -> Key {
    let right = match right_msb {
        Some(msb) => msb.to_string(),
        None => "na".to_string(),
    };
    Key::internal(format!(
        "{BINARY_MERGE_PREFIX}{join_id}_{left_msb}_{right}_{col}_{batch}"
    ))
}

/// What a bucket pairing produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketResult {
    pub left_msb: usize,
    pub right_msb: Option<usize>,
    pub num_rows: u64,
    /// Rows in each output batch, in batch order.
    pub chunk_sizes: Vec<u64>,
}

/// Merge of one left MSB bucket against one right MSB bucket.
///
/// Runs on the node owning the right bucket. Output chunks are written to the
/// store for the stitch phase to pick up.
#[derive(Debug, Clone)]
pub struct BinaryMerge {
    pub join_id: Arc<str>,
    pub left: Arc<Frame>,
    pub right: Arc<Frame>,
    /// Right columns copied to the output, i.e. everything but the keys.
    pub right_out_cols: Arc<[usize]>,
    pub left_msb: usize,
    /// `None` when no right bucket can hold a match for this left bucket.
    pub right_msb: Option<usize>,
    /// Shift mapping a left key to its right bucket, when a left bucket
    /// spans several right buckets. Only left rows landing in `right_msb`
    /// take part, or with no right bucket, the rows landing past the last
    /// one.
    pub left_filter_shift: Option<u32>,
    pub all_left: bool,
    pub batch_rows: usize,
}

impl BinaryMerge {
    fn load_bucket(&self, cluster: &Cluster, side: Side, msb: usize) -> Result<Option<Arc<RadixBucket>>> {
        cluster
            .get(&bucket_key(&self.join_id, side, msb))
            .map(StoreValue::try_into_radix_bucket)
            .transpose()
    }

    /// Matching (left row, right row) pairs in left key order.
    fn matches(&self, left: &RadixBucket, right: Option<&RadixBucket>) -> Vec<(u64, Option<u64>)> {
        let mut pairs = Vec::with_capacity(left.len());
        let mut rpos = 0;

        for lidx in 0..left.len() {
            let key = left.key(lidx);
            let mut matched = false;

            // Missing keys never match.
            if let (Some(right), false) = (right, key.contains(&0)) {
                while rpos < right.len() && right.key(rpos) < key {
                    rpos += 1;
                }
                let mut ridx = rpos;
                while ridx < right.len() && right.key(ridx) == key {
                    pairs.push((left.row(lidx), Some(right.row(ridx))));
                    ridx += 1;
                    matched = true;
                }
            }

            if !matched && self.all_left {
                pairs.push((left.row(lidx), None));
            }
        }

        pairs
    }

    pub fn run(&self, cluster: &Cluster) -> Result<BucketResult> {
        let mut result = BucketResult {
            left_msb: self.left_msb,
            right_msb: self.right_msb,
            num_rows: 0,
            chunk_sizes: Vec::new(),
        };

        let Some(mut left) = self.load_bucket(cluster, Side::Left, self.left_msb)? else {
            return Ok(result);
        };
        if let Some(shift) = self.left_filter_shift {
            left = Arc::new(match self.right_msb {
                Some(right_msb) => left.filter(|key| key[0] >> shift == right_msb as u64),
                None => left.filter(|key| key[0] >> shift >= NUM_MSB_BUCKETS as u64),
            });
        }
        let right = match self.right_msb {
            Some(msb) => self.load_bucket(cluster, Side::Right, msb)?,
            None => None,
        };

        let pairs = self.matches(&left, right.as_deref());
        if pairs.is_empty() {
            return Ok(result);
        }

        let batches: Vec<_> = pairs.chunks(self.batch_rows).collect();
        let num_left = self.left.num_columns();

        for (col, column) in self.left.columns().iter().enumerate() {
            let mut reader = ColumnReader::new(cluster, column);
            for (batch, rows) in batches.iter().enumerate() {
                let mut builder = AppendableChunk::for_type(column.column_type());
                for (lrow, _) in rows.iter() {
                    builder.add_scalar(&reader.get(*lrow)?)?;
                }
                let key = output_chunk_key(&self.join_id, self.left_msb, self.right_msb, col, batch);
                cluster.put(key, StoreValue::Chunk(Arc::new(builder.close())));
            }
        }

        for (out_idx, &rcol) in self.right_out_cols.iter().enumerate() {
            let column = self.right.column(rcol);
            let mut reader = ColumnReader::new(cluster, column);
            for (batch, rows) in batches.iter().enumerate() {
                let mut builder = AppendableChunk::for_type(column.column_type());
                for (_, rrow) in rows.iter() {
                    match rrow {
                        Some(rrow) => builder.add_scalar(&reader.get(*rrow)?)?,
                        None => builder.add_missing(),
                    }
                }
                let key = output_chunk_key(
                    &self.join_id,
                    self.left_msb,
                    self.right_msb,
                    num_left + out_idx,
                    batch,
                );
                cluster.put(key, StoreValue::Chunk(Arc::new(builder.close())));
            }
        }

        result.num_rows = pairs.len() as u64;
        result.chunk_sizes = batches.iter().map(|b| b.len() as u64).collect();

        trace!(
            left_msb = self.left_msb,
            right_msb = ?self.right_msb,
            rows = result.num_rows,
            "merged bucket pair"
        );

        Ok(result)
    }
}
