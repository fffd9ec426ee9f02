//! Distributed sort-merge join.
//!
//! Both sides are radix ordered into MSB buckets of their first key column,
//! every overlapping pair of buckets is merged by a remote task on the node
//! owning the right bucket, and the outputs are stitched into one frame in
//! bucket order.

pub mod binary_merge;
pub mod radix;
pub mod stitch;

use std::sync::Arc;
use std::time::Instant;

use strata_error::{DbError, DbErrorKind, Result};
use tracing::debug;

use self::binary_merge::{BinaryMerge, BucketResult};
use self::radix::{JoinKeys, KeyEncoding, NUM_MSB_BUCKETS, RadixOrder, Side, key_range};
use self::stitch::OutputColumn;
use crate::arrays::datatype::ColumnType;
use crate::cluster::Cluster;
use crate::cluster::futures::Futures;
use crate::cluster::key::Key;
use crate::column::Column;
use crate::frame::Frame;

/// One left bucket to right bucket pairing to merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pairing {
    pub left_msb: usize,
    pub right_msb: Option<usize>,
    /// Set when the left bucket spans several right buckets. See
    /// [`BinaryMerge::left_filter_shift`].
    pub left_filter_shift: Option<u32>,
}

/// Bucket pairings that can produce output, in output order.
pub fn plan_pairings(left: &RadixOrder, right: &RadixOrder, all_left: bool) -> Vec<Pairing> {
    let bit_shift = right.biggest_bit.max(8) as i64 - left.biggest_bit.max(8) as i64;
    let mut pairings = Vec::new();

    let left_buckets = (0..NUM_MSB_BUCKETS).filter(|&msb| left.msb_sizes[msb] > 0);

    if bit_shift >= 0 {
        for left_msb in left_buckets {
            let right_msb = left_msb >> bit_shift;
            let has_right = right.msb_sizes[right_msb] > 0;
            if !has_right && !all_left {
                continue;
            }
            pairings.push(Pairing {
                left_msb,
                right_msb: has_right.then_some(right_msb),
                left_filter_shift: None,
            });
        }
        return pairings;
    }

    // Left buckets are wider than right buckets, each spanning up to
    // `1 << spread` right buckets. Left buckets starting past the right
    // address space can't match anything.
    let spread = (-bit_shift) as u32;
    let right_shift = right.msb_shift();
    for left_msb in left_buckets {
        let first = (left_msb as u64) << spread;
        if first >= NUM_MSB_BUCKETS as u64 {
            if all_left {
                pairings.push(Pairing {
                    left_msb,
                    right_msb: None,
                    left_filter_shift: None,
                });
            }
            continue;
        }

        let end = ((left_msb as u64 + 1) << spread).min(NUM_MSB_BUCKETS as u64);
        for right_msb in first as usize..end as usize {
            if right.msb_sizes[right_msb] == 0 && !all_left {
                continue;
            }
            pairings.push(Pairing {
                left_msb,
                right_msb: Some(right_msb),
                left_filter_shift: Some(right_shift),
            });
        }

        // The bucket reaches past the last right bucket, keep those rows for
        // an outer join.
        if all_left && (left_msb as u64 + 1) << spread > NUM_MSB_BUCKETS as u64 {
            pairings.push(Pairing {
                left_msb,
                right_msb: None,
                left_filter_shift: Some(right_shift),
            });
        }
    }

    pairings
}

fn check_key_columns(left: &Frame, right: &Frame, left_cols: &[usize], right_cols: &[usize]) -> Result<()> {
    if left_cols.is_empty() || left_cols.len() != right_cols.len() {
        return Err(DbError::validation("Join requires the same non-zero number of key columns on both sides")
            .with_field("left", left_cols.len())
            .with_field("right", right_cols.len()));
    }

    for (frame, cols) in [(left, left_cols), (right, right_cols)] {
        for &col in cols {
            if col >= frame.num_columns() {
                return Err(DbError::bounds(format!(
                    "Column must be an integer from 0 to {}",
                    frame.num_columns() as i64 - 1
                ))
                .with_field("column", col));
            }
        }
    }

    for (&lc, &rc) in left_cols.iter().zip(right_cols) {
        let (lcol, rcol) = (left.column(lc), right.column(rc));
        if lcol.column_type() != rcol.column_type() {
            return Err(DbError::validation("Join key column types do not match")
                .with_field("left", &left.names()[lc])
                .with_field("left_type", lcol.column_type())
                .with_field("right", &right.names()[rc])
                .with_field("right_type", rcol.column_type()));
        }
        if lcol.column_type() == ColumnType::String {
            return Err(DbError::validation("Cannot join on a string column")
                .with_field("column", &left.names()[lc]));
        }
        if lcol.domain() != rcol.domain() {
            return Err(DbError::validation("Join key columns have different categorical domains")
                .with_field("left", &left.names()[lc])
                .with_field("right", &right.names()[rc]));
        }
    }

    Ok(())
}

/// Smallest and largest present key of a column.
fn column_range(cluster: &Cluster, column: &Column) -> Result<Option<(i64, i64)>> {
    let ranges = cluster.map_chunks(column.num_chunks(), |cidx| {
        let chunk = column.chunk(cluster, cidx)?;
        key_range(&chunk)
    })?;
    Ok(ranges
        .into_iter()
        .flatten()
        .reduce(|(min_a, max_a), (min_b, max_b)| (min_a.min(min_b), max_a.max(max_b))))
}

fn join_keys(
    cluster: &Cluster,
    left: &Frame,
    right: &Frame,
    left_cols: &[usize],
    right_cols: &[usize],
) -> Result<JoinKeys> {
    let mut keys = JoinKeys {
        encodings: Vec::with_capacity(left_cols.len()),
        max_encoded: Vec::with_capacity(left_cols.len()),
    };

    for (&lc, &rc) in left_cols.iter().zip(right_cols) {
        let left_range =
            column_range(cluster, left.column(lc)).map_err(|e| e.with_field("column", &left.names()[lc]))?;
        let right_range =
            column_range(cluster, right.column(rc)).map_err(|e| e.with_field("column", &right.names()[rc]))?;
        let range = [left_range, right_range]
            .into_iter()
            .flatten()
            .reduce(|(min_a, max_a), (min_b, max_b)| (min_a.min(min_b), max_a.max(max_b)));

        match range {
            Some((min, max)) => {
                let encoding = KeyEncoding { base: min };
                // Only the full i64 range needs one value more than u64 holds.
                let max_encoded = encoding.try_encode_value(max).ok_or_else(|| {
                    DbError::validation("Join key range is too wide to encode")
                        .with_field("column", &left.names()[lc])
                        .with_field("min", min)
                        .with_field("max", max)
                })?;
                keys.encodings.push(encoding);
                keys.max_encoded.push(max_encoded);
            }
            None => {
                keys.encodings.push(KeyEncoding { base: 0 });
                keys.max_encoded.push(0);
            }
        }
    }

    Ok(keys)
}

fn output_schema(left: &Frame, right: &Frame, right_out_cols: &[usize]) -> Vec<OutputColumn> {
    let left_cols = left.names().iter().zip(left.columns());
    let right_cols = right_out_cols
        .iter()
        .map(|&idx| (&right.names()[idx], right.column(idx)));

    left_cols
        .chain(right_cols)
        .map(|(name, column)| OutputColumn {
            name: name.clone(),
            column_type: column.column_type(),
            domain: column.domain().map(Arc::from),
        })
        .collect()
}

/// Join `left` and `right` on the given key columns.
///
/// The result has every left column followed by the right non-key columns.
/// It is keyed `<right>_joined_with_<left>` but not published; callers
/// decide whether it becomes a temporary or a global frame.
/// With `all_left`, left rows without a match are kept with missing right
/// values. Rows come out in key order, rows with equal keys in left row
/// order.
pub fn merge(
    cluster: &Arc<Cluster>,
    left: &Frame,
    right: &Frame,
    left_cols: &[usize],
    right_cols: &[usize],
    all_left: bool,
) -> Result<Frame> {
    check_key_columns(left, right, left_cols, right_cols)?;

    let join_id = uuid::Uuid::new_v4().simple().to_string();
    debug!(%join_id, left_rows = left.num_rows(), right_rows = right.num_rows(), all_left, "starting merge");

    let result = run_merge(cluster, &join_id, left, right, left_cols, right_cols, all_left);
    let cleaned = stitch::cleanup(cluster, &join_id);

    let frame = result?;
    cleaned?;
    Ok(frame)
}

fn run_merge(
    cluster: &Arc<Cluster>,
    join_id: &str,
    left: &Frame,
    right: &Frame,
    left_cols: &[usize],
    right_cols: &[usize],
    all_left: bool,
) -> Result<Frame> {
    let start = Instant::now();
    let keys = join_keys(cluster, left, right, left_cols, right_cols)?;

    let fs = Futures::new();
    let left_order = RadixOrder::build(cluster, join_id, Side::Left, left, left_cols, &keys, &fs)?;
    let right_order = RadixOrder::build(cluster, join_id, Side::Right, right, right_cols, &keys, &fs)?;
    fs.block_for_pending()?;

    for order in [&left_order, &right_order] {
        debug!(
            side = %order.side,
            biggest_bit = order.biggest_bit,
            bytes_used = ?order.bytes_used,
            "radix order built"
        );
    }
    debug!(elapsed = ?start.elapsed(), "radix order phase");

    let start = Instant::now();
    let pairings = plan_pairings(&left_order, &right_order, all_left);

    let left = Arc::new(left.clone());
    let right = Arc::new(right.clone());
    let join_id: Arc<str> = Arc::from(join_id);
    let right_out_cols: Arc<[usize]> = (0..right.num_columns())
        .filter(|idx| !right_cols.contains(idx))
        .collect();

    // Fire everything before waiting on anything.
    let handles: Vec<_> = pairings
        .iter()
        .map(|pairing| {
            let task = BinaryMerge {
                join_id: join_id.clone(),
                left: left.clone(),
                right: right.clone(),
                right_out_cols: right_out_cols.clone(),
                left_msb: pairing.left_msb,
                right_msb: pairing.right_msb,
                left_filter_shift: pairing.left_filter_shift,
                all_left,
                batch_rows: cluster.config().merge_batch_rows,
            };
            let node = cluster.msb_owner(pairing.right_msb.unwrap_or(pairing.left_msb));
            let task_cluster = cluster.clone();
            cluster.rpc(node, move || task.run(&task_cluster))
        })
        .collect();

    let mut results: Vec<BucketResult> = Vec::with_capacity(handles.len());
    let mut first_err = None;
    for handle in handles {
        match handle.get() {
            Ok(result) => results.push(result),
            Err(e) => {
                first_err.get_or_insert(e);
            }
        }
    }
    if let Some(e) = first_err {
        return Err(DbError::with_source("Join bucket merge failed", Box::new(e))
            .with_kind(DbErrorKind::Distributed)
            .with_field("join", &join_id));
    }

    let num_rows: u64 = results.iter().map(|r| r.num_rows).sum();
    debug!(elapsed = ?start.elapsed(), tasks = pairings.len(), rows = num_rows, "bucket merge phase");

    let start = Instant::now();
    let table = stitch::chunk_table(&results);
    let schema = output_schema(&left, &right, &right_out_cols);
    let columns = stitch::stitch(cluster, &join_id, &table, &schema)?;
    debug!(elapsed = ?start.elapsed(), chunks = table.len(), "stitch phase");

    let names = schema.into_iter().map(|out| out.name).collect();
    let frame = Frame::try_new(names, columns)?;

    let key_name = |frame: &Frame| frame.key().map(|k| k.name().to_string()).unwrap_or_else(|| "anon".to_string());
    let key = Key::user(format!("{}_joined_with_{}", key_name(right.as_ref()), key_name(left.as_ref())));

    Ok(frame.with_key(key))
}
