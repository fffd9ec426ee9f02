//! Radix ordering of join keys into most-significant-byte buckets.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use strata_error::{DbError, Result};

use crate::chunk::Chunk;
use crate::cluster::Cluster;
use crate::cluster::futures::Futures;
use crate::cluster::key::Key;
use crate::cluster::store::StoreValue;
use crate::frame::Frame;

pub const RADIX_ORDER_PREFIX: &str = "__radix_order__";

pub const NUM_MSB_BUCKETS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
        }
    }
}

pub fn bucket_key(join_id: &str, side: Side, msb: usize) -> Key {
    Key::internal(format!("{RADIX_ORDER_PREFIX}{join_id}_{side}_{msb}"))
}

/// Number of bits needed to hold `v`.
pub fn bits_needed(v: u64) -> u32 {
    64 - v.leading_zeros()
}

/// Whole-number join key at `idx`, `None` when missing.
///
/// Integer encodings are read exactly. Floats must be whole and inside the
/// `i64` range.
pub fn key_at(chunk: &Chunk, idx: usize) -> Result<Option<i64>> {
    if let Some(v) = chunk.at_i64(idx) {
        return Ok(Some(v));
    }
    let v = chunk.at_f64(idx);
    if v.is_nan() {
        return Ok(None);
    }
    // `i64::MAX as f64` rounds up to 2^63, which is already out of range.
    if v.fract() != 0.0 || v < i64::MIN as f64 || v >= i64::MAX as f64 {
        return Err(DbError::validation("Join key columns must hold whole numbers in the 64-bit integer range")
            .with_field("value", v));
    }
    Ok(Some(v as i64))
}

/// Smallest and largest present key of a chunk.
pub fn key_range(chunk: &Chunk) -> Result<Option<(i64, i64)>> {
    if let Chunk::Constant(_) = chunk {
        if chunk.is_empty() {
            return Ok(None);
        }
        return Ok(key_at(chunk, 0)?.map(|v| (v, v)));
    }

    let mut range: Option<(i64, i64)> = None;
    for idx in 0..chunk.len() {
        if let Some(v) = key_at(chunk, idx)? {
            range = Some(match range {
                Some((min, max)) => (min.min(v), max.max(v)),
                None => (v, v),
            });
        }
    }
    Ok(range)
}

/// Shared encoding of one key column pair.
///
/// Values are shifted so the smallest key over both sides encodes as 1,
/// leaving 0 for missing keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEncoding {
    pub base: i64,
}

impl KeyEncoding {
    /// Encoded form of `v`, `None` if it falls outside `1..=u64::MAX`.
    pub fn try_encode_value(&self, v: i64) -> Option<u64> {
        let offset = i128::from(v) - i128::from(self.base) + 1;
        u64::try_from(offset).ok().filter(|&e| e > 0)
    }

    pub fn encode_value(&self, v: i64) -> Result<u64> {
        self.try_encode_value(v).ok_or_else(|| {
            DbError::invariant("Join key outside the encoded key range")
                .with_field("value", v)
                .with_field("base", self.base)
        })
    }

    pub fn encode(&self, chunk: &Chunk, idx: usize) -> Result<u64> {
        match key_at(chunk, idx)? {
            Some(v) => self.encode_value(v),
            None => Ok(0),
        }
    }
}

/// Encodings and ranges of every key column pair in a join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinKeys {
    pub encodings: Vec<KeyEncoding>,
    /// Largest encoded value of each key column over both sides.
    pub max_encoded: Vec<u64>,
}

/// Rows of one MSB bucket, sorted by key tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadixBucket {
    num_keys: usize,
    rows: Vec<u64>,
    /// Encoded key tuples, `num_keys` per row.
    keys: Vec<u64>,
}

impl RadixBucket {
    pub fn new(num_keys: usize) -> Self {
        RadixBucket {
            num_keys,
            rows: Vec::new(),
            keys: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, idx: usize) -> u64 {
        self.rows[idx]
    }

    pub fn key(&self, idx: usize) -> &[u64] {
        &self.keys[idx * self.num_keys..(idx + 1) * self.num_keys]
    }

    fn push(&mut self, row: u64, key: &[u64]) {
        self.rows.push(row);
        self.keys.extend_from_slice(key);
    }

    fn append(&mut self, other: RadixBucket) {
        self.rows.extend(other.rows);
        self.keys.extend(other.keys);
    }

    /// Stable sort by key tuple, keeping row order for equal keys.
    fn sort(&mut self) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| self.key(a).cmp(self.key(b)));

        let mut sorted = RadixBucket::new(self.num_keys);
        for idx in order {
            sorted.push(self.rows[idx], self.key(idx));
        }
        *self = sorted;
    }

    /// Keep only rows satisfying `pred`.
    pub fn filter(&self, pred: impl Fn(&[u64]) -> bool) -> RadixBucket {
        let mut out = RadixBucket::new(self.num_keys);
        for idx in 0..self.len() {
            if pred(self.key(idx)) {
                out.push(self.rows[idx], self.key(idx));
            }
        }
        out
    }
}

/// Summary of one side's radix ordering. The buckets themselves live in the
/// store.
#[derive(Debug, Clone)]
pub struct RadixOrder {
    pub side: Side,
    /// Bits needed for the largest encoded value of the first key column.
    pub biggest_bit: u32,
    /// Bytes needed per key column.
    pub bytes_used: Vec<u32>,
    /// Rows per MSB bucket.
    pub msb_sizes: Vec<u64>,
}

impl RadixOrder {
    /// Right shift taking an encoded first key to its MSB bucket.
    pub fn msb_shift(&self) -> u32 {
        self.biggest_bit.max(8) - 8
    }

    /// Bucket every row of `frame` by the MSB of its first key, sort each
    /// bucket and store it.
    pub fn build(
        cluster: &Cluster,
        join_id: &str,
        side: Side,
        frame: &Frame,
        key_cols: &[usize],
        keys: &JoinKeys,
        fs: &Futures,
    ) -> Result<RadixOrder> {
        let num_keys = key_cols.len();
        let encodings = &keys.encodings;
        let columns: Vec<_> = key_cols.iter().map(|&c| frame.column(c).clone()).collect();
        let layout = match frame.layout() {
            Some(layout) => layout.clone(),
            None => return Err(DbError::validation("Cannot join a frame without columns")),
        };

        // Largest encoded first key on this side decides the bucket shift.
        let side_max = cluster
            .map_chunks(layout.num_chunks(), |cidx| {
                let chunk = columns[0].chunk(cluster, cidx)?;
                key_range(&chunk)?
                    .map(|(_, max)| encodings[0].encode_value(max))
                    .transpose()
            })?
            .into_iter()
            .flatten()
            .max()
            .unwrap_or(0);
        let biggest_bit = bits_needed(side_max);
        let shift = biggest_bit.max(8) - 8;

        let partials = cluster.map_chunks(layout.num_chunks(), |cidx| {
            let chunks = columns
                .iter()
                .map(|c| c.chunk(cluster, cidx))
                .collect::<Result<Vec<_>>>()?;
            let start = layout.chunk_start(cidx);

            let mut buckets: BTreeMap<usize, RadixBucket> = BTreeMap::new();
            let mut key = vec![0; num_keys];
            for idx in 0..layout.chunk_len(cidx) {
                for (k, chunk) in chunks.iter().enumerate() {
                    key[k] = encodings[k].encode(chunk, idx)?;
                }
                let msb = (key[0] >> shift) as usize;
                buckets
                    .entry(msb)
                    .or_insert_with(|| RadixBucket::new(num_keys))
                    .push(start + idx as u64, &key);
            }
            Ok(buckets)
        })?;

        let mut merged: BTreeMap<usize, RadixBucket> = BTreeMap::new();
        for partial in partials {
            for (msb, bucket) in partial {
                match merged.get_mut(&msb) {
                    Some(existing) => existing.append(bucket),
                    None => {
                        merged.insert(msb, bucket);
                    }
                }
            }
        }

        let mut msb_sizes = vec![0; NUM_MSB_BUCKETS];
        for (msb, mut bucket) in merged {
            bucket.sort();
            msb_sizes[msb] = bucket.len() as u64;
            cluster.put_deferred(
                bucket_key(join_id, side, msb),
                StoreValue::RadixBucket(Arc::new(bucket)),
                fs,
            );
        }

        let bytes_used = keys
            .max_encoded
            .iter()
            .map(|&max| bits_needed(max).div_ceil(8).max(1))
            .collect();

        Ok(RadixOrder {
            side,
            biggest_bit,
            bytes_used,
            msb_sizes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::constant::ConstantChunk;
    use crate::chunk::dense::{FloatChunk, IntChunk};

    #[test]
    fn bits() {
        assert_eq!(0, bits_needed(0));
        assert_eq!(1, bits_needed(1));
        assert_eq!(8, bits_needed(255));
        assert_eq!(9, bits_needed(256));
    }

    #[test]
    fn keys_read_exactly() {
        let big = (1_i64 << 53) + 1;
        let ints = Chunk::Int(IntChunk::new(vec![big, 0]));
        assert_eq!(Some(big), key_at(&ints, 0).unwrap());

        let floats = Chunk::Float(FloatChunk::new(vec![4.0, f64::NAN, 2.5, 1e19]));
        assert_eq!(Some(4), key_at(&floats, 0).unwrap());
        assert_eq!(None, key_at(&floats, 1).unwrap());
        key_at(&floats, 2).unwrap_err();
        key_at(&floats, 3).unwrap_err();

        let missing = Chunk::Constant(ConstantChunk::new_missing(3));
        assert_eq!(None, key_range(&missing).unwrap());
        assert_eq!(Some((big, big)), key_range(&Chunk::Constant(ConstantChunk::new(big.into(), 2))).unwrap());
    }

    #[test]
    fn encoding_spans_u64() {
        let enc = KeyEncoding { base: i64::MIN };
        assert_eq!(Some(1), enc.try_encode_value(i64::MIN));
        assert_eq!(Some(u64::MAX), enc.try_encode_value(i64::MAX - 1));
        assert_eq!(None, enc.try_encode_value(i64::MAX));

        let enc = KeyEncoding { base: 10 };
        assert_eq!(None, enc.try_encode_value(9));
        enc.encode_value(9).unwrap_err();
    }

    #[test]
    fn sort_is_stable() {
        let mut bucket = RadixBucket::new(2);
        bucket.push(0, &[3, 1]);
        bucket.push(1, &[1, 9]);
        bucket.push(2, &[3, 1]);
        bucket.push(3, &[1, 2]);
        bucket.sort();

        let rows: Vec<_> = (0..bucket.len()).map(|i| bucket.row(i)).collect();
        assert_eq!(vec![3, 1, 0, 2], rows);
        assert_eq!(&[1, 2], bucket.key(0));
    }

    #[test]
    fn filter_keeps_order() {
        let mut bucket = RadixBucket::new(1);
        for (row, key) in [(0, 5), (1, 300), (2, 7)] {
            bucket.push(row, &[key]);
        }
        let small = bucket.filter(|k| k[0] < 256);
        assert_eq!(2, small.len());
        assert_eq!(2, small.row(1));
    }
}
