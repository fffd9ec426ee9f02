use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use scc::hash_map::Entry;
use strata_error::{DbError, Result};

/// Chunk boundaries shared by every column built with the same chunking.
///
/// `espc` holds the starting row of each chunk followed by the total row
/// count, so it always has `num_chunks + 1` entries and starts at 0. Chunks
/// may be empty.
#[derive(Debug, PartialEq, Eq)]
pub struct RowLayout {
    id: u32,
    espc: Arc<[u64]>,
}

impl RowLayout {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn espc(&self) -> &[u64] {
        &self.espc
    }

    pub fn num_chunks(&self) -> usize {
        self.espc.len() - 1
    }

    pub fn num_rows(&self) -> u64 {
        self.espc[self.espc.len() - 1]
    }

    pub fn chunk_start(&self, cidx: usize) -> u64 {
        self.espc[cidx]
    }

    pub fn chunk_len(&self, cidx: usize) -> usize {
        (self.espc[cidx + 1] - self.espc[cidx]) as usize
    }

    /// Chunk holding a row, skipping over empty chunks.
    pub fn chunk_for_row(&self, row: u64) -> Option<usize> {
        if row >= self.num_rows() {
            return None;
        }
        Some(self.espc.partition_point(|&start| start <= row) - 1)
    }

    /// Same chunk boundaries as `other`.
    ///
    /// Layouts from the same registry are deduplicated, so this is an id
    /// comparison in practice.
    pub fn is_compatible(&self, other: &RowLayout) -> bool {
        self.id == other.id || self.espc == other.espc
    }
}

/// Interns chunk boundary tables so columns with identical chunking share one
/// layout.
#[derive(Debug)]
pub struct RowLayoutRegistry {
    by_espc: scc::HashMap<Arc<[u64]>, Arc<RowLayout>>,
    next_id: AtomicU32,
}

impl Default for RowLayoutRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RowLayoutRegistry {
    pub fn new() -> Self {
        RowLayoutRegistry {
            by_espc: scc::HashMap::new(),
            next_id: AtomicU32::new(0),
        }
    }

    /// Get or create the layout for a chunk start table.
    pub fn intern(&self, espc: Vec<u64>) -> Result<Arc<RowLayout>> {
        if espc.first() != Some(&0) {
            return Err(DbError::invariant("Chunk start table must begin at row 0")
                .with_field("len", espc.len()));
        }
        if let Some(idx) = espc.windows(2).position(|w| w[0] > w[1]) {
            return Err(DbError::invariant("Chunk start table must not decrease")
                .with_field("index", idx + 1));
        }

        let espc: Arc<[u64]> = espc.into();
        let layout = match self.by_espc.entry(espc.clone()) {
            Entry::Occupied(ent) => ent.get().clone(),
            Entry::Vacant(ent) => {
                let layout = Arc::new(RowLayout {
                    id: self.next_id.fetch_add(1, Ordering::Relaxed),
                    espc,
                });
                ent.insert_entry(layout.clone());
                layout
            }
        };

        Ok(layout)
    }

    /// Get or create the layout from per-chunk lengths.
    pub fn intern_lens(&self, lens: &[u64]) -> Result<Arc<RowLayout>> {
        let mut espc = Vec::with_capacity(lens.len() + 1);
        let mut start = 0;
        espc.push(start);
        for len in lens {
            start += len;
            espc.push(start);
        }
        self.intern(espc)
    }
}
