use std::fmt::Debug;
use std::sync::Arc;

use strata_error::{DbError, Result};

use super::key::Key;
use crate::arrays::datatype::ColumnType;
use crate::chunk::Chunk;
use crate::column::Column;
use crate::frame::Frame;
use crate::merge::radix::RadixBucket;

/// A value held by the cluster store.
#[derive(Debug, Clone)]
pub enum StoreValue {
    Frame(Frame),
    Column(Arc<Column>),
    /// Placeholder for a column still being built. Cannot be read.
    Building(ColumnType),
    Chunk(Arc<Chunk>),
    RadixBucket(Arc<RadixBucket>),
}

impl StoreValue {
    pub fn try_into_frame(self) -> Result<Frame> {
        match self {
            Self::Frame(frame) => Ok(frame),
            other => Err(DbError::new("Store value is not a frame").with_field("value", other.kind_name())),
        }
    }

    pub fn try_into_chunk(self) -> Result<Arc<Chunk>> {
        match self {
            Self::Chunk(chunk) => Ok(chunk),
            other => Err(DbError::new("Store value is not a chunk").with_field("value", other.kind_name())),
        }
    }

    pub fn try_into_radix_bucket(self) -> Result<Arc<RadixBucket>> {
        match self {
            Self::RadixBucket(bucket) => Ok(bucket),
            other => Err(DbError::new("Store value is not a radix bucket")
                .with_field("value", other.kind_name())),
        }
    }

    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Frame(_) => "frame",
            Self::Column(_) => "column",
            Self::Building(_) => "building column",
            Self::Chunk(_) => "chunk",
            Self::RadixBucket(_) => "radix bucket",
        }
    }
}

/// Key/value storage shared by every node in the cluster.
///
/// This is the single source of truth for which version of a frame or column
/// is visible.
pub trait ClusterStore: Debug + Sync + Send {
    /// Insert or replace a value.
    fn put(&self, key: Key, value: StoreValue);

    fn get(&self, key: &Key) -> Option<StoreValue>;

    /// Remove a value, returning it if it existed.
    fn remove(&self, key: &Key) -> Option<StoreValue>;

    fn contains(&self, key: &Key) -> bool;

    /// Snapshot of all keys currently in the store.
    fn keys(&self) -> Vec<Key>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: scc::HashMap<Key, StoreValue>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClusterStore for MemoryStore {
    fn put(&self, key: Key, value: StoreValue) {
        let _ = self.values.upsert(key, value);
    }

    fn get(&self, key: &Key) -> Option<StoreValue> {
        self.values.read(key, |_, v| v.clone())
    }

    fn remove(&self, key: &Key) -> Option<StoreValue> {
        self.values.remove(key).map(|(_, v)| v)
    }

    fn contains(&self, key: &Key) -> bool {
        self.values.contains(key)
    }

    fn keys(&self) -> Vec<Key> {
        let mut keys = Vec::with_capacity(self.values.len());
        self.values.scan(|k, _| keys.push(k.clone()));
        keys
    }
}
