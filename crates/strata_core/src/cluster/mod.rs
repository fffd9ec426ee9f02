//! In-process cluster substrate.
//!
//! Nodes are simulated: all of them share one store and one worker pool, but
//! every key still has a home node and remote tasks are dispatched to a node.

pub mod futures;
pub mod key;
pub mod rpc;
pub mod store;

use std::fmt;
use std::hash::BuildHasher;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use ::futures::channel::oneshot;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use strata_error::{DbError, Result, ResultExt};
use tracing::{debug, trace};

use self::futures::Futures;
use self::key::Key;
use self::rpc::{NodeId, RpcHandle};
use self::store::{ClusterStore, MemoryStore, StoreValue};
use crate::column::row_layout::RowLayoutRegistry;
use crate::config::ClusterConfig;

pub struct Cluster {
    config: ClusterConfig,
    store: Arc<dyn ClusterStore>,
    layouts: RowLayoutRegistry,
    pool: ThreadPool,
    /// Fixed seeds so key homing is stable for the life of the process.
    hasher: ahash::RandomState,
}

impl Cluster {
    /// Create a cluster backed by an in-memory store.
    pub fn try_new(config: ClusterConfig) -> Result<Arc<Self>> {
        Self::try_new_with_store(config, Arc::new(MemoryStore::new()))
    }

    pub fn try_new_with_store(config: ClusterConfig, store: Arc<dyn ClusterStore>) -> Result<Arc<Self>> {
        if config.num_nodes == 0 {
            return Err(DbError::validation("Cluster requires at least one node"));
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(config.num_threads)
            .thread_name(|idx| format!("strata_worker_{idx}"))
            .build()
            .context("Failed to build worker pool")?;

        debug!(nodes = config.num_nodes, threads = config.num_threads, "starting cluster");

        Ok(Arc::new(Cluster {
            config,
            store,
            layouts: RowLayoutRegistry::new(),
            pool,
            hasher: ahash::RandomState::with_seeds(
                0x243f_6a88_85a3_08d3,
                0x1319_8a2e_0370_7344,
                0xa409_3822_299f_31d0,
                0x082e_fa98_ec4e_6c89,
            ),
        }))
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ClusterStore> {
        &self.store
    }

    pub fn layouts(&self) -> &RowLayoutRegistry {
        &self.layouts
    }

    pub fn num_nodes(&self) -> usize {
        self.config.num_nodes
    }

    /// Node that owns the given key.
    pub fn home_node(&self, key: &Key) -> NodeId {
        let hash = self.hasher.hash_one(key.name());
        NodeId((hash % self.config.num_nodes as u64) as usize)
    }

    /// Node that owns a most-significant-byte bucket.
    ///
    /// Buckets are spread over nodes in contiguous runs so neighboring buckets
    /// mostly live together.
    pub fn msb_owner(&self, msb: usize) -> NodeId {
        NodeId((msb.min(255) * self.config.num_nodes) / 256)
    }

    pub fn put(&self, key: Key, value: StoreValue) {
        self.store.put(key, value)
    }

    pub fn get(&self, key: &Key) -> Option<StoreValue> {
        self.store.get(key)
    }

    pub fn remove(&self, key: &Key) -> Option<StoreValue> {
        self.store.remove(key)
    }

    /// Put a value without waiting for it to land.
    pub fn put_deferred(&self, key: Key, value: StoreValue, fs: &Futures) {
        let (tx, rx) = oneshot::channel();
        let store = self.store.clone();
        self.pool.spawn(move || {
            store.put(key, value);
            let _ = tx.send(Ok(()));
        });
        fs.push(rx);
    }

    /// Remove a value without waiting for it to be gone.
    pub fn remove_deferred(&self, key: Key, fs: &Futures) {
        let (tx, rx) = oneshot::channel();
        let store = self.store.clone();
        self.pool.spawn(move || {
            store.remove(&key);
            let _ = tx.send(Ok(()));
        });
        fs.push(rx);
    }

    /// Run `f` once per chunk index on the worker pool, returning results in
    /// chunk order.
    ///
    /// Fails with the first error encountered.
    pub fn map_chunks<R, F>(&self, num_chunks: usize, f: F) -> Result<Vec<R>>
    where
        R: Send,
        F: Fn(usize) -> Result<R> + Sync + Send,
    {
        self.pool
            .install(|| (0..num_chunks).into_par_iter().map(&f).collect())
    }

    /// Run `f` once for every node.
    pub fn for_each_node<F>(&self, f: F) -> Result<()>
    where
        F: Fn(NodeId) -> Result<()> + Sync + Send,
    {
        self.pool.install(|| {
            (0..self.config.num_nodes)
                .into_par_iter()
                .try_for_each(|idx| f(NodeId(idx)))
        })
    }

    /// Dispatch a task to a node.
    ///
    /// Returns immediately. A panic inside the task is reported as an error
    /// from the handle.
    pub fn rpc<T, F>(&self, node: NodeId, task: F) -> RpcHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        trace!(%node, "dispatching remote task");
        self.pool.spawn(move || {
            let result = match std::panic::catch_unwind(AssertUnwindSafe(task)) {
                Ok(result) => result,
                Err(_) => Err(DbError::distributed("Remote task panicked").with_field("node", node)),
            };
            let _ = tx.send(result);
        });
        RpcHandle { node, rx }
    }
}

impl fmt::Debug for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cluster")
            .field("config", &self.config)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
