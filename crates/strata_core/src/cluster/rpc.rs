use std::fmt;

use futures::channel::oneshot;
use strata_error::{DbError, Result};

/// Identifier of a node in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node_{}", self.0)
    }
}

/// Handle to an asynchronous task dispatched to a node.
#[derive(Debug)]
pub struct RpcHandle<T> {
    pub(crate) node: NodeId,
    pub(crate) rx: oneshot::Receiver<Result<T>>,
}

impl<T> RpcHandle<T> {
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Block until the remote task completes.
    pub fn get(self) -> Result<T> {
        match futures::executor::block_on(self.rx) {
            Ok(result) => result,
            Err(_) => Err(DbError::distributed("Remote task exited without a result")
                .with_field("node", self.node)),
        }
    }
}
