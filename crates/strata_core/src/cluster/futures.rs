use futures::channel::oneshot;
use parking_lot::Mutex;
use strata_error::{DbError, Result};

/// Handle collecting deferred store writes.
///
/// Writes pushed here are already in flight on the cluster worker pool.
/// `block_for_pending` waits for all of them.
#[derive(Debug, Default)]
pub struct Futures {
    pending: Mutex<Vec<oneshot::Receiver<Result<()>>>>,
}

impl Futures {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, rx: oneshot::Receiver<Result<()>>) {
        self.pending.lock().push(rx);
    }

    pub fn num_pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Block until every pending write completes.
    ///
    /// Waits on all writes even if one fails, then returns the first error.
    pub fn block_for_pending(&self) -> Result<()> {
        let pending = std::mem::take(&mut *self.pending.lock());

        let mut first_err = None;
        for rx in pending {
            let result = match futures::executor::block_on(rx) {
                Ok(result) => result,
                Err(_) => Err(DbError::distributed(
                    "Pending write was dropped before completing",
                )),
            };
            if let Err(e) = result {
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
