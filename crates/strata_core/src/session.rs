//! Per-client sessions and copy-on-write reference counting of columns.
//!
//! A session tracks how many references it holds to each column: one for
//! every occurrence in a temporary frame, one for every occurrence in a frame
//! currently flowing through expression evaluation, and one for every
//! occurrence in a frame returned to the client. Columns of global frames
//! carry one extra implicit reference. A column may only be written in place
//! when its holder is the only referencer.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use strata_error::{DbError, Result};
use tracing::{debug, error, trace, warn};

use crate::cluster::Cluster;
use crate::cluster::futures::Futures;
use crate::cluster::key::Key;
use crate::cluster::store::StoreValue;
use crate::config::RefCountVerification;
use crate::frame::Frame;
use crate::rapids::ast::Ast;
use crate::rapids::env::Env;
use crate::rapids::value::{Scope, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Ended,
    Aborted,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Ended => write!(f, "ended"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

#[derive(Debug)]
pub(crate) struct SessionState {
    /// Explicit reference counts by column key.
    refcnts: HashMap<Key, usize>,
    /// Temporary frames, in creation order.
    frames: IndexMap<Key, Frame>,
    /// Columns owned by some global frame.
    globals: HashSet<Key>,
    /// Frames handed back from `exec` that still hold a reference.
    returned: Vec<Frame>,
    status: SessionStatus,
}

impl SessionState {
    fn new() -> Self {
        SessionState {
            refcnts: HashMap::new(),
            frames: IndexMap::new(),
            globals: HashSet::new(),
            returned: Vec::new(),
            status: SessionStatus::Active,
        }
    }

    fn check_active(&self) -> Result<()> {
        if self.status != SessionStatus::Active {
            return Err(DbError::validation("Session is no longer active").with_field("status", self.status));
        }
        Ok(())
    }

    pub(crate) fn ref_cnt(&self, key: &Key) -> usize {
        self.refcnts.get(key).copied().unwrap_or(0)
    }

    pub(crate) fn is_temp(&self, key: &Key) -> bool {
        self.frames.contains_key(key)
    }

    pub(crate) fn temp(&self, key: &Key) -> Option<&Frame> {
        self.frames.get(key)
    }

    pub(crate) fn is_global(&self, key: &Key) -> bool {
        self.globals.contains(key)
    }

    /// Mark every column of a frame loaded from the store as globally owned.
    pub(crate) fn add_globals(&mut self, frame: &Frame) {
        for column in frame.columns() {
            self.globals.insert(column.key().clone());
        }
    }

    /// +1 for every column occurrence in `frame`.
    pub(crate) fn add_refs(&mut self, frame: &Frame) {
        for column in frame.columns() {
            *self.refcnts.entry(column.key().clone()).or_insert(0) += 1;
        }
    }

    /// -1 for every column occurrence in `frame`.
    ///
    /// With `delete`, columns dropping to zero that no global frame owns are
    /// removed from the store.
    pub(crate) fn drop_refs(&mut self, cluster: &Cluster, frame: &Frame, delete: bool) -> Result<()> {
        let fs = Futures::new();
        for column in frame.columns() {
            let key = column.key();
            let cnt = self.refcnts.get_mut(key).ok_or_else(|| {
                DbError::invariant("Dropping a reference to an untracked column").with_field("column", key)
            })?;
            *cnt -= 1;
            if *cnt == 0 {
                self.refcnts.remove(key);
                if delete && !self.globals.contains(key) {
                    trace!(column = %key, "deleting unreferenced column");
                    column.remove(cluster, &fs);
                }
            }
        }
        fs.block_for_pending()
    }

    pub(crate) fn track(&mut self, cluster: &Cluster, frame: Frame) -> Result<Frame> {
        let key = frame
            .key()
            .cloned()
            .ok_or_else(|| DbError::validation("Temporary frames must have a key"))?;

        if self.is_temp(&key) {
            self.remove_temp(cluster, &key)?;
        }

        self.add_refs(&frame);
        frame.publish(cluster)?;
        self.frames.insert(key, frame.clone());
        Ok(frame)
    }

    fn remove_temp(&mut self, cluster: &Cluster, key: &Key) -> Result<()> {
        if let Some(frame) = self.frames.shift_remove(key) {
            self.drop_refs(cluster, &frame, true)?;
            cluster.remove(key);
        }
        Ok(())
    }

    pub(crate) fn assign(&mut self, cluster: &Cluster, key: Key, frame: Frame) -> Result<Frame> {
        if self.is_temp(&key) {
            return Err(DbError::validation("Cannot assign over a temporary frame").with_field("id", &key));
        }

        // Columns of the frame being replaced lose their global status.
        if let Some(StoreValue::Frame(prior)) = cluster.get(&key) {
            let fs = Futures::new();
            for column in prior.columns() {
                self.globals.remove(column.key());
                if self.ref_cnt(column.key()) == 0 {
                    column.remove(cluster, &fs);
                }
            }
            fs.block_for_pending()?;
        }

        // Global frames never share columns with each other.
        let mut columns = Vec::with_capacity(frame.num_columns());
        for column in frame.columns() {
            if self.globals.contains(column.key()) {
                columns.push(column.deep_copy(cluster)?);
            } else {
                columns.push(column.clone());
            }
        }

        debug!(id = %key, "assigning global frame");
        let global = Frame::try_new(frame.names().to_vec(), columns)?.with_key(key);
        global.publish(cluster)?;
        self.add_globals(&global);

        Ok(global)
    }

    pub(crate) fn remove(&mut self, cluster: &Cluster, key: &Key) -> Result<()> {
        if self.is_temp(key) {
            return self.remove_temp(cluster, key);
        }

        let frame = Frame::load(cluster, key)?;
        let fs = Futures::new();
        for column in frame.columns() {
            self.globals.remove(column.key());
            if !self.refcnts.contains_key(column.key()) {
                column.remove(cluster, &fs);
            }
        }
        fs.block_for_pending()?;
        cluster.remove(key);
        Ok(())
    }

    /// Make the given columns of `frame` safe to write.
    ///
    /// `in_flight` says whether `frame` itself holds a reference, as frames
    /// passed between operations do.
    pub(crate) fn copy_on_write(
        &mut self,
        cluster: &Cluster,
        frame: &mut Frame,
        cols: &[usize],
        in_flight: bool,
    ) -> Result<()> {
        let temp_key = frame.key().filter(|k| self.is_temp(k)).cloned();

        for &idx in cols {
            let column = frame.column(idx).clone();
            let key = column.key();

            let mut owned = 0;
            if in_flight {
                owned += frame.columns().iter().filter(|c| c.key() == key).count();
            }
            if let Some(temp) = temp_key.as_ref().and_then(|k| self.frames.get(k)) {
                owned += temp.columns().iter().filter(|c| c.key() == key).count();
            }
            let total = self.ref_cnt(key) + usize::from(self.globals.contains(key));

            if total <= owned && !column.is_read_only() {
                continue;
            }

            let copy = column.deep_copy(cluster)?;
            trace!(src = %key, dst = %copy.key(), "copy on write");
            frame.replace_column(idx, copy.clone())?;

            let single = |col| Frame::try_new(vec![String::new()], vec![col]);
            if in_flight {
                self.add_refs(&single(copy.clone())?);
                self.drop_refs(cluster, &single(column.clone())?, true)?;
            }

            if let Some(temp_key) = &temp_key {
                if let Some(temp) = self.frames.get(temp_key).cloned() {
                    if temp.columns().get(idx).is_some_and(|c| c.key() == key) {
                        let mut updated = temp.clone();
                        updated.replace_column(idx, copy.clone())?;
                        self.add_refs(&single(copy.clone())?);
                        self.drop_refs(cluster, &single(column.clone())?, true)?;
                        updated.publish(cluster)?;
                        self.frames.insert(temp_key.clone(), updated);
                    }
                }
            }
        }

        Ok(())
    }

    /// Compare the reference table against counts rebuilt from the temps and
    /// returned frames, plus `extra`.
    pub(crate) fn sanity_check_refs(&self, extra: Option<&Frame>) -> Option<String> {
        let mut expected: HashMap<&Key, usize> = HashMap::new();
        let frames = self.frames.values().chain(&self.returned).chain(extra);
        for frame in frames {
            for column in frame.columns() {
                *expected.entry(column.key()).or_insert(0) += 1;
            }
        }

        let mut mismatches = Vec::new();
        for (key, &cnt) in &expected {
            let tracked = self.ref_cnt(key);
            if tracked != cnt {
                mismatches.push(format!("{key}: tracked {tracked}, expected {cnt}"));
            }
        }
        for (key, &cnt) in &self.refcnts {
            if !expected.contains_key(key) {
                mismatches.push(format!("{key}: tracked {cnt}, expected 0"));
            }
        }

        if mismatches.is_empty() {
            None
        } else {
            mismatches.sort();
            Some(format!("Reference count mismatch: {}", mismatches.join("; ")))
        }
    }

    fn verify(&self, mode: RefCountVerification, extra: Option<&Frame>) -> Result<()> {
        if mode == RefCountVerification::Off {
            return Ok(());
        }
        match self.sanity_check_refs(extra) {
            None => Ok(()),
            Some(msg) if mode == RefCountVerification::Strict => Err(DbError::invariant(msg)),
            Some(msg) => {
                error!(%msg, "session reference counts out of sync");
                Ok(())
            }
        }
    }

    fn release(&mut self, cluster: &Cluster, frame: &Frame) -> Result<()> {
        let pos = self
            .returned
            .iter()
            .position(|f| f == frame)
            .ok_or_else(|| DbError::validation("Frame was not returned by this session"))?;
        let frame = self.returned.remove(pos);
        self.drop_refs(cluster, &frame, true)
    }

    fn end(&mut self, cluster: &Cluster, returning: Option<Value>) -> Result<Option<Value>> {
        let keys: Vec<_> = self.frames.keys().cloned().collect();
        for key in keys {
            self.remove_temp(cluster, &key)?;
        }

        let returning_frame = returning.as_ref().and_then(Value::as_frame);
        let returning_pos = returning_frame.and_then(|r| self.returned.iter().position(|f| f == r));
        let returned_frame = returning_pos.map(|pos| self.returned.remove(pos));

        for frame in std::mem::take(&mut self.returned) {
            self.drop_refs(cluster, &frame, true)?;
        }

        let result = match (returning, returned_frame) {
            (Some(Value::Frame(frame)), held) => {
                if let Some(held) = held {
                    self.drop_refs(cluster, &held, false)?;
                }
                // The client gets columns nothing else in the cluster owns.
                let mut columns = Vec::with_capacity(frame.num_columns());
                for column in frame.columns() {
                    if self.globals.contains(column.key()) {
                        columns.push(column.deep_copy(cluster)?);
                    } else {
                        columns.push(column.clone());
                    }
                }
                Some(Value::Frame(Frame::try_new(frame.names().to_vec(), columns)?))
            }
            (other, _) => other,
        };

        self.clear(SessionStatus::Ended);
        Ok(result)
    }

    fn clear(&mut self, status: SessionStatus) {
        self.refcnts.clear();
        self.frames.clear();
        self.globals.clear();
        self.returned.clear();
        self.status = status;
    }
}

/// A client's view of the cluster.
///
/// Expressions run one at a time per session.
pub struct Session {
    cluster: Arc<Cluster>,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(cluster: Arc<Cluster>) -> Self {
        Session {
            cluster,
            state: Mutex::new(SessionState::new()),
        }
    }

    pub fn cluster(&self) -> &Arc<Cluster> {
        &self.cluster
    }

    pub fn status(&self) -> SessionStatus {
        self.state.lock().status
    }

    fn verify_mode(&self) -> RefCountVerification {
        self.cluster.config().verify_refcounts
    }

    /// Parse and evaluate an expression.
    ///
    /// A returned frame keeps a reference until passed to `release` or
    /// `end`.
    pub fn exec(&self, expr: &str) -> Result<Value> {
        self.exec_with_scope(expr, &Scope::new())
    }

    pub fn exec_with_scope(&self, expr: &str, scope: &Scope) -> Result<Value> {
        let ast = Ast::parse(expr)?;

        let mut state = self.state.lock();
        state.check_active()?;
        state.verify(self.verify_mode(), None)?;

        trace!(%ast, "evaluating");
        let value = {
            let mut env = Env::new(&self.cluster, &mut state, scope);
            env.eval(&ast)?
        };

        if let Value::Frame(frame) = &value {
            state.returned.push(frame.clone());
        }
        state.verify(self.verify_mode(), None)?;

        Ok(value)
    }

    /// Register a frame as a session temporary.
    pub fn track(&self, frame: Frame) -> Result<Frame> {
        let mut state = self.state.lock();
        state.check_active()?;
        state.track(&self.cluster, frame)
    }

    /// Install `frame` as the global frame `id`.
    pub fn assign(&self, id: &str, frame: Frame) -> Result<Frame> {
        let mut state = self.state.lock();
        state.check_active()?;
        state.assign(&self.cluster, Key::user(id), frame)
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.check_active()?;
        state.remove(&self.cluster, &Key::user(id))
    }

    /// Replace every listed column of `frame` that something else also
    /// references with a private copy.
    pub fn copy_on_write(&self, frame: &mut Frame, cols: &[usize]) -> Result<()> {
        let mut state = self.state.lock();
        state.check_active()?;
        state.copy_on_write(&self.cluster, frame, cols, false)
    }

    /// Drop the reference held by a value returned from `exec`.
    pub fn release(&self, value: &Value) -> Result<()> {
        let mut state = self.state.lock();
        match value {
            Value::Frame(frame) => state.release(&self.cluster, frame),
            _ => Ok(()),
        }
    }

    /// Release everything the session holds and hand back `returning` with
    /// columns independent of the session.
    pub fn end(&self, returning: Option<Value>) -> Result<Option<Value>> {
        let mut state = self.state.lock();
        state.check_active()?;
        state.verify(self.verify_mode(), None)?;

        let result = state.end(&self.cluster, returning)?;
        debug!("session ended");
        Ok(result)
    }

    /// Best effort cleanup after a failure. Secondary errors are logged and
    /// `err` is returned.
    pub fn end_quietly(&self, err: DbError) -> DbError {
        let mut state = self.state.lock();

        if let Some(msg) = state.sanity_check_refs(None) {
            error!(%msg, "session reference counts out of sync during abort");
        }

        let keys: Vec<_> = state.frames.keys().cloned().collect();
        for key in keys {
            if let Err(e) = state.remove_temp(&self.cluster, &key) {
                warn!(%e, frame = %key, "failed to remove temporary frame");
            }
        }
        for frame in std::mem::take(&mut state.returned) {
            if let Err(e) = state.drop_refs(&self.cluster, &frame, true) {
                warn!(%e, "failed to release returned frame");
            }
        }

        state.clear(SessionStatus::Aborted);
        debug!(%err, "session aborted");
        err
    }

    /// `None` if the reference table matches the tracked frames, otherwise a
    /// description of the mismatch.
    pub fn sanity_check_refs(&self, extra: Option<&Frame>) -> Option<String> {
        self.state.lock().sanity_check_refs(extra)
    }

    pub fn ref_cnt(&self, key: &Key) -> usize {
        self.state.lock().ref_cnt(key)
    }

    pub fn is_global(&self, key: &Key) -> bool {
        self.state.lock().is_global(key)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::scalar::ScalarValue;
    use crate::testutil::{column_values, frame_from_columns, numeric_column, test_cluster};

    fn session_with_frame(name: &str, values: &[f64]) -> (Session, Frame) {
        let cluster = test_cluster();
        let col = numeric_column(&cluster, &[values]).unwrap();
        let frame = frame_from_columns(&["a"], vec![col]).unwrap().with_key(Key::user(name));
        (Session::new(cluster), frame)
    }

    #[test]
    fn track_counts_references() {
        let (session, frame) = session_with_frame("t", &[1.0, 2.0]);
        let frame = session.track(frame).unwrap();

        assert_eq!(1, session.ref_cnt(frame.column(0).key()));
        assert!(session.sanity_check_refs(None).is_none());
        assert!(session.cluster().store().contains(&Key::user("t")));

        // Returning a frame counts one more reference.
        assert!(session.sanity_check_refs(Some(&frame)).is_some());
    }

    #[test]
    fn retrack_replaces_temp() {
        let (session, frame) = session_with_frame("t", &[1.0]);
        let first = session.track(frame).unwrap();
        let col = numeric_column(session.cluster(), &[&[2.0]]).unwrap();
        let second = frame_from_columns(&["b"], vec![col]).unwrap().with_key(Key::user("t"));
        session.track(second).unwrap();

        assert_eq!(0, session.ref_cnt(first.column(0).key()));
        assert!(!session.cluster().store().contains(first.column(0).key()));
        assert!(session.sanity_check_refs(None).is_none());
    }

    #[test]
    fn copy_on_write_protects_other_holder() {
        let (session, frame) = session_with_frame("t1", &[1.0, 2.0]);
        let t1 = session.track(frame.clone()).unwrap();
        let t2 = session.track(frame.with_key(Key::user("t2"))).unwrap();
        assert_eq!(2, session.ref_cnt(t1.column(0).key()));

        let mut target = t1.clone();
        session.copy_on_write(&mut target, &[0]).unwrap();
        assert_ne!(t1.column(0).key(), target.column(0).key());

        target.column(0).set(session.cluster(), 0, &ScalarValue::Int64(9)).unwrap();
        assert_eq!(
            vec![ScalarValue::Int64(1), ScalarValue::Int64(2)],
            column_values(session.cluster(), t2.column(0)).unwrap()
        );
        assert_eq!(1, session.ref_cnt(t2.column(0).key()));
        assert!(session.sanity_check_refs(None).is_none());
    }

    #[test]
    fn copy_on_write_sole_owner_in_place() {
        let (session, frame) = session_with_frame("t", &[1.0]);
        let t = session.track(frame).unwrap();

        let mut target = t.clone();
        session.copy_on_write(&mut target, &[0]).unwrap();
        assert_eq!(t.column(0).key(), target.column(0).key());
    }

    #[test]
    fn assign_copies_shared_globals() {
        let (session, frame) = session_with_frame("unused", &[4.0]);
        let x = session.assign("x", frame.clone()).unwrap();
        assert!(session.is_global(x.column(0).key()));

        let y = session.assign("y", x.clone()).unwrap();
        assert_ne!(x.column(0).key(), y.column(0).key());

        session.remove("x").unwrap();
        let cluster = session.cluster();
        assert!(!cluster.store().contains(&Key::user("x")));
        assert!(!cluster.store().contains(x.column(0).key()));
        assert!(cluster.store().contains(y.column(0).key()));
    }

    #[test]
    fn assign_over_temp_rejected() {
        let (session, frame) = session_with_frame("t", &[1.0]);
        let t = session.track(frame).unwrap();
        session.assign("t", t).unwrap_err();
    }

    #[test]
    fn end_releases_temps() {
        let (session, frame) = session_with_frame("t", &[1.0]);
        let t = session.track(frame).unwrap();

        assert_eq!(None, session.end(None).unwrap());
        assert_eq!(SessionStatus::Ended, session.status());
        assert!(!session.cluster().store().contains(t.column(0).key()));
        session.exec("(ls)").unwrap_err();
    }

    #[test]
    fn end_quietly_aborts() {
        let (session, frame) = session_with_frame("t", &[1.0]);
        session.track(frame).unwrap();

        let err = session.end_quietly(DbError::new("boom"));
        assert_eq!("boom", err.get_msg());
        assert_eq!(SessionStatus::Aborted, session.status());
        assert!(!session.cluster().store().contains(&Key::user("t")));
    }
}
