use strata_error::{DbError, Result};
use tracing::debug;

use super::Prim;
use crate::cluster::key::Key;
use crate::cluster::store::StoreValue;
use crate::rapids::env::Env;
use crate::rapids::value::Value;

fn bound_name(value: &Value) -> Result<&str> {
    match value {
        Value::Str(id) if !id.is_empty() => Ok(id),
        other => Err(Env::not_a("a frame name", other)),
    }
}

/// `(tmp= id expr)`
///
/// Names the frame as a session temporary, removed when the session ends.
#[derive(Debug, Clone, Copy)]
pub struct TmpAssign;

impl Prim for TmpAssign {
    fn name(&self) -> &'static str {
        "tmp="
    }

    fn arity(&self) -> (usize, Option<usize>) {
        (2, Some(2))
    }

    fn binds_name(&self) -> bool {
        true
    }

    fn apply(&self, env: &mut Env<'_>, args: &mut [Value]) -> Result<Value> {
        let id = bound_name(&args[0])?;
        let frame = match &args[1] {
            Value::Frame(frame) => frame,
            other => return Err(Env::not_a("a frame to name", other)),
        };

        let key = Key::user(id);
        if !env.session.is_temp(&key) && matches!(env.cluster.get(&key), Some(StoreValue::Frame(_))) {
            return Err(DbError::validation("Temporary frame would shadow a global frame").with_field("id", id));
        }

        debug!(%key, "naming temporary frame");
        let frame = env.session.track(env.cluster, frame.clone().with_key(key))?;
        Ok(Value::Frame(frame))
    }
}

/// `(assign id expr)`
///
/// Installs the frame as a global, replacing any global of the same name.
#[derive(Debug, Clone, Copy)]
pub struct Assign;

impl Prim for Assign {
    fn name(&self) -> &'static str {
        "assign"
    }

    fn arity(&self) -> (usize, Option<usize>) {
        (2, Some(2))
    }

    fn binds_name(&self) -> bool {
        true
    }

    fn apply(&self, env: &mut Env<'_>, args: &mut [Value]) -> Result<Value> {
        let id = bound_name(&args[0])?;
        let frame = match &args[1] {
            Value::Frame(frame) => frame,
            other => return Err(Env::not_a("a frame to assign", other)),
        };

        let global = env.session.assign(env.cluster, Key::user(id), frame.clone())?;
        Ok(Value::Frame(global))
    }
}

/// `(rm id)`
#[derive(Debug, Clone, Copy)]
pub struct Remove;

impl Prim for Remove {
    fn name(&self) -> &'static str {
        "rm"
    }

    fn arity(&self) -> (usize, Option<usize>) {
        (1, Some(1))
    }

    fn binds_name(&self) -> bool {
        true
    }

    fn apply(&self, env: &mut Env<'_>, args: &mut [Value]) -> Result<Value> {
        let id = bound_name(&args[0])?;
        env.session.remove(env.cluster, &Key::user(id))?;
        Ok(Value::Num(0.0))
    }
}
