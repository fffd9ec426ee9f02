use std::sync::Arc;

use strata_error::{DbError, Result};

use super::ast::Ast;
use super::ops::{self, Prim};
use super::value::{Scope, Value};
use crate::cluster::Cluster;
use crate::cluster::key::Key;
use crate::frame::Frame;
use crate::session::SessionState;

/// Evaluation environment for one expression.
///
/// Every frame value produced while evaluating holds one reference per
/// column in the session. Arguments are released once the operation
/// consuming them returns.
pub struct Env<'a> {
    pub(crate) cluster: &'a Arc<Cluster>,
    pub(crate) session: &'a mut SessionState,
    scope: &'a Scope,
}

impl<'a> Env<'a> {
    pub(crate) fn new(cluster: &'a Arc<Cluster>, session: &'a mut SessionState, scope: &'a Scope) -> Self {
        Env { cluster, session, scope }
    }

    pub fn cluster(&self) -> &Arc<Cluster> {
        self.cluster
    }

    pub fn eval(&mut self, ast: &Ast) -> Result<Value> {
        match ast {
            Ast::Num(v) => Ok(Value::Num(*v)),
            Ast::Str(s) => Ok(Value::Str(s.clone())),
            Ast::NumList(list) => Ok(Value::NumList(list.clone())),
            Ast::Ident(name) => self.lookup(name),
            Ast::Call { op, args } => {
                let prim = ops::lookup(op)?;
                self.apply(prim, args)
            }
        }
    }

    fn lookup(&mut self, name: &str) -> Result<Value> {
        if let Some(value) = self.scope.get(name) {
            return Ok(value.clone());
        }

        let key = Key::user(name);
        let frame = match self.session.temp(&key) {
            Some(frame) => frame.clone(),
            None => {
                let frame = Frame::load(self.cluster, &key)?;
                self.session.add_globals(&frame);
                frame
            }
        };
        self.session.add_refs(&frame);
        Ok(Value::Frame(frame))
    }

    /// Hold a reference for a value produced by an operation.
    fn hold(&mut self, value: &Value) {
        if let Value::Frame(frame) = value {
            self.session.add_refs(frame);
        }
    }

    fn release(&mut self, values: &[Value]) -> Result<()> {
        for value in values {
            if let Value::Frame(frame) = value {
                self.session.drop_refs(self.cluster, frame, true)?;
            }
        }
        Ok(())
    }

    fn apply(&mut self, prim: &dyn Prim, args: &[Ast]) -> Result<Value> {
        prim.check_arity(args.len())?;

        let mut held = Vec::with_capacity(args.len());
        for (idx, arg) in args.iter().enumerate() {
            let value = match arg {
                // Names being bound are not looked up.
                Ast::Ident(name) | Ast::Str(name) if idx == 0 && prim.binds_name() => Ok(Value::Str(name.clone())),
                arg => self.eval(arg),
            };
            match value {
                Ok(value) => held.push(value),
                Err(e) => {
                    self.release(&held)?;
                    return Err(e);
                }
            }
        }

        match prim.apply(self, &mut held) {
            Ok(value) => {
                self.hold(&value);
                self.release(&held)?;
                Ok(value)
            }
            Err(e) => {
                self.release(&held)?;
                Err(e.with_field("op", prim.name()))
            }
        }
    }

    /// Copy-on-write for a frame held as an operation argument.
    pub(crate) fn copy_on_write(&mut self, frame: &mut Frame, cols: &[usize]) -> Result<()> {
        self.session.copy_on_write(self.cluster, frame, cols, true)
    }

    pub(crate) fn not_a(expected: &str, value: &Value) -> DbError {
        DbError::validation(format!("Expected {expected}")).with_field("got", value.kind_name())
    }
}
