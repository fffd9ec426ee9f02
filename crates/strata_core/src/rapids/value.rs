use std::collections::HashMap;
use std::fmt;

use strata_error::{DbError, Result};

use crate::frame::Frame;
use crate::rangelist::RangeList;

/// Result of evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Num(f64),
    Str(String),
    NumList(RangeList),
    Frame(Frame),
}

impl Value {
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Num(_) => "number",
            Self::Str(_) => "string",
            Self::NumList(_) => "number list",
            Self::Frame(_) => "frame",
        }
    }

    pub fn as_frame(&self) -> Option<&Frame> {
        match self {
            Self::Frame(frame) => Some(frame),
            _ => None,
        }
    }

    pub fn try_into_frame(self) -> Result<Frame> {
        match self {
            Self::Frame(frame) => Ok(frame),
            other => Err(DbError::validation("Expected a frame").with_field("got", other.kind_name())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(v) => write!(f, "{v}"),
            Self::Str(s) => write!(f, "{s}"),
            Self::NumList(list) => write!(f, "{list}"),
            Self::Frame(frame) => match frame.key() {
                Some(key) => write!(f, "<frame {key}: {} x {}>", frame.num_rows(), frame.num_columns()),
                None => write!(f, "<frame: {} x {}>", frame.num_rows(), frame.num_columns()),
            },
        }
    }
}

/// Named non-frame values visible to an expression.
///
/// Frames are always looked up through the session, never bound here.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    values: HashMap<String, Value>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Result<()> {
        let name = name.into();
        if matches!(value, Value::Frame(_)) {
            return Err(DbError::validation("Frames cannot be bound in a scope").with_field("name", name));
        }
        self.values.insert(name, value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_rejects_frames() {
        let mut scope = Scope::new();
        scope.insert("n", Value::Num(3.0)).unwrap();
        scope.insert("f", Value::Frame(Frame::empty())).unwrap_err();

        assert_eq!(Some(&Value::Num(3.0)), scope.get("n"));
        assert!(scope.get("f").is_none());
    }
}
