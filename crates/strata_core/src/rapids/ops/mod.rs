//! Primitive operations callable from expressions.

pub mod assign;
pub mod cbind;
pub mod col_slice;
pub mod ls;
pub mod merge;
pub mod row_assign;
pub mod row_slice;

use std::collections::HashMap;
use std::sync::LazyLock;

use strata_error::{DbError, Result};

use super::env::Env;
use super::value::Value;
use crate::frame::similar_name;
use crate::rangelist::RangeList;

/// An operation applied to already evaluated arguments.
pub trait Prim: Sync + Send {
    fn name(&self) -> &'static str;

    /// Accepted argument counts, inclusive. `None` for no upper bound.
    fn arity(&self) -> (usize, Option<usize>);

    /// If the first argument is a name to bind rather than a value.
    fn binds_name(&self) -> bool {
        false
    }

    /// Apply to `args`. Arguments stay owned by the caller, an operation
    /// that writes into an argument frame must go through copy-on-write.
    fn apply(&self, env: &mut Env<'_>, args: &mut [Value]) -> Result<Value>;

    fn check_arity(&self, n: usize) -> Result<()> {
        let (min, max) = self.arity();
        if n < min || max.is_some_and(|max| n > max) {
            let expected = match max {
                Some(max) if max == min => format!("{min}"),
                Some(max) => format!("{min} to {max}"),
                None => format!("at least {min}"),
            };
            return Err(DbError::validation(format!("Wrong number of arguments to '{}'", self.name()))
                .with_field("expected", expected)
                .with_field("got", n));
        }
        Ok(())
    }
}

static PRIMS: LazyLock<HashMap<&'static str, Box<dyn Prim>>> = LazyLock::new(|| {
    let prims: Vec<Box<dyn Prim>> = vec![
        Box::new(col_slice::ColSlice),
        Box::new(row_slice::RowSlice),
        Box::new(row_assign::RowAssign),
        Box::new(cbind::ColumnBind),
        Box::new(merge::Merge),
        Box::new(assign::TmpAssign),
        Box::new(assign::Assign),
        Box::new(assign::Remove),
        Box::new(ls::Ls),
    ];
    prims.into_iter().map(|p| (p.name(), p)).collect()
});

pub fn lookup(name: &str) -> Result<&'static dyn Prim> {
    match PRIMS.get(name) {
        Some(prim) => Ok(prim.as_ref()),
        None => {
            let mut err = DbError::validation(format!("Unknown operation '{name}'"));
            if let Some(similar) = similar_name(PRIMS.keys().copied(), name) {
                err = err.with_field("did you mean", similar.to_string());
            }
            Err(err)
        }
    }
}

/// Row or column selection as a range list of whole numbers.
pub(crate) fn selection(value: &Value, what: &str) -> Result<RangeList> {
    let list = match value {
        Value::NumList(list) => list.clone(),
        Value::Num(v) => RangeList::single(*v),
        other => return Err(Env::not_a(&format!("a number or number list selecting {what}"), other)),
    };
    if !list.is_integral() {
        return Err(DbError::validation(format!("{what} selection must hold whole numbers"))
            .with_field("selection", &list));
    }
    Ok(list)
}

/// Check every selected index is in `0..n`.
pub(crate) fn check_bounds(list: &RangeList, n: u64, what: &str) -> Result<()> {
    let in_bounds = match (list.min(), list.max()) {
        (Some(min), Some(max)) => min >= 0.0 && max < n as f64,
        _ => true,
    };
    if !in_bounds {
        return Err(DbError::bounds(format!("{what} must be an integer from 0 to {}", n as i64 - 1))
            .with_field("selection", list));
    }
    Ok(())
}
