use strata_error::{DbError, Result};

use super::{Prim, check_bounds, selection};
use crate::frame::Frame;
use crate::rapids::env::Env;
use crate::rapids::value::Value;

/// `(merge left right allLeft [lcols] [rcols])`
///
/// Without key columns the frames are joined on the column names they share.
/// With only `lcols`, the same positions are used on the right.
#[derive(Debug, Clone, Copy)]
pub struct Merge;

impl Prim for Merge {
    fn name(&self) -> &'static str {
        "merge"
    }

    fn arity(&self) -> (usize, Option<usize>) {
        (3, Some(5))
    }

    fn apply(&self, env: &mut Env<'_>, args: &mut [Value]) -> Result<Value> {
        let left = match &args[0] {
            Value::Frame(frame) => frame,
            other => return Err(Env::not_a("a frame on the left of a merge", other)),
        };
        let right = match &args[1] {
            Value::Frame(frame) => frame,
            other => return Err(Env::not_a("a frame on the right of a merge", other)),
        };
        let all_left = match &args[2] {
            Value::Num(v) => *v != 0.0,
            other => return Err(Env::not_a("a number for allLeft", other)),
        };

        let (left_cols, right_cols) = match (args.get(3), args.get(4)) {
            (None, _) => shared_columns(left, right)?,
            (Some(lsel), rsel) => {
                let left_cols = key_positions(lsel, left)?;
                let right_cols = match rsel {
                    Some(rsel) => key_positions(rsel, right)?,
                    None => left_cols.clone(),
                };
                (left_cols, right_cols)
            }
        };

        let out = crate::merge::merge(env.cluster(), left, right, &left_cols, &right_cols, all_left)?;
        Ok(Value::Frame(out))
    }
}

fn key_positions(sel: &Value, frame: &Frame) -> Result<Vec<usize>> {
    let list = selection(sel, "Key column")?;
    check_bounds(&list, frame.num_columns() as u64, "Key column")?;
    Ok(list.expand().into_iter().map(|v| v as usize).collect())
}

/// Positions of the columns named the same on both sides, in left order.
fn shared_columns(left: &Frame, right: &Frame) -> Result<(Vec<usize>, Vec<usize>)> {
    let (left_cols, right_cols): (Vec<_>, Vec<_>) = left
        .names()
        .iter()
        .enumerate()
        .filter_map(|(lidx, name)| right.find(name).map(|ridx| (lidx, ridx)))
        .unzip();

    if left_cols.is_empty() {
        return Err(DbError::validation("Frames share no column names to merge on")
            .with_field("left", left.names().join(","))
            .with_field("right", right.names().join(",")));
    }
    Ok((left_cols, right_cols))
}
