use strata_error::Result;

use super::{Prim, check_bounds, selection};
use crate::frame::Frame;
use crate::rapids::env::Env;
use crate::rapids::value::Value;

/// `(cols frame sel)`
///
/// Selects columns by position or name. The result shares the selected
/// columns with the input, nothing is copied.
#[derive(Debug, Clone, Copy)]
pub struct ColSlice;

impl Prim for ColSlice {
    fn name(&self) -> &'static str {
        "cols"
    }

    fn arity(&self) -> (usize, Option<usize>) {
        (2, Some(2))
    }

    fn apply(&self, _env: &mut Env<'_>, args: &mut [Value]) -> Result<Value> {
        let frame = match &args[0] {
            Value::Frame(frame) => frame,
            other => return Err(Env::not_a("a frame to select columns from", other)),
        };

        let indices: Vec<usize> = match &args[1] {
            Value::Str(name) => vec![frame.find_required(name)?],
            sel => {
                let list = selection(sel, "Column")?;
                check_bounds(&list, frame.num_columns() as u64, "Column")?;
                list.expand().into_iter().map(|v| v as usize).collect()
            }
        };

        let mut out = Frame::empty();
        for idx in indices {
            out.add(frame.names()[idx].clone(), frame.column(idx).clone())?;
        }
        Ok(Value::Frame(out))
    }
}
