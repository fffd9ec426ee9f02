use std::sync::Arc;

use strata_error::{DbError, Result};

use super::Prim;
use crate::arrays::datatype::ColumnType;
use crate::arrays::scalar::ScalarValue;
use crate::cluster::Cluster;
use crate::column::Column;
use crate::column::row_layout::RowLayout;
use crate::frame::Frame;
use crate::rapids::env::Env;
use crate::rapids::value::Value;

/// `(cbind arg*)`
#[derive(Debug, Clone, Copy)]
pub struct ColumnBind;

impl Prim for ColumnBind {
    fn name(&self) -> &'static str {
        "cbind"
    }

    fn arity(&self) -> (usize, Option<usize>) {
        (1, None)
    }

    fn apply(&self, env: &mut Env<'_>, args: &mut [Value]) -> Result<Value> {
        let parts = args
            .iter()
            .map(|arg| match arg {
                Value::Frame(frame) => Ok(BindPart::Frame(frame)),
                Value::Num(v) => Ok(BindPart::Scalar(*v)),
                other => Err(Env::not_a("a frame or number to bind", other)),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Value::Frame(column_bind(env.cluster(), &parts)?))
    }
}

#[derive(Debug, Clone, Copy)]
pub enum BindPart<'a> {
    Frame(&'a Frame),
    /// Broadcast to a constant column named after the value.
    Scalar(f64),
}

/// Concatenate frames and scalars column-wise.
///
/// Frame columns are shared with the inputs. Frames without columns are
/// ignored.
pub fn column_bind(cluster: &Cluster, parts: &[BindPart<'_>]) -> Result<Frame> {
    let layout = bind_layout(cluster, parts)?;

    let mut out = Frame::empty();
    for part in parts {
        match part {
            BindPart::Frame(frame) => {
                for (name, column) in frame.names().iter().zip(frame.columns()) {
                    out.add(name.clone(), column.clone())?;
                }
            }
            BindPart::Scalar(v) => {
                let column =
                    Column::new_constant(cluster, ScalarValue::from(*v), ColumnType::Numeric, layout.clone())?;
                out.add(format!("{v}"), column)?;
            }
        }
    }
    Ok(out)
}

/// Layout shared by every frame argument, or a single row if there are none.
fn bind_layout(cluster: &Cluster, parts: &[BindPart<'_>]) -> Result<Arc<RowLayout>> {
    let mut first: Option<&Arc<RowLayout>> = None;
    for part in parts {
        let BindPart::Frame(frame) = part else {
            continue;
        };
        let Some(layout) = frame.layout() else {
            continue;
        };
        match first {
            None => first = Some(layout),
            Some(first) if first.num_rows() != layout.num_rows() => {
                return Err(DbError::validation(format!(
                    "cbind frames must have all the same rows, found {} and {} rows",
                    first.num_rows(),
                    layout.num_rows()
                )));
            }
            Some(first) if !first.is_compatible(layout) => {
                return Err(DbError::unsupported("cbind frames with the same rows must share chunking")
                    .with_field("rows", layout.num_rows()));
            }
            Some(_) => (),
        }
    }

    match first {
        Some(layout) => Ok(layout.clone()),
        None => cluster.layouts().intern_lens(&[1]),
    }
}
