use std::sync::Arc;

use strata_error::{DbError, Result};
use tracing::trace;

use super::{Prim, check_bounds, selection};
use crate::arrays::datatype::ColumnType;
use crate::cluster::Cluster;
use crate::cluster::futures::Futures;
use crate::cluster::key::Key;
use crate::column::Column;
use crate::column::appendable::AppendableColumn;
use crate::frame::Frame;
use crate::rangelist::RangeList;
use crate::rapids::env::Env;
use crate::rapids::value::Value;

/// `(rows frame sel)`
///
/// Selects rows by a number list, a single row number, or a one column
/// frame whose non-zero rows are kept.
#[derive(Debug, Clone, Copy)]
pub struct RowSlice;

impl Prim for RowSlice {
    fn name(&self) -> &'static str {
        "rows"
    }

    fn arity(&self) -> (usize, Option<usize>) {
        (2, Some(2))
    }

    fn apply(&self, env: &mut Env<'_>, args: &mut [Value]) -> Result<Value> {
        let frame = match &args[0] {
            Value::Frame(frame) => frame,
            other => return Err(Env::not_a("a frame to select rows from", other)),
        };

        let out = match &args[1] {
            Value::Frame(pred) => slice_by_predicate(env.cluster(), frame, pred)?,
            sel => {
                let list = selection(sel, "Row")?;
                check_bounds(&list, frame.num_rows(), "Row")?;
                slice_rows(env.cluster(), frame, &list)?
            }
        };
        Ok(Value::Frame(out))
    }
}

/// Copy the rows of `frame` listed in `rows` into new columns.
///
/// Each source chunk is scanned only over the part of the selection that
/// falls inside it.
pub fn slice_rows(cluster: &Cluster, frame: &Frame, rows: &RangeList) -> Result<Frame> {
    let Some(layout) = frame.layout() else {
        return Ok(Frame::empty());
    };

    let builders: Vec<_> = frame
        .columns()
        .iter()
        .map(|column| {
            let builder = AppendableColumn::new(cluster, Key::random_column(), column.column_type());
            builder.set_domain(column.domain().map(Arc::from));
            builder
        })
        .collect();

    let fs = Futures::new();
    cluster.map_chunks(layout.num_chunks(), |cidx| {
        let start = layout.chunk_start(cidx);
        let end = start + layout.chunk_len(cidx) as u64;

        for (column, builder) in frame.columns().iter().zip(&builders) {
            let chunk = column.chunk(cluster, cidx)?;
            let mut out = builder.chunk_builder();
            for row in rows.values_in(start as f64, end as f64) {
                out.add_from_chunk(&chunk, (row as u64 - start) as usize)?;
            }
            builder.append_chunk(cluster, cidx, out, &fs)?;
        }
        Ok(())
    })?;

    let columns = builders
        .iter()
        .map(|builder| builder.close(cluster, &fs))
        .collect::<Result<Vec<_>>>()?;

    trace!(rows = rows.count(), columns = columns.len(), "sliced rows");
    Frame::try_new(frame.names().to_vec(), columns)
}

/// Keep the rows where the single column of `pred` is non-zero and present.
pub fn slice_by_predicate(cluster: &Cluster, frame: &Frame, pred: &Frame) -> Result<Frame> {
    if pred.num_columns() != 1 {
        return Err(DbError::validation("Row selection frame must have exactly one column")
            .with_field("columns", pred.num_columns()));
    }
    if pred.num_rows() != frame.num_rows() {
        return Err(DbError::validation("Row selection frame must have as many rows as the frame")
            .with_field("selection_rows", pred.num_rows())
            .with_field("frame_rows", frame.num_rows()));
    }

    let rows = selected_rows(cluster, pred.column(0))?;
    if frame.num_columns() == 0 {
        let fs = Futures::new();
        rows.remove(cluster, &fs);
        fs.block_for_pending()?;
        return Ok(Frame::empty());
    }

    // Read through a view, then materialize so the result owns its data.
    let view = frame.subset_view(cluster, rows)?;
    let out = view.deep_copy(cluster)?;

    let fs = Futures::new();
    view.delete(cluster, &fs);
    fs.block_for_pending()?;

    Ok(out)
}

/// Row numbers of the non-zero, non-missing values of `pred`.
fn selected_rows(cluster: &Cluster, pred: &Column) -> Result<Arc<Column>> {
    let builder = AppendableColumn::new(cluster, Key::random_column(), ColumnType::Numeric);
    let layout = pred.layout();

    let fs = Futures::new();
    cluster.map_chunks(pred.num_chunks(), |cidx| {
        let chunk = pred.chunk(cluster, cidx)?;
        let start = layout.chunk_start(cidx);

        let mut out = builder.chunk_builder();
        let mut from = 0;
        while let Some(idx) = chunk.next_non_zero(from) {
            if !chunk.is_missing(idx) {
                out.add_int((start + idx as u64) as i64)?;
            }
            from = idx + 1;
        }
        builder.append_chunk(cluster, cidx, out, &fs)
    })?;

    builder.close(cluster, &fs)
}
