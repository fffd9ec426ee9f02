use strata_error::{DbError, Result};

use super::{Prim, check_bounds, selection};
use crate::arrays::scalar::ScalarValue;
use crate::cluster::Cluster;
use crate::column::reader::ColumnReader;
use crate::frame::Frame;
use crate::rangelist::RangeList;
use crate::rapids::env::Env;
use crate::rapids::value::Value;

/// What gets written into the selected rows.
#[derive(Debug, Clone, Copy)]
pub enum RowSource<'a> {
    /// The same value in every selected row of every column.
    Scalar(f64),
    /// Row `i` of the selection takes row `i` of this frame.
    Frame(&'a Frame),
}

/// `(rows= dst src sel)`
#[derive(Debug, Clone, Copy)]
pub struct RowAssign;

impl Prim for RowAssign {
    fn name(&self) -> &'static str {
        "rows="
    }

    fn arity(&self) -> (usize, Option<usize>) {
        (3, Some(3))
    }

    fn apply(&self, env: &mut Env<'_>, args: &mut [Value]) -> Result<Value> {
        let [dst, src, sel] = args else {
            return Err(DbError::invariant("rows= expects three arguments"));
        };

        let dst = match dst {
            Value::Frame(frame) => frame,
            other => return Err(Env::not_a("a frame to assign into", other)),
        };
        let src = match &*src {
            Value::Num(v) => RowSource::Scalar(*v),
            Value::Frame(frame) => RowSource::Frame(frame),
            other => return Err(Env::not_a("a number or frame to assign from", other)),
        };
        let rows = selection(sel, "Row")?;

        check_assignment(dst, src, &rows)?;

        let cols: Vec<_> = (0..dst.num_columns()).collect();
        env.copy_on_write(dst, &cols)?;
        assign_rows(env.cluster(), dst, src, &rows)?;

        Ok(Value::Frame(dst.clone()))
    }
}

/// Validate an assignment before touching any data.
pub fn check_assignment(dst: &Frame, src: RowSource<'_>, rows: &RangeList) -> Result<()> {
    check_bounds(rows, dst.num_rows(), "Row")?;

    if let RowSource::Frame(src) = src {
        if src.num_columns() != dst.num_columns() {
            return Err(DbError::validation("Source and destination must have the same number of columns")
                .with_field("source", src.num_columns())
                .with_field("destination", dst.num_columns()));
        }
        for (idx, (s, d)) in src.columns().iter().zip(dst.columns()).enumerate() {
            if s.column_type() != d.column_type() {
                return Err(DbError::validation("Source and destination column types differ")
                    .with_field("column", &dst.names()[idx])
                    .with_field("source", s.column_type())
                    .with_field("destination", d.column_type()));
            }
        }
        if src.num_rows() != rows.count() {
            return Err(DbError::validation("Source rows must match the number of selected rows")
                .with_field("source", src.num_rows())
                .with_field("selected", rows.count()));
        }
    }

    Ok(())
}

/// Write `src` into the selected rows of `dst`.
///
/// The caller must already own every column of `dst`.
pub fn assign_rows(cluster: &Cluster, dst: &Frame, src: RowSource<'_>, rows: &RangeList) -> Result<()> {
    let scalar = |v: f64| ScalarValue::from(v);

    if rows.count() == 1 {
        let Some(row) = rows.min() else {
            return Ok(());
        };
        for (idx, column) in dst.columns().iter().enumerate() {
            let value = match src {
                RowSource::Scalar(v) => scalar(v),
                RowSource::Frame(src) => src.column(idx).get(cluster, 0)?,
            };
            column.set(cluster, row as u64, &value)?;
        }
        return Ok(());
    }

    let Some(layout) = dst.layout() else {
        return Ok(());
    };

    cluster.map_chunks(layout.num_chunks(), |cidx| {
        let start = layout.chunk_start(cidx);
        let end = start + layout.chunk_len(cidx) as u64;
        if rows.values_in(start as f64, end as f64).next().is_none() {
            return Ok(());
        }

        for (idx, column) in dst.columns().iter().enumerate() {
            let mut chunk = column.writable_chunk(cluster, cidx)?;
            let mut reader = match src {
                RowSource::Frame(src) => Some(ColumnReader::new(cluster, src.column(idx))),
                RowSource::Scalar(_) => None,
            };

            for row in rows.values_in(start as f64, end as f64) {
                let value = match (&mut reader, src) {
                    (Some(reader), _) => {
                        let rank = rows.index_of(row).ok_or_else(|| {
                            DbError::invariant("Selected row missing from selection").with_field("row", row)
                        })?;
                        reader.get(rank)?
                    }
                    (None, RowSource::Scalar(v)) => scalar(v),
                    (None, RowSource::Frame(_)) => ScalarValue::Null,
                };
                chunk.set((row as u64 - start) as usize, &value)?;
            }
            column.put_chunk(cluster, cidx, chunk)?;
        }
        Ok(())
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{column_values, frame_from_columns, numeric_column, str_column, test_cluster};

    #[test]
    fn broadcast_scalar() {
        let cluster = test_cluster();
        let dst = frame_from_columns(
            &["a"],
            vec![numeric_column(&cluster, &[&[0.0, 0.0, 0.0], &[0.0, 0.0]]).unwrap()],
        )
        .unwrap();

        let rows = RangeList::parse("[1:2:2]").unwrap();
        check_assignment(&dst, RowSource::Scalar(7.0), &rows).unwrap();
        assign_rows(&cluster, &dst, RowSource::Scalar(7.0), &rows).unwrap();

        assert_eq!(
            vec![0, 7, 0, 7, 0].into_iter().map(ScalarValue::Int64).collect::<Vec<_>>(),
            column_values(&cluster, dst.column(0)).unwrap()
        );
    }

    #[test]
    fn from_frame() {
        let cluster = test_cluster();
        let dst = frame_from_columns(
            &["a", "s"],
            vec![
                numeric_column(&cluster, &[&[0.0, 0.0], &[0.0, 0.0]]).unwrap(),
                str_column(&cluster, &[&[None, None], &[None, None]]).unwrap(),
            ],
        )
        .unwrap();
        let src = frame_from_columns(
            &["x", "y"],
            vec![
                numeric_column(&cluster, &[&[1.5, 2.0]]).unwrap(),
                str_column(&cluster, &[&[Some("p"), Some("q")]]).unwrap(),
            ],
        )
        .unwrap();

        let rows = RangeList::parse("[0,3]").unwrap();
        assign_rows(&cluster, &dst, RowSource::Frame(&src), &rows).unwrap();

        assert_eq!(
            vec![
                ScalarValue::Float64(1.5),
                ScalarValue::Float64(0.0),
                ScalarValue::Int64(0),
                ScalarValue::Int64(2),
            ],
            column_values(&cluster, dst.column(0)).unwrap()
        );
        assert_eq!(
            vec![ScalarValue::from("p"), ScalarValue::Null, ScalarValue::Null, ScalarValue::from("q")],
            column_values(&cluster, dst.column(1)).unwrap()
        );
    }

    #[test]
    fn mismatches_rejected() {
        let cluster = test_cluster();
        let dst = frame_from_columns(&["a"], vec![numeric_column(&cluster, &[&[0.0, 0.0]]).unwrap()]).unwrap();
        let strs = frame_from_columns(&["s"], vec![str_column(&cluster, &[&[Some("a")]]).unwrap()]).unwrap();
        let nums = frame_from_columns(&["n"], vec![numeric_column(&cluster, &[&[1.0]]).unwrap()]).unwrap();

        let one = RangeList::single(0.0);
        let two = RangeList::parse("[0:2]").unwrap();
        check_assignment(&dst, RowSource::Frame(&strs), &one).unwrap_err();
        check_assignment(&dst, RowSource::Frame(&nums), &two).unwrap_err();
        let err = check_assignment(&dst, RowSource::Scalar(1.0), &RangeList::single(2.0)).unwrap_err();
        assert_eq!(strata_error::DbErrorKind::Bounds, err.kind());
    }
}
