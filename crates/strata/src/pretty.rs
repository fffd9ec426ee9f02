//! Plain text rendering of frames.

use std::io::Write;

use chrono::DateTime;
use strata_core::arrays::datatype::ColumnType;
use strata_core::arrays::scalar::ScalarValue;
use strata_core::cluster::Cluster;
use strata_core::column::Column;
use strata_core::column::reader::ColumnReader;
use strata_core::frame::Frame;
use strata_error::Result;

const MAX_ROWS: u64 = 20;

/// Display a value the way its column type reads. Categoricals print their
/// level, times print as UTC timestamps from epoch milliseconds.
fn render(column: &Column, value: ScalarValue) -> String {
    match (column.column_type(), &value) {
        (_, ScalarValue::Null) => "NA".to_string(),
        (ColumnType::Categorical, ScalarValue::Int64(code)) => column
            .domain()
            .and_then(|domain| usize::try_from(*code).ok().and_then(|code| domain.get(code)))
            .cloned()
            .unwrap_or_else(|| value.to_string()),
        (ColumnType::Time, ScalarValue::Int64(millis)) => DateTime::from_timestamp_millis(*millis)
            .map(|ts| ts.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
            .unwrap_or_else(|| value.to_string()),
        _ => value.to_string(),
    }
}

pub fn write_frame(out: &mut impl Write, cluster: &Cluster, frame: &Frame) -> Result<()> {
    let shown = frame.num_rows().min(MAX_ROWS);

    let mut cells: Vec<Vec<String>> = Vec::with_capacity(frame.num_columns());
    for (name, column) in frame.names().iter().zip(frame.columns()) {
        let mut reader = ColumnReader::new(cluster, column);
        let mut col = vec![name.clone()];
        for row in 0..shown {
            col.push(render(column, reader.get(row)?));
        }
        cells.push(col);
    }

    let widths: Vec<usize> = cells
        .iter()
        .map(|col| col.iter().map(|c| c.chars().count()).max().unwrap_or(0))
        .collect();

    for line in 0..=shown as usize {
        let row: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(col, width)| format!("{:>width$}", col[line], width = width))
            .collect();
        writeln!(out, "{}", row.join("  "))?;
        if line == 0 {
            let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
            writeln!(out, "{}", rule.join("  "))?;
        }
    }

    if frame.num_rows() > shown {
        writeln!(out, "... {} more rows", frame.num_rows() - shown)?;
    }
    writeln!(out, "({} rows x {} columns)", frame.num_rows(), frame.num_columns())?;
    Ok(())
}
