use std::sync::Arc;

use strata_error::{DbError, OptionExt, Result};

use crate::cluster::Cluster;
use crate::cluster::futures::Futures;
use crate::cluster::key::{Key, KeyKind};
use crate::cluster::store::StoreValue;
use crate::column::Column;
use crate::column::row_layout::RowLayout;

/// Find the candidate closest to `name`, if any is close enough to be worth
/// suggesting.
pub(crate) fn similar_name<'a>(
    candidates: impl IntoIterator<Item = &'a str>,
    name: &str,
) -> Option<&'a str> {
    const SIMILARITY_THRESHOLD: f64 = 0.7;

    let mut best: Option<(f64, &str)> = None;
    for candidate in candidates {
        let score = strsim::jaro(candidate, name);
        if score > SIMILARITY_THRESHOLD && best.is_none_or(|(best, _)| score > best) {
            best = Some((score, candidate));
        }
    }
    best.map(|(_, candidate)| candidate)
}

/// Ordered collection of named columns sharing one row layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    key: Option<Key>,
    names: Vec<String>,
    columns: Vec<Arc<Column>>,
}

impl Frame {
    pub fn empty() -> Self {
        Frame {
            key: None,
            names: Vec::new(),
            columns: Vec::new(),
        }
    }

    pub fn try_new(names: Vec<String>, columns: Vec<Arc<Column>>) -> Result<Self> {
        if names.len() != columns.len() {
            return Err(DbError::validation("Number of names does not match number of columns")
                .with_field("names", names.len())
                .with_field("columns", columns.len()));
        }

        let mut frame = Frame::empty();
        for (name, column) in names.into_iter().zip(columns) {
            frame.add(name, column)?;
        }
        Ok(frame)
    }

    /// Load a frame from the store.
    pub fn load(cluster: &Cluster, key: &Key) -> Result<Frame> {
        match cluster.get(key) {
            Some(value) => value.try_into_frame(),
            None => {
                let keys = cluster.store().keys();
                let user_keys = keys.iter().filter(|k| k.kind() == KeyKind::User).map(|k| k.name());

                let mut err = DbError::validation(format!("Frame '{key}' not found"));
                if let Some(similar) = similar_name(user_keys, key.name()) {
                    err = err.with_field("did you mean", similar.to_string());
                }
                Err(err)
            }
        }
    }

    pub fn with_key(mut self, key: Key) -> Self {
        self.key = Some(key);
        self
    }

    pub fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    /// Put the frame in the store under its key.
    pub fn publish(&self, cluster: &Cluster) -> Result<()> {
        let key = self.key.clone().required("Cannot publish a frame without a key")?;
        cluster.put(key, StoreValue::Frame(self.clone()));
        Ok(())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn columns(&self) -> &[Arc<Column>] {
        &self.columns
    }

    pub fn column(&self, idx: usize) -> &Arc<Column> {
        &self.columns[idx]
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Row count, zero for a frame without columns.
    pub fn num_rows(&self) -> u64 {
        self.columns.first().map(|c| c.num_rows()).unwrap_or(0)
    }

    pub fn layout(&self) -> Option<&Arc<RowLayout>> {
        self.columns.first().map(|c| c.layout())
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Like `find`, but errors with a suggestion when the name is missing.
    pub fn find_required(&self, name: &str) -> Result<usize> {
        self.find(name).ok_or_else(|| {
            let mut err = DbError::validation(format!("Column '{name}' not found"));
            if let Some(similar) = similar_name(self.names.iter().map(|n| n.as_str()), name) {
                err = err.with_field("did you mean", similar.to_string());
            }
            err
        })
    }

    /// Append a column. Its chunking must match the frame's.
    pub fn add(&mut self, name: impl Into<String>, column: Arc<Column>) -> Result<()> {
        let name = name.into();
        if let Some(layout) = self.layout() {
            if !layout.is_compatible(column.layout()) {
                return Err(DbError::validation("Column chunking does not match frame")
                    .with_field("column", name)
                    .with_field("frame_rows", layout.num_rows())
                    .with_field("column_rows", column.num_rows()));
            }
        }
        self.names.push(name);
        self.columns.push(column);
        Ok(())
    }

    /// Swap the column at `idx`, returning the old one.
    pub fn replace_column(&mut self, idx: usize, column: Arc<Column>) -> Result<Arc<Column>> {
        let old = self.columns.get(idx).ok_or_else(|| {
            DbError::bounds("Column index out of range")
                .with_field("index", idx)
                .with_field("num_columns", self.columns.len())
        })?;
        if !old.layout().is_compatible(column.layout()) {
            return Err(DbError::validation("Replacement column chunking does not match frame")
                .with_field("column", &self.names[idx]));
        }
        Ok(std::mem::replace(&mut self.columns[idx], column))
    }

    /// Frame of views selecting `rows` from every column.
    ///
    /// `rows` is owned by the first view; the others get their own copies.
    pub fn subset_view(&self, cluster: &Cluster, rows: Arc<Column>) -> Result<Frame> {
        let mut view = Frame::empty();
        for (idx, (name, column)) in self.names.iter().zip(&self.columns).enumerate() {
            let rows = if idx == 0 { rows.clone() } else { rows.deep_copy(cluster)? };
            view.add(name.clone(), Column::new_subset(cluster, column, &rows)?)?;
        }
        Ok(view)
    }

    /// Copy every column. The copy has no key.
    pub fn deep_copy(&self, cluster: &Cluster) -> Result<Frame> {
        let columns = self
            .columns
            .iter()
            .map(|c| c.deep_copy(cluster))
            .collect::<Result<Vec<_>>>()?;
        Frame::try_new(self.names.clone(), columns)
    }

    /// Remove the frame's key and all of its columns from the store.
    pub fn delete(&self, cluster: &Cluster, fs: &Futures) {
        for column in &self.columns {
            column.remove(cluster, fs);
        }
        if let Some(key) = &self.key {
            cluster.remove_deferred(key.clone(), fs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::scalar::ScalarValue;
    use crate::testutil::{frame_values, numeric_column, str_column, test_cluster};

    #[test]
    fn mismatched_layouts_rejected() {
        let cluster = test_cluster();
        let a = numeric_column(&cluster, &[&[1.0, 2.0]]).unwrap();
        let b = numeric_column(&cluster, &[&[1.0], &[2.0]]).unwrap();

        Frame::try_new(vec!["a".into(), "b".into()], vec![a, b]).unwrap_err();
    }

    #[test]
    fn find_with_suggestion() {
        let cluster = test_cluster();
        let a = numeric_column(&cluster, &[&[1.0]]).unwrap();
        let frame = Frame::try_new(vec!["price".into()], vec![a]).unwrap();

        assert_eq!(0, frame.find_required("price").unwrap());
        let err = frame.find_required("prices").unwrap_err();
        assert_eq!(Some("price"), err.get_field("did you mean"));
    }

    #[test]
    fn subset_view_reads_master_rows() {
        let cluster = test_cluster();
        let a = numeric_column(&cluster, &[&[10.0, 11.0], &[12.0]]).unwrap();
        let b = str_column(&cluster, &[&[Some("x"), None], &[Some("z")]]).unwrap();
        let frame = Frame::try_new(vec!["a".into(), "b".into()], vec![a, b]).unwrap();

        let rows = numeric_column(&cluster, &[&[2.0, 0.0]]).unwrap();
        let view = frame.subset_view(&cluster, rows).unwrap();
        assert!(view.column(0).is_read_only());

        assert_eq!(
            vec![
                vec![ScalarValue::Int64(12), ScalarValue::from("z")],
                vec![ScalarValue::Int64(10), ScalarValue::from("x")],
            ],
            frame_values(&cluster, &view).unwrap()
        );

        let copy = view.deep_copy(&cluster).unwrap();
        assert!(!copy.column(1).is_read_only());

        let fs = Futures::new();
        view.delete(&cluster, &fs);
        fs.block_for_pending().unwrap();
        assert_eq!(
            frame_values(&cluster, &copy).unwrap(),
            vec![
                vec![ScalarValue::Int64(12), ScalarValue::from("z")],
                vec![ScalarValue::Int64(10), ScalarValue::from("x")],
            ]
        );
    }
}
