use std::sync::Arc;

use strata_error::Result;

use super::Prim;
use crate::arrays::datatype::ColumnType;
use crate::cluster::Cluster;
use crate::cluster::futures::Futures;
use crate::cluster::key::{Key, KeyKind};
use crate::cluster::store::StoreValue;
use crate::column::appendable::AppendableColumn;
use crate::frame::Frame;
use crate::rapids::env::Env;
use crate::rapids::value::Value;

/// `(ls)`
#[derive(Debug, Clone, Copy)]
pub struct Ls;

impl Prim for Ls {
    fn name(&self) -> &'static str {
        "ls"
    }

    fn arity(&self) -> (usize, Option<usize>) {
        (0, Some(0))
    }

    fn apply(&self, env: &mut Env<'_>, _args: &mut [Value]) -> Result<Value> {
        Ok(Value::Frame(list_frames(env.cluster())?))
    }
}

/// One categorical column `key` naming every frame in the store, sorted.
pub fn list_frames(cluster: &Cluster) -> Result<Frame> {
    let mut names: Vec<String> = cluster
        .store()
        .keys()
        .into_iter()
        .filter(|key| key.kind() == KeyKind::User)
        .filter(|key| matches!(cluster.get(key), Some(StoreValue::Frame(_))))
        .map(|key| key.name().to_string())
        .collect();
    names.sort();

    let builder = AppendableColumn::new(cluster, Key::random_column(), ColumnType::Categorical);
    let mut chunk = builder.chunk_builder();
    for code in 0..names.len() {
        chunk.add_int(code as i64)?;
    }
    builder.set_domain(Some(Arc::from(names)));

    let fs = Futures::new();
    builder.append_chunk(cluster, 0, chunk, &fs)?;
    let column = builder.close(cluster, &fs)?;

    Frame::try_new(vec!["key".to_string()], vec![column])
}
