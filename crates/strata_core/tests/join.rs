use std::sync::Arc;

use strata_core::arrays::datatype::ColumnType;
use strata_core::arrays::scalar::ScalarValue;
use strata_core::cluster::Cluster;
use strata_core::cluster::key::{Key, KeyKind};
use strata_core::column::Column;
use strata_core::merge::merge;
use strata_core::testutil::{
    column_from_scalars, frame_from_columns, frame_values, numeric_column, str_column, test_cluster,
};
use strata_error::DbErrorKind;

fn s(v: &str) -> ScalarValue {
    ScalarValue::from(v)
}

fn ints(cluster: &Cluster, values: &[i64]) -> Arc<Column> {
    let values = values.iter().map(|v| ScalarValue::Int64(*v)).collect();
    column_from_scalars(cluster, ColumnType::Numeric, &[values]).unwrap()
}

#[test]
fn inner_and_left_outer() {
    logutil::init_test();
    let cluster = test_cluster();

    let left = frame_from_columns(
        &["id", "name"],
        vec![
            numeric_column(&cluster, &[&[1.0, 2.0], &[3.0]]).unwrap(),
            str_column(&cluster, &[&[Some("a"), Some("b")], &[Some("c")]]).unwrap(),
        ],
    )
    .unwrap()
    .with_key(Key::user("people"));
    let right = frame_from_columns(
        &["id", "tag"],
        vec![
            numeric_column(&cluster, &[&[2.0, 3.0, 4.0]]).unwrap(),
            str_column(&cluster, &[&[Some("X"), Some("Y"), Some("Z")]]).unwrap(),
        ],
    )
    .unwrap()
    .with_key(Key::user("tags"));

    let inner = merge(&cluster, &left, &right, &[0], &[0], false).unwrap();
    assert_eq!(&["id", "name", "tag"], inner.names());
    assert_eq!("tags_joined_with_people", inner.key().unwrap().name());
    // Named, but left to the caller to publish.
    assert!(!cluster.store().contains(inner.key().unwrap()));
    assert_eq!(
        vec![
            vec![ScalarValue::Int64(2), s("b"), s("X")],
            vec![ScalarValue::Int64(3), s("c"), s("Y")],
        ],
        frame_values(&cluster, &inner).unwrap()
    );

    let outer = merge(&cluster, &left, &right, &[0], &[0], true).unwrap();
    assert_eq!(
        vec![
            vec![ScalarValue::Int64(1), s("a"), ScalarValue::Null],
            vec![ScalarValue::Int64(2), s("b"), s("X")],
            vec![ScalarValue::Int64(3), s("c"), s("Y")],
        ],
        frame_values(&cluster, &outer).unwrap()
    );

    // Nothing from the join is left behind apart from the output columns.
    assert!(cluster.store().keys().iter().all(|k| k.kind() != KeyKind::Internal));
}

#[test]
fn duplicate_keys_multiply() {
    let cluster = test_cluster();
    let left = frame_from_columns(
        &["k", "l"],
        vec![
            numeric_column(&cluster, &[&[5.0, 5.0, 6.0]]).unwrap(),
            numeric_column(&cluster, &[&[0.0, 1.0, 2.0]]).unwrap(),
        ],
    )
    .unwrap();
    let right = frame_from_columns(
        &["k", "r"],
        vec![
            numeric_column(&cluster, &[&[5.0, 5.0]]).unwrap(),
            numeric_column(&cluster, &[&[10.0, 20.0]]).unwrap(),
        ],
    )
    .unwrap();

    let out = merge(&cluster, &left, &right, &[0], &[0], false).unwrap();
    assert_eq!(4, out.num_rows());
    let rows = frame_values(&cluster, &out).unwrap();
    // Left row order is kept within equal keys.
    assert_eq!(ScalarValue::Int64(0), rows[0][1]);
    assert_eq!(ScalarValue::Int64(0), rows[1][1]);
    assert_eq!(ScalarValue::Int64(1), rows[2][1]);
    assert_eq!(ScalarValue::Int64(1), rows[3][1]);
}

#[test]
fn left_keys_wider_than_right() {
    let cluster = test_cluster();
    // Left keys need more bits than right keys, so one left bucket covers
    // many right buckets and most left buckets are past the right's range.
    let left_keys: Vec<f64> = (0..50).map(|v| (v * 1000) as f64).collect();
    let left = frame_from_columns(&["k"], vec![numeric_column(&cluster, &[&left_keys]).unwrap()]).unwrap();
    let right = frame_from_columns(
        &["k", "v"],
        vec![
            numeric_column(&cluster, &[&[0.0, 2000.0, 2500.0]]).unwrap(),
            numeric_column(&cluster, &[&[1.0, 2.0, 3.0]]).unwrap(),
        ],
    )
    .unwrap();

    let inner = merge(&cluster, &left, &right, &[0], &[0], false).unwrap();
    assert_eq!(
        vec![
            vec![ScalarValue::Int64(0), ScalarValue::Int64(1)],
            vec![ScalarValue::Int64(2000), ScalarValue::Int64(2)],
        ],
        frame_values(&cluster, &inner).unwrap()
    );

    let outer = merge(&cluster, &left, &right, &[0], &[0], true).unwrap();
    assert_eq!(50, outer.num_rows());
    let rows = frame_values(&cluster, &outer).unwrap();
    let keys: Vec<_> = rows.iter().map(|r| r[0].clone()).collect();
    let expected: Vec<_> = (0..50).map(|v| ScalarValue::Int64(v * 1000)).collect();
    assert_eq!(expected, keys);
    assert_eq!(ScalarValue::Null, rows[1][1]);
    assert_eq!(ScalarValue::Int64(2), rows[2][1]);
    assert_eq!(ScalarValue::Null, rows[49][1]);
}

#[test]
fn large_integer_keys_do_not_collide() {
    let cluster = test_cluster();
    // Neighbours past 2^53 are distinct integers but the same float.
    let big = 1_i64 << 53;
    let left = frame_from_columns(&["k"], vec![ints(&cluster, &[big + 1, big + 3])]).unwrap();
    let right = frame_from_columns(&["k", "v"], vec![ints(&cluster, &[big, big + 2]), ints(&cluster, &[1, 2])]).unwrap();

    let inner = merge(&cluster, &left, &right, &[0], &[0], false).unwrap();
    assert_eq!(0, inner.num_rows());

    let right = frame_from_columns(&["k", "v"], vec![ints(&cluster, &[big, big + 1]), ints(&cluster, &[1, 2])]).unwrap();
    let outer = merge(&cluster, &left, &right, &[0], &[0], true).unwrap();
    assert_eq!(
        vec![
            vec![ScalarValue::Int64(big + 1), ScalarValue::Int64(2)],
            vec![ScalarValue::Int64(big + 3), ScalarValue::Null],
        ],
        frame_values(&cluster, &outer).unwrap()
    );
}

#[test]
fn wide_key_range_joins() {
    let cluster = test_cluster();
    // The key range spans more than i64::MAX values.
    let far = 5_000_000_000_000_000_000;
    let left = frame_from_columns(&["k"], vec![ints(&cluster, &[-far, far])]).unwrap();
    let right = frame_from_columns(&["k", "v"], vec![ints(&cluster, &[far]), ints(&cluster, &[7])]).unwrap();

    let inner = merge(&cluster, &left, &right, &[0], &[0], false).unwrap();
    assert_eq!(
        vec![vec![ScalarValue::Int64(far), ScalarValue::Int64(7)]],
        frame_values(&cluster, &inner).unwrap()
    );

    let outer = merge(&cluster, &left, &right, &[0], &[0], true).unwrap();
    assert_eq!(
        vec![
            vec![ScalarValue::Int64(-far), ScalarValue::Null],
            vec![ScalarValue::Int64(far), ScalarValue::Int64(7)],
        ],
        frame_values(&cluster, &outer).unwrap()
    );

    // Every i64 is one more value than the encoding has room for.
    let left = frame_from_columns(&["k"], vec![ints(&cluster, &[i64::MIN])]).unwrap();
    let right = frame_from_columns(&["k"], vec![ints(&cluster, &[i64::MAX])]).unwrap();
    let err = merge(&cluster, &left, &right, &[0], &[0], false).unwrap_err();
    assert_eq!(DbErrorKind::Validation, err.kind());
    assert!(cluster.store().keys().iter().all(|k| k.kind() != KeyKind::Internal));
}

#[test]
fn left_keys_many_bits_wider_than_right() {
    let cluster = test_cluster();
    // Left keys need twelve more bits than right keys, so the first left
    // bucket spans the whole right key space and then some.
    let left = frame_from_columns(&["k"], vec![ints(&cluster, &[1, 300, 1_000_000])]).unwrap();
    let right = frame_from_columns(&["k", "v"], vec![ints(&cluster, &[1, 2]), ints(&cluster, &[10, 20])]).unwrap();

    let inner = merge(&cluster, &left, &right, &[0], &[0], false).unwrap();
    assert_eq!(
        vec![vec![ScalarValue::Int64(1), ScalarValue::Int64(10)]],
        frame_values(&cluster, &inner).unwrap()
    );

    let outer = merge(&cluster, &left, &right, &[0], &[0], true).unwrap();
    assert_eq!(
        vec![
            vec![ScalarValue::Int64(1), ScalarValue::Int64(10)],
            vec![ScalarValue::Int64(300), ScalarValue::Null],
            vec![ScalarValue::Int64(1_000_000), ScalarValue::Null],
        ],
        frame_values(&cluster, &outer).unwrap()
    );
}
