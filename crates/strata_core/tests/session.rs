use strata_core::arrays::scalar::ScalarValue;
use strata_core::cluster::key::Key;
use strata_core::frame::Frame;
use strata_core::rapids::value::Value;
use strata_core::session::{Session, SessionStatus};
use strata_core::testutil::{column_values, frame_from_columns, numeric_column, test_cluster};
use strata_error::DbErrorKind;

fn ints(values: &[i64]) -> Vec<ScalarValue> {
    values.iter().map(|v| ScalarValue::Int64(*v)).collect()
}

fn frame(value: &Value) -> &Frame {
    value.as_frame().unwrap()
}

#[test]
fn write_through_temp_copies_global_once() {
    logutil::init_test();
    let cluster = test_cluster();
    let session = Session::new(cluster.clone());

    let a = frame_from_columns(&["x"], vec![numeric_column(&cluster, &[&[0.0, 0.0], &[0.0, 0.0]]).unwrap()]).unwrap();
    let a = session.assign("a", a).unwrap();
    let a_col = a.column(0).key().clone();

    // Writing into a global goes to a private copy.
    let b = session.exec("(tmp= b (rows= a 5 [0]))").unwrap();
    let b_col = frame(&b).column(0).key().clone();
    assert_ne!(a_col, b_col);
    assert_eq!(ints(&[0, 0, 0, 0]), column_values(&cluster, a.column(0)).unwrap());
    assert_eq!(ints(&[5, 0, 0, 0]), column_values(&cluster, frame(&b).column(0)).unwrap());
    session.release(&b).unwrap();

    // The temp is the only holder now, so it is written in place.
    let again = session.exec("(rows= b 7 [1])").unwrap();
    assert_eq!(&b_col, frame(&again).column(0).key());
    assert_eq!(ints(&[5, 7, 0, 0]), column_values(&cluster, frame(&again).column(0)).unwrap());

    // A returned value still holds a reference, the next write must copy.
    let copied = session.exec("(rows= b 9 [2])").unwrap();
    assert_ne!(&b_col, frame(&copied).column(0).key());
    assert_eq!(ints(&[5, 7, 0, 0]), column_values(&cluster, frame(&again).column(0)).unwrap());
    assert_eq!(ints(&[5, 7, 9, 0]), column_values(&cluster, frame(&copied).column(0)).unwrap());

    assert_eq!(None, session.sanity_check_refs(None));
    session.end(None).unwrap();
    assert_eq!(SessionStatus::Ended, session.status());

    assert!(!cluster.store().contains(&Key::user("b")));
    assert!(!cluster.store().contains(&b_col));
    assert!(cluster.store().contains(&Key::user("a")));
    assert!(cluster.store().contains(&a_col));
}

#[test]
fn column_slice_shares_until_written() {
    let cluster = test_cluster();
    let session = Session::new(cluster.clone());

    let a = frame_from_columns(
        &["x", "y"],
        vec![
            numeric_column(&cluster, &[&[1.0, 2.0]]).unwrap(),
            numeric_column(&cluster, &[&[3.0, 4.0]]).unwrap(),
        ],
    )
    .unwrap();
    let a = session.assign("a", a).unwrap();

    let keys_before = cluster.store().keys().len();
    let view = session.exec("(cols a [1])").unwrap();
    assert_eq!(a.column(1).key(), frame(&view).column(0).key());
    assert_eq!(keys_before, cluster.store().keys().len());
    session.release(&view).unwrap();

    let c = session.exec("(tmp= c (cols a \"y\"))").unwrap();
    session.release(&c).unwrap();
    let written = session.exec("(rows= c 0 [0])").unwrap();
    assert_ne!(a.column(1).key(), frame(&written).column(0).key());
    assert_eq!(ints(&[3, 4]), column_values(&cluster, a.column(1)).unwrap());
    session.release(&written).unwrap();

    // The temp was repointed at the copy.
    let c = session.exec("c").unwrap();
    assert_eq!(ints(&[0, 4]), column_values(&cluster, frame(&c).column(0)).unwrap());

    let out = session.end(Some(c)).unwrap().unwrap();
    assert_eq!(ints(&[0, 4]), column_values(&cluster, frame(&out).column(0)).unwrap());
}

#[test]
fn returned_global_columns_are_copied_on_end() {
    let cluster = test_cluster();
    let session = Session::new(cluster.clone());
    let a = frame_from_columns(&["x"], vec![numeric_column(&cluster, &[&[1.0]]).unwrap()]).unwrap();
    let a = session.assign("a", a).unwrap();

    let value = session.exec("a").unwrap();
    let out = session.end(Some(value)).unwrap().unwrap();
    assert_ne!(a.column(0).key(), frame(&out).column(0).key());
    assert_eq!(ints(&[1]), column_values(&cluster, frame(&out).column(0)).unwrap());
}

#[test]
fn failed_op_releases_arguments() {
    let cluster = test_cluster();
    let session = Session::new(cluster.clone());
    let a = frame_from_columns(&["x"], vec![numeric_column(&cluster, &[&[1.0, 2.0]]).unwrap()]).unwrap();
    session.assign("a", a).unwrap();

    let err = session.exec("(rows (cols a [0]) [7])").unwrap_err();
    assert_eq!(DbErrorKind::Bounds, err.kind());
    assert_eq!(Some("rows"), err.get_field("op"));
    assert_eq!(None, session.sanity_check_refs(None));

    let err = session.exec("(rowz a [0])").unwrap_err();
    assert_eq!(Some("rows"), err.get_field("did you mean"));

    let tmp = session.exec("(tmp= t (cols a [0]))").unwrap();
    session.release(&tmp).unwrap();
    let err = session.end_quietly(err);
    assert_eq!(DbErrorKind::Validation, err.kind());
    assert_eq!(SessionStatus::Aborted, session.status());
    assert!(!cluster.store().contains(&Key::user("t")));

    session.exec("a").unwrap_err();
}
