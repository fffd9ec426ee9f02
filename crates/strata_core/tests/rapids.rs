use strata_core::arrays::datatype::ColumnType;
use strata_core::arrays::scalar::ScalarValue;
use strata_core::rapids::value::Value;
use strata_core::session::Session;
use strata_core::testutil::{column_values, frame_from_columns, frame_values, numeric_column, str_column, test_cluster};

fn s(v: &str) -> ScalarValue {
    ScalarValue::from(v)
}

fn setup() -> Session {
    let cluster = test_cluster();
    let session = Session::new(cluster.clone());

    let left = frame_from_columns(
        &["id", "name"],
        vec![
            numeric_column(&cluster, &[&[1.0, 2.0], &[3.0]]).unwrap(),
            str_column(&cluster, &[&[Some("a"), Some("b")], &[Some("c")]]).unwrap(),
        ],
    )
    .unwrap();
    let right = frame_from_columns(
        &["id", "tag"],
        vec![
            numeric_column(&cluster, &[&[2.0, 3.0, 4.0]]).unwrap(),
            str_column(&cluster, &[&[Some("X"), Some("Y"), Some("Z")]]).unwrap(),
        ],
    )
    .unwrap();
    let flags = frame_from_columns(&["f"], vec![numeric_column(&cluster, &[&[1.0, 0.0], &[1.0]]).unwrap()]).unwrap();

    session.assign("left", left).unwrap();
    session.assign("right", right).unwrap();
    session.assign("flags", flags).unwrap();
    session
}

fn exec_values(session: &Session, expr: &str) -> Vec<Vec<ScalarValue>> {
    let value = session.exec(expr).unwrap();
    let rows = frame_values(session.cluster(), value.as_frame().unwrap()).unwrap();
    session.release(&value).unwrap();
    rows
}

#[test]
fn merge_by_positions_and_names() {
    let session = setup();

    let joined = session.exec("(merge left right TRUE [0] [0])").unwrap();
    let frame = joined.as_frame().unwrap();
    assert_eq!("right_joined_with_left", frame.key().unwrap().name());
    assert_eq!(
        vec![
            vec![ScalarValue::Int64(1), s("a"), ScalarValue::Null],
            vec![ScalarValue::Int64(2), s("b"), s("X")],
            vec![ScalarValue::Int64(3), s("c"), s("Y")],
        ],
        frame_values(session.cluster(), frame).unwrap()
    );
    session.release(&joined).unwrap();

    assert_eq!(
        vec![
            vec![ScalarValue::Int64(2), s("b"), s("X")],
            vec![ScalarValue::Int64(3), s("c"), s("Y")],
        ],
        exec_values(&session, "(merge left right 0)")
    );

    assert_eq!(None, session.sanity_check_refs(None));
    session.end(None).unwrap();
}

#[test]
fn slicing_and_binding() {
    let session = setup();

    assert_eq!(
        vec![vec![s("b")], vec![s("c")]],
        exec_values(&session, "(cols (rows left [1:2]) [1])")
    );
    assert_eq!(
        vec![vec![ScalarValue::Int64(1), s("a")], vec![ScalarValue::Int64(3), s("c")]],
        exec_values(&session, "(rows left (cols flags 0))")
    );
    assert_eq!(
        vec![
            vec![s("a"), ScalarValue::Float64(2.5)],
            vec![s("b"), ScalarValue::Float64(2.5)],
            vec![s("c"), ScalarValue::Float64(2.5)],
        ],
        exec_values(&session, "(cbind (cols left \"name\") 2.5)")
    );

    let err = session.exec("(cbind left (rows right [0:2]))").unwrap_err();
    assert_eq!("cbind frames must have all the same rows, found 3 and 2 rows", err.get_msg());

    assert_eq!(None, session.sanity_check_refs(None));
    session.end(None).unwrap();
}

#[test]
fn temps_globals_and_listing() {
    let session = setup();

    let listed = session.exec("(ls)").unwrap();
    let column = listed.as_frame().unwrap().column(0).clone();
    assert_eq!(ColumnType::Categorical, column.column_type());
    assert_eq!(Some(&["flags".to_string(), "left".to_string(), "right".to_string()][..]), column.domain());
    session.release(&listed).unwrap();

    let tmp = session.exec("(tmp= j (merge left right 0))").unwrap();
    session.release(&tmp).unwrap();
    let global = session.exec("(assign both (cbind j 1))").unwrap();
    session.release(&global).unwrap();

    let listed = session.exec("(ls)").unwrap();
    let column = listed.as_frame().unwrap().column(0).clone();
    assert_eq!(
        Some(
            &[
                "both".to_string(),
                "flags".to_string(),
                "j".to_string(),
                "left".to_string(),
                "right".to_string(),
            ][..]
        ),
        column.domain()
    );
    session.release(&listed).unwrap();

    // A temp cannot shadow a global, nor a global replace a temp.
    session.exec("(tmp= left (cols right [0]))").unwrap_err();
    session.exec("(assign j (cols right [0]))").unwrap_err();

    assert_eq!(Value::Num(0.0), session.exec("(rm j)").unwrap());
    session.end(None).unwrap();

    // Globals outlive the session, temps do not.
    let cluster = session.cluster().clone();
    let after = Session::new(cluster.clone());
    let listed = after.exec("(ls)").unwrap();
    let column = listed.as_frame().unwrap().column(0).clone();
    assert_eq!(
        Some(&["both".to_string(), "flags".to_string(), "left".to_string(), "right".to_string()][..]),
        column.domain()
    );
    assert_eq!(
        vec![ScalarValue::Int64(0), ScalarValue::Int64(1), ScalarValue::Int64(2), ScalarValue::Int64(3)],
        column_values(&cluster, &column).unwrap()
    );

    let both = after.exec("both").unwrap();
    assert_eq!(&["id", "name", "tag", "1"], both.as_frame().unwrap().names());
    after.end(None).unwrap();
}
