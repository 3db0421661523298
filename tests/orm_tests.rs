//! Row projection: typed conversion, nullability and cardinality rules.

use coserv::db::{Column, ColumnType, RowMap, SqlRow};
use coserv::ServiceError;
use serde_json::{json, Value};

/// Text-format row backed by a plain vector; `None` is SQL `NULL`.
struct TestRow(Vec<Option<&'static str>>);

impl SqlRow for TestRow {
    fn column_text(&self, idx: usize) -> Result<Option<&str>, ServiceError> {
        Ok(self.0.get(idx).copied().flatten())
    }

    fn width(&self) -> usize {
        self.0.len()
    }
}

fn user_map() -> RowMap {
    RowMap::new(vec![
        Column::new("id", ColumnType::Int),
        Column::new("username", ColumnType::Text),
        Column::new("is_active", ColumnType::Bool),
        Column::nullable("email", ColumnType::Text),
        Column::new("score", ColumnType::Float),
    ])
}

#[test]
fn converts_declared_types() {
    let row = TestRow(vec![
        Some("7"),
        Some("alice"),
        Some("t"),
        Some("a@example.com"),
        Some("1.5"),
    ]);
    let obj = user_map().convert_row(&row).unwrap();
    assert_eq!(Value::Object(obj), json!({
        "id": 7,
        "username": "alice",
        "is_active": true,
        "email": "a@example.com",
        "score": 1.5,
    }));
}

#[test]
fn null_in_nullable_column_becomes_json_null() {
    let row = TestRow(vec![Some("1"), Some("bob"), Some("f"), None, Some("0")]);
    let obj = user_map().convert_row(&row).unwrap();
    assert_eq!(obj.get("email"), Some(&Value::Null));
    assert_eq!(obj.get("is_active"), Some(&Value::Bool(false)));
}

#[test]
fn null_in_required_column_is_an_error() {
    let row = TestRow(vec![None, Some("bob"), Some("t"), None, Some("0")]);
    assert!(user_map().convert_row(&row).is_err());
}

#[test]
fn malformed_number_is_an_error() {
    let row = TestRow(vec![
        Some("seven"),
        Some("alice"),
        Some("t"),
        None,
        Some("0"),
    ]);
    assert!(user_map().convert_row(&row).is_err());
}

#[test]
fn bigint_width() {
    let map = RowMap::new(vec![Column::new("n", ColumnType::BigInt)]);
    let obj = map
        .convert_row(&TestRow(vec![Some("9223372036854775807")]))
        .unwrap();
    assert_eq!(obj.get("n"), Some(&Value::from(i64::MAX)));
}

#[test]
fn vector_projects_every_row() {
    let map = RowMap::new(vec![
        Column::new("id", ColumnType::Int),
        Column::new("name", ColumnType::Text),
    ]);
    let rows = vec![
        TestRow(vec![Some("1"), Some("a")]),
        TestRow(vec![Some("2"), Some("b")]),
        TestRow(vec![Some("3"), Some("c")]),
    ];
    let objs = map.convert_to_vector(&rows).unwrap();
    assert_eq!(objs.len(), 3);
    assert_eq!(objs[2].get("name"), Some(&Value::from("c")));
}

#[test]
fn optional_cardinality() {
    let map = RowMap::new(vec![Column::new("id", ColumnType::Int)]);
    let none: Vec<TestRow> = vec![];
    assert!(map.convert_to_optional(&none).unwrap().is_none());

    let one = vec![TestRow(vec![Some("1")])];
    let obj = map.convert_to_optional(&one).unwrap().expect("one row");
    assert_eq!(obj.get("id"), Some(&Value::from(1)));

    let two = vec![TestRow(vec![Some("1")]), TestRow(vec![Some("2")])];
    assert!(matches!(
        map.convert_to_optional(&two),
        Err(ServiceError::TooManyRows)
    ));
}
