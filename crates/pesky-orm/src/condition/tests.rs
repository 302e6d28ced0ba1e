use super::*;
use crate::column::{Column, ColumnType};
use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use serde_json::json;

fn users() -> TableStructure {
    TableStructure::builder("users")
        .column(Column::id("id"))
        .unwrap()
        .column(Column::new("name", ColumnType::String))
        .unwrap()
        .column(Column::new("email", ColumnType::Email).nullable().unwrap())
        .unwrap()
        .column(Column::new("age", ColumnType::Integer).nullable().unwrap())
        .unwrap()
        .column(Column::new("active", ColumnType::Boolean))
        .unwrap()
        .column(Column::new("created_at", ColumnType::Timestamp))
        .unwrap()
        .column(Column::new("data", ColumnType::Json).nullable().unwrap())
        .unwrap()
        .column(Column::new("label", ColumnType::Virtual))
        .unwrap()
        .build()
        .unwrap()
}

fn pg(condition: &Condition) -> String {
    condition
        .to_sql(&users(), Dialect::Postgres)
        .unwrap()
        .unwrap_or_default()
}

fn mysql(condition: &Condition) -> String {
    condition
        .to_sql(&users(), Dialect::MySql)
        .unwrap()
        .unwrap_or_default()
}

#[test]
fn test_simple_comparisons() {
    assert_eq!(pg(&Condition::eq("name", "Ann")), "\"name\" = 'Ann'");
    assert_eq!(pg(&Condition::gte("age", 18)), "\"age\" >= 18");
    assert_eq!(pg(&Condition::new("age", "<>", 3)), "\"age\" != 3");
    assert_eq!(mysql(&Condition::eq("active", true)), "`active` = 1");
    assert_eq!(pg(&Condition::eq("active", true)), "\"active\" = TRUE");
}

#[test]
fn test_values_are_coerced_through_columns() {
    assert_eq!(pg(&Condition::eq("age", "42")), "\"age\" = 42");
    assert_eq!(pg(&Condition::eq("active", "yes")), "\"active\" = TRUE");
    assert_eq!(
        pg(&Condition::gt("created_at", "2024-01-02")),
        "\"created_at\" > '2024-01-02 00:00:00'"
    );

    let err = Condition::eq("age", "many")
        .to_sql(&users(), Dialect::Postgres)
        .unwrap_err();
    assert!(matches!(err, OrmError::InvalidCondition(_)));
}

#[test]
fn test_null_rewrites() {
    assert_eq!(pg(&Condition::eq("email", Value::Null)), "\"email\" IS NULL");
    assert_eq!(pg(&Condition::ne("email", Value::Null)), "\"email\" IS NOT NULL");
    assert_eq!(pg(&Condition::new("email", "is", Value::Null)), "\"email\" IS NULL");
    assert_eq!(pg(&Condition::is_not_null("email")), "\"email\" IS NOT NULL");
    assert!(Condition::gt("age", Value::Null)
        .to_sql(&users(), Dialect::Postgres)
        .is_err());
}

#[test]
fn test_list_rewrites() {
    assert_eq!(
        pg(&Condition::eq("id", Value::Array(vec![Value::Int(1), Value::Int(2)]))),
        "\"id\" IN (1, 2)"
    );
    assert_eq!(
        pg(&Condition::ne("id", Value::Array(vec![Value::Int(1)]))),
        "\"id\" NOT IN (1)"
    );
    assert_eq!(pg(&Condition::new("id", "in", 5)), "\"id\" = 5");
    assert_eq!(pg(&Condition::new("id", "not in", 5)), "\"id\" != 5");
}

#[test]
fn test_empty_in_lists() {
    assert_eq!(pg(&Condition::in_list("id", Vec::<i64>::new())), "1 = 0");
    assert_eq!(pg(&Condition::not_in("id", Vec::<i64>::new())), "1 = 1");
    assert_eq!(
        pg(&Condition::and(vec![
            Condition::eq("name", "x"),
            Condition::in_list("id", Vec::<i64>::new()),
        ])),
        "\"name\" = 'x' AND 1 = 0"
    );
}

#[test]
fn test_null_items_in_lists() {
    assert_eq!(
        pg(&Condition::in_list("age", vec![Value::Int(1), Value::Null])),
        "(\"age\" IN (1) OR \"age\" IS NULL)"
    );
    assert_eq!(
        pg(&Condition::not_in("age", vec![Value::Int(1), Value::Null, Value::Int(3)])),
        "(\"age\" NOT IN (1, 3) AND \"age\" IS NOT NULL)"
    );
    assert_eq!(
        pg(&Condition::in_list("age", vec![Value::Null, Value::Null])),
        "\"age\" IS NULL"
    );
    assert_eq!(
        mysql(&Condition::not_in("age", vec![Value::Null])),
        "`age` IS NOT NULL"
    );
    assert_eq!(
        pg(&Condition::and(vec![
            Condition::eq("name", "x"),
            Condition::eq("age", Value::Array(vec![Value::Int(2), Value::Null])),
        ])),
        "\"name\" = 'x' AND (\"age\" IN (2) OR \"age\" IS NULL)"
    );
}

#[test]
fn test_between() {
    assert_eq!(
        pg(&Condition::between("age", 18, 65)),
        "\"age\" BETWEEN 18 AND 65"
    );
    assert_eq!(
        mysql(&Condition::new(
            "created_at",
            "not between",
            Value::Array(vec![Value::from("2024-01-01"), Value::from("2024-02-01")])
        )),
        "`created_at` NOT BETWEEN '2024-01-01 00:00:00' AND '2024-02-01 00:00:00'"
    );

    for bad in [
        Value::Array(vec![Value::Int(1)]),
        Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
        Value::Int(1),
    ] {
        let err = Condition::new("age", "between", bad)
            .to_sql(&users(), Dialect::Postgres)
            .unwrap_err();
        assert!(matches!(err, OrmError::InvalidCondition(_)));
    }
}

#[test]
fn test_pattern_operators() {
    assert_eq!(pg(&Condition::like("name", "A%")), "\"name\" LIKE 'A%'");
    assert_eq!(pg(&Condition::ilike("name", "a%")), "\"name\" ILIKE 'a%'");
    assert_eq!(mysql(&Condition::ilike("name", "a%")), "LOWER(`name`) LIKE LOWER('a%')");
    assert_eq!(pg(&Condition::new("name", "~*", "^a")), "\"name\" ~* '^a'");
    assert_eq!(
        mysql(&Condition::new("name", "not regexp", "^a")),
        "NOT REGEXP_LIKE(`name`, '^a', 'c')"
    );
    assert!(Condition::new("name", "like", 5)
        .to_sql(&users(), Dialect::Postgres)
        .is_err());
}

#[test]
fn test_boolean_is() {
    assert_eq!(pg(&Condition::new("active", "is", true)), "\"active\" IS TRUE");
    assert_eq!(mysql(&Condition::new("active", "is not", false)), "`active` IS NOT FALSE");
}

#[test]
fn test_compound_parenthesization() {
    let a = Condition::eq("id", 1);
    let b = Condition::eq("age", 2);
    let c = Condition::eq("name", "c");

    assert_eq!(
        pg(&Condition::or(vec![Condition::and(vec![a.clone(), b.clone()]), c.clone()])),
        "(\"id\" = 1 AND \"age\" = 2) OR \"name\" = 'c'"
    );
    assert_eq!(
        pg(&Condition::and(vec![Condition::or(vec![a.clone(), b.clone()]), c.clone()])),
        "(\"id\" = 1 OR \"age\" = 2) AND \"name\" = 'c'"
    );
    // same operator nests without parentheses
    assert_eq!(
        pg(&Condition::and(vec![Condition::and(vec![a.clone(), b.clone()]), c.clone()])),
        "\"id\" = 1 AND \"age\" = 2 AND \"name\" = 'c'"
    );
    assert_eq!(
        pg(&Condition::not(Condition::or(vec![a.clone(), b.clone()]))),
        "NOT (\"id\" = 1 OR \"age\" = 2)"
    );

    // a single surviving child keeps the parentheses its real parent needs
    let either = Condition::or(vec![a.clone(), b.clone()]);
    assert_eq!(
        pg(&Condition::and(vec![Condition::or(vec![either.clone()]), c.clone()])),
        "(\"id\" = 1 OR \"age\" = 2) AND \"name\" = 'c'"
    );
    assert_eq!(
        pg(&Condition::and(vec![
            Condition::or(vec![either.clone(), Condition::and(vec![])]),
            c.clone(),
        ])),
        "(\"id\" = 1 OR \"age\" = 2) AND \"name\" = 'c'"
    );
    assert_eq!(
        mysql(&Condition::or(vec![Condition::and(vec![Condition::and(vec![a, b])]), c])),
        "(`id` = 1 AND `age` = 2) OR `name` = 'c'"
    );
    let parsed = Condition::from_json(&json!({
        "OR": {"OR": {"id": 1, "age": 2}},
        "name": "c"
    }))
    .unwrap();
    assert_eq!(pg(&parsed), "(\"id\" = 1 OR \"age\" = 2) AND \"name\" = 'c'");
    assert_eq!(pg(&Condition::or(vec![either])), "\"id\" = 1 OR \"age\" = 2");
}

#[test]
fn test_empty_compounds_are_skipped() {
    assert_eq!(
        Condition::and(vec![]).to_sql(&users(), Dialect::Postgres).unwrap(),
        None
    );
    assert_eq!(
        pg(&Condition::and(vec![
            Condition::or(vec![]),
            Condition::eq("id", 1),
            Condition::and(vec![Condition::or(vec![])]),
        ])),
        "\"id\" = 1"
    );
    assert!(Condition::or(vec![Condition::and(vec![])]).is_empty());
}

#[test]
fn test_raw_conditions() {
    assert_eq!(
        pg(&Condition::raw_with("\"age\" % ? = 0", vec![Value::Int(2)])),
        "\"age\" % 2 = 0"
    );
    assert_eq!(
        pg(&Condition::or(vec![
            Condition::raw("\"age\" > 1 AND \"age\" < 5"),
            Condition::eq("id", 9),
        ])),
        "(\"age\" > 1 AND \"age\" < 5) OR \"id\" = 9"
    );
}

#[test]
fn test_json_paths_and_operators() {
    assert_eq!(
        pg(&Condition::eq("data->prefs->>theme", "dark")),
        "\"data\"->'prefs'->>'theme' = 'dark'"
    );
    assert_eq!(
        mysql(&Condition::eq("data->>theme", "dark")),
        "JSON_UNQUOTE(JSON_EXTRACT(`data`, '$.\"theme\"')) = 'dark'"
    );
    assert_eq!(
        pg(&Condition::json_contains("data", json!({"tags": ["a"]}))),
        "\"data\" @> '{\"tags\":[\"a\"]}'::jsonb"
    );
    assert_eq!(
        mysql(&Condition::json_contains("data", json!({"a": 1}))),
        "JSON_CONTAINS(`data`, '{\"a\":1}')"
    );
    assert_eq!(pg(&Condition::new("data", "?", "a")), "\"data\" ? 'a'");
    assert_eq!(
        pg(&Condition::new("data", "?|", Value::Array(vec![Value::from("a"), Value::from("b")]))),
        "\"data\" ?| ARRAY['a', 'b']"
    );
    assert_eq!(
        mysql(&Condition::new("data", "?&", Value::Array(vec![Value::from("a"), Value::from("b")]))),
        "JSON_CONTAINS_PATH(`data`, 'all', '$.\"a\"', '$.\"b\"')"
    );
    assert_eq!(pg(&Condition::new("data", "?|", Value::Array(vec![]))), "1 = 0");
}

#[test]
fn test_casts_skip_column_coercion() {
    let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    assert_eq!(
        pg(&Condition::eq("created_at::date", day)),
        "\"created_at\"::date = '2024-01-02'"
    );
}

#[test]
fn test_column_errors() {
    let err = Condition::eq("missing", 1)
        .to_sql(&users(), Dialect::Postgres)
        .unwrap_err();
    assert!(matches!(err, OrmError::UnknownColumn { .. }));

    let err = Condition::eq("label", "x")
        .to_sql(&users(), Dialect::Postgres)
        .unwrap_err();
    assert!(matches!(err, OrmError::InvalidCondition(_)));

    let err = Condition::new("id", "<=>", 1)
        .to_sql(&users(), Dialect::Postgres)
        .unwrap_err();
    assert!(matches!(err, OrmError::InvalidCondition(_)));
}

#[test]
fn test_qualified_references() {
    assert_eq!(pg(&Condition::eq("users.id", 1)), "\"users\".\"id\" = 1");
    // other tables are not checked against this structure
    assert_eq!(pg(&Condition::eq("teams.code", "x")), "\"teams\".\"code\" = 'x'");
}

#[test]
fn test_from_json() {
    let condition = Condition::from_json(&json!({
        "name": "Ann",
        "age >=": 18,
        "OR": [
            {"email": null},
            {"email like": "%@corp.io"}
        ]
    }))
    .unwrap();
    assert_eq!(
        pg(&condition),
        "\"name\" = 'Ann' AND \"age\" >= 18 AND (\"email\" IS NULL OR \"email\" LIKE '%@corp.io')"
    );

    let negated = Condition::from_json(&json!({"NOT": {"id": [1, 2]}})).unwrap();
    assert_eq!(pg(&negated), "NOT (\"id\" IN (1, 2))");

    assert!(Condition::from_json(&json!(5)).is_err());
}

#[test]
fn test_and_also_flattens() {
    let condition = Condition::eq("id", 1)
        .and_also(Condition::eq("age", 2))
        .and_also(Condition::eq("name", "x"));
    match &condition {
        Condition::Compound { op, children } => {
            assert_eq!(*op, BoolOp::And);
            assert_eq!(children.len(), 3);
        }
        other => panic!("unexpected {:?}", other),
    }
}
