use super::*;
use crate::column::{Column, ColumnType};
use crate::condition::Condition;
use crate::dialect::Dialect;
use crate::structure::TableStructure;
use crate::value::{DbExpr, Value};
use crate::OrmError;
use indexmap::IndexMap;
use pretty_assertions::assert_eq;
use serde_json::json;

fn articles() -> TableStructure {
    TableStructure::builder("articles")
        .schema("blog")
        .column(Column::id("id"))
        .unwrap()
        .column(Column::new("title", ColumnType::String))
        .unwrap()
        .column(Column::new("body", ColumnType::Text).heavy())
        .unwrap()
        .column(Column::new("meta", ColumnType::Json).nullable().unwrap())
        .unwrap()
        .column(Column::new("published", ColumnType::Boolean))
        .unwrap()
        .column(Column::new("summary", ColumnType::Virtual))
        .unwrap()
        .build()
        .unwrap()
}

fn row(pairs: &[(&str, Value)]) -> RowValues {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect::<IndexMap<_, _>>()
}

// ==================== SELECT ====================

#[test]
fn test_select_default_columns_skip_heavy_and_virtual() {
    let sql = SelectQuery::new().to_sql(&articles(), Dialect::Postgres).unwrap();
    assert_eq!(
        sql,
        "SELECT \"id\", \"title\", \"meta\", \"published\" FROM \"blog\".\"articles\""
    );

    let sql = SelectQuery::new()
        .with_heavy()
        .to_sql(&articles(), Dialect::MySql)
        .unwrap();
    assert_eq!(
        sql,
        "SELECT `id`, `title`, `body`, `meta`, `published` FROM `blog`.`articles`"
    );
}

#[test]
fn test_select_with_filter_order_and_paging() {
    let sql = SelectQuery::new()
        .columns(["id", "title"])
        .filter(Condition::eq("published", true))
        .filter(Condition::like("title", "Rust%"))
        .order_by("id", OrderDirection::Desc)
        .limit(10)
        .offset(20)
        .to_sql(&articles(), Dialect::Postgres)
        .unwrap();
    assert_eq!(
        sql,
        "SELECT \"id\", \"title\" FROM \"blog\".\"articles\" \
         WHERE \"published\" = TRUE AND \"title\" LIKE 'Rust%' \
         ORDER BY \"id\" DESC LIMIT 10 OFFSET 20"
    );
}

#[test]
fn test_mysql_offset_without_limit() {
    let sql = SelectQuery::new()
        .columns(["id"])
        .offset(5)
        .to_sql(&articles(), Dialect::MySql)
        .unwrap();
    assert_eq!(
        sql,
        "SELECT `id` FROM `blog`.`articles` LIMIT 18446744073709551615 OFFSET 5"
    );
}

#[test]
fn test_select_json_path_order() {
    let sql = SelectQuery::new()
        .columns(["id"])
        .distinct()
        .order_by("meta->>rank::int", OrderDirection::Asc)
        .to_sql(&articles(), Dialect::Postgres)
        .unwrap();
    assert_eq!(
        sql,
        "SELECT DISTINCT \"id\" FROM \"blog\".\"articles\" ORDER BY (\"meta\"->>'rank')::int ASC"
    );
}

#[test]
fn test_select_rejects_unknown_and_virtual_columns() {
    let err = SelectQuery::new()
        .columns(["nope"])
        .to_sql(&articles(), Dialect::Postgres)
        .unwrap_err();
    assert!(matches!(err, OrmError::UnknownColumn { .. }));

    let err = SelectQuery::new()
        .columns(["summary"])
        .to_sql(&articles(), Dialect::Postgres)
        .unwrap_err();
    assert!(matches!(err, OrmError::InvalidCondition(_)));
}

#[test]
fn test_select_fake_structure() {
    let fake = TableStructure::fake("events").unwrap();
    let sql = SelectQuery::new()
        .filter(Condition::eq("kind", "click"))
        .to_sql(&fake, Dialect::Postgres)
        .unwrap();
    assert_eq!(sql, "SELECT * FROM \"events\" WHERE \"kind\" = 'click'");
}

#[test]
fn test_count() {
    let query = SelectQuery::new()
        .filter(Condition::eq("published", false))
        .order_by("id", OrderDirection::Asc);
    assert_eq!(
        query.count_sql(&articles(), Dialect::Postgres).unwrap(),
        "SELECT COUNT(*) AS \"count\" FROM \"blog\".\"articles\" WHERE \"published\" = FALSE"
    );

    let paged = SelectQuery::new().columns(["id"]).limit(3);
    assert_eq!(
        paged.count_sql(&articles(), Dialect::MySql).unwrap(),
        "SELECT COUNT(*) AS `count` FROM (SELECT `id` FROM `blog`.`articles` LIMIT 3) AS `counted`"
    );
}

// ==================== INSERT ====================

#[test]
fn test_insert_single_row_with_returning() {
    let rows = vec![row(&[
        ("title", Value::from("It's here")),
        ("published", Value::Bool(true)),
    ])];
    let sql = build_insert(&articles(), Dialect::Postgres, &rows, &["id".to_string()]).unwrap();
    assert_eq!(
        sql,
        "INSERT INTO \"blog\".\"articles\" (\"title\", \"published\") \
         VALUES ('It''s here', TRUE) RETURNING \"id\""
    );

    // MySQL has no RETURNING
    let sql = build_insert(&articles(), Dialect::MySql, &rows, &["id".to_string()]).unwrap();
    assert_eq!(
        sql,
        "INSERT INTO `blog`.`articles` (`title`, `published`) VALUES ('It''s here', 1)"
    );
}

#[test]
fn test_insert_many_fills_missing_with_default() {
    let rows = vec![
        row(&[("title", Value::from("a")), ("meta", Value::Json(json!({"k": 1})))]),
        row(&[("published", Value::Bool(false)), ("title", Value::from("b"))]),
    ];
    let sql = build_insert(&articles(), Dialect::Postgres, &rows, &[]).unwrap();
    assert_eq!(
        sql,
        "INSERT INTO \"blog\".\"articles\" (\"title\", \"meta\", \"published\") VALUES \
         ('a', '{\"k\":1}'::jsonb, DEFAULT), ('b', DEFAULT, FALSE)"
    );
}

#[test]
fn test_insert_expressions_and_empty_rows() {
    let rows = vec![row(&[("title", Value::Expr(DbExpr::new("UPPER('x')")))])];
    let sql = build_insert(&articles(), Dialect::Postgres, &rows, &[]).unwrap();
    assert_eq!(sql, "INSERT INTO \"blog\".\"articles\" (\"title\") VALUES (UPPER('x'))");

    let empty = vec![RowValues::new()];
    assert_eq!(
        build_insert(&articles(), Dialect::Postgres, &empty, &[]).unwrap(),
        "INSERT INTO \"blog\".\"articles\" DEFAULT VALUES"
    );
    assert_eq!(
        build_insert(&articles(), Dialect::MySql, &[RowValues::new(), RowValues::new()], &[]).unwrap(),
        "INSERT INTO `blog`.`articles` () VALUES (), ()"
    );
    assert!(build_insert(&articles(), Dialect::Postgres, &[], &[]).is_err());
}

#[test]
fn test_insert_rejects_virtual_columns() {
    let rows = vec![row(&[("summary", Value::from("x"))])];
    let err = build_insert(&articles(), Dialect::Postgres, &rows, &[]).unwrap_err();
    assert!(matches!(err, OrmError::Configuration(_)));
}

// ==================== UPDATE / DELETE ====================

#[test]
fn test_update() {
    let values = row(&[("title", Value::from("new")), ("published", Value::Bool(true))]);
    let sql = build_update(&articles(), Dialect::MySql, &values, &Condition::eq("id", 7)).unwrap();
    assert_eq!(
        sql,
        "UPDATE `blog`.`articles` SET `title` = 'new', `published` = 1 WHERE `id` = 7"
    );
}

#[test]
fn test_update_and_delete_require_condition() {
    let values = row(&[("title", Value::from("new"))]);
    assert!(matches!(
        build_update(&articles(), Dialect::Postgres, &values, &Condition::and(vec![])),
        Err(OrmError::InvalidCondition(_))
    ));
    assert!(matches!(
        build_delete(&articles(), Dialect::Postgres, &Condition::and(vec![])),
        Err(OrmError::InvalidCondition(_))
    ));
    assert!(build_update(&articles(), Dialect::Postgres, &RowValues::new(), &Condition::eq("id", 1)).is_err());
}

#[test]
fn test_delete_by_primary_key() {
    let condition = primary_key_condition(&articles(), 3).unwrap();
    assert_eq!(
        build_delete(&articles(), Dialect::Postgres, &condition).unwrap(),
        "DELETE FROM \"blog\".\"articles\" WHERE \"id\" = 3"
    );
    assert!(matches!(
        primary_key_condition(&articles(), Value::Null),
        Err(OrmError::ValueNotSet { .. })
    ));
    assert!(matches!(
        primary_key_condition(&TableStructure::fake("x").unwrap(), 1),
        Err(OrmError::Configuration(_))
    ));
}
