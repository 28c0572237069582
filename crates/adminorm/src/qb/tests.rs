//! Cross-composer tests for the qb module.

use crate::qb::{CmpOp, DeleteQb, Expr, InsertQb, Joiner, SelectQb, UpdateQb};
use crate::error::OrmError;
use crate::value::Value;

fn eq(column: &str, value: i64) -> Expr {
    Expr::compare(column, CmpOp::Eq, value).unwrap()
}

#[test]
fn test_grouped_or_renders_single_level() {
    let mut qb = SelectQb::new("users");
    qb.push_where(Joiner::And, Expr::compare("Active", CmpOp::Eq, 1i64))
        .push_where(
            Joiner::Or,
            Ok(Expr::group(Joiner::Or, vec![eq("A", 1), eq("B", 2)])),
        );
    let (sql, params) = qb.build().unwrap();
    assert_eq!(
        sql,
        r#"SELECT * FROM "users" WHERE "Active" = $1 OR ("A" = $2 OR "B" = $3)"#
    );
    assert_eq!(params.len(), 3);
}

#[test]
fn test_mixed_precedence_groups() {
    let mut qb = SelectQb::new("users");
    qb.push_where(
        Joiner::And,
        Ok(Expr::group(Joiner::Or, vec![eq("A", 1), eq("B", 2)])),
    )
    .push_where(
        Joiner::And,
        Ok(Expr::group(Joiner::Or, vec![eq("C", 3), eq("D", 4)])),
    );
    let (sql, _) = qb.build().unwrap();
    assert_eq!(
        sql,
        r#"SELECT * FROM "users" WHERE ("A" = $1 OR "B" = $2) AND ("C" = $3 OR "D" = $4)"#
    );
}

#[test]
fn test_contains_across_fields() {
    let per_field = |field: &str| {
        Expr::group(
            Joiner::Or,
            ["adm", "root"]
                .iter()
                .map(|kw| Expr::contains(field, *kw).unwrap())
                .collect(),
        )
    };
    let mut qb = SelectQb::new("users");
    qb.push_where(
        Joiner::And,
        Ok(Expr::group(
            Joiner::Or,
            vec![per_field("EmailUser"), per_field("PseudoUser")],
        )),
    );
    let (sql, params) = qb.build().unwrap();
    assert_eq!(
        sql,
        r#"SELECT * FROM "users" WHERE (("EmailUser"::text ILIKE $1 OR "EmailUser"::text ILIKE $2) OR ("PseudoUser"::text ILIKE $3 OR "PseudoUser"::text ILIKE $4))"#
    );
    assert_eq!(params.as_slice()[1], Value::from("%root%"));
}

#[test]
fn test_raw_fragment_is_parenthesized() {
    let mut qb = SelectQb::new("menus");
    qb.push_where(Joiner::And, Expr::compare("IdParent", CmpOp::Eq, Value::Null))
        .push_where(Joiner::And, Ok(Expr::raw("\"Position\" > 3 OR \"Hidden\" = 0")));
    let (sql, params) = qb.build().unwrap();
    assert_eq!(
        sql,
        r#"SELECT * FROM "menus" WHERE "IdParent" IS NULL AND ("Position" > 3 OR "Hidden" = 0)"#
    );
    assert!(params.is_empty());
}

#[test]
fn test_write_composers_agree_on_key_rendering() {
    let (update, _) = UpdateQb::new("users")
        .set("EmailUser", "a")
        .eq("IdUser", 1i64)
        .build()
        .unwrap();
    let (delete, _) = DeleteQb::new("users").eq("IdUser", 1i64).build().unwrap();
    assert!(update.ends_with(r#"WHERE "IdUser" = $2"#));
    assert!(delete.ends_with(r#"WHERE "IdUser" = $1"#));

    let (insert, _) = InsertQb::new("users").value("IdUser", 1i64).build().unwrap();
    assert!(insert.starts_with(r#"INSERT INTO "users""#));
}

#[test]
fn test_recorded_errors_resurface_on_every_build() {
    let delete = DeleteQb::new("bad table").eq("IdUser", 1i64);
    assert!(delete.build().is_err());
    assert!(delete.build().is_err());

    let update = UpdateQb::new("users").set("bad column", "x").eq("IdUser", 1i64);
    assert!(matches!(update.build(), Err(OrmError::Statement(_))));

    let insert = InsertQb::new("users").value("a;b", 1i64);
    assert!(insert.build().is_err());

    let mut select = SelectQb::new("users");
    select.push_where(Joiner::And, Expr::compare("x y", CmpOp::Eq, 1i64));
    assert!(select.build().is_err());
    assert!(select.build_count().is_err());
}
