use super::*;
use crate::catalog::{DatePattern, DependencyEdge, FieldMapping, FileSpec, Relation};
use crate::row::Record;
use crate::submission::UploadedFile;
use crate::test_support::MockClient;
use chrono::NaiveDate;
use std::path::Path;

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 5)
        .and_then(|d| d.and_hms_opt(8, 0, 0))
        .unwrap()
}

fn users() -> EntityMapping {
    EntityMapping::new("users")
        .field(FieldMapping::integer("IdUser").autoincrement().primary())
        .field(FieldMapping::short_string("EmailUser").mandatory())
        .field(FieldMapping::integer("IdGroup").default_value(1i64))
        .field(
            FieldMapping::date("BirthUser")
                .pattern(DatePattern::parse("DD.MM.YYYY").unwrap())
                .default_now(),
        )
        .relation(Relation::new(
            "group",
            ("users", "IdGroup"),
            ("groups", "IdGroup"),
        ))
}

fn groups() -> EntityMapping {
    EntityMapping::new("groups")
        .field(
            FieldMapping::integer("IdGroup")
                .autoincrement()
                .primary()
                .depends(DependencyEdge::new("users", ["IdGroup"]))
                .depends(DependencyEdge::new("group_rights", ["IdGroup"])),
        )
        .field(FieldMapping::short_string("NameGroup").mandatory())
}

fn group_rights() -> EntityMapping {
    EntityMapping::new("group_rights")
        .field(FieldMapping::integer("IdGroup").mandatory())
        .field(FieldMapping::integer("IdMenu").mandatory())
}

fn events() -> EntityMapping {
    EntityMapping::new("events")
        .field(FieldMapping::integer("IdEvent").autoincrement().primary())
        .field(
            FieldMapping::date("StartEvent")
                .pattern(DatePattern::parse("DD-MM-YYYY").unwrap())
                .default_now(),
        )
        .field(FieldMapping::short_string("TitleEvent"))
}

fn catalog() -> Catalog {
    Catalog::new()
        .with_entity(users())
        .and_then(|c| c.with_entity(groups()))
        .and_then(|c| c.with_entity(group_rights()))
        .and_then(|c| c.with_entity(events()))
        .unwrap()
}

fn key(column: &str, value: i64) -> Conditions {
    Conditions::new().with(column, value)
}

// ==================== Composition and reads ====================

#[tokio::test]
async fn select_terminal_renders_and_logs() {
    let catalog = catalog();
    let client = MockClient::new().with_rows(vec![
        Record::new()
            .with("IdUser", 1i64)
            .with("BirthUser", "1990-07-14"),
    ]);
    let mut b = Builder::new(&catalog, "users", &client).unwrap();

    let records = b
        .select(&["IdUser", "BirthUser"])
        .where_eq([("IdGroup", 1i64)])
        .order("EmailUser", Direction::Asc)
        .limit(Some(10), 5)
        .execute()
        .await
        .unwrap()
        .into_vec()
        .await
        .unwrap();

    let expected = r#"SELECT "IdUser", "BirthUser" FROM "users" WHERE "IdGroup" = $1 ORDER BY "EmailUser" ASC LIMIT 5 OFFSET 10"#;
    assert_eq!(client.last().0, expected);
    assert_eq!(b.statements(), &[expected.to_string()]);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].value("BirthUser"), Value::from("14.07.1990"));
    assert_eq!(b.stage(), Stage::Executed(StatementKind::Select));
}

#[tokio::test]
async fn terminal_clears_the_composition() {
    let catalog = catalog();
    let client = MockClient::new();
    let mut b = Builder::new(&catalog, "users", &client).unwrap();

    b.where_eq([("IdGroup", 2i64)]).first().await.unwrap();
    b.first().await.unwrap();

    let statements = client.statements();
    assert_eq!(
        statements[0],
        r#"SELECT * FROM "users" WHERE "IdGroup" = $1 LIMIT 1"#
    );
    assert_eq!(statements[1], r#"SELECT * FROM "users" LIMIT 1"#);
}

#[tokio::test]
async fn null_condition_renders_is_null() {
    let catalog = catalog();
    let client = MockClient::new();
    let mut b = Builder::new(&catalog, "users", &client).unwrap();

    b.where_eq([("IdGroup", Value::Null)])
        .where_not([("EmailUser", Value::Null)])
        .count()
        .await
        .unwrap();

    assert_eq!(
        client.last().0,
        r#"SELECT COUNT(*) FROM "users" WHERE "IdGroup" IS NULL AND "EmailUser" IS NOT NULL"#
    );
    assert!(client.last().1.is_empty());
}

#[tokio::test]
async fn grouped_predicates_keep_precedence() {
    let catalog = catalog();
    let client = MockClient::new();
    let mut b = Builder::new(&catalog, "users", &client).unwrap();

    b.where_eq([("IdGroup", 1i64)])
        .where_or_and([("EmailUser", "a@b.c"), ("EmailUser", "d@e.f")])
        .where_and_or([("IdGroup", 2i64), ("IdUser", 9i64)])
        .where_greater_or_equal([("IdUser", 3i64), ("IdGroup", 4i64)])
        .execute()
        .await
        .unwrap();

    assert_eq!(
        client.last().0,
        r#"SELECT * FROM "users" WHERE "IdGroup" = $1 AND ("EmailUser" = $2 OR "EmailUser" = $3) OR ("IdGroup" = $4 AND "IdUser" = $5) AND ("IdUser" >= $6 OR "IdGroup" >= $7)"#
    );
    assert_eq!(client.last().1.len(), 7);
}

#[tokio::test]
async fn where_like_searches_every_field_for_every_keyword() {
    let catalog = catalog();
    let client = MockClient::new();
    let mut b = Builder::new(&catalog, "users", &client).unwrap();

    b.where_like(&["EmailUser"], &["adm", "50%"])
        .execute()
        .await
        .unwrap();

    let (sql, params) = client.last();
    assert_eq!(
        sql,
        r#"SELECT * FROM "users" WHERE (("EmailUser"::text ILIKE $1 OR "EmailUser"::text ILIKE $2))"#
    );
    assert_eq!(params[1], Value::from("%50\\%%"));
}

#[tokio::test]
async fn configured_relations_become_joins() {
    let catalog = catalog();
    let client = MockClient::new();
    let mut b = Builder::new(&catalog, "users", &client).unwrap();

    b.select(&["users.EmailUser", "groups.NameGroup"])
        .joins(&[RelationRef::all("users")])
        .execute()
        .await
        .unwrap();
    assert_eq!(
        client.last().0,
        r#"SELECT "users"."EmailUser", "groups"."NameGroup" FROM "users" LEFT OUTER JOIN "groups" ON "users"."IdGroup" = "groups"."IdGroup""#
    );

    b.joins(&[RelationRef::named("users", "group").kind(JoinKind::Inner)])
        .execute()
        .await
        .unwrap();
    assert!(client.last().0.contains("INNER JOIN \"groups\""));
}

#[tokio::test]
async fn unknown_relation_fails_at_the_terminal() {
    let catalog = catalog();
    let client = MockClient::new();
    let mut b = Builder::new(&catalog, "users", &client).unwrap();

    let err = b
        .joins(&[RelationRef::named("users", "nope")])
        .execute()
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::Configuration(_)));
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn grouped_count_and_exist() {
    let catalog = catalog();
    let client = MockClient::new()
        .with_rows(vec![Record::new().with("count", 3i64)])
        .with_rows(vec![Record::new().with("count", 0i64)]);
    let mut b = Builder::new(&catalog, "group_rights", &client).unwrap();

    let n = b
        .group(&["IdGroup"])
        .having_greater("IdMenu", 2)
        .count()
        .await
        .unwrap();
    assert_eq!(n, 3);
    assert_eq!(
        client.last().0,
        r#"SELECT COUNT(*) FROM (SELECT 1 FROM "group_rights" GROUP BY "IdGroup" HAVING COUNT("IdMenu") > $1) AS t"#
    );

    assert!(!b.where_eq([("IdGroup", 8i64)]).exist().await.unwrap());
}

#[tokio::test]
async fn dependency_info_is_attached_per_record() {
    let catalog = catalog();
    let client = MockClient::new()
        .with_rows(vec![
            Record::new().with("IdGroup", 4i64),
            Record::new().with("IdGroup", 5i64),
        ])
        .with_rows(vec![Record::new().with("IdGroup", 4i64)]);
    let mut b = Builder::new(&catalog, "groups", &client).unwrap();

    let records = b
        .with_dependency_info()
        .execute()
        .await
        .unwrap()
        .into_vec()
        .await
        .unwrap();

    assert_eq!(records[0].has_dependencies, Some(true));
    assert_eq!(records[1].has_dependencies, Some(false));
    // one select, one probe for the first record, two for the second
    assert_eq!(client.calls().len(), 4);
}

#[tokio::test]
async fn dependency_info_survives_a_narrow_select() {
    let catalog = catalog();
    let client = MockClient::new()
        .with_rows(vec![
            Record::new()
                .with("NameGroup", "Admins")
                .with("IdGroup", 4i64),
        ])
        .with_rows(vec![Record::new().with("IdGroup", 4i64)]);
    let mut b = Builder::new(&catalog, "groups", &client).unwrap();

    let records = b
        .select(&["NameGroup"])
        .where_eq([("IdGroup", 4i64)])
        .with_dependency_info()
        .execute()
        .await
        .unwrap()
        .into_vec()
        .await
        .unwrap();

    let statements = client.statements();
    assert_eq!(
        statements[0],
        r#"SELECT "NameGroup", "groups"."IdGroup" FROM "groups" WHERE "IdGroup" = $1"#
    );
    assert_eq!(
        statements[1],
        r#"SELECT "IdGroup" FROM "users" WHERE "IdGroup" = $1 LIMIT 1"#
    );
    assert_eq!(records[0].has_dependencies, Some(true));
    assert!(!records[0].contains("IdGroup"));
    assert_eq!(records[0].value("NameGroup"), Value::from("Admins"));
}

#[tokio::test]
async fn dependency_info_keeps_selected_owning_columns() {
    let catalog = catalog();
    let client = MockClient::new().with_rows(vec![Record::new().with("IdGroup", 9i64)]);
    let mut b = Builder::new(&catalog, "groups", &client).unwrap();

    let record = b
        .select(&["IdGroup"])
        .with_dependency_info()
        .first()
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        client.statements()[0],
        r#"SELECT "IdGroup" FROM "groups" LIMIT 1"#
    );
    assert_eq!(record.has_dependencies, Some(false));
    assert_eq!(record.value("IdGroup"), Value::Int(9));
}

#[tokio::test]
async fn is_dependent_probes_each_edge() {
    let catalog = catalog();
    let client = MockClient::new()
        .with_rows(vec![Record::new().with("IdGroup", 4i64)])
        .with_rows(vec![])
        .with_rows(vec![Record::new().with("IdGroup", 4i64)]);
    let mut b = Builder::new(&catalog, "groups", &client).unwrap();

    assert!(b.is_dependent(&key("IdGroup", 4)).await.unwrap());
    assert_eq!(
        client.statements(),
        vec![
            r#"SELECT "IdGroup" FROM "groups" WHERE "IdGroup" = $1 LIMIT 1"#,
            r#"SELECT "IdGroup" FROM "users" WHERE "IdGroup" = $1 LIMIT 1"#,
            r#"SELECT "IdGroup" FROM "group_rights" WHERE "IdGroup" = $1 LIMIT 1"#,
        ]
    );
}

#[tokio::test]
async fn missing_row_has_no_dependents() {
    let catalog = catalog();
    let client = MockClient::new();
    let mut b = Builder::new(&catalog, "groups", &client).unwrap();
    assert!(!b.is_dependent(&key("IdGroup", 99)).await.unwrap());
    assert_eq!(client.calls().len(), 1);
}

// ==================== Form materializer ====================

#[tokio::test]
async fn build_without_key_formats_date_defaults() {
    let catalog = catalog();
    let client = MockClient::new();
    let mut b = Builder::new(&catalog, "events", &client).unwrap().at(now());

    let record = b.build(None).await.unwrap();
    assert_eq!(record.value("StartEvent"), Value::from("05-03-2024"));
    assert_eq!(record.value("TitleEvent"), Value::from(""));
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn build_with_key_loads_the_row() {
    let catalog = catalog();
    let client = MockClient::new().with_rows(vec![
        Record::new()
            .with("IdEvent", 3i64)
            .with("StartEvent", "2024-12-31"),
    ]);
    let mut b = Builder::new(&catalog, "events", &client).unwrap();

    let record = b.build(Some(&key("IdEvent", 3))).await.unwrap();
    assert_eq!(record.value("StartEvent"), Value::from("31-12-2024"));
    assert_eq!(
        client.last().0,
        r#"SELECT * FROM "events" WHERE "IdEvent" = $1 LIMIT 1"#
    );

    let err = b.build(Some(&key("IdEvent", 4))).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn failed_submission_wins_over_the_stored_row() {
    let catalog = catalog();
    let client = MockClient::new();
    let mut b = Builder::new(&catalog, "users", &client).unwrap();

    b.ingest(&Submission::new().field("EmailUser", "").field("IdGroup", "x"))
        .unwrap();
    let err = b.insert().await.unwrap_err();
    assert!(err.is_validation());

    let record = b.build(Some(&key("IdUser", 1))).await.unwrap();
    assert!(record.errors.has("EmailUser", ErrorToken::Empty));
    assert!(record.errors.has("IdGroup", ErrorToken::Type));
    assert_eq!(record.value("IdGroup"), Value::from("x"));
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn builds_follows_held_positions() {
    let catalog = catalog();
    let client = MockClient::new();
    let mut b = Builder::new(&catalog, "group_rights", &client).unwrap();

    b.ingest(
        &Submission::new()
            .field("IdGroup", "3")
            .field("IdMenu", vec!["1", "x"]),
    )
    .unwrap();
    let records = b.builds(None).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].value("IdMenu"), Value::from("x"));
    assert_eq!(records[1].value("IdGroup"), Value::from("3"));
    assert!(records[0].errors.has("IdMenu", ErrorToken::Type));
}

// ==================== Writes ====================

#[tokio::test]
async fn empty_mandatory_field_means_zero_writes() {
    let catalog = catalog();
    let client = MockClient::new();
    let mut b = Builder::new(&catalog, "users", &client).unwrap();

    b.ingest(&Submission::new().field("EmailUser", "   "))
        .unwrap();
    let err = b.insert().await.unwrap_err();

    let errors = err.validation_errors().unwrap();
    assert_eq!(errors.get("EmailUser").map(|t| t.len()), Some(1));
    assert!(client.calls().is_empty());
    assert!(b.statements().is_empty());
}

#[tokio::test]
async fn insert_returns_the_reloaded_row() {
    let catalog = catalog();
    let client = MockClient::new()
        .with_rows(vec![Record::new().with("IdUser", 7i64)])
        .with_rows(vec![
            Record::new()
                .with("IdUser", 7i64)
                .with("EmailUser", "a@b.c")
                .with("BirthUser", "2024-03-05"),
        ]);
    let mut b = Builder::new(&catalog, "users", &client).unwrap().at(now());

    b.ingest(&Submission::new().field("EmailUser", "a@b.c").field("Unknown", "1"))
        .unwrap();
    let record = b.insert().await.unwrap().unwrap();

    let calls = client.calls();
    assert_eq!(
        calls[0].0,
        r#"INSERT INTO "users" ("IdUser", "EmailUser", "IdGroup", "BirthUser") VALUES (DEFAULT, $1, $2, $3) RETURNING "IdUser""#
    );
    assert_eq!(
        calls[0].1,
        vec![Value::from("a@b.c"), Value::Int(1), Value::from("2024-03-05")]
    );
    assert_eq!(calls[1].1, vec![Value::Int(7)]);
    assert_eq!(record.value("BirthUser"), Value::from("05.03.2024"));
    assert!(!b.has_errors());
    assert_eq!(b.stage(), Stage::Executed(StatementKind::Insert));

    // the written submission is gone
    let fresh = b.build(None).await.unwrap();
    assert_eq!(fresh.value("EmailUser"), Value::from(""));
}

#[tokio::test]
async fn alias_is_stripped_before_mapping() {
    let catalog = catalog();
    let client = MockClient::new();
    let mut b = Builder::new(&catalog, "users", &client)
        .unwrap()
        .with_alias(FieldAlias::new().prefix("edit"));

    b.ingest(&Submission::new().field("edit_EmailUser", "a@b.c"))
        .unwrap();
    b.update(&key("IdUser", 2)).await.unwrap();

    assert_eq!(
        client.statements()[0],
        r#"UPDATE "users" SET "EmailUser" = $1 WHERE "IdUser" = $2"#
    );
}

#[tokio::test]
async fn update_without_key_is_refused() {
    let catalog = catalog();
    let client = MockClient::new();
    let mut b = Builder::new(&catalog, "users", &client).unwrap();
    b.ingest(&Submission::new().field("EmailUser", "a@b.c"))
        .unwrap();

    let err = b.update(&Conditions::new()).await.unwrap_err();
    assert!(matches!(err, OrmError::Statement(_)));
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn write_while_select_pending_is_refused() {
    let catalog = catalog();
    let client = MockClient::new();
    let mut b = Builder::new(&catalog, "users", &client).unwrap();

    b.where_eq([("IdUser", 1i64)]);
    let err = b.delete(&key("IdUser", 1), false).await.unwrap_err();
    assert!(matches!(err, OrmError::Statement(_)));

    b.execute().await.unwrap();
    assert!(b.delete(&key("IdUser", 1), false).await.is_ok());
}

#[tokio::test]
async fn multi_row_insert_runs_in_one_unit_of_work() {
    let catalog = catalog();
    let client = MockClient::new();
    let mut b = Builder::new(&catalog, "group_rights", &client).unwrap();

    b.ingest(
        &Submission::new()
            .field("IdGroup", "3")
            .field("IdMenu", vec!["1", "4"]),
    )
    .unwrap();
    assert!(b.insert().await.unwrap().is_none());

    let calls = client.calls();
    let sql: Vec<&str> = calls.iter().map(|(s, _)| s.as_str()).collect();
    assert_eq!(
        sql,
        vec![
            "BEGIN",
            r#"INSERT INTO "group_rights" ("IdGroup", "IdMenu") VALUES ($1, $2)"#,
            r#"INSERT INTO "group_rights" ("IdGroup", "IdMenu") VALUES ($1, $2)"#,
            "COMMIT",
        ]
    );
    assert_eq!(calls[2].1, vec![Value::Int(3), Value::Int(4)]);
}

#[tokio::test]
async fn multi_row_update_deletes_then_reinserts() {
    let catalog = catalog();
    let client = MockClient::new();
    let mut b = Builder::new(&catalog, "group_rights", &client).unwrap();

    b.ingest(
        &Submission::new()
            .field("IdGroup", "3")
            .field("IdMenu", vec!["2", "5", "6"]),
    )
    .unwrap();
    b.update(&key("IdGroup", 3)).await.unwrap();

    let calls = client.calls();
    assert_eq!(calls[0].0, "BEGIN");
    assert_eq!(
        calls[1].0,
        r#"DELETE FROM "group_rights" WHERE "IdGroup" = $1"#
    );
    assert_eq!(calls.len(), 1 + 1 + 3 + 1 + 1);
    assert_eq!(calls[4].1, vec![Value::Int(3), Value::Int(6)]);
    assert_eq!(calls[5].0, "COMMIT");
}

#[tokio::test]
async fn failed_multi_row_write_rolls_back() {
    let catalog = catalog();
    let client = MockClient::new().failing_on("INSERT");
    let mut b = Builder::new(&catalog, "group_rights", &client).unwrap();

    b.ingest(
        &Submission::new()
            .field("IdGroup", "3")
            .field("IdMenu", vec!["1", "4"]),
    )
    .unwrap();
    assert!(b.insert().await.is_err());
    assert_eq!(client.statements().last().map(String::as_str), Some("ROLLBACK"));
}

#[tokio::test]
async fn empty_mandatory_group_is_an_empty_error() {
    let catalog = catalog();
    let client = MockClient::new();
    let mut b = Builder::new(&catalog, "groups", &client).unwrap();

    b.ingest(&Submission::new().field("NameGroup", Vec::<String>::new()))
        .unwrap();
    let err = b.insert().await.unwrap_err();

    let errors = err.validation_errors().unwrap();
    assert_eq!(
        errors.get("NameGroup").map(|t| t.iter().copied().collect::<Vec<_>>()),
        Some(vec![ErrorToken::Empty])
    );
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn multi_row_write_without_positions_is_refused() {
    let catalog = catalog();
    let client = MockClient::new();
    let mut b = Builder::new(&catalog, "events", &client).unwrap();

    b.ingest(&Submission::new().field("TitleEvent", Vec::<String>::new()))
        .unwrap();
    let err = b.insert().await.unwrap_err();
    assert!(err.validation_errors().unwrap().has("TitleEvent", ErrorToken::Empty));

    let err = b.update(&key("IdEvent", 1)).await.unwrap_err();
    assert!(err.is_validation());
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn cascade_on_unreferenced_row_is_a_no_op() {
    let catalog = catalog();
    let client = MockClient::new()
        .with_rows(vec![Record::new().with("IdGroup", 4i64)])
        .with_affected(0)
        .with_affected(0)
        .with_affected(1);
    let mut b = Builder::new(&catalog, "groups", &client).unwrap();

    assert!(b.delete(&key("IdGroup", 4), true).await.unwrap());
    assert_eq!(
        client.statements(),
        vec![
            "BEGIN",
            r#"SELECT "IdGroup" FROM "groups" WHERE "IdGroup" = $1 LIMIT 1"#,
            r#"DELETE FROM "users" WHERE "IdGroup" = $1"#,
            r#"DELETE FROM "group_rights" WHERE "IdGroup" = $1"#,
            r#"DELETE FROM "groups" WHERE "IdGroup" = $1"#,
            "COMMIT",
        ]
    );
}

#[tokio::test]
async fn cascade_inside_a_transaction_uses_a_savepoint() {
    let catalog = catalog();
    let client = MockClient::new().in_transaction(true);
    let mut b = Builder::new(&catalog, "groups", &client).unwrap();

    assert!(!b.delete(&key("IdGroup", 4), true).await.unwrap());
    let statements = client.statements();
    assert!(statements[0].starts_with("SAVEPOINT "));
    assert!(statements.last().unwrap().starts_with("RELEASE SAVEPOINT "));
}

#[tokio::test]
async fn check_unique_excludes_the_edited_row() {
    let catalog = catalog();
    let client = MockClient::new().with_rows(vec![Record::new().with("count", 1i64)]);
    let mut b = Builder::new(&catalog, "users", &client).unwrap();

    let free = b
        .check_unique("EmailUser", "a@b.c", Some(&key("IdUser", 2)))
        .await
        .unwrap();
    assert!(!free);
    assert!(b.errors().has("EmailUser", ErrorToken::Unique));
    assert_eq!(
        client.last().0,
        r#"SELECT COUNT(*) FROM "users" WHERE "EmailUser" = $1 AND "IdUser" <> $2"#
    );
}

#[tokio::test]
async fn manual_errors_block_writes() {
    let catalog = catalog();
    let client = MockClient::new();
    let mut b = Builder::new(&catalog, "users", &client).unwrap();

    b.set_values([("EmailUser", "a@b.c")])
        .add_error("EmailUser", ErrorToken::Unique);
    assert!(b.has_errors());
    assert!(b.insert().await.unwrap_err().is_validation());
    assert!(client.calls().is_empty());
}

// ==================== Files ====================

fn profiles(store: &Path) -> Catalog {
    Catalog::new()
        .with_entity(
            EntityMapping::new("profiles")
                .field(FieldMapping::integer("IdProfile").autoincrement().primary())
                .field(
                    FieldMapping::short_string("Avatar")
                        .file(FileSpec::new(store).max_size_kb(1)),
                ),
        )
        .unwrap()
}

struct Dirs {
    root: tempfile::TempDir,
}

impl Dirs {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("store")).unwrap();
        Self { root }
    }

    fn store(&self) -> std::path::PathBuf {
        self.root.path().join("store")
    }

    fn upload(&self, name: &str, len: usize) -> UploadedFile {
        let path = self.root.path().join(format!("tmp_{name}"));
        std::fs::write(&path, vec![b'x'; len]).unwrap();
        UploadedFile::new(name, path)
    }
}

#[tokio::test]
async fn oversized_upload_keeps_the_stored_reference() {
    let dirs = Dirs::new();
    std::fs::write(dirs.store().join("old.txt"), b"abc").unwrap();
    let catalog = profiles(&dirs.store());
    let client = MockClient::new();
    let mut b = Builder::new(&catalog, "profiles", &client).unwrap();

    b.ingest(
        &Submission::new()
            .field("Avatar", "old.txt")
            .file("Avatar", dirs.upload("new.txt", 2048)),
    )
    .unwrap();

    assert!(b.errors().has("Avatar", ErrorToken::Weight));
    assert_eq!(b.file_info("Avatar").map(|f| f.size), Some(3));
    let record = b.build(None).await.unwrap();
    assert_eq!(record.value("Avatar"), Value::from("old.txt"));
}

#[tokio::test]
async fn accepted_upload_moves_after_the_write() {
    let dirs = Dirs::new();
    let catalog = profiles(&dirs.store());
    let client = MockClient::new().with_rows(vec![Record::new().with("IdProfile", 1i64)]);
    let mut b = Builder::new(&catalog, "profiles", &client).unwrap();

    let upload = dirs.upload("notes.txt", 10);
    let temp = upload.temp_path.clone();
    b.ingest(&Submission::new().file("Avatar", upload)).unwrap();
    assert!(!b.has_errors());
    assert!(!dirs.store().join("notes.txt").exists());

    b.insert().await.unwrap();
    assert_eq!(client.calls()[0].1, vec![Value::from("notes.txt")]);
    assert!(dirs.store().join("notes.txt").exists());
    assert!(!temp.exists());
}

#[tokio::test]
async fn staged_upload_stays_put_when_the_write_fails() {
    let dirs = Dirs::new();
    let catalog = profiles(&dirs.store());
    let client = MockClient::new().failing_on("INSERT");
    let mut b = Builder::new(&catalog, "profiles", &client).unwrap();

    let upload = dirs.upload("notes.txt", 10);
    let temp = upload.temp_path.clone();
    b.ingest(&Submission::new().file("Avatar", upload)).unwrap();
    assert!(b.insert().await.is_err());
    assert!(temp.exists());
    assert!(!dirs.store().join("notes.txt").exists());
}

#[tokio::test]
async fn disguised_upload_is_never_stored() {
    let dirs = Dirs::new();
    let catalog = Catalog::new()
        .with_entity(
            EntityMapping::new("profiles")
                .field(FieldMapping::integer("IdProfile").autoincrement().primary())
                .field(
                    FieldMapping::short_string("Avatar")
                        .file(FileSpec::new(dirs.store()).formats(["png"])),
                ),
        )
        .unwrap();
    let client = MockClient::new();
    let mut b = Builder::new(&catalog, "profiles", &client).unwrap();

    let upload = dirs.upload("shell.php", 10).content_type("image/png");
    b.ingest(&Submission::new().file("Avatar", upload)).unwrap();

    assert!(b.errors().has("Avatar", ErrorToken::Format));
    assert!(b.insert().await.unwrap_err().is_validation());
    assert!(!dirs.store().join("shell.php").exists());
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn delete_file_removes_and_blanks() {
    let dirs = Dirs::new();
    std::fs::write(dirs.store().join("a.txt"), b"abc").unwrap();
    let catalog = profiles(&dirs.store());
    let client = MockClient::new().with_rows(vec![Record::new().with("Avatar", "a.txt")]);
    let mut b = Builder::new(&catalog, "profiles", &client).unwrap();

    assert!(b.delete_file(&key("IdProfile", 1), "Avatar").await.unwrap());
    assert!(!dirs.store().join("a.txt").exists());
    assert_eq!(
        client.last().0,
        r#"UPDATE "profiles" SET "Avatar" = $1 WHERE "IdProfile" = $2"#
    );

    let err = b.delete_file(&key("IdProfile", 1), "IdProfile").await.unwrap_err();
    assert!(matches!(err, OrmError::Configuration(_)));
}
