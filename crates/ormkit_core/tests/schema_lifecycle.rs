mod common;

use common::{connected_dal, contacts_schema, Contact, CONTACTS};
use ormkit_core::{
    sample_schema, ColumnDef, ColumnType, DataAccessLayer, DbError, SampleRecord, TableDef,
    SAMPLE_TABLE,
};

const MALFORMED: TableDef = TableDef {
    name: "contacts; DROP TABLE sample_table",
    columns: &[ColumnDef::primary_key("id", ColumnType::Integer)],
    unique: &[],
};

fn table_ddl(dal: &DataAccessLayer) -> Vec<(String, String)> {
    let conn = dal.engine().unwrap().connect().unwrap();
    let mut stmt = conn
        .prepare(
            "SELECT name, sql FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name;",
        )
        .unwrap();
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap();
    rows.collect::<Result<Vec<_>, _>>().unwrap()
}

fn table_names(dal: &DataAccessLayer) -> Vec<String> {
    table_ddl(dal).into_iter().map(|(name, _)| name).collect()
}

#[test]
fn with_create_builds_registered_tables_on_connect() {
    let dal = connected_dal();
    assert_eq!(table_names(&dal), vec!["contacts", "sample_table"]);
}

#[test]
fn connect_without_create_leaves_store_empty() {
    let mut dal = DataAccessLayer::new(sample_schema().unwrap());
    dal.connect("sqlite::memory:", false, false).unwrap();
    assert!(table_names(&dal).is_empty());

    dal.create_all().unwrap();
    dal.create_all().unwrap();
    assert_eq!(table_names(&dal), vec!["sample_table"]);
}

#[test]
fn reset_then_create_matches_fresh_schema() {
    let dal = connected_dal();
    dal.bulk_insert(&[SampleRecord::new(1), SampleRecord::new(2)])
        .unwrap();
    dal.bulk_insert(&[Contact::new("ada@example.com")]).unwrap();

    dal.reset_db().unwrap();
    assert!(table_names(&dal).is_empty());
    dal.create_all().unwrap();

    let fresh = connected_dal();
    assert_eq!(table_ddl(&dal), table_ddl(&fresh));
    let count = dal.transaction(|session| session.count(&SAMPLE_TABLE)).unwrap();
    assert_eq!(count, 0);
}

#[test]
fn reset_db_tolerates_missing_tables() {
    let mut dal = DataAccessLayer::new(sample_schema().unwrap());
    dal.connect(":memory:", false, false).unwrap();
    dal.reset_db().unwrap();
}

#[test]
fn drop_table_removes_one_table_and_fails_when_absent() {
    let dal = connected_dal();

    dal.drop_table(&CONTACTS).unwrap();
    assert_eq!(table_names(&dal), vec!["sample_table"]);

    let err = dal.drop_table(&CONTACTS).unwrap_err();
    assert!(matches!(err, DbError::Sqlite(_)));
    assert!(err.to_string().contains("no such table"));
}

#[test]
fn malformed_table_names_are_rejected_before_sql_runs() {
    let dal = connected_dal();

    assert!(matches!(
        dal.drop_table(&MALFORMED).unwrap_err(),
        DbError::InvalidSchema(_)
    ));
    let err = dal
        .transaction(|session| session.count(&MALFORMED))
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidSchema(_)));

    assert_eq!(table_names(&dal), vec!["contacts", "sample_table"]);
}

#[test]
fn set_base_model_switches_managed_tables() {
    let mut dal = DataAccessLayer::new(sample_schema().unwrap());
    dal.connect("sqlite::memory:", false, false).unwrap();

    dal.set_base_model(contacts_schema());
    dal.create_all().unwrap();

    assert_eq!(dal.schema().tables().len(), 1);
    assert_eq!(table_names(&dal), vec!["contacts"]);
}

#[test]
fn file_database_persists_across_connections() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("app.db").display());

    let mut first = DataAccessLayer::new(contacts_schema());
    first.connect(&url, false, true).unwrap();
    first.bulk_insert(&[Contact::new("kept@example.com")]).unwrap();
    drop(first);

    let mut second = DataAccessLayer::new(contacts_schema());
    second.connect(&url, false, true).unwrap();
    let stored = second
        .transaction(|session| session.fetch_all::<Contact>())
        .unwrap();

    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].email, "kept@example.com");
    assert_eq!(stored[0].id, Some(1));
}

#[test]
fn invalid_url_is_rejected_and_keeps_previous_connection() {
    let mut dal = connected_dal();

    let err = dal
        .connect("postgres://localhost/app", false, false)
        .unwrap_err();

    assert!(matches!(err, DbError::InvalidUrl(_)));
    assert!(dal.is_connected());
    assert!(!dal.engine().unwrap().is_disposed());
}
