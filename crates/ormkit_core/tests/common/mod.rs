#![allow(dead_code)]

use ormkit_core::{
    sample_schema, ColumnDef, ColumnType, DataAccessLayer, Record, Schema, SessionObserver,
    TableDef,
};
use rusqlite::types::Value;
use rusqlite::Row;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const CONTACTS: TableDef = TableDef {
    name: "contacts",
    columns: &[
        ColumnDef::primary_key("id", ColumnType::Integer),
        ColumnDef::new("email", ColumnType::Text).not_null().unique(),
        ColumnDef::new("name", ColumnType::Text),
    ],
    unique: &[],
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub id: Option<i64>,
    pub email: String,
    pub name: Option<String>,
}

impl Contact {
    pub fn new(email: &str) -> Self {
        Self {
            id: None,
            email: email.to_string(),
            name: None,
        }
    }
}

impl Record for Contact {
    const TABLE: &'static TableDef = &CONTACTS;

    fn values(&self) -> Vec<(&'static str, Value)> {
        let mut values = Vec::with_capacity(3);
        if let Some(id) = self.id {
            values.push(("id", Value::Integer(id)));
        }
        values.push(("email", Value::Text(self.email.clone())));
        values.push((
            "name",
            self.name.clone().map_or(Value::Null, Value::Text),
        ));
        values
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            email: row.get("email")?,
            name: row.get("name")?,
        })
    }
}

pub fn contacts_schema() -> Schema {
    Schema::new().with_table(&CONTACTS).unwrap()
}

/// Sample + contacts registry, connected to a fresh in-memory store with
/// tables created.
pub fn connected_dal() -> DataAccessLayer {
    let mut schema = sample_schema().unwrap();
    schema.register(&CONTACTS).unwrap();
    let mut dal = DataAccessLayer::new(schema);
    dal.connect("sqlite::memory:", false, true).unwrap();
    dal
}

#[derive(Debug, Default)]
pub struct CountingObserver {
    begins: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    closes: AtomicUsize,
}

impl CountingObserver {
    pub fn install(dal: &mut DataAccessLayer) -> Arc<Self> {
        let observer = Arc::new(Self::default());
        dal.set_session_observer(observer.clone());
        observer
    }

    /// `(begins, commits, rollbacks, closes)`
    pub fn counts(&self) -> (usize, usize, usize, usize) {
        (
            self.begins.load(Ordering::SeqCst),
            self.commits.load(Ordering::SeqCst),
            self.rollbacks.load(Ordering::SeqCst),
            self.closes.load(Ordering::SeqCst),
        )
    }
}

impl SessionObserver for CountingObserver {
    fn on_begin(&self, _session_id: u64) {
        self.begins.fetch_add(1, Ordering::SeqCst);
    }

    fn on_commit(&self, _session_id: u64) {
        self.commits.fetch_add(1, Ordering::SeqCst);
    }

    fn on_rollback(&self, _session_id: u64) {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
    }

    fn on_close(&self, _session_id: u64) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
