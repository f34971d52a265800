//! Placeholder entity for newly scaffolded projects.
//!
//! Replace or extend with real tables; nothing in core depends on it.

use super::schema::{ColumnDef, ColumnType, Record, Schema, TableDef};
use crate::db::DbResult;
use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

pub const SAMPLE_TABLE: TableDef = TableDef {
    name: "sample_table",
    // SQLite cannot create a table without columns; keep only the identity.
    columns: &[ColumnDef::primary_key("id", ColumnType::Integer)],
    unique: &[],
};

/// Row of `sample_table`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub id: i64,
}

impl SampleRecord {
    pub fn new(id: i64) -> Self {
        Self { id }
    }
}

impl Record for SampleRecord {
    const TABLE: &'static TableDef = &SAMPLE_TABLE;

    fn values(&self) -> Vec<(&'static str, Value)> {
        vec![("id", Value::Integer(self.id))]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self { id: row.get("id")? })
    }
}

/// Registry holding only the placeholder entity.
pub fn sample_schema() -> DbResult<Schema> {
    Schema::new().with_table(&SAMPLE_TABLE)
}
