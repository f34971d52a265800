//! Declarative table definitions and the schema registry.
//!
//! # Responsibility
//! - Describe tables as static, const-constructible definitions.
//! - Render `CREATE TABLE` / `DROP TABLE` DDL for the registry.
//! - Define the `Record` contract persisted by sessions.
//!
//! # Invariants
//! - Table and column identifiers match `^[A-Za-z_][A-Za-z0-9_]*$`.
//! - Table names are unique within one `Schema`.
//! - Registration order is creation order; drop order is its reverse.

use crate::db::{DbError, DbResult};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value;
use rusqlite::Row;

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// SQLite storage class for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Blob,
}

impl ColumnType {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
            Self::Blob => "BLOB",
        }
    }
}

/// One column of a table definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub column_type: ColumnType,
    pub primary_key: bool,
    pub nullable: bool,
    pub unique: bool,
}

impl ColumnDef {
    /// Nullable, non-unique column.
    pub const fn new(name: &'static str, column_type: ColumnType) -> Self {
        Self {
            name,
            column_type,
            primary_key: false,
            nullable: true,
            unique: false,
        }
    }

    pub const fn primary_key(name: &'static str, column_type: ColumnType) -> Self {
        Self {
            name,
            column_type,
            primary_key: true,
            nullable: false,
            unique: false,
        }
    }

    pub const fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    fn render(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.column_type.as_sql());
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
        } else if !self.nullable {
            sql.push_str(" NOT NULL");
        }
        if self.unique {
            sql.push_str(" UNIQUE");
        }
        sql
    }
}

/// Static definition of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: &'static [ColumnDef],
    /// Composite `UNIQUE (..)` constraints.
    pub unique: &'static [&'static [&'static str]],
}

impl TableDef {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// Renders idempotent `CREATE TABLE IF NOT EXISTS` DDL.
    pub fn create_sql(&self) -> String {
        let mut parts: Vec<String> = self.columns.iter().map(ColumnDef::render).collect();
        for constraint in self.unique {
            parts.push(format!("UNIQUE ({})", constraint.join(", ")));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n);",
            self.name,
            parts.join(",\n    ")
        )
    }

    pub fn drop_sql(&self, if_exists: bool) -> String {
        if if_exists {
            format!("DROP TABLE IF EXISTS {};", self.name)
        } else {
            format!("DROP TABLE {};", self.name)
        }
    }

    pub fn validate(&self) -> DbResult<()> {
        ensure_identifier(self.name, "table")?;
        if self.columns.is_empty() {
            return Err(DbError::InvalidSchema(format!(
                "table `{}` declares no columns",
                self.name
            )));
        }

        for (index, column) in self.columns.iter().enumerate() {
            ensure_identifier(column.name, "column")?;
            if self.columns[..index].iter().any(|seen| seen.name == column.name) {
                return Err(DbError::InvalidSchema(format!(
                    "duplicate column `{}` in table `{}`",
                    column.name, self.name
                )));
            }
        }

        for constraint in self.unique {
            if constraint.is_empty() {
                return Err(DbError::InvalidSchema(format!(
                    "empty unique constraint in table `{}`",
                    self.name
                )));
            }
            if let Some(missing) = constraint.iter().find(|name| self.column(name).is_none()) {
                return Err(DbError::InvalidSchema(format!(
                    "unique constraint references unknown column `{missing}` in table `{}`",
                    self.name
                )));
            }
        }

        Ok(())
    }
}

fn ensure_identifier(value: &str, kind: &str) -> DbResult<()> {
    if IDENTIFIER_RE.is_match(value) {
        return Ok(());
    }
    Err(DbError::InvalidSchema(format!("invalid {kind} name `{value}`")))
}

/// Explicit model registry handed to the data access layer.
///
/// Replaces a process-global declarative base: each DAL owns the set of
/// tables it manages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    tables: Vec<&'static TableDef>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Schema::register`].
    pub fn with_table(mut self, table: &'static TableDef) -> DbResult<Self> {
        self.register(table)?;
        Ok(self)
    }

    /// Validates and appends a table definition.
    pub fn register(&mut self, table: &'static TableDef) -> DbResult<()> {
        table.validate()?;
        if self.table(table.name).is_some() {
            return Err(DbError::InvalidSchema(format!(
                "table `{}` is already registered",
                table.name
            )));
        }
        self.tables.push(table);
        Ok(())
    }

    pub fn tables(&self) -> &[&'static TableDef] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&'static TableDef> {
        self.tables.iter().copied().find(|table| table.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// A persistable row bound to one table definition.
pub trait Record: Sized {
    const TABLE: &'static TableDef;

    /// Column/value pairs written on insert. Omitted columns take their
    /// SQLite default (e.g. rowid assignment for an integer primary key).
    fn values(&self) -> Vec<(&'static str, Value)>;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}
