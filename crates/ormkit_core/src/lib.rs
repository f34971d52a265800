//! Thin data access layer over SQLite.
//! Owns the engine, scopes sessions to transactions and manages the schema
//! declared by the caller's model registry.

pub mod config;
pub mod dal;
pub mod db;
pub mod logging;
pub mod model;

pub use dal::{DataAccessLayer, SafeAppendOutcome};
pub use db::{
    BeginMode, ConnectOptions, DatabaseUrl, DbError, DbResult, Engine, Session, SessionFactory,
    SessionObserver, SessionState,
};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::sample::{sample_schema, SampleRecord, SAMPLE_TABLE};
pub use model::schema::{ColumnDef, ColumnType, Record, Schema, TableDef};
