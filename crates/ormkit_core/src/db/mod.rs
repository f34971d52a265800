//! SQLite engine, session and error primitives.
//!
//! # Responsibility
//! - Resolve connection URLs into openable SQLite targets.
//! - Own the engine handle and hand out transaction-bound sessions.
//! - Classify SQLite failures into integrity and generic errors.
//!
//! # Invariants
//! - Constraint violations always surface as `DbError::Integrity`.
//! - A disposed engine never opens new connections.

use rusqlite::ErrorCode;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod engine;
pub mod session;
mod url;

pub use engine::{BeginMode, ConnectOptions, Engine};
pub use session::{Session, SessionFactory, SessionObserver, SessionState};
pub use url::DatabaseUrl;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    /// Generic SQLite failure (I/O, syntax, busy, ...).
    Sqlite(rusqlite::Error),
    /// Uniqueness, NOT NULL, CHECK or foreign-key violation.
    Integrity(rusqlite::Error),
    /// An operation ran before `connect`.
    NotConnected,
    /// The engine was replaced by a later `connect`.
    EngineDisposed,
    /// The session was already closed.
    SessionClosed,
    /// A flush failed; the session must be rolled back before reuse.
    NeedsRollback,
    InvalidUrl(String),
    InvalidSchema(String),
    Config(String),
}

impl DbError {
    /// Returns whether this error is a constraint violation.
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity(_))
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Integrity(err) => write!(f, "integrity error: {err}"),
            Self::NotConnected => {
                write!(f, "data access layer is not connected; call connect first")
            }
            Self::EngineDisposed => write!(f, "engine was disposed by a newer connect"),
            Self::SessionClosed => write!(f, "session is closed"),
            Self::NeedsRollback => {
                write!(f, "a previous flush failed; roll back the session before further work")
            }
            Self::InvalidUrl(url) => write!(f, "unsupported database url `{url}`"),
            Self::InvalidSchema(message) => write!(f, "invalid schema: {message}"),
            Self::Config(message) => write!(f, "invalid configuration: {message}"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) | Self::Integrity(err) => Some(err),
            Self::NotConnected
            | Self::EngineDisposed
            | Self::SessionClosed
            | Self::NeedsRollback
            | Self::InvalidUrl(_)
            | Self::InvalidSchema(_)
            | Self::Config(_) => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        if value.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) {
            Self::Integrity(value)
        } else {
            Self::Sqlite(value)
        }
    }
}
