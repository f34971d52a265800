//! Connection URL parsing.

use super::{DbError, DbResult};
use std::path::PathBuf;

/// Resolved SQLite target for a connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseUrl {
    /// Private in-memory store, shared by every session of one engine.
    Memory,
    /// On-disk database file.
    File(PathBuf),
}

impl DatabaseUrl {
    /// Parses `sqlite::memory:`, `sqlite://:memory:`, `:memory:`,
    /// `sqlite://<path>`, `sqlite:<path>` or a bare path.
    pub fn parse(raw: &str) -> DbResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DbError::InvalidUrl(raw.to_string()));
        }

        let target = if let Some(rest) = trimmed.strip_prefix("sqlite://") {
            rest
        } else if let Some(rest) = trimmed.strip_prefix("sqlite:") {
            rest
        } else if trimmed.contains("://") {
            return Err(DbError::InvalidUrl(raw.to_string()));
        } else {
            trimmed
        };

        match target {
            "" => Err(DbError::InvalidUrl(raw.to_string())),
            ":memory:" | ":memory" => Ok(Self::Memory),
            path => Ok(Self::File(PathBuf::from(path))),
        }
    }

    pub fn is_memory(&self) -> bool {
        matches!(self, Self::Memory)
    }

    /// Short label used in log events.
    pub(crate) fn mode(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File(_) => "file",
        }
    }
}
