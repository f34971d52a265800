//! Engine handle: connection bootstrap for one backing store.
//!
//! # Responsibility
//! - Resolve the configured URL into an openable SQLite target.
//! - Open and configure connections for sessions and schema operations.
//! - Keep in-memory stores alive for the lifetime of the engine.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON` and a busy timeout.
//! - Every connection of one in-memory engine sees the same database.
//! - A disposed engine refuses to open connections.

use super::url::DatabaseUrl;
use super::{DbError, DbResult};
use log::{error, info};
use rusqlite::{Connection, OpenFlags};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// How sessions open their transactions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeginMode {
    /// Locks are taken on first use. A session that reads before writing can
    /// fail with `SQLITE_BUSY` on lock upgrade without waiting.
    Deferred,
    /// The write lock is taken at begin, waiting up to the busy timeout.
    #[default]
    Immediate,
}

impl BeginMode {
    pub(crate) fn sql(self) -> &'static str {
        match self {
            Self::Deferred => "BEGIN DEFERRED;",
            Self::Immediate => "BEGIN IMMEDIATE;",
        }
    }
}

/// Connection settings accepted by `DataAccessLayer::connect_with`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectOptions {
    /// Connection string, see `DatabaseUrl::parse`.
    pub url: String,
    /// Log every executed statement at `info` level.
    #[serde(default)]
    pub echo: bool,
    /// Run `create_all` right after connecting.
    #[serde(default)]
    pub with_create: bool,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default)]
    pub begin_mode: BeginMode,
}

impl ConnectOptions {
    /// Options for `url` with statement echo and schema creation off.
    ///
    /// Both flags are opt-in, unlike a connect call that defaults them on;
    /// `DataAccessLayer::connect` always takes them explicitly.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            echo: false,
            with_create: false,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            begin_mode: BeginMode::default(),
        }
    }

    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn with_create(mut self, with_create: bool) -> Self {
        self.with_create = with_create;
        self
    }

    pub fn begin_mode(mut self, begin_mode: BeginMode) -> Self {
        self.begin_mode = begin_mode;
        self
    }
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Opaque handle to one SQLite store.
///
/// Sessions and schema operations each get their own connection from
/// [`Engine::connect`]; the engine itself never runs application queries.
#[derive(Debug)]
pub struct Engine {
    url: DatabaseUrl,
    target: String,
    echo: bool,
    begin_mode: BeginMode,
    busy_timeout: Duration,
    disposed: AtomicBool,
    // Holds the shared-cache memory database open between sessions.
    anchor: Mutex<Option<Connection>>,
}

impl Engine {
    /// Builds an engine and verifies the target can be opened.
    ///
    /// # Side effects
    /// - Opens one check connection (kept as anchor for in-memory stores).
    /// - Emits `db_open` logging events with duration and status.
    pub fn create(options: &ConnectOptions) -> DbResult<Self> {
        let started_at = Instant::now();
        let url = DatabaseUrl::parse(&options.url)?;
        let mode = url.mode();
        info!("event=db_open module=db status=start mode={mode}");

        let target = match &url {
            DatabaseUrl::Memory => format!("file:ormkit-{}?mode=memory&cache=shared", Uuid::new_v4()),
            DatabaseUrl::File(path) => path.to_string_lossy().into_owned(),
        };

        let engine = Self {
            url,
            target,
            echo: options.echo,
            begin_mode: options.begin_mode,
            busy_timeout: Duration::from_millis(options.busy_timeout_ms),
            disposed: AtomicBool::new(false),
            anchor: Mutex::new(None),
        };

        match engine.connect() {
            Ok(conn) => {
                if engine.url.is_memory() {
                    *engine.lock_anchor() = Some(conn);
                }
                info!(
                    "event=db_open module=db status=ok mode={mode} echo={} duration_ms={}",
                    engine.echo,
                    started_at.elapsed().as_millis()
                );
                Ok(engine)
            }
            Err(err) => {
                error!(
                    "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_open_failed error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Opens a fresh, configured connection to the backing store.
    pub fn connect(&self) -> DbResult<Connection> {
        self.ensure_live()?;
        let conn = match self.url {
            DatabaseUrl::Memory => Connection::open_with_flags(&self.target, OpenFlags::default())?,
            DatabaseUrl::File(ref path) => Connection::open(path)?,
        };
        bootstrap_connection(&conn, self.busy_timeout)?;
        Ok(conn)
    }

    pub fn url(&self) -> &DatabaseUrl {
        &self.url
    }

    pub fn echo(&self) -> bool {
        self.echo
    }

    pub fn begin_mode(&self) -> BeginMode {
        self.begin_mode
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Marks the engine unusable and releases the in-memory anchor.
    ///
    /// Open sessions keep their connection but fail on their next statement.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.lock_anchor().take();
        info!("event=db_dispose module=db status=ok mode={}", self.url.mode());
    }

    pub(crate) fn ensure_live(&self) -> DbResult<()> {
        if self.is_disposed() {
            return Err(DbError::EngineDisposed);
        }
        Ok(())
    }

    fn lock_anchor(&self) -> std::sync::MutexGuard<'_, Option<Connection>> {
        self.anchor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn bootstrap_connection(conn: &Connection, busy_timeout: Duration) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(busy_timeout)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{ConnectOptions, Engine};
    use crate::db::DbError;

    #[test]
    fn memory_engine_shares_one_database_across_connections() {
        let engine = Engine::create(&ConnectOptions::new("sqlite::memory:")).unwrap();
        let first = engine.connect().unwrap();
        first
            .execute_batch("CREATE TABLE shared (id INTEGER PRIMARY KEY); INSERT INTO shared VALUES (7);")
            .unwrap();

        let second = engine.connect().unwrap();
        let id: i64 = second
            .query_row("SELECT id FROM shared;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(id, 7);
    }

    #[test]
    fn separate_memory_engines_are_isolated() {
        let a = Engine::create(&ConnectOptions::new(":memory:")).unwrap();
        let b = Engine::create(&ConnectOptions::new(":memory:")).unwrap();
        a.connect()
            .unwrap()
            .execute_batch("CREATE TABLE only_in_a (id INTEGER);")
            .unwrap();

        let count: i64 = b
            .connect()
            .unwrap()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 'only_in_a';",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn connections_enable_foreign_keys() {
        let engine = Engine::create(&ConnectOptions::new(":memory:")).unwrap();
        let enabled: i64 = engine
            .connect()
            .unwrap()
            .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn disposed_engine_refuses_connections() {
        let engine = Engine::create(&ConnectOptions::new(":memory:")).unwrap();
        engine.dispose();
        engine.dispose();

        assert!(engine.is_disposed());
        assert!(matches!(engine.connect().unwrap_err(), DbError::EngineDisposed));
    }
}
