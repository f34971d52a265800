//! Transaction-bound sessions and the factory that produces them.
//!
//! # Responsibility
//! - Bind one SQLite connection and one open transaction to a unit of work.
//! - Stage added records and flush them before queries and commit.
//! - Report lifecycle transitions to an optional observer.
//!
//! # Invariants
//! - A session is closed exactly once; `Drop` closes a session the caller
//!   forgot, rolling back any open transaction first.
//! - Statements on a session whose engine was disposed fail with
//!   `DbError::EngineDisposed`.
//! - After commit or rollback the next statement opens a new transaction.
//! - A failed flush leaves the session in `NeedsRollback`; no further work is
//!   accepted until `rollback` runs, so a partial flush is never committed.

use super::engine::Engine;
use super::{DbError, DbResult};
use crate::model::schema::{Record, TableDef};
use log::{debug, error, info, warn};
use rusqlite::types::{FromSql, Value};
use rusqlite::{params_from_iter, Connection, Params};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Lifecycle hooks fired by every session of a factory.
///
/// All methods default to no-ops.
pub trait SessionObserver: Send + Sync {
    fn on_begin(&self, _session_id: u64) {}
    fn on_commit(&self, _session_id: u64) {}
    fn on_rollback(&self, _session_id: u64) {}
    fn on_close(&self, _session_id: u64) {}
}

/// Produces sessions bound to one engine.
#[derive(Clone)]
pub struct SessionFactory {
    engine: Arc<Engine>,
    observer: Option<Arc<dyn SessionObserver>>,
    next_id: Arc<AtomicU64>,
}

impl SessionFactory {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            observer: None,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn with_observer(mut self, observer: Option<Arc<dyn SessionObserver>>) -> Self {
        self.observer = observer;
        self
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Opens a new connection and begins a transaction on it.
    pub fn create(&self) -> DbResult<Session> {
        let conn = self.engine.connect()?;
        let mut session = Session {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            conn: Some(conn),
            engine: Arc::clone(&self.engine),
            observer: self.observer.clone(),
            pending: Vec::new(),
            in_transaction: false,
            state: SessionState::Active,
        };
        session.begin()?;
        Ok(session)
    }
}

impl std::fmt::Debug for SessionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionFactory")
            .field("engine", &self.engine)
            .field("has_observer", &self.observer.is_some())
            .finish()
    }
}

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    /// A flush failed part-way; only `rollback` or `close` are accepted.
    NeedsRollback,
    Committed,
    RolledBack,
    Closed,
}

#[derive(Debug)]
struct PendingInsert {
    sql: String,
    values: Vec<Value>,
}

/// Unit of work over one connection.
///
/// `Session` is `Send` but not `Sync`: it may move to another thread but is
/// never used from two threads at once.
pub struct Session {
    id: u64,
    conn: Option<Connection>,
    engine: Arc<Engine>,
    observer: Option<Arc<dyn SessionObserver>>,
    pending: Vec<PendingInsert>,
    in_transaction: bool,
    state: SessionState,
}

impl Session {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Number of staged inserts not yet flushed.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Stages an insert; it runs on the next flush, query or commit.
    pub fn add<R: Record>(&mut self, record: &R) -> DbResult<()> {
        self.ensure_usable()?;
        self.pending.push(build_insert(R::TABLE, record));
        Ok(())
    }

    /// Executes staged inserts in the order they were added.
    ///
    /// On failure the unexecuted tail is discarded and the session moves to
    /// `NeedsRollback`.
    pub fn flush(&mut self) -> DbResult<()> {
        self.ensure_usable()?;
        if self.pending.is_empty() {
            return Ok(());
        }
        let pending = std::mem::take(&mut self.pending);
        let echo = self.echo();
        let conn = self.statement_conn()?;
        let result = pending.iter().try_for_each(|insert| -> DbResult<()> {
            echo.log(&insert.sql);
            conn.prepare_cached(&insert.sql)?
                .execute(params_from_iter(insert.values.iter()))?;
            Ok(())
        });
        result.map_err(|err| self.fail_flush(err))
    }

    /// Inserts records immediately, bypassing the staging list.
    ///
    /// Returns the number of rows written.
    pub fn bulk_save<'a, R, I>(&mut self, records: I) -> DbResult<usize>
    where
        R: Record + 'a,
        I: IntoIterator<Item = &'a R>,
    {
        self.flush()?;
        let echo = self.echo();
        let conn = self.statement_conn()?;
        let mut written = 0;
        let result = records.into_iter().try_for_each(|record| -> DbResult<()> {
            let insert = build_insert(R::TABLE, record);
            echo.log(&insert.sql);
            written += conn
                .prepare_cached(&insert.sql)?
                .execute(params_from_iter(insert.values.iter()))?;
            Ok(())
        });
        match result {
            Ok(()) => Ok(written),
            Err(err) => Err(self.fail_flush(err)),
        }
    }

    /// Runs one statement and returns the number of changed rows.
    pub fn execute<P: Params>(&mut self, sql: &str, params: P) -> DbResult<usize> {
        self.flush()?;
        let echo = self.echo();
        let conn = self.statement_conn()?;
        echo.log(sql);
        Ok(conn.execute(sql, params)?)
    }

    /// Reads the first column of the first row.
    pub fn query_scalar<T: FromSql, P: Params>(&mut self, sql: &str, params: P) -> DbResult<T> {
        self.flush()?;
        let echo = self.echo();
        let conn = self.statement_conn()?;
        echo.log(sql);
        Ok(conn.query_row(sql, params, |row| row.get(0))?)
    }

    /// Loads every row of the record's table in rowid order.
    pub fn fetch_all<R: Record>(&mut self) -> DbResult<Vec<R>> {
        R::TABLE.validate()?;
        self.flush()?;
        let sql = format!("SELECT * FROM {} ORDER BY rowid;", R::TABLE.name);
        let echo = self.echo();
        let conn = self.statement_conn()?;
        echo.log(&sql);
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(R::from_row(row)?);
        }
        Ok(records)
    }

    pub fn count(&mut self, table: &TableDef) -> DbResult<i64> {
        table.validate()?;
        self.query_scalar(&format!("SELECT COUNT(*) FROM {};", table.name), [])
    }

    /// Flushes staged work and commits the open transaction.
    pub fn commit(&mut self) -> DbResult<()> {
        self.flush()?;
        let echo = self.echo();
        let conn = self.statement_conn()?;
        echo.log("COMMIT;");
        conn.execute_batch("COMMIT;")?;

        self.in_transaction = false;
        self.state = SessionState::Committed;
        debug!("event=session_commit module=session status=ok session_id={}", self.id);
        if let Some(observer) = &self.observer {
            observer.on_commit(self.id);
        }
        Ok(())
    }

    /// Discards staged work and rolls back the open transaction.
    ///
    /// Allowed on a disposed engine so callers can always release locks.
    pub fn rollback(&mut self) -> DbResult<()> {
        if self.is_closed() {
            return Err(DbError::SessionClosed);
        }
        self.pending.clear();
        if !self.in_transaction {
            if self.state == SessionState::NeedsRollback {
                self.state = SessionState::RolledBack;
            }
            return Ok(());
        }

        let echo = self.echo();
        let result = match &self.conn {
            // SQLite may already have rolled back on its own (e.g. after a
            // failed COMMIT); issuing ROLLBACK then would error.
            Some(conn) if !conn.is_autocommit() => {
                echo.log("ROLLBACK;");
                conn.execute_batch("ROLLBACK;").map_err(DbError::from)
            }
            _ => Ok(()),
        };

        self.in_transaction = false;
        self.state = SessionState::RolledBack;
        warn!("event=session_rollback module=session status=ok session_id={}", self.id);
        if let Some(observer) = &self.observer {
            observer.on_rollback(self.id);
        }
        result
    }

    /// Rolls back any open transaction and releases the connection.
    ///
    /// Repeated calls are no-ops.
    pub fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        if self.in_transaction {
            if let Err(err) = self.rollback() {
                error!(
                    "event=session_close module=session status=error session_id={} error_code=rollback_failed error={}",
                    self.id, err
                );
            }
        }
        self.pending.clear();
        if let Some(conn) = self.conn.take() {
            if let Err((_, err)) = conn.close() {
                error!(
                    "event=session_close module=session status=error session_id={} error_code=close_failed error={}",
                    self.id, err
                );
            }
        }

        self.state = SessionState::Closed;
        info!("event=session_close module=session status=ok session_id={}", self.id);
        if let Some(observer) = &self.observer {
            observer.on_close(self.id);
        }
    }

    fn begin(&mut self) -> DbResult<()> {
        let echo = self.echo();
        let begin_sql = self.engine.begin_mode().sql();
        let conn = self.conn.as_ref().ok_or(DbError::SessionClosed)?;
        echo.log(begin_sql);
        conn.execute_batch(begin_sql)?;

        self.in_transaction = true;
        self.state = SessionState::Active;
        debug!("event=session_begin module=session status=ok session_id={}", self.id);
        if let Some(observer) = &self.observer {
            observer.on_begin(self.id);
        }
        Ok(())
    }

    fn echo(&self) -> SqlEcho {
        SqlEcho {
            enabled: self.engine.echo(),
            session_id: self.id,
        }
    }

    fn ensure_usable(&self) -> DbResult<()> {
        match self.state {
            SessionState::Closed => return Err(DbError::SessionClosed),
            SessionState::NeedsRollback => return Err(DbError::NeedsRollback),
            SessionState::Active | SessionState::Committed | SessionState::RolledBack => {}
        }
        self.engine.ensure_live()
    }

    fn fail_flush(&mut self, err: DbError) -> DbError {
        self.pending.clear();
        self.state = SessionState::NeedsRollback;
        warn!(
            "event=session_flush module=session status=error session_id={} error={}",
            self.id, err
        );
        err
    }

    /// Returns the connection, opening a transaction if none is active.
    fn statement_conn(&mut self) -> DbResult<&Connection> {
        self.ensure_usable()?;
        if !self.in_transaction {
            self.begin()?;
        }
        self.conn.as_ref().ok_or(DbError::SessionClosed)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("in_transaction", &self.in_transaction)
            .field("pending", &self.pending.len())
            .finish()
    }
}

fn build_insert<R: Record>(table: &TableDef, record: &R) -> PendingInsert {
    let (columns, values): (Vec<&'static str>, Vec<Value>) = record.values().into_iter().unzip();
    let sql = if columns.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES;", table.name)
    } else {
        let placeholders = (1..=columns.len())
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({});",
            table.name,
            columns.join(", "),
            placeholders
        )
    };
    PendingInsert { sql, values }
}

/// Statement echo bound to one session, captured before the connection is
/// borrowed.
#[derive(Debug, Clone, Copy)]
struct SqlEcho {
    enabled: bool,
    session_id: u64,
}

impl SqlEcho {
    fn log(self, sql: &str) {
        if self.enabled {
            info!("event=sql module=session session_id={} sql={sql}", self.session_id);
        }
    }
}
