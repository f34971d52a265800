//! Data access layer: engine ownership and scoped units of work.
//!
//! # Responsibility
//! - Own one engine and one session factory per instance.
//! - Wrap caller work in a transaction with commit/rollback/close guarantees.
//! - Offer batch persistence and schema create/drop against the model registry.
//!
//! # Invariants
//! - Every scoped session is closed exactly once, on every exit path.
//! - Errors are returned unchanged; only `safe_append` converts integrity
//!   violations into data.
//! - All operations except construction and `connect` require a connection.

use crate::db::{
    ConnectOptions, DbError, DbResult, Engine, Session, SessionFactory, SessionObserver,
};
use crate::model::schema::{Record, Schema, TableDef};
use log::{debug, error, info, warn};
use rusqlite::Connection;
use std::fmt::{Debug, Display};
use std::sync::Arc;
use std::time::Instant;

/// Result of [`DataAccessLayer::safe_append`].
///
/// `error_records` and `error_messages` follow the order in which failures
/// occurred, not the input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeAppendOutcome<R> {
    /// Records persisted successfully.
    pub inserted: usize,
    /// Failed records; empty when `keep_errors` was `false`.
    pub error_records: Vec<R>,
    /// One message per failed record.
    pub error_messages: Vec<String>,
}

impl<R> SafeAppendOutcome<R> {
    pub fn failed(&self) -> usize {
        self.error_messages.len()
    }

    pub fn into_parts(self) -> (Vec<R>, Vec<String>) {
        (self.error_records, self.error_messages)
    }
}

/// Session and transaction manager for one database.
///
/// Applications normally keep one instance per database.
pub struct DataAccessLayer {
    schema: Schema,
    engine: Option<Arc<Engine>>,
    factory: Option<SessionFactory>,
    observer: Option<Arc<dyn SessionObserver>>,
}

impl DataAccessLayer {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            engine: None,
            factory: None,
            observer: None,
        }
    }

    /// Swaps the model registry used by schema operations.
    pub fn set_base_model(&mut self, schema: Schema) {
        self.schema = schema;
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Installs lifecycle hooks for sessions created from now on.
    pub fn set_session_observer(&mut self, observer: Arc<dyn SessionObserver>) {
        self.observer = Some(observer);
        if let Some(engine) = &self.engine {
            self.factory =
                Some(SessionFactory::new(Arc::clone(engine)).with_observer(self.observer.clone()));
        }
    }

    /// Builds the engine and session factory.
    ///
    /// `with_create` runs [`DataAccessLayer::create_all`] once connected.
    pub fn connect(&mut self, url: &str, echo: bool, with_create: bool) -> DbResult<()> {
        self.connect_with(
            &ConnectOptions::new(url)
                .echo(echo)
                .with_create(with_create),
        )
    }

    /// Replaces any previous engine; sessions opened against it fail on
    /// their next statement.
    pub fn connect_with(&mut self, options: &ConnectOptions) -> DbResult<()> {
        let engine = Arc::new(Engine::create(options)?);
        if let Some(previous) = self.engine.take() {
            previous.dispose();
        }

        self.factory =
            Some(SessionFactory::new(Arc::clone(&engine)).with_observer(self.observer.clone()));
        self.engine = Some(engine);
        info!(
            "event=dal_connect module=dal status=ok echo={} with_create={}",
            options.echo, options.with_create
        );

        if options.with_create {
            self.create_all()?;
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.engine.is_some()
    }

    pub fn engine(&self) -> DbResult<&Arc<Engine>> {
        self.engine.as_ref().ok_or(DbError::NotConnected)
    }

    /// Runs `work` inside a fresh session.
    ///
    /// Commits when `work` returns `Ok`, rolls back when it returns `Err` or
    /// the commit fails, and closes the session in every case. A panic in
    /// `work` unwinds through the session, which rolls back on drop.
    pub fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut Session) -> Result<T, E>,
        E: From<DbError> + Display,
    {
        let mut session = self.session_factory()?.create()?;

        let outcome = match work(&mut session) {
            Ok(value) => session.commit().map(|()| value).map_err(|err| {
                error!(
                    "event=transaction module=dal status=error session_id={} error_code=commit_failed error={}",
                    session.id(),
                    err
                );
                E::from(err)
            }),
            Err(err) => {
                error!(
                    "event=transaction module=dal status=error session_id={} error_code=work_failed error={}",
                    session.id(),
                    err
                );
                Err(err)
            }
        };

        if outcome.is_err() {
            if let Err(err) = session.rollback() {
                warn!(
                    "event=transaction module=dal status=error session_id={} error_code=rollback_failed error={}",
                    session.id(),
                    err
                );
            }
        }
        session.close();
        outcome
    }

    /// Persists all records in one transaction; any failure rolls back the
    /// whole batch.
    pub fn bulk_insert<'a, R, I>(&self, records: I) -> DbResult<usize>
    where
        R: Record + 'a,
        I: IntoIterator<Item = &'a R>,
    {
        let written = self.transaction(|session| session.bulk_save(records))?;
        info!(
            "event=bulk_insert module=dal status=ok table={} rows={written}",
            R::TABLE.name
        );
        Ok(written)
    }

    /// Persists records one transaction at a time, collecting integrity
    /// failures instead of aborting.
    ///
    /// Non-integrity errors stop processing and are returned.
    pub fn safe_append<R, I>(&self, records: I, keep_errors: bool) -> DbResult<SafeAppendOutcome<R>>
    where
        R: Record + Debug,
        I: IntoIterator<Item = R>,
    {
        let mut outcome = SafeAppendOutcome {
            inserted: 0,
            error_records: Vec::new(),
            error_messages: Vec::new(),
        };

        for record in records {
            let result = self.transaction(|session| {
                debug!(
                    "event=safe_append module=dal status=start table={} record={record:?}",
                    R::TABLE.name
                );
                session.add(&record)
            });

            match result {
                Ok(()) => outcome.inserted += 1,
                Err(DbError::Integrity(err)) => {
                    error!(
                        "event=safe_append module=dal status=error table={} error_code=integrity error={}",
                        R::TABLE.name,
                        err
                    );
                    outcome.error_messages.push(err.to_string());
                    if keep_errors {
                        outcome.error_records.push(record);
                    }
                }
                Err(other) => return Err(other),
            }
        }

        info!(
            "event=safe_append module=dal status=ok table={} inserted={} failed={}",
            R::TABLE.name,
            outcome.inserted,
            outcome.failed()
        );
        Ok(outcome)
    }

    /// Returns an unscoped session; the caller commits or rolls back.
    ///
    /// Dropping it without commit discards its work.
    pub fn get_session(&self) -> DbResult<Session> {
        self.session_factory()?.create()
    }

    /// Drops every registered table, children before parents.
    pub fn reset_db(&self) -> DbResult<()> {
        let conn = self.schema_connection()?;
        let started_at = Instant::now();
        for table in self.schema.tables().iter().rev() {
            run_schema_sql(&conn, "schema_drop", table, &table.drop_sql(true))?;
        }
        info!(
            "event=schema_drop module=dal status=ok tables={} duration_ms={}",
            self.schema.tables().len(),
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    /// Creates every registered table that does not exist yet.
    pub fn create_all(&self) -> DbResult<()> {
        let conn = self.schema_connection()?;
        let started_at = Instant::now();
        for table in self.schema.tables() {
            run_schema_sql(&conn, "schema_create", table, &table.create_sql())?;
        }
        info!(
            "event=schema_create module=dal status=ok tables={} duration_ms={}",
            self.schema.tables().len(),
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    /// Drops one table; fails when it does not exist.
    ///
    /// The definition need not be registered but must be valid.
    pub fn drop_table(&self, table: &TableDef) -> DbResult<()> {
        table.validate()?;
        let conn = self.schema_connection()?;
        run_schema_sql(&conn, "schema_drop", table, &table.drop_sql(false))?;
        info!(
            "event=schema_drop module=dal status=ok table={}",
            table.name
        );
        Ok(())
    }

    fn session_factory(&self) -> DbResult<&SessionFactory> {
        self.factory.as_ref().ok_or(DbError::NotConnected)
    }

    fn schema_connection(&self) -> DbResult<Connection> {
        self.engine()?.connect()
    }
}

impl Debug for DataAccessLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataAccessLayer")
            .field("schema", &self.schema)
            .field("engine", &self.engine)
            .field("has_observer", &self.observer.is_some())
            .finish()
    }
}

fn run_schema_sql(conn: &Connection, event: &str, table: &TableDef, sql: &str) -> DbResult<()> {
    conn.execute_batch(sql).map_err(|err| {
        error!(
            "event={event} module=dal status=error table={} error={}",
            table.name, err
        );
        DbError::from(err)
    })
}
