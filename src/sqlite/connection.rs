use std::fmt;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::SqlTemplateError;
use crate::executor::TemplateQuery;
use crate::markers::PreparedCommand;

use super::config::SqliteOptions;
use super::params::NamedParams;
use super::query::RowEvent;
use super::worker::{Command, SqliteWorker};

/// A `SQLite` connection whose database handle lives on a dedicated worker thread.
///
/// The connection starts closed; [`open`](Self::open) is explicit, and running a query
/// opens it on demand.
///
/// ```rust
/// use templated_sql::prelude::*;
///
/// # fn main() -> Result<(), SqlTemplateError> {
/// let mut conn = SqliteConnection::new(SqliteOptions::in_memory());
/// let total: i64 = conn
///     .query("select {{a}} + {{b}}")
///     .params(&ParamMap::new().with("a", 2).with("b", 3))
///     .fetch_as::<i64>()?
///     .next()
///     .transpose()?
///     .unwrap_or_default();
/// assert_eq!(total, 5);
/// # Ok(())
/// # }
/// ```
pub struct SqliteConnection {
    options: SqliteOptions,
    worker: Option<SqliteWorker>,
}

impl SqliteConnection {
    /// A closed connection for `options`.
    #[must_use]
    pub fn new(options: SqliteOptions) -> Self {
        Self {
            options,
            worker: None,
        }
    }

    /// Build and open a connection in one step.
    ///
    /// # Errors
    /// Returns `Sqlite` if the database cannot be opened, or `ConnectionError` if the
    /// worker thread cannot be spawned.
    pub fn open_with(options: SqliteOptions) -> Result<Self, SqlTemplateError> {
        let mut conn = Self::new(options);
        conn.open()?;
        Ok(conn)
    }

    /// Open the database. Does nothing if already open.
    ///
    /// # Errors
    /// Returns `Sqlite` if the database cannot be opened, or `ConnectionError` if the
    /// worker thread cannot be spawned.
    pub fn open(&mut self) -> Result<(), SqlTemplateError> {
        if self.worker.is_none() {
            self.worker = Some(SqliteWorker::spawn(&self.options)?);
        }
        Ok(())
    }

    /// Close the database, waiting for the worker to finish its current command.
    /// Does nothing if already closed.
    pub fn close(&mut self) {
        self.worker = None;
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.worker.is_some()
    }

    #[must_use]
    pub fn options(&self) -> &SqliteOptions {
        &self.options
    }

    /// Start a templated query against this connection.
    pub fn query(&mut self, sql: impl Into<String>) -> TemplateQuery<'_> {
        TemplateQuery::new(self, sql.into())
    }

    /// Hand a prepared command to the worker, opening the connection first if needed.
    pub(crate) fn submit(
        &mut self,
        command: &PreparedCommand,
        abort: CancellationToken,
    ) -> Result<mpsc::Receiver<RowEvent>, SqlTemplateError> {
        self.open()?;
        let worker = self
            .worker
            .as_ref()
            .ok_or_else(|| SqlTemplateError::ConnectionError("connection is closed".into()))?;
        let (events, receiver) = mpsc::channel(1);
        worker.send(Command::Query {
            text: command.text.clone(),
            params: NamedParams::from_bound(&command.params),
            events,
            abort,
        })?;
        Ok(receiver)
    }

    /// Abort the statement currently running on the worker, if any.
    pub(crate) fn interrupt(&self) {
        if let Some(worker) = &self.worker {
            worker.interrupt();
        }
    }
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("db_path", &self.options.db_path)
            .field("open", &self.is_open())
            .finish()
    }
}
