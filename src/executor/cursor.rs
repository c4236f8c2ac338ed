use std::future::pending;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::error::{CommandDiagnostics, SqlTemplateError};
use crate::markers::PreparedCommand;
use crate::results::Columns;
use crate::sqlite::SqliteConnection;
use crate::sqlite::query::RowEvent;
use crate::types::SqlValue;

use super::QueryOptions;

/// The live read side of one command.
///
/// Holds the connection for as long as rows can still arrive. Releasing drops the event
/// receiver (the worker stops stepping) and, with `close_on_exit`, closes the connection.
/// Release happens on exhaustion, failure, cancellation, and drop, at most once.
pub(crate) struct Cursor<'c> {
    conn: &'c mut SqliteConnection,
    events: Option<mpsc::Receiver<RowEvent>>,
    columns: Arc<Columns>,
    options: QueryOptions,
    abort: CancellationToken,
    cancel: Option<CancellationToken>,
    deadline: Option<Instant>,
    rows_seen: bool,
}

impl<'c> Cursor<'c> {
    fn submit(
        conn: &'c mut SqliteConnection,
        command: &PreparedCommand,
        options: QueryOptions,
        cancel: Option<&CancellationToken>,
    ) -> Result<Self, SqlTemplateError> {
        tracing::debug!(
            bound = command.params.len(),
            text_len = command.text.len(),
            "submitting templated command"
        );
        let abort = CancellationToken::new();
        let receiver = match conn.submit(command, abort.clone()) {
            Ok(receiver) => receiver,
            Err(err) => {
                if options.close_on_exit {
                    conn.close();
                }
                return Err(err.with_diagnostics(CommandDiagnostics::from_command(command)));
            }
        };
        let deadline = options.timeout.map(|t| Instant::now() + t);
        Ok(Self {
            conn,
            events: Some(receiver),
            columns: Arc::new(Columns::default()),
            options,
            abort,
            cancel: cancel.cloned(),
            deadline,
            rows_seen: false,
        })
    }

    /// Submit `command` and block until the first row is ready or the command fails.
    pub(crate) fn open(
        conn: &'c mut SqliteConnection,
        command: &PreparedCommand,
        options: QueryOptions,
    ) -> Result<Self, SqlTemplateError> {
        let mut cursor = Self::submit(conn, command, options, None)?;
        let first = cursor.recv_blocking();
        cursor.accept_first(first, command)?;
        Ok(cursor)
    }

    /// Async form of [`open`](Self::open), honouring `cancel` and the options' timeout.
    pub(crate) async fn open_async(
        conn: &'c mut SqliteConnection,
        command: &PreparedCommand,
        options: QueryOptions,
        cancel: Option<&CancellationToken>,
    ) -> Result<Self, SqlTemplateError> {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            if options.close_on_exit {
                conn.close();
            }
            return Err(SqlTemplateError::Cancelled
                .with_diagnostics(CommandDiagnostics::from_command(command)));
        }
        let mut cursor = Self::submit(conn, command, options, cancel)?;
        let first = cursor.recv_async().await;
        cursor.accept_first(first, command)?;
        Ok(cursor)
    }

    fn accept_first(
        &mut self,
        first: Result<Option<RowEvent>, SqlTemplateError>,
        command: &PreparedCommand,
    ) -> Result<(), SqlTemplateError> {
        let failure = match first {
            Ok(Some(RowEvent::Ready(columns))) => {
                self.columns = columns;
                return Ok(());
            }
            Ok(Some(RowEvent::Failed(err))) | Err(err) => err,
            Ok(Some(RowEvent::Row(_) | RowEvent::Finished)) => SqlTemplateError::ConnectionError(
                "SQLite worker sent rows before the result shape".into(),
            ),
            Ok(None) => SqlTemplateError::ConnectionError(
                "SQLite worker dropped before the command started".into(),
            ),
        };
        if failure.is_cancelled() {
            self.abort_worker();
        }
        self.release();
        Err(failure.with_diagnostics(CommandDiagnostics::from_command(command)))
    }

    pub(crate) fn columns(&self) -> &Arc<Columns> {
        &self.columns
    }

    pub(crate) fn next_blocking(&mut self) -> Option<Result<Vec<SqlValue>, SqlTemplateError>> {
        let event = self.recv_blocking();
        self.handle(event)
    }

    pub(crate) async fn next_async(&mut self) -> Option<Result<Vec<SqlValue>, SqlTemplateError>> {
        let event = self.recv_async().await;
        self.handle(event)
    }

    fn recv_blocking(&mut self) -> Result<Option<RowEvent>, SqlTemplateError> {
        Ok(match self.events.as_mut() {
            Some(events) => events.blocking_recv(),
            None => None,
        })
    }

    async fn recv_async(&mut self) -> Result<Option<RowEvent>, SqlTemplateError> {
        let Some(events) = self.events.as_mut() else {
            return Ok(None);
        };
        let cancel = self.cancel.as_ref();
        let deadline = self.deadline;
        tokio::select! {
            biased;
            () = cancelled(cancel) => Err(SqlTemplateError::Cancelled),
            () = expired(deadline) => Err(SqlTemplateError::Cancelled),
            event = events.recv() => Ok(event),
        }
    }

    /// Turn one worker event into the next item, releasing on anything terminal.
    fn handle(
        &mut self,
        event: Result<Option<RowEvent>, SqlTemplateError>,
    ) -> Option<Result<Vec<SqlValue>, SqlTemplateError>> {
        if self.events.is_none() {
            return None;
        }
        match event {
            Ok(Some(RowEvent::Row(values))) => {
                self.rows_seen = true;
                Some(Ok(values))
            }
            Ok(Some(RowEvent::Finished)) => {
                let shape = self.options.keep_shape && !self.rows_seen && !self.columns.is_empty();
                self.release();
                shape.then(Vec::new).map(Ok)
            }
            Ok(Some(RowEvent::Failed(err))) => {
                self.release();
                Some(Err(err))
            }
            Ok(Some(RowEvent::Ready(_))) => {
                self.release();
                Some(Err(SqlTemplateError::ConnectionError(
                    "SQLite worker announced a second result shape".into(),
                )))
            }
            Ok(None) => {
                self.release();
                Some(Err(SqlTemplateError::ConnectionError(
                    "SQLite worker dropped while reading rows".into(),
                )))
            }
            Err(err) => {
                if err.is_cancelled() {
                    self.abort_worker();
                }
                self.release();
                Some(Err(err))
            }
        }
    }

    /// Stop the worker from starting further statements and interrupt the current one.
    fn abort_worker(&mut self) {
        tracing::debug!("command cancelled; interrupting worker");
        self.abort.cancel();
        self.conn.interrupt();
    }

    /// Release the cursor. Safe to call more than once.
    pub(crate) fn release(&mut self) {
        if self.events.take().is_none() {
            return;
        }
        if self.options.close_on_exit {
            self.conn.close();
        }
    }
}

impl Drop for Cursor<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => pending().await,
    }
}

async fn expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
