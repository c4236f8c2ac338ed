use std::sync::Arc;

use rusqlite::types::Value;
use rusqlite::{Batch, Connection, Statement};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::SqlTemplateError;
use crate::results::Columns;
use crate::types::SqlValue;

use super::params::{NamedParams, sqlite_to_sql_value};

/// What the worker reports back while running one command.
#[derive(Debug)]
pub(crate) enum RowEvent {
    /// The cursor has been stepped once; rows (if any) follow.
    Ready(Arc<Columns>),
    Row(Vec<SqlValue>),
    Failed(SqlTemplateError),
    Finished,
}

/// Run every statement of `text`, streaming the first row-producing statement to `events`.
///
/// If the command started outside a transaction and fails while one is open, the
/// transaction is rolled back before the failure is reported. Once `abort` fires, no further
/// statement is started and the command fails with `Cancelled`.
pub(crate) fn run_command(
    conn: &Connection,
    text: &str,
    params: &NamedParams,
    events: &mpsc::Sender<RowEvent>,
    abort: &CancellationToken,
) {
    let was_autocommit = conn.is_autocommit();
    match run_statements(conn, text, params, events, abort) {
        Ok(()) => {
            let _ = events.blocking_send(RowEvent::Finished);
        }
        Err(err) => {
            if was_autocommit && !conn.is_autocommit() {
                match conn.execute_batch("ROLLBACK") {
                    Ok(()) => tracing::debug!("rolled back open transaction after failure"),
                    Err(rollback_err) => {
                        tracing::warn!(error = %rollback_err, "rollback after failure did not complete");
                    }
                }
            }
            if let Err(mpsc::error::SendError(RowEvent::Failed(err))) =
                events.blocking_send(RowEvent::Failed(err))
            {
                tracing::warn!(error = %err, "command failed after its reader was released");
            }
        }
    }
}

fn run_statements(
    conn: &Connection,
    text: &str,
    params: &NamedParams,
    events: &mpsc::Sender<RowEvent>,
    abort: &CancellationToken,
) -> Result<(), SqlTemplateError> {
    let mut batch = Batch::new(conn, text);
    let mut cursor_taken = false;
    let mut reader_gone = false;

    loop {
        if abort.is_cancelled() {
            return Err(SqlTemplateError::Cancelled);
        }
        let Some(mut stmt) = batch.next()? else { break };
        bind_named(&mut stmt, params)?;
        if stmt.column_count() == 0 {
            stmt.raw_execute()?;
            continue;
        }
        if cursor_taken {
            let mut rows = stmt.raw_query();
            while rows.next()?.is_some() {}
            continue;
        }

        cursor_taken = true;
        let columns = Arc::new(Columns::new(
            stmt.column_names().into_iter().map(str::to_owned).collect(),
        ));
        let width = columns.len();
        let mut rows = stmt.raw_query();
        let mut pending = rows.next()?.map(|row| read_row(row, width)).transpose()?;

        if events.blocking_send(RowEvent::Ready(columns)).is_err() {
            reader_gone = true;
        }
        while !reader_gone {
            let Some(values) = pending.take() else { break };
            if events.blocking_send(RowEvent::Row(values)).is_err() {
                reader_gone = true;
                break;
            }
            pending = rows.next()?.map(|row| read_row(row, width)).transpose()?;
        }
        if reader_gone {
            tracing::trace!("cursor released early; finishing remaining statements");
        }
    }

    if !cursor_taken {
        let _ = events.blocking_send(RowEvent::Ready(Arc::new(Columns::default())));
    }
    Ok(())
}

/// Bind whichever of the named parameters this statement references.
fn bind_named(stmt: &mut Statement<'_>, params: &NamedParams) -> Result<(), SqlTemplateError> {
    for (name, value) in &params.0 {
        if let Some(idx) = stmt.parameter_index(name)? {
            stmt.raw_bind_parameter(idx, value)?;
        }
    }
    Ok(())
}

fn read_row(row: &rusqlite::Row<'_>, width: usize) -> Result<Vec<SqlValue>, SqlTemplateError> {
    (0..width)
        .map(|idx| Ok(sqlite_to_sql_value(row.get::<_, Value>(idx)?)))
        .collect()
}
