use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use rusqlite::{Connection, InterruptHandle};
use tokio::sync::mpsc as events;
use tokio_util::sync::CancellationToken;

use crate::error::SqlTemplateError;

use super::config::SqliteOptions;
use super::params::NamedParams;
use super::query::{RowEvent, run_command};

static WORKER_IDS: AtomicUsize = AtomicUsize::new(1);

pub(crate) enum Command {
    Query {
        text: String,
        params: NamedParams,
        events: events::Sender<RowEvent>,
        abort: CancellationToken,
    },
    Shutdown,
}

/// Dedicated thread that owns one `rusqlite::Connection` and runs commands in order.
pub(crate) struct SqliteWorker {
    sender: Sender<Command>,
    interrupt: InterruptHandle,
    handle: Option<JoinHandle<()>>,
    id: usize,
}

impl SqliteWorker {
    /// Open the database described by `options` and hand it to a new worker thread.
    pub(crate) fn spawn(options: &SqliteOptions) -> Result<Self, SqlTemplateError> {
        let conn = open_connection(options)?;
        let interrupt = conn.get_interrupt_handle();
        let id = WORKER_IDS.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel::<Command>();
        let handle = thread::Builder::new()
            .name(format!("templated-sql-worker-{id}"))
            .spawn(move || run_worker(conn, &receiver))
            .map_err(|err| {
                SqlTemplateError::ConnectionError(format!(
                    "failed to spawn SQLite worker thread: {err}"
                ))
            })?;
        tracing::trace!(worker = id, db_path = %options.db_path, "SQLite worker started");
        Ok(Self {
            sender,
            interrupt,
            handle: Some(handle),
            id,
        })
    }

    pub(crate) fn send(&self, command: Command) -> Result<(), SqlTemplateError> {
        self.sender
            .send(command)
            .map_err(|_| SqlTemplateError::ConnectionError("SQLite worker closed".into()))
    }

    /// Abort whatever statement the worker is currently stepping.
    pub(crate) fn interrupt(&self) {
        self.interrupt.interrupt();
    }
}

impl Drop for SqliteWorker {
    fn drop(&mut self) {
        let _ = self.sender.send(Command::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!(worker = self.id, "SQLite worker panicked");
            }
        }
        tracing::trace!(worker = self.id, "SQLite worker stopped");
    }
}

fn open_connection(options: &SqliteOptions) -> Result<Connection, SqlTemplateError> {
    let conn = Connection::open(&options.db_path)?;
    if let Some(ms) = options.busy_timeout_ms {
        conn.busy_timeout(std::time::Duration::from_millis(ms))?;
    }
    if options.wal {
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(journal_mode = %mode, "journal mode set");
    }
    Ok(conn)
}

fn run_worker(conn: Connection, receiver: &Receiver<Command>) {
    while let Ok(command) = receiver.recv() {
        match command {
            Command::Query {
                text,
                params,
                events,
                abort,
            } => run_command(&conn, &text, &params, &events, &abort),
            Command::Shutdown => break,
        }
    }
    if let Err((_, err)) = conn.close() {
        tracing::warn!(error = %err, "closing SQLite connection failed");
    }
}
