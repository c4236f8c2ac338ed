use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::SqlTemplateError;
use crate::results::{Columns, FromRecord};

use super::cursor::Cursor;

/// Rows of one command, read lazily on the calling thread.
///
/// Every item is produced at most once and in cursor order. Dropping the stream releases the
/// cursor; with `close_on_exit` that also closes the connection. Must not be polled from
/// inside an async runtime; use [`AsyncRecordStream`] there.
pub struct RecordStream<'c, T> {
    cursor: Cursor<'c>,
    _row: PhantomData<fn() -> T>,
}

impl<'c, T: FromRecord> RecordStream<'c, T> {
    pub(crate) fn new(cursor: Cursor<'c>) -> Self {
        Self {
            cursor,
            _row: PhantomData,
        }
    }

    /// Column names of the result set being read. Empty when the command returned no rows
    /// shape at all.
    #[must_use]
    pub fn columns(&self) -> &Arc<Columns> {
        self.cursor.columns()
    }

    /// Stop reading and release the cursor now.
    pub fn close(mut self) {
        self.cursor.release();
    }
}

impl<T: FromRecord> Iterator for RecordStream<'_, T> {
    type Item = Result<T, SqlTemplateError>;

    fn next(&mut self) -> Option<Self::Item> {
        let values = self.cursor.next_blocking()?;
        Some(values.map(|values| T::from_record(self.cursor.columns(), values)))
    }
}

/// Rows of one command, read lazily from async code.
///
/// Each read yields to the runtime and observes the cancellation token and timeout the
/// query was started with.
pub struct AsyncRecordStream<'c, T> {
    cursor: Cursor<'c>,
    _row: PhantomData<fn() -> T>,
}

impl<'c, T: FromRecord> AsyncRecordStream<'c, T> {
    pub(crate) fn new(cursor: Cursor<'c>) -> Self {
        Self {
            cursor,
            _row: PhantomData,
        }
    }

    #[must_use]
    pub fn columns(&self) -> &Arc<Columns> {
        self.cursor.columns()
    }

    /// Read the next row; `None` once the stream is exhausted or released.
    pub async fn next(&mut self) -> Option<Result<T, SqlTemplateError>> {
        let values = self.cursor.next_async().await?;
        Some(values.map(|values| T::from_record(self.cursor.columns(), values)))
    }

    /// Read every remaining row.
    ///
    /// # Errors
    /// Returns the first read failure; the cursor is released either way.
    pub async fn try_collect(mut self) -> Result<Vec<T>, SqlTemplateError> {
        let mut rows = Vec::new();
        while let Some(row) = self.next().await {
            rows.push(row?);
        }
        Ok(rows)
    }

    /// Stop reading and release the cursor now.
    pub fn close(mut self) {
        self.cursor.release();
    }
}
