//! Query execution: the fluent [`TemplateQuery`] builder and lazy record streams.

mod cursor;
mod stream;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{CommandDiagnostics, SqlTemplateError};
use crate::markers::{CommandRewriter, Markers, ParamScope, PreparedCommand};
use crate::params::{ParamMap, ParameterSource};
use crate::results::{DynamicRecord, FromRecord};
use crate::sqlite::SqliteConnection;

pub(crate) use cursor::Cursor;
pub use stream::{AsyncRecordStream, RecordStream};

/// Behaviour switches for one execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Close the connection when the cursor is released.
    pub close_on_exit: bool,
    /// For dynamic reads, yield one all-null record carrying the column names when the
    /// result set is empty.
    pub keep_shape: bool,
    /// Deadline for the async terminals, measured from submission. The sync terminals
    /// (`fetch`, `fetch_as`, `execute`) block until the worker answers and ignore it.
    pub timeout: Option<Duration>,
}

impl QueryOptions {
    #[must_use]
    pub fn with_close_on_exit(mut self, close_on_exit: bool) -> Self {
        self.close_on_exit = close_on_exit;
        self
    }

    #[must_use]
    pub fn with_keep_shape(mut self, keep_shape: bool) -> Self {
        self.keep_shape = keep_shape;
        self
    }

    /// Set the async deadline. Has no effect on sync reads.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Fluent builder for running templated SQL against a [`SqliteConnection`].
///
/// Parameters are read once, when [`params`](Self::params) is called. Nothing touches the
/// database until a terminal method runs.
///
/// ```rust
/// use templated_sql::prelude::*;
///
/// # fn main() -> Result<(), SqlTemplateError> {
/// let mut conn = SqliteConnection::new(SqliteOptions::in_memory());
/// let rows: Vec<DynamicRecord> = conn
///     .query("select [[a]] as x, [[b]] as y")
///     .params(&ParamMap::new().with("a", 1).with("b", SqlValue::Null))
///     .open_marker("[[")
///     .close_marker("]]")
///     .fetch()?
///     .collect::<Result<_, _>>()?;
/// assert_eq!(rows[0].get("x"), Some(&SqlValue::Int(1)));
/// assert_eq!(rows[0].get("y"), Some(&SqlValue::Null));
/// # Ok(())
/// # }
/// ```
pub struct TemplateQuery<'c> {
    conn: &'c mut SqliteConnection,
    sql: String,
    params: Option<Result<ParamMap, SqlTemplateError>>,
    markers: Markers,
    scopes: Result<Vec<ParamScope>, SqlTemplateError>,
    options: QueryOptions,
}

impl<'c> TemplateQuery<'c> {
    pub(crate) fn new(conn: &'c mut SqliteConnection, sql: String) -> Self {
        Self {
            conn,
            sql,
            params: None,
            markers: Markers::default(),
            scopes: Ok(Vec::new()),
            options: QueryOptions::default(),
        }
    }

    /// Read placeholder values from `source`. Without this every placeholder is null.
    #[must_use]
    pub fn params<P: ParameterSource + ?Sized>(mut self, source: &P) -> Self {
        self.params = Some(source.to_param_map());
        self
    }

    /// Add another parameter source with its own markers and null literal.
    ///
    /// Sources are applied in order, after [`params`](Self::params) if it was called, and
    /// each one nulls the placeholders it cannot resolve. A name bound by two sources gets
    /// two parameters, `@qp_1_x` and `@qp_2_x`.
    ///
    /// ```rust
    /// use templated_sql::prelude::*;
    ///
    /// # fn main() -> Result<(), SqlTemplateError> {
    /// let mut conn = SqliteConnection::new(SqliteOptions::in_memory());
    /// let total: Vec<i64> = conn
    ///     .query("select {{x}} + <x>")
    ///     .scope(Markers::default(), &ParamMap::new().with("x", 1))
    ///     .scope(Markers::new("<", ">"), &ParamMap::new().with("x", 2))
    ///     .fetch_as::<i64>()?
    ///     .collect::<Result<_, _>>()?;
    /// assert_eq!(total, vec![3]);
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn scope<P: ParameterSource + ?Sized>(mut self, markers: Markers, source: &P) -> Self {
        self.scopes = self.scopes.and_then(|mut scopes| {
            scopes.push(ParamScope::new(markers, source.to_param_map()?));
            Ok(scopes)
        });
        self
    }

    #[must_use]
    pub fn markers(mut self, markers: Markers) -> Self {
        self.markers = markers;
        self
    }

    #[must_use]
    pub fn open_marker(mut self, open: impl Into<String>) -> Self {
        self.markers = self.markers.with_open(open);
        self
    }

    #[must_use]
    pub fn close_marker(mut self, close: impl Into<String>) -> Self {
        self.markers = self.markers.with_close(close);
        self
    }

    /// Text spliced in for placeholders that resolve to null.
    #[must_use]
    pub fn null_literal(mut self, null_literal: impl Into<String>) -> Self {
        self.markers = self.markers.with_null_replacement(null_literal);
        self
    }

    #[must_use]
    pub fn close_on_exit(mut self, close_on_exit: bool) -> Self {
        self.options.close_on_exit = close_on_exit;
        self
    }

    #[must_use]
    pub fn keep_shape(mut self, keep_shape: bool) -> Self {
        self.options.keep_shape = keep_shape;
        self
    }

    #[must_use]
    pub fn options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    /// Rewrite the template. Failures carry the raw query and parameters.
    ///
    /// The builder's own params and markers form the first scope unless only
    /// [`scope`](Self::scope) sources were given.
    fn prepare(
        sql: &str,
        params: Option<Result<ParamMap, SqlTemplateError>>,
        markers: Markers,
        scopes: Result<Vec<ParamScope>, SqlTemplateError>,
    ) -> Result<PreparedCommand, SqlTemplateError> {
        if sql.trim().is_empty() {
            return Err(SqlTemplateError::InvalidArgument("query text must not be empty".into())
                .with_diagnostics(CommandDiagnostics::from_raw(sql, [])));
        }
        let raw_failure = |e: SqlTemplateError| e.with_diagnostics(CommandDiagnostics::from_raw(sql, []));
        let extra = scopes.map_err(raw_failure)?;
        let mut all = Vec::with_capacity(extra.len() + 1);
        match params {
            Some(params) => all.push(ParamScope::new(markers, params.map_err(raw_failure)?)),
            None if extra.is_empty() => all.push(ParamScope::new(markers, ParamMap::new())),
            None => {}
        }
        all.extend(extra);

        CommandRewriter::new().rewrite(sql, &all).map_err(|e| {
            e.with_diagnostics(CommandDiagnostics::from_raw(sql, all.iter().map(|s| &s.params)))
        })
    }

    fn into_parts(self) -> Result<(&'c mut SqliteConnection, PreparedCommand, QueryOptions), SqlTemplateError> {
        let Self {
            conn,
            sql,
            params,
            markers,
            scopes,
            options,
        } = self;
        match Self::prepare(&sql, params, markers, scopes) {
            Ok(command) => Ok((conn, command, options)),
            Err(err) => {
                if options.close_on_exit {
                    conn.close();
                }
                Err(err)
            }
        }
    }

    /// Run the query and stream dynamic records.
    ///
    /// # Errors
    /// Returns `Execution` if the command cannot be prepared, submitted, or started.
    pub fn fetch(self) -> Result<RecordStream<'c, DynamicRecord>, SqlTemplateError> {
        let (conn, command, options) = self.into_parts()?;
        run_fetch(conn, &command, options)
    }

    /// Run the query and stream rows mapped onto `T`.
    ///
    /// # Errors
    /// Returns `Execution` if the command cannot be prepared, submitted, or started.
    pub fn fetch_as<T: FromRecord>(self) -> Result<RecordStream<'c, T>, SqlTemplateError> {
        let (conn, command, options) = self.into_parts()?;
        run_fetch_as(conn, &command, options)
    }

    /// Run the command for its effect, reading through any rows it produces.
    ///
    /// # Errors
    /// Returns `Execution` if the command cannot be started, or the underlying error if it
    /// fails after producing rows.
    pub fn execute(self) -> Result<(), SqlTemplateError> {
        let (conn, command, options) = self.into_parts()?;
        run_execute(conn, &command, options)
    }

    /// Async [`fetch`](Self::fetch).
    ///
    /// # Errors
    /// As [`fetch`](Self::fetch), plus `Cancelled` when `cancel` fires or the timeout passes.
    pub async fn fetch_async(
        self,
        cancel: Option<&CancellationToken>,
    ) -> Result<AsyncRecordStream<'c, DynamicRecord>, SqlTemplateError> {
        let (conn, command, options) = self.into_parts()?;
        run_fetch_async(conn, &command, options, cancel).await
    }

    /// Async [`fetch_as`](Self::fetch_as).
    ///
    /// # Errors
    /// As [`fetch_as`](Self::fetch_as), plus `Cancelled` when `cancel` fires or the timeout
    /// passes.
    pub async fn fetch_as_async<T: FromRecord>(
        self,
        cancel: Option<&CancellationToken>,
    ) -> Result<AsyncRecordStream<'c, T>, SqlTemplateError> {
        let (conn, command, options) = self.into_parts()?;
        run_fetch_as_async(conn, &command, options, cancel).await
    }

    /// Async [`execute`](Self::execute).
    ///
    /// # Errors
    /// As [`execute`](Self::execute), plus `Cancelled` when `cancel` fires or the timeout
    /// passes.
    pub async fn execute_async(
        self,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), SqlTemplateError> {
        let (conn, command, options) = self.into_parts()?;
        run_execute_async(conn, &command, options, cancel).await
    }
}

pub(crate) fn run_fetch<'c>(
    conn: &'c mut SqliteConnection,
    command: &PreparedCommand,
    options: QueryOptions,
) -> Result<RecordStream<'c, DynamicRecord>, SqlTemplateError> {
    Cursor::open(conn, command, options).map(RecordStream::new)
}

pub(crate) fn run_fetch_as<'c, T: FromRecord>(
    conn: &'c mut SqliteConnection,
    command: &PreparedCommand,
    options: QueryOptions,
) -> Result<RecordStream<'c, T>, SqlTemplateError> {
    Cursor::open(conn, command, options.with_keep_shape(false)).map(RecordStream::new)
}

pub(crate) fn run_execute(
    conn: &mut SqliteConnection,
    command: &PreparedCommand,
    options: QueryOptions,
) -> Result<(), SqlTemplateError> {
    let mut cursor = Cursor::open(conn, command, options.with_keep_shape(false))?;
    while let Some(row) = cursor.next_blocking() {
        row?;
    }
    Ok(())
}

pub(crate) async fn run_fetch_async<'c>(
    conn: &'c mut SqliteConnection,
    command: &PreparedCommand,
    options: QueryOptions,
    cancel: Option<&CancellationToken>,
) -> Result<AsyncRecordStream<'c, DynamicRecord>, SqlTemplateError> {
    Cursor::open_async(conn, command, options, cancel)
        .await
        .map(AsyncRecordStream::new)
}

pub(crate) async fn run_fetch_as_async<'c, T: FromRecord>(
    conn: &'c mut SqliteConnection,
    command: &PreparedCommand,
    options: QueryOptions,
    cancel: Option<&CancellationToken>,
) -> Result<AsyncRecordStream<'c, T>, SqlTemplateError> {
    Cursor::open_async(conn, command, options.with_keep_shape(false), cancel)
        .await
        .map(AsyncRecordStream::new)
}

pub(crate) async fn run_execute_async(
    conn: &mut SqliteConnection,
    command: &PreparedCommand,
    options: QueryOptions,
    cancel: Option<&CancellationToken>,
) -> Result<(), SqlTemplateError> {
    let mut cursor = Cursor::open_async(conn, command, options.with_keep_shape(false), cancel).await?;
    while let Some(row) = cursor.next_async().await {
        row?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteOptions;

    #[test]
    fn empty_sql_is_an_invalid_argument() {
        let mut conn = SqliteConnection::new(SqliteOptions::in_memory());
        let err = conn.query("   ").execute().unwrap_err();
        assert!(matches!(err.root(), SqlTemplateError::InvalidArgument(_)));
        assert!(!conn.is_open());
    }

    #[test]
    fn bad_parameter_source_fails_before_touching_the_database() {
        let mut conn = SqliteConnection::new(SqliteOptions::in_memory());
        let err = conn
            .query("select {{a}}")
            .params(&serde_json::json!([1, 2]))
            .fetch()
            .err()
            .unwrap();
        assert!(matches!(err.root(), SqlTemplateError::InvalidArgument(_)));
        assert!(!conn.is_open());
    }

    #[test]
    fn opens_lazily_and_reports_rewritten_text_on_failure() {
        let mut conn = SqliteConnection::new(SqliteOptions::in_memory());
        let err = conn
            .query("select * from missing_table where id = {{id}}")
            .params(&ParamMap::new().with("id", 42))
            .fetch()
            .err()
            .unwrap();
        assert!(conn.is_open());
        let msg = err.to_string();
        assert!(msg.contains("select * from missing_table where id = @qp_1_id"), "{msg}");
        assert!(msg.contains("@qp_1_id = 42"), "{msg}");
        assert!(matches!(err.root(), SqlTemplateError::Sqlite(_)));
    }

    #[test]
    fn each_scope_binds_the_same_name_separately() {
        let command = TemplateQuery::prepare(
            "select {{x}} as a, [[x]] as b, [[y]] as c",
            None,
            Markers::default(),
            Ok(vec![
                ParamScope::new(Markers::default(), ParamMap::new().with("x", 1)),
                ParamScope::new(
                    Markers::new("[[", "]]").with_null_replacement("NULL"),
                    ParamMap::new().with("X", 2),
                ),
            ]),
        )
        .unwrap();
        assert_eq!(command.text, "select @qp_1_x as a, @qp_2_x as b, NULL as c");
        let names: Vec<_> = command.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["@qp_1_x", "@qp_2_x"]);
    }

    #[test]
    fn builder_params_come_before_extra_scopes() {
        let command = TemplateQuery::prepare(
            "select {{x}}, <x>",
            Some(Ok(ParamMap::new().with("x", 1))),
            Markers::default(),
            Ok(vec![ParamScope::new(
                Markers::new("<", ">"),
                ParamMap::new().with("x", 2),
            )]),
        )
        .unwrap();
        assert_eq!(command.text, "select @qp_1_x, @qp_2_x");
        assert_eq!(command.params[1].value, crate::types::SqlValue::Int(2));
    }

    #[test]
    fn failing_scope_source_is_reported_before_running() {
        let mut conn = SqliteConnection::new(SqliteOptions::in_memory());
        let err = conn
            .query("select {{x}}")
            .scope(Markers::default(), &serde_json::json!("scalar"))
            .execute()
            .unwrap_err();
        assert!(matches!(err.root(), SqlTemplateError::InvalidArgument(_)));
        assert!(!conn.is_open());
    }

    #[test]
    fn sync_reads_ignore_the_async_deadline() {
        let mut conn = SqliteConnection::new(SqliteOptions::in_memory());
        let rows: Vec<i64> = conn
            .query("with recursive c(x) as (select 1 union all select x + 1 from c where x < 50000) select count(*) from c")
            .options(QueryOptions::default().with_timeout(Duration::from_nanos(1)))
            .fetch_as::<i64>()
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rows, vec![50000]);
    }

    #[test]
    fn close_on_exit_closes_after_exhaustion() {
        let mut conn = SqliteConnection::new(SqliteOptions::in_memory());
        let rows: Vec<i64> = conn
            .query("select 1 union all select 2")
            .close_on_exit(true)
            .fetch_as::<i64>()
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rows, vec![1, 2]);
        assert!(!conn.is_open());
    }

    #[test]
    fn keep_shape_only_applies_to_dynamic_reads() {
        let mut conn = SqliteConnection::open_with(SqliteOptions::in_memory()).unwrap();
        conn.query("create table p (name text, age integer)").execute().unwrap();

        let shaped: Vec<DynamicRecord> = conn
            .query("select name, age from p")
            .keep_shape(true)
            .fetch()
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(shaped.len(), 1);
        assert_eq!(shaped[0].columns().names(), ["name", "age"]);
        assert!(shaped[0].values().iter().all(crate::types::SqlValue::is_null));

        let typed: Vec<Option<String>> = conn
            .query("select name from p")
            .keep_shape(true)
            .fetch_as::<Option<String>>()
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert!(typed.is_empty());
    }
}
