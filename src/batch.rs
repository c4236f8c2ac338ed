//! Multi-fragment transactional batches.

use std::mem;

use tokio_util::sync::CancellationToken;

use crate::error::{CommandDiagnostics, SqlTemplateError};
use crate::executor::{self, AsyncRecordStream, QueryOptions, RecordStream};
use crate::markers::{CommandRewriter, Markers, ParamScope, PreparedCommand, namespace_fragment};
use crate::params::ParameterSource;
use crate::results::{DynamicRecord, FromRecord};
use crate::sqlite::SqliteConnection;

pub const DEFAULT_OPENING_TEMPLATE: &str = "BEGIN;";
pub const DEFAULT_CLOSING_TEMPLATE: &str = "COMMIT;";

/// Placed between the templates and fragments. A lone `;` is an empty statement, so
/// fragments may omit their own terminator or end in a line comment.
const STATEMENT_SEPARATOR: &str = "\n;\n";

/// Accumulates independently written fragments into one transactional command.
///
/// Each fragment keeps its own placeholder names: `{{id}}` in two fragments binds two
/// different parameters. Executing consumes the accumulated fragments and leaves the batch
/// empty again, whether or not the command succeeds.
///
/// ```rust
/// use templated_sql::prelude::*;
///
/// # fn main() -> Result<(), SqlTemplateError> {
/// let mut conn = SqliteConnection::open_with(SqliteOptions::in_memory())?;
/// conn.query("create table t (id integer, v text)").execute()?;
///
/// let mut batch = TransactionBatch::new();
/// batch
///     .add_query("insert into t values ({{id}}, {{v}});", &ParamMap::new().with("id", 1).with("v", "a"))?
///     .add_query("insert into t values ({{id}}, {{v}});", &ParamMap::new().with("id", 2))?;
/// batch.execute(&mut conn)?;
/// assert!(batch.is_empty());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TransactionBatch {
    opening: String,
    closing: String,
    body: String,
    scopes: Vec<ParamScope>,
    fragments: usize,
    options: QueryOptions,
}

impl Default for TransactionBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::with_templates(DEFAULT_OPENING_TEMPLATE, DEFAULT_CLOSING_TEMPLATE)
    }

    /// A batch wrapped in custom opening and closing text.
    #[must_use]
    pub fn with_templates(opening: impl Into<String>, closing: impl Into<String>) -> Self {
        let opening = opening.into();
        Self {
            body: opening.clone(),
            opening,
            closing: closing.into(),
            scopes: Vec::new(),
            fragments: 0,
            options: QueryOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    /// Number of fragments added since the last execution.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fragments
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fragments == 0
    }

    /// Append a fragment using the default markers.
    ///
    /// # Errors
    /// Returns the parameter source's failure; the batch is left unchanged.
    pub fn add_query<P: ParameterSource + ?Sized>(
        &mut self,
        text: &str,
        params: &P,
    ) -> Result<&mut Self, SqlTemplateError> {
        self.add_query_with(text, params, Markers::default())
    }

    /// Append a fragment whose placeholders use `markers`. Empty text is ignored.
    ///
    /// # Errors
    /// Returns the parameter source's failure; the batch is left unchanged.
    pub fn add_query_with<P: ParameterSource + ?Sized>(
        &mut self,
        text: &str,
        params: &P,
        markers: Markers,
    ) -> Result<&mut Self, SqlTemplateError> {
        if text.is_empty() {
            return Ok(self);
        }
        let params = params.to_param_map()?;
        self.fragments += 1;
        let (scoped_text, scoped_markers) = namespace_fragment(text, &markers, self.fragments);
        self.body.push_str(STATEMENT_SEPARATOR);
        self.body.push_str(&scoped_text);
        self.scopes.push(ParamScope::new(scoped_markers, params));
        Ok(self)
    }

    /// Drop every fragment and return to the opening template.
    pub fn clear(&mut self) {
        self.body.clone_from(&self.opening);
        self.scopes.clear();
        self.fragments = 0;
    }

    /// Empty the batch and rewrite what it held into one command.
    fn take_command(&mut self) -> Result<PreparedCommand, SqlTemplateError> {
        let mut text = mem::replace(&mut self.body, self.opening.clone());
        let scopes = mem::take(&mut self.scopes);
        self.fragments = 0;

        text.push_str(STATEMENT_SEPARATOR);
        text.push_str(&self.closing);
        CommandRewriter::new().rewrite(&text, &scopes).map_err(|e| {
            e.with_diagnostics(CommandDiagnostics::from_raw(
                &text,
                scopes.iter().map(|s| &s.params),
            ))
        })
    }

    fn start<'c>(
        &mut self,
        conn: &'c mut SqliteConnection,
    ) -> Result<(&'c mut SqliteConnection, PreparedCommand), SqlTemplateError> {
        match self.take_command() {
            Ok(command) => Ok((conn, command)),
            Err(err) => {
                if self.options.close_on_exit {
                    conn.close();
                }
                Err(err)
            }
        }
    }

    /// Run the batch for its effect.
    ///
    /// # Errors
    /// Returns `Execution` if the command cannot be prepared or started, or the underlying
    /// error if it fails later. Any open transaction is rolled back.
    pub fn execute(&mut self, conn: &mut SqliteConnection) -> Result<(), SqlTemplateError> {
        let (conn, command) = self.start(conn)?;
        executor::run_execute(conn, &command, self.options)
    }

    /// Run the batch and stream the first result set as dynamic records.
    ///
    /// # Errors
    /// Returns `Execution` if the command cannot be prepared or started.
    pub fn execute_query<'c>(
        &mut self,
        conn: &'c mut SqliteConnection,
    ) -> Result<RecordStream<'c, DynamicRecord>, SqlTemplateError> {
        let (conn, command) = self.start(conn)?;
        executor::run_fetch(conn, &command, self.options)
    }

    /// Run the batch and stream the first result set mapped onto `T`.
    ///
    /// # Errors
    /// Returns `Execution` if the command cannot be prepared or started.
    pub fn execute_query_as<'c, T: FromRecord>(
        &mut self,
        conn: &'c mut SqliteConnection,
    ) -> Result<RecordStream<'c, T>, SqlTemplateError> {
        let (conn, command) = self.start(conn)?;
        executor::run_fetch_as(conn, &command, self.options)
    }

    /// Async [`execute`](Self::execute).
    ///
    /// # Errors
    /// As [`execute`](Self::execute), plus `Cancelled`.
    pub async fn execute_async(
        &mut self,
        conn: &mut SqliteConnection,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), SqlTemplateError> {
        let (conn, command) = self.start(conn)?;
        executor::run_execute_async(conn, &command, self.options, cancel).await
    }

    /// Async [`execute_query`](Self::execute_query).
    ///
    /// # Errors
    /// As [`execute_query`](Self::execute_query), plus `Cancelled`.
    pub async fn execute_query_async<'c>(
        &mut self,
        conn: &'c mut SqliteConnection,
        cancel: Option<&CancellationToken>,
    ) -> Result<AsyncRecordStream<'c, DynamicRecord>, SqlTemplateError> {
        let (conn, command) = self.start(conn)?;
        executor::run_fetch_async(conn, &command, self.options, cancel).await
    }

    /// Async [`execute_query_as`](Self::execute_query_as).
    ///
    /// # Errors
    /// As [`execute_query_as`](Self::execute_query_as), plus `Cancelled`.
    pub async fn execute_query_as_async<'c, T: FromRecord>(
        &mut self,
        conn: &'c mut SqliteConnection,
        cancel: Option<&CancellationToken>,
    ) -> Result<AsyncRecordStream<'c, T>, SqlTemplateError> {
        let (conn, command) = self.start(conn)?;
        executor::run_fetch_as_async(conn, &command, self.options, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamMap;
    use crate::types::SqlValue;

    #[test]
    fn fragments_are_namespaced_and_wrapped() {
        let mut batch = TransactionBatch::new();
        batch
            .add_query(
                "update a set v = {{v}} where id = {{id}};",
                &ParamMap::new().with("id", 1).with("v", "x"),
            )
            .unwrap()
            .add_query("", &ParamMap::new())
            .unwrap()
            .add_query("delete from b where id = {{id}};", &ParamMap::new().with("id", 2))
            .unwrap();
        assert_eq!(batch.len(), 2);

        let command = batch.take_command().unwrap();
        assert_eq!(
            command.text,
            "BEGIN;\n;\nupdate a set v = @qp_1_v where id = @qp_1_id;\n;\ndelete from b where id = @qp_2_id;\n;\nCOMMIT;"
        );
        let values: Vec<_> = command.params.iter().map(|p| (p.name.as_str(), &p.value)).collect();
        assert_eq!(
            values,
            vec![
                ("@qp_1_v", &SqlValue::Text("x".into())),
                ("@qp_1_id", &SqlValue::Int(1)),
                ("@qp_2_id", &SqlValue::Int(2)),
            ]
        );
        assert!(batch.is_empty());
    }

    #[test]
    fn custom_markers_and_null_literal_per_fragment() {
        let mut batch = TransactionBatch::with_templates("SAVEPOINT s;", "RELEASE s;");
        batch
            .add_query_with(
                "insert into t values (<a>, <b>);",
                &ParamMap::new().with("a", 5),
                Markers::new("<", ">").with_null_replacement("NULL"),
            )
            .unwrap();
        let command = batch.take_command().unwrap();
        assert_eq!(
            command.text,
            "SAVEPOINT s;\n;\ninsert into t values (@qp_1_a, NULL);\n;\nRELEASE s;"
        );
    }

    #[test]
    fn failed_flattening_leaves_the_batch_untouched() {
        let mut batch = TransactionBatch::new();
        let err = batch
            .add_query("select {{a}}", &serde_json::json!("not an object"))
            .err()
            .unwrap();
        assert!(matches!(err, SqlTemplateError::InvalidArgument(_)));
        assert!(batch.is_empty());
        assert_eq!(batch.take_command().unwrap().text, "BEGIN;\n;\nCOMMIT;");
    }
}
