use clap::ValueEnum;
use serde::Deserialize;

use crate::error::SqlTemplateError;
use crate::types::Provider;

use super::connection::SqliteConnection;

/// Options for opening a `SQLite` database.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqliteOptions {
    /// File path, or `:memory:` for a private in-memory database.
    pub db_path: String,
    #[serde(default)]
    pub busy_timeout_ms: Option<u64>,
    #[serde(default)]
    pub wal: bool,
}

impl SqliteOptions {
    #[must_use]
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            busy_timeout_ms: None,
            wal: false,
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(":memory:")
    }

    #[must_use]
    pub fn builder(db_path: impl Into<String>) -> SqliteOptionsBuilder {
        SqliteOptionsBuilder::new(db_path)
    }
}

/// Fluent builder for `SQLite` options.
#[derive(Debug, Clone)]
pub struct SqliteOptionsBuilder {
    opts: SqliteOptions,
}

impl SqliteOptionsBuilder {
    #[must_use]
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            opts: SqliteOptions::new(db_path),
        }
    }

    #[must_use]
    pub fn busy_timeout_ms(mut self, ms: u64) -> Self {
        self.opts.busy_timeout_ms = Some(ms);
        self
    }

    #[must_use]
    pub fn wal(mut self, wal: bool) -> Self {
        self.opts.wal = wal;
        self
    }

    #[must_use]
    pub fn finish(self) -> SqliteOptions {
        self.opts
    }

    /// A closed connection for these options.
    #[must_use]
    pub fn build(self) -> SqliteConnection {
        SqliteConnection::new(self.finish())
    }
}

/// A provider identifier paired with its connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub provider: Provider,
    pub connection_string: String,
}

impl ConnectionConfig {
    /// Resolve a provider identifier (case-insensitive) and keep the connection string.
    ///
    /// # Errors
    /// Returns `ConfigError` if the provider is unknown or the connection string is blank.
    pub fn parse(provider_id: &str, connection_string: &str) -> Result<Self, SqlTemplateError> {
        let provider = Provider::from_str(provider_id.trim(), true).map_err(|_| {
            SqlTemplateError::ConfigError(format!("unknown provider `{provider_id}`"))
        })?;
        if connection_string.trim().is_empty() {
            return Err(SqlTemplateError::ConfigError(
                "connection string must not be empty".into(),
            ));
        }
        Ok(Self {
            provider,
            connection_string: connection_string.to_owned(),
        })
    }

    /// Options described by the connection string.
    ///
    /// Accepts a bare path (`app.db`, `:memory:`) or `key=value` pairs separated by `;`:
    /// `Data Source`, `Busy Timeout` (milliseconds), and `Journal Mode` (`WAL` or other).
    ///
    /// # Errors
    /// Returns `ConfigError` for unknown keys, unparsable values, or a missing data source.
    pub fn sqlite_options(&self) -> Result<SqliteOptions, SqlTemplateError> {
        let raw = self.connection_string.trim();
        if !raw.contains('=') {
            return Ok(SqliteOptions::new(raw));
        }

        let mut db_path = None;
        let mut opts = SqliteOptions::new(String::new());
        for pair in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                SqlTemplateError::ConfigError(format!("expected key=value, got `{pair}`"))
            })?;
            let value = value.trim();
            match key.trim().to_ascii_lowercase().as_str() {
                "data source" | "datasource" | "filename" => db_path = Some(value.to_owned()),
                "busy timeout" | "default timeout" => {
                    let ms = value.parse().map_err(|_| {
                        SqlTemplateError::ConfigError(format!("invalid busy timeout `{value}`"))
                    })?;
                    opts.busy_timeout_ms = Some(ms);
                }
                "journal mode" => opts.wal = value.eq_ignore_ascii_case("wal"),
                other => {
                    return Err(SqlTemplateError::ConfigError(format!(
                        "unsupported connection string key `{other}`"
                    )));
                }
            }
        }
        opts.db_path = db_path
            .filter(|p| !p.is_empty())
            .ok_or_else(|| SqlTemplateError::ConfigError("missing data source".into()))?;
        Ok(opts)
    }

    /// Build a closed connection for this configuration.
    ///
    /// # Errors
    /// Returns `ConfigError` if the connection string cannot be interpreted.
    pub fn connect(&self) -> Result<SqliteConnection, SqlTemplateError> {
        match self.provider {
            Provider::Sqlite => Ok(SqliteConnection::new(self.sqlite_options()?)),
        }
    }
}
