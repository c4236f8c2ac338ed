use std::fmt;

use thiserror::Error;

use crate::markers::PreparedCommand;
use crate::params::ParamMap;

#[derive(Debug, Error)]
pub enum SqlTemplateError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{diagnostics}Error msg:\n{source}")]
    Execution {
        diagnostics: CommandDiagnostics,
        #[source]
        source: Box<SqlTemplateError>,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Parameter conversion error: {0}")]
    ParameterError(String),

    #[error("Query cancelled")]
    Cancelled,
}

impl SqlTemplateError {
    /// Wrap a preparation or execution failure with the command it was raised for.
    pub(crate) fn with_diagnostics(self, diagnostics: CommandDiagnostics) -> Self {
        SqlTemplateError::Execution {
            diagnostics,
            source: Box::new(self),
        }
    }

    /// The failure underneath any diagnostic wrapping.
    #[must_use]
    pub fn root(&self) -> &SqlTemplateError {
        match self {
            SqlTemplateError::Execution { source, .. } => source.root(),
            other => other,
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), SqlTemplateError::Cancelled)
    }
}

/// Query text and parameter listing attached to execution failures.
///
/// Parameter values are printed verbatim, secrets included.
#[derive(Debug, Clone)]
pub struct CommandDiagnostics {
    pub query: String,
    pub parameters: Vec<(String, String)>,
}

impl CommandDiagnostics {
    pub(crate) fn from_command(command: &PreparedCommand) -> Self {
        Self {
            query: command.text.clone(),
            parameters: command
                .params
                .iter()
                .map(|p| (p.name.clone(), p.value.to_string()))
                .collect(),
        }
    }

    /// Fallback used when the command never got built.
    pub(crate) fn from_raw<'a>(query: &str, params: impl IntoIterator<Item = &'a ParamMap>) -> Self {
        Self {
            query: query.to_owned(),
            parameters: params
                .into_iter()
                .flat_map(ParamMap::iter)
                .map(|(name, value)| (name.to_owned(), value.to_string()))
                .collect(),
        }
    }
}

impl fmt::Display for CommandDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Error executing query:")?;
        writeln!(f, "-----------")?;
        writeln!(f, "Parameters:")?;
        for (name, value) in &self.parameters {
            writeln!(f, "{name} = {value}")?;
        }
        writeln!(f, "-----")?;
        writeln!(f, "Query")?;
        writeln!(f, "{}", self.query)?;
        writeln!(f, "-------")
    }
}
