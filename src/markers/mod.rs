//! Placeholder markers: discovery, fragment namespacing, and rewriting into bound parameters.

mod rewriter;
mod scanner;

pub use rewriter::{BoundParam, CommandRewriter, ParamScope, PreparedCommand};
pub use scanner::{namespace_fragment, scan_placeholders};

pub const DEFAULT_OPEN_MARKER: &str = "{{";
pub const DEFAULT_CLOSE_MARKER: &str = "}}";
pub const DEFAULT_NULL_REPLACEMENT: &str = "null";

/// Delimiter pair and null literal used to read placeholders out of one fragment.
///
/// # Examples
/// ```rust
/// use templated_sql::prelude::*;
///
/// let markers = Markers::new("[[", "]]").with_null_replacement("NULL");
/// assert_eq!(scan_placeholders("select [[a]], [[b]]", &markers), vec!["a", "b"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markers {
    open: String,
    close: String,
    null_replacement: String,
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            open: DEFAULT_OPEN_MARKER.to_owned(),
            close: DEFAULT_CLOSE_MARKER.to_owned(),
            null_replacement: DEFAULT_NULL_REPLACEMENT.to_owned(),
        }
    }
}

impl Markers {
    #[must_use]
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            open: open.into(),
            close: close.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_open(mut self, open: impl Into<String>) -> Self {
        self.open = open.into();
        self
    }

    #[must_use]
    pub fn with_close(mut self, close: impl Into<String>) -> Self {
        self.close = close.into();
        self
    }

    /// Text spliced in, verbatim, wherever a placeholder resolves to null.
    #[must_use]
    pub fn with_null_replacement(mut self, null_replacement: impl Into<String>) -> Self {
        self.null_replacement = null_replacement.into();
        self
    }

    #[must_use]
    pub fn open(&self) -> &str {
        &self.open
    }

    #[must_use]
    pub fn close(&self) -> &str {
        &self.close
    }

    #[must_use]
    pub fn null_replacement(&self) -> &str {
        &self.null_replacement
    }

    pub(crate) fn token(&self, name: &str) -> String {
        format!("{}{name}{}", self.open, self.close)
    }
}
