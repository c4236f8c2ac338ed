use std::collections::HashMap;

use regex::{NoExpand, Regex};

use crate::error::SqlTemplateError;
use crate::params::ParamMap;
use crate::types::SqlValue;

use super::{Markers, scan_placeholders};

const BOUND_PREFIX: &str = "@qp_";

/// One provider-level parameter produced by rewriting a placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParam {
    /// Generated provider name, e.g. `@qp_1_id`.
    pub name: String,
    /// Placeholder name as it was spelled in the query text.
    pub placeholder: String,
    pub value: SqlValue,
}

/// Command text ready for the provider, with its bound parameters in registration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreparedCommand {
    pub text: String,
    pub params: Vec<BoundParam>,
}

/// The markers and values that apply to one fragment of a command.
#[derive(Debug, Clone, Default)]
pub struct ParamScope {
    pub markers: Markers,
    pub params: ParamMap,
}

impl ParamScope {
    #[must_use]
    pub fn new(markers: Markers, params: ParamMap) -> Self {
        Self { markers, params }
    }
}

/// Rewrites placeholders for a single command.
///
/// Name counters live on the rewriter, so every command starts numbering at 1 and no state
/// is shared between executions.
#[derive(Debug, Default)]
pub struct CommandRewriter {
    counters: HashMap<String, usize>,
    params: Vec<BoundParam>,
}

impl CommandRewriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrite `text` against each scope in turn.
    ///
    /// Placeholders resolving to null are replaced by the scope's null literal as raw text.
    /// Every other placeholder becomes a generated parameter name that is unique within the
    /// command, and its value is registered.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if a scope has an empty delimiter or a replacement
    /// pattern cannot be built.
    pub fn rewrite(
        mut self,
        text: &str,
        scopes: &[ParamScope],
    ) -> Result<PreparedCommand, SqlTemplateError> {
        let mut text = text.to_owned();
        for scope in scopes {
            text = self.rewrite_scope(&text, scope)?;
        }
        Ok(PreparedCommand {
            text,
            params: self.params,
        })
    }

    fn rewrite_scope(&mut self, text: &str, scope: &ParamScope) -> Result<String, SqlTemplateError> {
        let markers = &scope.markers;
        if markers.open().is_empty() || markers.close().is_empty() {
            return Err(SqlTemplateError::InvalidArgument(
                "placeholder markers must not be empty".into(),
            ));
        }

        let mut text = text.to_owned();
        for placeholder in scan_placeholders(&text, markers) {
            let replacement = match scope.params.resolve(&placeholder) {
                None => markers.null_replacement().to_owned(),
                Some(value) => {
                    let name = self.next_name(&placeholder);
                    self.params.push(BoundParam {
                        name: name.clone(),
                        placeholder: placeholder.clone(),
                        value: value.clone(),
                    });
                    name
                }
            };
            text = replace_token(&text, &markers.token(&placeholder), &replacement)?;
        }
        Ok(text)
    }

    fn next_name(&mut self, placeholder: &str) -> String {
        let sanitized: String = placeholder
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        let count = self.counters.entry(sanitized.clone()).or_insert(0);
        *count += 1;
        format!("{BOUND_PREFIX}{count}_{sanitized}")
    }
}

/// Literal replacement of every occurrence of `token`, ignoring ASCII case only. Names are
/// folded the same way everywhere else, so `{{ß}}` and `{{SS}}` stay distinct.
fn replace_token(text: &str, token: &str, replacement: &str) -> Result<String, SqlTemplateError> {
    let mut pattern = String::with_capacity(token.len() * 4);
    let mut buf = [0; 4];
    for c in token.chars() {
        if c.is_ascii_alphabetic() {
            pattern.push('[');
            pattern.push(c.to_ascii_lowercase());
            pattern.push(c.to_ascii_uppercase());
            pattern.push(']');
        } else {
            pattern.push_str(&regex::escape(c.encode_utf8(&mut buf)));
        }
    }
    let pattern = Regex::new(&pattern)
        .map_err(|e| SqlTemplateError::InvalidArgument(format!("placeholder `{token}`: {e}")))?;
    Ok(pattern.replace_all(text, NoExpand(replacement)).into_owned())
}
