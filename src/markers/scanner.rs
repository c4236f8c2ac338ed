use std::collections::HashSet;

use super::Markers;

/// A delimited token found in query text: byte span of the whole token plus the inner name.
struct Token<'a> {
    start: usize,
    end: usize,
    name: &'a str,
}

/// Walk `open ... close` tokens left to right. The first `close` after an `open` ends the
/// token; delimiters never nest.
fn tokens<'a>(text: &'a str, markers: &'a Markers) -> impl Iterator<Item = Token<'a>> + 'a {
    let open = markers.open();
    let close = markers.close();
    let mut pos = 0;
    std::iter::from_fn(move || {
        if open.is_empty() || close.is_empty() {
            return None;
        }
        let start = pos + text.get(pos..)?.find(open)?;
        let name_start = start + open.len();
        let name_len = text[name_start..].find(close)?;
        let end = name_start + name_len + close.len();
        pos = end;
        Some(Token {
            start,
            end,
            name: &text[name_start..name_start + name_len],
        })
    })
}

/// Placeholder names in order of first appearance.
///
/// Empty names are skipped and duplicates are dropped case-insensitively, keeping the
/// first spelling seen.
#[must_use]
pub fn scan_placeholders(text: &str, markers: &Markers) -> Vec<String> {
    let mut seen = HashSet::new();
    tokens(text, markers)
        .filter(|token| !token.name.is_empty())
        .filter(|token| seen.insert(token.name.to_ascii_uppercase()))
        .map(|token| token.name.to_owned())
        .collect()
}

/// Move a fragment's placeholders into a private namespace so that fragments merged into
/// one command can reuse names.
///
/// `{{id}}` in fragment 2 becomes `{{_2_id_2_}}`, and the returned markers read it back as
/// `id`. The fragment's null replacement is carried over.
#[must_use]
pub fn namespace_fragment(text: &str, markers: &Markers, index: usize) -> (String, Markers) {
    let scoped = Markers::new(
        format!("{}_{index}_", markers.open()),
        format!("_{index}_{}", markers.close()),
    )
    .with_null_replacement(markers.null_replacement());

    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    for token in tokens(text, markers) {
        if token.name.is_empty() {
            continue;
        }
        out.push_str(&text[copied..token.start]);
        out.push_str(&scoped.token(token.name));
        copied = token.end;
    }
    out.push_str(&text[copied..]);
    (out, scoped)
}
