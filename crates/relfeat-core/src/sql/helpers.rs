use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{RelfeatError, Result};

/// Very simple identifier guard: letters, digits, underscore only.
/// Dotted paths (`schema.table`) are accepted segment by segment.
pub(crate) fn validate_ident(path: &str) -> Result<()> {
    static SEG: Lazy<Regex> = Lazy::new(|| {
        #[allow(clippy::unwrap_used)]
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap()
    });
    if path.is_empty() {
        return Err(RelfeatError::config("invalid identifier: empty"));
    }
    for part in path.split('.') {
        if part.is_empty() {
            return Err(RelfeatError::config(format!("invalid identifier: empty segment in `{path}`")));
        }
        if !SEG.is_match(part) {
            return Err(RelfeatError::config(format!("invalid identifier segment `{part}` in `{path}`")));
        }
    }
    Ok(())
}

/// `alias.column`, the form select snippets and key lookups share.
pub(crate) fn qualify(alias: &str, column: &str) -> String {
    if alias.is_empty() {
        column.to_string()
    } else {
        format!("{alias}.{column}")
    }
}
