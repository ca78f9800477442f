//! Document identifiers derived from key columns.

use serde::Serialize;

use crate::error::{RelfeatError, Result};
use crate::sql::validate_ident;
use crate::value::PrimitiveType;

const VERSION_MARKER: &str = "_version";

/// How a feature id is derived from one or more key columns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FidMapping {
    prefix: String,
    delimiter: String,
    columns: Vec<(String, PrimitiveType)>,
}

/// Key values and version recovered from an id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdKernel {
    pub keys: Vec<String>,
    pub version: Option<u32>,
}

impl FidMapping {
    pub fn new(
        prefix: impl Into<String>,
        delimiter: impl Into<String>,
        columns: Vec<(String, PrimitiveType)>,
    ) -> Result<Self> {
        if columns.is_empty() {
            return Err(RelfeatError::config("fid mapping needs at least one key column"));
        }
        for (col, _) in &columns {
            validate_ident(col)?;
        }
        Ok(Self {
            prefix: prefix.into(),
            delimiter: delimiter.into(),
            columns,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    pub fn columns(&self) -> &[(String, PrimitiveType)] {
        &self.columns
    }

    /// `prefix + k0 (+ delimiter + ki)*`, then `_version<v>` when `v > 0`.
    ///
    /// Callers pass at least one key.
    pub fn build_id<S: AsRef<str>>(&self, keys: &[S], version: Option<u32>) -> String {
        debug_assert!(!keys.is_empty(), "build_id needs at least one key");
        let mut id = self.prefix.clone();
        for (i, key) in keys.iter().enumerate() {
            if i > 0 {
                id.push_str(&self.delimiter);
            }
            id.push_str(key.as_ref());
        }
        if let Some(v) = version.filter(|v| *v > 0) {
            id.push_str(VERSION_MARKER);
            id.push_str(&v.to_string());
        }
        id
    }

    /// Inverse of [`FidMapping::build_id`]. `None` when the id does not belong
    /// to this mapping.
    pub fn analyze_id(&self, id: &str) -> Option<IdKernel> {
        let rest = id.strip_prefix(self.prefix.as_str())?;

        let (rest, version) = match rest.rsplit_once(VERSION_MARKER) {
            Some((head, v)) if !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit()) => {
                (head, Some(v.parse::<u32>().ok()?))
            }
            _ => (rest, None),
        };

        let keys: Vec<String> = if self.columns.len() == 1 || self.delimiter.is_empty() {
            vec![rest.to_string()]
        } else {
            rest.split(self.delimiter.as_str()).map(str::to_string).collect()
        };

        if keys.len() != self.columns.len() || keys.iter().any(String::is_empty) {
            return None;
        }
        Some(IdKernel { keys, version })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fid(columns: &[&str]) -> FidMapping {
        FidMapping::new(
            "F",
            "_",
            columns.iter().map(|c| (c.to_string(), PrimitiveType::Integer)).collect(),
        )
        .unwrap()
    }

    #[test]
    fn build_id_joins_keys_and_version() {
        let m = fid(&["a", "b"]);
        assert_eq!(m.build_id(&["12", "7"], None), "F12_7");
        assert_eq!(m.build_id(&["12", "7"], Some(0)), "F12_7");
        assert_eq!(m.build_id(&["12", "7"], Some(3)), "F12_7_version3");
        // pure
        assert_eq!(m.build_id(&["12", "7"], Some(3)), m.build_id(&["12", "7"], Some(3)));
    }

    #[test]
    fn analyze_id_inverts_build_id() {
        let m = fid(&["a", "b"]);
        assert_eq!(
            m.analyze_id("F12_7_version3"),
            Some(IdKernel {
                keys: vec!["12".into(), "7".into()],
                version: Some(3)
            })
        );
        assert_eq!(
            m.analyze_id("F12_7"),
            Some(IdKernel {
                keys: vec!["12".into(), "7".into()],
                version: None
            })
        );
        assert_eq!(m.analyze_id("G12_7"), None);
        assert_eq!(m.analyze_id("F12"), None);
        assert_eq!(m.analyze_id("F12_7_8"), None);
    }

    #[test]
    fn single_key_keeps_delimiters() {
        let m = fid(&["gid"]);
        assert_eq!(m.analyze_id("Fa_b").map(|k| k.keys), Some(vec!["a_b".to_string()]));
    }

    #[test]
    fn empty_columns_are_rejected() {
        assert!(FidMapping::new("F", "_", vec![]).is_err());
        assert!(FidMapping::new("F", "_", vec![("bad col".into(), PrimitiveType::String)]).is_err());
    }
}
