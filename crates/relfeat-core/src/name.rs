//! Qualified names and namespace bindings.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{RelfeatError, Result};

pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Namespace-qualified element or attribute name.
///
/// Rendered in Clark notation (`{namespace}local`); unqualified names render
/// as the bare local part.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    namespace: Option<Arc<str>>,
    local: Arc<str>,
}

impl QName {
    pub fn new(namespace: &str, local: &str) -> Self {
        Self {
            namespace: (!namespace.is_empty()).then(|| Arc::from(namespace)),
            local: Arc::from(local),
        }
    }

    pub fn local(local: &str) -> Self {
        Self {
            namespace: None,
            local: Arc::from(local),
        }
    }

    /// `xsi:nil`
    pub fn xsi_nil() -> Self {
        Self::new(XSI_NS, "nil")
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn local_name(&self) -> &str {
        &self.local
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{ns}}}{}", self.local),
            None => f.write_str(&self.local),
        }
    }
}

impl fmt::Debug for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QName({self})")
    }
}

impl FromStr for QName {
    type Err = RelfeatError;

    /// Parses Clark notation or a bare local name.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(rest) = s.strip_prefix('{') {
            let (ns, local) = rest
                .split_once('}')
                .ok_or_else(|| RelfeatError::config(format!("unterminated namespace in `{s}`")))?;
            if local.is_empty() {
                return Err(RelfeatError::config(format!("empty local name in `{s}`")));
            }
            return Ok(QName::new(ns, local));
        }
        if s.is_empty() {
            return Err(RelfeatError::config("empty qualified name"));
        }
        Ok(QName::local(s))
    }
}

impl Serialize for QName {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for QName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Prefix to namespace URI bindings used when reading path expressions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamespaceBindings(BTreeMap<String, String>);

impl NamespaceBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.0.insert(prefix.into(), uri.into());
        self
    }

    pub fn uri(&self, prefix: &str) -> Option<&str> {
        match prefix {
            "xsi" => self.0.get(prefix).map(String::as_str).or(Some(XSI_NS)),
            _ => self.0.get(prefix).map(String::as_str),
        }
    }

    /// Resolve `prefix:local` (or a bare `local`) to a [`QName`].
    pub fn resolve(&self, prefixed: &str) -> Result<QName> {
        match prefixed.split_once(':') {
            Some((prefix, local)) => {
                let uri = self.uri(prefix).ok_or_else(|| {
                    RelfeatError::config(format!("unbound namespace prefix `{prefix}` in `{prefixed}`"))
                })?;
                Ok(QName::new(uri, local))
            }
            None => Ok(QName::local(prefixed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clark_notation_roundtrip() -> anyhow::Result<()> {
        let name = QName::new("http://example.com/app", "Road");
        assert_eq!(name.to_string(), "{http://example.com/app}Road");
        assert_eq!(name.to_string().parse::<QName>()?, name);
        assert_eq!("name".parse::<QName>()?, QName::local("name"));
        Ok(())
    }

    #[test]
    fn bindings_resolve_prefixes() -> anyhow::Result<()> {
        let ns = NamespaceBindings::new().with("app", "http://example.com/app");
        assert_eq!(ns.resolve("app:name")?, QName::new("http://example.com/app", "name"));
        assert_eq!(ns.resolve("xsi:nil")?, QName::xsi_nil());
        assert!(ns.resolve("gml:id").is_err());
        Ok(())
    }

    #[test]
    fn serializes_as_string() -> anyhow::Result<()> {
        let json = serde_json::to_string(&QName::new("urn:x", "a"))?;
        assert_eq!(json, "\"{urn:x}a\"");
        Ok(())
    }
}
