use std::fmt;

use crate::error::{RelfeatError, Result};
use crate::name::{NamespaceBindings, QName};

/// Axis of a path step.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Axis {
    Child,
    Attribute,
    /// `text()`
    Text,
    /// `.` / `self::node()`
    SelfNode,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum StepKind {
    Child(QName),
    Attribute(QName),
    Text,
    SelfNode,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Predicate {
    /// `[3]`
    Position(u32),
    /// anything else, kept verbatim
    Expression(String),
}

/// A single relative location step, e.g. `app:contact[1]`, `@gml:id`, `text()`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathStep {
    kind: StepKind,
    predicates: Vec<Predicate>,
    text: String,
}

impl PathStep {
    /// Parse a step. Absolute paths, multi-step paths and wildcards are
    /// configuration errors.
    pub fn parse(text: &str, ns: &NamespaceBindings) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RelfeatError::config("empty mapping path"));
        }
        if text.starts_with('/') {
            return Err(RelfeatError::config(format!(
                "absolute path `{text}`: mapping paths must be a single relative step"
            )));
        }

        let (base, predicates) = split_predicates(text)?;
        let base = base.trim();

        let kind = if base == "text()" {
            StepKind::Text
        } else if base == "." || base == "self::node()" {
            StepKind::SelfNode
        } else if let Some(name) = base.strip_prefix('@').or_else(|| base.strip_prefix("attribute::")) {
            StepKind::Attribute(resolve_name(name, text, ns)?)
        } else {
            let name = base.strip_prefix("child::").unwrap_or(base);
            StepKind::Child(resolve_name(name, text, ns)?)
        };

        Ok(Self {
            kind,
            predicates,
            text: text.to_string(),
        })
    }

    pub fn child(name: QName) -> Self {
        let text = name.local_name().to_string();
        Self {
            kind: StepKind::Child(name),
            predicates: Vec::new(),
            text,
        }
    }

    pub fn attribute(name: QName) -> Self {
        let text = format!("@{}", name.local_name());
        Self {
            kind: StepKind::Attribute(name),
            predicates: Vec::new(),
            text,
        }
    }

    pub fn text_node() -> Self {
        Self {
            kind: StepKind::Text,
            predicates: Vec::new(),
            text: "text()".into(),
        }
    }

    pub fn axis(&self) -> Axis {
        match self.kind {
            StepKind::Child(_) => Axis::Child,
            StepKind::Attribute(_) => Axis::Attribute,
            StepKind::Text => Axis::Text,
            StepKind::SelfNode => Axis::SelfNode,
        }
    }

    pub fn name(&self) -> Option<&QName> {
        match &self.kind {
            StepKind::Child(n) | StepKind::Attribute(n) => Some(n),
            StepKind::Text | StepKind::SelfNode => None,
        }
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn as_text(&self) -> &str {
        &self.text
    }

    /// Only unpredicated steps and steps with one positional predicate can be
    /// rebuilt; the error names what is wrong with the others.
    pub fn check_predicates(&self) -> std::result::Result<(), &'static str> {
        match self.predicates.as_slice() {
            [] | [Predicate::Position(_)] => Ok(()),
            [Predicate::Expression(_)] => Err("only numeric predicates are handled"),
            _ => Err("only a single predicate is handled"),
        }
    }

    /// The element name when this is a child element step usable as a feature property.
    pub fn child_element_name(&self) -> Option<&QName> {
        match &self.kind {
            StepKind::Child(n) if self.check_predicates().is_ok() => Some(n),
            _ => None,
        }
    }

    /// Upper-cased step text with `/`, `:`, `[` and `]` replaced by `_`.
    pub fn id_prefix(&self) -> String {
        self.text
            .chars()
            .map(|c| match c {
                '/' | ':' | '[' | ']' => '_',
                c => c,
            })
            .collect::<String>()
            .to_uppercase()
    }
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

fn resolve_name(name: &str, text: &str, ns: &NamespaceBindings) -> Result<QName> {
    let name = name.trim();
    if name.is_empty() || name.contains('*') {
        return Err(RelfeatError::config(format!("wildcard or empty name step in `{text}`")));
    }
    if name.contains(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | '@' | '/' | '|')) {
        return Err(RelfeatError::config(format!("unsupported path expression `{text}`")));
    }
    ns.resolve(name)
}

/// Split `base[p1][p2]` into the base and its predicates, rejecting `/` outside brackets.
fn split_predicates(text: &str) -> Result<(&str, Vec<Predicate>)> {
    let mut depth = 0usize;
    let mut base_end = None;
    let mut start = 0usize;
    let mut predicates = Vec::new();

    for (i, c) in text.char_indices() {
        match c {
            '[' => {
                if depth == 0 {
                    base_end.get_or_insert(i);
                    start = i + 1;
                }
                depth += 1;
            }
            ']' => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    RelfeatError::config(format!("unbalanced `]` in path `{text}`"))
                })?;
                if depth == 0 {
                    let inner = text[start..i].trim();
                    predicates.push(match inner.parse::<u32>() {
                        Ok(n) if n > 0 => Predicate::Position(n),
                        _ => Predicate::Expression(inner.to_string()),
                    });
                }
            }
            '/' if depth == 0 => {
                return Err(RelfeatError::config(format!(
                    "multi-step path `{text}`: mapping paths must be a single relative step"
                )));
            }
            c if depth == 0 && base_end.is_some() && !c.is_whitespace() => {
                return Err(RelfeatError::config(format!("trailing characters after predicate in `{text}`")));
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(RelfeatError::config(format!("unbalanced `[` in path `{text}`")));
    }

    Ok((&text[..base_end.unwrap_or(text.len())], predicates))
}
