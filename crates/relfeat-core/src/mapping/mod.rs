//! Declarative description of where each part of a document lives in the
//! relational store.
//!
//! A [`Mapping`] tree is built once per feature type (usually through
//! [`config`]) and never mutated afterwards, so it can be shared freely
//! between threads.

pub mod config;
mod fid;
mod join;
mod path;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{RelfeatError, Result};
use crate::name::QName;
use crate::sql::validate_ident;
use crate::value::PrimitiveType;

pub use fid::{FidMapping, IdKernel};
pub use join::{OrderColumn, TableJoin, TableJoinDef};
pub use path::{Axis, PathStep, Predicate};

/// Storage form of a leaf value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingExpression {
    /// A plain column of the current table.
    Column(String),
    /// Computed SQL, e.g. `ST_AsBinary(geom)`.
    Function(String),
}

impl MappingExpression {
    pub fn column(name: &str) -> Result<Self> {
        validate_ident(name)?;
        Ok(MappingExpression::Column(name.to_string()))
    }

    pub fn is_column(&self) -> bool {
        matches!(self, MappingExpression::Column(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            MappingExpression::Column(s) | MappingExpression::Function(s) => s,
        }
    }
}

impl fmt::Display for MappingExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the schema says about a compound's element.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementDeclaration {
    pub name: Option<QName>,
    #[serde(default)]
    pub nillable: bool,
    #[serde(default)]
    pub required_attributes: Vec<QName>,
}

impl ElementDeclaration {
    pub fn new(name: QName) -> Self {
        Self {
            name: Some(name),
            ..Default::default()
        }
    }

    pub fn nillable(mut self, nillable: bool) -> Self {
        self.nillable = nillable;
        self
    }

    pub fn require_attribute(mut self, name: QName) -> Self {
        self.required_attributes.push(name);
        self
    }
}

/// Selects a named converter from the registry instead of the built-in one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomConverter {
    pub name: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum MappingKind {
    Primitive {
        expression: MappingExpression,
        primitive_type: PrimitiveType,
    },
    Geometry {
        expression: MappingExpression,
        geometry_type: Option<QName>,
        dimension: u8,
        crs: Option<String>,
        srid: Option<i32>,
    },
    /// Reference to another feature, decoded as an href.
    FeatureReference { expression: MappingExpression },
    /// A pre-serialized particle stored in one column.
    Blob {
        expression: MappingExpression,
        element: Option<ElementDeclaration>,
    },
    Compound {
        particles: Vec<Mapping>,
        element: Option<ElementDeclaration>,
    },
    /// Inert SQL; never selected.
    Expression { sql: String },
}

impl MappingKind {
    pub fn name(&self) -> &'static str {
        match self {
            MappingKind::Primitive { .. } => "primitive",
            MappingKind::Geometry { .. } => "geometry",
            MappingKind::FeatureReference { .. } => "feature_reference",
            MappingKind::Blob { .. } => "blob",
            MappingKind::Compound { .. } => "compound",
            MappingKind::Expression { .. } => "expression",
        }
    }
}

/// One node of the mapping tree.
#[derive(Clone, Debug, PartialEq)]
pub struct Mapping {
    pub path: PathStep,
    pub voidable: bool,
    pub joins: Vec<TableJoin>,
    pub custom_converter: Option<CustomConverter>,
    pub kind: MappingKind,
}

impl Mapping {
    pub fn new(path: PathStep, kind: MappingKind) -> Self {
        Self {
            path,
            voidable: false,
            joins: Vec::new(),
            custom_converter: None,
            kind,
        }
    }

    pub fn primitive(path: PathStep, expression: MappingExpression, primitive_type: PrimitiveType) -> Self {
        Self::new(
            path,
            MappingKind::Primitive {
                expression,
                primitive_type,
            },
        )
    }

    pub fn geometry(path: PathStep, expression: MappingExpression, geometry_type: Option<QName>) -> Self {
        Self::new(
            path,
            MappingKind::Geometry {
                expression,
                geometry_type,
                dimension: 2,
                crs: None,
                srid: None,
            },
        )
    }

    pub fn feature_reference(path: PathStep, expression: MappingExpression) -> Self {
        Self::new(path, MappingKind::FeatureReference { expression })
    }

    pub fn blob(path: PathStep, expression: MappingExpression) -> Self {
        Self::new(
            path,
            MappingKind::Blob {
                expression,
                element: None,
            },
        )
    }

    pub fn compound(path: PathStep, particles: Vec<Mapping>, element: Option<ElementDeclaration>) -> Self {
        Self::new(path, MappingKind::Compound { particles, element })
    }

    pub fn expression(path: PathStep, sql: impl Into<String>) -> Self {
        Self::new(path, MappingKind::Expression { sql: sql.into() })
    }

    pub fn voidable(mut self, voidable: bool) -> Self {
        self.voidable = voidable;
        self
    }

    pub fn with_join(mut self, join: TableJoin) -> Self {
        self.joins.push(join);
        self
    }

    pub fn with_converter(mut self, name: impl Into<String>, params: BTreeMap<String, String>) -> Self {
        self.custom_converter = Some(CustomConverter {
            name: name.into(),
            params,
        });
        self
    }

    /// The join the engine follows for this node. Later joins of a chain are
    /// carried but not executed.
    pub fn first_join(&self) -> Option<&TableJoin> {
        self.joins.first()
    }

    pub fn is_feature_reference(&self) -> bool {
        matches!(self.kind, MappingKind::FeatureReference { .. })
    }

    /// Leaf storage expression, `None` for compounds and inert expressions.
    pub fn expression_ref(&self) -> Option<&MappingExpression> {
        match &self.kind {
            MappingKind::Primitive { expression, .. }
            | MappingKind::Geometry { expression, .. }
            | MappingKind::FeatureReference { expression }
            | MappingKind::Blob { expression, .. } => Some(expression),
            MappingKind::Compound { .. } | MappingKind::Expression { .. } => None,
        }
    }

    pub fn element_declaration(&self) -> Option<&ElementDeclaration> {
        match &self.kind {
            MappingKind::Compound { element, .. } | MappingKind::Blob { element, .. } => element.as_ref(),
            _ => None,
        }
    }

    /// Name of the element this node produces: the step name, else the
    /// declared element name.
    pub fn element_name(&self) -> Option<QName> {
        self.path
            .name()
            .cloned()
            .or_else(|| self.element_declaration().and_then(|d| d.name.clone()))
    }
}

impl fmt::Display for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mapping `{}`", self.kind.name(), self.path)
    }
}

/// Everything needed to rebuild features of one type from its table.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureTypeMapping {
    pub name: QName,
    pub table: String,
    pub fid: FidMapping,
    pub mappings: Vec<Mapping>,
}

impl FeatureTypeMapping {
    pub fn new(name: QName, table: &str, fid: FidMapping, mappings: Vec<Mapping>) -> Result<Self> {
        validate_ident(table)?;
        if mappings.is_empty() {
            return Err(RelfeatError::config(format!("feature type {name} has no mappings")));
        }
        Ok(Self {
            name,
            table: table.to_string(),
            fid,
            mappings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_name_falls_back_to_declaration() {
        let decl = ElementDeclaration::new(QName::local("contact"));
        let m = Mapping::compound(PathStep::text_node(), vec![], Some(decl));
        assert_eq!(m.element_name(), Some(QName::local("contact")));

        let m = Mapping::compound(PathStep::child(QName::local("addr")), vec![], None);
        assert_eq!(m.element_name(), Some(QName::local("addr")));
    }

    #[test]
    fn first_join_only() -> anyhow::Result<()> {
        let m = Mapping::compound(PathStep::child(QName::local("contact")), vec![], None)
            .with_join(TableJoin::new("road", ["gid"], "contact", ["road_id"], ["seq"])?)
            .with_join(TableJoin::new("contact", ["id"], "phone", ["contact_id"], Vec::<&str>::new())?);
        assert_eq!(m.first_join().map(|j| j.to_table()), Some("contact"));
        Ok(())
    }

    #[test]
    fn mapping_trees_are_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Mapping>();
        assert_send_sync::<FeatureTypeMapping>();
    }
}
