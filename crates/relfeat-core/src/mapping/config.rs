//! Serde representation of a feature type mapping.
//!
//! ```json
//! {
//!   "name": "app:Road",
//!   "table": "road",
//!   "namespaces": { "app": "http://example.com/app" },
//!   "fid": { "prefix": "F", "columns": [{ "column": "gid", "type": "integer" }] },
//!   "mappings": [
//!     { "path": "app:name", "kind": "primitive", "column": "name" },
//!     { "path": "app:contact", "kind": "compound",
//!       "joins": [{ "from_table": "road", "from_columns": ["gid"],
//!                   "to_table": "contact", "to_columns": ["road_id"], "order_columns": ["seq"] }],
//!       "particles": [{ "path": "text()", "kind": "primitive", "column": "phone" }] }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};

use super::{
    CustomConverter, ElementDeclaration, FeatureTypeMapping, FidMapping, Mapping, MappingExpression, MappingKind,
    PathStep, TableJoin, TableJoinDef,
};
use crate::error::{RelfeatError, Result};
use crate::name::{NamespaceBindings, QName};
use crate::sql::validate_ident;
use crate::value::PrimitiveType;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeatureTypeMappingConfig {
    /// Prefixed feature type name, e.g. `app:Road`.
    pub name: String,
    pub table: String,
    #[serde(default)]
    pub namespaces: NamespaceBindings,
    pub fid: FidConfig,
    pub mappings: Vec<MappingConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FidConfig {
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    pub columns: Vec<FidColumnConfig>,
}

fn default_delimiter() -> String {
    "_".to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FidColumnConfig {
    pub column: String,
    #[serde(default, rename = "type")]
    pub primitive_type: PrimitiveType,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MappingConfig {
    pub path: String,
    #[serde(default)]
    pub voidable: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub joins: Vec<TableJoinDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converter: Option<CustomConverter>,
    #[serde(flatten)]
    pub kind: MappingKindConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MappingKindConfig {
    Primitive {
        #[serde(flatten)]
        expression: ExpressionConfig,
        #[serde(default, rename = "type")]
        primitive_type: PrimitiveType,
    },
    Geometry {
        #[serde(flatten)]
        expression: ExpressionConfig,
        #[serde(default)]
        geometry_type: Option<String>,
        #[serde(default = "default_dimension")]
        dimension: u8,
        #[serde(default)]
        crs: Option<String>,
        #[serde(default)]
        srid: Option<i32>,
    },
    FeatureReference {
        #[serde(flatten)]
        expression: ExpressionConfig,
    },
    Blob {
        #[serde(flatten)]
        expression: ExpressionConfig,
        #[serde(default)]
        element: Option<ElementConfig>,
    },
    Compound {
        #[serde(default)]
        particles: Vec<MappingConfig>,
        #[serde(default)]
        element: Option<ElementConfig>,
    },
    Expression {
        sql: String,
    },
}

fn default_dimension() -> u8 {
    2
}

/// Exactly one of `column` / `function`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExpressionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ElementConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub nillable: bool,
    #[serde(default)]
    pub required_attributes: Vec<String>,
}

impl FeatureTypeMappingConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| RelfeatError::config(format!("invalid mapping document: {e}")))
    }
}

impl FeatureTypeMapping {
    /// Validates a configuration and builds the immutable mapping tree.
    ///
    /// All problems found are reported together, each prefixed with the
    /// location it was found at.
    pub fn from_config(config: &FeatureTypeMappingConfig) -> Result<Self> {
        let mut problems = Problems::default();
        let ns = &config.namespaces;

        let name = problems.check("name", ns.resolve(&config.name));
        problems.check("table", validate_ident(&config.table));

        let fid = problems.check(
            "fid",
            FidMapping::new(
                config.fid.prefix.clone(),
                config.fid.delimiter.clone(),
                config
                    .fid
                    .columns
                    .iter()
                    .map(|c| (c.column.clone(), c.primitive_type))
                    .collect(),
            ),
        );

        if config.mappings.is_empty() {
            problems.push("mappings", "at least one mapping is required");
        }
        let mappings: Vec<Mapping> = config
            .mappings
            .iter()
            .enumerate()
            .filter_map(|(i, m)| build_mapping(m, ns, &format!("mappings[{i}]"), &mut problems))
            .collect();

        problems.finish()?;
        match (name, fid) {
            (Some(name), Some(fid)) => FeatureTypeMapping::new(name, &config.table, fid, mappings),
            _ => Err(RelfeatError::config("invalid feature type mapping")),
        }
    }
}

fn build_mapping(
    config: &MappingConfig,
    ns: &NamespaceBindings,
    at: &str,
    problems: &mut Problems,
) -> Option<Mapping> {
    let path = problems.check(&format!("{at}.path"), PathStep::parse(&config.path, ns));

    let joins: Vec<TableJoin> = config
        .joins
        .iter()
        .enumerate()
        .filter_map(|(j, def)| problems.check(&format!("{at}.joins[{j}]"), TableJoin::try_from(def.clone())))
        .collect();

    let kind = match &config.kind {
        MappingKindConfig::Primitive {
            expression,
            primitive_type,
        } => expression_of(expression, at, problems).map(|expression| MappingKind::Primitive {
            expression,
            primitive_type: *primitive_type,
        }),
        MappingKindConfig::Geometry {
            expression,
            geometry_type,
            dimension,
            crs,
            srid,
        } => {
            let geometry_type = geometry_type
                .as_deref()
                .and_then(|t| problems.check(&format!("{at}.geometry_type"), ns.resolve(t)));
            expression_of(expression, at, problems).map(|expression| MappingKind::Geometry {
                expression,
                geometry_type,
                dimension: *dimension,
                crs: crs.clone(),
                srid: *srid,
            })
        }
        MappingKindConfig::FeatureReference { expression } => {
            expression_of(expression, at, problems).map(|expression| MappingKind::FeatureReference { expression })
        }
        MappingKindConfig::Blob { expression, element } => {
            let element = element.as_ref().and_then(|e| element_of(e, ns, at, problems));
            expression_of(expression, at, problems).map(|expression| MappingKind::Blob { expression, element })
        }
        MappingKindConfig::Compound { particles, element } => {
            let element = element.as_ref().and_then(|e| element_of(e, ns, at, problems));
            let particles = particles
                .iter()
                .enumerate()
                .filter_map(|(i, p)| build_mapping(p, ns, &format!("{at}.particles[{i}]"), problems))
                .collect();
            Some(MappingKind::Compound { particles, element })
        }
        MappingKindConfig::Expression { sql } => Some(MappingKind::Expression { sql: sql.clone() }),
    }?;

    Some(Mapping {
        path: path?,
        voidable: config.voidable,
        joins,
        custom_converter: config.converter.clone(),
        kind,
    })
}

fn expression_of(config: &ExpressionConfig, at: &str, problems: &mut Problems) -> Option<MappingExpression> {
    match (&config.column, &config.function) {
        (Some(col), None) => problems.check(&format!("{at}.column"), MappingExpression::column(col)),
        (None, Some(function)) if !function.trim().is_empty() => Some(MappingExpression::Function(function.clone())),
        (None, Some(_)) => {
            problems.push(&format!("{at}.function"), "empty SQL function");
            None
        }
        (Some(_), Some(_)) => {
            problems.push(at, "`column` and `function` are mutually exclusive");
            None
        }
        (None, None) => {
            problems.push(at, "one of `column` or `function` is required");
            None
        }
    }
}

fn element_of(
    config: &ElementConfig,
    ns: &NamespaceBindings,
    at: &str,
    problems: &mut Problems,
) -> Option<ElementDeclaration> {
    let name = match &config.name {
        Some(n) => Some(problems.check(&format!("{at}.element.name"), ns.resolve(n))?),
        None => None,
    };
    let required_attributes = config
        .required_attributes
        .iter()
        .map(|a| problems.check(&format!("{at}.element.required_attributes"), ns.resolve(a)))
        .collect::<Option<Vec<QName>>>()?;
    Some(ElementDeclaration {
        name,
        nillable: config.nillable,
        required_attributes,
    })
}

#[derive(Default)]
struct Problems(Vec<String>);

impl Problems {
    fn push(&mut self, at: &str, msg: impl std::fmt::Display) {
        self.0.push(format!("{at}: {msg}"));
    }

    fn check<T>(&mut self, at: &str, result: Result<T>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(RelfeatError::ConfigurationError(msg)) => {
                self.push(at, msg);
                None
            }
            Err(e) => {
                self.push(at, e);
                None
            }
        }
    }

    fn finish(self) -> Result<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(RelfeatError::ConfigurationError(self.0.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::Axis;
    use pretty_assertions::assert_eq;

    const ROAD: &str = r#"{
        "name": "app:Road",
        "table": "road",
        "namespaces": { "app": "http://example.com/app" },
        "fid": { "prefix": "F", "columns": [{ "column": "gid", "type": "integer" }] },
        "mappings": [
            { "path": "app:name", "kind": "primitive", "column": "name" },
            { "path": "app:geom", "kind": "geometry", "function": "ST_AsBinary(geom)",
              "geometry_type": "app:Surface", "srid": 4326 },
            { "path": "app:contact", "kind": "compound",
              "joins": [{ "from_table": "road", "from_columns": ["gid"],
                          "to_table": "contact", "to_columns": ["road_id"], "order_columns": ["seq"] }],
              "element": { "name": "app:Contact", "nillable": true, "required_attributes": ["code"] },
              "particles": [
                { "path": "@code", "kind": "primitive", "column": "code" },
                { "path": "text()", "kind": "primitive", "column": "phone", "voidable": true }
              ] }
        ]
    }"#;

    #[test]
    fn builds_a_validated_tree() -> anyhow::Result<()> {
        let config = FeatureTypeMappingConfig::from_json(ROAD)?;
        let ft = FeatureTypeMapping::from_config(&config)?;

        assert_eq!(ft.name, QName::new("http://example.com/app", "Road"));
        assert_eq!(ft.fid.build_id(&["42"], None), "F42");
        assert_eq!(ft.mappings.len(), 3);

        let contact = &ft.mappings[2];
        assert_eq!(contact.first_join().map(|j| j.to_table()), Some("contact"));
        let MappingKind::Compound { particles, element } = &contact.kind else {
            anyhow::bail!("expected a compound");
        };
        assert_eq!(particles[0].path.axis(), Axis::Attribute);
        assert!(particles[1].voidable);
        assert_eq!(element.as_ref().map(|e| e.required_attributes.clone()), Some(vec![QName::local("code")]));

        let MappingKind::Geometry { expression, srid, dimension, .. } = &ft.mappings[1].kind else {
            anyhow::bail!("expected a geometry");
        };
        assert!(!expression.is_column());
        assert_eq!((*srid, *dimension), (Some(4326), 2));
        Ok(())
    }

    #[test]
    fn reports_every_problem() -> anyhow::Result<()> {
        let config = FeatureTypeMappingConfig::from_json(
            r#"{
                "name": "app:Road",
                "table": "road",
                "namespaces": { "app": "http://example.com/app" },
                "fid": { "columns": [] },
                "mappings": [
                    { "path": "app:a/app:b", "kind": "primitive", "column": "a" },
                    { "path": "app:c", "kind": "primitive" },
                    { "path": "app:d", "kind": "compound",
                      "joins": [{ "from_table": "road", "from_columns": ["gid", "x"],
                                  "to_table": "d", "to_columns": ["road_id"] }] }
                ]
            }"#,
        )?;
        let err = FeatureTypeMapping::from_config(&config).unwrap_err();
        let RelfeatError::ConfigurationError(msg) = err else {
            anyhow::bail!("expected a configuration error");
        };
        assert!(msg.contains("fid:"), "{msg}");
        assert!(msg.contains("mappings[0].path"), "{msg}");
        assert!(msg.contains("mappings[1]: one of `column` or `function` is required"), "{msg}");
        assert!(msg.contains("mappings[2].joins[0]"), "{msg}");
        Ok(())
    }

    #[test]
    fn malformed_documents_are_configuration_errors() {
        let err = FeatureTypeMappingConfig::from_json("{").unwrap_err();
        assert!(matches!(err, RelfeatError::ConfigurationError(_)));
    }
}
