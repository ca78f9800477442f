//! Converters: the select expression of a mapping and the decoding of its cell.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::warn;

use crate::connection::Row;
use crate::mapping::{Mapping, MappingExpression, MappingKind};
use crate::node::{FeatureReference, Particle};
use crate::sql::qualify;
use crate::value::{PrimitiveType, PrimitiveValue, SqlValue};

/// Select expression plus decoding for one mapping.
pub trait ParticleConverter: Send + Sync {
    /// Expression to put into the SELECT list for `alias`.
    fn select_snippet(&self, alias: &str) -> String;

    /// Decodes the column at 1-based `position`. `None` for SQL NULL.
    fn to_particle(&self, row: &Row, position: usize) -> Result<Option<Particle>>;
}

pub trait ConverterResolver: Send + Sync {
    fn resolve(&self, mapping: &Mapping) -> Option<Arc<dyn ParticleConverter>>;
}

/// Builds a converter for a mapping from its converter parameters.
pub type ConverterFactory =
    Arc<dyn Fn(&Mapping, &BTreeMap<String, String>) -> Result<Arc<dyn ParticleConverter>> + Send + Sync>;

fn snippet(expression: &MappingExpression, alias: &str) -> String {
    match expression {
        MappingExpression::Column(col) => qualify(alias, col),
        MappingExpression::Function(sql) => sql.clone(),
    }
}

fn cell(row: &Row, position: usize) -> Result<&SqlValue> {
    row.get(position)
        .ok_or_else(|| anyhow!("row has {} columns, no column at position {position}", row.len()))
}

/// Typed coercion of a single cell.
#[derive(Debug, Clone)]
pub struct PrimitiveConverter {
    expression: MappingExpression,
    primitive_type: PrimitiveType,
}

impl PrimitiveConverter {
    pub fn new(expression: MappingExpression, primitive_type: PrimitiveType) -> Self {
        Self {
            expression,
            primitive_type,
        }
    }
}

impl ParticleConverter for PrimitiveConverter {
    fn select_snippet(&self, alias: &str) -> String {
        snippet(&self.expression, alias)
    }

    fn to_particle(&self, row: &Row, position: usize) -> Result<Option<Particle>> {
        let value = cell(row, position)?;
        if value.is_null() {
            return Ok(None);
        }
        let value = PrimitiveValue::coerce(value.clone(), self.primitive_type)
            .map_err(|e| e.context(format!("decoding `{}`", self.expression)))?;
        Ok(Some(Particle::primitive(value)))
    }
}

/// Column value taken as the href of a referenced feature.
#[derive(Debug, Clone)]
pub struct FeatureReferenceConverter {
    expression: MappingExpression,
    prefix: String,
}

impl FeatureReferenceConverter {
    pub fn new(expression: MappingExpression) -> Self {
        Self {
            expression,
            prefix: String::new(),
        }
    }

    /// Prepended to every href, e.g. `#` for local references.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }
}

impl ParticleConverter for FeatureReferenceConverter {
    fn select_snippet(&self, alias: &str) -> String {
        snippet(&self.expression, alias)
    }

    fn to_particle(&self, row: &Row, position: usize) -> Result<Option<Particle>> {
        let value = cell(row, position)?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(Particle::Feature(FeatureReference::new(format!("{}{value}", self.prefix)))))
    }
}

/// The default [`ConverterResolver`].
///
/// A mapping naming a custom converter gets that converter (or none when the
/// name is not registered). Otherwise primitives and feature references use
/// the built-in converters; geometries and blobs use the factory registered
/// for their kind.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    custom: HashMap<String, ConverterFactory>,
    geometry: Option<ConverterFactory>,
    blob: Option<ConverterFactory>,
    reference_prefix: String,
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.custom.keys().collect();
        names.sort();
        f.debug_struct("ConverterRegistry")
            .field("custom", &names)
            .field("geometry", &self.geometry.is_some())
            .field("blob", &self.blob.is_some())
            .finish()
    }
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Mapping, &BTreeMap<String, String>) -> Result<Arc<dyn ParticleConverter>> + Send + Sync + 'static,
    {
        self.custom.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn with_geometry<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Mapping, &BTreeMap<String, String>) -> Result<Arc<dyn ParticleConverter>> + Send + Sync + 'static,
    {
        self.geometry = Some(Arc::new(factory));
        self
    }

    pub fn with_blob<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Mapping, &BTreeMap<String, String>) -> Result<Arc<dyn ParticleConverter>> + Send + Sync + 'static,
    {
        self.blob = Some(Arc::new(factory));
        self
    }

    pub fn with_reference_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.reference_prefix = prefix.into();
        self
    }

    fn build(&self, factory: &ConverterFactory, mapping: &Mapping, params: &BTreeMap<String, String>) -> Option<Arc<dyn ParticleConverter>> {
        match factory(mapping, params) {
            Ok(converter) => Some(converter),
            Err(e) => {
                warn!(mapping = %mapping.path, error = %e, "converter factory failed");
                None
            }
        }
    }
}

impl ConverterResolver for ConverterRegistry {
    fn resolve(&self, mapping: &Mapping) -> Option<Arc<dyn ParticleConverter>> {
        static NO_PARAMS: BTreeMap<String, String> = BTreeMap::new();

        if let Some(custom) = &mapping.custom_converter {
            let factory = self.custom.get(&custom.name)?;
            return self.build(factory, mapping, &custom.params);
        }

        match &mapping.kind {
            MappingKind::Primitive {
                expression,
                primitive_type,
            } => Some(Arc::new(PrimitiveConverter::new(expression.clone(), *primitive_type))),
            MappingKind::FeatureReference { expression } => Some(Arc::new(
                FeatureReferenceConverter::new(expression.clone()).with_prefix(self.reference_prefix.clone()),
            )),
            MappingKind::Geometry { .. } => self.geometry.as_ref().and_then(|f| self.build(f, mapping, &NO_PARAMS)),
            MappingKind::Blob { .. } => self.blob.as_ref().and_then(|f| self.build(f, mapping, &NO_PARAMS)),
            MappingKind::Compound { .. } | MappingKind::Expression { .. } => None,
        }
    }
}
