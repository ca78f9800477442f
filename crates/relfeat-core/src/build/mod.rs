//! Feature reconstruction: one outer row in, one feature out.

mod particle;
mod tuple;

use std::sync::Arc;

use tracing::{debug, error, instrument, warn};

use crate::cache::FeatureCache;
use crate::connection::{Connection, Cursor, Row};
use crate::convert::ConverterResolver;
use crate::error::{warning, RelfeatError, Result, Warning};
use crate::geometry::{DefaultGeometryFactory, GeometryFactory};
use crate::mapping::{FeatureTypeMapping, Mapping};
use crate::metrics::EngineMetrics;
use crate::name::QName;
use crate::node::{Feature, Particle, Property};
use crate::plan::{initial_select_list, ColumnIndex};
use crate::schema::SchemaIntrospector;
use crate::sql::{qualify, SelectQuery};

pub use particle::{Built, ParticleList};
pub use tuple::{FeatureTupleBuilder, TupleStream};

use particle::ParticleBuilder;

pub const DEFAULT_TABLE_ALIAS: &str = "x1";

static DEFAULT_GEOMETRY_FACTORY: DefaultGeometryFactory = DefaultGeometryFactory;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildOptions {
    /// Alias of the feature type table in the outer query.
    pub table_alias: String,
    /// Let missing required values void (omit or nil) their parent.
    pub null_escalation: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            table_alias: DEFAULT_TABLE_ALIAS.to_string(),
            null_escalation: true,
        }
    }
}

/// Rebuilds features of one type from rows of its table.
///
/// The connection is borrowed for the builder's lifetime; only cursors the
/// builder opens itself are closed by it.
pub struct FeatureBuilder<'a> {
    feature_type: &'a FeatureTypeMapping,
    conn: &'a dyn Connection,
    converters: &'a dyn ConverterResolver,
    schema: &'a dyn SchemaIntrospector,
    geometry_factory: &'a dyn GeometryFactory,
    cache: Option<&'a dyn FeatureCache>,
    options: BuildOptions,
    index: ColumnIndex,
}

impl<'a> FeatureBuilder<'a> {
    pub fn new(
        feature_type: &'a FeatureTypeMapping,
        conn: &'a dyn Connection,
        converters: &'a dyn ConverterResolver,
        schema: &'a dyn SchemaIntrospector,
    ) -> Self {
        let options = BuildOptions::default();
        let index = initial_select_list(feature_type, &options.table_alias, converters);
        Self {
            feature_type,
            conn,
            converters,
            schema,
            geometry_factory: &DEFAULT_GEOMETRY_FACTORY,
            cache: None,
            options,
            index,
        }
    }

    pub fn with_options(mut self, options: BuildOptions) -> Self {
        if options.table_alias != self.options.table_alias {
            self.index = initial_select_list(self.feature_type, &options.table_alias, self.converters);
        }
        self.options = options;
        self
    }

    pub fn with_cache(mut self, cache: &'a dyn FeatureCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_geometry_factory(mut self, factory: &'a dyn GeometryFactory) -> Self {
        self.geometry_factory = factory;
        self
    }

    pub fn feature_type(&self) -> &'a FeatureTypeMapping {
        self.feature_type
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Columns the outer query must select, fid columns first.
    pub fn initial_select_list(&self) -> &ColumnIndex {
        &self.index
    }

    /// `SELECT <initial list> FROM <table> <alias>`
    pub fn select_query(&self) -> SelectQuery {
        SelectQuery::new(&self.feature_type.table, &self.options.table_alias).select(self.index.columns())
    }

    /// Runs the outer query and rebuilds one feature per row.
    pub fn query(&self) -> Result<FeatureStream<'_, 'a>> {
        let (sql, params) = self.select_query().to_sql()?;
        debug!(sql = %sql, "running feature query");
        let cursor = self
            .conn
            .query(&sql, &params)
            .map_err(|e| RelfeatError::query("feature SELECT failed", sql.clone(), e))?;
        Ok(FeatureStream {
            builder: self,
            cursor: Some(cursor),
            sql,
        })
    }

    /// The id of the feature held in `row`.
    pub fn feature_id(&self, row: &Row) -> Result<String> {
        self.feature_id_in(row, &self.index)
    }

    pub(crate) fn feature_id_in(&self, row: &Row, index: &ColumnIndex) -> Result<String> {
        let mut keys = Vec::with_capacity(self.feature_type.fid.columns().len());
        for (col, _) in self.feature_type.fid.columns() {
            let key = qualify(&self.options.table_alias, col);
            let value = index
                .position(&key)
                .and_then(|pos| row.get(pos))
                .ok_or_else(|| {
                    RelfeatError::reconstruction(
                        format!("fid column `{key}` missing from row"),
                        format!("row has {} columns", row.len()),
                    )
                })?;
            if value.is_null() {
                return Err(RelfeatError::reconstruction(
                    format!("fid column `{key}` is NULL"),
                    "cannot derive a feature id",
                ));
            }
            keys.push(value.to_string());
        }
        Ok(self.feature_type.fid.build_id(&keys, None))
    }

    /// Rebuilds the feature in `row`, or returns the cached one.
    #[instrument(level = "debug", skip_all, fields(feature_type = %self.feature_type.name))]
    pub fn build_feature(&self, row: &Row) -> Result<Arc<Feature>> {
        self.build_feature_in(row, &self.index)
    }

    /// As [`build_feature`](Self::build_feature), with column positions
    /// taken from `index` instead of this builder's own select list.
    pub(crate) fn build_feature_in(&self, row: &Row, index: &ColumnIndex) -> Result<Arc<Feature>> {
        let type_name = self.feature_type.name.to_string();
        let id = self.feature_id_in(row, index).map_err(|e| {
            EngineMetrics::feature_failed(&type_name, error_type(&e));
            e
        })?;

        if let Some(feature) = self.cache.and_then(|c| c.get(&id)) {
            debug!(id = %id, "cache hit");
            EngineMetrics::cache_hit(&type_name);
            return Ok(feature);
        }

        debug!(id = %id, "recreating feature from db");
        match self.assemble(&id, row, index) {
            Ok(feature) => {
                let feature = Arc::new(feature);
                EngineMetrics::feature_built(&type_name);
                if let Some(cache) = self.cache {
                    cache.put(Arc::clone(&feature));
                }
                Ok(feature)
            }
            Err(e) => {
                error!(id = %id, error = %e, "feature reconstruction failed");
                EngineMetrics::feature_failed(&type_name, error_type(&e));
                Err(e)
            }
        }
    }

    /// All occurrences of `mapping` in `row` (positions per `index`), as
    /// they would appear below the feature.
    pub fn build_particles(
        &self,
        mapping: &Mapping,
        row: &Row,
        index: &ColumnIndex,
        id_prefix: &str,
    ) -> Result<Vec<Particle>> {
        Ok(self
            .particles()
            .build_particles(mapping, row, index, &self.options.table_alias, id_prefix)?
            .values)
    }

    /// Rebuilds a single occurrence of `mapping` without following its join.
    pub fn build_particle(&self, mapping: &Mapping, row: &Row, index: &ColumnIndex, id_prefix: &str) -> Result<Built> {
        self.particles()
            .build_particle(mapping, row, index, &self.options.table_alias, id_prefix)
    }

    fn particles(&self) -> ParticleBuilder<'_> {
        ParticleBuilder {
            conn: self.conn,
            converters: self.converters,
            schema: self.schema,
            geometry_factory: self.geometry_factory,
            null_escalation: self.options.null_escalation,
        }
    }

    fn assemble(&self, id: &str, row: &Row, index: &ColumnIndex) -> Result<Feature> {
        let particles = self.particles();
        let mut properties = Vec::new();

        for mapping in &self.feature_type.mappings {
            let Some(name) = mapping.path.child_element_name() else {
                warning!(
                    Warning::UnsupportedMapping,
                    path = %mapping.path,
                    "omitting mapping: only single child element steps (optionally with a number predicate) are supported"
                );
                continue;
            };
            let id_prefix = format!("{id}_{}", mapping.path.id_prefix());
            let list = particles.build_particles(mapping, row, index, &self.options.table_alias, &id_prefix)?;
            self.add_properties(&mut properties, name, list.values);
        }

        Ok(Feature::new(id, self.feature_type.name.clone(), properties))
    }

    fn add_properties(&self, properties: &mut Vec<Property>, name: &QName, particles: Vec<Particle>) {
        if particles.is_empty() {
            let declaration = self.schema.property(&self.feature_type.name, name).unwrap_or_default();
            if declaration.min_occurs > 0 {
                if declaration.nillable {
                    properties.push(Property::nil(name.clone()));
                } else {
                    warning!(
                        Warning::SchemaViolation,
                        property = %name,
                        "unable to map NULL value to output, the document will not validate"
                    );
                }
            }
            return;
        }

        for particle in particles {
            match particle {
                Particle::Element(element) => {
                    properties.push(Property::new(element.name, element.attributes, element.children))
                }
                other => properties.push(Property::with_value(name.clone(), other)),
            }
        }
    }
}

fn error_type(e: &RelfeatError) -> &'static str {
    match e {
        RelfeatError::ConfigurationError(_) => "configuration",
        RelfeatError::QueryError { .. } => "query",
        RelfeatError::ReconstructionError { .. } => "reconstruction",
    }
}

/// Features of an outer query, one per row. A failing row yields an error
/// and the stream continues with the next row.
pub struct FeatureStream<'b, 'a> {
    builder: &'b FeatureBuilder<'a>,
    cursor: Option<Box<dyn Cursor + 'a>>,
    sql: String,
}

impl FeatureStream<'_, '_> {
    fn finish(&mut self) {
        if let Some(mut cursor) = self.cursor.take() {
            if let Err(e) = cursor.close() {
                warn!(sql = %self.sql, error = %e, "failed to close feature cursor");
            }
        }
    }
}

impl Iterator for FeatureStream<'_, '_> {
    type Item = Result<Arc<Feature>>;

    fn next(&mut self) -> Option<Self::Item> {
        let cursor = self.cursor.as_mut()?;
        match cursor.advance() {
            Ok(true) => {
                let row = cursor.row()?;
                Some(self.builder.build_feature(row))
            }
            Ok(false) => {
                self.finish();
                None
            }
            Err(e) => {
                let err = RelfeatError::query("reading feature rows failed", self.sql.clone(), e);
                self.finish();
                Some(Err(err))
            }
        }
    }
}

impl Drop for FeatureStream<'_, '_> {
    fn drop(&mut self) {
        self.finish();
    }
}
