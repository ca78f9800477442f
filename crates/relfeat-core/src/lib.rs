//! Core engine for relfeat: rebuilds hierarchical features from relational rows

pub mod build;
pub mod cache;
pub mod connection;
pub mod convert;
pub mod error;
pub mod fetch;
pub mod geometry;
pub mod mapping;
pub mod metrics;
pub mod name;
pub mod node;
pub mod plan;
pub mod schema;
pub mod sql;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

pub use build::{BuildOptions, Built, FeatureBuilder, FeatureStream, FeatureTupleBuilder, TupleStream};
pub use cache::{FeatureCache, LruFeatureCache};
pub use connection::{Connection, Cursor, Row, VecCursor};
pub use convert::{ConverterRegistry, ConverterResolver, ParticleConverter};
pub use error::{RelfeatError, Result, Warning};
pub use geometry::{DefaultGeometryFactory, Geometry, GeometryFactory};
pub use mapping::{FeatureTypeMapping, Mapping, MappingKind};
pub use name::{NamespaceBindings, QName};
pub use node::{Element, Feature, FeatureReference, FeatureTuple, Particle, Property};
pub use plan::ColumnIndex;
pub use schema::{SchemaIntrospector, StaticSchema};
pub use value::{PrimitiveType, PrimitiveValue, SqlValue};
