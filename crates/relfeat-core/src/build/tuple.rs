//! Rows carrying several feature types at once, rebuilt into tuples.

use std::collections::HashSet;

use tracing::{debug, instrument, warn};

use crate::connection::{Connection, Cursor, Row};
use crate::error::{RelfeatError, Result};
use crate::node::FeatureTuple;
use crate::plan::{combined_select_list, ColumnIndex};
use crate::value::SqlValue;

use super::FeatureBuilder;

/// Rebuilds one feature per member type from each row of a query that
/// selects all member tables side by side.
///
/// Every member reads its columns under its own table alias; the combined
/// select list concatenates the members' lists in order.
pub struct FeatureTupleBuilder<'a> {
    conn: &'a dyn Connection,
    members: Vec<FeatureBuilder<'a>>,
    index: ColumnIndex,
}

impl<'a> FeatureTupleBuilder<'a> {
    pub fn new(members: Vec<FeatureBuilder<'a>>) -> Result<Self> {
        let Some(first) = members.first() else {
            return Err(RelfeatError::config("a feature tuple needs at least one feature type"));
        };
        let (conn, converters) = (first.conn, first.converters);

        let mut aliases = HashSet::new();
        for member in &members {
            if !aliases.insert(member.options.table_alias.as_str()) {
                return Err(RelfeatError::config(format!(
                    "table alias `{}` is used by more than one feature type",
                    member.options.table_alias
                )));
            }
        }

        let index = combined_select_list(
            members
                .iter()
                .map(|m| (m.feature_type, m.options.table_alias.as_str())),
            converters,
        );
        Ok(Self { conn, members, index })
    }

    pub fn members(&self) -> &[FeatureBuilder<'a>] {
        &self.members
    }

    /// Columns the outer query must select, member by member.
    pub fn initial_select_list(&self) -> &ColumnIndex {
        &self.index
    }

    /// Rebuilds every member's feature from `row`. A failing member fails
    /// the whole tuple.
    #[instrument(level = "debug", skip_all, fields(members = self.members.len()))]
    pub fn build_tuple(&self, row: &Row) -> Result<FeatureTuple> {
        let features = self
            .members
            .iter()
            .map(|member| member.build_feature_in(row, &self.index))
            .collect::<Result<Vec<_>>>()?;
        debug!(ids = ?features.iter().map(|f| f.id.as_str()).collect::<Vec<_>>(), "built feature tuple");
        Ok(FeatureTuple::new(features))
    }

    /// Runs `sql`, which must select [`initial_select_list`](Self::initial_select_list)
    /// in order, and rebuilds one tuple per row on the first member's connection.
    pub fn query(&self, sql: &str, params: &[SqlValue]) -> Result<TupleStream<'_, 'a>> {
        debug!(sql = %sql, "running feature tuple query");
        let cursor = self
            .conn
            .query(sql, params)
            .map_err(|e| RelfeatError::query("feature tuple SELECT failed", sql, e))?;
        Ok(TupleStream {
            builder: self,
            cursor: Some(cursor),
            sql: sql.to_string(),
        })
    }
}

/// Tuples of an outer query, one per row. A failing row yields an error and
/// the stream continues with the next row.
pub struct TupleStream<'b, 'a> {
    builder: &'b FeatureTupleBuilder<'a>,
    cursor: Option<Box<dyn Cursor + 'a>>,
    sql: String,
}

impl TupleStream<'_, '_> {
    fn finish(&mut self) {
        if let Some(mut cursor) = self.cursor.take() {
            if let Err(e) = cursor.close() {
                warn!(sql = %self.sql, error = %e, "failed to close feature tuple cursor");
            }
        }
    }
}

impl Iterator for TupleStream<'_, '_> {
    type Item = Result<FeatureTuple>;

    fn next(&mut self) -> Option<Self::Item> {
        let cursor = self.cursor.as_mut()?;
        match cursor.advance() {
            Ok(true) => {
                let row = cursor.row()?;
                Some(self.builder.build_tuple(row))
            }
            Ok(false) => {
                self.finish();
                None
            }
            Err(e) => {
                let err = RelfeatError::query("reading feature tuple rows failed", self.sql.clone(), e);
                self.finish();
                Some(Err(err))
            }
        }
    }
}

impl Drop for TupleStream<'_, '_> {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::build::BuildOptions;
    use crate::cache::{FeatureCache, LruFeatureCache};
    use crate::convert::ConverterRegistry;
    use crate::mapping::{FeatureTypeMapping, FidMapping, Mapping, MappingExpression, PathStep};
    use crate::name::{NamespaceBindings, QName};
    use crate::node::Feature;
    use crate::schema::StaticSchema;
    use crate::testing::ScriptedConnection;
    use crate::value::{PrimitiveType, PrimitiveValue};
    use pretty_assertions::assert_eq;

    const APP: &str = "http://example.com/app";

    fn app(local: &str) -> QName {
        QName::new(APP, local)
    }

    fn prim(path: &str, col: &str) -> Mapping {
        let ns = NamespaceBindings::new().with("app", APP);
        Mapping::primitive(
            PathStep::parse(path, &ns).unwrap(),
            MappingExpression::Column(col.into()),
            PrimitiveType::String,
        )
    }

    fn road() -> FeatureTypeMapping {
        FeatureTypeMapping::new(
            app("Road"),
            "road",
            FidMapping::new("R", "_", vec![("gid".into(), PrimitiveType::Integer)]).unwrap(),
            vec![prim("app:name", "name")],
        )
        .unwrap()
    }

    fn owner() -> FeatureTypeMapping {
        FeatureTypeMapping::new(
            app("Owner"),
            "owner",
            FidMapping::new("O", "_", vec![("id".into(), PrimitiveType::Integer)]).unwrap(),
            vec![prim("app:name", "name"), prim("app:city", "city")],
        )
        .unwrap()
    }

    fn aliased(alias: &str) -> BuildOptions {
        BuildOptions {
            table_alias: alias.to_string(),
            ..Default::default()
        }
    }

    fn row(values: Vec<SqlValue>) -> Row {
        Row::new(values)
    }

    #[test]
    fn builds_one_feature_per_type() -> anyhow::Result<()> {
        let (road, owner) = (road(), owner());
        let conn = ScriptedConnection::new();
        let registry = ConverterRegistry::new();
        let schema = StaticSchema::new();
        let tuples = FeatureTupleBuilder::new(vec![
            FeatureBuilder::new(&road, &conn, &registry, &schema).with_options(aliased("a")),
            FeatureBuilder::new(&owner, &conn, &registry, &schema).with_options(aliased("b")),
        ])?;

        assert_eq!(
            tuples.initial_select_list().to_vec(),
            vec!["a.gid", "a.name", "b.id", "b.name", "b.city"]
        );

        let tuple = tuples.build_tuple(&row(vec![
            SqlValue::Int(42),
            SqlValue::from("Main St"),
            SqlValue::Int(7),
            SqlValue::from("Ada"),
            SqlValue::from("Oslo"),
        ]))?;
        assert_eq!(tuple.ids().collect::<Vec<_>>(), vec!["R42", "O7"]);
        assert_eq!(tuple.features[0].type_name, app("Road"));
        assert_eq!(
            tuple.features[1].properties_named(&app("city")).next().map(|p| p.children.clone()),
            Some(vec![crate::node::Particle::primitive(PrimitiveValue::string("Oslo"))])
        );
        Ok(())
    }

    #[test]
    fn cached_members_are_part_of_the_tuple() -> anyhow::Result<()> {
        let (road, owner) = (road(), owner());
        let conn = ScriptedConnection::new();
        let registry = ConverterRegistry::new();
        let schema = StaticSchema::new();
        let cache = LruFeatureCache::new(8);
        let cached = Arc::new(Feature::new("O7", app("Owner"), Vec::new()));
        cache.put(Arc::clone(&cached));

        let tuples = FeatureTupleBuilder::new(vec![
            FeatureBuilder::new(&road, &conn, &registry, &schema)
                .with_options(aliased("a"))
                .with_cache(&cache),
            FeatureBuilder::new(&owner, &conn, &registry, &schema)
                .with_options(aliased("b"))
                .with_cache(&cache),
        ])?;
        let tuple = tuples.build_tuple(&row(vec![
            SqlValue::Int(42),
            SqlValue::from("Main St"),
            SqlValue::Int(7),
            SqlValue::from("ignored"),
            SqlValue::Null,
        ]))?;

        assert_eq!(tuple.len(), 2);
        assert!(Arc::ptr_eq(&tuple.features[1], &cached));
        assert!(cache.get("R42").is_some());
        Ok(())
    }

    #[test]
    fn failing_member_fails_the_tuple() -> anyhow::Result<()> {
        let (road, owner) = (road(), owner());
        let conn = ScriptedConnection::new();
        let registry = ConverterRegistry::new();
        let schema = StaticSchema::new();
        let tuples = FeatureTupleBuilder::new(vec![
            FeatureBuilder::new(&road, &conn, &registry, &schema).with_options(aliased("a")),
            FeatureBuilder::new(&owner, &conn, &registry, &schema).with_options(aliased("b")),
        ])?;

        let err = tuples
            .build_tuple(&row(vec![
                SqlValue::Int(42),
                SqlValue::from("Main St"),
                SqlValue::Null,
                SqlValue::Null,
                SqlValue::Null,
            ]))
            .unwrap_err();
        assert!(err.is_reconstruction());
        Ok(())
    }

    #[test]
    fn members_need_distinct_aliases() {
        let (road, owner) = (road(), owner());
        let conn = ScriptedConnection::new();
        let registry = ConverterRegistry::new();
        let schema = StaticSchema::new();

        let err = FeatureTupleBuilder::new(vec![
            FeatureBuilder::new(&road, &conn, &registry, &schema),
            FeatureBuilder::new(&owner, &conn, &registry, &schema),
        ])
        .err();
        assert!(matches!(err, Some(RelfeatError::ConfigurationError(_))));

        let empty = FeatureTupleBuilder::new(Vec::new()).err();
        assert!(matches!(empty, Some(RelfeatError::ConfigurationError(_))));
    }

    #[test]
    fn tuple_stream_closes_its_cursor() -> anyhow::Result<()> {
        let (road, owner) = (road(), owner());
        let sql = "SELECT a.gid,a.name,b.id,b.name,b.city FROM road a JOIN owner b ON b.id = a.owner_id";
        let conn = ScriptedConnection::new().respond(
            "FROM road a JOIN owner b",
            vec![
                vec![SqlValue::Int(1), SqlValue::from("r1"), SqlValue::Int(7), SqlValue::from("o"), SqlValue::Null],
                vec![SqlValue::Int(2), SqlValue::from("r2"), SqlValue::Null, SqlValue::Null, SqlValue::Null],
                vec![SqlValue::Int(3), SqlValue::from("r3"), SqlValue::Int(8), SqlValue::from("p"), SqlValue::Null],
            ],
        );
        let registry = ConverterRegistry::new();
        let schema = StaticSchema::new();
        let tuples = FeatureTupleBuilder::new(vec![
            FeatureBuilder::new(&road, &conn, &registry, &schema).with_options(aliased("a")),
            FeatureBuilder::new(&owner, &conn, &registry, &schema).with_options(aliased("b")),
        ])?;

        let results: Vec<_> = tuples.query(sql, &[])?.collect();
        assert_eq!(results.len(), 3);
        assert_eq!(
            results[0].as_ref().map(|t| t.ids().map(str::to_string).collect::<Vec<_>>()).ok(),
            Some(vec!["R1".to_string(), "O7".to_string()])
        );
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
        assert_eq!(conn.open_cursors(), 0);
        Ok(())
    }

    #[test]
    fn failed_tuple_query_is_a_query_error() -> anyhow::Result<()> {
        let road = road();
        let conn = ScriptedConnection::new().fail_on("FROM road");
        let registry = ConverterRegistry::new();
        let schema = StaticSchema::new();
        let tuples = FeatureTupleBuilder::new(vec![FeatureBuilder::new(&road, &conn, &registry, &schema)])?;

        let err = tuples.query("SELECT x1.gid,x1.name FROM road x1", &[]).err();
        assert!(matches!(err, Some(RelfeatError::QueryError { .. })));
        assert_eq!(conn.open_cursors(), 0);
        Ok(())
    }
}
