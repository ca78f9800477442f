//! Follow-up SELECTs issued when a mapping crosses a join.

use tracing::{debug, instrument, warn};

use crate::connection::{Connection, Cursor, Row};
use crate::convert::ConverterResolver;
use crate::error::{RelfeatError, Result};
use crate::mapping::{Mapping, TableJoin};
use crate::metrics::FetchTimer;
use crate::plan::{plan, ColumnIndex};
use crate::sql::{qualify, SelectQuery};
use crate::value::SqlValue;

/// Rows of one joined fetch. The cursor is closed when this is dropped.
pub struct JoinedRows<'c> {
    cursor: Option<Box<dyn Cursor + 'c>>,
    index: ColumnIndex,
    alias: String,
    sql: String,
}

impl<'c> JoinedRows<'c> {
    fn empty(index: ColumnIndex, alias: String, sql: String) -> Self {
        Self {
            cursor: None,
            index,
            alias,
            sql,
        }
    }

    /// Moves to the next joined row.
    pub fn advance(&mut self) -> Result<bool> {
        match self.cursor.as_mut() {
            Some(cursor) => cursor
                .advance()
                .map_err(|e| RelfeatError::query("reading joined rows failed", self.sql.clone(), e)),
            None => Ok(false),
        }
    }

    pub fn current(&self) -> Option<&Row> {
        self.cursor.as_ref().and_then(|c| c.row())
    }

    /// Positions of the joined select list.
    pub fn column_index(&self) -> &ColumnIndex {
        &self.index
    }

    /// Alias the joined table was selected under.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Closes the cursor now, reporting a failure instead of logging it.
    pub fn close(mut self) -> Result<()> {
        match self.cursor.take() {
            Some(mut cursor) => cursor
                .close()
                .map_err(|e| RelfeatError::query("closing joined cursor failed", self.sql.clone(), e)),
            None => Ok(()),
        }
    }
}

impl Drop for JoinedRows<'_> {
    fn drop(&mut self) {
        if let Some(mut cursor) = self.cursor.take() {
            if let Err(e) = cursor.close() {
                warn!(sql = %self.sql, error = %e, "failed to close joined cursor");
            }
        }
    }
}

/// Runs the SELECT for `mapping` across `join`, keyed by the parent row.
///
/// The joined table is aliased with the join's target alias, or with
/// `parent_alias` when the join has none. A NULL key means there is nothing
/// to join and no query is issued.
#[instrument(level = "debug", skip_all, fields(table = join.to_table(), mapping = %mapping.path))]
pub fn fetch<'c>(
    conn: &'c dyn Connection,
    converters: &dyn ConverterResolver,
    join: &TableJoin,
    mapping: &Mapping,
    row: &Row,
    index: &ColumnIndex,
    parent_alias: &str,
) -> Result<JoinedRows<'c>> {
    let alias = join.to_alias().unwrap_or(parent_alias).to_string();
    let joined_index = plan(mapping, &alias, true, converters);

    let mut query = SelectQuery::new(join.to_table(), &alias).select(joined_index.columns());
    for order in join.order_columns() {
        query = query.order_by(&order.column, !order.descending);
    }

    let mut keys = Vec::with_capacity(join.from_columns().len());
    for (from, to) in join.from_columns().iter().zip(join.to_columns()) {
        let key = qualify(join.key_alias(parent_alias), from);
        let value = index
            .position(&key)
            .and_then(|pos| row.get(pos))
            .ok_or_else(|| {
                RelfeatError::query(
                    format!("join key `{key}` is not part of the parent row"),
                    query.to_string(),
                    format!("columns: {:?}", index.to_vec()),
                )
            })?;
        keys.push(value.clone());
        query = query.filter(to, value.clone());
    }

    let (sql, params) = query.to_sql()?;
    if keys.iter().any(SqlValue::is_null) {
        debug!(sql = %sql, "NULL join key, skipping fetch");
        return Ok(JoinedRows::empty(joined_index, alias, sql));
    }

    debug!(sql = %sql, params = ?params, "fetching joined rows");
    let timer = FetchTimer::start(join.to_table());
    let cursor = conn
        .query(&sql, &params)
        .map_err(|e| RelfeatError::query("joined SELECT failed", sql.clone(), e))?;
    timer.finish();

    Ok(JoinedRows {
        cursor: Some(cursor),
        index: joined_index,
        alias,
        sql,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::ConverterRegistry;
    use crate::mapping::{MappingExpression, PathStep};
    use crate::name::QName;
    use crate::testing::ScriptedConnection;
    use crate::value::PrimitiveType;

    fn contact(order: &[&str]) -> (Mapping, TableJoin) {
        let join = TableJoin::new("road", ["gid"], "contact", ["road_id"], order.iter().copied()).unwrap();
        let m = Mapping::compound(
            PathStep::child(QName::local("contact")),
            vec![Mapping::primitive(
                PathStep::child(QName::local("phone")),
                MappingExpression::Column("phone".into()),
                PrimitiveType::String,
            )],
            None,
        )
        .with_join(join.clone());
        (m, join)
    }

    fn parent() -> (Row, ColumnIndex) {
        (
            Row::new(vec![SqlValue::Int(42)]),
            ["x1.gid".to_string()].into_iter().collect(),
        )
    }

    #[test]
    fn builds_keyed_and_ordered_select() -> anyhow::Result<()> {
        let (m, join) = contact(&["seq", "version-"]);
        let (row, index) = parent();
        let conn = ScriptedConnection::new().respond("FROM contact", vec![vec![SqlValue::from("555")]]);

        let mut rows = fetch(&conn, &ConverterRegistry::new(), &join, &m, &row, &index, "x1")?;
        assert_eq!(
            rows.sql(),
            "SELECT x1.phone FROM contact x1 WHERE x1.road_id = ? ORDER BY x1.seq,x1.version DESC"
        );
        assert_eq!(conn.executed()[0].1, vec![SqlValue::Int(42)]);
        assert!(rows.advance()?);
        assert_eq!(rows.current().and_then(|r| r.get(1)), Some(&SqlValue::from("555")));
        assert_eq!(rows.column_index().position("x1.phone"), Some(1));
        assert!(!rows.advance()?);
        Ok(())
    }

    #[test]
    fn target_alias_wins_over_parent_alias() -> anyhow::Result<()> {
        let (m, join) = contact(&[]);
        let join = join.with_to_alias("c")?;
        let (row, index) = parent();
        let conn = ScriptedConnection::new();
        let rows = fetch(&conn, &ConverterRegistry::new(), &join, &m, &row, &index, "x1")?;
        assert_eq!(rows.alias(), "c");
        assert_eq!(rows.sql(), "SELECT c.phone FROM contact c WHERE c.road_id = ?");
        Ok(())
    }

    #[test]
    fn source_alias_qualifies_the_parent_keys() -> anyhow::Result<()> {
        let (m, join) = contact(&[]);
        let join = join.with_from_alias("r")?;
        let row = Row::new(vec![SqlValue::Int(1), SqlValue::Int(42)]);
        let index: ColumnIndex = ["x1.gid".to_string(), "r.gid".to_string()].into_iter().collect();
        let conn = ScriptedConnection::new();
        fetch(&conn, &ConverterRegistry::new(), &join, &m, &row, &index, "x1")?.close()?;
        assert_eq!(conn.executed()[0].1, vec![SqlValue::Int(42)]);
        Ok(())
    }

    #[test]
    fn null_key_skips_the_query() -> anyhow::Result<()> {
        let (m, join) = contact(&[]);
        let row = Row::new(vec![SqlValue::Null]);
        let index: ColumnIndex = ["x1.gid".to_string()].into_iter().collect();
        let conn = ScriptedConnection::new();
        let mut rows = fetch(&conn, &ConverterRegistry::new(), &join, &m, &row, &index, "x1")?;
        assert!(!rows.advance()?);
        assert!(conn.executed().is_empty());
        Ok(())
    }

    #[test]
    fn cursor_is_closed_on_drop() -> anyhow::Result<()> {
        let (m, join) = contact(&[]);
        let (row, index) = parent();
        let conn = ScriptedConnection::new().respond("FROM contact", vec![vec![SqlValue::from("1")]]);
        {
            let mut rows = fetch(&conn, &ConverterRegistry::new(), &join, &m, &row, &index, "x1")?;
            rows.advance()?;
            assert_eq!(conn.open_cursors(), 1);
        }
        assert_eq!(conn.open_cursors(), 0);
        Ok(())
    }

    #[test]
    fn query_failure_carries_sql() {
        let (m, join) = contact(&[]);
        let (row, index) = parent();
        let conn = ScriptedConnection::new().fail_on("FROM contact");
        let err = fetch(&conn, &ConverterRegistry::new(), &join, &m, &row, &index, "x1")
            .err()
            .unwrap();
        assert!(err.is_query());
        assert!(err.to_string().contains("FROM contact"));
    }

    #[test]
    fn missing_key_column_is_a_query_error() {
        let (m, join) = contact(&[]);
        let row = Row::new(vec![SqlValue::Int(1)]);
        let index: ColumnIndex = ["x1.other".to_string()].into_iter().collect();
        let conn = ScriptedConnection::new();
        let err = fetch(&conn, &ConverterRegistry::new(), &join, &m, &row, &index, "x1")
            .err()
            .unwrap();
        assert!(err.is_query());
    }
}
