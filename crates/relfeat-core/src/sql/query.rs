use std::fmt;
use std::sync::Arc;

use super::helpers::{qualify, validate_ident};
use crate::error::Result;
use crate::value::SqlValue;

/// A copy-on-write object that holds an assembled single-table SELECT.
///
/// Select expressions are taken verbatim (they come from converters and may
/// be function calls); table, alias, filter and order columns are validated
/// identifiers.
#[derive(Debug, Clone)]
pub struct SelectQuery {
    table: Arc<str>,
    alias: Arc<str>,
    select: Arc<Vec<String>>,
    filters: Arc<Vec<(String, SqlValue)>>,
    order_by: Arc<Vec<(String, bool)>>, // (column, asc)
}

impl SelectQuery {
    /// Creates an empty query object for a specific table.
    pub fn new(table: &str, alias: &str) -> Self {
        SelectQuery {
            table: Arc::from(table),
            alias: Arc::from(alias),
            select: Default::default(),
            filters: Default::default(),
            order_by: Default::default(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn select<I, S>(&self, cols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut rv = self.clone();
        rv.select = Arc::new(cols.into_iter().map(Into::into).collect());
        rv
    }

    /// Adds `alias.column = ?` bound to `value`.
    pub fn filter(&self, column: &str, value: SqlValue) -> Self {
        let mut rv = self.clone();
        Arc::make_mut(&mut rv.filters).push((column.to_string(), value));
        rv
    }

    pub fn order_by(&self, column: &str, asc: bool) -> Self {
        let mut rv = self.clone();
        Arc::make_mut(&mut rv.order_by).push((column.to_string(), asc));
        rv
    }

    pub fn to_sql(&self) -> Result<(String, Vec<SqlValue>)> {
        validate_ident(&self.table)?;
        if !self.alias.is_empty() {
            validate_ident(&self.alias)?;
        }

        // an empty list still has to yield one row per match
        let select = if self.select.is_empty() {
            "1".to_string()
        } else {
            self.select.join(",")
        };

        let mut sql = format!("SELECT {select} FROM {}", self.table);
        if !self.alias.is_empty() {
            sql.push(' ');
            sql.push_str(&self.alias);
        }

        let mut binds = Vec::with_capacity(self.filters.len());
        for (i, (col, value)) in self.filters.iter().enumerate() {
            validate_ident(col)?;
            sql.push_str(if i == 0 { " WHERE " } else { " AND " });
            sql.push_str(&qualify(&self.alias, col));
            sql.push_str(" = ?");
            binds.push(value.clone());
        }

        for (i, (col, asc)) in self.order_by.iter().enumerate() {
            validate_ident(col)?;
            sql.push_str(if i == 0 { " ORDER BY " } else { "," });
            sql.push_str(&qualify(&self.alias, col));
            if !*asc {
                sql.push_str(" DESC");
            }
        }

        Ok((sql, binds))
    }
}

impl fmt::Display for SelectQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_sql() {
            Ok((sql, _)) => f.write_str(&sql),
            Err(e) => write!(f, "<error: {e}>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_where_and_order_by() -> anyhow::Result<()> {
        let q = SelectQuery::new("contact", "x2")
            .select(["x2.name", "x2.phone"])
            .filter("feature_id", SqlValue::Int(42))
            .filter("kind", SqlValue::from("main"))
            .order_by("seq", true)
            .order_by("version", false);
        let (sql, binds) = q.to_sql()?;
        assert_eq!(
            sql,
            "SELECT x2.name,x2.phone FROM contact x2 WHERE x2.feature_id = ? AND x2.kind = ? \
             ORDER BY x2.seq,x2.version DESC"
        );
        assert_eq!(binds, vec![SqlValue::Int(42), SqlValue::from("main")]);
        Ok(())
    }

    #[test]
    fn empty_select_list_selects_a_literal() -> anyhow::Result<()> {
        let (sql, _) = SelectQuery::new("contact", "c").filter("fid", SqlValue::Int(1)).to_sql()?;
        assert_eq!(sql, "SELECT 1 FROM contact c WHERE c.fid = ?");
        Ok(())
    }

    #[test]
    fn copy_on_write_leaves_original_untouched() -> anyhow::Result<()> {
        let base = SelectQuery::new("road", "r").select(["r.gid"]);
        let filtered = base.filter("gid", SqlValue::Int(1));
        assert_eq!(base.to_sql()?.0, "SELECT r.gid FROM road r");
        assert!(filtered.to_sql()?.0.ends_with("WHERE r.gid = ?"));
        Ok(())
    }

    #[test]
    fn invalid_identifiers_are_rejected() {
        assert!(SelectQuery::new("road; drop", "r").to_sql().is_err());
        assert!(SelectQuery::new("road", "r").filter("a b", SqlValue::Null).to_sql().is_err());
    }
}
