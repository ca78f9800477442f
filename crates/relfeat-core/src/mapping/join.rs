use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{RelfeatError, Result};
use crate::sql::validate_ident;

/// An `ORDER BY` column of a joined fetch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OrderColumn {
    pub column: String,
    pub descending: bool,
}

impl OrderColumn {
    /// `seq` sorts ascending, `seq-` descending.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        match text.strip_suffix('-') {
            Some(column) => Self {
                column: column.trim_end().to_string(),
                descending: true,
            },
            None => Self {
                column: text.to_string(),
                descending: false,
            },
        }
    }
}

impl fmt::Display for OrderColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.column)?;
        if self.descending {
            f.write_str("-")?;
        }
        Ok(())
    }
}

/// One relational hop from the parent table to a child table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TableJoinDef", into = "TableJoinDef")]
pub struct TableJoin {
    from_table: String,
    from_alias: Option<String>,
    from_columns: Vec<String>,
    to_table: String,
    to_alias: Option<String>,
    to_columns: Vec<String>,
    order_columns: Vec<OrderColumn>,
}

impl TableJoin {
    /// Builds and validates a join. Order columns may carry a trailing `-`.
    pub fn new<F, T, O>(
        from_table: &str,
        from_columns: F,
        to_table: &str,
        to_columns: T,
        order_columns: O,
    ) -> Result<Self>
    where
        F: IntoIterator,
        F::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
        O: IntoIterator,
        O::Item: AsRef<str>,
    {
        let join = Self {
            from_table: from_table.to_string(),
            from_alias: None,
            from_columns: from_columns.into_iter().map(Into::into).collect(),
            to_table: to_table.to_string(),
            to_alias: None,
            to_columns: to_columns.into_iter().map(Into::into).collect(),
            order_columns: order_columns
                .into_iter()
                .map(|c| OrderColumn::parse(c.as_ref()))
                .collect(),
        };
        join.validate()?;
        Ok(join)
    }

    /// Alias the key columns are read under in the parent row; the parent
    /// table's own alias when unset.
    pub fn with_from_alias(mut self, alias: &str) -> Result<Self> {
        validate_ident(alias)?;
        self.from_alias = Some(alias.to_string());
        Ok(self)
    }

    pub fn with_to_alias(mut self, alias: &str) -> Result<Self> {
        validate_ident(alias)?;
        self.to_alias = Some(alias.to_string());
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        validate_ident(&self.from_table)?;
        validate_ident(&self.to_table)?;
        if self.from_columns.is_empty() {
            return Err(RelfeatError::config(format!(
                "join {} -> {} has no from columns",
                self.from_table, self.to_table
            )));
        }
        if self.from_columns.len() != self.to_columns.len() {
            return Err(RelfeatError::config(format!(
                "join {} -> {} pairs {} from columns with {} to columns",
                self.from_table,
                self.to_table,
                self.from_columns.len(),
                self.to_columns.len()
            )));
        }
        for col in self
            .from_columns
            .iter()
            .chain(&self.to_columns)
            .chain(self.order_columns.iter().map(|o| &o.column))
        {
            validate_ident(col)?;
        }
        for alias in self.from_alias.iter().chain(&self.to_alias) {
            validate_ident(alias)?;
        }
        Ok(())
    }

    pub fn from_table(&self) -> &str {
        &self.from_table
    }

    pub fn from_alias(&self) -> Option<&str> {
        self.from_alias.as_deref()
    }

    /// Alias qualifying the key columns, given the alias of the parent table.
    pub fn key_alias<'a>(&'a self, parent_alias: &'a str) -> &'a str {
        self.from_alias.as_deref().unwrap_or(parent_alias)
    }

    pub fn from_columns(&self) -> &[String] {
        &self.from_columns
    }

    pub fn to_table(&self) -> &str {
        &self.to_table
    }

    pub fn to_alias(&self) -> Option<&str> {
        self.to_alias.as_deref()
    }

    pub fn to_columns(&self) -> &[String] {
        &self.to_columns
    }

    pub fn order_columns(&self) -> &[OrderColumn] {
        &self.order_columns
    }
}

impl fmt::Display for TableJoin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}) -> {}({})",
            self.from_table,
            self.from_columns.join(","),
            self.to_table,
            self.to_columns.join(",")
        )
    }
}

/// Declarative shape of a join as it appears in mapping configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableJoinDef {
    pub from_table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_alias: Option<String>,
    pub from_columns: Vec<String>,
    pub to_table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_alias: Option<String>,
    pub to_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_columns: Vec<String>,
}

impl TryFrom<TableJoinDef> for TableJoin {
    type Error = RelfeatError;

    fn try_from(def: TableJoinDef) -> Result<Self> {
        let join = Self {
            from_table: def.from_table,
            from_alias: def.from_alias,
            from_columns: def.from_columns,
            to_table: def.to_table,
            to_alias: def.to_alias,
            to_columns: def.to_columns,
            order_columns: def.order_columns.iter().map(|c| OrderColumn::parse(c)).collect(),
        };
        join.validate()?;
        Ok(join)
    }
}

impl From<TableJoin> for TableJoinDef {
    fn from(join: TableJoin) -> Self {
        Self {
            from_table: join.from_table,
            from_alias: join.from_alias,
            from_columns: join.from_columns,
            to_table: join.to_table,
            to_alias: join.to_alias,
            to_columns: join.to_columns,
            order_columns: join.order_columns.iter().map(ToString::to_string).collect(),
        }
    }
}
