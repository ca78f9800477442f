//! Connection and cursor seams the engine queries through.

use anyhow::{bail, Result};

use crate::value::SqlValue;

/// One result row with positional, 1-based column access.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row {
    values: Vec<SqlValue>,
}

impl Row {
    pub fn new(values: Vec<SqlValue>) -> Self {
        Self { values }
    }

    /// Column at 1-based `position`.
    pub fn get(&self, position: usize) -> Option<&SqlValue> {
        position.checked_sub(1).and_then(|i| self.values.get(i))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }
}

impl From<Vec<SqlValue>> for Row {
    fn from(values: Vec<SqlValue>) -> Self {
        Self::new(values)
    }
}

/// Forward-only result cursor.
pub trait Cursor {
    /// Moves to the next row; `false` once exhausted.
    fn advance(&mut self) -> Result<bool>;

    /// The current row, `None` before the first `advance` or after the end.
    fn row(&self) -> Option<&Row>;

    /// Releases the statement. Further calls are no-ops.
    fn close(&mut self) -> Result<()>;
}

/// Source of parameterised queries. `?` is the placeholder.
pub trait Connection {
    fn query<'a>(&'a self, sql: &str, params: &[SqlValue]) -> Result<Box<dyn Cursor + 'a>>;
}

impl<C: Connection + ?Sized> Connection for &C {
    fn query<'a>(&'a self, sql: &str, params: &[SqlValue]) -> Result<Box<dyn Cursor + 'a>> {
        (**self).query(sql, params)
    }
}

/// Cursor over rows that are already in memory.
#[derive(Debug)]
pub struct VecCursor {
    rows: std::vec::IntoIter<Row>,
    current: Option<Row>,
    closed: bool,
}

impl VecCursor {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows: rows.into_iter(),
            current: None,
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Cursor for VecCursor {
    fn advance(&mut self) -> Result<bool> {
        if self.closed {
            bail!("cursor is closed");
        }
        self.current = self.rows.next();
        Ok(self.current.is_some())
    }

    fn row(&self) -> Option<&Row> {
        self.current.as_ref()
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.current = None;
        Ok(())
    }
}
