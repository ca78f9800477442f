//! In-memory connection for engine tests: canned rows keyed by SQL fragment
//! and bound parameters, with a log of executed statements and open cursors.

use std::cell::{Cell, RefCell};

use anyhow::{bail, Result};

use crate::connection::{Connection, Cursor, Row, VecCursor};
use crate::value::SqlValue;

struct Response {
    fragment: String,
    params: Option<Vec<SqlValue>>,
    rows: Vec<Vec<SqlValue>>,
}

#[derive(Default)]
pub(crate) struct ScriptedConnection {
    responses: Vec<Response>,
    failures: Vec<String>,
    executed: RefCell<Vec<(String, Vec<SqlValue>)>>,
    open: Cell<usize>,
}

impl ScriptedConnection {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Rows for any statement containing `fragment`.
    pub(crate) fn respond(mut self, fragment: &str, rows: Vec<Vec<SqlValue>>) -> Self {
        self.responses.push(Response {
            fragment: fragment.to_string(),
            params: None,
            rows,
        });
        self
    }

    /// Rows for statements containing `fragment` bound to exactly `params`.
    pub(crate) fn respond_to(mut self, fragment: &str, params: Vec<SqlValue>, rows: Vec<Vec<SqlValue>>) -> Self {
        self.responses.push(Response {
            fragment: fragment.to_string(),
            params: Some(params),
            rows,
        });
        self
    }

    pub(crate) fn fail_on(mut self, fragment: &str) -> Self {
        self.failures.push(fragment.to_string());
        self
    }

    pub(crate) fn executed(&self) -> Vec<(String, Vec<SqlValue>)> {
        self.executed.borrow().clone()
    }

    pub(crate) fn open_cursors(&self) -> usize {
        self.open.get()
    }
}

impl Connection for ScriptedConnection {
    fn query<'a>(&'a self, sql: &str, params: &[SqlValue]) -> Result<Box<dyn Cursor + 'a>> {
        self.executed.borrow_mut().push((sql.to_string(), params.to_vec()));
        if self.failures.iter().any(|f| sql.contains(f.as_str())) {
            bail!("scripted failure for `{sql}`");
        }
        let rows = self
            .responses
            .iter()
            .find(|r| sql.contains(r.fragment.as_str()) && r.params.as_deref().map_or(true, |p| p == params))
            .map(|r| r.rows.iter().cloned().map(Row::new).collect())
            .unwrap_or_default();

        self.open.set(self.open.get() + 1);
        Ok(Box::new(ScriptedCursor {
            inner: VecCursor::new(rows),
            open: &self.open,
            closed: false,
        }))
    }
}

struct ScriptedCursor<'a> {
    inner: VecCursor,
    open: &'a Cell<usize>,
    closed: bool,
}

impl Cursor for ScriptedCursor<'_> {
    fn advance(&mut self) -> Result<bool> {
        self.inner.advance()
    }

    fn row(&self) -> Option<&Row> {
        self.inner.row()
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.open.set(self.open.get() - 1);
        }
        self.inner.close()
    }
}
