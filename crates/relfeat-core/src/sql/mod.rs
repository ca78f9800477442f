mod helpers;
mod query;

pub use query::SelectQuery;

pub(crate) use helpers::{qualify, validate_ident};
