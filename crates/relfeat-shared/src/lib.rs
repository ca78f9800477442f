//! Configuration and observability bootstrap shared by relfeat components

pub mod config;
pub mod observability;

pub use self::config::*;
pub use observability::*;
