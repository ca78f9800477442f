//! MySQL connection provider for relfeat

pub mod connection;
pub mod decode;

pub use connection::*;
pub use decode::decode_value;
