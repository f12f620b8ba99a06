//! Synchronous YDB client.

mod conn;

pub use conn::Conn;
