//! Conversions from the store driver's error type into the shared taxonomy.

pub use query_ast::{Error, ErrorKind};

pub type CoreResult<T> = std::result::Result<T, Error>;

pub fn store_err(err: rusqlite::Error, sql: &str) -> Error {
    Error::store(err.to_string(), sql)
}
