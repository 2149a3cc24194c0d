//! Error types for the cache server.

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds produced by the protocol dispatcher, the backend contract, and
/// process startup.
///
/// Every variant maps to exactly one observable outcome: a wire reply, a
/// closed connection, or a process exit. See the dispatcher for the mapping.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed input on the wire (short line, bad argument count, ...).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A conditional op (`replace`, `delete`, `incr`/`decr`) targeted a
    /// missing key.
    #[error("not found")]
    NotFound,

    /// `add` targeted a key that already exists.
    #[error("already exists")]
    AlreadyExists,

    /// `incr`/`decr` targeted a value that isn't a parseable integer.
    #[error("value is not numeric")]
    NotNumeric,

    /// A mutating command arrived while the dispatcher is read-only
    /// (mid hot-swap).
    #[error("server is read-only")]
    ReadOnly,

    /// The backend reported a failure opening, reading, or writing data.
    #[error("storage error: {0}")]
    Storage(String),

    /// I/O failure on the client connection. The connection is closed.
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    /// Invalid configuration at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Unrecoverable startup failure (e.g. listener bind). The process exits.
    #[error("fatal error: {0}")]
    Fatal(String),
}

impl From<sled::Error> for Error {
    fn from(e: sled::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

impl From<rocksdb::Error> for Error {
    fn from(e: rocksdb::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_display() {
        let err = Error::Protocol("short line".to_string());
        assert_eq!(err.to_string(), "protocol error: short line");
    }

    #[test]
    fn io_error_converts_to_network() {
        let io_err = std::io::Error::new(std::io::ErrorKind::TimedOut, "boom");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Network(_)));
    }
}
