use thiserror::Error;

/// How a request to the elevation server failed. The variant decides between retrying and giving up on the server.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection refused or timed out. Retried, but counts toward the attempt limit.
    #[error("transient connection failure: {0}")]
    Transient(String),
    /// Unknown host or no route. Retrying cannot help.
    #[error("elevation server unreachable: {0}")]
    Unreachable(String),
    /// The server answered with an HTTP error status.
    #[error("elevation server replied with status {0}")]
    Status(u16),
    /// Any other I/O failure.
    #[error("elevation server I/O error: {0}")]
    Io(String),
}

impl TransportError {
    /// Whether this failure counts toward the attempt limit that disables the server.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// A reply that doesn't match the request it answers.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ProtocolError {
    #[error("unknown elevation model type {0:#x}")]
    UnknownModelType(i32),
    #[error("reply has {actual} bytes, expected {expected}")]
    ShortReply { expected: usize, actual: usize },
    #[error("bad opcode in reply: sent {sent:#x}, got {received:#x}")]
    OpcodeMismatch { sent: i32, received: i32 },
    #[error("error in query sequence: sent {sent}, got {received}")]
    SequenceMismatch { sent: i32, received: i32 },
    #[error("different size query and reply: sent {sent}, got {received}")]
    CountMismatch { sent: i32, received: i32 },
}

/// A failure of the local elevation cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[cfg(feature = "sled")]
    #[error("cache database error: {0}")]
    Sled(#[from] sled::Error),
    #[cfg(feature = "bincode")]
    #[error("cache serialization error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("corrupt cache record under key {0:?}")]
    Corrupt(Vec<u8>),
}

/// Anything that can go wrong while opening an `ElevationSource`.
#[derive(Debug, Error)]
pub enum ElevationError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("failed to spawn elevation worker: {0}")]
    Spawn(#[from] std::io::Error),
}
