use std::time::Duration;

/// Errors that can occur in bus adapter operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Transmit buffering failed structurally (the bus has no buffer to
    /// accept the frame, independent of timing).
    #[error("no transmit buffers available")]
    NoBufs,

    /// The bus did not become writable within the maximum wait interval, or
    /// an I/O-level write failure occurred.
    #[error("bus write failed: {0}")]
    Failed(String),

    /// No inbound data arrived within the caller-specified timeout.
    #[error("no frame received within {waited:?}")]
    ResponseTimeout { waited: Duration },

    /// `init` was called while the bus is already active.
    #[error("bus already initialized")]
    Already,

    /// The identified device or endpoint cannot be resolved or opened.
    #[error("invalid bus target: {0}")]
    InvalidArgs(String),

    /// An I/O error occurred on the underlying descriptor.
    #[error("bus I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
