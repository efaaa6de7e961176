use rcplink_buffer::BufferError;
use rcplink_transport::TransportError;

/// Errors that can occur in link operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Outbound frame buffer error.
    #[error("buffer error: {0}")]
    Buffer(#[from] BufferError),

    /// Bus adapter error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Inbound stream desynchronized during reassembly.
    #[error("reassembly error: {0}")]
    Reassembly(#[from] crate::reassembly::ReassemblyError),
}

pub type Result<T> = std::result::Result<T, LinkError>;
