/// Errors that can occur on the outbound frame buffer.
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    /// Remaining capacity is insufficient for the frame being appended.
    #[error("insufficient buffer space ({needed} bytes needed, {available} available)")]
    NoBufs { needed: usize, available: usize },

    /// No frame matches the request: the buffer is empty, or no frame is
    /// currently selected for draining.
    #[error("no frame available")]
    NotFound,
}

pub type Result<T> = std::result::Result<T, BufferError>;
