use bytes::Bytes;

/// Drain priority of an outbound frame.
///
/// `High` frames are presented to the consumer before `Low` frames regardless
/// of arrival order. Within one priority, FIFO order is preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Low,
    High,
}

/// Opaque correlation tag assigned to a frame when it is appended.
///
/// Tags are unique per buffer instance for the life of the process and can be
/// used to correlate a frame with later events (send failure reporting).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameTag(pub(crate) u64);

impl FrameTag {
    /// The raw tag value.
    pub fn value(self) -> u64 {
        self.0
    }
}

/// An outbound frame: immutable payload bytes plus drain metadata.
#[derive(Debug, Clone)]
pub struct Frame {
    pub tag: FrameTag,
    pub priority: Priority,
    pub payload: Bytes,
}

impl Frame {
    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
