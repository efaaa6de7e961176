//! Injectable outbound frame filtering.
//!
//! The drain path never interprets payload bytes itself. When a deployment
//! needs certain payloads withheld from the bus (the classic case is an
//! internally generated reset notification that the RCP must not see echoed
//! back), the caller supplies a filter; without one, everything is forwarded.

/// Decision returned by a frame filter for one outbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    /// Pass the frame to the bus unchanged.
    Forward,
    /// Drop the frame without transmitting it. The frame is still removed
    /// from the outbound buffer.
    Suppress,
}

/// Inspects outbound frames before they reach the bus.
pub trait FrameFilter: Send {
    fn inspect(&mut self, payload: &[u8]) -> FilterDecision;
}

impl<F> FrameFilter for F
where
    F: FnMut(&[u8]) -> FilterDecision + Send,
{
    fn inspect(&mut self, payload: &[u8]) -> FilterDecision {
        self(payload)
    }
}

/// Byte signature of the internal reset-notification payload that
/// deployments conventionally suppress from transmission.
pub const RESET_NOTIFICATION_SIGNATURE: [u8; 4] = [0x80, 0x06, 0x00, 0x72];

/// Suppresses frames whose payload begins with a configured byte signature.
#[derive(Debug, Clone)]
pub struct SignatureFilter {
    signature: Vec<u8>,
}

impl SignatureFilter {
    pub fn new(signature: impl Into<Vec<u8>>) -> Self {
        Self {
            signature: signature.into(),
        }
    }

    /// Filter matching [`RESET_NOTIFICATION_SIGNATURE`].
    pub fn reset_notification() -> Self {
        Self::new(RESET_NOTIFICATION_SIGNATURE)
    }
}

impl FrameFilter for SignatureFilter {
    fn inspect(&mut self, payload: &[u8]) -> FilterDecision {
        if payload.starts_with(&self.signature) {
            FilterDecision::Suppress
        } else {
            FilterDecision::Forward
        }
    }
}
