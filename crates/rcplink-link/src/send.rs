//! Cooperative outbound drain.
//!
//! The send task is a deferred unit of work woken by the frame buffer's
//! frame-added notification. Posting is coalescing: any number of posts
//! before the task runs result in a single activation, and each activation
//! drains exactly one frame into the bus.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use tracing::{debug, warn};

use rcplink_buffer::{BufferError, FrameBuffer, FrameTag};
use rcplink_transport::{Bus, Framing, TransportError};

use crate::error::Result;
use crate::filter::{FilterDecision, FrameFilter};
use crate::reassembly::encode_frame;

/// What the drain path does with a per-frame send failure.
///
/// Draining is asynchronous relative to the original enqueue, so no waiter
/// exists to propagate to; the choice is between logging the drop and
/// reporting through a registered hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendFailurePolicy {
    /// Log at `warn` and continue.
    #[default]
    Drop,
    /// Forward the failed frame's tag and the error to the failure hook.
    Report,
}

/// Hook invoked under [`SendFailurePolicy::Report`].
pub type SendFailureHook = Box<dyn FnMut(FrameTag, &TransportError) + Send>;

/// Result of one drain activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DrainOutcome {
    /// No frame was pending.
    Idle,
    /// The frame was transmitted and removed.
    Sent(FrameTag),
    /// The filter withheld the frame; it was removed without transmission.
    Suppressed(FrameTag),
    /// The bus rejected the frame; it was removed and not requeued.
    SendFailed(FrameTag),
}

/// Coalescing activation flag for the drain task.
#[derive(Debug, Clone, Default)]
pub struct SendTask {
    pending: Arc<AtomicBool>,
}

impl SendTask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule one activation. Multiple posts before the task runs coalesce
    /// into a single run.
    pub fn post(&self) {
        self.pending.store(true, Ordering::SeqCst);
    }

    /// Consume the pending activation, if any.
    pub fn take_pending(&self) -> bool {
        self.pending.swap(false, Ordering::SeqCst)
    }

    /// Whether an activation is pending.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }
}

/// Drain exactly one frame from `buffer` into `bus`.
///
/// The frame is removed from the buffer regardless of the send outcome; the
/// drain path never retries. A payload that cannot be wire-framed for a
/// stream bus counts as a failed send (retrying cannot succeed, so the frame
/// is evicted). A read failure before the send leaves the buffer's selection
/// unadvanced and surfaces as `Err`.
pub(crate) fn drain_one(
    buffer: &mut FrameBuffer,
    bus: &mut dyn Bus,
    mut filter: Option<&mut (dyn FrameFilter + 'static)>,
    failure_policy: SendFailurePolicy,
    failure_hook: Option<&mut SendFailureHook>,
) -> Result<DrainOutcome> {
    match buffer.out_frame_begin() {
        Ok(()) => {}
        Err(BufferError::NotFound) => return Ok(DrainOutcome::Idle),
        Err(err) => return Err(err.into()),
    }

    let length = buffer.out_frame_get_length()?;
    let tag = buffer.out_frame_tag()?;

    let mut transfer = vec![0u8; length];
    let copied = buffer.out_frame_read(&mut transfer)?;
    transfer.truncate(copied);

    if let Some(filter) = filter.as_deref_mut() {
        if filter.inspect(&transfer) == FilterDecision::Suppress {
            buffer.out_frame_remove()?;
            debug!(tag = tag.value(), "outbound frame suppressed by filter");
            return Ok(DrainOutcome::Suppressed(tag));
        }
    }

    let send_result = match bus.framing() {
        Framing::Datagram => bus.send_frame(&transfer),
        Framing::Stream => {
            let mut wire = BytesMut::new();
            match encode_frame(&transfer, &mut wire) {
                Ok(()) => bus.send_frame(&wire),
                // Unframeable payloads never get smaller; evict instead of
                // poisoning the queue head.
                Err(err) => Err(TransportError::Failed(format!(
                    "payload does not fit stream framing: {err}"
                ))),
            }
        }
    };

    // The frame leaves the buffer exactly once, success or not.
    buffer.out_frame_remove()?;

    match send_result {
        Ok(()) => {
            debug!(tag = tag.value(), len = copied, "frame sent");
            Ok(DrainOutcome::Sent(tag))
        }
        Err(err) => {
            match failure_policy {
                SendFailurePolicy::Drop => {
                    warn!(tag = tag.value(), %err, "dropping frame after send failure");
                }
                SendFailurePolicy::Report => {
                    if let Some(hook) = failure_hook {
                        hook(tag, &err);
                    } else {
                        warn!(tag = tag.value(), %err, "send failure with no report hook");
                    }
                }
            }
            Ok(DrainOutcome::SendFailed(tag))
        }
    }
}
