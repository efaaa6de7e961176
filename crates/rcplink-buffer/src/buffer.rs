use std::collections::VecDeque;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::{BufferError, Result};
use crate::frame::{Frame, FrameTag, Priority};

/// Notification invoked synchronously after a frame is appended.
///
/// Registered per buffer instance; registering a new callback replaces the
/// previous one. The callback must not call back into the buffer.
pub type FrameAddedCallback = Box<dyn FnMut(FrameTag, Priority) + Send>;

/// Default byte capacity, sized for a handful of maximum-length frames.
pub const DEFAULT_CAPACITY: usize = 8 * 1024;

/// Bounded, priority-ordered queue of outbound frames.
///
/// Single-producer-append, single-consumer-drain. The consumer dequeues with
/// the triplet [`out_frame_begin`](Self::out_frame_begin) /
/// [`out_frame_read`](Self::out_frame_read) /
/// [`out_frame_remove`](Self::out_frame_remove): `begin` selects the next
/// eligible frame, repeated `read` calls copy out its bytes, and `remove`
/// commits its removal. Exactly one frame is selected at a time.
pub struct FrameBuffer {
    high: VecDeque<Frame>,
    low: VecDeque<Frame>,
    capacity: usize,
    used: usize,
    current: Option<Selection>,
    next_tag: u64,
    frame_added: Option<FrameAddedCallback>,
}

#[derive(Debug, Clone, Copy)]
struct Selection {
    lane: Priority,
    offset: usize,
}

impl FrameBuffer {
    /// Create a buffer with the default byte capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a buffer bounded to `capacity` total payload bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            high: VecDeque::new(),
            low: VecDeque::new(),
            capacity,
            used: 0,
            current: None,
            next_tag: 0,
            frame_added: None,
        }
    }

    /// Register the frame-added notification, replacing any previous one.
    pub fn set_frame_added_callback(&mut self, callback: FrameAddedCallback) {
        self.frame_added = Some(callback);
    }

    /// Append a frame.
    ///
    /// Fails with [`BufferError::NoBufs`] if the payload does not fit in the
    /// remaining capacity; existing contents are left unchanged. On success
    /// the frame-added callback (if registered) runs synchronously before
    /// this method returns, so the producer's append and the consumer's
    /// wake-up are ordered deterministically.
    pub fn add(&mut self, payload: impl Into<Bytes>, priority: Priority) -> Result<FrameTag> {
        let payload = payload.into();
        let needed = payload.len();
        let available = self.capacity - self.used;
        if needed > available {
            warn!(needed, available, "frame buffer full, rejecting frame");
            return Err(BufferError::NoBufs { needed, available });
        }

        let tag = FrameTag(self.next_tag);
        self.next_tag += 1;
        self.used += needed;

        let frame = Frame {
            tag,
            priority,
            payload,
        };
        match priority {
            Priority::High => self.high.push_back(frame),
            Priority::Low => self.low.push_back(frame),
        }
        debug!(tag = tag.value(), ?priority, len = needed, "frame added");

        if let Some(callback) = self.frame_added.as_mut() {
            callback(tag, priority);
        }
        Ok(tag)
    }

    /// Select the next frame to drain: the oldest high-priority frame, or the
    /// oldest low-priority frame if no high-priority frame is pending.
    ///
    /// Fails with [`BufferError::NotFound`] if the buffer is empty. Calling
    /// again without an intervening `out_frame_remove` re-selects the same
    /// frame and rewinds its read offset.
    pub fn out_frame_begin(&mut self) -> Result<()> {
        let lane = match self.current {
            Some(selection) => selection.lane,
            None if !self.high.is_empty() => Priority::High,
            None if !self.low.is_empty() => Priority::Low,
            None => return Err(BufferError::NotFound),
        };
        self.current = Some(Selection { lane, offset: 0 });
        Ok(())
    }

    /// Length in bytes of the currently selected frame.
    pub fn out_frame_get_length(&self) -> Result<usize> {
        Ok(self.current_frame()?.payload.len())
    }

    /// Tag of the currently selected frame.
    pub fn out_frame_tag(&self) -> Result<FrameTag> {
        Ok(self.current_frame()?.tag)
    }

    /// Copy bytes from the currently selected frame into `dest`, starting
    /// where the previous read left off. Returns the number of bytes copied
    /// (zero once the frame is exhausted).
    pub fn out_frame_read(&mut self, dest: &mut [u8]) -> Result<usize> {
        let selection = self.current.ok_or(BufferError::NotFound)?;
        let frame = self.front(selection.lane).ok_or(BufferError::NotFound)?;

        let remaining = frame.payload.len().saturating_sub(selection.offset);
        let n = remaining.min(dest.len());
        dest[..n].copy_from_slice(&frame.payload[selection.offset..selection.offset + n]);

        self.current = Some(Selection {
            lane: selection.lane,
            offset: selection.offset + n,
        });
        Ok(n)
    }

    /// Commit removal of the currently selected frame, freeing its capacity.
    ///
    /// Fails with [`BufferError::NotFound`] if no frame is selected; a caller
    /// must pair every `remove` with a preceding `begin`. Returns the removed
    /// frame's tag. A subsequent `out_frame_begin` selects the next eligible
    /// frame, never the removed one again.
    pub fn out_frame_remove(&mut self) -> Result<FrameTag> {
        let selection = self.current.take().ok_or(BufferError::NotFound)?;
        let frame = match selection.lane {
            Priority::High => self.high.pop_front(),
            Priority::Low => self.low.pop_front(),
        }
        .ok_or(BufferError::NotFound)?;

        self.used -= frame.payload.len();
        debug!(tag = frame.tag.value(), "frame removed");
        Ok(frame.tag)
    }

    /// Discard the current selection without removing the frame.
    ///
    /// Used on RCP reset so a fresh `out_frame_begin` starts cleanly.
    pub fn clear_selection(&mut self) {
        self.current = None;
    }

    /// Discard all pending frames and the current selection.
    pub fn clear(&mut self) {
        let dropped = self.high.len() + self.low.len();
        if dropped > 0 {
            debug!(dropped, "discarding pending frames");
        }
        self.high.clear();
        self.low.clear();
        self.used = 0;
        self.current = None;
    }

    /// Number of pending frames.
    pub fn len(&self) -> usize {
        self.high.len() + self.low.len()
    }

    /// Whether no frames are pending.
    pub fn is_empty(&self) -> bool {
        self.high.is_empty() && self.low.is_empty()
    }

    /// Total byte capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remaining byte capacity.
    pub fn free_bytes(&self) -> usize {
        self.capacity - self.used
    }

    fn front(&self, lane: Priority) -> Option<&Frame> {
        match lane {
            Priority::High => self.high.front(),
            Priority::Low => self.low.front(),
        }
    }

    fn current_frame(&self) -> Result<&Frame> {
        let selection = self.current.ok_or(BufferError::NotFound)?;
        self.front(selection.lane).ok_or(BufferError::NotFound)
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("pending", &self.len())
            .field("used", &self.used)
            .field("capacity", &self.capacity)
            .field("selected", &self.current.is_some())
            .finish()
    }
}
