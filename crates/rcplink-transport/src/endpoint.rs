//! Channel-style co-processor endpoint contract.
//!
//! A channel bus does not own a file descriptor; it owns a logical endpoint
//! inside the co-processor's communication layer. Writes transfer buffer
//! ownership to the endpoint by move and get it back through the
//! write-completion hook registered at open time. Reads are non-blocking and
//! return single-owner [`RxBuffer`] handles whose drop is the release.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::{Result, TransportError};

/// Write-completion notification. Invoked once per completed write with the
/// original transfer buffer, whose ownership returns to the caller side for
/// release.
pub type WriteDoneHook = Box<dyn FnMut(Vec<u8>) + Send>;

/// Why a non-blocking write did not accept the buffer.
#[derive(Debug)]
pub enum TryWriteError {
    /// The endpoint's transmit queue is full; the buffer is handed back so
    /// the caller can retry within its own wait bound.
    Busy(Vec<u8>),
    /// Buffering failed structurally (frame cannot fit any transmit buffer).
    NoBufs,
    /// The endpoint is not open.
    Closed,
}

/// A logical endpoint within a co-processor communication channel.
pub trait Endpoint {
    /// Open the endpoint identified by `channel_id` and register the
    /// write-completion notification.
    fn open(&mut self, channel_id: u8, write_done: Option<WriteDoneHook>) -> Result<()>;

    /// Close the endpoint. Safe to call when not open.
    fn close(&mut self);

    /// Whether the endpoint is open.
    fn is_open(&self) -> bool;

    /// Attempt a non-blocking write, transferring buffer ownership to the
    /// endpoint on success.
    fn try_write(&mut self, frame: Vec<u8>) -> std::result::Result<(), TryWriteError>;

    /// Take the next pending inbound buffer, if any. Non-blocking; `None`
    /// means no data.
    fn try_read(&mut self) -> Option<RxBuffer>;

    /// Discard endpoint-internal buffering after an RCP restart.
    fn reset(&mut self);
}

/// Single-owner handle to an inbound buffer.
///
/// The backing storage belongs to the endpoint's receive pool; dropping the
/// handle (or calling [`release`](Self::release)) returns it. The handle must
/// not outlive the receive callback it is consumed in.
#[derive(Debug)]
pub struct RxBuffer {
    data: Vec<u8>,
    outstanding: Option<Arc<AtomicUsize>>,
}

impl RxBuffer {
    /// Wrap raw inbound bytes without pool accounting.
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            outstanding: None,
        }
    }

    fn with_accounting(data: Vec<u8>, outstanding: Arc<AtomicUsize>) -> Self {
        outstanding.fetch_add(1, Ordering::SeqCst);
        Self {
            data,
            outstanding: Some(outstanding),
        }
    }

    /// The received bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Explicitly return the buffer to its pool.
    pub fn release(self) {}
}

impl std::ops::Deref for RxBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for RxBuffer {
    fn drop(&mut self) {
        if let Some(outstanding) = &self.outstanding {
            outstanding.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Default bound on queued-but-unread frames per endpoint half.
pub const DEFAULT_INBOX_LIMIT: usize = 8;
/// Default maximum frame size an endpoint transmit buffer can hold.
pub const DEFAULT_MAX_PAYLOAD: usize = 2048;

#[derive(Debug, Default)]
struct Inbox {
    frames: Mutex<VecDeque<Vec<u8>>>,
}

/// In-memory endpoint pair for tests and tooling.
///
/// The two halves are linked: what one writes, the other reads. Writes
/// complete synchronously; the completion hook receives the transfer buffer
/// back immediately after the frame is queued to the peer.
pub struct MemEndpoint {
    rx: Arc<Inbox>,
    tx: Arc<Inbox>,
    inbox_limit: usize,
    max_payload: usize,
    outstanding: Arc<AtomicUsize>,
    channel_id: Option<u8>,
    write_done: Option<WriteDoneHook>,
}

impl MemEndpoint {
    /// Create a linked pair of endpoints.
    pub fn pair() -> (Self, Self) {
        let a = Arc::new(Inbox::default());
        let b = Arc::new(Inbox::default());
        (Self::half(Arc::clone(&a), b.clone()), Self::half(b, a))
    }

    fn half(rx: Arc<Inbox>, tx: Arc<Inbox>) -> Self {
        Self {
            rx,
            tx,
            inbox_limit: DEFAULT_INBOX_LIMIT,
            max_payload: DEFAULT_MAX_PAYLOAD,
            outstanding: Arc::new(AtomicUsize::new(0)),
            channel_id: None,
            write_done: None,
        }
    }

    /// Override the peer-inbox bound (writes report `Busy` beyond it).
    pub fn with_inbox_limit(mut self, limit: usize) -> Self {
        self.inbox_limit = limit;
        self
    }

    /// Override the maximum frame size (larger writes report `NoBufs`).
    pub fn with_max_payload(mut self, max: usize) -> Self {
        self.max_payload = max;
        self
    }

    /// Inbound buffers handed out by this half and not yet released.
    pub fn outstanding_rx_buffers(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Frames queued to this half and not yet read.
    pub fn pending_frames(&self) -> usize {
        self.rx.frames.lock().expect("inbox poisoned").len()
    }
}

impl Endpoint for MemEndpoint {
    fn open(&mut self, channel_id: u8, write_done: Option<WriteDoneHook>) -> Result<()> {
        if self.channel_id.is_some() {
            return Err(TransportError::Already);
        }
        self.channel_id = Some(channel_id);
        self.write_done = write_done;
        debug!(channel_id, "endpoint opened");
        Ok(())
    }

    fn close(&mut self) {
        if self.channel_id.take().is_some() {
            debug!("endpoint closed");
        }
        self.write_done = None;
    }

    fn is_open(&self) -> bool {
        self.channel_id.is_some()
    }

    fn try_write(&mut self, frame: Vec<u8>) -> std::result::Result<(), TryWriteError> {
        if self.channel_id.is_none() {
            return Err(TryWriteError::Closed);
        }
        if frame.len() > self.max_payload {
            return Err(TryWriteError::NoBufs);
        }

        {
            let mut peer = self.tx.frames.lock().expect("inbox poisoned");
            if peer.len() >= self.inbox_limit {
                return Err(TryWriteError::Busy(frame));
            }
            peer.push_back(frame.clone());
        }

        // Transfer complete: the buffer comes back through the completion
        // hook for release.
        match self.write_done.as_mut() {
            Some(hook) => hook(frame),
            None => drop(frame),
        }
        Ok(())
    }

    fn try_read(&mut self) -> Option<RxBuffer> {
        let frame = self.rx.frames.lock().expect("inbox poisoned").pop_front()?;
        Some(RxBuffer::with_accounting(
            frame,
            Arc::clone(&self.outstanding),
        ))
    }

    fn reset(&mut self) {
        let dropped = {
            let mut inbox = self.rx.frames.lock().expect("inbox poisoned");
            let n = inbox.len();
            inbox.clear();
            n
        };
        if dropped > 0 {
            debug!(dropped, "endpoint reset, discarded queued inbound frames");
        }
    }
}

impl std::fmt::Debug for MemEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemEndpoint")
            .field("channel_id", &self.channel_id)
            .field("pending", &self.pending_frames())
            .finish()
    }
}
