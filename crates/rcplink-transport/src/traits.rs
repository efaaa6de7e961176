use std::time::Duration;

use crate::endpoint::RxBuffer;
use crate::error::Result;
use crate::poll::{FdSet, ReadySet};

/// Maximum time a `send_frame` waits for the bus to become writable.
pub const MAX_SEND_WAIT: Duration = Duration::from_millis(2000);

/// How a bus delimits frames on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// The bus preserves message boundaries; payload bytes travel unchanged.
    Datagram,
    /// The bus is a byte stream; the link layer must add its own framing.
    Stream,
}

/// A bus adapter carrying frames between the host and one RCP.
///
/// One implementation exists per physical or logical bus. Exactly one live
/// instance is bound to an RCP link at a time; its lifecycle (`init`/`deinit`)
/// is independent of any single frame's lifetime.
///
/// Delivery capabilities are split into [`PollableBus`] (descriptor-based
/// buses participating in an external multiplexed wait loop) and
/// [`EventDrivenBus`] (channel buses whose data arrives from a separate
/// execution context). An adapter provides one of the two; the owning loop
/// queries which via [`pollable`](Self::pollable) /
/// [`event_driven`](Self::event_driven).
pub trait Bus {
    /// Open and configure the underlying channel identified by `bus_id`.
    ///
    /// Returns [`Already`](crate::TransportError::Already) if the bus is
    /// active, [`InvalidArgs`](crate::TransportError::InvalidArgs) if the
    /// device or endpoint cannot be resolved or opened.
    fn init(&mut self, bus_id: u8) -> Result<()>;

    /// Close the channel. Always safe to call, including when inactive.
    fn deinit(&mut self);

    /// Whether the bus is currently initialized.
    fn is_active(&self) -> bool;

    /// Write one frame, blocking up to [`MAX_SEND_WAIT`] for the bus to
    /// become writable.
    ///
    /// Returns [`NoBufs`](crate::TransportError::NoBufs) if buffering fails
    /// structurally, [`Failed`](crate::TransportError::Failed) if the bus
    /// never became writable within the bound.
    fn send_frame(&mut self, frame: &[u8]) -> Result<()>;

    /// Block up to `timeout` for inbound data to become available.
    ///
    /// Returns [`ResponseTimeout`](crate::TransportError::ResponseTimeout)
    /// if nothing arrived in time. The wait is not retried internally.
    fn wait_for_frame(&mut self, timeout: Duration) -> Result<()>;

    /// Bus speed in bits per second, or 0 when the concept does not apply.
    fn bus_speed(&self) -> u32 {
        0
    }

    /// Discard internal buffering and sequence state after an RCP restart.
    ///
    /// Any held inbound buffer is released through its normal release path
    /// before being discarded.
    fn on_rcp_reset(&mut self);

    /// Frame delimiting performed by this bus.
    fn framing(&self) -> Framing {
        Framing::Datagram
    }

    /// Descriptor-polling capability, if this adapter has one.
    fn pollable(&mut self) -> Option<&mut dyn PollableBus> {
        None
    }

    /// Event-driven delivery capability, if this adapter has one.
    fn event_driven(&mut self) -> Option<&mut dyn EventDrivenBus> {
        None
    }
}

/// Consumer of raw inbound bytes, fed by a pollable bus.
pub trait InboundSink {
    /// Deliver one chunk of raw bytes. Chunks need not align with frame
    /// boundaries.
    fn push_chunk(&mut self, chunk: &[u8]);
}

/// Capability: descriptor-based bus driven by an external multiplexed wait
/// loop (`poll`/`select` style).
pub trait PollableBus {
    /// Contribute this bus's descriptors and timeout to the wait set.
    fn update_fd_set(&self, set: &mut FdSet);

    /// Perform pending I/O after the external wait returned, pushing any
    /// bytes read into `sink`.
    fn process(&mut self, ready: &ReadySet, sink: &mut dyn InboundSink) -> Result<()>;
}

/// Capability: bus whose inbound data is produced by a separate execution
/// context (interrupt handler or co-processor task) and drained by polling.
pub trait EventDrivenBus {
    /// Take the next complete inbound frame, if one is pending.
    ///
    /// Non-blocking; `Ok(None)` means no data (not an error). The returned
    /// buffer is owned by the caller and released when consumed or dropped.
    fn poll_inbound(&mut self) -> Result<Option<RxBuffer>>;
}
