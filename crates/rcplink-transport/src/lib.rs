//! Pluggable bus adapters for a host↔RCP link.
//!
//! One [`Bus`] implementation exists per physical or logical bus. Adapters
//! fall into two capability families, queried at runtime by the owning loop:
//!
//! - [`PollableBus`]: descriptor-based buses ([`FdBus`]) that contribute to an
//!   external multiplexed wait loop and read when it reports readiness.
//! - [`EventDrivenBus`]: channel buses ([`ChannelBus`]) whose inbound data is
//!   produced by a separate execution context and drained by polling.
//!
//! Frame payloads are opaque byte sequences at this layer.

pub mod channel;
pub mod endpoint;
pub mod error;
pub mod poll;
pub mod traits;

#[cfg(unix)]
pub mod fd;

pub use channel::ChannelBus;
pub use endpoint::{Endpoint, MemEndpoint, RxBuffer, TryWriteError, WriteDoneHook};
pub use error::{Result, TransportError};
pub use poll::{FdSet, ReadySet};
pub use traits::{Bus, EventDrivenBus, Framing, InboundSink, PollableBus, MAX_SEND_WAIT};

#[cfg(unix)]
pub use fd::FdBus;
