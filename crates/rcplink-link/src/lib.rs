//! Cooperative send/receive link layer between a host stack and a radio
//! co-processor (RCP).
//!
//! Frames are opaque byte sequences at this layer. Outbound frames are
//! queued in a bounded priority buffer and drained one per activation by a
//! coalescing send task; inbound bytes are reassembled into complete frames
//! and delivered through a registered callback. [`RcpLink`] ties both paths
//! to one [`Bus`](rcplink_transport::Bus) adapter and coordinates recovery
//! when the RCP restarts.
//!
//! The [`source_match`] module is an independent collaborator: software
//! address-filtering tables for RCPs without hardware support.

pub mod error;
pub mod filter;
pub mod link;
pub mod reassembly;
pub mod reset;
pub mod send;
pub mod source_match;

pub use error::{LinkError, Result};
pub use filter::{FilterDecision, FrameFilter, SignatureFilter, RESET_NOTIFICATION_SIGNATURE};
pub use link::RcpLink;
pub use reassembly::{ReassemblyError, Reassembler, ReceiveCallback};
pub use reset::{ResetEpoch, ResetPolicy};
pub use send::{SendFailureHook, SendFailurePolicy, SendTask};
pub use source_match::{ExtAddress, SourceMatchError, SourceMatchTable};
