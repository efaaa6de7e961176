//! Host-side framing and transport layer for radio co-processors.
//!
//! rcplink carries opaque frames between a host mesh-network stack and a
//! radio co-processor (RCP) over a pluggable bus: bounded priority buffering,
//! cooperative one-frame-per-activation draining, inbound reassembly, and
//! restart recovery.
//!
//! # Crate Structure
//!
//! - [`buffer`] — Bounded priority queue of outbound frames
//! - [`transport`] — Bus adapters (descriptor streams, co-processor channels)
//! - [`link`] — The link layer tying buffer, drain task, and reassembly to a bus

/// Re-export frame buffer types.
pub mod buffer {
    pub use rcplink_buffer::*;
}

/// Re-export bus adapter types.
pub mod transport {
    pub use rcplink_transport::*;
}

/// Re-export link layer types.
pub mod link {
    pub use rcplink_link::*;
}
