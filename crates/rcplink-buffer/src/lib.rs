//! Bounded, priority-ordered queue of outbound byte frames.
//!
//! This is the producer side of an RCP link: the upper stack appends encoded
//! frames with [`FrameBuffer::add`], and a single consumer drains them with
//! the Begin/Read/Remove triplet. Higher-priority frames are always presented
//! to the consumer first; insertion order is preserved within a priority.
//!
//! The buffer performs no I/O and no locking. Producer and consumer are
//! expected to run on the same cooperative scheduler.

pub mod buffer;
pub mod error;
pub mod frame;

pub use buffer::{FrameAddedCallback, FrameBuffer};
pub use error::{BufferError, Result};
pub use frame::{Frame, FrameTag, Priority};
