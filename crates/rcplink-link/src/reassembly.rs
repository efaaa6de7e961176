//! Stream framing codec and inbound frame reassembly.
//!
//! Stream buses carry raw bytes with no message boundaries, so outbound
//! payloads are wrapped in a light delimited format and inbound chunks are
//! accumulated until a boundary is reached:
//!
//! ```text
//! ┌────────────┬────────────┬──────────────────┬───────────┐
//! │ Start (2B) │ Length     │ Payload          │ End (1B)  │
//! │ 0x52 0x4C  │ (2B LE)    │ (Length bytes)   │ 0x7E      │
//! └────────────┴────────────┴──────────────────┴───────────┘
//! ```
//!
//! Datagram buses preserve boundaries themselves; their frames bypass the
//! codec via [`Reassembler::push_frame`].

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::{trace, warn};

use rcplink_transport::InboundSink;

/// Start marker: "RL".
pub const START: [u8; 2] = [0x52, 0x4C];
/// End marker closing every frame.
pub const FRAME_END: u8 = 0x7E;
/// Start marker plus length field.
pub const HEADER_SIZE: usize = 4;
/// Default maximum payload accepted from the wire.
pub const DEFAULT_MAX_PAYLOAD: usize = 2048;

/// Errors that desynchronize the inbound stream.
#[derive(Debug, thiserror::Error)]
pub enum ReassemblyError {
    /// Accumulated bytes do not begin with the start marker.
    #[error("invalid start marker")]
    BadStartMarker,

    /// The byte after the payload is not the end marker.
    #[error("invalid end marker")]
    BadEndMarker,

    /// The declared payload length exceeds the configured maximum.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

/// Wrap a payload in the stream wire format.
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<(), ReassemblyError> {
    if payload.len() > u16::MAX as usize {
        return Err(ReassemblyError::PayloadTooLarge {
            size: payload.len(),
            max: u16::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len() + 1);
    dst.put_slice(&START);
    dst.put_u16_le(payload.len() as u16);
    dst.put_slice(payload);
    dst.put_u8(FRAME_END);
    Ok(())
}

/// Decode one frame from the accumulator.
///
/// Returns `Ok(None)` until a complete frame (header, payload, and end
/// marker) is buffered. On success, consumes the frame's bytes and returns
/// the payload.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Bytes>, ReassemblyError> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }
    if src[0..2] != START {
        return Err(ReassemblyError::BadStartMarker);
    }

    let payload_len = u16::from_le_bytes([src[2], src[3]]) as usize;
    if payload_len > max_payload {
        return Err(ReassemblyError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + payload_len + 1;
    if src.len() < total {
        return Ok(None);
    }
    if src[HEADER_SIZE + payload_len] != FRAME_END {
        return Err(ReassemblyError::BadEndMarker);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();
    src.advance(1);
    Ok(Some(payload))
}

/// Callback invoked synchronously, exactly once per complete inbound frame.
///
/// The payload slice is only valid for the duration of the call; the backing
/// storage is reclaimed immediately afterwards.
pub type ReceiveCallback = Box<dyn FnMut(&[u8]) + Send>;

/// Reconstructs complete inbound frames from raw chunks.
///
/// Chunks need not align with frame boundaries: the reassembler idles until
/// bytes arrive, accumulates until a boundary, fires the receive callback,
/// and returns to idle. Partial arrivals never trigger the callback.
pub struct Reassembler {
    buf: BytesMut,
    max_payload: usize,
    callback: Option<ReceiveCallback>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }

    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_payload,
            callback: None,
        }
    }

    /// Register the per-frame receive callback, replacing any previous one.
    pub fn set_receive_callback(&mut self, callback: ReceiveCallback) {
        self.callback = Some(callback);
    }

    /// Whether a partial frame is currently accumulated.
    pub fn is_accumulating(&self) -> bool {
        !self.buf.is_empty()
    }

    /// Feed raw stream bytes. Returns the number of complete frames
    /// delivered to the callback.
    ///
    /// On a desync error the partial accumulation is discarded and the
    /// reassembler returns to idle; the error is reported to the caller and
    /// the callback is not invoked for the corrupt data.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<usize, ReassemblyError> {
        self.buf.extend_from_slice(chunk);

        let mut completed = 0usize;
        loop {
            match decode_frame(&mut self.buf, self.max_payload) {
                Ok(Some(payload)) => {
                    trace!(len = payload.len(), "inbound frame reassembled");
                    self.deliver(&payload);
                    completed += 1;
                    // `payload` drops here: storage reclaimed right after
                    // the callback returns.
                }
                Ok(None) => return Ok(completed),
                Err(err) => {
                    warn!(%err, discarded = self.buf.len(), "inbound stream desync");
                    self.buf.clear();
                    return Err(err);
                }
            }
        }
    }

    /// Deliver one already-delimited frame (datagram bus path).
    pub fn push_frame(&mut self, payload: &[u8]) {
        trace!(len = payload.len(), "inbound datagram frame");
        self.deliver(payload);
    }

    /// Discard any partially accumulated frame.
    pub fn reset(&mut self) {
        if !self.buf.is_empty() {
            warn!(discarded = self.buf.len(), "discarding partial inbound frame");
        }
        self.buf.clear();
    }

    fn deliver(&mut self, payload: &[u8]) {
        if let Some(callback) = self.callback.as_mut() {
            callback(payload);
        }
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl InboundSink for Reassembler {
    fn push_chunk(&mut self, chunk: &[u8]) {
        // The external wait loop has nowhere to propagate a desync; the
        // accumulator has already been resynced, so log and move on.
        if let Err(err) = self.feed(chunk) {
            warn!(%err, "dropped desynchronized inbound bytes");
        }
    }
}

impl std::fmt::Debug for Reassembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reassembler")
            .field("accumulated", &self.buf.len())
            .field("max_payload", &self.max_payload)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn collecting_reassembler() -> (Reassembler, Arc<Mutex<Vec<Vec<u8>>>>) {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&frames);
        let mut reassembler = Reassembler::new();
        reassembler.set_receive_callback(Box::new(move |payload| {
            sink.lock().unwrap().push(payload.to_vec());
        }));
        (reassembler, frames)
    }

    fn wire(payload: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_frame(payload, &mut buf).unwrap();
        buf.to_vec()
    }

    #[test]
    fn whole_frame_in_one_chunk() {
        let (mut reassembler, frames) = collecting_reassembler();
        let completed = reassembler.feed(&wire(b"hello")).unwrap();

        assert_eq!(completed, 1);
        assert_eq!(frames.lock().unwrap().as_slice(), &[b"hello".to_vec()]);
        assert!(!reassembler.is_accumulating());
    }

    #[test]
    fn header_then_payload_with_terminator_fires_once() {
        let (mut reassembler, frames) = collecting_reassembler();
        let bytes = wire(b"split-payload");

        // Header-only chunk: no callback.
        assert_eq!(reassembler.feed(&bytes[..HEADER_SIZE]).unwrap(), 0);
        assert!(frames.lock().unwrap().is_empty());
        assert!(reassembler.is_accumulating());

        // Payload plus terminator completes exactly one frame.
        assert_eq!(reassembler.feed(&bytes[HEADER_SIZE..]).unwrap(), 1);
        assert_eq!(
            frames.lock().unwrap().as_slice(),
            &[b"split-payload".to_vec()]
        );
    }

    #[test]
    fn header_only_never_fires() {
        let (mut reassembler, frames) = collecting_reassembler();
        let bytes = wire(b"never-finished");

        reassembler.feed(&bytes[..HEADER_SIZE]).unwrap();
        assert!(frames.lock().unwrap().is_empty());
    }

    #[test]
    fn multiple_frames_in_one_chunk() {
        let (mut reassembler, frames) = collecting_reassembler();
        let mut bytes = wire(b"one");
        bytes.extend_from_slice(&wire(b"two"));

        assert_eq!(reassembler.feed(&bytes).unwrap(), 2);
        assert_eq!(
            frames.lock().unwrap().as_slice(),
            &[b"one".to_vec(), b"two".to_vec()]
        );
    }

    #[test]
    fn byte_by_byte_delivery() {
        let (mut reassembler, frames) = collecting_reassembler();
        for byte in wire(b"slow") {
            reassembler.feed(&[byte]).unwrap();
        }
        assert_eq!(frames.lock().unwrap().as_slice(), &[b"slow".to_vec()]);
    }

    #[test]
    fn empty_payload_roundtrips() {
        let (mut reassembler, frames) = collecting_reassembler();
        assert_eq!(reassembler.feed(&wire(b"")).unwrap(), 1);
        assert_eq!(frames.lock().unwrap().as_slice(), &[Vec::<u8>::new()]);
    }

    #[test]
    fn bad_start_marker_desyncs_without_callback() {
        let (mut reassembler, frames) = collecting_reassembler();
        let err = reassembler.feed(&[0xFF, 0xFF, 0x00, 0x00, 0x7E]).unwrap_err();

        assert!(matches!(err, ReassemblyError::BadStartMarker));
        assert!(frames.lock().unwrap().is_empty());
        assert!(!reassembler.is_accumulating());
    }

    #[test]
    fn bad_end_marker_desyncs() {
        let (mut reassembler, frames) = collecting_reassembler();
        let mut bytes = wire(b"ok");
        *bytes.last_mut().unwrap() = 0x00;

        let err = reassembler.feed(&bytes).unwrap_err();
        assert!(matches!(err, ReassemblyError::BadEndMarker));
        assert!(frames.lock().unwrap().is_empty());
    }

    #[test]
    fn oversized_declared_length_rejected() {
        let mut reassembler = Reassembler::with_max_payload(8);
        let err = reassembler.feed(&wire(&[0xAA; 32])).unwrap_err();
        assert!(matches!(err, ReassemblyError::PayloadTooLarge { .. }));
    }

    #[test]
    fn reset_discards_partial_frame() {
        let (mut reassembler, frames) = collecting_reassembler();
        let bytes = wire(b"interrupted");

        reassembler.feed(&bytes[..HEADER_SIZE + 3]).unwrap();
        reassembler.reset();
        assert!(!reassembler.is_accumulating());

        // A fresh full frame still reassembles cleanly.
        assert_eq!(reassembler.feed(&wire(b"fresh")).unwrap(), 1);
        assert_eq!(frames.lock().unwrap().as_slice(), &[b"fresh".to_vec()]);
    }

    #[test]
    fn push_frame_bypasses_codec() {
        let (mut reassembler, frames) = collecting_reassembler();
        reassembler.push_frame(b"datagram");
        assert_eq!(frames.lock().unwrap().as_slice(), &[b"datagram".to_vec()]);
    }

    #[test]
    fn sink_feed_recovers_after_desync() {
        let (mut reassembler, frames) = collecting_reassembler();
        let sink: &mut dyn InboundSink = &mut reassembler;

        sink.push_chunk(&[0x00, 0x01, 0x02, 0x03, 0x04]);
        sink.push_chunk(&wire(b"after"));
        assert_eq!(frames.lock().unwrap().as_slice(), &[b"after".to_vec()]);
    }
}
