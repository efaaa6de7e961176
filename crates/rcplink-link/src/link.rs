//! Host-side link endpoint tying the outbound buffer, the drain task, the
//! inbound reassembler, and one bus adapter together.

use bytes::Bytes;
use tracing::{debug, warn};

use rcplink_buffer::{FrameBuffer, FrameTag, Priority};
use rcplink_transport::{Bus, FdSet, Framing, ReadySet};

use crate::error::Result;
use crate::filter::FrameFilter;
use crate::reassembly::{ReceiveCallback, Reassembler};
use crate::reset::{ResetEpoch, ResetPolicy};
use crate::send::{drain_one, SendFailureHook, SendFailurePolicy, SendTask};

/// One live link between the host stack and a radio co-processor.
///
/// The host enqueues opaque outbound frames with [`enqueue`](Self::enqueue);
/// a cooperative [`process`](Self::process) pump drains them into the bus one
/// frame per activation and delivers complete inbound frames through the
/// registered receive callback. Send and receive never run concurrently;
/// everything happens on the caller's execution context.
///
/// Deinitializing while a frame is in flight is the caller's responsibility:
/// quiesce the pump (stop calling `process`) before [`deinit`](Self::deinit),
/// or accept that an in-flight transfer completes against a closed bus.
pub struct RcpLink<B> {
    buffer: FrameBuffer,
    bus: B,
    send_task: SendTask,
    reassembler: Reassembler,
    filter: Option<Box<dyn FrameFilter>>,
    reset_policy: ResetPolicy,
    send_failure_policy: SendFailurePolicy,
    send_failure_hook: Option<SendFailureHook>,
    epoch: ResetEpoch,
}

impl<B: Bus> RcpLink<B> {
    pub fn new(bus: B) -> Self {
        Self::with_buffer(bus, FrameBuffer::new())
    }

    /// Build a link around a pre-configured outbound buffer.
    pub fn with_buffer(bus: B, mut buffer: FrameBuffer) -> Self {
        let send_task = SendTask::new();
        let task = send_task.clone();
        buffer.set_frame_added_callback(Box::new(move |_tag, _priority| {
            task.post();
        }));
        Self {
            buffer,
            bus,
            send_task,
            reassembler: Reassembler::new(),
            filter: None,
            reset_policy: ResetPolicy::default(),
            send_failure_policy: SendFailurePolicy::default(),
            send_failure_hook: None,
            epoch: ResetEpoch::default(),
        }
    }

    /// Install an outbound frame filter. Without one, every frame is
    /// forwarded to the bus.
    pub fn set_frame_filter(&mut self, filter: Box<dyn FrameFilter>) {
        self.filter = Some(filter);
    }

    pub fn set_reset_policy(&mut self, policy: ResetPolicy) {
        self.reset_policy = policy;
    }

    pub fn set_send_failure_policy(&mut self, policy: SendFailurePolicy) {
        self.send_failure_policy = policy;
    }

    /// Hook receiving the tag and error of frames dropped under
    /// [`SendFailurePolicy::Report`].
    pub fn set_send_failure_hook(&mut self, hook: SendFailureHook) {
        self.send_failure_hook = Some(hook);
    }

    /// Register the inbound frame callback, replacing any previous one.
    pub fn set_receive_callback(&mut self, callback: ReceiveCallback) {
        self.reassembler.set_receive_callback(callback);
    }

    /// Initialize the underlying bus.
    pub fn init(&mut self, bus_id: u8) -> Result<()> {
        self.bus.init(bus_id)?;
        Ok(())
    }

    /// Close the underlying bus. See the type docs for the in-flight policy.
    pub fn deinit(&mut self) {
        self.bus.deinit();
    }

    pub fn is_active(&self) -> bool {
        self.bus.is_active()
    }

    pub fn bus_speed(&self) -> u32 {
        self.bus.bus_speed()
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Number of outbound frames waiting to be drained.
    pub fn pending_frames(&self) -> usize {
        self.buffer.len()
    }

    /// Reset epoch of the link; advances on every observed RCP restart.
    pub fn epoch(&self) -> ResetEpoch {
        self.epoch
    }

    /// Queue one outbound frame.
    ///
    /// The frame is not transmitted here; the append schedules the drain
    /// task, and a later [`process`](Self::process) call performs the send.
    pub fn enqueue(&mut self, payload: impl Into<Bytes>, priority: Priority) -> Result<FrameTag> {
        Ok(self.buffer.add(payload, priority)?)
    }

    /// Run one pump iteration: drain at most one outbound frame if the send
    /// task is pending, then deliver any complete inbound frames from an
    /// event-driven bus.
    pub fn process(&mut self) -> Result<()> {
        self.drain_pending()?;
        self.pump_inbound()
    }

    /// Block up to `timeout` for inbound data, then run one pump iteration.
    pub fn wait_for_frame(&mut self, timeout: std::time::Duration) -> Result<()> {
        self.bus.wait_for_frame(timeout)?;
        self.pump_inbound()
    }

    /// Contribute the bus's descriptors to an external wait set.
    pub fn update_fd_set(&mut self, set: &mut FdSet) {
        if let Some(bus) = self.bus.pollable() {
            bus.update_fd_set(set);
        }
    }

    /// Perform bus I/O after the external wait returned. Inbound bytes flow
    /// through the reassembler to the receive callback; a pending outbound
    /// drain runs as well.
    pub fn process_io(&mut self, ready: &ReadySet) -> Result<()> {
        if let Some(bus) = self.bus.pollable() {
            bus.process(ready, &mut self.reassembler)?;
        }
        self.drain_pending()?;
        self.pump_inbound()
    }

    /// Recover from an observed RCP restart.
    ///
    /// The drain selection and any partial inbound frame belong to the old
    /// epoch and are discarded; queued-but-unsent frames survive or not per
    /// the configured [`ResetPolicy`].
    pub fn handle_rcp_reset(&mut self) {
        self.epoch.advance();
        warn!(epoch = self.epoch.value(), "rcp restart observed");

        self.buffer.clear_selection();
        if self.reset_policy == ResetPolicy::DiscardQueued {
            self.buffer.clear();
        }
        self.reassembler.reset();
        self.bus.on_rcp_reset();

        if !self.buffer.is_empty() {
            self.send_task.post();
        }
    }

    fn drain_pending(&mut self) -> Result<()> {
        if !self.send_task.take_pending() {
            return Ok(());
        }
        let outcome = drain_one(
            &mut self.buffer,
            &mut self.bus,
            self.filter.as_deref_mut(),
            self.send_failure_policy,
            self.send_failure_hook.as_mut(),
        )?;
        debug!(?outcome, "drain activation completed");

        // One frame per activation; anything left re-arms the task.
        if !self.buffer.is_empty() {
            self.send_task.post();
        }
        Ok(())
    }

    fn pump_inbound(&mut self) -> Result<()> {
        let framing = self.bus.framing();
        let Some(source) = self.bus.event_driven() else {
            return Ok(());
        };
        while let Some(rx) = source.poll_inbound()? {
            match framing {
                Framing::Datagram => self.reassembler.push_frame(rx.as_bytes()),
                Framing::Stream => {
                    self.reassembler.feed(rx.as_bytes())?;
                }
            }
            rx.release();
        }
        Ok(())
    }
}

impl<B: std::fmt::Debug> std::fmt::Debug for RcpLink<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RcpLink")
            .field("bus", &self.bus)
            .field("buffer", &self.buffer)
            .field("epoch", &self.epoch)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;
    use crate::filter::SignatureFilter;
    use rcplink_transport::{ChannelBus, Endpoint, MemEndpoint};

    fn linked() -> (RcpLink<ChannelBus<MemEndpoint>>, MemEndpoint) {
        let (host, mut peer) = MemEndpoint::pair();
        peer.open(0, None).unwrap();
        let mut link = RcpLink::new(ChannelBus::new(host));
        link.init(0).unwrap();
        (link, peer)
    }

    fn collecting_link(
        link: &mut RcpLink<ChannelBus<MemEndpoint>>,
    ) -> Arc<Mutex<Vec<Vec<u8>>>> {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&frames);
        link.set_receive_callback(Box::new(move |payload| {
            sink.lock().unwrap().push(payload.to_vec());
        }));
        frames
    }

    #[test]
    fn enqueue_defers_transmission_to_process() {
        let (mut link, mut peer) = linked();
        link.enqueue(&b"deferred"[..], Priority::Low).unwrap();

        assert!(peer.try_read().is_none());
        link.process().unwrap();
        assert_eq!(peer.try_read().unwrap().as_bytes(), b"deferred");
    }

    #[test]
    fn one_frame_per_process_call() {
        let (mut link, mut peer) = linked();
        link.enqueue(&b"first"[..], Priority::Low).unwrap();
        link.enqueue(&b"second"[..], Priority::Low).unwrap();

        link.process().unwrap();
        assert_eq!(peer.try_read().unwrap().as_bytes(), b"first");
        assert!(peer.try_read().is_none());
        assert_eq!(link.pending_frames(), 1);

        // The drain re-armed itself for the remaining frame.
        link.process().unwrap();
        assert_eq!(peer.try_read().unwrap().as_bytes(), b"second");
        assert_eq!(link.pending_frames(), 0);
    }

    #[test]
    fn high_priority_drains_before_low() {
        let (mut link, mut peer) = linked();
        link.enqueue(&b"low"[..], Priority::Low).unwrap();
        link.enqueue(&b"high"[..], Priority::High).unwrap();

        link.process().unwrap();
        link.process().unwrap();
        assert_eq!(peer.try_read().unwrap().as_bytes(), b"high");
        assert_eq!(peer.try_read().unwrap().as_bytes(), b"low");
    }

    #[test]
    fn inbound_frames_reach_receive_callback() {
        let (mut link, mut peer) = linked();
        let frames = collecting_link(&mut link);

        peer.try_write(b"from-rcp".to_vec()).unwrap();
        link.process().unwrap();

        assert_eq!(frames.lock().unwrap().as_slice(), &[b"from-rcp".to_vec()]);
    }

    #[test]
    fn process_drains_all_pending_inbound() {
        let (mut link, mut peer) = linked();
        let frames = collecting_link(&mut link);

        peer.try_write(b"one".to_vec()).unwrap();
        peer.try_write(b"two".to_vec()).unwrap();
        link.process().unwrap();

        assert_eq!(
            frames.lock().unwrap().as_slice(),
            &[b"one".to_vec(), b"two".to_vec()]
        );
    }

    #[test]
    fn wait_for_frame_delivers_on_arrival() {
        let (mut link, mut peer) = linked();
        let frames = collecting_link(&mut link);

        peer.try_write(b"awaited".to_vec()).unwrap();
        link.wait_for_frame(Duration::from_millis(100)).unwrap();

        assert_eq!(frames.lock().unwrap().as_slice(), &[b"awaited".to_vec()]);
    }

    #[test]
    fn filter_suppresses_matching_outbound_frame() {
        let (mut link, mut peer) = linked();
        link.set_frame_filter(Box::new(SignatureFilter::reset_notification()));

        link.enqueue(&[0x80, 0x06, 0x00, 0x72, 0x01][..], Priority::Low)
            .unwrap();
        link.process().unwrap();

        assert!(peer.try_read().is_none());
        assert_eq!(link.pending_frames(), 0);
    }

    #[test]
    fn default_reset_policy_preserves_queued_frames() {
        let (mut link, mut peer) = linked();
        link.enqueue(&b"survivor"[..], Priority::Low).unwrap();

        link.handle_rcp_reset();
        assert_eq!(link.epoch().value(), 1);
        assert_eq!(link.pending_frames(), 1);

        link.process().unwrap();
        assert_eq!(peer.try_read().unwrap().as_bytes(), b"survivor");
    }

    #[test]
    fn discard_policy_drops_queued_frames() {
        let (mut link, mut peer) = linked();
        link.set_reset_policy(ResetPolicy::DiscardQueued);
        link.enqueue(&b"doomed"[..], Priority::Low).unwrap();

        link.handle_rcp_reset();
        assert_eq!(link.pending_frames(), 0);

        link.process().unwrap();
        assert!(peer.try_read().is_none());
    }

    #[test]
    fn reset_releases_stale_inbound_state() {
        let (mut link, mut peer) = linked();
        let frames = collecting_link(&mut link);

        // Stale frame arrives, then the RCP restarts before delivery.
        peer.try_write(b"stale".to_vec()).unwrap();
        link.bus_mut()
            .wait_for_frame(Duration::from_millis(100))
            .unwrap();
        link.handle_rcp_reset();

        assert!(frames.lock().unwrap().is_empty());
        assert_eq!(link.bus().endpoint().outstanding_rx_buffers(), 0);

        // The refreshed link carries traffic normally.
        peer.try_write(b"fresh".to_vec()).unwrap();
        link.process().unwrap();
        assert_eq!(frames.lock().unwrap().as_slice(), &[b"fresh".to_vec()]);
    }

    #[test]
    fn report_policy_surfaces_send_failures() {
        let (host, _peer) = MemEndpoint::pair();
        let host = host.with_inbox_limit(0); // never writable
        let bus = ChannelBus::new(host).with_max_send_wait(Duration::from_millis(10));
        let mut link = RcpLink::new(bus);
        link.init(0).unwrap();
        link.set_send_failure_policy(SendFailurePolicy::Report);

        let failures: Arc<Mutex<Vec<FrameTag>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&failures);
        link.set_send_failure_hook(Box::new(move |tag, _err| {
            sink.lock().unwrap().push(tag);
        }));

        let tag = link.enqueue(&b"undeliverable"[..], Priority::Low).unwrap();
        link.process().unwrap();

        assert_eq!(failures.lock().unwrap().as_slice(), &[tag]);
        assert_eq!(link.pending_frames(), 0);
    }

    #[test]
    fn full_buffer_rejects_enqueue() {
        let (host, _peer) = MemEndpoint::pair();
        let mut link =
            RcpLink::with_buffer(ChannelBus::new(host), FrameBuffer::with_capacity(4));
        link.init(0).unwrap();

        link.enqueue(&b"fits"[..], Priority::Low).unwrap();
        assert!(link.enqueue(&b"overflow"[..], Priority::Low).is_err());
        assert_eq!(link.pending_frames(), 1);
    }

    #[test]
    fn deinit_then_init_cycles_the_bus() {
        let (mut link, _peer) = linked();
        assert!(link.is_active());
        link.deinit();
        assert!(!link.is_active());
        link.init(0).unwrap();
        assert!(link.is_active());
    }

    #[cfg(unix)]
    mod stream {
        use std::io::{Read as _, Write as _};
        use std::os::unix::net::UnixStream;

        use super::*;
        use crate::reassembly::encode_frame;
        use bytes::BytesMut;
        use rcplink_transport::{poll, FdBus};

        fn stream_link() -> (
            RcpLink<FdBus<UnixStream, impl FnMut(u8) -> std::io::Result<UnixStream>>>,
            UnixStream,
        ) {
            let (local, remote) = UnixStream::pair().unwrap();
            let mut slot = Some(local);
            let bus = FdBus::new(move |_bus_id| {
                slot.take().ok_or_else(|| std::io::Error::other("exhausted"))
            });
            let mut link = RcpLink::new(bus);
            link.init(0).unwrap();
            (link, remote)
        }

        #[test]
        fn pollable_inbound_flows_through_reassembler() {
            let (mut link, mut remote) = stream_link();
            let frames = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&frames);
            link.set_receive_callback(Box::new(move |payload| {
                sink.lock().unwrap().push(payload.to_vec());
            }));

            let mut wire = BytesMut::new();
            encode_frame(b"over-the-wire", &mut wire).unwrap();
            remote.write_all(&wire).unwrap();

            let mut set = FdSet::new();
            link.update_fd_set(&mut set);
            set.shrink_timeout(Duration::from_millis(500));
            let ready = poll::wait(&set).unwrap();
            link.process_io(&ready).unwrap();

            assert_eq!(
                frames.lock().unwrap().as_slice(),
                &[b"over-the-wire".to_vec()]
            );
        }

        #[test]
        fn oversized_frame_does_not_stall_the_link() {
            let (local, mut remote) = UnixStream::pair().unwrap();
            let mut slot = Some(local);
            let bus = FdBus::new(move |_bus_id| {
                slot.take().ok_or_else(|| std::io::Error::other("exhausted"))
            });
            let mut link = RcpLink::with_buffer(bus, FrameBuffer::with_capacity(128 * 1024));
            link.init(0).unwrap();

            // First frame exceeds the wire format's length field.
            link.enqueue(vec![0u8; 70_000], Priority::Low).unwrap();
            link.enqueue(&b"ok"[..], Priority::Low).unwrap();

            link.process().unwrap();
            assert_eq!(link.pending_frames(), 1);
            link.process().unwrap();
            assert_eq!(link.pending_frames(), 0);

            let mut expected = BytesMut::new();
            encode_frame(b"ok", &mut expected).unwrap();
            let mut wire = vec![0u8; expected.len()];
            remote.read_exact(&mut wire).unwrap();
            assert_eq!(wire, expected.to_vec());
        }

        #[test]
        fn process_io_also_drains_pending_outbound() {
            let (mut link, mut remote) = stream_link();
            link.enqueue(&b"out"[..], Priority::Low).unwrap();

            link.process_io(&ReadySet::new()).unwrap();

            let mut expected = BytesMut::new();
            encode_frame(b"out", &mut expected).unwrap();
            let mut wire = vec![0u8; expected.len()];
            remote.read_exact(&mut wire).unwrap();
            assert_eq!(wire, expected.to_vec());
        }
    }
}
