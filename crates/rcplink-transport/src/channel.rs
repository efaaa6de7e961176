//! Event-driven bus over a co-processor channel endpoint.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::endpoint::{Endpoint, RxBuffer, TryWriteError, WriteDoneHook};
use crate::error::{Result, TransportError};
use crate::traits::{Bus, EventDrivenBus, Framing, MAX_SEND_WAIT};

const WRITE_RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// Bus adapter for channel-style endpoints (data delivered by a separate
/// co-processor execution context, drained by polling).
///
/// The endpoint preserves message boundaries, so no stream framing is added:
/// every inbound read is one complete frame.
pub struct ChannelBus<E> {
    endpoint: E,
    active: bool,
    stashed: Option<RxBuffer>,
    write_done: Option<Arc<Mutex<WriteDoneHook>>>,
    max_send_wait: Duration,
}

impl<E: Endpoint> ChannelBus<E> {
    pub fn new(endpoint: E) -> Self {
        Self {
            endpoint,
            active: false,
            stashed: None,
            write_done: None,
            max_send_wait: MAX_SEND_WAIT,
        }
    }

    /// Register a write-completion hook, registered with the endpoint on
    /// every `init` (it survives `deinit`/`init` cycles). Without one,
    /// completed transfer buffers are dropped on return.
    pub fn with_write_done(mut self, hook: WriteDoneHook) -> Self {
        self.write_done = Some(Arc::new(Mutex::new(hook)));
        self
    }

    /// Override the maximum writable wait (for tests).
    pub fn with_max_send_wait(mut self, wait: Duration) -> Self {
        self.max_send_wait = wait;
        self
    }

    /// Access the underlying endpoint.
    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    pub fn endpoint_mut(&mut self) -> &mut E {
        &mut self.endpoint
    }
}

impl<E: Endpoint> Bus for ChannelBus<E> {
    fn init(&mut self, bus_id: u8) -> Result<()> {
        if self.active {
            return Err(TransportError::Already);
        }
        let hook = self.write_done.as_ref().map(|shared| {
            let shared = Arc::clone(shared);
            Box::new(move |buf: Vec<u8>| {
                if let Ok(mut hook) = shared.lock() {
                    (*hook)(buf);
                }
            }) as WriteDoneHook
        });
        self.endpoint.open(bus_id, hook)?;
        self.active = true;
        debug!(bus_id, "channel bus initialized");
        Ok(())
    }

    fn deinit(&mut self) {
        if let Some(stashed) = self.stashed.take() {
            stashed.release();
        }
        self.endpoint.close();
        if self.active {
            debug!("channel bus deinitialized");
        }
        self.active = false;
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        if !self.active {
            return Err(TransportError::Failed("bus not initialized".into()));
        }

        // The transfer buffer moves to the endpoint on a successful write and
        // comes back through the completion hook. A busy endpoint hands it
        // back immediately so we can retry within the wait bound.
        let mut transfer = frame.to_vec();
        let deadline = Instant::now() + self.max_send_wait;
        loop {
            match self.endpoint.try_write(transfer) {
                Ok(()) => return Ok(()),
                Err(TryWriteError::Busy(returned)) => {
                    if Instant::now() >= deadline {
                        warn!(wait = ?self.max_send_wait, "channel never became writable");
                        return Err(TransportError::Failed(format!(
                            "channel not writable within {:?}",
                            self.max_send_wait
                        )));
                    }
                    transfer = returned;
                    std::thread::sleep(WRITE_RETRY_INTERVAL);
                }
                Err(TryWriteError::NoBufs) => return Err(TransportError::NoBufs),
                Err(TryWriteError::Closed) => {
                    return Err(TransportError::Failed("endpoint closed".into()))
                }
            }
        }
    }

    fn wait_for_frame(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.stashed.is_some() {
                return Ok(());
            }
            if let Some(rx) = self.endpoint.try_read() {
                self.stashed = Some(rx);
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(TransportError::ResponseTimeout { waited: timeout });
            }
            std::thread::sleep(WRITE_RETRY_INTERVAL);
        }
    }

    fn on_rcp_reset(&mut self) {
        if let Some(stashed) = self.stashed.take() {
            debug!("releasing stashed inbound buffer on reset");
            stashed.release();
        }
        self.endpoint.reset();
    }

    fn framing(&self) -> Framing {
        Framing::Datagram
    }

    fn event_driven(&mut self) -> Option<&mut dyn EventDrivenBus> {
        Some(self)
    }
}

impl<E: Endpoint> EventDrivenBus for ChannelBus<E> {
    fn poll_inbound(&mut self) -> Result<Option<RxBuffer>> {
        if let Some(stashed) = self.stashed.take() {
            return Ok(Some(stashed));
        }
        Ok(self.endpoint.try_read())
    }
}
