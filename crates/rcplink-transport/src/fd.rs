//! Descriptor-based stream bus (serial line, socket-backed adapters).

use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{Result, TransportError};
use crate::poll::{poll_one, FdSet, ReadySet};
use crate::traits::{Bus, Framing, InboundSink, PollableBus, MAX_SEND_WAIT};

const READ_CHUNK_SIZE: usize = 2048;

/// Bus adapter over a file descriptor carrying a byte stream.
///
/// The descriptor is opened lazily by the injected `opener`, which maps a
/// `bus_id` to a concrete device (serial port, socketed RCP simulator). The
/// bus is a byte stream, so it reports [`Framing::Stream`] and the link layer
/// adds its own frame delimiting.
///
/// Delivery is pull-style: the adapter contributes its descriptor to an
/// external wait loop via [`PollableBus`] and reads when that loop reports
/// readiness.
pub struct FdBus<S, F> {
    opener: F,
    stream: Option<S>,
    bus_speed: u32,
    max_send_wait: Duration,
}

impl<S, F> FdBus<S, F>
where
    S: Read + Write + AsRawFd,
    F: FnMut(u8) -> std::io::Result<S>,
{
    pub fn new(opener: F) -> Self {
        Self {
            opener,
            stream: None,
            bus_speed: 0,
            max_send_wait: MAX_SEND_WAIT,
        }
    }

    /// Set the reported bus speed (bits per second) for serial devices.
    pub fn with_bus_speed(mut self, bits_per_second: u32) -> Self {
        self.bus_speed = bits_per_second;
        self
    }

    /// Override the maximum writable wait (for tests).
    pub fn with_max_send_wait(mut self, wait: Duration) -> Self {
        self.max_send_wait = wait;
        self
    }

    fn fd(&self) -> Option<RawFd> {
        self.stream.as_ref().map(|s| s.as_raw_fd())
    }

    fn wait_for_writable(&self, deadline: Instant) -> Result<()> {
        let fd = self.fd().ok_or_else(not_initialized)?;
        let remaining = deadline.saturating_duration_since(Instant::now());
        if poll_one(fd, libc::POLLOUT, remaining)? {
            return Ok(());
        }
        warn!(wait = ?self.max_send_wait, "descriptor never became writable");
        Err(TransportError::Failed(format!(
            "bus not writable within {:?}",
            self.max_send_wait
        )))
    }
}

fn not_initialized() -> TransportError {
    TransportError::Failed("bus not initialized".into())
}

impl<S, F> Bus for FdBus<S, F>
where
    S: Read + Write + AsRawFd,
    F: FnMut(u8) -> std::io::Result<S>,
{
    fn init(&mut self, bus_id: u8) -> Result<()> {
        if self.stream.is_some() {
            return Err(TransportError::Already);
        }
        let stream = (self.opener)(bus_id)
            .map_err(|err| TransportError::InvalidArgs(format!("bus {bus_id}: {err}")))?;
        debug!(bus_id, fd = stream.as_raw_fd(), "descriptor bus initialized");
        self.stream = Some(stream);
        Ok(())
    }

    fn deinit(&mut self) {
        if self.stream.take().is_some() {
            debug!("descriptor bus deinitialized");
        }
    }

    fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        if self.stream.is_none() {
            return Err(not_initialized());
        }
        let deadline = Instant::now() + self.max_send_wait;
        self.wait_for_writable(deadline)?;

        let stream = self.stream.as_mut().ok_or_else(not_initialized)?;
        let mut offset = 0usize;
        while offset < frame.len() {
            match stream.write(&frame[offset..]) {
                Ok(0) => return Err(TransportError::Failed("bus closed".into())),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    let fd = stream.as_raw_fd();
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if !poll_one(fd, libc::POLLOUT, remaining)? {
                        return Err(TransportError::Failed(format!(
                            "bus not writable within {:?}",
                            self.max_send_wait
                        )));
                    }
                }
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
        Ok(())
    }

    fn wait_for_frame(&mut self, timeout: Duration) -> Result<()> {
        let fd = self.fd().ok_or_else(not_initialized)?;
        if poll_one(fd, libc::POLLIN, timeout)? {
            Ok(())
        } else {
            Err(TransportError::ResponseTimeout { waited: timeout })
        }
    }

    fn bus_speed(&self) -> u32 {
        self.bus_speed
    }

    fn on_rcp_reset(&mut self) {
        // No adapter-held inbound state: reassembly lives above, and the
        // descriptor itself survives an RCP restart.
        debug!("descriptor bus reset");
    }

    fn framing(&self) -> Framing {
        Framing::Stream
    }

    fn pollable(&mut self) -> Option<&mut dyn PollableBus> {
        Some(self)
    }
}

impl<S, F> PollableBus for FdBus<S, F>
where
    S: Read + Write + AsRawFd,
    F: FnMut(u8) -> std::io::Result<S>,
{
    fn update_fd_set(&self, set: &mut FdSet) {
        if let Some(fd) = self.fd() {
            set.push_read(fd);
        }
    }

    fn process(&mut self, ready: &ReadySet, sink: &mut dyn InboundSink) -> Result<()> {
        let Some(fd) = self.fd() else {
            return Ok(());
        };
        if !ready.is_readable(fd) {
            return Ok(());
        }

        let stream = self.stream.as_mut().ok_or_else(not_initialized)?;
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            // Guard each read so a level-triggered wakeup never blocks us.
            if !poll_one(fd, libc::POLLIN, Duration::ZERO)? {
                return Ok(());
            }
            match stream.read(&mut chunk) {
                Ok(0) => return Err(TransportError::Failed("bus closed".into())),
                Ok(n) => sink.push_chunk(&chunk[..n]),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }
}
