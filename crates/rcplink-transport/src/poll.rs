//! Descriptor-set plumbing for buses that participate in an external
//! multiplexed wait loop.

use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

/// Descriptors and timeout contributed by pollable buses before a wait.
#[derive(Debug, Default)]
pub struct FdSet {
    read: Vec<RawFd>,
    write: Vec<RawFd>,
    timeout: Option<Duration>,
}

impl FdSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descriptor to wait on for readability.
    pub fn push_read(&mut self, fd: RawFd) {
        if !self.read.contains(&fd) {
            self.read.push(fd);
        }
    }

    /// Add a descriptor to wait on for writability.
    pub fn push_write(&mut self, fd: RawFd) {
        if !self.write.contains(&fd) {
            self.write.push(fd);
        }
    }

    /// Lower the wait timeout to `timeout` if it is shorter than the current
    /// one.
    pub fn shrink_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(match self.timeout {
            Some(current) => current.min(timeout),
            None => timeout,
        });
    }

    pub fn read_fds(&self) -> &[RawFd] {
        &self.read
    }

    pub fn write_fds(&self) -> &[RawFd] {
        &self.write
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Descriptors reported ready by the external wait.
#[derive(Debug, Default)]
pub struct ReadySet {
    read: Vec<RawFd>,
    write: Vec<RawFd>,
}

impl ReadySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_readable(&mut self, fd: RawFd) {
        self.read.push(fd);
    }

    pub fn mark_writable(&mut self, fd: RawFd) {
        self.write.push(fd);
    }

    pub fn is_readable(&self, fd: RawFd) -> bool {
        self.read.contains(&fd)
    }

    pub fn is_writable(&self, fd: RawFd) -> bool {
        self.write.contains(&fd)
    }
}

/// Wait on an [`FdSet`] with `poll(2)` and report which descriptors became
/// ready.
///
/// A convenience for owners that do not already run their own wait loop.
#[cfg(unix)]
pub fn wait(set: &FdSet) -> io::Result<ReadySet> {
    let mut fds: Vec<libc::pollfd> = Vec::with_capacity(set.read.len() + set.write.len());
    for &fd in &set.read {
        fds.push(libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        });
    }
    for &fd in &set.write {
        fds.push(libc::pollfd {
            fd,
            events: libc::POLLOUT,
            revents: 0,
        });
    }

    let timeout_ms = match set.timeout {
        Some(t) => t.as_millis().min(i32::MAX as u128) as i32,
        None => -1,
    };

    poll_raw(&mut fds, timeout_ms)?;

    let mut ready = ReadySet::new();
    for pfd in &fds {
        if pfd.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0 {
            ready.mark_readable(pfd.fd);
        }
        if pfd.revents & libc::POLLOUT != 0 {
            ready.mark_writable(pfd.fd);
        }
    }
    Ok(ready)
}

/// Poll a single descriptor for the given events, returning whether it became
/// ready within `timeout`.
#[cfg(unix)]
pub(crate) fn poll_one(fd: RawFd, events: libc::c_short, timeout: Duration) -> io::Result<bool> {
    let mut fds = [libc::pollfd {
        fd,
        events,
        revents: 0,
    }];
    let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;
    let n = poll_raw(&mut fds, timeout_ms)?;
    Ok(n > 0 && fds[0].revents & events != 0)
}

#[cfg(unix)]
fn poll_raw(fds: &mut [libc::pollfd], timeout_ms: i32) -> io::Result<i32> {
    loop {
        // SAFETY: `fds` is a valid, exclusively borrowed slice of pollfd for
        // the passed length, and the descriptors it names are owned by this
        // process.
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        return Ok(rc);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::Write;
    use std::os::fd::AsRawFd;
    use std::os::unix::net::UnixStream;

    use super::*;

    #[test]
    fn fd_set_deduplicates_and_shrinks_timeout() {
        let mut set = FdSet::new();
        set.push_read(3);
        set.push_read(3);
        set.push_write(4);
        assert_eq!(set.read_fds(), &[3]);
        assert_eq!(set.write_fds(), &[4]);

        set.shrink_timeout(Duration::from_millis(500));
        set.shrink_timeout(Duration::from_millis(100));
        set.shrink_timeout(Duration::from_millis(900));
        assert_eq!(set.timeout(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn wait_reports_readable_after_write() {
        let (mut left, right) = UnixStream::pair().unwrap();
        left.write_all(b"x").unwrap();

        let mut set = FdSet::new();
        set.push_read(right.as_raw_fd());
        set.shrink_timeout(Duration::from_millis(1000));

        let ready = wait(&set).unwrap();
        assert!(ready.is_readable(right.as_raw_fd()));
    }

    #[test]
    fn wait_times_out_with_no_data() {
        let (_left, right) = UnixStream::pair().unwrap();

        let mut set = FdSet::new();
        set.push_read(right.as_raw_fd());
        set.shrink_timeout(Duration::from_millis(10));

        let ready = wait(&set).unwrap();
        assert!(!ready.is_readable(right.as_raw_fd()));
    }

    #[test]
    fn poll_one_sees_writable_socket() {
        let (left, _right) = UnixStream::pair().unwrap();
        let writable = poll_one(
            left.as_raw_fd(),
            libc::POLLOUT,
            Duration::from_millis(100),
        )
        .unwrap();
        assert!(writable);
    }
}
