//! The listener set (SPEC_FULL.md §3, C3): bound by the arbiter before
//! fork, inherited by every worker. A worker only ever accepts; it never
//! binds for itself except in tests that exercise a worker standalone.

use std::io;
use std::net::{TcpListener, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};

use warden_core::BindAddress;

/// One bound, listening socket — TCP or Unix domain.
#[derive(Debug)]
pub enum Listener {
    Tcp(TcpListener),
    Unix(UnixListener),
}

impl Listener {
    pub fn bind(addr: &BindAddress) -> io::Result<Self> {
        match addr {
            BindAddress::Tcp(socket_addr) => Ok(Self::Tcp(TcpListener::bind(socket_addr)?)),
            BindAddress::Unix(path) => {
                if path.exists() {
                    std::fs::remove_file(path)?;
                }
                Ok(Self::Unix(UnixListener::bind(path)?))
            }
        }
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        match self {
            Self::Tcp(l) => l.set_nonblocking(nonblocking),
            Self::Unix(l) => l.set_nonblocking(nonblocking),
        }
    }

    pub fn accept(&self) -> io::Result<Connection> {
        match self {
            Self::Tcp(l) => l.accept().map(|(s, _)| Connection::Tcp(s)),
            Self::Unix(l) => l.accept().map(|(s, _)| Connection::Unix(s)),
        }
    }

    /// Duplicate the underlying fd so each forked worker can own its own
    /// handle onto the same kernel listen queue (SPEC_FULL.md §3:
    /// "listener sockets outlive any individual worker").
    pub fn try_clone(&self) -> io::Result<Self> {
        match self {
            Self::Tcp(l) => Ok(Self::Tcp(l.try_clone()?)),
            Self::Unix(l) => Ok(Self::Unix(l.try_clone()?)),
        }
    }

    /// Build a listener from an fd inherited across `exec` (SPEC_FULL.md
    /// §4.6b, §6 "inherited-listener protocol"). The caller is
    /// responsible for having determined `fd` really is a listening
    /// socket of the matching family.
    ///
    /// # Safety
    /// `fd` must be an open, valid, listening socket file descriptor not
    /// owned by anything else in this process.
    pub unsafe fn from_raw_inherited(fd: RawFd, unix: bool) -> Self {
        use std::os::fd::FromRawFd;
        // SAFETY: caller guarantees `fd` is a valid, exclusively-owned
        // listening socket of the matching family.
        unsafe {
            if unix {
                Self::Unix(UnixListener::from_raw_fd(fd))
            } else {
                Self::Tcp(TcpListener::from_raw_fd(fd))
            }
        }
    }
}

impl AsRawFd for Listener {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            Self::Tcp(l) => l.as_raw_fd(),
            Self::Unix(l) => l.as_raw_fd(),
        }
    }
}

/// An accepted connection, TCP or Unix domain.
#[derive(Debug)]
pub enum Connection {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl Connection {
    pub fn set_read_timeout(&self, timeout: Option<std::time::Duration>) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.set_read_timeout(timeout),
            Self::Unix(s) => s.set_read_timeout(timeout),
        }
    }

    /// The peer's address, for the access log (SPEC_FULL.md §4.8). A Unix
    /// domain peer has no meaningful socket address.
    pub fn peer_addr(&self) -> Option<std::net::SocketAddr> {
        match self {
            Self::Tcp(s) => s.peer_addr().ok(),
            Self::Unix(_) => None,
        }
    }
}

impl io::Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(s) => s.read(buf),
            Self::Unix(s) => s.read(buf),
        }
    }
}

impl io::Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(s) => s.write(buf),
            Self::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.flush(),
            Self::Unix(s) => s.flush(),
        }
    }
}

impl AsRawFd for Connection {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            Self::Tcp(s) => s.as_raw_fd(),
            Self::Unix(s) => s.as_raw_fd(),
        }
    }
}

/// `poll(2)` every listener with `timeout`; returns the index of the
/// first readable listener, or `None` on timeout (SPEC_FULL.md §4.2:
/// "poll the listener with a timeout of heartbeat_interval").
pub fn poll_readable(
    listeners: &[Listener],
    timeout: std::time::Duration,
) -> io::Result<Option<usize>> {
    let mut fds: Vec<libc::pollfd> = listeners
        .iter()
        .map(|l| libc::pollfd {
            fd: l.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        })
        .collect();

    let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
    // SAFETY: `fds` is a valid, correctly-sized array for the duration of the call.
    let n = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
    if n < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(None);
        }
        return Err(err);
    }
    if n == 0 {
        return Ok(None);
    }
    Ok(fds.iter().position(|f| f.revents & libc::POLLIN != 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn poll_times_out_with_no_connections_pending() {
        let addr = BindAddress::parse("127.0.0.1:0").unwrap();
        let listener = Listener::bind(&addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let result = poll_readable(std::slice::from_ref(&listener), Duration::from_millis(50));
        assert_eq!(result.unwrap(), None);
    }

    #[test]
    fn poll_reports_readable_listener_after_connect() {
        let addr = BindAddress::parse("127.0.0.1:0").unwrap();
        let listener = Listener::bind(&addr).unwrap();
        let port = match &listener {
            Listener::Tcp(tcp) => tcp.local_addr().unwrap().port(),
            Listener::Unix(_) => panic!("expected a TCP listener"),
        };
        let _client = TcpStream::connect(("127.0.0.1", port)).unwrap();
        let result = poll_readable(std::slice::from_ref(&listener), Duration::from_secs(2));
        assert_eq!(result.unwrap(), Some(0));
    }
}
