//! Binding the listener set, and carrying it across `exec` for exec-style
//! reload (SPEC_FULL.md §4.6b, §6 "inherited-listener protocol").

use std::os::fd::{AsRawFd, RawFd};

use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use warden_core::BindAddress;
use warden_worker::Listener;

use crate::error::ArbiterError;

pub const LISTEN_FDS_VAR: &str = "LISTEN_FDS";

/// Bind every configured address in order (SPEC_FULL.md §3: "created once
/// by the arbiter"), clearing `FD_CLOEXEC` on each so a later exec reload
/// preserves them.
pub fn bind_all(addrs: &[BindAddress]) -> Result<Vec<Listener>, ArbiterError> {
    let mut listeners = Vec::with_capacity(addrs.len());
    for addr in addrs {
        let listener = Listener::bind(addr).map_err(ArbiterError::Bind)?;
        clear_cloexec(listener.as_raw_fd())?;
        listeners.push(listener);
    }
    Ok(listeners)
}

fn clear_cloexec(fd: RawFd) -> Result<(), ArbiterError> {
    let flags = fcntl(fd, FcntlArg::F_GETFD).map_err(ArbiterError::Sys)?;
    let mut flags = FdFlag::from_bits_truncate(flags);
    flags.remove(FdFlag::FD_CLOEXEC);
    fcntl(fd, FcntlArg::F_SETFD(flags)).map_err(ArbiterError::Sys)?;
    Ok(())
}

/// `LISTEN_FDS=<comma-separated fds>`, suitable for `execve`'s environment
/// (SPEC_FULL.md §6).
pub fn encode_listen_fds(listeners: &[Listener]) -> String {
    listeners
        .iter()
        .map(|l| l.as_raw_fd().to_string())
        .collect::<Vec<_>>()
        .join(",")
}

pub fn decode_listen_fds(raw: &str) -> Vec<RawFd> {
    raw.split(',')
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.trim().parse::<RawFd>().ok())
        .collect()
}

/// Whether a socket is `AF_UNIX` as opposed to `AF_INET`/`AF_INET6`,
/// determined with `getsockname` so the inherited-fd protocol doesn't
/// need to also encode each fd's address family.
fn is_unix_socket(fd: RawFd) -> std::io::Result<bool> {
    let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    // SAFETY: `storage`/`len` describe a correctly sized output buffer
    // for a valid, open socket fd.
    let ret = unsafe {
        libc::getsockname(
            fd,
            std::ptr::addr_of_mut!(storage).cast(),
            &mut len,
        )
    };
    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(storage.ss_family as libc::c_int == libc::AF_UNIX)
}

/// Adopt the fds named by `LISTEN_FDS`, skipping the rebind step
/// entirely (SPEC_FULL.md §4.6b: "the new arbiter recognizes the
/// inherited FDs").
pub fn adopt_inherited(fds: &[RawFd]) -> std::io::Result<Vec<Listener>> {
    fds.iter()
        .map(|&fd| {
            let unix = is_unix_socket(fd)?;
            // SAFETY: `fd` was named by our own `LISTEN_FDS` and is still
            // open and exclusively owned at this point in startup.
            Ok(unsafe { Listener::from_raw_inherited(fd, unix) })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_round_trips_fd_numbers() {
        let addr = BindAddress::parse("127.0.0.1:0").unwrap();
        let listeners = bind_all(std::slice::from_ref(&addr)).unwrap();
        let encoded = encode_listen_fds(&listeners);
        let decoded = decode_listen_fds(&encoded);
        assert_eq!(decoded, vec![listeners.first().unwrap().as_raw_fd()]);
    }

    #[test]
    fn decode_ignores_empty_and_garbage_entries() {
        assert_eq!(decode_listen_fds(""), Vec::<RawFd>::new());
        assert_eq!(decode_listen_fds("3,,not-a-number,5"), vec![3, 5]);
    }

    #[test]
    fn adopt_inherited_reconstructs_a_tcp_listener() {
        let addr = BindAddress::parse("127.0.0.1:0").unwrap();
        let listeners = bind_all(std::slice::from_ref(&addr)).unwrap();
        let fds: Vec<RawFd> = listeners.iter().map(|l| l.as_raw_fd()).collect();
        // Leak the originals so the fds stay open and owned by nobody
        // else — `adopt_inherited` below takes ownership via `from_raw_fd`.
        std::mem::forget(listeners);
        let adopted = adopt_inherited(&fds).unwrap();
        assert_eq!(adopted.len(), 1);
    }
}
