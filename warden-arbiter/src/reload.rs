//! Exec-style reload (SPEC_FULL.md §4.6b): the arbiter re-execs its own
//! image with the listener fds preserved via `LISTEN_FDS`, so the new
//! image can skip rebinding. Old workers become orphans of the new
//! arbiter and exit on their own once they notice `getppid()` changed.

use std::convert::Infallible;
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;

use nix::unistd::execve;
use warden_worker::Listener;

use crate::error::ArbiterError;
use crate::listeners::{encode_listen_fds, LISTEN_FDS_VAR};

fn to_cstring(s: &str) -> Result<CString, ArbiterError> {
    CString::new(s).map_err(|_| {
        ArbiterError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "argument contains a NUL byte",
        ))
    })
}

/// Replace this process's image with a fresh copy of itself, carrying
/// the bound listeners across via `LISTEN_FDS`. Only returns on error —
/// on success the current image is gone.
pub fn exec_reload(listeners: &[Listener]) -> Result<Infallible, ArbiterError> {
    let exe = std::env::current_exe().map_err(ArbiterError::Io)?;
    let exe_c = CString::new(exe.as_os_str().as_bytes()).map_err(|_| {
        ArbiterError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "executable path contains a NUL byte",
        ))
    })?;

    let argv = std::env::args()
        .map(|arg| to_cstring(&arg))
        .collect::<Result<Vec<_>, _>>()?;

    let mut envp = std::env::vars()
        .filter(|(key, _)| key != LISTEN_FDS_VAR)
        .map(|(key, value)| to_cstring(&format!("{key}={value}")))
        .collect::<Result<Vec<_>, _>>()?;
    envp.push(to_cstring(&format!(
        "{LISTEN_FDS_VAR}={}",
        encode_listen_fds(listeners)
    ))?);

    execve(&exe_c, &argv, &envp).map_err(ArbiterError::Exec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_arguments_containing_nul() {
        assert!(to_cstring("bad\0arg").is_err());
    }
}
