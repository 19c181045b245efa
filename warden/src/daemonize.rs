//! Daemonizing (SPEC_FULL.md §6 `--daemon`): the classic double-fork,
//! `setsid`, and stdio redirect to `/dev/null`. Must run before any
//! listener is bound or any thread is spawned — the first fork's parent
//! exits immediately, so nothing after this point may depend on the
//! original process's continued existence.

use std::os::fd::AsRawFd;

use nix::errno::Errno;
use nix::unistd::{fork, setsid, ForkResult};

pub fn daemonize() -> std::io::Result<()> {
    fork_and_exit_parent()?;
    setsid().map_err(to_io_error)?;
    // A second fork so the daemon, no longer a session leader, can never
    // reacquire a controlling terminal.
    fork_and_exit_parent()?;
    redirect_stdio_to_dev_null()
}

fn fork_and_exit_parent() -> std::io::Result<()> {
    // SAFETY: called at the very start of `main`, before any other
    // thread is spawned.
    match unsafe { fork() }.map_err(to_io_error)? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => Ok(()),
    }
}

fn to_io_error(e: Errno) -> std::io::Error {
    std::io::Error::from_raw_os_error(e as i32)
}

fn redirect_stdio_to_dev_null() -> std::io::Result<()> {
    let dev_null = std::fs::OpenOptions::new().read(true).write(true).open("/dev/null")?;
    let fd = dev_null.as_raw_fd();
    for target in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        // SAFETY: `fd` names the just-opened `/dev/null` handle, open for
        // the duration of this call; `target` is one of the three
        // standard descriptors.
        if unsafe { libc::dup2(fd, target) } < 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}
