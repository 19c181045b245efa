//! A thin `sendfile(2)` wrapper (SPEC_FULL.md §7, grounded on gunicorn's
//! `http/sendfile.py`: prefer the zero-copy syscall, fall back to a
//! plain read/write loop when it isn't available or the body isn't a
//! regular file).

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;

/// Copies `count` bytes from `file` (starting at `offset`) to `out`.
///
/// Tries `libc::sendfile` first; on `ENOSYS`/`EINVAL` (e.g. `out` isn't
/// a socket, or the platform lacks the call) falls back to a buffered
/// copy so callers never have to special-case the failure.
pub fn send_file<W: Write + AsRawFd>(
    out: &mut W,
    file: &File,
    offset: u64,
    count: usize,
) -> io::Result<usize> {
    match try_sendfile(out.as_raw_fd(), file.as_raw_fd(), offset, count) {
        Ok(n) => Ok(n),
        Err(e) if matches!(e.raw_os_error(), Some(libc::ENOSYS) | Some(libc::EINVAL)) => {
            copy_loop(out, file, offset, count)
        }
        Err(e) => Err(e),
    }
}

fn try_sendfile(out_fd: i32, in_fd: i32, offset: u64, count: usize) -> io::Result<usize> {
    let mut off = offset as libc::off_t;
    // SAFETY: out_fd/in_fd are borrowed for the duration of the call and
    // remain valid file descriptors owned by the caller.
    let n = unsafe { libc::sendfile(out_fd, in_fd, &mut off, count) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}

fn copy_loop<W: Write>(out: &mut W, file: &File, offset: u64, count: usize) -> io::Result<usize> {
    use std::io::Seek;
    let mut file = file.try_clone()?;
    file.seek(io::SeekFrom::Start(offset))?;
    let mut remaining = count;
    let mut total = 0usize;
    let mut buf = [0u8; 64 * 1024];
    while remaining > 0 {
        let want = remaining.min(buf.len());
        let Some(window) = buf.get_mut(..want) else {
            break;
        };
        let read = file.read(window)?;
        if read == 0 {
            break;
        }
        if let Some(filled) = buf.get(..read) {
            out.write_all(filled)?;
        }
        remaining -= read;
        total += read;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Seek, SeekFrom, Write as _};

    #[test]
    fn copy_loop_copies_requested_range() {
        let mut tmp = tempfile::tempfile().unwrap();
        tmp.write_all(b"hello world").unwrap();
        tmp.seek(SeekFrom::Start(0)).unwrap();

        let mut out = Vec::new();
        struct VecSink<'a>(&'a mut Vec<u8>);
        impl Write for VecSink<'_> {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.write(buf)
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        impl AsRawFd for VecSink<'_> {
            fn as_raw_fd(&self) -> i32 {
                // never exercised: try_sendfile always fails for this fd,
                // which is exactly what drives the fallback path under test.
                -1
            }
        }

        let mut sink = VecSink(&mut out);
        let n = send_file(&mut sink, &tmp, 0, 5).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&out, b"hello");
    }
}
