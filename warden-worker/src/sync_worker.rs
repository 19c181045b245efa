//! The synchronous worker loop (SPEC_FULL.md §4.2, C4).

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use warden_core::WorkerSignal;
use warden_http::request::parse_headers;
use warden_http::{HttpError, Response};

use crate::access_log::{AccessLog, AccessRecord};
use crate::context::WorkerContext;
use crate::error::WorkerError;
use crate::listener::{poll_readable, Connection};
use crate::signals;

/// Run the worker to completion. Returns `Ok(())` on a clean exit
/// (graceful stop, orphaned, or request-count recycle); any propagated
/// error means the worker crashed and the arbiter should respawn it.
pub fn run(ctx: WorkerContext) -> Result<(), WorkerError> {
    signals::install();
    for listener in &ctx.listeners {
        listener.set_nonblocking(true).map_err(WorkerError::Bind)?;
    }

    // Building one current-thread tokio runtime up front keeps the
    // per-request `AppHandler::handle` future driveable without paying
    // for a fresh executor on every request.
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .map_err(WorkerError::Io)?;

    let heartbeat_interval = ctx.config.heartbeat_interval();
    let max_requests = ctx.config.max_requests;
    let keep_alive = Duration::from_secs(ctx.config.keep_alive);
    let mut requests_served: u32 = 0;
    let mut access_log = AccessLog::open(ctx.config.access_logfile.as_ref()).map_err(WorkerError::Io)?;

    loop {
        ctx.liveness.notify();

        if orphaned(ctx.original_parent_pid) {
            info!("parent pid changed, exiting");
            return Ok(());
        }

        for signal in signals::drain() {
            match signal {
                WorkerSignal::Immediate => {
                    info!("immediate stop requested");
                    return Ok(());
                }
                WorkerSignal::Graceful | WorkerSignal::GracefulShort => {
                    info!("graceful stop requested, finishing current cycle");
                    return Ok(());
                }
                WorkerSignal::ReopenLogs => {
                    debug!("reopening access log");
                    access_log.reopen();
                }
            }
        }

        let Some(idx) = poll_readable(&ctx.listeners, heartbeat_interval).map_err(WorkerError::Poll)? else {
            continue;
        };

        let Some(listener) = ctx.listeners.get(idx) else {
            continue;
        };
        let conn = match listener.accept() {
            Ok(conn) => conn,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(WorkerError::Accept(e)),
        };

        if let Err(e) = serve_connection(&rt, ctx.app.as_ref(), conn, keep_alive, &mut access_log) {
            warn!("connection error: {e}");
        }

        requests_served += 1;
        if max_requests > 0 && requests_served >= max_requests {
            info!("max_requests reached, recycling worker");
            return Ok(());
        }
    }
}

fn orphaned(original_parent_pid: i32) -> bool {
    nix::unistd::getppid().as_raw() != original_parent_pid
}

/// Serve requests on one connection until it closes, the client asks to
/// close, or the keep-alive idle bound elapses.
fn serve_connection(
    rt: &tokio::runtime::Runtime,
    app: &dyn warden_http::AppHandler,
    mut conn: Connection,
    keep_alive: Duration,
    access_log: &mut AccessLog,
) -> std::io::Result<()> {
    let remote_addr = conn.peer_addr();
    loop {
        conn.set_read_timeout(Some(keep_alive))?;
        let started = Instant::now();
        let req = match read_request(&mut conn) {
            Ok(Some(req)) => req,
            Ok(None) => return Ok(()),
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                return Ok(())
            }
            Err(e) => return Err(e),
        };

        let close = req.should_close();
        let response = match rt.block_on(app.handle(&req)) {
            Ok(resp) => resp,
            Err(e) => {
                warn!("application error: {e}");
                Response::internal_error()
            }
        };
        let wire = response.to_wire(close);
        conn.write_all(&wire)?;
        access_log.log(&AccessRecord {
            remote_addr,
            method: req.method.as_str(),
            path: &req.path,
            status: response.status,
            bytes: wire.len(),
            duration: started.elapsed(),
        });
        if close {
            return Ok(());
        }
    }
}

/// Read and parse one request's header block (plus body, if
/// `Content-Length` names one) from `conn`.
fn read_request(conn: &mut Connection) -> std::io::Result<Option<warden_http::Request>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8 * 1024];
    loop {
        match parse_headers(&buf) {
            Ok(Some((mut req, consumed))) => {
                let need = req.content_length();
                let mut body = buf.get(consumed..).unwrap_or(&[]).to_vec();
                let have = body.len();
                if have < need {
                    body.resize(need, 0);
                    let Some(rest) = body.get_mut(have..need) else {
                        return Err(std::io::Error::new(
                            std::io::ErrorKind::InvalidData,
                            "body buffer shrank unexpectedly",
                        ));
                    };
                    conn.read_exact(rest)?;
                } else {
                    body.truncate(need);
                }
                req.body = body;
                return Ok(Some(req));
            }
            Ok(None) => {}
            Err(HttpError::HeadersTooLarge) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "request exceeds the maximum header size",
                ));
            }
            Err(e) => {
                return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()));
            }
        }

        let n = conn.read(&mut chunk)?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed mid-request",
            ));
        }
        buf.extend_from_slice(chunk.get(..n).unwrap_or(&[]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpStream;
    use std::sync::Arc;

    use warden_core::ConfigSnapshot;
    use warden_http::EchoApp;
    use warden_liveness::LivenessCounter;

    use crate::listener::Listener;

    fn test_config() -> ConfigSnapshot {
        warden_core::RawConfig::default().into_snapshot(0).unwrap()
    }

    #[test]
    fn orphaned_detects_parent_pid_change() {
        assert!(!orphaned(nix::unistd::getppid().as_raw()));
        assert!(orphaned(999_999));
    }

    #[test]
    fn serves_one_request_over_the_inherited_listener() {
        let addr = warden_core::BindAddress::parse("127.0.0.1:0").unwrap();
        let listener = Listener::bind(&addr).unwrap();
        let port = match &listener {
            Listener::Tcp(tcp) => tcp.local_addr().unwrap().port(),
            Listener::Unix(_) => panic!("expected tcp"),
        };

        let handle = std::thread::spawn(move || {
            let mut ctx = WorkerContext {
                listeners: vec![listener],
                liveness: LivenessCounter::create_preferred().unwrap(),
                app: Arc::new(EchoApp),
                config: Arc::new(test_config()),
                original_parent_pid: nix::unistd::getppid().as_raw(),
            };
            ctx.listeners[0].set_nonblocking(true).unwrap();
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let conn = loop {
                if let Some(0) = poll_readable(&ctx.listeners, Duration::from_secs(2)).unwrap() {
                    break ctx.listeners[0].accept().unwrap();
                }
            };
            let mut access_log = AccessLog::open(None).unwrap();
            serve_connection(&rt, ctx.app.as_ref(), conn, Duration::from_secs(1), &mut access_log).unwrap();
        });

        let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
        client.write_all(b"GET /ping HTTP/1.1\r\nConnection: close\r\n\r\n").unwrap();
        let mut response = Vec::new();
        client.read_to_end(&mut response).unwrap();
        let text = String::from_utf8(response).unwrap();
        assert!(text.starts_with("HTTP/1.1 200"));
        assert!(text.ends_with("GET /ping\n"));
        handle.join().unwrap();
    }
}
