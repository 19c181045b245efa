//! Cooperative worker (SPEC_FULL.md §4.3, C4): a `tokio` current-thread
//! runtime, one task per accepted connection bounded by a semaphore sized
//! to `worker_connections`, a dedicated heartbeat task, and a dedicated
//! signal-polling task — the "acceptor / signals / heartbeat as separate
//! scheduler tasks" split the spec mandates, with graceful stop
//! cancelling the acceptor first.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener as TokioTcpListener, TcpStream, UnixListener as TokioUnixListener, UnixStream};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use warden_core::ConfigSnapshot;
use warden_http::request::parse_headers;
use warden_http::{AppHandler, HttpError, Response};
use warden_liveness::LivenessCounter;

use crate::access_log::{AccessLog, AccessRecord};
use crate::context::WorkerContext;
use crate::error::WorkerError;
use crate::listener::Listener;

/// A bound listener handed to the `tokio` accept loop — TCP or Unix
/// domain, mirroring `crate::listener::Listener` on the async side
/// (SPEC_FULL.md §3: `--bind unix:` is worker-class-agnostic).
enum AsyncListener {
    Tcp(TokioTcpListener),
    Unix(TokioUnixListener),
}

impl AsyncListener {
    async fn accept(&self) -> std::io::Result<AsyncConn> {
        match self {
            Self::Tcp(l) => l.accept().await.map(|(s, _)| AsyncConn::Tcp(s)),
            Self::Unix(l) => l.accept().await.map(|(s, _)| AsyncConn::Unix(s)),
        }
    }
}

/// An accepted connection, TCP or Unix domain.
enum AsyncConn {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl AsyncConn {
    /// A Unix domain peer has no meaningful socket address.
    fn peer_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Tcp(s) => s.peer_addr().ok(),
            Self::Unix(_) => None,
        }
    }
}

pub fn run(ctx: WorkerContext) -> Result<(), WorkerError> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(WorkerError::Io)?;
    rt.block_on(run_async(ctx))
}

async fn run_async(ctx: WorkerContext) -> Result<(), WorkerError> {
    let WorkerContext {
        listeners,
        liveness,
        app,
        config,
        original_parent_pid,
    } = ctx;
    let liveness = Arc::new(liveness);

    let mut tokio_listeners = Vec::new();
    for listener in listeners {
        listener.set_nonblocking(true).map_err(WorkerError::Bind)?;
        match listener {
            Listener::Tcp(l) => {
                tokio_listeners.push(AsyncListener::Tcp(
                    TokioTcpListener::from_std(l).map_err(WorkerError::Bind)?,
                ));
            }
            Listener::Unix(l) => {
                tokio_listeners.push(AsyncListener::Unix(
                    TokioUnixListener::from_std(l).map_err(WorkerError::Bind)?,
                ));
            }
        }
    }

    let access_log = Arc::new(Mutex::new(
        AccessLog::open(config.access_logfile.as_ref()).map_err(WorkerError::Io)?,
    ));

    let semaphore = Arc::new(Semaphore::new(config.worker_connections as usize));
    // Cancelled once to stop the acceptor (SPEC_FULL.md §4.3: "graceful
    // stop cancels the acceptor first").
    let acceptor_stop = CancellationToken::new();
    // Cancelled to tear down immediately, including in-flight requests.
    let immediate_stop = CancellationToken::new();

    let heartbeat = tokio::spawn(heartbeat_task(
        liveness.clone(),
        config.heartbeat_interval(),
        original_parent_pid,
        acceptor_stop.clone(),
        immediate_stop.clone(),
    ));
    let signals = tokio::spawn(signal_task(
        acceptor_stop.clone(),
        immediate_stop.clone(),
        access_log.clone(),
    ));

    let accept_result = accept_loop(
        tokio_listeners,
        app,
        config.clone(),
        semaphore.clone(),
        acceptor_stop.clone(),
        immediate_stop.clone(),
        access_log.clone(),
    )
    .await;

    acceptor_stop.cancel();
    heartbeat.abort();
    signals.abort();

    let total_permits = config.worker_connections as u32;
    let drain = tokio::time::timeout(Duration::from_secs(config.graceful_timeout), async {
        let _ = semaphore.acquire_many(total_permits.max(1)).await;
    });
    if drain.await.is_err() {
        warn!("graceful_timeout elapsed with requests still in flight");
    }

    accept_result
}

async fn heartbeat_task(
    liveness: Arc<LivenessCounter>,
    interval: Duration,
    original_parent_pid: i32,
    acceptor_stop: CancellationToken,
    immediate_stop: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = immediate_stop.cancelled() => return,
            _ = ticker.tick() => {
                liveness.notify();
                if nix::unistd::getppid().as_raw() != original_parent_pid {
                    info!("parent pid changed, stopping acceptor");
                    acceptor_stop.cancel();
                    return;
                }
            }
        }
    }
}

/// Drives the small set of signal streams a worker honors on its own
/// task, since the raw OS handler used by the sync worker cannot safely
/// touch scheduler primitives (SPEC_FULL.md §9).
async fn signal_task(
    acceptor_stop: CancellationToken,
    immediate_stop: CancellationToken,
    access_log: Arc<Mutex<AccessLog>>,
) {
    let mut quit = match signal(SignalKind::quit()) {
        Ok(s) => s,
        Err(e) => {
            warn!("failed to install SIGQUIT handler: {e}");
            return;
        }
    };
    let mut term = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!("failed to install SIGTERM handler: {e}");
            return;
        }
    };
    let mut int = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            warn!("failed to install SIGINT handler: {e}");
            return;
        }
    };
    let mut usr1 = match signal(SignalKind::user_defined1()) {
        Ok(s) => s,
        Err(e) => {
            warn!("failed to install SIGUSR1 handler: {e}");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = immediate_stop.cancelled() => return,
            _ = quit.recv() => {
                info!("graceful stop requested");
                acceptor_stop.cancel();
            }
            _ = term.recv() => {
                info!("graceful stop (short budget) requested");
                acceptor_stop.cancel();
            }
            _ = int.recv() => {
                info!("immediate stop requested");
                acceptor_stop.cancel();
                immediate_stop.cancel();
                return;
            }
            _ = usr1.recv() => {
                debug!("reopening access log");
                if let Ok(mut log) = access_log.lock() {
                    log.reopen();
                }
            }
        }
    }
}

/// Fans multiple listeners into a single stream of accepted connections:
/// one small task per listener forwards onto a shared channel, so the
/// main accept loop only ever awaits one receiver regardless of how many
/// `--bind` addresses were configured.
async fn accept_loop(
    listeners: Vec<AsyncListener>,
    app: Arc<dyn AppHandler>,
    config: Arc<ConfigSnapshot>,
    semaphore: Arc<Semaphore>,
    acceptor_stop: CancellationToken,
    immediate_stop: CancellationToken,
    access_log: Arc<Mutex<AccessLog>>,
) -> Result<(), WorkerError> {
    let (tx, mut rx) = tokio::sync::mpsc::channel(16);
    let mut accept_tasks = Vec::new();
    for listener in listeners {
        let tx = tx.clone();
        let stop = acceptor_stop.clone();
        accept_tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.cancelled() => return,
                    result = listener.accept() => {
                        if tx.send(result).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }));
    }
    drop(tx);

    let outcome = run_accept_loop(
        &mut rx,
        app,
        config,
        semaphore,
        acceptor_stop,
        immediate_stop,
        access_log,
    )
    .await;
    for task in &accept_tasks {
        task.abort();
    }
    outcome
}

async fn run_accept_loop(
    rx: &mut tokio::sync::mpsc::Receiver<std::io::Result<AsyncConn>>,
    app: Arc<dyn AppHandler>,
    config: Arc<ConfigSnapshot>,
    semaphore: Arc<Semaphore>,
    acceptor_stop: CancellationToken,
    immediate_stop: CancellationToken,
    access_log: Arc<Mutex<AccessLog>>,
) -> Result<(), WorkerError> {
    let mut requests_served: u32 = 0;
    loop {
        let accepted = tokio::select! {
            _ = acceptor_stop.cancelled() => return Ok(()),
            maybe = rx.recv() => match maybe {
                Some(result) => result,
                None => return Ok(()),
            },
        };
        let conn = match accepted {
            Ok(conn) => conn,
            Err(e) => return Err(WorkerError::Accept(e)),
        };

        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            return Ok(());
        };
        let app = app.clone();
        let keep_alive = Duration::from_secs(config.keep_alive);
        let cancel = immediate_stop.clone();
        let access_log = access_log.clone();
        let remote_addr = conn.peer_addr();
        tokio::spawn(async move {
            let _permit = permit;
            let result = match conn {
                AsyncConn::Tcp(s) => {
                    serve_connection(app.as_ref(), s, remote_addr, keep_alive, cancel, access_log).await
                }
                AsyncConn::Unix(s) => {
                    serve_connection(app.as_ref(), s, remote_addr, keep_alive, cancel, access_log).await
                }
            };
            if let Err(e) = result {
                warn!("connection error: {e}");
            }
        });

        requests_served += 1;
        if config.max_requests > 0 && requests_served >= config.max_requests {
            info!("max_requests reached, recycling worker");
            return Ok(());
        }
    }
}

async fn serve_connection<S>(
    app: &dyn AppHandler,
    mut stream: S,
    remote_addr: Option<SocketAddr>,
    keep_alive: Duration,
    cancel: CancellationToken,
    access_log: Arc<Mutex<AccessLog>>,
) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    loop {
        let started = Instant::now();
        let req = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            result = tokio::time::timeout(keep_alive, read_request(&mut stream)) => {
                match result {
                    Ok(inner) => inner?,
                    Err(_) => return Ok(()),
                }
            }
        };
        let Some(req) = req else {
            return Ok(());
        };

        let close = req.should_close();
        let response = match app.handle(&req).await {
            Ok(resp) => resp,
            Err(e) => {
                warn!("application error: {e}");
                Response::internal_error()
            }
        };
        let wire = response.to_wire(close);
        stream.write_all(&wire).await?;
        if let Ok(mut log) = access_log.lock() {
            log.log(&AccessRecord {
                remote_addr,
                method: req.method.as_str(),
                path: &req.path,
                status: response.status,
                bytes: wire.len(),
                duration: started.elapsed(),
            });
        }
        if close {
            return Ok(());
        }
    }
}

async fn read_request<S>(stream: &mut S) -> std::io::Result<Option<warden_http::Request>>
where
    S: AsyncRead + Unpin,
{
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
                    stream.read_exact(rest).await?;
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

        let n = stream.read(&mut chunk).await?;
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
    use std::io::{Read as _, Write as _};

    use warden_http::EchoApp;

    use crate::listener::Listener;

    #[tokio::test]
    async fn serves_one_request_then_closes_on_connection_header() {
        let addr = warden_core::BindAddress::parse("127.0.0.1:0").unwrap();
        let listener = Listener::bind(&addr).unwrap();
        let port = match &listener {
            Listener::Tcp(tcp) => tcp.local_addr().unwrap().port(),
            Listener::Unix(_) => panic!("expected tcp"),
        };
        listener.set_nonblocking(true).unwrap();
        let Listener::Tcp(std_tcp) = listener else {
            panic!("expected tcp")
        };
        let tokio_listener = TokioTcpListener::from_std(std_tcp).unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = tokio_listener.accept().await.unwrap();
            let access_log = Arc::new(Mutex::new(AccessLog::open(None).unwrap()));
            serve_connection(
                &EchoApp,
                stream,
                None,
                Duration::from_secs(1),
                CancellationToken::new(),
                access_log,
            )
            .await
            .unwrap();
        });

        let client = tokio::task::spawn_blocking(move || {
            let mut client = std::net::TcpStream::connect(("127.0.0.1", port)).unwrap();
            client
                .write_all(b"GET /async HTTP/1.1\r\nConnection: close\r\n\r\n")
                .unwrap();
            let mut response = Vec::new();
            client.read_to_end(&mut response).unwrap();
            String::from_utf8(response).unwrap()
        })
        .await
        .unwrap();

        server.await.unwrap();
        assert!(client.starts_with("HTTP/1.1 200"));
        assert!(client.ends_with("GET /async\n"));
    }

    #[tokio::test]
    async fn serves_one_request_over_a_unix_listener() {
        use std::os::unix::net::UnixStream as StdUnixStream;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("async.sock");
        let addr = warden_core::BindAddress::Unix(path.clone());
        let listener = Listener::bind(&addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let Listener::Unix(std_unix) = listener else {
            panic!("expected unix")
        };
        let tokio_listener = TokioUnixListener::from_std(std_unix).unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = tokio_listener.accept().await.unwrap();
            let access_log = Arc::new(Mutex::new(AccessLog::open(None).unwrap()));
            serve_connection(
                &EchoApp,
                stream,
                None,
                Duration::from_secs(1),
                CancellationToken::new(),
                access_log,
            )
            .await
            .unwrap();
        });

        let client = tokio::task::spawn_blocking(move || {
            let mut client = StdUnixStream::connect(&path).unwrap();
            client
                .write_all(b"GET /async HTTP/1.1\r\nConnection: close\r\n\r\n")
                .unwrap();
            let mut response = Vec::new();
            client.read_to_end(&mut response).unwrap();
            String::from_utf8(response).unwrap()
        })
        .await
        .unwrap();

        server.await.unwrap();
        assert!(client.starts_with("HTTP/1.1 200"));
        assert!(client.ends_with("GET /async\n"));
    }
}
