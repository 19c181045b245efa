//! Worker-side error taxonomy (SPEC_FULL.md §4.9, §7).

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("bind failed: {0}")]
    Bind(#[source] std::io::Error),

    #[error("poll failed: {0}")]
    Poll(#[source] std::io::Error),

    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    #[error("application error: {0}")]
    App(#[from] warden_http::AppError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
