//! Error types for the HTTP parsing and application-callable contracts.

/// Errors from parsing an HTTP/1.1 request (SPEC_FULL.md §1: "the
/// HTTP/1.1 wire parser ... only their contracts are specified").
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("malformed request line: {0:?}")]
    MalformedRequestLine(String),

    #[error("unsupported HTTP method: {0:?}")]
    UnsupportedMethod(String),

    #[error("unsupported HTTP version: {0:?}")]
    UnsupportedVersion(String),

    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),

    #[error("request exceeds the maximum header size")]
    HeadersTooLarge,

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the application callable (SPEC_FULL.md §6, §7).
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("application handler failed: {0}")]
    Handler(String),
}
