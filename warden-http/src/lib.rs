//! The external contracts used by a worker's per-request loop
//! (SPEC_FULL.md §4.2, §6, §7, C7): a minimal HTTP/1.1 request parser, a
//! WSGI-style environ mapping, the application callable trait, and a
//! `sendfile(2)` wrapper.
//!
//! None of this is a production-grade HTTP implementation — chunked
//! transfer-encoding and trailers are not supported — it is the minimum
//! needed to drive the worker loop end to end and to give the arbiter
//! something real to supervise in tests.

pub mod app;
pub mod environ;
pub mod error;
pub mod request;
pub mod response;
pub mod sendfile;

pub use app::{AppHandler, EchoApp};
pub use error::{AppError, HttpError};
pub use request::{Method, Request};
pub use response::Response;
