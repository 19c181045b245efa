//! The application callable contract (SPEC_FULL.md §6: "the worker calls
//! the application once per request with the environ and a way to start
//! the response; the application returns a lazy sequence of byte
//! chunks"). Modeled as an object-safe async trait, the same shape the
//! sandbox's guest-facing command contract uses for its handlers.

use async_trait::async_trait;

use crate::error::AppError;
use crate::request::Request;
use crate::response::Response;

#[async_trait]
pub trait AppHandler: Send + Sync {
    async fn handle(&self, req: &Request) -> Result<Response, AppError>;
}

/// A reference application used by tests and the demo binary: it echoes
/// the request path and method back as a plain-text body.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoApp;

#[async_trait]
impl AppHandler for EchoApp {
    async fn handle(&self, req: &Request) -> Result<Response, AppError> {
        Ok(Response::text(
            200,
            format!("{} {}\n", req.method.as_str(), req.path),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::parse_headers;

    #[tokio::test]
    async fn echo_app_reports_method_and_path() {
        let raw = b"GET /status HTTP/1.1\r\n\r\n";
        let (req, _) = parse_headers(raw).unwrap().unwrap();
        let resp = EchoApp.handle(&req).await.unwrap();
        assert_eq!(resp.status, 200);
        let wire = resp.to_wire(false);
        let text = String::from_utf8(wire).unwrap();
        assert!(text.ends_with("GET /status\n"));
    }
}
