//! A minimal HTTP/1.1 response: status line, headers, and a sequence of
//! body chunks (SPEC_FULL.md §6: "the application returns a lazy
//! sequence of byte chunks").

use bytes::Bytes;

#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<Bytes>,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, chunk: impl Into<Bytes>) -> Self {
        self.body.push(chunk.into());
        self
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        let body: String = body.into();
        Self::new(status)
            .with_header("Content-Type", "text/plain; charset=utf-8")
            .with_body(body)
    }

    pub fn internal_error() -> Self {
        Self::text(500, "Internal Server Error")
    }

    fn reason_phrase(status: u16) -> &'static str {
        match status {
            200 => "OK",
            204 => "No Content",
            400 => "Bad Request",
            404 => "Not Found",
            500 => "Internal Server Error",
            _ => "",
        }
    }

    fn content_length(&self) -> usize {
        self.body.iter().map(Bytes::len).sum()
    }

    /// Serialize the status line, headers (including a computed
    /// `Content-Length`), and body onto the wire.
    ///
    /// An empty body still produces the single 0-byte chunk boundary
    /// (SPEC_FULL.md §8: "App returns empty body: a single 0-byte chunk
    /// is written") by emitting `Content-Length: 0` and no body bytes.
    pub fn to_wire(&self, close: bool) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status,
                Self::reason_phrase(self.status)
            )
            .as_bytes(),
        );
        for (name, value) in &self.headers {
            out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        out.extend_from_slice(format!("Content-Length: {}\r\n", self.content_length()).as_bytes());
        if close {
            out.extend_from_slice(b"Connection: close\r\n");
        }
        out.extend_from_slice(b"\r\n");
        for chunk in &self.body {
            out.extend_from_slice(chunk);
        }
        out
    }
}
