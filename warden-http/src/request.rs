//! A minimal HTTP/1.1 request-line/header parser.

use crate::error::HttpError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Options,
    Patch,
}

impl Method {
    fn parse(raw: &str) -> Result<Self, HttpError> {
        match raw {
            "GET" => Ok(Self::Get),
            "HEAD" => Ok(Self::Head),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            "OPTIONS" => Ok(Self::Options),
            "PATCH" => Ok(Self::Patch),
            other => Err(HttpError::UnsupportedMethod(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
            Self::Patch => "PATCH",
        }
    }
}

/// A parsed HTTP/1.1 request (headers only; the body is read separately
/// once `Content-Length` is known).
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub version_minor: u8,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_length(&self) -> usize {
        self.header("content-length")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Whether the connection should close after this response
    /// (SPEC_FULL.md §4.2 keep-alive contract): HTTP/1.0 defaults to
    /// close; HTTP/1.1 defaults to keep-alive unless `Connection: close`
    /// is present.
    pub fn should_close(&self) -> bool {
        match self.header("connection") {
            Some(v) if v.eq_ignore_ascii_case("close") => true,
            Some(v) if v.eq_ignore_ascii_case("keep-alive") => false,
            _ => self.version_minor == 0,
        }
    }

    /// Maps onto a WSGI-style environ (see [`crate::environ`]).
    pub fn environ(&self) -> std::collections::BTreeMap<String, String> {
        crate::environ::build(self)
    }
}

/// Parse the request line and headers out of `buf`.
///
/// Returns `Ok(None)` if the header block (`\r\n\r\n`) hasn't arrived
/// yet — the caller should read more bytes and retry. On success,
/// returns the parsed request (with an empty body) and the number of
/// bytes consumed from `buf` for the header block.
pub fn parse_headers(buf: &[u8]) -> Result<Option<(Request, usize)>, HttpError> {
    const MAX_HEADER_BYTES: usize = 64 * 1024;

    let Some(end) = find_double_crlf(buf) else {
        if buf.len() > MAX_HEADER_BYTES {
            return Err(HttpError::HeadersTooLarge);
        }
        return Ok(None);
    };

    let head_bytes = buf
        .get(..end)
        .ok_or_else(|| HttpError::MalformedRequestLine("truncated header block".into()))?;
    let head = std::str::from_utf8(head_bytes)
        .map_err(|_| HttpError::MalformedRequestLine("invalid utf-8".into()))?;
    let mut lines = head.split("\r\n");

    let request_line = lines
        .next()
        .ok_or_else(|| HttpError::MalformedRequestLine(String::new()))?;
    let mut parts = request_line.split(' ');
    let (method, path, version) = (
        parts.next(),
        parts.next(),
        parts.next(),
    );
    let (Some(method), Some(path), Some(version)) = (method, path, version) else {
        return Err(HttpError::MalformedRequestLine(request_line.to_string()));
    };
    let method = Method::parse(method)?;
    let version_minor = parse_version(version)?;

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| HttpError::MalformedHeader(line.to_string()))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    Ok(Some((
        Request {
            method,
            path: path.to_string(),
            version_minor,
            headers,
            body: Vec::new(),
        },
        end + 4,
    )))
}

fn parse_version(raw: &str) -> Result<u8, HttpError> {
    match raw {
        "HTTP/1.0" => Ok(0),
        "HTTP/1.1" => Ok(1),
        other => Err(HttpError::UnsupportedVersion(other.to_string())),
    }
}

fn find_double_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_simple_get() {
        let raw = b"GET /hello HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let (req, consumed) = parse_headers(raw).unwrap().unwrap();
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.path, "/hello");
        assert_eq!(req.version_minor, 1);
        assert_eq!(req.header("host"), Some("example.com"));
        assert_eq!(consumed, raw.len());
    }

    #[test]
    fn incomplete_headers_return_none() {
        let raw = b"GET /hello HTTP/1.1\r\nHost: example.com\r\n";
        assert!(parse_headers(raw).unwrap().is_none());
    }

    #[test]
    fn rejects_unknown_method() {
        let raw = b"FOO / HTTP/1.1\r\n\r\n";
        assert!(matches!(
            parse_headers(raw),
            Err(HttpError::UnsupportedMethod(_))
        ));
    }

    #[test]
    fn rejects_unsupported_version() {
        let raw = b"GET / HTTP/2.0\r\n\r\n";
        assert!(matches!(
            parse_headers(raw),
            Err(HttpError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn http_1_0_defaults_to_close() {
        let raw = b"GET / HTTP/1.0\r\n\r\n";
        let (req, _) = parse_headers(raw).unwrap().unwrap();
        assert!(req.should_close());
    }

    #[test]
    fn http_1_1_defaults_to_keep_alive() {
        let raw = b"GET / HTTP/1.1\r\n\r\n";
        let (req, _) = parse_headers(raw).unwrap().unwrap();
        assert!(!req.should_close());
    }

    #[test]
    fn connection_close_header_overrides_1_1_default() {
        let raw = b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n";
        let (req, _) = parse_headers(raw).unwrap().unwrap();
        assert!(req.should_close());
    }

    #[test]
    fn content_length_defaults_to_zero() {
        let raw = b"GET / HTTP/1.1\r\n\r\n";
        let (req, _) = parse_headers(raw).unwrap().unwrap();
        assert_eq!(req.content_length(), 0);
    }
}
