//! WSGI-style environ construction (SPEC_FULL.md §6: "the worker calls
//! the application with a mapping of request metadata"), grounded on
//! gunicorn's own `WSGIRequest.handle_header`: most headers become
//! `HTTP_<NAME>` keys, `Content-Type`/`Content-Length` are special-cased
//! without the prefix, and the `X-Forwarded-*` family adjusts
//! `url_scheme`.

use std::collections::BTreeMap;

use crate::request::Request;

pub const SERVER_SOFTWARE: &str = "warden/0.1";

pub fn build(req: &Request) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    env.insert("REQUEST_METHOD".into(), req.method.as_str().into());
    env.insert("PATH_INFO".into(), req.path.clone());
    env.insert("SERVER_PROTOCOL".into(), format!("HTTP/1.{}", req.version_minor));
    env.insert("SERVER_SOFTWARE".into(), SERVER_SOFTWARE.into());
    env.insert("wsgi.url_scheme".into(), "http".into());

    for (name, value) in &req.headers {
        let upper = name.to_ascii_uppercase();
        match upper.as_str() {
            "CONTENT-TYPE" => {
                env.insert("CONTENT_TYPE".into(), value.clone());
            }
            "CONTENT-LENGTH" => {
                env.insert("CONTENT_LENGTH".into(), value.clone());
            }
            "HOST" => {
                env.insert("SERVER_NAME".into(), value.clone());
            }
            "X-FORWARDED-PROTOCOL" if value.eq_ignore_ascii_case("ssl") => {
                env.insert("wsgi.url_scheme".into(), "https".into());
            }
            "X-FORWARDED-SSL" if value.eq_ignore_ascii_case("on") => {
                env.insert("wsgi.url_scheme".into(), "https".into());
            }
            _ => {
                let key = format!("HTTP_{}", upper.replace('-', "_"));
                env.insert(key, value.clone());
            }
        }
    }

    env
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::parse_headers;

    #[test]
    fn maps_ordinary_headers_with_http_prefix() {
        let raw = b"GET / HTTP/1.1\r\nX-Request-Id: abc\r\n\r\n";
        let (req, _) = parse_headers(raw).unwrap().unwrap();
        let env = build(&req);
        assert_eq!(env.get("HTTP_X_REQUEST_ID").map(String::as_str), Some("abc"));
    }

    #[test]
    fn content_type_and_length_are_not_http_prefixed() {
        let raw = b"POST / HTTP/1.1\r\nContent-Type: text/plain\r\nContent-Length: 4\r\n\r\n";
        let (req, _) = parse_headers(raw).unwrap().unwrap();
        let env = build(&req);
        assert_eq!(env.get("CONTENT_TYPE").map(String::as_str), Some("text/plain"));
        assert_eq!(env.get("CONTENT_LENGTH").map(String::as_str), Some("4"));
        assert!(!env.contains_key("HTTP_CONTENT_TYPE"));
    }

    #[test]
    fn forwarded_ssl_upgrades_url_scheme() {
        let raw = b"GET / HTTP/1.1\r\nX-Forwarded-Ssl: on\r\n\r\n";
        let (req, _) = parse_headers(raw).unwrap().unwrap();
        let env = build(&req);
        assert_eq!(env.get("wsgi.url_scheme").map(String::as_str), Some("https"));
    }

    #[test]
    fn default_url_scheme_is_http() {
        let raw = b"GET / HTTP/1.1\r\n\r\n";
        let (req, _) = parse_headers(raw).unwrap().unwrap();
        let env = build(&req);
        assert_eq!(env.get("wsgi.url_scheme").map(String::as_str), Some("http"));
    }
}
