//! # Response Module
//!
//! The fully buffered HTTP response: a status code, a header map, and a
//! complete body. Responses are materialized in full before they are written
//! to the socket; there is no streaming body support.
//!
//! Builders cover the shapes the conductor and the built-in servants need:
//! JSON payloads, plain text, HTML, empty 204s, and the JSON error bodies
//! described by the error taxonomy (400/403/404/500).

use std::collections::HashMap;

use serde_json::{json, Value};

/// Reason phrase for a status code, for the response status line.
pub(crate) fn status_reason(status: u16) -> &'static str {
    match status {
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "OK",
    }
}

/// A fully-formed HTTP response.
///
/// Invariants maintained at serialization time: `Content-Length` always
/// equals the body byte length, and `Content-Type` is present whenever the
/// body is non-empty (builders set it; `application/octet-stream` is the
/// fallback for bodies built by hand).
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code (200, 404, 500, ...)
    pub status: u16,
    /// Response headers; `Content-Length` is managed by the serializer.
    pub headers: HashMap<String, String>,
    /// Complete response body.
    pub body: Vec<u8>,
}

impl Response {
    /// An empty response with the given status and no body.
    pub fn new(status: u16) -> Self {
        Response {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    /// A JSON response; the value is serialized into the body.
    pub fn json(status: u16, value: &Value) -> Self {
        let mut resp = Response::new(status);
        resp.headers
            .insert("Content-Type".into(), "application/json".into());
        resp.body = serde_json::to_vec(value).unwrap_or_default();
        resp
    }

    /// A `text/plain` response.
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        let mut resp = Response::new(status);
        resp.headers
            .insert("Content-Type".into(), "text/plain".into());
        resp.body = body.into().into_bytes();
        resp
    }

    /// A `text/html` response.
    pub fn html(status: u16, body: impl Into<String>) -> Self {
        let mut resp = Response::new(status);
        resp.headers
            .insert("Content-Type".into(), "text/html".into());
        resp.body = body.into().into_bytes();
        resp
    }

    /// A 204 with `Content-Length: 0`, as answered to OPTIONS pre-flights.
    pub fn no_content() -> Self {
        Response::new(204)
    }

    /// 400 with a JSON `{reason}` body (malformed-request taxonomy).
    pub fn bad_request(reason: impl Into<String>) -> Self {
        Response::json(400, &json!({ "reason": reason.into() }))
    }

    /// 404 with a JSON `{path, reason}` body (routing-miss taxonomy).
    pub fn not_found(path: &str) -> Self {
        Response::json(404, &json!({ "path": path, "reason": "not found" }))
    }

    /// 403 with a JSON `{reason}` body (resource-forbidden taxonomy).
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Response::json(403, &json!({ "reason": reason.into() }))
    }

    /// 500 with a JSON `{reason}` body (handler-failure taxonomy).
    pub fn internal_error(reason: impl Into<String>) -> Self {
        Response::json(500, &json!({ "reason": reason.into() }))
    }

    /// Add or replace a header, builder-style.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers.keys().any(|k| k.eq_ignore_ascii_case(name))
    }

    /// Serialize status line, headers, and body into wire bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = format!(
            "HTTP/1.1 {} {}\r\n",
            self.status,
            status_reason(self.status)
        )
        .into_bytes();
        for (name, value) in &self.headers {
            if name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        if !self.body.is_empty() && !self.has_header("content-type") {
            out.extend_from_slice(b"Content-Type: application/octet-stream\r\n");
        }
        out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", self.body.len()).as_bytes());
        out.extend_from_slice(&self.body);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_reason() {
        assert_eq!(status_reason(200), "OK");
        assert_eq!(status_reason(404), "Not Found");
        assert_eq!(status_reason(101), "Switching Protocols");
    }

    #[test]
    fn test_content_length_matches_body() {
        let resp = Response::text(200, "hello");
        let raw = String::from_utf8(resp.to_bytes()).unwrap();
        assert!(raw.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(raw.contains("Content-Length: 5\r\n"));
        assert!(raw.ends_with("\r\n\r\nhello"));
    }

    #[test]
    fn test_no_content_has_zero_length() {
        let raw = String::from_utf8(Response::no_content().to_bytes()).unwrap();
        assert!(raw.contains("Content-Length: 0\r\n"));
        assert!(!raw.contains("Content-Type"));
    }

    #[test]
    fn test_error_bodies_are_json() {
        let resp = Response::not_found("/missing");
        let v: Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(v["path"], "/missing");
        assert_eq!(
            resp.headers.get("Content-Type").map(String::as_str),
            Some("application/json")
        );
    }
}
