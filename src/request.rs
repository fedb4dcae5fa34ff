//! # Request Module
//!
//! The two request representations used by the pipeline:
//!
//! - [`RequestContext`]: the mutable, per-connection assembly state built
//!   from the byte stream (head fields plus the accumulating body buffer).
//!   Owned by the assembler, consumed exactly once by the conductor.
//! - [`Request`]: the immutable object handed to handlers and middleware
//!   once routing has resolved: decoded URI, routing path, the unmatched
//!   `remaining` tail, parameters, and a case-insensitive header view.

use std::borrow::Cow;
use std::collections::HashMap;

use http::Method;
use percent_encoding::percent_decode_str;

/// Parse a raw query string into a parameter map.
///
/// Duplicate keys keep the last value; empty keys are dropped.
pub fn parse_query_params(raw_query: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(raw_query.as_bytes())
        .filter(|(k, _)| !k.is_empty())
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Percent-decode a request URI into UTF-8.
///
/// Returns `None` when the decoded bytes are not valid UTF-8, which the
/// conductor treats as a malformed request.
pub fn decode_uri(raw: &str) -> Option<String> {
    percent_decode_str(raw)
        .decode_utf8()
        .ok()
        .map(Cow::into_owned)
}

/// Assembly state for one in-flight HTTP message.
///
/// Created when a request head is parsed, finalized when the body buffer
/// holds everything the connection delivered for this message.
#[derive(Debug)]
pub struct RequestContext {
    /// HTTP method.
    pub method: Method,
    /// Fully decoded request URI (path plus query).
    pub uri: String,
    /// Decoded URI up to the first `?`; the path used for routing.
    pub path: String,
    /// Query parameters (duplicates: last wins, empty keys dropped).
    pub query_params: HashMap<String, String>,
    /// Headers with lowercased names.
    pub headers: HashMap<String, String>,
    /// Accumulated body bytes.
    pub body: Vec<u8>,
    /// Declared `Content-Length`, when the head carried one.
    pub declared_length: Option<usize>,
}

impl RequestContext {
    /// Case-insensitive header lookup (names are stored lowercased).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Whether the head asks for a WebSocket upgrade
    /// (`Connection: Upgrade` and `Upgrade: websocket`, both case-insensitive,
    /// the former possibly part of a token list).
    pub fn is_upgrade(&self) -> bool {
        let conn_upgrade = self
            .header("connection")
            .map(|v| {
                v.split(',')
                    .any(|tok| tok.trim().eq_ignore_ascii_case("upgrade"))
            })
            .unwrap_or(false);
        let ws_upgrade = self
            .header("upgrade")
            .map(|v| v.trim().eq_ignore_ascii_case("websocket"))
            .unwrap_or(false);
        conn_upgrade && ws_upgrade
    }

    /// Whether the peer asked to close the connection after this exchange.
    pub fn wants_close(&self) -> bool {
        self.header("connection")
            .map(|v| {
                v.split(',')
                    .any(|tok| tok.trim().eq_ignore_ascii_case("close"))
            })
            .unwrap_or(false)
    }
}

/// The immutable request object handed to handlers.
#[derive(Debug, Clone)]
pub struct Request {
    /// Full decoded URI, query included.
    pub uri: String,
    /// Decoded path used for routing.
    pub path: String,
    /// The suffix beyond the matched route; empty when fully consumed.
    pub remaining: String,
    /// HTTP method.
    pub method: Method,
    /// Complete body bytes.
    pub body: Vec<u8>,
    /// Parameters captured by `:name` segments along the matched route.
    pub path_params: HashMap<String, String>,
    /// Query parameters.
    pub query_params: HashMap<String, String>,
    headers: HashMap<String, String>,
}

impl Request {
    /// Build the handler-facing request from a finalized context and the
    /// routing result.
    pub(crate) fn from_context(
        ctx: &RequestContext,
        path_params: HashMap<String, String>,
        remaining: String,
    ) -> Self {
        Request {
            uri: ctx.uri.clone(),
            path: ctx.path.clone(),
            remaining,
            method: ctx.method.clone(),
            body: ctx.body.clone(),
            path_params,
            query_params: ctx.query_params.clone(),
            headers: ctx.headers.clone(),
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// The body interpreted as UTF-8, lossily.
    pub fn body_utf8(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// A path parameter captured during routing.
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    /// A query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context_with_headers(pairs: &[(&str, &str)]) -> RequestContext {
        RequestContext {
            method: Method::GET,
            uri: "/".into(),
            path: "/".into(),
            query_params: HashMap::new(),
            headers: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: Vec::new(),
            declared_length: None,
        }
    }

    #[test]
    fn test_parse_query_params() {
        let q = parse_query_params("x=1&y=2");
        assert_eq!(q.get("x"), Some(&"1".to_string()));
        assert_eq!(q.get("y"), Some(&"2".to_string()));
    }

    #[test]
    fn test_query_duplicates_last_wins() {
        let q = parse_query_params("limit=10&limit=20");
        assert_eq!(q.get("limit"), Some(&"20".to_string()));
    }

    #[test]
    fn test_query_empty_keys_dropped() {
        let q = parse_query_params("=orphan&a=1");
        assert_eq!(q.len(), 1);
        assert_eq!(q.get("a"), Some(&"1".to_string()));
    }

    #[test]
    fn test_decode_uri() {
        assert_eq!(decode_uri("/v/Alice%20Smith"), Some("/v/Alice Smith".into()));
        assert_eq!(decode_uri("/bad%FF%FE"), None);
    }

    #[test]
    fn test_upgrade_detection() {
        let ctx = context_with_headers(&[("connection", "Upgrade"), ("upgrade", "WebSocket")]);
        assert!(ctx.is_upgrade());
        let ctx = context_with_headers(&[("connection", "keep-alive, Upgrade"), ("upgrade", "websocket")]);
        assert!(ctx.is_upgrade());
        let ctx = context_with_headers(&[("connection", "keep-alive")]);
        assert!(!ctx.is_upgrade());
    }
}
