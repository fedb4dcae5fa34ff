//! Request assembly: turning the connection's byte stream into successive
//! [`RequestContext`]s, one per HTTP message.
//!
//! The assembler buffers until a full head (`\r\n\r\n`) is present, parses
//! it, then buffers body bytes up to the declared `Content-Length`. Heads
//! that ask for a WebSocket upgrade are handed back before any body
//! assembly so the connection can switch protocols.

use std::collections::HashMap;
use std::io::{self, Read};

use http::Method;
use may::net::TcpStream;
use tracing::warn;

use crate::request::{decode_uri, parse_query_params, RequestContext};

const READ_CHUNK: usize = 4096;
const MAX_HEAD_BYTES: usize = 16 * 1024;
const MAX_HEADERS: usize = 64;

/// A complete message, or a head that diverts to the upgrade path.
pub(crate) enum AssembledMessage {
    Request(RequestContext),
    Upgrade(RequestContext),
}

pub(crate) enum AssembleError {
    /// Transport failure; the connection is done.
    Io(io::Error),
    /// The peer sent something unparsable; answer 400 and close.
    Malformed(String),
}

/// Byte offset just past the `\r\n\r\n` terminating the head, if present.
fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

/// Per-connection assembly state. Owned by the connection's coroutine;
/// never shared across connections.
pub(crate) struct Assembler {
    buf: Vec<u8>,
}

impl Assembler {
    pub(crate) fn new() -> Self {
        Assembler { buf: Vec::new() }
    }

    /// Hand any buffered-but-unparsed bytes over, e.g. frames a client
    /// sent immediately after its upgrade head.
    pub(crate) fn take_buffered(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }

    /// Assemble the next message from the stream.
    ///
    /// Returns `Ok(None)` on a clean end of stream between messages.
    pub(crate) fn next_message(
        &mut self,
        stream: &mut TcpStream,
    ) -> Result<Option<AssembledMessage>, AssembleError> {
        loop {
            if let Some(head_len) = find_header_end(&self.buf) {
                return self.finish_message(stream, head_len).map(Some);
            }
            if self.buf.len() > MAX_HEAD_BYTES {
                return Err(AssembleError::Malformed("request head too large".into()));
            }
            let mut chunk = [0u8; READ_CHUNK];
            match stream.read(&mut chunk) {
                Ok(0) => {
                    if !self.buf.is_empty() {
                        warn!(buffered = self.buf.len(), "connection closed mid-head");
                    }
                    return Ok(None);
                }
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(e) => return Err(AssembleError::Io(e)),
            }
        }
    }

    fn finish_message(
        &mut self,
        stream: &mut TcpStream,
        head_len: usize,
    ) -> Result<AssembledMessage, AssembleError> {
        let mut header_storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut parsed = httparse::Request::new(&mut header_storage);
        match parsed.parse(&self.buf[..head_len]) {
            Ok(status) if status.is_complete() => {}
            Ok(_) => return Err(AssembleError::Malformed("partial request head".into())),
            Err(e) => return Err(AssembleError::Malformed(format!("invalid request head: {e}"))),
        }

        let method: Method = parsed
            .method
            .and_then(|m| m.parse().ok())
            .ok_or_else(|| AssembleError::Malformed("unsupported method".into()))?;
        let raw_uri = parsed
            .path
            .ok_or_else(|| AssembleError::Malformed("missing request target".into()))?
            .to_string();

        let headers: HashMap<String, String> = parsed
            .headers
            .iter()
            .map(|h| {
                (
                    h.name.to_ascii_lowercase(),
                    String::from_utf8_lossy(h.value).to_string(),
                )
            })
            .collect();

        // The URI is decoded first and the decoded form split at '?' for
        // the routing path; query parameters are parsed from the raw query
        // substring so values are decoded exactly once.
        let uri = decode_uri(&raw_uri)
            .ok_or_else(|| AssembleError::Malformed("request URI is not valid UTF-8".into()))?;
        let path = uri.split('?').next().unwrap_or("/").to_string();
        let query_params = match raw_uri.split_once('?') {
            Some((_, raw_query)) => parse_query_params(raw_query),
            None => HashMap::new(),
        };

        let declared_length = match headers.get("content-length") {
            Some(v) => Some(
                v.trim()
                    .parse::<usize>()
                    .map_err(|_| AssembleError::Malformed("invalid content-length".into()))?,
            ),
            None => None,
        };

        self.buf.drain(..head_len);

        let mut ctx = RequestContext {
            method,
            uri,
            path,
            query_params,
            headers,
            body: Vec::new(),
            declared_length,
        };

        if ctx.is_upgrade() {
            return Ok(AssembledMessage::Upgrade(ctx));
        }

        if let Some(declared) = declared_length {
            self.fill_body(stream, &mut ctx.body, declared)
                .map_err(AssembleError::Io)?;
        }
        Ok(AssembledMessage::Request(ctx))
    }

    /// Move up to `declared` body bytes into `body`, first from the buffer
    /// and then from the stream. Stops early at end of stream; the
    /// conductor turns the resulting length mismatch into a 400.
    fn fill_body(
        &mut self,
        stream: &mut TcpStream,
        body: &mut Vec<u8>,
        declared: usize,
    ) -> io::Result<()> {
        let from_buf = declared.min(self.buf.len());
        body.extend(self.buf.drain(..from_buf));
        let mut chunk = [0u8; READ_CHUNK];
        while body.len() < declared {
            let want = (declared - body.len()).min(READ_CHUNK);
            match stream.read(&mut chunk[..want]) {
                Ok(0) => break,
                Ok(n) => body.extend_from_slice(&chunk[..n]),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
