//! RFC 6455 opening handshake, server side.
//!
//! The request head has already been parsed and upgrade-detected by the
//! assembler; this module validates the WebSocket-specific headers,
//! derives the accept key, and produces the `101 Switching Protocols`
//! bytes. Subprotocols and extensions are never negotiated.

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};

use crate::request::RequestContext;

const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Derive the `Sec-WebSocket-Accept` value for a client key.
pub fn accept_key(sec_websocket_key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(sec_websocket_key.as_bytes());
    sha1.update(WS_GUID.as_bytes());
    BASE64_STANDARD.encode(sha1.finalize())
}

/// Validate the upgrade head and build the 101 response bytes.
///
/// Returns `Err` with a human-readable reason when the head is missing the
/// client key or advertises an unsupported protocol version; the caller
/// answers 400 in that case.
pub fn handshake_response(ctx: &RequestContext) -> Result<Vec<u8>, &'static str> {
    let key = ctx
        .header("sec-websocket-key")
        .ok_or("missing Sec-WebSocket-Key")?;
    if let Some(version) = ctx.header("sec-websocket-version") {
        if version.trim() != "13" {
            return Err("unsupported websocket version");
        }
    }
    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {}\r\n\r\n",
        accept_key(key.trim())
    );
    Ok(response.into_bytes())
}
