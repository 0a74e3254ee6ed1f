//! WebSocket opening handshake.
//!
//! The first bytes on a connection are an HTTP/1.1 request. Once the
//! header block (terminated by `\r\n\r\n`) is complete we either:
//! - answer an `Upgrade: websocket` request with `101 Switching Protocols`,
//! - or hand a plain HTTP request back to the caller (static files).
//!
//! ```text
//! Sec-WebSocket-Accept = Base64(SHA1(Sec-WebSocket-Key + GUID))
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};

use crate::error::HandshakeError;
use crate::wire_types::WEBSOCKET_GUID;

/// Upper bound on the request header block.
pub const MAX_HEADER_BYTES: usize = 8 * 1024;

pub const MAX_HEADERS: usize = 64;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    /// First header value matching `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// True if the `Upgrade` header lists `websocket`.
    pub fn is_websocket_upgrade(&self) -> bool {
        self.header("Upgrade")
            .map(|v| {
                v.split(',')
                    .any(|token| token.trim().eq_ignore_ascii_case("websocket"))
            })
            .unwrap_or(false)
    }
}

/// Outcome of feeding the accumulated bytes to the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handshake {
    Incomplete,

    /// Upgrade accepted. `response` must be written back; `consumed`
    /// bytes of the buffer belonged to the request (anything after it is
    /// already frame data).
    Upgraded { response: Vec<u8>, consumed: usize },

    /// A well-formed request that is not a WebSocket upgrade.
    PlainHttp { request: HttpRequest, consumed: usize },
}

/// Run the handshake over everything received so far.
pub fn process_handshake(buf: &[u8]) -> Result<Handshake, HandshakeError> {
    let end = match find_header_end(buf) {
        Some(end) => end,
        None if buf.len() > MAX_HEADER_BYTES => {
            return Err(HandshakeError::HeaderTooLarge {
                limit: MAX_HEADER_BYTES,
            })
        }
        None => return Ok(Handshake::Incomplete),
    };

    if end > MAX_HEADER_BYTES {
        return Err(HandshakeError::HeaderTooLarge {
            limit: MAX_HEADER_BYTES,
        });
    }

    let request = parse_request(&buf[..end])?;

    if !request.is_websocket_upgrade() {
        return Ok(Handshake::PlainHttp {
            request,
            consumed: end,
        });
    }

    if !request.method.eq_ignore_ascii_case("GET") {
        return Err(HandshakeError::NotGet(request.method));
    }

    let key = request
        .header("Sec-WebSocket-Key")
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or(HandshakeError::MissingKey)?;

    Ok(Handshake::Upgraded {
        response: upgrade_response(&accept_key(key)),
        consumed: end,
    })
}

/// Derive `Sec-WebSocket-Accept` from the client's key.
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

pub fn upgrade_response(accept: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\
         \r\n"
    )
    .into_bytes()
}

/// Build a client upgrade request. Used by tools and tests.
pub fn upgrade_request(host: &str, path: &str, key: &str) -> Vec<u8> {
    format!(
        "GET {path} HTTP/1.1\r\n\
         Host: {host}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n"
    )
    .into_bytes()
}

/// Index just past the `\r\n\r\n` terminator, if present.
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
        .map(|pos| pos + HEADER_TERMINATOR.len())
}

pub fn parse_request(head: &[u8]) -> Result<HttpRequest, HandshakeError> {
    let text = std::str::from_utf8(head).map_err(|_| HandshakeError::InvalidUtf8)?;
    let mut lines = text.split("\r\n");

    let request_line = lines.next().ok_or(HandshakeError::MalformedRequestLine)?;
    let mut parts = request_line.split_whitespace();
    let (method, path, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(m), Some(p), Some(v), None) => (m, p, v),
        _ => return Err(HandshakeError::MalformedRequestLine),
    };
    if !version.starts_with("HTTP/1.") {
        return Err(HandshakeError::MalformedRequestLine);
    }

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        if headers.len() == MAX_HEADERS {
            return Err(HandshakeError::TooManyHeaders { limit: MAX_HEADERS });
        }
        let (name, value) = line.split_once(':').ok_or(HandshakeError::MalformedHeader)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(HandshakeError::MalformedHeader);
        }
        headers.push((name.to_string(), value.trim().to_string()));
    }

    Ok(HttpRequest {
        method: method.to_string(),
        path: path.to_string(),
        version: version.to_string(),
        headers,
    })
}
