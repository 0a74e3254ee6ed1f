// crates/canvas-server/src/static_files.rs
// Plain HTTP for non-upgrade requests, served from under one root.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use canvas_protocol::HttpRequest;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        StaticFiles { root: root.into() }
    }

    /// Build the complete response for `request`.
    pub fn respond(&self, request: &HttpRequest) -> Vec<u8> {
        let head_only = request.method.eq_ignore_ascii_case("HEAD");
        if !head_only && !request.method.eq_ignore_ascii_case("GET") {
            return error_response(405, "Method Not Allowed");
        }

        let path = match self.resolve(&request.path) {
            Ok(path) => path,
            Err(status) => return error_response(status, reason(status)),
        };

        match fs::read(&path) {
            Ok(body) => {
                debug!("serving {} ({} bytes)", path.display(), body.len());
                let mut out = response_head(200, "OK", mime_type(&path), body.len());
                if !head_only {
                    out.extend_from_slice(&body);
                }
                out
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => error_response(404, "Not Found"),
            // Directories and unreadable files.
            Err(_) => error_response(404, "Not Found"),
        }
    }

    /// Map a request target onto a file under the root.
    ///
    /// Returns the HTTP status to send when the target is refused.
    pub fn resolve(&self, target: &str) -> Result<PathBuf, u16> {
        let path = target.split(['?', '#']).next().unwrap_or("");
        if path.contains("..") || path.contains('\\') {
            return Err(403);
        }

        let relative = path.trim_start_matches('/');
        if relative.is_empty() {
            return Ok(self.root.join("index.html"));
        }
        Ok(self.root.join(relative))
    }
}

/// Content type by file extension.
pub fn mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("txt") => "text/plain; charset=utf-8",
        Some("wasm") => "application/wasm",
        _ => "application/octet-stream",
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        _ => "Error",
    }
}

fn response_head(status: u16, reason: &str, content_type: &str, len: usize) -> Vec<u8> {
    format!(
        "HTTP/1.1 {status} {reason}\r\n\
         Content-Type: {content_type}\r\n\
         Content-Length: {len}\r\n\
         Connection: close\r\n\
         \r\n"
    )
    .into_bytes()
}

fn error_response(status: u16, reason: &str) -> Vec<u8> {
    let body = format!("{status} {reason}\n");
    let mut out = response_head(status, reason, "text/plain; charset=utf-8", body.len());
    out.extend_from_slice(body.as_bytes());
    out
}
