// Shared helpers for server integration tests.
#![allow(dead_code)]

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use canvas_core::{CanvasSnapshot, PixelUpdate};
use canvas_protocol::binary_codec::{decode_snapshot, encode_pixel_updates};
use canvas_protocol::handshake::find_header_end;
use canvas_protocol::{
    decode_delta, decode_frame, encode_masked_frame, upgrade_request, Decoded, DeltaMessage,
    Frame, Opcode,
};
use canvas_server::{Config, Server, ServerHandle};
use tokio::runtime::Runtime;

pub const KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";
pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn test_config() -> Config {
    Config {
        bind_addr: "127.0.0.1".to_string(),
        port: 0,
        canvas_width: 32,
        canvas_height: 32,
        workers: 2,
        queue_capacity: 256,
        broadcast_interval: Duration::from_millis(20),
        snapshot_path: None,
        static_dir: None,
        ..Config::default()
    }
}

/// Start a server on its own multi-threaded runtime.
pub fn start(config: Config) -> (Runtime, ServerHandle) {
    let rt = Runtime::new().expect("runtime");
    let handle = rt.block_on(Server::start(config)).expect("server starts");
    (rt, handle)
}

pub fn stop(rt: Runtime, handle: ServerHandle) {
    rt.block_on(handle.shutdown()).expect("clean shutdown");
}

/// Lift the soft open-file limit to at least `want`, up to the hard limit.
/// Returns false if the hard limit is too low.
pub fn raise_fd_limit(want: u64) -> bool {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: `limit` is a valid, writable rlimit for the duration of both calls.
    unsafe {
        if libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) != 0 {
            return false;
        }
        if limit.rlim_cur as u64 >= want {
            return true;
        }
        if (limit.rlim_max as u64) < want {
            return false;
        }
        limit.rlim_cur = want as libc::rlim_t;
        libc::setrlimit(libc::RLIMIT_NOFILE, &limit) == 0
    }
}

/// Poll `f` until it holds or the timeout expires.
pub fn wait_until(mut f: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if f() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    f()
}

/// Minimal blocking WebSocket client.
pub struct WsClient {
    stream: TcpStream,
    buf: Vec<u8>,
}

impl WsClient {
    /// Connect and complete the upgrade. The snapshot frame is left unread.
    pub fn connect(addr: SocketAddr) -> Self {
        let mut stream = TcpStream::connect(addr).expect("connect");
        stream.set_read_timeout(Some(TIMEOUT)).unwrap();
        stream.set_nodelay(true).unwrap();
        stream
            .write_all(&upgrade_request("localhost", "/", KEY))
            .unwrap();

        let mut client = WsClient {
            stream,
            buf: Vec::new(),
        };

        let end = loop {
            if let Some(end) = find_header_end(&client.buf) {
                break end;
            }
            client.fill();
        };
        let head = String::from_utf8(client.buf.drain(..end).collect()).unwrap();
        assert!(head.starts_with("HTTP/1.1 101 Switching Protocols\r\n"), "{head}");
        assert!(head.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
        client
    }

    /// Connect and consume the initial snapshot.
    pub fn join(addr: SocketAddr) -> (Self, CanvasSnapshot) {
        let mut client = Self::connect(addr);
        let snapshot = client.read_snapshot();
        (client, snapshot)
    }

    fn fill(&mut self) {
        let mut chunk = [0u8; 16 * 1024];
        let n = self.stream.read(&mut chunk).expect("read from server");
        assert!(n > 0, "server closed the connection");
        self.buf.extend_from_slice(&chunk[..n]);
    }

    pub fn read_frame(&mut self) -> Frame {
        loop {
            match decode_frame(&self.buf).expect("server frame is valid") {
                Decoded::Complete { frame, consumed } => {
                    self.buf.drain(..consumed);
                    assert!(!frame.masked, "server frames are never masked");
                    return frame;
                }
                Decoded::Incomplete { .. } => self.fill(),
            }
        }
    }

    pub fn read_snapshot(&mut self) -> CanvasSnapshot {
        let frame = self.read_frame();
        assert_eq!(frame.kind(), Some(Opcode::Binary));
        decode_snapshot(&frame.payload).expect("snapshot payload")
    }

    /// Next frame of the given kind, skipping deltas and anything else.
    pub fn read_until(&mut self, kind: Opcode) -> Frame {
        loop {
            let frame = self.read_frame();
            if frame.kind() == Some(kind) {
                return frame;
            }
        }
    }

    pub fn read_delta(&mut self) -> DeltaMessage {
        let frame = self.read_until(Opcode::Text);
        decode_delta(&frame.payload).expect("delta json")
    }

    /// Read deltas until one contains `update`.
    pub fn wait_for_pixel(&mut self, update: PixelUpdate) -> DeltaMessage {
        loop {
            let delta = self.read_delta();
            if delta.updated_pixel.contains(&update) {
                return delta;
            }
        }
    }

    pub fn send(&mut self, opcode: Opcode, payload: &[u8]) {
        let mut wire = Vec::new();
        encode_masked_frame(opcode, payload, [0x12, 0x34, 0x56, 0x78], &mut wire);
        self.send_raw(&wire);
    }

    pub fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).expect("write to server");
    }

    pub fn send_pixels(&mut self, updates: &[PixelUpdate]) {
        let mut payload = Vec::new();
        encode_pixel_updates(updates, &mut payload);
        self.send(Opcode::Binary, &payload);
    }

    /// True once the server has closed the socket (FIN or reset).
    pub fn closed_by_server(&mut self) -> bool {
        let mut chunk = [0u8; 4096];
        let deadline = Instant::now() + TIMEOUT;
        while Instant::now() < deadline {
            match self.stream.read(&mut chunk) {
                Ok(0) => return true,
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::ConnectionReset => return true,
                Err(e) if e.kind() == ErrorKind::ConnectionAborted => return true,
                Err(_) => return false,
            }
        }
        false
    }
}

/// Send a raw request and read until the server closes.
pub fn http_exchange(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).expect("connect");
    stream.set_read_timeout(Some(TIMEOUT)).unwrap();
    stream.write_all(request).unwrap();

    let mut out = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == ErrorKind::ConnectionReset => break,
            Err(e) => panic!("read failed: {e}"),
        }
    }
    out
}
