// crates/canvas-server/src/broadcast.rs
// One frame, shared `Bytes`, queued on every OPEN connection. A failed
// recipient is torn down and the loop moves on.

use bytes::Bytes;
use canvas_protocol::frame::header_len;
use canvas_protocol::{encode_frame, Opcode};

use crate::registry::ConnectionRegistry;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanOutReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Frame a JSON delta as one unmasked text frame.
pub fn text_frame(payload: &[u8]) -> Bytes {
    let mut out = Vec::with_capacity(header_len(payload.len(), false) + payload.len());
    encode_frame(Opcode::Text, payload, &mut out);
    Bytes::from(out)
}

/// Queue `frame` on every open connection.
pub fn fan_out(registry: &ConnectionRegistry, frame: &Bytes) -> FanOutReport {
    let mut report = FanOutReport::default();

    for conn in registry.open_connections() {
        if registry.send(&conn, frame.clone()) {
            report.delivered += 1;
        } else {
            report.dropped += 1;
        }
    }

    report
}
