// crates/canvas-server/src/client.rs
//
// Per-connection processing of `Data` tasks: handshake first, then the
// frame loop. Runs on the worker lane that owns the connection, so
// appends to one connection's buffer never race.

use bytes::Bytes;
use canvas_core::PixelUpdate;
use canvas_protocol::binary_codec::{decode_pixel_updates, encode_snapshot};
use canvas_protocol::frame::header_len;
use canvas_protocol::json_codec::decode_text_updates;
use canvas_protocol::wire_types::{close_payload, CLOSE_NORMAL};
use canvas_protocol::{
    decode_frame, encode_frame, process_handshake, Decoded, Handshake, HttpRequest, Message,
    Opcode,
};
use tracing::{debug, info, warn};

use crate::connection::{Connection, Inbound};
use crate::error::SessionError;
use crate::types::ConnectionState;
use crate::worker::WorkerContext;

/// What to do with the connection once its inbound lock is released.
enum Next {
    Keep,
    Close,
}

/// Handle bytes read from `conn`.
pub(crate) fn handle_data(ctx: &WorkerContext, conn: &Connection, bytes: &[u8]) {
    match process(ctx, conn, bytes) {
        Ok(Next::Keep) => {}
        Ok(Next::Close) => ctx.registry.close_after_flush(conn),
        Err(e) => {
            match e {
                SessionError::BufferOverflow { .. } | SessionError::SlowConsumer { .. } => {
                    warn!("connection {}: {}", conn.id(), e)
                }
                _ => debug!("connection {}: {}", conn.id(), e),
            }
            ctx.registry.teardown(conn.id(), e);
        }
    }
}

fn process(ctx: &WorkerContext, conn: &Connection, bytes: &[u8]) -> Result<Next, SessionError> {
    if conn.state() >= ConnectionState::Closing {
        return Ok(Next::Keep);
    }

    let mut inbound = conn.inbound();
    inbound.append(bytes)?;

    if conn.state() == ConnectionState::Handshake {
        match process_handshake(inbound.buffer())? {
            Handshake::Incomplete => {
                inbound.partial = true;
                return Ok(Next::Keep);
            }
            Handshake::Upgraded { response, consumed } => {
                inbound.consume(consumed);
                conn.send(Bytes::from(response))?;
                send_snapshot_and_open(ctx, conn)?;
                info!("connection {} upgraded", conn.id());
            }
            Handshake::PlainHttp { request, consumed } => {
                inbound.consume(consumed);
                inbound.partial = false;
                return serve_plain_http(ctx, conn, &request);
            }
        }
    }

    read_frames(ctx, conn, &mut inbound)
}

/// Send the full grid, then make the connection eligible for deltas.
///
/// Both happen under the canvas lock, so no drain can slip in between
/// the snapshot and the state change.
fn send_snapshot_and_open(ctx: &WorkerContext, conn: &Connection) -> Result<(), SessionError> {
    ctx.canvas.with_canvas(|canvas| {
        let payload = encode_snapshot(&canvas.snapshot());
        let mut frame = Vec::with_capacity(header_len(payload.len(), false) + payload.len());
        encode_frame(Opcode::Binary, &payload, &mut frame);

        conn.send(Bytes::from(frame))?;
        conn.advance(ConnectionState::Open);
        Ok(())
    })
}

fn serve_plain_http(
    ctx: &WorkerContext,
    conn: &Connection,
    request: &HttpRequest,
) -> Result<Next, SessionError> {
    let files = ctx.static_files.as_ref().ok_or(SessionError::NotWebSocket)?;

    let response = files.respond(request);
    debug!(
        "connection {} {} {} -> {} bytes",
        conn.id(),
        request.method,
        request.path,
        response.len()
    );
    conn.send(Bytes::from(response))?;
    Ok(Next::Close)
}

fn read_frames(
    ctx: &WorkerContext,
    conn: &Connection,
    inbound: &mut Inbound,
) -> Result<Next, SessionError> {
    loop {
        let (frame, consumed) = match decode_frame(inbound.buffer())? {
            Decoded::Incomplete { .. } => break,
            Decoded::Complete { frame, consumed } => (frame, consumed),
        };
        inbound.consume(consumed);

        let Some(message) = inbound.assembler.push(frame)? else {
            continue;
        };

        match message {
            Message::Binary(payload) => {
                apply_updates(ctx, conn, &decode_pixel_updates(&payload));
            }
            Message::Text(payload) => {
                let (updates, err) = decode_text_updates(&payload);
                if let Some(e) = err {
                    debug!("connection {} bad text message: {}", conn.id(), e);
                }
                apply_updates(ctx, conn, &updates);
            }
            Message::Ping(payload) => {
                conn.send(control_frame(Opcode::Pong, &payload))?;
            }
            Message::Close(code) => {
                debug!("connection {} sent close ({:?})", conn.id(), code);
                conn.send(control_frame(Opcode::Close, &close_payload(CLOSE_NORMAL)))?;
                inbound.partial = false;
                return Ok(Next::Close);
            }
        }
    }

    inbound.partial = !inbound.buffer().is_empty() || inbound.assembler.is_partial();
    Ok(Next::Keep)
}

fn apply_updates(ctx: &WorkerContext, conn: &Connection, updates: &[PixelUpdate]) {
    if updates.is_empty() {
        return;
    }

    let (applied, rejected) = ctx.canvas.apply_all(updates);
    for e in &rejected {
        debug!("connection {} rejected update: {}", conn.id(), e);
    }
    debug!(
        "connection {} applied {}/{} updates",
        conn.id(),
        applied,
        updates.len()
    );
}

fn control_frame(opcode: Opcode, payload: &[u8]) -> Bytes {
    let mut out = Vec::with_capacity(header_len(payload.len(), false) + payload.len());
    encode_frame(opcode, payload, &mut out);
    Bytes::from(out)
}
