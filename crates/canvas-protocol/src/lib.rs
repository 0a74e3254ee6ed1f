//! canvas-protocol
//!
//! Wire-level encoding/decoding for the canvas server.
//!
//! This crate turns bytes read from a socket into WebSocket frames,
//! messages and pixel updates, and turns canvas state back into bytes.
//! It never touches a socket.
//!
//! - [`handshake`]    : HTTP upgrade request parsing and accept-key derivation
//! - [`frame`]        : WebSocket frame decode/encode (restartable over partial reads)
//! - [`message`]      : fragmented message reassembly and control frames
//! - [`binary_codec`] : 5-byte pixel records and the binary snapshot payload
//! - [`json_codec`]   : JSON delta broadcasts and text-frame pixel updates

pub mod wire_types;
pub mod error;
pub mod frame;
pub mod message;
pub mod handshake;
pub mod binary_codec;
pub mod json_codec;

pub use binary_codec::{decode_pixel_updates, decode_snapshot, encode_pixel_updates, encode_snapshot};
pub use error::{HandshakeError, ProtocolError};
pub use frame::{decode_frame, encode_frame, encode_masked_frame, Decoded, Frame};
pub use handshake::{accept_key, process_handshake, upgrade_request, Handshake, HttpRequest};
pub use json_codec::{decode_delta, decode_text_updates, encode_delta, DeltaMessage};
pub use message::{Message, MessageAssembler};
pub use wire_types::Opcode;
