//! Message reassembly on top of frames.
//!
//! A text or binary message may be split across a first frame without
//! FIN and any number of continuation frames. The assembler holds the
//! partial message for one connection and hands out the concatenated
//! payload once the final fragment arrives. Control frames may be
//! interleaved with fragments and are surfaced immediately.

use bytes::{Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::frame::Frame;
use crate::wire_types::Opcode;

/// A complete application-level message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(Bytes),
    Binary(Bytes),
    /// Peer asked to close; carries the status code if one was sent.
    Close(Option<u16>),
    /// Must be answered with a pong echoing the payload.
    Ping(Bytes),
}

#[derive(Debug)]
struct Partial {
    opcode: Opcode,
    data: BytesMut,
}

/// Per-connection fragmented-message state.
#[derive(Debug)]
pub struct MessageAssembler {
    max_message_len: usize,
    partial: Option<Partial>,
}

impl MessageAssembler {
    /// `max_message_len` bounds a reassembled message.
    pub fn new(max_message_len: usize) -> Self {
        MessageAssembler {
            max_message_len,
            partial: None,
        }
    }

    /// True while a fragmented message is waiting for its continuation.
    pub fn is_partial(&self) -> bool {
        self.partial.is_some()
    }

    /// Feed one decoded frame.
    ///
    /// Returns `Some` when a message is complete, `None` when the frame
    /// was a non-final fragment or something to ignore (pong, unknown
    /// opcode).
    pub fn push(&mut self, frame: Frame) -> Result<Option<Message>, ProtocolError> {
        let kind = match frame.kind() {
            Some(kind) => kind,
            None => return Ok(None),
        };

        match kind {
            Opcode::Text | Opcode::Binary => {
                if self.partial.is_some() {
                    return Err(ProtocolError::InterleavedMessage);
                }
                self.check_len(frame.payload.len())?;

                if frame.fin {
                    Ok(Some(data_message(kind, frame.payload)))
                } else {
                    self.partial = Some(Partial {
                        opcode: kind,
                        data: BytesMut::from(&frame.payload[..]),
                    });
                    Ok(None)
                }
            }

            Opcode::Continuation => {
                let limit = self.max_message_len;
                let partial = self
                    .partial
                    .as_mut()
                    .ok_or(ProtocolError::UnexpectedContinuation)?;

                let len = partial.data.len() + frame.payload.len();
                if len > limit {
                    return Err(ProtocolError::MessageTooLarge { len, limit });
                }
                partial.data.extend_from_slice(&frame.payload);

                if !frame.fin {
                    return Ok(None);
                }

                match self.partial.take() {
                    Some(done) => Ok(Some(data_message(done.opcode, done.data.freeze()))),
                    None => Ok(None),
                }
            }

            Opcode::Close => Ok(Some(Message::Close(close_code(&frame.payload)))),
            Opcode::Ping => Ok(Some(Message::Ping(frame.payload))),
            Opcode::Pong => Ok(None),
        }
    }

    fn check_len(&self, len: usize) -> Result<(), ProtocolError> {
        if len > self.max_message_len {
            Err(ProtocolError::MessageTooLarge {
                len,
                limit: self.max_message_len,
            })
        } else {
            Ok(())
        }
    }
}

fn data_message(opcode: Opcode, payload: Bytes) -> Message {
    match opcode {
        Opcode::Text => Message::Text(payload),
        _ => Message::Binary(payload),
    }
}

fn close_code(payload: &[u8]) -> Option<u16> {
    match payload {
        [hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo])),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(fin: bool, opcode: u8, payload: &[u8]) -> Frame {
        Frame {
            fin,
            opcode,
            masked: true,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    #[test]
    fn single_frame_message_passes_straight_through() {
        let mut asm = MessageAssembler::new(64);
        let msg = asm.push(frame(true, 0x2, &[1, 2, 3])).unwrap();
        assert_eq!(msg, Some(Message::Binary(Bytes::from_static(&[1, 2, 3]))));
        assert!(!asm.is_partial());
    }

    #[test]
    fn fragments_are_concatenated_in_order() {
        let mut asm = MessageAssembler::new(64);
        assert_eq!(asm.push(frame(false, 0x2, b"ab")).unwrap(), None);
        assert!(asm.is_partial());
        assert_eq!(asm.push(frame(false, 0x0, b"cd")).unwrap(), None);

        // A ping in the middle of a fragmented message is fine.
        assert_eq!(
            asm.push(frame(true, 0x9, b"hi")).unwrap(),
            Some(Message::Ping(Bytes::from_static(b"hi")))
        );

        let msg = asm.push(frame(true, 0x0, b"ef")).unwrap();
        assert_eq!(msg, Some(Message::Binary(Bytes::from_static(b"abcdef"))));
        assert!(!asm.is_partial());
    }

    #[test]
    fn continuation_without_start_is_an_error() {
        let mut asm = MessageAssembler::new(64);
        assert_eq!(
            asm.push(frame(true, 0x0, b"x")).unwrap_err(),
            ProtocolError::UnexpectedContinuation
        );
    }

    #[test]
    fn new_message_during_fragmentation_is_an_error() {
        let mut asm = MessageAssembler::new(64);
        asm.push(frame(false, 0x1, b"{")).unwrap();
        assert_eq!(
            asm.push(frame(true, 0x2, b"x")).unwrap_err(),
            ProtocolError::InterleavedMessage
        );
    }

    #[test]
    fn reassembly_is_bounded() {
        let mut asm = MessageAssembler::new(4);
        asm.push(frame(false, 0x2, b"abc")).unwrap();
        assert_eq!(
            asm.push(frame(true, 0x0, b"de")).unwrap_err(),
            ProtocolError::MessageTooLarge { len: 5, limit: 4 }
        );
    }

    #[test]
    fn close_pong_and_unknown_opcodes() {
        let mut asm = MessageAssembler::new(64);
        assert_eq!(
            asm.push(frame(true, 0x8, &[0x03, 0xE8])).unwrap(),
            Some(Message::Close(Some(1000)))
        );
        assert_eq!(
            asm.push(frame(true, 0x8, &[])).unwrap(),
            Some(Message::Close(None))
        );
        assert_eq!(asm.push(frame(true, 0xA, b"p")).unwrap(), None);
        assert_eq!(asm.push(frame(true, 0x3, b"?")).unwrap(), None);
        assert_eq!(asm.push(frame(true, 0xB, b"?")).unwrap(), None);
    }
}
