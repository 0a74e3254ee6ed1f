//! JSON payloads.
//!
//! Delta broadcast (server -> clients, text frame):
//!
//! ```json
//! {"client_count":2,"updated_pixel":[{"x":10,"y":20,"color":5}]}
//! ```
//!
//! Browser pixel submissions (client -> server, text frame), one or more
//! concatenated objects:
//!
//! ```json
//! {"pixel":{"x":10,"y":20,"color":5}}
//! ```

use canvas_core::PixelUpdate;
use serde::{Deserialize, Serialize};

/// Borrowing form used on the hot path so the drained updates are not cloned.
#[derive(Serialize)]
struct DeltaRef<'a> {
    client_count: usize,
    updated_pixel: &'a [PixelUpdate],
}

/// Owned delta, as decoded by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaMessage {
    pub client_count: usize,
    pub updated_pixel: Vec<PixelUpdate>,
}

#[derive(Deserialize)]
struct PixelEnvelope {
    pixel: PixelUpdate,
}

pub fn encode_delta(
    client_count: usize,
    updates: &[PixelUpdate],
) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&DeltaRef {
        client_count,
        updated_pixel: updates,
    })
}

pub fn decode_delta(payload: &[u8]) -> Result<DeltaMessage, serde_json::Error> {
    serde_json::from_slice(payload)
}

/// Parse a text frame holding one or more `{"pixel":{..}}` objects.
///
/// Parsing stops at the first malformed object; everything before it is
/// still returned alongside the error.
pub fn decode_text_updates(payload: &[u8]) -> (Vec<PixelUpdate>, Option<serde_json::Error>) {
    let mut updates = Vec::new();
    let stream = serde_json::Deserializer::from_slice(payload).into_iter::<PixelEnvelope>();

    for item in stream {
        match item {
            Ok(env) => updates.push(env.pixel),
            Err(e) => return (updates, Some(e)),
        }
    }

    (updates, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_schema() {
        let json = encode_delta(3, &[PixelUpdate::new(10, 20, 5)]).unwrap();
        assert_eq!(
            std::str::from_utf8(&json).unwrap(),
            r#"{"client_count":3,"updated_pixel":[{"x":10,"y":20,"color":5}]}"#
        );
    }

    #[test]
    fn text_updates_accept_concatenated_objects() {
        let payload = br#"{"pixel":{"x":1,"y":2,"color":3}} {"pixel":{"x":4,"y":5,"color":6}}"#;
        let (updates, err) = decode_text_updates(payload);
        assert!(err.is_none());
        assert_eq!(
            updates,
            vec![PixelUpdate::new(1, 2, 3), PixelUpdate::new(4, 5, 6)]
        );
    }

    #[test]
    fn malformed_tail_keeps_the_prefix() {
        let payload = br#"{"pixel":{"x":1,"y":2,"color":3}}{"pixel":"nope"}"#;
        let (updates, err) = decode_text_updates(payload);
        assert_eq!(updates, vec![PixelUpdate::new(1, 2, 3)]);
        assert!(err.is_some());
    }
}
