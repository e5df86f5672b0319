//! Relay wire protocol.
//!
//! Every WebSocket frame carries one BSON document with a `type`
//! discriminator. Client documents that parse as BSON but match no known
//! message are surfaced as [`Inbound::Unrecognized`] so newer clients can
//! talk to older servers without tripping errors.

use bson::spec::BinarySubtype;
use bson::{Binary, Document};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;

use super::encoding::{IndexedFrame, Rgb, PALETTE_SIZE};

/// Errors raised while decoding or encoding protocol messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid BSON document: {0}")]
    Decode(#[from] bson::de::Error),
    #[error("failed to encode BSON document: {0}")]
    Encode(#[from] bson::ser::Error),
}

/// Messages sent by the client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    SelectGame {
        #[serde(deserialize_with = "deserialize_index")]
        index: i64,
        #[serde(default)]
        save: Option<String>,
        #[serde(default, rename = "autoSave")]
        auto_save: Option<bool>,
    },
    ExitGame,
    GetSave,
    PressButton {
        button: String,
    },
    RequestDraw,
}

/// Result of decoding one client frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Message(ClientMessage),
    /// Well-formed BSON that matches no known message shape.
    Unrecognized(Document),
}

/// Decodes a raw client frame.
///
/// Only bytes that are not a BSON document are an error.
pub fn decode_client(raw: &[u8]) -> Result<Inbound, ProtocolError> {
    let mut reader = raw;
    let doc = Document::from_reader(&mut reader)?;
    match bson::from_document::<ClientMessage>(doc.clone()) {
        Ok(message) => Ok(Inbound::Message(message)),
        Err(_) => Ok(Inbound::Unrecognized(doc)),
    }
}

/// Messages sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    GameStarted {
        name: String,
    },
    GameExited,
    SaveData {
        #[serde(rename = "gameName")]
        game_name: String,
        auto: bool,
        data: String,
    },
    ScreenDraw {
        width: i32,
        height: i32,
        screen: Binary,
        palette: [Rgb; PALETTE_SIZE],
    },
    Error {
        error: String,
    },
}

impl ServerMessage {
    pub fn error(error: impl fmt::Display) -> Self {
        ServerMessage::Error {
            error: error.to_string(),
        }
    }

    /// Serializes this message as a BSON document.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(bson::to_vec(self)?)
    }
}

impl From<IndexedFrame> for ServerMessage {
    fn from(frame: IndexedFrame) -> Self {
        ServerMessage::ScreenDraw {
            width: i32::from(frame.width),
            height: i32::from(frame.height),
            screen: Binary {
                subtype: BinarySubtype::Generic,
                bytes: frame.screen.to_vec(),
            },
            palette: frame.palette,
        }
    }
}

/// Encodes the catalog listing the way a BSON array is laid out: keys `"0"..`.
pub fn encode_catalog(names: &[&str]) -> Result<Vec<u8>, ProtocolError> {
    let mut doc = Document::new();
    for (index, name) in names.iter().enumerate() {
        doc.insert(index.to_string(), *name);
    }
    let mut buf = Vec::new();
    doc.to_writer(&mut buf)?;
    Ok(buf)
}

/// Accepts any integral BSON number; browsers may send `0.0` for `0`.
fn deserialize_index<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    struct IndexVisitor;

    impl Visitor<'_> for IndexVisitor {
        type Value = i64;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an integral game index")
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
            i64::try_from(v).map_err(|_| E::custom("game index out of range"))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<i64, E> {
            if v.fract() == 0.0 && v.abs() < 9.0e15 {
                Ok(v as i64)
            } else {
                Err(E::custom("game index must be a whole number"))
            }
        }
    }

    deserializer.deserialize_any(IndexVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn raw(doc: Document) -> Vec<u8> {
        let mut buf = Vec::new();
        doc.to_writer(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_decode_select_game() {
        let inbound = decode_client(&raw(doc! {
            "type": "SELECT_GAME",
            "index": 2,
            "save": "eJwDAAAAAAE=",
            "autoSave": true,
        }))
        .unwrap();

        assert_eq!(
            inbound,
            Inbound::Message(ClientMessage::SelectGame {
                index: 2,
                save: Some("eJwDAAAAAAE=".into()),
                auto_save: Some(true),
            })
        );
    }

    #[test]
    fn test_decode_select_game_defaults_and_double_index() {
        let inbound = decode_client(&raw(doc! { "type": "SELECT_GAME", "index": 1.0 })).unwrap();
        assert_eq!(
            inbound,
            Inbound::Message(ClientMessage::SelectGame {
                index: 1,
                save: None,
                auto_save: None,
            })
        );
    }

    #[test]
    fn test_decode_simple_messages() {
        for (ty, expected) in [
            ("EXIT_GAME", ClientMessage::ExitGame),
            ("GET_SAVE", ClientMessage::GetSave),
            ("REQUEST_DRAW", ClientMessage::RequestDraw),
        ] {
            assert_eq!(
                decode_client(&raw(doc! { "type": ty })).unwrap(),
                Inbound::Message(expected)
            );
        }
        assert_eq!(
            decode_client(&raw(doc! { "type": "PRESS_BUTTON", "button": "A" })).unwrap(),
            Inbound::Message(ClientMessage::PressButton { button: "A".into() })
        );
    }

    #[test]
    fn test_unknown_shapes_are_unrecognized() {
        for doc in [
            doc! { "type": "DANCE" },
            doc! { "type": "PRESS_BUTTON", "button": 4 },
            doc! { "type": "SELECT_GAME", "index": "zero" },
            doc! { "hello": "world" },
        ] {
            assert!(matches!(
                decode_client(&raw(doc)).unwrap(),
                Inbound::Unrecognized(_)
            ));
        }
    }

    #[test]
    fn test_garbage_is_a_decode_error() {
        assert!(matches!(
            decode_client(b"\x01\x02garbage"),
            Err(ProtocolError::Decode(_))
        ));
        assert!(decode_client(&[]).is_err());
    }

    #[test]
    fn test_encode_screen_draw() {
        let message = ServerMessage::from(IndexedFrame {
            width: 160,
            height: 145,
            palette: [[1, 2, 3]; PALETTE_SIZE],
            screen: bytes::Bytes::from_static(&[0x12, 0x34]),
        });

        let bytes = message.encode().unwrap();
        let doc = Document::from_reader(&mut bytes.as_slice()).unwrap();
        assert_eq!(doc.get_str("type").unwrap(), "SCREEN_DRAW");
        assert_eq!(doc.get_i32("width").unwrap(), 160);
        assert_eq!(doc.get_i32("height").unwrap(), 145);
        assert_eq!(doc.get_binary_generic("screen").unwrap(), &vec![0x12, 0x34]);
        assert_eq!(doc.get_array("palette").unwrap().len(), PALETTE_SIZE);
    }

    #[test]
    fn test_encode_save_data_and_unit_messages() {
        let bytes = ServerMessage::SaveData {
            game_name: "ZELDA".into(),
            auto: true,
            data: "abc=".into(),
        }
        .encode()
        .unwrap();
        let doc = Document::from_reader(&mut bytes.as_slice()).unwrap();
        assert_eq!(doc.get_str("type").unwrap(), "SAVE_DATA");
        assert_eq!(doc.get_str("gameName").unwrap(), "ZELDA");
        assert!(doc.get_bool("auto").unwrap());

        let bytes = ServerMessage::GameExited.encode().unwrap();
        let doc = Document::from_reader(&mut bytes.as_slice()).unwrap();
        assert_eq!(doc.get_str("type").unwrap(), "GAME_EXITED");
    }

    #[test]
    fn test_encode_catalog() {
        let bytes = encode_catalog(&["TETRIS", "ZELDA"]).unwrap();
        let doc = Document::from_reader(&mut bytes.as_slice()).unwrap();
        assert_eq!(doc.get_str("0").unwrap(), "TETRIS");
        assert_eq!(doc.get_str("1").unwrap(), "ZELDA");
        assert_eq!(doc.len(), 2);
    }
}
