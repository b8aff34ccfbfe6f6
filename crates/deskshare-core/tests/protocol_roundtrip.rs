//! Integration tests for the deskshare-core protocol codec.
//!
//! These exercise the public API the way the client's stream reader does:
//! read a header, check it, then hand the body to `decode_body`.

use deskshare_core::{
    decode_body, decode_message, encode_message,
    protocol::{
        messages::{
            EnterMessage, HelloBackMessage, HelloMessage, IncompatibleMessage, KeyMessage,
            KeyRepeatMessage, ModifierMask, MouseButtonMessage, MouseMoveMessage,
            MouseWheelMessage, ScreenInfoMessage, HEADER_SIZE,
        },
        EnterSequenceGuard,
    },
    CodecError, FramingError, Message, MessageHeader, ProtocolError,
};

/// Splits a buffer the way a stream reader would and decodes it.
fn read_like_stream(bytes: &[u8]) -> Result<Message, CodecError> {
    let header_bytes: [u8; HEADER_SIZE] = bytes[..HEADER_SIZE].try_into().expect("header");
    let header = MessageHeader::from_bytes(&header_bytes);
    decode_body(&header, &bytes[HEADER_SIZE..])
}

fn all_kinds() -> Vec<Message> {
    vec![
        Message::Enter(EnterMessage {
            x: -5,
            y: 1079,
            sequence_number: 42,
            mask: ModifierMask::CAPS_LOCK as i16,
        }),
        Message::Leave,
        Message::KeyDown(KeyMessage {
            id: 0xEF51,
            mask: ModifierMask::CONTROL | ModifierMask::ALT,
            button: 0x71,
        }),
        Message::KeyUp(KeyMessage {
            id: 0xEF51,
            mask: 0,
            button: 0x71,
        }),
        Message::KeyRepeat(KeyRepeatMessage {
            id: 0x20,
            mask: 0,
            count: 4,
            button: 0x41,
        }),
        Message::MouseMove(MouseMoveMessage { x: 100, y: -3 }),
        Message::MouseButton(MouseButtonMessage {
            button: 2,
            pressed: true,
        }),
        Message::MouseWheel(MouseWheelMessage {
            x_delta: 120,
            y_delta: 0,
        }),
        Message::KeepAlive,
        Message::Close,
        Message::Hello(HelloMessage { major: 1, minor: 6 }),
        Message::HelloBack(HelloBackMessage {
            major: 1,
            minor: 6,
            name: "über-desk".to_string(),
        }),
        Message::QueryInfo,
        Message::ScreenInfo(ScreenInfoMessage {
            x: 0,
            y: 0,
            width: 1920,
            height: 1080,
            warp_zone: 0,
            mouse_x: 960,
            mouse_y: 540,
        }),
        Message::InfoAck,
        Message::Incompatible(IncompatibleMessage { major: 2, minor: 0 }),
        Message::Busy,
        Message::UnknownClient,
        Message::BadProtocol,
    ]
}

#[test]
fn test_every_kind_survives_the_stream_reader_path() {
    for original in all_kinds() {
        let bytes = encode_message(&original);
        let decoded = read_like_stream(&bytes).expect("decode must succeed");
        assert_eq!(decoded, original);
        assert_eq!(encode_message(&decoded), bytes, "{original:?} must re-encode identically");
    }
}

#[test]
fn test_concatenated_stream_decodes_in_order() {
    // Arrange
    let messages = all_kinds();
    let stream: Vec<u8> = messages.iter().flat_map(encode_message).collect();

    // Act
    let mut decoded = Vec::new();
    let mut offset = 0;
    while offset < stream.len() {
        let (msg, consumed) = decode_message(&stream[offset..]).expect("decode must succeed");
        decoded.push(msg);
        offset += consumed;
    }

    // Assert
    assert_eq!(decoded, messages);
}

#[test]
fn test_every_strict_prefix_of_a_frame_is_a_framing_error() {
    let bytes = encode_message(&Message::Enter(EnterMessage {
        x: 20,
        y: 30,
        sequence_number: 5,
        mask: 3,
    }));
    for cut in 0..bytes.len() {
        let result = decode_message(&bytes[..cut]);
        assert!(
            matches!(result, Err(CodecError::Framing(_))),
            "prefix of {cut} bytes must fail with a framing error, got {result:?}"
        );
    }
}

#[test]
fn test_unassigned_codes_are_protocol_errors() {
    for code in [0x0000u16, 0x000B, 0x000F, 0x0015, 0x0024, 0xFFFF] {
        let header = MessageHeader {
            length: 0,
            type_code: code,
        };
        assert_eq!(
            decode_body(&header, &[]),
            Err(CodecError::Protocol(ProtocolError::UnknownMessageType(code)))
        );
    }
}

#[test]
fn test_body_shorter_than_declared_is_truncated() {
    let header = MessageHeader {
        length: 6,
        type_code: 0x0003,
    };
    assert!(matches!(
        decode_body(&header, &[0, 1, 0]),
        Err(CodecError::Framing(FramingError::Truncated { .. }))
    ));
}

#[test]
fn test_sequence_guard_rejects_replayed_enter_from_decoded_stream() {
    // Arrange
    let stream: Vec<u8> = [3, 4, 4]
        .into_iter()
        .flat_map(|seq| {
            encode_message(&Message::Enter(EnterMessage {
                x: 0,
                y: 0,
                sequence_number: seq,
                mask: 0,
            }))
        })
        .collect();
    let mut guard = EnterSequenceGuard::new();

    // Act
    let mut results = Vec::new();
    let mut offset = 0;
    while offset < stream.len() {
        let (msg, consumed) = decode_message(&stream[offset..]).expect("decode");
        offset += consumed;
        if let Message::Enter(enter) = msg {
            results.push(guard.check(enter.sequence_number));
        }
    }

    // Assert
    assert_eq!(
        results,
        vec![
            Ok(()),
            Ok(()),
            Err(ProtocolError::OutOfSequence {
                last: 4,
                received: 4
            })
        ]
    );
}
