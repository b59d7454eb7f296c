//! Integration tests for the groupchat-core frame codec through the public API.

use groupchat_core::{
    decode_frame, encode_frame,
    protocol::{messages::HEADER_SIZE, SequenceCounter},
    Frame, GroupMessage, MemberId, Payload, ProtocolError,
};

fn frame(message: GroupMessage, seq: u64) -> Frame {
    Frame {
        cluster: "chat".to_string(),
        sender: MemberId::new("ANDROID"),
        seq,
        message,
    }
}

#[test]
fn test_presence_frames_round_trip_with_increasing_sequence() {
    // Arrange
    let counter = SequenceCounter::new();
    let originals = vec![
        frame(GroupMessage::Join, counter.next()),
        frame(GroupMessage::Present, counter.next()),
        frame(GroupMessage::Leave, counter.next()),
    ];

    // Act
    let decoded: Vec<Frame> = originals
        .iter()
        .map(|f| decode_frame(&encode_frame(f).expect("encode")).expect("decode"))
        .collect();

    // Assert
    assert_eq!(decoded, originals);
    assert_eq!(decoded.iter().map(|f| f.seq).collect::<Vec<_>>(), vec![0, 1, 2]);
}

#[test]
fn test_unicode_text_survives_the_wire() {
    let original = frame(GroupMessage::Data(Payload::Text("héllo, 世界 👋".into())), 9);

    let decoded = decode_frame(&encode_frame(&original).unwrap()).unwrap();

    assert_eq!(decoded, original);
}

#[test]
fn test_every_truncation_of_a_valid_frame_is_rejected() {
    let bytes = encode_frame(&frame(GroupMessage::Data(Payload::Text("hi".into())), 1)).unwrap();

    for cut in 0..bytes.len() {
        let result = decode_frame(&bytes[..cut]);
        assert!(result.is_err(), "prefix of {cut} bytes must not decode");
        if cut < HEADER_SIZE {
            assert!(matches!(result, Err(ProtocolError::InsufficientData { .. })));
        }
    }
}
