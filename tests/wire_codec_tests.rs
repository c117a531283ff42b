//! Byte-level tests of the 0.8 wire codec.
//!
//! # Message-set entry
//!
//! ```text
//! [offset: i64] [size: i32] [crc: u32] [magic: i8] [attributes: i8] [key: bytes] [value: bytes]
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use kafka08::encode::{LengthWidth, ToByte, encode_string};
use kafka08::error::Error;
use kafka08::message::{
    Compression, Message, decode_message, decode_message_set, encode_message, encode_message_set,
};
use kafka08::parser::{decode_offset32, decode_offset64, parse_length_prefixed};
use kafka08::protocol::{
    ApiKey, KafkaCodec, MetadataCodec, MetadataRequest, ProduceCodec, ProduceRequest,
    RequestHeader,
};
use kafka08::types::{CorrelationId, Offset};
use nombytes::NomBytes;

// ============================================================================
// Strings
// ============================================================================

#[test]
fn test_null_string_sentinel_per_width() {
    let mut short = Vec::new();
    encode_string(&mut short, None, LengthWidth::Int16).unwrap();
    assert_eq!(short, vec![0xFF, 0xFF]);

    let mut long = Vec::new();
    encode_string(&mut long, Some(&b""[..]), LengthWidth::Int32).unwrap();
    assert_eq!(long, vec![0xFF, 0xFF, 0xFF, 0xFF]);
}

#[test]
fn test_decode_string_both_widths() {
    let mut data = BytesMut::new();
    encode_string(&mut data, Some(&b"topic"[..]), LengthWidth::Int16).unwrap();
    encode_string(&mut data, None, LengthWidth::Int32).unwrap();
    encode_string(&mut data, Some(&b"value"[..]), LengthWidth::Int32).unwrap();

    let input = NomBytes::new(data.freeze());
    let (input, first) = parse_length_prefixed(LengthWidth::Int16)(input).unwrap();
    let (input, second) = parse_length_prefixed(LengthWidth::Int32)(input).unwrap();
    let (input, third) = parse_length_prefixed(LengthWidth::Int32)(input).unwrap();

    assert_eq!(first, Some(Bytes::from_static(b"topic")));
    assert_eq!(second, None);
    assert_eq!(third, Some(Bytes::from_static(b"value")));
    assert!(input.into_bytes().is_empty());
}

#[test]
fn test_decode_string_rejects_bad_lengths() {
    let negative = NomBytes::new(Bytes::from((-7i32).to_be_bytes().to_vec()));
    assert!(parse_length_prefixed(LengthWidth::Int32)(negative).is_err());

    let mut overrun = Vec::new();
    overrun.extend_from_slice(&100i16.to_be_bytes());
    overrun.extend_from_slice(b"short");
    let overrun = NomBytes::new(Bytes::from(overrun));
    assert!(parse_length_prefixed(LengthWidth::Int16)(overrun).is_err());
}

// ============================================================================
// Messages
// ============================================================================

#[test]
fn test_hello_message_vector() {
    let message = Message::new("topic1", 2, "Hello!").unwrap();
    let data = encode_message(&message, Some(Compression::None)).unwrap();

    let expected: &[u8] = &[
        0, 0, 0, 0, 0, 0, 0, 0, // offset placeholder
        0, 0, 0, 20, // size
        0x8D, 0xC7, 0x95, 0xA2, // crc
        0, // magic
        0, // attributes
        0xFF, 0xFF, 0xFF, 0xFF, // null key
        0, 0, 0, 6, // value length
        b'H', b'e', b'l', b'l', b'o', b'!',
    ];
    assert_eq!(data.as_ref(), expected);
}

#[test]
fn test_keyed_message_layout() {
    let message = Message::new("topic1", 2, "Hello!").unwrap().with_key("foo");
    let data = encode_message(&message, None).unwrap();

    assert_eq!(&data[18..25], &[0, 0, 0, 3, b'f', b'o', b'o']);
    assert_eq!(&data[25..29], &[0, 0, 0, 6]);
    assert_eq!(&data[29..], b"Hello!");
}

#[test]
fn test_message_round_trip_preserves_fields() {
    let message = Message::new("events", 4, "payload").unwrap().with_key("user-1");
    let decoded = decode_message("events", 4, encode_message(&message, None).unwrap()).unwrap();

    assert_eq!(decoded.topic(), "events");
    assert_eq!(decoded.partition().value(), 4);
    assert_eq!(decoded.payload().as_ref(), b"payload");
    assert_eq!(decoded.key().map(|k| k.as_ref()), Some(&b"user-1"[..]));
    assert_eq!(decoded.offset(), Some(Offset::PLACEHOLDER));
}

#[test]
fn test_gzip_message_decodes_to_original_payload() {
    let payload = "compressible ".repeat(64);
    let message = Message::new("events", 0, payload.clone())
        .unwrap()
        .with_compression(Compression::Gzip);
    let data = encode_message(&message, None).unwrap();

    assert_eq!(data[17] as i8, Compression::Gzip.attribute());
    assert!(data.len() < payload.len());

    let decoded = decode_message("events", 0, data).unwrap();
    assert_eq!(decoded.payload().as_ref(), payload.as_bytes());
}

#[test]
fn test_unsupported_magic_rejected() {
    let message = Message::new("t", 0, "x").unwrap();
    let mut data = BytesMut::from(&encode_message(&message, None).unwrap()[..]);
    data[16] = 1;
    // Keep the CRC valid so only the magic byte is wrong.
    let crc = crc32fast::hash(&data[16..]);
    data[12..16].copy_from_slice(&crc.to_be_bytes());

    let err = decode_message("t", 0, data.freeze()).unwrap_err();
    assert!(matches!(err, Error::InvalidMessage(msg) if msg.contains("magic")));
}

#[test]
fn test_message_set_has_no_set_prefix() {
    let messages = [
        Message::new("t", 0, "one").unwrap(),
        Message::new("t", 0, "two").unwrap(),
        Message::new("t", 0, "three").unwrap(),
    ];
    let set = encode_message_set(&messages).unwrap();

    // The first entry starts right away with its offset placeholder.
    assert_eq!(&set[..8], &[0; 8]);
    let decoded = decode_message_set("t", 0, set).unwrap();
    let payloads: Vec<_> = decoded.iter().map(|m| m.payload().clone()).collect();
    assert_eq!(payloads, vec!["one", "two", "three"]);
}

// ============================================================================
// Offsets
// ============================================================================

#[test]
fn test_offsets_from_both_widths_agree() {
    let wide = decode_offset64(&[0, 0, 0, 0, 0, 0, 0x30, 0x39]).unwrap();
    let narrow = decode_offset32(&[0, 0, 0x30, 0x39]).unwrap();
    assert_eq!(wide, narrow);
    assert_eq!(wide.value(), 12345);
}

// ============================================================================
// Requests
// ============================================================================

#[test]
fn test_metadata_request_frame() {
    let mut frame = BytesMut::new();
    RequestHeader::new(ApiKey::Metadata, CorrelationId::new(1), "kafka08")
        .encode(&mut frame)
        .unwrap();
    frame.put(MetadataCodec::encode_request(&MetadataRequest::new(["test"])).unwrap());

    let expected: &[u8] = &[
        0, 3, // api key
        0, 0, // api version
        0, 0, 0, 1, // correlation id
        0, 7, b'k', b'a', b'f', b'k', b'a', b'0', b'8', // client id
        0, 0, 0, 1, // topic count
        0, 4, b't', b'e', b's', b't',
    ];
    assert_eq!(frame.as_ref(), expected);
}

#[test]
fn test_produce_request_embeds_message_set() {
    let message = Message::new("test", 0, "Hello!").unwrap();
    let set = encode_message_set([&message]).unwrap();
    let body = ProduceCodec::encode_request(&ProduceRequest::single(
        0,
        1000,
        "test",
        0,
        set.clone(),
    ))
    .unwrap();

    // acks(2) + timeout(4) + topic count(4) + topic(2+4) + partition count(4)
    // + partition(4) + set size(4)
    let header_len = 2 + 4 + 4 + 6 + 4 + 4 + 4;
    assert_eq!(&body[..2], &[0, 0]);
    assert_eq!(&body[2..6], &1000i32.to_be_bytes());
    assert_eq!(&body[header_len - 4..header_len], &(set.len() as i32).to_be_bytes());
    assert_eq!(&body[header_len..], set.as_ref());
}
