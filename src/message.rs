//! Messages and their message-set wire format.
//!
//! # Message-set entry layout
//!
//! ```text
//! Offset  Size  Field
//! 0       8     offset (placeholder 0 on produce, assigned by the broker)
//! 8       4     message size (everything after this field)
//! 12      4     crc32 of the bytes that follow it
//! 16      1     magic (0)
//! 17      1     attributes (compression codec: 0 none, 1 gzip, 2 snappy)
//! 18      4     key length (-1 for no key)
//! 22      k     key
//! 22+k    4     value length (-1 for no value)
//! 26+k    v     value, compressed with the codec named in attributes
//! ```
//!
//! A message set is a plain concatenation of such entries with no set-level
//! length prefix; callers add one where the request layout requires it.

use std::io::{Read, Write};

use bytes::{BufMut, Bytes, BytesMut};
use flate2::Compression as GzLevel;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use nom::{
    IResult,
    bytes::complete::take,
    multi::many0,
    number::complete::{be_i8, be_i32, be_u32},
};
use nombytes::NomBytes;

use crate::constants::{COMPRESSION_CODEC_MASK, MESSAGE_ENTRY_HEADER_LEN, MESSAGE_MAGIC, MESSAGE_OVERHEAD};
use crate::encode::{LengthWidth, ToByte, encode_string};
use crate::error::{Error, Result};
use crate::parser::{parse_complete, parse_nullable_bytes, parse_offset};
use crate::types::{Offset, PartitionId};

/// Payload compression codec, carried in the message attributes byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Compression {
    #[default]
    None = 0,
    Gzip = 1,
    /// Recognized on the wire but not supported by this client.
    Snappy = 2,
}

impl Compression {
    /// The attributes byte for this codec.
    pub fn attribute(self) -> i8 {
        self as i8
    }

    /// Extract the codec from a message attributes byte.
    pub fn from_attribute(attributes: i8) -> Result<Self> {
        Self::try_from(attributes & COMPRESSION_CODEC_MASK)
    }

    fn compress(self, payload: &[u8]) -> Result<Bytes> {
        match self {
            Compression::None => Ok(Bytes::copy_from_slice(payload)),
            Compression::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), GzLevel::default());
                encoder
                    .write_all(payload)
                    .and_then(|_| encoder.finish())
                    .map(Bytes::from)
                    .map_err(|e| Error::Encoding(format!("gzip compression failed: {e}")))
            }
            Compression::Snappy => Err(Error::Encoding(
                "Snappy compression not implemented".to_string(),
            )),
        }
    }

    fn decompress(self, payload: Bytes) -> Result<Bytes> {
        match self {
            Compression::None => Ok(payload),
            Compression::Gzip => {
                let mut decoded = Vec::new();
                GzDecoder::new(payload.as_ref())
                    .read_to_end(&mut decoded)
                    .map_err(|e| Error::Encoding(format!("gzip decompression failed: {e}")))?;
                Ok(Bytes::from(decoded))
            }
            Compression::Snappy => Err(Error::Encoding(
                "Snappy decompression not implemented".to_string(),
            )),
        }
    }
}

impl TryFrom<i8> for Compression {
    type Error = Error;

    fn try_from(codec: i8) -> Result<Self> {
        match codec {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Gzip),
            2 => Ok(Compression::Snappy),
            other => Err(Error::Encoding(format!(
                "Unknown kafka compression codec {other}"
            ))),
        }
    }
}

/// A single message addressed to a topic partition.
///
/// Immutable once built; the offset is only set on messages decoded from
/// wire bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    topic: String,
    partition: PartitionId,
    payload: Bytes,
    key: Option<Bytes>,
    compression: Compression,
    offset: Option<Offset>,
}

impl Message {
    /// Create an uncompressed, unkeyed message.
    ///
    /// Fails when `topic` is empty or `partition` is negative.
    pub fn new(topic: impl Into<String>, partition: i32, payload: impl Into<Bytes>) -> Result<Self> {
        let topic = topic.into();
        if topic.is_empty() {
            return Err(Error::InvalidMessage(
                "Topic name cannot be an empty string".to_string(),
            ));
        }
        if partition < 0 {
            return Err(Error::InvalidMessage(
                "Partition must be a positive integer or 0".to_string(),
            ));
        }

        Ok(Self {
            topic,
            partition: PartitionId::new(partition),
            payload: payload.into(),
            key: None,
            compression: Compression::None,
            offset: None,
        })
    }

    pub fn with_key(mut self, key: impl Into<Bytes>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_offset(mut self, offset: Offset) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> PartitionId {
        self.partition
    }

    /// The uncompressed payload.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn key(&self) -> Option<&Bytes> {
        self.key.as_ref()
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Position in the broker log, known only for decoded messages.
    pub fn offset(&self) -> Option<Offset> {
        self.offset
    }
}

/// Encode one message as a message-set entry.
///
/// `compression_override` replaces the message's own codec when given.
pub fn encode_message(message: &Message, compression_override: Option<Compression>) -> Result<Bytes> {
    let compression = compression_override.unwrap_or(message.compression);
    let value = compression.compress(&message.payload)?;

    let key_len = message.key.as_ref().map_or(0, |k| k.len());
    let mut body = BytesMut::with_capacity(MESSAGE_OVERHEAD - 4 + key_len + value.len());
    MESSAGE_MAGIC.encode(&mut body)?;
    compression.attribute().encode(&mut body)?;
    encode_string(&mut body, message.key.as_deref(), LengthWidth::Int32)?;
    encode_string(&mut body, Some(&value[..]), LengthWidth::Int32)?;

    let crc = crc32fast::hash(&body);

    let mut entry = BytesMut::with_capacity(MESSAGE_ENTRY_HEADER_LEN + 4 + body.len());
    Offset::PLACEHOLDER.encode(&mut entry)?;
    ((body.len() + 4) as i32).encode(&mut entry)?;
    crc.encode(&mut entry)?;
    entry.put_slice(&body);
    Ok(entry.freeze())
}

/// Encode messages back to back, in order.
pub fn encode_message_set<'a, I>(messages: I) -> Result<Bytes>
where
    I: IntoIterator<Item = &'a Message>,
{
    let mut set = BytesMut::new();
    for message in messages {
        set.put(encode_message(message, None)?);
    }
    Ok(set.freeze())
}

/// A message-set entry as read from the wire, before validation.
struct RawMessage {
    offset: Offset,
    crc: u32,
    /// Bytes covered by the CRC.
    checked: Bytes,
    magic: i8,
    attributes: i8,
    key: Option<Bytes>,
    value: Option<Bytes>,
}

impl RawMessage {
    fn into_message(self, topic: &str, partition: i32) -> Result<Message> {
        let computed = crc32fast::hash(&self.checked);
        if computed != self.crc {
            return Err(Error::InvalidMessage(format!(
                "CRC mismatch at offset {}: stored {:08x}, computed {:08x}",
                self.offset, self.crc, computed
            )));
        }
        if self.magic != MESSAGE_MAGIC {
            return Err(Error::InvalidMessage(format!(
                "unsupported message format (magic byte {})",
                self.magic
            )));
        }

        let compression = Compression::from_attribute(self.attributes)?;
        let payload = compression.decompress(self.value.unwrap_or_default())?;

        let mut message = Message::new(topic, partition, payload)?
            .with_compression(compression)
            .with_offset(self.offset);
        message.key = self.key;
        Ok(message)
    }
}

fn parse_message_entry(s: NomBytes) -> IResult<NomBytes, RawMessage> {
    let (s, offset) = parse_offset(s)?;
    let (s, size) = be_i32(s)?;
    if size < 0 {
        return Err(nom::Err::Failure(nom::error::Error::new(
            s,
            nom::error::ErrorKind::TooLarge,
        )));
    }
    let (s, body) = take(size as usize)(s)?;

    let (body, crc) = be_u32(body)?;
    let checked = body.clone().into_bytes();
    let (body, magic) = be_i8(body)?;
    let (body, attributes) = be_i8(body)?;
    let (body, key) = parse_nullable_bytes(body)?;
    let (body, value) = parse_nullable_bytes(body)?;
    if !body.into_bytes().is_empty() {
        return Err(nom::Err::Failure(nom::error::Error::new(
            s,
            nom::error::ErrorKind::Eof,
        )));
    }

    Ok((
        s,
        RawMessage {
            offset,
            crc,
            checked,
            magic,
            attributes,
            key,
            value,
        },
    ))
}

/// Decode a single message-set entry.
pub fn decode_message(topic: &str, partition: i32, entry: Bytes) -> Result<Message> {
    parse_complete(entry, parse_message_entry)?.into_message(topic, partition)
}

/// Decode every entry of a message set.
///
/// A truncated trailing entry is an error, not silently dropped.
pub fn decode_message_set(topic: &str, partition: i32, set: Bytes) -> Result<Vec<Message>> {
    parse_complete(set, many0(parse_message_entry))?
        .into_iter()
        .map(|raw| raw.into_message(topic, partition))
        .collect()
}
