//! Produce API codec.

use bytes::{BufMut, Bytes, BytesMut};
use nom::{
    IResult,
    number::complete::{be_i16, be_i32},
};
use nombytes::NomBytes;

use super::{ApiKey, KafkaCodec};
use crate::encode::{ToByte, encode_array};
use crate::error::{Error, Result};
use crate::parser::{parse_array, parse_complete, parse_offset, parse_string};
use crate::types::Offset;

/// Produce request data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceRequest {
    pub required_acks: i16,
    pub ack_timeout_ms: i32,
    pub topics: Vec<ProduceTopicData>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceTopicData {
    pub name: String,
    pub partitions: Vec<ProducePartitionData>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducePartitionData {
    pub partition: i32,
    /// An encoded message set, written with an `int32` size prefix.
    pub message_set: Bytes,
}

impl ProduceRequest {
    /// A request carrying one message set for one topic partition.
    pub fn single(
        required_acks: i16,
        ack_timeout_ms: i32,
        topic: &str,
        partition: i32,
        message_set: Bytes,
    ) -> Self {
        Self {
            required_acks,
            ack_timeout_ms,
            topics: vec![ProduceTopicData {
                name: topic.to_string(),
                partitions: vec![ProducePartitionData {
                    partition,
                    message_set,
                }],
            }],
        }
    }
}

impl ToByte for ProduceRequest {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.required_acks.encode(buffer)?;
        self.ack_timeout_ms.encode(buffer)?;
        encode_array(buffer, &self.topics)
    }
}

impl ToByte for ProduceTopicData {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.name.encode(buffer)?;
        encode_array(buffer, &self.partitions)
    }
}

impl ToByte for ProducePartitionData {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        let size = i32::try_from(self.message_set.len()).map_err(|_| {
            Error::Encoding(format!(
                "message set of {} bytes is too large",
                self.message_set.len()
            ))
        })?;
        self.partition.encode(buffer)?;
        size.encode(buffer)?;
        buffer.put_slice(&self.message_set);
        Ok(())
    }
}

/// Produce response data.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProduceResponse {
    pub topics: Vec<ProduceTopicResponse>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceTopicResponse {
    pub name: String,
    pub partitions: Vec<ProducePartitionResponse>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducePartitionResponse {
    pub partition: i32,
    pub error_code: i16,
    /// Offset assigned to the first message of the set.
    pub offset: Offset,
}

impl ProduceResponse {
    /// Find the result reported for one topic partition.
    pub fn partition(&self, topic: &str, partition: i32) -> Option<&ProducePartitionResponse> {
        self.topics
            .iter()
            .filter(|t| t.name == topic)
            .flat_map(|t| t.partitions.iter())
            .find(|p| p.partition == partition)
    }
}

/// Codec for the Produce API (key 0, version 0).
pub struct ProduceCodec;

impl KafkaCodec for ProduceCodec {
    type Request = ProduceRequest;
    type Response = ProduceResponse;

    fn api_key() -> ApiKey {
        ApiKey::Produce
    }

    fn encode_request(request: &Self::Request) -> Result<Bytes> {
        let set_len: usize = request
            .topics
            .iter()
            .flat_map(|t| t.partitions.iter())
            .map(|p| p.message_set.len())
            .sum();
        let mut buffer = BytesMut::with_capacity(64 + set_len);
        request.encode(&mut buffer)?;
        Ok(buffer.freeze())
    }

    fn decode_response(bytes: Bytes) -> Result<Self::Response> {
        parse_complete(bytes, parse_produce_response)
    }
}

fn parse_produce_response(s: NomBytes) -> IResult<NomBytes, ProduceResponse> {
    let (s, topics) = parse_array(parse_produce_topic)(s)?;
    Ok((s, ProduceResponse { topics }))
}

fn parse_produce_topic(s: NomBytes) -> IResult<NomBytes, ProduceTopicResponse> {
    let (s, name) = parse_string(s)?;
    let (s, partitions) = parse_array(parse_produce_partition)(s)?;
    Ok((s, ProduceTopicResponse { name, partitions }))
}

fn parse_produce_partition(s: NomBytes) -> IResult<NomBytes, ProducePartitionResponse> {
    let (s, partition) = be_i32(s)?;
    let (s, error_code) = be_i16(s)?;
    let (s, offset) = parse_offset(s)?;

    Ok((
        s,
        ProducePartitionResponse {
            partition,
            error_code,
            offset,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_produce_codec_api_key() {
        assert_eq!(ProduceCodec::api_key(), ApiKey::Produce);
    }

    #[test]
    fn test_encode_request_layout() {
        let request = ProduceRequest::single(1, 1000, "t", 2, Bytes::from_static(b"abc"));
        let bytes = ProduceCodec::encode_request(&request).unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(&1i16.to_be_bytes());
        expected.extend_from_slice(&1000i32.to_be_bytes());
        expected.extend_from_slice(&1i32.to_be_bytes()); // topics
        expected.extend_from_slice(&[0, 1, b't']);
        expected.extend_from_slice(&1i32.to_be_bytes()); // partitions
        expected.extend_from_slice(&2i32.to_be_bytes());
        expected.extend_from_slice(&3i32.to_be_bytes());
        expected.extend_from_slice(b"abc");
        assert_eq!(bytes.as_ref(), expected.as_slice());
    }

    #[test]
    fn test_decode_response() {
        let mut buf = BytesMut::new();
        buf.put_i32(1);
        buf.put_i16(4);
        buf.put_slice(b"test");
        buf.put_i32(2);
        buf.put_i32(0);
        buf.put_i16(0);
        buf.put_i64(42);
        buf.put_i32(1);
        buf.put_i16(6);
        buf.put_i64(-1);

        let response = ProduceCodec::decode_response(buf.freeze()).unwrap();
        let p0 = response.partition("test", 0).unwrap();
        assert_eq!(p0.error_code, 0);
        assert_eq!(p0.offset, Offset::new(42));
        assert_eq!(response.partition("test", 1).unwrap().error_code, 6);
        assert!(response.partition("test", 2).is_none());
        assert!(response.partition("other", 0).is_none());
    }

    #[test]
    fn test_decode_response_trailing_bytes() {
        let mut buf = BytesMut::new();
        buf.put_i32(0);
        buf.put_u8(1);
        assert!(matches!(
            ProduceCodec::decode_response(buf.freeze()),
            Err(Error::Protocol(_))
        ));
    }
}
