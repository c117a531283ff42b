//! Metadata API codec.
//!
//! Request: `int32 topic_count | string topic...`. An empty topic list asks
//! the broker for every topic.
//!
//! Response:
//!
//! ```text
//! int32 broker_count | { int32 node_id, string host, int32 port }...
//! int32 topic_count  | { int16 error_code, string name, int32 partition_count,
//!                        { int16 error_code, int32 partition, int32 leader,
//!                          int32 replica_count, int32 replica...,
//!                          int32 isr_count, int32 isr... }... }...
//! ```

use std::collections::BTreeMap;

use bytes::{Bytes, BytesMut};
use nom::{
    IResult,
    number::complete::{be_i16, be_i32},
};
use nombytes::NomBytes;

use super::{ApiKey, KafkaCodec};
use crate::encode::encode_array;
use crate::error::Result;
use crate::parser::{parse_array, parse_complete, parse_string};
use crate::types::{BrokerId, PartitionId};

/// Topics to describe.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetadataRequest {
    pub topics: Vec<String>,
}

impl MetadataRequest {
    pub fn new<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            topics: topics.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<&str> for MetadataRequest {
    fn from(topic: &str) -> Self {
        Self::new([topic])
    }
}

impl From<String> for MetadataRequest {
    fn from(topic: String) -> Self {
        Self::new([topic])
    }
}

impl<S: Into<String>> From<Vec<S>> for MetadataRequest {
    fn from(topics: Vec<S>) -> Self {
        Self::new(topics)
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for MetadataRequest {
    fn from(topics: [S; N]) -> Self {
        Self::new(topics)
    }
}

/// A broker as advertised in a metadata response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BrokerInfo {
    pub id: BrokerId,
    pub host: String,
    pub port: i32,
}

impl BrokerInfo {
    /// The `host:port` address used to key connections.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionMetadata {
    pub partition: PartitionId,
    pub error_code: i16,
    pub leader: BrokerId,
    pub replicas: Vec<BrokerId>,
    pub isr: Vec<BrokerId>,
}

impl PartitionMetadata {
    /// The leader id, if the broker reported one.
    pub fn leader(&self) -> Option<BrokerId> {
        self.leader.is_valid().then_some(self.leader)
    }
}

/// Per-topic metadata, partitions keyed by id.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TopicMetadata {
    pub error_code: i16,
    pub partitions: BTreeMap<i32, PartitionMetadata>,
}

impl TopicMetadata {
    pub fn partition(&self, partition: i32) -> Option<&PartitionMetadata> {
        self.partitions.get(&partition)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetadataResponse {
    pub brokers: Vec<BrokerInfo>,
    /// Topics in response order.
    pub topics: Vec<(String, TopicMetadata)>,
}

/// Codec for the Metadata API (key 3, version 0).
pub struct MetadataCodec;

impl KafkaCodec for MetadataCodec {
    type Request = MetadataRequest;
    type Response = MetadataResponse;

    fn api_key() -> ApiKey {
        ApiKey::Metadata
    }

    fn encode_request(request: &Self::Request) -> Result<Bytes> {
        let mut buffer = BytesMut::with_capacity(64);
        encode_array(&mut buffer, &request.topics)?;
        Ok(buffer.freeze())
    }

    fn decode_response(bytes: Bytes) -> Result<Self::Response> {
        parse_complete(bytes, parse_metadata_response)
    }
}

fn parse_metadata_response(s: NomBytes) -> IResult<NomBytes, MetadataResponse> {
    let (s, brokers) = parse_array(parse_broker)(s)?;
    let (s, topics) = parse_array(parse_topic_metadata)(s)?;
    Ok((s, MetadataResponse { brokers, topics }))
}

fn parse_broker(s: NomBytes) -> IResult<NomBytes, BrokerInfo> {
    let (s, node_id) = be_i32(s)?;
    let (s, host) = parse_string(s)?;
    let (s, port) = be_i32(s)?;

    Ok((
        s,
        BrokerInfo {
            id: BrokerId::new(node_id),
            host,
            port,
        },
    ))
}

fn parse_topic_metadata(s: NomBytes) -> IResult<NomBytes, (String, TopicMetadata)> {
    let (s, error_code) = be_i16(s)?;
    let (s, name) = parse_string(s)?;
    let (s, partitions) = parse_array(parse_partition_metadata)(s)?;

    let partitions = partitions
        .into_iter()
        .map(|p| (p.partition.value(), p))
        .collect();
    Ok((
        s,
        (
            name,
            TopicMetadata {
                error_code,
                partitions,
            },
        ),
    ))
}

fn parse_broker_ids(s: NomBytes) -> IResult<NomBytes, Vec<BrokerId>> {
    let (s, ids) = parse_array(be_i32::<NomBytes, nom::error::Error<NomBytes>>)(s)?;
    Ok((s, ids.into_iter().map(BrokerId::new).collect()))
}

fn parse_partition_metadata(s: NomBytes) -> IResult<NomBytes, PartitionMetadata> {
    let (s, error_code) = be_i16(s)?;
    let (s, partition) = be_i32(s)?;
    let (s, leader) = be_i32(s)?;
    let (s, replicas) = parse_broker_ids(s)?;
    let (s, isr) = parse_broker_ids(s)?;

    Ok((
        s,
        PartitionMetadata {
            partition: PartitionId::new(partition),
            error_code,
            leader: BrokerId::new(leader),
            replicas,
            isr,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use bytes::BufMut;

    #[test]
    fn test_metadata_codec_api_key() {
        assert_eq!(MetadataCodec::api_key(), ApiKey::Metadata);
    }

    #[test]
    fn test_encode_request_single_topic() {
        let request = MetadataRequest::new(["test"]);
        let bytes = MetadataCodec::encode_request(&request).unwrap();
        assert_eq!(bytes.as_ref(), b"\x00\x00\x00\x01\x00\x04test");
    }

    #[test]
    fn test_single_topic_becomes_one_element_list() {
        assert_eq!(MetadataRequest::from("test"), MetadataRequest::new(["test"]));
        assert_eq!(
            MetadataRequest::from("test".to_string()).topics,
            vec!["test".to_string()]
        );
        assert_eq!(
            MetadataRequest::from(vec!["a", "b"]).topics,
            vec!["a".to_string(), "b".to_string()]
        );
        assert!(MetadataRequest::from(Vec::<String>::new()).topics.is_empty());
    }

    #[test]
    fn test_encode_request_all_topics() {
        let bytes = MetadataCodec::encode_request(&MetadataRequest::default()).unwrap();
        assert_eq!(bytes.as_ref(), &[0, 0, 0, 0]);
    }

    fn sample_response() -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_i32(1); // brokers
        buf.put_i32(0);
        buf.put_i16(9);
        buf.put_slice(b"localhost");
        buf.put_i32(9092);
        buf.put_i32(1); // topics
        buf.put_i16(0);
        buf.put_i16(4);
        buf.put_slice(b"test");
        buf.put_i32(1); // partitions
        buf.put_i16(0);
        buf.put_i32(0); // partition id
        buf.put_i32(0); // leader
        buf.put_i32(2); // replicas
        buf.put_i32(0);
        buf.put_i32(1);
        buf.put_i32(1); // isr
        buf.put_i32(0);
        buf.freeze()
    }

    #[test]
    fn test_decode_response() {
        let response = MetadataCodec::decode_response(sample_response()).unwrap();

        assert_eq!(response.brokers.len(), 1);
        assert_eq!(response.brokers[0].address(), "localhost:9092");

        let (name, topic) = &response.topics[0];
        assert_eq!(name, "test");
        let partition = topic.partition(0).unwrap();
        assert_eq!(partition.leader(), Some(BrokerId::new(0)));
        assert_eq!(partition.replicas, vec![BrokerId::new(0), BrokerId::new(1)]);
        assert_eq!(partition.isr, vec![BrokerId::new(0)]);
    }

    #[test]
    fn test_decode_response_no_leader() {
        let mut buf = BytesMut::new();
        buf.put_i32(0);
        buf.put_i32(1);
        buf.put_i16(5);
        buf.put_i16(1);
        buf.put_slice(b"t");
        buf.put_i32(1);
        buf.put_i16(5);
        buf.put_i32(3);
        buf.put_i32(-1);
        buf.put_i32(0);
        buf.put_i32(0);

        let response = MetadataCodec::decode_response(buf.freeze()).unwrap();
        let (_, topic) = &response.topics[0];
        assert_eq!(topic.error_code, 5);
        assert_eq!(topic.partition(3).unwrap().leader(), None);
    }

    #[test]
    fn test_decode_response_trailing_bytes() {
        let mut buf = BytesMut::from(&sample_response()[..]);
        buf.put_u8(0);
        assert!(matches!(
            MetadataCodec::decode_response(buf.freeze()),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_decode_response_truncated() {
        let bytes = sample_response();
        let truncated = bytes.slice(..bytes.len() - 2);
        assert!(MetadataCodec::decode_response(truncated).is_err());
    }
}
