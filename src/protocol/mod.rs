//! Kafka 0.8 request/response pairs.
//!
//! Every request travels in the same envelope:
//!
//! ```text
//! int32 size | int16 api_key | int16 api_version (0) | int32 correlation_id | string client_id | body
//! ```
//!
//! and every response comes back as `int32 size | int32 correlation_id | body`.
//! The size prefix and the response correlation id are handled by
//! [`Channel`](crate::channel::Channel); this module deals with the header
//! fields after the size and with the bodies.
//!
//! # Supported APIs
//!
//! | API | Key | Codec |
//! |-----|-----|-------|
//! | Produce | 0 | `ProduceCodec` |
//! | Metadata | 3 | `MetadataCodec` |

mod metadata;
mod produce;

pub use metadata::{
    BrokerInfo, MetadataCodec, MetadataRequest, MetadataResponse, PartitionMetadata,
    TopicMetadata,
};
pub use produce::{
    ProduceCodec, ProducePartitionData, ProducePartitionResponse, ProduceRequest,
    ProduceResponse, ProduceTopicData, ProduceTopicResponse,
};

use bytes::{BufMut, Bytes};

use crate::constants::{API_KEY_METADATA, API_KEY_PRODUCE, REQUEST_API_VERSION};
use crate::encode::{LengthWidth, ToByte, encode_string};
use crate::error::Result;
use crate::types::CorrelationId;

/// API keys spoken by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum ApiKey {
    Produce = API_KEY_PRODUCE,
    Metadata = API_KEY_METADATA,
}

impl ApiKey {
    pub fn code(self) -> i16 {
        self as i16
    }
}

/// The request header that follows the size prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHeader<'a> {
    pub api_key: ApiKey,
    pub api_version: i16,
    pub correlation_id: CorrelationId,
    pub client_id: &'a str,
}

impl<'a> RequestHeader<'a> {
    pub fn new(api_key: ApiKey, correlation_id: CorrelationId, client_id: &'a str) -> Self {
        Self {
            api_key,
            api_version: REQUEST_API_VERSION,
            correlation_id,
            client_id,
        }
    }
}

impl ToByte for RequestHeader<'_> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.api_key.code().encode(buffer)?;
        self.api_version.encode(buffer)?;
        self.correlation_id.encode(buffer)?;
        encode_string(buffer, Some(self.client_id.as_bytes()), LengthWidth::Int16)
    }
}

/// Trait for Kafka protocol codecs.
///
/// Each API implements this to pair its request encoding with its response
/// decoding. Bodies exclude the request header and the response correlation
/// id.
pub trait KafkaCodec {
    /// The request type for this API.
    type Request;

    /// The response type for this API.
    type Response;

    /// The Kafka API key for this operation.
    fn api_key() -> ApiKey;

    /// Encode a request body.
    fn encode_request(request: &Self::Request) -> Result<Bytes>;

    /// Decode a complete response body.
    ///
    /// Trailing bytes after the body are an error.
    fn decode_response(bytes: Bytes) -> Result<Self::Response>;
}
