//! Crate & protocol level errors.
//!
//! Every fallible operation in this crate returns [`Error`]. Variants are
//! grouped by where the failure originates rather than by which call
//! raised it:
//!
//! - **Encoding**: [`Error::Encoding`], [`Error::ParsingError`],
//!   [`Error::InvalidMessage`]. Never retried automatically.
//! - **Transport**: [`Error::Transport`]. The channel is closed; the next
//!   operation reconnects.
//! - **Protocol framing**: [`Error::Protocol`], [`Error::EndOfStream`].
//!   Fatal to the response being read.
//! - **Server**: [`Error::Broker`] and [`Error::UnknownErrorCode`], raised for
//!   a non-zero partition error code in a response.
//! - **Routing**: [`Error::Routing`], the partition has no reachable leader
//!   in the latest metadata.
//! - **Not implemented**: [`Error::NotImplemented`].
//!
//! Broker error numbers are mapped to [`KafkaCode`] in exactly one place,
//! [`KafkaCode::from_wire`].

use bytes::Bytes;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use std::{io, result};
use thiserror::Error as ThisError;

pub type Result<T> = result::Result<T, Error>;

/// Client errors.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum Error {
    /// A value could not be turned into wire bytes (bad or unsupported
    /// compression codec, oversized field).
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Could not parse the data.
    #[error("Parsing error: invalid data ({} bytes)", .0.len())]
    ParsingError(Bytes),

    /// Socket creation, write or read failure.
    #[error("Transport error ({kind:?}): {message}")]
    Transport { kind: io::ErrorKind, message: String },

    /// The stream ended, or the caller asked for more bytes than the
    /// response declared.
    #[error("End of stream: {0}")]
    EndOfStream(String),

    /// Response framing is corrupt or the channel is in the wrong state.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The broker rejected a partition with a known error code.
    #[error("Broker returned {code:?} for {topic}/{partition}")]
    Broker {
        code: KafkaCode,
        topic: String,
        partition: i32,
    },

    /// The broker returned an error code this client does not know.
    #[error("Unknown response error code {code} for {topic}/{partition}")]
    UnknownErrorCode {
        code: i16,
        topic: String,
        partition: i32,
    },

    /// No leader could be resolved for a partition.
    #[error("Cannot route {topic}/{partition}: {reason}")]
    Routing {
        topic: String,
        partition: i32,
        reason: String,
    },

    /// The operation exists in the interface but is not supported.
    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),

    /// A message value failed validation or integrity checks.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Build a transport error from an I/O failure, keeping some context.
    pub fn transport(context: &str, e: &io::Error) -> Self {
        Error::Transport {
            kind: e.kind(),
            message: format!("{context}: {e}"),
        }
    }

    /// Build a routing error.
    pub fn routing(topic: &str, partition: i32, reason: impl Into<String>) -> Self {
        Error::Routing {
            topic: topic.to_string(),
            partition,
            reason: reason.into(),
        }
    }

    /// Translate a per-partition error code from a response.
    ///
    /// Returns `None` for success (0).
    pub fn from_partition_code(code: i16, topic: &str, partition: i32) -> Option<Self> {
        match KafkaCode::from_wire(code) {
            Some(KafkaCode::None) => None,
            Some(code) => Some(Error::Broker {
                code,
                topic: topic.to_string(),
                partition,
            }),
            None => Some(Error::UnknownErrorCode {
                code,
                topic: topic.to_string(),
                partition,
            }),
        }
    }

    /// True for socket level failures.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport { .. })
    }

    /// True when calling `flush` again may succeed without any change on
    /// the caller's side.
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::Transport { .. } | Error::EndOfStream(_) | Error::Routing { .. } => true,
            Error::Broker { code, .. } => code.is_retriable(),
            _ => false,
        }
    }

    /// The broker error code carried by this error, if any.
    pub fn kafka_code(&self) -> Option<KafkaCode> {
        match self {
            Error::Broker { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Transport {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// Error codes reported by a Kafka 0.8 broker.
/// See also [Kafka Errors](https://cwiki.apache.org/confluence/display/KAFKA/A+Guide+To+The+Kafka+Protocol#AGuideToTheKafkaProtocol-ErrorCodes)
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, FromPrimitive, Default)]
pub enum KafkaCode {
    /// An unexpected server error
    Unknown = -1,
    #[default]
    None = 0,
    /// The requested offset is outside the range of offsets
    /// maintained by the server for the given topic/partition
    OffsetOutOfRange = 1,
    /// The message contents does not match its CRC
    InvalidMessage = 2,
    /// This request is for a topic or partition that does not exist
    /// on this broker.
    UnknownTopicOrPartition = 3,
    /// The message has a negative size
    InvalidMessageSize = 4,
    /// There is currently no leader for this partition (election in
    /// progress) and hence it is unavailable for writes.
    LeaderNotAvailable = 5,
    /// The client sent messages to a replica that is not the leader.
    /// Its metadata is out of date.
    NotLeaderForPartition = 6,
    /// The request exceeded the time limit given in the request.
    RequestTimedOut = 7,
    /// Used mostly by tools when a broker is not alive.
    BrokerNotAvailable = 8,
    /// A replica is expected on a broker, but is not.
    ReplicaNotAvailable = 9,
    /// The message is larger than the broker's configured maximum.
    MessageSizeTooLarge = 10,
    /// Internal error code for broker-to-broker communication.
    StaleControllerEpoch = 11,
    /// Offset metadata string larger than the configured maximum.
    OffsetMetadataTooLarge = 12,
}

impl KafkaCode {
    /// Map a wire error number to a named condition.
    ///
    /// Returns `None` for numbers outside the 0.8 table.
    pub fn from_wire(code: i16) -> Option<Self> {
        KafkaCode::from_i16(code)
    }

    /// Whether the condition may clear on its own (stale leader,
    /// election in progress, slow replica).
    pub fn is_retriable(self) -> bool {
        matches!(
            self,
            KafkaCode::UnknownTopicOrPartition
                | KafkaCode::LeaderNotAvailable
                | KafkaCode::NotLeaderForPartition
                | KafkaCode::RequestTimedOut
                | KafkaCode::BrokerNotAvailable
                | KafkaCode::ReplicaNotAvailable
        )
    }
}
