//! # kafka08
//! Blocking Rust client for the Kafka 0.8 wire protocol.
//!
//! The crate frames requests and responses over TCP, encodes and decodes the
//! binary message format (CRC32 and compression attribute included), tracks
//! which broker leads each topic partition, and routes produced messages to
//! those leaders.
//!
//! # Goals
//! - Easy to understand code
//! - Leverage best in class libraries such as [Nom](https://docs.rs/nom/latest/nom/) and [Bytes](https://docs.rs/bytes)
//! - Exact byte-level compatibility with 0.8 brokers
//!
//! ## Producing messages
//! [`Kafka`](client::Kafka) builds producers from a [`ClientConfig`](client::ClientConfig).
//! Messages are queued with `add` and delivered with `flush`; a partition
//! whose delivery failed stays queued so the next `flush` retries it.
//!
//! ```rust,no_run
//! use kafka08::prelude::*;
//!
//! fn main() -> kafka08::error::Result<()> {
//!     let kafka = Kafka::new(ClientConfig {
//!         brokers: vec!["localhost:9092".to_string()],
//!         ..Default::default()
//!     })?;
//!
//!     let mut producer = kafka.create_producer(RequiredAcks::Leader)?;
//!     producer.add(Message::new("events", 0, "Hello World!")?);
//!     producer.flush()?;
//!     producer.close();
//!     Ok(())
//! }
//! ```
//!
//! ## Layers
//! - [`message`], [`encode`], [`parser`], [`protocol`]: pure wire codec
//! - [`channel`]: one blocking connection to one broker
//! - [`metadata`]: broker list and partition leadership
//! - [`producer`]: per-partition queueing and dispatch
//!
//! ## Resources
//! - [Kafka Protocol Spec](https://kafka.apache.org/protocol.html)
//! - [Confluence Docs](https://cwiki.apache.org/confluence/display/KAFKA/A+Guide+To+The+Kafka+Protocol)

#![forbid(unsafe_code)]

pub mod encode;
pub mod error;
pub mod parser;
pub mod protocol;
pub mod types;

pub mod channel;
pub mod client;
pub mod constants;
pub mod message;
pub mod metadata;
pub mod producer;
pub mod telemetry;

pub mod prelude {
    //! Main export of client structures
    //!
    //! ## Example
    //! ```rust,no_run
    //! use kafka08::prelude::*;
    //!
    //! let kafka = Kafka::new(ClientConfig::default()).unwrap();
    //! let mut resolver = kafka.metadata_resolver().unwrap();
    //! resolver.refresh(["events"]).unwrap();
    //! ```
    pub use crate::channel::{Channel, ChannelConfig, ChannelState, Connector, TcpConnector};
    pub use crate::client::{ApiVersion, ClientConfig, Kafka};
    pub use crate::error::{Error, KafkaCode, Result};
    pub use crate::message::{Compression, Message};
    pub use crate::metadata::{MetadataResolver, MetadataSource};
    pub use crate::producer::{Producer, ProducerDispatcher, RequiredAcks};
    pub use crate::types::{BrokerId, CorrelationId, Offset, PartitionId};

    pub use bytes;
}
