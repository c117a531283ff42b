//! Queue messages per topic partition and deliver them to partition
//! leaders.
//!
//! [`ProducerDispatcher::flush`] sends one Produce request per queued
//! partition. A partition is the unit of failure: its messages leave the
//! queue only once the leader confirms them (or immediately when no
//! acknowledgement was requested). Failed partitions stay queued for the
//! next flush, which is always driven by the caller.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::channel::{Channel, ChannelConfig, Connector, TcpConnector};
use crate::constants::DEFAULT_ACK_TIMEOUT_MS;
use crate::error::{Error, Result};
use crate::message::{Message, encode_message_set};
use crate::metadata::{BrokerInfo, MetadataResolver, MetadataSource, TopicMetadata};
use crate::protocol::{ProduceCodec, ProduceRequest};
use crate::types::{BrokerId, Offset};

/// How many replicas must persist a write before the broker answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RequiredAcks {
    /// The broker sends no response at all.
    None,
    #[default]
    Leader,
    /// Every in-sync replica.
    All,
}

impl RequiredAcks {
    /// The wire value: 0, 1 or -1.
    pub fn value(self) -> i16 {
        match self {
            RequiredAcks::None => 0,
            RequiredAcks::Leader => 1,
            RequiredAcks::All => -1,
        }
    }

    /// Whether the broker answers a Produce request at this level.
    pub fn expects_response(self) -> bool {
        self != RequiredAcks::None
    }
}

impl TryFrom<i16> for RequiredAcks {
    type Error = Error;

    fn try_from(value: i16) -> Result<Self> {
        match value {
            0 => Ok(RequiredAcks::None),
            1 => Ok(RequiredAcks::Leader),
            -1 => Ok(RequiredAcks::All),
            other => Err(Error::Config(format!(
                "Required acks must be 0, 1 or -1, got {other}"
            ))),
        }
    }
}

/// Pending messages, `topic -> partition -> messages` in insertion order.
#[derive(Debug, Clone, Default)]
pub struct ProduceQueue {
    topics: BTreeMap<String, BTreeMap<i32, Vec<Message>>>,
}

impl ProduceQueue {
    pub fn push(&mut self, message: Message) {
        self.topics
            .entry(message.topic().to_string())
            .or_default()
            .entry(message.partition().value())
            .or_default()
            .push(message);
    }

    /// Total number of queued messages.
    pub fn len(&self) -> usize {
        self.topics
            .values()
            .flat_map(BTreeMap::values)
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.keys().map(String::as_str)
    }

    /// Messages queued for one topic partition.
    pub fn messages(&self, topic: &str, partition: i32) -> &[Message] {
        self.topics
            .get(topic)
            .and_then(|partitions| partitions.get(&partition))
            .map_or(&[], Vec::as_slice)
    }

    /// Drop the first `count` messages of a partition, pruning empty
    /// entries.
    fn remove_delivered(&mut self, topic: &str, partition: i32, count: usize) {
        let Some(partitions) = self.topics.get_mut(topic) else {
            return;
        };
        if let Some(messages) = partitions.get_mut(&partition) {
            messages.drain(..count.min(messages.len()));
            if messages.is_empty() {
                partitions.remove(&partition);
            }
        }
        if partitions.is_empty() {
            self.topics.remove(topic);
        }
    }
}

/// Channels keyed by broker address, opened lazily and reused.
pub struct ConnectionPool {
    config: ChannelConfig,
    connector: Arc<dyn Connector>,
    channels: HashMap<String, Channel>,
    brokers: HashMap<BrokerId, String>,
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.config)
            .field("channels", &self.channels)
            .field("brokers", &self.brokers)
            .finish()
    }
}

impl ConnectionPool {
    pub fn new(config: ChannelConfig) -> Self {
        Self::with_connector(config, Arc::new(TcpConnector))
    }

    pub fn with_connector(config: ChannelConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            channels: HashMap::new(),
            brokers: HashMap::new(),
        }
    }

    /// The channel for `address`, created on first use.
    pub fn channel(&mut self, address: &str) -> &mut Channel {
        let Self {
            config,
            connector,
            channels,
            ..
        } = self;
        channels.entry(address.to_string()).or_insert_with(|| {
            tracing::debug!(address, "Opening channel to broker");
            Channel::with_connector(address, config.clone(), connector.clone())
        })
    }

    /// Replace the broker id mapping, adding a channel for every address
    /// not seen before.
    pub fn update_brokers(&mut self, brokers: &HashMap<BrokerId, BrokerInfo>) {
        self.brokers = brokers
            .iter()
            .map(|(id, broker)| (*id, broker.address()))
            .collect();
        let addresses: Vec<String> = self.brokers.values().cloned().collect();
        for address in addresses {
            self.channel(&address);
        }
    }

    /// The channel of a broker from the latest metadata.
    pub fn channel_for(&mut self, broker: BrokerId) -> Option<&mut Channel> {
        let address = self.brokers.get(&broker)?;
        self.channels.get_mut(address)
    }

    pub fn broker_address(&self, broker: BrokerId) -> Option<&str> {
        self.brokers.get(&broker).map(String::as_str)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.channels.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn close_all(&mut self) {
        for channel in self.channels.values_mut() {
            channel.close();
        }
    }
}

/// A producer strategy selected by [`Kafka`](crate::client::Kafka).
pub trait Producer {
    /// Queue a message. Never touches the network.
    fn add(&mut self, message: Message);

    /// Deliver everything queued; see [`ProducerDispatcher::flush`].
    fn flush(&mut self) -> Result<()>;

    /// Number of queued messages.
    fn pending(&self) -> usize;

    /// Close every connection.
    fn close(&mut self);
}

/// Outcome of one partition's produce attempt.
struct Attempt {
    topic: String,
    partition: i32,
    sent: usize,
    result: Result<Option<Offset>>,
}

pub struct ProducerDispatcher<M = MetadataResolver> {
    metadata: M,
    pool: ConnectionPool,
    queue: ProduceQueue,
    required_acks: RequiredAcks,
    ack_timeout_ms: i32,
}

impl<M: fmt::Debug> fmt::Debug for ProducerDispatcher<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducerDispatcher")
            .field("metadata", &self.metadata)
            .field("pool", &self.pool)
            .field("pending", &self.queue.len())
            .field("required_acks", &self.required_acks)
            .field("ack_timeout_ms", &self.ack_timeout_ms)
            .finish()
    }
}

impl<M: MetadataSource> ProducerDispatcher<M> {
    pub fn new(metadata: M, pool: ConnectionPool, required_acks: RequiredAcks) -> Self {
        Self {
            metadata,
            pool,
            queue: ProduceQueue::default(),
            required_acks,
            ack_timeout_ms: DEFAULT_ACK_TIMEOUT_MS,
        }
    }

    pub fn add(&mut self, message: Message) {
        self.queue.push(message);
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn queue(&self) -> &ProduceQueue {
        &self.queue
    }

    pub fn required_acks(&self) -> RequiredAcks {
        self.required_acks
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms.max(0) as u64)
    }

    /// How long the broker may wait for replica acknowledgements. Saturates
    /// at `i32::MAX` milliseconds.
    pub fn set_ack_timeout(&mut self, timeout: Duration) {
        self.ack_timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
    }

    pub fn connection_pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn metadata(&self) -> &M {
        &self.metadata
    }

    /// Send every queued partition to its leader.
    ///
    /// All partitions are attempted even when some fail. Delivered
    /// partitions are removed from the queue afterwards; the first failure
    /// is returned and the failed partitions stay queued.
    pub fn flush(&mut self) -> Result<()> {
        if self.queue.is_empty() {
            return Ok(());
        }

        let mut attempts = Vec::new();
        for (topic, partitions) in &self.queue.topics {
            let metadata = match self.metadata.topic_metadata(topic) {
                Ok(metadata) => metadata,
                Err(e) => {
                    tracing::warn!(topic = %topic, error = %e, "Metadata lookup failed");
                    attempts.extend(partitions.iter().map(|(partition, messages)| Attempt {
                        topic: topic.clone(),
                        partition: *partition,
                        sent: messages.len(),
                        result: Err(e.clone()),
                    }));
                    continue;
                }
            };
            if let Some(brokers) = self.metadata.broker_metadata() {
                self.pool.update_brokers(brokers);
            }

            for (partition, messages) in partitions {
                let result = produce_partition(
                    &mut self.pool,
                    self.required_acks,
                    self.ack_timeout_ms,
                    topic,
                    *partition,
                    &metadata,
                    messages,
                );
                attempts.push(Attempt {
                    topic: topic.clone(),
                    partition: *partition,
                    sent: messages.len(),
                    result,
                });
            }
        }

        let mut first_error = None;
        for attempt in attempts {
            match attempt.result {
                Ok(offset) => {
                    tracing::debug!(
                        topic = %attempt.topic,
                        partition = attempt.partition,
                        messages = attempt.sent,
                        offset = ?offset,
                        "Partition delivered"
                    );
                    self.queue
                        .remove_delivered(&attempt.topic, attempt.partition, attempt.sent);
                }
                Err(e) => {
                    tracing::warn!(
                        topic = %attempt.topic,
                        partition = attempt.partition,
                        messages = attempt.sent,
                        error = %e,
                        "Partition produce failed, keeping messages queued"
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Close every connection, including the metadata connection.
    pub fn close(&mut self) {
        self.pool.close_all();
        self.metadata.close();
    }
}

/// Send one partition's messages to its leader.
///
/// Returns the offset assigned to the first message when the broker
/// answers, `None` for fire-and-forget requests.
fn produce_partition(
    pool: &mut ConnectionPool,
    required_acks: RequiredAcks,
    ack_timeout_ms: i32,
    topic: &str,
    partition: i32,
    metadata: &TopicMetadata,
    messages: &[Message],
) -> Result<Option<Offset>> {
    let leader = metadata
        .partition(partition)
        .and_then(|p| p.leader())
        .ok_or_else(|| Error::routing(topic, partition, "no leader in metadata"))?;
    let channel = pool.channel_for(leader).ok_or_else(|| {
        Error::routing(
            topic,
            partition,
            format!("leader {leader} is not a known broker"),
        )
    })?;

    let request = ProduceRequest::single(
        required_acks.value(),
        ack_timeout_ms,
        topic,
        partition,
        encode_message_set(messages)?,
    );

    if !required_acks.expects_response() {
        channel.request_no_response::<ProduceCodec>(&request)?;
        return Ok(None);
    }

    let response = channel.request::<ProduceCodec>(&request)?;
    let result = response.partition(topic, partition).ok_or_else(|| {
        Error::Protocol(format!(
            "Produce response has no result for {topic}/{partition}"
        ))
    })?;
    match Error::from_partition_code(result.error_code, topic, partition) {
        Some(e) => Err(e),
        None => Ok(Some(result.offset)),
    }
}

impl<M: MetadataSource> Producer for ProducerDispatcher<M> {
    fn add(&mut self, message: Message) {
        ProducerDispatcher::add(self, message)
    }

    fn flush(&mut self) -> Result<()> {
        ProducerDispatcher::flush(self)
    }

    fn pending(&self) -> usize {
        ProducerDispatcher::pending(self)
    }

    fn close(&mut self) {
        ProducerDispatcher::close(self)
    }
}
