//! Cluster topology: which brokers exist and which one leads each
//! partition.

use std::collections::{BTreeMap, HashMap};

use crate::channel::Channel;
use crate::error::{Error, Result};
use crate::protocol::MetadataCodec;
use crate::types::{BrokerId, Offset};

pub use crate::protocol::{BrokerInfo, MetadataRequest, PartitionMetadata, TopicMetadata};

/// Source of topic and broker metadata for the producer.
pub trait MetadataSource {
    /// Refresh `topic` and return its current metadata.
    fn topic_metadata(&mut self, topic: &str) -> Result<TopicMetadata>;

    /// Brokers from the latest refresh, or `None` before the first one.
    fn broker_metadata(&self) -> Option<&HashMap<BrokerId, BrokerInfo>>;

    /// Release any connection held by the source.
    fn close(&mut self) {}
}

/// Issues Metadata requests over one channel and keeps the merged result.
///
/// Brokers are replaced on every refresh. Topics are merged: a refresh
/// overwrites the topics it names and leaves every other known topic alone.
#[derive(Debug)]
pub struct MetadataResolver {
    channel: Channel,
    brokers: Option<HashMap<BrokerId, BrokerInfo>>,
    topics: BTreeMap<String, TopicMetadata>,
}

impl MetadataResolver {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            brokers: None,
            topics: BTreeMap::new(),
        }
    }

    /// Fetch metadata for `topics`: a single name, an array or `Vec` of
    /// names, or an empty list for every topic.
    pub fn refresh(&mut self, topics: impl Into<MetadataRequest>) -> Result<()> {
        let request = topics.into();
        let response = self.channel.request::<MetadataCodec>(&request)?;

        tracing::debug!(
            address = %self.channel.address(),
            requested = ?request.topics,
            brokers = response.brokers.len(),
            topics = response.topics.len(),
            "Metadata refreshed"
        );

        self.brokers = Some(
            response
                .brokers
                .into_iter()
                .map(|broker| (broker.id, broker))
                .collect(),
        );
        self.topics.extend(response.topics);
        Ok(())
    }

    /// Whether no refresh has succeeded yet.
    pub fn needs_refreshing(&self) -> bool {
        self.brokers.is_none()
    }

    pub fn broker_metadata(&self) -> Option<&HashMap<BrokerId, BrokerInfo>> {
        self.brokers.as_ref()
    }

    /// Refresh one topic and return its merged entry.
    ///
    /// A topic the broker did not describe is a routing error.
    pub fn topic_metadata(&mut self, topic: &str) -> Result<TopicMetadata> {
        self.refresh(topic)?;
        self.cached_topic(topic)
            .cloned()
            .ok_or_else(|| Error::routing(topic, -1, "topic missing from metadata"))
    }

    /// Metadata for `topic` from earlier refreshes, without network access.
    pub fn cached_topic(&self, topic: &str) -> Option<&TopicMetadata> {
        self.topics.get(topic)
    }

    pub fn known_topics(&self) -> impl Iterator<Item = &str> {
        self.topics.keys().map(String::as_str)
    }

    pub fn channel_mut(&mut self) -> &mut Channel {
        &mut self.channel
    }

    pub fn close(&mut self) {
        self.channel.close();
    }

    pub fn broker_info(&self, _broker: BrokerId) -> Result<BrokerInfo> {
        Err(Error::NotImplemented("broker info lookup"))
    }

    pub fn register_consumer_process(&mut self, _group: &str, _process: &str) -> Result<()> {
        Err(Error::NotImplemented("consumer group registration"))
    }

    pub fn topic_offsets(&mut self, _topic: &str, _partition: i32) -> Result<Vec<Offset>> {
        Err(Error::NotImplemented("topic offset lookup"))
    }

    pub fn commit_offset(
        &mut self,
        _group: &str,
        _topic: &str,
        _partition: i32,
        _offset: Offset,
    ) -> Result<()> {
        Err(Error::NotImplemented("offset commit"))
    }
}

impl MetadataSource for MetadataResolver {
    fn topic_metadata(&mut self, topic: &str) -> Result<TopicMetadata> {
        MetadataResolver::topic_metadata(self, topic)
    }

    fn broker_metadata(&self) -> Option<&HashMap<BrokerId, BrokerInfo>> {
        MetadataResolver::broker_metadata(self)
    }

    fn close(&mut self) {
        MetadataResolver::close(self)
    }
}
