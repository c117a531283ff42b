//! Client configuration and the producer factory.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::channel::{Channel, ChannelConfig, Connector, TcpConnector};
use crate::constants::{
    DEFAULT_ACK_TIMEOUT_MS, DEFAULT_BROKER, DEFAULT_CLIENT_ID, DEFAULT_SEND_RETRIES,
    DEFAULT_SOCKET_TIMEOUT_SECS,
};
use crate::error::{Error, Result};
use crate::metadata::MetadataResolver;
use crate::producer::{ConnectionPool, Producer, ProducerDispatcher, RequiredAcks};

/// Protocol generation spoken by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ApiVersion {
    /// Kafka 0.8.x.
    #[default]
    V0_8,
}

impl FromStr for ApiVersion {
    type Err = Error;

    /// Accepts any `0.8` release string, such as `0.8` or `0.8.2.1`.
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<_> = s.trim().split('.').map(str::parse::<u32>).collect();
        match parts.as_slice() {
            [Ok(0), Ok(8), rest @ ..] if rest.iter().all(|p| p.is_ok()) => Ok(ApiVersion::V0_8),
            _ => Err(Error::Config(format!("Unsupported Kafka API version {s}"))),
        }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiVersion::V0_8 => write!(f, "0.8"),
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Bootstrap brokers as `host:port`. The first one serves metadata.
    pub brokers: Vec<String>,
    pub client_id: String,
    /// Socket connect, read and write timeout.
    pub timeout: Duration,
    pub api_version: ApiVersion,
    /// Write attempts per request.
    pub send_retries: usize,
    pub required_acks: RequiredAcks,
    /// Advisory; sent to the broker with every Produce request.
    pub ack_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            brokers: vec![DEFAULT_BROKER.to_string()],
            client_id: DEFAULT_CLIENT_ID.to_string(),
            timeout: Duration::from_secs(DEFAULT_SOCKET_TIMEOUT_SECS),
            api_version: ApiVersion::default(),
            send_retries: DEFAULT_SEND_RETRIES,
            required_acks: RequiredAcks::default(),
            ack_timeout: Duration::from_millis(DEFAULT_ACK_TIMEOUT_MS as u64),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// - `KAFKA_BROKERS`: comma separated `host:port` list
    /// - `KAFKA_CLIENT_ID`
    /// - `KAFKA_TIMEOUT_SECS`
    /// - `KAFKA_API_VERSION`: must name a 0.8 release
    /// - `KAFKA_SEND_RETRIES`
    /// - `KAFKA_REQUIRED_ACKS`: 0, 1 or -1
    /// - `KAFKA_ACK_TIMEOUT_MS`
    ///
    /// Absent or unparsable numbers fall back to the defaults. An
    /// unsupported API version or acks level is an error.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let brokers = std::env::var("KAFKA_BROKERS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|b| !b.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or(defaults.brokers);

        let client_id = std::env::var("KAFKA_CLIENT_ID").unwrap_or(defaults.client_id);

        let timeout = std::env::var("KAFKA_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);

        let api_version = match std::env::var("KAFKA_API_VERSION") {
            Ok(v) => v.parse()?,
            Err(_) => defaults.api_version,
        };

        let send_retries = std::env::var("KAFKA_SEND_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.send_retries);

        let required_acks = match std::env::var("KAFKA_REQUIRED_ACKS") {
            Ok(v) => {
                let value: i16 = v
                    .trim()
                    .parse()
                    .map_err(|e| Error::Config(format!("Invalid KAFKA_REQUIRED_ACKS: {e}")))?;
                RequiredAcks::try_from(value)?
            }
            Err(_) => defaults.required_acks,
        };

        let ack_timeout = std::env::var("KAFKA_ACK_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.ack_timeout);

        Ok(Self {
            brokers,
            client_id,
            timeout,
            api_version,
            send_retries,
            required_acks,
            ack_timeout,
        })
    }

    /// Validate the configuration and return every problem found.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.brokers.is_empty() {
            errors.push("at least one broker must be configured".to_string());
        }
        for broker in &self.brokers {
            if let Err(reason) = check_broker_address(broker) {
                errors.push(format!("broker '{broker}' {reason}"));
            }
        }

        if self.timeout.is_zero() {
            errors.push("timeout must be greater than zero".to_string());
        }

        if self.send_retries == 0 {
            errors.push("send_retries must be at least 1".to_string());
        }

        if self.client_id.len() > i16::MAX as usize {
            errors.push(format!(
                "client_id ({} bytes) must not exceed {} bytes",
                self.client_id.len(),
                i16::MAX
            ));
        }

        if self.ack_timeout.as_millis() > i32::MAX as u128 {
            errors.push(format!(
                "ack_timeout ({:?}) must not exceed {} ms",
                self.ack_timeout,
                i32::MAX
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// The per-channel part of this configuration.
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            client_id: self.client_id.clone(),
            timeout: self.timeout,
            send_retries: self.send_retries,
        }
    }
}

fn check_broker_address(address: &str) -> std::result::Result<(), &'static str> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or("must have the form host:port")?;
    if host.is_empty() {
        return Err("has an empty host");
    }
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err("has an invalid port"),
        Ok(_) => Ok(()),
    }
}

/// Entry point: builds channels, the metadata resolver and producers from
/// a validated [`ClientConfig`].
pub struct Kafka {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
}

impl fmt::Debug for Kafka {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kafka").field("config", &self.config).finish()
    }
}

impl Kafka {
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::with_connector(config, Arc::new(TcpConnector))
    }

    pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        config
            .validate()
            .map_err(|errors| Error::Config(errors.join("; ")))?;
        tracing::debug!(
            brokers = ?config.brokers,
            api_version = %config.api_version,
            client_id = %config.client_id,
            "Kafka client configured"
        );
        Ok(Self { config, connector })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The address of configured broker `index`.
    pub fn connection_string(&self, index: usize) -> Result<&str> {
        self.config
            .brokers
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| {
                Error::Config(format!(
                    "Broker index {index} out of range: {} brokers configured",
                    self.config.brokers.len()
                ))
            })
    }

    /// A new, not yet connected channel to configured broker `index`.
    pub fn channel(&self, index: usize) -> Result<Channel> {
        let address = self.connection_string(index)?;
        Ok(Channel::with_connector(
            address,
            self.config.channel_config(),
            self.connector.clone(),
        ))
    }

    /// A resolver talking to the first configured broker.
    pub fn metadata_resolver(&self) -> Result<MetadataResolver> {
        Ok(MetadataResolver::new(self.channel(0)?))
    }

    /// A dispatcher for the configured API version.
    pub fn producer_dispatcher(&self, required_acks: RequiredAcks) -> Result<ProducerDispatcher> {
        let pool = ConnectionPool::with_connector(
            self.config.channel_config(),
            self.connector.clone(),
        );
        let mut dispatcher =
            ProducerDispatcher::new(self.metadata_resolver()?, pool, required_acks);
        dispatcher.set_ack_timeout(self.config.ack_timeout);
        Ok(dispatcher)
    }

    /// A producer for the configured API version.
    pub fn create_producer(&self, required_acks: RequiredAcks) -> Result<Box<dyn Producer>> {
        match self.config.api_version {
            ApiVersion::V0_8 => Ok(Box::new(self.producer_dispatcher(required_acks)?)),
        }
    }
}
