//! Centralized protocol and configuration constants.
//!
//! # Categories
//!
//! - **Protocol Constants**: Kafka 0.8 wire protocol keys, versions and limits
//! - **Message Constants**: message-set entry layout
//! - **Client Defaults**: timeouts, retry budget, client identity

// =============================================================================
// Protocol Constants (Kafka 0.8 Wire Protocol)
// =============================================================================

/// API key of the Produce request.
pub const API_KEY_PRODUCE: i16 = 0;

/// API key of the Metadata request.
pub const API_KEY_METADATA: i16 = 3;

/// Every 0.8 request is sent with API version 0.
pub const REQUEST_API_VERSION: i16 = 0;

/// Size of the length prefix in front of every request and response.
pub const SIZE_PREFIX_LEN: usize = 4;

/// Size of the correlation id that opens every response.
pub const CORRELATION_ID_LEN: usize = 4;

/// Maximum allowed array size in Kafka protocol parsing.
///
/// Guards against malformed responses claiming billions of elements.
pub const MAX_PROTOCOL_ARRAY_SIZE: i32 = 100_000;

/// Largest response this client accepts (100 MB).
pub const MAX_RESPONSE_SIZE: i32 = 100 * 1024 * 1024;

// =============================================================================
// Message Constants
// =============================================================================

/// Magic byte of the attribute-carrying message format.
///
/// This is the only message format emitted or accepted.
pub const MESSAGE_MAGIC: i8 = 0;

/// Mask selecting the compression codec from the attributes byte.
pub const COMPRESSION_CODEC_MASK: i8 = 0x07;

/// Bytes in front of the CRC-covered region of a message-set entry:
/// offset (8) + message size (4).
pub const MESSAGE_ENTRY_HEADER_LEN: usize = 12;

/// Fixed overhead of one encoded message after the size field:
/// crc (4) + magic (1) + attributes (1) + key length (4) + value length (4).
pub const MESSAGE_OVERHEAD: usize = 14;

// =============================================================================
// Client Defaults
// =============================================================================

/// Client id sent in every request header when none is configured.
pub const DEFAULT_CLIENT_ID: &str = "kafka08-rs";

/// Broker contacted first when none is configured.
pub const DEFAULT_BROKER: &str = "localhost:9092";

/// Socket connect/read/write timeout (6 seconds).
pub const DEFAULT_SOCKET_TIMEOUT_SECS: u64 = 6;

/// Number of attempts a request write gets before failing.
pub const DEFAULT_SEND_RETRIES: usize = 3;

/// Time the broker may wait for acknowledgements (advisory, 1 second).
pub const DEFAULT_ACK_TIMEOUT_MS: i32 = 1000;
