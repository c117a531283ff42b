//! One blocking connection to one broker.
//!
//! A [`Channel`] frames requests with their `int32` size prefix, tracks
//! whether a response is pending, and reads the size-delimited response
//! back in pieces. Requests and responses strictly alternate; nothing is
//! pipelined.
//!
//! ```text
//!            send(expects_response = true)
//! Connected ───────────────────────────────▶ RequestSent
//!     ▲                                          │
//!     └──────── response fully consumed ─────────┘
//! ```
//!
//! Any socket failure or framing error closes the channel (back to
//! `Unconnected`); the next `send` reconnects.

use std::fmt;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};

use crate::constants::{
    CORRELATION_ID_LEN, DEFAULT_CLIENT_ID, DEFAULT_SEND_RETRIES, DEFAULT_SOCKET_TIMEOUT_SECS,
    MAX_RESPONSE_SIZE, SIZE_PREFIX_LEN,
};
use crate::encode::ToByte;
use crate::error::{Error, Result};
use crate::protocol::{ApiKey, KafkaCodec, RequestHeader};
use crate::types::CorrelationId;

/// A bidirectional byte stream to a broker.
pub trait Stream: Read + Write + Send {}

impl<T: Read + Write + Send> Stream for T {}

/// Opens streams to broker addresses.
///
/// [`TcpConnector`] is the production implementation; tests substitute
/// in-memory streams.
pub trait Connector: Send + Sync {
    fn connect(&self, address: &str, timeout: Duration) -> io::Result<Box<dyn Stream>>;
}

/// Connects over TCP with connect, read and write timeouts applied.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect(&self, address: &str, timeout: Duration) -> io::Result<Box<dyn Stream>> {
        let mut last_error = None;
        for addr in address.to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(timeout))?;
                    stream.set_write_timeout(Some(timeout))?;
                    stream.set_nodelay(true)?;
                    return Ok(Box::new(stream));
                }
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            io::Error::new(
                ErrorKind::AddrNotAvailable,
                format!("{address} did not resolve to any address"),
            )
        }))
    }
}

/// Per-channel settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Sent in every request header.
    pub client_id: String,
    /// Connect, read and write timeout.
    pub timeout: Duration,
    /// Write attempts per request, reconnecting between attempts.
    pub send_retries: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_string(),
            timeout: Duration::from_secs(DEFAULT_SOCKET_TIMEOUT_SECS),
            send_retries: DEFAULT_SEND_RETRIES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Unconnected,
    Connected,
    /// A request was written and its response is not yet consumed.
    RequestSent,
}

/// Framing state of the response currently being read.
#[derive(Debug, Clone, Copy, Default)]
struct ResponseFrame {
    /// Declared size, excluding the size prefix itself.
    size: usize,
    /// Bytes consumed so far, including the correlation id.
    read: usize,
}

impl ResponseFrame {
    fn remaining(&self) -> usize {
        self.size.saturating_sub(self.read)
    }

    fn is_consumed(&self) -> bool {
        self.read >= self.size
    }
}

pub struct Channel {
    address: String,
    config: ChannelConfig,
    connector: Arc<dyn Connector>,
    stream: Option<Box<dyn Stream>>,
    /// Set between a send that expects a response and its full consumption.
    readable: bool,
    frame: Option<ResponseFrame>,
    correlation_id: CorrelationId,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("address", &self.address)
            .field("state", &self.state())
            .field("correlation_id", &self.correlation_id)
            .finish()
    }
}

impl Channel {
    /// A TCP channel to `address` (`host:port`). No connection is made yet.
    pub fn new(address: impl Into<String>, config: ChannelConfig) -> Self {
        Self::with_connector(address, config, Arc::new(TcpConnector))
    }

    pub fn with_connector(
        address: impl Into<String>,
        config: ChannelConfig,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            address: address.into(),
            config,
            connector,
            stream: None,
            readable: false,
            frame: None,
            correlation_id: CorrelationId::default(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn state(&self) -> ChannelState {
        match (&self.stream, self.readable) {
            (None, _) => ChannelState::Unconnected,
            (Some(_), false) => ChannelState::Connected,
            (Some(_), true) => ChannelState::RequestSent,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// The correlation id of the most recent request (0 before the first).
    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Bytes of the current response consumed so far, correlation id
    /// included.
    pub fn read_bytes(&self) -> usize {
        self.frame.map_or(0, |f| f.read)
    }

    /// Bytes of the current response not yet consumed.
    pub fn remaining_bytes(&self) -> usize {
        self.frame.map_or(0, |f| f.remaining())
    }

    fn connect(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let stream = self
            .connector
            .connect(&self.address, self.config.timeout)
            .map_err(|e| {
                tracing::warn!(address = %self.address, error = %e, "Failed to connect to broker");
                Error::transport(&format!("Cannot connect to {}", self.address), &e)
            })?;
        tracing::debug!(address = %self.address, "Connected to broker");
        self.stream = Some(stream);
        Ok(())
    }

    /// Write one size-prefixed request.
    ///
    /// Opens the connection if needed. A failed or short write closes the
    /// connection and is retried on a fresh one, up to the configured
    /// number of attempts. With `expects_response` the channel moves to
    /// [`ChannelState::RequestSent`]. Sending before that response is
    /// consumed is a framing error: the connection is closed and the next
    /// send reconnects.
    pub fn send(&mut self, data: &[u8], expects_response: bool) -> Result<()> {
        if self.readable {
            match self.frame {
                Some(frame) if frame.is_consumed() => self.readable = false,
                _ => {
                    self.close();
                    return Err(Error::Protocol(
                        "Kafka channel has incoming data.".to_string(),
                    ));
                }
            }
        }

        let size = i32::try_from(data.len())
            .map_err(|_| Error::Encoding(format!("request of {} bytes is too large", data.len())))?;
        let mut request = BytesMut::with_capacity(SIZE_PREFIX_LEN + data.len());
        size.encode(&mut request)?;
        request.put_slice(data);

        let attempts = self.config.send_retries.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            self.connect()?;
            let Some(stream) = self.stream.as_mut() else {
                continue;
            };

            let failure = match write_fully(stream.as_mut(), &request) {
                Ok(written) if written == request.len() => {
                    self.readable = expects_response;
                    self.frame = None;
                    tracing::trace!(
                        address = %self.address,
                        bytes = written,
                        expects_response,
                        "Request written"
                    );
                    return Ok(());
                }
                Ok(written) => Error::Transport {
                    kind: ErrorKind::WriteZero,
                    message: format!(
                        "Request written {written} bytes, expected to send: {}",
                        request.len()
                    ),
                },
                Err(e) => Error::transport(&format!("Write to {} failed", self.address), &e),
            };

            tracing::warn!(
                address = %self.address,
                attempt,
                attempts,
                error = %failure,
                "Request write failed, reconnecting"
            );
            self.close();
            last_error = Some(failure);
        }

        Err(last_error.unwrap_or_else(|| Error::Transport {
            kind: ErrorKind::NotConnected,
            message: format!("No connection to {}", self.address),
        }))
    }

    /// Encode a request header with the next correlation id, then send it
    /// followed by `body`.
    pub fn send_request(
        &mut self,
        api_key: ApiKey,
        body: &[u8],
        expects_response: bool,
    ) -> Result<CorrelationId> {
        let correlation_id = self.correlation_id.next();
        let header = RequestHeader::new(api_key, correlation_id, &self.config.client_id);
        let mut request = BytesMut::with_capacity(16 + self.config.client_id.len() + body.len());
        header.encode(&mut request)?;
        request.put_slice(body);

        self.correlation_id = correlation_id;
        self.send(&request, expects_response)?;

        tracing::debug!(
            address = %self.address,
            api_key = api_key.code(),
            correlation_id = correlation_id.value(),
            size = request.len(),
            "Request sent"
        );
        Ok(correlation_id)
    }

    /// Whether unread response bytes remain.
    ///
    /// The first call after a send reads the response size and correlation
    /// id. Returns `false` once the declared size has been consumed.
    pub fn has_incoming_data(&mut self) -> Result<bool> {
        if !self.readable {
            return match self.frame {
                Some(frame) if frame.is_consumed() => Ok(false),
                _ => Err(Error::Protocol(
                    "Request has not been sent - maybe a connection problem.".to_string(),
                )),
            };
        }

        if self.frame.is_none() {
            self.read_response_header()?;
        }

        match self.frame {
            Some(frame) if !frame.is_consumed() => Ok(true),
            _ => {
                self.readable = false;
                Ok(false)
            }
        }
    }

    fn read_response_header(&mut self) -> Result<()> {
        let header = match self.read_raw(SIZE_PREFIX_LEN) {
            Ok(header) => header,
            Err(e) => {
                self.close();
                return Err(match e {
                    Error::Transport { kind, message } => Error::Transport {
                        kind,
                        message: format!("Could not read kafka response header. {message}"),
                    },
                    _ => Error::EndOfStream("Could not read kafka response header.".to_string()),
                });
            }
        };

        let size = i32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        if size < 0 {
            self.close();
            return Err(Error::Protocol("Corrupt response stream!".to_string()));
        }
        if size > MAX_RESPONSE_SIZE {
            self.close();
            return Err(Error::Protocol(format!(
                "Response size {size} exceeds maximum allowed size {MAX_RESPONSE_SIZE}"
            )));
        }

        self.frame = Some(ResponseFrame {
            size: size as usize,
            read: 0,
        });
        if size == 0 {
            return Ok(());
        }

        let raw = self.read(CORRELATION_ID_LEN)?;
        let received = CorrelationId::new(i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]));
        if received != self.correlation_id {
            tracing::warn!(
                address = %self.address,
                expected = self.correlation_id.value(),
                received = received.value(),
                "Response correlation id mismatch"
            );
        }
        tracing::trace!(
            address = %self.address,
            size,
            correlation_id = received.value(),
            "Response header read"
        );
        Ok(())
    }

    /// Read exactly `size` bytes of the current response.
    ///
    /// Asking for more than remains closes the channel and fails with
    /// [`Error::EndOfStream`].
    pub fn read(&mut self, size: usize) -> Result<Bytes> {
        let Some(frame) = self.frame else {
            return Err(Error::Protocol(
                "No response header has been read".to_string(),
            ));
        };

        let remaining = frame.remaining();
        if size > remaining {
            self.close();
            return Err(Error::EndOfStream(format!(
                "Trying to read {size} from {remaining} remaining"
            )));
        }

        let data = self.read_raw(size)?;
        if let Some(frame) = self.frame.as_mut() {
            frame.read += size;
        }
        Ok(data)
    }

    /// Read whatever remains of the current response.
    pub fn read_remaining(&mut self) -> Result<Bytes> {
        let remaining = self.remaining_bytes();
        self.read(remaining)
    }

    /// Read a whole response body, failing if none arrived or if it was not
    /// fully drained.
    pub fn receive(&mut self) -> Result<Bytes> {
        if !self.has_incoming_data()? {
            return Err(Error::Protocol(format!(
                "Empty response from {}",
                self.address
            )));
        }
        let body = self.read_remaining()?;
        if self.has_incoming_data()? {
            self.close();
            return Err(Error::Protocol(
                "Response was not fully drained".to_string(),
            ));
        }
        Ok(body)
    }

    /// Send a request and decode its response.
    pub fn request<C: KafkaCodec>(&mut self, request: &C::Request) -> Result<C::Response> {
        let body = C::encode_request(request)?;
        self.send_request(C::api_key(), &body, true)?;
        C::decode_response(self.receive()?)
    }

    /// Send a request the broker will not answer.
    pub fn request_no_response<C: KafkaCodec>(&mut self, request: &C::Request) -> Result<()> {
        let body = C::encode_request(request)?;
        self.send_request(C::api_key(), &body, false)?;
        Ok(())
    }

    fn read_raw(&mut self, size: usize) -> Result<Bytes> {
        let mut buffer = vec![0u8; size];
        let result = match self.stream.as_mut() {
            Some(stream) => read_fully(stream.as_mut(), &mut buffer),
            None => {
                return Err(Error::Transport {
                    kind: ErrorKind::NotConnected,
                    message: format!("Not connected to {}", self.address),
                });
            }
        };

        match result {
            Ok(filled) if filled == size => Ok(Bytes::from(buffer)),
            Ok(filled) => {
                self.close();
                Err(Error::EndOfStream(format!(
                    "Connection closed after {filled} of {size} bytes"
                )))
            }
            Err(e) => {
                self.close();
                Err(Error::transport(
                    &format!("Read from {} failed", self.address),
                    &e,
                ))
            }
        }
    }

    /// Release the connection and reset framing state. Safe to call
    /// repeatedly.
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!(address = %self.address, "Channel closed");
        }
        self.readable = false;
        self.frame = None;
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Write until done or the stream stops accepting bytes.
fn write_fully(stream: &mut dyn Stream, data: &[u8]) -> io::Result<usize> {
    let mut written = 0;
    while written < data.len() {
        match stream.write(&data[written..]) {
            Ok(0) => break,
            Ok(n) => written += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    stream.flush()?;
    Ok(written)
}

/// Read until `buffer` is full or the stream reaches end of file.
fn read_fully(stream: &mut dyn Stream, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match stream.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
