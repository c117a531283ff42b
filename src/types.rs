//! Type-safe wrappers for Kafka protocol primitives.
//!
//! These newtypes keep integers that share a representation but mean
//! different things (a broker id, a partition, a correlation id) from
//! being mixed up.

use bytes::BufMut;
use std::fmt;

use crate::encode::ToByte;
use crate::error::Result;

/// A broker-assigned position in a partition log.
///
/// The 0.8 wire protocol transmits offsets as 64-bit values; older call
/// sites used 32-bit offsets. Both are the same monotonically
/// non-decreasing counter, so both are represented by this one type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Offset(pub i64);

impl Offset {
    /// Placeholder written in front of every produced message. The broker
    /// assigns the real offset.
    pub const PLACEHOLDER: Self = Offset(0);

    /// Create a new offset from a raw value.
    #[inline]
    pub const fn new(value: i64) -> Self {
        Offset(value)
    }

    /// Widen a legacy 32-bit offset.
    #[inline]
    pub const fn from_legacy(value: u32) -> Self {
        Offset(value as i64)
    }

    /// Interpret 8 big-endian wire bytes.
    #[inline]
    pub const fn from_be_bytes(bytes: [u8; 8]) -> Self {
        Offset(i64::from_be_bytes(bytes))
    }

    /// Get the raw i64 value.
    #[inline]
    pub const fn value(self) -> i64 {
        self.0
    }

    /// Check if this is a valid (non-negative) offset.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

impl From<i64> for Offset {
    fn from(value: i64) -> Self {
        Offset(value)
    }
}

impl From<Offset> for i64 {
    fn from(offset: Offset) -> Self {
        offset.0
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ToByte for Offset {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.0.encode(buffer)
    }
}

/// A Kafka broker identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BrokerId(pub i32);

impl BrokerId {
    /// Reported as leader id when a partition has no leader.
    pub const INVALID: Self = BrokerId(-1);

    /// Create a new broker ID from a raw value.
    #[inline]
    pub const fn new(value: i32) -> Self {
        BrokerId(value)
    }

    /// Get the raw i32 value.
    #[inline]
    pub const fn value(self) -> i32 {
        self.0
    }

    /// Check if this is a valid (non-negative) broker ID.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

impl From<i32> for BrokerId {
    fn from(value: i32) -> Self {
        BrokerId(value)
    }
}

impl From<BrokerId> for i32 {
    fn from(id: BrokerId) -> Self {
        id.0
    }
}

impl fmt::Display for BrokerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A partition number within a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PartitionId(pub i32);

impl PartitionId {
    /// Create a new partition id from a raw value.
    #[inline]
    pub const fn new(value: i32) -> Self {
        PartitionId(value)
    }

    /// Get the raw i32 value.
    #[inline]
    pub const fn value(self) -> i32 {
        self.0
    }
}

impl From<i32> for PartitionId {
    fn from(value: i32) -> Self {
        PartitionId(value)
    }
}

impl From<PartitionId> for i32 {
    fn from(id: PartitionId) -> Self {
        id.0
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ToByte for PartitionId {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.0.encode(buffer)
    }
}

/// A Kafka request correlation ID.
///
/// Each channel numbers its requests starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CorrelationId(pub i32);

impl CorrelationId {
    /// Create a new correlation ID from a raw value.
    #[inline]
    pub const fn new(value: i32) -> Self {
        CorrelationId(value)
    }

    /// Get the raw i32 value.
    #[inline]
    pub const fn value(self) -> i32 {
        self.0
    }

    /// The id following this one.
    #[inline]
    pub fn next(self) -> Self {
        CorrelationId(self.0.wrapping_add(1))
    }
}

impl From<i32> for CorrelationId {
    fn from(value: i32) -> Self {
        CorrelationId(value)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ToByte for CorrelationId {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.0.encode(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_from_legacy() {
        assert_eq!(Offset::from_legacy(u32::MAX).value(), 4_294_967_295);
        assert!(Offset::from_legacy(0).is_valid());
    }

    #[test]
    fn test_offset_from_be_bytes() {
        let offset = Offset::from_be_bytes([0, 0, 0, 0, 0, 0, 0x01, 0x00]);
        assert_eq!(offset, Offset::new(256));
    }

    #[test]
    fn test_offset_encode() {
        let mut buf = Vec::new();
        Offset::new(7).encode(&mut buf).unwrap();
        assert_eq!(buf, vec![0, 0, 0, 0, 0, 0, 0, 7]);
    }

    #[test]
    fn test_broker_id_invalid() {
        assert!(!BrokerId::INVALID.is_valid());
        assert!(BrokerId::new(0).is_valid());
    }

    #[test]
    fn test_correlation_id_next_wraps() {
        assert_eq!(CorrelationId::new(1).next(), CorrelationId::new(2));
        assert_eq!(CorrelationId::new(i32::MAX).next(), CorrelationId::new(i32::MIN));
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", PartitionId::new(3)), "3");
        assert_eq!(format!("{}", BrokerId::new(9)), "9");
        assert_eq!(format!("{}", Offset::new(-1)), "-1");
    }
}
