//! Serialize data into the bytecode protocol.
use bytes::{BufMut, Bytes};

use crate::error::{Error, Result};

pub trait ToByte {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()>;
}

impl<'a, T: ToByte + 'a + ?Sized> ToByte for &'a T {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        (*self).encode(buffer)
    }
}

impl ToByte for i8 {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_i8(*self);
        Ok(())
    }
}

impl ToByte for i16 {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_i16(*self);
        Ok(())
    }
}

impl ToByte for i32 {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_i32(*self);
        Ok(())
    }
}

impl ToByte for u32 {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_u32(*self);
        Ok(())
    }
}

impl ToByte for i64 {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_i64(*self);
        Ok(())
    }
}

impl ToByte for str {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        encode_string(buffer, Some(self.as_bytes()), LengthWidth::Int16)
    }
}

impl ToByte for String {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.as_str().encode(buffer)
    }
}

impl<V: ToByte> ToByte for [V] {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        encode_as_array(buffer, self, |buffer, x| x.encode(buffer))
    }
}

impl ToByte for [u8] {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        encode_string(buffer, Some(self), LengthWidth::Int32)
    }
}

impl ToByte for Option<&[u8]> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        encode_string(buffer, *self, LengthWidth::Int32)
    }
}

impl ToByte for Option<Bytes> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        encode_string(buffer, self.as_deref(), LengthWidth::Int32)
    }
}

impl ToByte for Bytes {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        encode_string(buffer, Some(&self[..]), LengthWidth::Int32)
    }
}

/// Width of the length prefix in front of a string or byte array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthWidth {
    /// `int16` prefix, used by protocol strings (topic names, client id).
    Int16,
    /// `int32` prefix, used by message keys and values.
    Int32,
}

impl LengthWidth {
    /// Largest length representable by this prefix.
    pub fn max_len(self) -> usize {
        match self {
            LengthWidth::Int16 => i16::MAX as usize,
            LengthWidth::Int32 => i32::MAX as usize,
        }
    }
}

/// Write a length-prefixed value.
///
/// An absent or empty value is written as the null marker: `-1` in the
/// requested width (`FF FF` or `FF FF FF FF`) and no payload bytes.
pub fn encode_string<W: BufMut>(
    buffer: &mut W,
    value: Option<&[u8]>,
    width: LengthWidth,
) -> Result<()> {
    let value = match value {
        Some(v) if !v.is_empty() => v,
        _ => {
            match width {
                LengthWidth::Int16 => buffer.put_i16(-1),
                LengthWidth::Int32 => buffer.put_i32(-1),
            }
            return Ok(());
        }
    };

    if value.len() > width.max_len() {
        return Err(Error::Encoding(format!(
            "value of {} bytes does not fit a {:?} length prefix",
            value.len(),
            width
        )));
    }

    match width {
        LengthWidth::Int16 => buffer.put_i16(value.len() as i16),
        LengthWidth::Int32 => buffer.put_i32(value.len() as i32),
    }
    buffer.put_slice(value);
    Ok(())
}

/// Renders the length of `xs` to `buffer` as the start of a
/// protocol array and then for each element of `xs` invokes `f`
/// assuming that function will render the element to the buffer.
pub fn encode_as_array<T, F, W>(buffer: &mut W, xs: &[T], mut f: F) -> Result<()>
where
    F: FnMut(&mut W, &T) -> Result<()>,
    W: BufMut,
{
    buffer.put_i32(xs.len() as i32);
    for x in xs {
        f(buffer, x)?;
    }
    Ok(())
}

/// Encode a slice of ToByte items as a Kafka protocol array.
pub fn encode_array<T: ToByte, W: BufMut>(buffer: &mut W, items: &[T]) -> Result<()> {
    encode_as_array(buffer, items, |buffer, item| item.encode(buffer))
}
