//! Deserialize data from the bytecode protocol.
use bytes::Bytes;
use nom::{
    IResult,
    bytes::complete::take,
    multi::many_m_n,
    number::complete::{be_i16, be_i32, be_i64, be_u32},
};
use nombytes::NomBytes;

use crate::constants::MAX_PROTOCOL_ARRAY_SIZE;
use crate::encode::LengthWidth;
use crate::error::{Error, Result};
use crate::types::Offset;

type ParseError = nom::Err<nom::error::Error<NomBytes>>;

fn failure(s: NomBytes, kind: nom::error::ErrorKind) -> ParseError {
    nom::Err::Failure(nom::error::Error::new(s, kind))
}

/// Convert bytes to a validated UTF-8 string.
/// Returns an error if the bytes are not valid UTF-8.
pub fn bytes_to_string(bytes: &Bytes) -> std::result::Result<String, ParseError> {
    std::str::from_utf8(bytes)
        .map(|s| s.to_string())
        .map_err(|_| failure(NomBytes::from(bytes.as_ref()), nom::error::ErrorKind::Verify))
}

/// Read a length-prefixed value of the given prefix width.
///
/// A length of -1 is the null marker and yields `None`. Any other negative
/// length is a decoding failure, as is a length running past the input.
pub fn parse_length_prefixed(
    width: LengthWidth,
) -> impl FnMut(NomBytes) -> IResult<NomBytes, Option<Bytes>> {
    move |s: NomBytes| {
        let (s, length) = match width {
            LengthWidth::Int16 => {
                let (s, length) = be_i16(s)?;
                (s, length as i32)
            }
            LengthWidth::Int32 => be_i32(s)?,
        };

        if length == -1 {
            return Ok((s, None));
        }
        if length < 0 {
            return Err(failure(s, nom::error::ErrorKind::TooLarge));
        }

        let (s, value) = take(length as usize)(s)?;
        Ok((s, Some(value.into_bytes())))
    }
}

/// Parse an `int16`-prefixed nullable string.
pub fn parse_nullable_string(s: NomBytes) -> IResult<NomBytes, Option<Bytes>> {
    parse_length_prefixed(LengthWidth::Int16)(s)
}

/// Parse an `int16`-prefixed string that must be valid UTF-8. Null reads
/// as the empty string.
pub fn parse_string(s: NomBytes) -> IResult<NomBytes, String> {
    let (s, bytes) = parse_nullable_string(s)?;
    match bytes {
        Some(bytes) => Ok((s, bytes_to_string(&bytes)?)),
        None => Ok((s, String::new())),
    }
}

/// Parse an `int32`-prefixed nullable byte array.
pub fn parse_nullable_bytes(s: NomBytes) -> IResult<NomBytes, Option<Bytes>> {
    parse_length_prefixed(LengthWidth::Int32)(s)
}

pub fn parse_array<O, E, F>(f: F) -> impl FnMut(NomBytes) -> IResult<NomBytes, Vec<O>, E>
where
    F: nom::Parser<NomBytes, O, E> + Copy,
    E: nom::error::ParseError<NomBytes>,
{
    move |input: NomBytes| {
        let i = input.clone();
        let (i, length) = be_i32(i)?;

        // Null array
        if length == -1 {
            return Ok((i, vec![]));
        }

        if !(0..=MAX_PROTOCOL_ARRAY_SIZE).contains(&length) {
            return Err(nom::Err::Failure(E::from_error_kind(
                i,
                nom::error::ErrorKind::TooLarge,
            )));
        }

        many_m_n(length as usize, length as usize, f)(i)
    }
}

/// Parse an 8-byte broker log offset.
pub fn parse_offset(s: NomBytes) -> IResult<NomBytes, Offset> {
    let (s, value) = be_i64(s)?;
    Ok((s, Offset::new(value)))
}

/// Parse a legacy 4-byte offset.
pub fn parse_legacy_offset(s: NomBytes) -> IResult<NomBytes, Offset> {
    let (s, value) = be_u32(s)?;
    Ok((s, Offset::from_legacy(value)))
}

/// Interpret exactly 8 bytes as a broker log offset.
pub fn decode_offset64(bytes: &[u8]) -> Result<Offset> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::ParsingError(Bytes::copy_from_slice(bytes)))?;
    Ok(Offset::from_be_bytes(raw))
}

/// Interpret exactly 4 bytes as a legacy 32-bit offset.
pub fn decode_offset32(bytes: &[u8]) -> Result<Offset> {
    let raw: [u8; 4] = bytes
        .try_into()
        .map_err(|_| Error::ParsingError(Bytes::copy_from_slice(bytes)))?;
    Ok(Offset::from_legacy(u32::from_be_bytes(raw)))
}

/// Run `parser` over a complete response body.
///
/// Malformed input is a [`Error::ParsingError`]; bytes left over after the
/// parser finished mean the response was not fully drained and are a
/// [`Error::Protocol`] error.
pub fn parse_complete<O, F>(bytes: Bytes, mut parser: F) -> Result<O>
where
    F: FnMut(NomBytes) -> IResult<NomBytes, O>,
{
    let (rest, value) =
        parser(NomBytes::new(bytes.clone())).map_err(|_| Error::ParsingError(bytes))?;
    let rest = rest.into_bytes();
    if !rest.is_empty() {
        return Err(Error::Protocol(format!(
            "response not fully drained: {} trailing bytes",
            rest.len()
        )));
    }
    Ok(value)
}
