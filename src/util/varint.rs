//! Variable-length integer encoding utilities.
//!
//! LEB128-style encoding: 7 bits per byte, low groups first, with the high bit
//! set on every byte except the last. Doc-id and position deltas are small, so
//! most values in a postings stream take a single byte.

use crate::error::{Result, TesseraError};

/// Maximum encoded length of a u64.
pub const MAX_VARINT_LEN_U64: usize = 10;

/// Maximum encoded length of a u32.
pub const MAX_VARINT_LEN_U32: usize = 5;

/// Append the encoding of `value` to `buf`, returning the number of bytes written.
pub fn encode_u64_into(buf: &mut Vec<u8>, value: u64) -> usize {
    let start = buf.len();
    let mut val = value;

    loop {
        let mut byte = (val & 0x7F) as u8;
        val >>= 7;

        if val != 0 {
            byte |= 0x80;
        }

        buf.push(byte);

        if val == 0 {
            break;
        }
    }

    buf.len() - start
}

/// Encode a u64 value using variable-length encoding.
pub fn encode_u64(value: u64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(MAX_VARINT_LEN_U64);
    encode_u64_into(&mut bytes, value);
    bytes
}

/// Encode a u32 value using variable-length encoding.
pub fn encode_u32(value: u32) -> Vec<u8> {
    encode_u64(value as u64)
}

/// Decode a u64 value, returning the value and the number of bytes consumed.
pub fn decode_u64(bytes: &[u8]) -> Result<(u64, usize)> {
    let mut result = 0u64;
    let mut shift = 0;

    for (i, &byte) in bytes.iter().enumerate() {
        if shift >= 64 || (shift == 63 && (byte & 0x7F) > 1) {
            return Err(TesseraError::codec("VarInt overflow"));
        }

        result |= ((byte & 0x7F) as u64) << shift;

        if (byte & 0x80) == 0 {
            return Ok((result, i + 1));
        }

        shift += 7;
    }

    Err(TesseraError::codec("Incomplete VarInt"))
}

/// Decode a u32 value, returning the value and the number of bytes consumed.
pub fn decode_u32(bytes: &[u8]) -> Result<(u32, usize)> {
    let (value, read) = decode_u64(&bytes[..bytes.len().min(MAX_VARINT_LEN_U32)])
        .map_err(|_| TesseraError::codec("VarInt overflow or truncation for u32"))?;
    let value = u32::try_from(value).map_err(|_| TesseraError::codec("VarInt overflow"))?;
    Ok((value, read))
}

/// Number of bytes `value` occupies once encoded.
pub fn encoded_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}
