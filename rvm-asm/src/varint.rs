//! Prefix-varint codec.
//!
//! The low bits of the first byte carry the total length: an `n`-byte value
//! has its `n`-th lowest bit set and all lower bits clear, so the decoder
//! recovers the length from the position of the lowest set bit alone. The
//! payload occupies the remaining high bits, little-endian.

use crate::error::{AsmError, AsmResult};

/// Maximum encoded size of a single varint in bytes.
///
/// Five bytes carry `5 * 7 = 35` payload bits, enough for any 32-bit
/// quantity after tag shifting.
pub const MAX_VARINT_SIZE: usize = 5;

fn bit_len(v: u64) -> u32 {
	u64::BITS - v.leading_zeros()
}

/// Encode an unsigned value as a prefix varint.
///
/// # Errors
///
/// Returns [`AsmError::Value`] when the value needs more than
/// [`MAX_VARINT_SIZE`] bytes.
pub fn encode_varint(val: u64) -> AsmResult<Vec<u8>> {
	let nbytes = ((bit_len(val) + 6) / 7).max(1) as usize;
	if nbytes > MAX_VARINT_SIZE {
		return Err(AsmError::value(format!("{val} does not fit in a {MAX_VARINT_SIZE}-byte varint")));
	}
	let shifted = (val << nbytes) | (1 << (nbytes - 1));
	let out_len = ((bit_len(shifted) + 7) / 8) as usize;
	Ok(shifted.to_le_bytes()[..out_len].to_vec())
}

/// Decode a prefix varint from the start of `bytes`.
///
/// Returns the decoded value and the number of bytes consumed.
///
/// # Errors
///
/// Returns [`AsmError::Value`] on an empty slice, a zero first byte (no
/// length marker), an over-long length marker, or a truncated input.
pub fn decode_varint(bytes: &[u8]) -> AsmResult<(u64, usize)> {
	let first = *bytes.first().ok_or_else(|| AsmError::value("empty varint"))?;
	if first == 0 {
		return Err(AsmError::value("varint first byte carries no length marker"));
	}
	let nbytes = first.trailing_zeros() as usize + 1;
	if nbytes > MAX_VARINT_SIZE {
		return Err(AsmError::value(format!("varint length marker claims {nbytes} bytes")));
	}
	if bytes.len() < nbytes {
		return Err(AsmError::value(format!(
			"truncated varint: need {nbytes} bytes, have {}",
			bytes.len()
		)));
	}
	let mut raw = [0u8; 8];
	raw[..nbytes].copy_from_slice(&bytes[..nbytes]);
	let val = u64::from_le_bytes(raw) >> nbytes;
	Ok((val, nbytes))
}
