//! Common test utilities for assembler integration tests.
//!
//! Provides a small shared environment (a 1 KiB RAM keeps address checks
//! tight) and independent wire-format decoders so the encoding tests do
//! not validate the codec against itself.

#![allow(dead_code)]

use rvm_asm::{Code, Env, Script};

/// A compact environment: 1 KiB of RAM, code high above it.
pub fn test_env() -> Env {
	Env::new((0x10_0000, 0x1_0000_0000), (0, 1024))
		.expect("test env is valid")
		.with_named_register("sp", 13)
		.with_named_register("lr", 14)
}

/// Wrap a code tree with the shared test environment.
pub fn script(code: impl Into<Code>) -> Script {
	Script::new(code).with_env(test_env())
}

/// Hand-rolled prefix-varint decoder: the total length is the position of
/// the lowest set bit of the first byte. Deliberately written against the
/// format description, not the library.
pub fn decode_prefix_varint(bytes: &[u8]) -> (u64, usize) {
	let mut raw = [0u8; 8];
	let n = (bytes[0].trailing_zeros() + 1) as usize;
	raw[..n].copy_from_slice(&bytes[..n]);
	let val = u64::from_le_bytes(raw);
	(val >> n, n)
}

/// Decode an immediate operand: varint payload, low two bits are the sign
/// tag, negative values are stored complemented.
pub fn decode_imm(bytes: &[u8]) -> (i64, usize) {
	let (payload, n) = decode_prefix_varint(bytes);
	let s = (payload >> 2) as i64;
	let val = if payload & 0b11 == 0b10 { !s } else { s };
	(val, n)
}

/// Decode a direct-memory operand used as a source: strip the source bit,
/// then the alignment tag tells whether the address is stored divided by
/// four.
pub fn decode_mem_src(bytes: &[u8]) -> (u64, usize) {
	let (payload, n) = decode_prefix_varint(bytes);
	assert_eq!(payload & 1, 1, "source bit expected");
	let payload = payload >> 1;
	let addr = if payload & 0b10 == 0 { (payload >> 2) * 4 } else { payload >> 2 };
	(addr, n)
}
