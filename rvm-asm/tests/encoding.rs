//! Wire-format integration tests: varints, operand tags, RMW compression.

mod common;

use common::{decode_imm, decode_prefix_varint, script, test_env};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rvm_asm::operands::{IMem, Mem};
use rvm_asm::varint::{MAX_VARINT_SIZE, decode_varint, encode_varint};
use rvm_asm::{AsmError, Imm, ImmRange, Script, code, ops};

#[test]
fn test_varint_against_independent_decoder() {
	let interesting = [
		0u64,
		1,
		(1 << 7) - 1,
		1 << 7,
		(1 << 14) - 1,
		1 << 14,
		(1 << 21) - 1,
		1 << 21,
		(1 << 28) - 1,
		1 << 28,
		(1 << 35) - 1,
		(0xFFFF_FFFF << 3) | 0x7,
	];
	for val in interesting {
		let encoded = encode_varint(val).unwrap();
		assert!(encoded.len() <= MAX_VARINT_SIZE);
		assert_eq!(decode_prefix_varint(&encoded), (val, encoded.len()), "value {val}");
	}
}

proptest! {
	#[test]
	fn varint_round_trips(val in 0u64..(1 << 35)) {
		let encoded = encode_varint(val).unwrap();
		prop_assert_eq!(decode_varint(&encoded).unwrap(), (val, encoded.len()));
		prop_assert_eq!(decode_prefix_varint(&encoded), (val, encoded.len()));
	}

	#[test]
	fn imm_round_trips(val in -0x8000_0000i64..0x8000_0000i64) {
		let encoded = Imm::encode(val).unwrap();
		prop_assert_eq!(decode_imm(&encoded), (val, encoded.len()));
	}
}

#[test]
fn test_rmw_compression() {
	// Same first source and target: one byte shorter, high bit set.
	let rmw = script(code![ops::mov(Mem::reg(0), Mem::reg(0))]).bytes().unwrap();
	let plain = script(code![ops::mov(Mem::reg(0), Mem::reg(1))]).bytes().unwrap();
	assert!(rmw.len() < plain.len());
	assert_eq!(rmw.len() + 1, plain.len());
	assert_eq!(rmw[0] & 0x80, 0x80);
	assert_eq!(plain[0] & 0x80, 0);

	let rmw = script(code![ops::add(Mem::reg(0), Mem::reg(0), 10)]).bytes().unwrap();
	let plain = script(code![ops::add(Mem::reg(0), Mem::reg(1), 10)]).bytes().unwrap();
	assert!(rmw.len() < plain.len());
	assert_eq!(rmw[0] & 0x80, 0x80);
	assert_eq!(plain[0] & 0x80, 0);
}

#[test]
fn test_rmw_by_encoding_not_structure() {
	// A register and its spelled-out word address encode identically, so
	// the pair still compresses.
	let aliased = script(code![ops::add(Mem::reg(2), Mem::abs(8), 1)]).bytes().unwrap();
	assert_eq!(aliased[0] & 0x80, 0x80);
}

#[test]
fn test_byte_aligned_addresses_cost_more() {
	// A word-aligned address is stored divided by four; 511 is not
	// aligned and needs the wide form.
	let aligned = script(code![ops::mov(Mem::reg(0), Mem::abs(4))]).bytes().unwrap();
	let unaligned = script(code![ops::mov(Mem::reg(0), Mem::abs(511))]).bytes().unwrap();
	assert!(unaligned.len() > aligned.len());
}

#[test]
fn test_indirect_operand_encodes_ref_and_offset() {
	// mov r1, mem[r0 + 8]: opcode, target, reference varint, offset
	// varint.
	let script = script(code![ops::mov(Mem::reg(1), IMem::with_offset(Mem::reg(0), 8))]);
	let lay = script.layout().unwrap();
	let encoded = lay.insts()[0].encode_for(lay).unwrap();

	// Skip opcode and the one-byte target.
	let (ref_payload, ref_len) = decode_prefix_varint(&encoded[2..]);
	assert_eq!(ref_payload & 1, 1, "reference carries the source bit");
	assert_eq!((ref_payload >> 1) & 0b11, 0b01, "word-aligned indirect tag");
	let (offset, _) = decode_imm(&encoded[2 + ref_len..]);
	assert_eq!(offset, 8);
}

#[test]
fn test_imm_range_presets() {
	// The default preset rejects unsigned spellings of high-bit values.
	let err = script(code![ops::mov(Mem::reg(0), 0xFFFF_FFFFu32)]).bytes();
	assert!(matches!(err, Err(AsmError::Value { .. })));

	// The widened preset accepts the full 32-bit envelope.
	let env = test_env().with_imm_range(ImmRange::Full32);
	let ok = Script::new(code![ops::mov(Mem::reg(0), 0xFFFF_FFFFu32)]).with_env(env);
	assert!(ok.bytes().is_ok());

	// An unsigned spelling encodes like its negative reading.
	let env = test_env().with_imm_range(ImmRange::Full32);
	let wide = Script::new(code![ops::mov(Mem::reg(0), 0xFFFF_FFFFu32)]).with_env(env);
	let signed = script(code![ops::mov(Mem::reg(0), -1)]);
	assert_eq!(wide.bytes().unwrap(), signed.bytes().unwrap());
}

#[test]
fn test_var_arity_counts_are_original() {
	// max r0, (1, 2, 3): the source count varint stays 3 even when RMW
	// elides a source; here no elision, count is simply present.
	let script = script(code![ops::max(Mem::reg(0), (1..=3).map(Into::into))]);
	let lay = script.layout().unwrap();
	let encoded = lay.insts()[0].encode_for(lay).unwrap();
	// Opcode, target (1 byte), then the count.
	let (count, _) = decode_imm(&encoded[2..]);
	assert_eq!(count, 3);
}

#[test]
fn test_sys_counts_both_vectors() {
	let script = script(code![ops::sys(
		7,
		vec![Mem::reg(0).into(), Mem::reg(1).into()],
		vec![1.into(), 2.into(), 3.into()],
	)]);
	let lay = script.layout().unwrap();
	let encoded = lay.insts()[0].encode_for(lay).unwrap();
	// Opcode, then the target count.
	let (tgt_count, n) = decode_imm(&encoded[1..]);
	assert_eq!(tgt_count, 2);
	// Two one-byte register targets follow, then the source count:
	// func plus three arguments.
	let (src_count, _) = decode_imm(&encoded[1 + n + 2..]);
	assert_eq!(src_count, 4);
}
