//! Operand values: immediates, direct and indirect memory, code addresses.
//!
//! Every operand knows three things: an upper bound on its encoded size
//! (layout independent), its address or value under a given layout, and its
//! byte encoding. The encodings are tagged prefix varints, see the module
//! docs of [`crate::varint`]: two low tag bits distinguish word-aligned
//! direct memory (`00`), byte-aligned direct memory (`10`), and the same
//! pair for indirect references (`01`/`11`); one further low bit marks an
//! operand used as a source rather than a store target. Word-aligned
//! addresses are encoded divided by four, so registers and aligned words
//! stay short.

pub mod expr;

use std::fmt;

use crate::env::{S32_MAX, S32_MIN, U32_MAX};
use crate::error::{AsmError, AsmResult};
use crate::guard::CycleGuard;
use crate::instructions::Inst;
use crate::layout::Layout;
use crate::operands::expr::{Expr, Label};
use crate::varint::{MAX_VARINT_SIZE, encode_varint};

/// A literal immediate.
///
/// Stored widened to `i64` so both signed and unsigned 32-bit spellings
/// fit; the permitted range of *literal* operands is an environment preset,
/// while the hard envelope `[-2^31, 2^32)` is enforced at encode time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Imm(pub i64);

fn cast_s32(a: i64) -> i64 {
	if a > S32_MAX { a - (U32_MAX + 1) } else { a }
}

impl Imm {
	/// Maximum encoded size, layout independent.
	pub fn max_size(self) -> usize {
		MAX_VARINT_SIZE
	}

	/// Encode a value with the immediate sign tag.
	///
	/// Values above `i32::MAX` wrap to their negative two's-complement
	/// reading first, so `0xFFFF_FFFF` and `-1` encode identically.
	///
	/// # Errors
	///
	/// Returns [`AsmError::Value`] outside `[-2^31, 2^32)`.
	pub fn encode(val: i64) -> AsmResult<Vec<u8>> {
		if !(S32_MIN..=U32_MAX).contains(&val) {
			return Err(AsmError::value(format!("immediate {val} outside of 32-bit envelope")));
		}
		let v = cast_s32(val);
		let payload = if v >= 0 { (v << 2) as u64 } else { ((!v << 2) | 0b10) as u64 };
		encode_varint(payload)
	}
}

impl fmt::Display for Imm {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl From<i32> for Imm {
	fn from(v: i32) -> Self {
		Self(i64::from(v))
	}
}

impl From<u32> for Imm {
	fn from(v: u32) -> Self {
		Self(i64::from(v))
	}
}

impl From<i64> for Imm {
	fn from(v: i64) -> Self {
		Self(v)
	}
}

/// The target of a code-address operand: an instruction or an expression.
#[derive(Clone, Debug, PartialEq)]
pub enum CodeRef {
	/// The address of an instruction.
	Inst(Inst),
	/// An evaluated expression, e.g. a label plus a constant.
	Expr(Expr),
}

impl CodeRef {
	pub(crate) fn resolve(&self, lay: &Layout) -> AsmResult<i64> {
		match self {
			Self::Inst(inst) => Ok(lay.addr_of(inst)? as i64),
			Self::Expr(expr) => expr.eval_for(lay),
		}
	}
}

impl fmt::Display for CodeRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Inst(inst) => write!(f, "{inst}"),
			Self::Expr(expr) => write!(f, "{expr}"),
		}
	}
}

impl From<Inst> for CodeRef {
	fn from(inst: Inst) -> Self {
		Self::Inst(inst)
	}
}

impl From<&Inst> for CodeRef {
	fn from(inst: &Inst) -> Self {
		Self::Inst(inst.clone())
	}
}

impl From<Label> for CodeRef {
	fn from(label: Label) -> Self {
		Self::Expr(Expr::Label(label))
	}
}

impl From<&Label> for CodeRef {
	fn from(label: &Label) -> Self {
		Self::Expr(Expr::Label(label.clone()))
	}
}

impl From<Expr> for CodeRef {
	fn from(expr: Expr) -> Self {
		Self::Expr(expr)
	}
}

/// Direct memory.
#[derive(Clone, Debug)]
pub enum Mem {
	/// Memory at a fixed byte address.
	Abs(u64),
	/// Register `n`, i.e. memory at byte address `n * 4`. Must lie in RAM.
	Reg(u32),
	/// A register resolved by name through the environment at build time.
	Named(String),
	/// Memory at a code address: a label, an instruction, or an
	/// expression over them. Must lie in the code range.
	Code(CodeRef),
}

impl Mem {
	/// Register `n`.
	pub fn reg(n: u32) -> Self {
		Self::Reg(n)
	}

	/// The named register `name`.
	pub fn named(name: impl Into<String>) -> Self {
		Self::Named(name.into())
	}

	/// Memory at the fixed byte address `addr`.
	pub fn abs(addr: u64) -> Self {
		Self::Abs(addr)
	}

	/// Memory at the code address of `target`.
	pub fn code(target: impl Into<CodeRef>) -> Self {
		Self::Code(target.into())
	}

	/// The byte address under a layout.
	pub fn addr_for(&self, lay: &Layout) -> AsmResult<u64> {
		match self {
			Self::Abs(addr) => Ok(*addr),
			Self::Reg(n) => Ok(u64::from(*n) * 4),
			Self::Named(name) => Ok(u64::from(lay.named_register(name)?) * 4),
			Self::Code(target) => {
				let addr = target.resolve(lay)?;
				u64::try_from(addr)
					.map_err(|_| AsmError::addr(format!("negative code address {addr} for {self}")))
			}
		}
	}

	/// Maximum encoded size, layout independent.
	pub fn max_size(&self) -> usize {
		MAX_VARINT_SIZE
	}

	/// Encode a direct-memory address with alignment and source tags.
	pub(crate) fn encode_addr(addr: u64, as_src: bool) -> AsmResult<Vec<u8>> {
		if addr > U32_MAX as u64 {
			return Err(AsmError::value(format!("address {addr:#x} wider than 32 bits")));
		}
		let mut v = if addr % 4 == 0 { (addr / 4) << 2 } else { (addr << 2) | 0b10 };
		if as_src {
			v = (v << 1) | 0b1;
		}
		encode_varint(v)
	}

	pub(crate) fn encode_for(&self, lay: &Layout, as_src: bool) -> AsmResult<Vec<u8>> {
		Self::encode_addr(self.addr_for(lay)?, as_src)
	}

	/// Validate the whole accessed range `[addr, addr + width)`.
	pub(crate) fn check_with(&self, lay: &Layout, guard: &mut CycleGuard, width: u64) -> AsmResult<()> {
		if let Self::Code(CodeRef::Inst(inst)) = self {
			inst.check_with(lay, guard)?;
		}
		let addr = self.addr_for(lay)?;
		match self {
			Self::Abs(_) => {
				if !lay.code_holds(addr, width) && !lay.ram_holds(addr, width) {
					return Err(AsmError::addr(format!(
						"{self}: range [{addr:#x}, {:#x}) outside of any region",
						addr + width
					)));
				}
			}
			Self::Reg(_) | Self::Named(_) => {
				if !lay.ram_holds(addr, width) {
					return Err(AsmError::addr(format!("{self}: outside of ram region")));
				}
			}
			Self::Code(_) => {
				if !lay.code_holds(addr, width) {
					return Err(AsmError::addr(format!(
						"{self}: range [{addr:#x}, {:#x}) outside of code range",
						addr + width
					)));
				}
			}
		}
		Ok(())
	}

	pub(crate) fn render_for(&self, lay: &Layout) -> AsmResult<String> {
		match self {
			Self::Reg(n) => Ok(format!("r{n}")),
			Self::Named(name) => Ok(format!("r{}", lay.named_register(name)?)),
			Self::Abs(addr) => {
				if lay.is_code(*addr) {
					Ok(format!("rom[{addr}]"))
				} else {
					Ok(format!("ram[{addr}]"))
				}
			}
			Self::Code(target) => Ok(format!("rom[{:#x}:<{target}>]", self.addr_for(lay)?)),
		}
	}
}

impl fmt::Display for Mem {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Abs(addr) => write!(f, "M[{addr}]"),
			Self::Reg(n) => write!(f, "R[{n}]"),
			Self::Named(name) => write!(f, "R['{name}']"),
			Self::Code(target) => write!(f, "M[{target}]"),
		}
	}
}

impl PartialEq for Mem {
	fn eq(&self, other: &Self) -> bool {
		// Registers are plain word-aligned memory, so `R[4]` and `M[16]`
		// compare equal.
		let fixed_addr = |mem: &Self| match mem {
			Self::Abs(addr) => Some(*addr),
			Self::Reg(n) => Some(u64::from(*n) * 4),
			_ => None,
		};
		match (self, other) {
			(Self::Named(a), Self::Named(b)) => a == b,
			(Self::Code(a), Self::Code(b)) => a == b,
			_ => match (fixed_addr(self), fixed_addr(other)) {
				(Some(a), Some(b)) => a == b,
				_ => false,
			},
		}
	}
}

/// Offset of an indirect memory operand: anything but another indirection.
#[derive(Clone, Debug, PartialEq)]
pub enum MemOffset {
	/// A direct-memory operand, read as a word.
	Mem(Mem),
	/// A literal.
	Imm(Imm),
	/// A build-time expression.
	Expr(Expr),
}

impl MemOffset {
	/// Maximum encoded size, layout independent.
	pub fn max_size(&self) -> usize {
		MAX_VARINT_SIZE
	}

	/// Offsets are always encoded as sources.
	pub(crate) fn encode_for(&self, lay: &Layout) -> AsmResult<Vec<u8>> {
		match self {
			Self::Mem(mem) => mem.encode_for(lay, true),
			Self::Imm(imm) => Imm::encode(imm.0),
			Self::Expr(expr) => expr.encode_for(lay),
		}
	}

	pub(crate) fn check_with(&self, lay: &Layout, guard: &mut CycleGuard) -> AsmResult<()> {
		match self {
			Self::Mem(mem) => mem.check_with(lay, guard, 4),
			Self::Imm(_) => Ok(()),
			Self::Expr(expr) => expr.check_with(lay, guard),
		}
	}

	pub(crate) fn render_for(&self, lay: &Layout) -> AsmResult<String> {
		match self {
			Self::Mem(mem) => mem.render_for(lay),
			Self::Imm(imm) => Ok(format!("#{imm}")),
			Self::Expr(expr) => expr.render_for(lay),
		}
	}
}

impl fmt::Display for MemOffset {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Mem(mem) => write!(f, "{mem}"),
			Self::Imm(imm) => write!(f, "{imm}"),
			Self::Expr(expr) => write!(f, "{expr}"),
		}
	}
}

impl From<Mem> for MemOffset {
	fn from(mem: Mem) -> Self {
		Self::Mem(mem)
	}
}

impl From<&Mem> for MemOffset {
	fn from(mem: &Mem) -> Self {
		Self::Mem(mem.clone())
	}
}

impl From<Imm> for MemOffset {
	fn from(imm: Imm) -> Self {
		Self::Imm(imm)
	}
}

impl From<i32> for MemOffset {
	fn from(v: i32) -> Self {
		Self::Imm(Imm::from(v))
	}
}

impl From<i64> for MemOffset {
	fn from(v: i64) -> Self {
		Self::Imm(Imm::from(v))
	}
}

impl From<u32> for MemOffset {
	fn from(v: u32) -> Self {
		Self::Imm(Imm::from(v))
	}
}

impl From<Expr> for MemOffset {
	fn from(expr: Expr) -> Self {
		Self::Expr(expr)
	}
}

impl From<Label> for MemOffset {
	fn from(label: Label) -> Self {
		Self::Expr(Expr::Label(label))
	}
}

/// Indirect memory: the contents of memory at the address held in `base`,
/// plus `offset`.
#[derive(Clone, Debug, PartialEq)]
pub struct IMem {
	base: Mem,
	offset: MemOffset,
}

impl IMem {
	/// Indirection through `base` with a zero offset.
	pub fn of(base: Mem) -> Self {
		Self::with_offset(base, 0)
	}

	/// Indirection through `base` plus `offset`.
	pub fn with_offset(base: Mem, offset: impl Into<MemOffset>) -> Self {
		Self {
			base,
			offset: offset.into(),
		}
	}

	/// The cell holding the address.
	pub fn base(&self) -> &Mem {
		&self.base
	}

	/// The offset operand.
	pub fn offset(&self) -> &MemOffset {
		&self.offset
	}

	/// Maximum encoded size, layout independent.
	pub fn max_size(&self) -> usize {
		MAX_VARINT_SIZE + self.offset.max_size()
	}

	/// Encode an indirect reference address with alignment and source tags.
	pub(crate) fn encode_ref(addr: u64, as_src: bool) -> AsmResult<Vec<u8>> {
		if addr > U32_MAX as u64 {
			return Err(AsmError::value(format!("address {addr:#x} wider than 32 bits")));
		}
		let mut v = if addr % 4 == 0 { ((addr / 4) << 2) | 0b01 } else { (addr << 2) | 0b11 };
		if as_src {
			v = (v << 1) | 0b1;
		}
		encode_varint(v)
	}

	pub(crate) fn encode_for(&self, lay: &Layout, as_src: bool) -> AsmResult<Vec<u8>> {
		let mut out = Self::encode_ref(self.base.addr_for(lay)?, as_src)?;
		out.extend(self.offset.encode_for(lay)?);
		Ok(out)
	}

	pub(crate) fn check_with(&self, lay: &Layout, guard: &mut CycleGuard) -> AsmResult<()> {
		// The reference cell itself is read as a word; where it points is
		// only known at run time.
		self.base.check_with(lay, guard, 4)?;
		self.offset.check_with(lay, guard)
	}

	pub(crate) fn render_for(&self, lay: &Layout) -> AsmResult<String> {
		Ok(format!("mem[{} + {}]", self.base.render_for(lay)?, self.offset.render_for(lay)?))
	}
}

impl fmt::Display for IMem {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "M[{} + {}]", self.base, self.offset)
	}
}

/// A store-target operand.
#[derive(Clone, Debug, PartialEq)]
pub enum Target {
	/// Direct memory.
	Mem(Mem),
	/// Indirect memory.
	IMem(IMem),
}

impl Target {
	/// Maximum encoded size, layout independent.
	pub fn max_size(&self) -> usize {
		match self {
			Self::Mem(mem) => mem.max_size(),
			Self::IMem(imem) => imem.max_size(),
		}
	}

	pub(crate) fn encode_for(&self, lay: &Layout, as_src: bool) -> AsmResult<Vec<u8>> {
		match self {
			Self::Mem(mem) => mem.encode_for(lay, as_src),
			Self::IMem(imem) => imem.encode_for(lay, as_src),
		}
	}

	pub(crate) fn check_with(&self, lay: &Layout, guard: &mut CycleGuard, width: u64) -> AsmResult<()> {
		match self {
			Self::Mem(mem) => mem.check_with(lay, guard, width),
			Self::IMem(imem) => imem.check_with(lay, guard),
		}
	}

	pub(crate) fn render_for(&self, lay: &Layout) -> AsmResult<String> {
		match self {
			Self::Mem(mem) => mem.render_for(lay),
			Self::IMem(imem) => imem.render_for(lay),
		}
	}
}

impl fmt::Display for Target {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Mem(mem) => write!(f, "{mem}"),
			Self::IMem(imem) => write!(f, "{imem}"),
		}
	}
}

impl From<Mem> for Target {
	fn from(mem: Mem) -> Self {
		Self::Mem(mem)
	}
}

impl From<&Mem> for Target {
	fn from(mem: &Mem) -> Self {
		Self::Mem(mem.clone())
	}
}

impl From<IMem> for Target {
	fn from(imem: IMem) -> Self {
		Self::IMem(imem)
	}
}

impl From<&IMem> for Target {
	fn from(imem: &IMem) -> Self {
		Self::IMem(imem.clone())
	}
}

/// A source operand.
#[derive(Clone, Debug, PartialEq)]
pub enum Source {
	/// Direct memory.
	Mem(Mem),
	/// Indirect memory.
	IMem(IMem),
	/// A literal immediate.
	Imm(Imm),
	/// A build-time expression.
	Expr(Expr),
}

impl Source {
	/// Maximum encoded size, layout independent.
	pub fn max_size(&self) -> usize {
		match self {
			Self::Mem(mem) => mem.max_size(),
			Self::IMem(imem) => imem.max_size(),
			Self::Imm(imm) => imm.max_size(),
			Self::Expr(expr) => expr.max_size(),
		}
	}

	pub(crate) fn encode_for(&self, lay: &Layout, as_src: bool) -> AsmResult<Vec<u8>> {
		match self {
			Self::Mem(mem) => mem.encode_for(lay, as_src),
			Self::IMem(imem) => imem.encode_for(lay, as_src),
			Self::Imm(imm) => {
				if !lay.env().imm_range.contains(imm.0) {
					return Err(AsmError::value(format!(
						"immediate {} outside of the permitted range",
						imm.0
					)));
				}
				Imm::encode(imm.0)
			}
			Self::Expr(expr) => expr.encode_for(lay),
		}
	}

	pub(crate) fn check_with(&self, lay: &Layout, guard: &mut CycleGuard, width: u64) -> AsmResult<()> {
		match self {
			Self::Mem(mem) => mem.check_with(lay, guard, width),
			Self::IMem(imem) => imem.check_with(lay, guard),
			Self::Imm(_) => Ok(()),
			Self::Expr(expr) => expr.check_with(lay, guard),
		}
	}

	pub(crate) fn render_for(&self, lay: &Layout) -> AsmResult<String> {
		match self {
			Self::Mem(mem) => mem.render_for(lay),
			Self::IMem(imem) => imem.render_for(lay),
			Self::Imm(imm) => Ok(format!("#{imm}")),
			Self::Expr(expr) => expr.render_for(lay),
		}
	}
}

impl fmt::Display for Source {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Mem(mem) => write!(f, "{mem}"),
			Self::IMem(imem) => write!(f, "{imem}"),
			Self::Imm(imm) => write!(f, "{imm}"),
			Self::Expr(expr) => write!(f, "{expr}"),
		}
	}
}

impl From<Mem> for Source {
	fn from(mem: Mem) -> Self {
		Self::Mem(mem)
	}
}

impl From<&Mem> for Source {
	fn from(mem: &Mem) -> Self {
		Self::Mem(mem.clone())
	}
}

impl From<IMem> for Source {
	fn from(imem: IMem) -> Self {
		Self::IMem(imem)
	}
}

impl From<&IMem> for Source {
	fn from(imem: &IMem) -> Self {
		Self::IMem(imem.clone())
	}
}

impl From<Imm> for Source {
	fn from(imm: Imm) -> Self {
		Self::Imm(imm)
	}
}

impl From<i32> for Source {
	fn from(v: i32) -> Self {
		Self::Imm(Imm::from(v))
	}
}

impl From<i64> for Source {
	fn from(v: i64) -> Self {
		Self::Imm(Imm::from(v))
	}
}

impl From<u32> for Source {
	fn from(v: u32) -> Self {
		Self::Imm(Imm::from(v))
	}
}

impl From<Expr> for Source {
	fn from(expr: Expr) -> Self {
		Self::Expr(expr)
	}
}

impl From<Label> for Source {
	fn from(label: Label) -> Self {
		Self::Expr(Expr::Label(label))
	}
}

impl From<&Label> for Source {
	fn from(label: &Label) -> Self {
		Self::Expr(Expr::Label(label.clone()))
	}
}

impl From<Target> for Source {
	fn from(target: Target) -> Self {
		match target {
			Target::Mem(mem) => Self::Mem(mem),
			Target::IMem(imem) => Self::IMem(imem),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_imm_encoding_tags() {
		// Non-negative: value shifted left two, tag 00.
		assert_eq!(Imm::encode(0).unwrap(), encode_varint(0).unwrap());
		assert_eq!(Imm::encode(5).unwrap(), encode_varint(5 << 2).unwrap());
		// Negative: bitwise complement, tag 10.
		assert_eq!(Imm::encode(-1).unwrap(), encode_varint(0b10).unwrap());
		assert_eq!(Imm::encode(-5).unwrap(), encode_varint((4 << 2) | 0b10).unwrap());
	}

	#[test]
	fn test_imm_wraps_unsigned_spelling() {
		assert_eq!(Imm::encode(0xFFFF_FFFF).unwrap(), Imm::encode(-1).unwrap());
		assert!(Imm::encode(U32_MAX + 1).is_err());
		assert!(Imm::encode(S32_MIN - 1).is_err());
	}

	#[test]
	fn test_mem_encoding_tags() {
		// Word-aligned addresses encode divided by four with tag 00.
		assert_eq!(Mem::encode_addr(16, false).unwrap(), encode_varint(4 << 2).unwrap());
		// Byte-aligned addresses keep their value with tag 10.
		assert_eq!(Mem::encode_addr(17, false).unwrap(), encode_varint((17 << 2) | 0b10).unwrap());
		// The source flag is one further low bit.
		assert_eq!(Mem::encode_addr(16, true).unwrap(), encode_varint(((4 << 2) << 1) | 1).unwrap());
	}

	#[test]
	fn test_imem_reference_tags() {
		assert_eq!(IMem::encode_ref(16, false).unwrap(), encode_varint((4 << 2) | 0b01).unwrap());
		assert_eq!(IMem::encode_ref(17, false).unwrap(), encode_varint((17 << 2) | 0b11).unwrap());
	}

	#[test]
	fn test_register_is_plain_memory() {
		assert_eq!(Mem::reg(4), Mem::abs(16));
		assert_ne!(Mem::reg(4), Mem::abs(17));
		assert_ne!(Mem::named("sp"), Mem::abs(52));
		assert_eq!(Mem::named("sp"), Mem::named("sp"));
	}

	#[test]
	fn test_imem_structural_equality() {
		let a = IMem::with_offset(Mem::reg(0), 13);
		let b = IMem::with_offset(Mem::reg(0), 13);
		assert_eq!(a, b);
		assert_ne!(a, IMem::with_offset(Mem::reg(0), 14));
		assert_eq!(IMem::of(Mem::reg(4)), IMem::of(Mem::abs(16)));
	}
}
