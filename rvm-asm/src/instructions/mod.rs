//! Instruction values.
//!
//! An [`Inst`] is an opaque unit occupying contiguous bytes of the code
//! region: a VM operation with its operand tuples, a raw byte string, or an
//! address-valued data word. Instructions are cheap reference handles with
//! identity semantics — the layout engine keys its maps on the handle, and
//! placing the same handle twice in a program is an error.
//!
//! Wire format of an operation:
//!
//! ```text
//! opcode [tgt_count] tgt_1 tgt_2 ... [src_count] [src_1] src_2 ...
//! ```
//!
//! `src_1` is omitted iff the opcode byte has bit `0x80` set: when the first
//! source encodes to the same bytes as the first target, the instruction is
//! a read-modify-write and the VM reconstructs the source from the target.
//! The counts appear only for variable-arity opcodes and always hold the
//! original source count; RMW elision is a wire-level shortcut.

pub mod opcodes;
pub mod ops;
pub mod rhs;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use crate::error::{AsmError, AsmResult};
use crate::guard::{self, CycleGuard};
use crate::instructions::opcodes::Opcode;
use crate::layout::Layout;
use crate::operands::{CodeRef, Imm, Source, Target};
use crate::varint::MAX_VARINT_SIZE;

/// An instruction handle.
///
/// Clones share identity; equality and hashing are by identity, never by
/// content, so two separately constructed `Nop`s are distinct.
#[derive(Clone)]
pub struct Inst(pub(crate) Rc<InstNode>);

pub(crate) struct InstNode {
	payload: Payload,
}

pub(crate) enum Payload {
	/// A VM operation.
	Op {
		opcode: Opcode,
		tgts: Vec<Target>,
		srcs: Vec<Source>,
	},
	/// A fixed byte string placed in code.
	Bytes(Vec<u8>),
	/// An address-valued expression serialized little-endian at a fixed
	/// width.
	Data {
		target: CodeRef,
		size: usize,
	},
}

/// A weak instruction reference.
///
/// Branches hold themselves as the base of their offset operand; the back
/// reference is weak so cyclic programs cannot leak. Resolving a reference
/// whose instruction was dropped is a [`AsmError::MissingDef`].
#[derive(Clone)]
pub struct InstRef(Weak<InstNode>);

impl InstRef {
	/// Resolve back to the instruction.
	///
	/// # Errors
	///
	/// Returns [`AsmError::MissingDef`] when the instruction is gone.
	pub fn upgrade(&self) -> AsmResult<Inst> {
		self.0.upgrade().map(Inst).ok_or_else(|| AsmError::missing_def("dropped instruction reference"))
	}
}

impl PartialEq for InstRef {
	fn eq(&self, other: &Self) -> bool {
		Weak::ptr_eq(&self.0, &other.0)
	}
}

impl fmt::Debug for InstRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.0.upgrade() {
			Some(node) => write!(f, "InstRef({})", Inst(node)),
			None => write!(f, "InstRef(<dropped>)"),
		}
	}
}

impl Inst {
	pub(crate) fn from_op(opcode: Opcode, tgts: Vec<Target>, srcs: Vec<Source>) -> Self {
		Self(Rc::new(InstNode {
			payload: Payload::Op {
				opcode,
				tgts,
				srcs,
			},
		}))
	}

	/// Build an operation whose operands refer back to the instruction
	/// itself, e.g. a branch carrying its own PC-relative offset.
	pub(crate) fn from_op_cyclic(
		opcode: Opcode,
		make: impl FnOnce(InstRef) -> (Vec<Target>, Vec<Source>),
	) -> Self {
		Self(Rc::new_cyclic(|weak| {
			let (tgts, srcs) = make(InstRef(weak.clone()));
			InstNode {
				payload: Payload::Op {
					opcode,
					tgts,
					srcs,
				},
			}
		}))
	}

	/// A fixed byte string placed in code.
	pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
		Self(Rc::new(InstNode {
			payload: Payload::Bytes(data.into()),
		}))
	}

	/// A 32-bit little-endian word. The value is truncated to 32 bits, so
	/// signed and unsigned spellings of the same pattern are equivalent.
	pub fn word32(val: i64) -> Self {
		Self::bytes((val as u32).to_le_bytes())
	}

	/// A 16-bit little-endian word, truncated as [`Inst::word32`].
	pub fn word16(val: i64) -> Self {
		Self::bytes((val as u16).to_le_bytes())
	}

	/// A single byte, truncated as [`Inst::word32`].
	pub fn word8(val: i64) -> Self {
		Self::bytes([val as u8])
	}

	/// A NUL-terminated UTF-8 string.
	pub fn cstr(val: &str) -> Self {
		let mut data = val.as_bytes().to_vec();
		data.push(0);
		Self::bytes(data)
	}

	/// A code address serialized as a 32-bit little-endian word, e.g.
	/// `Inst::data(&label)` places the label's address in the code stream.
	pub fn data(target: impl Into<CodeRef>) -> Self {
		Self::data_sized(target, 4)
	}

	/// A code address serialized little-endian at `size` bytes (at most 8).
	pub fn data_sized(target: impl Into<CodeRef>, size: usize) -> Self {
		Self(Rc::new(InstNode {
			payload: Payload::Data {
				target: target.into(),
				size: size.min(8),
			},
		}))
	}

	/// A weak reference to this instruction.
	pub fn downgrade(&self) -> InstRef {
		InstRef(Rc::downgrade(&self.0))
	}

	pub(crate) fn key(&self) -> usize {
		Rc::as_ptr(&self.0) as usize
	}

	/// The opcode, for operations.
	pub fn opcode(&self) -> Option<Opcode> {
		match &self.0.payload {
			Payload::Op {
				opcode,
				..
			} => Some(*opcode),
			_ => None,
		}
	}

	fn kind_name(&self) -> String {
		match &self.0.payload {
			Payload::Op {
				opcode,
				..
			} => opcode.to_string(),
			Payload::Bytes(_) => "Bytes".to_string(),
			Payload::Data {
				..
			} => "Data".to_string(),
		}
	}

	/// Upper bound on the encoded size, independent of any layout. The
	/// first pessimistic layout pass seeds every size with this.
	pub fn max_size(&self) -> usize {
		match &self.0.payload {
			Payload::Op {
				opcode,
				tgts,
				srcs,
			} => {
				let mut size = 1;
				if opcode.is_vartgt() {
					size += MAX_VARINT_SIZE;
				}
				size += tgts.iter().map(Target::max_size).sum::<usize>();
				if opcode.is_varsrc() {
					size += MAX_VARINT_SIZE;
				}
				size += srcs.iter().map(Source::max_size).sum::<usize>();
				size
			}
			Payload::Bytes(data) => data.len(),
			Payload::Data {
				size,
				..
			} => *size,
		}
	}

	/// The address assigned by a layout.
	pub fn addr_for(&self, lay: &Layout) -> AsmResult<u64> {
		lay.addr_of(self)
	}

	/// The encoded length under a layout.
	pub fn size_for(&self, lay: &Layout) -> AsmResult<usize> {
		Ok(self.encode_for(lay)?.len())
	}

	/// The byte encoding under a layout.
	pub fn encode_for(&self, lay: &Layout) -> AsmResult<Vec<u8>> {
		self.encode_with(lay, &mut CycleGuard::new())
	}

	pub(crate) fn encode_with(&self, lay: &Layout, g: &mut CycleGuard) -> AsmResult<Vec<u8>> {
		let key = self.key();
		if !g.enter(key) {
			return Err(AsmError::cycle(self.kind_name()));
		}
		let result = self.encode_inner(lay);
		g.leave(key);
		result
	}

	fn encode_inner(&self, lay: &Layout) -> AsmResult<Vec<u8>> {
		match &self.0.payload {
			Payload::Op {
				opcode,
				tgts,
				srcs,
			} => {
				// Operand objects may compare unequal while encoding to the
				// same bytes; the byte comparison is the robust RMW test.
				let is_rmw = match (tgts.first(), srcs.first()) {
					(Some(tgt), Some(src)) => {
						src.encode_for(lay, true)? == tgt.encode_for(lay, true)?
					}
					_ => false,
				};

				let mut out = vec![opcode.code() | if is_rmw { 0x80 } else { 0 }];
				if opcode.is_vartgt() {
					out.extend(Imm::encode(tgts.len() as i64)?);
				}
				for tgt in tgts {
					out.extend(tgt.encode_for(lay, false)?);
				}
				if opcode.is_varsrc() {
					out.extend(Imm::encode(srcs.len() as i64)?);
				}
				for src in srcs.iter().skip(usize::from(is_rmw)) {
					out.extend(src.encode_for(lay, true)?);
				}
				Ok(out)
			}
			Payload::Bytes(data) => Ok(data.clone()),
			Payload::Data {
				target,
				size,
			} => {
				let val = target.resolve(lay)?;
				let fits = val >= 0 && (*size >= 8 || val < 1i64 << (8 * size));
				if !fits {
					return Err(AsmError::value(format!(
						"data value {val} does not fit unsigned in {size} bytes"
					)));
				}
				Ok(val.to_le_bytes()[..*size].to_vec())
			}
		}
	}

	/// Validate every operand address against the layout's regions, with a
	/// fresh re-entrancy context.
	pub fn check_for(&self, lay: &Layout) -> AsmResult<()> {
		self.check_with(lay, &mut CycleGuard::new())
	}

	pub(crate) fn check_with(&self, lay: &Layout, g: &mut CycleGuard) -> AsmResult<()> {
		let key = self.key();
		if !g.enter(key) {
			// Already being checked by an outer call; a branch reaches
			// itself through its own offset base.
			return Ok(());
		}
		let result = self.check_inner(lay, g);
		g.leave(key);
		result
	}

	fn check_inner(&self, lay: &Layout, g: &mut CycleGuard) -> AsmResult<()> {
		match &self.0.payload {
			Payload::Op {
				opcode,
				tgts,
				srcs,
			} => {
				for (i, tgt) in tgts.iter().enumerate() {
					let width = if i == 0 { opcode.target_access_width() } else { 4 };
					tgt.check_with(lay, g, width)?;
				}
				for (i, src) in srcs.iter().enumerate() {
					let width = if i == 0 { opcode.source_access_width() } else { 4 };
					src.check_with(lay, g, width)?;
				}
				Ok(())
			}
			Payload::Bytes(_)
			| Payload::Data {
				..
			} => Ok(()),
		}
	}

	/// A mnemonic rendering of the instruction in terms of a layout, as
	/// used by the listing.
	pub fn render_for(&self, lay: &Layout) -> AsmResult<String> {
		match &self.0.payload {
			Payload::Op {
				opcode,
				tgts,
				srcs,
			} => {
				let tgts_r =
					tgts.iter().map(|t| t.render_for(lay)).collect::<AsmResult<Vec<_>>>()?;
				let srcs_r =
					srcs.iter().map(|s| s.render_for(lay)).collect::<AsmResult<Vec<_>>>()?;
				let mut operands: Vec<String> = Vec::new();
				if opcode.is_vartgt() {
					operands.push(format!("({})", tgts_r.join(", ")));
				} else {
					operands.extend(tgts_r);
				}
				if opcode.is_varsrc() {
					operands.push(format!("({})", srcs_r.join(", ")));
				} else {
					operands.extend(srcs_r);
				}
				let mut line = format!("{opcode} {}", operands.join(", ")).trim_end().to_string();
				if matches!(opcode, Opcode::Jmp | Opcode::JmpLnk) {
					if let Some(addr) = srcs.last() {
						line.push_str(&format!(":<{addr}>"));
					}
				}
				Ok(line)
			}
			Payload::Bytes(data) => Ok(format!("Bytes({})", hex::encode(data))),
			Payload::Data {
				..
			} => Ok(hex::encode(self.encode_for(lay)?)),
		}
	}

	fn render_static(&self) -> String {
		match &self.0.payload {
			Payload::Op {
				opcode,
				tgts,
				srcs,
			} => {
				let operands: Vec<String> = tgts
					.iter()
					.map(ToString::to_string)
					.chain(srcs.iter().map(ToString::to_string))
					.collect();
				format!("{opcode}({})", operands.join(", "))
			}
			Payload::Bytes(data) => format!("Bytes({})", hex::encode(data)),
			Payload::Data {
				target,
				..
			} => format!("@{target}"),
		}
	}
}

impl PartialEq for Inst {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}
}

impl Eq for Inst {}

impl Hash for Inst {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.key().hash(state);
	}
}

impl fmt::Display for Inst {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		// A branch displays its operands, one of which holds the branch
		// itself; the guard cuts the loop with a `...Name` sentinel.
		let rendered =
			guard::with_repr_guard(self.key(), || format!("...{}", self.kind_name()), || {
				self.render_static()
			});
		write!(f, "{rendered}")
	}
}

impl fmt::Debug for Inst {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{self}")
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::operands::Mem;

	#[test]
	fn test_identity_semantics() {
		let a = ops::nop();
		let b = ops::nop();
		assert_ne!(a, b);
		assert_eq!(a, a.clone());
	}

	#[test]
	fn test_max_size() {
		// Opcode byte only.
		assert_eq!(ops::nop().max_size(), 1);
		// Opcode + target + two sources, five bytes each.
		assert_eq!(ops::add(Mem::reg(0), Mem::reg(1), 2).max_size(), 16);
		// Variable sources add a count varint.
		assert_eq!(ops::max(Mem::reg(0), [Source::from(1), Source::from(2)]).max_size(), 21);
		// Sys has both counts; func is a source like any other.
		assert_eq!(ops::sys(1, vec![Target::from(Mem::reg(0))], vec![]).max_size(), 21);
	}

	#[test]
	fn test_data_sizes() {
		assert_eq!(Inst::word32(-2).max_size(), 4);
		assert_eq!(Inst::word16(0x1234).max_size(), 2);
		assert_eq!(Inst::word8(7).max_size(), 1);
		assert_eq!(Inst::cstr("hi").max_size(), 3);
		let lab = crate::operands::expr::Label::new();
		assert_eq!(Inst::data(&lab).max_size(), 4);
		assert_eq!(Inst::data_sized(&lab, 2).max_size(), 2);
	}

	#[test]
	fn test_display_cuts_self_reference() {
		let lab = crate::operands::expr::Label::named("end");
		let br = ops::br(&lab);
		let shown = br.to_string();
		assert!(shown.starts_with("Br("), "{shown}");
		assert!(shown.contains("...Br"), "{shown}");
	}
}
