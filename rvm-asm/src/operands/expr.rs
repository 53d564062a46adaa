//! Build-time integer expressions.
//!
//! Expressions are evaluated against a layout: leaves are literal values,
//! label addresses, instruction addresses and sizes; interior nodes are the
//! usual arithmetic operators plus the PC-relative [`Expr::Offset`] every
//! relative branch carries. Evaluation performs no bit-width truncation of
//! intermediates; only the final encoding enforces the 32-bit envelope.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{AsmError, AsmResult};
use crate::guard::CycleGuard;
use crate::instructions::{Inst, InstRef};
use crate::layout::Layout;
use crate::operands::{Imm, Mem};
use crate::varint::MAX_VARINT_SIZE;

static LABEL_SEQ: AtomicU64 = AtomicU64::new(0);

/// An address marker bound to the next instruction in the code sequence.
///
/// Labels are cheap handles with identity semantics: clones refer to the
/// same marker, while two separately created labels are always distinct,
/// even under the same name. Anonymous labels get process-unique `_L<n>`
/// names.
#[derive(Clone)]
pub struct Label(Rc<LabelInner>);

struct LabelInner {
	name: String,
}

impl Label {
	/// Create an anonymous label.
	pub fn new() -> Self {
		let seq = LABEL_SEQ.fetch_add(1, Ordering::Relaxed) + 1;
		Self(Rc::new(LabelInner {
			name: format!("_L{seq}"),
		}))
	}

	/// Create a named label.
	pub fn named(name: impl Into<String>) -> Self {
		Self(Rc::new(LabelInner {
			name: name.into(),
		}))
	}

	/// The label's name.
	pub fn name(&self) -> &str {
		&self.0.name
	}

	pub(crate) fn key(&self) -> usize {
		Rc::as_ptr(&self.0) as usize
	}

	/// The label's address as an expression plus `other`.
	pub fn add(&self, other: impl Into<Expr>) -> Expr {
		Expr::from(self.clone()).add(other)
	}

	/// The label's address as an expression minus `other`.
	pub fn sub(&self, other: impl Into<Expr>) -> Expr {
		Expr::from(self.clone()).sub(other)
	}
}

impl Default for Label {
	fn default() -> Self {
		Self::new()
	}
}

impl PartialEq for Label {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}
}

impl Eq for Label {}

impl Hash for Label {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.key().hash(state);
	}
}

impl fmt::Display for Label {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.name())
	}
}

impl fmt::Debug for Label {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Label('{}')", self.name())
	}
}

/// Binary operators available in expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
	/// `a + b`
	Add,
	/// `a - b`
	Sub,
	/// `a * b`
	Mul,
	/// Flooring division.
	Div,
	/// Remainder of the flooring division; the sign follows the divisor.
	Rem,
}

impl BinOp {
	fn apply(self, a: i64, b: i64) -> AsmResult<i64> {
		let overflow = || AsmError::value(format!("expression overflow: {a} {self} {b}"));
		match self {
			Self::Add => a.checked_add(b).ok_or_else(overflow),
			Self::Sub => a.checked_sub(b).ok_or_else(overflow),
			Self::Mul => a.checked_mul(b).ok_or_else(overflow),
			Self::Div => {
				if b == 0 {
					return Err(AsmError::value(format!("division by zero: {a} / {b}")));
				}
				Ok(floor_div(a, b))
			}
			Self::Rem => {
				if b == 0 {
					return Err(AsmError::value(format!("division by zero: {a} % {b}")));
				}
				Ok(a - floor_div(a, b) * b)
			}
		}
	}
}

fn floor_div(a: i64, b: i64) -> i64 {
	let q = a / b;
	if a % b != 0 && (a < 0) != (b < 0) { q - 1 } else { q }
}

impl fmt::Display for BinOp {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let sym = match self {
			Self::Add => "+",
			Self::Sub => "-",
			Self::Mul => "*",
			Self::Div => "/",
			Self::Rem => "%",
		};
		write!(f, "{sym}")
	}
}

/// A build-time integer expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
	/// A literal value.
	Imm(i64),
	/// The address of the instruction a label marks.
	Label(Label),
	/// The address of an instruction.
	InstAddr(Inst),
	/// The address of a memory operand, taken as a value.
	MemAddr(Box<Mem>),
	/// The encoded size of an instruction under the layout.
	SizeOf(Inst),
	/// The PC-relative displacement a branch at `base` must carry to reach
	/// `target`: `target - (addr(base) + sizeof(base))`.
	Offset {
		/// The instruction the displacement is measured from.
		base: InstRef,
		/// The resolved destination.
		target: Box<Expr>,
	},
	/// A binary arithmetic node.
	Bin {
		/// Operator.
		op: BinOp,
		/// Left operand.
		lhs: Box<Expr>,
		/// Right operand.
		rhs: Box<Expr>,
	},
}

impl Expr {
	/// The size of an instruction under the final layout.
	pub fn size_of(inst: &Inst) -> Self {
		Self::SizeOf(inst.clone())
	}

	/// The PC-relative displacement from past the end of `base` to
	/// `target`.
	pub fn offset(base: &Inst, target: impl Into<Expr>) -> Self {
		Self::Offset {
			base: base.downgrade(),
			target: Box::new(target.into()),
		}
	}

	fn bin(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
		Self::Bin {
			op,
			lhs: Box::new(lhs),
			rhs: Box::new(rhs),
		}
	}

	/// `self + other`
	#[must_use]
	pub fn add(self, other: impl Into<Expr>) -> Self {
		Self::bin(BinOp::Add, self, other.into())
	}

	/// `self - other`
	#[must_use]
	pub fn sub(self, other: impl Into<Expr>) -> Self {
		Self::bin(BinOp::Sub, self, other.into())
	}

	/// `self * other`
	#[must_use]
	pub fn mul(self, other: impl Into<Expr>) -> Self {
		Self::bin(BinOp::Mul, self, other.into())
	}

	/// `self / other`, flooring.
	#[must_use]
	pub fn div(self, other: impl Into<Expr>) -> Self {
		Self::bin(BinOp::Div, self, other.into())
	}

	/// `self % other`, sign follows the divisor.
	#[must_use]
	pub fn rem(self, other: impl Into<Expr>) -> Self {
		Self::bin(BinOp::Rem, self, other.into())
	}

	/// Evaluate against a layout.
	pub fn eval_for(&self, lay: &Layout) -> AsmResult<i64> {
		match self {
			Self::Imm(v) => Ok(*v),
			Self::Label(label) => Ok(lay.addr_of_label(label)? as i64),
			Self::InstAddr(inst) => Ok(lay.addr_of(inst)? as i64),
			Self::MemAddr(mem) => Ok(mem.addr_for(lay)? as i64),
			Self::SizeOf(inst) => Ok(lay.size_of(inst)? as i64),
			Self::Offset {
				base,
				target,
			} => {
				let base = base.upgrade()?;
				let past_end = lay.addr_of(&base)? as i64 + lay.size_of(&base)? as i64;
				Ok(target.eval_for(lay)? - past_end)
			}
			Self::Bin {
				op,
				lhs,
				rhs,
			} => op.apply(lhs.eval_for(lay)?, rhs.eval_for(lay)?),
		}
	}

	/// Maximum encoded size, layout independent.
	pub fn max_size(&self) -> usize {
		MAX_VARINT_SIZE
	}

	pub(crate) fn encode_for(&self, lay: &Layout) -> AsmResult<Vec<u8>> {
		Imm::encode(self.eval_for(lay)?)
	}

	pub(crate) fn check_with(&self, lay: &Layout, guard: &mut CycleGuard) -> AsmResult<()> {
		match self {
			Self::Imm(_) | Self::Label(_) | Self::SizeOf(_) => Ok(()),
			Self::InstAddr(inst) => inst.check_with(lay, guard),
			Self::MemAddr(mem) => mem.check_with(lay, guard, 1),
			Self::Offset {
				base,
				target,
			} => {
				base.upgrade()?.check_with(lay, guard)?;
				target.check_with(lay, guard)
			}
			Self::Bin {
				lhs,
				rhs,
				..
			} => {
				lhs.check_with(lay, guard)?;
				rhs.check_with(lay, guard)
			}
		}
	}

	pub(crate) fn render_for(&self, lay: &Layout) -> AsmResult<String> {
		match self {
			Self::Offset {
				target,
				..
			} => Ok(format!("#{}:<{target}>", self.eval_for(lay)?)),
			_ => Ok(format!("#{}", self.eval_for(lay)?)),
		}
	}
}

impl fmt::Display for Expr {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Imm(v) => write!(f, "{v}"),
			Self::Label(label) => write!(f, "{label}"),
			Self::InstAddr(inst) => write!(f, "{inst}"),
			Self::MemAddr(mem) => write!(f, "{mem}"),
			Self::SizeOf(inst) => write!(f, "sizeof({inst})"),
			Self::Offset {
				base,
				target,
			} => match base.upgrade() {
				Ok(inst) => write!(f, "offset({inst}, <{target}>)"),
				Err(_) => write!(f, "offset(<dropped>, <{target}>)"),
			},
			Self::Bin {
				op,
				lhs,
				rhs,
			} => write!(f, "({lhs} {op} {rhs})"),
		}
	}
}

impl From<i64> for Expr {
	fn from(v: i64) -> Self {
		Self::Imm(v)
	}
}

impl From<i32> for Expr {
	fn from(v: i32) -> Self {
		Self::Imm(i64::from(v))
	}
}

impl From<u32> for Expr {
	fn from(v: u32) -> Self {
		Self::Imm(i64::from(v))
	}
}

impl From<Label> for Expr {
	fn from(label: Label) -> Self {
		Self::Label(label)
	}
}

impl From<&Label> for Expr {
	fn from(label: &Label) -> Self {
		Self::Label(label.clone())
	}
}

impl From<Inst> for Expr {
	fn from(inst: Inst) -> Self {
		Self::InstAddr(inst)
	}
}

impl From<&Inst> for Expr {
	fn from(inst: &Inst) -> Self {
		Self::InstAddr(inst.clone())
	}
}

impl From<Mem> for Expr {
	fn from(mem: Mem) -> Self {
		Self::MemAddr(Box::new(mem))
	}
}

impl From<&Mem> for Expr {
	fn from(mem: &Mem) -> Self {
		Self::MemAddr(Box::new(mem.clone()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_label_identity() {
		let a = Label::named("loop");
		let b = Label::named("loop");
		assert_ne!(a, b);
		assert_eq!(a, a.clone());
	}

	#[test]
	fn test_anonymous_names_are_unique() {
		let a = Label::new();
		let b = Label::new();
		assert!(a.name().starts_with("_L"));
		assert_ne!(a.name(), b.name());
	}

	#[test]
	fn test_floor_semantics() {
		assert_eq!(BinOp::Div.apply(7, 2).unwrap(), 3);
		assert_eq!(BinOp::Div.apply(-7, 2).unwrap(), -4);
		assert_eq!(BinOp::Rem.apply(-7, 2).unwrap(), 1);
		assert_eq!(BinOp::Rem.apply(7, -2).unwrap(), -1);
		assert!(BinOp::Div.apply(1, 0).is_err());
		assert!(BinOp::Rem.apply(1, 0).is_err());
	}

	#[test]
	fn test_structural_equality() {
		let lab = Label::new();
		let a = Expr::from(&lab).add(2);
		let b = Expr::from(&lab).add(2);
		assert_eq!(a, b);
		assert_ne!(a, Expr::from(&lab).sub(2));
		assert_ne!(a, Expr::from(&Label::new()).add(2));
	}
}
