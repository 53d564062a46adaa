//! Assignment sugar: right-hand values and comparisons.
//!
//! Memory operands expose a rich builder surface through [`Operand`]:
//! `sp.sub(8)` is the right-hand of an assignment, `sp.set(sp.sub(8))`
//! turns it into a `Sub` instruction, and `a.is_eq(b)` is a [`Comparison`]
//! that can become a test instruction or a conditional branch. Comparisons
//! also answer a plain boolean through [`Comparison::truthy`], computed by
//! structural operand equality.

use crate::instructions::opcodes::Opcode;
use crate::instructions::{Inst, ops};
use crate::operands::expr::{Expr, Label};
use crate::operands::{IMem, Imm, Mem, Source, Target};

/// Right-hand of a `t = op(a)` assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct UnaryRhs {
	op: Opcode,
	a: Source,
}

/// Right-hand of a `t = a op b` assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryRhs {
	op: Opcode,
	a: Source,
	b: Source,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum CmpKind {
	Eq,
	Ne,
	Lt,
	Le,
	Gt,
	Ge,
}

/// An `a op b` comparison value.
///
/// Not an instruction by itself: convert with [`Comparison::as_assign_to`]
/// or the branch constructors, or read it as a boolean over the operands'
/// structural equality.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
	kind: CmpKind,
	a: Source,
	b: Source,
	truthy: bool,
}

impl Comparison {
	/// Build a comparison; the `truthy` flag is derived from structural
	/// equality of the operands.
	pub fn new(kind: CmpKind, a: Source, b: Source) -> Self {
		let truthy = match kind {
			CmpKind::Eq => a == b,
			CmpKind::Ne => a != b,
			_ => false,
		};
		Self {
			kind,
			a,
			b,
			truthy,
		}
	}

	/// The comparison operator.
	pub fn kind(&self) -> CmpKind {
		self.kind
	}

	/// The comparison read as a boolean: structural equality for `Eq`/`Ne`,
	/// `false` for the ordering operators.
	pub fn truthy(&self) -> bool {
		self.truthy
	}

	/// The matching test instruction: `t = a op b`.
	pub fn as_assign_to(&self, t: impl Into<Target>) -> Inst {
		let (a, b) = (self.a.clone(), self.b.clone());
		match self.kind {
			CmpKind::Eq => ops::tst_eq(t, a, b),
			CmpKind::Ne => ops::tst_ne(t, a, b),
			CmpKind::Lt => ops::tst_lt(t, a, b),
			CmpKind::Le => ops::tst_le(t, a, b),
			CmpKind::Gt => ops::tst_gt(t, a, b),
			CmpKind::Ge => ops::tst_ge(t, a, b),
		}
	}

	/// A branch to `target` taken when the comparison holds.
	pub fn as_if_branch_to(&self, target: impl Into<Expr>) -> Inst {
		let (a, b) = (self.a.clone(), self.b.clone());
		match self.kind {
			CmpKind::Eq => ops::br_eq(a, b, target),
			CmpKind::Ne => ops::br_ne(a, b, target),
			CmpKind::Lt => ops::br_lt(a, b, target),
			CmpKind::Le => ops::br_le(a, b, target),
			CmpKind::Gt => ops::br_gt(a, b, target),
			CmpKind::Ge => ops::br_ge(a, b, target),
		}
	}

	/// A branch to `target` taken when the comparison does not hold.
	pub fn as_else_branch_to(&self, target: impl Into<Expr>) -> Inst {
		let (a, b) = (self.a.clone(), self.b.clone());
		match self.kind {
			CmpKind::Eq => ops::br_ne(a, b, target),
			CmpKind::Ne => ops::br_eq(a, b, target),
			CmpKind::Lt => ops::br_ge(a, b, target),
			CmpKind::Le => ops::br_gt(a, b, target),
			CmpKind::Gt => ops::br_le(a, b, target),
			CmpKind::Ge => ops::br_lt(a, b, target),
		}
	}
}

/// Anything acceptable on the right of [`Operand::set`].
#[derive(Debug, Clone)]
pub enum Rhs {
	/// A plain source: emits `Mov`.
	Plain(Source),
	/// A unary right-hand: emits its operation.
	Unary(UnaryRhs),
	/// A binary right-hand: emits its operation.
	Binary(BinaryRhs),
	/// A comparison: emits the matching test instruction.
	Cmp(Comparison),
}

impl From<UnaryRhs> for Rhs {
	fn from(rhs: UnaryRhs) -> Self {
		Self::Unary(rhs)
	}
}

impl From<BinaryRhs> for Rhs {
	fn from(rhs: BinaryRhs) -> Self {
		Self::Binary(rhs)
	}
}

impl From<Comparison> for Rhs {
	fn from(cmp: Comparison) -> Self {
		Self::Cmp(cmp)
	}
}

impl From<Mem> for Rhs {
	fn from(mem: Mem) -> Self {
		Self::Plain(mem.into())
	}
}

impl From<&Mem> for Rhs {
	fn from(mem: &Mem) -> Self {
		Self::Plain(mem.into())
	}
}

impl From<IMem> for Rhs {
	fn from(imem: IMem) -> Self {
		Self::Plain(imem.into())
	}
}

impl From<&IMem> for Rhs {
	fn from(imem: &IMem) -> Self {
		Self::Plain(imem.into())
	}
}

impl From<Imm> for Rhs {
	fn from(imm: Imm) -> Self {
		Self::Plain(imm.into())
	}
}

impl From<i32> for Rhs {
	fn from(v: i32) -> Self {
		Self::Plain(v.into())
	}
}

impl From<i64> for Rhs {
	fn from(v: i64) -> Self {
		Self::Plain(v.into())
	}
}

impl From<u32> for Rhs {
	fn from(v: u32) -> Self {
		Self::Plain(v.into())
	}
}

impl From<Expr> for Rhs {
	fn from(expr: Expr) -> Self {
		Self::Plain(expr.into())
	}
}

impl From<Label> for Rhs {
	fn from(label: Label) -> Self {
		Self::Plain(label.into())
	}
}

impl From<&Label> for Rhs {
	fn from(label: &Label) -> Self {
		Self::Plain(label.into())
	}
}

/// The rich builder surface shared by direct and indirect memory.
pub trait Operand: Clone + Into<Target> + Into<Source> {
	/// This operand as a source.
	fn as_source(&self) -> Source {
		self.clone().into()
	}

	/// This operand as a store target.
	fn as_target(&self) -> Target {
		self.clone().into()
	}

	/// Assign to this operand: `Mov` for a plain source, the matching
	/// operation for unary/binary right-hands, the matching test for a
	/// comparison.
	fn set(&self, rhs: impl Into<Rhs>) -> Inst {
		match rhs.into() {
			Rhs::Plain(src) => ops::mov(self.as_target(), src),
			Rhs::Unary(u) => Inst::from_op(u.op, vec![self.as_target()], vec![u.a]),
			Rhs::Binary(b) => Inst::from_op(b.op, vec![self.as_target()], vec![b.a, b.b]),
			Rhs::Cmp(cmp) => cmp.as_assign_to(self.as_target()),
		}
	}

	/// `self + other`
	fn add(&self, other: impl Into<Source>) -> BinaryRhs {
		BinaryRhs {
			op: Opcode::Add,
			a: self.as_source(),
			b: other.into(),
		}
	}

	/// `self - other`
	fn sub(&self, other: impl Into<Source>) -> BinaryRhs {
		BinaryRhs {
			op: Opcode::Sub,
			a: self.as_source(),
			b: other.into(),
		}
	}

	/// `self * other`
	fn mul(&self, other: impl Into<Source>) -> BinaryRhs {
		BinaryRhs {
			op: Opcode::Mul,
			a: self.as_source(),
			b: other.into(),
		}
	}

	/// `self / other`, truncating.
	fn div(&self, other: impl Into<Source>) -> BinaryRhs {
		BinaryRhs {
			op: Opcode::Div,
			a: self.as_source(),
			b: other.into(),
		}
	}

	/// `self % other`
	fn rem(&self, other: impl Into<Source>) -> BinaryRhs {
		BinaryRhs {
			op: Opcode::Rem,
			a: self.as_source(),
			b: other.into(),
		}
	}

	/// `self << other`
	fn lshift(&self, other: impl Into<Source>) -> BinaryRhs {
		BinaryRhs {
			op: Opcode::LShift,
			a: self.as_source(),
			b: other.into(),
		}
	}

	/// `self >> other`, arithmetic.
	fn rshift(&self, other: impl Into<Source>) -> BinaryRhs {
		BinaryRhs {
			op: Opcode::RShift,
			a: self.as_source(),
			b: other.into(),
		}
	}

	/// `self >> other`, logical.
	fn rshift_u(&self, other: impl Into<Source>) -> BinaryRhs {
		BinaryRhs {
			op: Opcode::RShiftU,
			a: self.as_source(),
			b: other.into(),
		}
	}

	/// `self & other`
	fn bit_and(&self, other: impl Into<Source>) -> BinaryRhs {
		BinaryRhs {
			op: Opcode::BitAnd,
			a: self.as_source(),
			b: other.into(),
		}
	}

	/// `self | other`
	fn bit_or(&self, other: impl Into<Source>) -> BinaryRhs {
		BinaryRhs {
			op: Opcode::BitOr,
			a: self.as_source(),
			b: other.into(),
		}
	}

	/// `self ^ other`
	fn bit_xor(&self, other: impl Into<Source>) -> BinaryRhs {
		BinaryRhs {
			op: Opcode::BitXor,
			a: self.as_source(),
			b: other.into(),
		}
	}

	/// `-self`
	fn neg(&self) -> UnaryRhs {
		UnaryRhs {
			op: Opcode::Neg,
			a: self.as_source(),
		}
	}

	/// `abs(self)`
	fn abs(&self) -> UnaryRhs {
		UnaryRhs {
			op: Opcode::Abs,
			a: self.as_source(),
		}
	}

	/// `~self`
	fn inv(&self) -> UnaryRhs {
		UnaryRhs {
			op: Opcode::Inv,
			a: self.as_source(),
		}
	}

	/// `self == other`
	fn is_eq(&self, other: impl Into<Source>) -> Comparison {
		Comparison::new(CmpKind::Eq, self.as_source(), other.into())
	}

	/// `self != other`
	fn is_ne(&self, other: impl Into<Source>) -> Comparison {
		Comparison::new(CmpKind::Ne, self.as_source(), other.into())
	}

	/// `self < other`
	fn is_lt(&self, other: impl Into<Source>) -> Comparison {
		Comparison::new(CmpKind::Lt, self.as_source(), other.into())
	}

	/// `self <= other`
	fn is_le(&self, other: impl Into<Source>) -> Comparison {
		Comparison::new(CmpKind::Le, self.as_source(), other.into())
	}

	/// `self > other`
	fn is_gt(&self, other: impl Into<Source>) -> Comparison {
		Comparison::new(CmpKind::Gt, self.as_source(), other.into())
	}

	/// `self >= other`
	fn is_ge(&self, other: impl Into<Source>) -> Comparison {
		Comparison::new(CmpKind::Ge, self.as_source(), other.into())
	}
}

impl Operand for Mem {}

impl Operand for IMem {}
