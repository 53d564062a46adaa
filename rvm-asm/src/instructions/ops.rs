//! Constructor functions for the full instruction set.
//!
//! One function per opcode, plus the swapped-operand conveniences the
//! opcode table has no numbers for: `a < b` is `b > a`, so `tst_lt` builds
//! a `TstGt` with its operands exchanged, and likewise for the branch and
//! conditional-move families.
//!
//! Branches take a destination, never a raw displacement: the PC-relative
//! offset is computed by the layout engine from the branch's own final
//! position.

use crate::instructions::Inst;
use crate::instructions::opcodes::Opcode;
use crate::operands::expr::Expr;
use crate::operands::{Source, Target};

fn ta(opcode: Opcode, t: impl Into<Target>, a: impl Into<Source>) -> Inst {
	Inst::from_op(opcode, vec![t.into()], vec![a.into()])
}

fn tab(opcode: Opcode, t: impl Into<Target>, a: impl Into<Source>, b: impl Into<Source>) -> Inst {
	Inst::from_op(opcode, vec![t.into()], vec![a.into(), b.into()])
}

fn tvarsrc(opcode: Opcode, t: impl Into<Target>, srcs: impl IntoIterator<Item = Source>) -> Inst {
	Inst::from_op(opcode, vec![t.into()], srcs.into_iter().collect())
}

fn branch_if(opcode: Opcode, a: Source, b: Source, target: Expr) -> Inst {
	Inst::from_op_cyclic(opcode, move |me| {
		(vec![], vec![a, b, Source::Expr(Expr::Offset {
			base: me,
			target: Box::new(target),
		})])
	})
}

fn move_if(
	opcode: Opcode,
	t: impl Into<Target>,
	a: impl Into<Source>,
	b: impl Into<Source>,
	x: impl Into<Source>,
	y: impl Into<Source>,
) -> Inst {
	Inst::from_op(opcode, vec![t.into()], vec![a.into(), b.into(), x.into(), y.into()])
}

/// No operation. One byte; the layout engine pads alignment gaps with it.
pub fn nop() -> Inst {
	Inst::from_op(Opcode::Nop, vec![], vec![])
}

/// `t = a + b`
pub fn add(t: impl Into<Target>, a: impl Into<Source>, b: impl Into<Source>) -> Inst {
	tab(Opcode::Add, t, a, b)
}

/// `t = a - b`
pub fn sub(t: impl Into<Target>, a: impl Into<Source>, b: impl Into<Source>) -> Inst {
	tab(Opcode::Sub, t, a, b)
}

/// `t = a * b`
pub fn mul(t: impl Into<Target>, a: impl Into<Source>, b: impl Into<Source>) -> Inst {
	tab(Opcode::Mul, t, a, b)
}

/// `t = a / b`, truncating.
pub fn div(t: impl Into<Target>, a: impl Into<Source>, b: impl Into<Source>) -> Inst {
	tab(Opcode::Div, t, a, b)
}

/// `t = a / b`, unsigned, truncating.
pub fn div_u(t: impl Into<Target>, a: impl Into<Source>, b: impl Into<Source>) -> Inst {
	tab(Opcode::DivU, t, a, b)
}

/// `t = a % b`, remainder of the truncating division.
pub fn rem(t: impl Into<Target>, a: impl Into<Source>, b: impl Into<Source>) -> Inst {
	tab(Opcode::Rem, t, a, b)
}

/// `t = a % b`, unsigned.
pub fn rem_u(t: impl Into<Target>, a: impl Into<Source>, b: impl Into<Source>) -> Inst {
	tab(Opcode::RemU, t, a, b)
}

/// `t = s[0] && ... && s[n-1]`: the last source if all are truthy, else 0.
pub fn and(t: impl Into<Target>, srcs: impl IntoIterator<Item = Source>) -> Inst {
	tvarsrc(Opcode::And, t, srcs)
}

/// `t = s[0] || ... || s[n-1]`: the first truthy source, else 0.
pub fn or(t: impl Into<Target>, srcs: impl IntoIterator<Item = Source>) -> Inst {
	tvarsrc(Opcode::Or, t, srcs)
}

/// `t = a & b`
pub fn bit_and(t: impl Into<Target>, a: impl Into<Source>, b: impl Into<Source>) -> Inst {
	tab(Opcode::BitAnd, t, a, b)
}

/// `t = a | b`
pub fn bit_or(t: impl Into<Target>, a: impl Into<Source>, b: impl Into<Source>) -> Inst {
	tab(Opcode::BitOr, t, a, b)
}

/// `t = a ^ b`
pub fn bit_xor(t: impl Into<Target>, a: impl Into<Source>, b: impl Into<Source>) -> Inst {
	tab(Opcode::BitXor, t, a, b)
}

/// `t = ~a`
pub fn inv(t: impl Into<Target>, a: impl Into<Source>) -> Inst {
	ta(Opcode::Inv, t, a)
}

/// `t = a << b`, b limited to 32.
pub fn lshift(t: impl Into<Target>, a: impl Into<Source>, b: impl Into<Source>) -> Inst {
	tab(Opcode::LShift, t, a, b)
}

/// `t = a >> b`, arithmetic, b limited to 31.
pub fn rshift(t: impl Into<Target>, a: impl Into<Source>, b: impl Into<Source>) -> Inst {
	tab(Opcode::RShift, t, a, b)
}

/// `t = a >> b`, logical, b limited to 32.
pub fn rshift_u(t: impl Into<Target>, a: impl Into<Source>, b: impl Into<Source>) -> Inst {
	tab(Opcode::RShiftU, t, a, b)
}

/// `t = a == b`
pub fn tst_eq(t: impl Into<Target>, a: impl Into<Source>, b: impl Into<Source>) -> Inst {
	tab(Opcode::TstEq, t, a, b)
}

/// `t = a != b`
pub fn tst_ne(t: impl Into<Target>, a: impl Into<Source>, b: impl Into<Source>) -> Inst {
	tab(Opcode::TstNe, t, a, b)
}

/// `t = a > b`
pub fn tst_gt(t: impl Into<Target>, a: impl Into<Source>, b: impl Into<Source>) -> Inst {
	tab(Opcode::TstGt, t, a, b)
}

/// `t = a >= b`
pub fn tst_ge(t: impl Into<Target>, a: impl Into<Source>, b: impl Into<Source>) -> Inst {
	tab(Opcode::TstGe, t, a, b)
}

/// `t = a > b`, unsigned.
pub fn tst_gt_u(t: impl Into<Target>, a: impl Into<Source>, b: impl Into<Source>) -> Inst {
	tab(Opcode::TstGtU, t, a, b)
}

/// `t = a >= b`, unsigned.
pub fn tst_ge_u(t: impl Into<Target>, a: impl Into<Source>, b: impl Into<Source>) -> Inst {
	tab(Opcode::TstGeU, t, a, b)
}

/// `t = a < b`
pub fn tst_lt(t: impl Into<Target>, a: impl Into<Source>, b: impl Into<Source>) -> Inst {
	tab(Opcode::TstGt, t, b, a)
}

/// `t = a <= b`
pub fn tst_le(t: impl Into<Target>, a: impl Into<Source>, b: impl Into<Source>) -> Inst {
	tab(Opcode::TstGe, t, b, a)
}

/// `t = a < b`, unsigned.
pub fn tst_lt_u(t: impl Into<Target>, a: impl Into<Source>, b: impl Into<Source>) -> Inst {
	tab(Opcode::TstGtU, t, b, a)
}

/// `t = a <= b`, unsigned.
pub fn tst_le_u(t: impl Into<Target>, a: impl Into<Source>, b: impl Into<Source>) -> Inst {
	tab(Opcode::TstGeU, t, b, a)
}

/// `pc = addr`
pub fn jmp(addr: impl Into<Source>) -> Inst {
	Inst::from_op(Opcode::Jmp, vec![], vec![addr.into()])
}

/// `lr = pc, pc = addr` — an absolute call. The link target receives the
/// address immediately after this instruction.
pub fn jmp_lnk(lr: impl Into<Target>, addr: impl Into<Source>) -> Inst {
	Inst::from_op(Opcode::JmpLnk, vec![lr.into()], vec![addr.into()])
}

/// `pc += offset` — a relative branch to `target`.
pub fn br(target: impl Into<Expr>) -> Inst {
	let target = target.into();
	Inst::from_op_cyclic(Opcode::Br, move |me| {
		(vec![], vec![Source::Expr(Expr::Offset {
			base: me,
			target: Box::new(target),
		})])
	})
}

/// `lr = pc, pc += offset` — a relative call.
pub fn br_lnk(lr: impl Into<Target>, target: impl Into<Expr>) -> Inst {
	let target = target.into();
	Inst::from_op_cyclic(Opcode::BrLnk, move |me| {
		(vec![lr.into()], vec![Source::Expr(Expr::Offset {
			base: me,
			target: Box::new(target),
		})])
	})
}

/// `if a == b then pc += offset`
pub fn br_eq(a: impl Into<Source>, b: impl Into<Source>, target: impl Into<Expr>) -> Inst {
	branch_if(Opcode::BrEq, a.into(), b.into(), target.into())
}

/// `if a != b then pc += offset`
pub fn br_ne(a: impl Into<Source>, b: impl Into<Source>, target: impl Into<Expr>) -> Inst {
	branch_if(Opcode::BrNe, a.into(), b.into(), target.into())
}

/// `if a > b then pc += offset`
pub fn br_gt(a: impl Into<Source>, b: impl Into<Source>, target: impl Into<Expr>) -> Inst {
	branch_if(Opcode::BrGt, a.into(), b.into(), target.into())
}

/// `if a >= b then pc += offset`
pub fn br_ge(a: impl Into<Source>, b: impl Into<Source>, target: impl Into<Expr>) -> Inst {
	branch_if(Opcode::BrGe, a.into(), b.into(), target.into())
}

/// `if a > b then pc += offset`, unsigned.
pub fn br_gt_u(a: impl Into<Source>, b: impl Into<Source>, target: impl Into<Expr>) -> Inst {
	branch_if(Opcode::BrGtU, a.into(), b.into(), target.into())
}

/// `if a >= b then pc += offset`, unsigned.
pub fn br_ge_u(a: impl Into<Source>, b: impl Into<Source>, target: impl Into<Expr>) -> Inst {
	branch_if(Opcode::BrGeU, a.into(), b.into(), target.into())
}

/// `if a < b then pc += offset`
pub fn br_lt(a: impl Into<Source>, b: impl Into<Source>, target: impl Into<Expr>) -> Inst {
	br_gt(b, a, target)
}

/// `if a <= b then pc += offset`
pub fn br_le(a: impl Into<Source>, b: impl Into<Source>, target: impl Into<Expr>) -> Inst {
	br_ge(b, a, target)
}

/// `if a < b then pc += offset`, unsigned.
pub fn br_lt_u(a: impl Into<Source>, b: impl Into<Source>, target: impl Into<Expr>) -> Inst {
	br_gt_u(b, a, target)
}

/// `if a <= b then pc += offset`, unsigned.
pub fn br_le_u(a: impl Into<Source>, b: impl Into<Source>, target: impl Into<Expr>) -> Inst {
	br_ge_u(b, a, target)
}

/// `t = a == b ? x : y`
pub fn mov_eq(
	t: impl Into<Target>,
	a: impl Into<Source>,
	b: impl Into<Source>,
	x: impl Into<Source>,
	y: impl Into<Source>,
) -> Inst {
	move_if(Opcode::MovEq, t, a, b, x, y)
}

/// `t = a != b ? x : y`
pub fn mov_ne(
	t: impl Into<Target>,
	a: impl Into<Source>,
	b: impl Into<Source>,
	x: impl Into<Source>,
	y: impl Into<Source>,
) -> Inst {
	move_if(Opcode::MovEq, t, a, b, y, x)
}

/// `t = a > b ? x : y`
pub fn mov_gt(
	t: impl Into<Target>,
	a: impl Into<Source>,
	b: impl Into<Source>,
	x: impl Into<Source>,
	y: impl Into<Source>,
) -> Inst {
	move_if(Opcode::MovGt, t, a, b, x, y)
}

/// `t = a >= b ? x : y`
pub fn mov_ge(
	t: impl Into<Target>,
	a: impl Into<Source>,
	b: impl Into<Source>,
	x: impl Into<Source>,
	y: impl Into<Source>,
) -> Inst {
	move_if(Opcode::MovGe, t, a, b, x, y)
}

/// `t = a > b ? x : y`, unsigned.
pub fn mov_gt_u(
	t: impl Into<Target>,
	a: impl Into<Source>,
	b: impl Into<Source>,
	x: impl Into<Source>,
	y: impl Into<Source>,
) -> Inst {
	move_if(Opcode::MovGtU, t, a, b, x, y)
}

/// `t = a >= b ? x : y`, unsigned.
pub fn mov_ge_u(
	t: impl Into<Target>,
	a: impl Into<Source>,
	b: impl Into<Source>,
	x: impl Into<Source>,
	y: impl Into<Source>,
) -> Inst {
	move_if(Opcode::MovGeU, t, a, b, x, y)
}

/// `t = a < b ? x : y`
pub fn mov_lt(
	t: impl Into<Target>,
	a: impl Into<Source>,
	b: impl Into<Source>,
	x: impl Into<Source>,
	y: impl Into<Source>,
) -> Inst {
	move_if(Opcode::MovGt, t, b, a, x, y)
}

/// `t = a <= b ? x : y`
pub fn mov_le(
	t: impl Into<Target>,
	a: impl Into<Source>,
	b: impl Into<Source>,
	x: impl Into<Source>,
	y: impl Into<Source>,
) -> Inst {
	move_if(Opcode::MovGe, t, b, a, x, y)
}

/// `t = a < b ? x : y`, unsigned.
pub fn mov_lt_u(
	t: impl Into<Target>,
	a: impl Into<Source>,
	b: impl Into<Source>,
	x: impl Into<Source>,
	y: impl Into<Source>,
) -> Inst {
	move_if(Opcode::MovGtU, t, b, a, x, y)
}

/// `t = a <= b ? x : y`, unsigned.
pub fn mov_le_u(
	t: impl Into<Target>,
	a: impl Into<Source>,
	b: impl Into<Source>,
	x: impl Into<Source>,
	y: impl Into<Source>,
) -> Inst {
	move_if(Opcode::MovGeU, t, b, a, x, y)
}

/// `t = sign_extend(a[7..0])` — load byte.
pub fn ld_b(t: impl Into<Target>, a: impl Into<Source>) -> Inst {
	ta(Opcode::LdB, t, a)
}

/// `t = sign_extend(a[15..0])` — load halfword.
pub fn ld_h(t: impl Into<Target>, a: impl Into<Source>) -> Inst {
	ta(Opcode::LdH, t, a)
}

/// `t = zero_extend(a[7..0])` — load byte, unsigned.
pub fn ld_bu(t: impl Into<Target>, a: impl Into<Source>) -> Inst {
	ta(Opcode::LdBU, t, a)
}

/// `t = zero_extend(a[15..0])` — load halfword, unsigned.
pub fn ld_hu(t: impl Into<Target>, a: impl Into<Source>) -> Inst {
	ta(Opcode::LdHU, t, a)
}

/// `t[7..0] = a[7..0]` — store byte; the other target bits are unchanged.
pub fn st_b(t: impl Into<Target>, a: impl Into<Source>) -> Inst {
	ta(Opcode::StB, t, a)
}

/// `t[15..0] = a[15..0]` — store halfword; the other target bits are
/// unchanged.
pub fn st_h(t: impl Into<Target>, a: impl Into<Source>) -> Inst {
	ta(Opcode::StH, t, a)
}

/// `t[0] ... t[m-1] = hostfuncs[func](s[0], ..., s[n-1])`
///
/// The generic host call with arbitrary result and argument vectors. Not
/// meant for direct use in user code; wrap it in a typed helper per host
/// function.
pub fn sys(
	func: impl Into<Source>,
	tgts: impl IntoIterator<Item = Target>,
	srcs: impl IntoIterator<Item = Source>,
) -> Inst {
	let mut all_srcs = vec![func.into()];
	all_srcs.extend(srcs);
	Inst::from_op(Opcode::Sys, tgts.into_iter().collect(), all_srcs)
}

/// Terminate the program with return code `rc`.
pub fn exit(rc: impl Into<Source>) -> Inst {
	Inst::from_op(Opcode::Exit, vec![], vec![rc.into()])
}

// The fixed-arity host calls are redundant with `sys` but shorter on the
// wire: no count varints.

/// `hostfuncs[func]()`
pub fn sys00(func: impl Into<Source>) -> Inst {
	Inst::from_op(Opcode::Sys00, vec![], vec![func.into()])
}

/// `hostfuncs[func](a)`
pub fn sys01(func: impl Into<Source>, a: impl Into<Source>) -> Inst {
	Inst::from_op(Opcode::Sys01, vec![], vec![func.into(), a.into()])
}

/// `hostfuncs[func](a, b)`
pub fn sys02(func: impl Into<Source>, a: impl Into<Source>, b: impl Into<Source>) -> Inst {
	Inst::from_op(Opcode::Sys02, vec![], vec![func.into(), a.into(), b.into()])
}

/// `hostfuncs[func](a, b, c)`
pub fn sys03(
	func: impl Into<Source>,
	a: impl Into<Source>,
	b: impl Into<Source>,
	c: impl Into<Source>,
) -> Inst {
	Inst::from_op(Opcode::Sys03, vec![], vec![func.into(), a.into(), b.into(), c.into()])
}

/// `hostfuncs[func](a, b, c, d)`
pub fn sys04(
	func: impl Into<Source>,
	a: impl Into<Source>,
	b: impl Into<Source>,
	c: impl Into<Source>,
	d: impl Into<Source>,
) -> Inst {
	Inst::from_op(Opcode::Sys04, vec![], vec![func.into(), a.into(), b.into(), c.into(), d.into()])
}

/// `t = hostfuncs[func]()`
pub fn sys10(func: impl Into<Source>, t: impl Into<Target>) -> Inst {
	Inst::from_op(Opcode::Sys10, vec![t.into()], vec![func.into()])
}

/// `t = hostfuncs[func](a)`
pub fn sys11(func: impl Into<Source>, t: impl Into<Target>, a: impl Into<Source>) -> Inst {
	Inst::from_op(Opcode::Sys11, vec![t.into()], vec![func.into(), a.into()])
}

/// `t = hostfuncs[func](a, b)`
pub fn sys12(
	func: impl Into<Source>,
	t: impl Into<Target>,
	a: impl Into<Source>,
	b: impl Into<Source>,
) -> Inst {
	Inst::from_op(Opcode::Sys12, vec![t.into()], vec![func.into(), a.into(), b.into()])
}

/// `t = hostfuncs[func](a, b, c)`
pub fn sys13(
	func: impl Into<Source>,
	t: impl Into<Target>,
	a: impl Into<Source>,
	b: impl Into<Source>,
	c: impl Into<Source>,
) -> Inst {
	Inst::from_op(Opcode::Sys13, vec![t.into()], vec![func.into(), a.into(), b.into(), c.into()])
}

/// `t = hostfuncs[func](a, b, c, d)`
pub fn sys14(
	func: impl Into<Source>,
	t: impl Into<Target>,
	a: impl Into<Source>,
	b: impl Into<Source>,
	c: impl Into<Source>,
	d: impl Into<Source>,
) -> Inst {
	Inst::from_op(Opcode::Sys14, vec![t.into()], vec![
		func.into(),
		a.into(),
		b.into(),
		c.into(),
		d.into(),
	])
}

/// `t, u = hostfuncs[func]()`
pub fn sys20(func: impl Into<Source>, t: impl Into<Target>, u: impl Into<Target>) -> Inst {
	Inst::from_op(Opcode::Sys20, vec![t.into(), u.into()], vec![func.into()])
}

/// `t, u = hostfuncs[func](a)`
pub fn sys21(
	func: impl Into<Source>,
	t: impl Into<Target>,
	u: impl Into<Target>,
	a: impl Into<Source>,
) -> Inst {
	Inst::from_op(Opcode::Sys21, vec![t.into(), u.into()], vec![func.into(), a.into()])
}

/// `t, u = hostfuncs[func](a, b)`
pub fn sys22(
	func: impl Into<Source>,
	t: impl Into<Target>,
	u: impl Into<Target>,
	a: impl Into<Source>,
	b: impl Into<Source>,
) -> Inst {
	Inst::from_op(Opcode::Sys22, vec![t.into(), u.into()], vec![func.into(), a.into(), b.into()])
}

/// `t, u = hostfuncs[func](a, b, c)`
pub fn sys23(
	func: impl Into<Source>,
	t: impl Into<Target>,
	u: impl Into<Target>,
	a: impl Into<Source>,
	b: impl Into<Source>,
	c: impl Into<Source>,
) -> Inst {
	Inst::from_op(Opcode::Sys23, vec![t.into(), u.into()], vec![
		func.into(),
		a.into(),
		b.into(),
		c.into(),
	])
}

/// `t, u = hostfuncs[func](a, b, c, d)`
pub fn sys24(
	func: impl Into<Source>,
	t: impl Into<Target>,
	u: impl Into<Target>,
	a: impl Into<Source>,
	b: impl Into<Source>,
	c: impl Into<Source>,
	d: impl Into<Source>,
) -> Inst {
	Inst::from_op(Opcode::Sys24, vec![t.into(), u.into()], vec![
		func.into(),
		a.into(),
		b.into(),
		c.into(),
		d.into(),
	])
}

/// `t = a`
pub fn mov(t: impl Into<Target>, a: impl Into<Source>) -> Inst {
	ta(Opcode::Mov, t, a)
}

/// `t = -a`
pub fn neg(t: impl Into<Target>, a: impl Into<Source>) -> Inst {
	ta(Opcode::Neg, t, a)
}

/// `t = abs(a)`
pub fn abs(t: impl Into<Target>, a: impl Into<Source>) -> Inst {
	ta(Opcode::Abs, t, a)
}

/// `t = a && b`
pub fn and2(t: impl Into<Target>, a: impl Into<Source>, b: impl Into<Source>) -> Inst {
	tab(Opcode::And2, t, a, b)
}

/// `t = a || b`
pub fn or2(t: impl Into<Target>, a: impl Into<Source>, b: impl Into<Source>) -> Inst {
	tab(Opcode::Or2, t, a, b)
}

/// `t = max(s[0], ..., s[n-1])`
pub fn max(t: impl Into<Target>, srcs: impl IntoIterator<Item = Source>) -> Inst {
	tvarsrc(Opcode::Max, t, srcs)
}

/// `t = min(s[0], ..., s[n-1])`
pub fn min(t: impl Into<Target>, srcs: impl IntoIterator<Item = Source>) -> Inst {
	tvarsrc(Opcode::Min, t, srcs)
}

/// `t = !a`
pub fn not(t: impl Into<Target>, a: impl Into<Source>) -> Inst {
	ta(Opcode::Not, t, a)
}

/// `t = !!a`
pub fn to_bool(t: impl Into<Target>, a: impl Into<Source>) -> Inst {
	ta(Opcode::Bool, t, a)
}

/// `th:tl = a * b`, 64-bit result.
pub fn long_mul(
	tl: impl Into<Target>,
	th: impl Into<Target>,
	a: impl Into<Source>,
	b: impl Into<Source>,
) -> Inst {
	Inst::from_op(Opcode::LongMul, vec![tl.into(), th.into()], vec![a.into(), b.into()])
}

/// `th:tl = a * b`, unsigned, 64-bit result.
pub fn long_mul_u(
	tl: impl Into<Target>,
	th: impl Into<Target>,
	a: impl Into<Source>,
	b: impl Into<Source>,
) -> Inst {
	Inst::from_op(Opcode::LongMulU, vec![tl.into(), th.into()], vec![a.into(), b.into()])
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::operands::Mem;

	#[test]
	fn test_swapped_comparisons_reuse_opcodes() {
		let lt = tst_lt(Mem::reg(0), Mem::reg(1), Mem::reg(2));
		assert_eq!(lt.opcode(), Some(Opcode::TstGt));
		// Operands are exchanged, r2 before r1.
		assert_eq!(lt.to_string(), "TstGt(R[0], R[2], R[1])");

		let le = br_le_u(Mem::reg(1), Mem::reg(2), crate::operands::expr::Label::new());
		assert_eq!(le.opcode(), Some(Opcode::BrGeU));
	}

	#[test]
	fn test_mov_ne_swaps_arms() {
		let m = mov_ne(Mem::reg(0), 1, 2, 10, 20);
		assert_eq!(m.opcode(), Some(Opcode::MovEq));
		assert_eq!(m.to_string(), "MovEq(R[0], 1, 2, 20, 10)");
	}

	#[test]
	fn test_sys_prepends_func() {
		let s = sys(42, vec![Target::from(Mem::reg(0))], vec![Source::from(7)]);
		assert_eq!(s.to_string(), "Sys(R[0], 42, 7)");
	}
}
