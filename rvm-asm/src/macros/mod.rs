//! Structured-code helpers built on top of plain code trees.
//!
//! Nothing here extends the instruction set: `when`, `case`, and
//! [`Subroutine`] only synthesize branches, labels, and stack traffic the
//! way hand-written code would, and [`pack`] sprinkles `NoPad` markers so
//! the oscillation breaker leaves a block contiguous.

use crate::error::{AsmError, AsmResult};
use crate::instructions::opcodes::Opcode;
use crate::instructions::rhs::{Comparison, Operand};
use crate::instructions::ops;
use crate::layout::{CodeItem, Directive};
use crate::operands::expr::Label;
use crate::operands::{IMem, Mem};
use crate::script::Code;

/// `if condition { then }`: branch past `then` when the condition fails.
pub fn when(condition: &Comparison, then: impl Into<Code>) -> Code {
	let end = Label::new();
	Code::Seq(vec![
		Code::Inst(condition.as_else_branch_to(&end)),
		then.into(),
		Code::Label(end),
	])
}

/// `if condition { then } else { otherwise }`.
pub fn when_else(
	condition: &Comparison,
	then: impl Into<Code>,
	otherwise: impl Into<Code>,
) -> Code {
	let else_label = Label::new();
	let end = Label::new();
	Code::Seq(vec![
		Code::Inst(condition.as_else_branch_to(&else_label)),
		then.into(),
		Code::Inst(ops::br(&end)),
		Code::Label(else_label),
		otherwise.into(),
		Code::Label(end),
	])
}

/// Switch-case dispatch: each case is a comparison, at most one case (or
/// the default) executes.
pub fn case(cases: Vec<(Comparison, Code)>, default: Option<Code>) -> Code {
	let end = Label::new();
	let blocks: Vec<(Comparison, Code, Label)> =
		cases.into_iter().map(|(cond, code)| (cond, code, Label::new())).collect();

	let mut res: Vec<Code> = Vec::new();
	for (cond, _, label) in &blocks {
		res.push(Code::Inst(cond.as_if_branch_to(label)));
	}
	if let Some(default) = default {
		res.push(default);
	}
	res.push(Code::Inst(ops::br(&end)));
	for (_, code, label) in blocks {
		res.push(Code::Label(label));
		res.push(code);
		res.push(Code::Inst(ops::br(&end)));
	}
	// The last case falls through to the end label; its branch is
	// redundant.
	if matches!(&res.last(), Some(Code::Inst(inst)) if inst.opcode() == Some(Opcode::Br)) {
		res.pop();
	}
	res.push(Code::Label(end));
	Code::Seq(res)
}

/// A callable subroutine: declared up front, defined once, called through
/// the link register.
///
/// A leaf routine returns through `lr` directly; a non-leaf pushes `lr`
/// with the saved registers and returns through the stack slot.
pub struct Subroutine {
	label: Label,
	body: Option<Code>,
	save_regs: Vec<u32>,
	is_leaf: bool,
}

impl Subroutine {
	/// Declare an anonymous subroutine.
	pub fn new() -> Self {
		Self {
			label: Label::new(),
			body: None,
			save_regs: Vec::new(),
			is_leaf: false,
		}
	}

	/// Declare a named subroutine.
	pub fn named(name: impl Into<String>) -> Self {
		Self {
			label: Label::named(name),
			body: None,
			save_regs: Vec::new(),
			is_leaf: false,
		}
	}

	/// The entry label.
	pub fn label(&self) -> &Label {
		&self.label
	}

	/// The subroutine's name.
	pub fn name(&self) -> &str {
		self.label.name()
	}

	/// Define the body. `save_regs` are preserved across the call;
	/// `is_leaf` routines skip the link-register spill and return through
	/// `lr`.
	///
	/// # Errors
	///
	/// Returns [`AsmError::DuplicateDef`] when the body is already
	/// defined.
	pub fn define(
		&mut self,
		body: impl Into<Code>,
		save_regs: &[u32],
		is_leaf: bool,
	) -> AsmResult<&mut Self> {
		if self.body.is_some() {
			return Err(AsmError::duplicate_def(format!("subroutine '{}' body", self.name())));
		}
		let mut regs = save_regs.to_vec();
		regs.sort_unstable();
		regs.dedup();
		self.save_regs = regs;
		self.is_leaf = is_leaf;
		self.body = Some(body.into());
		Ok(self)
	}

	/// The subroutine's code: entry label, prologue, body, epilogue,
	/// return jump. Place this once in the program.
	///
	/// # Errors
	///
	/// Returns [`AsmError::MissingDef`] when the body is not defined yet.
	pub fn code(&self) -> AsmResult<Code> {
		let body = self
			.body
			.clone()
			.ok_or_else(|| AsmError::missing_def(format!("subroutine '{}' body", self.name())))?;
		let lr = Mem::named("lr");
		let sp = Mem::named("sp");

		let saved: Vec<Mem> = self.save_regs.iter().map(|n| Mem::reg(*n)).collect();
		let (push, pop, ret) = if self.is_leaf {
			(saved.clone(), saved, ops::jmp(&lr))
		} else {
			let mut push = saved.clone();
			push.push(lr);
			(push, saved, ops::jmp(IMem::with_offset(sp.clone(), -4)))
		};

		let mut prologue: Vec<Code> = Vec::new();
		let mut epilogue: Vec<Code> = Vec::new();
		if !push.is_empty() {
			let nregs = push.len() as i64;
			prologue.push(Code::Inst(sp.set(sp.sub(nregs * 4))));
			for (i, reg) in push.iter().enumerate() {
				prologue
					.push(Code::Inst(IMem::with_offset(sp.clone(), (i as i64) * 4).set(reg)));
			}
			epilogue.push(Code::Inst(sp.set(sp.add(nregs * 4))));
			for (i, reg) in pop.iter().enumerate() {
				let below = -(nregs - i as i64) * 4;
				epilogue.push(Code::Inst(reg.set(IMem::with_offset(sp.clone(), below))));
			}
		}

		Ok(Code::Seq(vec![
			Code::Label(self.label.clone()),
			Code::Seq(prologue),
			body,
			Code::Seq(epilogue),
			Code::Inst(ret),
		]))
	}

	/// A call site: a linked branch to the entry label.
	pub fn call(&self) -> Code {
		Code::Inst(ops::br_lnk(Mem::named("lr"), &self.label))
	}
}

impl Default for Subroutine {
	fn default() -> Self {
		Self::new()
	}
}

/// Insert a `NoPad` marker before every instruction of `code`, keeping the
/// oscillation breaker from splitting the block apart.
pub fn pack(code: impl Into<Code>) -> Code {
	let mut out = Vec::new();
	for item in code.into().flatten() {
		match item {
			CodeItem::Inst(inst) => {
				out.push(Code::Directive(Directive::NoPad));
				out.push(Code::Inst(inst));
			}
			CodeItem::Label(label) => out.push(Code::Label(label)),
			CodeItem::Directive(directive) => out.push(Code::Directive(directive)),
		}
	}
	Code::Seq(out)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::code;
	use crate::script::Script;

	fn r(n: u32) -> Mem {
		Mem::reg(n)
	}

	#[test]
	fn test_when_shape() {
		let tree = when(&r(0).is_eq(1), code![r(1).set(2)]);
		let items = tree.flatten();
		// Else-branch, body, end label.
		assert_eq!(items.len(), 3);
		let CodeItem::Inst(branch) = &items[0] else {
			panic!("expected a branch first");
		};
		assert_eq!(branch.opcode(), Some(Opcode::BrNe));
		assert!(matches!(items[2], CodeItem::Label(_)));
	}

	#[test]
	fn test_when_else_builds() {
		let tree = when_else(&r(0).is_lt(10), code![r(1).set(1)], code![r(1).set(2)]);
		let script = Script::new(tree);
		assert!(script.bytes().is_ok());
	}

	#[test]
	fn test_case_drops_redundant_final_branch() {
		let tree = case(
			vec![
				(r(0).is_eq(1), code![r(1).set(10)]),
				(r(0).is_eq(2), code![r(1).set(20)]),
			],
			None,
		);
		let items = tree.flatten();
		let branches = items
			.iter()
			.filter(|item| {
				matches!(item, CodeItem::Inst(inst) if inst.opcode() == Some(Opcode::Br))
			})
			.count();
		// Dispatch fall-through plus first case exit; the final case's
		// exit is elided.
		assert_eq!(branches, 2);
		assert!(Script::new(tree).bytes().is_ok());
	}

	#[test]
	fn test_subroutine_define_once() {
		let mut sub = Subroutine::named("f");
		assert!(matches!(sub.code(), Err(AsmError::MissingDef { .. })));
		sub.define(code![r(1).set(10)], &[], false).unwrap();
		assert!(matches!(
			sub.define(code![r(1).set(11)], &[], false),
			Err(AsmError::DuplicateDef { .. })
		));
	}

	#[test]
	fn test_subroutine_program_builds() {
		let mut sub = Subroutine::named("f");
		sub.define(code![r(1).set(10)], &[4, 5], false).unwrap();
		let program = code![
			sub.call(),
			r(0).set(r(1).add(20)),
			ops::exit(0),
			sub.code().unwrap(),
		];
		let script = Script::new(program);
		assert!(script.bytes().is_ok());
		// The entry label resolves.
		assert!(script.layout().unwrap().addr_of_name("f").is_ok());
	}

	#[test]
	fn test_leaf_subroutine_returns_through_lr() {
		let mut sub = Subroutine::new();
		sub.define(code![r(1).set(10)], &[], true).unwrap();
		let items = sub.code().unwrap().flatten();
		let CodeItem::Inst(last) = items.last().unwrap() else {
			panic!("expected a return jump");
		};
		assert_eq!(last.opcode(), Some(Opcode::Jmp));
		// No stack traffic: label, body, jump.
		assert_eq!(items.len(), 3);
	}

	#[test]
	fn test_pack_inserts_nopad_markers() {
		let packed = pack(code![r(0).set(12), Label::new(), r(0).set(14)]);
		let items = packed.flatten();
		let kinds: Vec<&str> = items
			.iter()
			.map(|item| match item {
				CodeItem::Inst(_) => "inst",
				CodeItem::Label(_) => "label",
				CodeItem::Directive(Directive::NoPad) => "nopad",
				CodeItem::Directive(_) => "directive",
			})
			.collect();
		assert_eq!(kinds, vec!["nopad", "inst", "label", "nopad", "inst"]);
	}
}
