//! Layout state: the solved addresses and sizes of a program.
//!
//! A [`Layout`] is the outcome of one build: the final instruction sequence
//! (including injected padding), each instruction's address, size, and
//! alignment requirement, and the label bindings. Operands resolve their
//! addresses and expressions evaluate against it; once returned to the
//! caller it is never mutated again.

pub(crate) mod builder;

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::env::Env;
use crate::error::{AsmError, AsmResult};
use crate::guard::CycleGuard;
use crate::instructions::Inst;
use crate::operands::expr::Label;

/// A zero-size marker attached to the next instruction in the sequence.
///
/// When several directives of the same kind queue up before one
/// instruction, the most recent wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
	/// Force the next instruction's address to `addr % n == 0`. `n` must
	/// be at least 1; the gap is filled with one-byte no-ops.
	Align(u64),
	/// Mark the next instruction as ineligible for alignment injection by
	/// the oscillation breaker.
	NoPad,
}

/// One element of a flattened code sequence.
#[derive(Debug, Clone)]
pub enum CodeItem {
	/// An instruction.
	Inst(Inst),
	/// A label, bound to the next instruction.
	Label(Label),
	/// A directive, attached to the next instruction.
	Directive(Directive),
}

/// A complete assignment of addresses and sizes to a program.
#[derive(Clone)]
pub struct Layout {
	pub(crate) env: Rc<Env>,
	pub(crate) insts: Vec<Inst>,
	pub(crate) labels_by_inst: IndexMap<Label, Inst>,
	pub(crate) addrs: HashMap<Inst, u64>,
	pub(crate) sizes: HashMap<Inst, usize>,
	pub(crate) aligns: HashMap<Inst, u64>,
	pub(crate) nopads: HashSet<Inst>,
}

impl Layout {
	pub(crate) fn new(env: Rc<Env>) -> Self {
		Self {
			env,
			insts: Vec::new(),
			labels_by_inst: IndexMap::new(),
			addrs: HashMap::new(),
			sizes: HashMap::new(),
			aligns: HashMap::new(),
			nopads: HashSet::new(),
		}
	}

	/// The environment this layout was built for.
	pub fn env(&self) -> &Env {
		&self.env
	}

	/// The final instruction sequence, padding no-ops included.
	pub fn insts(&self) -> &[Inst] {
		&self.insts
	}

	/// The address of an instruction.
	///
	/// # Errors
	///
	/// Returns [`AsmError::MissingDef`] for an instruction not in this
	/// layout.
	pub fn addr_of(&self, inst: &Inst) -> AsmResult<u64> {
		self.addrs
			.get(inst)
			.copied()
			.ok_or_else(|| AsmError::missing_def(format!("no instruction {inst}")))
	}

	/// The address of the instruction a label marks.
	pub fn addr_of_label(&self, label: &Label) -> AsmResult<u64> {
		let inst = self
			.labels_by_inst
			.get(label)
			.ok_or_else(|| AsmError::missing_def(format!("no label '{label}'")))?;
		self.addr_of(inst)
	}

	/// The address of a label looked up by name.
	pub fn addr_of_name(&self, name: &str) -> AsmResult<u64> {
		let label = self
			.labels_by_inst
			.keys()
			.find(|label| label.name() == name)
			.ok_or_else(|| AsmError::missing_def(format!("no label '{name}'")))?;
		self.addr_of_label(&label.clone())
	}

	/// The encoded size of an instruction under this layout.
	///
	/// # Errors
	///
	/// Returns [`AsmError::MissingDef`] for an instruction not in this
	/// layout.
	pub fn size_of(&self, inst: &Inst) -> AsmResult<usize> {
		self.sizes
			.get(inst)
			.copied()
			.ok_or_else(|| AsmError::missing_def(format!("no instruction {inst}")))
	}

	/// Resolve a named register through the environment.
	pub(crate) fn named_register(&self, name: &str) -> AsmResult<u32> {
		self.env
			.named_registers
			.get(name)
			.copied()
			.ok_or_else(|| AsmError::missing_def(format!("no named register '{name}'")))
	}

	/// Whether an address lies within the code actually laid out.
	pub fn is_code(&self, addr: u64) -> bool {
		let (lo, hi) = self.code_range();
		lo <= addr && addr < hi
	}

	/// Whether an address lies within the RAM region.
	pub fn is_ram(&self, addr: u64) -> bool {
		let (lo, hi) = self.env.ram_region;
		lo <= addr && addr < hi
	}

	pub(crate) fn code_holds(&self, addr: u64, width: u64) -> bool {
		let (lo, hi) = self.code_range();
		lo <= addr && addr.checked_add(width).is_some_and(|end| end <= hi)
	}

	pub(crate) fn ram_holds(&self, addr: u64, width: u64) -> bool {
		let (lo, hi) = self.env.ram_region;
		lo <= addr && addr.checked_add(width).is_some_and(|end| end <= hi)
	}

	/// The laid-out code `[start, end)`.
	pub fn code_range(&self) -> (u64, u64) {
		let start = self.env.code_region.0;
		let (Some(first), Some(last)) = (self.insts.first(), self.insts.last()) else {
			return (start, start);
		};
		let lo = self.addrs.get(first).copied().unwrap_or(start);
		let hi = self.addrs.get(last).copied().unwrap_or(start)
			+ self.sizes.get(last).copied().unwrap_or(0) as u64;
		(lo, hi)
	}

	/// The laid-out code size in bytes.
	pub fn code_size(&self) -> u64 {
		let (lo, hi) = self.code_range();
		hi - lo
	}

	/// Label bindings in insertion order.
	pub fn labels(&self) -> impl Iterator<Item = (&Label, &Inst)> {
		self.labels_by_inst.iter()
	}

	/// Label name to address, in insertion order. Useful for marking entry
	/// points and handing them to a loader.
	pub fn label_addrs(&self) -> AsmResult<IndexMap<String, u64>> {
		self.labels_by_inst
			.iter()
			.map(|(label, inst)| Ok((label.name().to_string(), self.addr_of(inst)?)))
			.collect()
	}

	/// Every label marking `inst`, in insertion order.
	pub fn labels_for(&self, inst: &Inst) -> Vec<Label> {
		self.labels_by_inst
			.iter()
			.filter(|(_, bound)| *bound == inst)
			.map(|(label, _)| label.clone())
			.collect()
	}

	/// The instruction placed at an address, if any.
	pub fn inst_at(&self, addr: u64) -> Option<&Inst> {
		self.addrs.iter().find(|(_, a)| **a == addr).map(|(inst, _)| inst)
	}

	/// Two layouts agree when they assign the same addresses.
	pub(crate) fn same_addrs(&self, other: &Self) -> bool {
		self.addrs == other.addrs
	}

	/// Post-convergence verification: the laid-out range must sit inside
	/// the code region with its last byte strictly inside, and every
	/// operand address must land in a permitted region.
	pub(crate) fn check(&self) -> AsmResult<()> {
		if self.insts.is_empty() {
			return Ok(());
		}
		let used = self.code_range();
		let avail = self.env.code_region;
		if used.1 > used.0 {
			let last_byte = used.1 - 1;
			if !(avail.0 <= last_byte && last_byte < avail.1) {
				return Err(AsmError::addr(format!(
					"code range [{:#x}, {:#x}) overflows region [{:#x}, {:#x})",
					used.0, used.1, avail.0, avail.1
				)));
			}
		}
		for inst in &self.insts {
			inst.check_with(self, &mut CycleGuard::new())?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_empty_layout_has_empty_range() {
		let lay = Layout::new(Rc::new(Env::default()));
		let start = lay.env().code_region.0;
		assert_eq!(lay.code_range(), (start, start));
		assert_eq!(lay.code_size(), 0);
		assert!(lay.check().is_ok());
	}

	#[test]
	fn test_missing_lookups() {
		let lay = Layout::new(Rc::new(Env::default()));
		let inst = crate::instructions::ops::nop();
		assert!(matches!(lay.addr_of(&inst), Err(AsmError::MissingDef { .. })));
		assert!(matches!(lay.addr_of_name("nowhere"), Err(AsmError::MissingDef { .. })));
		assert!(matches!(lay.named_register("zz"), Err(AsmError::MissingDef { .. })));
		assert!(lay.named_register("sp").is_ok());
	}
}
