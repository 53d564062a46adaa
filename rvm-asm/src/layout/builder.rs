//! The layout engine: iterative co-resolution of addresses and sizes.
//!
//! Operand widths depend on the addresses being solved for — a branch gets
//! shorter when its target moves closer, which moves every following
//! instruction, which can change other widths. The engine runs the
//! assignment pass to a fixpoint:
//!
//! 1. Pre-analysis binds labels and directives to their next instruction
//!    and seeds every instruction with a pessimistic address and size.
//! 2. Each pass lays instructions at a running pointer, honoring
//!    alignment, and re-measures each encoding against the current layout.
//!    The loop terminates when the last three passes assign identical
//!    addresses: two equal snapshots can still hide a delta propagating
//!    through branch offsets, the third confirms the sizes reproduce.
//! 3. When the pass budget runs out, the oscillation breaker forces a
//!    4-byte alignment onto a randomly chosen instruction (seeded, so
//!    builds are reproducible) and restarts the search. Alignment
//!    discretizes the moving addresses and knocks the system onto a
//!    stable equilibrium; the breaker is part of normal convergence, not
//!    an error path.
//! 4. Alignment gaps are filled with one-byte no-ops.
//! 5. Optionally, every operand address is verified against the regions.

use std::collections::HashSet;
use std::rc::Rc;

use log::{debug, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::env::Env;
use crate::error::{AsmError, AsmResult};
use crate::instructions::ops;
use crate::layout::{CodeItem, Directive, Layout};

/// Fixed seed of the oscillation breaker, for reproducible builds.
const BREAKER_SEED: u64 = 42;

/// Reject duplicate instruction or label handles and a trailing label that
/// marks nothing.
pub(crate) fn check_code(items: &[CodeItem]) -> AsmResult<()> {
	let mut seen: HashSet<usize> = HashSet::new();
	let mut last_label: Option<&CodeItem> = None;
	for item in items {
		match item {
			CodeItem::Inst(inst) => {
				if !seen.insert(inst.key()) {
					return Err(AsmError::duplicate_def(format!("instruction {inst} placed twice")));
				}
				last_label = None;
			}
			CodeItem::Label(label) => {
				if !seen.insert(label.key()) {
					return Err(AsmError::duplicate_def(format!("label '{label}' placed twice")));
				}
				last_label = Some(item);
			}
			CodeItem::Directive(_) => {}
		}
	}
	if let Some(CodeItem::Label(label)) = last_label {
		return Err(AsmError::detached_label(label.name()));
	}
	Ok(())
}

/// Solve a flattened code sequence into a [`Layout`].
pub(crate) fn build(items: &[CodeItem], env: Rc<Env>) -> AsmResult<Layout> {
	env.validate()?;

	let start = env.code_region.0;
	let mut lay = Layout::new(env.clone());

	// Pre-analysis: bind pending labels and directives to the next
	// instruction, seed pessimistic addresses and sizes.
	let mut pending_labels = Vec::new();
	let mut pending_align: Option<u64> = None;
	let mut pending_nopad = false;
	let mut p = start;
	for item in items {
		match item {
			CodeItem::Label(label) => pending_labels.push(label.clone()),
			CodeItem::Directive(Directive::Align(n)) => {
				if *n < 1 {
					return Err(AsmError::directive(format!("alignment must be >= 1, got {n}")));
				}
				pending_align = Some(*n);
			}
			CodeItem::Directive(Directive::NoPad) => pending_nopad = true,
			CodeItem::Inst(inst) => {
				lay.addrs.insert(inst.clone(), p);
				let size = inst.max_size();
				lay.sizes.insert(inst.clone(), size);
				p += size as u64;
				if let Some(n) = pending_align.take() {
					lay.aligns.insert(inst.clone(), n);
				}
				if pending_nopad {
					lay.nopads.insert(inst.clone());
					pending_nopad = false;
				}
				for label in pending_labels.drain(..) {
					lay.labels_by_inst.insert(label, inst.clone());
				}
			}
		}
	}
	lay.insts = items
		.iter()
		.filter_map(|item| match item {
			CodeItem::Inst(inst) => Some(inst.clone()),
			_ => None,
		})
		.collect();

	// Iterative resolution.
	let mut passes: Vec<Layout> = Vec::new();
	let mut rng: Option<StdRng> = None;
	let mut next_fix_threshold = env.max_passes as usize;
	let mut remaining_fixes = if env.fix_oscillations { env.max_passes } else { 0 };

	loop {
		let mut p = start;
		for inst in lay.insts.clone() {
			let align = lay.aligns.get(&inst).copied().unwrap_or(1);
			p = p.next_multiple_of(align);
			lay.addrs.insert(inst.clone(), p);
			let size = inst.size_for(&lay)?;
			lay.sizes.insert(inst.clone(), size);
			p += size as u64;
		}
		passes.push(lay.clone());
		trace!("pass {}: code size {}", passes.len(), lay.code_size());

		let n = passes.len();
		if n >= 3
			&& passes[n - 1].same_addrs(&passes[n - 2])
			&& passes[n - 2].same_addrs(&passes[n - 3])
		{
			debug!("converged after {n} passes, code size {}", lay.code_size());
			break;
		}

		if n >= next_fix_threshold {
			if remaining_fixes > 0 {
				remaining_fixes -= 1;
				next_fix_threshold += env.max_passes as usize;
				let rng = rng.get_or_insert_with(|| StdRng::seed_from_u64(BREAKER_SEED));
				let candidates: Vec<_> = lay
					.insts
					.iter()
					.filter(|inst| !lay.nopads.contains(inst) && !lay.aligns.contains_key(inst))
					.cloned()
					.collect();
				if !candidates.is_empty() {
					let pick = candidates[rng.random_range(0..candidates.len())].clone();
					debug!("oscillating after {n} passes, forcing align 4 on {pick}");
					lay.aligns.insert(pick, 4);
					continue;
				}
			}
			return Err(AsmError::Build {
				passes: n,
				history: passes.iter().map(Layout::code_size).collect(),
			});
		}
	}

	// Fill alignment gaps with one-byte no-ops. Addresses of existing
	// instructions do not change.
	if !lay.aligns.is_empty() {
		let mut patched = Vec::with_capacity(lay.insts.len());
		let mut p = start;
		for inst in lay.insts.clone() {
			let assigned = lay.addr_of(&inst)?;
			while p < assigned {
				let nop = ops::nop();
				lay.addrs.insert(nop.clone(), p);
				let size = nop.size_for(&lay)?;
				debug_assert_eq!(size, 1);
				lay.sizes.insert(nop.clone(), size);
				patched.push(nop);
				p += size as u64;
			}
			p = assigned + lay.size_of(&inst)? as u64;
			patched.push(inst);
		}
		lay.insts = patched;
	}

	if env.verify_addrs {
		lay.check()?;
	}

	Ok(lay)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::operands::expr::Label;

	#[test]
	fn test_duplicate_instruction_rejected() {
		let nop = ops::nop();
		let code = vec![CodeItem::Inst(nop.clone()), CodeItem::Inst(nop)];
		assert!(matches!(check_code(&code), Err(AsmError::DuplicateDef { .. })));
	}

	#[test]
	fn test_duplicate_label_rejected() {
		let label = Label::new();
		let code = vec![
			CodeItem::Label(label.clone()),
			CodeItem::Label(label),
			CodeItem::Inst(ops::nop()),
		];
		assert!(matches!(check_code(&code), Err(AsmError::DuplicateDef { .. })));
	}

	#[test]
	fn test_distinct_labels_accepted() {
		let code = vec![
			CodeItem::Label(Label::new()),
			CodeItem::Label(Label::new()),
			CodeItem::Inst(ops::nop()),
		];
		assert!(check_code(&code).is_ok());
	}

	#[test]
	fn test_trailing_label_rejected() {
		let code = vec![CodeItem::Inst(ops::nop()), CodeItem::Label(Label::named("end"))];
		assert!(matches!(check_code(&code), Err(AsmError::DetachedLabel { .. })));
	}

	#[test]
	fn test_zero_alignment_rejected() {
		let env = Rc::new(Env::default());
		let code = vec![
			CodeItem::Directive(Directive::Align(0)),
			CodeItem::Inst(ops::nop()),
		];
		assert!(matches!(build(&code, env), Err(AsmError::Directive { .. })));
	}

	#[test]
	fn test_simple_build_is_contiguous() {
		let env = Rc::new(Env::default());
		let a = ops::nop();
		let b = ops::exit(0);
		let code = vec![CodeItem::Inst(a.clone()), CodeItem::Inst(b.clone())];
		let lay = build(&code, env).unwrap();
		let start = lay.env().code_region.0;
		assert_eq!(lay.addr_of(&a).unwrap(), start);
		assert_eq!(lay.size_of(&a).unwrap(), 1);
		assert_eq!(lay.addr_of(&b).unwrap(), start + 1);
		assert_eq!(lay.code_range(), (start, start + 3));
	}

	#[test]
	fn test_alignment_pads_with_nops() {
		let env = Rc::new(Env::default());
		let a = ops::nop();
		let b = ops::nop();
		let code = vec![
			CodeItem::Inst(a.clone()),
			CodeItem::Directive(Directive::Align(4)),
			CodeItem::Inst(b.clone()),
			CodeItem::Inst(ops::exit(0)),
		];
		let lay = build(&code, env).unwrap();
		let start = lay.env().code_region.0;
		assert_eq!(lay.addr_of(&b).unwrap() % 4, 0);
		assert_eq!(lay.addr_of(&b).unwrap(), start + 4);
		// Three pad nops inserted between a and b.
		assert_eq!(lay.insts().len(), 6);
	}

	#[test]
	fn test_latest_align_wins() {
		let env = Rc::new(Env::default());
		let b = ops::nop();
		let code = vec![
			CodeItem::Inst(ops::nop()),
			CodeItem::Directive(Directive::Align(16)),
			CodeItem::Directive(Directive::Align(2)),
			CodeItem::Inst(b.clone()),
			CodeItem::Inst(ops::exit(0)),
		];
		let lay = build(&code, env).unwrap();
		let start = lay.env().code_region.0;
		// Aligned to 2, not 16.
		assert_eq!(lay.addr_of(&b).unwrap(), start + 2);
	}
}
