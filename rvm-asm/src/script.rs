//! The script facade: from a nested code tree to bytes.
//!
//! A [`Code`] tree is an arbitrarily nested sequence of instructions,
//! labels, and directives; empty nodes are conveniences for conditionally
//! included pieces and flatten away. A [`Script`] wraps a tree with an
//! environment, lazily builds the layout once, and exposes the byte image
//! and a human-readable listing.

use std::rc::Rc;

use once_cell::unsync::OnceCell;

use crate::env::Env;
use crate::error::AsmResult;
use crate::instructions::opcodes::Opcode;
use crate::instructions::{Inst, ops};
use crate::layout::{CodeItem, Directive, Layout, builder};
use crate::operands::expr::Label;

/// A nested code tree.
#[derive(Clone, Debug)]
pub enum Code {
	/// An instruction.
	Inst(Inst),
	/// A label.
	Label(Label),
	/// A directive.
	Directive(Directive),
	/// A nested sequence.
	Seq(Vec<Code>),
	/// Nothing; flattens away.
	Empty,
}

impl Code {
	/// A sequence node.
	pub fn seq(items: impl IntoIterator<Item = Code>) -> Self {
		Self::Seq(items.into_iter().collect())
	}

	/// `code` when `condition` holds, nothing otherwise.
	pub fn when(condition: bool, code: impl Into<Code>) -> Self {
		if condition { code.into() } else { Self::Empty }
	}

	/// Flatten the tree into a linear item sequence.
	pub fn flatten(&self) -> Vec<CodeItem> {
		let mut out = Vec::new();
		self.flatten_into(&mut out);
		out
	}

	fn flatten_into(&self, out: &mut Vec<CodeItem>) {
		match self {
			Self::Inst(inst) => out.push(CodeItem::Inst(inst.clone())),
			Self::Label(label) => out.push(CodeItem::Label(label.clone())),
			Self::Directive(directive) => out.push(CodeItem::Directive(*directive)),
			Self::Seq(items) => {
				for item in items {
					item.flatten_into(out);
				}
			}
			Self::Empty => {}
		}
	}
}

impl From<Inst> for Code {
	fn from(inst: Inst) -> Self {
		Self::Inst(inst)
	}
}

impl From<&Inst> for Code {
	fn from(inst: &Inst) -> Self {
		Self::Inst(inst.clone())
	}
}

impl From<Label> for Code {
	fn from(label: Label) -> Self {
		Self::Label(label)
	}
}

impl From<&Label> for Code {
	fn from(label: &Label) -> Self {
		Self::Label(label.clone())
	}
}

impl From<Directive> for Code {
	fn from(directive: Directive) -> Self {
		Self::Directive(directive)
	}
}

impl From<Vec<Code>> for Code {
	fn from(items: Vec<Code>) -> Self {
		Self::Seq(items)
	}
}

impl From<Option<Code>> for Code {
	fn from(code: Option<Code>) -> Self {
		code.unwrap_or(Self::Empty)
	}
}

/// Build a [`Code`] sequence from anything convertible to code.
///
/// ```
/// use rvm_asm::operands::Mem;
/// use rvm_asm::operands::expr::Label;
/// use rvm_asm::{code, ops};
///
/// let end = Label::new();
/// let program = code![ops::mov(Mem::reg(0), 1234), ops::br(&end), end];
/// ```
#[macro_export]
macro_rules! code {
	($($item:expr),* $(,)?) => {
		$crate::script::Code::Seq(vec![$($crate::script::Code::from($item)),*])
	};
}

/// A program wrapped with an environment, built lazily and exactly once.
pub struct Script {
	env: Rc<Env>,
	code: Code,
	add_exit: bool,
	layout: OnceCell<Layout>,
}

impl Script {
	/// Wrap a code tree with the default environment.
	pub fn new(code: impl Into<Code>) -> Self {
		Self {
			env: Rc::new(Env::default()),
			code: code.into(),
			add_exit: true,
			layout: OnceCell::new(),
		}
	}

	/// Use `env` instead of the default environment.
	#[must_use]
	pub fn with_env(mut self, env: Env) -> Self {
		self.env = Rc::new(env);
		self
	}

	/// Do not append the implicit `Exit(0)`.
	#[must_use]
	pub fn without_auto_exit(mut self) -> Self {
		self.add_exit = false;
		self
	}

	/// The script's environment.
	pub fn env(&self) -> &Env {
		&self.env
	}

	/// The first code address.
	pub fn code_start(&self) -> u64 {
		self.env.code_region.0
	}

	fn code_items(&self) -> Vec<CodeItem> {
		let mut items = self.code.flatten();
		let ends_with_exit = matches!(
			items.last(),
			Some(CodeItem::Inst(inst)) if inst.opcode() == Some(Opcode::Exit)
		);
		if self.add_exit && !ends_with_exit {
			items.push(CodeItem::Inst(ops::exit(0)));
		}
		items
	}

	/// The solved layout, built on first use and memoized.
	pub fn layout(&self) -> AsmResult<&Layout> {
		self.layout.get_or_try_init(|| {
			let items = self.code_items();
			builder::check_code(&items)?;
			builder::build(&items, Rc::clone(&self.env))
		})
	}

	/// Build the layout. An alias for [`Script::layout`].
	pub fn build(&self) -> AsmResult<&Layout> {
		self.layout()
	}

	/// The byte image: every instruction's encoding, concatenated,
	/// starting at [`Script::code_start`].
	pub fn bytes(&self) -> AsmResult<Vec<u8>> {
		let lay = self.layout()?;
		if lay.insts().is_empty() {
			return Ok(Vec::new());
		}
		let mut out = Vec::new();
		let mut end = self.code_start();
		for inst in lay.insts() {
			let encoded = inst.encode_for(lay)?;
			end = inst.addr_for(lay)? + encoded.len() as u64;
			out.extend(encoded);
		}
		// Doublechecking the result length to be safe.
		assert_eq!(self.code_start() + out.len() as u64, end, "bytecode size mismatch");
		Ok(out)
	}

	/// A human-readable, address-prefixed disassembly of the final layout.
	pub fn listing(&self) -> AsmResult<String> {
		crate::output::listing::render(self.layout()?)
	}
}
