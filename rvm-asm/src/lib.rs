//! # RVM Assembler
//!
//! An embedded assembler for the RVM register virtual machine: programs
//! are built as trees of instruction values, labels, and directives; the
//! layout engine co-resolves instruction addresses and variable-width
//! operand encodings by fixpoint iteration and emits a compact byte
//! stream for the VM interpreter.
//!
//! ## Features
//!
//! - The complete RVM instruction set, arithmetic through host calls
//! - Prefix-varint operand encoding with word-alignment compression
//! - Read-modify-write opcode compression at emit time
//! - Symbolic references: labels, `sizeof`, PC-relative offsets
//! - Alignment directives with deterministic oscillation breaking
//! - Address verification over whole accessed ranges
//! - Listing and symbol export for loaders and debuggers
//!
//! ## Quick Start
//!
//! ```rust
//! use rvm_asm::operands::Mem;
//! use rvm_asm::operands::expr::Label;
//! use rvm_asm::{Operand, Script, code, ops};
//!
//! let end = Label::new();
//! let program = code![
//! 	Mem::reg(0).set(1234),
//! 	ops::br(&end),
//! 	Mem::reg(0).set(5678),
//! 	end,
//! ];
//!
//! let script = Script::new(program);
//! let image = script.bytes().expect("program assembles");
//! assert!(!image.is_empty());
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Internal re-entrancy tracking
mod guard;

// Core modules
pub mod env;
pub mod error;
pub mod varint;

// Component modules
pub mod instructions;
pub mod layout;
pub mod macros;
pub mod operands;
pub mod output;
pub mod script;

// Re-exports for convenience
pub use crate::env::{Env, ImmRange};
pub use crate::error::{AsmError, AsmResult};
pub use crate::instructions::opcodes::Opcode;
pub use crate::instructions::rhs::{BinaryRhs, CmpKind, Comparison, Operand, Rhs, UnaryRhs};
pub use crate::instructions::{Inst, InstRef, ops};
pub use crate::layout::{CodeItem, Directive, Layout};
pub use crate::macros::{Subroutine, case, pack, when, when_else};
pub use crate::operands::expr::{BinOp, Expr, Label};
pub use crate::operands::{CodeRef, IMem, Imm, Mem, MemOffset, Source, Target};
pub use crate::script::{Code, Script};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_version_string() {
		assert!(!VERSION.is_empty());
	}

	#[test]
	fn test_opcode_table_is_complete() {
		assert_eq!(instructions::opcodes::ALL_OPCODES.len(), 72);
	}
}
