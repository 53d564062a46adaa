//! Listing generation.
//!
//! One line per instruction: the address in hex, the encoded bytes, and a
//! mnemonic rendering of the operands in terms of the final layout. Labels
//! are printed on their own lines immediately before the instruction they
//! mark.

use crate::error::AsmResult;
use crate::layout::Layout;

/// Render the listing of a solved layout.
pub fn render(lay: &Layout) -> AsmResult<String> {
	let mut lines = Vec::new();
	for inst in lay.insts() {
		for label in lay.labels_for(inst) {
			lines.push(format!(".{label}"));
		}
		let addr = inst.addr_for(lay)?;
		let hexed = hex_spaced(&inst.encode_for(lay)?);
		lines.push(format!("{addr:>8x}:\t{hexed:<24}{}", inst.render_for(lay)?));
	}
	Ok(lines.join("\n"))
}

fn hex_spaced(bytes: &[u8]) -> String {
	bytes.iter().map(|byte| format!("{byte:02x}")).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::instructions::ops;
	use crate::operands::Mem;
	use crate::operands::expr::Label;
	use crate::script::Script;
	use crate::{Operand, code};

	#[test]
	fn test_hex_spacing() {
		assert_eq!(hex_spaced(&[]), "");
		assert_eq!(hex_spaced(&[0xAB]), "ab");
		assert_eq!(hex_spaced(&[1, 2, 0xFF]), "01 02 ff");
	}

	#[test]
	fn test_listing_shape() {
		let end = Label::named("end");
		let script = Script::new(code![
			ops::mov(Mem::reg(0), 1234),
			ops::br(&end),
			end,
			Mem::reg(1).set(Mem::reg(0)),
		]);
		let listing = script.listing().unwrap();
		let lines: Vec<&str> = listing.lines().collect();

		// Four instructions (auto exit included) plus one label line.
		assert_eq!(lines.len(), 5);
		assert_eq!(lines[2], ".end");
		assert!(lines[0].contains("Mov r0, #1234"), "{listing}");
		assert!(lines[1].contains("Br #"), "{listing}");
		assert!(lines[4].contains("Exit #0"), "{listing}");

		// Addresses are hex-rendered and increase monotonically.
		let start = script.code_start();
		assert!(lines[0].trim_start().starts_with(&format!("{start:x}:")), "{listing}");
	}
}
