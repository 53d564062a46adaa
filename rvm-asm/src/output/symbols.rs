//! Symbol export.
//!
//! The layout's label bindings rendered for external consumers: a loader
//! picking entry points, or a debugger mapping addresses back to names.

use serde::Serialize;

use crate::error::{AsmError, AsmResult};
use crate::layout::Layout;

/// One exported symbol.
#[derive(Debug, Clone, Serialize)]
pub struct SymbolEntry {
	/// Label name.
	pub name: String,
	/// Resolved code address.
	pub addr: u64,
}

/// Supported export formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SymbolFormat {
	/// A JSON array of `{name, addr}` objects.
	#[default]
	Json,
	/// One `<addr-hex> <name>` pair per line.
	Text,
}

/// Collect every label binding in insertion order.
pub fn collect(lay: &Layout) -> AsmResult<Vec<SymbolEntry>> {
	lay.labels()
		.map(|(label, inst)| {
			Ok(SymbolEntry {
				name: label.name().to_string(),
				addr: lay.addr_of(inst)?,
			})
		})
		.collect()
}

/// Render the layout's symbols in the requested format.
pub fn export(lay: &Layout, format: SymbolFormat) -> AsmResult<String> {
	let entries = collect(lay)?;
	match format {
		SymbolFormat::Json => serde_json::to_string_pretty(&entries)
			.map_err(|err| AsmError::value(format!("symbol serialization failed: {err}"))),
		SymbolFormat::Text => Ok(entries
			.iter()
			.map(|entry| format!("{:08x} {}", entry.addr, entry.name))
			.collect::<Vec<_>>()
			.join("\n")),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::code;
	use crate::instructions::ops;
	use crate::operands::expr::Label;
	use crate::script::Script;

	fn sample() -> Script {
		let entry = Label::named("entry");
		let data = Label::named("data");
		Script::new(code![entry, ops::nop(), data, ops::exit(0)])
	}

	#[test]
	fn test_collect_in_insertion_order() {
		let script = sample();
		let lay = script.layout().unwrap();
		let entries = collect(lay).unwrap();
		assert_eq!(entries.len(), 2);
		assert_eq!(entries[0].name, "entry");
		assert_eq!(entries[0].addr, script.code_start());
		assert_eq!(entries[1].name, "data");
		assert_eq!(entries[1].addr, script.code_start() + 1);
	}

	#[test]
	fn test_text_format() {
		let script = sample();
		let text = export(script.layout().unwrap(), SymbolFormat::Text).unwrap();
		let lines: Vec<&str> = text.lines().collect();
		assert_eq!(lines.len(), 2);
		assert!(lines[0].ends_with(" entry"));
		assert!(lines[1].ends_with(" data"));
	}

	#[test]
	fn test_json_format_round_trips() {
		let script = sample();
		let json = export(script.layout().unwrap(), SymbolFormat::Json).unwrap();
		let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
		assert_eq!(parsed.as_array().unwrap().len(), 2);
		assert_eq!(parsed[0]["name"], "entry");
	}
}
