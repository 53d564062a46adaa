//! Build environment for the assembler.
//!
//! An [`Env`] is an immutable description of the machine the bytecode is
//! built for: the code and RAM address regions, the named-register table,
//! the pass budget of the layout engine, and a handful of build toggles.
//! Environments are plain serializable data validated as a whole by
//! [`Env::validate`], which every build runs first.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{AsmError, AsmResult};

/// Smallest signed 32-bit value, widened for address arithmetic.
pub const S32_MIN: i64 = -0x8000_0000;

/// Largest signed 32-bit value.
pub const S32_MAX: i64 = 0x7FFF_FFFF;

/// Largest unsigned 32-bit value.
pub const U32_MAX: i64 = 0xFFFF_FFFF;

/// Permitted range preset for literal immediates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImmRange {
	/// Signed 32-bit only: `[-2^31, 2^31)`. The default.
	#[default]
	Signed32,
	/// The full 32-bit envelope: `[-2^31, 2^32)`. Accepts unsigned
	/// spellings of high-bit patterns.
	Full32,
}

impl ImmRange {
	/// Whether `val` is a permitted literal immediate under this preset.
	pub fn contains(self, val: i64) -> bool {
		match self {
			Self::Signed32 => (S32_MIN..=S32_MAX).contains(&val),
			Self::Full32 => (S32_MIN..=U32_MAX).contains(&val),
		}
	}
}

/// Immutable description of the target machine and build limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Env {
	/// Code region `[lo, hi)` in byte addresses.
	pub code_region: (u64, u64),

	/// RAM region `[lo, hi)` in byte addresses. Word-aligned at both ends
	/// and disjoint from the code region.
	pub ram_region: (u64, u64),

	/// Register names resolvable at build time, name to register index.
	pub named_registers: IndexMap<String, u32>,

	/// Upper bound on layout passes before the oscillation breaker steps
	/// in. At least 3.
	pub max_passes: u32,

	/// Break layout oscillations by injecting forced alignment.
	#[serde(default = "default_toggle")]
	pub fix_oscillations: bool,

	/// Verify every operand address after convergence.
	#[serde(default = "default_toggle")]
	pub verify_addrs: bool,

	/// Permitted range for literal immediates.
	#[serde(default)]
	pub imm_range: ImmRange,
}

fn default_toggle() -> bool {
	true
}

impl Default for Env {
	fn default() -> Self {
		Self {
			code_region: (0x1_0000, 0x1_0000_0000),
			ram_region: (0, 0x1_0000),
			named_registers: [("sp".to_string(), 13), ("lr".to_string(), 14)].into_iter().collect(),
			max_passes: 16,
			fix_oscillations: true,
			verify_addrs: true,
			imm_range: ImmRange::default(),
		}
	}
}

impl Env {
	/// Create an environment with the given regions and the remaining
	/// fields at their defaults.
	///
	/// # Errors
	///
	/// Returns [`AsmError::Value`] when the regions are malformed, see
	/// [`Env::validate`].
	pub fn new(code_region: (u64, u64), ram_region: (u64, u64)) -> AsmResult<Self> {
		let env = Self {
			code_region,
			ram_region,
			named_registers: IndexMap::new(),
			..Self::default()
		};
		env.validate()?;
		Ok(env)
	}

	/// Add a named register.
	#[must_use]
	pub fn with_named_register(mut self, name: impl Into<String>, index: u32) -> Self {
		self.named_registers.insert(name.into(), index);
		self
	}

	/// Set the layout pass budget. Validated by [`Env::validate`].
	#[must_use]
	pub fn with_max_passes(mut self, max_passes: u32) -> Self {
		self.max_passes = max_passes;
		self
	}

	/// Set the literal-immediate range preset.
	#[must_use]
	pub fn with_imm_range(mut self, imm_range: ImmRange) -> Self {
		self.imm_range = imm_range;
		self
	}

	/// Enable or disable the oscillation breaker.
	#[must_use]
	pub fn with_fix_oscillations(mut self, fix: bool) -> Self {
		self.fix_oscillations = fix;
		self
	}

	/// Enable or disable post-convergence address verification.
	#[must_use]
	pub fn with_verify_addrs(mut self, verify: bool) -> Self {
		self.verify_addrs = verify;
		self
	}

	/// Validate the environment as a whole.
	///
	/// # Errors
	///
	/// Returns [`AsmError::Value`] when a region is inverted, the regions
	/// overlap, the RAM region is not word-aligned, or the pass budget is
	/// below 3.
	pub fn validate(&self) -> AsmResult<()> {
		let c = self.code_region;
		let r = self.ram_region;
		if c.0 > c.1 {
			return Err(AsmError::value(format!("bad code region {c:?}")));
		}
		if r.0 > r.1 {
			return Err(AsmError::value(format!("bad ram region {r:?}")));
		}
		if c.0 < r.1 && r.0 < c.1 {
			return Err(AsmError::value(format!("memory regions overlap: ram {r:?}, code {c:?}")));
		}
		if r.0 % 4 != 0 || r.1 % 4 != 0 {
			return Err(AsmError::value(format!("ram region must be word-aligned: {r:?}")));
		}
		if self.max_passes < 3 {
			return Err(AsmError::value(format!(
				"at least 3 build passes are required, got {}",
				self.max_passes
			)));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_env_is_valid() {
		let env = Env::default();
		assert!(env.validate().is_ok());
		assert_eq!(env.named_registers.get("sp"), Some(&13));
		assert_eq!(env.named_registers.get("lr"), Some(&14));
	}

	#[test]
	fn test_overlapping_regions() {
		assert!(Env::new((0, 1024), (512, 2048)).is_err());
		// Code fully inside ram is an overlap too.
		assert!(Env::new((16, 32), (0, 1024)).is_err());
		// Touching regions are fine.
		assert!(Env::new((1024, 4096), (0, 1024)).is_ok());
	}

	#[test]
	fn test_misaligned_ram() {
		assert!(Env::new((4096, 8192), (0, 1022)).is_err());
		assert!(Env::new((4096, 8192), (2, 1024)).is_err());
	}

	#[test]
	fn test_pass_budget_floor() {
		let env = Env::default().with_max_passes(2);
		assert!(env.validate().is_err());
		let env = env.with_max_passes(3);
		assert!(env.validate().is_ok());
	}

	#[test]
	fn test_imm_range_presets() {
		assert!(ImmRange::Signed32.contains(S32_MAX));
		assert!(!ImmRange::Signed32.contains(S32_MAX + 1));
		assert!(ImmRange::Full32.contains(U32_MAX));
		assert!(!ImmRange::Full32.contains(U32_MAX + 1));
		assert!(ImmRange::Full32.contains(S32_MIN));
		assert!(!ImmRange::Full32.contains(S32_MIN - 1));
	}

	#[test]
	fn test_serde_round_trip() {
		let env = Env::default().with_named_register("fp", 12).with_max_passes(8);
		let json = serde_json::to_string(&env).unwrap();
		let back: Env = serde_json::from_str(&json).unwrap();
		assert!(back.validate().is_ok());
		assert_eq!(back.max_passes, 8);
		assert_eq!(back.named_registers.get("fp"), Some(&12));
	}
}
