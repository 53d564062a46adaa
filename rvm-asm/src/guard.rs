//! Re-entrancy tracking for self-referential instruction graphs.
//!
//! Branch instructions hold themselves as the base of their offset operand,
//! so any recursive walk over operands can revisit the instruction it
//! started from. Encoding and checking thread an explicit [`CycleGuard`]
//! through the walk; `Display` rendering cannot carry a context through
//! `fmt`, so it keys a thread-local set instead.

use std::cell::RefCell;
use std::collections::HashSet;

/// Tracks instruction identities active in the current recursive walk.
///
/// Encoding treats re-entry as a hard error; checking treats it as "already
/// being handled by the outer call" and skips silently.
#[derive(Debug, Default)]
pub(crate) struct CycleGuard {
	active: HashSet<usize>,
}

impl CycleGuard {
	pub(crate) fn new() -> Self {
		Self::default()
	}

	/// Mark `key` active. Returns `false` when it already was, i.e. the
	/// walk has come back around to a node it entered earlier.
	pub(crate) fn enter(&mut self, key: usize) -> bool {
		self.active.insert(key)
	}

	pub(crate) fn leave(&mut self, key: usize) {
		self.active.remove(&key);
	}
}

thread_local! {
	static ACTIVE_REPRS: RefCell<HashSet<usize>> = RefCell::new(HashSet::new());
}

/// Run `body` with `key` marked active for this thread's rendering, or
/// `fallback` when the rendering has looped back to `key`.
pub(crate) fn with_repr_guard<R>(
	key: usize,
	fallback: impl FnOnce() -> R,
	body: impl FnOnce() -> R,
) -> R {
	let entered = ACTIVE_REPRS.with(|set| set.borrow_mut().insert(key));
	if !entered {
		return fallback();
	}
	let result = body();
	ACTIVE_REPRS.with(|set| {
		set.borrow_mut().remove(&key);
	});
	result
}
