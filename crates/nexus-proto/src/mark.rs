//! Set-of-mark registry wire types (spec §4.7).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One numbered overlay badge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mark {
	pub number: u32,
	pub element_id: String,
	/// Center of the element's bounds at annotation time.
	pub point: (i32, i32),
}

/// `mark_number -> Element.id` plus a reference to the snapshot it was
/// taken from (spec §3). At most one active table per daemon instance —
/// the "last marked screenshot". Fail-fast: a stale number after
/// re-annotation resolves to nothing, never to a recycled mark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkTable {
	pub window_key_title: String,
	pub snapshot_fingerprint: u64,
	pub marks: HashMap<u32, Mark>,
}

impl MarkTable {
	#[must_use]
	pub fn new(window_key_title: String, snapshot_fingerprint: u64) -> Self {
		Self {
			window_key_title,
			snapshot_fingerprint,
			marks: HashMap::new(),
		}
	}

	#[must_use]
	pub fn resolve(&self, number: u32) -> Option<&Mark> {
		self.marks.get(&number)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.marks.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.marks.is_empty()
	}
}
