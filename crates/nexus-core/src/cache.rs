//! Per-[`WindowKey`] snapshot cache with TTL + fingerprint freshness check
//! (spec §4.6).

use std::time::{Duration, Instant};

use nexus_proto::{Snapshot, WindowKey};
use rustc_hash::FxHashMap;

struct Entry {
	snapshot: Snapshot,
	inserted_at: Instant,
	dirty: bool,
}

/// Holds the latest [`Snapshot`] per [`WindowKey`]. Never hands out mutable
/// references to a cached snapshot (spec §3 ownership rule) — callers
/// replace an entry wholesale via [`SnapshotCache::insert`].
#[derive(Default)]
pub struct SnapshotCache {
	entries: FxHashMap<WindowKey, Entry>,
}

/// Whether [`SnapshotCache::lookup`] can serve a cached snapshot as-is, or
/// the caller must re-acquire.
pub enum Lookup<'a> {
	Fresh(&'a Snapshot),
	Stale,
}

impl SnapshotCache {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Applies the §4.6 lookup policy:
	/// 1. `force` always misses.
	/// 2. Otherwise a hit requires both: entry age < `ttl`, and
	///    `live_fingerprint` (a cheap backend probe the caller already ran)
	///    matching the cached fingerprint.
	#[must_use]
	pub fn lookup(&self, key: &WindowKey, force: bool, ttl: Duration, live_fingerprint: u64) -> Lookup<'_> {
		if force {
			return Lookup::Stale;
		}
		match self.entries.get(key) {
			Some(entry)
				if !entry.dirty
					&& entry.inserted_at.elapsed() < ttl
					&& entry.snapshot.fingerprint == live_fingerprint =>
			{
				Lookup::Fresh(&entry.snapshot)
			}
			_ => Lookup::Stale,
		}
	}

	pub fn insert(&mut self, key: WindowKey, snapshot: Snapshot) {
		self.entries.insert(
			key,
			Entry {
				snapshot,
				inserted_at: Instant::now(),
				dirty: false,
			},
		);
	}

	/// Marks a `WindowKey`'s entry dirty, forcing the next lookup to miss.
	/// Called by the Action Engine before its post-action verification
	/// re-read (spec §4.6 invalidation, §4.9 step 3).
	pub fn mark_dirty(&mut self, key: &WindowKey) {
		if let Some(entry) = self.entries.get_mut(key) {
			entry.dirty = true;
		}
	}

	#[must_use]
	pub fn get(&self, key: &WindowKey) -> Option<&Snapshot> {
		self.entries.get(key).map(|e| &e.snapshot)
	}

	pub fn remove(&mut self, key: &WindowKey) {
		self.entries.remove(key);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use nexus_proto::Backend;

	fn key() -> WindowKey {
		WindowKey { window_title: "Editor".into(), process_id: 1, backend: Backend::NativeAx }
	}

	fn snap(fingerprint: u64) -> Snapshot {
		Snapshot {
			window_key: key(),
			captured_at: 0,
			fingerprint,
			elements: vec![],
			diagnostic: None,
		}
	}

	#[test]
	fn force_always_misses() {
		let mut cache = SnapshotCache::new();
		cache.insert(key(), snap(42));
		assert!(matches!(cache.lookup(&key(), true, Duration::from_secs(5), 42), Lookup::Stale));
	}

	#[test]
	fn fingerprint_mismatch_misses_even_within_ttl() {
		let mut cache = SnapshotCache::new();
		cache.insert(key(), snap(42));
		assert!(matches!(cache.lookup(&key(), false, Duration::from_secs(5), 99), Lookup::Stale));
	}

	#[test]
	fn fresh_entry_hits() {
		let mut cache = SnapshotCache::new();
		cache.insert(key(), snap(42));
		assert!(matches!(cache.lookup(&key(), false, Duration::from_secs(5), 42), Lookup::Fresh(_)));
	}

	#[test]
	fn dirty_marking_forces_next_lookup_stale() {
		let mut cache = SnapshotCache::new();
		cache.insert(key(), snap(42));
		cache.mark_dirty(&key());
		assert!(matches!(cache.lookup(&key(), false, Duration::from_secs(5), 42), Lookup::Stale));
	}

	#[test]
	fn expired_ttl_misses() {
		let mut cache = SnapshotCache::new();
		cache.insert(key(), snap(42));
		assert!(matches!(cache.lookup(&key(), false, Duration::from_millis(0), 42), Lookup::Stale));
	}
}
