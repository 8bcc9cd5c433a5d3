//! Perception-side logic shared by every backend: normalization, filtering,
//! formatting, diff/summary, the snapshot cache, and the mark registry
//! (spec §4.2–§4.7). Pure over its inputs — no backend I/O happens in this
//! crate; `nexus-backends` is the only crate that talks to a live session.

pub mod cache;
pub mod config;
pub mod diff;
pub mod filter;
pub mod format;
pub mod markup;
pub mod normalize;

pub use cache::{Lookup, SnapshotCache};
pub use config::NexusConfig;
pub use diff::{Diff, DiffResult, ElementChange, FieldChange, Summary};
pub use filter::{Filter, FilterError};
pub use format::render as render_elements;
pub use markup::{annotate, resolve as resolve_mark, Badge};
pub use normalize::{normalize, Normalized, RoleMap};

use std::time::Duration;

use nexus_proto::{Element, Rect, Role, Snapshot, WindowKey};

/// Glues the Snapshot Cache, Diff/Summary and Formatter together for a
/// `describe`-shaped request: the piece of perception logic that is the
/// same regardless of which backend produced the snapshot (spec §2 flow:
/// "Daemon → Perception(Backend→Normalize→Filter→Cache→Diff/Summary→Format)
/// → response").
///
/// Acquisition and normalization stay the caller's (`nexus-backends`'s)
/// responsibility: this type only ever receives an already-normalized
/// [`Snapshot`].
pub struct PerceptionCore {
	cache: SnapshotCache,
	config: NexusConfig,
}

/// The perception result for one `describe`-style request: either the
/// delta against the previous snapshot, the full listing (first look, or
/// churn fallback), rendered text, and the always-on summary.
pub struct PerceptionResult {
	pub diff: Option<DiffResult>,
	pub summary: Summary,
	pub rendered: String,
}

impl PerceptionCore {
	#[must_use]
	pub fn new(config: NexusConfig) -> Self {
		Self { cache: SnapshotCache::new(), config }
	}

	#[must_use]
	pub fn config(&self) -> &NexusConfig {
		&self.config
	}

	/// Spec §4.6 cache lookup policy, given a cheap live fingerprint probe
	/// the caller already ran against the backend.
	#[must_use]
	pub fn lookup_cached(&self, key: &WindowKey, force: bool, live_fingerprint: u64) -> Option<&Snapshot> {
		match self.cache.lookup(key, force, Duration::from_millis(self.config.cache_ttl_ms), live_fingerprint) {
			Lookup::Fresh(snapshot) => Some(snapshot),
			Lookup::Stale => None,
		}
	}

	/// Whatever snapshot is currently stored for `key`, regardless of
	/// TTL/fingerprint freshness. Callers use this to capture "what we had
	/// before" ahead of a cache insert that would otherwise overwrite it —
	/// unlike [`Self::lookup_cached`], this never applies the freshness
	/// policy, so it's not a substitute for it.
	#[must_use]
	pub fn peek(&self, key: &WindowKey) -> Option<&Snapshot> {
		self.cache.get(key)
	}

	pub fn insert(&mut self, key: WindowKey, snapshot: Snapshot) {
		self.cache.insert(key, snapshot);
	}

	/// Marks the affected `WindowKey` dirty, per the Action Engine's
	/// post-step invalidation (spec §4.6, §4.9).
	pub fn mark_dirty(&mut self, key: &WindowKey) {
		self.cache.mark_dirty(key);
	}

	/// Runs the describe-request pipeline tail: diff against `previous`
	/// (the snapshot that was current immediately before this request's
	/// acquire, if any and `want_diff`), summary (if `want_summary`), and
	/// rendering in `format`.
	///
	/// `previous` must be the snapshot from *before* this request's fresh
	/// acquire or cache hit was recorded — callers must capture it (e.g.
	/// via [`Self::peek`]) ahead of calling [`Self::insert`], since once
	/// `current` has been inserted under the same key there's no longer a
	/// distinct "previous" to diff against.
	pub fn describe(
		&self,
		previous: Option<&Snapshot>,
		current: &Snapshot,
		window_bounds: Rect,
		format: nexus_proto::Format,
		want_diff: bool,
		want_summary: bool,
	) -> Result<PerceptionResult, serde_json::Error> {
		let diff_result = if want_diff {
			previous.map(|prev| diff::diff(prev, current, self.config.diff_churn_threshold, self.config.bounds_jitter_px))
		} else {
			None
		};

		let rendered_elements: &[Element] = match &diff_result {
			Some(DiffResult::FullDueToChurn(full)) => &full.elements,
			_ => &current.elements,
		};
		let rendered = format::render(rendered_elements, format)?;

		let summary =
			if want_summary { diff::summarize(&current.elements, window_bounds) } else { Summary::default() };

		Ok(PerceptionResult { diff: diff_result, summary, rendered })
	}

	/// Applies the OCR/vision fallback rule: when `elements` has fewer than
	/// the configured minimum, the caller should acquire from a fallback
	/// backend and pass its output here to merge in non-overlapping
	/// candidates (spec §4.5).
	#[must_use]
	pub fn needs_fallback(&self, elements: &[Element]) -> bool {
		elements.len() < self.config.fallback_min_elements
	}

	#[must_use]
	pub fn merge_fallback(&self, existing: &[Element], fallback: Vec<Element>) -> Vec<Element> {
		diff::merge_fallback_elements(existing, fallback, self.config.fallback_merge_iou)
	}
}

/// Convenience re-export used by `nexus-resolver`'s ambiguous-match error
/// context (spec §7: "top candidates").
#[must_use]
pub fn role_counts_summary(elements: &[Element]) -> std::collections::HashMap<Role, usize> {
	let mut counts = std::collections::HashMap::new();
	for e in elements {
		*counts.entry(e.role).or_insert(0) += 1;
	}
	counts
}

#[cfg(test)]
mod tests {
	use super::*;
	use nexus_proto::{Backend, ElementFlags};

	fn key() -> WindowKey {
		WindowKey { window_title: "App".into(), process_id: 1, backend: Backend::NativeAx }
	}

	fn el(name: &str, x: i32, y: i32) -> Element {
		Element {
			id: format!("ax_{name}"),
			role: Role::Button,
			name: name.to_string(),
			value: None,
			bounds: Rect { x, y, w: 40, h: 20 },
			flags: ElementFlags::default(),
			parent_name: None,
			source: Backend::NativeAx,
		}
	}

	fn snap(elements: Vec<Element>, fingerprint: u64) -> Snapshot {
		Snapshot { window_key: key(), captured_at: 0, fingerprint, elements, diagnostic: None }
	}

	#[test]
	fn describe_without_prior_cache_has_no_diff() {
		let core = PerceptionCore::new(NexusConfig::default());
		let current = snap(vec![el("Save", 10, 10)], 1);
		let result = core
			.describe(None, &current, Rect { x: 0, y: 0, w: 800, h: 600 }, nexus_proto::Format::Compact, true, true)
			.unwrap();
		assert!(result.diff.is_none());
		assert!(result.rendered.contains("Save"));
	}

	#[test]
	fn describe_diffs_against_the_previous_snapshot() {
		let core = PerceptionCore::new(NexusConfig::default());
		let previous = snap(vec![el("Save", 10, 10)], 1);
		let current = snap(vec![el("Cancel", 10, 10)], 2);
		let result = core
			.describe(Some(&previous), &current, Rect { x: 0, y: 0, w: 800, h: 600 }, nexus_proto::Format::Json, true, false)
			.unwrap();
		assert!(matches!(result.diff, Some(DiffResult::Delta(_))));
	}

	#[test]
	fn peek_reflects_the_most_recent_insert() {
		let mut core = PerceptionCore::new(NexusConfig::default());
		assert!(core.peek(&key()).is_none());
		core.insert(key(), snap(vec![el("Save", 10, 10)], 1));
		assert!(core.peek(&key()).is_some());
	}

	#[test]
	fn needs_fallback_below_configured_minimum() {
		let core = PerceptionCore::new(NexusConfig::default());
		assert!(core.needs_fallback(&[el("A", 0, 0)]));
	}
}
