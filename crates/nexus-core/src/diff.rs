//! Structural diff against the previous snapshot, and the cheap always-on
//! summary (spec §4.5).

use nexus_proto::{Element, ElementFlags, Rect, Role, Snapshot};
use rustc_hash::FxHashMap;

type MatchKey = (String, Role, Option<String>);

fn match_key(e: &Element) -> MatchKey {
	(e.name.clone(), e.role, e.parent_name.clone())
}

fn center_distance(a: Rect, b: Rect) -> f64 {
	let (ax, ay) = a.center();
	let (bx, by) = b.center();
	(f64::from(ax - bx).powi(2) + f64::from(ay - by).powi(2)).sqrt()
}

/// A value that differs between two snapshots of the same matched element.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange<T> {
	pub before: T,
	pub after: T,
}

/// Per-matched-pair delta; only fields that actually changed are `Some`
/// (spec §4.5: "records ... only the fields that differ").
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ElementChange {
	pub id: String,
	pub name: String,
	pub focused: Option<FieldChange<Option<bool>>>,
	pub enabled: Option<FieldChange<Option<bool>>>,
	pub value: Option<FieldChange<Option<String>>>,
	pub bounds: Option<FieldChange<Rect>>,
}

impl ElementChange {
	fn is_empty(&self) -> bool {
		self.focused.is_none() && self.enabled.is_none() && self.value.is_none() && self.bounds.is_none()
	}
}

/// `{added, removed, changed, unchanged_count}` (spec §4.5).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Diff {
	pub added: Vec<Element>,
	pub removed: Vec<Element>,
	pub changed: Vec<ElementChange>,
	pub unchanged_count: usize,
}

/// Result of a diff computation: a delta, or the full current snapshot when
/// the delta would be larger than just re-listing everything (spec §4.5
/// auto-fallback).
#[derive(Debug, Clone, PartialEq)]
pub enum DiffResult {
	Delta(Diff),
	FullDueToChurn(Snapshot),
}

fn bounds_changed(before: Rect, after: Rect, jitter_px: i32) -> bool {
	let (bcx, bcy) = before.center();
	let (acx, acy) = after.center();
	let center_moved = (bcx - acx).abs() > jitter_px || (bcy - acy).abs() > jitter_px;
	let resized = (before.w - after.w).abs() > jitter_px || (before.h - after.h).abs() > jitter_px;
	center_moved || resized
}

fn diff_pair(before: &Element, after: &Element, bounds_jitter_px: i32) -> ElementChange {
	let mut change = ElementChange {
		id: after.id.clone(),
		name: after.name.clone(),
		..Default::default()
	};
	if before.flags.focused != after.flags.focused {
		change.focused = Some(FieldChange { before: before.flags.focused, after: after.flags.focused });
	}
	if before.flags.enabled != after.flags.enabled {
		change.enabled = Some(FieldChange { before: before.flags.enabled, after: after.flags.enabled });
	}
	if before.value != after.value {
		change.value = Some(FieldChange { before: before.value.clone(), after: after.value.clone() });
	}
	if bounds_changed(before.bounds, after.bounds, bounds_jitter_px) {
		change.bounds = Some(FieldChange { before: before.bounds, after: after.bounds });
	}
	change
}

fn group_by_key(elements: &[Element]) -> FxHashMap<MatchKey, Vec<&Element>> {
	let mut groups: FxHashMap<MatchKey, Vec<&Element>> = FxHashMap::default();
	for e in elements {
		groups.entry(match_key(e)).or_default().push(e);
	}
	groups
}

/// Computes the diff between `prev` and `cur`, falling back to a full
/// listing when the delta's size exceeds `churn_threshold` of
/// `max(prev.len(), cur.len())` (spec §4.5).
#[must_use]
pub fn diff(prev: &Snapshot, cur: &Snapshot, churn_threshold: f64, bounds_jitter_px: i32) -> DiffResult {
	let mut prev_groups = group_by_key(&prev.elements);
	let cur_groups = group_by_key(&cur.elements);

	let mut added = Vec::new();
	let mut removed = Vec::new();
	let mut changed = Vec::new();
	let mut unchanged_count = 0usize;

	for (key, cur_candidates) in &cur_groups {
		let mut prev_candidates = prev_groups.remove(key).unwrap_or_default();
		let mut cur_candidates = cur_candidates.clone();

		// Greedily pair the closest (prev, cur) elements sharing this key;
		// ties broken by nearest bounds center (spec §4.5).
		while !prev_candidates.is_empty() && !cur_candidates.is_empty() {
			let mut best: Option<(usize, usize, f64)> = None;
			for (pi, p) in prev_candidates.iter().enumerate() {
				for (ci, c) in cur_candidates.iter().enumerate() {
					let d = center_distance(p.bounds, c.bounds);
					if best.is_none_or(|(_, _, best_d)| d < best_d) {
						best = Some((pi, ci, d));
					}
				}
			}
			let (pi, ci, _) = best.expect("both non-empty");
			let p = prev_candidates.remove(pi);
			let c = cur_candidates.remove(ci);
			let change = diff_pair(p, c, bounds_jitter_px);
			if change.is_empty() {
				unchanged_count += 1;
			} else {
				changed.push(change);
			}
		}

		removed.extend(prev_candidates.into_iter().cloned());
		added.extend(cur_candidates.into_iter().cloned());
	}
	// Any keys left only in prev_groups had no current counterpart at all.
	removed.extend(prev_groups.into_values().flatten().cloned());

	let total = prev.elements.len().max(cur.elements.len()).max(1);
	let delta_size = added.len() + removed.len() + changed.len();
	#[allow(clippy::cast_precision_loss)]
	if delta_size as f64 / total as f64 > churn_threshold {
		return DiffResult::FullDueToChurn(cur.clone());
	}

	DiffResult::Delta(Diff { added, removed, changed, unchanged_count })
}

/// Five equal y-bands of the window, labeled per §4.5's literal naming
/// (`top`/`left`/`main`/`right`/`bottom` — the names are historical, not
/// a left/right spatial split).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpatialBands {
	pub top: usize,
	pub left: usize,
	pub main: usize,
	pub right: usize,
	pub bottom: usize,
}

impl SpatialBands {
	fn bump(&mut self, band: usize) {
		match band {
			0 => self.top += 1,
			1 => self.left += 1,
			2 => self.main += 1,
			3 => self.right += 1,
			_ => self.bottom += 1,
		}
	}
}

/// The always-cheap-to-compute semantic summary (spec §4.5). Data only;
/// rendering it as prose is the caller's job.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Summary {
	pub role_counts: FxHashMap<Role, usize>,
	pub focused: Option<(String, Role)>,
	pub dialog_count: usize,
	pub error_elements: Vec<String>,
	pub spatial_bands: SpatialBands,
}

/// Builds the [`Summary`] for `elements`, bucketing by y-position within
/// `window`.
#[must_use]
pub fn summarize(elements: &[Element], window: Rect) -> Summary {
	let error_pattern = regex::Regex::new(r"(?i)error|warning|alert").expect("static pattern compiles");

	let mut summary = Summary::default();
	let window_h = window.h.max(1);

	for e in elements {
		*summary.role_counts.entry(e.role).or_insert(0) += 1;
		if e.is_focused() && summary.focused.is_none() {
			summary.focused = Some((e.name.clone(), e.role));
		}
		if e.role == Role::Dialog {
			summary.dialog_count += 1;
		}
		if error_pattern.is_match(&e.name) {
			summary.error_elements.push(e.name.clone());
		}

		let rel_y = (e.bounds.y - window.y).clamp(0, window_h);
		#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
		let band = ((f64::from(rel_y) / f64::from(window_h)) * 5.0).floor().clamp(0.0, 4.0) as usize;
		summary.spatial_bands.bump(band);
	}

	summary
}

/// Selects the visible elements with a known, non-unknown enabled/visible
/// state that qualify for OCR/vision fallback dedup (spec §4.5): a
/// fallback element is dropped if it overlaps an existing element above
/// the given IoU threshold.
#[must_use]
pub fn merge_fallback_elements(existing: &[Element], fallback: Vec<Element>, iou_threshold: f64) -> Vec<Element> {
	fallback
		.into_iter()
		.filter(|candidate| !existing.iter().any(|e| e.bounds.iou(&candidate.bounds) > iou_threshold))
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use nexus_proto::{Backend, WindowKey};

	fn el(id: &str, name: &str, role: Role, x: i32, y: i32) -> Element {
		Element {
			id: id.to_string(),
			role,
			name: name.to_string(),
			value: None,
			bounds: Rect { x, y, w: 40, h: 20 },
			flags: ElementFlags::default(),
			parent_name: None,
			source: Backend::NativeAx,
		}
	}

	fn snap(elements: Vec<Element>) -> Snapshot {
		Snapshot {
			window_key: WindowKey { window_title: "Win".into(), process_id: 1, backend: Backend::NativeAx },
			captured_at: 0,
			fingerprint: 0,
			elements,
			diagnostic: None,
		}
	}

	#[test]
	fn detects_added_and_removed_by_key() {
		let prev = snap(vec![el("ax_0", "Save", Role::Button, 10, 10)]);
		let cur = snap(vec![el("ax_0", "Cancel", Role::Button, 10, 10)]);
		match diff(&prev, &cur, 0.5, 8) {
			DiffResult::Delta(d) => {
				assert_eq!(d.added.len(), 1);
				assert_eq!(d.removed.len(), 1);
				assert_eq!(d.changed.len(), 0);
			}
			other => panic!("expected delta, got {other:?}"),
		}
	}

	#[test]
	fn small_bounds_move_is_damped_as_jitter() {
		let prev = snap(vec![el("ax_0", "Save", Role::Button, 10, 10)]);
		let cur = snap(vec![el("ax_0", "Save", Role::Button, 12, 11)]);
		match diff(&prev, &cur, 0.5, 8) {
			DiffResult::Delta(d) => {
				assert_eq!(d.changed.len(), 0);
				assert_eq!(d.unchanged_count, 1);
			}
			other => panic!("expected delta, got {other:?}"),
		}
	}

	#[test]
	fn large_bounds_move_is_reported_changed() {
		let prev = snap(vec![el("ax_0", "Save", Role::Button, 10, 10)]);
		let cur = snap(vec![el("ax_0", "Save", Role::Button, 400, 10)]);
		match diff(&prev, &cur, 0.9, 8) {
			DiffResult::Delta(d) => {
				assert_eq!(d.changed.len(), 1);
				assert!(d.changed[0].bounds.is_some());
			}
			other => panic!("expected delta, got {other:?}"),
		}
	}

	#[test]
	fn churn_above_threshold_returns_full_snapshot() {
		let prev = snap(vec![el("ax_0", "A", Role::Button, 0, 0)]);
		let cur = snap(vec![el("ax_0", "B", Role::Button, 0, 0), el("ax_1", "C", Role::Link, 0, 0)]);
		match diff(&prev, &cur, 0.1, 8) {
			DiffResult::FullDueToChurn(s) => assert_eq!(s.elements.len(), 2),
			other => panic!("expected full-due-to-churn, got {other:?}"),
		}
	}

	#[test]
	fn summary_counts_roles_and_errors() {
		let window = Rect { x: 0, y: 0, w: 800, h: 600 };
		let elements = vec![
			el("ax_0", "Connection error", Role::StaticText, 10, 10),
			el("ax_1", "Save", Role::Button, 10, 550),
		];
		let summary = summarize(&elements, window);
		assert_eq!(summary.role_counts[&Role::Button], 1);
		assert_eq!(summary.error_elements, vec!["Connection error".to_string()]);
		assert_eq!(summary.spatial_bands.top, 1);
		assert_eq!(summary.spatial_bands.bottom, 1);
	}

	#[test]
	fn fallback_merge_drops_overlapping_candidates() {
		let existing = vec![el("ax_0", "Save", Role::Button, 10, 10)];
		let fallback = vec![el("ocr_0", "Save", Role::Other, 11, 11)];
		let merged = merge_fallback_elements(&existing, fallback, 0.5);
		assert!(merged.is_empty());
	}
}
