//! Resolves a symbolic `{name, role?, index?}` target to exactly one
//! `Element` within a given `Snapshot` (spec §4.8). Pure over its inputs:
//! no I/O, never modifies the snapshot.
//!
//! A CSS selector (for Browser-AX) or a mark number (from the last
//! screenshot's annotation) are *not* handled here — they need the live
//! Browser-AX session and the last `MarkTable` respectively, neither of
//! which a pure function can see. `nexus-action` dispatches those two
//! target forms directly; this crate only ever fuzzy-matches by name.

use nexus_proto::{Element, Rect, Role, Snapshot};

/// A scored candidate, surfaced in full on failure so the caller can build
/// `StatusError.context.candidates` (spec §7: "include up to 5 top
/// candidates").
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
	pub id: String,
	pub name: String,
	pub role: Role,
	pub score: f64,
}

/// Score margin above which the top candidate is accepted outright
/// without needing a center-distance tie-break (spec §4.8 step 4).
const ACCEPT_MARGIN: f64 = 0.15;
/// Minimum score for any candidate to be considered a match at all
/// (spec §4.8 step 4).
const MIN_SCORE: f64 = 0.45;
/// Added when the target asked for the candidate's own role, which by
/// construction every surviving candidate already has (step 1 filters by
/// role first) — the bonus only matters for ordering against itself under
/// `index`, so it's a fixed constant, not configurable (spec §4.8 step 2
/// leaves its magnitude unspecified).
const ROLE_BONUS: f64 = 0.1;

fn name_score(candidate: &str, query: &str) -> f64 {
	if candidate.eq_ignore_ascii_case(query) {
		return 1.0;
	}
	let candidate_lower = candidate.to_lowercase();
	let query_lower = query.to_lowercase();

	let jaro_winkler = strsim::jaro_winkler(&candidate_lower, &query_lower);

	let substring = if candidate_lower.contains(&query_lower) {
		let len_diff = (candidate.chars().count() as f64 - query.chars().count() as f64).abs();
		let max_len = candidate.chars().count().max(query.chars().count()).max(1) as f64;
		1.0 - len_diff / max_len
	} else {
		0.0
	};

	jaro_winkler.max(substring)
}

fn score_candidates<'a>(elements: &'a [Element], name: &str, role: Option<Role>) -> Vec<(&'a Element, f64)> {
	elements
		.iter()
		.filter(|e| role.is_none_or(|r| e.role == r))
		.map(|e| {
			let score = name_score(&e.name, name) + if role.is_some() { ROLE_BONUS } else { 0.0 };
			(e, score)
		})
		.collect()
}

fn distance_to_center(bounds: Rect, window: Rect) -> f64 {
	let (cx, cy) = bounds.center();
	let (wcx, wcy) = window.center();
	(f64::from(cx - wcx).powi(2) + f64::from(cy - wcy).powi(2)).sqrt()
}

/// What [`resolve_name`] returns on failure: not enough signal to pick one
/// element (spec §7 `ambiguous_or_not_found`).
#[derive(Debug, Clone, PartialEq)]
pub struct Unresolved {
	pub candidates: Vec<Candidate>,
}

/// Implements spec §4.8's name-match algorithm.
///
/// # Errors
/// Returns [`Unresolved`] (carrying up to 5 top-scored candidates) when no
/// candidate reaches [`MIN_SCORE`], or when `index` is out of range.
pub fn resolve_name<'a>(
	snapshot: &'a Snapshot,
	name: &str,
	role: Option<Role>,
	index: Option<u32>,
	window: Rect,
) -> Result<&'a Element, Unresolved> {
	let mut scored = score_candidates(&snapshot.elements, name, role);
	scored.sort_by(|a, b| b.1.total_cmp(&a.1));

	let to_unresolved = |scored: &[(&'a Element, f64)]| Unresolved {
		candidates: scored
			.iter()
			.take(5)
			.map(|(e, score)| Candidate { id: e.id.clone(), name: e.name.clone(), role: e.role, score: *score })
			.collect(),
	};

	if let Some(index) = index {
		let idx = index.checked_sub(1).ok_or_else(|| to_unresolved(&scored))? as usize;
		return scored.get(idx).map(|(e, _)| *e).ok_or_else(|| to_unresolved(&scored));
	}

	let Some(&(top, top_score)) = scored.first() else {
		return Err(to_unresolved(&scored));
	};
	if top_score < MIN_SCORE {
		return Err(to_unresolved(&scored));
	}

	// An unambiguous case-insensitive exact name match always wins, even
	// if a longer fuzzy-matched name sits within the acceptance margin
	// (spec §4.8 step 4: "Save" beats "Save As" regardless of which one
	// happens to sit closer to the window center).
	let exact: Vec<&'a Element> = scored.iter().filter(|(e, _)| e.name.eq_ignore_ascii_case(name)).map(|(e, _)| *e).collect();
	if exact.len() == 1 {
		return Ok(exact[0]);
	}

	let second_score = scored.get(1).map_or(f64::NEG_INFINITY, |(_, s)| *s);
	if top_score - second_score >= ACCEPT_MARGIN {
		return Ok(top);
	}

	// Tied within the margin: among the tied set, prefer the one closest
	// to screen center (spec §4.8 step 4).
	let tied = scored.iter().take_while(|(_, s)| top_score - *s < ACCEPT_MARGIN);
	Ok(tied
		.min_by(|(a, _), (b, _)| {
			distance_to_center(a.bounds, window).total_cmp(&distance_to_center(b.bounds, window))
		})
		.map(|(e, _)| *e)
		.unwrap_or(top))
}

#[cfg(test)]
mod tests {
	use super::*;
	use nexus_proto::{Backend, ElementFlags, WindowKey};

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
			window_key: WindowKey { window_title: "App".into(), process_id: 1, backend: Backend::NativeAx },
			captured_at: 0,
			fingerprint: 0,
			elements,
			diagnostic: None,
		}
	}

	fn window() -> Rect {
		Rect { x: 0, y: 0, w: 800, h: 600 }
	}

	#[test]
	fn exact_match_wins_outright() {
		let snapshot = snap(vec![el("ax_0", "Save", Role::Button, 10, 10), el("ax_1", "Save As", Role::Button, 100, 10)]);
		let found = resolve_name(&snapshot, "Save", None, None, window()).unwrap();
		assert_eq!(found.id, "ax_0");
	}

	#[test]
	fn role_filter_excludes_other_roles() {
		let snapshot = snap(vec![el("ax_0", "Save", Role::Link, 10, 10), el("ax_1", "Save", Role::Button, 10, 10)]);
		let found = resolve_name(&snapshot, "Save", Some(Role::Button), None, window()).unwrap();
		assert_eq!(found.id, "ax_1");
	}

	#[test]
	fn below_threshold_is_unresolved() {
		let snapshot = snap(vec![el("ax_0", "Zzzz Completely Unrelated", Role::Button, 10, 10)]);
		let err = resolve_name(&snapshot, "Save", None, None, window()).unwrap_err();
		assert!(!err.candidates.is_empty());
	}

	#[test]
	fn index_selects_nth_ranked_candidate() {
		let snapshot = snap(vec![el("ax_0", "Save", Role::Button, 10, 10), el("ax_1", "Save", Role::Button, 100, 10)]);
		let found = resolve_name(&snapshot, "Save", None, Some(2), window()).unwrap();
		assert_eq!(found.id, "ax_1");
	}

	#[test]
	fn tie_breaks_by_distance_to_window_center() {
		let snapshot = snap(vec![
			el("ax_far", "Save", Role::Button, 0, 0),
			el("ax_near", "Save", Role::Button, 390, 290),
		]);
		let found = resolve_name(&snapshot, "Save", None, None, window()).unwrap();
		assert_eq!(found.id, "ax_near");
	}

	#[test]
	fn candidates_are_capped_at_five() {
		let elements: Vec<Element> = (0..10).map(|i| el(&format!("ax_{i}"), "Unrelated label", Role::Button, i, i)).collect();
		let err = resolve_name(&snap(elements), "Save", None, None, window()).unwrap_err();
		assert!(err.candidates.len() <= 5);
	}
}
