//! Mark Registry: numbering interactable elements and resolving `#N` back
//! to an element id (spec §4.7).

use nexus_proto::{Element, FocusPreset, Mark, MarkTable, Rect, Role, Snapshot};

use crate::filter::Filter;

/// RGB color, deterministically derived from role, used for the badge fill
/// (spec §4.7: "readable contrast").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub u8, pub u8, pub u8);

/// One badge to overlay on the annotated screenshot: its mark number, the
/// anchor point the badge is drawn at, and its fill color. Never occludes
/// the element's own text anchor (spec §4.7) — the anchor is offset
/// slightly inside the element's top-left corner, and stacked badges get a
/// small additional y offset rather than being dropped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Badge {
	pub number: u32,
	pub anchor: (i32, i32),
	pub color: Color,
}

const BADGE_INSET_PX: i32 = 4;
const BADGE_STACK_OFFSET_PX: i32 = 14;

fn role_color(role: Role) -> Color {
	match role {
		Role::Button => Color(66, 135, 245),
		Role::Edit => Color(52, 168, 83),
		Role::Link => Color(154, 82, 255),
		Role::MenuItem => Color(251, 140, 0),
		Role::CheckBox | Role::RadioButton => Color(0, 172, 193),
		Role::ComboBox => Color(255, 193, 7),
		Role::Tab => Color(233, 30, 99),
		Role::List | Role::ListItem | Role::TreeItem => Color(121, 85, 72),
		Role::Dialog => Color(244, 67, 54),
		Role::Window => Color(96, 125, 139),
		Role::StaticText | Role::Heading => Color(117, 117, 117),
		Role::Group => Color(158, 158, 158),
		Role::Other => Color(189, 189, 189),
	}
}

fn badge_anchor(bounds: Rect, stack_index: usize) -> (i32, i32) {
	#[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
	let offset = BADGE_STACK_OFFSET_PX * stack_index as i32;
	(bounds.x + BADGE_INSET_PX, bounds.y + BADGE_INSET_PX + offset)
}

/// Numbers the snapshot's interactable elements in reading order, producing
/// the [`MarkTable`] and the badge layout for the annotated screenshot.
/// Badges whose anchors collide (same rounded point) are stacked with a
/// small y offset rather than dropped (spec §4.7).
#[must_use]
pub fn annotate(snapshot: &Snapshot) -> (MarkTable, Vec<Badge>) {
	let interactive = Filter::new().with_preset(FocusPreset::Interactive);
	let targets = interactive.apply(&snapshot.elements, window_bounds(snapshot));

	let mut table = MarkTable::new(snapshot.window_key.window_title.clone(), snapshot.fingerprint);
	let mut badges = Vec::with_capacity(targets.len());
	let mut anchor_counts: Vec<(i32, i32, usize)> = Vec::new();

	for (i, element) in targets.into_iter().enumerate() {
		#[allow(clippy::cast_possible_truncation)]
		let number = (i + 1) as u32;
		let point = element.bounds.center();

		let rounded = (element.bounds.x / BADGE_STACK_OFFSET_PX, element.bounds.y / BADGE_STACK_OFFSET_PX);
		let stack_index = anchor_counts
			.iter_mut()
			.find(|(x, y, _)| (*x, *y) == rounded)
			.map(|(_, _, count)| {
				*count += 1;
				*count - 1
			})
			.unwrap_or_else(|| {
				anchor_counts.push((rounded.0, rounded.1, 1));
				0
			});

		table.marks.insert(number, Mark { number, element_id: element.id.clone(), point });
		badges.push(Badge {
			number,
			anchor: badge_anchor(element.bounds, stack_index),
			color: role_color(element.role),
		});
	}

	(table, badges)
}

/// Uses only the last [`MarkTable`]; never back-searches prior tables
/// (spec §4.7 fail-fast rule — a stale number after re-annotation simply
/// resolves to nothing).
#[must_use]
pub fn resolve<'a>(table: &MarkTable, number: u32, snapshot: &'a Snapshot) -> Option<&'a Element> {
	let mark = table.resolve(number)?;
	snapshot.element_by_id(&mark.element_id)
}

fn window_bounds(snapshot: &Snapshot) -> Rect {
	snapshot.elements.iter().find(|e| e.role == Role::Window).map_or_else(
		|| {
			let max_x = snapshot.elements.iter().map(|e| e.bounds.x + e.bounds.w).max().unwrap_or(0);
			let max_y = snapshot.elements.iter().map(|e| e.bounds.y + e.bounds.h).max().unwrap_or(0);
			Rect { x: 0, y: 0, w: max_x, h: max_y }
		},
		|w| w.bounds,
	)
}

#[cfg(test)]
mod tests {
	use super::*;
	use nexus_proto::{Backend, ElementFlags, WindowKey};

	fn el(id: &str, role: Role, name: &str, x: i32, y: i32) -> Element {
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

	fn snapshot(elements: Vec<Element>) -> Snapshot {
		Snapshot {
			window_key: WindowKey { window_title: "App".into(), process_id: 1, backend: Backend::NativeAx },
			captured_at: 0,
			fingerprint: 7,
			elements,
			diagnostic: None,
		}
	}

	#[test]
	fn numbers_only_interactive_elements_in_reading_order() {
		let snap = snapshot(vec![
			el("ax_0", Role::StaticText, "Header", 0, 0),
			el("ax_1", Role::Button, "Save", 10, 200),
			el("ax_2", Role::Edit, "Name", 10, 50),
		]);
		let (table, badges) = annotate(&snap);
		assert_eq!(table.len(), 2);
		assert_eq!(badges.len(), 2);
		assert_eq!(table.resolve(1).unwrap().element_id, "ax_2");
		assert_eq!(table.resolve(2).unwrap().element_id, "ax_1");
	}

	#[test]
	fn resolve_uses_last_table_only() {
		let snap = snapshot(vec![el("ax_0", Role::Button, "Save", 10, 10)]);
		let (table, _) = annotate(&snap);
		assert_eq!(resolve(&table, 1, &snap).unwrap().id, "ax_0");
		assert!(resolve(&table, 99, &snap).is_none());
	}

	#[test]
	fn stacked_badges_are_offset_not_dropped() {
		let snap = snapshot(vec![
			el("ax_0", Role::Button, "A", 10, 10),
			el("ax_1", Role::Button, "B", 11, 11),
		]);
		let (_, badges) = annotate(&snap);
		assert_eq!(badges.len(), 2);
		assert_ne!(badges[0].anchor, badges[1].anchor);
	}
}
