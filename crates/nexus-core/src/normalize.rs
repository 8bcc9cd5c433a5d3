//! Pure `RawGraph -> Vec<Element>` conversion (spec §4.2).

use std::collections::HashMap;

use nexus_proto::{Element, ElementFlags, RawGraph, RawNode, RawRef, Rect, Role};
use rustc_hash::FxHashMap;

/// Maps a backend's role vocabulary onto the closed [`Role`] enum. Data,
/// not code, so it can be retargeted for a localized accessibility layer
/// (spec §9: "Localization of role names ... handled by the Normalizer's
/// role map, which is configurable data").
#[derive(Debug, Clone)]
pub struct RoleMap {
	entries: FxHashMap<String, Role>,
}

impl RoleMap {
	/// The built-in map covering the native-AX/browser-AX role strings this
	/// workspace's reference backends (`nexus-backends`) emit.
	#[must_use]
	pub fn default_map() -> Self {
		let pairs: &[(&str, Role)] = &[
			("button", Role::Button),
			("axbutton", Role::Button),
			("edit", Role::Edit),
			("textbox", Role::Edit),
			("textfield", Role::Edit),
			("axtextfield", Role::Edit),
			("link", Role::Link),
			("menuitem", Role::MenuItem),
			("menu_item", Role::MenuItem),
			("checkbox", Role::CheckBox),
			("check_box", Role::CheckBox),
			("radiobutton", Role::RadioButton),
			("radio_button", Role::RadioButton),
			("combobox", Role::ComboBox),
			("combo_box", Role::ComboBox),
			("tab", Role::Tab),
			("list", Role::List),
			("listitem", Role::ListItem),
			("list_item", Role::ListItem),
			("treeitem", Role::TreeItem),
			("tree_item", Role::TreeItem),
			("dialog", Role::Dialog),
			("window", Role::Window),
			("statictext", Role::StaticText),
			("static_text", Role::StaticText),
			("text", Role::StaticText),
			("group", Role::Group),
			("heading", Role::Heading),
			("h1", Role::Heading),
			("h2", Role::Heading),
			("h3", Role::Heading),
		];
		Self {
			entries: pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect(),
		}
	}

	/// Register (or override) a role mapping, e.g. for a localized or
	/// custom backend vocabulary.
	pub fn insert(&mut self, role_hint: impl Into<String>, role: Role) {
		self.entries.insert(role_hint.into().to_lowercase(), role);
	}

	#[must_use]
	pub fn resolve(&self, role_hint: &str) -> Role {
		self.entries
			.get(&role_hint.to_lowercase())
			.copied()
			.unwrap_or(Role::Other)
	}
}

impl Default for RoleMap {
	fn default() -> Self {
		Self::default_map()
	}
}

/// Result of normalization: the reading-ordered element list plus the
/// `Element.id -> RawRef` side table the backend needs to act on elements
/// later (spec §3: `raw_ref` never crosses into `Element` itself).
pub struct Normalized {
	pub elements: Vec<Element>,
	pub raw_refs: HashMap<String, RawRef>,
}

struct Flat {
	node: RawNode,
	parent_name: Option<String>,
}

/// Converts a backend's raw acquisition into the normalized element list
/// (spec §4.2).
///
/// Rules applied, in order:
/// 1. Breadth-first walk, assigning `parent_name` as the nearest named
///    ancestor.
/// 2. Drop nodes with empty bounds, or with no name/value/children unless
///    focusable and editable.
/// 3. Map each role via `role_map`.
/// 4. Assign ids `<backend_tag>_<bfs_index>`.
/// 5. Re-sort into reading order: y-bucketed into ~12px bands, x-ascending
///    within a band.
#[must_use]
pub fn normalize(graph: &RawGraph, role_map: &RoleMap) -> Normalized {
	const BAND_HEIGHT: i32 = 12;

	let mut queue: Vec<Flat> = vec![Flat {
		node: graph.root.clone(),
		parent_name: None,
	}];
	let mut flattened: Vec<Flat> = Vec::new();

	// Breadth-first: root's children are visited before grandchildren.
	let mut i = 0;
	while i < queue.len() {
		let current_parent_name = queue[i]
			.node
			.name
			.clone()
			.filter(|n| !n.is_empty())
			.or_else(|| queue[i].parent_name.clone());

		for child in queue[i].node.children.clone() {
			queue.push(Flat {
				node: child,
				parent_name: current_parent_name.clone(),
			});
		}
		i += 1;
	}
	flattened.extend(queue);

	let mut elements = Vec::with_capacity(flattened.len());
	let mut raw_refs = HashMap::with_capacity(flattened.len());
	let mut bfs_index: u64 = 0;

	for flat in &flattened {
		let node = &flat.node;
		let bounds = node.bounds.unwrap_or(Rect { x: 0, y: 0, w: 0, h: 0 });
		if bounds.is_empty() {
			continue;
		}

		let has_name = node.name.as_deref().is_some_and(|n| !n.is_empty());
		let has_value = node.value.as_deref().is_some_and(|v| !v.is_empty());
		let has_children = !node.children.is_empty();
		let focusable_editable = node.editable == Some(true);
		if !has_name && !has_value && !has_children && !focusable_editable {
			continue;
		}

		let id = format!("{}_{}", graph.backend.tag(), bfs_index);
		bfs_index += 1;

		raw_refs.insert(id.clone(), node.raw_ref);

		elements.push(Element {
			id,
			role: role_map.resolve(&node.role_hint),
			name: node.name.clone().unwrap_or_default(),
			value: node.value.clone(),
			bounds,
			flags: ElementFlags {
				enabled: node.enabled,
				focused: node.focused,
				visible: node.visible,
				editable: node.editable,
			},
			parent_name: flat.parent_name.clone(),
			source: graph.backend,
		});
	}

	elements.sort_by_key(|e| {
		let band = e.bounds.y.div_euclid(BAND_HEIGHT);
		(band, e.bounds.x)
	});

	Normalized { elements, raw_refs }
}

#[cfg(test)]
mod tests {
	use super::*;
	use nexus_proto::Backend;

	fn leaf(role: &str, name: &str, x: i32, y: i32, raw_ref: u64) -> RawNode {
		RawNode {
			role_hint: role.to_string(),
			name: Some(name.to_string()),
			value: None,
			bounds: Some(Rect { x, y, w: 40, h: 20 }),
			enabled: Some(true),
			focused: Some(false),
			visible: Some(true),
			editable: Some(false),
			raw_ref: RawRef(raw_ref),
			children: vec![],
		}
	}

	#[test]
	fn drops_zero_area_and_empty_leaves() {
		let mut empty = leaf("button", "", 0, 0, 1);
		empty.bounds = Some(Rect { x: 0, y: 0, w: 0, h: 0 });
		let mut blank = leaf("group", "", 10, 10, 2);
		blank.name = None;
		let graph = RawGraph {
			backend: Backend::NativeAx,
			root: RawNode {
				role_hint: "window".into(),
				name: Some("Main".into()),
				children: vec![empty, blank],
				bounds: Some(Rect { x: 0, y: 0, w: 800, h: 600 }),
				raw_ref: RawRef(0),
				..Default::default()
			},
		};
		let out = normalize(&graph, &RoleMap::default());
		// Only the root window survives (named, non-empty bounds); both
		// children are dropped (zero-area, and empty-with-no-children).
		assert_eq!(out.elements.len(), 1);
		assert_eq!(out.elements[0].name, "Main");
	}

	#[test]
	fn orders_by_reading_bands() {
		let graph = RawGraph {
			backend: Backend::NativeAx,
			root: RawNode {
				role_hint: "window".into(),
				bounds: Some(Rect { x: 0, y: 0, w: 800, h: 600 }),
				children: vec![
					leaf("button", "Save", 120, 340, 1),
					leaf("edit", "Search", 200, 50, 2),
					leaf("link", "Settings", 50, 400, 3),
				],
				..Default::default()
			},
		};
		let out = normalize(&graph, &RoleMap::default());
		let names: Vec<_> = out.elements.iter().map(|e| e.name.as_str()).collect();
		assert_eq!(names, vec!["Search", "Save", "Settings"]);
	}

	#[test]
	fn assigns_ids_by_backend_tag_and_bfs_order() {
		let graph = RawGraph {
			backend: Backend::BrowserAx,
			root: RawNode {
				role_hint: "window".into(),
				bounds: Some(Rect { x: 0, y: 0, w: 800, h: 600 }),
				children: vec![leaf("button", "A", 0, 0, 10)],
				..Default::default()
			},
		};
		let out = normalize(&graph, &RoleMap::default());
		assert_eq!(out.elements[0].id, "bax_0");
		assert_eq!(out.elements[1].id, "bax_1");
		assert_eq!(out.raw_refs["bax_1"], RawRef(10));
	}

	#[test]
	fn parent_name_is_nearest_named_ancestor() {
		let graph = RawGraph {
			backend: Backend::NativeAx,
			root: RawNode {
				role_hint: "window".into(),
				name: Some("Main".into()),
				bounds: Some(Rect { x: 0, y: 0, w: 800, h: 600 }),
				children: vec![RawNode {
					role_hint: "group".into(),
					name: None,
					bounds: Some(Rect { x: 0, y: 0, w: 800, h: 600 }),
					children: vec![leaf("button", "Save", 0, 0, 1)],
					raw_ref: RawRef(0),
					..Default::default()
				}],
				..Default::default()
			},
		};
		let out = normalize(&graph, &RoleMap::default());
		let save = out.elements.iter().find(|e| e.name == "Save").unwrap();
		assert_eq!(save.parent_name.as_deref(), Some("Main"));
	}
}
