//! In-process deterministic reference implementation of the Native-AX
//! backend (spec §4.1, SPEC_FULL.md §13): walks a fixed, mutable
//! accessibility-tree fixture instead of a live OS tree, so `acquire` and
//! `perform` are fully exercisable in tests without a real desktop.
//!
//! Also serves as the screen-level pointer/keyboard dispatch surface for
//! the Action Engine: `click`/`move`/`drag`/`scroll`/`press_key_combo` are
//! OS-level operations with no browser/OCR/vision equivalent, so they
//! always route here regardless of which backend produced the target
//! element.

use async_trait::async_trait;
use nexus_proto::{RawGraph, RawNode, RawRef};
use parking_lot::Mutex;

use crate::backend::{ActionOutcome, Backend, BackendAction, BackendError, BackendHealth, BackendQuery};

#[derive(Debug, Clone)]
struct Node {
	raw_ref: RawRef,
	role_hint: String,
	name: Option<String>,
	value: Option<String>,
	bounds: nexus_proto::Rect,
	enabled: bool,
	focused: bool,
	editable: bool,
	children: Vec<Node>,
}

fn fixture_tree() -> Node {
	Node {
		raw_ref: RawRef(0),
		role_hint: "window".into(),
		name: Some("Nexus Demo".into()),
		value: None,
		bounds: nexus_proto::Rect { x: 0, y: 0, w: 1024, h: 768 },
		enabled: true,
		focused: false,
		editable: false,
		children: vec![
			Node {
				raw_ref: RawRef(1),
				role_hint: "edit".into(),
				name: Some("Search".into()),
				value: Some(String::new()),
				bounds: nexus_proto::Rect { x: 20, y: 20, w: 300, h: 28 },
				enabled: true,
				focused: false,
				editable: true,
				children: vec![],
			},
			Node {
				raw_ref: RawRef(2),
				role_hint: "button".into(),
				name: Some("Save".into()),
				value: None,
				bounds: nexus_proto::Rect { x: 20, y: 700, w: 80, h: 28 },
				enabled: true,
				focused: false,
				editable: false,
				children: vec![],
			},
			Node {
				raw_ref: RawRef(3),
				role_hint: "button".into(),
				name: Some("Cancel".into()),
				value: None,
				bounds: nexus_proto::Rect { x: 110, y: 700, w: 80, h: 28 },
				enabled: true,
				focused: false,
				editable: false,
				children: vec![],
			},
		],
	}
}

fn depth_truncate(node: &Node, remaining_depth: u32) -> Node {
	Node {
		children: if remaining_depth == 0 {
			Vec::new()
		} else {
			node.children.iter().map(|c| depth_truncate(c, remaining_depth - 1)).collect()
		},
		..node.clone()
	}
}

fn to_raw_node(node: &Node) -> RawNode {
	RawNode {
		role_hint: node.role_hint.clone(),
		name: node.name.clone(),
		value: node.value.clone(),
		bounds: Some(node.bounds),
		enabled: Some(node.enabled),
		focused: Some(node.focused),
		visible: Some(true),
		editable: Some(node.editable),
		raw_ref: node.raw_ref,
		children: node.children.iter().map(to_raw_node).collect(),
	}
}

fn find_mut<'a>(node: &'a mut Node, raw_ref: RawRef) -> Option<&'a mut Node> {
	if node.raw_ref == raw_ref {
		return Some(node);
	}
	node.children.iter_mut().find_map(|c| find_mut(c, raw_ref))
}

fn clear_focus(node: &mut Node) {
	node.focused = false;
	for child in &mut node.children {
		clear_focus(child);
	}
}

fn hit_test<'a>(node: &'a Node, x: i32, y: i32) -> Option<&'a Node> {
	// Topmost = smallest-area match among the node and its descendants.
	let mut best: Option<&Node> = None;
	let mut stack = vec![node];
	while let Some(n) = stack.pop() {
		let b = n.bounds;
		if x >= b.x && x < b.x + b.w && y >= b.y && y < b.y + b.h {
			let smaller = best.is_none_or(|cur| (b.w as i64 * b.h as i64) < (cur.bounds.w as i64 * cur.bounds.h as i64));
			if smaller {
				best = Some(n);
			}
		}
		stack.extend(n.children.iter());
	}
	best
}

/// The reference Native-AX adapter. Holds the fixture tree behind a
/// `Mutex` rather than `tokio::sync::Mutex` since no lock is ever held
/// across an `.await` point (every mutation here is synchronous).
pub struct NativeAxBackend {
	state: Mutex<Node>,
	open: Mutex<bool>,
}

impl NativeAxBackend {
	#[must_use]
	pub fn new() -> Self {
		Self { state: Mutex::new(fixture_tree()), open: Mutex::new(false) }
	}
}

impl Default for NativeAxBackend {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl Backend for NativeAxBackend {
	fn kind(&self) -> nexus_proto::Backend {
		nexus_proto::Backend::NativeAx
	}

	async fn open(&self) -> Result<(), BackendError> {
		*self.open.lock() = true;
		Ok(())
	}

	async fn close(&self) -> Result<(), BackendError> {
		*self.open.lock() = false;
		Ok(())
	}

	async fn health(&self) -> BackendHealth {
		if *self.open.lock() { BackendHealth::Healthy } else { BackendHealth::Down }
	}

	async fn acquire(&self, query: &BackendQuery) -> Result<RawGraph, BackendError> {
		if !*self.open.lock() {
			return Err(BackendError::Unavailable("native-ax session not open".into()));
		}
		let depth = if query.max_depth == 0 { u32::MAX } else { query.max_depth };
		let root = depth_truncate(&self.state.lock(), depth);
		Ok(RawGraph { backend: self.kind(), root: to_raw_node(&root) })
	}

	async fn fingerprint(&self, _query: &BackendQuery) -> Result<u64, BackendError> {
		use std::hash::{Hash, Hasher};
		let state = self.state.lock();
		let mut hasher = rustc_hash::FxHasher::default();
		fn hash_node(node: &Node, hasher: &mut rustc_hash::FxHasher) {
			node.name.hash(hasher);
			node.value.hash(hasher);
			node.focused.hash(hasher);
			for c in &node.children {
				hash_node(c, hasher);
			}
		}
		hash_node(&state, &mut hasher);
		Ok(hasher.finish())
	}

	async fn perform(&self, action: BackendAction) -> Result<ActionOutcome, BackendError> {
		match action {
			BackendAction::BringToForeground { app_name } => {
				// Single fixed window, so there is never a stacking order
				// to change; always succeeds.
				Ok(ActionOutcome::ok(format!(
					"foregrounded {}",
					app_name.unwrap_or_else(|| "Nexus Demo".into())
				)))
			}
			BackendAction::Invoke { raw_ref } | BackendAction::Focus { raw_ref } => {
				let mut root = self.state.lock();
				clear_focus(&mut root);
				let node = find_mut(&mut root, raw_ref).ok_or(BackendError::StaleRawRef)?;
				node.focused = true;
				Ok(ActionOutcome::ok(format!("focused {}", node.name.clone().unwrap_or_default())))
			}
			BackendAction::SetValue { raw_ref, value, mode } => {
				let mut root = self.state.lock();
				clear_focus(&mut root);
				let node = find_mut(&mut root, raw_ref).ok_or(BackendError::StaleRawRef)?;
				if !node.editable {
					return Err(BackendError::Unsupported("target is not editable"));
				}
				node.value = Some(value);
				node.focused = true;
				Ok(ActionOutcome::ok(format!("set value via {mode:?}")))
			}
			BackendAction::PressKeyCombo { combo } => Ok(ActionOutcome::ok(format!("pressed {combo}"))),
			BackendAction::PointerClick { x, y, double, .. } => {
				let mut root = self.state.lock();
				clear_focus(&mut root);
				let hit = hit_test(&root, x, y).map(|n| (n.raw_ref, n.name.clone()));
				let hit_name = if let Some((hit_ref, name)) = hit {
					if let Some(node) = find_mut(&mut root, hit_ref) {
						node.focused = true;
					}
					name
				} else {
					None
				};
				Ok(ActionOutcome::ok(format!(
					"{} clicked at ({x},{y}){}",
					if double { "double" } else { "single" },
					hit_name.map(|n| format!(" on {n}")).unwrap_or_default()
				)))
			}
			BackendAction::PointerMove { x, y } => Ok(ActionOutcome::ok(format!("moved to ({x},{y})"))),
			BackendAction::PointerDrag { x, y, to_x, to_y } => {
				Ok(ActionOutcome::ok(format!("dragged ({x},{y}) -> ({to_x},{to_y})")))
			}
			BackendAction::Scroll { ticks, .. } => Ok(ActionOutcome::ok(format!("scrolled {ticks} ticks"))),
			BackendAction::WebNavigate { .. } | BackendAction::WebClick { .. } | BackendAction::WebInput { .. } => {
				Err(BackendError::Unsupported("native-ax"))
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn acquire_requires_open_session() {
		let backend = NativeAxBackend::new();
		let err = backend.acquire(&BackendQuery::default()).await.unwrap_err();
		assert!(matches!(err, BackendError::Unavailable(_)));
	}

	#[tokio::test]
	async fn acquire_respects_max_depth() {
		let backend = NativeAxBackend::new();
		backend.open().await.unwrap();
		let graph = backend.acquire(&BackendQuery { max_depth: 1, ..Default::default() }).await.unwrap();
		assert!(graph.root.children.iter().all(|c| c.children.is_empty()));
		assert_eq!(graph.root.children.len(), 3);
	}

	#[tokio::test]
	async fn set_value_requires_editable_target() {
		let backend = NativeAxBackend::new();
		backend.open().await.unwrap();
		let err = backend
			.perform(BackendAction::SetValue { raw_ref: RawRef(2), value: "x".into(), mode: crate::backend::TypeMode::Keystroke })
			.await
			.unwrap_err();
		assert!(matches!(err, BackendError::Unsupported(_)));
	}

	#[tokio::test]
	async fn set_value_on_edit_updates_and_focuses() {
		let backend = NativeAxBackend::new();
		backend.open().await.unwrap();
		backend
			.perform(BackendAction::SetValue { raw_ref: RawRef(1), value: "hello".into(), mode: crate::backend::TypeMode::Keystroke })
			.await
			.unwrap();
		let graph = backend.acquire(&BackendQuery { max_depth: 2, ..Default::default() }).await.unwrap();
		let edit = graph.root.children.iter().find(|c| c.raw_ref == RawRef(1)).unwrap();
		assert_eq!(edit.value.as_deref(), Some("hello"));
		assert_eq!(edit.focused, Some(true));
	}

	#[tokio::test]
	async fn pointer_click_focuses_topmost_hit() {
		let backend = NativeAxBackend::new();
		backend.open().await.unwrap();
		backend
			.perform(BackendAction::PointerClick { x: 30, y: 710, button: crate::backend::PointerButton::Left, double: false })
			.await
			.unwrap();
		let graph = backend.acquire(&BackendQuery { max_depth: 2, ..Default::default() }).await.unwrap();
		let save = graph.root.children.iter().find(|c| c.raw_ref == RawRef(2)).unwrap();
		assert_eq!(save.focused, Some(true));
	}
}
