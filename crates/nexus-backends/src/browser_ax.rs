//! In-process deterministic reference implementation of the Browser-AX
//! backend (spec §4.1, SPEC_FULL.md §13): stands in for a DevTools-style
//! session against a fixed document instead of a real browser tab.

use async_trait::async_trait;
use nexus_proto::{RawGraph, RawNode, RawRef, Rect};
use parking_lot::Mutex;

use crate::backend::{ActionOutcome, Backend, BackendAction, BackendError, BackendHealth, BackendQuery};

#[derive(Debug, Clone)]
struct Elem {
	raw_ref: RawRef,
	selector: String,
	role_hint: String,
	name: String,
	value: Option<String>,
	bounds: Rect,
}

struct Tab {
	url: String,
	elements: Vec<Elem>,
}

fn fixture_tab() -> Tab {
	Tab {
		url: "https://example.invalid/start".into(),
		elements: vec![
			Elem {
				raw_ref: RawRef(100),
				selector: "#search".into(),
				role_hint: "textbox".into(),
				name: "Search the page".into(),
				value: Some(String::new()),
				bounds: Rect { x: 40, y: 10, w: 320, h: 30 },
			},
			Elem {
				raw_ref: RawRef(101),
				selector: "a.read-more".into(),
				role_hint: "link".into(),
				name: "Read more".into(),
				value: None,
				bounds: Rect { x: 40, y: 400, w: 100, h: 20 },
			},
		],
	}
}

/// The reference Browser-AX adapter.
pub struct BrowserAxBackend {
	tab: Mutex<Tab>,
	open: Mutex<bool>,
}

impl BrowserAxBackend {
	#[must_use]
	pub fn new() -> Self {
		Self { tab: Mutex::new(fixture_tab()), open: Mutex::new(false) }
	}
}

impl Default for BrowserAxBackend {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl Backend for BrowserAxBackend {
	fn kind(&self) -> nexus_proto::Backend {
		nexus_proto::Backend::BrowserAx
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

	async fn acquire(&self, _query: &BackendQuery) -> Result<RawGraph, BackendError> {
		if !*self.open.lock() {
			return Err(BackendError::Unavailable("browser-ax session not open".into()));
		}
		let tab = self.tab.lock();
		let children = tab
			.elements
			.iter()
			.map(|e| RawNode {
				role_hint: e.role_hint.clone(),
				name: Some(e.name.clone()),
				value: e.value.clone(),
				bounds: Some(e.bounds),
				enabled: Some(true),
				focused: Some(false),
				visible: Some(true),
				editable: Some(e.role_hint == "textbox"),
				raw_ref: e.raw_ref,
				children: Vec::new(),
			})
			.collect();
		let root = RawNode {
			role_hint: "window".into(),
			name: Some(tab.url.clone()),
			bounds: Some(Rect { x: 0, y: 0, w: 1024, h: 768 }),
			children,
			raw_ref: RawRef(99),
			..Default::default()
		};
		Ok(RawGraph { backend: self.kind(), root })
	}

	async fn fingerprint(&self, _query: &BackendQuery) -> Result<u64, BackendError> {
		use std::hash::{Hash, Hasher};
		let tab = self.tab.lock();
		let mut hasher = rustc_hash::FxHasher::default();
		tab.url.hash(&mut hasher);
		tab.elements.len().hash(&mut hasher);
		Ok(hasher.finish())
	}

	async fn perform(&self, action: BackendAction) -> Result<ActionOutcome, BackendError> {
		match action {
			BackendAction::WebNavigate { url } => {
				self.tab.lock().url = url.clone();
				Ok(ActionOutcome::ok(format!("navigated to {url}")))
			}
			BackendAction::WebClick { selector } => {
				let tab = self.tab.lock();
				if tab.elements.iter().any(|e| e.selector == selector) {
					Ok(ActionOutcome::ok(format!("clicked {selector}")))
				} else {
					Err(BackendError::StaleRawRef)
				}
			}
			BackendAction::WebInput { selector, text } => {
				let mut tab = self.tab.lock();
				let Some(el) = tab.elements.iter_mut().find(|e| e.selector == selector) else {
					return Err(BackendError::StaleRawRef);
				};
				el.value = Some(text.clone());
				Ok(ActionOutcome::ok(format!("typed into {selector}")))
			}
			BackendAction::Invoke { raw_ref } | BackendAction::Focus { raw_ref } => {
				let tab = self.tab.lock();
				tab.elements
					.iter()
					.find(|e| e.raw_ref == raw_ref)
					.map(|e| ActionOutcome::ok(format!("invoked {}", e.name)))
					.ok_or(BackendError::StaleRawRef)
			}
			BackendAction::SetValue { raw_ref, value, .. } => {
				let mut tab = self.tab.lock();
				let Some(el) = tab.elements.iter_mut().find(|e| e.raw_ref == raw_ref) else {
					return Err(BackendError::StaleRawRef);
				};
				el.value = Some(value);
				Ok(ActionOutcome::ok("set value"))
			}
			_ => Err(BackendError::Unsupported("browser-ax")),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn web_navigate_updates_url() {
		let backend = BrowserAxBackend::new();
		backend.open().await.unwrap();
		backend.perform(BackendAction::WebNavigate { url: "https://example.invalid/two".into() }).await.unwrap();
		let graph = backend.acquire(&BackendQuery::default()).await.unwrap();
		assert_eq!(graph.root.name.as_deref(), Some("https://example.invalid/two"));
	}

	#[tokio::test]
	async fn web_click_unknown_selector_is_stale() {
		let backend = BrowserAxBackend::new();
		backend.open().await.unwrap();
		let err = backend.perform(BackendAction::WebClick { selector: "#nope".into() }).await.unwrap_err();
		assert!(matches!(err, BackendError::StaleRawRef));
	}

	#[tokio::test]
	async fn pointer_click_is_unsupported() {
		let backend = BrowserAxBackend::new();
		backend.open().await.unwrap();
		let err = backend
			.perform(BackendAction::PointerClick { x: 0, y: 0, button: crate::backend::PointerButton::Left, double: false })
			.await
			.unwrap_err();
		assert!(matches!(err, BackendError::Unsupported(_)));
	}
}
