//! The Action Engine: dispatches the operation vocabulary of spec §4.9
//! (`click`, `double_click`, `right_click`, `type_text`, `press_key_combo`,
//! `scroll`, `move`, `drag`, `click_element`, `click_mark`, `web_click`,
//! `web_input`, `web_navigate`) through the standard execution envelope —
//! pre-step foreground wait, semantic-over-coordinate dispatch, post-step
//! dirty-mark + verify with exponential backoff.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nexus_backends::{
	ActionOutcome, Backend as Adapter, BackendAction, BackendError, BackendQuery, PointerButton, TypeMode,
};
use nexus_core::normalize::{normalize, RoleMap};
use nexus_core::NexusConfig;
use nexus_proto::{Element, MarkTable, RawRef, Rect, Role, Snapshot};
use nexus_resolver::{resolve_name, Unresolved};

/// `type_text` switches to clipboard paste above this length (spec §4.9
/// step 2).
const PASTE_THRESHOLD_CHARS: usize = 200;

/// Resolves a [`nexus_proto::Backend`] kind to its warm session. Lets this
/// crate stay decoupled from `nexus_backends::SessionRegistry`'s locking
/// details; `nexus-daemon` hands in the real registry, tests hand in fixed
/// backend instances.
#[async_trait]
pub trait BackendSource: Send + Sync {
	async fn backend(&self, kind: nexus_proto::Backend) -> Arc<dyn Adapter>;
}

#[async_trait]
impl BackendSource for nexus_backends::SessionRegistry {
	async fn backend(&self, kind: nexus_proto::Backend) -> Arc<dyn Adapter> {
		self.get_or_open(kind).await
	}
}

/// The operation vocabulary the Action Engine exposes (spec §4.9),
/// independent of the wire `Command` enum so this crate doesn't need to
/// know about `describe`/`find`/batch framing.
#[derive(Debug, Clone)]
pub enum ActionSpec {
	Click { x: i32, y: i32 },
	DoubleClick { x: i32, y: i32 },
	RightClick { x: i32, y: i32 },
	Move { x: i32, y: i32 },
	Drag { x: i32, y: i32, to_x: i32, to_y: i32 },
	Scroll { x: Option<i32>, y: Option<i32>, ticks: i32 },
	TypeText { text: String },
	PressKeyCombo { combo: String },
	ClickElement { name: String, role: Option<Role>, index: Option<u32> },
	ClickMark { mark: u32 },
	WebNavigate { url: String },
	WebClick { selector: String },
	WebInput { selector: String, text: String },
}

impl ActionSpec {
	#[must_use]
	pub fn name(&self) -> &'static str {
		match self {
			ActionSpec::Click { .. } => "click",
			ActionSpec::DoubleClick { .. } => "double_click",
			ActionSpec::RightClick { .. } => "right_click",
			ActionSpec::Move { .. } => "move",
			ActionSpec::Drag { .. } => "drag",
			ActionSpec::Scroll { .. } => "scroll",
			ActionSpec::TypeText { .. } => "type_text",
			ActionSpec::PressKeyCombo { .. } => "press_key_combo",
			ActionSpec::ClickElement { .. } => "click_element",
			ActionSpec::ClickMark { .. } => "click_mark",
			ActionSpec::WebNavigate { .. } => "web_navigate",
			ActionSpec::WebClick { .. } => "web_click",
			ActionSpec::WebInput { .. } => "web_input",
		}
	}

	/// Whether this action is ever subject to the verify loop (spec §4.9
	/// step 3: scroll is never verified).
	#[must_use]
	fn is_verifiable(&self) -> bool {
		!matches!(self, ActionSpec::Scroll { .. } | ActionSpec::Move { .. } | ActionSpec::Drag { .. })
	}
}

/// Snapshot-shaped state the engine needs to resolve symbolic targets and
/// judge verification (spec §4.8 resolver inputs, §4.7 mark table, §4.9
/// verify predicates). Supplied fresh by the caller (`nexus-daemon`) for
/// every request; this crate never caches it.
pub struct ActionContext<'a> {
	pub snapshot: &'a Snapshot,
	/// `Element.id -> RawRef` side table produced alongside `snapshot` by
	/// the Normalizer (spec §3: `raw_ref` never rides on `Element` itself).
	pub raw_refs: &'a HashMap<String, RawRef>,
	pub window_bounds: Rect,
	pub mark_table: Option<&'a MarkTable>,
	pub config: &'a NexusConfig,
	pub verify: bool,
	/// Scoping app for the pre-step foreground check (`app` request field,
	/// spec §4.9 step 1). `None` skips the foreground wait entirely.
	pub app_scope: Option<String>,
}

/// Result of one [`ActionEngine::execute`] call (spec §4.9 step 4:
/// `{ok, action, target, verified?, changes_summary?, post_state_summary?}`).
#[derive(Debug, Clone)]
pub struct ActionResult {
	pub ok: bool,
	pub action: &'static str,
	pub target: Option<String>,
	pub verified: Option<bool>,
	pub changes_summary: Option<String>,
	pub error: Option<ActionFailure>,
}

/// What went wrong, kept in engine-native terms; `nexus-daemon` maps this
/// onto a `StatusError` with the right `ErrorKind` and context (spec §7).
/// The Healing Supervisor classifies directly off this instead of
/// re-deriving it from a formatted message.
#[derive(Debug, Clone)]
pub enum ActionFailure {
	Resolver(Unresolved),
	MarkNotFound(u32),
	Backend(BackendErrorShape),
	/// Verify predicate did not hold even though the backend reported the
	/// action as performed (spec §4.10: "reports `partial_success`").
	VerifyFailed,
}

/// `BackendError` is not `Clone` (wraps `thiserror` variants with owned
/// `String`s, fine to rebuild), so the engine copies just the shape it
/// needs for classification/reporting.
#[derive(Debug, Clone)]
pub enum BackendErrorShape {
	Unavailable(String),
	WindowNotFocused,
	StaleRawRef,
	Timeout,
	Unsupported(&'static str),
	Internal(String),
}

impl From<&BackendError> for BackendErrorShape {
	fn from(e: &BackendError) -> Self {
		match e {
			BackendError::Unavailable(s) => BackendErrorShape::Unavailable(s.clone()),
			BackendError::WindowNotFocused => BackendErrorShape::WindowNotFocused,
			BackendError::StaleRawRef => BackendErrorShape::StaleRawRef,
			BackendError::Timeout => BackendErrorShape::Timeout,
			BackendError::Unsupported(s) => BackendErrorShape::Unsupported(s),
			BackendError::Internal(s) => BackendErrorShape::Internal(s.clone()),
		}
	}
}

fn backoff_delay(attempt: u32) -> Duration {
	let ms = 200u64.saturating_mul(1u64 << attempt.min(16));
	Duration::from_millis(ms.min(3_000))
}

/// Where the dispatch for `click_element`/`web_click`-shaped targets must
/// go: the backend that produced the element, falling back to a
/// coordinate click on native-ax if that backend has no semantic invoke
/// (spec §4.9 step 2: "fall back to a center-of-bounds pointer click only
/// if the semantic path is unavailable" — OCR/vision sources are always in
/// that fallback case since they are read-only, spec §4.1).
fn supports_semantic_invoke(source: nexus_proto::Backend) -> bool {
	matches!(source, nexus_proto::Backend::NativeAx | nexus_proto::Backend::BrowserAx)
}

/// Drives the execution envelope over a [`BackendSource`]. Stateless
/// itself — all per-request state lives in [`ActionContext`].
pub struct ActionEngine {
	backends: Arc<dyn BackendSource>,
	role_map: RoleMap,
}

impl ActionEngine {
	#[must_use]
	pub fn new(backends: Arc<dyn BackendSource>) -> Self {
		Self { backends, role_map: RoleMap::default() }
	}

	async fn native(&self) -> Arc<dyn Adapter> {
		self.backends.backend(nexus_proto::Backend::NativeAx).await
	}

	async fn browser(&self) -> Arc<dyn Adapter> {
		self.backends.backend(nexus_proto::Backend::BrowserAx).await
	}

	/// Resolves the target element for `click_element`/`click_mark`
	/// (spec §4.8/§4.7), returning both the element and its `raw_ref`.
	fn resolve_target<'a>(
		&self,
		spec: &ActionSpec,
		ctx: &ActionContext<'a>,
	) -> Result<(&'a Element, RawRef), ActionFailure> {
		let element = match spec {
			ActionSpec::ClickElement { name, role, index } => {
				resolve_name(ctx.snapshot, name, *role, *index, ctx.window_bounds).map_err(ActionFailure::Resolver)?
			}
			ActionSpec::ClickMark { mark } => {
				let table = ctx.mark_table.ok_or(ActionFailure::MarkNotFound(*mark))?;
				nexus_core::resolve_mark(table, *mark, ctx.snapshot).ok_or(ActionFailure::MarkNotFound(*mark))?
			}
			_ => unreachable!("resolve_target only called for element/mark targets"),
		};
		let raw_ref = ctx.raw_refs.get(&element.id).copied().unwrap_or_default();
		Ok((element, raw_ref))
	}

	/// Pre-step (spec §4.9 step 1): bring the scoped app to the foreground
	/// and wait up to 300ms. A no-op when `app_scope` is unset.
	async fn bring_to_foreground(&self, ctx: &ActionContext<'_>) -> Result<(), BackendError> {
		let Some(app_name) = ctx.app_scope.clone() else {
			return Ok(());
		};
		let native = self.native().await;
		native.perform(BackendAction::BringToForeground { app_name: Some(app_name) }).await?;
		tokio::time::sleep(Duration::from_millis(300)).await;
		Ok(())
	}

	async fn dispatch(&self, spec: &ActionSpec, ctx: &ActionContext<'_>) -> Result<(ActionOutcome, Option<String>), ActionFailure> {
		let to_backend_err = |e: BackendError| ActionFailure::Backend(BackendErrorShape::from(&e));

		match spec {
			ActionSpec::Click { x, y } => {
				let native = self.native().await;
				let outcome = native
					.perform(BackendAction::PointerClick { x: *x, y: *y, button: PointerButton::Left, double: false })
					.await
					.map_err(to_backend_err)?;
				Ok((outcome, None))
			}
			ActionSpec::DoubleClick { x, y } => {
				let native = self.native().await;
				let outcome = native
					.perform(BackendAction::PointerClick { x: *x, y: *y, button: PointerButton::Left, double: true })
					.await
					.map_err(to_backend_err)?;
				Ok((outcome, None))
			}
			ActionSpec::RightClick { x, y } => {
				let native = self.native().await;
				let outcome = native
					.perform(BackendAction::PointerClick { x: *x, y: *y, button: PointerButton::Right, double: false })
					.await
					.map_err(to_backend_err)?;
				Ok((outcome, None))
			}
			ActionSpec::Move { x, y } => {
				let native = self.native().await;
				let outcome = native.perform(BackendAction::PointerMove { x: *x, y: *y }).await.map_err(to_backend_err)?;
				Ok((outcome, None))
			}
			ActionSpec::Drag { x, y, to_x, to_y } => {
				let native = self.native().await;
				let outcome = native
					.perform(BackendAction::PointerDrag { x: *x, y: *y, to_x: *to_x, to_y: *to_y })
					.await
					.map_err(to_backend_err)?;
				Ok((outcome, None))
			}
			ActionSpec::Scroll { x, y, ticks } => {
				let native = self.native().await;
				let outcome = native.perform(BackendAction::Scroll { x: *x, y: *y, ticks: *ticks }).await.map_err(to_backend_err)?;
				Ok((outcome, None))
			}
			ActionSpec::PressKeyCombo { combo } => {
				let native = self.native().await;
				let outcome =
					native.perform(BackendAction::PressKeyCombo { combo: combo.clone() }).await.map_err(to_backend_err)?;
				Ok((outcome, None))
			}
			ActionSpec::TypeText { text } => {
				let focused = ctx.snapshot.focused_element().ok_or_else(|| {
					ActionFailure::Backend(BackendErrorShape::Internal("no focused element to type into".into()))
				})?;
				let raw_ref = ctx.raw_refs.get(&focused.id).copied().unwrap_or_default();
				let mode = if text.chars().count() > PASTE_THRESHOLD_CHARS { TypeMode::Paste } else { TypeMode::Keystroke };
				let backend = self.backend_for_source(focused.source).await;
				let outcome = backend
					.perform(BackendAction::SetValue { raw_ref, value: text.clone(), mode })
					.await
					.map_err(to_backend_err)?;
				Ok((outcome, Some(focused.id.clone())))
			}
			ActionSpec::ClickElement { .. } | ActionSpec::ClickMark { .. } => {
				let (element, raw_ref) = self.resolve_target(spec, ctx)?;
				let outcome = if supports_semantic_invoke(element.source) {
					let backend = self.backend_for_source(element.source).await;
					backend.perform(BackendAction::Invoke { raw_ref }).await.map_err(to_backend_err)?
				} else {
					let (cx, cy) = element.bounds.center();
					let native = self.native().await;
					native
						.perform(BackendAction::PointerClick { x: cx, y: cy, button: PointerButton::Left, double: false })
						.await
						.map_err(to_backend_err)?
				};
				Ok((outcome, Some(element.id.clone())))
			}
			ActionSpec::WebNavigate { url } => {
				let browser = self.browser().await;
				let outcome = browser.perform(BackendAction::WebNavigate { url: url.clone() }).await.map_err(to_backend_err)?;
				Ok((outcome, Some(url.clone())))
			}
			ActionSpec::WebClick { selector } => {
				let browser = self.browser().await;
				let outcome =
					browser.perform(BackendAction::WebClick { selector: selector.clone() }).await.map_err(to_backend_err)?;
				Ok((outcome, Some(selector.clone())))
			}
			ActionSpec::WebInput { selector, text } => {
				let browser = self.browser().await;
				let outcome = browser
					.perform(BackendAction::WebInput { selector: selector.clone(), text: text.clone() })
					.await
					.map_err(to_backend_err)?;
				Ok((outcome, Some(selector.clone())))
			}
		}
	}

	pub(crate) async fn backend_for_source(&self, source: nexus_proto::Backend) -> Arc<dyn Adapter> {
		self.backends.backend(source).await
	}

	/// Re-acquires and normalizes a fresh snapshot from `kind`. Used by the
	/// verify loop here and by the Healing Supervisor's re-resolve /
	/// re-poll steps. `query` is the bare default — verification only
	/// needs to see bounds/focus/value, not a depth-limited walk.
	pub(crate) async fn reacquire_normalized(&self, kind: nexus_proto::Backend) -> Result<nexus_core::normalize::Normalized, BackendError> {
		let backend = self.backend_for_source(kind).await;
		let graph = backend.acquire(&BackendQuery::default()).await?;
		Ok(normalize(&graph, &self.role_map))
	}

	async fn reacquire(&self, kind: nexus_proto::Backend) -> Result<Vec<Element>, BackendError> {
		Ok(self.reacquire_normalized(kind).await?.elements)
	}

	fn verify_predicate(spec: &ActionSpec, before: &Snapshot, after: &[Element], target_id: Option<&str>) -> bool {
		match spec {
			ActionSpec::ClickElement { .. } | ActionSpec::ClickMark { .. } => {
				let Some(id) = target_id else { return false };
				let was_focused = before.element_by_id(id).is_some_and(Element::is_focused);
				let still_present = after.iter().any(|e| e.id == id);
				let now_focused = after.iter().find(|e| e.id == id).is_some_and(Element::is_focused);
				let appeared_new = after.len() != before.elements.len();
				(was_focused && !now_focused) || !still_present || appeared_new
			}
			ActionSpec::TypeText { text } => {
				let Some(id) = target_id else { return false };
				after.iter().find(|e| e.id == id).and_then(|e| e.value.as_deref()).is_some_and(|v| v.contains(text.as_str()))
			}
			ActionSpec::WebNavigate { url } => after.first().map(|e| e.name.as_str()) == Some(url.as_str()),
			_ => true,
		}
	}

	/// Runs the full envelope for `spec` (spec §4.9 steps 1-4).
	pub async fn execute(&self, spec: ActionSpec, ctx: &ActionContext<'_>) -> ActionResult {
		if let Err(e) = self.bring_to_foreground(ctx).await {
			return ActionResult {
				ok: false,
				action: spec.name(),
				target: None,
				verified: None,
				changes_summary: None,
				error: Some(ActionFailure::Backend(BackendErrorShape::from(&e))),
			};
		}

		let dispatched = self.dispatch(&spec, ctx).await;
		let (outcome, target) = match dispatched {
			Ok(v) => v,
			Err(failure) => {
				return ActionResult {
					ok: false,
					action: spec.name(),
					target: None,
					verified: None,
					changes_summary: None,
					error: Some(failure),
				};
			}
		};

		if !ctx.verify || !spec.is_verifiable() {
			return ActionResult {
				ok: true,
				action: spec.name(),
				target,
				verified: None,
				changes_summary: outcome.detail,
				error: None,
			};
		}

		let source_kind = match &spec {
			ActionSpec::WebNavigate { .. } | ActionSpec::WebClick { .. } | ActionSpec::WebInput { .. } => {
				nexus_proto::Backend::BrowserAx
			}
			_ => ctx.snapshot.window_key.backend,
		};

		let mut verified = false;
		for attempt in 0..ctx.config.verify_max_attempts {
			tokio::time::sleep(backoff_delay(attempt)).await;
			let Ok(after) = self.reacquire(source_kind).await else { continue };
			if Self::verify_predicate(&spec, ctx.snapshot, &after, target.as_deref()) {
				verified = true;
				break;
			}
		}

		if verified {
			ActionResult { ok: true, action: spec.name(), target, verified: Some(true), changes_summary: outcome.detail, error: None }
		} else {
			ActionResult {
				ok: false,
				action: spec.name(),
				target,
				verified: Some(false),
				changes_summary: outcome.detail,
				error: Some(ActionFailure::VerifyFailed),
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use nexus_backends::{BrowserAxBackend, NativeAxBackend};
	use nexus_proto::{Backend as BackendKind, ElementFlags, WindowKey};

	struct FixtureBackends {
		native: Arc<dyn Adapter>,
		browser: Arc<dyn Adapter>,
	}

	#[async_trait]
	impl BackendSource for FixtureBackends {
		async fn backend(&self, kind: nexus_proto::Backend) -> Arc<dyn Adapter> {
			match kind {
				nexus_proto::Backend::NativeAx => self.native.clone(),
				nexus_proto::Backend::BrowserAx => self.browser.clone(),
				_ => self.native.clone(),
			}
		}
	}

	async fn fixture_engine() -> (ActionEngine, NexusConfig) {
		let native = Arc::new(NativeAxBackend::new());
		native.open().await.unwrap();
		let browser = Arc::new(BrowserAxBackend::new());
		browser.open().await.unwrap();
		let sources: Arc<dyn BackendSource> = Arc::new(FixtureBackends { native, browser });
		(ActionEngine::new(sources), NexusConfig::default())
	}

	fn el(id: &str, role: Role, name: &str, x: i32, y: i32, source: BackendKind) -> Element {
		Element {
			id: id.to_string(),
			role,
			name: name.to_string(),
			value: Some(String::new()),
			bounds: Rect { x, y, w: 80, h: 28 },
			flags: ElementFlags { editable: Some(true), ..ElementFlags::default() },
			parent_name: None,
			source,
		}
	}

	fn snapshot(elements: Vec<Element>) -> Snapshot {
		Snapshot {
			window_key: WindowKey { window_title: "Nexus Demo".into(), process_id: 1, backend: BackendKind::NativeAx },
			captured_at: 0,
			fingerprint: 1,
			elements,
			diagnostic: None,
		}
	}

	fn ctx<'a>(snapshot: &'a Snapshot, raw_refs: &'a HashMap<String, RawRef>, config: &'a NexusConfig, verify: bool) -> ActionContext<'a> {
		ActionContext {
			snapshot,
			raw_refs,
			window_bounds: Rect { x: 0, y: 0, w: 1024, h: 768 },
			mark_table: None,
			config,
			verify,
			app_scope: None,
		}
	}

	#[tokio::test]
	async fn click_element_prefers_semantic_invoke() {
		let (engine, config) = fixture_engine().await;
		let snap = snapshot(vec![el("ax_2", Role::Button, "Save", 20, 700, BackendKind::NativeAx)]);
		let raw_refs = HashMap::from([("ax_2".to_string(), RawRef(2))]);
		let result = engine
			.execute(
				ActionSpec::ClickElement { name: "Save".into(), role: None, index: None },
				&ctx(&snap, &raw_refs, &config, false),
			)
			.await;
		assert!(result.ok);
		assert_eq!(result.target.as_deref(), Some("ax_2"));
		assert!(result.changes_summary.unwrap().contains("focused"));
	}

	#[tokio::test]
	async fn click_element_falls_back_to_pointer_click_for_ocr_source() {
		let (engine, config) = fixture_engine().await;
		let snap = snapshot(vec![el("ocr_0", Role::StaticText, "Retry", 20, 700, BackendKind::Ocr)]);
		let raw_refs = HashMap::new();
		let result = engine
			.execute(
				ActionSpec::ClickElement { name: "Retry".into(), role: None, index: None },
				&ctx(&snap, &raw_refs, &config, false),
			)
			.await;
		assert!(result.ok);
		assert!(result.changes_summary.unwrap().contains("clicked at"));
	}

	#[tokio::test]
	async fn type_text_over_threshold_uses_paste_mode() {
		let (engine, config) = fixture_engine().await;
		let mut search = el("ax_1", Role::Edit, "Search", 20, 20, BackendKind::NativeAx);
		search.flags.focused = Some(true);
		let snap = snapshot(vec![search]);
		let raw_refs = HashMap::from([("ax_1".to_string(), RawRef(1))]);
		let long_text = "x".repeat(201);
		let result = engine
			.execute(ActionSpec::TypeText { text: long_text }, &ctx(&snap, &raw_refs, &config, false))
			.await;
		assert!(result.ok);
		assert!(result.changes_summary.unwrap().contains("Paste"));
	}

	#[tokio::test]
	async fn click_element_unresolved_returns_resolver_failure() {
		let (engine, config) = fixture_engine().await;
		let snap = snapshot(vec![el("ax_0", Role::Button, "Totally Unrelated", 0, 0, BackendKind::NativeAx)]);
		let raw_refs = HashMap::new();
		let result = engine
			.execute(
				ActionSpec::ClickElement { name: "Save".into(), role: None, index: None },
				&ctx(&snap, &raw_refs, &config, false),
			)
			.await;
		assert!(!result.ok);
		assert!(matches!(result.error, Some(ActionFailure::Resolver(_))));
	}

	#[tokio::test(start_paused = true)]
	async fn verify_succeeds_once_focus_changes_are_observed() {
		let (engine, mut config) = fixture_engine().await;
		config.verify_max_attempts = 3;
		let snap = snapshot(vec![el("ax_2", Role::Button, "Save", 20, 700, BackendKind::NativeAx)]);
		let raw_refs = HashMap::from([("ax_2".to_string(), RawRef(2))]);
		let result = engine
			.execute(
				ActionSpec::ClickElement { name: "Save".into(), role: None, index: None },
				&ctx(&snap, &raw_refs, &config, true),
			)
			.await;
		assert!(result.ok);
		assert_eq!(result.verified, Some(true));
	}

	#[tokio::test(start_paused = true)]
	async fn scroll_is_never_verified() {
		let (engine, mut config) = fixture_engine().await;
		config.verify_max_attempts = 1;
		let snap = snapshot(vec![]);
		let raw_refs = HashMap::new();
		let result = engine
			.execute(ActionSpec::Scroll { x: None, y: None, ticks: 3 }, &ctx(&snap, &raw_refs, &config, true))
			.await;
		assert!(result.ok);
		assert_eq!(result.verified, None);
	}
}
