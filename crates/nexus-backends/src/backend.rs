//! The `Backend` trait every adapter implements, and the action/outcome
//! vocabulary the Action Engine dispatches through it (spec §4.1, §4.9).

use async_trait::async_trait;
use nexus_proto::{RawGraph, RawRef, Rect};
use thiserror::Error;

/// Backend-reported failure, mapped onto [`nexus_proto::ErrorKind`] by
/// `nexus-action` at the point the daemon builds a `StatusError`.
#[derive(Debug, Error)]
pub enum BackendError {
	#[error("backend session unavailable: {0}")]
	Unavailable(String),
	#[error("target window is not focused")]
	WindowNotFocused,
	#[error("raw_ref no longer resolves to a live node")]
	StaleRawRef,
	#[error("operation timed out")]
	Timeout,
	#[error("{0} does not support this operation")]
	Unsupported(&'static str),
	#[error("internal backend error: {0}")]
	Internal(String),
}

/// Liveness as reported by `Backend::health` (spec §4.1 lifecycle: a
/// session is torn down after N consecutive health-check failures).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendHealth {
	Healthy,
	Down,
}

/// What to acquire and how deep to walk (spec §4.1: Native-AX respects a
/// max depth; OCR/vision operate over a pixel region).
#[derive(Debug, Clone, Default)]
pub struct BackendQuery {
	/// Named application to target; `None` means "the foreground app".
	pub app_name: Option<String>,
	pub max_depth: u32,
	pub region: Option<Rect>,
}

/// Mouse button for a pointer action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
	Left,
	Right,
}

/// How `type_text` dispatched its input — recorded so the caller can tell
/// which path fired without the verification contract itself branching
/// (SPEC_FULL.md §12 OQ1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeMode {
	Keystroke,
	Paste,
}

/// The operation vocabulary the Action Engine dispatches through a
/// [`Backend`] (spec §4.9). Semantic operations (`Invoke`/`Focus`/
/// `SetValue`) act on a `raw_ref`; pointer/keyboard operations are
/// screen-level and always go through the native-ax backend regardless of
/// which backend produced the target element.
#[derive(Debug, Clone)]
pub enum BackendAction {
	/// Pre-step of the execution envelope (spec §4.9 step 1): bring the
	/// named app's window to the foreground. Only native-ax implements
	/// this; other backends have no OS-level window stacking concept.
	BringToForeground { app_name: Option<String> },
	PointerClick { x: i32, y: i32, button: PointerButton, double: bool },
	PointerMove { x: i32, y: i32 },
	PointerDrag { x: i32, y: i32, to_x: i32, to_y: i32 },
	Scroll { x: Option<i32>, y: Option<i32>, ticks: i32 },
	Invoke { raw_ref: RawRef },
	Focus { raw_ref: RawRef },
	SetValue { raw_ref: RawRef, value: String, mode: TypeMode },
	PressKeyCombo { combo: String },
	WebNavigate { url: String },
	WebClick { selector: String },
	WebInput { selector: String, text: String },
}

/// Result of `perform`: whether the backend actually changed anything it
/// could detect, plus a short human-readable detail for `changes_summary`
/// (spec §4.9 step 4).
#[derive(Debug, Clone)]
pub struct ActionOutcome {
	pub performed: bool,
	pub detail: Option<String>,
}

impl ActionOutcome {
	#[must_use]
	pub fn ok(detail: impl Into<String>) -> Self {
		Self { performed: true, detail: Some(detail.into()) }
	}
}

/// `acquire(query) -> RawGraph`, `perform(action) -> Result`, `health()`,
/// `open()`/`close()` (spec §4.1 contract).
#[async_trait]
pub trait Backend: Send + Sync {
	fn kind(&self) -> nexus_proto::Backend;

	async fn open(&self) -> Result<(), BackendError>;
	async fn close(&self) -> Result<(), BackendError>;
	async fn health(&self) -> BackendHealth;

	async fn acquire(&self, query: &BackendQuery) -> Result<RawGraph, BackendError>;

	/// A cheap probe, cost `<<` a full `acquire` (spec §4.6), used by the
	/// Snapshot Cache to check freshness without re-walking the whole tree.
	async fn fingerprint(&self, query: &BackendQuery) -> Result<u64, BackendError>;

	async fn perform(&self, action: BackendAction) -> Result<ActionOutcome, BackendError>;
}
