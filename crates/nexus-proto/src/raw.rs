//! The raw, backend-specific graph a [`crate::Backend`] adapter acquires
//! before the Normalizer converts it into [`crate::Element`]s (spec §4.1,
//! §4.2).
//!
//! This is deliberately *not* the live accessibility tree itself — it is
//! the shallow, already-walked shape every backend converts its native
//! representation into, so the Normalizer never needs backend-specific
//! code. The backend keeps the real live tree/session; [`RawRef`] is the
//! only bridge back to it.

use serde::{Deserialize, Serialize};

use crate::element::Rect;

/// Opaque handle a backend uses to re-resolve a raw node back to something
/// it can act on (invoke/focus/set-value). Meaningless outside the backend
/// session that produced it; never serialized onto the wire (spec §3).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawRef(pub u64);

/// One node of a backend's raw, pre-normalization tree.
#[derive(Debug, Clone, Default)]
pub struct RawNode {
	/// Backend-native role string (e.g. `"AXButton"`, `"button"`,
	/// `"radio_button_es"`); mapped to [`crate::Role`] by the Normalizer's
	/// configurable role map (`nexus-core`).
	pub role_hint: String,
	pub name: Option<String>,
	pub value: Option<String>,
	pub bounds: Option<Rect>,
	pub enabled: Option<bool>,
	pub focused: Option<bool>,
	pub visible: Option<bool>,
	pub editable: Option<bool>,
	pub raw_ref: RawRef,
	pub children: Vec<RawNode>,
}

/// A backend's full raw acquisition result (spec §4.1 `acquire(query) ->
/// RawGraph`).
#[derive(Debug, Clone)]
pub struct RawGraph {
	pub backend: crate::window::Backend,
	pub root: RawNode,
}
