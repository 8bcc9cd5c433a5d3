//! Window identity and the perception cache key (spec §3, §4.6).

use serde::{Deserialize, Serialize};

/// Which backend produced an [`crate::Element`] or acquired a
/// [`crate::Snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
	NativeAx,
	BrowserAx,
	Ocr,
	Vision,
}

impl Backend {
	#[must_use]
	pub fn tag(self) -> &'static str {
		match self {
			Backend::NativeAx => "ax",
			Backend::BrowserAx => "bax",
			Backend::Ocr => "ocr",
			Backend::Vision => "vis",
		}
	}
}

/// Cache key: `(window_title, process_identifier, backend)` (spec §3).
///
/// Title change invalidates the cache entry for that key — there is no
/// separate "rename" path, a changed title is simply a different key whose
/// old entry is never looked up again and is dropped on next insert sweep.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowKey {
	pub window_title: String,
	pub process_id: u32,
	pub backend: Backend,
}

/// One entry of the `windows` command's listing (spec §6.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowInfo {
	pub title: String,
	pub bounds: crate::element::Rect,
	pub process_id: u32,
	pub foreground: bool,
}
