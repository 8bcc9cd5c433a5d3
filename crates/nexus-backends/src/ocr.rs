//! In-process deterministic reference implementation of the OCR-text
//! fallback backend (spec §4.1, §4.5, SPEC_FULL.md §13): returns detected
//! text runs with bounds over a requested region. Read-only — OCR has no
//! semantic action surface, so every `perform` call is unsupported.

use async_trait::async_trait;
use nexus_proto::{RawGraph, RawNode, RawRef, Rect};
use parking_lot::Mutex;

use crate::backend::{ActionOutcome, Backend, BackendAction, BackendError, BackendHealth, BackendQuery};

#[derive(Debug, Clone)]
struct TextRun {
	text: String,
	bounds: Rect,
}

fn fixture_runs() -> Vec<TextRun> {
	vec![
		TextRun { text: "Connection warning: retrying".into(), bounds: Rect { x: 15, y: 5, w: 260, h: 18 } },
		TextRun { text: "Status: idle".into(), bounds: Rect { x: 15, y: 740, w: 120, h: 16 } },
	]
}

/// The reference OCR-text adapter.
pub struct OcrBackend {
	runs: Mutex<Vec<TextRun>>,
	open: Mutex<bool>,
}

impl OcrBackend {
	#[must_use]
	pub fn new() -> Self {
		Self { runs: Mutex::new(fixture_runs()), open: Mutex::new(false) }
	}
}

impl Default for OcrBackend {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl Backend for OcrBackend {
	fn kind(&self) -> nexus_proto::Backend {
		nexus_proto::Backend::Ocr
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
			return Err(BackendError::Unavailable("ocr session not open".into()));
		}
		let runs = self.runs.lock();
		let region = query.region.unwrap_or(Rect { x: 0, y: 0, w: 1024, h: 768 });
		let children = runs
			.iter()
			.filter(|r| r.bounds.iou(&region) > 0.0)
			.enumerate()
			.map(|(i, r)| RawNode {
				role_hint: "static_text".into(),
				name: Some(r.text.clone()),
				bounds: Some(r.bounds),
				enabled: Some(true),
				focused: Some(false),
				visible: Some(true),
				editable: Some(false),
				#[allow(clippy::cast_possible_truncation)]
				raw_ref: RawRef(1000 + i as u64),
				children: Vec::new(),
			})
			.collect();
		let root = RawNode {
			role_hint: "window".into(),
			bounds: Some(region),
			children,
			raw_ref: RawRef(999),
			..Default::default()
		};
		Ok(RawGraph { backend: self.kind(), root })
	}

	async fn fingerprint(&self, _query: &BackendQuery) -> Result<u64, BackendError> {
		Ok(self.runs.lock().len() as u64)
	}

	async fn perform(&self, _action: BackendAction) -> Result<ActionOutcome, BackendError> {
		Err(BackendError::Unsupported("ocr is read-only"))
	}
}
