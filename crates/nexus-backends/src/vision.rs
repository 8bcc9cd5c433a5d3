//! In-process deterministic reference implementation of the Vision-detect
//! fallback backend (spec §4.1, §4.5, SPEC_FULL.md §13): returns generic
//! interactable regions with bounds, same shape as OCR-text. Read-only.

use async_trait::async_trait;
use nexus_proto::{RawGraph, RawNode, RawRef, Rect};
use parking_lot::Mutex;

use crate::backend::{ActionOutcome, Backend, BackendAction, BackendError, BackendHealth, BackendQuery};

#[derive(Debug, Clone)]
struct DetectedRegion {
	label: String,
	bounds: Rect,
}

fn fixture_regions() -> Vec<DetectedRegion> {
	vec![
		DetectedRegion { label: "toolbar icon".into(), bounds: Rect { x: 980, y: 5, w: 24, h: 24 } },
		DetectedRegion { label: "thumbnail".into(), bounds: Rect { x: 400, y: 300, w: 96, h: 96 } },
	]
}

/// The reference Vision-detect adapter.
pub struct VisionBackend {
	regions: Mutex<Vec<DetectedRegion>>,
	open: Mutex<bool>,
}

impl VisionBackend {
	#[must_use]
	pub fn new() -> Self {
		Self { regions: Mutex::new(fixture_regions()), open: Mutex::new(false) }
	}
}

impl Default for VisionBackend {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl Backend for VisionBackend {
	fn kind(&self) -> nexus_proto::Backend {
		nexus_proto::Backend::Vision
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
			return Err(BackendError::Unavailable("vision session not open".into()));
		}
		let regions = self.regions.lock();
		let region = query.region.unwrap_or(Rect { x: 0, y: 0, w: 1024, h: 768 });
		let children = regions
			.iter()
			.filter(|r| r.bounds.iou(&region) > 0.0)
			.enumerate()
			.map(|(i, r)| RawNode {
				role_hint: "other".into(),
				name: Some(r.label.clone()),
				bounds: Some(r.bounds),
				enabled: Some(true),
				focused: Some(false),
				visible: Some(true),
				editable: Some(false),
				#[allow(clippy::cast_possible_truncation)]
				raw_ref: RawRef(2000 + i as u64),
				children: Vec::new(),
			})
			.collect();
		let root = RawNode {
			role_hint: "window".into(),
			bounds: Some(region),
			children,
			raw_ref: RawRef(1999),
			..Default::default()
		};
		Ok(RawGraph { backend: self.kind(), root })
	}

	async fn fingerprint(&self, _query: &BackendQuery) -> Result<u64, BackendError> {
		Ok(self.regions.lock().len() as u64)
	}

	async fn perform(&self, _action: BackendAction) -> Result<ActionOutcome, BackendError> {
		Err(BackendError::Unsupported("vision-detect is read-only"))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn acquire_returns_fixed_regions() {
		let backend = VisionBackend::new();
		backend.open().await.unwrap();
		let graph = backend.acquire(&BackendQuery::default()).await.unwrap();
		assert_eq!(graph.root.children.len(), 2);
	}
}
