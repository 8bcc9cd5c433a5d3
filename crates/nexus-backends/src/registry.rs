//! The warm-session registry: backend sessions are created lazily on
//! first use, kept warm across daemon requests, and torn down after N
//! consecutive health-check failures so the next use reconnects (§4.1
//! lifecycle, §5). Lock discipline: extract the `Arc` under the mutex,
//! do the actual (possibly slow) I/O after releasing it, never hold the
//! lock across an `.await`.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::backend::{Backend, BackendHealth};
use crate::browser_ax::BrowserAxBackend;
use crate::native_ax::NativeAxBackend;
use crate::ocr::OcrBackend;
use crate::vision::VisionBackend;

/// Seam for plugging in a real platform backend without touching
/// `nexus-core`/`nexus-action` (SPEC_FULL.md §13).
pub trait BackendFactory: Send + Sync {
	fn create(&self, kind: nexus_proto::Backend) -> Arc<dyn Backend>;
}

/// Builds the in-process reference adapters (SPEC_FULL.md §13). The
/// default factory wired into `nexus-cli`; a real deployment swaps this
/// for one backed by a platform UIA/AT-SPI2/CDP/OCR client.
pub struct ReferenceBackendFactory;

impl BackendFactory for ReferenceBackendFactory {
	fn create(&self, kind: nexus_proto::Backend) -> Arc<dyn Backend> {
		match kind {
			nexus_proto::Backend::NativeAx => Arc::new(NativeAxBackend::new()),
			nexus_proto::Backend::BrowserAx => Arc::new(BrowserAxBackend::new()),
			nexus_proto::Backend::Ocr => Arc::new(OcrBackend::new()),
			nexus_proto::Backend::Vision => Arc::new(VisionBackend::new()),
		}
	}
}

struct SessionState {
	backend: Arc<dyn Backend>,
	consecutive_failures: u32,
}

/// One session per [`nexus_proto::Backend`] kind, lazily opened and kept
/// warm. At most one in-flight `acquire` per backend is guaranteed by the
/// daemon's single-task event loop (§5), not by this registry.
pub struct SessionRegistry {
	factory: Arc<dyn BackendFactory>,
	sessions: Mutex<FxHashMap<nexus_proto::Backend, SessionState>>,
	max_consecutive_failures: u32,
}

impl SessionRegistry {
	#[must_use]
	pub fn new(factory: Arc<dyn BackendFactory>, max_consecutive_failures: u32) -> Self {
		Self { factory, sessions: Mutex::new(FxHashMap::default()), max_consecutive_failures }
	}

	/// Returns the warm session for `kind`, opening one if none exists yet.
	pub async fn get_or_open(&self, kind: nexus_proto::Backend) -> Arc<dyn Backend> {
		if let Some(backend) = self.sessions.lock().get(&kind).map(|s| s.backend.clone()) {
			return backend;
		}
		let backend = self.factory.create(kind);
		if let Err(err) = backend.open().await {
			tracing::warn!(?kind, %err, "backend session failed to open");
		}
		let mut sessions = self.sessions.lock();
		sessions.entry(kind).or_insert_with(|| SessionState { backend: backend.clone(), consecutive_failures: 0 });
		sessions.get(&kind).expect("just inserted").backend.clone()
	}

	/// Runs a health probe against the warm session (if any), tearing the
	/// session down for reconnect once `max_consecutive_failures` is hit
	/// (spec §4.1: "torn down ... after N consecutive health-check
	/// failures").
	pub async fn health_check(&self, kind: nexus_proto::Backend) -> BackendHealth {
		let Some(backend) = self.sessions.lock().get(&kind).map(|s| s.backend.clone()) else {
			return BackendHealth::Down;
		};
		let health = backend.health().await;

		let needs_reconnect = {
			let mut sessions = self.sessions.lock();
			match sessions.get_mut(&kind) {
				Some(state) => match health {
					BackendHealth::Healthy => {
						state.consecutive_failures = 0;
						false
					}
					BackendHealth::Down => {
						state.consecutive_failures += 1;
						state.consecutive_failures >= self.max_consecutive_failures
					}
				},
				None => false,
			}
		};

		if needs_reconnect {
			tracing::warn!(?kind, "backend exceeded failure threshold, tearing down session for reconnect");
			self.close(kind).await;
		}
		health
	}

	/// Tears down the session for `kind`, if any.
	pub async fn close(&self, kind: nexus_proto::Backend) {
		let backend = self.sessions.lock().remove(&kind).map(|s| s.backend);
		if let Some(backend) = backend
			&& let Err(err) = backend.close().await
		{
			tracing::warn!(?kind, %err, "error closing backend session");
		}
	}

	/// Tears down every warm session (daemon shutdown, spec §4.1).
	pub async fn close_all(&self) {
		let all: Vec<_> = self.sessions.lock().drain().map(|(_, s)| s.backend).collect();
		for backend in all {
			if let Err(err) = backend.close().await {
				tracing::warn!(%err, "error closing backend session during shutdown");
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn get_or_open_reuses_the_same_session() {
		let registry = SessionRegistry::new(Arc::new(ReferenceBackendFactory), 2);
		let a = registry.get_or_open(nexus_proto::Backend::NativeAx).await;
		let b = registry.get_or_open(nexus_proto::Backend::NativeAx).await;
		assert!(Arc::ptr_eq(&a, &b));
	}

	#[tokio::test]
	async fn repeated_health_failures_trigger_reconnect() {
		let registry = SessionRegistry::new(Arc::new(ReferenceBackendFactory), 1);
		let backend = registry.get_or_open(nexus_proto::Backend::NativeAx).await;
		backend.close().await.unwrap();
		// First failure hits the threshold of 1 and should tear the session down.
		let health = registry.health_check(nexus_proto::Backend::NativeAx).await;
		assert_eq!(health, BackendHealth::Down);
		assert!(registry.sessions.lock().get(&nexus_proto::Backend::NativeAx).is_none());
	}

	#[tokio::test]
	async fn health_check_on_unopened_kind_is_down() {
		let registry = SessionRegistry::new(Arc::new(ReferenceBackendFactory), 2);
		assert_eq!(registry.health_check(nexus_proto::Backend::Vision).await, BackendHealth::Down);
	}
}
