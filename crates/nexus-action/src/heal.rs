//! Healing Supervisor (spec §4.10): wraps [`crate::engine::ActionEngine`],
//! classifies a failed action into one [`Diagnosis`], remediates, and
//! retries up to a configured cap. Never retries an action that appears to
//! have partially succeeded (spec §4.10: "reports `partial_success` and
//! stops").

use std::collections::HashMap;
use std::time::Duration;

use nexus_proto::{ErrorKind, RawRef, Role, Snapshot};

use crate::engine::{ActionContext, ActionEngine, ActionFailure, ActionResult, ActionSpec, BackendErrorShape};

/// Interval between `target_not_ready` enablement polls (spec §4.10: "wait
/// up to 2s polling `enabled`" — the polling cadence itself is left to the
/// implementation).
const NOT_READY_POLL_INTERVAL_MS: u64 = 150;

/// The closed diagnosis set the supervisor classifies a failure into,
/// mirroring the action-relevant subset of spec §7's `ErrorKind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnosis {
	TargetNotFound,
	TargetObscured,
	WindowNotFocused,
	TargetNotReady,
	BackendUnavailable,
	PageLoading,
	Timeout,
	PartialSuccess,
	InternalError,
}

impl Diagnosis {
	#[must_use]
	pub fn to_error_kind(self) -> ErrorKind {
		match self {
			Diagnosis::TargetNotFound => ErrorKind::TargetNotFound,
			Diagnosis::TargetObscured => ErrorKind::TargetObscured,
			Diagnosis::WindowNotFocused => ErrorKind::WindowNotFocused,
			Diagnosis::TargetNotReady => ErrorKind::TargetNotReady,
			Diagnosis::BackendUnavailable => ErrorKind::BackendUnavailable,
			Diagnosis::PageLoading => ErrorKind::PageLoading,
			Diagnosis::Timeout => ErrorKind::Timeout,
			Diagnosis::PartialSuccess => ErrorKind::PartialSuccess,
			Diagnosis::InternalError => ErrorKind::InternalError,
		}
	}

	/// Healing never retries past this diagnosis (spec §4.10).
	#[must_use]
	fn is_terminal(self) -> bool {
		matches!(self, Diagnosis::PartialSuccess)
	}
}

/// What one [`HealingSupervisor::execute`] call produced: the last action
/// attempt plus, on failure, the diagnosis that stopped retries.
#[derive(Debug, Clone)]
pub struct HealOutcome {
	pub result: ActionResult,
	pub diagnosis: Option<Diagnosis>,
	pub attempts: u32,
}

fn target_backend_kind(spec: &ActionSpec, window_backend: nexus_proto::Backend) -> nexus_proto::Backend {
	match spec {
		ActionSpec::WebNavigate { .. } | ActionSpec::WebClick { .. } | ActionSpec::WebInput { .. } => {
			nexus_proto::Backend::BrowserAx
		}
		_ => window_backend,
	}
}

/// Wraps one [`ActionEngine`] reference; carries no state of its own
/// between calls.
pub struct HealingSupervisor<'e> {
	engine: &'e ActionEngine,
}

impl<'e> HealingSupervisor<'e> {
	#[must_use]
	pub fn new(engine: &'e ActionEngine) -> Self {
		Self { engine }
	}

	async fn classify(&self, result: &ActionResult, spec: &ActionSpec, window_backend: nexus_proto::Backend) -> Diagnosis {
		let Some(failure) = &result.error else {
			return Diagnosis::InternalError;
		};
		match failure {
			ActionFailure::Resolver(_) | ActionFailure::MarkNotFound(_) => Diagnosis::TargetNotFound,
			ActionFailure::Backend(shape) => match shape {
				BackendErrorShape::WindowNotFocused => Diagnosis::WindowNotFocused,
				BackendErrorShape::StaleRawRef => Diagnosis::TargetNotFound,
				BackendErrorShape::Unavailable(_) => Diagnosis::BackendUnavailable,
				BackendErrorShape::Timeout => Diagnosis::Timeout,
				BackendErrorShape::Unsupported(_) => {
					if matches!(spec, ActionSpec::WebNavigate { .. } | ActionSpec::WebClick { .. } | ActionSpec::WebInput { .. }) {
						Diagnosis::PageLoading
					} else {
						Diagnosis::InternalError
					}
				}
				BackendErrorShape::Internal(_) => Diagnosis::InternalError,
			},
			ActionFailure::VerifyFailed => {
				let kind = target_backend_kind(spec, window_backend);
				if let Ok(fresh) = self.engine.reacquire_normalized(kind).await {
					if fresh.elements.iter().any(|e| e.role == Role::Dialog) {
						return Diagnosis::TargetObscured;
					}
					if let Some(id) = &result.target
						&& let Some(element) = fresh.elements.iter().find(|e| &e.id == id)
						&& !element.is_enabled()
					{
						return Diagnosis::TargetNotReady;
					}
				}
				Diagnosis::PartialSuccess
			}
		}
	}

	/// Attempts `spec` via the wrapped engine, classifying and remediating
	/// on failure, up to `ctx.config.heal_max_retries` retries.
	///
	/// `ctx`'s `snapshot`/`raw_refs` are the starting point only: each
	/// remediation step re-acquires and renormalizes current state into an
	/// owned copy used for the next attempt, so `target_not_found`'s
	/// "re-run Resolver against a fresh snapshot" (spec §4.10) actually
	/// sees fresh data instead of retrying against the same stale one.
	pub async fn execute(&self, spec: ActionSpec, ctx: &ActionContext<'_>) -> HealOutcome {
		let max_retries = ctx.config.heal_max_retries;
		let mut attempts = 0u32;
		let mut owned_snapshot: Snapshot = ctx.snapshot.clone();
		let mut owned_raw_refs: HashMap<String, RawRef> = ctx.raw_refs.clone();

		loop {
			let attempt_ctx = ActionContext {
				snapshot: &owned_snapshot,
				raw_refs: &owned_raw_refs,
				window_bounds: ctx.window_bounds,
				mark_table: ctx.mark_table,
				config: ctx.config,
				verify: ctx.verify,
				app_scope: ctx.app_scope.clone(),
			};
			let result = self.engine.execute(spec.clone(), &attempt_ctx).await;
			attempts += 1;
			if result.ok {
				return HealOutcome { result, diagnosis: None, attempts };
			}

			let diagnosis = self.classify(&result, &spec, owned_snapshot.window_key.backend).await;
			if diagnosis.is_terminal() || attempts > max_retries {
				return HealOutcome { result, diagnosis: Some(diagnosis), attempts };
			}

			self.remediate(diagnosis, &spec, result.target.as_deref(), ctx, &mut owned_snapshot, &mut owned_raw_refs).await;
		}
	}

	#[allow(clippy::too_many_arguments)]
	async fn remediate(
		&self,
		diagnosis: Diagnosis,
		spec: &ActionSpec,
		target_id: Option<&str>,
		ctx: &ActionContext<'_>,
		owned_snapshot: &mut Snapshot,
		owned_raw_refs: &mut HashMap<String, RawRef>,
	) {
		let kind = target_backend_kind(spec, owned_snapshot.window_key.backend);

		match diagnosis {
			Diagnosis::TargetObscured => {
				// Try Escape; a Cancel button (if present) gets picked up
				// naturally by the retry's own resolver/mark re-lookup
				// against the refreshed snapshot below.
				let escape_ctx = ActionContext {
					snapshot: owned_snapshot,
					raw_refs: owned_raw_refs,
					window_bounds: ctx.window_bounds,
					mark_table: ctx.mark_table,
					config: ctx.config,
					verify: ctx.verify,
					app_scope: ctx.app_scope.clone(),
				};
				let _ = self.engine.execute(ActionSpec::PressKeyCombo { combo: "Escape".into() }, &escape_ctx).await;
				self.refresh(kind, owned_snapshot, owned_raw_refs).await;
			}
			Diagnosis::TargetNotReady => {
				let deadline = Duration::from_millis(ctx.config.heal_not_ready_timeout_ms);
				let mut waited = Duration::ZERO;
				while waited < deadline {
					tokio::time::sleep(Duration::from_millis(NOT_READY_POLL_INTERVAL_MS)).await;
					waited += Duration::from_millis(NOT_READY_POLL_INTERVAL_MS);
					self.refresh(kind, owned_snapshot, owned_raw_refs).await;
					let ready =
						target_id.is_none_or(|id| owned_snapshot.elements.iter().any(|e| e.id == id && e.is_enabled()));
					if ready {
						break;
					}
				}
			}
			Diagnosis::PageLoading => {
				tokio::time::sleep(Duration::from_millis(ctx.config.heal_page_loading_timeout_ms)).await;
				self.refresh(kind, owned_snapshot, owned_raw_refs).await;
			}
			Diagnosis::TargetNotFound
			| Diagnosis::WindowNotFocused
			| Diagnosis::BackendUnavailable
			| Diagnosis::Timeout
			| Diagnosis::InternalError
			| Diagnosis::PartialSuccess => {
				// `target_not_found` -> re-run Resolver against a fresh
				// snapshot; `window_not_focused` -> the next attempt's own
				// pre-step re-foregrounds against `ctx.app_scope`. Both
				// just need current state, which `refresh` provides.
				self.refresh(kind, owned_snapshot, owned_raw_refs).await;
			}
		}
	}

	async fn refresh(&self, kind: nexus_proto::Backend, snapshot: &mut Snapshot, raw_refs: &mut HashMap<String, RawRef>) {
		if let Ok(fresh) = self.engine.reacquire_normalized(kind).await {
			snapshot.elements = fresh.elements;
			*raw_refs = fresh.raw_refs;
		}
	}
}
