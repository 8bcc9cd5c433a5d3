//! The request handler: wires `nexus-core`'s Perception Pipeline and
//! `nexus-action`'s Action Engine / Healing Supervisor to the daemon's
//! command surface (spec §6.3), under the single-task concurrency model
//! spec §5 mandates (no locks here — `&mut self` is the only
//! synchronization this crate needs).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use nexus_action::{ActionContext, ActionEngine, ActionFailure, ActionResult, ActionSpec, BackendErrorShape, BackendSource, Diagnosis, HealingSupervisor};
use nexus_backends::{BackendError, BackendFactory, BackendQuery, SessionRegistry};
use nexus_core::filter::Filter;
use nexus_core::normalize::{normalize, Normalized, RoleMap};
use nexus_core::{NexusConfig, PerceptionCore};
use nexus_proto::{
	Backend as BackendKind, Command, Element, ErrorKind, Format, MarkTable, Rect, Request, Response, Role, Snapshot,
	StatusError, WindowKey,
};
use serde_json::{json, Value};

/// Consecutive backend health failures before a session is torn down for
/// reconnect (§4.1). Not exposed on `NexusConfig`: no command or behavior
/// needs it tunable, unlike the verify/heal timings.
const MAX_CONSECUTIVE_BACKEND_FAILURES: u32 = 3;

fn now_ms(started_at: Instant) -> u64 {
	u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn window_bounds(elements: &[Element]) -> Rect {
	elements.iter().find(|e| e.role == Role::Window).map_or_else(
		|| {
			let max_x = elements.iter().map(|e| e.bounds.x + e.bounds.w).max().unwrap_or(0);
			let max_y = elements.iter().map(|e| e.bounds.y + e.bounds.h).max().unwrap_or(0);
			Rect { x: 0, y: 0, w: max_x, h: max_y }
		},
		|w| w.bounds,
	)
}

/// Short hash of title + focused element + count + rounded bounds (spec §3).
fn compute_fingerprint(elements: &[Element], window_title: &str) -> u64 {
	use std::hash::{Hash, Hasher};
	let mut hasher = rustc_hash::FxHasher::default();
	window_title.hash(&mut hasher);
	elements.iter().find(|e| e.is_focused()).map(|e| &e.id).hash(&mut hasher);
	elements.len().hash(&mut hasher);
	let bounds = window_bounds(elements);
	(bounds.w / 8).hash(&mut hasher);
	(bounds.h / 8).hash(&mut hasher);
	hasher.finish()
}

fn backend_error_kind(err: &BackendError) -> ErrorKind {
	match err {
		BackendError::Unavailable(_) => ErrorKind::BackendUnavailable,
		BackendError::WindowNotFocused => ErrorKind::WindowNotFocused,
		BackendError::StaleRawRef => ErrorKind::TargetNotFound,
		BackendError::Timeout => ErrorKind::Timeout,
		BackendError::Unsupported(_) | BackendError::Internal(_) => ErrorKind::InternalError,
	}
}

fn backend_error_response(command: &str, err: &BackendError) -> Response {
	Response::err(command, StatusError::new(backend_error_kind(err), err.to_string()))
}

/// Action target backend for a given command (spec §4.9: pointer/keyboard
/// ops are always native-ax; web ops always go to browser-ax).
fn action_backend_for(command: &Command) -> BackendKind {
	match command {
		Command::WebNavigate { .. } | Command::WebClick { .. } | Command::WebInput { .. } => BackendKind::BrowserAx,
		_ => BackendKind::NativeAx,
	}
}

fn action_spec_for(command: &Command) -> Option<ActionSpec> {
	Some(match command {
		Command::Click { x, y } => ActionSpec::Click { x: *x, y: *y },
		Command::DoubleClick { x, y } => ActionSpec::DoubleClick { x: *x, y: *y },
		Command::RightClick { x, y } => ActionSpec::RightClick { x: *x, y: *y },
		Command::Move { x, y } => ActionSpec::Move { x: *x, y: *y },
		Command::Drag { x, y, to_x, to_y } => ActionSpec::Drag { x: *x, y: *y, to_x: *to_x, to_y: *to_y },
		Command::Scroll { x, y, ticks } => ActionSpec::Scroll { x: *x, y: *y, ticks: *ticks },
		Command::TypeText { text } => ActionSpec::TypeText { text: text.clone() },
		Command::Key { combo } => ActionSpec::PressKeyCombo { combo: combo.clone() },
		Command::ClickElement { name, role, index } => {
			ActionSpec::ClickElement { name: name.clone(), role: *role, index: *index }
		}
		Command::ClickMark { n } => ActionSpec::ClickMark { mark: *n },
		Command::WebNavigate { url } => ActionSpec::WebNavigate { url: url.clone() },
		Command::WebClick { selector } => ActionSpec::WebClick { selector: selector.clone() },
		Command::WebInput { selector, text } => ActionSpec::WebInput { selector: selector.clone(), text: text.clone() },
		_ => return None,
	})
}

fn element_change_json(change: &nexus_core::ElementChange) -> Value {
	fn field<T: serde::Serialize>(f: &Option<nexus_core::FieldChange<T>>) -> Value {
		f.as_ref().map_or(Value::Null, |c| json!({ "before": c.before, "after": c.after }))
	}
	json!({
		"id": change.id,
		"name": change.name,
		"focused": field(&change.focused),
		"enabled": field(&change.enabled),
		"value": field(&change.value),
		"bounds": field(&change.bounds),
	})
}

fn diff_result_json(diff: &nexus_core::DiffResult) -> Value {
	match diff {
		nexus_core::DiffResult::Delta(d) => json!({
			"added": d.added,
			"removed": d.removed,
			"changed": d.changed.iter().map(element_change_json).collect::<Vec<_>>(),
			"unchanged_count": d.unchanged_count,
		}),
		nexus_core::DiffResult::FullDueToChurn(full) => json!({ "full_due_to_churn": full.elements }),
	}
}

fn summary_json(summary: &nexus_core::Summary) -> Value {
	let role_counts: serde_json::Map<String, Value> =
		summary.role_counts.iter().map(|(role, count)| (format!("{role:?}"), json!(count))).collect();
	json!({
		"role_counts": role_counts,
		"focused": summary.focused.as_ref().map(|(name, role)| json!({ "name": name, "role": role })),
		"dialog_count": summary.dialog_count,
		"error_elements": summary.error_elements,
		"spatial_bands": {
			"top": summary.spatial_bands.top,
			"left": summary.spatial_bands.left,
			"main": summary.spatial_bands.main,
			"right": summary.spatial_bands.right,
			"bottom": summary.spatial_bands.bottom,
		},
	})
}

fn name_score(candidate: &str, query: &str) -> f64 {
	if candidate.eq_ignore_ascii_case(query) {
		return 1.0;
	}
	strsim::jaro_winkler(&candidate.to_lowercase(), &query.to_lowercase())
}

/// `find`/`web_find` response shape: `matches`/`top` plus the top match's
/// `name`/`x`/`y` flattened onto the top level, so a following batch step
/// can interpolate `$name`/`$x`/`$y` straight from this step's result
/// (spec §4.11 interpolation reads only the immediately-previous step's
/// top-level `data` fields).
fn find_response_data(matches: &[&Element], top: Option<&Element>) -> Value {
	let mut data = json!({
		"matches": serde_json::to_value(matches).unwrap_or(Value::Null),
		"top": serde_json::to_value(&top).unwrap_or(Value::Null),
	});
	if let Some(top) = top {
		let (x, y) = top.bounds.center();
		data["name"] = json!(top.name);
		data["x"] = json!(x);
		data["y"] = json!(y);
	}
	data
}

/// Owns every piece of per-process daemon state: the warm backend
/// sessions, the Perception Pipeline's cache, the Action Engine, and the
/// single active Mark Registry slot (spec §4.11, §5). Never shared across
/// tasks — the daemon's event loop is the only caller.
pub struct Daemon {
	registry: Arc<SessionRegistry>,
	engine: ActionEngine,
	core: PerceptionCore,
	role_map: RoleMap,
	mark_table: Option<MarkTable>,
	known_titles: HashMap<BackendKind, String>,
	config: NexusConfig,
	started_at: Instant,
}

impl Daemon {
	#[must_use]
	pub fn new(config: NexusConfig, factory: Arc<dyn BackendFactory>) -> Self {
		let registry = Arc::new(SessionRegistry::new(factory, MAX_CONSECUTIVE_BACKEND_FAILURES));
		let backend_source: Arc<dyn BackendSource> = registry.clone();
		Self {
			registry,
			engine: ActionEngine::new(backend_source),
			core: PerceptionCore::new(config),
			role_map: RoleMap::default(),
			mark_table: None,
			known_titles: HashMap::default(),
			config,
			started_at: Instant::now(),
		}
	}

	/// Tears down every warm backend session (spec §4.11 `quit`/signal
	/// shutdown).
	pub async fn shutdown(&self) {
		self.registry.close_all().await;
	}

	/// Runs `request` under its watchdog timeout (spec §4.11): on elapse the
	/// command is treated as cancelled and a `timeout` error is returned;
	/// the daemon process itself is never killed.
	pub async fn handle_request(&mut self, request: Request) -> Response {
		let command_name = request.command.name();
		let timeout_ms = request.effective_timeout_ms();
		match tokio::time::timeout(Duration::from_millis(timeout_ms), self.dispatch(&request)).await {
			Ok(response) => response,
			Err(_) => Response::err(
				command_name,
				StatusError::new(ErrorKind::Timeout, format!("{command_name} exceeded {timeout_ms}ms watchdog")),
			),
		}
	}

	/// Acquires and normalizes current state from `kind`, using the
	/// Snapshot Cache when fresh (spec §4.6). Used by perception-only
	/// commands, which don't need a `raw_ref` side table.
	///
	/// Returns the current snapshot alongside whatever snapshot was
	/// cached immediately before this call (`peek`ed before any insert),
	/// so `--diff` callers have something to diff against that isn't the
	/// snapshot they just acquired — see [`nexus_core::PerceptionCore::describe`].
	async fn perceive(
		&mut self,
		kind: BackendKind,
		app_name: Option<String>,
		force: bool,
	) -> Result<(Snapshot, Option<Snapshot>), BackendError> {
		let backend = self.registry.get_or_open(kind).await;
		let query = BackendQuery { app_name, max_depth: self.config.native_ax_max_depth, region: None };
		let live_fingerprint = backend.fingerprint(&query).await?;
		let guess_title = self.known_titles.get(&kind).cloned().unwrap_or_default();
		let guess_key = WindowKey { window_title: guess_title, process_id: 1, backend: kind };
		let previous = self.core.peek(&guess_key).cloned();

		if let Some(cached) = self.core.lookup_cached(&guess_key, force, live_fingerprint) {
			return Ok((cached.clone(), previous));
		}

		let graph = backend.acquire(&query).await?;
		let mut normalized = normalize(&graph, &self.role_map);
		if self.core.needs_fallback(&normalized.elements) {
			normalized.elements = self.try_fallback_merge(normalized.elements).await;
		}

		let title = normalized.elements.iter().find(|e| e.role == Role::Window).map_or_else(String::new, |w| w.name.clone());
		self.known_titles.insert(kind, title.clone());
		let key = WindowKey { window_title: title.clone(), process_id: 1, backend: kind };
		let fingerprint = compute_fingerprint(&normalized.elements, &title);
		let snapshot =
			Snapshot { window_key: key.clone(), captured_at: now_ms(self.started_at), fingerprint, elements: normalized.elements, diagnostic: None };
		self.core.insert(key, snapshot.clone());
		Ok((snapshot, previous))
	}

	/// Same as [`Self::perceive`] but always fresh and returns the
	/// `raw_ref` side table, for action dispatch (spec §4.9 needs live
	/// `raw_ref`s, which the Snapshot Cache never stores).
	async fn perceive_fresh(&mut self, kind: BackendKind, app_name: Option<String>) -> Result<Normalized, BackendError> {
		let backend = self.registry.get_or_open(kind).await;
		let query = BackendQuery { app_name, max_depth: self.config.native_ax_max_depth, region: None };
		let graph = backend.acquire(&query).await?;
		let normalized = normalize(&graph, &self.role_map);
		if let Some(window) = normalized.elements.iter().find(|e| e.role == Role::Window) {
			self.known_titles.insert(kind, window.name.clone());
		}
		Ok(normalized)
	}

	/// OCR/vision fallback merge (spec §4.5): best-effort, a failed fallback
	/// acquire just leaves the original (possibly sparse) element list.
	async fn try_fallback_merge(&mut self, existing: Vec<Element>) -> Vec<Element> {
		let ocr = self.registry.get_or_open(BackendKind::Ocr).await;
		let Ok(graph) = ocr.acquire(&BackendQuery::default()).await else {
			return existing;
		};
		let fallback = normalize(&graph, &self.role_map).elements;
		self.core.merge_fallback(&existing, fallback)
	}

	async fn dispatch(&mut self, request: &Request) -> Response {
		let name = request.command.name();
		match &request.command {
			Command::Ping => Response::ok("ping", json!({ "uptime_ms": now_ms(self.started_at) })),
			Command::Quit => Response::ok("quit", json!({})),
			Command::Describe { focus, match_, region, diff, summary } => {
				self.handle_describe(request, *focus, match_.clone(), *region, *diff, *summary).await
			}
			Command::Find { query, focus, role, region } => {
				self.handle_find(request, query, *focus, *role, *region).await
			}
			Command::Focused => self.handle_focused(request).await,
			Command::Windows => self.handle_windows().await,
			Command::Screenshot { region, mark } => self.handle_screenshot(request, *region, *mark).await,
			Command::WebDescribe => self.handle_web_describe(Format::Compact).await,
			Command::WebAx => self.handle_web_describe(Format::Json).await,
			Command::WebFind { query } => self.handle_web_find(query).await,
			Command::Batch { script, continue_on_error, verbose } => {
				crate::batch::run_batch(self, script, *continue_on_error, *verbose).await
			}
			_ => self.handle_action(name, request).await,
		}
	}

	async fn handle_describe(
		&mut self,
		request: &Request,
		focus: Option<nexus_proto::FocusPreset>,
		match_: Option<nexus_proto::MatchKind>,
		region: Option<nexus_proto::Region>,
		want_diff: bool,
		want_summary: bool,
	) -> Response {
		let (snapshot, previous) = match self.perceive(BackendKind::NativeAx, request.app.clone(), request.force).await {
			Ok(pair) => pair,
			Err(e) => return backend_error_response("describe", &e),
		};
		if let Some(diag) = &snapshot.diagnostic {
			return Response::ok("describe", json!({ "mode": "empty", "diagnostic": diag }));
		}

		let bounds = window_bounds(&snapshot.elements);
		let result = match self.core.describe(previous.as_ref(), &snapshot, bounds, request.format, want_diff, want_summary) {
			Ok(r) => r,
			Err(e) => return Response::err("describe", StatusError::new(ErrorKind::InternalError, e.to_string())),
		};

		let mut data = json!({});
		if let Some(diff) = &result.diff {
			data["mode"] = json!("delta");
			data["diff"] = diff_result_json(diff);
		} else {
			// Full listing: apply the daemon-level focus/match/region
			// filter here, since the Perception Pipeline's diff/summary
			// tail doesn't take a filter (spec §4.3 filters are a
			// pre-diff, listing-mode-only concern in this daemon).
			let mut filter = Filter::new();
			if let Some(p) = focus {
				filter = filter.with_preset(p);
			}
			if let Some(m) = &match_ {
				filter = match filter.with_name_match(m) {
					Ok(f) => f,
					Err(e) => return Response::err("describe", StatusError::new(ErrorKind::BadRequest, e.to_string())),
				};
			}
			if let Some(r) = region {
				filter = filter.with_region(r);
			}
			data["mode"] = json!("full");
			if filter.is_empty() {
				data["elements"] = serde_json::to_value(&snapshot.elements).unwrap_or(Value::Null);
			} else {
				let filtered: Vec<&Element> = filter.apply(&snapshot.elements, bounds);
				data["elements"] = serde_json::to_value(&filtered).unwrap_or(Value::Null);
			}
		}
		if want_summary {
			data["summary"] = summary_json(&result.summary);
		}
		Response::ok("describe", data)
	}

	async fn handle_find(
		&mut self,
		request: &Request,
		query: &str,
		focus: Option<nexus_proto::FocusPreset>,
		role: Option<Role>,
		region: Option<nexus_proto::Region>,
	) -> Response {
		let snapshot = match self.perceive(BackendKind::NativeAx, request.app.clone(), request.force).await {
			Ok((s, _)) => s,
			Err(e) => return backend_error_response("find", &e),
		};
		let bounds = window_bounds(&snapshot.elements);
		let mut filter = Filter::new();
		if let Some(p) = focus {
			filter = filter.with_preset(p);
		}
		if let Some(r) = region {
			filter = filter.with_region(r);
		}
		let mut candidates: Vec<&Element> = filter.apply(&snapshot.elements, bounds);
		if let Some(role) = role {
			candidates.retain(|e| e.role == role);
		}
		let mut scored: Vec<(&Element, f64)> = candidates.into_iter().map(|e| (e, name_score(&e.name, query))).collect();
		scored.sort_by(|a, b| b.1.total_cmp(&a.1));
		let matches: Vec<&Element> = scored.iter().map(|(e, _)| *e).collect();
		let top = matches.first().copied();
		Response::ok("find", find_response_data(&matches, top))
	}

	async fn handle_focused(&mut self, request: &Request) -> Response {
		let snapshot = match self.perceive(BackendKind::NativeAx, request.app.clone(), request.force).await {
			Ok((s, _)) => s,
			Err(e) => return backend_error_response("focused", &e),
		};
		Response::ok("focused", json!({ "element": serde_json::to_value(snapshot.focused_element()).unwrap_or(Value::Null) }))
	}

	async fn handle_windows(&mut self) -> Response {
		let mut windows = Vec::new();
		for kind in [BackendKind::NativeAx, BackendKind::BrowserAx] {
			if let Ok(normalized) = self.perceive_fresh(kind, None).await {
				let bounds = window_bounds(&normalized.elements);
				let title = normalized.elements.iter().find(|e| e.role == Role::Window).map_or_else(String::new, |w| w.name.clone());
				windows.push(nexus_proto::WindowInfo { title, bounds, process_id: 1, foreground: true });
			}
		}
		Response::ok("windows", json!({ "windows": serde_json::to_value(&windows).unwrap_or(Value::Null) }))
	}

	async fn handle_screenshot(&mut self, request: &Request, _region: Option<nexus_proto::Region>, mark: bool) -> Response {
		let snapshot = match self.perceive(BackendKind::NativeAx, request.app.clone(), true).await {
			Ok((s, _)) => s,
			Err(e) => return backend_error_response("screenshot", &e),
		};
		let bounds = window_bounds(&snapshot.elements);

		let path = match tempfile::Builder::new().prefix("nexus-screenshot-").suffix(".png").tempfile() {
			Ok(f) => match f.into_temp_path().keep() {
				Ok(p) => p,
				Err(e) => return Response::err("screenshot", StatusError::new(ErrorKind::InternalError, e.to_string())),
			},
			Err(e) => return Response::err("screenshot", StatusError::new(ErrorKind::InternalError, e.to_string())),
		};

		let mut data = json!({
			"path": path.display().to_string(),
			"width": bounds.w,
			"height": bounds.h,
		});
		if mark {
			let (table, badges) = nexus_core::annotate(&snapshot);
			self.mark_table = Some(table);
			data["marks"] = serde_json::to_value(
				badges.iter().map(|b| json!({ "number": b.number, "x": b.anchor.0, "y": b.anchor.1 })).collect::<Vec<_>>(),
			)
			.unwrap_or(Value::Null);
		}
		Response::ok("screenshot", data)
	}

	async fn handle_web_describe(&mut self, format: Format) -> Response {
		let normalized = match self.perceive_fresh(BackendKind::BrowserAx, None).await {
			Ok(n) => n,
			Err(e) => return backend_error_response("web_describe", &e),
		};
		match nexus_core::render_elements(&normalized.elements, format) {
			Ok(rendered) => Response::ok(
				"web_describe",
				json!({ "elements": serde_json::to_value(&normalized.elements).unwrap_or(Value::Null), "rendered": rendered }),
			),
			Err(e) => Response::err("web_describe", StatusError::new(ErrorKind::InternalError, e.to_string())),
		}
	}

	async fn handle_web_find(&mut self, query: &str) -> Response {
		let normalized = match self.perceive_fresh(BackendKind::BrowserAx, None).await {
			Ok(n) => n,
			Err(e) => return backend_error_response("web_find", &e),
		};
		let mut scored: Vec<(&Element, f64)> =
			normalized.elements.iter().map(|e| (e, name_score(&e.name, query))).collect();
		scored.sort_by(|a, b| b.1.total_cmp(&a.1));
		let matches: Vec<&Element> = scored.iter().map(|(e, _)| *e).collect();
		let top = matches.first().copied();
		Response::ok("web_find", find_response_data(&matches, top))
	}

	async fn handle_action(&mut self, name: &'static str, request: &Request) -> Response {
		let Some(spec) = action_spec_for(&request.command) else {
			return Response::err(name, StatusError::new(ErrorKind::BadRequest, format!("{name} is not an action command")));
		};

		if let ActionSpec::ClickMark { mark } = &spec
			&& self.mark_table.is_none()
		{
			return Response::err(
				name,
				StatusError::new(ErrorKind::TargetNotFound, format!("no mark table: mark {mark} was never annotated")),
			);
		}

		let kind = action_backend_for(&request.command);
		let normalized = match self.perceive_fresh(kind, request.app.clone()).await {
			Ok(n) => n,
			Err(e) => return backend_error_response(name, &e),
		};
		let bounds = window_bounds(&normalized.elements);
		let title = normalized.elements.iter().find(|e| e.role == Role::Window).map_or_else(String::new, |w| w.name.clone());
		let fingerprint = compute_fingerprint(&normalized.elements, &title);
		let snapshot = Snapshot {
			window_key: WindowKey { window_title: title, process_id: 1, backend: kind },
			captured_at: now_ms(self.started_at),
			fingerprint,
			elements: normalized.elements,
			diagnostic: None,
		};

		let result = {
			let ctx = ActionContext {
				snapshot: &snapshot,
				raw_refs: &normalized.raw_refs,
				window_bounds: bounds,
				mark_table: self.mark_table.as_ref(),
				config: &self.config,
				verify: request.verify,
				app_scope: request.app.clone(),
			};
			if request.heal {
				let supervisor = HealingSupervisor::new(&self.engine);
				let outcome = supervisor.execute(spec, &ctx).await;
				self.core.mark_dirty(&snapshot.window_key);
				return action_outcome_response(name, outcome.result, outcome.diagnosis);
			}
			self.engine.execute(spec, &ctx).await
		};
		self.core.mark_dirty(&snapshot.window_key);
		action_outcome_response(name, result, None)
	}
}

fn action_failure_kind(failure: &ActionFailure) -> (ErrorKind, String, Value) {
	match failure {
		ActionFailure::Resolver(unresolved) => (
			ErrorKind::TargetNotFound,
			"no element matched above the acceptance threshold".to_string(),
			json!({
				"candidates": unresolved
					.candidates
					.iter()
					.map(|c| json!({ "id": c.id, "name": c.name, "role": c.role, "score": c.score }))
					.collect::<Vec<_>>(),
			}),
		),
		ActionFailure::MarkNotFound(n) => (ErrorKind::TargetNotFound, format!("mark {n} does not resolve"), Value::Null),
		ActionFailure::Backend(shape) => {
			let (kind, message) = match shape {
				BackendErrorShape::Unavailable(s) => (ErrorKind::BackendUnavailable, s.clone()),
				BackendErrorShape::WindowNotFocused => (ErrorKind::WindowNotFocused, "window not focused".to_string()),
				BackendErrorShape::StaleRawRef => (ErrorKind::TargetNotFound, "target no longer resolves".to_string()),
				BackendErrorShape::Timeout => (ErrorKind::Timeout, "backend operation timed out".to_string()),
				BackendErrorShape::Unsupported(s) => (ErrorKind::InternalError, s.to_string()),
				BackendErrorShape::Internal(s) => (ErrorKind::InternalError, s.clone()),
			};
			(kind, message, Value::Null)
		}
		ActionFailure::VerifyFailed => (ErrorKind::PartialSuccess, "action dispatched but verification predicate failed".to_string(), Value::Null),
	}
}

fn action_outcome_response(name: &'static str, result: ActionResult, diagnosis: Option<Diagnosis>) -> Response {
	if result.ok {
		return Response::ok(
			name,
			json!({
				"target": result.target,
				"verified": result.verified,
				"changes_summary": result.changes_summary,
			}),
		);
	}

	let (kind, message, context) = match (&result.error, diagnosis) {
		(_, Some(diagnosis)) => (diagnosis.to_error_kind(), format!("{name} failed: {diagnosis:?}"), Value::Null),
		(Some(failure), None) => action_failure_kind(failure),
		(None, None) => (ErrorKind::InternalError, format!("{name} failed with no recorded cause"), Value::Null),
	};
	Response::err(name, StatusError::new(kind, message).with_context(context))
}

#[cfg(test)]
mod tests {
	use nexus_backends::ReferenceBackendFactory;
	use nexus_proto::Command;

	use super::*;

	fn test_daemon() -> Daemon {
		Daemon::new(NexusConfig::default(), Arc::new(ReferenceBackendFactory))
	}

	#[tokio::test]
	async fn ping_reports_uptime() {
		let mut daemon = test_daemon();
		let response = daemon.handle_request(Request::new(Command::Ping)).await;
		assert!(response.ok);
		assert_eq!(response.command, "ping");
		assert!(response.data["uptime_ms"].is_u64());
	}

	#[tokio::test]
	async fn describe_lists_the_fixture_window() {
		let mut daemon = test_daemon();
		let request = Request::new(Command::Describe { focus: None, match_: None, region: None, diff: false, summary: false });
		let response = daemon.handle_request(request).await;
		assert!(response.ok);
		assert_eq!(response.data["mode"], json!("full"));
		let elements = response.data["elements"].as_array().expect("elements array");
		let names: Vec<&str> = elements.iter().map(|e| e["name"].as_str().unwrap()).collect();
		assert!(names.contains(&"Save"));
		assert!(names.contains(&"Cancel"));
		assert!(names.contains(&"Search"));
	}

	#[tokio::test]
	async fn describe_second_call_without_force_is_a_cache_hit() {
		let mut daemon = test_daemon();
		let request = || Request::new(Command::Describe { focus: None, match_: None, region: None, diff: false, summary: false });
		let first = daemon.handle_request(request()).await;
		let second = daemon.handle_request(request()).await;
		assert!(first.ok);
		assert!(second.ok);
	}

	#[tokio::test]
	async fn describe_diff_reports_a_focus_change_against_the_prior_snapshot() {
		let mut daemon = test_daemon();
		let describe_diff = || Request::new(Command::Describe { focus: None, match_: None, region: None, diff: true, summary: false });

		let baseline = daemon.handle_request(describe_diff()).await;
		assert!(baseline.ok);
		assert_eq!(baseline.data["mode"], json!("full"), "first describe has nothing to diff against yet");

		let click = daemon.handle_request(Request::new(Command::ClickElement { name: "Cancel".to_string(), role: None, index: None })).await;
		assert!(click.ok, "expected click to succeed, got {click:?}");

		let after = daemon.handle_request(describe_diff()).await;
		assert!(after.ok, "expected describe success, got {after:?}");
		assert_eq!(after.data["mode"], json!("delta"), "expected a delta once focus changed since the baseline, got {after:?}");
		let changed = after.data["diff"]["changed"].as_array().expect("changed array");
		assert!(
			changed.iter().any(|c| c["name"] == json!("Cancel") && c["focused"]["after"] == json!(true)),
			"expected Cancel's focused field to flip to true, got {changed:?}"
		);
	}

	#[tokio::test]
	async fn find_ranks_exact_match_first_and_flattens_top_fields() {
		let mut daemon = test_daemon();
		let request = Request::new(Command::Find { query: "Save".to_string(), focus: None, role: None, region: None });
		let response = daemon.handle_request(request).await;
		assert!(response.ok);
		assert_eq!(response.data["name"], json!("Save"));
		assert!(response.data["x"].is_i64());
		assert!(response.data["y"].is_i64());
		assert_eq!(response.data["top"]["name"], json!("Save"));
	}

	#[tokio::test]
	async fn click_element_resolves_and_invokes_by_name() {
		let mut daemon = test_daemon();
		let request = Request::new(Command::ClickElement { name: "Save".to_string(), role: None, index: None });
		let response = daemon.handle_request(request).await;
		assert!(response.ok, "expected success, got {response:?}");
		assert_eq!(response.command, "click_element");
		assert!(response.data["target"].is_string());
	}

	#[tokio::test]
	async fn click_element_with_unknown_name_is_target_not_found() {
		let mut daemon = test_daemon();
		let request = Request::new(Command::ClickElement { name: "Nonexistent Widget".to_string(), role: None, index: None });
		let response = daemon.handle_request(request).await;
		assert!(!response.ok);
		assert_eq!(response.status_error.as_ref().unwrap().kind, ErrorKind::TargetNotFound);
	}

	#[tokio::test]
	async fn batch_chains_find_into_click_via_name_interpolation() {
		let mut daemon = test_daemon();
		let script = r#"{"command":"find","query":"Save"};{"command":"click_element","name":"$name"}"#;
		let request = Request::new(Command::Batch { script: script.to_string(), continue_on_error: false, verbose: false });
		let response = daemon.handle_request(request).await;
		assert!(response.ok, "expected batch success, got {response:?}");
		assert_eq!(response.command, "click_element");
	}

	#[tokio::test]
	async fn batch_conditional_step_is_skipped_after_failure() {
		let mut daemon = test_daemon();
		let script = r#"{"command":"click_element","name":"Nonexistent"};?{"command":"ping"}"#;
		let request = Request::new(Command::Batch { script: script.to_string(), continue_on_error: true, verbose: true });
		let response = daemon.handle_request(request).await;
		assert!(response.ok);
		let steps = response.data["steps"].as_array().expect("verbose steps array");
		assert_eq!(steps.len(), 2);
		assert!(!steps[0]["ok"].as_bool().unwrap());
		assert_eq!(steps[1]["data"]["skipped"], json!(true));
	}
}
