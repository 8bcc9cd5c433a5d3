//! Batch Controller (spec §4.11): runs a `;`/`|`-separated script of steps
//! sequentially through [`Daemon::handle_request`], each step optionally
//! `?`-guarded on the previous step's success and able to interpolate
//! `$name` tokens from the previous step's result.

use regex::Regex;
use serde_json::{json, Value};

use nexus_proto::{ErrorKind, Request, Response, StatusError};

use crate::daemon::Daemon;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Separator {
	/// The first step: nothing precedes it, always eligible to run.
	None,
	/// `;` — this step still runs after a prior failure when
	/// `continue_on_error` is set; otherwise it's skipped.
	Semicolon,
	/// `|` — this step never runs after a prior failure, regardless of
	/// `continue_on_error` (spec §4.11).
	Pipe,
}

struct Step {
	separator: Separator,
	/// Leading `?`: only run if the previous step ran and returned `ok`.
	conditional: bool,
	text: String,
}

fn make_step(separator: Separator, raw: &str) -> Step {
	let trimmed = raw.trim();
	let conditional = trimmed.starts_with('?');
	let text = if conditional { trimmed[1..].trim_start().to_string() } else { trimmed.to_string() };
	Step { separator, conditional, text }
}

/// Splits on top-level `;`/`|`, tracking JSON string literals so a `;` or
/// `|` inside a step's own string values (e.g. `type_text`'s `text`) is
/// never mistaken for a step boundary.
fn split_steps(script: &str) -> Vec<Step> {
	let mut steps = Vec::new();
	let mut separator = Separator::None;
	let mut current = String::new();
	let mut in_string = false;
	let mut escaped = false;

	for c in script.chars() {
		if in_string {
			current.push(c);
			if escaped {
				escaped = false;
			} else if c == '\\' {
				escaped = true;
			} else if c == '"' {
				in_string = false;
			}
			continue;
		}
		match c {
			'"' => {
				in_string = true;
				current.push(c);
			}
			';' | '|' => {
				steps.push(make_step(separator, &current));
				current.clear();
				separator = if c == ';' { Separator::Semicolon } else { Separator::Pipe };
			}
			_ => current.push(c),
		}
	}
	steps.push(make_step(separator, &current));
	steps.retain(|s| !s.text.trim().is_empty());
	steps
}

/// Substitutes `$name` with the previous step's `data.name` field: strings
/// inline as their bare content (so a template spells its own quoting,
/// e.g. `"name": "$name"`), every other JSON scalar/value as its literal
/// text (e.g. `"x": $x`). A name absent from the previous step's data is
/// left untouched.
fn interpolate(text: &str, prev_data: &Value) -> String {
	let pattern = Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").expect("static pattern compiles");
	pattern
		.replace_all(text, |caps: &regex::Captures<'_>| match prev_data.get(&caps[1]) {
			Some(Value::String(s)) => s.clone(),
			Some(other) => other.to_string(),
			None => caps[0].to_string(),
		})
		.into_owned()
}

/// Runs `script` (spec §4.11): each step is independently interpolated
/// against the previous step's result, gated by its separator and any
/// leading `?`, then dispatched through the normal command path — so
/// nested `batch` steps recurse into this same function, across the
/// `handle_request` boundary.
pub async fn run_batch(daemon: &mut Daemon, script: &str, continue_on_error: bool, verbose: bool) -> Response {
	let steps = split_steps(script);
	if steps.is_empty() {
		return Response::err("batch", StatusError::new(ErrorKind::BadRequest, "batch script has no steps"));
	}

	let mut responses: Vec<Response> = Vec::with_capacity(steps.len());
	let mut prev_ok: Option<bool> = None;
	let mut prev_data: Value = Value::Null;

	for step in &steps {
		let separator_allows = match step.separator {
			Separator::None => true,
			Separator::Pipe => prev_ok.unwrap_or(true),
			Separator::Semicolon => continue_on_error || prev_ok.unwrap_or(true),
		};
		let guard_allows = !step.conditional || prev_ok.unwrap_or(false);
		let should_run = separator_allows && guard_allows;

		let text = interpolate(&step.text, &prev_data);
		let response = match serde_json::from_str::<Request>(&text) {
			Err(e) => Response::err("batch_step", StatusError::new(ErrorKind::BadRequest, format!("malformed batch step: {e}"))),
			Ok(request) if !should_run => {
				let name = request.command.name();
				Response::ok(name, json!({ "skipped": true }))
			}
			// Nested `batch` steps re-enter `Daemon::dispatch`, which calls
			// back into `run_batch` — boxed to break the otherwise
			// infinitely-sized mutually recursive future.
			Ok(request) => Box::pin(daemon.handle_request(request)).await,
		};

		prev_ok = Some(response.ok);
		prev_data = response.data.clone();
		responses.push(response);
	}

	if verbose {
		Response::ok("batch", json!({ "steps": responses }))
	} else {
		responses.into_iter().next_back().unwrap_or_else(|| Response::ok("batch", Value::Null))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn splits_on_semicolon_and_pipe_outside_strings() {
		let steps = split_steps(r#"{"command":"ping"};{"command":"quit"}|{"command":"focused"}"#);
		assert_eq!(steps.len(), 3);
		assert_eq!(steps[0].separator, Separator::None);
		assert_eq!(steps[1].separator, Separator::Semicolon);
		assert_eq!(steps[2].separator, Separator::Pipe);
	}

	#[test]
	fn semicolon_inside_a_string_value_is_not_a_boundary() {
		let steps = split_steps(r#"{"command":"type_text","text":"a;b|c"}"#);
		assert_eq!(steps.len(), 1);
		assert!(steps[0].text.contains("a;b|c"));
	}

	#[test]
	fn leading_question_mark_marks_step_conditional() {
		let steps = split_steps(r#"{"command":"ping"};?{"command":"quit"}"#);
		assert!(!steps[0].conditional);
		assert!(steps[1].conditional);
		assert!(steps[1].text.starts_with("{\"command\""));
	}

	#[test]
	fn interpolate_substitutes_string_bare_and_number_literal() {
		let prev = json!({ "name": "Save", "x": 12 });
		let out = interpolate(r#"{"command":"click_element","name":"$name","n":$x}"#, &prev);
		assert_eq!(out, r#"{"command":"click_element","name":"Save","n":12}"#);
	}

	#[test]
	fn interpolate_leaves_unknown_token_untouched() {
		let prev = json!({});
		let out = interpolate("$missing", &prev);
		assert_eq!(out, "$missing");
	}
}
